//! Camera, lights and the text HUD.
//!
//! The HUD gets its own 2d camera on a separate render layer so it overlays
//! the chase camera.

use bevy::{camera::visibility::RenderLayers, color::palettes::css::GOLD, prelude::*};
use na::Point3;
use sim_physics::{FireControl, MotionState, control::CameraController};
use std::f32::consts::FRAC_PI_2;
use std::fmt::Write;

use crate::SimSet;
use crate::config::Scenario;
use crate::flight::{Fighter, FlightAssist, Health, Pilot, PlayerShip, fly_fighters};

pub const UI_LAYER: RenderLayers = RenderLayers::layer(8);

/// Spacing of the static marker lattice, m.
const BEACON_SPACING: f32 = 150.0;
const BEACON_COUNT: i32 = 4;

#[derive(Component)]
pub struct InfoText;

#[derive(Component)]
pub struct StatusText;

/// The chase camera's last target; its own state is the entity's
/// `MotionState`.
#[derive(Component, Default)]
pub struct ChaseRig {
    target: Option<MotionState>,
}

#[derive(Default)]
pub struct UIPlugin;

impl Plugin for UIPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, setup_ui);
        app.add_systems(Update, (place_camera, update_ui));
        app.add_systems(
            FixedUpdate,
            chase_player.in_set(SimSet::Control).after(fly_fighters),
        );
    }
}

fn setup_ui(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    // 2D camera for UI.
    commands.spawn((
        Camera2d,
        Camera {
            order: 8,
            clear_color: ClearColorConfig::None,
            ..default()
        },
        UI_LAYER,
        Name::new("UI Camera"),
    ));

    commands
        .spawn((
            Text::new("Status: "),
            TextFont {
                font_size: 24.0,
                ..default()
            },
            Node {
                position_type: PositionType::Absolute,
                top: Val::Px(5.0),
                right: Val::Px(5.0),
                ..default()
            },
            UI_LAYER,
            Name::new("Status Text"),
        ))
        .with_child((
            TextSpan::new(""),
            TextFont {
                font_size: 24.0,
                ..default()
            },
            TextColor(GOLD.into()),
            StatusText,
        ));

    // Informative text.
    commands.spawn((
        Text::new(""),
        TextFont {
            font_size: 20.0,
            ..default()
        },
        Node {
            position_type: PositionType::Absolute,
            bottom: Val::Px(5.0),
            left: Val::Px(5.0),
            ..default()
        },
        UI_LAYER,
        Name::new("Info Text"),
        InfoText,
    ));

    // The main 3d scene, seen from behind the player.
    let controller = match CameraController::new() {
        Ok(controller) => controller,
        Err(err) => {
            warn!("chase camera disabled: {}", err);
            return;
        }
    };
    commands.spawn((
        Camera3d::default(),
        Camera {
            order: 0,
            ..default()
        },
        Name::new("Chase Camera"),
        Transform::from_xyz(-25.0, 6.0, 0.0).looking_at(Vec3::ZERO, Vec3::Y),
        Projection::Perspective(PerspectiveProjection {
            fov: std::f32::consts::FRAC_PI_3,
            near: 0.5,
            far: 10_000.0,
            ..default()
        }),
        controller,
        MotionState::default(),
        ChaseRig::default(),
    ));

    commands.spawn((
        DirectionalLight {
            shadows_enabled: true,
            illuminance: 10_000.0,
            ..default()
        },
        Transform::default().looking_to(Vec3::new(0.3, -1.0, -0.5).normalize(), Vec3::Y),
        Name::new("Main Light"),
    ));

    // Static markers so speed and turns are visible against something.
    let beacon = meshes.add(Sphere::new(1.5).mesh().uv(12, 8));
    let beacon_material = materials.add(StandardMaterial {
        base_color: Color::srgb(0.8, 0.8, 0.9),
        unlit: true,
        ..default()
    });
    for i in -BEACON_COUNT..=BEACON_COUNT {
        for j in -BEACON_COUNT..=BEACON_COUNT {
            for k in -1..=1 {
                commands.spawn((
                    Mesh3d(beacon.clone()),
                    MeshMaterial3d(beacon_material.clone()),
                    Transform::from_xyz(
                        i as f32 * BEACON_SPACING,
                        k as f32 * BEACON_SPACING,
                        j as f32 * BEACON_SPACING,
                    ),
                ));
            }
        }
    }
}

/// Steer the chase camera toward its spot behind the player.
fn chase_player(
    time: Res<Time>,
    scenario: Res<Scenario>,
    player: Query<&MotionState, (With<PlayerShip>, Without<ChaseRig>)>,
    mut rig: Query<(&mut MotionState, &mut CameraController, &mut ChaseRig)>,
) {
    let Ok(player) = player.single() else {
        return;
    };
    let Ok((mut state, mut controller, mut rig)) = rig.single_mut() else {
        return;
    };

    let spot = player.pose() * Point3::from(scenario.camera.offset);
    let target = MotionState {
        position: spot.coords,
        orientation: player.orientation,
        velocity: player.velocity,
        ..Default::default()
    };
    if rig.target.is_none() {
        // First frame: start in place rather than fly in from the origin.
        *state = target.clone();
    } else {
        *state = controller.update(&state, &target, time.delta_secs_f64());
    }
    rig.target = Some(target);
}

fn place_camera(mut rig: Query<(&MotionState, &CameraController, &ChaseRig, &mut Transform)>) {
    let Ok((state, controller, rig, mut transform)) = rig.single_mut() else {
        return;
    };
    let Some(target) = &rig.target else {
        return;
    };
    let pose = controller.view_pose(state, target);
    transform.translation = sim_to_bevy(&pose.translation.vector);
    // Cameras look down their local -Z; turn that onto the body nose.
    transform.rotation = sim_quat_to_bevy(&pose.rotation) * Quat::from_rotation_y(-FRAC_PI_2);
}

fn update_ui(
    mut info: Query<&mut Text, With<InfoText>>,
    mut status: Query<&mut TextSpan, With<StatusText>>,
    time: Res<Time<Virtual>>,
    assist: Res<FlightAssist>,
    player: Query<(&MotionState, &Pilot, &FireControl, &Health), With<PlayerShip>>,
    hostiles: Query<(), (With<Fighter>, Without<PlayerShip>)>,
) {
    let remaining = hostiles.iter().count();
    let player = player.single().ok();

    if let Ok(mut status) = status.single_mut() {
        **status = match (player, remaining) {
            (None, _) => "destroyed".to_string(),
            (Some(_), 0) => "all hostiles down".to_string(),
            (Some(_), n) => format!("{} hostile(s)", n),
        };
    }

    let Ok(mut info) = info.single_mut() else {
        return;
    };
    let Some((state, pilot, fire_control, health)) = player else {
        **info = format!("Time: {:.1} s", time.elapsed_secs_f64());
        return;
    };

    let mode = fire_control.mode();
    let mut message = String::new();
    // Writing to a String cannot fail.
    let _ = writeln!(message, "Time: {:.1} s", time.elapsed_secs_f64());
    let _ = writeln!(
        message,
        "Speed: {:.1} m/s (throttle {:.0})",
        state.velocity.norm(),
        pilot.throttle
    );
    let _ = writeln!(
        message,
        "Rates: {:.2}, {:.2}, {:.2} rad/s",
        state.angular_velocity.x, state.angular_velocity.y, state.angular_velocity.z
    );
    let _ = writeln!(
        message,
        "Guns: mode {} of {}, {} shot(s), {:.2} s",
        fire_control.fire_mode() + 1,
        fire_control.num_modes(),
        mode.shots,
        mode.recharge_time_s
    );
    let _ = writeln!(message, "Health: {:.0}", health.0);
    let _ = write!(message, "Assist: {:?}", *assist);
    **info = message;
}

/// Z-up simulation vector to bevy's Y-up frame.
pub fn sim_to_bevy(v: &na::Vector3<f64>) -> Vec3 {
    Vec3::new(v.x as f32, v.z as f32, -v.y as f32)
}

/// Z-up simulation rotation to bevy's Y-up frame, consistent with
/// [`sim_to_bevy`].
pub fn sim_quat_to_bevy(q: &na::UnitQuaternion<f64>) -> Quat {
    let r =
        na::UnitQuaternion::from_axis_angle(&na::Vector3::x_axis(), -std::f64::consts::FRAC_PI_2);
    let q = r * q * r.conjugate();
    Quat::from_array([q.i as f32, q.j as f32, q.k as f32, q.w as f32])
}
