//! Attitude hold on a tumbling body.
//!
//! A box with uneven inertia starts spinning about all three axes. With the
//! hold engaged, an `OrientationController` brings it to rest at the selected
//! goal attitude. Space cycles the goal, H toggles the hold.
//!
//! The colored fins mark body +X (red), +Y (green) and +Z (blue).

extern crate nalgebra as na;

use bevy::{
    color::palettes::css::{BLUE, GREEN, RED},
    prelude::*,
};
use sim_physics::{MotionState, control::OrientationController};

#[derive(Resource)]
struct Hold {
    engaged: bool,
    goal: usize,
}

#[derive(Component)]
struct StatusText;

fn goals() -> [na::UnitQuaternion<f64>; 4] {
    [
        na::UnitQuaternion::identity(),
        na::UnitQuaternion::from_axis_angle(&na::Vector3::z_axis(), std::f64::consts::FRAC_PI_2),
        na::UnitQuaternion::from_euler_angles(0.0, -0.6, 0.8),
        na::UnitQuaternion::from_axis_angle(&na::Vector3::x_axis(), std::f64::consts::PI),
    ]
}

fn main() {
    App::new()
        .add_plugins(DefaultPlugins)
        .insert_resource(Time::<Fixed>::from_hz(60.0))
        .insert_resource(Hold {
            engaged: false,
            goal: 0,
        })
        .add_systems(Startup, setup)
        .add_systems(Update, (keys, update_bevy_rot, update_status))
        .add_systems(FixedUpdate, update_rotational_physics)
        .run();
}

fn setup(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    let inertia = na::Matrix3::from_diagonal(&na::Vector3::new(3.0, 4.0, 1.5));
    let controller = match OrientationController::new(inertia) {
        Ok(controller) => controller,
        Err(err) => {
            error!("cannot build controller: {}", err);
            return;
        }
    };
    let state = MotionState {
        angular_velocity: na::Vector3::new(2.0, -1.0, 3.0),
        ..Default::default()
    }
    .with_inertia(inertia);

    let mut fin = |color: Srgba, size: Vec3, at: Vec3| {
        (
            Mesh3d(meshes.add(Cuboid::from_size(size))),
            MeshMaterial3d(materials.add(StandardMaterial {
                base_color: color.into(),
                ..default()
            })),
            Transform::from_translation(at),
        )
    };
    // Bevy axes here: sim +X is bevy +X, sim +Y is bevy -Z, sim +Z is bevy +Y.
    let body = fin(Srgba::new(0.7, 0.7, 0.7, 1.0), Vec3::new(1.2, 0.6, 0.9), Vec3::ZERO);
    let nose = fin(RED, Vec3::new(0.8, 0.1, 0.1), Vec3::new(1.0, 0.0, 0.0));
    let left = fin(GREEN, Vec3::new(0.1, 0.1, 0.8), Vec3::new(0.0, 0.0, -0.85));
    let top = fin(BLUE, Vec3::new(0.1, 0.8, 0.1), Vec3::new(0.0, 0.7, 0.0));

    commands
        .spawn((Transform::default(), Visibility::default(), state, controller))
        .with_child(body)
        .with_child(nose)
        .with_child(left)
        .with_child(top);

    commands.spawn((
        PointLight {
            intensity: 5_500_000.0,
            ..default()
        },
        Transform::from_xyz(4.0, 8.0, 4.0),
    ));

    commands.spawn((
        Camera3d::default(),
        Transform::from_xyz(-2.5, 2.5, 4.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));

    commands.spawn((
        Text::new(""),
        Node {
            position_type: PositionType::Absolute,
            bottom: Val::Px(5.0),
            left: Val::Px(5.0),
            ..default()
        },
        StatusText,
    ));
}

fn keys(kb: Res<ButtonInput<KeyCode>>, mut hold: ResMut<Hold>) {
    if kb.just_pressed(KeyCode::KeyH) {
        hold.engaged = !hold.engaged;
        info!("hold engaged: {}", hold.engaged);
    }
    if kb.just_pressed(KeyCode::Space) {
        hold.goal = (hold.goal + 1) % goals().len();
        info!("goal {}", hold.goal);
    }
}

/// Should be called in Update.
fn update_bevy_rot(mut query: Query<(&mut Transform, &MotionState)>) {
    for (mut transform, state) in query.iter_mut() {
        transform.rotation = sim_quat_to_bevy(&state.orientation);
    }
}

/// Free spin, or the controller's step when the hold is engaged.
fn update_rotational_physics(
    time: Res<Time>,
    hold: Res<Hold>,
    mut query: Query<(&mut MotionState, &mut OrientationController)>,
) {
    let dt = time.delta_secs_f64();
    let goal = MotionState::at_rest(na::Vector3::zeros(), goals()[hold.goal]);

    for (mut state, mut controller) in query.iter_mut() {
        *state = if hold.engaged {
            controller.update_motion(&state, &goal, dt)
        } else {
            state.integrate(dt)
        };
    }
}

fn update_status(
    hold: Res<Hold>,
    query: Query<&MotionState>,
    mut text: Query<&mut Text, With<StatusText>>,
) {
    let (Ok(state), Ok(mut text)) = (query.single(), text.single_mut()) else {
        return;
    };
    let error = state.orientation.angle_to(&goals()[hold.goal]);
    **text = format!(
        "hold: {} (H)  goal: {} (Space)\nrate: {:.3} rad/s  error: {:.3} rad",
        if hold.engaged { "on" } else { "off" },
        hold.goal,
        state.angular_velocity.norm(),
        error
    );
}

/// Convert a nalgebra quaternion (f64) to a bevy quaternion (f32), including
/// the basis change between the Z-up sim and the Y-up bevy.
fn sim_quat_to_bevy(q: &na::UnitQuaternion<f64>) -> Quat {
    let r =
        na::UnitQuaternion::from_axis_angle(&na::Vector3::x_axis(), -std::f64::consts::FRAC_PI_2);
    let q = r * q * r.conjugate();
    Quat::from_array([q.i as f32, q.j as f32, q.k as f32, q.w as f32])
}
