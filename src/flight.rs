//! Fighters: spawning from the scenario, pilot input and flight control.
//!
//! The player and the computer pilots both produce a target `MotionState` on
//! the `Pilot` component; `fly_fighters` hands it to each fighter's
//! `ShipController`.

use anyhow::Context;
use bevy::prelude::*;
use na::{Matrix3xX, UnitQuaternion, Vector3};
use sim_physics::{
    FighterParts, MotionState,
    collision::CollisionShape,
    combat::LaserConfig,
    control::ShipController,
    motion::{body_forward, exp_quat, look_along, renormalized},
};

use crate::SimSet;
use crate::config::{ActorSpawn, Scenario};
use crate::ui::{sim_quat_to_bevy, sim_to_bevy};

/// Body rate commanded by a held turn key, rad/s.
const TURN_RATE: f64 = 1.5;
/// Throttle change while W or S is held, m/s per second.
const THROTTLE_RATE: f64 = 40.0;
/// Top speed for fighters with no velocity limit.
const DEFAULT_MAX_SPEED: f64 = 200.0;
/// Patrol waypoints count as reached inside this distance.
const WAYPOINT_RADIUS: f64 = 20.0;
/// Computer pilots shoot at the player inside this cone and range.
const FIRE_CONE_RAD: f64 = 0.15;
const FIRE_RANGE: f64 = 400.0;

#[derive(Component)]
pub struct Fighter;

#[derive(Component)]
pub struct PlayerShip;

#[derive(Component, Debug, Clone, Copy)]
pub struct Health(pub f64);

/// Extra hull points used to confirm ship to ship contacts.
#[derive(Component, Debug, Clone)]
pub struct HullPoints(pub Matrix3xX<f64>);

#[derive(Component, Debug, Clone, Copy)]
pub struct Loadout(pub LaserConfig);

/// What the fighter is asked to do this step.
#[derive(Component, Debug, Clone)]
pub struct Pilot {
    pub target: MotionState,
    /// Commanded speed, m/s.
    pub throttle: f64,
    /// Commanded body rates, rad/s. Only used for the player.
    pub turn: Vector3<f64>,
    pub trigger: bool,
    /// Set when a fire mode change is requested, cleared once handled.
    pub toggle_mode: bool,
}

#[derive(Component, Debug, Clone)]
pub struct Patrol {
    pub waypoints: Vec<Vector3<f64>>,
    pub current: usize,
}

/// How the player's target attitude behaves between inputs.
#[derive(Resource, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum FlightAssist {
    /// The target keeps whatever roll the player left it at.
    #[default]
    Free,
    /// With no roll input, the target rolls back to wings level.
    Level,
}

#[derive(Default)]
pub struct FlightPlugin;

impl Plugin for FlightPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<FlightAssist>();
        app.add_systems(Startup, setup_fighters);
        app.add_systems(Update, (player_keys, sync_fighter_transforms));
        app.add_systems(FixedUpdate, integrate_fighters.in_set(SimSet::Integrate));
        app.add_systems(
            FixedUpdate,
            (steer_player, steer_patrols, fly_fighters)
                .chain()
                .in_set(SimSet::Control),
        );
    }
}

fn setup_fighters(
    scenario: Res<Scenario>,
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    let player_material = materials.add(StandardMaterial {
        base_color: Color::srgb(0.3, 0.6, 1.0),
        perceptual_roughness: 0.6,
        ..default()
    });
    let hostile_material = materials.add(StandardMaterial {
        base_color: Color::srgb(1.0, 0.35, 0.2),
        perceptual_roughness: 0.6,
        ..default()
    });

    for (index, actor) in scenario.actors.iter().enumerate() {
        let Some(config) = scenario.fighter(&actor.fighter) else {
            warn!("actor {}: unknown fighter type '{}'", index, actor.fighter);
            continue;
        };
        let parts = match config
            .build()
            .with_context(|| format!("building fighter '{}' for actor {}", actor.fighter, index))
        {
            Ok(parts) => parts,
            Err(err) => {
                warn!("skipping actor: {:#}", err);
                continue;
            }
        };

        let state = initial_state(actor, &parts);
        let pilot = Pilot {
            target: state.clone(),
            throttle: actor.speed,
            turn: Vector3::zeros(),
            trigger: false,
            toggle_mode: false,
        };
        let material = if actor.player {
            player_material.clone()
        } else {
            hostile_material.clone()
        };
        let boxes = hull_boxes(&parts.shape, &mut meshes);

        let FighterParts {
            controller,
            fire_control,
            shape,
            hull_points,
            ..
        } = parts;
        let mut entity = commands.spawn((
            Name::new(format!("{} {}", actor.fighter, index)),
            Fighter,
            Health(config.health),
            Loadout(config.laser),
            fighter_transform(&state),
            Visibility::default(),
            state,
            controller,
            fire_control,
            shape,
            pilot,
        ));
        if let Some(points) = hull_points {
            entity.insert(HullPoints(points));
        }
        if actor.player {
            entity.insert(PlayerShip);
        } else if !actor.patrol.is_empty() {
            entity.insert(Patrol {
                waypoints: actor.patrol.clone(),
                current: 0,
            });
        }
        entity.with_children(|parent| {
            for (mesh, transform) in boxes {
                parent.spawn((Mesh3d(mesh), MeshMaterial3d(material.clone()), transform));
            }
        });

        info!(
            "spawned {} '{}' at {:?}",
            if actor.player { "player" } else { "hostile" },
            actor.fighter,
            actor.position.as_slice()
        );
    }
}

fn initial_state(actor: &ActorSpawn, parts: &FighterParts) -> MotionState {
    let yaw = actor.yaw_deg.to_radians();
    let orientation = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), yaw);
    let mut state = MotionState::at_rest(actor.position, orientation).with_inertia(parts.inertia);
    state.velocity = state.forward() * actor.speed;
    state
}

/// One placeholder box per leaf of the collision shape, in body coordinates.
fn hull_boxes(
    shape: &CollisionShape,
    meshes: &mut Assets<Mesh>,
) -> Vec<(Handle<Mesh>, Transform)> {
    shape
        .leaves()
        .map(|node| {
            let size = node.scale();
            let mesh = meshes.add(Cuboid::new(size.x as f32, size.z as f32, size.y as f32));
            (mesh, Transform::from_translation(sim_to_bevy(&node.center())))
        })
        .collect()
}

fn fighter_transform(state: &MotionState) -> Transform {
    Transform::from_translation(sim_to_bevy(&state.position))
        .with_rotation(sim_quat_to_bevy(&state.orientation))
}

fn player_keys(
    kb: Res<ButtonInput<KeyCode>>,
    time: Res<Time>,
    mut assist: ResMut<FlightAssist>,
    mut query: Query<(&mut Pilot, &ShipController), With<PlayerShip>>,
) {
    if kb.just_pressed(KeyCode::KeyR) {
        *assist = match *assist {
            FlightAssist::Free => FlightAssist::Level,
            FlightAssist::Level => FlightAssist::Free,
        };
        info!("flight assist: {:?}", *assist);
    }

    let Ok((mut pilot, controller)) = query.single_mut() else {
        return;
    };

    let axis = |positive: KeyCode, negative: KeyCode| {
        let mut value = 0.0;
        if kb.pressed(positive) {
            value += TURN_RATE;
        }
        if kb.pressed(negative) {
            value -= TURN_RATE;
        }
        value
    };
    // Up pushes the nose down, as with a stick.
    pilot.turn = Vector3::new(
        axis(KeyCode::KeyE, KeyCode::KeyQ),
        axis(KeyCode::ArrowUp, KeyCode::ArrowDown),
        axis(KeyCode::KeyA, KeyCode::KeyD),
    );

    let dt = time.delta_secs_f64();
    let max_speed = controller.limits().velocity.unwrap_or(DEFAULT_MAX_SPEED);
    if kb.pressed(KeyCode::KeyW) {
        pilot.throttle = (pilot.throttle + THROTTLE_RATE * dt).min(max_speed);
    }
    if kb.pressed(KeyCode::KeyS) {
        pilot.throttle = (pilot.throttle - THROTTLE_RATE * dt).max(0.0);
    }

    pilot.trigger = kb.pressed(KeyCode::Space);
    if kb.just_pressed(KeyCode::KeyF) {
        pilot.toggle_mode = true;
    }
}

fn integrate_fighters(time: Res<Time>, mut query: Query<&mut MotionState, With<Fighter>>) {
    let dt = time.delta_secs_f64();
    for mut state in query.iter_mut() {
        *state = state.integrate(dt);
    }
}

/// Turn the player's commanded rates and throttle into a target.
fn steer_player(
    time: Res<Time>,
    assist: Res<FlightAssist>,
    mut query: Query<&mut Pilot, With<PlayerShip>>,
) {
    let dt = time.delta_secs_f64();
    for mut pilot in query.iter_mut() {
        let turn = pilot.turn;
        let mut orientation = renormalized(pilot.target.orientation * exp_quat(&turn, dt));
        if *assist == FlightAssist::Level && turn.x == 0.0 {
            let forward = orientation * body_forward();
            if let Some(level) = look_along(&forward, &Vector3::z()) {
                orientation = level;
            }
        }
        pilot.target.orientation = orientation;
        pilot.target.velocity = orientation * body_forward() * pilot.throttle;
    }
}

/// Point computer pilots at their next waypoint, and pull the trigger when
/// the player is in front of them.
fn steer_patrols(
    mut query: Query<(&MotionState, &mut Pilot, &mut Patrol), Without<PlayerShip>>,
    player: Query<&MotionState, With<PlayerShip>>,
) {
    let player = player.single().ok().map(|s| s.position);
    for (state, mut pilot, mut patrol) in query.iter_mut() {
        let Some(mut waypoint) = patrol.waypoints.get(patrol.current).copied() else {
            continue;
        };
        if (waypoint - state.position).norm() < WAYPOINT_RADIUS {
            patrol.current = (patrol.current + 1) % patrol.waypoints.len();
            waypoint = patrol.waypoints[patrol.current];
        }

        let to_waypoint = waypoint - state.position;
        if let Some(orientation) = look_along(&to_waypoint, &Vector3::z()) {
            pilot.target.orientation = orientation;
        }
        pilot.target.velocity = pilot.target.orientation * body_forward() * pilot.throttle;

        pilot.trigger = player.is_some_and(|target| {
            let to_target = target - state.position;
            let range = to_target.norm();
            range < FIRE_RANGE && range > 0.0 && state.forward().angle(&to_target) < FIRE_CONE_RAD
        });
    }
}

pub fn fly_fighters(
    time: Res<Time>,
    mut query: Query<(&mut MotionState, &mut ShipController, &Pilot), With<Fighter>>,
) {
    let dt = time.delta_secs_f64();
    for (mut state, mut controller, pilot) in query.iter_mut() {
        *state = controller.update(&state, &pilot.target, dt);
    }
}

fn sync_fighter_transforms(mut query: Query<(&MotionState, &mut Transform), With<Fighter>>) {
    for (state, mut transform) in query.iter_mut() {
        *transform = fighter_transform(state);
    }
}
