//! Lasers: firing, flight, hits and expiry.

use bevy::prelude::*;
use sim_physics::{
    FireControl, MotionState,
    collision::CollisionShape,
    combat::{Body, Laser, laser_hits, ship_collisions},
};

use crate::SimSet;
use crate::flight::{Fighter, Health, HullPoints, Loadout, Pilot, PlayerShip};
use crate::ui::{sim_quat_to_bevy, sim_to_bevy};

/// Health lost per second by each fighter in a ship to ship contact.
const COLLISION_DAMAGE_PER_S: f64 = 50.0;

#[derive(Component, Debug, Clone)]
pub struct LaserBolt(pub Laser<Entity>);

#[derive(Resource)]
struct BoltAssets {
    mesh: Handle<Mesh>,
    material: Handle<StandardMaterial>,
}

#[derive(Default)]
pub struct WeaponsPlugin;

impl Plugin for WeaponsPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, setup_bolts);
        app.add_systems(Update, sync_bolt_transforms);
        app.add_systems(
            FixedUpdate,
            (
                advance_bolts.in_set(SimSet::Integrate),
                fire_weapons.in_set(SimSet::Fire),
                resolve_contacts.in_set(SimSet::Collide),
                prune_bolts.in_set(SimSet::Prune),
            ),
        );
    }
}

fn setup_bolts(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    commands.insert_resource(BoltAssets {
        mesh: meshes.add(Cuboid::new(1.0, 1.0, 1.0)),
        material: materials.add(StandardMaterial {
            base_color: Color::srgb(0.4, 1.0, 0.3),
            emissive: LinearRgba::rgb(2.0, 8.0, 1.5),
            unlit: true,
            ..default()
        }),
    });
}

fn fire_weapons(
    time: Res<Time>,
    assets: Res<BoltAssets>,
    mut commands: Commands,
    mut shooters: Query<(Entity, &Name, &MotionState, &mut FireControl, &mut Pilot, &Loadout)>,
) {
    let now = time.elapsed_secs_f64();
    for (entity, name, state, mut fire_control, mut pilot, loadout) in shooters.iter_mut() {
        if pilot.toggle_mode {
            pilot.toggle_mode = false;
            fire_control.toggle_fire_mode();
            let mode = fire_control.mode();
            info!(
                "{}: fire mode {} ({} shot(s), {:.2} s recharge)",
                name,
                fire_control.fire_mode(),
                mode.shots,
                mode.recharge_time_s
            );
        }
        if !pilot.trigger {
            continue;
        }
        let Some(offsets) = fire_control.fire(now) else {
            continue;
        };

        debug!("{} fired {} laser(s)", name, offsets.len());
        let config = &loadout.0;
        for offset in &offsets {
            let laser = Laser::spawn(entity, state, offset, config, now);
            let transform = Transform::from_translation(sim_to_bevy(&laser.state.position))
                .with_rotation(sim_quat_to_bevy(&laser.state.orientation))
                .with_scale(Vec3::new(config.size as f32, 0.15, 0.15));
            commands.spawn((
                LaserBolt(laser),
                Mesh3d(assets.mesh.clone()),
                MeshMaterial3d(assets.material.clone()),
                transform,
            ));
        }
    }
}

fn advance_bolts(time: Res<Time>, mut bolts: Query<&mut LaserBolt>) {
    let dt = time.delta_secs_f64();
    for mut bolt in bolts.iter_mut() {
        bolt.0.state = bolt.0.state.integrate(dt);
    }
}

/// Apply laser hits and ship to ship contacts from this step.
fn resolve_contacts(
    time: Res<Time>,
    mut commands: Commands,
    bolts: Query<(Entity, &LaserBolt)>,
    fighters: Query<(Entity, &MotionState, &CollisionShape, Option<&HullPoints>), With<Fighter>>,
    mut health: Query<(&Name, &mut Health, Has<PlayerShip>)>,
) {
    let dt = time.delta_secs_f64();
    let bodies: Vec<Body<Entity>> = fighters
        .iter()
        .map(|(entity, state, shape, hull)| Body {
            id: entity,
            pose: state.pose(),
            shape,
            hull_points: hull.map(|h| &h.0),
        })
        .collect();
    let (bolt_ids, lasers): (Vec<Entity>, Vec<Laser<Entity>>) =
        bolts.iter().map(|(entity, bolt)| (entity, bolt.0.clone())).unzip();

    for hit in laser_hits(&lasers, &bodies, dt) {
        commands.entity(bolt_ids[hit.laser]).try_despawn();
        let damage = lasers[hit.laser].damage;
        info!(
            "laser hit at {:?} for {:.0} damage",
            hit.point.coords.as_slice(),
            damage
        );
        apply_damage(&mut commands, &mut health, hit.target, damage);
    }

    for contact in ship_collisions(&bodies) {
        debug!("contact depth {:.3} m", contact.depth);
        let damage = COLLISION_DAMAGE_PER_S * dt;
        apply_damage(&mut commands, &mut health, contact.a, damage);
        apply_damage(&mut commands, &mut health, contact.b, damage);
    }
}

fn apply_damage(
    commands: &mut Commands,
    health: &mut Query<(&Name, &mut Health, Has<PlayerShip>)>,
    target: Entity,
    damage: f64,
) {
    let Ok((name, mut health, is_player)) = health.get_mut(target) else {
        return;
    };
    // Already destroyed earlier in this step.
    if health.0 <= 0.0 {
        return;
    }
    health.0 -= damage;
    if health.0 <= 0.0 {
        if is_player {
            info!("player destroyed");
        } else {
            info!("{} destroyed", name);
        }
        commands.entity(target).try_despawn();
    }
}

fn prune_bolts(time: Res<Time>, mut commands: Commands, bolts: Query<(Entity, &LaserBolt)>) {
    let now = time.elapsed_secs_f64();
    for (entity, bolt) in bolts.iter() {
        if bolt.0.is_expired(now) {
            commands.entity(entity).try_despawn();
        }
    }
}

fn sync_bolt_transforms(mut bolts: Query<(&LaserBolt, &mut Transform)>) {
    for (bolt, mut transform) in bolts.iter_mut() {
        transform.translation = sim_to_bevy(&bolt.0.state.position);
        transform.rotation = sim_quat_to_bevy(&bolt.0.state.orientation);
    }
}
