//! Per-tick hit resolution between lasers and fighters.
//!
//! Everything here is generic over the entity id so it runs without an ECS
//! world. The app passes bevy `Entity`s.

use na::{Isometry3, Matrix3xX, Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::collision::{Aabb, CollisionShape, Ray, ShapeId, any_point_inside, intersect_test};
use crate::motion::MotionState;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaserConfig {
    /// m/s along the shooter's nose, on top of the shooter's own velocity.
    pub speed: f64,
    pub lifetime_s: f64,
    /// Bolt length; bolts spawn this far ahead of their muzzle.
    pub size: f64,
    pub damage: f64,
}

impl Default for LaserConfig {
    fn default() -> Self {
        Self {
            speed: 300.0,
            lifetime_s: 2.0,
            size: 2.0,
            damage: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Laser<Id> {
    pub owner: Id,
    /// World position the bolt was fired from.
    pub origin: Vector3<f64>,
    pub state: MotionState,
    pub expires_at: f64,
    pub damage: f64,
}

impl<Id> Laser<Id> {
    /// A bolt leaving `shooter`'s muzzle at body-frame `offset`.
    pub fn spawn(
        owner: Id,
        shooter: &MotionState,
        offset: &Vector3<f64>,
        config: &LaserConfig,
        now: f64,
    ) -> Self {
        let forward = shooter.forward();
        let muzzle = shooter.pose() * Point3::from(*offset);
        let state = MotionState {
            position: muzzle.coords + forward * config.size,
            orientation: shooter.orientation,
            velocity: shooter.velocity + forward * config.speed,
            ..Default::default()
        };
        Self {
            owner,
            origin: state.position,
            state,
            expires_at: now + config.lifetime_s,
            damage: config.damage,
        }
    }

    pub fn is_expired(&self, now: f64) -> bool {
        now >= self.expires_at
    }

    /// The segment covered during the last step of `dt`, as a ray over
    /// `t` in `[0, 1]`. It never starts behind the point the bolt was fired
    /// from.
    pub fn swept_ray(&self, dt: f64) -> Ray {
        let step = self.state.velocity * dt;
        let flown = self.state.position - self.origin;
        let travel = if flown.norm_squared() < step.norm_squared() {
            flown
        } else {
            step
        };
        Ray::new(Point3::from(self.state.position - travel), travel)
    }
}

/// A collidable entity at its current pose.
#[derive(Debug, Clone, Copy)]
pub struct Body<'a, Id> {
    pub id: Id,
    pub pose: Isometry3<f64>,
    pub shape: &'a CollisionShape,
    /// Optional hull sample points (body frame). When set, a contact with
    /// the earlier body of a pair only counts if one of these points lies
    /// strictly inside that body's touching node.
    pub hull_points: Option<&'a Matrix3xX<f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitEvent<Id> {
    /// Index into the laser slice.
    pub laser: usize,
    pub target: Id,
    pub node: ShapeId,
    /// World frame.
    pub point: Point3<f64>,
    pub normal: Vector3<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionEvent<Id> {
    pub a: Id,
    pub b: Id,
    /// World frame.
    pub point: Point3<f64>,
    /// From `a` toward `b`, world frame.
    pub normal: Vector3<f64>,
    pub depth: f64,
}

/// Hit each laser's swept segment for this step against every body except its
/// owner. A laser hits at most one body, the nearest along its path.
pub fn laser_hits<Id: Copy + PartialEq>(
    lasers: &[Laser<Id>],
    bodies: &[Body<Id>],
    dt: f64,
) -> Vec<HitEvent<Id>> {
    let mut hits = Vec::new();
    for (index, laser) in lasers.iter().enumerate() {
        let ray = laser.swept_ray(dt);
        let mut nearest: Option<(f64, HitEvent<Id>)> = None;

        for body in bodies.iter().filter(|b| b.id != laser.owner) {
            let local = ray.transformed(&body.pose.inverse());
            let Some(hit) = body.shape.ray_test(&local, (0.0, 1.0)) else {
                continue;
            };
            if nearest.as_ref().is_some_and(|(t, _)| *t <= hit.hit.tmin) {
                continue;
            }

            let node = body.shape.node(hit.node);
            let local_point = local.at(hit.hit.tmin);
            let normal = face_normal(&node.aabb(), &local_point);
            nearest = Some((
                hit.hit.tmin,
                HitEvent {
                    laser: index,
                    target: body.id,
                    node: hit.node,
                    point: body.pose * local_point,
                    normal: body.pose * normal,
                },
            ));
        }
        hits.extend(nearest.map(|(_, event)| event));
    }
    hits
}

/// Pairwise SAT between all bodies, with no broad phase.
pub fn ship_collisions<Id: Copy>(bodies: &[Body<Id>]) -> Vec<CollisionEvent<Id>> {
    let mut events = Vec::new();
    for (i, a) in bodies.iter().enumerate() {
        for b in &bodies[i + 1..] {
            let relative = a.pose.inverse() * b.pose;
            let Some(hit) = intersect_test(a.shape, b.shape, &relative) else {
                continue;
            };
            if let Some(points) = b.hull_points {
                if !any_point_inside(a.shape.node(hit.node_a), points, &relative) {
                    continue;
                }
            }
            events.push(CollisionEvent {
                a: a.id,
                b: b.id,
                point: a.pose * hit.point,
                normal: a.pose * hit.normal,
                depth: hit.depth,
            });
        }
    }
    events
}

/// Drop expired lasers, returning how many went.
pub fn prune_expired<Id>(lasers: &mut Vec<Laser<Id>>, now: f64) -> usize {
    let before = lasers.len();
    lasers.retain(|l| !l.is_expired(now));
    before - lasers.len()
}

/// Outward normal of the box face nearest to `point`.
fn face_normal(aabb: &Aabb, point: &Point3<f64>) -> Vector3<f64> {
    let mut best = (f64::INFINITY, Vector3::x());
    for axis in 0..3 {
        let faces = [
            ((point[axis] - aabb.min[axis]).abs(), -1.0),
            ((aabb.max[axis] - point[axis]).abs(), 1.0),
        ];
        for (distance, sign) in faces {
            if distance < best.0 {
                let mut n = Vector3::zeros();
                n[axis] = sign;
                best = (distance, n);
            }
        }
    }
    best.1
}
