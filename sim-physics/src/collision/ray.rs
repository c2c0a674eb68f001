//! Ray casts against axis-aligned boxes, used for laser hits.

use na::{Isometry3, Point3, Vector3};

use crate::collision::shape::{CollisionShape, ShapeId};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Point3<f64>,
    /// Not necessarily unit length; ray parameters are in multiples of it.
    pub direction: Vector3<f64>,
}

impl Ray {
    pub fn new(origin: Point3<f64>, direction: Vector3<f64>) -> Self {
        Self { origin, direction }
    }

    pub fn at(&self, t: f64) -> Point3<f64> {
        self.origin + self.direction * t
    }

    /// The same ray expressed in another frame.
    pub fn transformed(&self, pose: &Isometry3<f64>) -> Self {
        Self {
            origin: pose * self.origin,
            direction: pose * self.direction,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vector3<f64>,
    pub max: Vector3<f64>,
}

impl Aabb {
    pub fn new(min: Vector3<f64>, max: Vector3<f64>) -> Self {
        Self { min, max }
    }

    /// Box of size `extents` centred on the origin.
    pub fn from_extents(extents: Vector3<f64>) -> Self {
        Self {
            min: -extents * 0.5,
            max: extents * 0.5,
        }
    }
}

/// Entry and exit parameters of a ray through a box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub tmin: f64,
    pub tmax: f64,
}

/// Slab test. `t_range` bounds the accepted ray parameters.
///
/// A zero direction component gives an infinite reciprocal, so that slab
/// becomes `(-inf, inf)` when the origin is inside it and empty otherwise. An
/// origin exactly on a slab plane yields `0 * inf = NaN`; the ray then runs
/// along the face and the slab does not constrain it.
pub fn ray_aabb_test(ray: &Ray, aabb: &Aabb, t_range: (f64, f64)) -> Option<RayHit> {
    let (mut tmin, mut tmax) = t_range;
    for axis in 0..3 {
        let inv = 1.0 / ray.direction[axis];
        let t0 = (aabb.min[axis] - ray.origin[axis]) * inv;
        let t1 = (aabb.max[axis] - ray.origin[axis]) * inv;
        if t0.is_nan() || t1.is_nan() {
            continue;
        }
        tmin = tmin.max(t0.min(t1));
        tmax = tmax.min(t0.max(t1));
    }
    (tmin <= tmax).then_some(RayHit { tmin, tmax })
}

/// Slab test with the ray and the box each given in their own frame, both
/// poses relative to a common (world) frame.
pub fn ray_aabb_test_posed(
    ray: &Ray,
    ray_pose: &Isometry3<f64>,
    aabb: &Aabb,
    box_pose: &Isometry3<f64>,
    t_range: (f64, f64),
) -> Option<RayHit> {
    let ray_in_box = ray.transformed(&(box_pose.inverse() * ray_pose));
    ray_aabb_test(&ray_in_box, aabb, t_range)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeHit {
    pub node: ShapeId,
    pub hit: RayHit,
}

impl CollisionShape {
    /// Cast `ray`, given in this shape's body frame, down the hierarchy.
    ///
    /// Subtrees whose box the ray misses are skipped. Of the leaves hit, the
    /// one the ray enters first wins.
    pub fn ray_test(&self, ray: &Ray, t_range: (f64, f64)) -> Option<ShapeHit> {
        self.ray_test_node(Self::ROOT, ray, t_range)
    }

    fn ray_test_node(&self, id: ShapeId, ray: &Ray, t_range: (f64, f64)) -> Option<ShapeHit> {
        let node = self.node(id);
        let hit = ray_aabb_test(ray, &node.aabb(), t_range)?;
        if node.is_leaf() {
            return Some(ShapeHit { node: id, hit });
        }
        node.children
            .iter()
            .filter_map(|&child| self.ray_test_node(child, ray, t_range))
            .min_by(|a, b| a.hit.tmin.total_cmp(&b.hit.tmin))
    }
}
