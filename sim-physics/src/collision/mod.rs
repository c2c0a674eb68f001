//! Narrow-phase collision: shape hierarchies, SAT and ray casts.

pub mod ray;
pub mod sat;
pub mod shape;

pub use ray::{Aabb, Ray, RayHit, ShapeHit, ray_aabb_test, ray_aabb_test_posed};
pub use sat::{Intersection, any_point_inside, intersect_test, is_inside, is_separating_axis};
pub use shape::{CollisionShape, GeometryData, GeometryKind, ShapeId, ShapeNode};
