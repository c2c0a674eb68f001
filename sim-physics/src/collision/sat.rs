//! Separating-axis tests between convex nodes of two shape hierarchies.

use na::{Isometry3, Matrix3xX, Point3, Vector3};

use crate::collision::shape::{CollisionShape, ShapeId, ShapeNode};

/// Cross products of nearly parallel edges shorter than this are not axes.
const MIN_AXIS_NORM: f64 = 1e-9;

/// Contact between two shapes, in the frame of shape A.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intersection {
    pub node_a: ShapeId,
    pub node_b: ShapeId,
    /// Minimum-penetration axis, unit length, pointing from A into B.
    pub normal: Vector3<f64>,
    pub depth: f64,
    pub point: Point3<f64>,
}

/// Whether the projections of the two point sets onto `axis` are disjoint.
///
/// A near-zero axis never separates.
pub fn is_separating_axis(
    axis: &Vector3<f64>,
    points_a: &Matrix3xX<f64>,
    points_b: &Matrix3xX<f64>,
) -> bool {
    if axis.norm() < MIN_AXIS_NORM || points_a.ncols() == 0 || points_b.ncols() == 0 {
        return false;
    }
    let (a_min, a_max) = project(axis, points_a);
    let (b_min, b_max) = project(axis, points_b);
    b_min > a_max || b_max < a_min
}

/// Test shape `b` against shape `a`; `relative_pose` takes B's body frame into
/// A's.
///
/// Overlapping inner nodes are refined by descending A's children first and
/// then B's. The first intersecting child in order wins, so the result names a
/// leaf of each shape.
pub fn intersect_test(
    a: &CollisionShape,
    b: &CollisionShape,
    relative_pose: &Isometry3<f64>,
) -> Option<Intersection> {
    intersect_nodes(a, CollisionShape::ROOT, b, CollisionShape::ROOT, relative_pose)
}

fn intersect_nodes(
    a: &CollisionShape,
    ia: ShapeId,
    b: &CollisionShape,
    ib: ShapeId,
    pose: &Isometry3<f64>,
) -> Option<Intersection> {
    let node_a = a.node(ia);
    let node_b = b.node(ib);
    let b_vertices = transform_points(pose, &node_b.vertices);
    let (normal, depth) = min_overlap(node_a, node_b, &b_vertices, pose)?;

    if !node_a.is_leaf() {
        return node_a
            .children
            .iter()
            .find_map(|&child| intersect_nodes(a, child, b, ib, pose));
    }
    if !node_b.is_leaf() {
        return node_b
            .children
            .iter()
            .find_map(|&child| intersect_nodes(a, ia, b, child, pose));
    }

    Some(Intersection {
        node_a: ia,
        node_b: ib,
        normal,
        depth,
        point: overlap_center(node_a, &b_vertices),
    })
}

/// `true` when `points` (brought into `node`'s frame by `relative_pose`)
/// overlap the node along every one of its face normals and edges.
pub fn is_inside(node: &ShapeNode, points: &Matrix3xX<f64>, relative_pose: &Isometry3<f64>) -> bool {
    if points.ncols() == 0 {
        return false;
    }
    let points = transform_points(relative_pose, points);
    node.face_normals
        .column_iter()
        .chain(node.edges.column_iter())
        .all(|axis| !is_separating_axis(&axis.into_owned(), &node.vertices, &points))
}

/// `true` when at least one of `points` (brought into `node`'s frame by
/// `relative_pose`) lies strictly inside the node.
pub fn any_point_inside(
    node: &ShapeNode,
    points: &Matrix3xX<f64>,
    relative_pose: &Isometry3<f64>,
) -> bool {
    let slabs: Vec<(Vector3<f64>, f64, f64)> = node
        .face_normals
        .column_iter()
        .map(|normal| {
            let normal = normal.into_owned();
            let (lo, hi) = project(&normal, &node.vertices);
            (normal, lo, hi)
        })
        .collect();
    if slabs.is_empty() {
        return false;
    }
    let points = transform_points(relative_pose, points);
    points.column_iter().any(|p| {
        slabs.iter().all(|(normal, lo, hi)| {
            let d = normal.dot(&p);
            d > *lo && d < *hi
        })
    })
}

/// Runs SAT over the full candidate axis set. `None` as soon as one axis
/// separates, otherwise the axis of least overlap, oriented from A to B, and
/// that overlap.
fn min_overlap(
    a: &ShapeNode,
    b: &ShapeNode,
    b_vertices: &Matrix3xX<f64>,
    pose: &Isometry3<f64>,
) -> Option<(Vector3<f64>, f64)> {
    let rotation = pose.rotation.to_rotation_matrix();
    let b_normals = rotation.matrix() * &b.face_normals;
    let b_edges = rotation.matrix() * &b.edges;

    let face_axes = a
        .face_normals
        .column_iter()
        .map(|c| c.into_owned())
        .chain(b_normals.column_iter().map(|c| c.into_owned()));
    let edge_axes = a.edges.column_iter().flat_map(|ea| {
        b_edges
            .column_iter()
            .map(move |eb| ea.cross(&eb))
    });

    let mut best: Option<(Vector3<f64>, f64)> = None;
    for axis in face_axes.chain(edge_axes) {
        let norm = axis.norm();
        if norm < MIN_AXIS_NORM {
            continue;
        }
        let axis = axis / norm;
        let (a_min, a_max) = project(&axis, &a.vertices);
        let (b_min, b_max) = project(&axis, b_vertices);
        if b_min > a_max || b_max < a_min {
            return None;
        }

        // B sits on the +axis side of A when pushing it that way is cheaper.
        let forward = a_max - b_min;
        let backward = b_max - a_min;
        let (normal, depth) = if forward <= backward {
            (axis, forward)
        } else {
            (-axis, backward)
        };
        if best.is_none_or(|(_, d)| depth < d) {
            best = Some((normal, depth));
        }
    }
    best
}

fn project(axis: &Vector3<f64>, points: &Matrix3xX<f64>) -> (f64, f64) {
    let projections = axis.transpose() * points;
    (projections.min(), projections.max())
}

fn transform_points(pose: &Isometry3<f64>, points: &Matrix3xX<f64>) -> Matrix3xX<f64> {
    let mut out = pose.rotation.to_rotation_matrix().matrix() * points;
    for mut col in out.column_iter_mut() {
        col += pose.translation.vector;
    }
    out
}

/// Centre of the overlap between A's extents and the extents of B's vertices.
fn overlap_center(a: &ShapeNode, b_vertices: &Matrix3xX<f64>) -> Point3<f64> {
    let mut center = Vector3::zeros();
    for axis in 0..3 {
        let row = b_vertices.row(axis);
        let lo = a.min[axis].max(row.min());
        let hi = a.max[axis].min(row.max());
        center[axis] = if lo <= hi { (lo + hi) * 0.5 } else { (a.min[axis] + a.max[axis]) * 0.5 };
    }
    Point3::from(center)
}
