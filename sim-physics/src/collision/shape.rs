//! Convex collision shapes arranged in a hierarchy.
//!
//! A shape is an arena of [`ShapeNode`]s with the root at index 0. Leaves
//! carry real geometry (a box or a convex hull); an inner node only holds the
//! box enclosing its children, which is what lets a query skip a whole
//! subtree.

use std::collections::BTreeSet;

use bevy::ecs::component::Component;
use bevy::log::warn;
use na::{Matrix3xX, Vector3};
use serde::{Deserialize, Serialize};

use crate::collision::ray::Aabb;
use crate::error::{Result, SimError};

/// Collision geometry as it appears in a fighter description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryData {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<GeometryKind>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<GeometryData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GeometryKind {
    BoundingBox {
        min: [f64; 3],
        max: [f64; 3],
    },
    ConvexHull {
        vertices: Vec<[f64; 3]>,
        /// Triangles, as vertex indices.
        faces: Vec<[usize; 3]>,
        /// Vertex index pairs. Taken from the triangle sides when empty.
        #[serde(default)]
        edges: Vec<[usize; 2]>,
    },
}

impl GeometryData {
    pub fn bounding_box(name: impl Into<String>, min: [f64; 3], max: [f64; 3]) -> Self {
        Self {
            name: name.into(),
            kind: Some(GeometryKind::BoundingBox { min, max }),
            children: Vec::new(),
        }
    }

    pub fn group(name: impl Into<String>, children: Vec<GeometryData>) -> Self {
        Self {
            name: name.into(),
            kind: None,
            children,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShapeId(pub usize);

#[derive(Debug, Clone, PartialEq)]
pub struct ShapeNode {
    pub name: String,
    /// Hull vertices, body frame.
    pub vertices: Matrix3xX<f64>,
    /// Candidate separating axes.
    pub face_normals: Matrix3xX<f64>,
    pub edges: Matrix3xX<f64>,
    pub min: Vector3<f64>,
    pub max: Vector3<f64>,
    pub children: Vec<ShapeId>,
}

impl ShapeNode {
    fn from_box(name: &str, min: Vector3<f64>, max: Vector3<f64>) -> Self {
        Self {
            name: name.to_string(),
            vertices: box_corners(&min, &max),
            face_normals: Matrix3xX::from_columns(&[Vector3::x(), Vector3::y(), Vector3::z()]),
            edges: Matrix3xX::from_columns(&[Vector3::x(), Vector3::y(), Vector3::z()]),
            min,
            max,
            children: Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn scale(&self) -> Vector3<f64> {
        self.max - self.min
    }

    pub fn center(&self) -> Vector3<f64> {
        (self.min + self.max) * 0.5
    }

    pub fn aabb(&self) -> Aabb {
        Aabb::new(self.min, self.max)
    }
}

#[derive(Debug, Clone, PartialEq, Component)]
pub struct CollisionShape {
    nodes: Vec<ShapeNode>,
}

impl CollisionShape {
    pub const ROOT: ShapeId = ShapeId(0);

    pub fn from_geometry(data: &GeometryData) -> Result<Self> {
        let mut nodes = Vec::new();
        build_node(data, &mut nodes)?;
        Ok(Self { nodes })
    }

    /// A single box leaf.
    pub fn from_box(name: &str, min: Vector3<f64>, max: Vector3<f64>) -> Result<Self> {
        Self::from_geometry(&GeometryData::bounding_box(name, min.into(), max.into()))
    }

    pub fn root(&self) -> &ShapeNode {
        &self.nodes[Self::ROOT.0]
    }

    /// Panics if `id` does not come from this shape.
    pub fn node(&self, id: ShapeId) -> &ShapeNode {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<ShapeId> {
        self.nodes.iter().position(|n| n.name == name).map(ShapeId)
    }

    /// Leaf nodes, in depth-first order.
    pub fn leaves(&self) -> impl Iterator<Item = &ShapeNode> {
        self.nodes.iter().filter(|n| n.is_leaf())
    }
}

/// Builds `data` into `nodes` depth first, the node before its children.
fn build_node(data: &GeometryData, nodes: &mut Vec<ShapeNode>) -> Result<ShapeId> {
    let id = ShapeId(nodes.len());

    if data.children.is_empty() {
        let kind = data
            .kind
            .as_ref()
            .ok_or_else(|| degenerate(&data.name, "leaf has no geometry"))?;
        nodes.push(build_leaf(&data.name, kind)?);
        return Ok(id);
    }

    if data.kind.is_some() {
        return Err(degenerate(
            &data.name,
            "a node with children cannot carry its own geometry",
        ));
    }

    // Reserve the slot so the parent precedes its subtree.
    nodes.push(ShapeNode::from_box(&data.name, Vector3::zeros(), Vector3::zeros()));
    let mut children = Vec::with_capacity(data.children.len());
    let mut min = Vector3::repeat(f64::INFINITY);
    let mut max = Vector3::repeat(f64::NEG_INFINITY);
    for child in &data.children {
        let child_id = build_node(child, nodes)?;
        min = min.inf(&nodes[child_id.0].min);
        max = max.sup(&nodes[child_id.0].max);
        children.push(child_id);
    }

    let mut node = ShapeNode::from_box(&data.name, min, max);
    node.children = children;
    nodes[id.0] = node;
    Ok(id)
}

fn build_leaf(name: &str, kind: &GeometryKind) -> Result<ShapeNode> {
    match kind {
        GeometryKind::BoundingBox { min, max } => {
            let min = Vector3::from(*min);
            let max = Vector3::from(*max);
            if min.iter().chain(max.iter()).any(|x| !x.is_finite()) {
                return Err(degenerate(name, "box extents are not finite"));
            }
            if (0..3).any(|i| min[i] > max[i]) {
                return Err(degenerate(name, "box min exceeds max"));
            }
            Ok(ShapeNode::from_box(name, min, max))
        }
        GeometryKind::ConvexHull {
            vertices,
            faces,
            edges,
        } => build_hull(name, vertices, faces, edges),
    }
}

fn build_hull(
    name: &str,
    vertices: &[[f64; 3]],
    faces: &[[usize; 3]],
    edges: &[[usize; 2]],
) -> Result<ShapeNode> {
    if vertices.is_empty() {
        return Err(degenerate(name, "hull has no vertices"));
    }
    if faces.is_empty() {
        return Err(degenerate(name, "hull has no faces"));
    }
    let points: Vec<Vector3<f64>> = vertices.iter().map(|v| Vector3::from(*v)).collect();
    if points.iter().any(|p| p.iter().any(|x| !x.is_finite())) {
        return Err(degenerate(name, "hull vertices are not finite"));
    }
    let vertex = |i: usize| {
        points
            .get(i)
            .ok_or_else(|| degenerate(name, &format!("vertex index {} out of range", i)))
    };

    let mut normals = Vec::with_capacity(faces.len());
    for face in faces {
        let (a, b, c) = (vertex(face[0])?, vertex(face[1])?, vertex(face[2])?);
        let n = (b - a).cross(&(c - a));
        let norm = n.norm();
        if norm < f64::EPSILON {
            return Err(degenerate(name, &format!("face {:?} has no area", face)));
        }
        normals.push(n / norm);
    }

    let pairs: BTreeSet<(usize, usize)> = if edges.is_empty() {
        faces
            .iter()
            .flat_map(|f| [(f[0], f[1]), (f[1], f[2]), (f[0], f[2])])
            .map(|(i, j)| (i.min(j), i.max(j)))
            .collect()
    } else {
        edges.iter().map(|e| (e[0].min(e[1]), e[0].max(e[1]))).collect()
    };
    let mut directions = Vec::with_capacity(pairs.len());
    for (i, j) in pairs {
        let d = vertex(j)? - vertex(i)?;
        let norm = d.norm();
        if norm < f64::EPSILON {
            return Err(degenerate(name, &format!("edge ({}, {}) has no length", i, j)));
        }
        directions.push(d / norm);
    }

    let vertices = Matrix3xX::from_columns(&points);
    let min = points.iter().fold(Vector3::repeat(f64::INFINITY), |m, p| m.inf(p));
    let max = points.iter().fold(Vector3::repeat(f64::NEG_INFINITY), |m, p| m.sup(p));
    Ok(ShapeNode {
        name: name.to_string(),
        vertices,
        face_normals: Matrix3xX::from_columns(&normals),
        edges: Matrix3xX::from_columns(&directions),
        min,
        max,
        children: Vec::new(),
    })
}

/// The 8 corners of an axis-aligned box.
pub fn box_corners(min: &Vector3<f64>, max: &Vector3<f64>) -> Matrix3xX<f64> {
    let mut corners = Matrix3xX::zeros(8);
    for i in 0..8 {
        let pick = |axis: usize| if i & (1 << axis) == 0 { min[axis] } else { max[axis] };
        corners.set_column(i, &Vector3::new(pick(0), pick(1), pick(2)));
    }
    corners
}

fn degenerate(name: &str, reason: &str) -> SimError {
    warn!("rejecting collision shape '{}': {}", name, reason);
    SimError::DegenerateGeometry {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tetrahedron() -> GeometryData {
        GeometryData {
            name: "tip".into(),
            kind: Some(GeometryKind::ConvexHull {
                vertices: vec![
                    [0.0, 0.0, 0.0],
                    [1.0, 0.0, 0.0],
                    [0.0, 1.0, 0.0],
                    [0.0, 0.0, 1.0],
                ],
                faces: vec![[0, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3]],
                edges: vec![],
            }),
            children: vec![],
        }
    }

    #[test]
    fn hull_derives_normals_and_edges() {
        let shape = CollisionShape::from_geometry(&tetrahedron()).unwrap();
        let root = shape.root();
        assert_eq!(root.vertices.ncols(), 4);
        assert_eq!(root.face_normals.ncols(), 4);
        // Six unique sides, shared sides counted once.
        assert_eq!(root.edges.ncols(), 6);
        for n in root.face_normals.column_iter() {
            assert_relative_eq!(n.norm(), 1.0, epsilon = 1e-12);
        }
        assert_eq!(root.min, Vector3::zeros());
        assert_eq!(root.max, Vector3::repeat(1.0));
    }

    #[test]
    fn group_encloses_children_and_precedes_them() {
        let data = GeometryData::group(
            "fighter",
            vec![
                GeometryData::bounding_box("body", [-2.0, -0.5, -0.5], [2.0, 0.5, 0.5]),
                GeometryData::group(
                    "wings",
                    vec![
                        GeometryData::bounding_box("left", [-1.0, 0.5, -0.1], [1.0, 3.0, 0.1]),
                        GeometryData::bounding_box("right", [-1.0, -3.0, -0.1], [1.0, -0.5, 0.1]),
                    ],
                ),
            ],
        );
        let shape = CollisionShape::from_geometry(&data).unwrap();
        assert_eq!(shape.len(), 5);
        assert_eq!(shape.root().name, "fighter");
        assert_eq!(shape.root().min, Vector3::new(-2.0, -3.0, -0.5));
        assert_eq!(shape.root().max, Vector3::new(2.0, 3.0, 0.5));
        assert_eq!(shape.root().vertices.ncols(), 8);

        let wings = shape.find("wings").unwrap();
        assert_eq!(shape.node(wings).children.len(), 2);
        assert!(shape.node(wings).children.iter().all(|c| c.0 > wings.0));
        assert!(shape.node(shape.find("left").unwrap()).is_leaf());

        let leaves: Vec<&str> = shape.leaves().map(|n| n.name.as_str()).collect();
        assert_eq!(leaves, ["body", "left", "right"]);
    }

    #[test]
    fn degenerate_geometry_is_rejected() {
        let empty = GeometryData {
            name: "nothing".into(),
            kind: None,
            children: vec![],
        };
        assert!(matches!(
            CollisionShape::from_geometry(&empty),
            Err(SimError::DegenerateGeometry { .. })
        ));

        let flat = GeometryData {
            name: "flat".into(),
            kind: Some(GeometryKind::ConvexHull {
                vertices: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0]],
                faces: vec![[0, 1, 2]],
                edges: vec![],
            }),
            children: vec![],
        };
        assert!(CollisionShape::from_geometry(&flat).is_err());

        let mut bad_index = tetrahedron();
        if let Some(GeometryKind::ConvexHull { faces, .. }) = &mut bad_index.kind {
            faces.push([0, 1, 9]);
        }
        assert!(CollisionShape::from_geometry(&bad_index).is_err());

        let inverted = GeometryData::bounding_box("inverted", [1.0, 0.0, 0.0], [0.0, 1.0, 1.0]);
        assert!(CollisionShape::from_geometry(&inverted).is_err());
    }

    #[test]
    fn parses_from_json() {
        let data: GeometryData = serde_json::from_str(
            r#"{
                "name": "fighter",
                "children": [
                    {"name": "hull", "kind": {"type": "bounding_box", "min": [-1, -1, -1], "max": [1, 1, 1]}}
                ]
            }"#,
        )
        .unwrap();
        let shape = CollisionShape::from_geometry(&data).unwrap();
        assert_eq!(shape.len(), 2);
    }
}
