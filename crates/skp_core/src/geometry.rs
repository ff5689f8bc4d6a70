//! Faces, loops, edges and curves in canonical units.

use serde::{Deserialize, Serialize};
use skp_math::{polygon, DVec3, Transform};

use crate::material::MaterialId;
use crate::mesh::Mesh;

/// A straight segment between two points.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub start: DVec3,
    pub end: DVec3,
    /// Layer name, empty when the edge has no layer
    #[serde(default)]
    pub layer: String,
    /// True if the edge is a segment of an arc curve
    #[serde(default)]
    pub is_arc_segment: bool,
}

impl Edge {
    pub fn new(start: DVec3, end: DVec3) -> Self {
        Self {
            start,
            end,
            layer: String::new(),
            is_arc_segment: false,
        }
    }

    pub fn length(&self) -> f64 {
        self.start.distance(self.end)
    }

    pub fn transformed(&self, transform: &Transform) -> Edge {
        Edge {
            start: transform.apply(self.start),
            end: transform.apply(self.end),
            ..self.clone()
        }
    }
}

/// Closed ring of edges: each edge ends where the next one starts and the
/// last one ends at the first one's start.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Loop {
    pub edges: Vec<Edge>,
}

impl Loop {
    pub fn new(edges: Vec<Edge>) -> Self {
        Self { edges }
    }

    /// Closed loop through `points` in order.
    pub fn from_points(points: &[DVec3]) -> Self {
        let edges = points
            .iter()
            .enumerate()
            .map(|(i, p)| Edge::new(*p, points[(i + 1) % points.len()]))
            .collect();
        Self { edges }
    }

    /// Corner points in order (the start of every edge).
    pub fn points(&self) -> Vec<DVec3> {
        self.edges.iter().map(|e| e.start).collect()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Check the chaining condition within `tolerance`.
    pub fn is_closed(&self, tolerance: f64) -> bool {
        if self.edges.is_empty() {
            return false;
        }
        self.edges.iter().enumerate().all(|(i, edge)| {
            let next = &self.edges[(i + 1) % self.edges.len()];
            edge.end.distance(next.start) <= tolerance
        })
    }

    pub fn transformed(&self, transform: &Transform) -> Loop {
        Loop {
            edges: self.edges.iter().map(|e| e.transformed(transform)).collect(),
        }
    }
}

/// Ordered chain of edges read as one unit.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Curve {
    pub edges: Vec<Edge>,
    pub is_arc: bool,
}

impl Curve {
    /// Open polyline through `points`.
    pub fn from_points(points: &[DVec3]) -> Self {
        Self {
            edges: points.windows(2).map(|w| Edge::new(w[0], w[1])).collect(),
            is_arc: false,
        }
    }

    pub fn points(&self) -> Vec<DVec3> {
        let mut points: Vec<DVec3> = self.edges.iter().map(|e| e.start).collect();
        if let Some(last) = self.edges.last() {
            points.push(last.end);
        }
        points
    }
}

/// Hole ring cut into a face by a glued component.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Opening {
    pub points: Vec<DVec3>,
}

/// A planar polygon with optional holes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Face {
    /// Stable kernel id (0 for faces built in memory)
    #[serde(default)]
    pub persistent_id: i64,

    /// Boundary loop
    pub outer_loop: Loop,

    /// Hole loops
    #[serde(default)]
    pub inner_loops: Vec<Loop>,

    /// Openings cut by glued components
    #[serde(default)]
    pub openings: Vec<Opening>,

    /// Boundary vertices in outer loop order
    pub vertices: Vec<DVec3>,

    /// Unit normal
    pub normal: DVec3,

    /// Area with holes removed
    pub area: f64,

    #[serde(default)]
    pub front_material: MaterialId,

    #[serde(default)]
    pub back_material: MaterialId,

    /// Layer name, empty when the face has no layer
    #[serde(default)]
    pub layer: String,

    /// Triangulation, present only if requested on load
    #[serde(default)]
    pub mesh: Option<Mesh>,
}

impl Face {
    /// Face bounded by `points`; normal and area follow the winding.
    pub fn from_points(points: &[DVec3]) -> Self {
        let normal = polygon::normal(points).unwrap_or(DVec3::Z);
        Self {
            persistent_id: 0,
            outer_loop: Loop::from_points(points),
            inner_loops: Vec::new(),
            openings: Vec::new(),
            vertices: points.to_vec(),
            normal,
            area: polygon::area(points),
            front_material: MaterialId::NONE,
            back_material: MaterialId::NONE,
            layer: String::new(),
            mesh: None,
        }
    }

    /// Add a hole and subtract its area.
    pub fn with_hole(mut self, points: &[DVec3]) -> Self {
        self.area -= polygon::area(points);
        self.inner_loops.push(Loop::from_points(points));
        self
    }

    pub fn with_materials(mut self, front: MaterialId, back: MaterialId) -> Self {
        self.front_material = front;
        self.back_material = back;
        self
    }

    pub fn with_layer(mut self, layer: impl Into<String>) -> Self {
        self.layer = layer.into();
        self
    }

    /// Boundary points, taken from the outer loop.
    pub fn outer_points(&self) -> Vec<DVec3> {
        self.outer_loop.points()
    }

    /// Copy of the face placed by `transform`.
    ///
    /// Area scales with the square of the uniform scale.
    pub fn transformed(&self, transform: &Transform) -> Face {
        let scale = transform.scale_factor();
        Face {
            outer_loop: self.outer_loop.transformed(transform),
            inner_loops: self
                .inner_loops
                .iter()
                .map(|l| l.transformed(transform))
                .collect(),
            openings: self
                .openings
                .iter()
                .map(|o| Opening {
                    points: o.points.iter().map(|p| transform.apply(*p)).collect(),
                })
                .collect(),
            vertices: self.vertices.iter().map(|p| transform.apply(*p)).collect(),
            normal: transform.apply_normal(self.normal),
            area: self.area * scale * scale,
            mesh: self.mesh.as_ref().map(|m| m.transformed(transform)),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(size: f64) -> Vec<DVec3> {
        vec![
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(size, 0.0, 0.0),
            DVec3::new(size, size, 0.0),
            DVec3::new(0.0, size, 0.0),
        ]
    }

    #[test]
    fn test_loop_from_points_is_closed() {
        let lp = Loop::from_points(&square(1.0));
        assert_eq!(lp.len(), 4);
        assert!(lp.is_closed(1e-12));
        assert_eq!(lp.edges[3].end, DVec3::ZERO);
        assert_eq!(lp.points(), square(1.0));
    }

    #[test]
    fn test_open_loop_detected() {
        let mut lp = Loop::from_points(&square(1.0));
        lp.edges[3].end = DVec3::new(0.5, 0.0, 0.0);
        assert!(!lp.is_closed(1e-9));
        assert!(!Loop::default().is_closed(1e-9));
    }

    #[test]
    fn test_face_with_hole() {
        let hole: Vec<DVec3> = square(1.0)
            .into_iter()
            .map(|p| p + DVec3::new(1.0, 1.0, 0.0))
            .collect();
        let face = Face::from_points(&square(4.0)).with_hole(&hole);
        assert!((face.area - 15.0).abs() < 1e-12);
        assert!((face.normal - DVec3::Z).length() < 1e-12);
        assert_eq!(face.inner_loops.len(), 1);
        assert_eq!(face.vertices.len(), 4);
    }

    #[test]
    fn test_face_transformed_scales_area() {
        let face = Face::from_points(&square(1.0));
        let mut values = Transform::from_translation(DVec3::new(0.0, 0.0, 1.0)).to_cols_array();
        values[15] = 0.5;
        let moved = face.transformed(&Transform::from_cols_array(values));
        assert!((moved.area - 4.0).abs() < 1e-12);
        assert!((moved.vertices[0] - DVec3::new(0.0, 0.0, 2.0)).length() < 1e-12);
    }

    #[test]
    fn test_curve_points() {
        let points = [DVec3::ZERO, DVec3::X, DVec3::new(1.0, 1.0, 0.0)];
        let curve = Curve::from_points(&points);
        assert_eq!(curve.edges.len(), 2);
        assert_eq!(curve.points(), points.to_vec());
    }
}
