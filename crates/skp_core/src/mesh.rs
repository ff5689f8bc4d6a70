//! Triangulated face geometry.
//!
//! Produced by the kernel's triangulation helper when a load asks for
//! meshes. Positions are in canonical units.

use serde::{Deserialize, Serialize};
use skp_math::{Aabb, DVec3, Transform};

/// Triangle mesh with per-vertex normals.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    /// Vertex positions (one DVec3 per vertex)
    pub positions: Vec<DVec3>,

    /// Vertex normals (same length as `positions` once populated)
    pub normals: Vec<DVec3>,

    /// Triangles as vertex index triples, counter-clockwise
    pub triangles: Vec<[u32; 3]>,
}

impl Mesh {
    pub fn new(positions: Vec<DVec3>, normals: Vec<DVec3>, triangles: Vec<[u32; 3]>) -> Self {
        Self {
            positions,
            normals,
            triangles,
        }
    }

    /// Build from a flat index list; a trailing partial triangle is dropped.
    pub fn from_flat_indices(positions: Vec<DVec3>, normals: Vec<DVec3>, indices: &[u32]) -> Self {
        if indices.len() % 3 != 0 {
            log::warn!(
                "Index count {} is not a multiple of 3, dropping the remainder",
                indices.len()
            );
        }
        let triangles = indices
            .chunks_exact(3)
            .map(|t| [t[0], t[1], t[2]])
            .collect();
        Self::new(positions, normals, triangles)
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Triangle indices as one flat slice (i0, i1, i2, i0, ...).
    pub fn indices(&self) -> &[u32] {
        bytemuck::cast_slice(&self.triangles)
    }

    /// Positions as a flat slice of doubles (x, y, z, x, ...).
    pub fn flat_positions(&self) -> &[f64] {
        bytemuck::cast_slice(&self.positions)
    }

    pub fn bounds(&self) -> Aabb {
        Aabb::from_points(self.positions.iter().copied())
    }

    /// Recompute smooth normals by averaging the area-weighted triangle normals.
    pub fn compute_normals(&mut self) {
        let vertex_count = self.positions.len();
        let mut normals = vec![DVec3::ZERO; vertex_count];

        for triangle in &self.triangles {
            let [i0, i1, i2] = triangle.map(|i| i as usize);
            if i0 >= vertex_count || i1 >= vertex_count || i2 >= vertex_count {
                continue;
            }

            let p0 = self.positions[i0];
            let face_normal = (self.positions[i1] - p0).cross(self.positions[i2] - p0);

            normals[i0] += face_normal;
            normals[i1] += face_normal;
            normals[i2] += face_normal;
        }

        for normal in &mut normals {
            *normal = normal.try_normalize().unwrap_or(DVec3::Z);
        }

        self.normals = normals;
    }

    /// Recompute normals if they are missing or do not match the vertices.
    pub fn ensure_normals(&mut self) {
        if self.normals.len() != self.positions.len() {
            log::debug!(
                "Normals array length ({}) doesn't match vertex count ({}), computing smooth normals",
                self.normals.len(),
                self.positions.len()
            );
            self.compute_normals();
        }
    }

    /// Copy of the mesh with `transform` applied to positions and normals.
    pub fn transformed(&self, transform: &Transform) -> Mesh {
        Mesh {
            positions: self.positions.iter().map(|p| transform.apply(*p)).collect(),
            normals: self
                .normals
                .iter()
                .map(|n| transform.apply_normal(*n))
                .collect(),
            triangles: self.triangles.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> Mesh {
        Mesh::from_flat_indices(
            vec![
                DVec3::new(0.0, 0.0, 0.0),
                DVec3::new(1.0, 0.0, 0.0),
                DVec3::new(1.0, 1.0, 0.0),
                DVec3::new(0.0, 1.0, 0.0),
            ],
            Vec::new(),
            &[0, 1, 2, 0, 2, 3],
        )
    }

    #[test]
    fn test_mesh_creation() {
        let mesh = quad();
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.indices(), &[0, 1, 2, 0, 2, 3]);
        assert_eq!(mesh.flat_positions().len(), 12);
    }

    #[test]
    fn test_partial_triangle_dropped() {
        let mesh = Mesh::from_flat_indices(vec![DVec3::ZERO; 3], Vec::new(), &[0, 1, 2, 0]);
        assert_eq!(mesh.triangle_count(), 1);
    }

    #[test]
    fn test_compute_normals_ccw() {
        let mut mesh = quad();
        mesh.ensure_normals();
        assert_eq!(mesh.normals.len(), 4);
        for normal in &mesh.normals {
            assert!((normal.z - 1.0).abs() < 0.001);
        }
    }

    #[test]
    fn test_bounds_computation() {
        let mesh = Mesh::new(
            vec![
                DVec3::new(-1.0, -2.0, -3.0),
                DVec3::new(4.0, 5.0, 6.0),
                DVec3::new(0.0, 0.0, 0.0),
            ],
            Vec::new(),
            vec![[0, 1, 2]],
        );
        let bounds = mesh.bounds();
        assert!((bounds.min.x - (-1.0)).abs() < 0.001);
        assert!((bounds.max.y - 5.0).abs() < 0.001);
        assert!((bounds.max.z - 6.0).abs() < 0.001);
    }

    #[test]
    fn test_transformed() {
        let mut mesh = quad();
        mesh.compute_normals();
        let moved = mesh.transformed(&Transform::from_translation(DVec3::new(0.0, 0.0, 2.0)));
        assert!((moved.positions[2] - DVec3::new(1.0, 1.0, 2.0)).length() < 1e-12);
        assert!((moved.normals[0] - DVec3::Z).length() < 1e-12);
    }
}
