//! Helpers for planar polygons given as closed point rings.
//!
//! Rings are implicit: the last point connects back to the first.

use glam::DVec3;

/// Default tolerance for planarity and degeneracy checks (canonical units).
pub const PLANE_TOLERANCE: f64 = 1e-6;

/// Newell's method: twice the area-weighted normal of a ring, unnormalized.
pub fn newell_vector(points: &[DVec3]) -> DVec3 {
    let mut n = DVec3::ZERO;
    for (i, current) in points.iter().enumerate() {
        let next = points[(i + 1) % points.len()];
        n.x += (current.y - next.y) * (current.z + next.z);
        n.y += (current.z - next.z) * (current.x + next.x);
        n.z += (current.x - next.x) * (current.y + next.y);
    }
    n
}

/// Unit normal of a ring, or `None` when the ring encloses no area.
pub fn normal(points: &[DVec3]) -> Option<DVec3> {
    if points.len() < 3 {
        return None;
    }
    newell_vector(points).try_normalize()
}

/// Area of a ring measured against `reference`.
///
/// Positive when the ring winds counter-clockwise around `reference`.
pub fn signed_area(points: &[DVec3], reference: DVec3) -> f64 {
    0.5 * newell_vector(points).dot(reference)
}

/// Unsigned area of a ring.
pub fn area(points: &[DVec3]) -> f64 {
    0.5 * newell_vector(points).length()
}

/// Largest distance from any point to the ring's best-fit plane.
pub fn plane_deviation(points: &[DVec3]) -> Option<f64> {
    let n = normal(points)?;
    let centroid = points.iter().copied().sum::<DVec3>() / points.len() as f64;
    Some(
        points
            .iter()
            .map(|p| (*p - centroid).dot(n).abs())
            .fold(0.0, f64::max),
    )
}

pub fn is_planar(points: &[DVec3], tolerance: f64) -> bool {
    plane_deviation(points).is_some_and(|d| d <= tolerance)
}

/// True if two points of the ring coincide within `tolerance`.
pub fn has_coincident_points(points: &[DVec3], tolerance: f64) -> bool {
    for (i, a) in points.iter().enumerate() {
        for b in &points[i + 1..] {
            if a.distance(*b) <= tolerance {
                return true;
            }
        }
    }
    false
}

/// Fan triangulation of a convex ring with `count` corners.
pub fn fan_triangles(count: usize) -> Vec<[usize; 3]> {
    if count < 3 {
        return Vec::new();
    }
    (1..count - 1).map(|i| [0, i, i + 1]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_square() -> Vec<DVec3> {
        vec![
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(1.0, 1.0, 0.0),
            DVec3::new(0.0, 1.0, 0.0),
        ]
    }

    #[test]
    fn test_square_normal_and_area() {
        let square = unit_square();
        let n = normal(&square).unwrap();
        assert!((n - DVec3::Z).length() < 1e-12);
        assert!((area(&square) - 1.0).abs() < 1e-12);
        assert!((signed_area(&square, DVec3::Z) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_reversed_ring_flips_sign() {
        let mut square = unit_square();
        square.reverse();
        assert!((signed_area(&square, DVec3::Z) + 1.0).abs() < 1e-12);
        assert!((normal(&square).unwrap() + DVec3::Z).length() < 1e-12);
    }

    #[test]
    fn test_collinear_ring_has_no_normal() {
        let line = [DVec3::ZERO, DVec3::X, DVec3::X * 2.0];
        assert!(normal(&line).is_none());
        assert!(!is_planar(&line, PLANE_TOLERANCE));
    }

    #[test]
    fn test_non_planar_ring() {
        let mut square = unit_square();
        square[2].z = 0.5;
        assert!(!is_planar(&square, PLANE_TOLERANCE));
        assert!(is_planar(&unit_square(), PLANE_TOLERANCE));
    }

    #[test]
    fn test_coincident_points() {
        let mut square = unit_square();
        assert!(!has_coincident_points(&square, PLANE_TOLERANCE));
        square[3] = square[0];
        assert!(has_coincident_points(&square, PLANE_TOLERANCE));
    }

    #[test]
    fn test_fan_triangles() {
        assert!(fan_triangles(2).is_empty());
        assert_eq!(fan_triangles(3), vec![[0, 1, 2]]);
        assert_eq!(fan_triangles(5), vec![[0, 1, 2], [0, 2, 3], [0, 3, 4]]);
    }
}
