// Re-export glam for convenience
pub use glam::*;

// skp math types
mod aabb;
pub mod polygon;
mod transform;
mod units;

pub use aabb::Aabb;
pub use transform::Transform;
pub use units::{LengthUnit, UnitConverter};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dvec3_creation() {
        let v = DVec3::new(1.0, 2.0, 3.0);
        assert_eq!(v.x, 1.0);
        assert_eq!(v.y, 2.0);
        assert_eq!(v.z, 3.0);
    }

    #[test]
    fn test_dvec3_operations() {
        let a = DVec3::new(1.0, 2.0, 3.0);
        let b = DVec3::new(4.0, 5.0, 6.0);
        let c = a + b;
        assert_eq!(c, DVec3::new(5.0, 7.0, 9.0));
    }
}
