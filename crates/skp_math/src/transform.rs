// Affine transforms in the kernel's column-major, reciprocal-scale layout.
//
// A transform is 16 doubles, column-major. Elements 12..=14 hold the
// translation and element 15 holds the reciprocal of a uniform scale, the
// same layout the kernel uses. Canonical transforms differ from native ones
// only in the unit of the translation column.

use glam::{DMat4, DVec3};
use serde::{Deserialize, Serialize};

use crate::UnitConverter;

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    values: [f64; 16],
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        values: [
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ],
    };

    /// Wrap 16 column-major canonical values.
    pub fn from_cols_array(values: [f64; 16]) -> Self {
        Self { values }
    }

    /// The 16 column-major canonical values.
    pub fn to_cols_array(&self) -> [f64; 16] {
        self.values
    }

    /// Convert a native transform, scaling only the translation column.
    pub fn from_native(native: &[f64; 16], units: &UnitConverter) -> Self {
        let mut values = *native;
        for value in &mut values[12..15] {
            *value = units.to_canonical(*value);
        }
        Self { values }
    }

    /// Convert back to the native layout, scaling only the translation column.
    pub fn to_native(&self, units: &UnitConverter) -> [f64; 16] {
        let mut values = self.values;
        for value in &mut values[12..15] {
            *value = units.from_canonical(*value);
        }
        values
    }

    /// Pure translation (canonical units).
    pub fn from_translation(translation: DVec3) -> Self {
        let mut values = Self::IDENTITY.values;
        values[12] = translation.x;
        values[13] = translation.y;
        values[14] = translation.z;
        Self { values }
    }

    /// Uniform scale expressed the kernel's way, through the trailing element.
    pub fn from_uniform_scale(scale: f64) -> Self {
        let mut values = Self::IDENTITY.values;
        values[15] = 1.0 / scale;
        Self { values }
    }

    pub fn from_matrix(matrix: DMat4) -> Self {
        Self {
            values: matrix.to_cols_array(),
        }
    }

    /// The homogeneous 4x4 matrix.
    pub fn matrix(&self) -> DMat4 {
        DMat4::from_cols_array(&self.values)
    }

    /// Raw translation column (before the uniform scale is applied).
    pub fn translation(&self) -> DVec3 {
        DVec3::new(self.values[12], self.values[13], self.values[14])
    }

    /// Effective uniform scale, the reciprocal of the trailing element.
    pub fn scale_factor(&self) -> f64 {
        1.0 / self.values[15]
    }

    /// Compose `parent ∘ local`: `local` is applied first, then `parent`.
    pub fn compose(parent: &Transform, local: &Transform) -> Transform {
        Transform::from_matrix(parent.matrix() * local.matrix())
    }

    /// Transform a point.
    ///
    /// Rotation and skew first, then translation, then the uniform scale on
    /// the result. Scaling the input first gives wrong answers whenever the
    /// translation is non-zero.
    pub fn apply(&self, point: DVec3) -> DVec3 {
        let m = &self.values;
        let rotated_translated = DVec3::new(
            m[0] * point.x + m[4] * point.y + m[8] * point.z + m[12],
            m[1] * point.x + m[5] * point.y + m[9] * point.z + m[13],
            m[2] * point.x + m[6] * point.y + m[10] * point.z + m[14],
        );
        rotated_translated * self.scale_factor()
    }

    /// Transform a direction (no translation, no uniform scale), renormalized.
    pub fn apply_normal(&self, normal: DVec3) -> DVec3 {
        let m = &self.values;
        DVec3::new(
            m[0] * normal.x + m[4] * normal.y + m[8] * normal.z,
            m[1] * normal.x + m[5] * normal.y + m[9] * normal.z,
            m[2] * normal.x + m[6] * normal.y + m[10] * normal.z,
        )
        .normalize_or_zero()
    }

    pub fn inverse(&self) -> Transform {
        Transform::from_matrix(self.matrix().inverse())
    }

    pub fn is_identity(&self, tolerance: f64) -> bool {
        self.values
            .iter()
            .zip(Self::IDENTITY.values.iter())
            .all(|(a, b)| (a - b).abs() <= tolerance)
    }

    /// Element-wise comparison within `tolerance`.
    pub fn abs_diff_eq(&self, other: &Transform, tolerance: f64) -> bool {
        self.values
            .iter()
            .zip(other.values.iter())
            .all(|(a, b)| (a - b).abs() <= tolerance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    fn rotation_z(angle: f64) -> Transform {
        Transform::from_matrix(DMat4::from_rotation_z(angle))
    }

    #[test]
    fn test_apply_identity() {
        let point = DVec3::new(1.0, 2.0, 3.0);
        assert_eq!(Transform::IDENTITY.apply(point), point);
    }

    #[test]
    fn test_apply_translation() {
        let t = Transform::from_translation(DVec3::new(10.0, 20.0, 30.0));
        assert_eq!(t.apply(DVec3::new(1.0, 2.0, 3.0)), DVec3::new(11.0, 22.0, 33.0));
    }

    #[test]
    fn test_apply_scales_after_translating() {
        // Trailing element 0.5 means a uniform scale of 2.
        let mut values = Transform::from_translation(DVec3::new(1.0, 0.0, 0.0)).to_cols_array();
        values[15] = 0.5;
        let t = Transform::from_cols_array(values);

        let p = t.apply(DVec3::new(1.0, 0.0, 0.0));
        // (1 + 1) * 2, not 1 * 2 + 1
        assert!((p - DVec3::new(4.0, 0.0, 0.0)).length() < 1e-12);
        assert!((t.scale_factor() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_compose_applies_local_first() {
        let parent = Transform::from_translation(DVec3::new(5.0, 0.0, 0.0));
        let local = rotation_z(FRAC_PI_2);
        let composed = Transform::compose(&parent, &local);

        let p = composed.apply(DVec3::X);
        // rotate X onto Y, then move by +5 on X
        assert!((p - DVec3::new(5.0, 1.0, 0.0)).length() < 1e-12);
    }

    #[test]
    fn test_compose_matches_nested_apply_with_scale() {
        let mut parent_values = rotation_z(0.3).to_cols_array();
        parent_values[12] = 2.0;
        parent_values[13] = -1.0;
        parent_values[15] = 0.25;
        let parent = Transform::from_cols_array(parent_values);

        let mut local_values = rotation_z(-1.1).to_cols_array();
        local_values[14] = 7.0;
        local_values[15] = 2.0;
        let local = Transform::from_cols_array(local_values);

        let point = DVec3::new(0.5, -3.0, 1.25);
        let nested = parent.apply(local.apply(point));
        let composed = Transform::compose(&parent, &local).apply(point);
        assert!((nested - composed).length() < 1e-9);
    }

    #[test]
    fn test_native_conversion_touches_translation_only() {
        let units = UnitConverter::INCHES_TO_METERS;
        let mut native = rotation_z(0.7).to_cols_array();
        native[12] = 100.0;
        native[13] = 200.0;
        native[14] = -300.0;
        native[15] = 0.5;

        let canonical = Transform::from_native(&native, &units);
        let values = canonical.to_cols_array();
        for i in 0..12 {
            assert_eq!(values[i], native[i]);
        }
        assert_eq!(values[15], 0.5);
        assert!((canonical.translation() - DVec3::new(2.54, 5.08, -7.62)).length() < 1e-12);

        let back = Transform::from_cols_array(canonical.to_native(&units));
        assert!(back.abs_diff_eq(&Transform::from_cols_array(native), 1e-9));
        assert!(!back.abs_diff_eq(&canonical, 1e-9));
    }

    #[test]
    fn test_inverse_roundtrip() {
        let mut values = rotation_z(1.0).to_cols_array();
        values[12] = 3.0;
        values[15] = 0.5;
        let t = Transform::from_cols_array(values);

        let point = DVec3::new(1.0, 2.0, 3.0);
        let back = t.inverse().apply(t.apply(point));
        assert!((back - point).length() < 1e-9);
        assert!(Transform::compose(&t, &t.inverse()).is_identity(1e-9));
    }
}
