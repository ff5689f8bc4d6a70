//! Conversion settings.

use std::path::{Path, PathBuf};

use skp_math::{LengthUnit, UnitConverter};

/// Settings for reading a native model.
#[derive(Clone, Debug, PartialEq)]
pub struct ReadOptions {
    /// Ask the kernel to triangulate every face
    pub include_meshes: bool,

    /// Canonical unit of the produced document
    pub units: LengthUnit,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            include_meshes: false,
            units: LengthUnit::Meters,
        }
    }
}

impl ReadOptions {
    pub fn with_meshes(mut self, include_meshes: bool) -> Self {
        self.include_meshes = include_meshes;
        self
    }

    pub fn with_units(mut self, units: LengthUnit) -> Self {
        self.units = units;
        self
    }

    pub fn converter(&self) -> UnitConverter {
        UnitConverter::for_unit(self.units)
    }
}

/// Settings for writing a document into a native model.
#[derive(Clone, Debug, PartialEq)]
pub struct WriteOptions {
    /// Canonical unit the document is expressed in
    pub units: LengthUnit,

    /// Load texture images for textured materials
    pub write_textures: bool,

    /// Directory relative texture names are resolved against
    pub texture_dir: Option<PathBuf>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            units: LengthUnit::Meters,
            write_textures: true,
            texture_dir: None,
        }
    }
}

impl WriteOptions {
    pub fn with_units(mut self, units: LengthUnit) -> Self {
        self.units = units;
        self
    }

    pub fn with_textures(mut self, write_textures: bool) -> Self {
        self.write_textures = write_textures;
        self
    }

    pub fn with_texture_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.texture_dir = Some(dir.into());
        self
    }

    pub fn texture_dir(&self) -> Option<&Path> {
        self.texture_dir.as_deref()
    }

    pub fn converter(&self) -> UnitConverter {
        UnitConverter::for_unit(self.units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let read = ReadOptions::default();
        assert!(!read.include_meshes);
        assert_eq!(read.units, LengthUnit::Meters);
        assert!((read.converter().factor() - 0.0254).abs() < 1e-15);

        let write = WriteOptions::default();
        assert!(write.write_textures);
        assert!(write.texture_dir().is_none());
    }

    #[test]
    fn test_builders() {
        let read = ReadOptions::default()
            .with_meshes(true)
            .with_units(LengthUnit::Millimeters);
        assert!(read.include_meshes);
        assert!((read.converter().to_canonical(1.0) - 25.4).abs() < 1e-12);

        let write = WriteOptions::default()
            .with_textures(false)
            .with_texture_dir("/textures");
        assert!(!write.write_textures);
        assert_eq!(write.texture_dir(), Some(Path::new("/textures")));
    }
}
