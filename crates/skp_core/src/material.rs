//! Materials and textures of a document.
//!
//! Materials are unique by name. Faces and drawing elements refer to them
//! through a [`MaterialId`] into the document's [`MaterialTable`]; id zero is
//! the shared "no material" sentinel.

use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// 8-bit RGBA color, as stored by the kernel.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Pod, Zeroable, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Opaque color.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }
}

/// Texture image attached to a material.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Texture {
    /// Image file name as recorded by the kernel
    pub name: String,

    /// Image width in pixels
    pub width: usize,

    /// Image height in pixels
    pub height: usize,

    /// Horizontal repeat scale
    pub s_scale: f64,

    /// Vertical repeat scale
    pub t_scale: f64,

    /// Average color of the image
    pub average_color: Color,

    /// Whether the alpha channel is used
    pub use_alpha: bool,
}

/// A named surface material.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Material {
    /// Unique name within a document
    pub name: String,

    /// Base color (RGBA)
    pub color: Color,

    /// Opacity (0=transparent, 1=opaque)
    pub opacity: f64,

    /// Whether `opacity` is applied
    pub use_opacity: bool,

    /// Whether the color paints the surface
    pub uses_color: bool,

    /// Whether the texture paints the surface
    pub uses_texture: bool,

    /// Texture image (only meaningful if `uses_texture`)
    pub texture: Option<Texture>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: String::new(),
            color: Color::BLACK,
            opacity: 1.0,
            use_opacity: false,
            uses_color: true,
            uses_texture: false,
            texture: None,
        }
    }
}

impl Material {
    /// Flat-colored material.
    pub fn new(name: impl Into<String>, color: Color) -> Self {
        Self {
            name: name.into(),
            color,
            ..Default::default()
        }
    }

    /// The "no material" sentinel: empty name, opaque black, paints nothing.
    pub fn none() -> Self {
        Self {
            uses_color: false,
            ..Default::default()
        }
    }

    pub fn with_texture(mut self, texture: Texture) -> Self {
        self.texture = Some(texture);
        self.uses_texture = true;
        self
    }

    pub fn with_opacity(mut self, opacity: f64) -> Self {
        self.opacity = opacity;
        self.use_opacity = true;
        self
    }
}

/// Index of a material in a [`MaterialTable`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaterialId(pub usize);

impl MaterialId {
    /// The "no material" sentinel.
    pub const NONE: MaterialId = MaterialId(0);

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

/// Name-keyed material registry of a document.
///
/// Slot zero always holds the sentinel, so every id handed out is
/// resolvable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Material>", into = "Vec<Material>")]
pub struct MaterialTable {
    materials: Vec<Material>,
    by_name: HashMap<String, MaterialId>,
}

impl Default for MaterialTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MaterialTable {
    pub fn new() -> Self {
        Self {
            materials: vec![Material::none()],
            by_name: HashMap::new(),
        }
    }

    /// Register a material under its name.
    ///
    /// If the name is already taken the existing id is returned and
    /// `material` is dropped.
    pub fn insert(&mut self, material: Material) -> MaterialId {
        if let Some(&id) = self.by_name.get(&material.name) {
            return id;
        }
        let id = MaterialId(self.materials.len());
        self.by_name.insert(material.name.clone(), id);
        self.materials.push(material);
        id
    }

    pub fn id_of(&self, name: &str) -> Option<MaterialId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id.0)
    }

    /// Resolve an id, falling back to the sentinel for unknown ids.
    pub fn resolve(&self, id: MaterialId) -> &Material {
        self.materials.get(id.0).unwrap_or(&self.materials[0])
    }

    pub fn by_name(&self, name: &str) -> Option<&Material> {
        self.id_of(name).and_then(|id| self.get(id))
    }

    /// The sentinel shared by everything without a material.
    pub fn sentinel(&self) -> &Material {
        &self.materials[0]
    }

    /// Registered materials (sentinel excluded) with their ids.
    pub fn iter(&self) -> impl Iterator<Item = (MaterialId, &Material)> {
        self.materials
            .iter()
            .enumerate()
            .skip(1)
            .map(|(i, m)| (MaterialId(i), m))
    }

    /// Number of registered materials, sentinel excluded.
    pub fn len(&self) -> usize {
        self.materials.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<Material>> for MaterialTable {
    fn from(materials: Vec<Material>) -> Self {
        let mut table = MaterialTable::new();
        for material in materials {
            table.insert(material);
        }
        table
    }
}

impl From<MaterialTable> for Vec<Material> {
    fn from(table: MaterialTable) -> Self {
        table.materials.into_iter().skip(1).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel() {
        let table = MaterialTable::new();
        assert!(table.is_empty());
        let none = table.resolve(MaterialId::NONE);
        assert!(none.name.is_empty());
        assert_eq!(none.color, Color::BLACK);
        assert!(none.texture.is_none());
        assert!(std::ptr::eq(none, table.sentinel()));
    }

    #[test]
    fn test_insert_dedups_by_name() {
        let mut table = MaterialTable::new();
        let red = table.insert(Material::new("Red", Color::rgb(255, 0, 0)));
        let again = table.insert(Material::new("Red", Color::rgb(0, 255, 0)));
        assert_eq!(red, again);
        assert_eq!(table.len(), 1);
        // first registration wins
        assert_eq!(table.resolve(red).color, Color::rgb(255, 0, 0));
        assert!(!red.is_none());
    }

    #[test]
    fn test_unknown_id_resolves_to_sentinel() {
        let table = MaterialTable::new();
        assert!(table.get(MaterialId(7)).is_none());
        assert!(table.resolve(MaterialId(7)).name.is_empty());
    }

    #[test]
    fn test_serde_rebuilds_index() {
        let mut table = MaterialTable::new();
        table.insert(Material::new("Wood", Color::rgb(120, 80, 40)));
        table.insert(Material::new("Glass", Color::WHITE).with_opacity(0.3));

        let json = serde_json::to_string(&table).unwrap();
        let back: MaterialTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back.id_of("Glass"), Some(MaterialId(2)));
        assert!((back.by_name("Glass").unwrap().opacity - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_color_bytes() {
        let colors = [Color::rgb(1, 2, 3), Color::new(4, 5, 6, 7)];
        let bytes: &[u8] = bytemuck::cast_slice(&colors);
        assert_eq!(bytes, &[1, 2, 3, 255, 4, 5, 6, 7]);
    }
}
