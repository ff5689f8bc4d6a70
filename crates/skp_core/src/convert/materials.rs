//! Material conversion in both directions.

use std::collections::HashMap;

use crate::kernel::{
    kind, Bridge, BridgeResult, Kernel, MaterialRef, MaterialType, Owned, RawRef, TextureRef,
};
use crate::material::{Material, MaterialId, MaterialTable, Texture};
use crate::texture::resolve_texture_path;

use super::options::WriteOptions;

/// Name-keyed registry filled while reading.
///
/// Every native material is converted at most once. Two native materials
/// with the same name share the first one's conversion.
#[derive(Debug, Default)]
pub struct MaterialRegistry {
    table: MaterialTable,
    by_handle: HashMap<RawRef, MaterialId>,
}

impl MaterialRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a native material to its document id.
    ///
    /// Invalid handles map to [`MaterialId::NONE`].
    pub fn resolve<K: Kernel + ?Sized>(
        &mut self,
        bridge: Bridge<'_, K>,
        material: MaterialRef,
    ) -> BridgeResult<MaterialId> {
        if !bridge.is_valid(material) {
            return Ok(MaterialId::NONE);
        }
        if let Some(&id) = self.by_handle.get(&material.raw()) {
            return Ok(id);
        }

        let name = bridge.material_name(material)?;
        let id = match self.table.id_of(&name) {
            Some(id) => {
                log::debug!("Material '{}' already registered, reusing", name);
                id
            }
            None => {
                let converted = read_material(bridge, material, name)?;
                self.table.insert(converted)
            }
        };
        self.by_handle.insert(material.raw(), id);
        Ok(id)
    }

    pub fn table(&self) -> &MaterialTable {
        &self.table
    }

    pub fn into_table(self) -> MaterialTable {
        self.table
    }
}

fn read_material<K: Kernel + ?Sized>(
    bridge: Bridge<'_, K>,
    material: MaterialRef,
    name: String,
) -> BridgeResult<Material> {
    let ty = bridge.material_type(material)?;
    let texture = bridge.material_texture(material)?;

    let texture = if bridge.is_valid(texture) {
        match read_texture(bridge, texture) {
            Ok(texture) => Some(texture),
            Err(e) => {
                log::warn!("Skipping unreadable texture of material '{}': {}", name, e);
                None
            }
        }
    } else {
        None
    };

    Ok(Material {
        color: bridge.material_color(material)?,
        opacity: bridge.material_opacity(material)?,
        use_opacity: bridge.material_use_opacity(material)?,
        uses_color: ty.uses_color(),
        uses_texture: ty.uses_texture() && texture.is_some(),
        texture,
        name,
    })
}

fn read_texture<K: Kernel + ?Sized>(
    bridge: Bridge<'_, K>,
    texture: TextureRef,
) -> BridgeResult<Texture> {
    let dimensions = bridge.texture_dimensions(texture)?;
    Ok(Texture {
        name: bridge.texture_file_name(texture)?,
        width: dimensions.width,
        height: dimensions.height,
        s_scale: dimensions.s_scale,
        t_scale: dimensions.t_scale,
        average_color: bridge.texture_average_color(texture)?,
        use_alpha: bridge.texture_use_alpha(texture)?,
    })
}

/// Create a native material from a document material.
///
/// A texture whose image cannot be loaded is dropped with a warning and the
/// material falls back to flat color.
pub fn build_native_material<'k, K: Kernel + ?Sized>(
    kernel: &'k K,
    material: &Material,
    options: &WriteOptions,
) -> BridgeResult<Owned<'k, K, kind::Material>> {
    let native = Owned::new(kernel, kernel.material_create()?);
    let handle = native.get();

    kernel.material_set_name(handle, &material.name)?;
    kernel.material_set_color(handle, material.color)?;
    kernel.material_set_opacity(handle, material.opacity.clamp(0.0, 1.0))?;
    kernel.material_set_use_opacity(handle, material.use_opacity)?;

    let mut has_texture = false;
    if let (true, true, Some(texture)) = (
        material.uses_texture,
        options.write_textures,
        material.texture.as_ref(),
    ) {
        let path = resolve_texture_path(&texture.name, options.texture_dir());
        match kernel.texture_create_from_file(&path, texture.s_scale, texture.t_scale) {
            Ok(created) => {
                let created = Owned::new(kernel, created);
                kernel.material_set_texture(handle, created.get())?;
                created.transfer();
                has_texture = true;
            }
            Err(e) => log::warn!(
                "Material '{}': texture {} not loaded: {}",
                material.name,
                path.display(),
                e
            ),
        }
    }

    kernel.material_set_type(
        handle,
        MaterialType::from_flags(material.uses_color, has_texture),
    )?;
    Ok(native)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{MemoryKernel, Query};
    use crate::material::Color;

    #[test]
    fn test_invalid_material_is_sentinel() {
        let kernel = MemoryKernel::new();
        let mut registry = MaterialRegistry::new();
        let id = registry
            .resolve(Bridge::new(&kernel), MaterialRef::invalid())
            .unwrap();
        assert!(id.is_none());
        assert_eq!(registry.table().resolve(id).name, "");
        assert!(registry.table().is_empty());
    }

    #[test]
    fn test_same_name_merges() {
        let kernel = MemoryKernel::new();
        let bridge = Bridge::new(&kernel);
        let red = Material::new("Paint", Color::rgb(255, 0, 0));
        let blue = Material::new("Paint", Color::rgb(0, 0, 255));
        let options = WriteOptions::default();
        let a = build_native_material(&kernel, &red, &options).unwrap();
        let b = build_native_material(&kernel, &blue, &options).unwrap();

        let mut registry = MaterialRegistry::new();
        let first = registry.resolve(bridge, a.get()).unwrap();
        let again = registry.resolve(bridge, a.get()).unwrap();
        let second = registry.resolve(bridge, b.get()).unwrap();

        assert_eq!(first, again);
        assert_eq!(first, second);
        assert_eq!(registry.table().len(), 1);
        assert_eq!(registry.table().resolve(first).color, Color::rgb(255, 0, 0));
    }

    #[test]
    fn test_missing_texture_falls_back_to_color() {
        let kernel = MemoryKernel::new();
        let model = kernel.model_create().unwrap();
        let material = Material::new("Brick", Color::rgb(150, 60, 40)).with_texture(Texture {
            name: "missing_brick.png".into(),
            width: 64,
            height: 64,
            s_scale: 1.0,
            t_scale: 1.0,
            average_color: Color::rgb(150, 60, 40),
            use_alpha: false,
        });

        let native = build_native_material(&kernel, &material, &WriteOptions::default()).unwrap();
        kernel.model_add_materials(model, &[native.get()]).unwrap();
        let handle = native.transfer();

        assert_eq!(kernel.material_type(handle).unwrap(), MaterialType::Colored);
        assert!(kernel.material_texture(handle).unwrap().is_null());

        let bridge = Bridge::new(&kernel);
        let listed = bridge.list(Query::materials(model)).unwrap();
        let mut registry = MaterialRegistry::new();
        let id = registry.resolve(bridge, listed[0]).unwrap();
        let read = registry.table().resolve(id);
        assert_eq!(read.name, "Brick");
        assert!(!read.uses_texture);
        assert!(read.texture.is_none());
    }

    #[test]
    fn test_opacity_is_kept() {
        let kernel = MemoryKernel::new();
        let glass = Material::new("Glass", Color::rgb(200, 220, 255)).with_opacity(0.25);
        let native = build_native_material(&kernel, &glass, &WriteOptions::default()).unwrap();

        let mut registry = MaterialRegistry::new();
        let id = registry.resolve(Bridge::new(&kernel), native.get()).unwrap();
        let read = registry.table().resolve(id);
        assert!((read.opacity - 0.25).abs() < 1e-12);
        assert!(read.use_opacity);
        assert!(read.uses_color);
    }
}
