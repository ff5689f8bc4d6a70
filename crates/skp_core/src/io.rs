//! Load and save entry points.

use std::path::Path;

use thiserror::Error;

use crate::convert::{
    ReadError, ReadOptions, SceneGraphReader, SceneGraphWriter, WriteError, WriteOptions,
};
use crate::document::Document;
use crate::kernel::{BridgeError, Kernel, ModelRef};

pub use crate::kernel::ModelVersion;

/// Errors that can occur while loading a model file.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Kernel error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Read error: {0}")]
    Read(#[from] ReadError),
}

/// Errors that can occur while saving a document.
#[derive(Error, Debug)]
pub enum SaveError {
    #[error("Kernel error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Write error: {0}")]
    Write(#[from] WriteError),

    /// The kernel's own serialization failure, unchanged.
    #[error("Serialization failed: {0}")]
    Serialization(String),
}

pub type LoadResult<T> = Result<T, LoadError>;
pub type SaveResult<T> = Result<T, SaveError>;

/// Open a model file and convert it.
///
/// The native model is released before returning, on success or failure.
/// A model without a name takes the file stem.
pub fn load_document<K, P>(kernel: &K, path: P, options: &ReadOptions) -> LoadResult<Document>
where
    K: Kernel + ?Sized,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let model = kernel.model_open(path)?;

    let result = SceneGraphReader::new(kernel, options).read(model);
    release(kernel, model);
    let mut document = result?;

    if document.name.is_empty() {
        document.name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unnamed")
            .to_string();
    }

    log::info!(
        "Loaded {}: {} faces at the root, {} definitions",
        path.display(),
        document.entities.face_count(),
        document.definitions.len()
    );
    Ok(document)
}

/// Convert a document and save it as a model file.
pub fn save_document<K, P>(
    kernel: &K,
    document: &Document,
    path: P,
    version: ModelVersion,
    options: &WriteOptions,
) -> SaveResult<()>
where
    K: Kernel + ?Sized,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let model = SceneGraphWriter::new(kernel, options).write(document)?;

    let saved = save(kernel, model, path, version);
    release(kernel, model);
    saved?;

    log::info!("Saved {} ({:?})", path.display(), version);
    Ok(())
}

/// Add a document's contents to an existing model file and save it in place.
///
/// Materials and layers the file already has are reused by name. On any
/// failure the file is left untouched.
pub fn append_document<K, P>(
    kernel: &K,
    document: &Document,
    path: P,
    version: ModelVersion,
    options: &WriteOptions,
) -> SaveResult<()>
where
    K: Kernel + ?Sized,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let model = kernel.model_open(path)?;

    let result = SceneGraphWriter::new(kernel, options)
        .append(model, document)
        .map_err(SaveError::from)
        .and_then(|()| save(kernel, model, path, version));
    release(kernel, model);
    result?;

    log::info!(
        "Appended {} faces and {} definitions to {}",
        document.entities.face_count(),
        document.definitions.len(),
        path.display()
    );
    Ok(())
}

/// Re-save a model file under another format version, without converting it.
pub fn convert_model_version<K, P, Q>(
    kernel: &K,
    source: P,
    target: Q,
    version: ModelVersion,
) -> SaveResult<()>
where
    K: Kernel + ?Sized,
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let (source, target) = (source.as_ref(), target.as_ref());
    let model = kernel.model_open(source)?;
    let saved = save(kernel, model, target, version);
    release(kernel, model);
    saved?;

    log::info!(
        "Saved {} as {} ({:?})",
        source.display(),
        target.display(),
        version
    );
    Ok(())
}

fn save<K: Kernel + ?Sized>(
    kernel: &K,
    model: ModelRef,
    path: &Path,
    version: ModelVersion,
) -> SaveResult<()> {
    match kernel.model_save(model, path, version) {
        Ok(()) => Ok(()),
        Err(BridgeError::Serialization(message)) => Err(SaveError::Serialization(message)),
        Err(e) => Err(e.into()),
    }
}

fn release<K: Kernel + ?Sized>(kernel: &K, model: ModelRef) {
    if let Err(e) = kernel.model_release(model) {
        log::warn!("Failed to release model: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Face;
    use crate::kernel::MemoryKernel;
    use crate::material::{Color, Material, MaterialId};
    use skp_math::DVec3;

    #[test]
    fn test_load_missing_file() {
        let kernel = MemoryKernel::new();
        let err = load_document(&kernel, "nowhere.skp", &ReadOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            LoadError::Bridge(BridgeError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_serialization_error_passes_through() {
        let kernel = MemoryKernel::new();
        let mut document = Document::new("tri");
        document.entities.faces.push(Face::from_points(&[
            DVec3::ZERO,
            DVec3::X,
            DVec3::Y,
        ]));

        let err = save_document(
            &kernel,
            &document,
            "tri.dwg",
            ModelVersion::default(),
            &WriteOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, SaveError::Serialization(_)));
        assert_eq!(kernel.live_count(), 0);
    }

    fn square_at(x: f64) -> Face {
        Face::from_points(&[
            DVec3::new(x, 0.0, 0.0),
            DVec3::new(x + 1.0, 0.0, 0.0),
            DVec3::new(x + 1.0, 1.0, 0.0),
            DVec3::new(x, 1.0, 0.0),
        ])
    }

    #[test]
    fn test_append_adds_to_existing_file() {
        let kernel = MemoryKernel::new();
        let mut base = Document::new("site");
        let red = base.materials.insert(Material::new("Red", Color::rgb(255, 0, 0)));
        base.entities
            .faces
            .push(square_at(0.0).with_materials(red, MaterialId::NONE));
        save_document(&kernel, &base, "site.skp", ModelVersion::V2019, &WriteOptions::default())
            .unwrap();

        let mut extra = Document::new("shed");
        let red = extra.materials.insert(Material::new("Red", Color::rgb(0, 0, 255)));
        let green = extra.materials.insert(Material::new("Green", Color::rgb(0, 255, 0)));
        extra
            .entities
            .faces
            .push(square_at(5.0).with_materials(red, MaterialId::NONE));
        extra
            .entities
            .faces
            .push(square_at(10.0).with_materials(green, MaterialId::NONE));
        append_document(&kernel, &extra, "site.skp", ModelVersion::V2021, &WriteOptions::default())
            .unwrap();

        let loaded = load_document(&kernel, "site.skp", &ReadOptions::default()).unwrap();
        assert_eq!(loaded.name, "site");
        assert_eq!(loaded.entities.faces.len(), 3);
        assert_eq!(loaded.materials.len(), 2);
        // the file's own "Red" is reused, not duplicated or recolored
        let red = loaded.materials.id_of("Red").unwrap();
        assert_eq!(loaded.materials.resolve(red).color, Color::rgb(255, 0, 0));
        assert_eq!(loaded.entities.faces[1].front_material, red);
        assert_eq!(
            kernel.saved_version(Path::new("site.skp")),
            Some(ModelVersion::V2021)
        );
        assert_eq!(kernel.live_count(), 0);
    }

    #[test]
    fn test_failed_append_leaves_file_untouched() {
        let kernel = MemoryKernel::new();
        let mut base = Document::new("site");
        base.entities.faces.push(square_at(0.0));
        save_document(&kernel, &base, "site.skp", ModelVersion::V2019, &WriteOptions::default())
            .unwrap();

        let mut broken = Document::new("broken");
        broken.entities.faces.push(square_at(5.0));
        broken
            .entities
            .faces
            .push(Face::from_points(&[DVec3::ZERO, DVec3::X, DVec3::X * 2.0]));
        let err = append_document(
            &kernel,
            &broken,
            "site.skp",
            ModelVersion::V2021,
            &WriteOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            SaveError::Write(WriteError::GeometryConstruction { index: 1, .. })
        ));

        let loaded = load_document(&kernel, "site.skp", &ReadOptions::default()).unwrap();
        assert_eq!(loaded.entities.faces.len(), 1);
        assert_eq!(
            kernel.saved_version(Path::new("site.skp")),
            Some(ModelVersion::V2019)
        );
        assert_eq!(kernel.live_count(), 0);

        assert!(matches!(
            append_document(
                &kernel,
                &base,
                "missing.skp",
                ModelVersion::default(),
                &WriteOptions::default()
            ),
            Err(SaveError::Bridge(BridgeError::FileNotFound(_)))
        ));
    }

    #[test]
    fn test_convert_model_version() {
        let kernel = MemoryKernel::new();
        let mut document = Document::new("barn");
        document.entities.faces.push(square_at(0.0));
        save_document(&kernel, &document, "barn.skp", ModelVersion::V2021, &WriteOptions::default())
            .unwrap();

        convert_model_version(&kernel, "barn.skp", "barn-2017.skp", ModelVersion::V2017).unwrap();

        assert_eq!(
            kernel.saved_version(Path::new("barn-2017.skp")),
            Some(ModelVersion::V2017)
        );
        assert_eq!(
            kernel.saved_version(Path::new("barn.skp")),
            Some(ModelVersion::V2021)
        );
        let converted = load_document(&kernel, "barn-2017.skp", &ReadOptions::default()).unwrap();
        assert_eq!(converted.name, "barn");
        assert_eq!(converted.entities.faces.len(), 1);
        assert_eq!(kernel.live_count(), 0);

        assert!(matches!(
            convert_model_version(&kernel, "barn.skp", "barn.obj", ModelVersion::V2017),
            Err(SaveError::Serialization(_))
        ));
        assert_eq!(kernel.live_count(), 0);
    }

    #[test]
    fn test_unnamed_model_takes_file_stem() {
        let kernel = MemoryKernel::new();
        let document = Document::default();
        save_document(
            &kernel,
            &document,
            "models/shed.skp",
            ModelVersion::V2017,
            &WriteOptions::default(),
        )
        .unwrap();

        let loaded = load_document(&kernel, "models/shed.skp", &ReadOptions::default()).unwrap();
        assert_eq!(loaded.name, "shed");
        assert_eq!(
            kernel.saved_version(Path::new("models/shed.skp")),
            Some(ModelVersion::V2017)
        );
        assert_eq!(kernel.live_count(), 0);
    }
}
