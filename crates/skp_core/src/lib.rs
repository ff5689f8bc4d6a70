//! SKP Core - Scene-graph conversion for SketchUp models.
//!
//! This crate provides:
//!
//! - **Document tree**: `Document`, `ComponentDefinition`, `Instance`,
//!   `Group`, `Face`, `Material`
//! - **Kernel bridge**: typed handles over the SketchUp C API and an
//!   in-memory backend (`kernel`)
//! - **Conversion**: reading a native model into a `Document` and writing
//!   one back (`convert`, `io`)
//!
//! # Example
//!
//! ```ignore
//! use skp_core::{load_document, ReadOptions, Session};
//! use skp_core::kernel::NativeKernel;
//!
//! let kernel = NativeKernel::new();
//! let _session = Session::begin(&kernel)?;
//! let document = load_document(&kernel, "chair.skp", &ReadOptions::default())?;
//! println!("Loaded {} definitions, {} instances",
//!     document.definitions.len(),
//!     document.instance_count());
//! ```

pub mod convert;
pub mod document;
pub mod geometry;
pub mod io;
pub mod kernel;
pub mod material;
pub mod mesh;
pub mod texture;

// Re-export commonly used types
pub use convert::{ReadOptions, WriteOptions};
pub use document::{ComponentDefinition, Document, Entities, Group, Guid, Instance, Layer, Scene};
pub use geometry::{Curve, Edge, Face, Loop};
pub use io::{
    append_document, convert_model_version, load_document, save_document, LoadError, ModelVersion,
    SaveError,
};
pub use kernel::{MemoryKernel, Session};
pub use material::{Color, Material, MaterialId, MaterialTable};
pub use mesh::Mesh;
pub use skp_math::{LengthUnit, Transform, UnitConverter};
