//! Conversion between a native model and the [`Document`](crate::Document) tree.
//!
//! Reading goes through [`SceneGraphReader`], which uses [`GeometryReader`]
//! and [`MaterialRegistry`] bottom-up. Writing goes through
//! [`SceneGraphWriter`]. Both directions convert lengths with the unit
//! chosen in [`ReadOptions`] / [`WriteOptions`].

mod geometry;
mod materials;
mod options;
mod reader;
mod writer;

pub use geometry::GeometryReader;
pub use materials::{build_native_material, MaterialRegistry};
pub use options::{ReadOptions, WriteOptions};
pub use reader::{ReadError, ReadResult, SceneGraphReader};
pub use writer::{SceneGraphWriter, WriteError, WriteResult};
