//! Containers and their records.
//!
//! Parsing a concrete third-party container format is outside this crate;
//! formats are plugged in through the [`Container`] and [`ContainerReader`]
//! traits. [`PackedReader`] is the built-in implementation.

mod container;
mod enumerate;
mod packed;
mod record;

pub use container::{Container, ContainerError, ContainerReader, ContainerResult, ReaderFactory};
pub use enumerate::enumerate_containers;
pub use packed::{PackedBundleWriter, PackedContainer, PackedReader, PACKED_MAGIC};
pub use record::{
    AudioClipData, RecordInfo, RecordKind, SpriteData, SpriteRect, TextAssetData, TextureData,
    TextureFormat, TextureInfo,
};

use std::sync::Arc;

/// Factory producing [`PackedReader`]s.
pub fn packed_reader_factory() -> ReaderFactory {
    Arc::new(|| Box::new(PackedReader::new()) as Box<dyn ContainerReader>)
}
