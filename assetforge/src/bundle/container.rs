//! Container and reader seams.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use super::record::{AudioClipData, RecordInfo, SpriteData, TextAssetData, TextureData, TextureInfo};

/// Result type for container operations.
pub type ContainerResult<T> = Result<T, ContainerError>;

/// Errors raised while opening or reading a container.
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("failed to read {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("{path} is not a recognized container")]
    UnknownFormat { path: PathBuf },

    #[error("corrupt container {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("no record with id {id}")]
    MissingRecord { id: i64 },

    #[error("record {id} is not a {expected}")]
    WrongKind { id: i64, expected: &'static str },
}

/// An opened container. Read-only once opened.
///
/// Typed accessors fail with [`ContainerError::MissingRecord`] for unknown
/// ids and [`ContainerError::WrongKind`] for ids of another kind.
pub trait Container {
    /// Path the container was opened from.
    fn path(&self) -> &Path;

    /// Every record, in container order.
    fn records(&self) -> &[RecordInfo];

    /// Texture header without the pixel payload.
    fn texture_info(&self, id: i64) -> ContainerResult<TextureInfo>;

    fn texture(&self, id: i64) -> ContainerResult<TextureData>;

    fn sprite(&self, id: i64) -> ContainerResult<SpriteData>;

    fn audio_clip(&self, id: i64) -> ContainerResult<AudioClipData>;

    fn text_asset(&self, id: i64) -> ContainerResult<TextAssetData>;
}

/// A reusable parsing context.
///
/// Each worker owns exactly one reader for its lifetime and opens every
/// container it claims through it.
pub trait ContainerReader {
    fn open(&mut self, path: &Path) -> ContainerResult<Box<dyn Container>>;
}

/// Creates one [`ContainerReader`] per worker.
pub type ReaderFactory = Arc<dyn Fn() -> Box<dyn ContainerReader> + Send + Sync>;
