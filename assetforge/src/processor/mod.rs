//! Pluggable record processors.
//!
//! Every processor sees every record of every container through a
//! bundle-scoped lifecycle:
//!
//! ```text
//! initialize() ─► for each container:
//!                   enter_bundle() ─► process(record)… ─► exit_bundle()
//!             ─► cleanup()
//! ```
//!
//! A processor ignores record kinds it does not handle, so dispatch is just
//! "offer every record to every processor". Per-container state lives in a
//! [`BundleState`] owned by the worker processing that container; it is
//! never shared between workers and is dropped when the container is done.

mod pipeline;
pub mod schema;
pub mod sound;
pub mod texture;

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::bundle::{Container, ContainerError, RecordInfo};

pub use pipeline::{BundleReport, ProcessorPipeline};
pub use schema::SchemaProcessor;
pub use sound::{AudioSample, SampleExtractor, SoundProcessor, StandardContainerExtractor};
pub use texture::{TextureCache, TextureError, TextureProcessor};

/// Result type for processor operations.
pub type ProcessorResult<T> = Result<T, ProcessorError>;

/// Errors raised by processors. All of them are scoped to one record, one
/// container or, at `initialize()`, one processor.
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    Texture(#[from] TextureError),

    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("setup failed: {0}")]
    Setup(String),

    #[error("{tool} failed on '{record}' (exit code {code:?}): {stderr}")]
    ToolFailed {
        tool: String,
        record: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("unknown processor '{0}'")]
    UnknownProcessor(String),
}

/// Processor-private state for one container.
#[derive(Debug, Default)]
pub enum BundleState {
    /// Processor keeps nothing between records.
    #[default]
    Empty,
    /// Decoded textures of the container.
    Textures(TextureCache),
}

/// How the processing of a container ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleOutcome {
    /// Every record was offered to every processor.
    Completed,
    /// Cancellation stopped the container part way.
    Interrupted,
}

/// The container being processed and where its output goes.
pub struct BundleContext<'a> {
    pub container: &'a dyn Container,
    /// Container path relative to the resource tree.
    pub relative_path: &'a Path,
    /// `processed_resources/<relative path without extension>`.
    pub output_dir: PathBuf,
}

impl BundleContext<'_> {
    /// Output path for a record, with path separators in `name` neutralised.
    pub fn output_file(&self, name: &str, extension: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}.{}", file_safe_name(name), extension))
    }
}

/// `name` with path separators replaced, usable as a single file name.
pub(crate) fn file_safe_name(name: &str) -> String {
    name.chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect()
}

/// A record processor.
///
/// `initialize` and `cleanup` run once on the coordinating thread; the
/// bundle methods run concurrently on pool workers, each with its own
/// [`BundleState`].
pub trait RecordProcessor: Send + Sync {
    /// Short selection key, e.g. `image`.
    fn key(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// One-time setup. An error disables this processor for the run.
    fn initialize(&mut self) -> ProcessorResult<()> {
        Ok(())
    }

    fn enter_bundle(&self, _ctx: &BundleContext<'_>) -> BundleState {
        BundleState::Empty
    }

    /// Handle one record; records of unhandled kinds are a no-op.
    fn process(
        &self,
        ctx: &BundleContext<'_>,
        record: &RecordInfo,
        state: &mut BundleState,
    ) -> ProcessorResult<()>;

    /// Flush deferred output. The state is consumed and dropped afterwards.
    fn exit_bundle(
        &self,
        _ctx: &BundleContext<'_>,
        _state: BundleState,
        _outcome: BundleOutcome,
    ) -> ProcessorResult<()> {
        Ok(())
    }

    fn cleanup(&mut self) {}
}

/// The built-in processors, in invocation order: `image`, `sound`, `flatc`.
pub fn standard_processors(
    working_dir: &Path,
    version_name: &str,
    flatc_path: Option<PathBuf>,
) -> Vec<Box<dyn RecordProcessor>> {
    vec![
        Box::new(TextureProcessor::new()),
        Box::new(SoundProcessor::new()),
        Box::new(SchemaProcessor::new(working_dir, version_name).with_flatc_path(flatc_path)),
    ]
}

/// Write `data` to `path`, creating parent directories.
pub(crate) fn write_output(path: &Path, data: &[u8]) -> ProcessorResult<()> {
    let write_failed = |source| ProcessorError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_failed)?;
    }
    std::fs::write(path, data).map_err(write_failed)
}
