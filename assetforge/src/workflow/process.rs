//! Run the processor pipeline over a downloaded version.

use tokio_util::sync::CancellationToken;

use super::{WorkflowError, WorkflowResult};
use crate::bundle::{enumerate_containers, packed_reader_factory, ReaderFactory};
use crate::paths::VersionLayout;
use crate::pool::{PoolReport, WorkPool};
use crate::processor::ProcessorPipeline;

/// Enumerates a version's containers and feeds them to a [`WorkPool`].
pub struct ProcessWorkflow {
    pool: WorkPool,
    factory: ReaderFactory,
}

impl ProcessWorkflow {
    /// Workflow with `threads` workers (0 for the available parallelism)
    /// reading the built-in packed container format.
    pub fn new(threads: usize) -> Self {
        Self {
            pool: WorkPool::new(threads),
            factory: packed_reader_factory(),
        }
    }

    /// Read containers through a different format implementation.
    pub fn with_reader_factory(mut self, factory: ReaderFactory) -> Self {
        self.factory = factory;
        self
    }

    pub fn run(
        &self,
        layout: &VersionLayout,
        pipeline: &mut ProcessorPipeline,
        cancel: &CancellationToken,
    ) -> WorkflowResult<PoolReport> {
        let resources = layout.resources();
        if !resources.is_dir() {
            return Err(WorkflowError::MissingResources(resources));
        }
        let files = enumerate_containers(&resources).map_err(|source| WorkflowError::Io {
            action: "list",
            path: resources.clone(),
            source,
        })?;

        pipeline.initialize();
        let active = pipeline.active_keys();
        if active.is_empty() {
            tracing::warn!("No processor could be initialized, nothing to do");
            pipeline.cleanup();
            return Ok(PoolReport::default());
        }
        tracing::info!(version = layout.name(), processors = ?active, containers = files.len(), "Processing version");

        let report = self.pool.run(&files, layout, &self.factory, pipeline, cancel);
        pipeline.cleanup();
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_resources() {
        let temp = TempDir::new().unwrap();
        let layout = VersionLayout::new(temp.path(), "CN_1");
        let mut pipeline = ProcessorPipeline::new(Vec::new());

        let result = ProcessWorkflow::new(1).run(&layout, &mut pipeline, &CancellationToken::new());
        assert!(matches!(result, Err(WorkflowError::MissingResources(_))));
    }
}
