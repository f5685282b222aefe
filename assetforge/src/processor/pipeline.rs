//! Ordered set of processors driven through the bundle lifecycle.

use tokio_util::sync::CancellationToken;

use super::{BundleContext, BundleOutcome, BundleState, ProcessorError, ProcessorResult, RecordProcessor};

/// Counters for one container run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BundleReport {
    /// Records offered to the processors.
    pub records: usize,
    /// Record or exit failures reported by processors.
    pub failures: usize,
    pub outcome: BundleOutcome,
}

struct Slot {
    processor: Box<dyn RecordProcessor>,
    enabled: bool,
}

/// The processors of a run, in invocation order.
pub struct ProcessorPipeline {
    slots: Vec<Slot>,
}

impl ProcessorPipeline {
    pub fn new(processors: Vec<Box<dyn RecordProcessor>>) -> Self {
        Self {
            slots: processors
                .into_iter()
                .map(|processor| Slot {
                    processor,
                    enabled: true,
                })
                .collect(),
        }
    }

    /// Keep only the processors named in `keys`, in the order given.
    ///
    /// An empty key list keeps everything.
    pub fn select<S: AsRef<str>>(self, keys: &[S]) -> ProcessorResult<Self> {
        if keys.is_empty() {
            return Ok(self);
        }

        let mut pool: Vec<Option<Slot>> = self.slots.into_iter().map(Some).collect();
        let mut selected = Vec::with_capacity(keys.len());
        for key in keys {
            let key = key.as_ref();
            let found = pool
                .iter_mut()
                .find(|s| s.as_ref().is_some_and(|s| s.processor.key() == key))
                .and_then(Option::take);
            match found {
                Some(slot) => selected.push(slot),
                None => return Err(ProcessorError::UnknownProcessor(key.to_string())),
            }
        }
        Ok(Self { slots: selected })
    }

    /// Keys of all processors, enabled or not.
    pub fn keys(&self) -> Vec<&'static str> {
        self.slots.iter().map(|s| s.processor.key()).collect()
    }

    /// Keys of processors still enabled.
    pub fn active_keys(&self) -> Vec<&'static str> {
        self.active().map(|p| p.key()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn active(&self) -> impl Iterator<Item = &dyn RecordProcessor> {
        self.slots
            .iter()
            .filter(|s| s.enabled)
            .map(|s| s.processor.as_ref())
    }

    /// Initialize every processor. Failures disable that processor only.
    pub fn initialize(&mut self) {
        for slot in &mut self.slots {
            if let Err(e) = slot.processor.initialize() {
                tracing::warn!(
                    processor = slot.processor.key(),
                    error = %e,
                    "Processor disabled: initialization failed"
                );
                slot.enabled = false;
            } else {
                tracing::debug!(processor = slot.processor.key(), "Processor initialized");
            }
        }
    }

    /// Offer every record of `ctx.container` to every enabled processor.
    ///
    /// Cancellation is polled before each record; once seen, the remaining
    /// records are left alone and processors exit with
    /// [`BundleOutcome::Interrupted`].
    pub fn run_bundle(&self, ctx: &BundleContext<'_>, cancel: &CancellationToken) -> BundleReport {
        let mut states: Vec<(&dyn RecordProcessor, BundleState)> = self
            .active()
            .map(|p| (p, p.enter_bundle(ctx)))
            .collect();

        let mut records = 0;
        let mut failures = 0;
        let mut outcome = BundleOutcome::Completed;

        for record in ctx.container.records() {
            if cancel.is_cancelled() {
                outcome = BundleOutcome::Interrupted;
                break;
            }
            for (processor, state) in states.iter_mut() {
                if let Err(e) = processor.process(ctx, record, state) {
                    tracing::warn!(
                        container = %ctx.relative_path.display(),
                        record = %record.name,
                        processor = processor.key(),
                        error = %e,
                        "Record skipped"
                    );
                    failures += 1;
                }
            }
            records += 1;
        }

        for (processor, state) in states {
            if let Err(e) = processor.exit_bundle(ctx, state, outcome) {
                tracing::warn!(
                    container = %ctx.relative_path.display(),
                    processor = processor.key(),
                    error = %e,
                    "Failed to finish container"
                );
                failures += 1;
            }
        }

        BundleReport {
            records,
            failures,
            outcome,
        }
    }

    /// Release processor resources. Runs for disabled processors too.
    pub fn cleanup(&mut self) {
        for slot in &mut self.slots {
            slot.processor.cleanup();
        }
    }
}
