//! Durable per-item download state.
//!
//! Each downloadable item owns one [`ProgressRecord`] persisted as a tiny
//! text file under the version's `downloading_progress/` folder. Records are
//! rewritten whole (temp file + rename) on every state transition so a crash
//! never leaves a half-updated record behind; anything that fails to parse is
//! treated as "not started".

mod record;
mod store;

pub use record::{ProgressError, ProgressRecord, ProgressResult};
pub use store::ProgressStore;
