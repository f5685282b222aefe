//! assetforge - resumable pack downloads and bundle processing.
//!
//! The library has two halves:
//!
//! - **Acquisition**: a manifest of remote packs is downloaded with bounded
//!   parallelism into a version folder. Every item keeps a small progress
//!   record on disk so an interrupted run resumes at the exact byte offset.
//!   Completed archives are unpacked into a resource tree.
//! - **Processing**: a fixed pool of worker threads claims container files
//!   from the resource tree and feeds every record through a pipeline of
//!   pluggable processors (sprite reconstruction, audio extraction, schema
//!   decoding).
//!
//! ```text
//!  PackManifest ──► DownloadScheduler ──► raw_resources/*.dat
//!                        │                       │
//!                  ProgressStore            unpack_zip
//!                                                ▼
//!                                           resources/…
//!                                                │
//!                               WorkPool ◄── enumerate_containers
//!                                  │
//!                          ProcessorPipeline
//!                    ┌─────────┼──────────┐
//!                 texture    sound      schema
//!                    ▼
//!            processed_resources/…
//! ```

pub mod bundle;
pub mod config;
pub mod download;
pub mod logging;
pub mod manifest;
pub mod paths;
pub mod pool;
pub mod processor;
pub mod progress;
pub mod server;
pub mod unpack;
pub mod workflow;

/// Crate version, embedded in log output.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
