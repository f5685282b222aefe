//! CLI subcommands.

pub mod download;
pub mod process;
pub mod versions;
