//! Versions command: list downloaded versions.

use assetforge::paths::list_versions;

use crate::error::CliError;
use crate::runner::CliRunner;

/// Run the versions command.
pub fn run(runner: &CliRunner) -> Result<(), CliError> {
    let working_dir = &runner.config().general.working_directory;
    let versions = list_versions(working_dir)
        .map_err(|e| CliError::Config(format!("Cannot list {}: {}", working_dir.display(), e)))?;

    if versions.is_empty() {
        println!("No downloaded versions in {}", working_dir.display());
        return Ok(());
    }

    for version in &versions {
        let processed = if version.processed().is_dir() {
            "processed"
        } else {
            "not processed"
        };
        println!("  {}  ({})", version.name(), processed);
    }
    Ok(())
}
