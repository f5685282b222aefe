//! Process command: run the processors over a downloaded version.

use assetforge::paths::{list_versions, VersionLayout};
use assetforge::processor::{standard_processors, ProcessorPipeline};
use assetforge::workflow::ProcessWorkflow;

use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the process command.
pub struct ProcessArgs {
    pub version: Option<String>,
    pub processors: Vec<String>,
    pub threads: Option<usize>,
}

/// Run the process command.
pub fn run(runner: &CliRunner, args: ProcessArgs) -> Result<(), CliError> {
    runner.log_startup("process");
    let config = runner.config();
    let working_dir = &config.general.working_directory;

    let layout = pick_version(working_dir, args.version.as_deref())?;

    // CLI > config > all processors
    let keys = if args.processors.is_empty() {
        config.processing.processors.clone()
    } else {
        args.processors
    };
    let mut pipeline = ProcessorPipeline::new(standard_processors(
        working_dir,
        layout.name(),
        config.processing.flatc_path.clone(),
    ))
    .select(&keys)?;

    let threads = args.threads.unwrap_or(config.processing.threads);
    let cancel = runner.cancel_on_interrupt()?;

    println!(
        "Processing {} with {} ...",
        layout.name(),
        pipeline.keys().join(", ")
    );
    let report = ProcessWorkflow::new(threads).run(&layout, &mut pipeline, &cancel)?;

    println!(
        "Processed {} containers ({} records, {} record failures).",
        report.containers, report.records, report.record_failures
    );
    for (path, reason) in &report.failed_containers {
        println!("  skipped: {}: {}", path.display(), reason);
    }
    if report.cancelled {
        println!("Interrupted; outputs written so far are kept.");
    } else {
        println!("Output: {}", layout.processed().display());
    }
    Ok(())
}

/// The named version, or the latest completed one.
fn pick_version(working_dir: &std::path::Path, name: Option<&str>) -> Result<VersionLayout, CliError> {
    let versions = list_versions(working_dir)
        .map_err(|e| CliError::Config(format!("Cannot list {}: {}", working_dir.display(), e)))?;

    match name {
        Some(name) => versions
            .into_iter()
            .find(|v| v.name() == name)
            .ok_or_else(|| CliError::NoVersion(format!("Version '{}' is not downloaded", name))),
        None => versions.into_iter().last().ok_or_else(|| {
            CliError::NoVersion("No downloaded version found. Run 'assetforge download' first.".to_string())
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assetforge::paths::touch_file;
    use tempfile::TempDir;

    fn complete(working_dir: &std::path::Path, name: &str) {
        touch_file(&VersionLayout::new(working_dir, name).completion_marker()).unwrap();
    }

    #[test]
    fn test_latest_version_by_default() {
        let temp = TempDir::new().unwrap();
        complete(temp.path(), "CN_24-01-01");
        complete(temp.path(), "CN_24-03-01");

        let layout = pick_version(temp.path(), None).unwrap();
        assert_eq!(layout.name(), "CN_24-03-01");
    }

    #[test]
    fn test_named_version() {
        let temp = TempDir::new().unwrap();
        complete(temp.path(), "GL_1");
        complete(temp.path(), "GL_2");

        assert_eq!(pick_version(temp.path(), Some("GL_1")).unwrap().name(), "GL_1");
        assert!(matches!(
            pick_version(temp.path(), Some("GL_9")),
            Err(CliError::NoVersion(_))
        ));
    }

    #[test]
    fn test_no_versions() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(pick_version(temp.path(), None), Err(CliError::NoVersion(_))));
    }
}
