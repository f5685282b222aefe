//! Download command: fetch, unpack and finalize the current version.

use std::sync::Arc;
use std::time::Duration;

use clap::ValueEnum;
use indicatif::{ProgressBar, ProgressStyle};

use assetforge::download::{HttpFetcher, ProgressCallback, ProgressSnapshot};
use assetforge::server::Server;
use assetforge::workflow::{DownloadPlan, DownloadSummary, DownloadWorkflow};

use crate::error::CliError;
use crate::runner::CliRunner;

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}) {msg}";

/// Server selection for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum ServerArg {
    /// International server
    Global,
    /// Mainland China server (also fetches the client package)
    China,
}

impl From<ServerArg> for Server {
    fn from(arg: ServerArg) -> Self {
        match arg {
            ServerArg::Global => Server::Global,
            ServerArg::China => Server::China,
        }
    }
}

/// Arguments for the download command.
pub struct DownloadArgs {
    pub server: ServerArg,
    pub parallel: Option<usize>,
}

/// Run the download command.
pub fn run(runner: &CliRunner, args: DownloadArgs) -> Result<(), CliError> {
    runner.log_startup("download");
    let config = runner.config();
    let cancel = runner.cancel_on_interrupt()?;

    let fetcher = HttpFetcher::with_settings(config.download.timeout, config.download.user_agent.clone())
        .map_err(|e| CliError::Config(e.to_string()))?;

    println!("Resolving current version...");
    let plan = DownloadPlan::resolve(&fetcher, args.server.into(), &config.general.working_directory)?;
    println!(
        "Version {}: {} packs, {} extra archives",
        plan.layout.name(),
        plan.manifest.len(),
        plan.extras.len()
    );

    let parallel = args.parallel.unwrap_or(config.download.parallel);
    let workflow = DownloadWorkflow::new(Arc::new(fetcher))
        .with_parallel(parallel)
        .with_commit_interval(config.download.commit_interval)
        .with_keep_archives(config.general.keep_intermediate_data);

    let bar = progress_bar();
    let summary = workflow.run(&plan, &cancel, Some(progress_callback(bar.clone())))?;
    bar.finish_and_clear();

    report(&plan, &summary)
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    let style = ProgressStyle::with_template(BAR_TEMPLATE)
        .map(|s| s.progress_chars("=>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

fn progress_callback(bar: ProgressBar) -> ProgressCallback {
    Arc::new(move |snapshot: ProgressSnapshot| {
        bar.set_length(snapshot.total_bytes);
        bar.set_position(snapshot.bytes);
        bar.set_message(format!("{}/{} items", snapshot.items_done, snapshot.items_total));
    })
}

fn report(plan: &DownloadPlan, summary: &DownloadSummary) -> Result<(), CliError> {
    let downloads = &summary.report;

    if summary.complete && downloads.total() == 0 {
        println!("Version {} is already downloaded.", plan.layout.name());
        return Ok(());
    }

    println!(
        "Downloaded {} items ({} already done), unpacked {} archives.",
        downloads.completed.len(),
        downloads.skipped.len(),
        summary.unpacked
    );
    for (name, error) in &downloads.failed {
        println!("  failed: {}: {}", name, error);
    }
    for (name, reason) in &summary.unpack_failures {
        println!("  unpack failed: {}: {}", name, reason);
    }

    if summary.cancelled {
        println!("Interrupted; run the command again to resume.");
        return Ok(());
    }
    if summary.complete {
        println!("Version {} complete: {}", plan.layout.name(), plan.layout.root().display());
        Ok(())
    } else {
        Err(CliError::Incomplete(format!(
            "{} downloads and {} unpacks failed; run the command again to retry",
            downloads.failed.len(),
            summary.unpack_failures.len()
        )))
    }
}
