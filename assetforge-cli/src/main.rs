//! assetforge CLI - download and process game resource packs.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::download::{DownloadArgs, ServerArg};
use commands::process::ProcessArgs;
use error::CliError;
use runner::CliRunner;

#[derive(Debug, Parser)]
#[command(name = "assetforge", version, about = "Download and process versioned game resource packs")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Override the working directory from config.ini
    #[arg(long, global = true)]
    working_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Download and unpack the current version of a server
    Download {
        /// Server to download from
        #[arg(long, value_enum, default_value = "global")]
        server: ServerArg,

        /// Maximum concurrent downloads (default from config)
        #[arg(long)]
        parallel: Option<usize>,
    },

    /// Run processors over a downloaded version
    Process {
        /// Version folder name (default: latest downloaded)
        #[arg(long)]
        version: Option<String>,

        /// Processors to run, e.g. image,sound,flatc (default: all)
        #[arg(long, value_delimiter = ',')]
        processors: Vec<String>,

        /// Worker threads (default from config, 0 = all cores)
        #[arg(long)]
        threads: Option<usize>,
    },

    /// List downloaded versions
    Versions,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        e.exit();
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let runner = CliRunner::new(cli.working_dir, cli.verbose)?;

    match cli.command {
        Commands::Download { server, parallel } => {
            commands::download::run(&runner, DownloadArgs { server, parallel })
        }
        Commands::Process {
            version,
            processors,
            threads,
        } => commands::process::run(
            &runner,
            ProcessArgs {
                version,
                processors,
                threads,
            },
        ),
        Commands::Versions => commands::versions::run(&runner),
    }
}
