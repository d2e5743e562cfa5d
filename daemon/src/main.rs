mod config;
mod error;
mod listing;
mod notify;
mod process;
mod process_monitor;
mod snapshot;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::error::EXIT_LISTING_FAILED;
use crate::listing::ListFilter;
use crate::notify::Notifier;
use crate::process_monitor::Tracker;
use crate::snapshot::{ProcessSource, SysinfoSource};

/// proctracker - alerts when a process stops or restarts
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// List running processes (only children of PID 1 unless --all)
    #[arg(long)]
    list: bool,

    /// Find processes whose executable name contains NAME
    #[arg(long, value_name = "NAME")]
    find: Option<String>,

    /// Show every process with --list and --find
    #[arg(long)]
    all: bool,

    /// Configuration file
    #[arg(long, value_name = "FILE", default_value = config::DEFAULT_CONFIG_FILE)]
    config_file: PathBuf,

    /// Write a starter configuration to --config-file
    #[arg(long)]
    gen_config: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    if let Some(filter) = list_filter(&args) {
        return list_processes(&filter);
    }

    if args.gen_config {
        return generate_config(&args.config_file);
    }

    start(&args.config_file).await
}

/// `--list`, or `--find` with a non-empty name, selects listing mode.
fn list_filter(args: &Args) -> Option<ListFilter> {
    let name = args.find.clone().filter(|n| !n.is_empty());
    if !args.list && name.is_none() {
        return None;
    }
    Some(ListFilter {
        name,
        all: args.all,
    })
}

fn list_processes(filter: &ListFilter) -> ExitCode {
    let entries = match SysinfoSource::new().snapshot() {
        Ok(entries) => entries,
        Err(e) => {
            error!("Gather process list error: {e}");
            return ExitCode::from(EXIT_LISTING_FAILED);
        }
    };
    let mut stdout = std::io::stdout().lock();
    if let Err(e) = listing::write_table(&mut stdout, &entries, filter) {
        error!("Failed to write process list: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn generate_config(path: &Path) -> ExitCode {
    info!("Generating starter configuration");
    match config::write_starter(path) {
        Ok(()) => {
            info!("Wrote config file at {}", path.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn start(config_path: &Path) -> ExitCode {
    let settings = match config::load(config_path).and_then(|c| c.validate()) {
        Ok(settings) => settings,
        Err(e) => {
            error!("[config] {e}");
            return ExitCode::from(e.exit_code());
        }
    };

    let notifier = match Notifier::new(&settings.alert) {
        Ok(notifier) => notifier,
        Err(e) => {
            error!("[notify] {e:#}");
            return ExitCode::FAILURE;
        }
    };
    if notifier.channel_count() == 0 {
        info!("[notify] No alert channel configured; changes will only be logged");
    }

    info!(
        "Start tracking process: `{}`, interval every: `{:?}`",
        settings.name, settings.interval
    );
    let mut tracker = Tracker::new(settings.name, SysinfoSource::new(), notifier);
    process_monitor::run(
        &mut tracker,
        settings.interval,
        process_monitor::shutdown_signal(),
    )
    .await;

    let last = tracker.process();
    info!(
        "Last known state of `{}`: {:?}, pid {:?}, last alert {:?}",
        last.name(),
        last.stage(),
        last.pid(),
        last.last_notified_at().map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
    );
    ExitCode::SUCCESS
}
