//! Get command - download one remote object with resume support.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::ValueEnum;
use davfetch::download::ProgressReporter;
use davfetch::transport::Credentials;
use davfetch::{
    logging, CompletionHook, LayoutHint, ProgressHandle, RangeDownloader, ReqwestFactory,
    TransferOutcome, TransferPhase, TransferRequest,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use super::load_config;
use crate::error::CliError;

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) {msg}";

/// Layout selection for CLI arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LayoutArg {
    /// Split only when the object does not fit in one file
    Auto,
    /// Always write one file
    Direct,
    /// Always write a directory of parts
    Split,
}

impl From<LayoutArg> for LayoutHint {
    fn from(arg: LayoutArg) -> Self {
        match arg {
            LayoutArg::Auto => LayoutHint::Auto,
            LayoutArg::Direct => LayoutHint::Direct,
            LayoutArg::Split => LayoutHint::Split,
        }
    }
}

/// Arguments for the get command.
pub struct GetArgs {
    pub config: Option<PathBuf>,
    pub url: String,
    pub output: PathBuf,
    pub connections: Option<usize>,
    pub chunk_mb: Option<u64>,
    pub size: Option<u64>,
    pub layout: LayoutArg,
    pub force_fat32: bool,
    pub user: Option<String>,
    pub password: Option<String>,
    pub timeout: Option<u64>,
    pub fallback_dir: Option<PathBuf>,
    pub no_auto_retry: bool,
    pub quiet: bool,
}

/// Logs the finished split directory so the caller can pick it up.
struct SplitReadyHook;

impl CompletionHook for SplitReadyHook {
    fn split_completed(&self, dir: &Path) {
        info!(dir = %dir.display(), "split download ready");
    }
}

fn phase_label(phase: TransferPhase) -> &'static str {
    match phase {
        TransferPhase::SizeUnknown => "querying size",
        TransferPhase::SizeResolved | TransferPhase::LayoutChosen => "preparing",
        TransferPhase::Downloading => "downloading",
        TransferPhase::Resuming => "resuming",
        TransferPhase::AutoRetrying => "waiting to retry",
        TransferPhase::Completed => "done",
        TransferPhase::Failed => "failed",
    }
}

fn progress_bar(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let style = ProgressStyle::default_bar()
        .template(BAR_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    let bar = ProgressBar::new(0);
    bar.set_style(style);
    bar
}

/// Run the get command.
pub fn run(args: GetArgs) -> Result<(), CliError> {
    let mut config = load_config(args.config.as_deref())?;
    let _log_guard = logging::init(&config.logging)?;

    // CLI takes precedence over the config file
    let transfer = &mut config.transfer;
    if let Some(connections) = args.connections {
        transfer.parallel_connections = connections;
    }
    if let Some(mb) = args.chunk_mb {
        transfer.chunk_size_mb = mb;
    }
    if args.force_fat32 {
        transfer.force_split = true;
    }
    if let Some(dir) = args.fallback_dir {
        transfer.fallback_dir = Some(dir);
    }
    if args.no_auto_retry {
        transfer.retry = transfer.retry.clone().with_transfer_attempts(1, Duration::ZERO);
    }

    let transport = &mut config.transport;
    if let Some(user) = args.user {
        transport.credentials = Some(Credentials::new(user, args.password.unwrap_or_default()));
    }
    if let Some(secs) = args.timeout {
        transport.timeout = Duration::from_secs(secs.max(1));
    }

    let remote =
        Arc::new(ReqwestFactory::new(config.transport.clone()).map_err(CliError::Transport)?);
    let request = TransferRequest::from_config(&args.url, &args.output, &config.transfer)
        .with_expected_size(args.size.unwrap_or(0))
        .with_layout(args.layout.into());
    let downloader = RangeDownloader::with_remote(remote, config.transfer)
        .with_completion_hook(Arc::new(SplitReadyHook));

    let progress = ProgressHandle::new();
    let cancel = progress.clone();
    ctrlc::set_handler(move || {
        eprintln!();
        eprintln!("Received interrupt, stopping after in-flight ranges...");
        cancel.cancel();
    })
    .map_err(|e| CliError::Setup(format!("Failed to set signal handler: {}", e)))?;

    let bar = progress_bar(args.quiet);
    let bar_clone = bar.clone();
    let reporter = ProgressReporter::start(
        progress.clone(),
        Box::new(move |written, total, phase| {
            if total > 0 {
                bar_clone.set_length(total);
            }
            bar_clone.set_position(written);
            bar_clone.set_message(phase_label(phase));
        }),
        Duration::from_millis(200),
    );

    let result = downloader.download(&request, &progress);
    reporter.stop();

    match result {
        Ok(outcome) => {
            bar.finish_with_message("done");
            print_summary(&outcome);
            Ok(())
        }
        Err(failure) => {
            bar.abandon_with_message(phase_label(TransferPhase::Failed));
            Err(failure.into())
        }
    }
}

fn print_summary(outcome: &TransferOutcome) {
    println!();
    println!("Saved:    {}", outcome.path.display());
    println!("Size:     {} bytes", outcome.total_size);
    println!("Strategy: {} ({} worker(s))", outcome.strategy, outcome.workers.max(1));
    if outcome.resumed_from > 0 {
        println!("Resumed:  from byte {}", outcome.resumed_from);
    }
    if let Some(parts) = outcome.part_count {
        println!("Parts:    {}", parts);
    }
    if outcome.attempts > 1 {
        println!("Attempts: {}", outcome.attempts);
    }
}
