//! DavFetch CLI - resumable, parallel downloads from WebDAV/HTTP servers.

mod commands;
mod error;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use commands::get::{GetArgs, LayoutArg};
use commands::parts::PartsArgs;
use error::CliError;

#[derive(Parser)]
#[command(name = "davfetch")]
#[command(about = "Resumable parallel downloads over HTTP Range requests")]
#[command(version)]
struct Cli {
    /// Path to INI configuration file [default: ~/.davfetch/config.ini]
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a remote object, resuming any partial local copy
    Get {
        /// Remote URL
        url: String,

        /// Local target path
        output: PathBuf,

        /// Number of parallel connections
        #[arg(short = 'j', long)]
        connections: Option<usize>,

        /// Range size in MiB (1-32)
        #[arg(long)]
        chunk_mb: Option<u64>,

        /// Known object size in bytes (skips the size query)
        #[arg(long)]
        size: Option<u64>,

        /// On-disk layout
        #[arg(long, value_enum, default_value_t = LayoutArg::Auto)]
        layout: LayoutArg,

        /// Always split into 4 GiB parts (FAT32 targets)
        #[arg(long)]
        force_fat32: bool,

        /// WebDAV username
        #[arg(short, long)]
        user: Option<String>,

        /// WebDAV password
        #[arg(short, long)]
        password: Option<String>,

        /// Request timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Directory used when the output's parent cannot be created
        #[arg(long)]
        fallback_dir: Option<PathBuf>,

        /// Disable whole-transfer auto-retry
        #[arg(long)]
        no_auto_retry: bool,

        /// Hide the progress bar
        #[arg(short, long)]
        quiet: bool,
    },

    /// Show the part files of a split download
    Parts {
        /// Split directory
        dir: PathBuf,

        /// Expected object size, to report completeness
        #[arg(long)]
        size: Option<u64>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Get {
            url,
            output,
            connections,
            chunk_mb,
            size,
            layout,
            force_fat32,
            user,
            password,
            timeout,
            fallback_dir,
            no_auto_retry,
            quiet,
        } => commands::get::run(GetArgs {
            config: cli.config,
            url,
            output,
            connections,
            chunk_mb,
            size,
            layout,
            force_fat32,
            user,
            password,
            timeout,
            fallback_dir,
            no_auto_retry,
            quiet,
        }),
        Commands::Parts { dir, size } => commands::parts::run(PartsArgs {
            config: cli.config,
            dir,
            size,
        }),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
