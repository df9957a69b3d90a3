//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Synchronize files from a password-protected HTTP directory listing.
///
/// Lists the remote directory, keeps only files matching the filter, and
/// downloads them one at a time. Interrupted downloads resume where they
/// stopped on the next run. Settings come from the config file and may be
/// overridden by the flags below.
#[derive(Parser, Debug, Default)]
#[command(name = "filesync")]
#[command(author, version, about)]
pub struct Args {
    /// Config file (TOML); defaults to ./sync_config.toml when present
    #[arg(short = 'c', long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Remote directory listing URL
    #[arg(long)]
    pub url: Option<String>,

    /// Basic-auth username
    #[arg(long)]
    pub username: Option<String>,

    /// Basic-auth password (prefer the FILESYNC_PASSWORD environment variable)
    #[arg(long)]
    pub password: Option<String>,

    /// Directory of already synchronized files
    #[arg(long, value_name = "DIR")]
    pub local_dir: Option<PathBuf>,

    /// Directory receiving new and partial downloads
    #[arg(long, value_name = "DIR")]
    pub download_dir: Option<PathBuf>,

    /// Regex searched within each filename
    #[arg(long, value_name = "REGEX")]
    pub filter: Option<String>,

    /// Enable the filename filter
    #[arg(long, conflicts_with = "disable_filter")]
    pub enable_filter: bool,

    /// Disable the filename filter (nothing will be downloaded)
    #[arg(long)]
    pub disable_filter: bool,

    /// Match the filter case-sensitively
    #[arg(long)]
    pub case_sensitive: bool,

    /// Only consider files with this extension (e.g. .laz)
    #[arg(short = 'e', long, value_name = "EXT")]
    pub extension: Option<String>,

    /// Maximum attempts per file, including the first (1-100)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=100))]
    pub max_retries: Option<u32>,

    /// Seconds to wait between attempts (0-3600)
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(0..=3600))]
    pub retry_delay: Option<u64>,

    /// Bytes per disk write (1-16777216)
    #[arg(long, value_name = "BYTES", value_parser = clap::value_parser!(u64).range(1..=16_777_216))]
    pub chunk_size: Option<u64>,

    /// Move completed files into the local directory
    #[arg(long)]
    pub move_completed: bool,

    /// Show what would be downloaded, then exit
    #[arg(long)]
    pub dry_run: bool,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}
