use clap::Parser;
use std::time::Duration;

use crate::config::{FailedEntryPolicy, ZipConfig};

#[derive(Parser, Debug)]
#[command(name = "quickzip")]
#[command(version)]
#[command(about = "Stream a directory as a ZIP archive", long_about = None)]
#[command(after_help = "Examples:\n  \
  quickzip photos > photos.zip               archive a directory to stdout\n  \
  quickzip photos -o part.zip --start 1048576   resume a download from byte 1 MiB\n  \
  quickzip -s photos                         print the archive size only")]
pub struct Cli {
    /// Directory to archive
    #[arg(value_name = "DIR")]
    pub dir: String,

    /// Write the archive to FILE instead of stdout
    #[arg(short = 'o', value_name = "FILE")]
    pub output: Option<String>,

    /// First logical byte to write
    #[arg(long, value_name = "BYTE")]
    pub start: Option<u64>,

    /// Last logical byte to write (inclusive)
    #[arg(long, value_name = "BYTE")]
    pub end: Option<u64>,

    /// Print the archive size and exit
    #[arg(short = 's')]
    pub size_only: bool,

    /// List archived paths when done
    #[arg(short = 'l')]
    pub list: bool,

    /// Milliseconds allowed for computing the archive size
    #[arg(long, value_name = "MS", default_value_t = 1000)]
    pub budget_ms: u64,

    /// Read buffer size in bytes
    #[arg(long, value_name = "BYTES", default_value_t = 64 * 1024)]
    pub chunk_size: usize,

    /// Leave entries that fail to read out of the central directory
    #[arg(long)]
    pub omit_failed: bool,

    /// Verbose logging (-vv => debug)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode
    #[arg(short = 'q')]
    pub quiet: bool,
}

impl Cli {
    pub fn has_range(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }

    /// Inclusive range to apply, open ends filled in.
    pub fn range(&self) -> (u64, u64) {
        (self.start.unwrap_or(0), self.end.unwrap_or(u64::MAX))
    }

    pub fn to_stdout(&self) -> bool {
        self.output.is_none() || self.output.as_deref() == Some("-")
    }

    pub fn log_filter(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (true, _) => "error",
            (false, 0) => "warn",
            (false, 1) => "info",
            _ => "debug",
        }
    }

    pub fn config(&self) -> ZipConfig {
        ZipConfig {
            chunk_size: self.chunk_size,
            estimate_budget: Duration::from_millis(self.budget_ms),
            failed_entries: if self.omit_failed {
                FailedEntryPolicy::Omit
            } else {
                FailedEntryPolicy::Include
            },
        }
    }
}
