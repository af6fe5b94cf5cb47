//! Main entry point for the quickzip CLI application.
//!
//! This binary walks a directory and streams it as a ZIP archive to
//! stdout or a file, optionally restricted to a byte range of the
//! generated archive.

use anyhow::{Result, bail};
use clap::Parser;
use std::path::Path;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing_subscriber::EnvFilter;

use quickzip::{Cli, DirWalker, ZipStream};

/// Application entry point.
///
/// Sets up logging on stderr (stdout may carry the archive), then
/// dispatches to size-only mode or archive generation.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let root = Path::new(&cli.dir);
    if !root.is_dir() {
        bail!("Not a directory: {}", cli.dir);
    }

    let mut zip = ZipStream::with_config(DirWalker::new(root), cli.config());
    let size = zip.calculate_size().await?;

    if cli.size_only {
        match size {
            Some(size) => println!("{size}"),
            None => println!("unknown"),
        }
        return Ok(());
    }

    if cli.has_range() {
        let (start, end) = cli.range();
        zip.apply_range(start, end)?;
    }

    let written = if cli.to_stdout() {
        write_archive(&mut zip, &mut tokio::io::stdout()).await?
    } else {
        let path = cli.output.as_deref().unwrap_or_default();
        let mut file = tokio::fs::File::create(path).await?;
        write_archive(&mut zip, &mut file).await?
    };

    if cli.list {
        for entry in zip.entries() {
            if entry.is_directory() {
                eprintln!("   creating: {}", entry.file_name);
            } else {
                eprintln!("     adding: {} ({})", entry.file_name, format_size(entry.size));
            }
        }
    }

    if !cli.quiet {
        match size {
            Some(size) => eprintln!(
                "Wrote {} of {} archive",
                format_size(written),
                format_size(size)
            ),
            None => eprintln!("Wrote {}", format_size(written)),
        }
    }

    Ok(())
}

/// Install a stderr subscriber; `RUST_LOG` overrides the `-v`/`-q` level.
fn init_tracing(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_filter()));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

/// Pull the archive chunk by chunk into `out`.
///
/// Each chunk is written before the next one is requested, so a slow
/// destination slows down reading of the sources.
///
/// # Returns
///
/// The number of bytes written.
async fn write_archive<W, O>(zip: &mut ZipStream<W>, out: &mut O) -> Result<u64>
where
    W: quickzip::SourceWalker,
    O: AsyncWrite + Unpin,
{
    let mut written = 0u64;
    while let Some(chunk) = zip.next_chunk().await? {
        if let Err(err) = out.write_all(&chunk).await {
            // consumer went away (e.g. closed pipe)
            zip.close();
            return Err(err.into());
        }
        written += chunk.len() as u64;
    }
    out.flush().await?;
    Ok(written)
}

/// Format a byte size into a human-readable string.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(format_size(500), "500 bytes");
/// assert_eq!(format_size(1536), "1.50 KB");
/// ```
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
