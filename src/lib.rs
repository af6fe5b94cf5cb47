//! # quickzip
//!
//! Streaming ZIP/ZIP64 generator with resumable byte-range output.
//!
//! Archives are produced on the fly from a lazily walked sequence of
//! sources: nothing is materialized in memory or on disk, and sources are
//! never seeked. Because the output is generated rather than stored, a
//! byte range of it is served by regenerating the archive and forwarding
//! only the requested window; a shared CRC cache lets that regeneration
//! skip reading content that falls before the window.
//!
//! ## Features
//!
//! - Local headers with deferred data descriptors, so content is streamed once
//! - ZIP64 extra fields and end records for large entries, offsets, and entry counts
//! - Incremental CRC32 while streaming
//! - Byte-range output of the generated archive
//! - Exact archive size ahead of time, within a time budget
//! - Tolerates entries that fail to read part way
//!
//! ## Example
//!
//! ```no_run
//! use quickzip::{DirWalker, ZipStream};
//! use tokio::io::AsyncWriteExt;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut zip = ZipStream::new(DirWalker::new("/srv/share"));
//!
//!     // Declare a content length when the walk is quick enough
//!     if let Some(size) = zip.calculate_size().await? {
//!         eprintln!("archive is {size} bytes");
//!     }
//!
//!     let mut stdout = tokio::io::stdout();
//!     while let Some(chunk) = zip.next_chunk().await? {
//!         stdout.write_all(&chunk).await?;
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod source;
pub mod zip;

pub use cli::Cli;
pub use config::{FailedEntryPolicy, ZipConfig};
pub use source::{ContentFactory, ContentReader, DirWalker, SourceWalker, StreamWalker, ZipSource, file_source};
pub use zip::{CrcCache, EntryRecord, ZipStream, archive_size};
