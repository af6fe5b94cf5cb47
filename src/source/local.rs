use super::{SourceWalker, ZipSource};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Build a source for a local file or directory.
///
/// Files get a lazy opener, their size, and their path as identity key;
/// nothing is opened until the archive reaches the entry.
pub async fn file_source(path: &Path, archive_path: impl Into<String>) -> Result<ZipSource> {
    let metadata = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("Failed to stat {}", path.display()))?;
    Ok(source_from_metadata(path, archive_path.into(), &metadata))
}

fn source_from_metadata(path: &Path, archive_path: String, metadata: &Metadata) -> ZipSource {
    let mut source = if metadata.is_dir() {
        ZipSource::directory(archive_path)
    } else {
        let owned = path.to_path_buf();
        ZipSource::new(archive_path)
            .with_content(move || tokio::fs::File::open(owned))
            .with_size(metadata.len())
            .with_identity_key(path.to_string_lossy())
    };

    if let Ok(modified) = metadata.modified() {
        source = source.with_modified(DateTime::<Local>::from(modified).naive_local());
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        source = source.with_mode(metadata.permissions().mode());
    }

    #[cfg(not(unix))]
    {
        source = source.with_mode(fallback_mode(metadata.is_dir()));
    }

    source
}

/// Mode for platforms without unix permissions.
#[cfg_attr(unix, allow(dead_code))]
fn fallback_mode(is_dir: bool) -> u32 {
    if is_dir { 0o40755 } else { 0o100644 }
}

/// Walks a directory tree on a blocking thread, handing sources over a
/// bounded channel so the walk only runs ahead of the archive by `capacity`.
///
/// Must be created inside a Tokio runtime.
pub struct DirWalker {
    rx: mpsc::Receiver<ZipSource>,
}

impl DirWalker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_capacity(root, 64)
    }

    pub fn with_capacity(root: impl Into<PathBuf>, capacity: usize) -> Self {
        let root = root.into();
        let (tx, rx) = mpsc::channel(capacity.max(1));
        tokio::task::spawn_blocking(move || walk(&root, tx));
        Self { rx }
    }
}

#[async_trait]
impl SourceWalker for DirWalker {
    async fn next_source(&mut self) -> Option<ZipSource> {
        self.rx.recv().await
    }
}

fn walk(root: &Path, tx: mpsc::Sender<ZipSource>) {
    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(true)
        .sort_by_file_name();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(error = %err, "skipping unreadable path");
                continue;
            }
        };
        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!(path = %entry.path().display(), error = %err, "skipping path without metadata");
                continue;
            }
        };
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let archive_path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let source = source_from_metadata(entry.path(), archive_path, &metadata);
        if tx.blocking_send(source).is_err() {
            debug!(root = %root.display(), "archive dropped, stopping walk");
            break;
        }
    }
}
