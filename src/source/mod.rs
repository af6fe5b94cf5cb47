//! Archive entry sources.
//!
//! A [`SourceWalker`] hands out [`ZipSource`] descriptors one at a time.
//! Each descriptor may carry a deferred [`ContentFactory`] so that content
//! is opened only when the archive actually reaches that entry.

mod local;

pub use local::{DirWalker, file_source};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::NaiveDateTime;
use futures::future::BoxFuture;
use futures::{Stream, StreamExt};
use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use tokio::io::AsyncRead;

/// Byte stream of one entry's content.
pub type ContentReader = Pin<Box<dyn AsyncRead + Send>>;

/// Deferred opener for an entry's content, invoked at most once.
pub type ContentFactory = Box<dyn FnOnce() -> BoxFuture<'static, io::Result<ContentReader>> + Send>;

/// Descriptor of one archive entry.
pub struct ZipSource {
    /// Path recorded inside the archive
    pub path: String,
    /// Stable key of the underlying content, enables CRC caching
    pub identity_key: Option<String>,
    /// Content opener; `None` makes a zero-length, directory-like entry
    pub content: Option<ContentFactory>,
    /// Expected content length
    pub size: Option<u64>,
    /// Modification time, defaults to the archive creation time
    pub modified: Option<NaiveDateTime>,
    /// Unix mode bits, defaults to [`DEFAULT_MODE`](crate::zip::DEFAULT_MODE)
    pub mode: Option<u32>,
}

impl ZipSource {
    /// A source with no content, such as a directory.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            identity_key: None,
            content: None,
            size: None,
            modified: None,
            mode: None,
        }
    }

    /// A directory entry. A trailing `/` is added when missing.
    pub fn directory(path: impl Into<String>) -> Self {
        let mut path = path.into();
        if !path.ends_with('/') {
            path.push('/');
        }
        Self::new(path)
    }

    /// Attach a content opener.
    pub fn with_content<F, Fut, R>(mut self, open: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = io::Result<R>> + Send + 'static,
        R: AsyncRead + Send + 'static,
    {
        self.content = Some(Box::new(move || -> BoxFuture<'static, io::Result<ContentReader>> {
            Box::pin(async move {
                let reader = open().await?;
                Ok::<_, io::Error>(Box::pin(reader) as ContentReader)
            })
        }));
        self
    }

    /// In-memory content; also sets the size.
    pub fn with_bytes(self, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let size = data.len() as u64;
        self.with_content(move || async move { Ok(io::Cursor::new(data)) })
            .with_size(size)
    }

    pub fn with_identity_key(mut self, key: impl Into<String>) -> Self {
        self.identity_key = Some(key.into());
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_modified(mut self, modified: NaiveDateTime) -> Self {
        self.modified = Some(modified);
        self
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn has_content(&self) -> bool {
        self.content.is_some()
    }
}

impl fmt::Debug for ZipSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZipSource")
            .field("path", &self.path)
            .field("identity_key", &self.identity_key)
            .field("content", &self.content.as_ref().map(|_| ".."))
            .field("size", &self.size)
            .field("modified", &self.modified)
            .field("mode", &self.mode)
            .finish()
    }
}

/// Single-pass producer of archive entries.
///
/// Returning `None` ends the archive; the walker is not polled again after that.
#[async_trait]
pub trait SourceWalker: Send {
    async fn next_source(&mut self) -> Option<ZipSource>;
}

#[async_trait]
impl SourceWalker for std::vec::IntoIter<ZipSource> {
    async fn next_source(&mut self) -> Option<ZipSource> {
        self.next()
    }
}

/// Adapts any [`Stream`] of sources into a [`SourceWalker`].
pub struct StreamWalker<S> {
    inner: S,
}

impl<S> StreamWalker<S>
where
    S: Stream<Item = ZipSource> + Unpin + Send,
{
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S> SourceWalker for StreamWalker<S>
where
    S: Stream<Item = ZipSource> + Unpin + Send,
{
    async fn next_source(&mut self) -> Option<ZipSource> {
        self.inner.next().await
    }
}
