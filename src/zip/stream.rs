//! Pull-driven archive assembler.
//!
//! [`ZipStream`] does work only when asked for the next chunk. Each call
//! advances the state machine by one step (a header, one read of entry
//! content, a batch of central directory records, or the end records)
//! until something falls inside the requested byte window.
//!
//! ## Byte window
//!
//! The whole logical archive is always computed, since the central
//! directory depends on every entry before it. [`ZipStream::apply_range`]
//! only filters which of those bytes reach the consumer. Content that lies
//! entirely inside the skipped prefix is not even read when the
//! [`CrcCache`] already knows its CRC.

use bytes::{Bytes, BytesMut};
use chrono::{Local, NaiveDateTime};
use futures::Stream;
use std::collections::VecDeque;
use std::io;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{FailedEntryPolicy, ZipConfig};
use crate::source::{ContentReader, SourceWalker, ZipSource};
use anyhow::{Result, bail};

use super::crc_cache::CrcCache;
use super::estimate::archive_size;
use super::structures::*;

/// Entry whose content is currently being streamed.
struct OpenEntry {
    reader: ContentReader,
    record: EntryRecord,
    identity_key: Option<String>,
    crc: crc32fast::Hasher,
}

enum State {
    Entries,
    Content(OpenEntry),
    CentralDirectory { next: usize, cd_offset: u64 },
    EndOfCentralDirectory { cd_offset: u64 },
    Closed,
}

/// Part of the logical archive that is forwarded downstream.
#[derive(Debug, Default)]
struct Window {
    /// Logical bytes still to drop
    skip: u64,
    /// Bytes still to forward once skipping is over; `None` is unbounded
    limit: Option<u64>,
}

/// Streaming ZIP generator over a [`SourceWalker`].
///
/// ## Example
///
/// ```no_run
/// use quickzip::{ZipSource, ZipStream};
///
/// # async fn run() -> anyhow::Result<()> {
/// let sources = vec![
///     ZipSource::new("a.txt").with_bytes(&b"hi"[..]),
///     ZipSource::directory("empty"),
/// ];
/// let mut zip = ZipStream::new(sources.into_iter());
/// let size = zip.calculate_size().await?;
/// while let Some(chunk) = zip.next_chunk().await? {
///     // send chunk
/// #   let _ = (chunk, size);
/// }
/// # Ok(())
/// # }
/// ```
pub struct ZipStream<W> {
    walker: W,
    walker_done: bool,
    /// Sources pulled by the size estimate, replayed before the walker
    replay: VecDeque<ZipSource>,
    state: State,
    entries: Vec<EntryRecord>,
    /// Logical bytes generated so far, windowed or not
    written: u64,
    window: Window,
    range_applied: bool,
    out: BytesMut,
    started: bool,
    finished: bool,
    complete: bool,
    cache: CrcCache,
    config: ZipConfig,
    now: NaiveDateTime,
}

impl<W: SourceWalker> ZipStream<W> {
    pub fn new(walker: W) -> Self {
        Self::with_config(walker, ZipConfig::default())
    }

    pub fn with_config(walker: W, config: ZipConfig) -> Self {
        Self {
            walker,
            walker_done: false,
            replay: VecDeque::new(),
            state: State::Entries,
            entries: Vec::new(),
            written: 0,
            window: Window::default(),
            range_applied: false,
            out: BytesMut::new(),
            started: false,
            finished: false,
            complete: false,
            cache: CrcCache::new(),
            config,
            now: Local::now().naive_local(),
        }
    }

    /// Share a CRC cache with other generations of the same archive.
    pub fn with_cache(mut self, cache: CrcCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> &CrcCache {
        &self.cache
    }

    /// Restrict output to the inclusive logical window `[start, end]`.
    ///
    /// Allowed once, before the first chunk is pulled. `end < start`
    /// closes the stream without output.
    pub fn apply_range(&mut self, start: u64, end: u64) -> Result<()> {
        if self.started {
            bail!("Range must be applied before the archive is consumed");
        }
        if self.range_applied {
            bail!("Range already applied");
        }
        self.range_applied = true;

        if end < start {
            debug!(start, end, "empty range, closing archive");
            self.close();
            return Ok(());
        }
        self.window = Window {
            skip: start,
            limit: Some((end - start).saturating_add(1)),
        };
        Ok(())
    }

    /// Exact archive length, using the configured time budget.
    pub async fn calculate_size(&mut self) -> Result<Option<u64>> {
        let budget = self.config.estimate_budget;
        self.calculate_size_within(budget).await
    }

    /// Drain the walker and compute the exact archive length.
    ///
    /// Returns `Ok(None)` when the walker does not finish within `budget`,
    /// or when a source has content but no declared size.
    /// Every pulled source is kept and replayed by the generation, so the
    /// walker is still consumed only once.
    pub async fn calculate_size_within(&mut self, budget: Duration) -> Result<Option<u64>> {
        if self.started {
            bail!("Size must be calculated before the archive is consumed");
        }

        let deadline = Instant::now() + budget;
        while !self.walker_done {
            match self.walker.next_source().await {
                Some(source) => self.replay.push_back(source),
                None => {
                    self.walker_done = true;
                    break;
                }
            }
            if Instant::now() >= deadline {
                info!(
                    buffered = self.replay.len(),
                    "size estimate ran out of time"
                );
                return Ok(None);
            }
        }

        if let Some(source) = self
            .replay
            .iter()
            .find(|source| source.has_content() && source.size.is_none())
        {
            info!(path = %source.path, "size unknown, entry declares no content length");
            return Ok(None);
        }

        let size = archive_size(&self.replay);
        info!(entries = self.replay.len(), size, "estimated archive size");
        Ok(Some(size))
    }

    /// Pull the next chunk of output, or `None` once the archive (or the
    /// requested range) is finished.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        self.started = true;
        while self.out.is_empty() && !self.finished {
            self.step().await?;
        }

        if self.out.is_empty() {
            Ok(None)
        } else {
            Ok(Some(self.out.split().freeze()))
        }
    }

    /// Adapt into a byte stream, e.g. for an HTTP response body.
    pub fn into_stream(self) -> impl Stream<Item = io::Result<Bytes>> {
        futures::stream::unfold(self, |mut zip| async move {
            match zip.next_chunk().await {
                Ok(Some(chunk)) => Some((Ok(chunk), zip)),
                Ok(None) => None,
                Err(err) => {
                    zip.close();
                    Some((Err(io::Error::other(err)), zip))
                }
            }
        })
    }

    /// Stop generating. Idempotent; releases any open content reader and
    /// drops output not yet pulled.
    pub fn close(&mut self) {
        if !self.finished {
            debug!(written = self.written, "closing archive stream");
        }
        self.finished = true;
        self.state = State::Closed;
        self.out.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.finished
    }

    /// True once the end of central directory record has been generated.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Archive paths recorded so far, in archive order.
    ///
    /// The list is final once [`is_complete`](Self::is_complete) holds.
    pub fn archive_entries(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.file_name.clone()).collect()
    }

    pub fn entries(&self) -> &[EntryRecord] {
        &self.entries
    }

    /// Logical bytes generated so far, including skipped ones.
    pub fn bytes_generated(&self) -> u64 {
        self.written
    }

    async fn step(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, State::Closed) {
            State::Entries => self.next_entry().await?,
            State::Content(entry) => self.pump_content(entry).await?,
            State::CentralDirectory { next, cd_offset } => {
                self.write_central_directory(next, cd_offset)?
            }
            State::EndOfCentralDirectory { cd_offset } => self.write_end(cd_offset)?,
            State::Closed => self.finished = true,
        }
        if self.finished {
            // drops any open reader
            self.state = State::Closed;
        }
        Ok(())
    }

    async fn next_entry(&mut self) -> Result<()> {
        let source = match self.replay.pop_front() {
            Some(source) => Some(source),
            None if self.walker_done => None,
            None => self.walker.next_source().await,
        };

        match source {
            Some(source) => self.start_entry(source).await,
            None => {
                self.walker_done = true;
                debug!(
                    entries = self.entries.len(),
                    cd_offset = self.written,
                    "sources exhausted, writing central directory"
                );
                self.state = State::CentralDirectory {
                    next: 0,
                    cd_offset: self.written,
                };
                Ok(())
            }
        }
    }

    async fn start_entry(&mut self, source: ZipSource) -> Result<()> {
        if !name_fits(&source.path) {
            warn!(
                len = source.path.len(),
                limit = MAX_NAME_LEN,
                "skipping entry with overlong path"
            );
            self.state = State::Entries;
            return Ok(());
        }

        let ZipSource {
            path,
            identity_key,
            content,
            size,
            modified,
            mode,
        } = source;
        let modified = modified.unwrap_or(self.now);
        let mut record = EntryRecord {
            file_name: path,
            size: 0,
            crc32: 0,
            modified,
            offset: self.written,
            version_needed: VERSION_DEFAULT,
            external_attributes: external_attributes(mode.unwrap_or(DEFAULT_MODE)),
        };
        debug!(path = %record.file_name, offset = record.offset, "starting entry");

        let mut header = Vec::with_capacity(LocalFileHeader::SIZE + record.file_name.len());
        LocalFileHeader {
            modified: DosDateTime::from_datetime(&modified),
            file_name: record.file_name.as_bytes(),
        }
        .write_to(&mut header)?;
        self.emit(&header);
        if self.finished {
            return Ok(());
        }

        let Some(open) = content else {
            self.entries.push(record);
            self.state = State::Entries;
            return Ok(());
        };

        let cached = identity_key
            .as_deref()
            .and_then(|key| self.cache.lookup(key, &modified));

        if let (Some(crc32), Some(size)) = (cached, size) {
            if self.window.skip >= size {
                debug!(path = %record.file_name, size, "content inside skipped range, using cached CRC");
                self.window.skip -= size;
                self.written += size;
                record.size = size;
                record.crc32 = crc32;
                return self.finish_entry(record, true);
            }
        }

        // content that is read is always hashed, the cache only covers skipped bytes
        match open().await {
            Ok(reader) => {
                self.state = State::Content(OpenEntry {
                    reader,
                    record,
                    identity_key,
                    crc: crc32fast::Hasher::new(),
                });
                Ok(())
            }
            Err(err) => {
                log_read_error(&record.file_name, &err);
                self.finish_entry(record, false)
            }
        }
    }

    async fn pump_content(&mut self, mut entry: OpenEntry) -> Result<()> {
        let mut buf = BytesMut::with_capacity(self.config.chunk_size);
        match entry.reader.read_buf(&mut buf).await {
            Ok(0) => {
                let OpenEntry {
                    reader,
                    mut record,
                    identity_key,
                    crc,
                } = entry;
                drop(reader);
                record.crc32 = crc.finalize();
                if let Some(key) = identity_key {
                    self.cache.insert(key, record.modified, record.crc32);
                }
                debug!(path = %record.file_name, size = record.size, crc32 = record.crc32, "entry complete");
                self.finish_entry(record, true)
            }
            Ok(n) => {
                entry.crc.update(&buf);
                entry.record.size += n as u64;
                self.emit(&buf);
                self.state = State::Content(entry);
                Ok(())
            }
            Err(err) => {
                log_read_error(&entry.record.file_name, &err);
                let OpenEntry {
                    reader,
                    mut record,
                    crc,
                    ..
                } = entry;
                drop(reader);
                record.crc32 = crc.finalize();
                self.finish_entry(record, false)
            }
        }
    }

    /// Write the data descriptor and keep the record for the central directory.
    fn finish_entry(&mut self, record: EntryRecord, completed: bool) -> Result<()> {
        let mut descriptor = Vec::with_capacity(24);
        DataDescriptor {
            crc32: record.crc32,
            size: record.size,
        }
        .write_to(&mut descriptor)?;
        self.emit(&descriptor);

        if completed || self.config.failed_entries == FailedEntryPolicy::Include {
            self.entries.push(record);
        } else {
            debug!(path = %record.file_name, "leaving failed entry out of central directory");
        }
        self.state = State::Entries;
        Ok(())
    }

    fn write_central_directory(&mut self, mut next: usize, cd_offset: u64) -> Result<()> {
        let mut buf = Vec::new();
        while next < self.entries.len() && (buf.is_empty() || buf.len() < self.config.chunk_size) {
            CentralDirectoryHeader {
                entry: &self.entries[next],
            }
            .write_to(&mut buf)?;
            next += 1;
        }
        self.emit(&buf);

        self.state = if next < self.entries.len() {
            State::CentralDirectory { next, cd_offset }
        } else {
            State::EndOfCentralDirectory { cd_offset }
        };
        Ok(())
    }

    fn write_end(&mut self, cd_offset: u64) -> Result<()> {
        let cd_size = self.written - cd_offset;
        let total_entries = self.entries.len() as u64;

        let mut buf = Vec::new();
        write_trailer(&mut buf, total_entries, cd_size, cd_offset)?;
        self.emit(&buf);

        debug!(
            entries = total_entries,
            cd_size,
            cd_offset,
            size = self.written,
            zip64 = needs_zip64_trailer(total_entries, cd_size, cd_offset),
            "archive complete"
        );
        self.complete = true;
        self.finished = true;
        Ok(())
    }

    /// Account `chunk` in the logical stream and forward the part of it
    /// inside the window. Closes the stream when the window is used up.
    fn emit(&mut self, chunk: &[u8]) {
        if self.finished {
            return;
        }
        self.written += chunk.len() as u64;

        let mut chunk = chunk;
        if self.window.skip > 0 {
            if self.window.skip >= chunk.len() as u64 {
                self.window.skip -= chunk.len() as u64;
                return;
            }
            chunk = &chunk[self.window.skip as usize..];
            self.window.skip = 0;
        }

        match self.window.limit {
            Some(limit) if chunk.len() as u64 >= limit => {
                self.out.extend_from_slice(&chunk[..limit as usize]);
                self.window.limit = Some(0);
                debug!(written = self.written, "range complete");
                self.finished = true;
            }
            Some(limit) => {
                self.out.extend_from_slice(chunk);
                self.window.limit = Some(limit - chunk.len() as u64);
            }
            None => self.out.extend_from_slice(chunk),
        }
    }
}

fn log_read_error(path: &str, err: &io::Error) {
    if is_reported(err.kind()) {
        warn!(path, error = %err, "failed reading entry content, keeping partial data");
    }
}

/// Permission errors on content are not logged.
fn is_reported(kind: io::ErrorKind) -> bool {
    kind != io::ErrorKind::PermissionDenied
}
