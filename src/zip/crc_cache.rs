//! CRC cache shared between generations of the same logical archive.
//!
//! A resumed download regenerates the archive from the start. Entries whose
//! content sits entirely inside the skipped prefix only need their CRC, so
//! remembering it per source avoids reading and hashing them again.

use chrono::NaiveDateTime;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// A remembered CRC, valid only for the exact modification time it was computed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachedCrc {
    pub modified: NaiveDateTime,
    pub crc32: u32,
}

/// Cloneable handle to a map of identity key to [`CachedCrc`].
///
/// Entries are never evicted on their own; callers that keep a cache
/// alive for a long time decide when to [`remove`](Self::remove) or
/// [`clear`](Self::clear).
#[derive(Debug, Clone, Default)]
pub struct CrcCache {
    inner: Arc<RwLock<HashMap<String, CachedCrc>>>,
}

impl CrcCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up `key`, returning the CRC only if it was recorded at `modified`.
    pub fn lookup(&self, key: &str, modified: &NaiveDateTime) -> Option<u32> {
        self.inner
            .read()
            .get(key)
            .filter(|cached| cached.modified == *modified)
            .map(|cached| cached.crc32)
    }

    pub fn get(&self, key: &str) -> Option<CachedCrc> {
        self.inner.read().get(key).copied()
    }

    pub fn insert(&self, key: impl Into<String>, modified: NaiveDateTime, crc32: u32) {
        self.inner
            .write()
            .insert(key.into(), CachedCrc { modified, crc32 });
    }

    pub fn remove(&self, key: &str) -> Option<CachedCrc> {
        self.inner.write().remove(key)
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
