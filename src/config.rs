use std::time::Duration;

/// What to do with an entry whose content failed to read part way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailedEntryPolicy {
    /// Keep it in the central directory with the size and CRC of the bytes that were read
    #[default]
    Include,
    /// Leave it out of the central directory. Its local bytes stay in the stream.
    Omit,
}

/// Tuning knobs for [`ZipStream`](crate::ZipStream).
#[derive(Debug, Clone)]
pub struct ZipConfig {
    /// Read buffer size for entry content
    pub chunk_size: usize,
    /// Time allowed for the size estimation pass
    pub estimate_budget: Duration,
    pub failed_entries: FailedEntryPolicy,
}

impl Default for ZipConfig {
    fn default() -> Self {
        Self {
            chunk_size: 64 * 1024,
            estimate_budget: Duration::from_secs(1),
            failed_entries: FailedEntryPolicy::Include,
        }
    }
}
