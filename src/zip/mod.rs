//! Streaming ZIP generation.
//!
//! This module turns a sequence of [`ZipSource`](crate::ZipSource)s into
//! ZIP bytes on demand, without buffering the archive and without seeking
//! in the sources.
//!
//! ## Architecture
//!
//! - [`structures`]: the ZIP records and their binary encoding
//! - [`stream`]: the pull-driven assembler and its byte-range window
//! - [`estimate`]: exact archive length from descriptors alone
//! - [`crc_cache`]: CRCs remembered across generations of the same archive
//!
//! ## Layout Produced
//!
//! For every entry:
//! 1. Local file header with zero CRC and sizes (general purpose bit 3)
//! 2. The content, stored without compression
//! 3. A data descriptor with the real CRC and size (omitted for entries without content)
//!
//! Then one central directory record per entry, and the end of central
//! directory record, preceded by the ZIP64 end records when the entry
//! count, directory size, or directory offset outgrow the classic fields.
//!
//! ## Limitations
//!
//! - STORED method only
//! - An entry whose content fails part way keeps the size and CRC of
//!   what was read, so it will not match the original file
//! - The size estimate trusts declared sizes
//! - Paths longer than 65535 bytes are skipped with a warning

pub mod crc_cache;
pub mod estimate;
pub mod stream;
pub mod structures;

pub use crc_cache::{CachedCrc, CrcCache};
pub use estimate::archive_size;
pub use stream::ZipStream;
pub use structures::*;
