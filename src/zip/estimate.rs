//! Exact archive length from source descriptors alone.

use super::structures::{
    CentralDirectoryHeader, DataDescriptor, LocalFileHeader, name_fits, trailer_len,
    zip64_extra_len,
};
use crate::source::ZipSource;

/// Byte length of the archive [`ZipStream`](super::ZipStream) generates for `sources`.
///
/// Relies on each declared `size` matching the content actually read;
/// sources without content count as empty whatever size they declare.
/// A source with content but no declared size is counted as empty too, so
/// the result is exact only when every such source has a size; callers
/// must check that first, as [`ZipStream::calculate_size`](super::ZipStream::calculate_size) does.
/// Sources whose path does not fit a header are left out, matching the
/// stream, which skips them.
pub fn archive_size<'a, I>(sources: I) -> u64
where
    I: IntoIterator<Item = &'a ZipSource>,
{
    let mut offset = 0u64;
    let mut cd_size = 0u64;
    let mut total_entries = 0u64;

    for source in sources.into_iter().filter(|source| name_fits(&source.path)) {
        let name_len = source.path.len() as u64;
        let size = if source.has_content() {
            source.size.unwrap_or(0)
        } else {
            0
        };

        cd_size += CentralDirectoryHeader::MIN_SIZE as u64 + name_len + zip64_extra_len(size, offset);

        offset += LocalFileHeader::SIZE as u64 + name_len + size;
        if source.has_content() {
            offset += DataDescriptor::encoded_len(size);
        }
        total_entries += 1;
    }

    offset + cd_size + trailer_len(total_entries, cd_size, offset)
}
