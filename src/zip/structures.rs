use byteorder::{LittleEndian, WriteBytesExt};
use chrono::{Datelike, NaiveDateTime, Timelike};
use std::io::{self, Write};

/// Largest value a 4-byte size/offset field can hold before ZIP64 kicks in.
pub const ZIP64_SIZE_LIMIT: u64 = 0xFFFF_FFFF;

/// Largest entry count a 2-byte field can hold before ZIP64 kicks in.
pub const ZIP64_COUNT_LIMIT: u64 = 0xFFFF;

/// Version needed to extract a stored entry.
pub const VERSION_DEFAULT: u16 = 20;

/// Version needed once any ZIP64 structure is involved.
pub const VERSION_ZIP64: u16 = 45;

/// General purpose flags: bit 3 (sizes in data descriptor) + bit 11 (UTF-8 names).
pub const GENERAL_PURPOSE_FLAGS: u16 = 0x0808;

/// Compression method "store".
pub const METHOD_STORED: u16 = 0;

/// Mode applied to sources that do not carry one.
pub const DEFAULT_MODE: u32 = 0o40775;

const S_IFMT: u32 = 0o170000;
const S_IFREG: u32 = 0o100000;

/// Longest file name a 2-byte length field can describe.
pub const MAX_NAME_LEN: usize = u16::MAX as usize;

/// Whether `name` fits the file name length field of the headers.
pub fn name_fits(name: &str) -> bool {
    name.len() <= MAX_NAME_LEN
}

fn name_len(name: &[u8]) -> io::Result<u16> {
    u16::try_from(name.len()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("file name is {} bytes, limit is {MAX_NAME_LEN}", name.len()),
        )
    })
}

/// Header id of the ZIP64 extended information extra field.
const ZIP64_EXTRA_ID: u16 = 0x0001;

/// MS-DOS packed date and time, as stored in every header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DosDateTime {
    pub time: u16,
    pub date: u16,
}

impl DosDateTime {
    /// Pack a wall-clock timestamp. Seconds lose their lowest bit.
    pub fn from_datetime(ts: &NaiveDateTime) -> Self {
        let year = ((ts.year() - 1980) & 0x7F) as u16;
        let date = (year << 9) | ((ts.month() as u16) << 5) | ts.day() as u16;
        let time = ((ts.hour() as u16) << 11) | ((ts.minute() as u16) << 5) | (ts.second() / 2) as u16;
        Self { time, date }
    }

    /// Unpack the date to (year, month, day)
    pub fn ymd(&self) -> (u16, u8, u8) {
        let day = (self.date & 0x1F) as u8;
        let month = ((self.date >> 5) & 0x0F) as u8;
        let year = ((self.date >> 9) & 0x7F) + 1980;
        (year, month, day)
    }

    /// Unpack the time to (hour, minute, second)
    pub fn hms(&self) -> (u8, u8, u8) {
        let second = ((self.time & 0x1F) * 2) as u8;
        let minute = ((self.time >> 5) & 0x3F) as u8;
        let hour = ((self.time >> 11) & 0x1F) as u8;
        (hour, minute, second)
    }
}

/// External attributes word for a unix mode.
///
/// The mode lives in the upper 16 bits. Bare permission bits are marked
/// as a regular file; a zero mode yields zero attributes.
pub fn external_attributes(mode: u32) -> u32 {
    if mode == 0 {
        return 0;
    }
    let mode = if mode & S_IFMT == 0 { mode | S_IFREG } else { mode };
    mode << 16
}

/// Byte length of the ZIP64 extra field needed by a central directory record.
pub fn zip64_extra_len(size: u64, offset: u64) -> u64 {
    let fields = zip64_extra_fields(size, offset).len() as u64;
    if fields == 0 { 0 } else { 4 + 8 * fields }
}

/// Values carried in the ZIP64 extra field, in APPNOTE order:
/// uncompressed size, compressed size, local header offset.
///
/// A value equal to the limit is moved too, since `0xFFFFFFFF` in the
/// fixed record tells readers to look in the extra field.
fn zip64_extra_fields(size: u64, offset: u64) -> Vec<u64> {
    let mut fields = Vec::with_capacity(3);
    if size >= ZIP64_SIZE_LIMIT {
        fields.push(size);
        fields.push(size);
    }
    if offset >= ZIP64_SIZE_LIMIT {
        fields.push(offset);
    }
    fields
}

/// Local File Header (LFH) - 30 bytes + file name
///
/// CRC and sizes are always zero here; the real values follow the
/// content in a [`DataDescriptor`].
pub struct LocalFileHeader<'a> {
    pub modified: DosDateTime,
    pub file_name: &'a [u8],
}

impl LocalFileHeader<'_> {
    pub const SIGNATURE: &'static [u8] = b"PK\x03\x04";
    pub const SIZE: usize = 30;

    pub fn encoded_len(&self) -> u64 {
        (Self::SIZE + self.file_name.len()) as u64
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let name_len = name_len(self.file_name)?;
        w.write_all(Self::SIGNATURE)?;
        w.write_u16::<LittleEndian>(VERSION_DEFAULT)?;
        w.write_u16::<LittleEndian>(GENERAL_PURPOSE_FLAGS)?;
        w.write_u16::<LittleEndian>(METHOD_STORED)?;
        w.write_u16::<LittleEndian>(self.modified.time)?;
        w.write_u16::<LittleEndian>(self.modified.date)?;
        w.write_u32::<LittleEndian>(0)?; // crc
        w.write_u32::<LittleEndian>(0)?; // compressed size
        w.write_u32::<LittleEndian>(0)?; // uncompressed size
        w.write_u16::<LittleEndian>(name_len)?;
        w.write_u16::<LittleEndian>(0)?; // extra field length
        w.write_all(self.file_name)
    }
}

/// Data descriptor trailing an entry's content - 16 bytes, 24 with ZIP64 sizes
pub struct DataDescriptor {
    pub crc32: u32,
    pub size: u64,
}

impl DataDescriptor {
    pub const SIGNATURE: &'static [u8] = b"PK\x07\x08";

    pub fn encoded_len(size: u64) -> u64 {
        if size > ZIP64_SIZE_LIMIT { 24 } else { 16 }
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(Self::SIGNATURE)?;
        w.write_u32::<LittleEndian>(self.crc32)?;
        if self.size > ZIP64_SIZE_LIMIT {
            w.write_u64::<LittleEndian>(self.size)?;
            w.write_u64::<LittleEndian>(self.size)
        } else {
            w.write_u32::<LittleEndian>(self.size as u32)?;
            w.write_u32::<LittleEndian>(self.size as u32)
        }
    }
}

/// Everything the central directory needs to know about an emitted entry.
#[derive(Debug, Clone)]
pub struct EntryRecord {
    pub file_name: String,
    pub size: u64,
    pub crc32: u32,
    pub modified: NaiveDateTime,
    /// Offset of the entry's local file header.
    pub offset: u64,
    pub version_needed: u16,
    pub external_attributes: u32,
}

impl EntryRecord {
    pub fn is_directory(&self) -> bool {
        self.file_name.ends_with('/')
    }

    /// Length of this entry's central directory record.
    pub fn central_directory_len(&self) -> u64 {
        (CentralDirectoryHeader::MIN_SIZE + self.file_name.len()) as u64
            + zip64_extra_len(self.size, self.offset)
    }
}

/// Central Directory File Header (CDFH) - 46 bytes + name + ZIP64 extra
pub struct CentralDirectoryHeader<'a> {
    pub entry: &'a EntryRecord,
}

impl CentralDirectoryHeader<'_> {
    pub const SIGNATURE: &'static [u8] = b"PK\x01\x02";
    pub const MIN_SIZE: usize = 46;

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let entry = self.entry;
        let extra = zip64_extra_fields(entry.size, entry.offset);
        let version = if extra.is_empty() {
            entry.version_needed
        } else {
            entry.version_needed.max(VERSION_ZIP64)
        };
        let size = entry.size.min(ZIP64_SIZE_LIMIT) as u32;
        let offset = entry.offset.min(ZIP64_SIZE_LIMIT) as u32;
        let extra_len = zip64_extra_len(entry.size, entry.offset) as u16;
        let modified = DosDateTime::from_datetime(&entry.modified);
        let name_len = name_len(entry.file_name.as_bytes())?;

        w.write_all(Self::SIGNATURE)?;
        w.write_u16::<LittleEndian>(version)?; // made by
        w.write_u16::<LittleEndian>(version)?; // needed
        w.write_u16::<LittleEndian>(GENERAL_PURPOSE_FLAGS)?;
        w.write_u16::<LittleEndian>(METHOD_STORED)?;
        w.write_u16::<LittleEndian>(modified.time)?;
        w.write_u16::<LittleEndian>(modified.date)?;
        w.write_u32::<LittleEndian>(entry.crc32)?;
        w.write_u32::<LittleEndian>(size)?; // compressed
        w.write_u32::<LittleEndian>(size)?;
        w.write_u16::<LittleEndian>(name_len)?;
        w.write_u16::<LittleEndian>(extra_len)?;
        w.write_u16::<LittleEndian>(0)?; // comment length
        w.write_u16::<LittleEndian>(0)?; // disk number start
        w.write_u16::<LittleEndian>(0)?; // internal attributes
        w.write_u32::<LittleEndian>(entry.external_attributes)?;
        w.write_u32::<LittleEndian>(offset)?;
        w.write_all(entry.file_name.as_bytes())?;
        if !extra.is_empty() {
            w.write_u16::<LittleEndian>(ZIP64_EXTRA_ID)?;
            w.write_u16::<LittleEndian>(8 * extra.len() as u16)?;
            for value in extra {
                w.write_u64::<LittleEndian>(value)?;
            }
        }
        Ok(())
    }
}

/// ZIP64 End of Central Directory - 56 bytes
pub struct Zip64EOCD {
    pub total_entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
}

impl Zip64EOCD {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x06";
    pub const SIZE: usize = 56;

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(Self::SIGNATURE)?;
        // size of the remaining record
        w.write_u64::<LittleEndian>((Self::SIZE - 12) as u64)?;
        w.write_u16::<LittleEndian>(VERSION_ZIP64)?;
        w.write_u16::<LittleEndian>(VERSION_ZIP64)?;
        w.write_u32::<LittleEndian>(0)?; // this disk
        w.write_u32::<LittleEndian>(0)?; // disk with cd
        w.write_u64::<LittleEndian>(self.total_entries)?;
        w.write_u64::<LittleEndian>(self.total_entries)?;
        w.write_u64::<LittleEndian>(self.cd_size)?;
        w.write_u64::<LittleEndian>(self.cd_offset)
    }
}

/// ZIP64 End of Central Directory Locator - 20 bytes
pub struct Zip64EOCDLocator {
    pub eocd64_offset: u64,
}

impl Zip64EOCDLocator {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x07";
    pub const SIZE: usize = 20;

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(Self::SIGNATURE)?;
        w.write_u32::<LittleEndian>(0)?;
        w.write_u64::<LittleEndian>(self.eocd64_offset)?;
        w.write_u32::<LittleEndian>(1)
    }
}

/// End of Central Directory (EOCD) - 22 bytes, no comment
pub struct EndOfCentralDirectory {
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8] = b"PK\x05\x06";
    pub const SIZE: usize = 22;

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(Self::SIGNATURE)?;
        w.write_u16::<LittleEndian>(0)?; // disk number
        w.write_u16::<LittleEndian>(0)?; // disk with cd
        w.write_u16::<LittleEndian>(self.total_entries)?;
        w.write_u16::<LittleEndian>(self.total_entries)?;
        w.write_u32::<LittleEndian>(self.cd_size)?;
        w.write_u32::<LittleEndian>(self.cd_offset)?;
        w.write_u16::<LittleEndian>(0) // comment length
    }
}

/// Whether the archive trailer needs the ZIP64 end records.
pub fn needs_zip64_trailer(total_entries: u64, cd_size: u64, cd_offset: u64) -> bool {
    total_entries >= ZIP64_COUNT_LIMIT || cd_offset >= ZIP64_SIZE_LIMIT || cd_size >= ZIP64_SIZE_LIMIT
}

/// Length of everything after the last central directory record.
pub fn trailer_len(total_entries: u64, cd_size: u64, cd_offset: u64) -> u64 {
    let zip64 = if needs_zip64_trailer(total_entries, cd_size, cd_offset) {
        (Zip64EOCD::SIZE + Zip64EOCDLocator::SIZE) as u64
    } else {
        0
    };
    zip64 + EndOfCentralDirectory::SIZE as u64
}

/// Write the end records for a central directory of `cd_size` bytes at `cd_offset`.
pub fn write_trailer<W: Write>(
    w: &mut W,
    total_entries: u64,
    cd_size: u64,
    cd_offset: u64,
) -> io::Result<()> {
    let eocd = if needs_zip64_trailer(total_entries, cd_size, cd_offset) {
        Zip64EOCD {
            total_entries,
            cd_size,
            cd_offset,
        }
        .write_to(w)?;
        Zip64EOCDLocator {
            eocd64_offset: cd_offset + cd_size,
        }
        .write_to(w)?;
        EndOfCentralDirectory {
            total_entries: ZIP64_COUNT_LIMIT as u16,
            cd_size: ZIP64_SIZE_LIMIT as u32,
            cd_offset: ZIP64_SIZE_LIMIT as u32,
        }
    } else {
        EndOfCentralDirectory {
            total_entries: total_entries as u16,
            cd_size: cd_size as u32,
            cd_offset: cd_offset as u32,
        }
    };
    eocd.write_to(w)
}
