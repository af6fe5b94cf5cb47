#![allow(dead_code)]

use byteorder::{LittleEndian, ReadBytesExt};
use chrono::{NaiveDate, NaiveDateTime};
use quickzip::{SourceWalker, ZipStream};
use std::io::{Cursor, Read};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

pub fn timestamp() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 9)
        .unwrap()
        .and_hms_opt(10, 30, 42)
        .unwrap()
}

/// Drain a stream into memory.
pub async fn collect<W: SourceWalker>(zip: &mut ZipStream<W>) -> Vec<u8> {
    let mut out = Vec::new();
    while let Some(chunk) = zip.next_chunk().await.unwrap() {
        assert!(!chunk.is_empty());
        out.extend_from_slice(&chunk);
    }
    out
}

/// Counts how many times content openers were invoked.
#[derive(Clone, Default)]
pub struct OpenCounter(Arc<AtomicUsize>);

impl OpenCounter {
    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Yields `data` (if any) then fails with `kind`.
pub struct FailingReader {
    data: Option<Vec<u8>>,
    kind: std::io::ErrorKind,
}

impl FailingReader {
    pub fn new(data: &[u8], kind: std::io::ErrorKind) -> Self {
        Self {
            data: Some(data.to_vec()),
            kind,
        }
    }
}

impl AsyncRead for FailingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.data.take() {
            Some(data) if !data.is_empty() => {
                buf.put_slice(&data);
                Poll::Ready(Ok(()))
            }
            _ => Poll::Ready(Err(std::io::Error::new(self.kind, "disk went away"))),
        }
    }
}

/// End of central directory values, ZIP64 ones when present.
#[derive(Debug)]
pub struct Trailer {
    pub total_entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
    pub zip64: bool,
}

/// Parse the end records of an archive whose last bytes are in `tail`.
pub fn parse_trailer(tail: &[u8]) -> Trailer {
    let eocd = &tail[tail.len() - 22..];
    assert_eq!(&eocd[0..4], b"PK\x05\x06");
    let mut cursor = Cursor::new(&eocd[8..]);
    let total_entries = cursor.read_u16::<LittleEndian>().unwrap() as u64;
    let _disk_entries = cursor.read_u16::<LittleEndian>().unwrap();
    let cd_size = cursor.read_u32::<LittleEndian>().unwrap() as u64;
    let cd_offset = cursor.read_u32::<LittleEndian>().unwrap() as u64;

    if total_entries != 0xFFFF && cd_size != 0xFFFF_FFFF && cd_offset != 0xFFFF_FFFF {
        return Trailer {
            total_entries,
            cd_size,
            cd_offset,
            zip64: false,
        };
    }

    let locator = &tail[tail.len() - 42..tail.len() - 22];
    assert_eq!(&locator[0..4], b"PK\x06\x07");
    let eocd64 = &tail[tail.len() - 98..tail.len() - 42];
    assert_eq!(&eocd64[0..4], b"PK\x06\x06");

    let mut cursor = Cursor::new(&eocd64[4..]);
    assert_eq!(cursor.read_u64::<LittleEndian>().unwrap(), 44);
    assert_eq!(cursor.read_u16::<LittleEndian>().unwrap(), 45);
    assert_eq!(cursor.read_u16::<LittleEndian>().unwrap(), 45);
    cursor.set_position(cursor.position() + 8);
    let total_entries = cursor.read_u64::<LittleEndian>().unwrap();
    assert_eq!(cursor.read_u64::<LittleEndian>().unwrap(), total_entries);
    let cd_size = cursor.read_u64::<LittleEndian>().unwrap();
    let cd_offset = cursor.read_u64::<LittleEndian>().unwrap();

    let mut cursor = Cursor::new(&locator[4..]);
    let _disk = cursor.read_u32::<LittleEndian>().unwrap();
    assert_eq!(cursor.read_u64::<LittleEndian>().unwrap(), cd_offset + cd_size);

    Trailer {
        total_entries,
        cd_size,
        cd_offset,
        zip64: true,
    }
}

/// One central directory record with ZIP64 values resolved.
#[derive(Debug)]
pub struct CentralRecord {
    pub name: String,
    pub version: u16,
    pub flags: u16,
    pub crc32: u32,
    pub size: u64,
    pub offset: u64,
    pub external_attributes: u32,
}

pub fn parse_central_directory(cd: &[u8], count: u64) -> Vec<CentralRecord> {
    let mut cursor = Cursor::new(cd);
    (0..count).map(|_| parse_central_record(&mut cursor)).collect()
}

fn parse_central_record(cursor: &mut Cursor<&[u8]>) -> CentralRecord {
    let mut sig = [0u8; 4];
    cursor.read_exact(&mut sig).unwrap();
    assert_eq!(&sig, b"PK\x01\x02");

    let _version_made_by = cursor.read_u16::<LittleEndian>().unwrap();
    let version = cursor.read_u16::<LittleEndian>().unwrap();
    let flags = cursor.read_u16::<LittleEndian>().unwrap();
    assert_eq!(cursor.read_u16::<LittleEndian>().unwrap(), 0);
    let _time = cursor.read_u16::<LittleEndian>().unwrap();
    let _date = cursor.read_u16::<LittleEndian>().unwrap();
    let crc32 = cursor.read_u32::<LittleEndian>().unwrap();
    let mut compressed = cursor.read_u32::<LittleEndian>().unwrap() as u64;
    let mut size = cursor.read_u32::<LittleEndian>().unwrap() as u64;
    let name_len = cursor.read_u16::<LittleEndian>().unwrap();
    let extra_len = cursor.read_u16::<LittleEndian>().unwrap() as u64;
    let _comment_len = cursor.read_u16::<LittleEndian>().unwrap();
    let _disk = cursor.read_u16::<LittleEndian>().unwrap();
    let _internal = cursor.read_u16::<LittleEndian>().unwrap();
    let external_attributes = cursor.read_u32::<LittleEndian>().unwrap();
    let mut offset = cursor.read_u32::<LittleEndian>().unwrap() as u64;

    let mut name = vec![0u8; name_len as usize];
    cursor.read_exact(&mut name).unwrap();

    let extra_end = cursor.position() + extra_len;
    if extra_len > 0 {
        assert_eq!(cursor.read_u16::<LittleEndian>().unwrap(), 0x0001);
        let _field_size = cursor.read_u16::<LittleEndian>().unwrap();
        if size == 0xFFFF_FFFF {
            size = cursor.read_u64::<LittleEndian>().unwrap();
        }
        if compressed == 0xFFFF_FFFF {
            compressed = cursor.read_u64::<LittleEndian>().unwrap();
        }
        if offset == 0xFFFF_FFFF {
            offset = cursor.read_u64::<LittleEndian>().unwrap();
        }
    }
    assert_eq!(cursor.position(), extra_end);
    assert_eq!(compressed, size);

    CentralRecord {
        name: String::from_utf8(name).unwrap(),
        version,
        flags,
        crc32,
        size,
        offset,
        external_attributes,
    }
}
