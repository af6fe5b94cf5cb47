//! ZIP64 structures for large entries and large entry counts.

mod common;

use common::{OpenCounter, collect, parse_central_directory, parse_trailer, timestamp};
use quickzip::{CrcCache, ZipSource, ZipStream, archive_size};
use std::io::Cursor;

const BIG: u64 = 5 << 30;

fn big_then_small(opened: OpenCounter) -> Vec<ZipSource> {
    vec![
        ZipSource::new("big.iso")
            .with_content(move || async move {
                opened.hit();
                Ok(tokio::io::empty())
            })
            .with_size(BIG)
            .with_identity_key("/data/big.iso")
            .with_modified(timestamp()),
        ZipSource::new("after.txt")
            .with_bytes(&b"tail"[..])
            .with_modified(timestamp()),
    ]
}

#[tokio::test]
async fn large_entry_uses_zip64_fields() {
    let cache = CrcCache::new();
    cache.insert("/data/big.iso", timestamp(), 0x1234_5678);
    let opened = OpenCounter::default();

    let mut zip = ZipStream::new(big_then_small(opened.clone()).into_iter()).with_cache(cache);
    let size = zip.calculate_size().await.unwrap().unwrap();

    // first byte after big.iso's content
    let start = 30 + 7 + BIG;
    zip.apply_range(start, size - 1).unwrap();
    let tail = collect(&mut zip).await;

    assert_eq!(opened.count(), 0);
    assert_eq!(tail.len() as u64, size - start);
    assert!(zip.is_complete());

    // 24-byte data descriptor
    assert_eq!(&tail[0..4], b"PK\x07\x08");
    assert_eq!(&tail[4..8], &0x1234_5678u32.to_le_bytes());
    assert_eq!(&tail[8..16], &BIG.to_le_bytes());
    assert_eq!(&tail[16..24], &BIG.to_le_bytes());
    assert_eq!(&tail[24..28], b"PK\x03\x04");

    let trailer = parse_trailer(&tail);
    assert!(trailer.zip64);
    assert_eq!(trailer.total_entries, 2);
    let after_offset = start + 24;
    assert_eq!(trailer.cd_offset, after_offset + 30 + 9 + 4 + 16);

    let cd_start = (trailer.cd_offset - start) as usize;
    let cd = &tail[cd_start..cd_start + trailer.cd_size as usize];
    let records = parse_central_directory(cd, 2);

    assert_eq!(records[0].name, "big.iso");
    assert_eq!(records[0].size, BIG);
    assert_eq!(records[0].crc32, 0x1234_5678);
    assert_eq!(records[0].offset, 0);
    assert_eq!(records[0].version, 45);

    assert_eq!(records[1].name, "after.txt");
    assert_eq!(records[1].size, 4);
    assert_eq!(records[1].crc32, crc32fast::hash(b"tail"));
    assert_eq!(records[1].offset, after_offset);
    assert_eq!(records[1].version, 45);

    assert_eq!(zip.archive_entries(), vec!["big.iso", "after.txt"]);
}

#[tokio::test]
async fn estimate_covers_zip64_sizes() {
    let sources = big_then_small(OpenCounter::default());
    let local = (30 + 7 + BIG + 24) + (30 + 9 + 4 + 16);
    let central = (46 + 7 + 4 + 16) + (46 + 9 + 4 + 8);
    assert_eq!(archive_size(&sources), local + central + 56 + 20 + 22);
}

#[tokio::test]
async fn entry_count_limit_switches_to_zip64() {
    let sources: Vec<_> = (0..0xFFFF)
        .map(|i| ZipSource::directory(format!("d{i}")).with_modified(timestamp()))
        .collect();
    let expected = archive_size(&sources);

    let mut zip = ZipStream::new(sources.into_iter());
    let bytes = collect(&mut zip).await;
    assert_eq!(bytes.len() as u64, expected);

    let trailer = parse_trailer(&bytes);
    assert!(trailer.zip64);
    assert_eq!(trailer.total_entries, 0xFFFF);
    assert_eq!(trailer.cd_offset + trailer.cd_size + 56 + 20 + 22, bytes.len() as u64);

    let archive = zip::ZipArchive::new(Cursor::new(&bytes)).unwrap();
    assert_eq!(archive.len(), 0xFFFF);
}
