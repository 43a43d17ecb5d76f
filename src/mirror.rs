//! The in-memory text mirror of the data-zone region.
//!
//! Open reads the whole image once and hands the tail from the first data
//! zone to `Mirror`, which indexes every record by id up front. Records
//! never move: an existing record is only ever rewritten grid-in-place
//! (length preserved), and new records are appended, so the byte offsets in
//! the index stay valid for the whole session. Close writes the text back
//! verbatim after the regenerated metadata region.

use std::collections::BTreeMap;

use crate::config::BLOCK_SIZE;
use crate::error::{FsError, Result};
use crate::record::{self, GRID_LEN};

#[derive(Default)]
pub struct Mirror {
    text: String,
    /// Byte offset of each record's `block-id:` line.
    index: BTreeMap<u32, usize>,
}

impl Mirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index an opened image's data region. Built once; linear text scans
    /// never happen after this.
    pub fn from_text(text: String) -> Self {
        let mut index = BTreeMap::new();
        let mut pos = 0;
        for line in text.split_inclusive('\n') {
            if let Some(rest) = line.strip_prefix("block-id: ")
                && let Ok(id) = rest.trim().parse::<u32>()
            {
                index.entry(id).or_insert(pos);
            }
            pos += line.len();
        }
        Self { text, index }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// The record's text, from its header to the start of the next record.
    fn record(&self, zone: u32) -> Option<&str> {
        let &start = self.index.get(&zone)?;
        let rest = &self.text[start..];
        let end = rest.find("\nblock-id: ").map_or(rest.len(), |p| p + 1);
        Some(&rest[..end])
    }

    /// Decode one zone's payload into `buf`. An absent record is a hole and
    /// reads as zeroes; the return value tells the two apart.
    pub fn read_zone(&self, zone: u32, buf: &mut [u8; BLOCK_SIZE]) -> Result<bool> {
        let Some(rec) = self.record(zone) else {
            buf.fill(0);
            return Ok(false);
        };
        let Some(grid) = record::grid_start(rec) else {
            return Err(FsError::CorruptImage(format!(
                "record {zone} has no data grid"
            )));
        };
        record::decode_grid(&rec.as_bytes()[grid..], buf)?;
        Ok(true)
    }

    /// Write one zone's payload: spliced grid-in-place when the record
    /// exists, appended as a fresh record (with `tag`) when it does not.
    /// An existing record keeps its original header so its length, and with
    /// it every later record's offset, never changes.
    pub fn write_zone(&mut self, zone: u32, tag: &str, data: &[u8]) -> Result<()> {
        let grid = record::encode_grid(data);
        match self.index.get(&zone).copied() {
            Some(start) => {
                let offset = record::grid_start(self.record(zone).expect("indexed record"))
                    .ok_or_else(|| {
                        FsError::CorruptImage(format!("record {zone} has no data grid"))
                    })?;
                let at = start + offset;
                if at + GRID_LEN > self.text.len() {
                    return Err(FsError::CorruptImage(format!("record {zone} is truncated")));
                }
                self.text.replace_range(at..at + GRID_LEN, &grid);
            }
            None => {
                self.index.insert(zone, self.text.len());
                self.text.push_str(&record::record_header(zone, tag));
                self.text.push_str(&grid);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn block(fill: u8) -> [u8; BLOCK_SIZE] {
        [fill; BLOCK_SIZE]
    }

    #[test]
    fn absent_zone_reads_as_hole() {
        let mirror = Mirror::new();
        let mut buf = block(0xff);
        assert!(!mirror.read_zone(42, &mut buf).unwrap());
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn append_then_read_back() {
        let mut mirror = Mirror::new();
        mirror.write_zone(30, "data-block-from-inode-2", &block(0x5a)).unwrap();
        let mut buf = block(0);
        assert!(mirror.read_zone(30, &mut buf).unwrap());
        assert_eq!(buf, block(0x5a));
    }

    #[test]
    fn rewrite_in_place_keeps_length_and_offsets() {
        let mut mirror = Mirror::new();
        mirror.write_zone(30, "data-block-from-inode-2", &block(1)).unwrap();
        mirror.write_zone(31, "data-block-from-inode-2", &block(2)).unwrap();
        let len = mirror.text().len();

        mirror.write_zone(30, "data-block-from-inode-9", &block(3)).unwrap();
        assert_eq!(mirror.text().len(), len);
        // the original header survives the rewrite
        assert!(mirror.text().starts_with("block-id: 30\nFragment-Type: data-block-from-inode-2\n"));

        let mut buf = block(0);
        mirror.read_zone(30, &mut buf).unwrap();
        assert_eq!(buf, block(3));
        mirror.read_zone(31, &mut buf).unwrap();
        assert_eq!(buf, block(2));
    }

    #[test]
    fn reindexing_round_trips() {
        let mut mirror = Mirror::new();
        // out-of-id-order appends, as allocation order produces
        mirror.write_zone(35, "data-block-from-inode-3", &block(7)).unwrap();
        mirror.write_zone(31, "data-block-from-inode-3", &block(8)).unwrap();
        let reopened = Mirror::from_text(mirror.text().to_string());
        let mut buf = block(0);
        assert!(reopened.read_zone(35, &mut buf).unwrap());
        assert_eq!(buf, block(7));
        assert!(reopened.read_zone(31, &mut buf).unwrap());
        assert_eq!(buf, block(8));
    }
}
