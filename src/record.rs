//! The textual block record codec.
//!
//! A data-bearing record serializes one 512-byte block as a fixed-width
//! hex/ASCII grid: 32 rows of 16 bytes, each row prefixed with a 3-digit
//! decimal offset and a tab, every byte as two lowercase hex digits and a
//! space (byte 7 gets a second space), closed with ` |`, 16 ASCII cells and
//! `|`. The grid ends with a blank line. Decoding indexes straight into the
//! fixed columns; it never tokenizes.
//!
//! The grid is always exactly [`GRID_LEN`] bytes, which is what makes
//! in-place rewrites of an allocated record safe: every other record's byte
//! offset depends on it.

use std::fmt::Write as _;
use std::str::FromStr;

use crate::config::BLOCK_SIZE;
use crate::error::{FsError, Result};

pub(crate) const ROW_BYTES: usize = 16;
pub(crate) const GRID_ROWS: usize = BLOCK_SIZE / ROW_BYTES;
/// `NNN:` plus a tab.
const ROW_PREFIX: usize = 5;
/// Prefix + 16 hex cells + the byte-7 gap + ` |` + 16 ASCII cells + `|`.
const ROW_CHARS: usize = ROW_PREFIX + ROW_BYTES * 3 + 1 + 2 + ROW_BYTES + 1;
pub(crate) const ROW_STRIDE: usize = ROW_CHARS + 1;
/// Full grid including the closing blank line.
pub(crate) const GRID_LEN: usize = GRID_ROWS * ROW_STRIDE + 1;

// Fragment-Type tags.
pub(crate) const SUPERBLOCK_TAG: &str = "superblock";
pub(crate) const ZONE_BITMAP_TAG: &str = "zone-bitmap";
pub(crate) const INODE_BITMAP_TAG: &str = "inode-bitmap";
/// The root directory block written by mkfs.
pub(crate) const ROOT_BLOCK_TAG: &str = "index-block";

pub(crate) fn data_block_tag(ino: u16) -> String {
    format!("data-block-from-inode-{ino}")
}

pub(crate) fn index_block_tag(ino: u16) -> String {
    format!("index-block-from-inode-{ino}")
}

/// The two header lines every record opens with.
pub(crate) fn record_header(id: u32, tag: &str) -> String {
    format!("block-id: {id}\nFragment-Type: {tag}\n")
}

/// Serialize one block as a grid. The output length is the codec invariant
/// the whole image depends on, so it is checked here and nowhere else.
pub(crate) fn encode_grid(data: &[u8]) -> String {
    debug_assert_eq!(data.len(), BLOCK_SIZE);
    let mut out = String::with_capacity(GRID_LEN);
    for (row, chunk) in data.chunks(ROW_BYTES).enumerate() {
        let _ = write!(out, "{:03}:\t", row * ROW_BYTES);
        for (i, &b) in chunk.iter().enumerate() {
            let _ = write!(out, "{b:02x} ");
            if i == 7 {
                out.push(' ');
            }
        }
        out.push_str(" |");
        for &b in chunk {
            out.push(if (33..127).contains(&b) { b as char } else { ' ' });
        }
        out.push('|');
        out.push('\n');
    }
    out.push('\n');
    assert_eq!(out.len(), GRID_LEN, "grid length invariant violated");
    out
}

/// Recover the block bytes from a grid by fixed-offset extraction.
pub(crate) fn decode_grid(text: &[u8], out: &mut [u8; BLOCK_SIZE]) -> Result<()> {
    if text.len() < GRID_LEN {
        return Err(FsError::CorruptImage("truncated block grid".into()));
    }
    for row in 0..GRID_ROWS {
        let base = row * ROW_STRIDE;
        for i in 0..ROW_BYTES {
            // Three columns per byte, one extra column after byte 7.
            let col = base + ROW_PREFIX + i * 3 + usize::from(i >= 8);
            let hi = hex_val(text[col])?;
            let lo = hex_val(text[col + 1])?;
            out[row * ROW_BYTES + i] = hi << 4 | lo;
        }
    }
    Ok(())
}

fn hex_val(c: u8) -> Result<u8> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(FsError::CorruptImage(format!(
            "bad hex digit {:?} in block grid",
            c as char
        ))),
    }
}

/// Offset of the grid within one record's text, if it has one.
pub(crate) fn grid_start(record: &str) -> Option<usize> {
    record.find("\n000:\t").map(|p| p + 1)
}

/// Line-anchored `key: value` lookup within one record's text.
pub(crate) fn field<'a>(record: &'a str, key: &str) -> Option<&'a str> {
    record
        .lines()
        .find_map(|line| line.strip_prefix(key)?.strip_prefix(": "))
        .map(str::trim)
}

pub(crate) fn field_num<T: FromStr>(record: &str, key: &str) -> Result<T> {
    field(record, key)
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| FsError::CorruptImage(format!("missing or malformed `{key}` field")))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn grid_round_trips_all_byte_values() {
        let mut block = [0u8; BLOCK_SIZE];
        for (i, b) in block.iter_mut().enumerate() {
            *b = (i % 256) as u8;
        }
        let grid = encode_grid(&block);
        assert_eq!(grid.len(), GRID_LEN);
        let mut out = [0xaau8; BLOCK_SIZE];
        decode_grid(grid.as_bytes(), &mut out).unwrap();
        assert_eq!(block[..], out[..]);
    }

    #[test]
    fn grid_row_geometry() {
        let grid = encode_grid(&[0u8; BLOCK_SIZE]);
        let rows: Vec<&str> = grid.lines().collect();
        // 32 rows plus the closing blank line
        assert_eq!(rows.len(), GRID_ROWS + 1);
        assert_eq!(rows[GRID_ROWS], "");
        assert!(rows[0].starts_with("000:\t"));
        assert!(rows[1].starts_with("016:\t"));
        assert!(rows[31].starts_with("496:\t"));
        assert_eq!(rows[0].len(), ROW_CHARS);
        // byte 7 is followed by two spaces, byte 8 starts at column 30
        assert_eq!(&rows[0][26..31], "00  0");
        // the ASCII fence: all-zero bytes render as blanks
        assert!(rows[0].ends_with(" |                |"));
    }

    #[test]
    fn gap_boundary_bytes_survive() {
        let mut block = [0u8; BLOCK_SIZE];
        block[7] = 0xde;
        block[8] = 0xad;
        block[503] = 0xbe;
        block[504] = 0xef;
        let mut out = [0u8; BLOCK_SIZE];
        decode_grid(encode_grid(&block).as_bytes(), &mut out).unwrap();
        assert_eq!(block[..], out[..]);
    }

    #[test]
    fn printable_bytes_show_in_ascii_column() {
        let mut block = [0u8; BLOCK_SIZE];
        block[..5].copy_from_slice(b"hello");
        let grid = encode_grid(&block);
        let first = grid.lines().next().unwrap();
        assert!(first.ends_with("|hello           |"));
    }

    #[test]
    fn decode_rejects_mangled_hex() {
        let mut grid = encode_grid(&[0u8; BLOCK_SIZE]).into_bytes();
        grid[ROW_PREFIX] = b'x';
        let mut out = [0u8; BLOCK_SIZE];
        assert!(matches!(
            decode_grid(&grid, &mut out),
            Err(FsError::CorruptImage(_))
        ));
    }

    #[test]
    fn field_lookup_is_line_anchored() {
        let rec = "block-id: 7\nFragment-Type: inode-3\nindirect-data-zone: 9\n\
                   double-indirect-data-zone: 12\n\n";
        assert_eq!(field(rec, "block-id"), Some("7"));
        assert_eq!(field_num::<u32>(rec, "indirect-data-zone").unwrap(), 9);
        assert_eq!(
            field_num::<u32>(rec, "double-indirect-data-zone").unwrap(),
            12
        );
        assert!(field(rec, "atime").is_none());
    }
}
