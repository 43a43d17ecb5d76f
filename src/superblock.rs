//! Bootblock and superblock records: pure `key: value` lines, no data grid.

use std::fmt::Write as _;

use crate::config::*;
use crate::error::Result;
use crate::record::{SUPERBLOCK_TAG, field, field_num};
use crate::structs::{Bootblock, Superblock};

pub(crate) fn write_bootblock(out: &mut String, bb: &Bootblock) {
    let _ = writeln!(out, "block-id: {BOOT_BLOCK}");
    let _ = writeln!(out, "Fragment-Type: {}", bb.fragment_type);
    let _ = writeln!(out, "encoding: {}", bb.encoding);
    let _ = writeln!(out);
}

pub(crate) fn write_superblock(out: &mut String, sb: &Superblock) {
    let _ = writeln!(out, "block-id: {SUPER_BLOCK}");
    let _ = writeln!(out, "Fragment-Type: {SUPERBLOCK_TAG}");
    let _ = writeln!(out, "file system-state: {}", sb.state);
    let _ = writeln!(out, "zone-bitmap-size_blocks: {}", sb.zmap_blocks);
    let _ = writeln!(out, "inode-bitmap-size_blocks: {}", sb.imap_blocks);
    let _ = writeln!(out, "number-of-inodes: {}", sb.ninodes);
    let _ = writeln!(out, "number-of-blocks: {}", sb.size_blocks);
    let _ = writeln!(out, "first-data-block: {}", sb.first_data_zone);
    let _ = writeln!(out);
}

pub(crate) fn parse_bootblock(record: &str) -> Bootblock {
    Bootblock {
        fragment_type: field(record, "Fragment-Type")
            .unwrap_or(PARTITION_DESCRIPTION)
            .to_string(),
        encoding: field(record, "encoding").unwrap_or(IMAGE_ENCODING).to_string(),
    }
}

pub(crate) fn parse_superblock(record: &str) -> Result<Superblock> {
    Ok(Superblock {
        state: field_num(record, "file system-state")?,
        zmap_blocks: field_num(record, "zone-bitmap-size_blocks")?,
        imap_blocks: field_num(record, "inode-bitmap-size_blocks")?,
        ninodes: field_num(record, "number-of-inodes")?,
        size_blocks: field_num(record, "number-of-blocks")?,
        first_data_zone: field_num(record, "first-data-block")?,
    })
}
