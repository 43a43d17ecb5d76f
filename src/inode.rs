//! Inode records and the logical-block address translator.
//!
//! A file's logical block index resolves through three tiers: 7 direct zone
//! slots in the inode, one single-indirect index block of 256 zone numbers,
//! and one double-indirect tier of 256 × 256. Zone number 0 is a hole at
//! every level; reads of a hole yield zeroes, writes allocate the zone and
//! whatever index blocks are needed to link it in, and frees collapse index
//! levels bottom-up as their last live entry disappears.

use std::fmt::Write as _;

use crate::config::*;
use crate::error::{FsError, Result};
use crate::fs::TextFs;
use crate::record::{data_block_tag, field_num, index_block_tag};
use crate::structs::Inode;

type IndexTable = [u16; ZONES_PER_INDEX];

pub(crate) fn write_inode_record(out: &mut String, id: u32, ino: u16, inode: &Inode) {
    let _ = writeln!(out, "block-id: {id}");
    let _ = writeln!(out, "Fragment-Type: inode-{ino}");
    let _ = writeln!(out, "file-type: {:06}", inode.mode);
    let _ = writeln!(out, "links-to-file: {}", inode.nlinks);
    for (j, zone) in inode.zones.iter().enumerate() {
        let _ = writeln!(out, "data-zone[{j}]: {zone}");
    }
    let _ = writeln!(out, "indirect-data-zone: {}", inode.indirect);
    let _ = writeln!(out, "double-indirect-data-zone: {}", inode.double_indirect);
    let _ = writeln!(out, "file-size-in-bytes: {:03}", inode.size);
    let _ = writeln!(out, "atime: {}", inode.atime);
    let _ = writeln!(out);
}

pub(crate) fn parse_inode_record(record: &str) -> Result<Inode> {
    let mut zones = [0u32; NUM_DIRECT_ZONES];
    for (j, zone) in zones.iter_mut().enumerate() {
        *zone = field_num(record, &format!("data-zone[{j}]"))?;
    }
    Ok(Inode {
        mode: field_num(record, "file-type")?,
        nlinks: field_num(record, "links-to-file")?,
        zones,
        indirect: field_num(record, "indirect-data-zone")?,
        double_indirect: field_num(record, "double-indirect-data-zone")?,
        size: field_num(record, "file-size-in-bytes")?,
        atime: field_num(record, "atime")?,
        ..Inode::default()
    })
}

impl TextFs {
    /// Resolve a logical block index to a zone number. Zero means hole.
    pub(crate) fn zone_of(&self, inode: &Inode, blk: u32) -> Result<u32> {
        let blk = blk as usize;
        if blk < NUM_DIRECT_ZONES {
            return Ok(inode.zones[blk]);
        }

        let blk = blk - NUM_DIRECT_ZONES;
        if blk < ZONES_PER_INDEX {
            if inode.indirect == 0 {
                return Ok(0);
            }
            let table = self.read_index(inode.indirect)?;
            return Ok(table[blk] as u32);
        }

        let blk = blk - ZONES_PER_INDEX;
        if blk < ZONES_PER_INDEX * ZONES_PER_INDEX {
            if inode.double_indirect == 0 {
                return Ok(0);
            }
            let outer = self.read_index(inode.double_indirect)?;
            let inner_zone = outer[blk / ZONES_PER_INDEX];
            if inner_zone == 0 {
                return Ok(0);
            }
            let inner = self.read_index(inner_zone as u32)?;
            return Ok(inner[blk % ZONES_PER_INDEX] as u32);
        }

        Err(FsError::FileTooLarge)
    }

    /// An index block as a table of zone numbers. Unwritten index zones read
    /// as all holes, like any other unwritten block.
    fn read_index(&self, zone: u32) -> Result<IndexTable> {
        let mut buf = [0u8; BLOCK_SIZE];
        self.mirror.read_zone(zone, &mut buf)?;
        let mut table = [0u16; ZONES_PER_INDEX];
        for (i, entry) in table.iter_mut().enumerate() {
            *entry = u16::from_le_bytes([buf[2 * i], buf[2 * i + 1]]);
        }
        Ok(table)
    }

    fn write_index(&mut self, zone: u32, ino: u16, table: &IndexTable) -> Result<()> {
        let mut buf = [0u8; BLOCK_SIZE];
        for (i, entry) in table.iter().enumerate() {
            buf[2 * i..2 * i + 2].copy_from_slice(&entry.to_le_bytes());
        }
        self.mirror.write_zone(zone, &index_block_tag(ino), &buf)
    }

    /// Point logical block `blk` of `ino` at `zone`, allocating intermediate
    /// index blocks as needed. A previously mapped zone is released.
    pub(crate) fn attach_zone(&mut self, ino: u16, blk: u32, zone: u32) -> Result<()> {
        let mut inode = self.get_inode(ino)?;
        let blk = blk as usize;

        if blk < NUM_DIRECT_ZONES {
            let old = inode.zones[blk];
            if old != 0 && old != zone {
                self.free_zone(old);
            }
            inode.zones[blk] = zone;
            self.put_inode(ino, &inode);
            return Ok(());
        }

        let idx = blk - NUM_DIRECT_ZONES;
        if idx < ZONES_PER_INDEX {
            let mut table;
            if inode.indirect == 0 {
                inode.indirect = self.alloc_zone()?;
                table = [0u16; ZONES_PER_INDEX];
            } else {
                table = self.read_index(inode.indirect)?;
                let old = table[idx] as u32;
                if old != 0 && old != zone {
                    self.free_zone(old);
                }
            }
            table[idx] = zone as u16;
            self.write_index(inode.indirect, ino, &table)?;
            self.put_inode(ino, &inode);
            return Ok(());
        }

        let idx = idx - ZONES_PER_INDEX;
        if idx < ZONES_PER_INDEX * ZONES_PER_INDEX {
            let mut outer;
            if inode.double_indirect == 0 {
                inode.double_indirect = self.alloc_zone()?;
                outer = [0u16; ZONES_PER_INDEX];
            } else {
                outer = self.read_index(inode.double_indirect)?;
            }
            let (oi, ii) = (idx / ZONES_PER_INDEX, idx % ZONES_PER_INDEX);

            let inner_zone;
            let mut inner;
            if outer[oi] == 0 {
                inner_zone = self.alloc_zone()?;
                outer[oi] = inner_zone as u16;
                self.write_index(inode.double_indirect, ino, &outer)?;
                inner = [0u16; ZONES_PER_INDEX];
            } else {
                inner_zone = outer[oi] as u32;
                inner = self.read_index(inner_zone)?;
                let old = inner[ii] as u32;
                if old != 0 && old != zone {
                    self.free_zone(old);
                }
            }
            inner[ii] = zone as u16;
            self.write_index(inner_zone, ino, &inner)?;
            self.put_inode(ino, &inode);
            return Ok(());
        }

        Err(FsError::FileTooLarge)
    }

    /// Drop the mapping at logical block `blk`, releasing its zone. When the
    /// freed slot was the last live entry of an index block, that index zone
    /// is released too, bottom-up.
    pub(crate) fn release_zone_at(&mut self, ino: u16, blk: u32) -> Result<()> {
        let mut inode = self.get_inode(ino)?;
        let blk = blk as usize;

        if blk < NUM_DIRECT_ZONES {
            if inode.zones[blk] != 0 {
                self.free_zone(inode.zones[blk]);
            }
            inode.zones[blk] = 0;
            self.put_inode(ino, &inode);
            return Ok(());
        }

        let idx = blk - NUM_DIRECT_ZONES;
        if idx < ZONES_PER_INDEX {
            if inode.indirect == 0 {
                return Ok(());
            }
            let mut table = self.read_index(inode.indirect)?;
            if table[idx] != 0 {
                self.free_zone(table[idx] as u32);
            }
            table[idx] = 0;
            if table.iter().any(|&z| z != 0) {
                return self.write_index(inode.indirect, ino, &table);
            }
            self.free_zone(inode.indirect);
            inode.indirect = 0;
            self.put_inode(ino, &inode);
            return Ok(());
        }

        let idx = idx - ZONES_PER_INDEX;
        if idx < ZONES_PER_INDEX * ZONES_PER_INDEX {
            if inode.double_indirect == 0 {
                return Ok(());
            }
            let mut outer = self.read_index(inode.double_indirect)?;
            let (oi, ii) = (idx / ZONES_PER_INDEX, idx % ZONES_PER_INDEX);
            if outer[oi] == 0 {
                return Ok(());
            }
            let inner_zone = outer[oi] as u32;
            let mut inner = self.read_index(inner_zone)?;
            if inner[ii] != 0 {
                self.free_zone(inner[ii] as u32);
            }
            inner[ii] = 0;
            if inner.iter().any(|&z| z != 0) {
                return self.write_index(inner_zone, ino, &inner);
            }
            self.free_zone(inner_zone);
            outer[oi] = 0;
            if outer.iter().any(|&z| z != 0) {
                return self.write_index(inode.double_indirect, ino, &outer);
            }
            self.free_zone(inode.double_indirect);
            inode.double_indirect = 0;
            self.put_inode(ino, &inode);
            return Ok(());
        }

        Err(FsError::FileTooLarge)
    }

    /// Read one logical block into `buf`. Returns the number of valid bytes:
    /// the full block, the partial tail at end-of-file, or 0 for a hole or a
    /// block past the end. The buffer is zero-filled beyond the valid bytes,
    /// holes included.
    pub fn read_block(&self, ino: u16, blk: u32, buf: &mut [u8; BLOCK_SIZE]) -> Result<usize> {
        let inode = self.get_inode(ino)?;
        if (blk as u64) * BLOCK_SIZE as u64 > inode.size as u64 {
            buf.fill(0);
            return Ok(0);
        }
        let zone = self.zone_of(&inode, blk)?;
        if zone == 0 {
            buf.fill(0);
            return Ok(0);
        }

        let mut valid = BLOCK_SIZE;
        if inode.size as usize / BLOCK_SIZE == blk as usize {
            valid = inode.size as usize % BLOCK_SIZE;
        }
        self.mirror.read_zone(zone, buf)?;
        buf[valid..].fill(0);
        Ok(valid)
    }

    /// Write one logical block, allocating its zone and any index blocks on
    /// the way. Does not extend the byte size; callers maintain it through
    /// [`TextFs::truncate`].
    pub fn write_block(&mut self, ino: u16, blk: u32, buf: &[u8; BLOCK_SIZE]) -> Result<()> {
        let inode = self.get_inode(ino)?;
        let tag = if inode.is_dir() {
            index_block_tag(ino)
        } else {
            data_block_tag(ino)
        };

        match self.zone_of(&inode, blk)? {
            0 => {
                let zone = self.alloc_zone()?;
                self.mirror.write_zone(zone, &tag, buf)?;
                self.attach_zone(ino, blk, zone)
            }
            zone => self.mirror.write_zone(zone, &tag, buf),
        }
    }

    /// Trim (or declare) the file size. Shrinking walks every logical block
    /// past the new end and releases it. Device specials are left alone.
    pub fn truncate(&mut self, ino: u16, size: u32) -> Result<()> {
        let inode = self.get_inode(ino)?;
        if inode.is_device() {
            return Ok(());
        }
        if size < inode.size {
            let first = size.div_ceil(BLOCK_SIZE as u32);
            let end = inode.size.div_ceil(BLOCK_SIZE as u32);
            for blk in first..end {
                self.release_zone_at(ino, blk)?;
            }
        }
        // releases rewrote the zone pointers, fetch again before sizing
        let mut inode = self.get_inode(ino)?;
        inode.size = size;
        self.put_inode(ino, &inode);
        Ok(())
    }
}
