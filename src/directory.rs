//! Fixed-slot directory management.
//!
//! A directory's content is an ordinary file carved into 32-byte slots,
//! subject to the same block address translation as any other file. Lookups
//! scan slots in order; adds reuse the first free slot or grow the file by
//! one slot; removals either shrink the file (last slot) or punch a hole
//! that a later add will fill.

use crate::config::*;
use crate::error::{FsError, Result};
use crate::fs::TextFs;
use crate::structs::DirEntry;

/// Compare a queried name against a stored slot name. The query terminates
/// at `/` or NUL, the stored name at NUL or the slot boundary.
pub(crate) fn name_matches(query: &str, stored: &[u8]) -> bool {
    let query = query.as_bytes();
    for (i, &s) in stored.iter().enumerate() {
        let mut c = query.get(i).copied().unwrap_or(0);
        if c == b'/' {
            c = 0;
        }
        if c == 0 {
            return s == 0;
        }
        if c != s {
            return false;
        }
    }
    true
}

impl TextFs {
    /// Locate `name` in a directory: its inode plus the (block, offset) of
    /// the slot holding it.
    pub(crate) fn lookup_slot(&self, dir: u16, name: &str) -> Result<(u16, u32, usize)> {
        let dir_inode = self.get_inode(dir)?;
        let mut buf = [0u8; BLOCK_SIZE];
        for blk in 0..dir_inode.block_span() {
            let valid = self.read_block(dir, blk, &mut buf)?;
            for off in (0..valid).step_by(DIR_ENTRY_SIZE) {
                let entry = DirEntry::decode(&buf[off..off + DIR_ENTRY_SIZE]);
                if entry.inode == 0 {
                    continue;
                }
                if name_matches(name, &entry.name) {
                    return Ok((entry.inode, blk, off));
                }
            }
        }
        Err(FsError::NotFound)
    }

    pub fn dir_lookup(&self, dir: u16, name: &str) -> Result<u16> {
        self.lookup_slot(dir, name).map(|(ino, _, _)| ino)
    }

    /// Add an entry for `ino` under `name`. The first free slot before
    /// end-of-file is reused; otherwise the directory grows by one slot,
    /// allocating a fresh block when the previous one is exactly full.
    pub fn dir_add(&mut self, dir: u16, name: &str, ino: u16) -> Result<()> {
        let entry = DirEntry::new(ino, name)?;
        let dir_inode = self.get_inode(dir)?;
        let mut buf = [0u8; BLOCK_SIZE];

        for blk in 0..dir_inode.block_span() {
            let valid = self.read_block(dir, blk, &mut buf)?;
            for off in (0..valid).step_by(DIR_ENTRY_SIZE) {
                if DirEntry::decode(&buf[off..off + DIR_ENTRY_SIZE]).inode == 0 {
                    entry.encode(&mut buf[off..off + DIR_ENTRY_SIZE]);
                    return self.write_block(dir, blk, &buf);
                }
            }
        }

        // no free slot: extend by one
        let off = dir_inode.size as usize % BLOCK_SIZE;
        let blk = dir_inode.size / BLOCK_SIZE as u32;
        if off == 0 {
            buf.fill(0);
        } else {
            self.read_block(dir, blk, &mut buf)?;
        }
        entry.encode(&mut buf[off..off + DIR_ENTRY_SIZE]);

        let mut dir_inode = self.get_inode(dir)?;
        dir_inode.size += DIR_ENTRY_SIZE as u32;
        self.put_inode(dir, &dir_inode);
        self.write_block(dir, blk, &buf)
    }

    /// Remove the entry for `name`. Removing the final slot shrinks the
    /// directory (releasing its block when that empties one); any other slot
    /// is zeroed in place and left for reuse.
    pub fn dir_remove(&mut self, dir: u16, name: &str) -> Result<()> {
        if name == "." || name == ".." {
            return Err(FsError::InvalidName);
        }
        let (_, blk, off) = self.lookup_slot(dir, name)?;
        let mut dir_inode = self.get_inode(dir)?;
        let new_size = dir_inode.size - DIR_ENTRY_SIZE as u32;

        if new_size == blk * BLOCK_SIZE as u32 + off as u32 {
            dir_inode.size = new_size;
            self.put_inode(dir, &dir_inode);
            if new_size as usize % BLOCK_SIZE == 0 {
                // the removed slot was alone in the trailing block
                self.release_zone_at(dir, new_size / BLOCK_SIZE as u32)?;
            }
        } else {
            let mut buf = [0u8; BLOCK_SIZE];
            self.read_block(dir, blk, &mut buf)?;
            buf[off..off + DIR_ENTRY_SIZE].fill(0);
            self.write_block(dir, blk, &buf)?;
        }
        Ok(())
    }

    /// All live entries, in slot order.
    pub fn read_dir(&self, dir: u16) -> Result<Vec<DirEntry>> {
        let dir_inode = self.get_inode(dir)?;
        if !dir_inode.is_dir() {
            return Err(FsError::NotDirectory);
        }
        let mut entries = Vec::new();
        let mut buf = [0u8; BLOCK_SIZE];
        for blk in 0..dir_inode.block_span() {
            let valid = self.read_block(dir, blk, &mut buf)?;
            for off in (0..valid).step_by(DIR_ENTRY_SIZE) {
                let entry = DirEntry::decode(&buf[off..off + DIR_ENTRY_SIZE]);
                if entry.inode != 0 {
                    entries.push(entry);
                }
            }
        }
        Ok(entries)
    }
}
