//! The filesystem image: create (mkfs), open, close, and the node-level
//! operations built on the lower layers.
//!
//! A session owns everything exclusively: the parsed superblock, bootblock,
//! both bitmaps, the inode table, and the text mirror of the data region.
//! Nothing is flushed incrementally — close re-serializes the metadata and
//! writes the mirror back in one pass, so a crash mid-session loses the
//! session's changes. Callers serialize access externally.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs::File;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, warn};

use crate::bitmap::Bitmap;
use crate::config::*;
use crate::error::{FsError, Result};
use crate::inode::{parse_inode_record, write_inode_record};
use crate::mirror::Mirror;
use crate::path::split_path;
use crate::record::{self, INODE_BITMAP_TAG, ROOT_BLOCK_TAG, ZONE_BITMAP_TAG};
use crate::structs::{Bootblock, DirEntry, Inode, S_IFDIR, S_IFLNK, Superblock};
use crate::superblock::{parse_bootblock, parse_superblock, write_bootblock, write_superblock};

/// Per-session options. Explicit state, passed to [`TextFs::open`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FsOptions {
    /// Store uid/gid 0 on newly allocated inodes regardless of the caller's
    /// owner argument.
    pub squash: bool,
    /// Refuse to open an image whose state is not clean instead of warning.
    pub fsbad_fatal: bool,
}

/// One open filesystem image.
pub struct TextFs {
    pub(crate) path: PathBuf,
    pub(crate) opts: FsOptions,
    pub(crate) boot: Bootblock,
    pub(crate) sb: Superblock,
    /// The inode table, 1-based: `inodes[0]` is inode 1.
    pub(crate) inodes: Vec<Inode>,
    pub(crate) imap: Bitmap,
    pub(crate) zmap: Bitmap,
    pub(crate) mirror: Mirror,
}

fn now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs() as u32)
}

/// Offsets of every `block-id:` line in the image text, in file order.
fn scan_records(text: &str) -> Vec<(u32, usize)> {
    let mut records = Vec::new();
    let mut pos = 0;
    for line in text.split_inclusive('\n') {
        if let Some(rest) = line.strip_prefix("block-id: ")
            && let Ok(id) = rest.trim().parse::<u32>()
        {
            records.push((id, pos));
        }
        pos += line.len();
    }
    records
}

fn record_slice<'a>(slices: &BTreeMap<u32, &'a str>, id: u32) -> Result<&'a str> {
    slices
        .get(&id)
        .copied()
        .ok_or_else(|| FsError::CorruptImage(format!("record {id} missing")))
}

fn parse_bitmap(slices: &BTreeMap<u32, &str>, first_id: u32, blocks: u16) -> Result<Bitmap> {
    let mut bytes = Vec::with_capacity(blocks as usize * BLOCK_SIZE);
    for i in 0..blocks as u32 {
        let rec = record_slice(slices, first_id + i)?;
        let grid = record::grid_start(rec).ok_or_else(|| {
            FsError::CorruptImage(format!("bitmap record {} has no grid", first_id + i))
        })?;
        let mut block = [0u8; BLOCK_SIZE];
        record::decode_grid(&rec.as_bytes()[grid..], &mut block)?;
        bytes.extend_from_slice(&block);
    }
    Ok(Bitmap::from_bytes(bytes))
}

impl TextFs {
    /// Make a new filesystem image at `path` (mkfs).
    ///
    /// An `inode_count` of 0 defaults to a third of the size, rounded up to
    /// whole inode blocks and capped at 65535. The file is written and
    /// closed; use [`TextFs::open`] to work with it.
    pub fn create(path: impl AsRef<Path>, size_blocks: u32, inode_count: u16) -> Result<()> {
        if !(MIN_BLOCKS..=MAX_BLOCKS).contains(&size_blocks) {
            return Err(FsError::SizeOutOfRange);
        }
        let requested = if inode_count == 0 {
            size_blocks / 3
        } else {
            inode_count as u32
        };
        let ninodes = (requested.div_ceil(INODES_PER_BLOCK) * INODES_PER_BLOCK).min(MAX_INODES);
        if ninodes > size_blocks * 9 / 10 + 5 {
            return Err(FsError::TooManyInodes);
        }

        let zmap_blocks = size_blocks.div_ceil(BITS_PER_BLOCK) as u16;
        let imap_blocks = ninodes.div_ceil(BITS_PER_BLOCK) as u16;
        let first_data_zone =
            BITMAP_START + zmap_blocks as u32 + imap_blocks as u32 + ninodes;
        if first_data_zone >= size_blocks {
            return Err(FsError::TooManyInodes);
        }

        let mut fs = TextFs {
            path: path.as_ref().to_path_buf(),
            opts: FsOptions::default(),
            boot: Bootblock::default(),
            sb: Superblock {
                state: STATE_VALID,
                zmap_blocks,
                imap_blocks,
                ninodes: ninodes as u16,
                size_blocks,
                first_data_zone,
            },
            inodes: vec![Inode::default(); ninodes as usize],
            imap: Bitmap::filled(imap_blocks),
            zmap: Bitmap::filled(zmap_blocks),
            mirror: Mirror::new(),
        };

        // every bit starts reserved; clear only what is usable — the root
        // inode's bit stays set
        for zone in first_data_zone..size_blocks {
            fs.zmap.unmark(zone - first_data_zone);
        }
        for ino in 2..=ninodes {
            fs.imap.unmark(ino - 1);
        }

        let stamp = now();
        fs.put_inode(
            ROOT_INODE,
            &Inode {
                mode: S_IFDIR | 0o755,
                nlinks: 2,
                size: 2 * DIR_ENTRY_SIZE as u32,
                atime: stamp,
                mtime: stamp,
                ctime: stamp,
                ..Inode::default()
            },
        );
        let root_zone = fs.alloc_zone()?;
        let mut root = fs.get_inode(ROOT_INODE)?;
        root.zones[0] = root_zone;
        fs.put_inode(ROOT_INODE, &root);

        let mut block = [0u8; BLOCK_SIZE];
        DirEntry::new(ROOT_INODE, ".")?.encode(&mut block[..DIR_ENTRY_SIZE]);
        DirEntry::new(ROOT_INODE, "..")?.encode(&mut block[DIR_ENTRY_SIZE..2 * DIR_ENTRY_SIZE]);
        fs.mirror.write_zone(root_zone, ROOT_BLOCK_TAG, &block)?;

        debug!(
            "mkfs {}: {} blocks, {} inodes, first data zone {}",
            fs.path.display(),
            size_blocks,
            ninodes,
            first_data_zone
        );
        fs.flush_to_disk()
    }

    /// Open an existing image: the whole file is read into memory, the
    /// metadata region is parsed eagerly, and the data region becomes the
    /// session's text mirror, indexed by record id.
    pub fn open(path: impl AsRef<Path>, opts: FsOptions) -> Result<TextFs> {
        let path = path.as_ref();
        let raw = std::fs::read(path)?;
        let mut text = String::from_utf8_lossy(&raw).into_owned();

        // the first line opening with a space is the end-of-data sentinel
        let mut sentinel_found = true;
        match text.find("\n ") {
            Some(at) => text.truncate(at + 1),
            None => sentinel_found = false,
        }

        let records = scan_records(&text);
        let (boot, mut sb, zmap, imap, inodes) = {
            let mut slices: BTreeMap<u32, &str> = BTreeMap::new();
            for (i, &(id, start)) in records.iter().enumerate() {
                let end = records.get(i + 1).map_or(text.len(), |&(_, next)| next);
                slices.entry(id).or_insert(&text[start..end]);
            }

            let boot = parse_bootblock(record_slice(&slices, BOOT_BLOCK)?);
            let sb = parse_superblock(record_slice(&slices, SUPER_BLOCK)?)?;
            if sb.ninodes == 0 || sb.size_blocks == 0 || sb.zmap_blocks == 0 || sb.imap_blocks == 0
            {
                return Err(FsError::CorruptImage("implausible superblock".into()));
            }

            let zmap = parse_bitmap(&slices, BITMAP_START, sb.zmap_blocks)?;
            let imap = parse_bitmap(
                &slices,
                BITMAP_START + sb.zmap_blocks as u32,
                sb.imap_blocks,
            )?;

            let mut inodes = Vec::with_capacity(sb.ninodes as usize);
            for ino in 1..=sb.ninodes {
                inodes.push(parse_inode_record(record_slice(
                    &slices,
                    sb.inode_record_id(ino),
                )?)?);
            }
            (boot, sb, zmap, imap, inodes)
        };

        if !sentinel_found {
            sb.state = STATE_UNKNOWN;
        }
        if sb.state != STATE_VALID {
            warn!("{}: filesystem in an unknown state", path.display());
            if opts.fsbad_fatal {
                return Err(FsError::CorruptImage("filesystem state is not clean".into()));
            }
        }

        let data_start = records
            .iter()
            .filter(|&&(id, _)| id >= sb.first_data_zone)
            .map(|&(_, start)| start)
            .min()
            .unwrap_or(text.len());
        let mirror = Mirror::from_text(text.split_off(data_start));

        debug!(
            "open {}: {} blocks, {} inodes",
            path.display(),
            sb.size_blocks,
            sb.ninodes
        );
        Ok(TextFs {
            path: path.to_path_buf(),
            opts,
            boot,
            sb,
            inodes,
            imap,
            zmap,
            mirror,
        })
    }

    /// Persist the session and release the image (the only flush there is).
    pub fn close(self) -> Result<()> {
        debug!("close {}", self.path.display());
        self.flush_to_disk()
    }

    /// Rewrite the backing file: regenerated metadata, the data mirror
    /// verbatim, then space padding out to the fixed span so the end-of-data
    /// sentinel stays in place.
    fn flush_to_disk(&self) -> Result<()> {
        let mut out = String::new();
        write_bootblock(&mut out, &self.boot);
        write_superblock(&mut out, &self.sb);

        let free = self.zmap.count_free();
        let mut id = BITMAP_START;
        for i in 0..self.sb.zmap_blocks as usize {
            let _ = writeln!(out, "block-id: {id}");
            let _ = writeln!(out, "Fragment-Type: {ZONE_BITMAP_TAG}");
            let _ = writeln!(out, "free-blocks-in-file system: {free}");
            out.push_str(&record::encode_grid(self.zmap.block(i)));
            id += 1;
        }
        for i in 0..self.sb.imap_blocks as usize {
            let _ = writeln!(out, "block-id: {id}");
            let _ = writeln!(out, "Fragment-Type: {INODE_BITMAP_TAG}");
            out.push_str(&record::encode_grid(self.imap.block(i)));
            id += 1;
        }
        for ino in 1..=self.sb.ninodes {
            write_inode_record(&mut out, id, ino, &self.inodes[(ino - 1) as usize]);
            id += 1;
        }
        out.push_str(self.mirror.text());

        let span = self.sb.size_blocks as usize * RECORD_SPAN - 1;
        let mut file = File::create(&self.path)?;
        file.write_all(out.as_bytes())?;
        let spaces = [b' '; 4096];
        let mut pad = span.saturating_sub(out.len());
        while pad > 0 {
            let n = pad.min(spaces.len());
            file.write_all(&spaces[..n])?;
            pad -= n;
        }
        file.flush()?;
        Ok(())
    }

    // ----- inode table access -----

    pub fn get_inode(&self, ino: u16) -> Result<Inode> {
        if ino == 0 || ino > self.sb.ninodes {
            return Err(FsError::NotFound);
        }
        Ok(self.inodes[(ino - 1) as usize])
    }

    pub(crate) fn put_inode(&mut self, ino: u16, inode: &Inode) {
        self.inodes[(ino - 1) as usize] = *inode;
    }

    pub fn superblock(&self) -> &Superblock {
        &self.sb
    }

    pub fn free_zones(&self) -> u32 {
        self.zmap.count_free()
    }

    pub fn free_inodes(&self) -> u32 {
        self.imap.count_free()
    }

    // ----- allocation -----

    pub(crate) fn alloc_zone(&mut self) -> Result<u32> {
        let bit = self.zmap.find_free().ok_or(FsError::NoFreeZones)?;
        let zone = bit + self.sb.first_data_zone;
        if zone >= self.sb.size_blocks {
            return Err(FsError::NoFreeZones);
        }
        self.zmap.mark(bit);
        Ok(zone)
    }

    pub(crate) fn free_zone(&mut self, zone: u32) {
        if zone < self.sb.first_data_zone || zone >= self.sb.size_blocks {
            return;
        }
        self.zmap.unmark(zone - self.sb.first_data_zone);
    }

    /// Take a free inode, clear its slot and stamp it. Link count starts at
    /// 1; directory entries account for further references.
    pub fn allocate_inode(&mut self, mode: u16, uid: u16, gid: u16) -> Result<u16> {
        let bit = self.imap.find_free().ok_or(FsError::NoFreeInodes)?;
        let ino = bit + 1;
        if ino > self.sb.ninodes as u32 {
            return Err(FsError::NoFreeInodes);
        }
        self.imap.mark(bit);
        let (uid, gid) = if self.opts.squash { (0, 0) } else { (uid, gid) };
        let stamp = now();
        self.put_inode(
            ino as u16,
            &Inode {
                mode,
                nlinks: 1,
                uid,
                gid,
                atime: stamp,
                mtime: stamp,
                ctime: stamp,
                ..Inode::default()
            },
        );
        Ok(ino as u16)
    }

    /// Release every zone the inode holds, zero its slot and clear its
    /// bitmap bit.
    pub fn free_inode(&mut self, ino: u16) -> Result<()> {
        self.truncate(ino, 0)?;
        self.put_inode(ino, &Inode::default());
        self.imap.unmark(ino as u32 - 1);
        Ok(())
    }

    // ----- node-level operations -----

    /// Create a node of any kind at `path`. For device specials `size` is
    /// the encoded major/minor and lands in `zones[0]`.
    pub fn make_node(&mut self, path: &str, mode: u16, uid: u16, gid: u16, size: u32) -> Result<u16> {
        if self.resolve_path(path).is_ok() {
            return Err(FsError::AlreadyExists);
        }
        let (parent, name) = split_path(path);
        let dino = self.resolve_path(parent)?;
        if !self.get_inode(dino)?.is_dir() {
            return Err(FsError::NotDirectory);
        }

        let ino = self.allocate_inode(mode, uid, gid)?;
        let mut inode = self.get_inode(ino)?;
        if inode.is_device() {
            inode.zones[0] = size;
        } else {
            inode.size = size;
        }
        self.put_inode(ino, &inode);
        self.dir_add(dino, name, ino)?;
        Ok(ino)
    }

    /// Create a directory with its `.` and `..` entries.
    pub fn mkdir(&mut self, path: &str) -> Result<u16> {
        let ino = self.make_node(path, S_IFDIR | 0o755, 0, 0, 0)?;
        let (parent, _) = split_path(path);
        let dino = self.resolve_path(parent)?;
        self.dir_add(ino, ".", ino)?;
        self.dir_add(ino, "..", dino)?;

        // `.` references the new directory, `..` references the parent
        let mut inode = self.get_inode(ino)?;
        inode.nlinks += 1;
        self.put_inode(ino, &inode);
        let mut pinode = self.get_inode(dino)?;
        pinode.nlinks += 1;
        self.put_inode(dino, &pinode);
        Ok(ino)
    }

    /// Remove an empty directory.
    pub fn rmdir(&mut self, path: &str) -> Result<()> {
        let ino = self.resolve_path(path)?;
        if ino == ROOT_INODE {
            return Err(FsError::RemoveRoot);
        }
        if !self.get_inode(ino)?.is_dir() {
            return Err(FsError::NotDirectory);
        }

        let mut parent = ROOT_INODE;
        for entry in self.read_dir(ino)? {
            match entry.name_bytes() {
                b"." => {}
                b".." => parent = entry.inode,
                _ => return Err(FsError::NotEmpty),
            }
        }

        self.free_inode(ino)?;
        let mut pinode = self.get_inode(parent)?;
        pinode.nlinks -= 1;
        self.put_inode(parent, &pinode);
        let (_, name) = split_path(path);
        self.dir_remove(parent, name)
    }

    /// Remove a file name. The inode and its zones are released once the
    /// last link is gone.
    pub fn unlink(&mut self, path: &str) -> Result<()> {
        let (parent, name) = split_path(path);
        let dino = self.resolve_path(parent)?;
        let ino = self.dir_lookup(dino, name)?;
        let mut inode = self.get_inode(ino)?;
        if inode.is_dir() {
            return Err(FsError::IsDirectory);
        }

        self.dir_remove(dino, name)?;
        inode.nlinks -= 1;
        self.put_inode(ino, &inode);
        if inode.nlinks == 0 {
            self.free_inode(ino)?;
        }
        Ok(())
    }

    /// Hard-link an existing regular file under a second name.
    pub fn link(&mut self, target: &str, link_path: &str) -> Result<()> {
        let tino = self.resolve_path(target)?;
        let mut tinode = self.get_inode(tino)?;
        if !tinode.is_regular() {
            return Err(FsError::NotRegular);
        }
        if self.resolve_path(link_path).is_ok() {
            return Err(FsError::AlreadyExists);
        }

        let (parent, name) = split_path(link_path);
        let dino = self.resolve_path(parent)?;
        self.dir_add(dino, name, tino)?;
        tinode.nlinks += 1;
        self.put_inode(tino, &tinode);
        Ok(())
    }

    /// Create a symbolic link whose content is the target path.
    pub fn symlink(&mut self, target: &str, link_path: &str) -> Result<u16> {
        let ino = self.make_node(link_path, S_IFLNK | 0o777, 0, 0, target.len() as u32)?;
        let mut block = [0u8; BLOCK_SIZE];
        for (blk, chunk) in target.as_bytes().chunks(BLOCK_SIZE).enumerate() {
            block.fill(0);
            block[..chunk.len()].copy_from_slice(chunk);
            self.write_block(ino, blk as u32, &block)?;
        }
        Ok(ino)
    }
}
