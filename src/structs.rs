use crate::config::*;
use crate::error::{FsError, Result};

// File type and permission bits, classic minix layout.
pub const S_IFMT: u16 = 0o170000;
pub const S_IFSOCK: u16 = 0o140000;
pub const S_IFLNK: u16 = 0o120000;
pub const S_IFREG: u16 = 0o100000;
pub const S_IFBLK: u16 = 0o060000;
pub const S_IFDIR: u16 = 0o040000;
pub const S_IFCHR: u16 = 0o020000;
pub const S_IFIFO: u16 = 0o010000;

/// The canonical file type classification. All type checks go through this;
/// nothing compares raw mode values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Regular,
    Directory,
    Symlink,
    CharDevice,
    BlockDevice,
    Fifo,
    Socket,
    Unknown,
}

impl FileKind {
    pub fn from_mode(mode: u16) -> Self {
        match mode & S_IFMT {
            S_IFREG => Self::Regular,
            S_IFDIR => Self::Directory,
            S_IFLNK => Self::Symlink,
            S_IFCHR => Self::CharDevice,
            S_IFBLK => Self::BlockDevice,
            S_IFIFO => Self::Fifo,
            S_IFSOCK => Self::Socket,
            _ => Self::Unknown,
        }
    }
}

/// Static descriptive header of the image. Written once at mkfs and never
/// mutated afterwards.
#[derive(Debug, Clone)]
pub struct Bootblock {
    pub fragment_type: String,
    pub encoding: String,
}

impl Default for Bootblock {
    fn default() -> Self {
        Self {
            fragment_type: PARTITION_DESCRIPTION.into(),
            encoding: IMAGE_ENCODING.into(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Superblock {
    pub state: u16,
    /// Zone bitmap size in blocks.
    pub zmap_blocks: u16,
    /// Inode bitmap size in blocks.
    pub imap_blocks: u16,
    pub ninodes: u16,
    /// Total image size in blocks.
    pub size_blocks: u32,
    /// First zone available for file data.
    pub first_data_zone: u32,
}

impl Superblock {
    /// Record id of the inode table entry for `ino`.
    pub fn inode_record_id(&self, ino: u16) -> u32 {
        BITMAP_START + self.zmap_blocks as u32 + self.imap_blocks as u32 + (ino as u32 - 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Inode {
    pub mode: u16,
    pub nlinks: u16,
    pub uid: u16,
    pub gid: u16,
    /// File size in bytes. Zero for device specials, whose encoded
    /// major/minor lives in `zones[0]` instead.
    pub size: u32,
    pub atime: u32,
    pub mtime: u32,
    pub ctime: u32,
    pub zones: [u32; NUM_DIRECT_ZONES],
    pub indirect: u32,
    pub double_indirect: u32,
}

impl Inode {
    pub fn kind(&self) -> FileKind {
        FileKind::from_mode(self.mode)
    }

    pub fn is_dir(&self) -> bool {
        self.kind() == FileKind::Directory
    }

    pub fn is_regular(&self) -> bool {
        self.kind() == FileKind::Regular
    }

    pub fn is_device(&self) -> bool {
        matches!(self.kind(), FileKind::CharDevice | FileKind::BlockDevice)
    }

    /// Number of logical blocks covered by the current size.
    pub fn block_span(&self) -> u32 {
        self.size.div_ceil(BLOCK_SIZE as u32)
    }
}

/// One fixed-width directory slot. Inode number 0 marks a free slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    pub inode: u16,
    pub name: [u8; MAX_NAME_LEN],
}

impl DirEntry {
    pub fn new(inode: u16, name: &str) -> Result<Self> {
        let bytes = name.as_bytes();
        if bytes.is_empty() || bytes.len() > MAX_NAME_LEN {
            return Err(FsError::InvalidName);
        }
        let mut stored = [0u8; MAX_NAME_LEN];
        stored[..bytes.len()].copy_from_slice(bytes);
        Ok(Self {
            inode,
            name: stored,
        })
    }

    pub fn decode(slot: &[u8]) -> Self {
        let inode = u16::from_le_bytes([slot[0], slot[1]]);
        let mut name = [0u8; MAX_NAME_LEN];
        name.copy_from_slice(&slot[2..DIR_ENTRY_SIZE]);
        Self { inode, name }
    }

    pub fn encode(&self, slot: &mut [u8]) {
        slot[..2].copy_from_slice(&self.inode.to_le_bytes());
        slot[2..DIR_ENTRY_SIZE].copy_from_slice(&self.name);
    }

    /// Stored name up to its NUL terminator.
    pub fn name_bytes(&self) -> &[u8] {
        let end = self
            .name
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(MAX_NAME_LEN);
        &self.name[..end]
    }

    pub fn name(&self) -> String {
        String::from_utf8_lossy(self.name_bytes()).into_owned()
    }
}
