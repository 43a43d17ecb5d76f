//! Layout constants of the on-disk format. Changing any of these breaks
//! compatibility with existing images.

/// Size of one block/zone in bytes.
pub const BLOCK_SIZE: usize = 512;

/// Record id of the bootblock.
pub const BOOT_BLOCK: u32 = 0;
/// Record id of the superblock.
pub const SUPER_BLOCK: u32 = 1;
/// Record id of the first zone-bitmap block; the inode bitmap and the inode
/// table follow, then the data zones.
pub const BITMAP_START: u32 = 2;

/// Inode number of the root directory. Inode 0 is never allocated.
pub const ROOT_INODE: u16 = 1;

/// Direct zone slots in an inode.
pub const NUM_DIRECT_ZONES: usize = 7;
/// Zone numbers per index block (16-bit entries).
pub const ZONES_PER_INDEX: usize = BLOCK_SIZE / 2;
/// Largest addressable logical block index, exclusive.
pub const MAX_FILE_BLOCKS: u32 =
    (NUM_DIRECT_ZONES + ZONES_PER_INDEX + ZONES_PER_INDEX * ZONES_PER_INDEX) as u32;

/// Width of one directory slot: 2-byte inode number plus the name.
pub const DIR_ENTRY_SIZE: usize = 32;
pub const MAX_NAME_LEN: usize = DIR_ENTRY_SIZE - 2;

pub const BITS_PER_BLOCK: u32 = (BLOCK_SIZE as u32) * 8;
/// Inode records take one block id each.
pub const INODES_PER_BLOCK: u32 = 1;

pub const MIN_BLOCKS: u32 = 30;
pub const MAX_BLOCKS: u32 = 65536;
pub const MAX_INODES: u32 = 65535;

/// Superblock state values.
pub const STATE_VALID: u16 = 1;
pub const STATE_UNKNOWN: u16 = 0;

/// Upper bound on the serialized size of one block record. The image file is
/// a fixed span of `size_blocks * RECORD_SPAN - 1` bytes, space padded.
pub const RECORD_SPAN: usize = 2450;

pub const PARTITION_DESCRIPTION: &str = "partition-description";
pub const IMAGE_ENCODING: &str = "iso-8859-1";
