//! TextFS is a small minix-style filesystem whose entire image lives in one
//! human-readable text file. Every 512-byte block is serialized as a
//! self-describing record — `key: value` header lines plus, for data-bearing
//! blocks, a fixed-width hex/ASCII grid — and mutated in place without ever
//! changing a record's length.
//!
//! Linear image layout:
//! - Bootblock (record 0)
//! - Superblock (record 1)
//! - Zone bitmap
//! - Inode bitmap
//! - Inode table (one record per inode)
//! - Data zones (data and index block records, appended in allocation order)
//!
//! A session is strictly open → mutate in memory → close: the whole file is
//! materialized at open and rewritten at close. There is no journaling, no
//! incremental flush and no internal locking.

mod bitmap;
mod config;
mod directory;
mod error;
mod fs;
mod inode;
mod mirror;
mod path;
mod record;
mod structs;
mod superblock;

pub use config::*;
pub use error::{FsError, Result};
pub use fs::{FsOptions, TextFs};
pub use path::split_path;
pub use structs::*;
