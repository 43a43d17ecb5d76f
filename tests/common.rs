//! Shared helpers for the integration tests.
#![allow(dead_code)]

use std::path::PathBuf;

use tempfile::TempDir;
use textfs::{FsOptions, TextFs};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn image_path(dir: &TempDir) -> PathBuf {
    dir.path().join("image.txt")
}

/// A scratch image of the given geometry, created on disk and reopened.
pub fn fresh(blocks: u32, inodes: u16) -> (TempDir, TextFs) {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let img = image_path(&dir);
    TextFs::create(&img, blocks, inodes).unwrap();
    let fs = TextFs::open(&img, FsOptions::default()).unwrap();
    (dir, fs)
}

/// A deterministic block payload.
pub fn pattern(seed: u8) -> [u8; textfs::BLOCK_SIZE] {
    let mut block = [0u8; textfs::BLOCK_SIZE];
    for (i, b) in block.iter_mut().enumerate() {
        *b = (i as u8).wrapping_mul(31).wrapping_add(seed);
    }
    block
}
