use std::io;

use thiserror::Error;

/// Everything that can go wrong inside the filesystem.
///
/// `Io` wraps failures of the backing file and ends the session; every other
/// variant is a semantic failure that is terminal for the requested operation
/// only. Operations never retry and never roll back partial work.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("not found")]
    NotFound,

    #[error("already exists")]
    AlreadyExists,

    #[error("not a directory")]
    NotDirectory,

    #[error("is a directory")]
    IsDirectory,

    #[error("directory not empty")]
    NotEmpty,

    #[error("not a regular file")]
    NotRegular,

    #[error("file exceeds maximum addressable size")]
    FileTooLarge,

    #[error("no free zones left in bitmap")]
    NoFreeZones,

    #[error("no free inodes left in bitmap")]
    NoFreeInodes,

    #[error("invalid file name")]
    InvalidName,

    #[error("too many inodes requested")]
    TooManyInodes,

    #[error("image size out of range")]
    SizeOutOfRange,

    #[error("cannot remove the root directory")]
    RemoveRoot,

    #[error("corrupt image: {0}")]
    CorruptImage(String),
}

pub type Result<T> = std::result::Result<T, FsError>;
