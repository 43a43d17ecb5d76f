//! Path resolution: a slash path is just a chain of directory lookups.

use crate::config::ROOT_INODE;
use crate::error::Result;
use crate::fs::TextFs;

impl TextFs {
    /// Resolve a slash path to an inode number, starting at the root. Empty
    /// and `/`-only paths resolve as `.`; a single leading `/` is skipped
    /// and empty components are ignored.
    ///
    /// Whether an intermediate inode actually is a directory is not checked
    /// here; lookups on anything else simply find nothing. Callers that need
    /// directory semantics check the kind themselves.
    pub fn resolve_path(&self, path: &str) -> Result<u16> {
        let path = path.strip_prefix('/').unwrap_or(path);
        if path.is_empty() {
            return self.dir_lookup(ROOT_INODE, ".");
        }
        let mut ino = ROOT_INODE;
        for component in path.split('/').filter(|c| !c.is_empty()) {
            ino = self.dir_lookup(ino, component)?;
        }
        Ok(ino)
    }
}

/// Split a path into its parent directory and leaf name. A bare name lives
/// in `.`; everything up to the last `/` is the parent otherwise.
pub fn split_path(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(at) => (&path[..at], &path[at + 1..]),
        None => (".", path),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn split_keeps_parent_and_leaf() {
        assert_eq!(split_path("/etc/fstab"), ("/etc", "fstab"));
        assert_eq!(split_path("/fstab"), ("", "fstab"));
        assert_eq!(split_path("fstab"), (".", "fstab"));
        assert_eq!(split_path("a/b/c"), ("a/b", "c"));
    }
}
