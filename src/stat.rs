//! Stat records.

use crate::flags::{
    S_IFBLK, S_IFCHR, S_IFDIR, S_IFIFO, S_IFLNK, S_IFMT, S_IFREG, S_IFSOCK,
};
use crate::node::Node;

/// Reported block size for every inode.
pub const BLKSIZE: u32 = 4096;

/// A point-in-time snapshot of an inode's attributes.
///
/// Field-for-field equality is meaningful: the poll watcher diffs whole
/// records to decide whether to fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stats {
    pub dev: u64,
    pub ino: u64,
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u64,
    pub size: u64,
    pub blksize: u32,
    pub blocks: u64,
    pub atime_ms: i64,
    pub mtime_ms: i64,
    pub ctime_ms: i64,
    pub birthtime_ms: i64,
}

impl Stats {
    /// The all-zero record delivered for paths that do not exist.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn of(node: &Node) -> Self {
        Self {
            dev: node.dev,
            ino: node.ino,
            mode: node.mode,
            nlink: node.nlink,
            uid: node.uid,
            gid: node.gid,
            rdev: 0,
            size: node.size(),
            blksize: BLKSIZE,
            blocks: 0,
            atime_ms: node.atime_ms,
            mtime_ms: node.mtime_ms,
            ctime_ms: node.ctime_ms,
            birthtime_ms: node.birthtime_ms,
        }
    }

    fn file_type(&self) -> u32 {
        self.mode & S_IFMT
    }

    #[must_use]
    pub fn is_file(&self) -> bool {
        self.file_type() == S_IFREG
    }

    #[must_use]
    pub fn is_directory(&self) -> bool {
        self.file_type() == S_IFDIR
    }

    #[must_use]
    pub fn is_symbolic_link(&self) -> bool {
        self.file_type() == S_IFLNK
    }

    #[must_use]
    pub fn is_block_device(&self) -> bool {
        self.file_type() == S_IFBLK
    }

    #[must_use]
    pub fn is_character_device(&self) -> bool {
        self.file_type() == S_IFCHR
    }

    #[must_use]
    pub fn is_fifo(&self) -> bool {
        self.file_type() == S_IFIFO
    }

    #[must_use]
    pub fn is_socket(&self) -> bool {
        self.file_type() == S_IFSOCK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_record_is_all_zero() {
        let empty = Stats::empty();
        assert_eq!(empty.ino, 0);
        assert_eq!(empty.size, 0);
        assert!(!empty.is_file() && !empty.is_directory());
    }

    #[test]
    fn type_predicates_follow_mode_bits() {
        let mut st = Stats::empty();
        st.mode = S_IFREG | 0o644;
        assert!(st.is_file());
        st.mode = S_IFLNK | 0o666;
        assert!(st.is_symbolic_link());
        st.mode = S_IFDIR | 0o755;
        assert!(st.is_directory());
    }
}
