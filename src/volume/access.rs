//! POSIX permission checks.

use crate::errors::{FsError, FsErrorCode, FsResult};
use crate::flags::{Access, S_ISVTX};
use crate::node::NodeRef;

use super::Volume;

impl Volume {
    /// Effective rwx bits the current identity holds on `node`.
    ///
    /// Owner bits apply when the effective uid matches, group bits are
    /// added when the effective gid matches, and other bits always apply.
    /// uid 0 receives no blanket grant here; operations that want a root
    /// override gate on uid at their own call site.
    fn effective_bits(&self, node: &NodeRef) -> u32 {
        let n = node.borrow();
        let mode = n.mode;
        let mut bits = mode & 0o7;
        if self.euid == n.uid {
            bits |= (mode >> 6) & 0o7;
        }
        if self.egid == n.gid {
            bits |= (mode >> 3) & 0o7;
        }
        bits
    }

    /// Checks that the current identity holds every bit of `requested`.
    pub(crate) fn check_access(
        &self,
        node: &NodeRef,
        requested: Access,
        syscall: &'static str,
        path: &str,
    ) -> FsResult<()> {
        let effective = self.effective_bits(node);
        if effective & requested.bits() == requested.bits() {
            Ok(())
        } else {
            Err(FsError::with_path(FsErrorCode::EACCES, syscall, path))
        }
    }

    /// Sticky-bit deletion rule: inside a sticky directory only root, the
    /// directory owner or the entry owner may remove an entry.
    pub(crate) fn check_sticky(
        &self,
        parent: &NodeRef,
        node: &NodeRef,
        syscall: &'static str,
        path: &str,
    ) -> FsResult<()> {
        let p = parent.borrow();
        if p.mode & S_ISVTX != 0
            && self.euid != 0
            && self.euid != p.uid
            && self.euid != node.borrow().uid
        {
            return Err(FsError::with_path(FsErrorCode::EACCES, syscall, path));
        }
        Ok(())
    }

    /// Operations reserved to uid 0.
    pub(crate) fn require_root_user(&self, syscall: &'static str, path: &str) -> FsResult<()> {
        if self.euid != 0 {
            return Err(FsError::with_path(FsErrorCode::EPERM, syscall, path));
        }
        Ok(())
    }
}
