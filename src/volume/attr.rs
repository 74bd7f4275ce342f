//! Stat and attribute operations.

use std::rc::Rc;

use crate::errors::{FsError, FsErrorCode, FsResult};
use crate::flags::{Access, S_IFMT};
use crate::inotify::{self, EventMask};
use crate::node::{now_ms, Fd, NodeRef};
use crate::stat::Stats;

use super::fileops::non_empty;
use super::Volume;

impl Volume {
    /// Stats the entry `path` resolves to, following symlinks.
    pub fn stat(&mut self, path: &str) -> FsResult<Stats> {
        let (_, node) = self.walk_existing(path, false, "stat")?;
        let stats = Stats::of(&node.borrow());
        Ok(stats)
    }

    /// Stats without following a trailing symlink.
    pub fn lstat(&mut self, path: &str) -> FsResult<Stats> {
        let (_, node) = self.walk_existing(path, true, "lstat")?;
        let stats = Stats::of(&node.borrow());
        Ok(stats)
    }

    /// Stats an open descriptor.
    pub fn fstat(&self, fd: Fd) -> FsResult<Stats> {
        let desc = self.open_desc(fd, "fstat")?;
        Ok(Stats::of(&desc.node.borrow()))
    }

    /// Checks the current identity's permissions on `path`.
    ///
    /// `Access::EXISTS` verifies mere existence. uid 0 gets no automatic
    /// pass: the effective bits alone decide.
    pub fn access(&mut self, path: &str, requested: Access) -> FsResult<()> {
        let (_, node) = self.walk_existing(path, false, "access")?;
        if requested.is_empty() {
            return Ok(());
        }
        self.check_access(&node, requested, "access", path)
    }

    /// Changes permission bits; owner or root only.
    pub fn chmod(&mut self, path: &str, mode: u32) -> FsResult<()> {
        self.ensure_writable("chmod", path)?;
        let (entry, node) = self.walk_existing(path, false, "chmod")?;
        self.apply_chmod(&node, mode, "chmod", path)?;
        self.emit_attrib(&entry.require_parent("chmod", path)?, &entry.basename, &node);
        Ok(())
    }

    /// Changes permission bits through a descriptor.
    pub fn fchmod(&mut self, fd: Fd, mode: u32) -> FsResult<()> {
        if self.readonly {
            return Err(FsError::new(FsErrorCode::EROFS, "fchmod"));
        }
        let (node, parent, basename) = self.desc_target(fd, "fchmod")?;
        self.apply_chmod(&node, mode, "fchmod", "")?;
        self.emit_attrib(&parent, &basename, &node);
        Ok(())
    }

    /// Changes ownership; chown of a file not owned by self needs uid 0.
    pub fn chown(&mut self, path: &str, uid: u32, gid: u32) -> FsResult<()> {
        self.ensure_writable("chown", path)?;
        let (entry, node) = self.walk_existing(path, false, "chown")?;
        self.apply_chown(&node, uid, gid, "chown", path)?;
        self.emit_attrib(&entry.require_parent("chown", path)?, &entry.basename, &node);
        Ok(())
    }

    /// Changes ownership through a descriptor.
    pub fn fchown(&mut self, fd: Fd, uid: u32, gid: u32) -> FsResult<()> {
        if self.readonly {
            return Err(FsError::new(FsErrorCode::EROFS, "fchown"));
        }
        let (node, parent, basename) = self.desc_target(fd, "fchown")?;
        self.apply_chown(&node, uid, gid, "fchown", "")?;
        self.emit_attrib(&parent, &basename, &node);
        Ok(())
    }

    /// Sets access and modification times in milliseconds.
    ///
    /// Negative times are `EINVAL`. Allowed for the owner, root, or any
    /// identity holding write permission.
    pub fn utimes(&mut self, path: &str, atime_ms: i64, mtime_ms: i64) -> FsResult<()> {
        self.ensure_writable("utimes", path)?;
        let (entry, node) = self.walk_existing(path, false, "utimes")?;
        self.apply_utimes(&node, atime_ms, mtime_ms, "utimes", path)?;
        self.emit_attrib(
            &entry.require_parent("utimes", path)?,
            &entry.basename,
            &node,
        );
        Ok(())
    }

    /// Sets times through a descriptor.
    pub fn futimes(&mut self, fd: Fd, atime_ms: i64, mtime_ms: i64) -> FsResult<()> {
        if self.readonly {
            return Err(FsError::new(FsErrorCode::EROFS, "futimes"));
        }
        let (node, parent, basename) = self.desc_target(fd, "futimes")?;
        self.apply_utimes(&node, atime_ms, mtime_ms, "futimes", "")?;
        self.emit_attrib(&parent, &basename, &node);
        Ok(())
    }

    fn desc_target(&self, fd: Fd, syscall: &'static str) -> FsResult<(NodeRef, NodeRef, String)> {
        let desc = self.open_desc(fd, syscall)?;
        Ok((
            Rc::clone(&desc.node),
            Rc::clone(&desc.parent),
            desc.basename.clone(),
        ))
    }

    fn apply_chmod(
        &self,
        node: &NodeRef,
        mode: u32,
        syscall: &'static str,
        path: &str,
    ) -> FsResult<()> {
        {
            let n = node.borrow();
            if self.euid != 0 && self.euid != n.uid {
                return Err(FsError::with_path(FsErrorCode::EPERM, syscall, path));
            }
        }
        let mut n = node.borrow_mut();
        n.mode = (n.mode & S_IFMT) | (mode & 0o7777);
        n.ctime_ms = now_ms();
        Ok(())
    }

    fn apply_chown(
        &self,
        node: &NodeRef,
        uid: u32,
        gid: u32,
        syscall: &'static str,
        path: &str,
    ) -> FsResult<()> {
        {
            let n = node.borrow();
            if self.euid != 0 && self.euid != n.uid {
                return Err(FsError::with_path(FsErrorCode::EPERM, syscall, path));
            }
        }
        let mut n = node.borrow_mut();
        n.uid = uid;
        n.gid = gid;
        n.ctime_ms = now_ms();
        Ok(())
    }

    fn apply_utimes(
        &self,
        node: &NodeRef,
        atime_ms: i64,
        mtime_ms: i64,
        syscall: &'static str,
        path: &str,
    ) -> FsResult<()> {
        if atime_ms < 0 || mtime_ms < 0 {
            return Err(FsError::with_path(FsErrorCode::EINVAL, syscall, path));
        }
        let permitted = {
            let n = node.borrow();
            self.euid == 0 || self.euid == n.uid
        };
        if !permitted {
            self.check_access(node, Access::WRITE, syscall, path)?;
        }
        let mut n = node.borrow_mut();
        n.atime_ms = atime_ms;
        n.mtime_ms = mtime_ms;
        n.ctime_ms = now_ms();
        Ok(())
    }

    fn emit_attrib(&self, parent: &NodeRef, basename: &str, node: &NodeRef) {
        inotify::notify(parent, EventMask::ATTRIB, non_empty(basename), 0);
        inotify::notify(node, EventMask::ATTRIB, None, 0);
    }
}
