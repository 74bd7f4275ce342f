//! Directory structure operations.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::debug;

use crate::errors::{FsError, FsErrorCode, FsResult};
use crate::flags::{Access, S_ISGID};
use crate::ids::COOKIE_IDS;
use crate::inotify::{self, EventMask};
use crate::node::{self, Node, NodeRef};
use crate::path;

use super::{touch_c, touch_cm, Volume};

/// Whether `target` lies inside the subtree rooted at `root`.
///
/// Only materialised children are visited; the chain between the two
/// nodes, if any, was materialised by the walk that produced them.
fn subtree_contains(root: &NodeRef, target: &NodeRef) -> bool {
    if Rc::ptr_eq(root, target) {
        return true;
    }
    let n = root.borrow();
    if let Some(children) = n.children() {
        for slot in children.iter() {
            if subtree_contains(&slot.node, target) {
                return true;
            }
        }
    }
    false
}

impl Volume {
    /// Creates a directory.
    ///
    /// Creating a filesystem root (`mkdir("c:/")`) requires uid 0. The new
    /// directory's permission bits are `mode & 0o1777` minus the umask; a
    /// set-group-id parent passes its gid on and marks the child SGID.
    pub fn mkdir(&mut self, path: &str, mode: u32) -> FsResult<()> {
        self.ensure_writable("mkdir", path)?;
        debug!(path, mode = format_args!("{mode:#o}"), "mkdir");
        let absolute = self.absolutize(path, "mkdir")?;
        if path::is_root(&absolute) {
            return self.create_root(&absolute, mode, None);
        }

        let entry = self.walk(path, false, "mkdir")?;
        if entry.node.is_some() {
            return Err(FsError::with_path(FsErrorCode::EEXIST, "mkdir", path));
        }
        let parent = entry.require_parent("mkdir", path)?;
        self.check_access(&parent, Access::WRITE, "mkdir", path)?;

        let (parent_gid, parent_sgid) = {
            let p = parent.borrow();
            (p.gid, p.mode & S_ISGID != 0)
        };
        let mut perms = mode & 0o1777 & !self.umask;
        let gid = if parent_sgid {
            perms |= S_ISGID;
            parent_gid
        } else {
            self.egid
        };
        let child = Rc::new(RefCell::new(Node::new_dir(
            self.dev,
            perms,
            self.euid,
            gid,
            self.casing,
        )));
        if let Some(children) = parent.borrow_mut().children_mut() {
            children.insert(&entry.basename, Rc::clone(&child));
        }
        touch_cm(&parent);
        inotify::notify(
            &parent,
            EventMask::CREATE | EventMask::ISDIR,
            Some(&entry.basename),
            0,
        );
        Ok(())
    }

    /// Creates a directory and any missing ancestors.
    pub fn mkdirp(&mut self, path: &str, mode: u32) -> FsResult<()> {
        let absolute = self.absolutize(path, "mkdir")?;
        let parts = path::parse(&absolute);
        let mut prefix = parts.root.clone();
        if self.get_root(&parts.root).is_none() {
            self.create_root(&parts.root, mode, None)?;
        }
        for seg in &parts.segments {
            prefix = path::combine(&prefix, seg);
            let entry = self.walk(&prefix, false, "mkdir")?;
            match entry.node {
                None => self.mkdir(&prefix, mode)?,
                Some(node) => {
                    if !node.borrow().is_dir() {
                        return Err(FsError::with_path(
                            FsErrorCode::ENOTDIR,
                            "mkdir",
                            prefix,
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// Removes an empty directory. Roots cannot be removed.
    pub fn rmdir(&mut self, path: &str) -> FsResult<()> {
        self.ensure_writable("rmdir", path)?;
        let (entry, node) = self.walk_existing(path, true, "rmdir")?;
        if !node.borrow().is_dir() {
            return Err(FsError::with_path(FsErrorCode::ENOTDIR, "rmdir", path));
        }
        if entry.basename.is_empty() {
            return Err(FsError::with_path(FsErrorCode::EPERM, "rmdir", path));
        }
        let parent = entry.require_parent("rmdir", path)?;
        node::ensure_children(&node)?;
        if node.borrow().children().is_some_and(|c| !c.is_empty()) {
            return Err(FsError::with_path(FsErrorCode::ENOTEMPTY, "rmdir", path));
        }
        self.check_access(&parent, Access::WRITE, "rmdir", path)?;
        self.check_sticky(&parent, &node, "rmdir", path)?;

        if let Some(children) = parent.borrow_mut().children_mut() {
            children.remove(&entry.basename);
        }
        touch_cm(&parent);
        let nlink = {
            let mut n = node.borrow_mut();
            n.nlink = n.nlink.saturating_sub(1);
            n.nlink
        };
        touch_c(&node);
        inotify::notify(
            &parent,
            EventMask::DELETE | EventMask::ISDIR,
            Some(&entry.basename),
            0,
        );
        inotify::notify(&node, EventMask::DELETE_SELF, None, 0);
        if nlink == 0 {
            inotify::drop_watches(&node);
        }
        Ok(())
    }

    /// Creates an additional name for an existing non-directory inode.
    pub fn link(&mut self, old: &str, new: &str) -> FsResult<()> {
        self.ensure_writable("link", old)?;
        let (_, node) = self.walk_existing(old, true, "link")?;
        if node.borrow().is_dir() {
            return Err(FsError::with_paths(FsErrorCode::EPERM, "link", old, new));
        }
        let dst = self.walk(new, true, "link")?;
        if dst.node.is_some() {
            return Err(FsError::with_paths(FsErrorCode::EEXIST, "link", old, new));
        }
        let parent = dst.require_parent("link", new)?;
        self.check_access(&parent, Access::WRITE, "link", new)?;

        if let Some(children) = parent.borrow_mut().children_mut() {
            children.insert(&dst.basename, Rc::clone(&node));
        }
        {
            let mut n = node.borrow_mut();
            n.nlink += 1;
        }
        touch_c(&node);
        touch_cm(&parent);
        inotify::notify(&parent, EventMask::CREATE, Some(&dst.basename), 0);
        inotify::notify(&node, EventMask::ATTRIB, None, 0);
        Ok(())
    }

    /// Removes a name; directories report `EISDIR`.
    pub fn unlink(&mut self, path: &str) -> FsResult<()> {
        self.ensure_writable("unlink", path)?;
        let (entry, node) = self.walk_existing(path, true, "unlink")?;
        if node.borrow().is_dir() {
            return Err(FsError::with_path(FsErrorCode::EISDIR, "unlink", path));
        }
        let parent = entry.require_parent("unlink", path)?;
        self.check_access(&parent, Access::WRITE, "unlink", path)?;
        self.check_sticky(&parent, &node, "unlink", path)?;

        if let Some(children) = parent.borrow_mut().children_mut() {
            children.remove(&entry.basename);
        }
        touch_cm(&parent);
        let nlink = {
            let mut n = node.borrow_mut();
            n.nlink = n.nlink.saturating_sub(1);
            n.nlink
        };
        touch_c(&node);
        inotify::notify(&parent, EventMask::DELETE, Some(&entry.basename), 0);
        inotify::notify(&node, EventMask::ATTRIB, None, 0);
        if nlink == 0 {
            inotify::notify(&node, EventMask::DELETE_SELF, None, 0);
            inotify::drop_watches(&node);
        }
        Ok(())
    }

    /// Atomically rebinds a name, displacing a compatible destination.
    ///
    /// Emits one cookie-matched `MOVED_FROM`/`MOVED_TO` pair plus
    /// `MOVE_SELF`, in that order. The moved node's ctime is left alone.
    pub fn rename(&mut self, old: &str, new: &str) -> FsResult<()> {
        self.ensure_writable("rename", old)?;
        debug!(old, new, "rename");
        let (src, node) = self.walk_existing(old, true, "rename")?;
        if src.basename.is_empty() {
            return Err(FsError::with_paths(FsErrorCode::EPERM, "rename", old, new));
        }
        let old_parent = src.require_parent("rename", old)?;
        self.check_access(&old_parent, Access::WRITE, "rename", old)?;
        self.check_sticky(&old_parent, &node, "rename", old)?;

        let dst = self.walk(new, true, "rename")?;
        let new_parent = dst.require_parent("rename", new)?;
        self.check_access(&new_parent, Access::WRITE, "rename", new)?;

        if let Some(existing) = &dst.node {
            if Rc::ptr_eq(existing, &node) {
                // Both names already refer to the same inode.
                return Ok(());
            }
        }
        let is_dir = node.borrow().is_dir();
        if is_dir && subtree_contains(&node, &new_parent) {
            return Err(FsError::with_paths(FsErrorCode::EINVAL, "rename", old, new));
        }

        if let Some(existing) = &dst.node {
            let existing_dir = existing.borrow().is_dir();
            if is_dir && !existing_dir {
                return Err(FsError::with_paths(
                    FsErrorCode::ENOTDIR,
                    "rename",
                    old,
                    new,
                ));
            }
            if !is_dir && existing_dir {
                return Err(FsError::with_paths(FsErrorCode::EISDIR, "rename", old, new));
            }
            if existing_dir {
                node::ensure_children(existing)?;
                if existing.borrow().children().is_some_and(|c| !c.is_empty()) {
                    return Err(FsError::with_paths(
                        FsErrorCode::ENOTEMPTY,
                        "rename",
                        old,
                        new,
                    ));
                }
            }
            let nlink = {
                let mut n = existing.borrow_mut();
                n.nlink = n.nlink.saturating_sub(1);
                n.nlink
            };
            if nlink == 0 {
                inotify::drop_watches(existing);
            }
        }

        if let Some(children) = old_parent.borrow_mut().children_mut() {
            children.remove(&src.basename);
        }
        if let Some(children) = new_parent.borrow_mut().children_mut() {
            children.insert(&dst.basename, Rc::clone(&node));
        }
        touch_cm(&old_parent);
        touch_cm(&new_parent);

        let cookie = COOKIE_IDS.allocate();
        let isdir = if is_dir {
            EventMask::ISDIR
        } else {
            EventMask::empty()
        };
        inotify::notify(
            &old_parent,
            EventMask::MOVED_FROM | isdir,
            Some(&src.basename),
            cookie,
        );
        inotify::notify(
            &new_parent,
            EventMask::MOVED_TO | isdir,
            Some(&dst.basename),
            cookie,
        );
        inotify::notify(&node, EventMask::MOVE_SELF, None, cookie);
        Ok(())
    }

    /// Creates a symbolic link holding `target` verbatim.
    pub fn symlink(&mut self, target: &str, link: &str) -> FsResult<()> {
        self.ensure_writable("symlink", link)?;
        let entry = self.walk(link, true, "symlink")?;
        if entry.node.is_some() {
            return Err(FsError::with_path(FsErrorCode::EEXIST, "symlink", link));
        }
        let parent = entry.require_parent("symlink", link)?;
        self.check_access(&parent, Access::WRITE, "symlink", link)?;

        let node = Rc::new(RefCell::new(Node::new_symlink(
            self.dev, target, self.euid, self.egid,
        )));
        if let Some(children) = parent.borrow_mut().children_mut() {
            children.insert(&entry.basename, node);
        }
        touch_cm(&parent);
        inotify::notify(
            &parent,
            EventMask::CREATE | EventMask::ISDIR,
            Some(&entry.basename),
            0,
        );
        Ok(())
    }

    /// Lists a directory's entry names in comparator order.
    pub fn readdir(&mut self, path: &str) -> FsResult<Vec<String>> {
        let (_, node) = self.walk_existing(path, false, "scandir")?;
        if !node.borrow().is_dir() {
            return Err(FsError::with_path(FsErrorCode::ENOTDIR, "scandir", path));
        }
        self.check_access(&node, Access::READ, "scandir", path)?;
        node::ensure_children(&node)?;
        if !self.readonly {
            node.borrow_mut().atime_ms = crate::node::now_ms();
        }
        let names = node.borrow().children().map(|c| c.names()).unwrap_or_default();
        Ok(names)
    }

    /// Reads a symbolic link's stored target.
    pub fn readlink(&mut self, path: &str) -> FsResult<String> {
        let (_, node) = self.walk_existing(path, true, "readlink")?;
        let n = node.borrow();
        n.symlink_target()
            .map(str::to_owned)
            .ok_or_else(|| FsError::with_path(FsErrorCode::EINVAL, "readlink", path))
    }

    /// The canonical absolute path of an existing entry.
    pub fn realpath(&mut self, path: &str) -> FsResult<String> {
        let (entry, _) = self.walk_existing(path, false, "realpath")?;
        Ok(entry.path)
    }

    /// Whether `path` resolves to an existing entry.
    pub fn exists(&mut self, path: &str) -> bool {
        matches!(self.walk(path, false, "stat"), Ok(entry) if entry.node.is_some())
    }

    /// Removes a file or directory tree, tolerating absent paths.
    pub fn remove_recursive(&mut self, path: &str) -> FsResult<()> {
        self.ensure_writable("rm", path)?;
        let entry = self.walk(path, true, "rm")?;
        let Some(node) = entry.node else {
            return Ok(());
        };
        if entry.basename.is_empty() {
            return Err(FsError::with_path(FsErrorCode::EPERM, "rm", path));
        }
        if node.borrow().is_dir() {
            node::ensure_children(&node)?;
            let names = node.borrow().children().map(|c| c.names()).unwrap_or_default();
            for name in names {
                self.remove_recursive(&path::combine(&entry.path, &name))?;
            }
            self.rmdir(&entry.path)
        } else {
            self.unlink(&entry.path)
        }
    }

    /// Creates a filesystem root; reserved to uid 0.
    pub(crate) fn create_root(
        &mut self,
        root: &str,
        mode: u32,
        node: Option<NodeRef>,
    ) -> FsResult<()> {
        let parts = path::parse(root);
        if !parts.is_absolute() || !parts.segments.is_empty() {
            return Err(FsError::with_path(FsErrorCode::EINVAL, "mkdir", root));
        }
        self.require_root_user("mkdir", root)?;
        if self.get_root(&parts.root).is_some() {
            return Err(FsError::with_path(FsErrorCode::EEXIST, "mkdir", root));
        }
        let node = node.unwrap_or_else(|| {
            Rc::new(RefCell::new(Node::new_dir(
                self.dev,
                mode & 0o1777 & !self.umask,
                self.euid,
                self.egid,
                self.casing,
            )))
        });
        self.roots.insert(&parts.root, node);
        Ok(())
    }
}
