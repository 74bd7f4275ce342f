//! The open-file-description table.
//!
//! Writes are staged copy-before-write: the first write through a
//! descriptor copies the inode's published bytes into a private growable
//! buffer, and only fsync/close moves the staged buffer back into the
//! inode. Readers on other descriptors keep seeing the pre-write content
//! until then.

use std::cell::RefCell;
use std::rc::Rc;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::errors::{FsError, FsErrorCode, FsResult};
use crate::flags::{Access, OpenFlags, S_ISGID};
use crate::ids::FD_IDS;
use crate::inotify::{self, EventMask, InotifyRef};
use crate::node::{self, now_ms, Fd, Node, NodeRef};

use super::{touch_cm, Volume};

/// Staged content of an open descriptor.
pub(crate) enum BufState {
    /// Read view bound to the inode's published bytes.
    Shared(Bytes),
    /// Private copy made on first write; owned exclusively.
    Owned(Vec<u8>),
}

/// An open-file entry in the descriptor table.
pub(crate) struct OpenDesc {
    pub(crate) path: String,
    pub(crate) basename: String,
    pub(crate) parent: NodeRef,
    pub(crate) node: NodeRef,
    pub(crate) flags: OpenFlags,
    pub(crate) offset: u64,
    pub(crate) dirty: bool,
    pub(crate) buf: Option<BufState>,
}

/// A descriptor table entry: an open file or an inotify instance.
pub(crate) enum Descriptor {
    Open(OpenDesc),
    Inotify(InotifyRef),
}

impl Volume {
    /// Opens `path` under `flags`, creating with `mode & 0o1777` when
    /// `CREAT` applies.
    pub fn open(&mut self, path: &str, flags: OpenFlags, mode: u32) -> FsResult<Fd> {
        let mut flags = flags;
        flags.access_mode()?;
        debug!(path, flags = flags.bits(), "open");
        if self.readonly && (flags.writable() || flags.contains(OpenFlags::TRUNC)) {
            return Err(FsError::with_path(FsErrorCode::EROFS, "open", path));
        }

        let entry = self.walk(path, flags.contains(OpenFlags::NOFOLLOW), "open")?;
        let parent = entry.require_parent("open", path)?;
        let mut created = false;
        let node = match entry.node {
            Some(node) => {
                if flags.contains(OpenFlags::CREAT) && flags.contains(OpenFlags::EXCL) {
                    return Err(FsError::with_path(FsErrorCode::EEXIST, "open", path));
                }
                node
            }
            None => {
                if !flags.contains(OpenFlags::CREAT) {
                    return Err(FsError::with_path(FsErrorCode::ENOENT, "open", path));
                }
                self.ensure_writable("open", path)?;
                self.check_access(&parent, Access::WRITE, "open", path)?;
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
                // A fresh file has nothing to truncate.
                flags.remove(OpenFlags::TRUNC);
                created = true;
                let node = Rc::new(RefCell::new(Node::new_file(
                    self.dev, perms, self.euid, gid,
                )));
                if let Some(children) = parent.borrow_mut().children_mut() {
                    children.insert(&entry.basename, Rc::clone(&node));
                }
                touch_cm(&parent);
                inotify::notify(&parent, EventMask::CREATE, Some(&entry.basename), 0);
                node
            }
        };

        {
            let n = node.borrow();
            if flags.contains(OpenFlags::DIRECTORY) && n.is_file() {
                return Err(FsError::with_path(FsErrorCode::ENOTDIR, "open", path));
            }
            if n.is_symlink() {
                // Only reachable under NOFOLLOW.
                return Err(FsError::with_path(FsErrorCode::ELOOP, "open", path));
            }
            if n.is_dir() && flags.writable() {
                return Err(FsError::with_path(FsErrorCode::EISDIR, "open", path));
            }
        }
        if !created {
            let mut requested = Access::empty();
            if flags.readable() {
                requested |= Access::READ;
            }
            if flags.writable() {
                requested |= Access::WRITE;
            }
            if !requested.is_empty() {
                self.check_access(&node, requested, "open", path)?;
            }
        }

        let offset = if flags.contains(OpenFlags::APPEND) && !flags.contains(OpenFlags::TRUNC) {
            node.borrow().size()
        } else {
            0
        };
        let mut desc = OpenDesc {
            path: entry.path,
            basename: entry.basename,
            parent: Rc::clone(&parent),
            node: Rc::clone(&node),
            flags,
            offset,
            dirty: false,
            buf: None,
        };
        if flags.contains(OpenFlags::TRUNC) {
            // Truncation is staged; the inode keeps its bytes until
            // fsync/close publishes the empty buffer.
            desc.buf = Some(BufState::Owned(Vec::new()));
            desc.dirty = true;
        }

        let name = non_empty(&desc.basename);
        inotify::notify(&parent, EventMask::OPEN, name, 0);
        inotify::notify(&node, EventMask::OPEN, None, 0);

        let fd = FD_IDS.allocate();
        self.fds.insert(fd, Descriptor::Open(desc));
        Ok(fd)
    }

    /// Opens with a symbolic alias (`"r"`, `"w+"`, `"ax"`, …).
    pub fn open_symbolic(&mut self, path: &str, alias: &str, mode: u32) -> FsResult<Fd> {
        let flags = OpenFlags::from_symbolic(alias)?;
        self.open(path, flags, mode)
    }

    /// Reads up to `buf.len()` bytes at `pos`, or at the descriptor offset
    /// when `pos` is `None`. The offset advances past the bytes read.
    pub fn read(&mut self, fd: Fd, buf: &mut [u8], pos: Option<u64>) -> FsResult<usize> {
        let (node, parent, basename, bound) = {
            let desc = self.open_desc(fd, "read")?;
            if !desc.flags.readable() {
                return Err(FsError::new(FsErrorCode::EBADF, "read"));
            }
            (
                Rc::clone(&desc.node),
                Rc::clone(&desc.parent),
                desc.basename.clone(),
                desc.buf.is_some(),
            )
        };
        if buf.is_empty() {
            return Ok(0);
        }
        if !bound {
            // Bind the inode's published bytes as this descriptor's view.
            let bytes = node::ensure_bytes(&node)?;
            let desc = self.open_desc_mut(fd, "read")?;
            if desc.buf.is_none() {
                desc.buf = Some(BufState::Shared(bytes));
            }
        }

        let copied = {
            let desc = self.open_desc_mut(fd, "read")?;
            let position = pos.unwrap_or(desc.offset) as usize;
            let data: &[u8] = match &desc.buf {
                Some(BufState::Shared(bytes)) => bytes,
                Some(BufState::Owned(vec)) => vec,
                None => &[],
            };
            let available = data.len().saturating_sub(position);
            let count = buf.len().min(available);
            buf[..count].copy_from_slice(&data[position..position + count]);
            desc.offset = (position + count) as u64;
            count
        };

        if !self.readonly {
            node.borrow_mut().atime_ms = now_ms();
        }
        inotify::notify(&parent, EventMask::ACCESS, non_empty(&basename), 0);
        inotify::notify(&node, EventMask::ACCESS, None, 0);
        Ok(copied)
    }

    /// Writes `data` at `pos` (descriptor offset when `None`; end-of-file
    /// under `APPEND`), staging into the descriptor's private buffer.
    pub fn write(&mut self, fd: Fd, data: &[u8], pos: Option<u64>) -> FsResult<usize> {
        if self.readonly {
            return Err(FsError::new(FsErrorCode::EROFS, "write"));
        }
        let (node, flags) = {
            let desc = self.open_desc(fd, "write")?;
            if !desc.flags.writable() {
                return Err(FsError::new(FsErrorCode::EBADF, "write"));
            }
            (Rc::clone(&desc.node), desc.flags)
        };
        // Materialise published content before staging a copy of it.
        let published = node::ensure_bytes(&node)?;

        {
            let desc = self.open_desc_mut(fd, "write")?;
            let owned: &mut Vec<u8> = match &mut desc.buf {
                Some(BufState::Owned(vec)) => vec,
                slot => {
                    let base = match slot {
                        Some(BufState::Shared(bytes)) => bytes.to_vec(),
                        _ => published.to_vec(),
                    };
                    *slot = Some(BufState::Owned(base));
                    match slot {
                        Some(BufState::Owned(vec)) => vec,
                        _ => unreachable!("owned buffer was just staged"),
                    }
                }
            };
            let position = if flags.contains(OpenFlags::APPEND) {
                owned.len()
            } else {
                pos.unwrap_or(desc.offset) as usize
            };
            let end = position + data.len();
            if end > owned.len() {
                owned.resize(end, 0);
            }
            owned[position..end].copy_from_slice(data);
            desc.offset = end as u64;
            desc.dirty = true;
        }

        if flags.contains(OpenFlags::SYNC) {
            self.fsync(fd)?;
        }
        Ok(data.len())
    }

    /// Publishes the staged buffer to the inode, size included.
    pub fn fsync(&mut self, fd: Fd) -> FsResult<()> {
        self.publish(fd, "fsync")
    }

    /// Publishes the staged buffer to the inode.
    pub fn fdatasync(&mut self, fd: Fd) -> FsResult<()> {
        self.publish(fd, "fdatasync")
    }

    fn publish(&mut self, fd: Fd, syscall: &'static str) -> FsResult<()> {
        let readonly = self.readonly;
        let (node, parent, basename) = {
            let desc = self.open_desc_mut(fd, syscall)?;
            if !desc.dirty {
                return Ok(());
            }
            if readonly {
                return Err(FsError::new(FsErrorCode::EROFS, syscall));
            }
            let Some(BufState::Owned(vec)) = &mut desc.buf else {
                desc.dirty = false;
                return Ok(());
            };
            let data = Bytes::from(std::mem::take(vec));
            desc.buf = Some(BufState::Shared(data.clone()));
            desc.dirty = false;
            let node = Rc::clone(&desc.node);
            let parent = Rc::clone(&desc.parent);
            let basename = desc.basename.clone();
            node.borrow_mut().set_bytes(data);
            (node, parent, basename)
        };
        touch_cm(&node);
        inotify::notify(&parent, EventMask::MODIFY, non_empty(&basename), 0);
        inotify::notify(&node, EventMask::MODIFY, None, 0);
        Ok(())
    }

    /// Resizes a file by path, zero-extending growth.
    pub fn truncate(&mut self, path: &str, len: u64) -> FsResult<()> {
        self.ensure_writable("truncate", path)?;
        let (entry, node) = self.walk_existing(path, false, "truncate")?;
        if node.borrow().is_dir() {
            return Err(FsError::with_path(FsErrorCode::EISDIR, "truncate", path));
        }
        self.check_access(&node, Access::WRITE, "truncate", path)?;
        let parent = entry.require_parent("truncate", path)?;
        resize(&node, len)?;
        inotify::notify(&parent, EventMask::MODIFY, non_empty(&entry.basename), 0);
        inotify::notify(&node, EventMask::MODIFY, None, 0);
        Ok(())
    }

    /// Resizes a file by descriptor.
    pub fn ftruncate(&mut self, fd: Fd, len: u64) -> FsResult<()> {
        if self.readonly {
            return Err(FsError::new(FsErrorCode::EROFS, "ftruncate"));
        }
        let (node, parent, basename) = {
            let desc = self.open_desc(fd, "ftruncate")?;
            if !desc.flags.writable() {
                return Err(FsError::new(FsErrorCode::EINVAL, "ftruncate"));
            }
            (
                Rc::clone(&desc.node),
                Rc::clone(&desc.parent),
                desc.basename.clone(),
            )
        };
        resize(&node, len)?;
        inotify::notify(&parent, EventMask::MODIFY, non_empty(&basename), 0);
        inotify::notify(&node, EventMask::MODIFY, None, 0);
        Ok(())
    }

    /// Closes a descriptor, publishing staged writes first. Unknown fds
    /// report `EBADF`.
    pub fn close(&mut self, fd: Fd) -> FsResult<()> {
        let dirty = match self.fds.get(&fd) {
            Some(Descriptor::Open(desc)) => desc.dirty,
            Some(Descriptor::Inotify(_)) => false,
            None => {
                warn!(fd, "close of unknown descriptor");
                return Err(FsError::new(FsErrorCode::EBADF, "close"));
            }
        };
        if dirty && !self.readonly {
            self.publish(fd, "close")?;
        }
        match self.fds.remove(&fd) {
            Some(Descriptor::Open(desc)) => {
                let mask = if desc.flags.writable() {
                    EventMask::CLOSE_WRITE
                } else {
                    EventMask::CLOSE_NOWRITE
                };
                inotify::notify(&desc.parent, mask, non_empty(&desc.basename), 0);
                inotify::notify(&desc.node, mask, None, 0);
                Ok(())
            }
            Some(Descriptor::Inotify(state)) => {
                inotify::detach_owner(&state);
                Ok(())
            }
            None => Err(FsError::new(FsErrorCode::EBADF, "close")),
        }
    }

    /// Reads a whole file through a transient read-only descriptor.
    pub fn read_file(&mut self, path: &str) -> FsResult<Bytes> {
        let fd = self.open(path, OpenFlags::RDONLY, 0)?;
        let (is_dir, size) = {
            let desc = self.open_desc(fd, "read")?;
            let node = desc.node.borrow();
            (node.is_dir(), node.size() as usize)
        };
        if is_dir {
            self.close(fd)?;
            return Err(FsError::with_path(FsErrorCode::EISDIR, "read", path));
        }
        let mut out = vec![0u8; size];
        let mut filled = 0usize;
        let read_result = loop {
            if filled >= out.len() {
                break Ok(());
            }
            match self.read(fd, &mut out[filled..], None) {
                Ok(0) => break Ok(()),
                Ok(n) => filled += n,
                Err(err) => break Err(err),
            }
        };
        let close_result = self.close(fd);
        read_result?;
        close_result?;
        out.truncate(filled);
        Ok(Bytes::from(out))
    }

    /// Reads a whole file as UTF-8.
    pub fn read_file_utf8(&mut self, path: &str) -> FsResult<String> {
        let bytes = self.read_file(path)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| FsError::with_path(FsErrorCode::EINVAL, "read", path))
    }

    /// Replaces a file's content, creating it if needed.
    pub fn write_file(&mut self, path: &str, data: &[u8]) -> FsResult<()> {
        self.spool(path, "w", data)
    }

    /// Appends to a file, creating it if needed. Always lands at
    /// end-of-file.
    pub fn append_file(&mut self, path: &str, data: &[u8]) -> FsResult<()> {
        self.spool(path, "a", data)
    }

    fn spool(&mut self, path: &str, alias: &str, data: &[u8]) -> FsResult<()> {
        let fd = self.open_symbolic(path, alias, 0o666)?;
        let mut written = 0usize;
        let write_result = loop {
            if written >= data.len() {
                break Ok(());
            }
            match self.write(fd, &data[written..], None) {
                Ok(n) => written += n,
                Err(err) => break Err(err),
            }
        };
        let close_result = self.close(fd);
        write_result?;
        close_result
    }

    pub(crate) fn open_desc(&self, fd: Fd, syscall: &'static str) -> FsResult<&OpenDesc> {
        match self.fds.get(&fd) {
            Some(Descriptor::Open(desc)) => Ok(desc),
            _ => {
                warn!(fd, syscall, "unknown or non-file descriptor");
                Err(FsError::new(FsErrorCode::EBADF, syscall))
            }
        }
    }

    pub(crate) fn open_desc_mut(&mut self, fd: Fd, syscall: &'static str) -> FsResult<&mut OpenDesc> {
        match self.fds.get_mut(&fd) {
            Some(Descriptor::Open(desc)) => Ok(desc),
            _ => {
                warn!(fd, syscall, "unknown or non-file descriptor");
                Err(FsError::new(FsErrorCode::EBADF, syscall))
            }
        }
    }
}

/// Replaces a node's published bytes with a resized copy.
fn resize(node: &NodeRef, len: u64) -> FsResult<()> {
    let bytes = node::ensure_bytes(node)?;
    let mut grown = bytes.to_vec();
    grown.resize(len as usize, 0);
    {
        let mut n = node.borrow_mut();
        n.set_bytes(Bytes::from(grown));
        let now = now_ms();
        n.mtime_ms = now;
        n.ctime_ms = now;
    }
    Ok(())
}

/// Parent-directed events name the child; root opens have no name.
pub(crate) fn non_empty(name: &str) -> Option<&str> {
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}
