//! Inotify descriptors and the watcher façade.

use std::rc::Rc;

use tracing::warn;

use crate::errors::{FsError, FsErrorCode, FsResult};
use crate::ids::{FD_IDS, WD_IDS};
use crate::inotify::{
    self, EventMask, InotifyEvent, InotifyRef, InotifyState, WatchDesc, WatchEvent,
};
use crate::node::{Fd, Wd};

use super::fileops::Descriptor;
use super::Volume;

/// Handle returned by the high-level [`Volume::watch`] façade.
#[derive(Debug, Clone, Copy)]
pub struct DirWatcher {
    pub(crate) fd: Fd,
    pub(crate) wd: Wd,
}

impl DirWatcher {
    /// The underlying inotify descriptor.
    #[must_use]
    pub fn fd(&self) -> Fd {
        self.fd
    }

    /// The underlying watch descriptor.
    #[must_use]
    pub fn wd(&self) -> Wd {
        self.wd
    }
}

impl Volume {
    /// Creates an inotify descriptor in the fd table.
    pub fn inotify_init(&mut self) -> Fd {
        let fd = FD_IDS.allocate();
        self.fds.insert(fd, Descriptor::Inotify(InotifyState::new(fd)));
        fd
    }

    /// Registers or updates a watch on the inode `path` resolves to.
    ///
    /// `DONT_FOLLOW` walks without expanding a trailing symlink; `ONLYDIR`
    /// insists on a directory. A second add from the same descriptor
    /// merges masks: replacement by default, union under `MASK_ADD`.
    pub fn inotify_add_watch(&mut self, fd: Fd, path: &str, mask: EventMask) -> FsResult<Wd> {
        let state = self.inotify_state(fd, "inotify_add_watch")?;
        let (entry, node) =
            self.walk_existing(path, mask.contains(EventMask::DONT_FOLLOW), "inotify_add_watch")?;
        if mask.contains(EventMask::ONLYDIR) && !node.borrow().is_dir() {
            return Err(FsError::with_path(
                FsErrorCode::ENOTDIR,
                "inotify_add_watch",
                path,
            ));
        }

        let existing = node.borrow().watches.get(&fd).cloned();
        if let Some(watch) = existing {
            let mut w = watch.borrow_mut();
            let bits = mask & EventMask::STORED;
            w.mask = if mask.contains(EventMask::MASK_ADD) {
                w.mask | bits
            } else {
                bits
            };
            return Ok(w.wd);
        }

        let wd = WD_IDS.allocate();
        let watch = Rc::new(std::cell::RefCell::new(WatchDesc {
            wd,
            mask: mask & EventMask::STORED,
            path: entry.path.clone(),
            node: Rc::downgrade(&node),
            owner: Rc::downgrade(&state),
        }));
        node.borrow_mut().watches.insert(fd, Rc::clone(&watch));
        {
            let mut s = state.borrow_mut();
            s.by_wd.insert(wd, Rc::clone(&watch));
            s.by_path.insert(entry.path, watch);
        }
        Ok(wd)
    }

    /// Removes a watch, delivering the final `IGNORED` event on its wd.
    pub fn inotify_rm_watch(&mut self, fd: Fd, wd: Wd) -> FsResult<()> {
        let state = self.inotify_state(fd, "inotify_rm_watch")?;
        let watch = state.borrow().by_wd.get(&wd).cloned();
        let Some(watch) = watch else {
            return Err(FsError::new(FsErrorCode::EINVAL, "inotify_rm_watch"));
        };
        inotify::detach_watch(&watch, true);
        Ok(())
    }

    /// Drains the queued events of an inotify descriptor in FIFO order.
    pub fn take_events(&mut self, fd: Fd) -> FsResult<Vec<InotifyEvent>> {
        let state = self.inotify_state(fd, "read")?;
        let mut s = state.borrow_mut();
        Ok(s.queue.drain(..).collect())
    }

    /// Watches a path for any event through a dedicated descriptor.
    pub fn watch(&mut self, path: &str) -> FsResult<DirWatcher> {
        let fd = self.inotify_init();
        match self.inotify_add_watch(fd, path, EventMask::ALL_EVENTS) {
            Ok(wd) => Ok(DirWatcher { fd, wd }),
            Err(err) => {
                self.fds.remove(&fd);
                Err(err)
            }
        }
    }

    /// Drains a façade watcher, translating masks into change/rename
    /// events and suppressing `IGNORED`.
    pub fn take_watch_events(&mut self, watcher: &DirWatcher) -> FsResult<Vec<WatchEvent>> {
        Ok(self
            .take_events(watcher.fd)?
            .iter()
            .filter_map(inotify::translate)
            .collect())
    }

    /// Tears a façade watcher down.
    pub fn unwatch(&mut self, watcher: DirWatcher) -> FsResult<()> {
        self.close(watcher.fd)
    }

    fn inotify_state(&self, fd: Fd, syscall: &'static str) -> FsResult<InotifyRef> {
        match self.fds.get(&fd) {
            Some(Descriptor::Inotify(state)) => Ok(Rc::clone(state)),
            _ => {
                warn!(fd, syscall, "unknown or non-inotify descriptor");
                Err(FsError::new(FsErrorCode::EBADF, syscall))
            }
        }
    }
}
