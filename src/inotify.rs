//! Inotify-style change notification.
//!
//! Watch descriptors live on both sides of the relationship: an inotify
//! descriptor maps `wd → watch` and `path → watch`, while every watched
//! inode carries a `watcher-fd → watch` map. Delivery is synchronous with
//! the mutation — events land in the owning watcher's FIFO queue inside
//! the mutating call and are drained by the consumer at its own pace.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use bitflags::bitflags;
use rustc_hash::FxHashMap;

use crate::node::{Fd, Node, NodeRef, Wd};

bitflags! {
    /// Inotify event and control bits.
    ///
    /// Numeric values match the Linux ABI so masks round-trip unchanged.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventMask: u32 {
        /// File was accessed.
        const ACCESS = 0x0000_0001;
        /// File content was modified.
        const MODIFY = 0x0000_0002;
        /// Metadata changed.
        const ATTRIB = 0x0000_0004;
        /// Writable descriptor was closed.
        const CLOSE_WRITE = 0x0000_0008;
        /// Read-only descriptor was closed.
        const CLOSE_NOWRITE = 0x0000_0010;
        /// File was opened.
        const OPEN = 0x0000_0020;
        /// Entry moved out of the watched directory.
        const MOVED_FROM = 0x0000_0040;
        /// Entry moved into the watched directory.
        const MOVED_TO = 0x0000_0080;
        /// Entry created in the watched directory.
        const CREATE = 0x0000_0100;
        /// Entry deleted from the watched directory.
        const DELETE = 0x0000_0200;
        /// The watched inode itself was deleted.
        const DELETE_SELF = 0x0000_0400;
        /// The watched inode itself was moved.
        const MOVE_SELF = 0x0000_0800;
        /// Watch was removed; final event on a wd.
        const IGNORED = 0x0000_8000;
        /// Only watch the path if it is a directory.
        const ONLYDIR = 0x0100_0000;
        /// Do not follow a trailing symlink when adding the watch.
        const DONT_FOLLOW = 0x0200_0000;
        /// Stop reporting events for unlinked children.
        const EXCL_UNLINK = 0x0400_0000;
        /// Merge with an existing watch mask instead of replacing it.
        const MASK_ADD = 0x2000_0000;
        /// Subject of the event is a directory.
        const ISDIR = 0x4000_0000;
        /// Remove the watch after its first delivered event.
        const ONESHOT = 0x8000_0000;
        /// Every subscribable event bit.
        const ALL_EVENTS = 0x0000_0FFF;
    }
}

impl EventMask {
    /// Bits retained in a watch's stored mask.
    pub(crate) const STORED: EventMask = EventMask::ALL_EVENTS
        .union(EventMask::ONESHOT)
        .union(EventMask::EXCL_UNLINK);
}

/// One delivered notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InotifyEvent {
    pub wd: Wd,
    pub mask: EventMask,
    /// Non-zero only for the two halves of a rename pair.
    pub cookie: u64,
    /// Child name for events aimed at a watched parent directory.
    pub name: Option<String>,
}

/// A single registered watch.
pub(crate) struct WatchDesc {
    pub(crate) wd: Wd,
    pub(crate) mask: EventMask,
    pub(crate) path: String,
    pub(crate) node: Weak<RefCell<Node>>,
    pub(crate) owner: Weak<RefCell<InotifyState>>,
}

pub(crate) type WatchRef = Rc<RefCell<WatchDesc>>;

/// State behind an inotify descriptor in the fd table.
pub(crate) struct InotifyState {
    pub(crate) fd: Fd,
    pub(crate) by_wd: FxHashMap<Wd, WatchRef>,
    pub(crate) by_path: FxHashMap<String, WatchRef>,
    pub(crate) queue: VecDeque<InotifyEvent>,
}

pub(crate) type InotifyRef = Rc<RefCell<InotifyState>>;

impl InotifyState {
    pub(crate) fn new(fd: Fd) -> InotifyRef {
        Rc::new(RefCell::new(Self {
            fd,
            by_wd: FxHashMap::default(),
            by_path: FxHashMap::default(),
            queue: VecDeque::new(),
        }))
    }
}

/// Delivers `mask` to every watch registered on `node`.
///
/// Per watch the delivered mask is
/// `(mask & watch.mask) | (mask & !ALL_EVENTS)`; a zero result skips the
/// watch. A oneshot watch is removed after its delivery without the usual
/// `IGNORED` event.
pub(crate) fn notify(node: &NodeRef, mask: EventMask, name: Option<&str>, cookie: u64) {
    let watches: Vec<WatchRef> = node.borrow().watches.values().cloned().collect();
    for watch in watches {
        let (wd, stored, owner) = {
            let w = watch.borrow();
            (w.wd, w.mask, w.owner.clone())
        };
        let delivered = (mask & stored) | mask.difference(EventMask::ALL_EVENTS);
        if delivered.is_empty() {
            continue;
        }
        if let Some(owner) = owner.upgrade() {
            owner.borrow_mut().queue.push_back(InotifyEvent {
                wd,
                mask: delivered,
                cookie,
                name: name.map(str::to_owned),
            });
        }
        if stored.contains(EventMask::ONESHOT) {
            detach_watch(&watch, false);
        }
    }
}

/// Unlinks a watch from its inode and its owner.
///
/// With `emit_ignored` the owner receives the final `IGNORED` event for
/// the wd.
pub(crate) fn detach_watch(watch: &WatchRef, emit_ignored: bool) {
    let (wd, path, node, owner) = {
        let w = watch.borrow();
        (w.wd, w.path.clone(), w.node.clone(), w.owner.clone())
    };
    if let (Some(node), Some(owner)) = (node.upgrade(), owner.upgrade()) {
        let fd = owner.borrow().fd;
        node.borrow_mut().watches.remove(&fd);
    }
    if let Some(owner) = owner.upgrade() {
        let mut state = owner.borrow_mut();
        state.by_wd.remove(&wd);
        state.by_path.remove(&path);
        if emit_ignored {
            state.queue.push_back(InotifyEvent {
                wd,
                mask: EventMask::IGNORED,
                cookie: 0,
                name: None,
            });
        }
    }
}

/// Tears down every watch on a dying inode, delivering `IGNORED` each.
pub(crate) fn drop_watches(node: &NodeRef) {
    let watches: Vec<WatchRef> = {
        let mut n = node.borrow_mut();
        n.watches.drain().map(|(_, watch)| watch).collect()
    };
    for watch in watches {
        detach_watch(&watch, true);
    }
}

/// Detaches every watch owned by a closing inotify descriptor.
pub(crate) fn detach_owner(state: &InotifyRef) {
    let watches: Vec<WatchRef> = state.borrow().by_wd.values().cloned().collect();
    for watch in watches {
        detach_watch(&watch, false);
    }
}

/// Event kinds reported by the high-level watcher façade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    /// Content or metadata changed.
    Change,
    /// An entry appeared, disappeared or moved.
    Rename,
}

/// A translated, consumer-friendly notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub name: Option<String>,
}

/// Folds a raw event into the façade vocabulary. `IGNORED` is suppressed.
pub(crate) fn translate(event: &InotifyEvent) -> Option<WatchEvent> {
    if event.mask.contains(EventMask::IGNORED) {
        return None;
    }
    let rename = EventMask::CREATE
        | EventMask::DELETE
        | EventMask::DELETE_SELF
        | EventMask::MOVED_FROM
        | EventMask::MOVED_TO
        | EventMask::MOVE_SELF;
    if event.mask.intersects(rename) {
        Some(WatchEvent {
            kind: WatchEventKind::Rename,
            name: event.name.clone(),
        })
    } else if event.mask.intersects(EventMask::ALL_EVENTS) {
        Some(WatchEvent {
            kind: WatchEventKind::Change,
            name: event.name.clone(),
        })
    } else {
        None
    }
}
