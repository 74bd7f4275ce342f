//! The inode data model.
//!
//! An inode is a shared header plus a type-tagged payload for regular
//! files, directories and symbolic links. Inodes are held behind
//! [`NodeRef`] handles: every directory entry naming an inode, every open
//! descriptor on it, and every shadow back-reference to it holds the same
//! reference-counted cell. The children mapping never owns exclusively.
//!
//! Content fields are lazy. A node carrying a `(source, resolver)` pair has
//! not been materialised yet: the resolver is consulted exactly once on
//! first touch and the pair is then cleared. A node carrying a shadow
//! back-reference faults header copies and content in from the frozen
//! parent graph on first access.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use rustc_hash::FxHashMap;

use crate::errors::FsResult;
use crate::flags::{S_IFDIR, S_IFLNK, S_IFMT, S_IFREG};
use crate::ids::INO_IDS;
use crate::inotify::WatchRef;
use crate::path::{self, Casing};

/// File descriptor id.
pub type Fd = u64;
/// Watch descriptor id.
pub type Wd = u64;

/// Shared handle to an inode.
pub type NodeRef = Rc<RefCell<Node>>;

/// Opaque key/value metadata bag attached to an inode.
pub type MetaMap = FxHashMap<String, String>;

/// Wall-clock milliseconds since the epoch.
pub(crate) fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as i64)
}

/// Stat results an external mount resolver reports for a source path.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedStat {
    /// Type bits plus permission bits.
    pub mode: u32,
    /// Byte length for regular files.
    pub size: u64,
}

/// External collaborator that backs a mounted directory.
///
/// Consulted lazily: `readdir` once when the mount's children are first
/// listed, `stat` once per entry during that materialisation, and
/// `read_file` once per file on first content read.
pub trait MountResolver {
    fn stat(&self, path: &str) -> FsResult<ResolvedStat>;
    fn readdir(&self, path: &str) -> FsResult<Vec<String>>;
    fn read_file(&self, path: &str) -> FsResult<Bytes>;
}

/// Where a not-yet-materialised node fetches its content from.
pub(crate) struct MountSource {
    pub(crate) path: String,
    pub(crate) resolver: Rc<dyn MountResolver>,
}

impl Clone for MountSource {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            resolver: Rc::clone(&self.resolver),
        }
    }
}

/// A named directory entry.
#[derive(Clone)]
pub(crate) struct DirSlot {
    /// Display name as created.
    pub(crate) name: String,
    pub(crate) node: NodeRef,
}

/// Ordered (name → inode) mapping of a directory.
///
/// Entries are ordered by the comparator fixed at construction: keys are
/// case-folded for insensitive volumes while display names are preserved.
pub(crate) struct DirMap {
    casing: Casing,
    entries: BTreeMap<String, DirSlot>,
}

impl DirMap {
    pub(crate) fn new(casing: Casing) -> Self {
        Self {
            casing,
            entries: BTreeMap::new(),
        }
    }

    pub(crate) fn get(&self, name: &str) -> Option<&DirSlot> {
        self.entries.get(&self.casing.fold(name))
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&self.casing.fold(name))
    }

    pub(crate) fn insert(&mut self, name: &str, node: NodeRef) {
        self.entries.insert(
            self.casing.fold(name),
            DirSlot {
                name: name.to_owned(),
                node,
            },
        );
    }

    pub(crate) fn remove(&mut self, name: &str) -> Option<DirSlot> {
        self.entries.remove(&self.casing.fold(name))
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &DirSlot> {
        self.entries.values()
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.entries.values().map(|slot| slot.name.clone()).collect()
    }
}

/// Type-tagged inode payload.
pub(crate) enum NodeKind {
    File {
        /// Cached byte length when content is not materialised.
        size: Option<u64>,
        /// Published content.
        bytes: Option<Bytes>,
        source: Option<MountSource>,
        shadow: Option<NodeRef>,
    },
    Dir {
        casing: Casing,
        children: Option<DirMap>,
        source: Option<MountSource>,
        shadow: Option<NodeRef>,
    },
    Symlink {
        /// Target path stored verbatim at creation.
        target: String,
        shadow: Option<NodeRef>,
    },
}

/// An inode: identity, ownership, timestamps and a typed payload.
pub struct Node {
    pub dev: u64,
    pub ino: u64,
    /// Type bits plus 12-bit permission bits; exactly one type bit is set.
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub atime_ms: i64,
    pub mtime_ms: i64,
    pub ctime_ms: i64,
    pub birthtime_ms: i64,
    pub meta: Option<MetaMap>,
    pub(crate) watches: FxHashMap<Fd, WatchRef>,
    pub(crate) kind: NodeKind,
}

impl Node {
    fn new(dev: u64, mode: u32, uid: u32, gid: u32, kind: NodeKind) -> Self {
        let now = now_ms();
        Self {
            dev,
            ino: INO_IDS.allocate(),
            mode,
            nlink: 1,
            uid,
            gid,
            atime_ms: now,
            mtime_ms: now,
            ctime_ms: now,
            birthtime_ms: now,
            meta: None,
            watches: FxHashMap::default(),
            kind,
        }
    }

    pub(crate) fn new_file(dev: u64, perms: u32, uid: u32, gid: u32) -> Self {
        Self::new(
            dev,
            S_IFREG | (perms & 0o7777),
            uid,
            gid,
            NodeKind::File {
                size: None,
                bytes: Some(Bytes::new()),
                source: None,
                shadow: None,
            },
        )
    }

    pub(crate) fn new_dir(dev: u64, perms: u32, uid: u32, gid: u32, casing: Casing) -> Self {
        Self::new(
            dev,
            S_IFDIR | (perms & 0o7777),
            uid,
            gid,
            NodeKind::Dir {
                casing,
                children: Some(DirMap::new(casing)),
                source: None,
                shadow: None,
            },
        )
    }

    pub(crate) fn new_symlink(dev: u64, target: &str, uid: u32, gid: u32) -> Self {
        Self::new(
            dev,
            S_IFLNK | 0o666,
            uid,
            gid,
            NodeKind::Symlink {
                target: target.to_owned(),
                shadow: None,
            },
        )
    }

    pub(crate) fn new_mount_dir(
        dev: u64,
        perms: u32,
        uid: u32,
        gid: u32,
        casing: Casing,
        source: MountSource,
    ) -> Self {
        Self::new(
            dev,
            S_IFDIR | (perms & 0o7777),
            uid,
            gid,
            NodeKind::Dir {
                casing,
                children: None,
                source: Some(source),
                shadow: None,
            },
        )
    }

    pub(crate) fn new_mount_file(
        dev: u64,
        perms: u32,
        uid: u32,
        gid: u32,
        size: u64,
        source: MountSource,
    ) -> Self {
        Self::new(
            dev,
            S_IFREG | (perms & 0o7777),
            uid,
            gid,
            NodeKind::File {
                size: Some(size),
                bytes: None,
                source: Some(source),
                shadow: None,
            },
        )
    }

    /// Copies the header of a frozen node into an empty overlay node.
    ///
    /// Identity (dev/ino) is preserved: the copy is a view of the same
    /// logical inode. Content fields stay empty and fault in through the
    /// retained shadow back-reference.
    pub(crate) fn shadow_of(root: &NodeRef, casing: Casing) -> Self {
        let src = root.borrow();
        let kind = match &src.kind {
            NodeKind::File { .. } => NodeKind::File {
                size: None,
                bytes: None,
                source: None,
                shadow: Some(Rc::clone(root)),
            },
            NodeKind::Dir { .. } => NodeKind::Dir {
                casing,
                children: None,
                source: None,
                shadow: Some(Rc::clone(root)),
            },
            NodeKind::Symlink { target, .. } => NodeKind::Symlink {
                target: target.clone(),
                shadow: Some(Rc::clone(root)),
            },
        };
        Self {
            dev: src.dev,
            ino: src.ino,
            mode: src.mode,
            nlink: src.nlink,
            uid: src.uid,
            gid: src.gid,
            atime_ms: src.atime_ms,
            mtime_ms: src.mtime_ms,
            ctime_ms: src.ctime_ms,
            birthtime_ms: src.birthtime_ms,
            meta: None,
            watches: FxHashMap::default(),
            kind,
        }
    }

    pub fn is_file(&self) -> bool {
        self.mode & S_IFMT == S_IFREG
    }

    pub fn is_dir(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    pub fn is_symlink(&self) -> bool {
        self.mode & S_IFMT == S_IFLNK
    }

    /// Logical byte length without forcing materialisation.
    pub(crate) fn size(&self) -> u64 {
        match &self.kind {
            NodeKind::File {
                bytes: Some(bytes), ..
            } => bytes.len() as u64,
            NodeKind::File { size: Some(n), .. } => *n,
            NodeKind::File {
                shadow: Some(root), ..
            } => root.borrow().size(),
            NodeKind::File { .. } => 0,
            NodeKind::Symlink { target, .. } => target.len() as u64,
            NodeKind::Dir { .. } => 0,
        }
    }

    pub(crate) fn symlink_target(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Symlink { target, .. } => Some(target),
            _ => None,
        }
    }

    pub(crate) fn children(&self) -> Option<&DirMap> {
        match &self.kind {
            NodeKind::Dir {
                children: Some(map),
                ..
            } => Some(map),
            _ => None,
        }
    }

    pub(crate) fn children_mut(&mut self) -> Option<&mut DirMap> {
        match &mut self.kind {
            NodeKind::Dir {
                children: Some(map),
                ..
            } => Some(map),
            _ => None,
        }
    }

    /// Publishes new content and refreshes the cached size.
    pub(crate) fn set_bytes(&mut self, data: Bytes) {
        if let NodeKind::File { size, bytes, .. } = &mut self.kind {
            *size = Some(data.len() as u64);
            *bytes = Some(data);
        }
    }

    fn shadow_root(&self) -> Option<&NodeRef> {
        match &self.kind {
            NodeKind::File { shadow, .. }
            | NodeKind::Dir { shadow, .. }
            | NodeKind::Symlink { shadow, .. } => shadow.as_ref(),
        }
    }

    /// Looks a metadata key up locally, falling through the shadow chain.
    pub fn meta_get(&self, key: &str) -> Option<String> {
        if let Some(map) = &self.meta {
            if let Some(value) = map.get(key) {
                return Some(value.clone());
            }
        }
        self.shadow_root()
            .and_then(|root| root.borrow().meta_get(key))
    }

    /// Sets a metadata key, materialising a local bag.
    pub fn meta_set(&mut self, key: &str, value: &str) {
        self.meta
            .get_or_insert_with(MetaMap::default)
            .insert(key.to_owned(), value.to_owned());
    }
}

/// Strategy chosen while the node borrow is held, executed after release.
enum ChildFetch {
    Ready,
    Mount(MountSource, Casing),
    Shadow(NodeRef, Casing),
    Empty(Casing),
}

/// Materialises a directory's children mapping.
///
/// Mounted directories consult their resolver exactly once; shadow
/// directories copy child headers from the frozen root. Non-directories
/// are a no-op.
pub(crate) fn ensure_children(node: &NodeRef) -> FsResult<()> {
    let fetch = {
        let n = node.borrow();
        match &n.kind {
            NodeKind::Dir {
                children: Some(_), ..
            } => ChildFetch::Ready,
            NodeKind::Dir {
                casing,
                source: Some(source),
                ..
            } => ChildFetch::Mount(source.clone(), *casing),
            NodeKind::Dir {
                casing,
                shadow: Some(root),
                ..
            } => ChildFetch::Shadow(Rc::clone(root), *casing),
            NodeKind::Dir { casing, .. } => ChildFetch::Empty(*casing),
            _ => ChildFetch::Ready,
        }
    };

    let map = match fetch {
        ChildFetch::Ready => return Ok(()),
        ChildFetch::Mount(source, casing) => {
            let names = source.resolver.readdir(&source.path)?;
            let (dev, uid, gid) = {
                let n = node.borrow();
                (n.dev, n.uid, n.gid)
            };
            let mut map = DirMap::new(casing);
            for name in names {
                let child_path = path::combine(&source.path, &name);
                let stat = source.resolver.stat(&child_path)?;
                let child_source = MountSource {
                    path: child_path,
                    resolver: Rc::clone(&source.resolver),
                };
                let child = match stat.mode & S_IFMT {
                    S_IFDIR => {
                        Node::new_mount_dir(dev, stat.mode, uid, gid, casing, child_source)
                    }
                    S_IFREG => Node::new_mount_file(
                        dev,
                        stat.mode,
                        uid,
                        gid,
                        stat.size,
                        child_source,
                    ),
                    _ => continue,
                };
                map.insert(&name, Rc::new(RefCell::new(child)));
            }
            map
        }
        ChildFetch::Shadow(root, casing) => {
            ensure_children(&root)?;
            let r = root.borrow();
            let mut map = DirMap::new(casing);
            if let Some(children) = r.children() {
                for slot in children.iter() {
                    let child = Node::shadow_of(&slot.node, casing);
                    map.insert(&slot.name, Rc::new(RefCell::new(child)));
                }
            }
            map
        }
        ChildFetch::Empty(casing) => DirMap::new(casing),
    };

    let mut n = node.borrow_mut();
    if let NodeKind::Dir {
        children, source, ..
    } = &mut n.kind
    {
        *children = Some(map);
        *source = None;
    }
    Ok(())
}

enum ByteFetch {
    Ready(Bytes),
    Mount(MountSource),
    Shadow(NodeRef),
    Empty,
}

/// Materialises a file's published content and returns it.
pub(crate) fn ensure_bytes(node: &NodeRef) -> FsResult<Bytes> {
    let fetch = {
        let n = node.borrow();
        match &n.kind {
            NodeKind::File {
                bytes: Some(bytes), ..
            } => ByteFetch::Ready(bytes.clone()),
            NodeKind::File {
                source: Some(source),
                ..
            } => ByteFetch::Mount(source.clone()),
            NodeKind::File {
                shadow: Some(root), ..
            } => ByteFetch::Shadow(Rc::clone(root)),
            _ => ByteFetch::Empty,
        }
    };

    let data = match fetch {
        ByteFetch::Ready(bytes) => return Ok(bytes),
        ByteFetch::Mount(source) => source.resolver.read_file(&source.path)?,
        ByteFetch::Shadow(root) => ensure_bytes(&root)?,
        ByteFetch::Empty => Bytes::new(),
    };

    let mut n = node.borrow_mut();
    if let NodeKind::File {
        size,
        bytes,
        source,
        ..
    } = &mut n.kind
    {
        *size = Some(data.len() as u64);
        *bytes = Some(data.clone());
        *source = None;
    }
    Ok(data)
}

/// Looks up a child by name, materialising the mapping first.
pub(crate) fn lookup_child(node: &NodeRef, name: &str) -> FsResult<Option<NodeRef>> {
    ensure_children(node)?;
    let n = node.borrow();
    Ok(n.children()
        .and_then(|map| map.get(name))
        .map(|slot| Rc::clone(&slot.node)))
}
