//! The filesystem proper.
//!
//! A [`Volume`] owns a root map, a descriptor table and the identity under
//! which permission checks run. Operations are synchronous and complete
//! atomically from the caller's perspective; notification delivery happens
//! inside the mutating call.

mod access;
mod apply;
mod attr;
mod dirops;
mod fileops;
mod mount;
mod notify;
mod resolve;

pub use self::apply::{EntryAttrs, FileMap, FsEntry};
pub use self::notify::DirWatcher;

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::errors::{FsError, FsErrorCode, FsResult};
use crate::ids::DEV_IDS;
use crate::node::{now_ms, DirMap, DirSlot, Fd, Node, NodeRef};
use crate::path::{self, Casing, ValidationFlags};
use crate::watch::PollWatch;

use self::fileops::Descriptor;

/// Construction-time configuration for a [`Volume`].
#[derive(Debug, Clone)]
pub struct VolumeOptions {
    /// Name comparison mode, fixed for the volume's lifetime.
    pub casing: Casing,
    /// Initial working directory for relative paths, if any.
    pub cwd: Option<String>,
    /// Effective user id operations run as.
    pub uid: u32,
    /// Effective group id operations run as.
    pub gid: u32,
    /// Permission bits cleared from newly created nodes.
    pub umask: u32,
}

impl Default for VolumeOptions {
    fn default() -> Self {
        Self {
            casing: Casing::Sensitive,
            cwd: Some("/".to_owned()),
            uid: 0,
            gid: 0,
            umask: 0o022,
        }
    }
}

/// An in-memory POSIX-like filesystem.
pub struct Volume {
    pub(crate) dev: u64,
    pub(crate) casing: Casing,
    pub(crate) cwd: Option<String>,
    pub(crate) euid: u32,
    pub(crate) egid: u32,
    pub(crate) umask: u32,
    pub(crate) readonly: bool,
    pub(crate) roots: DirMap,
    /// Frozen parent roots this volume lazily shadows, if any.
    pub(crate) shadow_roots: Option<Vec<DirSlot>>,
    pub(crate) fds: FxHashMap<Fd, Descriptor>,
    pub(crate) poll_watches: Vec<PollWatch>,
}

impl std::fmt::Debug for Volume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Volume")
            .field("dev", &self.dev)
            .field("casing", &self.casing)
            .field("cwd", &self.cwd)
            .field("euid", &self.euid)
            .field("egid", &self.egid)
            .field("umask", &self.umask)
            .field("readonly", &self.readonly)
            .finish_non_exhaustive()
    }
}

impl Default for Volume {
    fn default() -> Self {
        Self::new()
    }
}

impl Volume {
    /// Creates an empty volume with a single `/` root.
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(VolumeOptions::default())
    }

    /// Creates an empty volume with explicit options.
    #[must_use]
    pub fn with_options(options: VolumeOptions) -> Self {
        let dev = DEV_IDS.allocate();
        let mut roots = DirMap::new(options.casing);
        let root = Node::new_dir(dev, 0o777, options.uid, options.gid, options.casing);
        roots.insert("/", Rc::new(RefCell::new(root)));
        Self {
            dev,
            casing: options.casing,
            cwd: options.cwd,
            euid: options.uid,
            egid: options.gid,
            umask: options.umask & 0o777,
            readonly: false,
            roots,
            shadow_roots: None,
            fds: FxHashMap::default(),
            poll_watches: Vec::new(),
        }
    }

    /// The volume's device id.
    #[must_use]
    pub fn dev(&self) -> u64 {
        self.dev
    }

    /// The name comparison mode fixed at construction.
    #[must_use]
    pub fn casing(&self) -> Casing {
        self.casing
    }

    /// Current working directory, if set.
    #[must_use]
    pub fn cwd(&self) -> Option<&str> {
        self.cwd.as_deref()
    }

    /// Changes the working directory to an existing, searchable directory.
    pub fn chdir(&mut self, path: &str) -> FsResult<()> {
        let entry = self.walk(path, false, "chdir")?;
        let node = entry.require_node("chdir", path)?;
        if !node.borrow().is_dir() {
            return Err(FsError::with_path(FsErrorCode::ENOTDIR, "chdir", path));
        }
        self.check_access(&node, crate::flags::Access::EXEC, "chdir", path)?;
        self.cwd = Some(entry.path);
        Ok(())
    }

    /// Effective user id.
    #[must_use]
    pub fn euid(&self) -> u32 {
        self.euid
    }

    /// Effective group id.
    #[must_use]
    pub fn egid(&self) -> u32 {
        self.egid
    }

    /// Changes the effective user id. Fails with `EPERM` once frozen.
    pub fn set_uid(&mut self, uid: u32) -> FsResult<()> {
        self.ensure_identity_mutable("setuid")?;
        self.euid = uid;
        Ok(())
    }

    /// Changes the effective group id. Fails with `EPERM` once frozen.
    pub fn set_gid(&mut self, gid: u32) -> FsResult<()> {
        self.ensure_identity_mutable("setgid")?;
        self.egid = gid;
        Ok(())
    }

    /// Replaces the creation mask, returning the previous value.
    pub fn umask(&mut self, mask: u32) -> FsResult<u32> {
        self.ensure_identity_mutable("umask")?;
        let old = self.umask;
        self.umask = mask & 0o777;
        Ok(old)
    }

    /// Whether the volume has been frozen by [`Volume::make_readonly`].
    #[must_use]
    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    /// Freezes the volume: every subsequent mutation fails with `EROFS`
    /// (`EPERM` for identity changes). Reads and read-only opens remain
    /// legal.
    pub fn make_readonly(&mut self) {
        debug!(dev = self.dev, "freezing volume");
        self.readonly = true;
    }

    /// Creates a mutable overlay of this frozen volume.
    ///
    /// The child starts with no materialised roots; directories, headers
    /// and content fault in lazily from this volume's graph, which the
    /// freeze keeps immutable. Writes in the child never reach the parent.
    ///
    /// A case-insensitive child over a case-sensitive parent is rejected:
    /// folded child lookups could not be mapped back onto parent names.
    pub fn shadow(&self, casing: Option<Casing>) -> FsResult<Volume> {
        if !self.readonly {
            return Err(FsError::new(FsErrorCode::EINVAL, "shadow"));
        }
        let casing = casing.unwrap_or(self.casing);
        if casing == Casing::Insensitive && self.casing == Casing::Sensitive {
            return Err(FsError::new(FsErrorCode::EINVAL, "shadow"));
        }
        let snapshot: Vec<DirSlot> = self.roots.iter().cloned().collect();
        Ok(Volume {
            dev: DEV_IDS.allocate(),
            casing,
            cwd: self.cwd.clone(),
            euid: self.euid,
            egid: self.egid,
            umask: self.umask,
            readonly: false,
            roots: DirMap::new(casing),
            shadow_roots: Some(snapshot),
            fds: FxHashMap::default(),
            poll_watches: Vec::new(),
        })
    }

    /// Reads a metadata key, falling through shadow roots.
    pub fn metadata(&mut self, path: &str, key: &str) -> FsResult<Option<String>> {
        let entry = self.walk(path, false, "stat")?;
        let node = entry.require_node("stat", path)?;
        let value = node.borrow().meta_get(key);
        Ok(value)
    }

    /// Sets a metadata key on the local node.
    pub fn set_metadata(&mut self, path: &str, key: &str, value: &str) -> FsResult<()> {
        self.ensure_writable("setattr", path)?;
        let entry = self.walk(path, false, "setattr")?;
        let node = entry.require_node("setattr", path)?;
        node.borrow_mut().meta_set(key, value);
        Ok(())
    }

    /// Looks a root up by name, materialising it from the shadow parent
    /// on first touch.
    pub(crate) fn get_root(&mut self, name: &str) -> Option<NodeRef> {
        if let Some(slot) = self.roots.get(name) {
            return Some(Rc::clone(&slot.node));
        }
        let casing = self.casing;
        let found = self
            .shadow_roots
            .as_ref()
            .and_then(|snapshot| snapshot.iter().find(|s| casing.eq(&s.name, name)))
            .cloned();
        let slot = found?;
        let node = Rc::new(RefCell::new(Node::shadow_of(&slot.node, casing)));
        self.roots.insert(&slot.name, Rc::clone(&node));
        Some(node)
    }

    /// Resolves `path` against the working directory and validates it.
    pub(crate) fn absolutize(&self, path: &str, syscall: &'static str) -> FsResult<String> {
        let trimmed = path::normalize_separators(path);
        let absolute = if path::is_absolute(&trimmed) {
            trimmed
        } else {
            match &self.cwd {
                Some(cwd) => path::combine(cwd, &trimmed),
                None => {
                    return Err(FsError::with_path(FsErrorCode::ENOENT, syscall, path));
                }
            }
        };
        path::validate(
            &absolute,
            ValidationFlags::ABSOLUTE | ValidationFlags::ALLOW_NAVIGATION,
        )
        .map_err(|_| FsError::with_path(FsErrorCode::ENOENT, syscall, path))?;
        Ok(path::normalize(&absolute))
    }

    pub(crate) fn ensure_writable(&self, syscall: &'static str, path: &str) -> FsResult<()> {
        if self.readonly {
            return Err(FsError::with_path(FsErrorCode::EROFS, syscall, path));
        }
        Ok(())
    }

    fn ensure_identity_mutable(&self, syscall: &'static str) -> FsResult<()> {
        if self.readonly {
            return Err(FsError::new(FsErrorCode::EPERM, syscall));
        }
        Ok(())
    }
}

/// Bumps modification and change time together.
pub(crate) fn touch_cm(node: &NodeRef) {
    let now = now_ms();
    let mut n = node.borrow_mut();
    n.mtime_ms = now;
    n.ctime_ms = now;
}

/// Bumps change time only.
pub(crate) fn touch_c(node: &NodeRef) {
    let mut n = node.borrow_mut();
    n.ctime_ms = now_ms();
}
