//! Declarative bulk population.
//!
//! A [`FileMap`] describes a tree of files, directories, links and mounts
//! to impose on a volume in one pass. Hard links, symlinks and mounts are
//! deferred until every directory and file of the pass exists, so their
//! targets are in place regardless of map order.

use std::rc::Rc;

use bytes::Bytes;
use tracing::debug;

use crate::errors::{FsError, FsErrorCode, FsResult};
use crate::flags::S_IFMT;
use crate::node::{MetaMap, MountResolver};
use crate::path;

use super::Volume;

/// Optional ownership, mode and metadata applied to a created entry.
#[derive(Default, Clone)]
pub struct EntryAttrs {
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub mode: Option<u32>,
    pub meta: Option<MetaMap>,
}

impl EntryAttrs {
    fn is_empty(&self) -> bool {
        self.uid.is_none() && self.gid.is_none() && self.mode.is_none() && self.meta.is_none()
    }
}

/// One entry of a [`FileMap`].
pub enum FsEntry {
    /// Write a regular file with the given content.
    File { data: Bytes, attrs: EntryAttrs },
    /// Create a directory.
    Dir { attrs: EntryAttrs },
    /// Create a directory and recurse into a nested map.
    Tree(FileMap),
    /// Hard-link to an existing path (deferred).
    HardLink { target: String },
    /// Symlink to a target, stored verbatim (deferred).
    Symlink { target: String, attrs: EntryAttrs },
    /// Mount an external resolver (deferred).
    Mount {
        source: String,
        resolver: Rc<dyn MountResolver>,
    },
    /// Remove the path and everything under it.
    Remove,
}

impl FsEntry {
    /// A regular file with `data` as content.
    #[must_use]
    pub fn file(data: impl Into<Bytes>) -> Self {
        FsEntry::File {
            data: data.into(),
            attrs: EntryAttrs::default(),
        }
    }

    /// An empty directory.
    #[must_use]
    pub fn dir() -> Self {
        FsEntry::Dir {
            attrs: EntryAttrs::default(),
        }
    }

    /// A directory populated from a nested map.
    #[must_use]
    pub fn tree(map: FileMap) -> Self {
        FsEntry::Tree(map)
    }

    /// A hard link to `target`.
    #[must_use]
    pub fn hard_link(target: impl Into<String>) -> Self {
        FsEntry::HardLink {
            target: target.into(),
        }
    }

    /// A symbolic link to `target`.
    #[must_use]
    pub fn symlink(target: impl Into<String>) -> Self {
        FsEntry::Symlink {
            target: target.into(),
            attrs: EntryAttrs::default(),
        }
    }

    /// A mount of `source` through `resolver`.
    #[must_use]
    pub fn mount(source: impl Into<String>, resolver: Rc<dyn MountResolver>) -> Self {
        FsEntry::Mount {
            source: source.into(),
            resolver,
        }
    }

    /// Removal of the path.
    #[must_use]
    pub fn remove() -> Self {
        FsEntry::Remove
    }

    /// Overrides the permission bits.
    #[must_use]
    pub fn with_mode(mut self, mode: u32) -> Self {
        if let Some(attrs) = self.attrs_mut() {
            attrs.mode = Some(mode);
        }
        self
    }

    /// Overrides ownership.
    #[must_use]
    pub fn with_owner(mut self, uid: u32, gid: u32) -> Self {
        if let Some(attrs) = self.attrs_mut() {
            attrs.uid = Some(uid);
            attrs.gid = Some(gid);
        }
        self
    }

    /// Adds a metadata key/value pair.
    #[must_use]
    pub fn with_meta(mut self, key: &str, value: &str) -> Self {
        if let Some(attrs) = self.attrs_mut() {
            attrs
                .meta
                .get_or_insert_with(MetaMap::default)
                .insert(key.to_owned(), value.to_owned());
        }
        self
    }

    fn attrs_mut(&mut self) -> Option<&mut EntryAttrs> {
        match self {
            FsEntry::File { attrs, .. }
            | FsEntry::Dir { attrs }
            | FsEntry::Symlink { attrs, .. } => Some(attrs),
            _ => None,
        }
    }
}

/// An ordered mapping from path to [`FsEntry`].
///
/// Relative names resolve against the volume's working directory (nested
/// maps resolve against their parent directory).
#[derive(Default)]
pub struct FileMap {
    entries: Vec<(String, FsEntry)>,
}

impl FileMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry, preserving insertion order.
    #[must_use]
    pub fn with(mut self, path: impl Into<String>, entry: FsEntry) -> Self {
        self.entries.push((path.into(), entry));
        self
    }

    pub fn insert(&mut self, path: impl Into<String>, entry: FsEntry) {
        self.entries.push((path.into(), entry));
    }

    fn iter(&self) -> impl Iterator<Item = &(String, FsEntry)> {
        self.entries.iter()
    }
}

impl<S: Into<String>> FromIterator<(S, FsEntry)> for FileMap {
    fn from_iter<T: IntoIterator<Item = (S, FsEntry)>>(iter: T) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(path, entry)| (path.into(), entry))
                .collect(),
        }
    }
}

impl Volume {
    /// Applies a [`FileMap`] to the volume.
    ///
    /// Directories and files are created first; hard links, symlinks and
    /// mounts follow in a second pass. Roots may be created as
    /// directories but can never be deleted or bound to files or links.
    pub fn apply(&mut self, map: &FileMap) -> FsResult<()> {
        self.ensure_writable("apply", "")?;
        debug!(entries = map.entries.len(), "apply file map");
        let base = self.cwd.clone().unwrap_or_else(|| "/".to_owned());
        let mut deferred: Vec<(String, &FsEntry)> = Vec::new();
        self.apply_pass(&base, map, &mut deferred)?;
        for (target, entry) in deferred {
            match entry {
                FsEntry::Symlink { target: to, attrs } => {
                    self.mkdirp(&path::dirname(&target), 0o777)?;
                    self.symlink(to, &target)?;
                    self.apply_attrs(&target, attrs, true)?;
                }
                FsEntry::HardLink { target: to } => {
                    self.mkdirp(&path::dirname(&target), 0o777)?;
                    self.link(to, &target)?;
                }
                FsEntry::Mount { source, resolver } => {
                    self.mkdirp(&path::dirname(&target), 0o777)?;
                    self.mount(source, &target, Rc::clone(resolver), 0o777)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn apply_pass<'a>(
        &mut self,
        base: &str,
        map: &'a FileMap,
        deferred: &mut Vec<(String, &'a FsEntry)>,
    ) -> FsResult<()> {
        for (name, entry) in map.iter() {
            let target = path::resolve(base, name);
            let at_root = path::is_root(&target);
            match entry {
                FsEntry::Remove => {
                    if at_root {
                        return Err(FsError::with_path(FsErrorCode::EPERM, "apply", target));
                    }
                    self.remove_recursive(&target)?;
                }
                FsEntry::File { data, attrs } => {
                    if at_root {
                        return Err(FsError::with_path(FsErrorCode::EPERM, "apply", target));
                    }
                    self.mkdirp(&path::dirname(&target), 0o777)?;
                    self.write_file(&target, data)?;
                    self.apply_attrs(&target, attrs, false)?;
                }
                FsEntry::Dir { attrs } => {
                    self.mkdirp(&target, 0o777)?;
                    self.apply_attrs(&target, attrs, false)?;
                }
                FsEntry::Tree(submap) => {
                    self.mkdirp(&target, 0o777)?;
                    self.apply_pass(&target, submap, deferred)?;
                }
                FsEntry::HardLink { .. } | FsEntry::Symlink { .. } | FsEntry::Mount { .. } => {
                    if at_root {
                        return Err(FsError::with_path(FsErrorCode::EPERM, "apply", target));
                    }
                    deferred.push((target, entry));
                }
            }
        }
        Ok(())
    }

    /// Imposes fixture attributes directly; `apply` acts as a fixture
    /// builder, so ownership changes bypass the chown permission gate.
    fn apply_attrs(&mut self, target: &str, attrs: &EntryAttrs, no_follow: bool) -> FsResult<()> {
        if attrs.is_empty() {
            return Ok(());
        }
        let (_, node) = self.walk_existing(target, no_follow, "apply")?;
        let mut n = node.borrow_mut();
        if let Some(mode) = attrs.mode {
            n.mode = (n.mode & S_IFMT) | (mode & 0o7777);
        }
        if let Some(uid) = attrs.uid {
            n.uid = uid;
        }
        if let Some(gid) = attrs.gid {
            n.gid = gid;
        }
        if let Some(meta) = &attrs.meta {
            for (key, value) in meta {
                n.meta_set(key, value);
            }
        }
        Ok(())
    }
}
