//! Path-to-inode resolution.

use std::collections::VecDeque;
use std::rc::Rc;

use crate::errors::{FsError, FsErrorCode, FsResult};
use crate::flags::Access;
use crate::node::{self, NodeRef};
use crate::path::{self, MAX_LINK_DEPTH};

use super::Volume;

/// Outcome of walking a path: the resolved location plus the inodes found
/// there. `node` is `None` when everything but the final component exists.
pub(crate) struct WalkEntry {
    /// Fully resolved absolute path of the entry.
    pub(crate) path: String,
    /// Final component, empty for roots.
    pub(crate) basename: String,
    /// Containing directory; for a root, the root itself.
    pub(crate) parent: Option<NodeRef>,
    pub(crate) node: Option<NodeRef>,
}

impl WalkEntry {
    pub(crate) fn require_node(&self, syscall: &'static str, path: &str) -> FsResult<NodeRef> {
        self.node
            .as_ref()
            .map(Rc::clone)
            .ok_or_else(|| FsError::with_path(FsErrorCode::ENOENT, syscall, path))
    }

    pub(crate) fn require_parent(&self, syscall: &'static str, path: &str) -> FsResult<NodeRef> {
        self.parent
            .as_ref()
            .map(Rc::clone)
            .ok_or_else(|| FsError::with_path(FsErrorCode::ENOENT, syscall, path))
    }
}

impl Volume {
    /// Walks `path` to an inode, expanding symbolic links.
    ///
    /// Relative paths resolve against the working directory. A symlink met
    /// before the final component (or at it, unless `no_follow`) restarts
    /// the walk at its absolute-resolved target with the remaining
    /// segments appended; more than [`MAX_LINK_DEPTH`] expansions fail
    /// with `ELOOP`. Intermediate components must be searchable
    /// directories (`ENOTDIR`/`EACCES`).
    pub(crate) fn walk(
        &mut self,
        path: &str,
        no_follow: bool,
        syscall: &'static str,
    ) -> FsResult<WalkEntry> {
        let absolute = self.absolutize(path, syscall)?;
        let parts = path::parse(&absolute);
        if !parts.is_absolute() {
            return Err(FsError::with_path(FsErrorCode::ENOENT, syscall, path));
        }

        let mut root_name = parts.root;
        let mut segments: VecDeque<String> = parts.segments.into();
        let mut depth = 0usize;

        'restart: loop {
            let Some(root_node) = self.get_root(&root_name) else {
                return Err(FsError::with_path(FsErrorCode::ENOENT, syscall, path));
            };
            if segments.is_empty() {
                // Roots are directories; the parent slot is the root itself.
                return Ok(WalkEntry {
                    path: root_name,
                    basename: String::new(),
                    parent: Some(Rc::clone(&root_node)),
                    node: Some(root_node),
                });
            }

            let mut dir = root_node;
            let mut prefix = root_name.clone();
            let mut idx = 0usize;
            while idx < segments.len() {
                let seg = segments[idx].clone();
                let last = idx == segments.len() - 1;
                match node::lookup_child(&dir, &seg)? {
                    None => {
                        if last {
                            return Ok(WalkEntry {
                                path: path::combine(&prefix, &seg),
                                basename: seg,
                                parent: Some(dir),
                                node: None,
                            });
                        }
                        return Err(FsError::with_path(FsErrorCode::ENOENT, syscall, path));
                    }
                    Some(child) => {
                        let is_symlink = child.borrow().is_symlink();
                        if is_symlink && !(no_follow && last) {
                            depth += 1;
                            if depth >= MAX_LINK_DEPTH {
                                return Err(FsError::with_path(
                                    FsErrorCode::ELOOP,
                                    syscall,
                                    prefix,
                                ));
                            }
                            let target = child
                                .borrow()
                                .symlink_target()
                                .unwrap_or_default()
                                .to_owned();
                            let expanded = path::resolve(&prefix, &target);
                            if !path::is_absolute(&expanded) {
                                return Err(FsError::with_path(
                                    FsErrorCode::ENOENT,
                                    syscall,
                                    path,
                                ));
                            }
                            let new_parts = path::parse(&expanded);
                            let mut rest: VecDeque<String> = new_parts.segments.into();
                            for trailing in segments.iter().skip(idx + 1) {
                                rest.push_back(trailing.clone());
                            }
                            root_name = new_parts.root;
                            segments = rest;
                            continue 'restart;
                        }
                        if last {
                            return Ok(WalkEntry {
                                path: path::combine(&prefix, &seg),
                                basename: seg,
                                parent: Some(dir),
                                node: Some(child),
                            });
                        }
                        if !child.borrow().is_dir() {
                            return Err(FsError::with_path(
                                FsErrorCode::ENOTDIR,
                                syscall,
                                path,
                            ));
                        }
                        self.check_access(&child, Access::EXEC, syscall, path)?;
                        prefix = path::combine(&prefix, &seg);
                        dir = child;
                        idx += 1;
                    }
                }
            }
            unreachable!("walk returns at the final segment");
        }
    }

    /// Walks `path` and requires the target to exist.
    pub(crate) fn walk_existing(
        &mut self,
        path: &str,
        no_follow: bool,
        syscall: &'static str,
    ) -> FsResult<(WalkEntry, NodeRef)> {
        let entry = self.walk(path, no_follow, syscall)?;
        let node = entry.require_node(syscall, path)?;
        Ok((entry, node))
    }
}
