//! Mount points backed by an external resolver.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::debug;

use crate::errors::{FsError, FsErrorCode, FsResult};
use crate::flags::Access;
use crate::inotify::{self, EventMask};
use crate::node::{MountResolver, MountSource, Node};
use crate::path;

use super::{touch_cm, Volume};

impl Volume {
    /// Creates a directory at `target` whose contents are faulted in from
    /// `source` through `resolver`.
    ///
    /// Nothing is fetched at mount time: the resolver is consulted once
    /// when the directory's children are first listed and once per file on
    /// first content read. Mounting at a filesystem root requires uid 0.
    pub fn mount(
        &mut self,
        source: &str,
        target: &str,
        resolver: Rc<dyn MountResolver>,
        mode: u32,
    ) -> FsResult<()> {
        self.ensure_writable("mount", target)?;
        debug!(source, target, "mount");
        let perms = mode & 0o1777 & !self.umask;
        let absolute = self.absolutize(target, "mount")?;
        let mount_source = MountSource {
            path: source.to_owned(),
            resolver,
        };
        if path::is_root(&absolute) {
            let node = Rc::new(RefCell::new(Node::new_mount_dir(
                self.dev,
                perms,
                self.euid,
                self.egid,
                self.casing,
                mount_source,
            )));
            return self.create_root(&absolute, mode, Some(node));
        }

        let entry = self.walk(target, false, "mount")?;
        if entry.node.is_some() {
            return Err(FsError::with_paths(
                FsErrorCode::EEXIST,
                "mount",
                source,
                target,
            ));
        }
        let parent = entry.require_parent("mount", target)?;
        self.check_access(&parent, Access::WRITE, "mount", target)?;

        let node = Rc::new(RefCell::new(Node::new_mount_dir(
            self.dev,
            perms,
            self.euid,
            self.egid,
            self.casing,
            mount_source,
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
}
