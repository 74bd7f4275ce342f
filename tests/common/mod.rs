#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use bytes::Bytes;

use mem_fs::flags::{S_IFDIR, S_IFREG};
use mem_fs::path;
use mem_fs::{FsError, FsErrorCode, FsResult, MountResolver, ResolvedStat, TimerId, Timers};

enum SourceNode {
    Dir,
    File(Bytes),
}

/// Mount resolver over a fixed source tree that counts every call.
pub struct CountingResolver {
    entries: HashMap<String, SourceNode>,
    pub stat_calls: Cell<usize>,
    pub readdir_calls: Cell<usize>,
    pub read_calls: Cell<usize>,
}

impl CountingResolver {
    /// Builds a resolver from `(path, content)` pairs; `None` content
    /// marks a directory.
    pub fn new(tree: &[(&str, Option<&str>)]) -> Rc<Self> {
        let entries = tree
            .iter()
            .map(|(path, content)| {
                let node = match content {
                    Some(text) => SourceNode::File(Bytes::copy_from_slice(text.as_bytes())),
                    None => SourceNode::Dir,
                };
                ((*path).to_owned(), node)
            })
            .collect();
        Rc::new(Self {
            entries,
            stat_calls: Cell::new(0),
            readdir_calls: Cell::new(0),
            read_calls: Cell::new(0),
        })
    }

    pub fn total_calls(&self) -> usize {
        self.stat_calls.get() + self.readdir_calls.get() + self.read_calls.get()
    }
}

impl MountResolver for CountingResolver {
    fn stat(&self, path: &str) -> FsResult<ResolvedStat> {
        self.stat_calls.set(self.stat_calls.get() + 1);
        match self.entries.get(path) {
            Some(SourceNode::Dir) => Ok(ResolvedStat {
                mode: S_IFDIR | 0o755,
                size: 0,
            }),
            Some(SourceNode::File(bytes)) => Ok(ResolvedStat {
                mode: S_IFREG | 0o644,
                size: bytes.len() as u64,
            }),
            None => Err(FsError::with_path(FsErrorCode::ENOENT, "stat", path)),
        }
    }

    fn readdir(&self, dir: &str) -> FsResult<Vec<String>> {
        self.readdir_calls.set(self.readdir_calls.get() + 1);
        if !matches!(self.entries.get(dir), Some(SourceNode::Dir)) {
            return Err(FsError::with_path(FsErrorCode::ENOTDIR, "readdir", dir));
        }
        Ok(self
            .entries
            .keys()
            .filter(|entry| *entry != dir && path::dirname(entry) == dir)
            .map(|entry| path::basename(entry))
            .collect())
    }

    fn read_file(&self, path: &str) -> FsResult<Bytes> {
        self.read_calls.set(self.read_calls.get() + 1);
        match self.entries.get(path) {
            Some(SourceNode::File(bytes)) => Ok(bytes.clone()),
            _ => Err(FsError::with_path(FsErrorCode::ENOENT, "read", path)),
        }
    }
}

/// Hand-cranked interval scheduler for poll-watcher tests.
#[derive(Default)]
pub struct ManualTimers {
    next: Cell<TimerId>,
    intervals: RefCell<Vec<(TimerId, Box<dyn FnMut()>)>>,
}

impl ManualTimers {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Fires every registered interval once.
    pub fn fire_all(&self) {
        let mut intervals = self.intervals.borrow_mut();
        for (_, tick) in intervals.iter_mut() {
            tick();
        }
    }

    pub fn active(&self) -> usize {
        self.intervals.borrow().len()
    }
}

impl Timers for ManualTimers {
    fn set_interval(&self, _period_ms: u64, tick: Box<dyn FnMut()>) -> TimerId {
        let id = self.next.get();
        self.next.set(id + 1);
        self.intervals.borrow_mut().push((id, tick));
        id
    }

    fn clear_interval(&self, id: TimerId) {
        self.intervals.borrow_mut().retain(|(tid, _)| *tid != id);
    }
}
