//! An in-memory POSIX-like virtual filesystem.
//!
//! `mem-fs` models inodes, hard and symbolic links, directories, file
//! content, permission bits, timestamps, file descriptors and an
//! inotify-style watch facility without touching a real disk. It is built
//! for hosting test fixtures and sandboxed computations that consume a
//! Unix-style file API.
//!
//! The core surfaces:
//!
//! - [`Volume`] — the filesystem: directory operations, an open-file
//!   table with copy-before-write staging, inotify watches, mounts and
//!   declarative bulk population.
//! - [`Volume::make_readonly`] + [`Volume::shadow`] — O(1) snapshots: a
//!   frozen volume can spawn mutable overlays that fault content in
//!   lazily and never write back.
//! - [`MountResolver`] — an injected stat/readdir/read trio that backs
//!   lazily materialised directory mounts.
//! - [`watch_file`] — interval-driven stat diffing over an injected
//!   [`Timers`] scheduler.
//!
//! ```
//! use mem_fs::Volume;
//!
//! let mut fs = Volume::new();
//! fs.mkdir("/a", 0o777)?;
//! fs.write_file("/a/f", b"hi")?;
//! assert_eq!(fs.read_file_utf8("/a/f")?, "hi");
//!
//! fs.make_readonly();
//! let mut overlay = fs.shadow(None)?;
//! overlay.write_file("/a/f", b"bye")?;
//! assert_eq!(fs.read_file_utf8("/a/f")?, "hi");
//! assert_eq!(overlay.read_file_utf8("/a/f")?, "bye");
//! # Ok::<(), mem_fs::FsError>(())
//! ```

pub mod errors;
mod ids;
/// Inotify-style change notification.
pub mod inotify;
mod node;
/// Virtual path lexing and arithmetic.
pub mod path;
mod stat;
mod volume;
/// Interval-driven stat polling.
pub mod watch;

/// File type, permission, access and open-flag constants.
pub mod flags;

pub use errors::{FsError, FsErrorCode, FsResult};
pub use flags::{Access, AccessMode, OpenFlags};
pub use inotify::{EventMask, InotifyEvent, WatchEvent, WatchEventKind};
pub use node::{Fd, MetaMap, MountResolver, ResolvedStat, Wd};
pub use path::{Casing, ValidationFlags};
pub use stat::{Stats, BLKSIZE};
pub use volume::{DirWatcher, EntryAttrs, FileMap, FsEntry, Volume, VolumeOptions};
pub use watch::{watch_file, unwatch_file, StatListener, TimerId, Timers, WatchFileOptions};
