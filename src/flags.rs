//! File type bits, permission constants, access checks and open flags.
//!
//! The numeric values match the traditional Unix encodings so that mode and
//! flag words round-trip unchanged through foreign interfaces.

use bitflags::bitflags;

use crate::errors::{FsError, FsErrorCode, FsResult};

/// Mask selecting the file type bits of a mode word.
pub const S_IFMT: u32 = 0o170000;
/// Socket.
pub const S_IFSOCK: u32 = 0o140000;
/// Symbolic link.
pub const S_IFLNK: u32 = 0o120000;
/// Regular file.
pub const S_IFREG: u32 = 0o100000;
/// Block device.
pub const S_IFBLK: u32 = 0o060000;
/// Directory.
pub const S_IFDIR: u32 = 0o040000;
/// Character device.
pub const S_IFCHR: u32 = 0o020000;
/// FIFO.
pub const S_IFIFO: u32 = 0o010000;

/// Set-user-id bit.
pub const S_ISUID: u32 = 0o4000;
/// Set-group-id bit.
pub const S_ISGID: u32 = 0o2000;
/// Sticky bit.
pub const S_ISVTX: u32 = 0o1000;

/// Owner read/write/execute.
pub const S_IRWXU: u32 = 0o700;
/// Group read/write/execute.
pub const S_IRWXG: u32 = 0o070;
/// Other read/write/execute.
pub const S_IRWXO: u32 = 0o007;

bitflags! {
    /// Requested permissions for an access check.
    ///
    /// `Access::empty()` is the `F_OK` existence-only check.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Access: u32 {
        /// Read permission (`R_OK`).
        const READ = 4;
        /// Write permission (`W_OK`).
        const WRITE = 2;
        /// Execute/search permission (`X_OK`).
        const EXEC = 1;
    }
}

impl Access {
    /// Existence-only check (`F_OK`).
    pub const EXISTS: Access = Access::empty();
}

bitflags! {
    /// Flags accepted by `open`.
    ///
    /// Numeric values follow the Linux encoding. The access mode occupies the
    /// low two bits and is extracted with [`OpenFlags::access_mode`] rather
    /// than `contains`, since `RDONLY` is zero.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenFlags: u32 {
        /// Open for reading only.
        const RDONLY = 0;
        /// Open for writing only.
        const WRONLY = 0o1;
        /// Open for reading and writing.
        const RDWR = 0o2;
        /// Create the file if absent.
        const CREAT = 0o100;
        /// With `CREAT`, fail if the file exists.
        const EXCL = 0o200;
        /// Truncate to zero length on open.
        const TRUNC = 0o1000;
        /// Every write lands at end-of-file.
        const APPEND = 0o2000;
        /// Publish each write to the inode immediately.
        const SYNC = 0o4010000;
        /// Fail unless the path names a directory.
        const DIRECTORY = 0o200000;
        /// Do not follow a trailing symbolic link.
        const NOFOLLOW = 0o400000;
    }
}

/// Mask extracting the access mode from an open flag word.
pub const O_ACCMODE: u32 = 0o3;

/// The three ways a descriptor can be opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl OpenFlags {
    /// The access mode encoded in the low bits.
    ///
    /// An invalid encoding (both `WRONLY` and `RDWR`) reports `EINVAL`.
    pub fn access_mode(self) -> FsResult<AccessMode> {
        match self.bits() & O_ACCMODE {
            0 => Ok(AccessMode::ReadOnly),
            1 => Ok(AccessMode::WriteOnly),
            2 => Ok(AccessMode::ReadWrite),
            _ => Err(FsError::new(FsErrorCode::EINVAL, "open")),
        }
    }

    /// Whether the descriptor may read.
    pub fn readable(self) -> bool {
        self.bits() & O_ACCMODE != 1
    }

    /// Whether the descriptor may write.
    pub fn writable(self) -> bool {
        self.bits() & O_ACCMODE != 0
    }

    /// Parses a symbolic alias the way `fopen`-style callers spell flags.
    ///
    /// Recognised aliases: `r`, `r+`, `rs+`, `w`, `wx`, `w+`, `wx+`, `a`,
    /// `ax`, `a+`, `ax+`.
    pub fn from_symbolic(alias: &str) -> FsResult<OpenFlags> {
        let flags = match alias {
            "r" => OpenFlags::RDONLY,
            "r+" => OpenFlags::RDWR,
            "rs+" => OpenFlags::RDWR | OpenFlags::SYNC,
            "w" => OpenFlags::WRONLY | OpenFlags::CREAT | OpenFlags::TRUNC,
            "wx" => OpenFlags::WRONLY | OpenFlags::CREAT | OpenFlags::TRUNC | OpenFlags::EXCL,
            "w+" => OpenFlags::RDWR | OpenFlags::CREAT | OpenFlags::TRUNC,
            "wx+" => OpenFlags::RDWR | OpenFlags::CREAT | OpenFlags::TRUNC | OpenFlags::EXCL,
            "a" => OpenFlags::WRONLY | OpenFlags::CREAT | OpenFlags::APPEND,
            "ax" => OpenFlags::WRONLY | OpenFlags::CREAT | OpenFlags::APPEND | OpenFlags::EXCL,
            "a+" => OpenFlags::RDWR | OpenFlags::CREAT | OpenFlags::APPEND,
            "ax+" => OpenFlags::RDWR | OpenFlags::CREAT | OpenFlags::APPEND | OpenFlags::EXCL,
            _ => return Err(FsError::new(FsErrorCode::EINVAL, "open")),
        };
        Ok(flags)
    }
}
