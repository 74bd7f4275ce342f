//! Typed filesystem errors.
//!
//! Every fallible operation in this crate reports an [`FsError`]: a POSIX
//! error code plus the syscall that raised it and up to two path arguments.
//! The numeric errno values are stable so callers bridging into a kernel
//! interface (FUSE, 9P, wasm syscalls) can translate without a lookup table.

use std::fmt;

use thiserror::Error;

/// POSIX error codes reportable by the filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(clippy::upper_case_acronyms)]
pub enum FsErrorCode {
    ENOENT,
    ENOTDIR,
    EISDIR,
    EACCES,
    EPERM,
    EEXIST,
    EBADF,
    EINVAL,
    EROFS,
    ELOOP,
    ENOTEMPTY,
}

impl FsErrorCode {
    /// Stable numeric errno value for this code.
    #[must_use]
    pub const fn errno(self) -> i32 {
        match self {
            Self::EPERM => 1,
            Self::ENOENT => 2,
            Self::EBADF => 9,
            Self::EACCES => 13,
            Self::EEXIST => 17,
            Self::ENOTDIR => 20,
            Self::EISDIR => 21,
            Self::EINVAL => 22,
            Self::EROFS => 30,
            Self::ENOTEMPTY => 39,
            Self::ELOOP => 40,
        }
    }

    /// Conventional strerror-style message.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::EPERM => "operation not permitted",
            Self::ENOENT => "no such file or directory",
            Self::EBADF => "bad file descriptor",
            Self::EACCES => "permission denied",
            Self::EEXIST => "file already exists",
            Self::ENOTDIR => "not a directory",
            Self::EISDIR => "illegal operation on a directory",
            Self::EINVAL => "invalid argument",
            Self::EROFS => "read-only file system",
            Self::ENOTEMPTY => "directory not empty",
            Self::ELOOP => "too many symbolic links encountered",
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Self::EPERM => "EPERM",
            Self::ENOENT => "ENOENT",
            Self::EBADF => "EBADF",
            Self::EACCES => "EACCES",
            Self::EEXIST => "EEXIST",
            Self::ENOTDIR => "ENOTDIR",
            Self::EISDIR => "EISDIR",
            Self::EINVAL => "EINVAL",
            Self::EROFS => "EROFS",
            Self::ENOTEMPTY => "ENOTEMPTY",
            Self::ELOOP => "ELOOP",
        }
    }
}

impl fmt::Display for FsErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A failed filesystem operation.
///
/// Formats the way callers of a Unix file API expect, e.g.
/// `ENOENT: no such file or directory, open '/a/f'`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{}", self.render())]
pub struct FsError {
    code: FsErrorCode,
    syscall: Option<&'static str>,
    path: Option<String>,
    dest: Option<String>,
}

impl FsError {
    /// Builds an error with no path context.
    #[must_use]
    pub fn new(code: FsErrorCode, syscall: &'static str) -> Self {
        Self {
            code,
            syscall: Some(syscall),
            path: None,
            dest: None,
        }
    }

    /// Builds an error blaming a single path.
    #[must_use]
    pub fn with_path(code: FsErrorCode, syscall: &'static str, path: impl Into<String>) -> Self {
        Self {
            code,
            syscall: Some(syscall),
            path: Some(path.into()),
            dest: None,
        }
    }

    /// Builds an error blaming a source and destination path pair.
    #[must_use]
    pub fn with_paths(
        code: FsErrorCode,
        syscall: &'static str,
        path: impl Into<String>,
        dest: impl Into<String>,
    ) -> Self {
        Self {
            code,
            syscall: Some(syscall),
            path: Some(path.into()),
            dest: Some(dest.into()),
        }
    }

    /// The POSIX code carried by this error.
    #[must_use]
    pub fn code(&self) -> FsErrorCode {
        self.code
    }

    /// Stable numeric errno value.
    #[must_use]
    pub fn errno(&self) -> i32 {
        self.code.errno()
    }

    /// The syscall label that raised the error, if any.
    #[must_use]
    pub fn syscall(&self) -> Option<&'static str> {
        self.syscall
    }

    /// The first path argument, if any.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// The second path argument, if any.
    #[must_use]
    pub fn dest(&self) -> Option<&str> {
        self.dest.as_deref()
    }

    fn render(&self) -> String {
        let mut out = format!("{}: {}", self.code, self.code.message());
        if let Some(syscall) = self.syscall {
            out.push_str(", ");
            out.push_str(syscall);
        }
        if let Some(path) = &self.path {
            out.push_str(&format!(" '{path}'"));
        }
        if let Some(dest) = &self.dest {
            out.push_str(&format!(" -> '{dest}'"));
        }
        out
    }
}

/// Result alias used throughout the crate.
pub type FsResult<T> = Result<T, FsError>;
