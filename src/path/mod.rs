//! Virtual path lexing and arithmetic.
//!
//! Paths handled here never touch a real disk: they are plain strings with
//! `/` separators, an optional root component (`/`, `//host/share/`, or
//! `c:/`), and case-sensitive or case-insensitive comparison chosen by the
//! volume. All functions are pure.

mod validate;

pub use self::validate::{validate, ValidationFlags};

use std::cmp::Ordering;

/// The canonical separator.
pub const SEPARATOR: char = '/';

/// Maximum symlink expansions before a walk reports `ELOOP`.
pub(crate) const MAX_LINK_DEPTH: usize = 40;

/// Case-sensitivity mode fixed at volume construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Casing {
    Sensitive,
    Insensitive,
}

impl Casing {
    /// Folds a name into its comparison key.
    #[must_use]
    pub fn fold(self, name: &str) -> String {
        match self {
            Casing::Sensitive => name.to_owned(),
            Casing::Insensitive => name.to_lowercase(),
        }
    }

    /// Whether two names compare equal under this casing.
    #[must_use]
    pub fn eq(self, a: &str, b: &str) -> bool {
        match self {
            Casing::Sensitive => a == b,
            Casing::Insensitive => a.to_lowercase() == b.to_lowercase(),
        }
    }
}

/// A path split into its root component and segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathParts {
    /// Root component including its trailing separator (`"/"`, `"c:/"`,
    /// `"//host/share/"`), or empty for a relative path.
    pub root: String,
    /// Ordered non-empty segments after the root.
    pub segments: Vec<String>,
}

impl PathParts {
    /// Whether the path carries a root component.
    #[must_use]
    pub fn is_absolute(&self) -> bool {
        !self.root.is_empty()
    }
}

/// Converts backslashes and whitespace-padded separators into bare `/`.
#[must_use]
pub fn normalize_separators(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut pending_ws = String::new();
    let mut after_sep = false;
    for ch in path.chars() {
        if ch == '/' || ch == '\\' {
            // Whitespace hugging the separator is dropped on both sides.
            pending_ws.clear();
            out.push(SEPARATOR);
            after_sep = true;
        } else if ch.is_whitespace() {
            if !after_sep {
                pending_ws.push(ch);
            }
        } else {
            out.push_str(&pending_ws);
            pending_ws.clear();
            out.push(ch);
            after_sep = false;
        }
    }
    out.push_str(&pending_ws);
    out
}

/// Length of the root component of `path`, or 0 for relative paths.
fn root_length(path: &str) -> usize {
    let bytes = path.as_bytes();
    if bytes.first() == Some(&b'/') {
        if bytes.get(1) != Some(&b'/') {
            return 1;
        }
        // UNC: `//host/share/` — the root runs through the share separator.
        let Some(host_end) = path[2..].find(SEPARATOR).map(|i| i + 2) else {
            return path.len();
        };
        let Some(share_end) = path[host_end + 1..].find(SEPARATOR).map(|i| i + host_end + 1)
        else {
            return path.len();
        };
        return share_end + 1;
    }
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        // DOS drive: `c:/` when rooted, bare `c:` otherwise.
        if bytes.get(2) == Some(&b'/') {
            return 3;
        }
        return 2;
    }
    0
}

/// Splits `path` into root and segments, dropping empty segments.
///
/// Whitespace around separators is trimmed first; the inverse is
/// [`format`], which loses only duplicate and trailing separators.
#[must_use]
pub fn parse(path: &str) -> PathParts {
    let path = normalize_separators(path);
    let rooted = root_length(&path);
    let root = path[..rooted].to_owned();
    let segments = path[rooted..]
        .split(SEPARATOR)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect();
    PathParts { root, segments }
}

/// Reassembles parsed components into a path string.
#[must_use]
pub fn format(parts: &PathParts) -> String {
    let mut out = parts.root.clone();
    for (i, seg) in parts.segments.iter().enumerate() {
        if i > 0 {
            out.push(SEPARATOR);
        }
        out.push_str(seg);
    }
    out
}

/// Whether `path` is absolute: POSIX `/…`, UNC `//host/share/…`, or DOS
/// `c:/…`.
#[must_use]
pub fn is_absolute(path: &str) -> bool {
    let path = normalize_separators(path);
    let len = root_length(&path);
    // A bare drive (`c:`) addresses a drive-relative location, not a root.
    len > 0 && !(len == 2 && path.as_bytes()[1] == b':')
}

/// Whether `path` names a root and nothing below it.
#[must_use]
pub fn is_root(path: &str) -> bool {
    let parts = parse(path);
    parts.is_absolute() && parts.segments.is_empty()
}

/// Whether `path` ends in a separator. Roots are reported as not having
/// one — their trailing separator belongs to the root component itself.
#[must_use]
pub fn has_trailing_separator(path: &str) -> bool {
    let path = normalize_separators(path);
    path.ends_with(SEPARATOR) && !is_root(&path)
}

/// Collapses `.` and `..` segments.
///
/// A `..` pops a preceding non-`..` segment; in an absolute path it never
/// escapes the root, in a relative path unmatched `..` segments are kept.
#[must_use]
pub fn normalize(path: &str) -> String {
    let parts = parse(path);
    let mut reduced: Vec<String> = Vec::with_capacity(parts.segments.len());
    for seg in parts.segments {
        match seg.as_str() {
            "." => {}
            ".." => {
                if reduced.last().is_some_and(|s| s != "..") {
                    reduced.pop();
                } else if parts.root.is_empty() {
                    reduced.push(seg);
                }
            }
            _ => reduced.push(seg),
        }
    }
    format(&PathParts {
        root: parts.root,
        segments: reduced,
    })
}

/// Joins `base` and `path`; an absolute `path` replaces `base` entirely.
#[must_use]
pub fn combine(base: &str, path: &str) -> String {
    let path = normalize_separators(path);
    if path.is_empty() {
        return normalize_separators(base);
    }
    if is_absolute(&path) {
        return path;
    }
    let base = normalize_separators(base);
    if base.is_empty() {
        return path;
    }
    if base.ends_with(SEPARATOR) {
        format!("{base}{path}")
    } else {
        format!("{base}{SEPARATOR}{path}")
    }
}

/// Combines and normalizes in one step.
#[must_use]
pub fn resolve(base: &str, path: &str) -> String {
    normalize(&combine(base, path))
}

/// The directory portion of `path` (everything above the basename).
#[must_use]
pub fn dirname(path: &str) -> String {
    let mut parts = parse(path);
    if parts.segments.is_empty() {
        return parts.root;
    }
    parts.segments.pop();
    format(&parts)
}

/// The final segment of `path`, or empty for roots.
#[must_use]
pub fn basename(path: &str) -> String {
    parse(path).segments.pop().unwrap_or_default()
}

/// The extension of the basename including its dot, or empty.
///
/// A leading dot (`.profile`) does not begin an extension.
#[must_use]
pub fn extname(path: &str) -> String {
    let base = basename(path);
    match base.rfind('.') {
        Some(idx) if idx > 0 => base[idx..].to_owned(),
        _ => String::new(),
    }
}

/// Orders two paths segment-wise under the given casing.
#[must_use]
pub fn compare(a: &str, b: &str, casing: Casing) -> Ordering {
    let a = casing.fold(&normalize(a));
    let b = casing.fold(&normalize(b));
    a.cmp(&b)
}

/// Whether two paths are equal after normalization under the given casing.
#[must_use]
pub fn equate(a: &str, b: &str, casing: Casing) -> bool {
    compare(a, b, casing) == Ordering::Equal
}

/// The relative path from `from` to `to`, both absolute.
///
/// Returns an empty string when the paths are equal, so that
/// `resolve(from, relative(from, to, c))` always lands on `to`.
#[must_use]
pub fn relative(from: &str, to: &str, casing: Casing) -> String {
    let from = parse(&normalize(from));
    let to = parse(&normalize(to));
    if !casing.eq(&from.root, &to.root) {
        // Different roots: no relative route exists, answer with `to`.
        return format(&to);
    }
    let mut common = 0;
    while common < from.segments.len()
        && common < to.segments.len()
        && casing.eq(&from.segments[common], &to.segments[common])
    {
        common += 1;
    }
    let mut segments: Vec<String> = Vec::new();
    for _ in common..from.segments.len() {
        segments.push("..".to_owned());
    }
    segments.extend(to.segments[common..].iter().cloned());
    format(&PathParts {
        root: String::new(),
        segments,
    })
}
