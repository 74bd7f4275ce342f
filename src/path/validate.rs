//! Flag-driven path validation.

use bitflags::bitflags;

use crate::errors::{FsError, FsErrorCode, FsResult};

use super::{extname, has_trailing_separator, normalize_separators, parse};

bitflags! {
    /// Which path components a call site requires or tolerates.
    ///
    /// A `REQUIRE_*` bit implies the matching `ALLOW_*` bit. A component
    /// that is present without being allowed, or absent while required,
    /// fails validation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ValidationFlags: u32 {
        const REQUIRE_ROOT = 1 << 0;
        const REQUIRE_DIRNAME = 1 << 1;
        const REQUIRE_BASENAME = 1 << 2;
        const REQUIRE_EXTNAME = 1 << 3;
        const REQUIRE_TRAILING_SEPARATOR = 1 << 4;

        const ALLOW_ROOT = 1 << 5;
        const ALLOW_DIRNAME = 1 << 6;
        const ALLOW_BASENAME = 1 << 7;
        const ALLOW_EXTNAME = 1 << 8;
        const ALLOW_TRAILING_SEPARATOR = 1 << 9;

        /// Permit `.` and `..` components.
        const ALLOW_NAVIGATION = 1 << 10;

        /// A bare root such as `/` or `c:/`.
        const ROOT = Self::REQUIRE_ROOT.bits()
            | Self::ALLOW_ROOT.bits()
            | Self::ALLOW_TRAILING_SEPARATOR.bits();
        /// Any absolute path.
        const ABSOLUTE = Self::REQUIRE_ROOT.bits()
            | Self::ALLOW_ROOT.bits()
            | Self::ALLOW_DIRNAME.bits()
            | Self::ALLOW_BASENAME.bits()
            | Self::ALLOW_EXTNAME.bits()
            | Self::ALLOW_TRAILING_SEPARATOR.bits();
        /// Any path, rooted or not.
        const RELATIVE_OR_ABSOLUTE = Self::ALLOW_ROOT.bits()
            | Self::ALLOW_DIRNAME.bits()
            | Self::ALLOW_BASENAME.bits()
            | Self::ALLOW_EXTNAME.bits()
            | Self::ALLOW_TRAILING_SEPARATOR.bits();
        /// A single file name.
        const BASENAME = Self::REQUIRE_BASENAME.bits() | Self::ALLOW_EXTNAME.bits();
    }
}

/// Characters never legal inside a path component.
const INVALID_COMPONENT_CHARS: [char; 7] = [':', '*', '?', '"', '<', '>', '|'];

fn component_ok(seg: &str, flags: ValidationFlags) -> bool {
    if seg == "." || seg == ".." {
        return flags.contains(ValidationFlags::ALLOW_NAVIGATION);
    }
    !seg.contains(INVALID_COMPONENT_CHARS)
}

fn presence_ok(present: bool, require: bool, allow: bool) -> bool {
    if present {
        require || allow
    } else {
        !require
    }
}

/// Validates `path` against `flags`, returning the separator-normalized
/// path on success and `ENOENT` otherwise.
pub fn validate(path: &str, flags: ValidationFlags) -> FsResult<String> {
    let normalized = normalize_separators(path);
    let parts = parse(&normalized);

    let has_root = !parts.root.is_empty();
    let has_basename = !parts.segments.is_empty();
    let has_dirname = parts.segments.len() > 1;
    let has_extname = has_basename && !extname(&normalized).is_empty();
    let has_trailing = has_trailing_separator(&normalized);

    let ok = presence_ok(
        has_root,
        flags.contains(ValidationFlags::REQUIRE_ROOT),
        flags.contains(ValidationFlags::ALLOW_ROOT),
    ) && presence_ok(
        has_dirname,
        flags.contains(ValidationFlags::REQUIRE_DIRNAME),
        flags.contains(ValidationFlags::ALLOW_DIRNAME),
    ) && presence_ok(
        has_basename,
        flags.contains(ValidationFlags::REQUIRE_BASENAME),
        flags.contains(ValidationFlags::ALLOW_BASENAME),
    ) && presence_ok(
        has_extname,
        flags.contains(ValidationFlags::REQUIRE_EXTNAME),
        flags.contains(ValidationFlags::ALLOW_EXTNAME),
    ) && presence_ok(
        has_trailing,
        flags.contains(ValidationFlags::REQUIRE_TRAILING_SEPARATOR),
        flags.contains(ValidationFlags::ALLOW_TRAILING_SEPARATOR),
    ) && parts.segments.iter().all(|seg| component_ok(seg, flags));

    if ok {
        Ok(normalized)
    } else {
        Err(FsError::with_path(FsErrorCode::ENOENT, "validate", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_alias_accepts_bare_roots_only() {
        assert!(validate("/", ValidationFlags::ROOT).is_ok());
        assert!(validate("c:/", ValidationFlags::ROOT).is_ok());
        assert!(validate("/a", ValidationFlags::ROOT).is_err());
        assert!(validate("a", ValidationFlags::ROOT).is_err());
    }

    #[test]
    fn absolute_alias_requires_a_root() {
        assert!(validate("/a/b.txt", ValidationFlags::ABSOLUTE).is_ok());
        assert!(validate("a/b", ValidationFlags::ABSOLUTE).is_err());
        assert!(validate("rel", ValidationFlags::RELATIVE_OR_ABSOLUTE).is_ok());
    }

    #[test]
    fn basename_alias_rejects_directories() {
        assert!(validate("file.txt", ValidationFlags::BASENAME).is_ok());
        assert!(validate("dir/file.txt", ValidationFlags::BASENAME).is_err());
        assert!(validate("/file.txt", ValidationFlags::BASENAME).is_err());
    }

    #[test]
    fn navigation_requires_opt_in() {
        let flags = ValidationFlags::RELATIVE_OR_ABSOLUTE;
        assert!(validate("a/../b", flags).is_err());
        assert!(validate("a/../b", flags | ValidationFlags::ALLOW_NAVIGATION).is_ok());
    }

    #[test]
    fn reserved_characters_are_rejected() {
        let flags = ValidationFlags::ABSOLUTE;
        for p in ["/a*b", "/a?b", "/a\"b", "/a<b", "/a>b", "/a|b", "/a:b"] {
            assert!(validate(p, flags).is_err(), "{p} should be invalid");
        }
        // The drive colon belongs to the root, not a component.
        assert!(validate("c:/ok", flags).is_ok());
    }
}
