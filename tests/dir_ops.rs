#![allow(clippy::unwrap_used, missing_docs)]

use mem_fs::flags::S_ISGID;
use mem_fs::{Casing, FsErrorCode, Volume, VolumeOptions};

fn fixture() -> Volume {
    let mut fs = Volume::new();
    fs.mkdir("/a", 0o777).unwrap();
    fs.write_file("/a/f", b"hi").unwrap();
    fs
}

#[test]
fn create_and_read_roundtrip() {
    let mut fs = fixture();
    assert_eq!(fs.read_file_utf8("/a/f").unwrap(), "hi");
    assert_eq!(fs.stat("/a/f").unwrap().size, 2);
}

#[test]
fn mkdir_existing_is_eexist() {
    let mut fs = fixture();
    let err = fs.mkdir("/a", 0o777).unwrap_err();
    assert_eq!(err.code(), FsErrorCode::EEXIST);
}

#[test]
fn mkdir_under_missing_parent_is_enoent() {
    let mut fs = Volume::new();
    let err = fs.mkdir("/no/such/dir", 0o777).unwrap_err();
    assert_eq!(err.code(), FsErrorCode::ENOENT);
}

#[test]
fn walk_through_file_is_enotdir() {
    let mut fs = fixture();
    let err = fs.stat("/a/f/x").unwrap_err();
    assert_eq!(err.code(), FsErrorCode::ENOTDIR);
}

#[test]
fn mkdir_inherits_gid_and_sgid_from_parent() {
    let mut fs = Volume::new();
    fs.mkdir("/p", 0o777).unwrap();
    fs.chown("/p", 0, 7).unwrap();
    fs.chmod("/p", 0o2775).unwrap();
    fs.mkdir("/p/c", 0o777).unwrap();
    let st = fs.stat("/p/c").unwrap();
    assert_eq!(st.gid, 7, "gid should come from the SGID parent");
    assert_ne!(st.mode & S_ISGID, 0, "SGID should propagate");
}

#[test]
fn rmdir_requires_empty_directory() {
    let mut fs = fixture();
    let err = fs.rmdir("/a").unwrap_err();
    assert_eq!(err.code(), FsErrorCode::ENOTEMPTY);
    fs.unlink("/a/f").unwrap();
    fs.rmdir("/a").unwrap();
    assert!(!fs.exists("/a"));
}

#[test]
fn rmdir_of_file_is_enotdir() {
    let mut fs = fixture();
    assert_eq!(
        fs.rmdir("/a/f").unwrap_err().code(),
        FsErrorCode::ENOTDIR
    );
}

#[test]
fn rmdir_of_root_is_eperm() {
    let mut fs = Volume::new();
    assert_eq!(fs.rmdir("/").unwrap_err().code(), FsErrorCode::EPERM);
}

#[test]
fn unlink_of_directory_is_eisdir() {
    let mut fs = fixture();
    assert_eq!(fs.unlink("/a").unwrap_err().code(), FsErrorCode::EISDIR);
}

#[test]
fn link_shares_the_inode() {
    let mut fs = fixture();
    fs.link("/a/f", "/a/g").unwrap();
    let f = fs.stat("/a/f").unwrap();
    let g = fs.stat("/a/g").unwrap();
    assert_eq!(f.ino, g.ino);
    assert_eq!(f.nlink, 2);

    fs.unlink("/a/f").unwrap();
    assert_eq!(fs.read_file_utf8("/a/g").unwrap(), "hi");
    assert_eq!(fs.stat("/a/g").unwrap().nlink, 1);
}

#[test]
fn link_of_directory_is_eperm() {
    let mut fs = fixture();
    assert_eq!(
        fs.link("/a", "/b").unwrap_err().code(),
        FsErrorCode::EPERM
    );
}

#[test]
fn link_onto_existing_name_is_eexist() {
    let mut fs = fixture();
    fs.write_file("/a/g", b"x").unwrap();
    assert_eq!(
        fs.link("/a/f", "/a/g").unwrap_err().code(),
        FsErrorCode::EEXIST
    );
}

#[test]
fn rename_moves_preserving_identity() {
    let mut fs = fixture();
    let before = fs.stat("/a/f").unwrap();
    fs.rename("/a/f", "/a/h").unwrap();
    assert!(!fs.exists("/a/f"));
    let after = fs.stat("/a/h").unwrap();
    assert_eq!(before.ino, after.ino);
    assert_eq!(fs.read_file_utf8("/a/h").unwrap(), "hi");
}

#[test]
fn rename_displaces_compatible_destination() {
    let mut fs = fixture();
    fs.write_file("/a/old", b"x").unwrap();
    fs.rename("/a/f", "/a/old").unwrap();
    assert_eq!(fs.read_file_utf8("/a/old").unwrap(), "hi");

    fs.mkdir("/d1", 0o777).unwrap();
    fs.mkdir("/d2", 0o777).unwrap();
    fs.rename("/d1", "/d2").unwrap();
    assert!(!fs.exists("/d1"));
}

#[test]
fn rename_kind_mismatch_fails() {
    let mut fs = fixture();
    fs.mkdir("/d", 0o777).unwrap();
    assert_eq!(
        fs.rename("/a/f", "/d").unwrap_err().code(),
        FsErrorCode::EISDIR
    );
    assert_eq!(
        fs.rename("/d", "/a/f").unwrap_err().code(),
        FsErrorCode::ENOTDIR
    );
}

#[test]
fn rename_onto_nonempty_directory_is_enotempty() {
    let mut fs = Volume::new();
    fs.mkdir("/src", 0o777).unwrap();
    fs.mkdir("/dst", 0o777).unwrap();
    fs.write_file("/dst/keep", b"k").unwrap();
    assert_eq!(
        fs.rename("/src", "/dst").unwrap_err().code(),
        FsErrorCode::ENOTEMPTY
    );
}

#[test]
fn rename_into_own_subtree_is_einval() {
    let mut fs = Volume::new();
    fs.mkdir("/d", 0o777).unwrap();
    fs.mkdir("/d/sub", 0o777).unwrap();
    assert_eq!(
        fs.rename("/d", "/d/sub/again").unwrap_err().code(),
        FsErrorCode::EINVAL
    );
}

#[test]
fn symlink_traversal_reads_through() {
    let mut fs = fixture();
    fs.symlink("f", "/a/g").unwrap();
    assert_eq!(fs.read_file_utf8("/a/g").unwrap(), "hi");
    assert!(fs.lstat("/a/g").unwrap().is_symbolic_link());
    assert!(fs.stat("/a/g").unwrap().is_file());
    assert_eq!(fs.lstat("/a/g").unwrap().size, 1, "symlink size is target length");
}

#[test]
fn symlink_loop_is_eloop() {
    let mut fs = fixture();
    fs.symlink("g", "/a/g").unwrap();
    let err = fs.read_file("/a/g").unwrap_err();
    assert_eq!(err.code(), FsErrorCode::ELOOP);
}

#[test]
fn dangling_symlink_is_enoent() {
    let mut fs = fixture();
    fs.symlink("missing", "/a/g").unwrap();
    assert_eq!(
        fs.read_file("/a/g").unwrap_err().code(),
        FsErrorCode::ENOENT
    );
    assert!(fs.lstat("/a/g").unwrap().is_symbolic_link());
}

#[test]
fn readlink_returns_target_verbatim() {
    let mut fs = fixture();
    fs.symlink("../relative/./target", "/a/g").unwrap();
    assert_eq!(fs.readlink("/a/g").unwrap(), "../relative/./target");
    assert_eq!(
        fs.readlink("/a/f").unwrap_err().code(),
        FsErrorCode::EINVAL
    );
}

#[test]
fn realpath_resolves_symlinks() {
    let mut fs = Volume::new();
    fs.mkdir("/a", 0o777).unwrap();
    fs.mkdir("/a/sub", 0o777).unwrap();
    fs.symlink("/a", "/l").unwrap();
    assert_eq!(fs.realpath("/l/sub").unwrap(), "/a/sub");
}

#[test]
fn readdir_is_comparator_ordered() {
    let mut fs = Volume::new();
    fs.mkdir("/d", 0o777).unwrap();
    for name in ["zeta", "alpha", "Mid"] {
        fs.write_file(&format!("/d/{name}"), b"x").unwrap();
    }
    assert_eq!(fs.readdir("/d").unwrap(), vec!["Mid", "alpha", "zeta"]);
}

#[test]
fn case_insensitive_volume_folds_lookups() {
    let mut fs = Volume::with_options(VolumeOptions {
        casing: Casing::Insensitive,
        ..VolumeOptions::default()
    });
    fs.mkdir("/Dir", 0o777).unwrap();
    fs.write_file("/Dir/File.txt", b"x").unwrap();
    assert_eq!(fs.read_file_utf8("/dir/fILE.TXT").unwrap(), "x");
    assert_eq!(fs.readdir("/DIR").unwrap(), vec!["File.txt"]);
}

#[test]
fn traversal_without_execute_permission_is_eacces() {
    let mut fs = Volume::new();
    fs.mkdir("/secret", 0o700).unwrap();
    fs.write_file("/secret/x", b"x").unwrap();
    fs.set_uid(1000).unwrap();
    let err = fs.stat("/secret/x").unwrap_err();
    assert_eq!(err.code(), FsErrorCode::EACCES);
}

#[test]
fn mkdirp_creates_chain_and_tolerates_existing() {
    let mut fs = Volume::new();
    fs.mkdirp("/x/y/z", 0o777).unwrap();
    assert!(fs.stat("/x/y/z").unwrap().is_directory());
    fs.mkdirp("/x/y/z", 0o777).unwrap();

    fs.write_file("/x/blocker", b"x").unwrap();
    assert_eq!(
        fs.mkdirp("/x/blocker/deep", 0o777).unwrap_err().code(),
        FsErrorCode::ENOTDIR
    );
}

#[test]
fn relative_paths_resolve_against_cwd() {
    let mut fs = fixture();
    fs.chdir("/a").unwrap();
    assert_eq!(fs.read_file_utf8("f").unwrap(), "hi");
    fs.write_file("g", b"rel").unwrap();
    assert_eq!(fs.read_file_utf8("/a/g").unwrap(), "rel");
}

#[test]
fn remove_recursive_deletes_trees_and_tolerates_absence() {
    let mut fs = Volume::new();
    fs.mkdirp("/t/a/b", 0o777).unwrap();
    fs.write_file("/t/a/b/f", b"x").unwrap();
    fs.write_file("/t/top", b"y").unwrap();
    fs.remove_recursive("/t").unwrap();
    assert!(!fs.exists("/t"));
    fs.remove_recursive("/t").unwrap();
}

#[test]
fn second_root_requires_uid0_and_works() {
    let mut fs = Volume::new();
    fs.mkdir("c:/", 0o777).unwrap();
    fs.write_file("c:/boot.ini", b"cfg").unwrap();
    assert_eq!(fs.read_file_utf8("c:/boot.ini").unwrap(), "cfg");

    let mut user = Volume::with_options(VolumeOptions {
        uid: 1000,
        gid: 1000,
        ..VolumeOptions::default()
    });
    assert_eq!(
        user.mkdir("d:/", 0o777).unwrap_err().code(),
        FsErrorCode::EPERM
    );
}
