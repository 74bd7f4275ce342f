#![allow(clippy::unwrap_used, missing_docs)]

mod common;

use std::rc::Rc;

use common::CountingResolver;
use mem_fs::{FileMap, FsEntry, FsErrorCode, MountResolver, Volume};

#[test]
fn apply_builds_nested_trees() {
    let mut fs = Volume::new();
    let map = FileMap::new()
        .with("/etc", FsEntry::dir())
        .with(
            "/srv",
            FsEntry::tree(
                FileMap::new()
                    .with("index.html", FsEntry::file("<html>"))
                    .with(
                        "assets",
                        FsEntry::tree(
                            FileMap::new().with("app.js", FsEntry::file("console.log(1)")),
                        ),
                    ),
            ),
        )
        .with("/deep/leaf.txt", FsEntry::file("leaf"));
    fs.apply(&map).unwrap();

    assert!(fs.stat("/etc").unwrap().is_directory());
    assert_eq!(fs.read_file_utf8("/srv/index.html").unwrap(), "<html>");
    assert_eq!(
        fs.read_file_utf8("/srv/assets/app.js").unwrap(),
        "console.log(1)"
    );
    assert_eq!(fs.read_file_utf8("/deep/leaf.txt").unwrap(), "leaf");
}

#[test]
fn links_and_symlinks_are_deferred_until_targets_exist() {
    let mut fs = Volume::new();
    // Deliberately list the links before the file they point at.
    let map = FileMap::new()
        .with("/bin/alias", FsEntry::symlink("/bin/tool"))
        .with("/bin/hard", FsEntry::hard_link("/bin/tool"))
        .with("/bin/tool", FsEntry::file("#!"));
    fs.apply(&map).unwrap();

    assert_eq!(fs.read_file_utf8("/bin/alias").unwrap(), "#!");
    assert!(fs.lstat("/bin/alias").unwrap().is_symbolic_link());
    assert_eq!(fs.stat("/bin/hard").unwrap().nlink, 2);
}

#[test]
fn remove_entries_rimraf_their_paths() {
    let mut fs = Volume::new();
    fs.mkdirp("/old/deep", 0o777).unwrap();
    fs.write_file("/old/deep/f", b"x").unwrap();
    let map = FileMap::new().with("/old", FsEntry::remove());
    fs.apply(&map).unwrap();
    assert!(!fs.exists("/old"));
}

#[test]
fn roots_cannot_be_files_links_or_removed() {
    let mut fs = Volume::new();
    for entry in [
        FsEntry::file("x"),
        FsEntry::symlink("/x"),
        FsEntry::hard_link("/x"),
        FsEntry::remove(),
    ] {
        let map = FileMap::new().with("/", entry);
        assert_eq!(
            fs.apply(&map).unwrap_err().code(),
            FsErrorCode::EPERM,
            "roots are not deletable or bindable"
        );
    }
}

#[test]
fn attrs_override_mode_owner_and_metadata() {
    let mut fs = Volume::new();
    let map = FileMap::new().with(
        "/cfg",
        FsEntry::file("secret")
            .with_mode(0o600)
            .with_owner(10, 20)
            .with_meta("source", "generated"),
    );
    fs.apply(&map).unwrap();
    let st = fs.stat("/cfg").unwrap();
    assert_eq!(st.mode & 0o7777, 0o600);
    assert_eq!((st.uid, st.gid), (10, 20));
    assert_eq!(
        fs.metadata("/cfg", "source").unwrap().as_deref(),
        Some("generated")
    );
}

#[test]
fn mounts_in_maps_are_deferred_and_lazy() {
    let mut fs = Volume::new();
    let resolver = CountingResolver::new(&[("/src", None), ("/src/f", Some("data"))]);
    let map = FileMap::new().with(
        "/mnt",
        FsEntry::mount("/src", Rc::clone(&resolver) as Rc<dyn MountResolver>),
    );
    fs.apply(&map).unwrap();
    assert_eq!(resolver.total_calls(), 0);
    assert_eq!(fs.read_file_utf8("/mnt/f").unwrap(), "data");
}

#[test]
fn relative_names_resolve_against_cwd() {
    let mut fs = Volume::new();
    fs.mkdir("/base", 0o777).unwrap();
    fs.chdir("/base").unwrap();
    let map = FileMap::new().with("here.txt", FsEntry::file("rel"));
    fs.apply(&map).unwrap();
    assert_eq!(fs.read_file_utf8("/base/here.txt").unwrap(), "rel");
}

#[test]
fn apply_on_frozen_volume_is_erofs() {
    let mut fs = Volume::new();
    fs.make_readonly();
    let map = FileMap::new().with("/x", FsEntry::file("x"));
    assert_eq!(fs.apply(&map).unwrap_err().code(), FsErrorCode::EROFS);
}
