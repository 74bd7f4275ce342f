#![allow(clippy::unwrap_used, missing_docs)]

use mem_fs::{EventMask, FsErrorCode, Volume, WatchEventKind};

fn fixture() -> Volume {
    let mut fs = Volume::new();
    fs.mkdir("/a", 0o777).unwrap();
    fs.write_file("/a/f", b"hi").unwrap();
    fs
}

#[test]
fn directory_watch_sees_creation_lifecycle() {
    let mut fs = fixture();
    let fd = fs.inotify_init();
    let wd = fs
        .inotify_add_watch(fd, "/a", EventMask::ALL_EVENTS)
        .unwrap();

    fs.write_file("/a/new", b"x").unwrap();
    let events = fs.take_events(fd).unwrap();
    let masks: Vec<EventMask> = events.iter().map(|e| e.mask).collect();

    assert!(events.iter().all(|e| e.wd == wd));
    assert!(
        masks.iter().any(|m| m.contains(EventMask::CREATE)),
        "expected CREATE, got {masks:?}"
    );
    assert!(masks.iter().any(|m| m.contains(EventMask::OPEN)));
    assert!(masks.iter().any(|m| m.contains(EventMask::MODIFY)));
    assert!(masks.iter().any(|m| m.contains(EventMask::CLOSE_WRITE)));
    assert!(
        events
            .iter()
            .filter(|e| e.mask.intersects(EventMask::ALL_EVENTS))
            .all(|e| e.name.as_deref() == Some("new")),
        "parent-directed events carry the child name"
    );
    fs.close(fd).unwrap();
}

#[test]
fn rename_emits_one_cookie_matched_pair() {
    let mut fs = fixture();
    let fd = fs.inotify_init();
    fs.inotify_add_watch(fd, "/a", EventMask::MOVED_FROM | EventMask::MOVED_TO)
        .unwrap();

    fs.rename("/a/f", "/a/h").unwrap();
    let events = fs.take_events(fd).unwrap();
    assert_eq!(events.len(), 2, "exactly one from/to pair: {events:?}");
    assert!(events[0].mask.contains(EventMask::MOVED_FROM));
    assert_eq!(events[0].name.as_deref(), Some("f"));
    assert!(events[1].mask.contains(EventMask::MOVED_TO));
    assert_eq!(events[1].name.as_deref(), Some("h"));
    assert_ne!(events[0].cookie, 0);
    assert_eq!(events[0].cookie, events[1].cookie);
}

#[test]
fn rename_cookies_are_unique_per_rename() {
    let mut fs = fixture();
    let fd = fs.inotify_init();
    fs.inotify_add_watch(fd, "/a", EventMask::MOVED_FROM | EventMask::MOVED_TO)
        .unwrap();
    fs.rename("/a/f", "/a/g").unwrap();
    fs.rename("/a/g", "/a/h").unwrap();
    let events = fs.take_events(fd).unwrap();
    assert_eq!(events.len(), 4);
    assert_eq!(events[0].cookie, events[1].cookie);
    assert_eq!(events[2].cookie, events[3].cookie);
    assert_ne!(events[0].cookie, events[2].cookie);
}

#[test]
fn watched_node_death_delivers_ignored() {
    let mut fs = fixture();
    let fd = fs.inotify_init();
    let wd = fs
        .inotify_add_watch(fd, "/a/f", EventMask::ALL_EVENTS)
        .unwrap();

    fs.unlink("/a/f").unwrap();
    let events = fs.take_events(fd).unwrap();
    let masks: Vec<EventMask> = events.iter().map(|e| e.mask).collect();
    assert!(masks.iter().any(|m| m.contains(EventMask::ATTRIB)));
    assert!(masks.iter().any(|m| m.contains(EventMask::DELETE_SELF)));
    let last = events.last().unwrap();
    assert!(
        last.mask.contains(EventMask::IGNORED),
        "teardown ends with IGNORED: {masks:?}"
    );
    assert_eq!(last.wd, wd);
}

#[test]
fn rm_watch_delivers_final_ignored() {
    let mut fs = fixture();
    let fd = fs.inotify_init();
    let wd = fs
        .inotify_add_watch(fd, "/a", EventMask::ALL_EVENTS)
        .unwrap();
    fs.inotify_rm_watch(fd, wd).unwrap();
    let events = fs.take_events(fd).unwrap();
    assert_eq!(events.len(), 1);
    assert!(events[0].mask.contains(EventMask::IGNORED));

    // The watch really is gone.
    fs.write_file("/a/x", b"x").unwrap();
    assert!(fs.take_events(fd).unwrap().is_empty());
    assert_eq!(
        fs.inotify_rm_watch(fd, wd).unwrap_err().code(),
        FsErrorCode::EINVAL
    );
}

#[test]
fn oneshot_watch_fires_once_without_ignored() {
    let mut fs = fixture();
    let fd = fs.inotify_init();
    fs.inotify_add_watch(fd, "/a", EventMask::CREATE | EventMask::ONESHOT)
        .unwrap();

    fs.write_file("/a/one", b"1").unwrap();
    fs.write_file("/a/two", b"2").unwrap();
    let events = fs.take_events(fd).unwrap();
    assert_eq!(events.len(), 1, "oneshot delivers a single event");
    assert!(events[0].mask.contains(EventMask::CREATE));
    assert_eq!(events[0].name.as_deref(), Some("one"));
}

#[test]
fn mask_add_merges_and_default_replaces() {
    let mut fs = fixture();
    let fd = fs.inotify_init();
    let wd = fs
        .inotify_add_watch(fd, "/a", EventMask::CREATE)
        .unwrap();
    let wd2 = fs
        .inotify_add_watch(fd, "/a", EventMask::DELETE | EventMask::MASK_ADD)
        .unwrap();
    assert_eq!(wd, wd2, "re-adding reuses the watch descriptor");

    fs.write_file("/a/x", b"x").unwrap();
    fs.unlink("/a/x").unwrap();
    let events = fs.take_events(fd).unwrap();
    assert!(events.iter().any(|e| e.mask.contains(EventMask::CREATE)));
    assert!(events.iter().any(|e| e.mask.contains(EventMask::DELETE)));

    // Plain re-add replaces the mask entirely.
    fs.inotify_add_watch(fd, "/a", EventMask::DELETE).unwrap();
    fs.write_file("/a/y", b"y").unwrap();
    let events = fs.take_events(fd).unwrap();
    assert!(
        !events.iter().any(|e| e.mask.contains(EventMask::CREATE)),
        "CREATE no longer subscribed: {events:?}"
    );
}

#[test]
fn onlydir_on_a_file_is_enotdir() {
    let mut fs = fixture();
    let fd = fs.inotify_init();
    assert_eq!(
        fs.inotify_add_watch(fd, "/a/f", EventMask::ALL_EVENTS | EventMask::ONLYDIR)
            .unwrap_err()
            .code(),
        FsErrorCode::ENOTDIR
    );
}

#[test]
fn dont_follow_watches_the_link_itself() {
    let mut fs = fixture();
    fs.symlink("f", "/a/l").unwrap();
    let fd = fs.inotify_init();
    fs.inotify_add_watch(fd, "/a/l", EventMask::ALL_EVENTS | EventMask::DONT_FOLLOW)
        .unwrap();

    fs.write_file("/a/f", b"update").unwrap();
    assert!(
        fs.take_events(fd).unwrap().is_empty(),
        "watch is on the symlink inode, not its target"
    );
}

#[test]
fn mkdir_and_symlink_carry_isdir_flag() {
    let mut fs = fixture();
    let fd = fs.inotify_init();
    fs.inotify_add_watch(fd, "/a", EventMask::ALL_EVENTS)
        .unwrap();
    fs.mkdir("/a/d", 0o777).unwrap();
    fs.symlink("f", "/a/l").unwrap();
    let events = fs.take_events(fd).unwrap();
    assert!(events
        .iter()
        .all(|e| e.mask.contains(EventMask::CREATE | EventMask::ISDIR)));
}

#[test]
fn parent_notification_precedes_node_notification() {
    let mut fs = fixture();
    let fd = fs.inotify_init();
    let parent_wd = fs
        .inotify_add_watch(fd, "/a", EventMask::ALL_EVENTS)
        .unwrap();
    let node_wd = fs
        .inotify_add_watch(fd, "/a/f", EventMask::ALL_EVENTS)
        .unwrap();

    fs.chmod("/a/f", 0o600).unwrap();
    let events = fs.take_events(fd).unwrap();
    let wds: Vec<u64> = events.iter().map(|e| e.wd).collect();
    assert_eq!(wds, vec![parent_wd, node_wd]);
}

#[test]
fn facade_translates_and_suppresses_ignored() {
    let mut fs = fixture();
    let watcher = fs.watch("/a").unwrap();

    fs.write_file("/a/new", b"x").unwrap();
    let events = fs.take_watch_events(&watcher).unwrap();
    assert!(events
        .iter()
        .any(|e| e.kind == WatchEventKind::Rename && e.name.as_deref() == Some("new")));
    assert!(events.iter().any(|e| e.kind == WatchEventKind::Change));

    // Removing the watched directory tears the watch down; the IGNORED
    // tail is not surfaced through the façade.
    fs.unlink("/a/new").unwrap();
    fs.unlink("/a/f").unwrap();
    fs.rmdir("/a").unwrap();
    let events = fs.take_watch_events(&watcher).unwrap();
    assert!(events.iter().all(|e| e.name.is_some() || e.kind == WatchEventKind::Rename));
    fs.unwatch(watcher).unwrap();
}

#[test]
fn inotify_calls_on_file_descriptor_are_ebadf() {
    let mut fs = fixture();
    let fd = fs.open("/a/f", mem_fs::OpenFlags::RDONLY, 0).unwrap();
    assert_eq!(
        fs.inotify_add_watch(fd, "/a", EventMask::ALL_EVENTS)
            .unwrap_err()
            .code(),
        FsErrorCode::EBADF
    );
    assert_eq!(fs.take_events(fd).unwrap_err().code(), FsErrorCode::EBADF);
    fs.close(fd).unwrap();
}
