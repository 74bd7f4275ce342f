//! Interval-driven stat polling.
//!
//! `watch_file` registers a listener that fires whenever any field of the
//! path's stat record changes between ticks of an injected interval
//! scheduler. The volume is reached through a weak handle so a dropped
//! volume simply stops producing ticks.

use std::cell::RefCell;
use std::rc::Rc;

use crate::path;
use crate::stat::Stats;
use crate::volume::Volume;

/// Handle to a scheduled interval.
pub type TimerId = u64;

/// Injected interval scheduler.
///
/// Implementations decide what "every `period_ms` milliseconds" means —
/// a real timer wheel in production, a hand-cranked fake in tests.
pub trait Timers {
    fn set_interval(&self, period_ms: u64, tick: Box<dyn FnMut()>) -> TimerId;
    fn clear_interval(&self, id: TimerId);
}

/// Listener invoked with `(current, previous)` stat snapshots.
pub type StatListener = Rc<RefCell<dyn FnMut(&Stats, &Stats)>>;

/// Options for [`watch_file`].
#[derive(Debug, Clone, Copy)]
pub struct WatchFileOptions {
    pub interval_ms: u64,
}

impl Default for WatchFileOptions {
    fn default() -> Self {
        Self { interval_ms: 5007 }
    }
}

/// A registered poll watcher, tracked by the volume for `unwatch_file`.
pub(crate) struct PollWatch {
    pub(crate) path: String,
    pub(crate) listener: StatListener,
    pub(crate) timer: TimerId,
}

/// Registers an interval that stats `path` and reports changed records.
///
/// If the path does not exist at registration time the listener is
/// invoked synchronously with `(empty, empty)`.
pub fn watch_file(
    volume: &Rc<RefCell<Volume>>,
    timers: &Rc<dyn Timers>,
    path: &str,
    options: WatchFileOptions,
    listener: StatListener,
) -> TimerId {
    let initial = volume.borrow_mut().stat(path).ok();
    let prev = Rc::new(RefCell::new(initial.unwrap_or_else(Stats::empty)));
    if initial.is_none() {
        (&mut *listener.borrow_mut())(&Stats::empty(), &Stats::empty());
    }

    let weak = Rc::downgrade(volume);
    let tick_listener = Rc::clone(&listener);
    let tick_prev = Rc::clone(&prev);
    let tick_path = path.to_owned();
    let tick = Box::new(move || {
        let Some(volume) = weak.upgrade() else {
            return;
        };
        let current = volume
            .borrow_mut()
            .stat(&tick_path)
            .unwrap_or_else(|_| Stats::empty());
        let previous = *tick_prev.borrow();
        if current != previous {
            *tick_prev.borrow_mut() = current;
            (&mut *tick_listener.borrow_mut())(&current, &previous);
        }
    });
    let timer = timers.set_interval(options.interval_ms, tick);
    volume.borrow_mut().poll_watches.push(PollWatch {
        path: path.to_owned(),
        listener,
        timer,
    });
    timer
}

/// Clears poll watchers on `path`.
///
/// With a listener given, only entries registered with that same listener
/// are removed; otherwise every watcher on the path goes.
pub fn unwatch_file(
    volume: &Rc<RefCell<Volume>>,
    timers: &Rc<dyn Timers>,
    path: &str,
    listener: Option<&StatListener>,
) {
    let mut vol = volume.borrow_mut();
    let casing = vol.casing();
    vol.poll_watches.retain(|watch| {
        let same_path = path::equate(&watch.path, path, casing);
        let same_listener = listener.map_or(true, |l| Rc::ptr_eq(l, &watch.listener));
        if same_path && same_listener {
            timers.clear_interval(watch.timer);
            false
        } else {
            true
        }
    });
}
