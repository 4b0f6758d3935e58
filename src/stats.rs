use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Process-lifetime detection counters. Shared between the watcher, the
/// correlator and the dispatcher, so everything is an atomic.
#[derive(Debug, Default)]
pub struct SessionStats {
    pub pop: AtomicU64,
    pub stop: AtomicU64,
    pub ignored_duplicate: AtomicU64,
    pub ignored_old: AtomicU64,
    pub ignored_stale: AtomicU64,
    pub ignored_no_tag: AtomicU64,
    pub errors: AtomicU64,
}

/// Read-only copy of the counters, serializable for the UI layer.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub pop: u64,
    pub stop: u64,
    pub ignored_duplicate: u64,
    pub ignored_old: u64,
    pub ignored_stale: u64,
    pub ignored_no_tag: u64,
    pub errors: u64,
}

impl SessionStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            pop: self.pop.load(Ordering::Relaxed),
            stop: self.stop.load(Ordering::Relaxed),
            ignored_duplicate: self.ignored_duplicate.load(Ordering::Relaxed),
            ignored_old: self.ignored_old.load(Ordering::Relaxed),
            ignored_stale: self.ignored_stale.load(Ordering::Relaxed),
            ignored_no_tag: self.ignored_no_tag.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    pub fn summary_line(&self) -> String {
        let s = self.snapshot();
        format!(
            "session summary: pop={}, stop={}, ignored: dup={}, old={}, stale={}, no_tag={}, errors={}",
            s.pop, s.stop, s.ignored_duplicate, s.ignored_old, s.ignored_stale, s.ignored_no_tag, s.errors
        )
    }
}

/// Relaxed increment helper so call sites stay one line.
pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}
