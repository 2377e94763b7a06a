//! Thin wrappers around the `log` crate's macros, used consistently at the
//! handful of module boundaries worth a line of output: open/close, shrink
//! start/finish, background sweep ticks, and load-time truncation.
//!
//! Kept as small free functions (rather than sprinkling `log::debug!` calls
//! with ad-hoc messages everywhere) so the wording at each of these points
//! stays consistent as the crate grows.

use std::path::Path;

pub(crate) fn opened(path: &Path, items: usize) {
    log::info!("kvdb: opened {} ({} items)", path.display(), items);
}

pub(crate) fn opened_memory() {
    log::debug!("kvdb: opened in-memory database");
}

pub(crate) fn closed(path: &Path) {
    log::info!("kvdb: closed {}", path.display());
}

pub(crate) fn shrink_started(path: &Path) {
    log::debug!("kvdb: shrink started for {}", path.display());
}

pub(crate) fn shrink_finished(path: &Path, before: u64, after: u64) {
    log::info!(
        "kvdb: shrink finished for {} ({before} -> {after} bytes)",
        path.display()
    );
}

pub(crate) fn sweep_removed(count: usize) {
    if count > 0 {
        log::debug!("kvdb: expiration sweep removed {count} item(s)");
    }
}

pub(crate) fn truncated_tail(path: &Path, bytes: usize) {
    log::warn!(
        "kvdb: {} has {bytes} trailing byte(s) that did not form a complete record; ignoring",
        path.display()
    );
}
