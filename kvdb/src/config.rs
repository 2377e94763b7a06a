//! Database-wide configuration: sync policy, autoshrink thresholds, and the
//! expiration hooks.

use std::sync::Arc;

use crate::error::{Error, Result};

/// When to `fsync` the persistence log after a commit append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPolicy {
    /// Never explicitly fsync; rely on the OS to flush eventually.
    Never,
    /// Delegate to the background worker, which fsyncs at most once per
    /// second if any commit has appended since the last tick. Default.
    EverySecond,
    /// fsync after every single commit append.
    Always,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        SyncPolicy::EverySecond
    }
}

impl SyncPolicy {
    /// Parses the string form an embedding application's own configuration
    /// might supply. Unlike constructing the enum directly, this path can
    /// fail — spec.md's `invalid_sync_policy` error exists for exactly this
    /// kind of externally supplied, possibly-malformed setting.
    pub fn parse(s: &str) -> Result<SyncPolicy> {
        match s {
            "never" => Ok(SyncPolicy::Never),
            "every_second" | "everysecond" => Ok(SyncPolicy::EverySecond),
            "always" => Ok(SyncPolicy::Always),
            _ => Err(Error::InvalidSyncPolicy),
        }
    }
}

pub const DEFAULT_AUTOSHRINK_PERCENTAGE: u32 = 100;
pub const DEFAULT_AUTOSHRINK_MIN_SIZE: u64 = 32 * 1024 * 1024;

/// Invoked asynchronously (outside any transaction) after an item has been
/// swept for expiring.
pub type OnExpired = Arc<dyn Fn(&[u8], &[u8]) + Send + Sync>;

/// Invoked synchronously, inside the sweeping write transaction, in place of
/// the default delete. The callback may re-insert the key with a new TTL,
/// delete it explicitly, or leave it untouched.
pub type OnExpiredSync =
    Arc<dyn Fn(&[u8], &[u8], &mut crate::tx::Transaction<'_>) -> Result<()> + Send + Sync>;

#[derive(Clone)]
pub struct Config {
    pub sync_policy: SyncPolicy,
    /// Grow threshold as a percentage of the size recorded at the last
    /// shrink, e.g. 100 means "shrink again once the file has doubled".
    pub autoshrink_percentage: u32,
    /// Autoshrink never triggers below this absolute file size, regardless
    /// of the percentage growth.
    pub autoshrink_min_size: u64,
    pub autoshrink_disabled: bool,
    pub on_expired: Option<OnExpired>,
    pub on_expired_sync: Option<OnExpiredSync>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            sync_policy: SyncPolicy::default(),
            autoshrink_percentage: DEFAULT_AUTOSHRINK_PERCENTAGE,
            autoshrink_min_size: DEFAULT_AUTOSHRINK_MIN_SIZE,
            autoshrink_disabled: false,
            on_expired: None,
            on_expired_sync: None,
        }
    }
}

impl Config {
    /// True when either expiration hook is installed, in which case the
    /// sweep hands control to the hook instead of deleting automatically
    /// (spec.md §4.4).
    pub fn has_expiry_hook(&self) -> bool {
        self.on_expired.is_some() || self.on_expired_sync.is_some()
    }
}
