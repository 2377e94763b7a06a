//! The unit of storage: a key/value pair with an optional absolute expiry.

use std::sync::Arc;
use std::time::SystemTime;

/// A key/value pair plus optional expiration instant.
///
/// Items are immutable once inserted; a "replace" is a delete-then-insert of
/// a new `Item` under the same key (see `tx::Transaction::set`). Equality for
/// container membership purposes is by key alone, which is why trees store
/// `ItemHandle`s rather than comparing full items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub expires_at: Option<SystemTime>,
}

impl Item {
    pub fn new(key: Vec<u8>, value: Vec<u8>, expires_at: Option<SystemTime>) -> Self {
        Item { key, value, expires_at }
    }

    /// True if this item has a TTL and it has passed `now`.
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        matches!(self.expires_at, Some(t) if t <= now)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(SystemTime::now())
    }
}

/// Shared, reference-counted handle to an `Item`.
///
/// The keys tree, the expires tree, and every matching index's container all
/// hold a clone of the same handle rather than a copy of the bytes: an item
/// is jointly owned by every tree it is a member of (design note in
/// DESIGN.md).
pub type ItemHandle = Arc<Item>;

/// Options accepted by `set`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetOptions {
    pub expires: bool,
    pub ttl: std::time::Duration,
}

impl SetOptions {
    pub fn none() -> Self {
        SetOptions::default()
    }

    pub fn with_ttl(ttl: std::time::Duration) -> Self {
        SetOptions { expires: true, ttl }
    }

    /// Resolve to an absolute expiry given the commit time, or `None` if no
    /// TTL was requested. `ttl == 0` is admissible and yields an instant in
    /// the past, i.e. an item that is born expired.
    pub fn resolve(&self, now: SystemTime) -> Option<SystemTime> {
        if self.expires {
            Some(now + self.ttl)
        } else {
            None
        }
    }
}
