//! Tree-entry wrapper types.
//!
//! `std::collections::BTreeSet<T>` only needs `T: Ord`, so each tree gets its
//! own zero-cost wrapper around an `ItemHandle` implementing the ordering
//! that tree is supposed to provide. Two items compare equal here iff they
//! have the same key, which is also how `replace` (delete-then-insert) finds
//! and removes a prior item's entries before inserting the new ones.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::comparator::{compare_items, compare_values, Comparator};
use crate::item::{Item, ItemHandle};

/// Keys tree entry: ordered strictly by key bytes.
#[derive(Debug, Clone)]
pub struct KeyEntry(pub ItemHandle);

impl KeyEntry {
    pub fn probe(key: &[u8]) -> KeyEntry {
        KeyEntry(Arc::new(Item::new(key.to_vec(), Vec::new(), None)))
    }
}

impl PartialEq for KeyEntry {
    fn eq(&self, other: &Self) -> bool {
        self.0.key == other.0.key
    }
}
impl Eq for KeyEntry {}

impl PartialOrd for KeyEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for KeyEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.key.cmp(&other.0.key)
    }
}

/// Expires tree entry: ordered by `(expires_at, key)` ascending. Only items
/// with a TTL are ever inserted here.
#[derive(Debug, Clone)]
pub struct ExpireEntry(pub ItemHandle);

impl ExpireEntry {
    pub fn probe(expires_at: std::time::SystemTime, key: &[u8]) -> ExpireEntry {
        ExpireEntry(Arc::new(Item::new(key.to_vec(), Vec::new(), Some(expires_at))))
    }
}

impl PartialEq for ExpireEntry {
    fn eq(&self, other: &Self) -> bool {
        self.0.expires_at == other.0.expires_at && self.0.key == other.0.key
    }
}
impl Eq for ExpireEntry {}

impl PartialOrd for ExpireEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for ExpireEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .expires_at
            .cmp(&other.0.expires_at)
            .then_with(|| self.0.key.cmp(&other.0.key))
    }
}

/// Distinguishes a real tree member from a range-bound sentinel that only
/// probes for a value. `scan_ordered` needs to bound "every entry whose
/// value is `v`" as a group, and a group can hold any number of real
/// entries (each with a distinct key) tied on `v` — a sentinel needs to sort
/// below all of them (`Low`) or above all of them (`High`) to act as an
/// inclusive/exclusive edge around the whole group.
#[derive(Clone, Copy, PartialEq, Eq)]
enum KeyBound {
    Real,
    Low,
    High,
}

/// Secondary B-tree index entry: ordered by the index's comparator chain,
/// falling back to key order for uniqueness (spec.md §3).
#[derive(Clone)]
pub struct IndexEntry {
    pub item: ItemHandle,
    pub comparators: Arc<Vec<Comparator>>,
    bound: KeyBound,
}

impl IndexEntry {
    /// Wraps a real tree member (backed by an actual stored item).
    pub fn real(item: ItemHandle, comparators: Arc<Vec<Comparator>>) -> IndexEntry {
        IndexEntry { item, comparators, bound: KeyBound::Real }
    }

    pub fn probe(value: &[u8], key: &[u8], comparators: Arc<Vec<Comparator>>) -> IndexEntry {
        IndexEntry {
            item: Arc::new(Item::new(key.to_vec(), value.to_vec(), None)),
            comparators,
            bound: KeyBound::Real,
        }
    }

    /// A sentinel that sorts before every real entry sharing `value`.
    pub fn probe_low(value: &[u8], comparators: Arc<Vec<Comparator>>) -> IndexEntry {
        IndexEntry {
            item: Arc::new(Item::new(Vec::new(), value.to_vec(), None)),
            comparators,
            bound: KeyBound::Low,
        }
    }

    /// A sentinel that sorts after every real entry sharing `value`.
    pub fn probe_high(value: &[u8], comparators: Arc<Vec<Comparator>>) -> IndexEntry {
        IndexEntry {
            item: Arc::new(Item::new(Vec::new(), value.to_vec(), None)),
            comparators,
            bound: KeyBound::High,
        }
    }
}

impl PartialEq for IndexEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for IndexEntry {}

impl PartialOrd for IndexEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for IndexEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.bound == KeyBound::Real && other.bound == KeyBound::Real {
            return compare_items(&self.comparators, &self.item, &other.item);
        }
        match compare_values(&self.comparators, &self.item, &other.item) {
            Ordering::Equal => match (self.bound, other.bound) {
                (KeyBound::Low, KeyBound::Low) | (KeyBound::High, KeyBound::High) => Ordering::Equal,
                (KeyBound::Low, _) => Ordering::Less,
                (_, KeyBound::Low) => Ordering::Greater,
                (KeyBound::High, _) => Ordering::Greater,
                (_, KeyBound::High) => Ordering::Less,
                (KeyBound::Real, KeyBound::Real) => unreachable!(),
            },
            other_ord => other_ord,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::time::{Duration, SystemTime};

    #[test]
    fn key_entry_orders_by_key_bytes() {
        let mut set = BTreeSet::new();
        set.insert(KeyEntry(Arc::new(Item::new(b"b".to_vec(), vec![], None))));
        set.insert(KeyEntry(Arc::new(Item::new(b"a".to_vec(), vec![], None))));
        let keys: Vec<_> = set.iter().map(|e| e.0.key.clone()).collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn expire_entry_orders_by_time_then_key() {
        let t0 = SystemTime::UNIX_EPOCH;
        let t1 = t0 + Duration::from_secs(10);
        let mut set = BTreeSet::new();
        set.insert(ExpireEntry(Arc::new(Item::new(b"z".to_vec(), vec![], Some(t0)))));
        set.insert(ExpireEntry(Arc::new(Item::new(b"a".to_vec(), vec![], Some(t1)))));
        let keys: Vec<_> = set.iter().map(|e| e.0.key.clone()).collect();
        assert_eq!(keys, vec![b"z".to_vec(), b"a".to_vec()]);
    }
}
