//! Transactions: the single entry point for reading and mutating a database.
//!
//! A `Transaction` wraps either a read guard or a write guard over
//! `DatabaseInner` — never both — so the type itself enforces spec.md §5's
//! single-writer/multi-reader rule; there is no runtime "is this writable"
//! flag to get out of sync with what the guard actually allows. Mutating
//! methods additionally track an undo map (the original value of every key
//! touched, written once) and a redo map (the final value, overwritten every
//! time), so a rollback can restore exactly the state the transaction found.
//! On commit, `redo` is replayed into the log instead of recording a wire
//! command at each call site, so a key set more than once in one transaction
//! appends a single record reflecting its final state.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::comparator::Comparator;
use crate::db::DatabaseInner;
use crate::entries::{ExpireEntry, KeyEntry};
use crate::error::{Error, Result};
use crate::index::{Container, Index, RectExtractor};
use crate::item::{Item, ItemHandle, SetOptions};
use crate::pattern;
use crate::persist;
use crate::rect::Rect;
use crate::tree::{self, Direction};

pub(crate) enum Guard<'a> {
    Read(std::sync::RwLockReadGuard<'a, DatabaseInner>),
    Write(std::sync::RwLockWriteGuard<'a, DatabaseInner>),
}

pub struct Transaction<'a> {
    guard: Guard<'a>,
    writable: bool,
    /// True for transactions created by `Database::view`/`update`, which
    /// drive commit/rollback themselves — a caller inside the closure
    /// calling `commit`/`rollback` manually is a programming error
    /// (spec.md's "managed transaction" rule).
    managed: bool,
    closed: bool,
    undo: BTreeMap<Vec<u8>, Option<ItemHandle>>,
    /// Final value of every key touched, overwritten on each successive
    /// write so it always holds exactly one entry per key. `finish_commit`
    /// serializes this map to the log, not the sequence of calls that
    /// produced it — setting a key twice in one transaction appends one
    /// record, not two.
    redo: BTreeMap<Vec<u8>, Option<ItemHandle>>,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(guard: Guard<'a>, writable: bool, managed: bool) -> Transaction<'a> {
        Transaction {
            guard,
            writable,
            managed,
            closed: false,
            undo: BTreeMap::new(),
            redo: BTreeMap::new(),
        }
    }

    fn inner(&self) -> &DatabaseInner {
        match &self.guard {
            Guard::Read(g) => g,
            Guard::Write(g) => g,
        }
    }

    /// Callers must have checked `ensure_writable` first; a read-only guard
    /// reaching here is a bug in this module, not a condition to recover
    /// from.
    fn inner_mut(&mut self) -> &mut DatabaseInner {
        match &mut self.guard {
            Guard::Write(g) => g,
            Guard::Read(_) => unreachable!("inner_mut called on a read-only transaction"),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::TxClosed)
        } else {
            Ok(())
        }
    }

    fn ensure_writable(&mut self) -> Result<()> {
        self.ensure_open()?;
        if !self.writable {
            return Err(Error::TxNotWritable);
        }
        Ok(())
    }

    fn record_undo(&mut self, key: &[u8], prior: Option<ItemHandle>) {
        self.undo.entry(key.to_vec()).or_insert(prior);
    }

    fn record_redo(&mut self, key: &[u8], result: Option<ItemHandle>) {
        self.redo.insert(key.to_vec(), result);
    }

    // -- basic key/value operations -----------------------------------

    pub fn get(&self, key: &[u8]) -> Result<ItemHandle> {
        self.ensure_open()?;
        let now = SystemTime::now();
        match self.inner().keys.get(&KeyEntry::probe(key)) {
            Some(entry) if !entry.0.is_expired_at(now) => Ok(entry.0.clone()),
            _ => Err(Error::NotFound),
        }
    }

    pub fn ttl(&self, key: &[u8]) -> Result<Option<Duration>> {
        let item = self.get(key)?;
        Ok(item
            .expires_at
            .map(|at| at.duration_since(SystemTime::now()).unwrap_or(Duration::ZERO)))
    }

    pub fn len(&self) -> Result<usize> {
        self.ensure_open()?;
        Ok(self.inner().keys.len())
    }

    pub fn set(&mut self, key: &[u8], value: &[u8], opts: SetOptions) -> Result<Option<ItemHandle>> {
        self.ensure_writable()?;
        let now = SystemTime::now();
        let expires_at = opts.resolve(now);
        let new_item: ItemHandle = Arc::new(Item::new(key.to_vec(), value.to_vec(), expires_at));

        let inner = self.inner_mut();
        let prior = remove_item(inner, key);
        insert_item(inner, new_item.clone());

        self.record_undo(key, prior.clone());
        self.record_redo(key, Some(new_item));
        Ok(prior.filter(|p| !p.is_expired_at(now)))
    }

    pub fn delete(&mut self, key: &[u8]) -> Result<ItemHandle> {
        self.ensure_writable()?;
        let now = SystemTime::now();
        let inner = self.inner_mut();
        let prior = remove_item(inner, key);
        match prior {
            Some(item) if !item.is_expired_at(now) => {
                self.record_undo(key, Some(item.clone()));
                self.record_redo(key, None);
                Ok(item)
            }
            _ => Err(Error::NotFound),
        }
    }

    // -- key-ordered scans ----------------------------------------------

    fn scan_keys<F>(&self, direction: Direction, lower: Bound<&[u8]>, upper: Bound<&[u8]>, mut f: F) -> Result<()>
    where
        F: FnMut(&ItemHandle) -> bool,
    {
        self.ensure_open()?;
        let now = SystemTime::now();
        let lower = lower.map(KeyEntry::probe);
        let upper = upper.map(KeyEntry::probe);
        tree::scan(&self.inner().keys, direction, lower, upper, |entry| {
            if entry.0.is_expired_at(now) {
                return true;
            }
            f(&entry.0)
        });
        Ok(())
    }

    pub fn ascend<F: FnMut(&ItemHandle) -> bool>(&self, f: F) -> Result<()> {
        self.scan_keys(Direction::Ascending, Bound::Unbounded, Bound::Unbounded, f)
    }

    pub fn ascend_ge<F: FnMut(&ItemHandle) -> bool>(&self, pivot: &[u8], f: F) -> Result<()> {
        self.scan_keys(Direction::Ascending, Bound::Included(pivot), Bound::Unbounded, f)
    }

    pub fn ascend_lt<F: FnMut(&ItemHandle) -> bool>(&self, pivot: &[u8], f: F) -> Result<()> {
        self.scan_keys(Direction::Ascending, Bound::Unbounded, Bound::Excluded(pivot), f)
    }

    pub fn ascend_range<F: FnMut(&ItemHandle) -> bool>(&self, greater_or_equal: &[u8], less_than: &[u8], f: F) -> Result<()> {
        self.scan_keys(Direction::Ascending, Bound::Included(greater_or_equal), Bound::Excluded(less_than), f)
    }

    pub fn descend<F: FnMut(&ItemHandle) -> bool>(&self, f: F) -> Result<()> {
        self.scan_keys(Direction::Descending, Bound::Unbounded, Bound::Unbounded, f)
    }

    pub fn descend_le<F: FnMut(&ItemHandle) -> bool>(&self, pivot: &[u8], f: F) -> Result<()> {
        self.scan_keys(Direction::Descending, Bound::Unbounded, Bound::Included(pivot), f)
    }

    pub fn descend_gt<F: FnMut(&ItemHandle) -> bool>(&self, pivot: &[u8], f: F) -> Result<()> {
        self.scan_keys(Direction::Descending, Bound::Excluded(pivot), Bound::Unbounded, f)
    }

    /// `less_or_equal` is the high end of the range, `greater_than` the low
    /// end — descend_range walks downward, so its first bound is the one the
    /// scan starts at (spec.md §4.3).
    pub fn descend_range<F: FnMut(&ItemHandle) -> bool>(&self, less_or_equal: &[u8], greater_than: &[u8], f: F) -> Result<()> {
        self.scan_keys(Direction::Descending, Bound::Excluded(greater_than), Bound::Included(less_or_equal), f)
    }

    fn pattern_scan<F: FnMut(&ItemHandle) -> bool>(&self, direction: Direction, pattern: &[u8], mut f: F) -> Result<()> {
        let match_all = pattern::is_match_all(pattern);
        self.scan_keys(direction, Bound::Unbounded, Bound::Unbounded, |item| {
            if match_all || pattern::matches(pattern, &item.key) {
                f(item)
            } else {
                true
            }
        })
    }

    pub fn ascend_keys<F: FnMut(&ItemHandle) -> bool>(&self, pattern: &[u8], f: F) -> Result<()> {
        self.pattern_scan(Direction::Ascending, pattern, f)
    }

    pub fn descend_keys<F: FnMut(&ItemHandle) -> bool>(&self, pattern: &[u8], f: F) -> Result<()> {
        self.pattern_scan(Direction::Descending, pattern, f)
    }

    // -- index-ordered scans ---------------------------------------------

    fn scan_index<F>(&self, index: &str, direction: Direction, lower: Bound<&[u8]>, upper: Bound<&[u8]>, mut f: F) -> Result<()>
    where
        F: FnMut(&ItemHandle) -> bool,
    {
        self.ensure_open()?;
        let now = SystemTime::now();
        let idx = self.inner().indexes.get(index).ok_or(Error::NotFound)?;
        idx.scan_ordered(direction, lower, upper, |item| {
            if item.is_expired_at(now) {
                return true;
            }
            f(item)
        });
        Ok(())
    }

    pub fn ascend_index<F: FnMut(&ItemHandle) -> bool>(&self, index: &str, f: F) -> Result<()> {
        self.scan_index(index, Direction::Ascending, Bound::Unbounded, Bound::Unbounded, f)
    }

    pub fn ascend_index_ge<F: FnMut(&ItemHandle) -> bool>(&self, index: &str, pivot: &[u8], f: F) -> Result<()> {
        self.scan_index(index, Direction::Ascending, Bound::Included(pivot), Bound::Unbounded, f)
    }

    pub fn ascend_index_lt<F: FnMut(&ItemHandle) -> bool>(&self, index: &str, pivot: &[u8], f: F) -> Result<()> {
        self.scan_index(index, Direction::Ascending, Bound::Unbounded, Bound::Excluded(pivot), f)
    }

    pub fn ascend_index_range<F: FnMut(&ItemHandle) -> bool>(&self, index: &str, greater_or_equal: &[u8], less_than: &[u8], f: F) -> Result<()> {
        self.scan_index(index, Direction::Ascending, Bound::Included(greater_or_equal), Bound::Excluded(less_than), f)
    }

    pub fn descend_index<F: FnMut(&ItemHandle) -> bool>(&self, index: &str, f: F) -> Result<()> {
        self.scan_index(index, Direction::Descending, Bound::Unbounded, Bound::Unbounded, f)
    }

    pub fn descend_index_le<F: FnMut(&ItemHandle) -> bool>(&self, index: &str, pivot: &[u8], f: F) -> Result<()> {
        self.scan_index(index, Direction::Descending, Bound::Unbounded, Bound::Included(pivot), f)
    }

    pub fn descend_index_gt<F: FnMut(&ItemHandle) -> bool>(&self, index: &str, pivot: &[u8], f: F) -> Result<()> {
        self.scan_index(index, Direction::Descending, Bound::Excluded(pivot), Bound::Unbounded, f)
    }

    pub fn descend_index_range<F: FnMut(&ItemHandle) -> bool>(&self, index: &str, less_or_equal: &[u8], greater_than: &[u8], f: F) -> Result<()> {
        self.scan_index(index, Direction::Descending, Bound::Excluded(greater_than), Bound::Included(less_or_equal), f)
    }

    pub fn intersects<F: FnMut(&ItemHandle) -> bool>(&self, index: &str, query: &Rect, mut f: F) -> Result<()> {
        self.ensure_open()?;
        let now = SystemTime::now();
        let idx = self.inner().indexes.get(index).ok_or(Error::NotFound)?;
        match &idx.container {
            Container::Spatial { tree, .. } => {
                tree.intersects(query, |item| {
                    if item.is_expired_at(now) {
                        return true;
                    }
                    f(item)
                });
                Ok(())
            }
            Container::Ordered { .. } => Err(Error::InvalidOperation),
        }
    }

    // -- index management --------------------------------------------------

    pub fn create_index(&mut self, name: &str, pattern: &[u8], case_insensitive: bool, comparators: Vec<Comparator>) -> Result<()> {
        self.ensure_writable()?;
        let inner = self.inner_mut();
        if inner.indexes.contains(name) {
            return Err(Error::IndexExists);
        }
        let mut idx = Index::new_ordered(name.to_string(), pattern.to_vec(), case_insensitive, comparators);
        for entry in inner.keys.iter() {
            idx.insert_if_matches(&entry.0);
        }
        inner.indexes.insert(idx);
        Ok(())
    }

    pub fn create_spatial_index(&mut self, name: &str, pattern: &[u8], case_insensitive: bool, rect_of: RectExtractor) -> Result<()> {
        self.ensure_writable()?;
        let inner = self.inner_mut();
        if inner.indexes.contains(name) {
            return Err(Error::IndexExists);
        }
        let mut idx = Index::new_spatial(name.to_string(), pattern.to_vec(), case_insensitive, rect_of);
        for entry in inner.keys.iter() {
            idx.insert_if_matches(&entry.0);
        }
        inner.indexes.insert(idx);
        Ok(())
    }

    pub fn drop_index(&mut self, name: &str) -> Result<()> {
        self.ensure_writable()?;
        let inner = self.inner_mut();
        inner.indexes.remove(name).ok_or(Error::NotFound)?;
        Ok(())
    }

    pub fn indexes(&self) -> Result<Vec<String>> {
        self.ensure_open()?;
        Ok(self.inner().indexes.names())
    }

    // -- lifecycle -----------------------------------------------------

    /// Manually closes an unmanaged transaction (one obtained from
    /// `Database::begin`, not `view`/`update`) and persists its writes.
    /// Calling this on a managed transaction is a programming error —
    /// `view`/`update` already own the commit/rollback decision.
    pub fn commit(mut self) -> Result<()> {
        if self.managed {
            return Err(Error::InvalidOperation);
        }
        self.finish_commit()
    }

    pub fn rollback(mut self) -> Result<()> {
        if self.managed {
            return Err(Error::InvalidOperation);
        }
        self.finish_rollback();
        Ok(())
    }

    pub(crate) fn finish_commit(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::TxClosed);
        }
        self.closed = true;
        self.undo.clear();
        if self.writable {
            let redo = std::mem::take(&mut self.redo);
            if !redo.is_empty() {
                let now = SystemTime::now();
                let mut commands = Vec::new();
                for (key, result) in &redo {
                    match result {
                        Some(item) => commands.extend_from_slice(&persist::encode_set_record(item, now)),
                        None => commands.extend_from_slice(&persist::encode_del_record(key)),
                    }
                }
                let inner = self.inner_mut();
                if let Some(log) = inner.log.as_mut() {
                    log.append(&commands)?;
                    log.maybe_sync(inner.config.sync_policy)?;
                }
            }
        }
        Ok(())
    }

    pub(crate) fn finish_rollback(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let undo = std::mem::take(&mut self.undo);
        if let Guard::Write(inner) = &mut self.guard {
            for (key, prior) in undo {
                match prior {
                    Some(item) => {
                        insert_item(inner, item);
                    }
                    None => {
                        remove_item(inner, &key);
                    }
                }
            }
        }
        self.redo.clear();
    }
}

impl<'a> Drop for Transaction<'a> {
    /// An unmanaged writable transaction that's dropped without an explicit
    /// `commit`/`rollback` rolls back rather than silently keeping partial
    /// writes — the Rust analogue of buntdb's "you must unlock" discipline,
    /// made safe instead of merely documented.
    fn drop(&mut self) {
        if !self.closed && self.writable {
            self.finish_rollback();
        }
    }
}

pub(crate) fn insert_item(inner: &mut DatabaseInner, item: ItemHandle) {
    if item.expires_at.is_some() {
        inner.exps.insert(ExpireEntry(item.clone()));
    }
    for idx in inner.indexes.iter_mut() {
        idx.insert_if_matches(&item);
    }
    inner.keys.insert(KeyEntry(item));
}

pub(crate) fn remove_item(inner: &mut DatabaseInner, key: &[u8]) -> Option<ItemHandle> {
    let existing = inner.keys.take(&KeyEntry::probe(key))?;
    let item = existing.0;
    if item.expires_at.is_some() {
        inner.exps.remove(&ExpireEntry(item.clone()));
    }
    for idx in inner.indexes.iter_mut() {
        idx.remove(&item);
    }
    Some(item)
}
