//! An embeddable key/value store: an in-memory primary index of `Vec<u8>`
//! keys, user-defined secondary indexes (ordered or spatial), ACID
//! single-writer/multi-reader transactions, optional append-only
//! persistence with online shrink, and TTL-based expiration swept by a
//! background worker.
//!
//! The store is opened as a [`Database`], which is cheap to `Clone` (an
//! `Arc` bump) and safe to share across threads. Reads and writes happen
//! inside a [`Transaction`], obtained either through [`Database::view`] /
//! [`Database::update`] (auto commit/rollback) or [`Database::begin`]
//! (manual commit/rollback, for callers that need the transaction to
//! outlive a single closure).
//!
//! ```
//! use kvdb::{Database, SetOptions};
//!
//! let db = Database::open_memory();
//! db.update(|tx| {
//!     tx.set(b"user:1", b"Tom", SetOptions::none())?;
//!     Ok(())
//! }).unwrap();
//!
//! let value = db.view(|tx| tx.get(b"user:1").map(|v| v.to_vec())).unwrap();
//! assert_eq!(value.as_deref(), Some(&b"Tom"[..]));
//! ```

pub mod comparator;
pub mod config;
pub mod db;
pub(crate) mod entries;
mod expiry;
pub mod error;
pub mod index;
pub mod item;
mod logging;
pub mod pattern;
mod persist;
pub mod rect;
pub(crate) mod registry;
pub(crate) mod spatial;
pub(crate) mod tree;
pub mod tx;

pub use comparator::{compare_items, desc, index_float, index_int, index_json, index_string, Comparator};
pub use config::{Config, OnExpired, OnExpiredSync, SyncPolicy};
pub use db::Database;
pub use error::{Error, Result};
pub use index::RectExtractor;
pub use item::{Item, ItemHandle, SetOptions};
pub use rect::{point, Rect};
pub use tx::Transaction;
