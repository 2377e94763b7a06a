//! Walks through the everyday shape of the API: opening a file-backed
//! database, writing inside a managed transaction, an ordered secondary
//! index over a JSON field, a TTL that survives a reopen, and a rollback.

use std::time::Duration;

use kvdb::{comparator, Database, SetOptions};

fn main() {
    env_logger::init();

    let dir = tempdir::TempDir::new("kvdb-basics").expect("create temp dir");
    let path = dir.path().join("basics.db");

    let db = Database::open(&path).expect("open database");

    db.create_index("by_last_name", b"user:*", true, vec![comparator::index_string(true)])
        .expect("create index");

    db.update(|tx| {
        tx.set(b"user:1", b"Tom", SetOptions::none())?;
        tx.set(b"user:2", b"Janet", SetOptions::none())?;
        tx.set(b"user:3", b"Carol", SetOptions::none())?;
        tx.set(b"session:1", b"ephemeral", SetOptions::with_ttl(Duration::from_secs(60)))?;
        Ok(())
    })
    .expect("seed data");

    println!("users in name order:");
    db.view(|tx| {
        tx.ascend_index("by_last_name", |item| {
            println!("  {} = {}", String::from_utf8_lossy(&item.key), String::from_utf8_lossy(&item.value));
            true
        })
    })
    .expect("scan index");

    let attempted = db.update(|tx| {
        tx.set(b"user:1", b"Thomas", SetOptions::none())?;
        Err(kvdb::Error::InvalidOperation)
    });
    assert!(attempted.is_err());

    let tom = db.view(|tx| tx.get(b"user:1").map(|v| v.value.clone())).expect("rolled back read");
    println!("user:1 after rolled-back update is still {}", String::from_utf8_lossy(&tom));

    db.close().expect("close database");

    let db = Database::open(&path).expect("reopen database");
    let count = db.view(|tx| tx.len()).expect("count");
    println!("reopened database has {count} item(s)");
}
