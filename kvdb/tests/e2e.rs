//! End-to-end scenarios exercising the public API the way an embedding
//! application would: through `Database::open`/`view`/`update` only, never
//! reaching into crate internals.

use std::sync::{Arc, Barrier};
use std::time::Duration;

use kvdb::{comparator, Database, Error, Rect, SetOptions};
use pretty_assertions::assert_eq;
use serial_test::serial;

// Waits out a real multi-second TTL; kept off the parallel test grid so it
// doesn't compete with other tests' background workers for CPU time.
#[test]
#[serial]
fn ttl_expiry_survives_a_close_and_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.db");

    let db = Database::open(&path).unwrap();
    db.update(|tx| {
        tx.set(b"key1", b"val1", SetOptions::with_ttl(Duration::from_secs(3)))?;
        Ok(())
    })
    .unwrap();
    db.close().unwrap();

    std::thread::sleep(Duration::from_secs(4));

    let db = Database::open(&path).unwrap();
    let result = db.view(|tx| tx.get(b"key1").map(|v| v.value.clone()));
    assert!(matches!(result, Err(Error::NotFound)));
}

#[test]
fn rollback_restores_the_prior_value() {
    let db = Database::open_memory();
    db.update(|tx| {
        tx.set(b"hello", b"planet", SetOptions::none())?;
        Ok(())
    })
    .unwrap();

    let outcome = db.update(|tx| {
        tx.set(b"hello", b"world", SetOptions::none())?;
        Err(Error::InvalidOperation)
    });
    assert!(outcome.is_err());

    let value = db.view(|tx| tx.get(b"hello").map(|v| v.value.clone())).unwrap();
    assert_eq!(value, b"planet");
}

#[test]
fn case_insensitive_index_orders_names_ignoring_case() {
    let db = Database::open_memory();
    db.create_index("names", b"*", false, vec![comparator::index_string(true)]).unwrap();

    db.update(|tx| {
        for (k, v) in [("1", "Tom"), ("2", "Janet"), ("3", "Carol"), ("4", "Alan"), ("5", "Sam"), ("6", "Melinda")] {
            tx.set(k.as_bytes(), v.as_bytes(), SetOptions::none())?;
        }
        Ok(())
    })
    .unwrap();

    let mut order = Vec::new();
    db.view(|tx| {
        tx.ascend_index("names", |item| {
            order.push(String::from_utf8(item.key.clone()).unwrap());
            true
        })
    })
    .unwrap();

    assert_eq!(order, vec!["4", "3", "2", "6", "5", "1"]);
}

#[test]
fn composite_index_with_descending_secondary_orders_by_last_then_age_desc() {
    let db = Database::open_memory();
    db.create_index(
        "by_last_then_age",
        b"*",
        false,
        vec![comparator::index_json("name.last"), comparator::desc(comparator::index_json("age"))],
    )
    .unwrap();

    let people = [
        ("anderson52", r#"{"name":{"last":"Anderson"},"age":52}"#),
        ("anderson51", r#"{"name":{"last":"Anderson"},"age":51}"#),
        ("cooper28", r#"{"name":{"last":"Cooper"},"age":28}"#),
        ("johnson38", r#"{"name":{"last":"Johnson"},"age":38}"#),
        ("prichard47", r#"{"name":{"last":"Prichard"},"age":47}"#),
        ("prichard44", r#"{"name":{"last":"Prichard"},"age":44}"#),
    ];
    db.update(|tx| {
        for (k, v) in people {
            tx.set(k.as_bytes(), v.as_bytes(), SetOptions::none())?;
        }
        Ok(())
    })
    .unwrap();

    let mut order = Vec::new();
    db.view(|tx| {
        tx.ascend_index("by_last_then_age", |item| {
            order.push(String::from_utf8(item.key.clone()).unwrap());
            true
        })
    })
    .unwrap();

    assert_eq!(order, vec!["anderson52", "anderson51", "cooper28", "johnson38", "prichard47", "prichard44"]);
}

#[test]
fn spatial_intersection_returns_every_overlapping_point() {
    let db = Database::open_memory();
    db.create_spatial_index(
        "fleet",
        b"fleet:*:pos",
        false,
        Arc::new(|value: &[u8]| Rect::parse(std::str::from_utf8(value).ok()?).ok()),
    )
    .unwrap();

    db.update(|tx| {
        tx.set(b"fleet:1:pos", b"[-115 32]", SetOptions::none())?;
        tx.set(b"fleet:2:pos", b"[-114 34]", SetOptions::none())?;
        tx.set(b"fleet:3:pos", b"[-113 35]", SetOptions::none())?;
        tx.set(b"fleet:4:pos", b"[10 10]", SetOptions::none())?;
        Ok(())
    })
    .unwrap();

    let query = Rect::parse("[-117 30],[-112 36]").unwrap();
    let mut hits = Vec::new();
    db.view(|tx| {
        tx.intersects("fleet", &query, |item| {
            hits.push(String::from_utf8(item.key.clone()).unwrap());
            true
        })
    })
    .unwrap();

    hits.sort();
    assert_eq!(hits, vec!["fleet:1:pos", "fleet:2:pos", "fleet:3:pos"]);
}

#[test]
fn online_shrink_preserves_data_under_a_concurrent_second_request() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.db");
    let db = Database::open(&path).unwrap();

    db.update(|tx| {
        for i in 0..10_000 {
            tx.set(format!("k{i:05}").as_bytes(), b"v", SetOptions::none())?;
        }
        Ok(())
    })
    .unwrap();

    db.update(|tx| {
        for i in 0..100 {
            tx.delete(format!("k{i:05}").as_bytes())?;
        }
        Ok(())
    })
    .unwrap();

    let barrier = Arc::new(Barrier::new(2));
    let db_a = db.clone();
    let barrier_a = barrier.clone();
    let a = std::thread::spawn(move || {
        barrier_a.wait();
        db_a.shrink()
    });
    let db_b = db.clone();
    let barrier_b = barrier.clone();
    let b = std::thread::spawn(move || {
        barrier_b.wait();
        db_b.shrink()
    });

    let result_a = a.join().unwrap();
    let result_b = b.join().unwrap();

    // Exactly one of the two racing requests may observe the other's
    // in-progress shrink; both are acceptable as long as at least one
    // succeeds and neither returns anything else.
    let outcomes = [result_a, result_b];
    assert!(outcomes.iter().any(|r| r.is_ok()));
    assert!(outcomes.iter().all(|r| matches!(r, Ok(()) | Err(Error::ShrinkInProcess))));

    db.close().unwrap();

    let db = Database::open(&path).unwrap();
    let len = db.view(|tx| tx.len()).unwrap();
    assert_eq!(len, 9_900);
    db.view(|tx| {
        assert!(matches!(tx.get(b"k00000"), Err(Error::NotFound)));
        assert_eq!(tx.get(b"k00100").unwrap().value, b"v");
        assert_eq!(tx.get(b"k09999").unwrap().value, b"v");
        Ok(())
    })
    .unwrap();
}
