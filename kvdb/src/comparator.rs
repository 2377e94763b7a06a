//! Value comparators for ordered (B-tree) secondary indexes.
//!
//! A comparator is a strict "less than" predicate over two raw values:
//! `cmp(a, b) == true` means "a sorts before b". Composite indexes chain
//! several comparators; DESIGN.md calls this "comparator as data" — each
//! index carries its own `Vec<Comparator>` rather than dispatching through a
//! single global trait object hierarchy, so the B-tree container never needs
//! to know what comparison it is performing.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::item::Item;

/// `cmp(a, b)` is true iff `a` strictly sorts before `b`. Implementations
/// must be consistent (irreflexive, transitive) but need not handle every
/// input specially — malformed values should sort after well-formed ones
/// rather than panicking, since values are caller-controlled data.
pub type Comparator = Arc<dyn Fn(&[u8], &[u8]) -> bool + Send + Sync>;

/// Runs an index's comparator chain over two values alone, with no key
/// fallback. Entries that tie all the way through come back `Equal` — it is
/// up to the caller to decide what breaks the tie (a real item's key, or a
/// range-bound sentinel's position relative to the tied group).
pub fn compare_values(comparators: &[Comparator], a: &Item, b: &Item) -> Ordering {
    for cmp in comparators {
        if cmp(&a.value, &b.value) {
            return Ordering::Less;
        }
        if cmp(&b.value, &a.value) {
            return Ordering::Greater;
        }
        // tie on this comparator: fall through to the next one.
    }
    Ordering::Equal
}

/// Combines the effective ordering of an index's comparator list (empty for
/// a "null" index, whose container is ordered by key alone) with the key
/// fallback that spec.md requires for uniqueness.
pub fn compare_items(comparators: &[Comparator], a: &Item, b: &Item) -> Ordering {
    match compare_values(comparators, a, b) {
        Ordering::Equal => a.key.cmp(&b.key),
        other => other,
    }
}

/// Reverses a comparator, for use as a descending key inside a composite
/// index (spec.md's end-to-end scenario #4: `Desc(IndexJSON("age"))`).
pub fn desc(cmp: Comparator) -> Comparator {
    Arc::new(move |a, b| cmp(b, a))
}

/// Byte-wise (or ASCII case-insensitive) string ordering.
pub fn index_string(case_insensitive: bool) -> Comparator {
    if case_insensitive {
        Arc::new(|a, b| a.to_ascii_lowercase() < b.to_ascii_lowercase())
    } else {
        Arc::new(|a, b| a < b)
    }
}

fn parse_utf8(v: &[u8]) -> Option<&str> {
    std::str::from_utf8(v).ok()
}

/// Orders values as decimal integers. A value that doesn't parse sorts after
/// one that does.
pub fn index_int() -> Comparator {
    Arc::new(|a, b| {
        let pa = parse_utf8(a).and_then(|s| s.trim().parse::<i64>().ok());
        let pb = parse_utf8(b).and_then(|s| s.trim().parse::<i64>().ok());
        match (pa, pb) {
            (Some(x), Some(y)) => x < y,
            (None, Some(_)) => false,
            (Some(_), None) => true,
            (None, None) => false,
        }
    })
}

/// Orders values as floating point numbers, same sort-after-unparsable rule
/// as `index_int`.
pub fn index_float() -> Comparator {
    Arc::new(|a, b| {
        let pa = parse_utf8(a).and_then(|s| s.trim().parse::<f64>().ok());
        let pb = parse_utf8(b).and_then(|s| s.trim().parse::<f64>().ok());
        match (pa, pb) {
            (Some(x), Some(y)) => x < y,
            (None, Some(_)) => false,
            (Some(_), None) => true,
            (None, None) => false,
        }
    })
}

/// Orders values by a dotted JSON field path (e.g. `"name.last"`), treating
/// the value as a JSON document. Used only as one convenience ordering
/// function among many — the extraction itself is not part of the core
/// engine's hard-engineering scope (spec.md §1).
pub fn index_json(path: &str) -> Comparator {
    let path = path.to_string();
    Arc::new(move |a, b| {
        let va = extract_json_field(a, &path);
        let vb = extract_json_field(b, &path);
        match (va, vb) {
            (Some(x), Some(y)) => json_value_less(&x, &y),
            (None, Some(_)) => false,
            (Some(_), None) => true,
            (None, None) => false,
        }
    })
}

fn extract_json_field(value: &[u8], path: &str) -> Option<serde_json::Value> {
    let doc: serde_json::Value = serde_json::from_slice(value).ok()?;
    let mut cur = &doc;
    for part in path.split('.') {
        cur = cur.get(part)?;
    }
    Some(cur.clone())
}

fn json_value_less(a: &serde_json::Value, b: &serde_json::Value) -> bool {
    use serde_json::Value;
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x < y,
            _ => false,
        },
        (Value::String(x), Value::String(y)) => x < y,
        (Value::Bool(x), Value::Bool(y)) => !x & y,
        _ => a.to_string() < b.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(key: &str, value: &str) -> Item {
        Item::new(key.as_bytes().to_vec(), value.as_bytes().to_vec(), None)
    }

    #[test]
    fn case_insensitive_string_ties_break_on_key() {
        let cmps = vec![index_string(true)];
        let a = item("4", "Hello");
        let b = item("1", "hello");
        // values compare equal case-insensitively, key decides
        assert_eq!(compare_items(&cmps, &a, &b), Ordering::Greater);
    }

    #[test]
    fn composite_descending_secondary() {
        let cmps = vec![index_json("last"), desc(index_json("age"))];
        let anderson52 = item("k1", r#"{"last":"Anderson","age":52}"#);
        let anderson51 = item("k2", r#"{"last":"Anderson","age":51}"#);
        assert_eq!(
            compare_items(&cmps, &anderson52, &anderson51),
            Ordering::Less
        );
    }

    #[test]
    fn null_index_falls_back_to_key_only() {
        let cmps: Vec<Comparator> = vec![];
        let a = item("a", "whatever");
        let b = item("b", "whatever");
        assert_eq!(compare_items(&cmps, &a, &b), Ordering::Less);
    }

    #[test]
    fn int_comparator_sorts_unparsable_last() {
        let cmps = vec![index_int()];
        let good = item("k1", "5");
        let bad = item("k2", "not a number");
        assert_eq!(compare_items(&cmps, &good, &bad), Ordering::Less);
    }
}
