//! Secondary indexes: named membership rules (a key pattern) paired with
//! either a B-tree comparator chain or an R-tree rectangle extractor.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::comparator::Comparator;
use crate::entries::IndexEntry;
use crate::item::ItemHandle;
use crate::pattern;
use crate::rect::Rect;
use crate::spatial::SpatialTree;
use crate::tree::{self, Direction};

/// Extracts a rectangle from a value, or `None` if the value doesn't carry
/// spatial data this index cares about (such items are simply absent from
/// the spatial container, the same way a non-matching key is absent from
/// any index's container).
pub type RectExtractor = Arc<dyn Fn(&[u8]) -> Option<Rect> + Send + Sync>;

pub enum Container {
    /// A "null" index (zero comparators) still gets a container, ordered by
    /// key fallback alone — spec.md §4.2.
    Ordered {
        comparators: Arc<Vec<Comparator>>,
        tree: BTreeSet<IndexEntry>,
    },
    Spatial {
        rect_of: RectExtractor,
        tree: SpatialTree,
    },
}

pub struct Index {
    pub name: String,
    pub pattern: Vec<u8>,
    pub case_insensitive_pattern: bool,
    pub container: Container,
}

impl Index {
    pub fn new_ordered(
        name: String,
        pattern: Vec<u8>,
        case_insensitive_pattern: bool,
        comparators: Vec<Comparator>,
    ) -> Index {
        Index {
            name,
            pattern,
            case_insensitive_pattern,
            container: Container::Ordered {
                comparators: Arc::new(comparators),
                tree: BTreeSet::new(),
            },
        }
    }

    pub fn new_spatial(
        name: String,
        pattern: Vec<u8>,
        case_insensitive_pattern: bool,
        rect_of: RectExtractor,
    ) -> Index {
        Index {
            name,
            pattern,
            case_insensitive_pattern,
            container: Container::Spatial {
                rect_of,
                tree: SpatialTree::new(),
            },
        }
    }

    pub fn is_spatial(&self) -> bool {
        matches!(self.container, Container::Spatial { .. })
    }

    /// Byte-level wildcard match against this index's pattern, honoring the
    /// per-index case-insensitivity flag.
    pub fn key_matches(&self, key: &[u8]) -> bool {
        if pattern::is_match_all(&self.pattern) {
            return true;
        }
        if self.case_insensitive_pattern {
            let lower_key = key.to_ascii_lowercase();
            let lower_pat = self.pattern.to_ascii_lowercase();
            pattern::matches(&lower_pat, &lower_key)
        } else {
            pattern::matches(&self.pattern, key)
        }
    }

    /// Inserts `item` into this index's container if its key matches the
    /// pattern (and, for spatial indexes, the extractor yields a rect).
    pub fn insert_if_matches(&mut self, item: &ItemHandle) {
        if !self.key_matches(&item.key) {
            return;
        }
        match &mut self.container {
            Container::Ordered { comparators, tree } => {
                tree.insert(IndexEntry::real(item.clone(), comparators.clone()));
            }
            Container::Spatial { rect_of, tree } => {
                if let Some(rect) = rect_of(&item.value) {
                    tree.insert(item.clone(), rect);
                }
            }
        }
    }

    /// Removes `item`'s entry from this index's container, if present.
    pub fn remove(&mut self, item: &ItemHandle) {
        match &mut self.container {
            Container::Ordered { comparators, tree } => {
                let probe = IndexEntry::probe(&item.value, &item.key, comparators.clone());
                tree.remove(&probe);
            }
            Container::Spatial { rect_of, tree } => {
                if let Some(rect) = rect_of(&item.value) {
                    tree.remove(&item.key, &rect);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        match &self.container {
            Container::Ordered { tree, .. } => tree.len(),
            Container::Spatial { tree, .. } => tree.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Empties this index's container in place, keeping its name, pattern,
    /// and extractor/comparators — used by `Database::load` to rebuild every
    /// index's membership from a freshly loaded dataset.
    pub fn clear(&mut self) {
        match &mut self.container {
            Container::Ordered { tree, .. } => tree.clear(),
            Container::Spatial { tree, .. } => *tree = SpatialTree::new(),
        }
    }

    /// Bounded, directional scan over this index's ordered container. Bounds
    /// are interpreted as *values*; `None` means unbounded on that side.
    pub fn scan_ordered<F: FnMut(&ItemHandle) -> bool>(
        &self,
        direction: Direction,
        lower: std::ops::Bound<&[u8]>,
        upper: std::ops::Bound<&[u8]>,
        mut f: F,
    ) {
        if let Container::Ordered { comparators, tree } = &self.container {
            // A pivot value can be shared by any number of real entries, each
            // with a distinct key, so the bound sentinel has to sit below or
            // above the whole tied group rather than at one particular key.
            // An inclusive lower bound and an exclusive upper bound must
            // include the group, so they sort below it (`probe_low`); an
            // exclusive lower bound and an inclusive upper bound must sort
            // above it (`probe_high`) so the group is excluded/included past
            // it respectively.
            use std::ops::Bound;
            let lower = match lower {
                Bound::Included(v) => Bound::Included(IndexEntry::probe_low(v, comparators.clone())),
                Bound::Excluded(v) => Bound::Excluded(IndexEntry::probe_high(v, comparators.clone())),
                Bound::Unbounded => Bound::Unbounded,
            };
            let upper = match upper {
                Bound::Included(v) => Bound::Included(IndexEntry::probe_high(v, comparators.clone())),
                Bound::Excluded(v) => Bound::Excluded(IndexEntry::probe_low(v, comparators.clone())),
                Bound::Unbounded => Bound::Unbounded,
            };
            tree::scan(tree, direction, lower, upper, |entry| f(&entry.item));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::index_string;
    use crate::item::Item;

    fn handle(key: &str, value: &str) -> ItemHandle {
        Arc::new(Item::new(key.as_bytes().to_vec(), value.as_bytes().to_vec(), None))
    }

    #[test]
    fn pattern_gates_membership() {
        let mut idx = Index::new_ordered(
            "names".into(),
            b"user:*".to_vec(),
            false,
            vec![index_string(false)],
        );
        idx.insert_if_matches(&handle("user:1", "a"));
        idx.insert_if_matches(&handle("other:1", "b"));
        assert_eq!(idx.len(), 1);
    }

    #[test]
    fn case_insensitive_ordering_ties_break_on_key() {
        let mut idx = Index::new_ordered("names".into(), b"*".to_vec(), false, vec![index_string(true)]);
        for (k, v) in [("4", "Alan"), ("3", "Carol"), ("2", "Janet"), ("6", "Melinda"), ("5", "Sam"), ("1", "Tom")] {
            idx.insert_if_matches(&handle(k, v));
        }
        let mut seen = Vec::new();
        idx.scan_ordered(Direction::Ascending, std::ops::Bound::Unbounded, std::ops::Bound::Unbounded, |item| {
            seen.push(String::from_utf8(item.key.clone()).unwrap());
            true
        });
        assert_eq!(seen, vec!["4", "3", "2", "6", "5", "1"]);
    }

    /// Three keys tie on value "b". Every bound orientation must treat them
    /// as a single group: an inclusive bound on "b" keeps all three, an
    /// exclusive bound on "b" drops all three.
    fn tied_value_index() -> Index {
        let mut idx = Index::new_ordered("v".into(), b"*".to_vec(), false, vec![index_string(false)]);
        for (k, v) in [("k1", "a"), ("k2", "b"), ("k3", "b"), ("k4", "b"), ("k5", "c")] {
            idx.insert_if_matches(&handle(k, v));
        }
        idx
    }

    fn scan_keys(idx: &Index, direction: Direction, lower: std::ops::Bound<&[u8]>, upper: std::ops::Bound<&[u8]>) -> Vec<String> {
        let mut seen = Vec::new();
        idx.scan_ordered(direction, lower, upper, |item| {
            seen.push(String::from_utf8(item.key.clone()).unwrap());
            true
        });
        seen.sort();
        seen
    }

    #[test]
    fn ascending_inclusive_lower_keeps_whole_tied_group() {
        let idx = tied_value_index();
        let seen = scan_keys(&idx, Direction::Ascending, std::ops::Bound::Included(b"b"), std::ops::Bound::Unbounded);
        assert_eq!(seen, vec!["k2", "k3", "k4", "k5"]);
    }

    #[test]
    fn ascending_exclusive_upper_drops_whole_tied_group() {
        let idx = tied_value_index();
        let seen = scan_keys(&idx, Direction::Ascending, std::ops::Bound::Unbounded, std::ops::Bound::Excluded(b"b"));
        assert_eq!(seen, vec!["k1"]);
    }

    #[test]
    fn descending_inclusive_upper_keeps_whole_tied_group() {
        let idx = tied_value_index();
        let seen = scan_keys(&idx, Direction::Descending, std::ops::Bound::Unbounded, std::ops::Bound::Included(b"b"));
        assert_eq!(seen, vec!["k1", "k2", "k3", "k4"]);
    }

    #[test]
    fn descending_exclusive_lower_drops_whole_tied_group() {
        let idx = tied_value_index();
        let seen = scan_keys(&idx, Direction::Descending, std::ops::Bound::Excluded(b"b"), std::ops::Bound::Unbounded);
        assert_eq!(seen, vec!["k5"]);
    }
}
