//! The spatial container: a set of axis-aligned hyper-rectangles (1–20
//! dimensions) queryable by intersection, built on `rstar::RTree`.
//!
//! `rstar::Point` requires a fixed `DIMENSIONS` constant per type, but
//! spec.md allows a spatial index's rectangles to range from 1 to 20
//! dimensions. We resolve this by padding every rectangle out to
//! `MAX_DIMENSIONS` with the same sentinel (`0.0`) on both corners of the
//! unused axes: since `min == max == 0.0` there for every rectangle in the
//! tree, those axes always "overlap" in an AABB intersection test and so
//! never affect the result — only the caller's real axes matter. All
//! rectangles stored in one spatial index come from the same `rect_of`
//! extractor and therefore share real dimensionality, so this is purely an
//! implementation encoding, invisible to callers.

use rstar::{RTree, RTreeObject, AABB};

use crate::item::ItemHandle;
use crate::rect::{Rect, MAX_DIMENSIONS};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PaddedPoint(pub [f64; MAX_DIMENSIONS]);

impl rstar::Point for PaddedPoint {
    type Scalar = f64;
    const DIMENSIONS: usize = MAX_DIMENSIONS;

    fn generate(generator: impl Fn(usize) -> Self::Scalar) -> Self {
        let mut arr = [0.0f64; MAX_DIMENSIONS];
        for (i, slot) in arr.iter_mut().enumerate() {
            *slot = generator(i);
        }
        PaddedPoint(arr)
    }

    fn nth(&self, index: usize) -> Self::Scalar {
        self.0[index]
    }

    fn nth_mut(&mut self, index: usize) -> &mut Self::Scalar {
        &mut self.0[index]
    }
}

fn pad(coords: &[f64]) -> [f64; MAX_DIMENSIONS] {
    let mut arr = [0.0f64; MAX_DIMENSIONS];
    arr[..coords.len()].copy_from_slice(coords);
    arr
}

fn envelope_of(rect: &Rect) -> AABB<PaddedPoint> {
    AABB::from_corners(PaddedPoint(pad(&rect.min)), PaddedPoint(pad(&rect.max)))
}

/// One member of a spatial index: the item plus the rectangle its value was
/// extracted into at insertion time.
#[derive(Clone)]
pub struct SpatialEntry {
    pub item: ItemHandle,
    pub rect: Rect,
}

impl PartialEq for SpatialEntry {
    fn eq(&self, other: &Self) -> bool {
        self.item.key == other.item.key
    }
}

impl RTreeObject for SpatialEntry {
    type Envelope = AABB<PaddedPoint>;

    fn envelope(&self) -> Self::Envelope {
        envelope_of(&self.rect)
    }
}

/// A spatial index's container.
#[derive(Default)]
pub struct SpatialTree {
    tree: RTree<SpatialEntry>,
}

impl SpatialTree {
    pub fn new() -> Self {
        SpatialTree { tree: RTree::new() }
    }

    pub fn insert(&mut self, item: ItemHandle, rect: Rect) {
        self.tree.insert(SpatialEntry { item, rect });
    }

    /// Removes the entry for `key`, given the rectangle it was inserted
    /// with (rstar locates by envelope + equality, so the caller must supply
    /// the rect the item was indexed under).
    pub fn remove(&mut self, key: &[u8], rect: &Rect) {
        let probe = SpatialEntry {
            item: std::sync::Arc::new(crate::item::Item::new(key.to_vec(), Vec::new(), None)),
            rect: rect.clone(),
        };
        self.tree.remove(&probe);
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Invokes `f` for every entry whose rectangle intersects `query`,
    /// stopping early if `f` returns false.
    pub fn intersects<F: FnMut(&ItemHandle) -> bool>(&self, query: &Rect, mut f: F) {
        let envelope = envelope_of(query);
        for entry in self.tree.locate_in_envelope_intersecting(&envelope) {
            if !f(&entry.item) {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::Item;
    use std::sync::Arc;

    fn handle(key: &str) -> ItemHandle {
        Arc::new(Item::new(key.as_bytes().to_vec(), Vec::new(), None))
    }

    #[test]
    fn intersection_query_finds_overlapping_points() {
        let mut tree = SpatialTree::new();
        tree.insert(handle("a"), Rect::point(vec![-116.5, 33.0]));
        tree.insert(handle("b"), Rect::point(vec![-113.2, 34.5]));
        tree.insert(handle("c"), Rect::point(vec![50.0, 50.0]));

        let query = Rect::new(vec![-117.0, 30.0], vec![-112.0, 36.0]);
        let mut found = Vec::new();
        tree.intersects(&query, |item| {
            found.push(String::from_utf8(item.key.clone()).unwrap());
            true
        });
        found.sort();
        assert_eq!(found, vec!["a", "b"]);
    }

    #[test]
    fn remove_drops_entry_from_future_queries() {
        let mut tree = SpatialTree::new();
        let rect = Rect::point(vec![1.0, 1.0]);
        tree.insert(handle("x"), rect.clone());
        assert_eq!(tree.len(), 1);
        tree.remove(b"x", &rect);
        assert_eq!(tree.len(), 0);
    }

    #[test]
    fn callback_can_stop_early() {
        let mut tree = SpatialTree::new();
        for i in 0..5 {
            tree.insert(handle(&i.to_string()), Rect::point(vec![i as f64, 0.0]));
        }
        let query = Rect::new(vec![-100.0, -100.0], vec![100.0, 100.0]);
        let mut count = 0;
        tree.intersects(&query, |_| {
            count += 1;
            count < 2
        });
        assert_eq!(count, 2);
    }
}
