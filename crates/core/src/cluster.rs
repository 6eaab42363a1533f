//! Grouping near-duplicates: every pair scoring strictly above the
//! threshold is joined, and connected groups of two or more come out.
//!
//! Pairwise scoring is O(n²) in the number of images. Run it over one
//! concept or a hand-picked selection, never over a whole library.

use crate::hashing::ImageHashes;
use std::collections::HashMap;
use std::hash::Hash;

/// Disjoint sets keyed by item identity, with path-compressed `find`.
#[derive(Debug, Clone)]
pub struct UnionFind<T> {
    parent: HashMap<T, T>,
    order: Vec<T>,
}

impl<T: Clone + Eq + Hash> UnionFind<T> {
    pub fn new(items: impl IntoIterator<Item = T>) -> Self {
        let mut parent = HashMap::new();
        let mut order = Vec::new();
        for item in items {
            if !parent.contains_key(&item) {
                parent.insert(item.clone(), item.clone());
                order.push(item);
            }
        }
        Self { parent, order }
    }

    /// Root of `item`'s set, or `None` for an unknown item.
    pub fn find(&mut self, item: &T) -> Option<T> {
        let mut root = item.clone();
        loop {
            let up = self.parent.get(&root)?.clone();
            if up == root {
                break;
            }
            root = up;
        }
        let mut cur = item.clone();
        while cur != root {
            let next = self.parent.insert(cur, root.clone())?;
            cur = next;
        }
        Some(root)
    }

    pub fn union(&mut self, a: &T, b: &T) {
        if let (Some(ra), Some(rb)) = (self.find(a), self.find(b)) {
            if ra != rb {
                self.parent.insert(ra, rb);
            }
        }
    }

    pub fn connected(&mut self, a: &T, b: &T) -> bool {
        match (self.find(a), self.find(b)) {
            (Some(ra), Some(rb)) => ra == rb,
            _ => false,
        }
    }

    /// Sets with at least two members, each in insertion order, ordered by
    /// their first member.
    pub fn groups(&mut self) -> Vec<Vec<T>> {
        let mut slot: HashMap<T, usize> = HashMap::new();
        let mut groups: Vec<Vec<T>> = Vec::new();
        for item in self.order.clone() {
            let Some(root) = self.find(&item) else {
                continue;
            };
            let idx = *slot.entry(root).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[idx].push(item);
        }
        groups.retain(|g| g.len() >= 2);
        groups
    }
}

/// Clusters `items` by `score`, joining pairs scoring above `threshold`.
pub fn cluster<T, F>(items: &[T], threshold: f64, mut score: F) -> Vec<Vec<usize>>
where
    F: FnMut(&T, &T) -> f64,
{
    let mut sets = UnionFind::new(0..items.len());
    for i in 0..items.len() {
        for j in (i + 1)..items.len() {
            if score(&items[i], &items[j]) > threshold {
                sets.union(&i, &j);
            }
        }
    }
    sets.groups()
}

/// Clusters keyed hashes by their fused score.
pub fn cluster_hashes<K: Clone>(hashes: &[(K, ImageHashes)], threshold: f64) -> Vec<Vec<K>> {
    cluster(hashes, threshold, |a, b| a.1.fuse_score(&b.1))
        .into_iter()
        .map(|group| group.into_iter().map(|i| hashes[i].0.clone()).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clusters_are_transitive() {
        let items = ["a", "b", "c"];
        let groups = cluster(&items, 0.5, |x, y| match (*x, *y) {
            ("a", "b") | ("b", "c") => 0.9,
            _ => 0.2,
        });
        assert_eq!(groups, vec![vec![0, 1, 2]]);
    }

    #[test]
    fn threshold_is_strict_and_singletons_drop() {
        let items = [1, 2, 3];
        let groups = cluster(&items, 0.5, |x, y| if *x == 1 && *y == 2 { 0.5 } else { 0.1 });
        assert!(groups.is_empty());
    }

    #[test]
    fn union_find_compresses_and_groups() {
        let mut uf = UnionFind::new(["a", "b", "c", "d", "e"]);
        uf.union(&"a", &"b");
        uf.union(&"d", &"e");
        uf.union(&"b", &"e");
        assert!(uf.connected(&"a", &"d"));
        assert!(!uf.connected(&"a", &"c"));
        assert_eq!(uf.find(&"zzz"), None);
        assert_eq!(uf.groups(), vec![vec!["a", "b", "d", "e"]]);
    }
}
