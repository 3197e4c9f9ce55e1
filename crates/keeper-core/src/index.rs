//! Score-ordered index of queue items.
//!
//! Each id owns exactly one score in `scores`; `order` holds the same ids
//! keyed by `(score, id)` so iteration is ascending by score with ties broken
//! by id. Both maps share the id allocation through `Arc<str>`. Every public
//! mutation updates both sides before returning, so the ordered view is
//! always a valid sort and both sides always hold the same id set.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::models::QueueItem;

#[derive(Debug, Default, Clone)]
pub struct ScoredIndex {
    scores: HashMap<Arc<str>, i64>,
    order: BTreeSet<(i64, Arc<str>)>,
}

impl ScoredIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from `items`. Later duplicates of an id win.
    pub fn from_items<I>(items: I) -> Self
    where
        I: IntoIterator<Item = QueueItem>,
    {
        let mut index = Self::new();
        for item in items {
            index.upsert(&item.id, item.score);
        }
        index
    }

    /// Insert `id`, or move it to `score` if it is already present.
    pub fn upsert(&mut self, id: &str, score: i64) {
        if let Some((key, current)) = self.scores.get_key_value(id) {
            if *current == score {
                return;
            }
            let key = Arc::clone(key);
            self.order.remove(&(*current, Arc::clone(&key)));
            self.order.insert((score, Arc::clone(&key)));
            self.scores.insert(key, score);
        } else {
            let key: Arc<str> = Arc::from(id);
            self.order.insert((score, Arc::clone(&key)));
            self.scores.insert(key, score);
        }
    }

    /// Discard every entry and install `items` instead.
    pub fn replace_all<I>(&mut self, items: I)
    where
        I: IntoIterator<Item = QueueItem>,
    {
        *self = Self::from_items(items);
    }

    /// Remove `id`, returning its score if it was present.
    pub fn remove(&mut self, id: &str) -> Option<i64> {
        let (key, score) = self.scores.remove_entry(id)?;
        self.order.remove(&(score, key));
        Some(score)
    }

    pub fn get(&self, id: &str) -> Option<i64> {
        self.scores.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.scores.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Raise each id this index shares with `other` to the higher of the two
    /// scores. Ids only `other` holds are not added.
    pub fn keep_newer_from(&mut self, other: &ScoredIndex) {
        for (id, score) in other.iter() {
            if self.get(id).is_some_and(|mine| mine < score) {
                self.upsert(id, score);
            }
        }
    }

    /// The `n` lowest-scored items, ascending.
    pub fn candidates(&self, n: usize) -> impl Iterator<Item = (&str, i64)> + '_ {
        self.iter().take(n)
    }

    /// All items in ascending score order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> + '_ {
        self.order.iter().map(|(score, id)| (id.as_ref(), *score))
    }

    /// The item at `position` in ascending score order.
    pub fn nth(&self, position: usize) -> Option<(&str, i64)> {
        self.iter().nth(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn assert_consistent(index: &ScoredIndex) {
        let mapped: HashSet<&str> = index.scores.keys().map(|k| k.as_ref()).collect();
        let ordered: HashSet<&str> = index.order.iter().map(|(_, id)| id.as_ref()).collect();
        assert_eq!(mapped, ordered, "map and ordered view diverged");
        assert_eq!(index.scores.len(), index.order.len(), "duplicate ids");

        let scores: Vec<i64> = index.iter().map(|(_, s)| s).collect();
        assert!(
            scores.windows(2).all(|w| w[0] <= w[1]),
            "not sorted ascending: {scores:?}"
        );
        for (id, score) in index.iter() {
            assert_eq!(index.get(id), Some(score));
        }
    }

    fn ids(index: &ScoredIndex) -> Vec<&str> {
        index.iter().map(|(id, _)| id).collect()
    }

    #[test]
    fn upsert_inserts_in_score_order() {
        let mut index = ScoredIndex::new();
        index.upsert("c", 30);
        index.upsert("a", 10);
        index.upsert("b", 20);
        assert_eq!(ids(&index), vec!["a", "b", "c"]);
        assert_consistent(&index);
    }

    #[test]
    fn upsert_existing_id_moves_it_without_duplicating() {
        let mut index = ScoredIndex::from_items([
            QueueItem::new("a", 10),
            QueueItem::new("b", 20),
            QueueItem::new("c", 30),
        ]);
        index.upsert("a", 40);
        assert_eq!(index.len(), 3);
        assert_eq!(ids(&index), vec!["b", "c", "a"]);
        assert_eq!(index.get("a"), Some(40));
        assert_consistent(&index);
    }

    #[test]
    fn upsert_same_score_is_a_no_op() {
        let mut index = ScoredIndex::from_items([QueueItem::new("a", 10)]);
        index.upsert("a", 10);
        assert_eq!(index.len(), 1);
        assert_consistent(&index);
    }

    #[test]
    fn equal_scores_break_ties_by_id() {
        let index = ScoredIndex::from_items([
            QueueItem::new("b", 5),
            QueueItem::new("a", 5),
            QueueItem::new("c", 1),
        ]);
        assert_eq!(ids(&index), vec!["c", "a", "b"]);
    }

    #[test]
    fn replace_all_discards_previous_entries() {
        let mut index = ScoredIndex::from_items([QueueItem::new("old", 1)]);
        index.replace_all([QueueItem::new("x", 3), QueueItem::new("y", 2)]);
        assert!(!index.contains("old"));
        assert_eq!(ids(&index), vec!["y", "x"]);
        assert_consistent(&index);
    }

    #[test]
    fn replace_all_keeps_last_duplicate() {
        let mut index = ScoredIndex::new();
        index.replace_all([QueueItem::new("x", 3), QueueItem::new("x", 7)]);
        assert_eq!(index.len(), 1);
        assert_eq!(index.get("x"), Some(7));
        assert_consistent(&index);
    }

    #[test]
    fn keep_newer_from_raises_shared_ids_only() {
        let mut fresh = ScoredIndex::from_items([
            QueueItem::new("a", 10),
            QueueItem::new("b", 20),
        ]);
        let current = ScoredIndex::from_items([
            QueueItem::new("a", 99),
            QueueItem::new("b", 5),
            QueueItem::new("gone", 1),
        ]);
        fresh.keep_newer_from(&current);
        assert_eq!(fresh.get("a"), Some(99));
        assert_eq!(fresh.get("b"), Some(20));
        assert!(!fresh.contains("gone"));
        assert_consistent(&fresh);
    }

    #[test]
    fn remove_drops_from_both_views() {
        let mut index = ScoredIndex::from_items([QueueItem::new("a", 1), QueueItem::new("b", 2)]);
        assert_eq!(index.remove("a"), Some(1));
        assert_eq!(index.remove("a"), None);
        assert_eq!(ids(&index), vec!["b"]);
        assert_consistent(&index);
    }

    #[test]
    fn candidates_are_the_lowest_scores() {
        let index = ScoredIndex::from_items((0..10).rev().map(|i| QueueItem::new(format!("i{i}"), i)));
        let low: Vec<i64> = index.candidates(3).map(|(_, s)| s).collect();
        assert_eq!(low, vec![0, 1, 2]);
        assert_eq!(index.candidates(50).count(), 10);
    }

    #[test]
    fn invariants_hold_after_mixed_operations() {
        let mut index = ScoredIndex::new();
        for round in 0..5i64 {
            for i in 0..20i64 {
                index.upsert(&format!("id-{}", i % 7), (i * 37 + round * 11) % 23);
                assert_consistent(&index);
            }
            if round == 2 {
                index.replace_all((0..4).map(|i| QueueItem::new(format!("id-{i}"), -i)));
                assert_consistent(&index);
            }
            index.remove("id-3");
            assert_consistent(&index);
        }
    }

    #[test]
    fn empty_index_reports_nothing() {
        let index = ScoredIndex::new();
        assert!(index.is_empty());
        assert_eq!(index.nth(0), None);
        assert_eq!(index.candidates(5).count(), 0);
    }
}
