use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{KeeperError, Result};
use crate::index::ScoredIndex;

/// Default number of stalest items a retrieval picks from.
pub const DEFAULT_WINDOW: usize = 5;

/// Picks which item a retrieval serves.
///
/// The choice is uniform over the `window` lowest-scored items, or over the
/// whole index when it is no larger than the window. The most recently served
/// id is left out of the draw whenever anything else is eligible, so a box is
/// never handed out twice in a row while another one exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionPolicy {
    window: usize,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl SelectionPolicy {
    /// A window of zero is treated as one.
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Id of the item to serve from `index`.
    pub fn select<'a, R: Rng + ?Sized>(
        &self,
        index: &'a ScoredIndex,
        recent: Option<&str>,
        rng: &mut R,
    ) -> Result<&'a str> {
        if index.is_empty() {
            return Err(KeeperError::EmptyPool);
        }
        let mut eligible: Vec<&'a str> = index
            .candidates(self.window)
            .map(|(id, _)| id)
            .filter(|id| Some(*id) != recent)
            .collect();
        if eligible.is_empty() {
            // A window of one can hold nothing but the recent id.
            let next_stalest = index
                .iter()
                .map(|(id, _)| id)
                .find(|id| Some(*id) != recent);
            eligible.extend(next_stalest.or_else(|| index.nth(0).map(|(id, _)| id)));
        }
        eligible
            .choose(rng)
            .copied()
            .ok_or(KeeperError::EmptyPool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QueueItem;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn seeded() -> StdRng {
        StdRng::seed_from_u64(0x5ec7e7)
    }

    fn abc() -> ScoredIndex {
        ScoredIndex::from_items([
            QueueItem::new("a", 10),
            QueueItem::new("b", 20),
            QueueItem::new("c", 30),
        ])
    }

    #[test]
    fn empty_index_is_empty_pool() {
        let index = ScoredIndex::new();
        let err = SelectionPolicy::default()
            .select(&index, None, &mut seeded())
            .unwrap_err();
        assert!(matches!(err, KeeperError::EmptyPool));
    }

    #[test]
    fn small_index_can_serve_every_item() {
        let index = abc();
        let policy = SelectionPolicy::default();
        let mut rng = seeded();
        let seen: HashSet<&str> = (0..200)
            .map(|_| policy.select(&index, None, &mut rng).unwrap())
            .collect();
        assert_eq!(seen, HashSet::from(["a", "b", "c"]));
    }

    #[test]
    fn recent_id_is_skipped_when_alternatives_exist() {
        let index = abc();
        let policy = SelectionPolicy::default();
        let mut rng = seeded();
        let seen: HashSet<&str> = (0..200)
            .map(|_| policy.select(&index, Some("a"), &mut rng).unwrap())
            .collect();
        assert_eq!(seen, HashSet::from(["b", "c"]));
    }

    #[test]
    fn single_item_is_served_even_if_recent() {
        let index = ScoredIndex::from_items([QueueItem::new("only", 1)]);
        let id = SelectionPolicy::default()
            .select(&index, Some("only"), &mut seeded())
            .unwrap();
        assert_eq!(id, "only");
    }

    #[test]
    fn window_of_one_falls_through_to_next_stalest() {
        let index = abc();
        let policy = SelectionPolicy::new(1);
        assert_eq!(policy.select(&index, None, &mut seeded()).unwrap(), "a");
        assert_eq!(policy.select(&index, Some("a"), &mut seeded()).unwrap(), "b");
    }

    #[test]
    fn large_index_only_serves_the_stalest_window() {
        let index =
            ScoredIndex::from_items((0..100).map(|i| QueueItem::new(format!("box-{i}"), i)));
        let policy = SelectionPolicy::default();
        let mut rng = seeded();
        let allowed: HashSet<String> = (0..5).map(|i| format!("box-{i}")).collect();
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            let id = policy.select(&index, None, &mut rng).unwrap();
            assert!(allowed.contains(id), "served {id} outside the window");
            seen.insert(id.to_string());
        }
        assert_eq!(seen, allowed, "every slot in the window should be reachable");
    }

    #[test]
    fn zero_window_is_clamped() {
        let policy = SelectionPolicy::new(0);
        assert_eq!(policy.window(), 1);
        let index =
            ScoredIndex::from_items((0..10).map(|i| QueueItem::new(format!("box-{i}"), i)));
        let mut rng = seeded();
        for _ in 0..20 {
            assert_eq!(policy.select(&index, None, &mut rng).unwrap(), "box-0");
        }
    }
}
