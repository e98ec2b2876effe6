//! Per-room cooldown bookkeeping and pending move queues
//!
//! Both structures are keyed by board square rather than by piece identity.
//! Whenever a piece moves, its entries have to follow it to the destination
//! square; `GameState` is responsible for doing that migration.

use shared::{QueuedMove, Square};
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Maps a square to the instant (epoch ms) at which it may move again
#[derive(Debug, Clone, Default)]
pub struct CooldownRegistry {
    expiries: HashMap<Square, u64>,
}

impl CooldownRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a cooldown of `duration_ms` on `square`. A zero duration
    /// leaves no entry behind.
    pub fn start(&mut self, square: Square, duration_ms: u64, now: u64) {
        if duration_ms == 0 {
            self.expiries.remove(&square);
        } else {
            self.expiries.insert(square, now.saturating_add(duration_ms));
        }
    }

    pub fn clear(&mut self, square: Square) {
        self.expiries.remove(&square);
    }

    pub fn clear_all(&mut self) {
        self.expiries.clear();
    }

    pub fn expiry(&self, square: Square) -> Option<u64> {
        self.expiries.get(&square).copied()
    }

    /// Absent or expired entries mean the square is free
    pub fn is_cooling(&self, square: Square, now: u64) -> bool {
        self.expiry(square).map_or(false, |expires_at| expires_at > now)
    }

    /// Drops every entry that has already expired
    pub fn prune(&mut self, now: u64) {
        self.expiries.retain(|_, expires_at| *expires_at > now);
    }

    /// Active cooldowns keyed by "row-col"
    pub fn snapshot(&self, now: u64) -> BTreeMap<String, u64> {
        self.expiries
            .iter()
            .filter(|(_, expires_at)| **expires_at > now)
            .map(|(square, expires_at)| (square.key(), *expires_at))
            .collect()
    }
}

/// Most destinations a single square may have pending
pub const MAX_QUEUE_LEN: usize = 32;

/// FIFO queues of pending destinations, one per source square.
///
/// An empty queue is never stored; every mutation prunes it.
#[derive(Debug, Clone, Default)]
pub struct MoveQueue {
    queues: HashMap<Square, VecDeque<Square>>,
}

impl MoveQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a destination; false once the square holds `MAX_QUEUE_LEN`
    pub fn push(&mut self, square: Square, destination: Square) -> bool {
        let queue = self.queues.entry(square).or_default();
        if queue.len() >= MAX_QUEUE_LEN {
            return false;
        }
        queue.push_back(destination);
        true
    }

    pub fn pop_front(&mut self, square: Square) -> Option<Square> {
        let queue = self.queues.get_mut(&square)?;
        let head = queue.pop_front();
        if queue.is_empty() {
            self.queues.remove(&square);
        }
        head
    }

    pub fn get(&self, square: Square) -> Option<&VecDeque<Square>> {
        self.queues.get(&square)
    }

    /// Removes the whole queue for `square`, returning how many entries it held
    pub fn clear(&mut self, square: Square) -> usize {
        self.queues.remove(&square).map_or(0, |queue| queue.len())
    }

    pub fn clear_all(&mut self) {
        self.queues.clear();
    }

    /// Moves the remaining queue from `from` to `to`, replacing whatever
    /// `to` held
    pub fn migrate(&mut self, from: Square, to: Square) {
        self.queues.remove(&to);
        if let Some(queue) = self.queues.remove(&from) {
            if !queue.is_empty() {
                self.queues.insert(to, queue);
            }
        }
    }

    /// Cancels one entry by index, or the whole queue for an index of -1
    pub fn cancel(&mut self, square: Square, index: i64) -> bool {
        if index == -1 {
            return self.clear(square) > 0;
        }
        let Ok(index) = usize::try_from(index) else {
            return false;
        };
        let Some(queue) = self.queues.get_mut(&square) else {
            return false;
        };
        let removed = queue.remove(index).is_some();
        if queue.is_empty() {
            self.queues.remove(&square);
        }
        removed
    }

    /// Moves the entry at `previous` so that it ends up at `current`
    pub fn reorder(&mut self, square: Square, previous: usize, current: usize) -> bool {
        let Some(queue) = self.queues.get_mut(&square) else {
            return false;
        };
        if previous >= queue.len() || current >= queue.len() {
            return false;
        }
        if let Some(entry) = queue.remove(previous) {
            queue.insert(current, entry);
        }
        true
    }

    /// Source squares with pending moves, in board order
    pub fn squares(&self) -> Vec<Square> {
        let mut squares: Vec<Square> = self.queues.keys().copied().collect();
        squares.sort();
        squares
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    pub fn snapshot(&self) -> BTreeMap<String, Vec<QueuedMove>> {
        self.queues
            .iter()
            .map(|(square, queue)| {
                (
                    square.key(),
                    queue.iter().copied().map(QueuedMove::from).collect(),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sq(text: &str) -> Square {
        Square::from_algebraic(text).unwrap()
    }

    #[test]
    fn test_cooldown_start_and_expiry() {
        let mut cooldowns = CooldownRegistry::new();
        cooldowns.start(sq("e4"), 2000, 1_000);

        assert_eq!(cooldowns.expiry(sq("e4")), Some(3_000));
        assert!(cooldowns.is_cooling(sq("e4"), 2_999));
        assert!(!cooldowns.is_cooling(sq("e4"), 3_000));
        assert!(!cooldowns.is_cooling(sq("d4"), 0));
    }

    #[test]
    fn test_zero_cooldown_leaves_no_entry() {
        let mut cooldowns = CooldownRegistry::new();
        cooldowns.start(sq("d1"), 5000, 0);
        cooldowns.start(sq("d1"), 0, 100);
        assert_eq!(cooldowns.expiry(sq("d1")), None);
        assert!(cooldowns.snapshot(100).is_empty());
    }

    #[test]
    fn test_cooldown_snapshot_skips_expired() {
        let mut cooldowns = CooldownRegistry::new();
        cooldowns.start(sq("a2"), 100, 0);
        cooldowns.start(sq("b2"), 1000, 0);

        let snapshot = cooldowns.snapshot(500);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get("6-1"), Some(&1000));

        cooldowns.prune(500);
        assert_eq!(cooldowns.expiry(sq("a2")), None);
        assert_eq!(cooldowns.expiry(sq("b2")), Some(1000));
    }

    #[test]
    fn test_huge_cooldown_saturates() {
        let mut cooldowns = CooldownRegistry::new();
        cooldowns.start(sq("e4"), u64::MAX, 1_700_000_000_000);

        assert_eq!(cooldowns.expiry(sq("e4")), Some(u64::MAX));
        assert!(cooldowns.is_cooling(sq("e4"), u64::MAX - 1));
    }

    #[test]
    fn test_queue_length_is_capped() {
        let mut queue = MoveQueue::new();
        for _ in 0..MAX_QUEUE_LEN {
            assert!(queue.push(sq("a1"), sq("a2")));
        }
        assert!(!queue.push(sq("a1"), sq("a3")));
        assert_eq!(queue.get(sq("a1")).unwrap().len(), MAX_QUEUE_LEN);
        assert!(queue.push(sq("b1"), sq("c3")));
    }

    #[test]
    fn test_queue_is_fifo_and_pruned() {
        let mut queue = MoveQueue::new();
        queue.push(sq("e2"), sq("e3"));
        queue.push(sq("e2"), sq("e4"));

        assert_eq!(queue.pop_front(sq("e2")), Some(sq("e3")));
        assert_eq!(queue.pop_front(sq("e2")), Some(sq("e4")));
        assert_eq!(queue.pop_front(sq("e2")), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_queue_migration() {
        let mut queue = MoveQueue::new();
        queue.push(sq("g1"), sq("f3"));
        queue.push(sq("g1"), sq("e5"));
        queue.push(sq("f3"), sq("h4"));

        queue.migrate(sq("g1"), sq("f3"));

        assert!(queue.get(sq("g1")).is_none());
        let migrated: Vec<Square> = queue.get(sq("f3")).unwrap().iter().copied().collect();
        assert_eq!(migrated, vec![sq("f3"), sq("e5")]);
    }

    #[test]
    fn test_migrating_nothing_clears_destination() {
        let mut queue = MoveQueue::new();
        queue.push(sq("d5"), sq("d4"));
        queue.migrate(sq("e4"), sq("d5"));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_cancel_by_index() {
        let mut queue = MoveQueue::new();
        queue.push(sq("a1"), sq("a3"));
        queue.push(sq("a1"), sq("a4"));

        assert!(!queue.cancel(sq("a1"), 5));
        assert!(!queue.cancel(sq("a1"), -3));
        assert!(queue.cancel(sq("a1"), 0));
        assert_eq!(queue.get(sq("a1")).unwrap().front(), Some(&sq("a4")));
        assert!(queue.cancel(sq("a1"), 0));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_cancel_all() {
        let mut queue = MoveQueue::new();
        queue.push(sq("a1"), sq("a3"));
        queue.push(sq("a1"), sq("a4"));
        assert!(queue.cancel(sq("a1"), -1));
        assert!(queue.is_empty());
        assert!(!queue.cancel(sq("a1"), -1));
    }

    #[test]
    fn test_reorder() {
        let mut queue = MoveQueue::new();
        for to in ["a3", "a4", "a5"] {
            queue.push(sq("a1"), sq(to));
        }

        assert!(queue.reorder(sq("a1"), 2, 0));
        let order: Vec<Square> = queue.get(sq("a1")).unwrap().iter().copied().collect();
        assert_eq!(order, vec![sq("a5"), sq("a3"), sq("a4")]);

        assert!(!queue.reorder(sq("a1"), 0, 3));
        assert!(!queue.reorder(sq("h1"), 0, 0));
    }

    #[test]
    fn test_queue_snapshot_keys() {
        let mut queue = MoveQueue::new();
        queue.push(sq("e2"), sq("e4"));
        let snapshot = queue.snapshot();
        assert_eq!(
            snapshot.get("6-4"),
            Some(&vec![QueuedMove {
                end_row: 4,
                end_col: 4,
            }])
        );
    }
}
