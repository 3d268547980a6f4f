//! The two FIFO lanes feeding the dispatch loop.
//!
//! Requests wait in one of two queues, "regular" and "low priority". Unlike a
//! single priority heap, two explicit queues keep the rule "drain regular
//! before touching low priority" exact:
//!
//! 1. Within a lane, requests start in submission order
//! 2. A low-priority request only starts when the regular lane is empty
//!
//! The lanes hold keys only; the scheduler owns the request entries and wraps
//! the lanes in its mutex.

use std::collections::VecDeque;

/// Scheduling lane of a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Lane {
    /// Work somebody is waiting on right now.
    Regular,
    /// Speculative work (prefetch); only runs when no regular work is queued.
    LowPriority,
}

impl Lane {
    /// Maps the `low_priority` flag of `add_request` to a lane.
    pub fn from_low_priority(low_priority: bool) -> Self {
        if low_priority {
            Self::LowPriority
        } else {
            Self::Regular
        }
    }
}

/// Pair of FIFO queues of request keys.
#[derive(Debug)]
pub struct LaneQueues<K> {
    regular: VecDeque<K>,
    low: VecDeque<K>,
}

impl<K: PartialEq> LaneQueues<K> {
    /// Creates empty lanes.
    pub fn new() -> Self {
        Self {
            regular: VecDeque::new(),
            low: VecDeque::new(),
        }
    }

    fn lane_mut(&mut self, lane: Lane) -> &mut VecDeque<K> {
        match lane {
            Lane::Regular => &mut self.regular,
            Lane::LowPriority => &mut self.low,
        }
    }

    fn lane(&self, lane: Lane) -> &VecDeque<K> {
        match lane {
            Lane::Regular => &self.regular,
            Lane::LowPriority => &self.low,
        }
    }

    /// Appends a key to the back of a lane.
    pub fn push(&mut self, lane: Lane, key: K) {
        self.lane_mut(lane).push_back(key);
    }

    /// Removes and returns the oldest key of a lane.
    pub fn pop(&mut self, lane: Lane) -> Option<K> {
        self.lane_mut(lane).pop_front()
    }

    /// Removes a key from whichever lane holds it.
    ///
    /// Returns the lane it was removed from, or `None` if it was not queued.
    pub fn remove(&mut self, key: &K) -> Option<Lane> {
        for lane in [Lane::Regular, Lane::LowPriority] {
            let queue = self.lane_mut(lane);
            if let Some(pos) = queue.iter().position(|k| k == key) {
                queue.remove(pos);
                return Some(lane);
            }
        }
        None
    }

    /// Moves a queued low-priority key to the back of the regular lane.
    ///
    /// Returns false if the key was not waiting in the low-priority lane.
    pub fn promote(&mut self, key: &K) -> bool {
        match self.low.iter().position(|k| k == key) {
            Some(pos) => {
                if let Some(key) = self.low.remove(pos) {
                    self.regular.push_back(key);
                }
                true
            }
            None => false,
        }
    }

    /// Number of keys waiting in a lane.
    pub fn len(&self, lane: Lane) -> usize {
        self.lane(lane).len()
    }

    /// Returns true if a lane has no waiting keys.
    pub fn is_empty(&self, lane: Lane) -> bool {
        self.lane(lane).is_empty()
    }

    /// Removes every waiting key.
    pub fn clear(&mut self) {
        self.regular.clear();
        self.low.clear();
    }
}

impl<K: PartialEq> Default for LaneQueues<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_within_lane() {
        let mut lanes = LaneQueues::new();
        lanes.push(Lane::Regular, "first");
        lanes.push(Lane::Regular, "second");
        lanes.push(Lane::Regular, "third");

        assert_eq!(lanes.pop(Lane::Regular), Some("first"));
        assert_eq!(lanes.pop(Lane::Regular), Some("second"));
        assert_eq!(lanes.pop(Lane::Regular), Some("third"));
        assert_eq!(lanes.pop(Lane::Regular), None);
    }

    #[test]
    fn test_lanes_are_independent() {
        let mut lanes = LaneQueues::new();
        lanes.push(Lane::LowPriority, "prefetch");
        lanes.push(Lane::Regular, "visible");

        assert_eq!(lanes.len(Lane::Regular), 1);
        assert_eq!(lanes.len(Lane::LowPriority), 1);
        assert_eq!(lanes.pop(Lane::LowPriority), Some("prefetch"));
        assert!(lanes.is_empty(Lane::LowPriority));
        assert!(!lanes.is_empty(Lane::Regular));
    }

    #[test]
    fn test_remove_reports_lane() {
        let mut lanes = LaneQueues::new();
        lanes.push(Lane::Regular, 1);
        lanes.push(Lane::LowPriority, 2);
        lanes.push(Lane::Regular, 3);

        assert_eq!(lanes.remove(&2), Some(Lane::LowPriority));
        assert_eq!(lanes.remove(&1), Some(Lane::Regular));
        assert_eq!(lanes.remove(&1), None);
        assert_eq!(lanes.pop(Lane::Regular), Some(3));
    }

    #[test]
    fn test_promote_moves_to_back_of_regular() {
        let mut lanes = LaneQueues::new();
        lanes.push(Lane::Regular, "a");
        lanes.push(Lane::LowPriority, "b");
        lanes.push(Lane::LowPriority, "c");

        assert!(lanes.promote(&"c"));
        assert_eq!(lanes.len(Lane::LowPriority), 1);
        assert_eq!(lanes.pop(Lane::Regular), Some("a"));
        assert_eq!(lanes.pop(Lane::Regular), Some("c"));
    }

    #[test]
    fn test_promote_missing_key() {
        let mut lanes = LaneQueues::new();
        lanes.push(Lane::Regular, "a");
        assert!(!lanes.promote(&"a"));
        assert!(!lanes.promote(&"z"));
        assert_eq!(lanes.len(Lane::Regular), 1);
    }

    #[test]
    fn test_clear() {
        let mut lanes = LaneQueues::new();
        lanes.push(Lane::Regular, 1);
        lanes.push(Lane::LowPriority, 2);
        lanes.clear();
        assert!(lanes.is_empty(Lane::Regular));
        assert!(lanes.is_empty(Lane::LowPriority));
    }

    #[test]
    fn test_lane_from_flag() {
        assert_eq!(Lane::from_low_priority(true), Lane::LowPriority);
        assert_eq!(Lane::from_low_priority(false), Lane::Regular);
    }
}
