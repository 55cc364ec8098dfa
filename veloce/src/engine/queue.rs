use crate::Sequence;
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, collections::BinaryHeap};
use thiserror::Error;
use tracing::warn;
use veloce_data::time::TimestampNs;

/// Dispatch priority of a queued event. Ties on timestamp dispatch
/// higher-priority events first.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

/// All possible event queue errors.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum QueueError {
    #[error("event queue is full (capacity {capacity})")]
    Overflow { capacity: usize },
}

/// Counters tracking queue behaviour over an engine run.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Default, Deserialize, Serialize,
)]
pub struct QueueMetrics {
    pub pushed: u64,
    pub popped: u64,
    /// Low-priority entries evicted by backpressure.
    pub dropped_low: u64,
    pub overflow_errors: u64,
}

#[derive(Debug, Clone)]
struct Entry<Event> {
    ts: TimestampNs,
    priority: Priority,
    seq: Sequence,
    event: Event,
}

// Entries order (and compare) by the dispatch key `(ts, -priority, seq)`
// alone; `seq` is unique per queue, so key equality is consistent. BinaryHeap
// is a max-heap, hence the final `reverse`.
impl<Event> Ord for Entry<Event> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ts
            .cmp(&other.ts)
            .then_with(|| other.priority.cmp(&self.priority))
            .then_with(|| self.seq.cmp(&other.seq))
            .reverse()
    }
}

impl<Event> PartialOrd for Entry<Event> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<Event> PartialEq for Entry<Event> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<Event> Eq for Entry<Event> {}

/// Priority queue of timestamped events dispatched in `(ts, -priority, seq)`
/// order, where `seq` is a monotonically increasing insertion counter that
/// guarantees FIFO dispatch of exact ties.
///
/// An optional capacity bound applies backpressure in live mode: overflowing
/// Low-priority pushes evict the oldest queued Low entry, while Normal and
/// above surface [`QueueError::Overflow`].
#[derive(Debug)]
pub struct EventQueue<Event> {
    heap: BinaryHeap<Entry<Event>>,
    capacity: Option<usize>,
    seq: Sequence,
    metrics: QueueMetrics,
}

impl<Event> Default for EventQueue<Event> {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl<Event> EventQueue<Event> {
    /// Construct an unbounded `EventQueue` (backtest default).
    pub fn unbounded() -> Self {
        Self {
            heap: BinaryHeap::new(),
            capacity: None,
            seq: Sequence::default(),
            metrics: QueueMetrics::default(),
        }
    }

    /// Construct a bounded `EventQueue` (live default).
    pub fn bounded(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(capacity),
            capacity: Some(capacity),
            seq: Sequence::default(),
            metrics: QueueMetrics::default(),
        }
    }

    /// Push an event for dispatch at `ts` with the provided [`Priority`].
    pub fn push(
        &mut self,
        ts: TimestampNs,
        priority: Priority,
        event: Event,
    ) -> Result<(), QueueError> {
        if let Some(capacity) = self.capacity {
            if self.heap.len() >= capacity {
                if priority == Priority::Low {
                    if self.evict_oldest_low() {
                        self.metrics.dropped_low += 1;
                    } else {
                        // Queue full of Normal-and-above; shed the incoming Low
                        self.metrics.dropped_low += 1;
                        warn!(capacity, "event queue full, dropping incoming Low event");
                        return Ok(());
                    }
                } else {
                    self.metrics.overflow_errors += 1;
                    return Err(QueueError::Overflow { capacity });
                }
            }
        }

        self.heap.push(Entry {
            ts,
            priority,
            seq: self.seq.fetch_add(),
            event,
        });
        self.metrics.pushed += 1;
        Ok(())
    }

    /// Pop the next event in dispatch order.
    pub fn pop(&mut self) -> Option<(TimestampNs, Event)> {
        let entry = self.heap.pop()?;
        self.metrics.popped += 1;
        Some((entry.ts, entry.event))
    }

    /// Timestamp of the next event to dispatch, without consuming it.
    pub fn peek_ts(&self) -> Option<TimestampNs> {
        self.heap.peek().map(|entry| entry.ts)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }

    pub fn metrics(&self) -> QueueMetrics {
        self.metrics
    }

    /// Remove the oldest (lowest seq) queued Low-priority entry, if any.
    fn evict_oldest_low(&mut self) -> bool {
        let victim_seq = self
            .heap
            .iter()
            .filter(|entry| entry.priority == Priority::Low)
            .min_by_key(|entry| entry.seq)
            .map(|entry| entry.seq);

        let Some(victim_seq) = victim_seq else {
            return false;
        };

        let entries = std::mem::take(&mut self.heap);
        self.heap = entries
            .into_iter()
            .filter(|entry| entry.seq != victim_seq)
            .collect();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(ms: i64) -> TimestampNs {
        TimestampNs::from_millis(ms)
    }

    #[test]
    fn test_dispatch_order_is_ts_then_priority_then_fifo() {
        struct TestCase {
            name: &'static str,
            input: Vec<(i64, Priority, &'static str)>,
            expected: Vec<&'static str>,
        }

        let cases = vec![
            TestCase {
                name: "ascending ts",
                input: vec![
                    (3, Priority::Normal, "c"),
                    (1, Priority::Normal, "a"),
                    (2, Priority::Normal, "b"),
                ],
                expected: vec!["a", "b", "c"],
            },
            TestCase {
                name: "priority breaks ts ties, Critical first",
                input: vec![
                    (1, Priority::Low, "low"),
                    (1, Priority::Critical, "critical"),
                    (1, Priority::Normal, "normal"),
                    (1, Priority::High, "high"),
                ],
                expected: vec!["critical", "high", "normal", "low"],
            },
            TestCase {
                name: "insertion order breaks full ties FIFO",
                input: vec![
                    (1, Priority::Normal, "first"),
                    (1, Priority::Normal, "second"),
                    (1, Priority::Normal, "third"),
                ],
                expected: vec!["first", "second", "third"],
            },
            TestCase {
                name: "mixed",
                input: vec![
                    (2, Priority::High, "t2-high"),
                    (1, Priority::Low, "t1-low"),
                    (2, Priority::Critical, "t2-critical"),
                    (1, Priority::Low, "t1-low-2"),
                ],
                expected: vec!["t1-low", "t1-low-2", "t2-critical", "t2-high"],
            },
        ];

        for (index, test) in cases.into_iter().enumerate() {
            let mut queue = EventQueue::unbounded();
            for (ms, priority, tag) in test.input {
                queue.push(ts(ms), priority, tag).unwrap();
            }

            let mut actual = Vec::new();
            while let Some((_, event)) = queue.pop() {
                actual.push(event);
            }
            assert_eq!(actual, test.expected, "TC{index} ({}) failed", test.name);
        }
    }

    #[test]
    fn test_peek_ts_and_len() {
        let mut queue = EventQueue::unbounded();
        assert_eq!(queue.peek_ts(), None);
        assert!(queue.is_empty());

        queue.push(ts(5), Priority::Normal, "b").unwrap();
        queue.push(ts(3), Priority::Normal, "a").unwrap();

        assert_eq!(queue.peek_ts(), Some(ts(3)));
        assert_eq!(queue.len(), 2);

        queue.clear();
        assert!(queue.is_empty());
    }

    #[test]
    fn test_bounded_overflow_drops_oldest_low() {
        let mut queue = EventQueue::bounded(2);
        queue.push(ts(1), Priority::Low, "low-1").unwrap();
        queue.push(ts(2), Priority::Normal, "normal").unwrap();

        // Queue full: pushing another Low evicts the oldest Low
        queue.push(ts(3), Priority::Low, "low-2").unwrap();

        let drained: Vec<_> = std::iter::from_fn(|| queue.pop()).map(|(_, e)| e).collect();
        assert_eq!(drained, vec!["normal", "low-2"]);
        assert_eq!(queue.metrics().dropped_low, 1);
    }

    #[test]
    fn test_bounded_overflow_errors_for_normal_and_above() {
        let mut queue = EventQueue::bounded(1);
        queue.push(ts(1), Priority::Normal, "a").unwrap();

        let result = queue.push(ts(2), Priority::High, "b");
        assert_eq!(result, Err(QueueError::Overflow { capacity: 1 }));
        assert_eq!(queue.metrics().overflow_errors, 1);

        // The queued entry is untouched
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_bounded_overflow_full_of_higher_sheds_incoming_low() {
        let mut queue = EventQueue::bounded(1);
        queue.push(ts(1), Priority::Critical, "keep").unwrap();

        queue.push(ts(2), Priority::Low, "shed").unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.metrics().dropped_low, 1);
        assert_eq!(queue.pop().map(|(_, e)| e), Some("keep"));
    }
}
