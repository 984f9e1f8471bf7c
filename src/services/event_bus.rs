//! Drain-on-read queue of path lifecycle events.
//!
//! The queue is bounded: once `capacity` events are waiting, the oldest is
//! dropped to make room. Every published event carries a sequence number so a
//! consumer can tell from a gap that it missed something.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tracing::warn;

use crate::models::LifecycleEvent;

#[derive(Debug)]
struct EventQueue {
    events: VecDeque<LifecycleEvent>,
    next_sequence: u64,
    dropped_total: u64,
    dropped_since_drain: u64,
}

#[derive(Debug)]
pub struct EventBus {
    queue: Mutex<EventQueue>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            queue: Mutex::new(EventQueue {
                events: VecDeque::with_capacity(capacity.min(1024)),
                next_sequence: 1,
                dropped_total: 0,
                dropped_since_drain: 0,
            }),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, EventQueue> {
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append an event and return the sequence number it was given
    pub fn publish(&self, mut event: LifecycleEvent) -> u64 {
        let mut queue = self.lock();
        let sequence = queue.next_sequence;
        queue.next_sequence += 1;
        event.sequence = sequence;

        if queue.events.len() >= self.capacity {
            queue.events.pop_front();
            queue.dropped_total += 1;
            queue.dropped_since_drain += 1;
            if queue.dropped_since_drain == 1 {
                warn!(
                    "Event bus full ({} events), dropping oldest until next drain",
                    self.capacity
                );
            }
        }
        queue.events.push_back(event);
        sequence
    }

    /// Take every queued event, leaving the bus empty
    pub fn drain_all(&self) -> Vec<LifecycleEvent> {
        let mut queue = self.lock();
        queue.dropped_since_drain = 0;
        queue.events.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Events lost to overflow since the bus was created
    pub fn dropped_count(&self) -> u64 {
        self.lock().dropped_total
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::config::defaults::DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LifecycleEventType, PathState, SourceType, StreamUrls};
    use std::sync::Arc;

    fn event(id: &str, event_type: LifecycleEventType) -> LifecycleEvent {
        let state = PathState::new(id, SourceType::Publisher, &StreamUrls::default());
        LifecycleEvent::new(event_type, &state)
    }

    #[test]
    fn test_drain_returns_fifo_and_clears() {
        let bus = EventBus::new(10);
        bus.publish(event("a", LifecycleEventType::Created));
        bus.publish(event("a", LifecycleEventType::Started));
        bus.publish(event("b", LifecycleEventType::Created));

        let drained = bus.drain_all();
        let types: Vec<_> = drained.iter().map(|e| (e.path_id.as_str(), e.event_type)).collect();
        assert_eq!(
            types,
            vec![
                ("a", LifecycleEventType::Created),
                ("a", LifecycleEventType::Started),
                ("b", LifecycleEventType::Created),
            ]
        );
        assert_eq!(drained.iter().map(|e| e.sequence).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(bus.is_empty());
        assert!(bus.drain_all().is_empty());
    }

    #[test]
    fn test_overflow_drops_oldest_and_leaves_sequence_gap() {
        let bus = EventBus::new(2);
        for _ in 0..5 {
            bus.publish(event("a", LifecycleEventType::Restarted));
        }
        let drained = bus.drain_all();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].sequence, 4);
        assert_eq!(drained[1].sequence, 5);
        assert_eq!(bus.dropped_count(), 3);
    }

    #[test]
    fn test_sequences_continue_across_drains() {
        let bus = EventBus::new(4);
        bus.publish(event("a", LifecycleEventType::Created));
        bus.drain_all();
        let seq = bus.publish(event("a", LifecycleEventType::Started));
        assert_eq!(seq, 2);
    }

    #[test]
    fn test_concurrent_publishers_lose_nothing_under_capacity() {
        let bus = Arc::new(EventBus::new(10_000));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let bus = bus.clone();
                std::thread::spawn(move || {
                    for i in 0..250 {
                        bus.publish(event(&format!("p{t}-{i}"), LifecycleEventType::Created));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let drained = bus.drain_all();
        assert_eq!(drained.len(), 1000);
        let mut seqs: Vec<_> = drained.iter().map(|e| e.sequence).collect();
        seqs.dedup();
        assert_eq!(seqs.len(), 1000);
    }
}
