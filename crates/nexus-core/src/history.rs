//! Bounded event history.

use std::collections::VecDeque;

use nexus_types::Event;

/// Ring buffer of the most recent events. Appending past capacity evicts
/// the oldest entry.
#[derive(Debug, Clone)]
pub struct EventLog {
    capacity: usize,
    entries: VecDeque<Event>,
}

impl EventLog {
    /// Create an empty log holding at most `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Append an event, evicting the oldest if full.
    pub fn push(&mut self, event: Event) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(event);
    }

    /// Up to `limit` events, newest first.
    pub fn recent(&self, limit: usize) -> Vec<Event> {
        self.entries.iter().rev().take(limit).cloned().collect()
    }

    /// Number of retained events.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every event.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::indexing_slicing)]

    use super::*;
    use nexus_types::{EventType, Severity};

    fn event(tick: u64) -> Event {
        Event::new(
            tick,
            EventType::RuleFired,
            Severity::Info,
            format!("tick {tick}"),
            serde_json::Value::Null,
        )
    }

    #[test]
    fn evicts_oldest_and_returns_newest_first() {
        let mut log = EventLog::new(3);
        for t in 1..=5 {
            log.push(event(t));
        }
        assert_eq!(log.len(), 3);
        let recent = log.recent(10);
        let ticks: Vec<u64> = recent.iter().map(|e| e.tick).collect();
        assert_eq!(ticks, vec![5, 4, 3]);
        assert_eq!(log.recent(1)[0].tick, 5);
    }

    #[test]
    fn clear_empties() {
        let mut log = EventLog::new(2);
        log.push(event(1));
        log.clear();
        assert!(log.is_empty());
        assert!(log.recent(5).is_empty());
    }
}
