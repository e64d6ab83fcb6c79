//! Outbound notification bus.
//!
//! A [`tokio::sync::broadcast`] channel: publishing never blocks, every
//! subscriber has its own bounded ring, and a subscriber that falls
//! behind loses its oldest notifications instead of stalling the tick.

use nexus_types::{ConnectionStatus, Notification};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{trace, warn};

/// Fan-out publisher for [`Notification`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Notification>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` notifications per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish to every current subscriber. Returns how many received it.
    pub fn publish(&self, notification: Notification) -> usize {
        self.sender.send(notification).unwrap_or_else(|_unsent| {
            trace!("notification published with no subscribers");
            0
        })
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Attach a new subscriber. Its first notification is a connection
    /// status; everything published afterwards follows.
    pub fn subscribe(&self, tick: u64) -> Subscription {
        let receiver = self.sender.subscribe();
        let subscribers = u32::try_from(self.sender.receiver_count()).unwrap_or(u32::MAX);
        Subscription {
            greeting: Some(Notification::Connection(ConnectionStatus {
                connected: true,
                subscribers,
                tick,
            })),
            receiver,
            dropped: 0,
        }
    }
}

/// One subscriber's view of the bus.
#[derive(Debug)]
pub struct Subscription {
    greeting: Option<Notification>,
    receiver: broadcast::Receiver<Notification>,
    dropped: u64,
}

impl Subscription {
    /// Wait for the next notification. Returns `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<Notification> {
        if let Some(greeting) = self.greeting.take() {
            return Some(greeting);
        }
        loop {
            match self.receiver.recv().await {
                Ok(n) => return Some(n),
                Err(RecvError::Lagged(skipped)) => self.record_lag(skipped),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next notification if one is ready.
    pub fn try_recv(&mut self) -> Option<Notification> {
        if let Some(greeting) = self.greeting.take() {
            return Some(greeting);
        }
        loop {
            match self.receiver.try_recv() {
                Ok(n) => return Some(n),
                Err(TryRecvError::Lagged(skipped)) => self.record_lag(skipped),
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    /// Notifications lost because this subscriber fell behind.
    pub const fn dropped(&self) -> u64 {
        self.dropped
    }

    fn record_lag(&mut self, skipped: u64) {
        self.dropped = self.dropped.saturating_add(skipped);
        warn!(skipped, total_dropped = self.dropped, "subscriber lagged, oldest notifications dropped");
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]

    use super::*;
    use chrono::Utc;
    use nexus_types::Pong;

    fn pong(nonce: u64) -> Notification {
        Notification::Pong(Pong {
            nonce,
            tick: 0,
            timestamp: Utc::now(),
        })
    }

    #[test]
    fn publish_without_subscribers_is_harmless() {
        let bus = EventBus::new(4);
        assert_eq!(bus.publish(pong(1)), 0);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn first_message_is_connection_status() {
        let bus = EventBus::new(4);
        let mut sub = bus.subscribe(7);
        bus.publish(pong(1));
        match sub.recv().await.unwrap() {
            Notification::Connection(status) => {
                assert!(status.connected);
                assert_eq!(status.subscribers, 1);
                assert_eq!(status.tick, 7);
            }
            other => panic!("expected connection, got {other:?}"),
        }
        assert!(matches!(sub.recv().await, Some(Notification::Pong(p)) if p.nonce == 1));
    }

    #[test]
    fn lagging_subscriber_drops_oldest() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe(0);
        assert!(matches!(sub.try_recv(), Some(Notification::Connection(_))));
        for nonce in 1..=5 {
            bus.publish(pong(nonce));
        }
        let mut seen = Vec::new();
        while let Some(Notification::Pong(p)) = sub.try_recv() {
            seen.push(p.nonce);
        }
        assert_eq!(seen, vec![4, 5]);
        assert_eq!(sub.dropped(), 3);
    }

    #[test]
    fn recv_after_bus_dropped_ends() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe(0);
        drop(bus);
        assert!(sub.try_recv().is_some());
        assert!(sub.try_recv().is_none());
    }
}
