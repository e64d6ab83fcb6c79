//! Push notifications delivered to subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::snapshot::CitySnapshot;
use crate::structs::{Event, ReasoningLogEntry};

/// One message on the outbound bus.
///
/// Serialized as `{"type": "...", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum Notification {
    /// A new event.
    Event(Box<Event>),
    /// A new reasoning entry.
    Reasoning(Box<ReasoningLogEntry>),
    /// End-of-tick copy of the city.
    StateUpdate(Box<CitySnapshot>),
    /// Sent once, first, on every new subscription.
    Connection(ConnectionStatus),
    /// Reply to a subscriber's keep-alive ping.
    Pong(Pong),
}

/// Connection-status payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ConnectionStatus {
    /// Always `true` on a live subscription.
    pub connected: bool,
    /// Subscribers attached at the time of connection, this one included.
    pub subscribers: u32,
    /// Completed tick count at connection time.
    pub tick: u64,
}

/// Keep-alive reply payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Pong {
    /// Echo of the subscriber's ping nonce.
    pub nonce: u64,
    /// Completed tick count when the ping was answered.
    pub tick: u64,
    /// Wall-clock time of the reply.
    pub timestamp: DateTime<Utc>,
}
