//! Realtime transport to the message bus.
//!
//! A [`Transport`] owns one long-lived connection and is polled for events,
//! the same pull model the rest of the crate uses. [`RealtimeChannel`] sits
//! on top and turns raw destinations into typed per-topic queues.

mod channel;
mod memory;
#[cfg(not(target_arch = "wasm32"))]
mod native;
pub mod stomp;

pub use channel::{ConnectionChange, RealtimeChannel, Subscription};
pub use memory::{MemoryBus, MemoryTransport};
#[cfg(not(target_arch = "wasm32"))]
pub use native::{StompConfig, StompTransport};

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Invalid WebSocket URL scheme: {0}")]
    UnsupportedScheme(String),
    #[error("Already connected")]
    AlreadyConnected,
    #[error("Not connected")]
    NotConnected,
    #[error("Transport worker has stopped")]
    ChannelClosed,
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Events from the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Handshake completed and subscriptions are in place.
    Connected,
    /// Connection lost or closed.
    Disconnected,
    /// Message on a subscribed destination.
    Message { destination: String, body: String },
    /// Connection attempt failed or the broker reported an error.
    Error { message: String },
}

/// One persistent bidirectional bus connection.
pub trait Transport {
    /// Start connecting. Completion is reported through [`Transport::poll_events`].
    fn connect(&mut self) -> TransportResult<()>;

    /// Tear the connection down and stop reconnecting.
    fn disconnect(&mut self);

    fn state(&self) -> ConnectionState;

    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Register a destination. Registered destinations are re-subscribed on
    /// every (re)connect.
    fn subscribe(&mut self, destination: &str) -> TransportResult<()>;

    /// Publish a text body. Fails with [`TransportError::NotConnected`] rather
    /// than queueing.
    fn send(&self, destination: &str, body: &str) -> TransportResult<()>;

    /// Drain pending events (non-blocking).
    fn poll_events(&mut self) -> Vec<TransportEvent>;
}

/// Short prefix of a payload for log lines.
pub(crate) fn preview(body: &str) -> String {
    body.chars().take(100).collect()
}

/// State implied by an event, given the current one.
pub(crate) fn next_state(current: ConnectionState, event: &TransportEvent) -> ConnectionState {
    match event {
        TransportEvent::Connected => ConnectionState::Connected,
        TransportEvent::Disconnected => ConnectionState::Disconnected,
        // Broker errors on a live connection are not fatal.
        TransportEvent::Error { .. } if current == ConnectionState::Connected => current,
        TransportEvent::Error { .. } => ConnectionState::Error,
        TransportEvent::Message { .. } => current,
    }
}
