//! Typed per-topic queues over a [`Transport`].

use super::{Transport, TransportEvent, TransportResult, preview};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::mpsc::{Receiver, Sender, channel};

/// Connection status change observed during [`RealtimeChannel::pump`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionChange {
    Connected,
    Disconnected,
}

type Route = Box<dyn FnMut(&str)>;

/// Pull stream of decoded messages from one destination.
#[derive(Debug)]
pub struct Subscription<M> {
    destination: String,
    rx: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn try_next(&self) -> Option<M> {
        self.rx.try_recv().ok()
    }

    /// Everything received since the last drain, in arrival order.
    pub fn drain(&self) -> Vec<M> {
        self.rx.try_iter().collect()
    }
}

/// Decode a body and push it into a subscription queue.
struct Decoder<M> {
    destination: String,
    tx: Sender<M>,
    _marker: PhantomData<fn() -> M>,
}

impl<M: DeserializeOwned> Decoder<M> {
    fn route(&self, body: &str) {
        match serde_json::from_str::<M>(body) {
            Ok(message) => {
                // Receiver gone means the subscriber lost interest.
                let _ = self.tx.send(message);
            }
            Err(e) => {
                log::warn!(
                    "Dropping undecodable message on {}: {} ({})",
                    self.destination,
                    e,
                    preview(body)
                );
            }
        }
    }
}

/// Realtime connection with typed publish/subscribe.
pub struct RealtimeChannel<T: Transport> {
    transport: T,
    routes: HashMap<String, Vec<Route>>,
}

impl<T: Transport> RealtimeChannel<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            routes: HashMap::new(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn connect(&mut self) -> TransportResult<()> {
        self.transport.connect()
    }

    pub fn disconnect(&mut self) {
        self.transport.disconnect();
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Open a typed queue on `destination`.
    ///
    /// The destination stays registered for the lifetime of the channel and
    /// is re-subscribed by the transport after every reconnect.
    pub fn subscribe<M>(&mut self, destination: &str) -> TransportResult<Subscription<M>>
    where
        M: DeserializeOwned + 'static,
    {
        self.transport.subscribe(destination)?;
        let (tx, rx) = channel();
        let decoder = Decoder {
            destination: destination.to_string(),
            tx,
            _marker: PhantomData,
        };
        self.routes
            .entry(destination.to_string())
            .or_default()
            .push(Box::new(move |body: &str| decoder.route(body)));
        Ok(Subscription {
            destination: destination.to_string(),
            rx,
        })
    }

    /// Publish a message. Returns whether it was handed to the transport;
    /// while disconnected the message is dropped, not queued.
    pub fn publish<M: Serialize>(&self, destination: &str, message: &M) -> bool {
        if !self.transport.is_connected() {
            log::debug!("Not connected, dropping publish to {}", destination);
            return false;
        }
        let body = match serde_json::to_string(message) {
            Ok(body) => body,
            Err(e) => {
                log::error!("Failed to encode message for {}: {}", destination, e);
                return false;
            }
        };
        match self.transport.send(destination, &body) {
            Ok(()) => true,
            Err(e) => {
                log::debug!("Publish to {} dropped: {}", destination, e);
                false
            }
        }
    }

    /// Drain transport events into subscription queues.
    pub fn pump(&mut self) -> Vec<ConnectionChange> {
        let mut changes = Vec::new();
        for event in self.transport.poll_events() {
            match event {
                TransportEvent::Connected => {
                    log::info!("Realtime channel connected");
                    changes.push(ConnectionChange::Connected);
                }
                TransportEvent::Disconnected => {
                    log::info!("Realtime channel disconnected");
                    changes.push(ConnectionChange::Disconnected);
                }
                TransportEvent::Message { destination, body } => match self.routes.get_mut(&destination) {
                    Some(routes) => {
                        for route in routes.iter_mut() {
                            route(&body);
                        }
                    }
                    None => log::debug!("No subscription for {}", destination),
                },
                TransportEvent::Error { message } => {
                    log::warn!("Transport error: {}", message);
                }
            }
        }
        changes
    }
}
