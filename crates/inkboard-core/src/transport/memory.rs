//! In-process message bus.
//!
//! Behaves like a broker that relays `/app/...` publishes to `/topic/...`
//! subscribers. Connections can be dropped and restored to exercise the
//! reconnect path; like a real broker, the bus forgets every subscription of
//! a dropped connection.

use super::{ConnectionState, Transport, TransportError, TransportEvent, TransportResult, next_state};
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

#[derive(Debug, Default)]
struct Client {
    /// Wants to be connected (connect called, no disconnect since).
    active: bool,
    connected: bool,
    subscriptions: HashSet<String>,
    inbox: Vec<TransportEvent>,
}

#[derive(Debug)]
struct BusState {
    online: bool,
    relays: Vec<(String, String)>,
    clients: Vec<Client>,
    published: Vec<(String, String)>,
}

impl BusState {
    fn deliver(&mut self, destination: &str, body: &str) -> usize {
        let mut delivered = 0;
        for client in self.clients.iter_mut() {
            if client.connected && client.subscriptions.contains(destination) {
                client.inbox.push(TransportEvent::Message {
                    destination: destination.to_string(),
                    body: body.to_string(),
                });
                delivered += 1;
            }
        }
        delivered
    }

    fn relay_target(&self, destination: &str) -> Option<String> {
        self.relays.iter().find_map(|(from, to)| {
            destination
                .strip_prefix(from.as_str())
                .map(|rest| format!("{to}{rest}"))
        })
    }
}

/// Shared handle to an in-memory broker.
#[derive(Debug, Clone)]
pub struct MemoryBus {
    state: Rc<RefCell<BusState>>,
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBus {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(BusState {
                online: true,
                relays: vec![("/app/".to_string(), "/topic/".to_string())],
                clients: Vec::new(),
                published: Vec::new(),
            })),
        }
    }

    /// Create a new, not yet connected, client of this bus.
    pub fn transport(&self) -> MemoryTransport {
        let mut state = self.state.borrow_mut();
        state.clients.push(Client::default());
        MemoryTransport {
            bus: self.clone(),
            slot: state.clients.len() - 1,
            state: ConnectionState::Disconnected,
            subscriptions: Vec::new(),
        }
    }

    /// Push a message to every subscriber of `destination`, as the server
    /// would for replies such as the history backlog.
    pub fn deliver(&self, destination: &str, body: &str) -> usize {
        self.state.borrow_mut().deliver(destination, body)
    }

    /// Every publish accepted so far, as `(destination, body)`.
    pub fn published(&self) -> Vec<(String, String)> {
        self.state.borrow().published.clone()
    }

    pub fn connected_clients(&self) -> usize {
        self.state.borrow().clients.iter().filter(|c| c.connected).count()
    }

    pub fn is_online(&self) -> bool {
        self.state.borrow().online
    }

    /// Drop every connection and refuse new ones until [`MemoryBus::restore`].
    pub fn drop_connections(&self) {
        let mut state = self.state.borrow_mut();
        state.online = false;
        for client in state.clients.iter_mut().filter(|c| c.connected) {
            client.connected = false;
            client.subscriptions.clear();
            client.inbox.push(TransportEvent::Disconnected);
        }
        log::debug!("Memory bus went offline");
    }

    /// Accept connections again and reconnect every active client.
    pub fn restore(&self) {
        let mut state = self.state.borrow_mut();
        state.online = true;
        for client in state.clients.iter_mut().filter(|c| c.active && !c.connected) {
            client.connected = true;
            client.inbox.push(TransportEvent::Connected);
        }
        log::debug!("Memory bus back online");
    }

    fn with_client<R>(&self, slot: usize, f: impl FnOnce(&mut Client) -> R) -> Option<R> {
        self.state.borrow_mut().clients.get_mut(slot).map(f)
    }
}

/// One client connection on a [`MemoryBus`].
#[derive(Debug)]
pub struct MemoryTransport {
    bus: MemoryBus,
    slot: usize,
    state: ConnectionState,
    subscriptions: Vec<String>,
}

impl MemoryTransport {
    pub fn bus(&self) -> &MemoryBus {
        &self.bus
    }
}

impl Transport for MemoryTransport {
    fn connect(&mut self) -> TransportResult<()> {
        let online = self.bus.is_online();
        let accepted = self.bus.with_client(self.slot, |client| {
            if client.active {
                return Err(TransportError::AlreadyConnected);
            }
            client.active = true;
            if online {
                client.connected = true;
                client.inbox.push(TransportEvent::Connected);
            } else {
                client.inbox.push(TransportEvent::Error {
                    message: "Connection refused".to_string(),
                });
            }
            Ok(())
        });
        accepted.unwrap_or(Err(TransportError::ChannelClosed))?;
        self.state = ConnectionState::Connecting;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.bus.with_client(self.slot, |client| {
            client.active = false;
            client.connected = false;
            client.subscriptions.clear();
            client.inbox.clear();
        });
        self.state = ConnectionState::Disconnected;
    }

    fn state(&self) -> ConnectionState {
        self.state
    }

    fn subscribe(&mut self, destination: &str) -> TransportResult<()> {
        if !self.subscriptions.iter().any(|d| d == destination) {
            self.subscriptions.push(destination.to_string());
        }
        self.bus.with_client(self.slot, |client| {
            if client.connected {
                client.subscriptions.insert(destination.to_string());
            }
        });
        Ok(())
    }

    fn send(&self, destination: &str, body: &str) -> TransportResult<()> {
        let mut state = self.bus.state.borrow_mut();
        let connected = state.clients.get(self.slot).is_some_and(|c| c.connected);
        if self.state != ConnectionState::Connected || !connected {
            return Err(TransportError::NotConnected);
        }
        state.published.push((destination.to_string(), body.to_string()));
        match state.relay_target(destination) {
            Some(topic) => {
                state.deliver(&topic, body);
            }
            None => log::debug!("No relay for {}", destination),
        }
        Ok(())
    }

    fn poll_events(&mut self) -> Vec<TransportEvent> {
        let events = self
            .bus
            .with_client(self.slot, |client| std::mem::take(&mut client.inbox))
            .unwrap_or_default();
        for event in &events {
            self.state = next_state(self.state, event);
            if *event == TransportEvent::Connected {
                // The broker forgot our subscriptions with the old connection.
                let subscriptions = self.subscriptions.clone();
                self.bus.with_client(self.slot, |client| {
                    client.subscriptions.extend(subscriptions);
                });
            }
        }
        events
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}
