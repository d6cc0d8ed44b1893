//! STOMP-over-WebSocket client for native platforms.
//!
//! Uses a background thread for non-blocking operation. The thread owns the
//! socket, keeps heart-beats flowing, reconnects after a fixed delay and
//! re-subscribes every registered destination on each successful handshake.

use super::stomp::{Command, Frame, FrameReader, HeartBeat};
use super::{ConnectionState, Transport, TransportError, TransportEvent, TransportResult, next_state};
use std::net::TcpStream;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, TryRecvError, channel};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket, connect};
use url::Url;

const READ_TIMEOUT: Duration = Duration::from_millis(50);
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection parameters for [`StompTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct StompConfig {
    pub url: String,
    pub heart_beat: HeartBeat,
    /// `None` disables reconnecting.
    pub reconnect_delay: Option<Duration>,
    pub auth_token: Option<String>,
}

impl StompConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            heart_beat: HeartBeat::new(4000, 4000),
            reconnect_delay: Some(Duration::from_secs(5)),
            auth_token: None,
        }
    }

    pub fn from_client(config: &crate::config::ClientConfig) -> Self {
        Self {
            url: config.broker_url.clone(),
            heart_beat: HeartBeat::new(config.heartbeat_outgoing_ms, config.heartbeat_incoming_ms),
            reconnect_delay: config.reconnect_delay(),
            auth_token: config.auth_token.clone(),
        }
    }
}

/// Commands sent to the socket thread.
enum WsCommand {
    Send { destination: String, body: String },
    Subscribe(String),
    Close,
}

/// How one connection attempt ended.
enum Outcome {
    /// Close requested or owner gone; do not reconnect.
    Closed,
    /// Connection failed or dropped.
    Lost,
}

pub struct StompTransport {
    config: StompConfig,
    state: ConnectionState,
    /// Destinations to subscribe on every connect.
    subscriptions: Vec<String>,
    /// Channel to send commands to the socket thread.
    cmd_tx: Option<Sender<WsCommand>>,
    /// Channel to receive events from the socket thread.
    event_rx: Option<Receiver<TransportEvent>>,
    /// Handle to the socket thread. It exits on close, or after a lost
    /// connection when reconnecting is disabled.
    thread: Option<JoinHandle<()>>,
}

impl StompTransport {
    pub fn new(config: StompConfig) -> Self {
        Self {
            config,
            state: ConnectionState::Disconnected,
            subscriptions: Vec::new(),
            cmd_tx: None,
            event_rx: None,
            thread: None,
        }
    }

    pub fn config(&self) -> &StompConfig {
        &self.config
    }

    /// Forget the socket thread and both channels to it.
    fn release(&mut self) {
        self.cmd_tx = None;
        self.event_rx = None;
        self.thread = None;
    }
}

impl Transport for StompTransport {
    fn connect(&mut self) -> TransportResult<()> {
        if self.thread.as_ref().is_some_and(JoinHandle::is_finished) {
            log::debug!("Socket thread has exited, releasing it");
            let stale = self.poll_events();
            if !stale.is_empty() {
                log::debug!("Discarding {} events from the previous connection", stale.len());
            }
            self.release();
        }
        if self.cmd_tx.is_some() {
            return Err(TransportError::AlreadyConnected);
        }

        let parsed_url =
            Url::parse(&self.config.url).map_err(|e| TransportError::InvalidUrl(format!("{}: {}", self.config.url, e)))?;
        // tungstenite is built without TLS support, so only plain `ws` works.
        if parsed_url.scheme() != "ws" {
            return Err(TransportError::UnsupportedScheme(parsed_url.scheme().to_string()));
        }
        let host = parsed_url.host_str().unwrap_or("localhost").to_string();

        self.state = ConnectionState::Connecting;

        let (cmd_tx, cmd_rx) = channel::<WsCommand>();
        let (event_tx, event_rx) = channel::<TransportEvent>();
        let worker = Worker {
            config: self.config.clone(),
            host,
            subscriptions: self.subscriptions.clone(),
            cmd_rx,
            event_tx,
        };
        let handle = thread::spawn(move || worker.run());

        self.cmd_tx = Some(cmd_tx);
        self.event_rx = Some(event_rx);
        self.thread = Some(handle);
        Ok(())
    }

    fn disconnect(&mut self) {
        if let Some(tx) = &self.cmd_tx {
            let _ = tx.send(WsCommand::Close);
        }
        self.release();
        self.state = ConnectionState::Disconnected;
    }

    fn state(&self) -> ConnectionState {
        self.state
    }

    fn subscribe(&mut self, destination: &str) -> TransportResult<()> {
        if self.subscriptions.iter().any(|d| d == destination) {
            return Ok(());
        }
        self.subscriptions.push(destination.to_string());
        if let Some(tx) = &self.cmd_tx {
            tx.send(WsCommand::Subscribe(destination.to_string()))
                .map_err(|_| TransportError::ChannelClosed)?;
        }
        Ok(())
    }

    fn send(&self, destination: &str, body: &str) -> TransportResult<()> {
        if self.state != ConnectionState::Connected {
            return Err(TransportError::NotConnected);
        }
        let tx = self.cmd_tx.as_ref().ok_or(TransportError::NotConnected)?;
        tx.send(WsCommand::Send {
            destination: destination.to_string(),
            body: body.to_string(),
        })
        .map_err(|_| TransportError::ChannelClosed)
    }

    fn poll_events(&mut self) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        if let Some(rx) = &self.event_rx {
            while let Ok(event) = rx.try_recv() {
                self.state = next_state(self.state, &event);
                events.push(event);
            }
        }
        events
    }
}

impl Drop for StompTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

/// State owned by the socket thread.
struct Worker {
    config: StompConfig,
    host: String,
    subscriptions: Vec<String>,
    cmd_rx: Receiver<WsCommand>,
    event_tx: Sender<TransportEvent>,
}

impl Worker {
    fn run(mut self) {
        loop {
            match self.run_connection() {
                Outcome::Closed => break,
                Outcome::Lost => {}
            }
            let Some(delay) = self.config.reconnect_delay else {
                log::info!("Reconnect disabled, socket thread exiting");
                break;
            };
            log::info!("Reconnecting in {} ms", delay.as_millis());
            if let Outcome::Closed = self.wait(delay) {
                break;
            }
        }
        log::info!("Socket thread exiting");
    }

    fn emit(&self, event: TransportEvent) -> bool {
        self.event_tx.send(event).is_ok()
    }

    /// Sleep between attempts while still honouring commands.
    fn wait(&mut self, delay: Duration) -> Outcome {
        let deadline = Instant::now() + delay;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Outcome::Lost;
            }
            match self.cmd_rx.recv_timeout(remaining) {
                Ok(WsCommand::Close) | Err(RecvTimeoutError::Disconnected) => return Outcome::Closed,
                Ok(WsCommand::Subscribe(destination)) => {
                    self.register(destination);
                }
                Ok(WsCommand::Send { destination, .. }) => {
                    log::debug!("Dropping publish to {} while disconnected", destination);
                }
                Err(RecvTimeoutError::Timeout) => return Outcome::Lost,
            }
        }
    }

    fn register(&mut self, destination: String) -> bool {
        if self.subscriptions.contains(&destination) {
            return false;
        }
        self.subscriptions.push(destination);
        true
    }

    fn run_connection(&mut self) -> Outcome {
        log::info!("Socket thread: connecting to {}", self.config.url);
        let mut socket = match connect(self.config.url.as_str()) {
            Ok((socket, response)) => {
                log::info!("WebSocket connected, status: {}", response.status());
                socket
            }
            Err(e) => {
                log::error!("WebSocket connection failed: {}", e);
                let alive = self.emit(TransportEvent::Error {
                    message: format!("Connection failed: {}", e),
                });
                return if alive { Outcome::Lost } else { Outcome::Closed };
            }
        };

        // Read timeout keeps the loop responsive to commands.
        match socket.get_mut() {
            MaybeTlsStream::Plain(tcp) => {
                let _ = tcp.set_read_timeout(Some(READ_TIMEOUT));
                let _ = tcp.set_write_timeout(Some(WRITE_TIMEOUT));
            }
            #[allow(unreachable_patterns)]
            _ => {
                log::debug!("TLS or other stream - using default timeout handling");
            }
        }

        let auth = self.config.auth_token.as_deref();
        let connect_frame = Frame::connect(&self.host, self.config.heart_beat, auth);
        if let Err(e) = socket.send(Message::Text(connect_frame.encode())) {
            log::error!("Failed to send CONNECT: {}", e);
            return Outcome::Lost;
        }

        let mut reader = FrameReader::new();
        let server_beat = match self.await_connected(&mut socket, &mut reader) {
            Ok(beat) => beat,
            Err(outcome) => return outcome,
        };
        let (send_every, expect_every) = HeartBeat::negotiate(self.config.heart_beat, server_beat);
        log::debug!("Heart-beat negotiated: send {:?}, expect {:?}", send_every, expect_every);

        let mut next_sub_id = 0usize;
        for destination in self.subscriptions.clone() {
            if !send_subscribe(&mut socket, &mut next_sub_id, &destination) {
                return Outcome::Lost;
            }
        }
        if !self.emit(TransportEvent::Connected) {
            let _ = socket.close(None);
            return Outcome::Closed;
        }

        let outcome = self.pump(&mut socket, &mut reader, &mut next_sub_id, send_every, expect_every);
        if let Outcome::Lost = outcome {
            if !self.emit(TransportEvent::Disconnected) {
                return Outcome::Closed;
            }
        }
        outcome
    }

    /// Read until CONNECTED arrives. Returns the server's heart-beat header.
    fn await_connected(&mut self, socket: &mut Socket, reader: &mut FrameReader) -> Result<HeartBeat, Outcome> {
        let deadline = Instant::now() + HANDSHAKE_TIMEOUT;
        loop {
            if let Ok(WsCommand::Close) | Err(TryRecvError::Disconnected) = self.peek_close() {
                let _ = socket.close(None);
                return Err(Outcome::Closed);
            }
            if Instant::now() >= deadline {
                log::error!("STOMP handshake timed out");
                self.emit(TransportEvent::Error {
                    message: "STOMP handshake timed out".to_string(),
                });
                return Err(Outcome::Lost);
            }
            match read_into(socket, reader) {
                Ok(_) => {}
                Err(()) => return Err(Outcome::Lost),
            }
            loop {
                match reader.next_frame() {
                    Ok(Some(frame)) if frame.command == Command::Connected => {
                        let beat = frame
                            .get("heart-beat")
                            .map(HeartBeat::parse)
                            .transpose()
                            .unwrap_or_else(|e| {
                                log::warn!("{}", e);
                                None
                            })
                            .unwrap_or_default();
                        log::info!("STOMP session established (version {})", frame.get("version").unwrap_or("1.0"));
                        return Ok(beat);
                    }
                    Ok(Some(frame)) if frame.command == Command::Error => {
                        let message = error_message(&frame);
                        log::error!("Broker rejected CONNECT: {}", message);
                        self.emit(TransportEvent::Error { message });
                        return Err(Outcome::Lost);
                    }
                    Ok(Some(frame)) => log::debug!("Ignoring {} before CONNECTED", frame.command),
                    Ok(None) => break,
                    Err(e) => {
                        log::warn!("Malformed frame during handshake: {}", e);
                        reader.clear();
                        break;
                    }
                }
            }
        }
    }

    /// Only Close matters during the handshake; other commands stay queued.
    fn peek_close(&mut self) -> Result<WsCommand, TryRecvError> {
        match self.cmd_rx.try_recv() {
            Ok(WsCommand::Subscribe(destination)) => {
                self.register(destination);
                Err(TryRecvError::Empty)
            }
            Ok(WsCommand::Send { destination, .. }) => {
                log::debug!("Dropping publish to {} before CONNECTED", destination);
                Err(TryRecvError::Empty)
            }
            other => other,
        }
    }

    fn pump(
        &mut self,
        socket: &mut Socket,
        reader: &mut FrameReader,
        next_sub_id: &mut usize,
        send_every: Option<Duration>,
        expect_every: Option<Duration>,
    ) -> Outcome {
        let mut last_sent = Instant::now();
        let mut last_received = Instant::now();

        loop {
            // Check for commands (non-blocking)
            loop {
                match self.cmd_rx.try_recv() {
                    Ok(WsCommand::Send { destination, body }) => {
                        log::debug!("Sending to {}: {}", destination, super::preview(&body));
                        let frame = Frame::send(&destination, &body);
                        if let Err(e) = socket.send(Message::Text(frame.encode())) {
                            log::error!("WebSocket send error: {}", e);
                            return Outcome::Lost;
                        }
                        last_sent = Instant::now();
                    }
                    Ok(WsCommand::Subscribe(destination)) => {
                        if self.register(destination.clone()) && !send_subscribe(socket, next_sub_id, &destination) {
                            return Outcome::Lost;
                        }
                        last_sent = Instant::now();
                    }
                    Ok(WsCommand::Close) => {
                        log::info!("Close requested");
                        let _ = socket.send(Message::Text(Frame::disconnect().encode()));
                        let _ = socket.close(None);
                        return Outcome::Closed;
                    }
                    Err(TryRecvError::Disconnected) => {
                        log::info!("Command channel disconnected");
                        let _ = socket.close(None);
                        return Outcome::Closed;
                    }
                    Err(TryRecvError::Empty) => break,
                }
            }

            if let Some(interval) = send_every {
                if last_sent.elapsed() >= interval {
                    if let Err(e) = socket.send(Message::Text("\n".to_string())) {
                        log::error!("Heart-beat send error: {}", e);
                        return Outcome::Lost;
                    }
                    last_sent = Instant::now();
                }
            }

            match read_into(socket, reader) {
                Ok(true) => last_received = Instant::now(),
                Ok(false) => {
                    if let Some(interval) = expect_every {
                        if last_received.elapsed() > interval * 2 {
                            log::warn!("No traffic from broker for {:?}, dropping connection", last_received.elapsed());
                            return Outcome::Lost;
                        }
                    }
                    continue;
                }
                Err(()) => return Outcome::Lost,
            }

            loop {
                match reader.next_frame() {
                    Ok(Some(frame)) => {
                        if !self.dispatch(frame) {
                            let _ = socket.close(None);
                            return Outcome::Closed;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        log::warn!("Discarding malformed STOMP data: {}", e);
                        reader.clear();
                        break;
                    }
                }
            }
        }
    }

    /// Forward one inbound frame. Returns false once the owner is gone.
    fn dispatch(&self, frame: Frame) -> bool {
        match frame.command {
            Command::Message => {
                let Some(destination) = frame.get("destination").map(str::to_string) else {
                    log::warn!("MESSAGE frame without destination");
                    return true;
                };
                self.emit(TransportEvent::Message {
                    destination,
                    body: frame.body,
                })
            }
            Command::Error => {
                let message = error_message(&frame);
                log::error!("Broker error: {}", message);
                self.emit(TransportEvent::Error { message })
            }
            Command::Receipt => true,
            other => {
                log::debug!("Ignoring {} frame", other);
                true
            }
        }
    }
}

fn error_message(frame: &Frame) -> String {
    match frame.get("message") {
        Some(message) => message.to_string(),
        None => frame.body.clone(),
    }
}

fn send_subscribe(socket: &mut Socket, next_sub_id: &mut usize, destination: &str) -> bool {
    let id = format!("sub-{}", *next_sub_id);
    *next_sub_id += 1;
    log::debug!("Subscribing {} to {}", id, destination);
    match socket.send(Message::Text(Frame::subscribe(&id, destination).encode())) {
        Ok(()) => true,
        Err(e) => {
            log::error!("Failed to subscribe to {}: {}", destination, e);
            false
        }
    }
}

/// Read one WebSocket message into the frame buffer.
///
/// `Ok(true)` when traffic arrived, `Ok(false)` on read timeout, `Err` when
/// the connection is gone.
fn read_into(socket: &mut Socket, reader: &mut FrameReader) -> Result<bool, ()> {
    match socket.read() {
        Ok(Message::Text(txt)) => {
            reader.push(txt.as_bytes());
            Ok(true)
        }
        Ok(Message::Binary(data)) => {
            reader.push(&data);
            Ok(true)
        }
        Ok(Message::Ping(data)) => {
            let _ = socket.send(Message::Pong(data));
            Ok(true)
        }
        Ok(Message::Close(_)) => {
            log::info!("WebSocket received close frame");
            Err(())
        }
        Ok(_) => Ok(true),
        Err(tungstenite::Error::Io(ref e))
            if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut =>
        {
            Ok(false)
        }
        Err(e) => {
            log::error!("WebSocket read error: {}", e);
            Err(())
        }
    }
}
