//! One open board: input, transport, event logs and presence wired together.
//!
//! Pointer input flows into the local log and out to the bus; bus traffic
//! flows into the remote log and the presence tracker. The session never
//! paints. It only decides what the renderer has to redo, via [`RedrawPlan`].

use crate::aggregator::{LocalEventLog, RemoteEventLog};
use crate::clock::{Clock, SystemClock};
use crate::config::{BoardDestinations, ClientConfig};
use crate::event::{BoardId, CursorUpdate, DrawingEvent, EventKind, HistoryRequest, decode_batch};
use crate::input::{CaptureOutput, InputCapture, PointerEvent};
use crate::presence::{CursorView, PresenceTracker};
use crate::session::User;
use crate::stroke::StrokeSegment;
use crate::transport::{ConnectionChange, RealtimeChannel, Subscription, Transport, TransportResult};

/// Work the renderer has to do to catch up.
#[derive(Debug, Clone, PartialEq)]
pub enum RedrawPlan {
    /// Clear and replay every event.
    Full,
    /// Paint these pieces of the local active stroke on top.
    Segments(Vec<StrokeSegment>),
}

pub struct BoardSession<T: Transport, C: Clock + Clone = SystemClock> {
    board_id: BoardId,
    destinations: BoardDestinations,
    history_limit: Option<u32>,
    channel: RealtimeChannel<T>,
    drawing: Subscription<DrawingEvent>,
    cursors: Subscription<CursorUpdate>,
    /// Raw history replies; entries are decoded one by one.
    history: Subscription<Vec<serde_json::Value>>,
    capture: InputCapture<C>,
    clock: C,
    remote: RemoteEventLog,
    local: LocalEventLog,
    presence: PresenceTracker,
    full_redraw: bool,
    segments: Vec<StrokeSegment>,
}

impl<T: Transport> BoardSession<T, SystemClock> {
    pub fn new(transport: T, config: &ClientConfig, board_id: BoardId, user: Option<User>) -> TransportResult<Self> {
        Self::with_clock(transport, config, board_id, user, SystemClock)
    }
}

impl<T: Transport, C: Clock + Clone> BoardSession<T, C> {
    pub fn with_clock(
        transport: T,
        config: &ClientConfig,
        board_id: BoardId,
        user: Option<User>,
        clock: C,
    ) -> TransportResult<Self> {
        let destinations = config.destinations.for_board(board_id);
        let mut channel = RealtimeChannel::new(transport);
        let drawing = channel.subscribe(&destinations.draw_topic)?;
        let cursors = channel.subscribe(&destinations.cursor_topic)?;
        let history = channel.subscribe(&destinations.history_reply)?;

        let mut capture = InputCapture::with_clock(board_id, clock.clone());
        let local_name = user.as_ref().map(|u| u.display_name.clone());
        capture.set_identity(user);

        Ok(Self {
            board_id,
            destinations,
            history_limit: config.history_limit,
            channel,
            drawing,
            cursors,
            history,
            capture,
            clock,
            remote: RemoteEventLog::new(config.dedup_remote_events),
            local: LocalEventLog::new(),
            presence: PresenceTracker::new(local_name, config.cursor_ttl_ms),
            // The canvas starts blank and must be painted once.
            full_redraw: true,
            segments: Vec::new(),
        })
    }

    pub fn connect(&mut self) -> TransportResult<()> {
        log::info!("Opening board {}", self.board_id);
        self.channel.connect()
    }

    /// Tear the connection down. Logs are kept.
    pub fn close(&mut self) {
        log::info!("Closing board {}", self.board_id);
        self.channel.disconnect();
    }

    pub fn board_id(&self) -> BoardId {
        self.board_id
    }

    pub fn destinations(&self) -> &BoardDestinations {
        &self.destinations
    }

    /// Drives the connection-status indicator.
    pub fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    pub fn capture(&self) -> &InputCapture<C> {
        &self.capture
    }

    /// Tool settings, input gate and viewport.
    pub fn capture_mut(&mut self) -> &mut InputCapture<C> {
        &mut self.capture
    }

    pub fn set_identity(&mut self, user: Option<User>) {
        self.presence
            .set_local_name(user.as_ref().map(|u| u.display_name.clone()));
        self.capture.set_identity(user);
    }

    pub fn remote(&self) -> &RemoteEventLog {
        &self.remote
    }

    pub fn local(&self) -> &LocalEventLog {
        &self.local
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    pub fn cursor_views(&self) -> Vec<CursorView> {
        self.presence.views()
    }

    /// Feed one pointer event through capture, logging and publishing.
    pub fn handle_pointer_event(&mut self, event: PointerEvent) -> CaptureOutput {
        let output = self.capture.handle_pointer_event(event);

        for event in &output.events {
            self.local.push(event.clone());
            // Local rendering never waits on the bus.
            self.channel.publish(&self.destinations.draw_publish, event);
            if event.kind == EventKind::End {
                self.full_redraw = true;
            }
        }
        if let Some(segment) = &output.segment {
            self.segments.push(segment.clone());
        }
        if let Some(cursor) = &output.cursor {
            self.channel.publish(&self.destinations.cursor_publish, cursor);
        }
        output
    }

    /// Merge a backlog obtained out of band, e.g. from the board directory.
    pub fn load_backlog(&mut self, events: Vec<DrawingEvent>) -> usize {
        let accepted = self.remote.load_backlog(self.foreign(events));
        if accepted > 0 {
            self.full_redraw = true;
        }
        accepted
    }

    /// Process everything the bus delivered since the last call.
    pub fn pump(&mut self) -> Vec<ConnectionChange> {
        let changes = self.channel.pump();
        for change in &changes {
            if *change == ConnectionChange::Connected {
                self.request_history();
            }
        }

        let mut changed = false;
        for event in self.drawing.drain() {
            if event.board_id != self.board_id {
                log::debug!("Ignoring event for board {} on board {}", event.board_id, self.board_id);
                continue;
            }
            if self.local.contains(&event.id) {
                continue;
            }
            changed |= self.remote.push(event);
        }
        for batch in self.history.drain() {
            let batch = self.foreign(decode_batch(batch));
            changed |= self.remote.load_backlog(batch) > 0;
        }
        if changed {
            self.full_redraw = true;
        }

        let now = self.clock.now_millis();
        for update in self.cursors.drain() {
            self.presence.apply(update, now);
        }
        self.presence.expire(now);

        changes
    }

    /// Take the pending redraw work, if any.
    pub fn take_redraw(&mut self) -> Option<RedrawPlan> {
        if self.full_redraw {
            self.full_redraw = false;
            self.segments.clear();
            return Some(RedrawPlan::Full);
        }
        if self.segments.is_empty() {
            return None;
        }
        Some(RedrawPlan::Segments(std::mem::take(&mut self.segments)))
    }

    fn request_history(&self) {
        let request = HistoryRequest {
            board_id: self.board_id,
            limit: self.history_limit,
        };
        if self.channel.publish(&self.destinations.history_request, &request) {
            log::debug!("Requested history for board {}", self.board_id);
        }
    }

    /// Events of this board not produced by this client.
    fn foreign(&self, events: Vec<DrawingEvent>) -> Vec<DrawingEvent> {
        events
            .into_iter()
            .filter(|e| e.board_id == self.board_id && !self.local.contains(&e.id))
            .collect()
    }
}

impl<T: Transport, C: Clock + Clone> Drop for BoardSession<T, C> {
    fn drop(&mut self) {
        self.channel.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::event::fixtures::sample;
    use crate::input::MouseButton;
    use crate::transport::{MemoryBus, MemoryTransport};
    use kurbo::Point;
    use std::rc::Rc;

    type TestSession = BoardSession<MemoryTransport, Rc<ManualClock>>;

    fn open(bus: &MemoryBus, name: &str, clock: &Rc<ManualClock>) -> TestSession {
        let config = ClientConfig::default();
        let user = User::new(name.len() as u64, name);
        let mut session = BoardSession::with_clock(bus.transport(), &config, 1, Some(user), clock.clone()).unwrap();
        session.connect().unwrap();
        assert_eq!(session.pump(), vec![ConnectionChange::Connected]);
        session
    }

    fn stroke(session: &mut TestSession, from: (f64, f64), to: (f64, f64)) {
        session.handle_pointer_event(PointerEvent::Down {
            position: Point::new(from.0, from.1),
            button: MouseButton::Left,
        });
        session.handle_pointer_event(PointerEvent::Move {
            position: Point::new(to.0, to.1),
        });
        session.handle_pointer_event(PointerEvent::Up {
            position: Point::new(to.0, to.1),
            button: MouseButton::Left,
        });
    }

    #[test]
    fn test_connect_requests_history() {
        let bus = MemoryBus::new();
        let clock = Rc::new(ManualClock::new(0));
        let _session = open(&bus, "alice", &clock);
        let published = bus.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "/app/board/1/history");
        let request: HistoryRequest = serde_json::from_str(&published[0].1).unwrap();
        assert_eq!(request.board_id, 1);
    }

    #[test]
    fn test_history_requested_again_after_reconnect() {
        let bus = MemoryBus::new();
        let clock = Rc::new(ManualClock::new(0));
        let mut session = open(&bus, "alice", &clock);
        bus.drop_connections();
        assert_eq!(session.pump(), vec![ConnectionChange::Disconnected]);
        assert!(!session.is_connected());
        bus.restore();
        assert_eq!(session.pump(), vec![ConnectionChange::Connected]);
        let requests = bus
            .published()
            .iter()
            .filter(|(d, _)| d == "/app/board/1/history")
            .count();
        assert_eq!(requests, 2);
    }

    #[test]
    fn test_strokes_reach_peers() {
        let bus = MemoryBus::new();
        let clock = Rc::new(ManualClock::new(100));
        let mut alice = open(&bus, "alice", &clock);
        let mut bob = open(&bus, "bob", &clock);
        alice.take_redraw();
        bob.take_redraw();

        stroke(&mut alice, (10.0, 10.0), (20.0, 20.0));
        assert_eq!(alice.local().len(), 3);

        alice.pump();
        bob.pump();
        assert_eq!(bob.remote().len(), 3);
        assert_eq!(bob.take_redraw(), Some(RedrawPlan::Full));
        // Own echoes never land in the remote log.
        assert!(alice.remote().is_empty());
    }

    #[test]
    fn test_segments_while_drawing_then_full_on_end() {
        let bus = MemoryBus::new();
        let clock = Rc::new(ManualClock::new(0));
        let mut alice = open(&bus, "alice", &clock);
        assert_eq!(alice.take_redraw(), Some(RedrawPlan::Full));
        assert_eq!(alice.take_redraw(), None);

        alice.handle_pointer_event(PointerEvent::Down {
            position: Point::new(0.0, 0.0),
            button: MouseButton::Left,
        });
        alice.handle_pointer_event(PointerEvent::Move {
            position: Point::new(5.0, 0.0),
        });
        match alice.take_redraw() {
            Some(RedrawPlan::Segments(segments)) => {
                assert_eq!(segments.len(), 1);
                assert_eq!(segments[0].to, Point::new(5.0, 0.0));
            }
            other => panic!("unexpected plan {other:?}"),
        }

        alice.handle_pointer_event(PointerEvent::Up {
            position: Point::new(5.0, 0.0),
            button: MouseButton::Left,
        });
        assert_eq!(alice.take_redraw(), Some(RedrawPlan::Full));
    }

    #[test]
    fn test_history_reply_loaded_as_backlog() {
        let bus = MemoryBus::new();
        let clock = Rc::new(ManualClock::new(0));
        let mut session = open(&bus, "alice", &clock);
        session.take_redraw();

        let mut other_board = sample(EventKind::Start, "x", 1, 0.0, 0.0);
        other_board.board_id = 9;
        let backlog = vec![
            sample(EventKind::Start, "a", 1, 0.0, 0.0),
            sample(EventKind::End, "a", 2, 0.0, 0.0),
            other_board,
        ];
        bus.deliver("/user/queue/history", &serde_json::to_string(&backlog).unwrap());
        session.pump();
        assert_eq!(session.remote().len(), 2);
        assert_eq!(session.take_redraw(), Some(RedrawPlan::Full));

        // A repeated reply is absorbed by id dedup.
        bus.deliver("/user/queue/history", &serde_json::to_string(&backlog).unwrap());
        session.pump();
        assert_eq!(session.remote().len(), 2);
        assert_eq!(session.take_redraw(), None);
    }

    #[test]
    fn test_bad_history_entry_costs_only_itself() {
        let bus = MemoryBus::new();
        let clock = Rc::new(ManualClock::new(0));
        let mut session = open(&bus, "alice", &clock);

        let mut entries: Vec<serde_json::Value> = (0..499u64)
            .map(|i| {
                let stroke = format!("s{}", i / 10);
                serde_json::to_value(sample(EventKind::Draw, &stroke, i, i as f64, 0.0)).unwrap()
            })
            .collect();
        let mut laser = serde_json::to_value(sample(EventKind::Draw, "s0", 1000, 0.0, 0.0)).unwrap();
        laser["tool"] = serde_json::json!("laser");
        entries.insert(250, laser);

        bus.deliver("/user/queue/history", &serde_json::Value::Array(entries).to_string());
        session.pump();
        assert_eq!(session.remote().len(), 499);
    }

    #[test]
    fn test_foreign_board_events_ignored() {
        let bus = MemoryBus::new();
        let clock = Rc::new(ManualClock::new(0));
        let mut session = open(&bus, "alice", &clock);
        let mut event = sample(EventKind::Start, "a", 1, 0.0, 0.0);
        event.board_id = 2;
        bus.deliver("/topic/board/1/draw", &event.to_json().unwrap());
        session.pump();
        assert!(session.remote().is_empty());
    }

    #[test]
    fn test_cursor_presence() {
        let bus = MemoryBus::new();
        let clock = Rc::new(ManualClock::new(0));
        let mut alice = open(&bus, "alice", &clock);
        let mut bob = open(&bus, "bob", &clock);

        alice.handle_pointer_event(PointerEvent::Move {
            position: Point::new(42.0, 24.0),
        });
        alice.pump();
        bob.pump();

        let views = bob.cursor_views();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].display_name, "alice");
        assert_eq!(views[0].position, Point::new(42.0, 24.0));
        assert!(alice.cursor_views().is_empty());
    }

    #[test]
    fn test_drawing_while_offline_is_local_only() {
        let bus = MemoryBus::new();
        let clock = Rc::new(ManualClock::new(0));
        let mut alice = open(&bus, "alice", &clock);
        let mut bob = open(&bus, "bob", &clock);

        bus.drop_connections();
        alice.pump();
        stroke(&mut alice, (0.0, 0.0), (1.0, 1.0));
        assert_eq!(alice.local().len(), 3);

        bus.restore();
        alice.pump();
        bob.pump();
        assert!(bob.remote().is_empty());
    }

    #[test]
    fn test_close_releases_connection() {
        let bus = MemoryBus::new();
        let clock = Rc::new(ManualClock::new(0));
        let mut alice = open(&bus, "alice", &clock);
        let bob = open(&bus, "bob", &clock);
        assert_eq!(bus.connected_clients(), 2);
        alice.close();
        assert!(!alice.is_connected());
        drop(bob);
        assert_eq!(bus.connected_clients(), 0);
    }

    #[test]
    fn test_disabled_input_publishes_nothing() {
        let bus = MemoryBus::new();
        let clock = Rc::new(ManualClock::new(0));
        let mut alice = open(&bus, "alice", &clock);
        alice.capture_mut().set_input_enabled(false);
        stroke(&mut alice, (0.0, 0.0), (3.0, 3.0));
        assert!(alice.local().is_empty());
        let draws = bus
            .published()
            .iter()
            .filter(|(d, _)| d == "/app/board/1/draw")
            .count();
        assert_eq!(draws, 0);
    }
}
