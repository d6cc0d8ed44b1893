//! Inkboard Core Library
//!
//! Platform-agnostic drawing synchronization for the Inkboard whiteboard:
//! pointer capture, the event model, the realtime bus connection, remote
//! event aggregation and cursor presence. Painting lives in `inkboard-render`.

pub mod aggregator;
pub mod board;
pub mod clock;
pub mod config;
pub mod event;
pub mod input;
pub mod presence;
pub mod session;
pub mod stroke;
pub mod transport;
pub mod viewport;

pub use aggregator::{LocalEventLog, RemoteEventLog};
pub use board::{BoardSession, RedrawPlan};
pub use clock::{Clock, ManualClock, SystemClock};
pub use self::config::{ClientConfig, ConfigError};
pub use event::{BoardId, CursorUpdate, DrawingEvent, EventKind, HistoryRequest, Tool, decode_batch, new_id};
pub use input::{CaptureOutput, CaptureState, InputCapture, MouseButton, PointerEvent, ToolSettings};
pub use presence::{CursorView, PresenceTracker};
pub use session::{AuthSession, BoardDirectory, BoardDetails, BoardSummary, SessionError, User};
pub use stroke::{RenderMode, Stroke, StrokeSegment, StrokeStyle, group_strokes};
pub use transport::{ConnectionChange, ConnectionState, RealtimeChannel, Transport, TransportError, TransportEvent};
pub use viewport::Viewport;
