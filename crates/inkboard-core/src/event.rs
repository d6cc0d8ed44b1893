//! Drawing and cursor events exchanged between clients on a board.
//!
//! Every payload on the wire uses camelCase field names. Deserialization also
//! accepts the snake_case spellings older clients and servers emitted, so the
//! drift is absorbed here and never leaks into the rest of the crate.

use kurbo::Point;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Numeric board identifier assigned by the board directory.
pub type BoardId = u64;

/// Generate a collision-resistant opaque identifier.
///
/// Used for both event ids and stroke ids. Carries no ordering.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Stroke lifecycle marker carried by each sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Start,
    Draw,
    End,
}

impl EventKind {
    /// Rank used to order samples that share a timestamp.
    pub fn phase(self) -> u8 {
        match self {
            EventKind::Start => 0,
            EventKind::Draw => 1,
            EventKind::End => 2,
        }
    }
}

/// Drawing tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    #[default]
    Pen,
    Eraser,
    /// Pans the viewport; never produces drawing events.
    Hand,
}

impl Tool {
    /// Whether a primary press with this tool starts a stroke.
    pub fn draws(self) -> bool {
        matches!(self, Tool::Pen | Tool::Eraser)
    }
}

/// One immutable pointer sample of a stroke.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawingEvent {
    /// Unique id of this sample.
    pub id: String,
    #[serde(alias = "board_id")]
    pub board_id: BoardId,
    #[serde(alias = "user_id", default)]
    pub user_id: u64,
    #[serde(alias = "display_name", default)]
    pub display_name: String,
    /// Producer wall-clock milliseconds. Orders samples within a stroke.
    pub timestamp: u64,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub tool: Tool,
    /// Canvas-local position, never viewport-transformed.
    pub x: f64,
    pub y: f64,
    #[serde(alias = "brush_size")]
    pub brush_size: f64,
    /// Ignored for the eraser, which always paints the background.
    #[serde(alias = "brush_color")]
    pub brush_color: String,
    /// Shared by every sample of one pointer-down-to-up gesture.
    #[serde(alias = "stroke_id")]
    pub stroke_id: String,
}

impl DrawingEvent {
    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Total order of samples inside a stroke: timestamp, then lifecycle
    /// phase, then id.
    pub fn sample_key(&self) -> (u64, u8, &str) {
        (self.timestamp, self.kind.phase(), self.id.as_str())
    }

    /// Decode a JSON payload.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Encode as a JSON payload.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Decode a batch of events element by element.
///
/// Entries that do not decode are logged and skipped, so one bad entry costs
/// only itself, the same as a bad live message would.
pub fn decode_batch(values: Vec<serde_json::Value>) -> Vec<DrawingEvent> {
    let total = values.len();
    let events: Vec<DrawingEvent> = values
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value(value) {
            Ok(event) => Some(event),
            Err(e) => {
                log::warn!("Skipping malformed event {} of {}: {}", index, total, e);
                None
            }
        })
        .collect();
    if events.len() < total {
        log::warn!("Decoded {} of {} events", events.len(), total);
    }
    events
}

/// Last known pointer position of one participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorUpdate {
    #[serde(alias = "display_name")]
    pub display_name: String,
    #[serde(
        alias = "photoUrl",
        alias = "photo_url",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub photo_ref: Option<String>,
    pub x: f64,
    pub y: f64,
}

impl CursorUpdate {
    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// Request for the stored event history of a board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRequest {
    #[serde(alias = "board_id")]
    pub board_id: BoardId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}
