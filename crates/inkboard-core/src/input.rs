//! Pointer capture: turns raw pointer input into drawing events.
//!
//! One [`InputCapture`] exists per canvas. It is either idle, drawing exactly
//! one stroke, or panning the viewport, never two at once. Every pointer move
//! also yields a cursor broadcast, independent of that state.

use crate::clock::{Clock, SystemClock};
use crate::event::{BoardId, CursorUpdate, DrawingEvent, EventKind, Tool, new_id};
use crate::session::User;
use crate::stroke::{StrokeSegment, StrokeStyle};
use crate::viewport::Viewport;
use kurbo::{Point, Vec2};

/// Mouse button identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// Pointer input in screen coordinates.
#[derive(Debug, Clone)]
pub enum PointerEvent {
    Down { position: Point, button: MouseButton },
    Up { position: Point, button: MouseButton },
    Move { position: Point },
    /// Pointer left the canvas.
    Leave { position: Point },
}

/// Live tool settings chosen in the UI.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSettings {
    pub tool: Tool,
    pub brush_size: f64,
    pub brush_color: String,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            tool: Tool::Pen,
            brush_size: 5.0,
            brush_color: "#000000".to_string(),
        }
    }
}

/// Attributes frozen for the lifetime of one stroke.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveStroke {
    pub stroke_id: String,
    pub tool: Tool,
    pub brush_size: f64,
    pub brush_color: String,
    last_position: Point,
    last_timestamp: u64,
}

impl ActiveStroke {
    fn style(&self) -> StrokeStyle {
        StrokeStyle::new(self.tool, &self.brush_color, self.brush_size)
    }
}

/// Capture state machine.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CaptureState {
    #[default]
    Idle,
    Drawing(ActiveStroke),
    Panning {
        /// Last screen position the viewport was moved to.
        anchor: Point,
    },
}

/// Everything one pointer event produced.
#[derive(Debug, Clone, Default)]
pub struct CaptureOutput {
    /// Drawing events to append locally and publish, in order.
    pub events: Vec<DrawingEvent>,
    /// Cursor position to broadcast.
    pub cursor: Option<CursorUpdate>,
    /// Piece of the active stroke to paint without a full replay.
    pub segment: Option<StrokeSegment>,
    pub viewport_changed: bool,
}

impl CaptureOutput {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.cursor.is_none() && !self.viewport_changed
    }
}

/// Per-canvas pointer capture.
#[derive(Debug)]
pub struct InputCapture<C: Clock = SystemClock> {
    board_id: BoardId,
    identity: Option<User>,
    /// External gate (e.g. signed in with the tool sidebar shown).
    input_enabled: bool,
    settings: ToolSettings,
    viewport: Viewport,
    state: CaptureState,
    clock: C,
}

impl InputCapture<SystemClock> {
    pub fn new(board_id: BoardId) -> Self {
        Self::with_clock(board_id, SystemClock)
    }
}

impl<C: Clock> InputCapture<C> {
    pub fn with_clock(board_id: BoardId, clock: C) -> Self {
        Self {
            board_id,
            identity: None,
            input_enabled: true,
            settings: ToolSettings::default(),
            viewport: Viewport::new(),
            state: CaptureState::Idle,
            clock,
        }
    }

    pub fn board_id(&self) -> BoardId {
        self.board_id
    }

    pub fn identity(&self) -> Option<&User> {
        self.identity.as_ref()
    }

    pub fn set_identity(&mut self, identity: Option<User>) {
        self.identity = identity;
    }

    pub fn is_input_enabled(&self) -> bool {
        self.input_enabled
    }

    pub fn set_input_enabled(&mut self, enabled: bool) {
        self.input_enabled = enabled;
    }

    pub fn settings(&self) -> &ToolSettings {
        &self.settings
    }

    /// Change live settings. An active stroke keeps its own attributes.
    pub fn settings_mut(&mut self) -> &mut ToolSettings {
        &mut self.settings
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn state(&self) -> &CaptureState {
        &self.state
    }

    pub fn is_drawing(&self) -> bool {
        matches!(self.state, CaptureState::Drawing(_))
    }

    pub fn is_panning(&self) -> bool {
        matches!(self.state, CaptureState::Panning { .. })
    }

    pub fn active_stroke_id(&self) -> Option<&str> {
        match &self.state {
            CaptureState::Drawing(stroke) => Some(stroke.stroke_id.as_str()),
            _ => None,
        }
    }

    /// Process one pointer event.
    pub fn handle_pointer_event(&mut self, event: PointerEvent) -> CaptureOutput {
        let mut output = CaptureOutput::default();
        match event {
            PointerEvent::Down { position, button } => self.pointer_down(position, button, &mut output),
            PointerEvent::Move { position } => self.pointer_move(position, &mut output),
            PointerEvent::Up { position, button } => self.pointer_up(position, button, &mut output),
            PointerEvent::Leave { position } => self.pointer_leave(position, &mut output),
        }
        output
    }

    fn pointer_down(&mut self, position: Point, button: MouseButton, output: &mut CaptureOutput) {
        match button {
            MouseButton::Right => {
                // A secondary press always pans; a stroke in progress is closed first.
                if self.is_drawing() {
                    self.finish_stroke(position, output);
                }
                if !self.is_panning() {
                    self.state = CaptureState::Panning { anchor: position };
                }
            }
            MouseButton::Left => {
                if !matches!(self.state, CaptureState::Idle) {
                    return;
                }
                if !self.input_enabled {
                    log::debug!("Pointer down ignored: input disabled");
                    return;
                }
                if self.settings.tool == Tool::Hand {
                    self.state = CaptureState::Panning { anchor: position };
                    return;
                }
                self.start_stroke(position, output);
            }
            MouseButton::Middle => {}
        }
    }

    fn pointer_move(&mut self, position: Point, output: &mut CaptureOutput) {
        if let CaptureState::Panning { anchor } = &mut self.state {
            let delta: Vec2 = position - *anchor;
            *anchor = position;
            self.viewport.pan(delta);
            output.viewport_changed = true;
        } else if self.is_drawing() {
            let canvas_point = self.viewport.screen_to_canvas(position);
            self.extend_stroke(canvas_point, output);
        }

        if let Some(user) = &self.identity {
            output.cursor = Some(user.cursor_at(self.viewport.screen_to_canvas(position)));
        }
    }

    fn pointer_up(&mut self, position: Point, button: MouseButton, output: &mut CaptureOutput) {
        match self.state {
            CaptureState::Panning { .. } => self.state = CaptureState::Idle,
            CaptureState::Drawing(_) if button == MouseButton::Left => {
                self.finish_stroke(position, output);
            }
            _ => {}
        }
    }

    fn pointer_leave(&mut self, position: Point, output: &mut CaptureOutput) {
        match self.state {
            CaptureState::Panning { .. } => self.state = CaptureState::Idle,
            CaptureState::Drawing(_) => self.finish_stroke(position, output),
            CaptureState::Idle => {}
        }
    }

    fn start_stroke(&mut self, position: Point, output: &mut CaptureOutput) {
        let Some(user) = &self.identity else {
            log::debug!("Pointer down ignored: no signed-in identity");
            return;
        };
        if !self.settings.tool.draws() {
            return;
        }

        let canvas_point = self.viewport.screen_to_canvas(position);
        let stroke = ActiveStroke {
            stroke_id: new_id(),
            tool: self.settings.tool,
            brush_size: self.settings.brush_size,
            brush_color: self.settings.brush_color.clone(),
            last_position: canvas_point,
            last_timestamp: self.clock.now_millis(),
        };
        let event = sample(self.board_id, user, &stroke, EventKind::Start, canvas_point, stroke.last_timestamp);
        log::debug!("Stroke {} started at ({}, {})", stroke.stroke_id, canvas_point.x, canvas_point.y);
        output.events.push(event);
        self.state = CaptureState::Drawing(stroke);
    }

    fn extend_stroke(&mut self, canvas_point: Point, output: &mut CaptureOutput) {
        let now = self.clock.now_millis();
        let (CaptureState::Drawing(stroke), Some(user)) = (&mut self.state, &self.identity) else {
            return;
        };
        let timestamp = now.max(stroke.last_timestamp + 1);
        output.events.push(sample(self.board_id, user, stroke, EventKind::Draw, canvas_point, timestamp));
        output.segment = Some(StrokeSegment {
            from: stroke.last_position,
            to: canvas_point,
            style: stroke.style(),
        });
        stroke.last_position = canvas_point;
        stroke.last_timestamp = timestamp;
    }

    fn finish_stroke(&mut self, position: Point, output: &mut CaptureOutput) {
        let now = self.clock.now_millis();
        let canvas_point = self.viewport.screen_to_canvas(position);
        let state = std::mem::take(&mut self.state);
        let (CaptureState::Drawing(stroke), Some(user)) = (state, &self.identity) else {
            return;
        };
        let timestamp = now.max(stroke.last_timestamp + 1);
        output
            .events
            .push(sample(self.board_id, user, &stroke, EventKind::End, canvas_point, timestamp));
        log::debug!("Stroke {} ended", stroke.stroke_id);
    }
}

/// Build one sample carrying the stroke's frozen attributes.
fn sample(
    board_id: BoardId,
    user: &User,
    stroke: &ActiveStroke,
    kind: EventKind,
    position: Point,
    timestamp: u64,
) -> DrawingEvent {
    DrawingEvent {
        id: new_id(),
        board_id,
        user_id: user.id,
        display_name: user.display_name.clone(),
        timestamp,
        kind,
        tool: stroke.tool,
        x: position.x,
        y: position.y,
        brush_size: stroke.brush_size,
        brush_color: stroke.brush_color.clone(),
        stroke_id: stroke.stroke_id.clone(),
    }
}
