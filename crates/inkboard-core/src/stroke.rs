//! Strokes derived from the flat event stream.
//!
//! Nothing here is transmitted. A stroke is the set of samples sharing a
//! `stroke_id`, ordered by sample time, and its style is frozen by the first
//! sample so mid-stroke tool changes never alter what was already drawn.

use crate::event::{DrawingEvent, EventKind, Tool};
use kurbo::Point;
use std::collections::HashMap;

/// How a stroke is painted.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderMode {
    /// Paint with the given CSS color.
    Ink(String),
    /// Paint with the canvas background, whatever it currently is.
    Erase,
}

/// Paint parameters of a whole stroke.
#[derive(Debug, Clone, PartialEq)]
pub struct StrokeStyle {
    pub mode: RenderMode,
    pub width: f64,
}

impl StrokeStyle {
    /// Tool-to-render-mode mapping. The eraser ignores `color`.
    pub fn new(tool: Tool, color: &str, width: f64) -> Self {
        let mode = match tool {
            Tool::Eraser => RenderMode::Erase,
            Tool::Pen | Tool::Hand => RenderMode::Ink(color.to_string()),
        };
        Self { mode, width }
    }

    /// Style implied by a single sample.
    pub fn of(event: &DrawingEvent) -> Self {
        Self::new(event.tool, &event.brush_color, event.brush_size)
    }
}

/// One line piece of the stroke currently being drawn locally.
#[derive(Debug, Clone, PartialEq)]
pub struct StrokeSegment {
    pub from: Point,
    pub to: Point,
    pub style: StrokeStyle,
}

/// Samples of one stroke in sample order.
#[derive(Debug, Clone)]
pub struct Stroke<'a> {
    id: &'a str,
    samples: Vec<&'a DrawingEvent>,
}

impl<'a> Stroke<'a> {
    fn new(id: &'a str, mut samples: Vec<&'a DrawingEvent>) -> Self {
        samples.sort_by(|a, b| a.sample_key().cmp(&b.sample_key()));
        Self { id, samples }
    }

    pub fn id(&self) -> &'a str {
        self.id
    }

    pub fn samples(&self) -> &[&'a DrawingEvent] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Earliest sample.
    pub fn first(&self) -> Option<&'a DrawingEvent> {
        self.samples.first().copied()
    }

    /// Style frozen by the first sample.
    pub fn style(&self) -> Option<StrokeStyle> {
        self.first().map(StrokeStyle::of)
    }

    /// True once an `end` sample has been observed.
    pub fn is_complete(&self) -> bool {
        self.samples.iter().any(|e| e.kind == EventKind::End)
    }

    /// Polyline vertices: the first sample, then every later `draw` sample.
    ///
    /// `end` samples only close the gesture; their position (often where the
    /// pointer left the canvas) is not part of the line.
    pub fn polyline(&self) -> Vec<Point> {
        let mut points = Vec::with_capacity(self.samples.len());
        let mut samples = self.samples.iter();
        if let Some(first) = samples.next() {
            points.push(first.position());
        }
        points.extend(
            samples
                .filter(|e| e.kind == EventKind::Draw)
                .map(|e| e.position()),
        );
        points
    }

    /// Position of this stroke within its layer: first sample time, then id.
    pub fn layer_key(&self) -> (u64, &'a str) {
        (self.first().map(|e| e.timestamp).unwrap_or(0), self.id)
    }
}

/// Group events into strokes ordered for painting, back to front.
///
/// The result depends only on the set of events, never on their order.
pub fn group_strokes<'a, I>(events: I) -> Vec<Stroke<'a>>
where
    I: IntoIterator<Item = &'a DrawingEvent>,
{
    let mut buckets: HashMap<&'a str, Vec<&'a DrawingEvent>> = HashMap::new();
    for event in events {
        buckets.entry(event.stroke_id.as_str()).or_default().push(event);
    }

    let mut strokes: Vec<Stroke<'a>> = buckets
        .into_iter()
        .map(|(id, samples)| Stroke::new(id, samples))
        .collect();
    strokes.sort_by(|a, b| a.layer_key().cmp(&b.layer_key()));
    strokes
}
