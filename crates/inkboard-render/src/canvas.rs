//! The board bitmap a session paints into.

use crate::raster::{Raster, RasterResult};
use crate::replay::{ReplayEngine, parse_css_color, stroke_coverage};
use inkboard_core::board::RedrawPlan;
use inkboard_core::config::CanvasConfig;
use inkboard_core::event::DrawingEvent;
use inkboard_core::presence::CursorView;
use std::path::Path;

/// Diameter of the dot marking a remote cursor in snapshots.
const CURSOR_DOT_SIZE: f64 = 10.0;

/// Fixed-size board canvas plus the engine that repaints it.
#[derive(Debug, Clone)]
pub struct BoardCanvas {
    raster: Raster,
    engine: ReplayEngine,
    full_redraws: u64,
}

impl BoardCanvas {
    pub fn new(config: &CanvasConfig) -> RasterResult<Self> {
        let engine = ReplayEngine::new(&config.background);
        let raster = Raster::new(config.width, config.height, engine.background())?;
        Ok(Self {
            raster,
            engine,
            full_redraws: 0,
        })
    }

    /// Execute a redraw plan. `Full` replays both logs from scratch,
    /// `Segments` paints only the new pieces of the active local stroke.
    pub fn apply(&mut self, plan: &RedrawPlan, remote: &[DrawingEvent], local: &[DrawingEvent]) {
        match plan {
            RedrawPlan::Full => self.replay(remote, local),
            RedrawPlan::Segments(segments) => {
                for segment in segments {
                    self.engine.apply_segment(&mut self.raster, segment);
                }
            }
        }
    }

    pub fn replay(&mut self, remote: &[DrawingEvent], local: &[DrawingEvent]) {
        self.engine.replay(&mut self.raster, remote, local);
        self.full_redraws += 1;
    }

    /// Number of full replays performed so far.
    pub fn full_redraws(&self) -> u64 {
        self.full_redraws
    }

    pub fn raster(&self) -> &Raster {
        &self.raster
    }

    pub fn engine(&self) -> &ReplayEngine {
        &self.engine
    }

    /// Copy of the canvas with remote cursors drawn on top. The canvas
    /// itself is left untouched.
    pub fn snapshot_with_cursors(&self, cursors: &[CursorView]) -> Raster {
        let mut frame = self.raster.clone();
        for cursor in cursors {
            let Some(color) = parse_css_color(cursor.color) else {
                continue;
            };
            if let Some(mask) = stroke_coverage(&[cursor.position], CURSOR_DOT_SIZE, frame.width(), frame.height()) {
                frame.composite(&mask, color);
            }
        }
        frame
    }

    pub fn write_png(&self, path: impl AsRef<Path>) -> RasterResult<()> {
        self.raster.write_png(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkboard_core::event::{EventKind, Tool, new_id};
    use inkboard_core::stroke::{StrokeSegment, StrokeStyle};
    use kurbo::Point;

    fn config() -> CanvasConfig {
        CanvasConfig {
            width: 48,
            height: 32,
            background: "#ffffff".to_string(),
        }
    }

    fn event(kind: EventKind, stroke: &str, t: u64, x: f64, y: f64) -> DrawingEvent {
        DrawingEvent {
            id: new_id(),
            board_id: 1,
            user_id: 1,
            display_name: "alice".to_string(),
            timestamp: t,
            kind,
            tool: Tool::Pen,
            x,
            y,
            brush_size: 4.0,
            brush_color: "#0000ff".to_string(),
            stroke_id: stroke.to_string(),
        }
    }

    #[test]
    fn test_new_canvas_uses_config() {
        let canvas = BoardCanvas::new(&config()).unwrap();
        assert_eq!((canvas.raster().width(), canvas.raster().height()), (48, 32));
        assert_eq!(canvas.raster().pixel(0, 0), Some([255, 255, 255, 255]));
    }

    #[test]
    fn test_zero_sized_canvas_rejected() {
        let mut config = config();
        config.width = 0;
        assert!(BoardCanvas::new(&config).is_err());
    }

    #[test]
    fn test_segments_then_full_redraw_agree() {
        let start = event(EventKind::Start, "s", 1, 4.0, 16.0);
        let draw = event(EventKind::Draw, "s", 2, 24.0, 16.0);
        let draw2 = event(EventKind::Draw, "s", 3, 40.0, 16.0);
        let style = StrokeStyle::of(&start);

        let mut live = BoardCanvas::new(&config()).unwrap();
        let plan = RedrawPlan::Segments(vec![
            StrokeSegment {
                from: start.position(),
                to: draw.position(),
                style: style.clone(),
            },
            StrokeSegment {
                from: draw.position(),
                to: draw2.position(),
                style,
            },
        ]);
        live.apply(&plan, &[], &[]);
        assert_eq!(live.full_redraws(), 0);
        assert_eq!(live.raster().pixel(30, 16), Some([0, 0, 255, 255]));

        let local = vec![start, draw, draw2];
        let mut replayed = BoardCanvas::new(&config()).unwrap();
        replayed.apply(&RedrawPlan::Full, &[], &local);
        assert_eq!(replayed.full_redraws(), 1);
        assert_eq!(live.raster().pixel(30, 16), replayed.raster().pixel(30, 16));
        assert_eq!(live.raster().pixel(4, 16), replayed.raster().pixel(4, 16));
    }

    #[test]
    fn test_full_redraw_discards_stale_pixels() {
        let mut canvas = BoardCanvas::new(&config()).unwrap();
        let start = event(EventKind::Start, "s", 1, 4.0, 4.0);
        let segment = StrokeSegment {
            from: Point::new(4.0, 4.0),
            to: Point::new(40.0, 4.0),
            style: StrokeStyle::of(&start),
        };
        canvas.apply(&RedrawPlan::Segments(vec![segment]), &[], &[]);
        canvas.apply(&RedrawPlan::Full, &[], &[]);
        assert_eq!(canvas.raster().pixel(20, 4), Some([255, 255, 255, 255]));
    }

    #[test]
    fn test_snapshot_with_cursors_leaves_canvas_clean() {
        let canvas = BoardCanvas::new(&config()).unwrap();
        let cursor = CursorView {
            display_name: "bob".to_string(),
            label: "bob".to_string(),
            photo_ref: None,
            position: Point::new(10.0, 10.0),
            color: "#FF6B6B",
        };
        let frame = canvas.snapshot_with_cursors(&[cursor]);
        assert_eq!(frame.pixel(10, 10), Some([0xFF, 0x6B, 0x6B, 255]));
        assert_eq!(canvas.raster().pixel(10, 10), Some([255, 255, 255, 255]));
    }
}
