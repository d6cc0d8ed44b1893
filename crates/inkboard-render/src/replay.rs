//! Deterministic replay of drawing events into a raster.
//!
//! The canvas is a pure function of the event set: clear, group by stroke,
//! sort each stroke's samples, then paint remote strokes followed by local
//! ones. Each stroke is rasterized as one round-capped, round-joined
//! polyline, with coverage accumulated for the whole stroke before it is
//! blended, so overlapping segments of one stroke never double-darken.

use crate::raster::{CoverageMask, Raster, Rgba8};
use inkboard_core::event::DrawingEvent;
use inkboard_core::stroke::{RenderMode, StrokeSegment, StrokeStyle, group_strokes};
use kurbo::{Point, Vec2};
use peniko::color::{Srgb, parse_color};

const BLACK: Rgba8 = [0, 0, 0, 255];

/// Parse a CSS color string to straight-alpha RGBA8.
pub fn parse_css_color(value: &str) -> Option<Rgba8> {
    let color = parse_color(value.trim()).ok()?;
    let rgba = color.to_alpha_color::<Srgb>().to_rgba8();
    Some([rgba.r, rgba.g, rgba.b, rgba.a])
}

/// Paints events into a [`Raster`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayEngine {
    background: Rgba8,
}

impl ReplayEngine {
    /// `background` is the CSS color used for clearing and erasing.
    pub fn new(background: &str) -> Self {
        let background = parse_css_color(background).unwrap_or_else(|| {
            log::warn!("Unparseable background color {:?}, using white", background);
            [255, 255, 255, 255]
        });
        Self { background }
    }

    pub fn background(&self) -> Rgba8 {
        self.background
    }

    /// Color a stroke is painted with.
    pub fn resolve(&self, mode: &RenderMode) -> Rgba8 {
        match mode {
            RenderMode::Erase => self.background,
            RenderMode::Ink(color) => parse_css_color(color).unwrap_or_else(|| {
                log::warn!("Unparseable stroke color {:?}, using black", color);
                BLACK
            }),
        }
    }

    /// Redraw the whole canvas from `remote` and `local`.
    pub fn replay(&self, raster: &mut Raster, remote: &[DrawingEvent], local: &[DrawingEvent]) {
        raster.clear(self.background);
        let mut painted = 0;
        for layer in [remote, local] {
            for stroke in group_strokes(layer) {
                let Some(style) = stroke.style() else {
                    continue;
                };
                self.paint_polyline(raster, &stroke.polyline(), &style);
                painted += 1;
            }
        }
        log::debug!(
            "Replayed {} strokes from {} remote and {} local events",
            painted,
            remote.len(),
            local.len()
        );
    }

    /// Paint one piece of the active local stroke.
    pub fn apply_segment(&self, raster: &mut Raster, segment: &StrokeSegment) {
        self.paint_polyline(raster, &[segment.from, segment.to], &segment.style);
    }

    fn paint_polyline(&self, raster: &mut Raster, points: &[Point], style: &StrokeStyle) {
        if let Some(mask) = stroke_coverage(points, style.width, raster.width(), raster.height()) {
            raster.composite(&mask, self.resolve(&style.mode));
        }
    }
}

/// Anti-aliased coverage of a polyline of the given width, clipped to the
/// raster. `None` when nothing is visible.
pub fn stroke_coverage(points: &[Point], width: f64, raster_width: u32, raster_height: u32) -> Option<CoverageMask> {
    let first = points.first()?;
    let radius = (width.max(0.0)) / 2.0;
    let pad = radius + 1.0;

    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    let window = clip(min_x - pad, min_y - pad, max_x + pad, max_y + pad, raster_width, raster_height)?;
    let mut mask = CoverageMask::new(window.0, window.1, window.2 - window.0, window.3 - window.1);

    // A single sample (a tap) is a dot.
    let segments: Vec<(Point, Point)> = if points.len() == 1 {
        vec![(*first, *first)]
    } else {
        points.windows(2).map(|w| (w[0], w[1])).collect()
    };

    for (start, end) in segments {
        let Some((x0, y0, x1, y1)) = clip(
            start.x.min(end.x) - pad,
            start.y.min(end.y) - pad,
            start.x.max(end.x) + pad,
            start.y.max(end.y) + pad,
            raster_width,
            raster_height,
        ) else {
            continue;
        };
        for y in y0..y1 {
            for x in x0..x1 {
                let center = Point::new(x as f64 + 0.5, y as f64 + 0.5);
                let coverage = (radius + 0.5 - segment_distance(center, start, end)).clamp(0.0, 1.0);
                if coverage > 0.0 {
                    mask.cover(x, y, coverage as f32);
                }
            }
        }
    }
    Some(mask)
}

/// Integer pixel window `[x0, x1) x [y0, y1)` inside the raster.
fn clip(min_x: f64, min_y: f64, max_x: f64, max_y: f64, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    if !(min_x.is_finite() && min_y.is_finite() && max_x.is_finite() && max_y.is_finite()) {
        return None;
    }
    let x0 = min_x.floor().max(0.0) as u32;
    let y0 = min_y.floor().max(0.0) as u32;
    let x1 = (max_x.ceil().max(0.0) as u32).min(width);
    let y1 = (max_y.ceil().max(0.0) as u32).min(height);
    (x0 < x1 && y0 < y1).then_some((x0, y0, x1, y1))
}

/// Distance from `point` to the segment `start..end`.
fn segment_distance(point: Point, start: Point, end: Point) -> f64 {
    let line_vec = Vec2::new(end.x - start.x, end.y - start.y);
    let point_vec = Vec2::new(point.x - start.x, point.y - start.y);

    let line_len_sq = line_vec.hypot2();
    if line_len_sq < f64::EPSILON {
        return point_vec.hypot();
    }

    let t = (point_vec.dot(line_vec) / line_len_sq).clamp(0.0, 1.0);
    let projection = Point::new(start.x + t * line_vec.x, start.y + t * line_vec.y);
    (point - projection).hypot()
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkboard_core::event::{EventKind, Tool, new_id};

    const WHITE: Rgba8 = [255, 255, 255, 255];
    const RED: Rgba8 = [255, 0, 0, 255];

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
            brush_color: "red".to_string(),
            stroke_id: stroke.to_string(),
        }
    }

    fn canvas() -> Raster {
        Raster::new(64, 64, WHITE).unwrap()
    }

    fn render(remote: &[DrawingEvent], local: &[DrawingEvent]) -> Raster {
        let mut raster = canvas();
        ReplayEngine::new("#ffffff").replay(&mut raster, remote, local);
        raster
    }

    fn scenario() -> Vec<DrawingEvent> {
        let start = event(EventKind::Start, "A", 100, 10.0, 10.0);
        let draw = event(EventKind::Draw, "A", 110, 20.0, 20.0);
        let end = event(EventKind::End, "A", 120, 20.0, 20.0);
        vec![draw, end, start]
    }

    #[test]
    fn test_parse_css_color() {
        assert_eq!(parse_css_color("#ff0000"), Some(RED));
        assert_eq!(parse_css_color("red"), Some(RED));
        assert_eq!(parse_css_color("#00ff0080"), Some([0, 255, 0, 128]));
        assert_eq!(parse_css_color("rgb(0, 0, 255)"), Some([0, 0, 255, 255]));
        assert_eq!(parse_css_color("not-a-color"), None);
    }

    #[test]
    fn test_scenario_out_of_order_delivery() {
        let raster = render(&scenario(), &[]);
        for k in 10..20 {
            assert_eq!(raster.pixel(k, k), Some(RED), "gap at ({k}, {k})");
        }
        assert_eq!(raster.pixel(15, 19), Some(WHITE));
        assert_eq!(raster.pixel(40, 40), Some(WHITE));
        // Round caps extend past the endpoints by the radius.
        assert_ne!(raster.pixel(21, 21), Some(WHITE));
        assert_eq!(raster.pixel(25, 25), Some(WHITE));
    }

    #[test]
    fn test_replay_is_idempotent() {
        let events = scenario();
        let engine = ReplayEngine::new("#ffffff");
        let mut raster = canvas();
        engine.replay(&mut raster, &events, &[]);
        let first = raster.clone();
        engine.replay(&mut raster, &events, &[]);
        assert_eq!(first, raster);
    }

    #[test]
    fn test_arrival_order_does_not_matter() {
        let mut events = Vec::new();
        for (i, stroke) in ["a", "b", "c"].iter().enumerate() {
            let offset = i as f64 * 6.0;
            let t = 1000 + i as u64;
            let mut start = event(EventKind::Start, stroke, t, 5.0 + offset, 5.0);
            start.brush_color = ["red", "blue", "#00ff00"][i].to_string();
            events.push(start);
            events.push(event(EventKind::Draw, stroke, t + 10, 40.0 - offset, 50.0));
            events.push(event(EventKind::End, stroke, t + 20, 40.0 - offset, 50.0));
        }
        let forward = render(&events, &[]);
        let mut reversed = events.clone();
        reversed.reverse();
        let mut rotated = events.clone();
        rotated.rotate_left(4);
        assert_eq!(forward, render(&reversed, &[]));
        assert_eq!(forward, render(&rotated, &[]));
    }

    #[test]
    fn test_first_sample_attributes_win() {
        let mut events = scenario();
        let reference = render(&events, &[]);
        for e in events.iter_mut().filter(|e| e.kind != EventKind::Start) {
            e.brush_color = "blue".to_string();
            e.brush_size = 30.0;
            e.tool = Tool::Eraser;
        }
        assert_eq!(reference, render(&events, &[]));
    }

    #[test]
    fn test_incomplete_stroke_renders() {
        let events = vec![
            event(EventKind::Start, "A", 1, 5.0, 30.0),
            event(EventKind::Draw, "A", 2, 30.0, 30.0),
        ];
        let raster = render(&events, &[]);
        assert_eq!(raster.pixel(20, 30), Some(RED));
    }

    #[test]
    fn test_end_position_is_not_drawn_to() {
        let events = vec![
            event(EventKind::Start, "A", 1, 5.0, 5.0),
            event(EventKind::Draw, "A", 2, 10.0, 5.0),
            event(EventKind::End, "A", 3, 50.0, 50.0),
        ];
        let raster = render(&events, &[]);
        assert_eq!(raster.pixel(30, 30), Some(WHITE));
    }

    #[test]
    fn test_tap_draws_a_dot() {
        let raster = render(&[event(EventKind::Start, "A", 1, 32.0, 32.0)], &[]);
        assert_eq!(raster.pixel(32, 32), Some(RED));
        assert_eq!(raster.pixel(40, 40), Some(WHITE));
    }

    #[test]
    fn test_local_strokes_paint_over_remote() {
        let mut remote = event(EventKind::Start, "r", 500, 10.0, 32.0);
        remote.brush_color = "red".to_string();
        let remote_draw = event(EventKind::Draw, "r", 501, 50.0, 32.0);

        let mut local = event(EventKind::Start, "l", 1, 10.0, 32.0);
        local.brush_color = "blue".to_string();
        let local_draw = event(EventKind::Draw, "l", 2, 50.0, 32.0);

        let raster = render(&[remote, remote_draw], &[local, local_draw]);
        assert_eq!(raster.pixel(30, 32), Some([0, 0, 255, 255]));
    }

    #[test]
    fn test_eraser_paints_background() {
        let ink = vec![
            event(EventKind::Start, "ink", 1, 5.0, 20.0),
            event(EventKind::Draw, "ink", 2, 60.0, 20.0),
        ];
        let mut erase_start = event(EventKind::Start, "erase", 10, 30.0, 5.0);
        erase_start.tool = Tool::Eraser;
        erase_start.brush_size = 10.0;
        let erase = vec![erase_start, event(EventKind::Draw, "erase", 11, 30.0, 40.0)];

        let mut remote = ink.clone();
        remote.extend(erase);
        let engine = ReplayEngine::new("#202020");
        let mut raster = Raster::new(64, 64, WHITE).unwrap();
        engine.replay(&mut raster, &remote, &[]);
        assert_eq!(raster.pixel(30, 20), Some([32, 32, 32, 255]));
        assert_eq!(raster.pixel(10, 20), Some(RED));
    }

    #[test]
    fn test_unparseable_color_falls_back_to_black() {
        let mut start = event(EventKind::Start, "A", 1, 5.0, 5.0);
        start.brush_color = "sparkly".to_string();
        let raster = render(&[start, event(EventKind::Draw, "A", 2, 30.0, 5.0)], &[]);
        assert_eq!(raster.pixel(20, 5), Some(BLACK));
    }

    #[test]
    fn test_out_of_bounds_points_are_clipped() {
        let events = vec![
            event(EventKind::Start, "A", 1, -100.0, 10.0),
            event(EventKind::Draw, "A", 2, 1000.0, 10.0),
        ];
        let raster = render(&events, &[]);
        assert_eq!(raster.pixel(0, 10), Some(RED));
        assert_eq!(raster.pixel(63, 10), Some(RED));
        let far = render(&[event(EventKind::Start, "B", 1, 5000.0, 5000.0)], &[]);
        assert_eq!(far, canvas());
    }

    #[test]
    fn test_apply_segment_matches_replayed_single_segment() {
        let events = vec![
            event(EventKind::Start, "A", 1, 8.0, 8.0),
            event(EventKind::Draw, "A", 2, 40.0, 24.0),
        ];
        let engine = ReplayEngine::new("#ffffff");
        let mut incremental = canvas();
        engine.apply_segment(
            &mut incremental,
            &StrokeSegment {
                from: Point::new(8.0, 8.0),
                to: Point::new(40.0, 24.0),
                style: StrokeStyle::of(&events[0]),
            },
        );
        assert_eq!(incremental, render(&[], &events));
    }

    #[test]
    fn test_backlog_then_live_extension() {
        let mut backlog = Vec::new();
        for s in 0..50u64 {
            let stroke = format!("stroke-{s}");
            let y = 4.0 + (s % 25) as f64 * 10.0;
            let x0 = if s < 25 { 10.0 } else { 200.0 };
            let t0 = 10_000 + s * 100;
            backlog.push(event(EventKind::Start, &stroke, t0, x0, y));
            for k in 1..=8u64 {
                backlog.push(event(EventKind::Draw, &stroke, t0 + k, x0 + k as f64 * 10.0, y));
            }
            backlog.push(event(EventKind::End, &stroke, t0 + 9, x0 + 80.0, y));
        }
        assert_eq!(backlog.len(), 500);

        let engine = ReplayEngine::new("#ffffff");
        let mut raster = Raster::new(400, 260, WHITE).unwrap();
        engine.replay(&mut raster, &backlog, &[]);
        for s in 0..50u64 {
            let y = 4 + (s % 25) as u32 * 10;
            let x = if s < 25 { 50 } else { 240 };
            assert_eq!(raster.pixel(x, y), Some(RED), "stroke {s} missing");
        }
        // Nothing drawn yet where the extension will go.
        assert_eq!(raster.pixel(110, 14), Some(WHITE));

        // Continue stroke-1 (y = 14, ends at x = 90) to x = 130.
        let mut remote = backlog.clone();
        remote.push(event(EventKind::Draw, "stroke-1", 10_100 + 20, 130.0, 14.0));
        engine.replay(&mut raster, &remote, &[]);
        for x in 85..=130 {
            assert_eq!(raster.pixel(x, 14), Some(RED), "discontinuity at x = {x}");
        }
    }
}
