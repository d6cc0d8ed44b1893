//! Local pan offset layered over the fixed-size canvas.
//!
//! The viewport is a pure display transform. It is never transmitted and
//! never baked into stored event coordinates.

use kurbo::{Affine, Point, Vec2};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Translation of the canvas origin in screen pixels.
    pub offset: Vec2,
}

impl Viewport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canvas to screen transform.
    pub fn transform(&self) -> Affine {
        Affine::translate(self.offset)
    }

    /// Screen to canvas transform.
    pub fn inverse_transform(&self) -> Affine {
        Affine::translate(-self.offset)
    }

    pub fn screen_to_canvas(&self, screen_point: Point) -> Point {
        self.inverse_transform() * screen_point
    }

    pub fn canvas_to_screen(&self, canvas_point: Point) -> Point {
        self.transform() * canvas_point
    }

    /// Pan by a delta in screen pixels.
    pub fn pan(&mut self, delta: Vec2) {
        self.offset += delta;
    }

    pub fn reset(&mut self) {
        self.offset = Vec2::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_by_default() {
        let viewport = Viewport::new();
        let p = Point::new(12.0, 34.0);
        assert_eq!(viewport.screen_to_canvas(p), p);
    }

    #[test]
    fn test_screen_to_canvas_with_offset() {
        let mut viewport = Viewport::new();
        viewport.pan(Vec2::new(50.0, -20.0));
        let canvas = viewport.screen_to_canvas(Point::new(100.0, 100.0));
        assert!((canvas.x - 50.0).abs() < f64::EPSILON);
        assert!((canvas.y - 120.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_roundtrip_conversion() {
        let mut viewport = Viewport::new();
        viewport.pan(Vec2::new(-31.5, 7.25));
        let original = Point::new(123.0, 456.0);
        let back = viewport.canvas_to_screen(viewport.screen_to_canvas(original));
        assert!((back.x - original.x).abs() < 1e-10);
        assert!((back.y - original.y).abs() < 1e-10);
    }

    #[test]
    fn test_pan_accumulates_and_resets() {
        let mut viewport = Viewport::new();
        viewport.pan(Vec2::new(10.0, 20.0));
        viewport.pan(Vec2::new(5.0, -5.0));
        assert_eq!(viewport.offset, Vec2::new(15.0, 15.0));
        viewport.reset();
        assert_eq!(viewport.offset, Vec2::ZERO);
    }
}
