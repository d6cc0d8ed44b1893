//! Inkboard Render Library
//!
//! CPU rasterization of board events. The canvas is always reproducible from
//! the remote and local event logs alone.

mod canvas;
mod raster;
mod replay;

pub use canvas::BoardCanvas;
pub use raster::{CoverageMask, Raster, RasterError, RasterResult, Rgba8};
pub use replay::{ReplayEngine, parse_css_color, stroke_coverage};
