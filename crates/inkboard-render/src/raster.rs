//! RGBA8 bitmap the board is painted into.

use image::{Rgba, RgbaImage};
use std::path::Path;
use thiserror::Error;

/// Raster errors.
#[derive(Debug, Error)]
pub enum RasterError {
    #[error("Invalid raster size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },
    #[error("PNG encoding failed: {0}")]
    Png(#[from] png::EncodingError),
    #[error("Failed to write image: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for raster operations.
pub type RasterResult<T> = Result<T, RasterError>;

/// Straight-alpha RGBA color.
pub type Rgba8 = [u8; 4];

/// Per-pixel coverage of one stroke over a rectangular window.
#[derive(Debug, Clone)]
pub struct CoverageMask {
    x0: u32,
    y0: u32,
    width: u32,
    height: u32,
    coverage: Vec<f32>,
}

impl CoverageMask {
    pub(crate) fn new(x0: u32, y0: u32, width: u32, height: u32) -> Self {
        Self {
            x0,
            y0,
            width,
            height,
            coverage: vec![0.0; width as usize * height as usize],
        }
    }

    pub fn origin(&self) -> (u32, u32) {
        (self.x0, self.y0)
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Keep the larger of the stored and the given coverage.
    pub(crate) fn cover(&mut self, x: u32, y: u32, value: f32) {
        if x < self.x0 || y < self.y0 || x >= self.x0 + self.width || y >= self.y0 + self.height {
            return;
        }
        let index = (y - self.y0) as usize * self.width as usize + (x - self.x0) as usize;
        if value > self.coverage[index] {
            self.coverage[index] = value;
        }
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        if x < self.x0 || y < self.y0 || x >= self.x0 + self.width || y >= self.y0 + self.height {
            return 0.0;
        }
        self.coverage[(y - self.y0) as usize * self.width as usize + (x - self.x0) as usize]
    }
}

/// Fixed-size canvas bitmap.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    image: RgbaImage,
}

impl Raster {
    pub fn new(width: u32, height: u32, background: Rgba8) -> RasterResult<Self> {
        if width == 0 || height == 0 {
            return Err(RasterError::InvalidSize { width, height });
        }
        Ok(Self {
            image: RgbaImage::from_pixel(width, height, Rgba(background)),
        })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn clear(&mut self, color: Rgba8) {
        for pixel in self.image.pixels_mut() {
            *pixel = Rgba(color);
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba8> {
        (x < self.width() && y < self.height()).then(|| self.image.get_pixel(x, y).0)
    }

    /// Raw RGBA bytes, row-major.
    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Source-over blend `color` through a coverage mask.
    pub fn composite(&mut self, mask: &CoverageMask, color: Rgba8) {
        let (x0, y0) = mask.origin();
        let (w, h) = mask.size();
        let src_alpha = color[3] as f32 / 255.0;
        for y in y0..(y0 + h).min(self.height()) {
            for x in x0..(x0 + w).min(self.width()) {
                let coverage = mask.get(x, y);
                if coverage <= 0.0 {
                    continue;
                }
                let alpha = src_alpha * coverage;
                let dst = self.image.get_pixel_mut(x, y);
                *dst = Rgba(blend(dst.0, color, alpha));
            }
        }
    }

    /// Encode as PNG.
    pub fn encode_png(&self) -> RasterResult<Vec<u8>> {
        let mut png_data = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut png_data, self.width(), self.height());
            encoder.set_color(png::ColorType::Rgba);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder.write_header()?;
            writer.write_image_data(self.as_bytes())?;
            writer.finish()?;
        }
        Ok(png_data)
    }

    pub fn write_png(&self, path: impl AsRef<Path>) -> RasterResult<()> {
        let path = path.as_ref();
        let png_data = self.encode_png()?;
        std::fs::write(path, &png_data)?;
        log::info!("Wrote {}x{} PNG to {} ({} bytes)", self.width(), self.height(), path.display(), png_data.len());
        Ok(())
    }
}

fn blend(dst: Rgba8, src: Rgba8, alpha: f32) -> Rgba8 {
    let dst_alpha = dst[3] as f32 / 255.0;
    let out_alpha = alpha + dst_alpha * (1.0 - alpha);
    if out_alpha <= 0.0 {
        return [0, 0, 0, 0];
    }
    let channel = |s: u8, d: u8| {
        let value = (s as f32 * alpha + d as f32 * dst_alpha * (1.0 - alpha)) / out_alpha;
        value.round().clamp(0.0, 255.0) as u8
    };
    [
        channel(src[0], dst[0]),
        channel(src[1], dst[1]),
        channel(src[2], dst[2]),
        (out_alpha * 255.0).round().clamp(0.0, 255.0) as u8,
    ]
}
