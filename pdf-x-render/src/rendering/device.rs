//! Device trait for rendering backend abstraction.
//!
//! A [`Device`] is the drawing surface the display list is played back
//! against. It keeps its own transform, clip and paint, mirroring the
//! operator set of a 2D graphics context: set or concatenate the transform,
//! set or intersect the clip, select a paint, fill and stroke paths, draw
//! images. Coordinates passed to drawing calls are in the current user
//! space of the device, i.e. they are mapped through [`Device::transform`].

use super::graphics_state::{ClipRegion, Color, FillRule, StrokeProps};
use super::path::Path;
use super::tiling_pattern::TilePaint;
use super::transform::{IDENTITY, Matrix, concat, scale_factors, transform_rect_bounds};
use crate::core::error::PDFResult;
use std::sync::Arc;

/// Paint for drawing operations.
#[derive(Debug, Clone)]
pub enum Paint {
    /// Solid color
    Solid(Color),
    /// Repeated tile of a tiling pattern
    Tile(Arc<TilePaint>),
}

impl Paint {
    /// Create a solid black paint.
    pub fn black() -> Self {
        Paint::Solid(Color::black())
    }

    /// Create a solid paint from a color.
    pub fn from_color(color: Color) -> Self {
        Paint::Solid(color)
    }
}

impl Default for Paint {
    fn default() -> Self {
        Paint::black()
    }
}

impl PartialEq for Paint {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Paint::Solid(a), Paint::Solid(b)) => a == b,
            (Paint::Tile(a), Paint::Tile(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Decoded image pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Non-premultiplied RGBA, 4 bytes per pixel, top row first
    pub data: Vec<u8>,
    /// Whether any pixel is not fully opaque (stencil masks)
    pub has_alpha: bool,
}

impl ImageData {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        let has_alpha = data.chunks_exact(4).any(|px| px[3] != 255);
        ImageData {
            width,
            height,
            data,
            has_alpha,
        }
    }

    /// Color of pixel (x, y) as RGBA.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = ((y * self.width + x) * 4) as usize;
        self.data.get(i..i + 4).map(|px| [px[0], px[1], px[2], px[3]])
    }
}

/// A surface that can render PDF drawing operations.
pub trait Device {
    /// Current user space to device space transform.
    fn transform(&self) -> Matrix;

    fn set_transform(&mut self, matrix: &Matrix);

    /// Concatenate a transformation matrix to the current transform.
    fn concat_transform(&mut self, matrix: &Matrix) {
        let m = concat(&self.transform(), matrix);
        self.set_transform(&m);
    }

    /// Current clip in device space, `None` when unclipped.
    fn clip(&self) -> Option<ClipRegion>;

    /// Replaces the clip. The region is in device space.
    fn set_clip(&mut self, clip: Option<ClipRegion>);

    /// Intersects the clip with `path`, given in current user space.
    fn clip_path(&mut self, path: &Path, rule: FillRule) {
        let device_path = path.transformed(&self.transform());
        let mut region = self.clip().unwrap_or_default();
        region.intersect(device_path, rule);
        self.set_clip(Some(region));
    }

    /// Selects the paint used by subsequent fills and strokes.
    fn set_paint(&mut self, paint: Paint);

    /// Constant opacity applied to subsequent drawing.
    fn set_alpha(&mut self, alpha: f32);

    fn fill_path(&mut self, path: &Path, rule: FillRule) -> PDFResult<()>;

    fn stroke_path(&mut self, path: &Path, stroke: &StrokeProps) -> PDFResult<()>;

    /// Draws `image` into the unit square of the current user space, the
    /// first image row at y = 1.
    fn draw_image(&mut self, image: &ImageData) -> PDFResult<()>;

    /// Surface size in device pixels.
    fn size(&self) -> (u32, u32);
}

/// A drawing call captured by [`RecordingDevice`], in device space.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceOp {
    Fill {
        path: Path,
        rule: FillRule,
        paint: Paint,
        alpha: f32,
        clip: Option<ClipRegion>,
    },
    Stroke {
        path: Path,
        stroke: StrokeProps,
        /// Device units per user space unit along x and y
        scale: (f64, f64),
        paint: Paint,
        alpha: f32,
        clip: Option<ClipRegion>,
    },
    Image {
        width: u32,
        height: u32,
        /// Device bounds of the unit square
        bounds: [f64; 4],
        clip: Option<ClipRegion>,
    },
}

impl DeviceOp {
    /// Device-space bounding box of the drawn geometry.
    pub fn bounds(&self) -> Option<[f64; 4]> {
        match self {
            DeviceOp::Fill { path, .. } | DeviceOp::Stroke { path, .. } => path
                .bounding_box()
                .map(|(x0, y0, x1, y1)| [x0, y0, x1, y1]),
            DeviceOp::Image { bounds, .. } => Some(*bounds),
        }
    }
}

/// A device that records drawing calls instead of rasterizing them.
///
/// Paths are stored already mapped to device space, which makes the
/// recording independent of how the caller composed its transforms.
#[derive(Debug)]
pub struct RecordingDevice {
    width: u32,
    height: u32,
    transform: Matrix,
    clip: Option<ClipRegion>,
    paint: Paint,
    alpha: f32,
    operations: Vec<DeviceOp>,
}

impl RecordingDevice {
    pub fn new(width: u32, height: u32) -> Self {
        RecordingDevice {
            width,
            height,
            transform: IDENTITY,
            clip: None,
            paint: Paint::default(),
            alpha: 1.0,
            operations: Vec::new(),
        }
    }

    /// Get the recorded operations.
    pub fn operations(&self) -> &[DeviceOp] {
        &self.operations
    }

    /// Clear the recorded operations.
    pub fn clear_operations(&mut self) {
        self.operations.clear();
    }
}

impl Device for RecordingDevice {
    fn transform(&self) -> Matrix {
        self.transform
    }

    fn set_transform(&mut self, matrix: &Matrix) {
        self.transform = *matrix;
    }

    fn clip(&self) -> Option<ClipRegion> {
        self.clip.clone()
    }

    fn set_clip(&mut self, clip: Option<ClipRegion>) {
        self.clip = clip;
    }

    fn set_paint(&mut self, paint: Paint) {
        self.paint = paint;
    }

    fn set_alpha(&mut self, alpha: f32) {
        self.alpha = alpha;
    }

    fn fill_path(&mut self, path: &Path, rule: FillRule) -> PDFResult<()> {
        self.operations.push(DeviceOp::Fill {
            path: path.transformed(&self.transform),
            rule,
            paint: self.paint.clone(),
            alpha: self.alpha,
            clip: self.clip.clone(),
        });
        Ok(())
    }

    fn stroke_path(&mut self, path: &Path, stroke: &StrokeProps) -> PDFResult<()> {
        self.operations.push(DeviceOp::Stroke {
            path: path.transformed(&self.transform),
            stroke: stroke.clone(),
            scale: scale_factors(&self.transform),
            paint: self.paint.clone(),
            alpha: self.alpha,
            clip: self.clip.clone(),
        });
        Ok(())
    }

    fn draw_image(&mut self, image: &ImageData) -> PDFResult<()> {
        self.operations.push(DeviceOp::Image {
            width: image.width,
            height: image.height,
            bounds: transform_rect_bounds(&self.transform, &[0.0, 0.0, 1.0, 1.0]),
            clip: self.clip.clone(),
        });
        Ok(())
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
