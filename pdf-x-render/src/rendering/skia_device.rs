//! A tiny-skia based rendering device.

use super::device::{Device, ImageData, Paint};
use super::graphics_state::{ClipRegion, Color, FillRule, LineCap, LineJoin, StrokeProps};
use super::path::{Path, PathElement};
use super::transform::{IDENTITY, Matrix, concat};
use crate::core::config::Interpolation;
use crate::core::error::{PDFError, PDFResult};
use tiny_skia::{
    FillRule as SkiaFillRule, FilterQuality, LineCap as SkiaLineCap, LineJoin as SkiaLineJoin,
    Mask, Paint as SkiaPaint, Pattern, Pixmap, PixmapPaint, SpreadMode, Stroke, StrokeDash,
    Transform,
};

// --- Conversion helpers ---

fn to_skia_color(color: Color, alpha: f32) -> tiny_skia::Color {
    let (r, g, b, a) = color.rgba();
    let a = (a as f32 * alpha.clamp(0.0, 1.0)).round() as u8;
    tiny_skia::Color::from_rgba8(r, g, b, a)
}

fn to_skia_transform(m: &Matrix) -> Transform {
    Transform::from_row(
        m[0] as f32,
        m[1] as f32,
        m[2] as f32,
        m[3] as f32,
        m[4] as f32,
        m[5] as f32,
    )
}

fn to_skia_line_cap(line_cap: LineCap) -> SkiaLineCap {
    match line_cap {
        LineCap::Butt => SkiaLineCap::Butt,
        LineCap::Round => SkiaLineCap::Round,
        LineCap::ProjectingSquare => SkiaLineCap::Square,
    }
}

fn to_skia_line_join(line_join: LineJoin) -> SkiaLineJoin {
    match line_join {
        LineJoin::Miter => SkiaLineJoin::Miter,
        LineJoin::Round => SkiaLineJoin::Round,
        LineJoin::Bevel => SkiaLineJoin::Bevel,
    }
}

fn to_skia_fill_rule(fill_rule: FillRule) -> SkiaFillRule {
    match fill_rule {
        FillRule::NonZero => SkiaFillRule::Winding,
        FillRule::EvenOdd => SkiaFillRule::EvenOdd,
    }
}

pub(crate) fn to_filter_quality(interpolation: Interpolation) -> FilterQuality {
    match interpolation {
        Interpolation::Nearest => FilterQuality::Nearest,
        Interpolation::Bilinear => FilterQuality::Bilinear,
        Interpolation::Bicubic => FilterQuality::Bicubic,
    }
}

fn to_skia_dash(dash_array: &[f64], offset: f64) -> Option<StrokeDash> {
    if dash_array.is_empty() {
        return None;
    }
    let mut intervals: Vec<f32> = dash_array.iter().map(|d| d.max(0.0) as f32).collect();
    // an odd count repeats, [3] means 3 on 3 off
    if intervals.len() % 2 == 1 {
        intervals.extend_from_within(..);
    }
    StrokeDash::new(intervals, offset as f32)
}

fn to_skia_stroke(stroke_props: &StrokeProps) -> Stroke {
    Stroke {
        width: stroke_props.line_width.max(0.0) as f32,
        miter_limit: stroke_props.miter_limit as f32,
        line_cap: to_skia_line_cap(stroke_props.line_cap),
        line_join: to_skia_line_join(stroke_props.line_join),
        dash: to_skia_dash(&stroke_props.dash_array, stroke_props.dash_offset),
    }
}

/// Converts a path; `None` for paths with no drawable segment.
fn to_skia_path(path: &Path) -> Option<tiny_skia::Path> {
    let mut builder = tiny_skia::PathBuilder::new();
    for el in path.elements() {
        match *el {
            PathElement::MoveTo(x, y) => builder.move_to(x as f32, y as f32),
            PathElement::LineTo(x, y) => builder.line_to(x as f32, y as f32),
            PathElement::CurveTo(x1, y1, x2, y2, x, y) => builder.cubic_to(
                x1 as f32, y1 as f32, x2 as f32, y2 as f32, x as f32, y as f32,
            ),
            PathElement::ClosePath => builder.close(),
        }
    }
    builder.finish()
}

/// Rasterizes into an owned [`Pixmap`].
///
/// Used both for page surfaces and for tiling pattern tiles.
pub struct SkiaDevice {
    pixmap: Pixmap,
    transform: Matrix,
    clip: Option<ClipRegion>,
    /// `clip` rasterized, rebuilt whenever the clip changes
    clip_mask: Option<Mask>,
    paint: Paint,
    alpha: f32,
    anti_alias: bool,
    quality: FilterQuality,
}

impl SkiaDevice {
    pub fn new(width: u32, height: u32) -> PDFResult<Self> {
        let pixmap = Pixmap::new(width, height).ok_or_else(|| {
            PDFError::Rendering(format!("cannot allocate a {}x{} surface", width, height))
        })?;
        Ok(SkiaDevice {
            pixmap,
            transform: IDENTITY,
            clip: None,
            clip_mask: None,
            paint: Paint::default(),
            alpha: 1.0,
            anti_alias: true,
            quality: FilterQuality::Bilinear,
        })
    }

    /// Sets anti-aliasing and image sampling quality.
    pub fn with_hints(mut self, anti_alias: bool, interpolation: Interpolation) -> Self {
        self.anti_alias = anti_alias;
        self.quality = to_filter_quality(interpolation);
        self
    }

    pub fn fill_background(&mut self, color: Color) {
        self.pixmap.fill(to_skia_color(color, 1.0));
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    pub fn into_pixmap(self) -> Pixmap {
        self.pixmap
    }

    fn rebuild_clip_mask(&mut self) {
        self.clip_mask = None;
        let Some(region) = &self.clip else {
            return;
        };
        let Some(mut mask) = Mask::new(self.pixmap.width(), self.pixmap.height()) else {
            return;
        };
        for (i, (path, rule)) in region.paths().iter().enumerate() {
            let Some(sk_path) = to_skia_path(path) else {
                // a degenerate clip path excludes everything
                mask = match Mask::new(self.pixmap.width(), self.pixmap.height()) {
                    Some(empty) => empty,
                    None => return,
                };
                break;
            };
            let rule = to_skia_fill_rule(*rule);
            if i == 0 {
                mask.fill_path(&sk_path, rule, self.anti_alias, Transform::identity());
            } else {
                mask.intersect_path(&sk_path, rule, self.anti_alias, Transform::identity());
            }
        }
        self.clip_mask = Some(mask);
    }
}

fn to_skia_paint(paint: &Paint, alpha: f32, anti_alias: bool, quality: FilterQuality) -> SkiaPaint<'_> {
    let mut sk_paint = SkiaPaint::default();
    match paint {
        Paint::Solid(color) => sk_paint.set_color(to_skia_color(*color, alpha)),
        Paint::Tile(tile) => match tile.pixmap() {
            // the tile is anchored at the user space origin and repeated
            Some(pixmap) => {
                sk_paint.shader = Pattern::new(
                    pixmap.as_ref(),
                    SpreadMode::Repeat,
                    quality,
                    alpha,
                    Transform::identity(),
                );
            }
            None => sk_paint.set_color(tiny_skia::Color::TRANSPARENT),
        },
    }
    sk_paint.anti_alias = anti_alias;
    sk_paint
}

impl Device for SkiaDevice {
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
        self.clip = clip.filter(|c| !c.is_empty());
        self.rebuild_clip_mask();
    }

    fn set_paint(&mut self, paint: Paint) {
        self.paint = paint;
    }

    fn set_alpha(&mut self, alpha: f32) {
        self.alpha = alpha;
    }

    fn fill_path(&mut self, path: &Path, rule: FillRule) -> PDFResult<()> {
        let Some(sk_path) = to_skia_path(path) else {
            return Ok(());
        };
        let sk_paint = to_skia_paint(&self.paint, self.alpha, self.anti_alias, self.quality);
        let transform = to_skia_transform(&self.transform);
        let mask = self.clip_mask.as_ref();
        self.pixmap
            .fill_path(&sk_path, &sk_paint, to_skia_fill_rule(rule), transform, mask);
        Ok(())
    }

    fn stroke_path(&mut self, path: &Path, stroke: &StrokeProps) -> PDFResult<()> {
        let Some(sk_path) = to_skia_path(path) else {
            return Ok(());
        };
        let sk_paint = to_skia_paint(&self.paint, self.alpha, self.anti_alias, self.quality);
        let sk_stroke = to_skia_stroke(stroke);
        let transform = to_skia_transform(&self.transform);
        let mask = self.clip_mask.as_ref();
        self.pixmap
            .stroke_path(&sk_path, &sk_paint, &sk_stroke, transform, mask);
        Ok(())
    }

    fn draw_image(&mut self, image: &ImageData) -> PDFResult<()> {
        if image.width == 0 || image.height == 0 {
            return Ok(());
        }
        let mut data = image.data.clone();
        for px in data.chunks_exact_mut(4) {
            let a = px[3] as u16;
            for c in &mut px[..3] {
                *c = ((*c as u16 * a + 127) / 255) as u8;
            }
        }
        let size = tiny_skia::IntSize::from_wh(image.width, image.height)
            .ok_or_else(|| PDFError::Rendering("invalid image size".into()))?;
        let image_pixmap = Pixmap::from_vec(data, size)
            .ok_or_else(|| PDFError::Rendering("image data does not match its size".into()))?;

        // unit square, first row at the top
        let w = image.width as f64;
        let h = image.height as f64;
        let image_space = concat(&self.transform, &[1.0 / w, 0.0, 0.0, -1.0 / h, 0.0, 1.0]);
        let paint = PixmapPaint {
            opacity: self.alpha,
            quality: self.quality,
            ..PixmapPaint::default()
        };
        let mask = self.clip_mask.as_ref();
        self.pixmap.draw_pixmap(
            0,
            0,
            image_pixmap.as_ref(),
            &paint,
            to_skia_transform(&image_space),
            mask,
        );
        Ok(())
    }

    fn size(&self) -> (u32, u32) {
        (self.pixmap.width(), self.pixmap.height())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::transform::scaling;

    fn pixel(device: &SkiaDevice, x: u32, y: u32) -> (u8, u8, u8, u8) {
        let px = device.pixmap().pixel(x, y).unwrap();
        (px.red(), px.green(), px.blue(), px.alpha())
    }

    #[test]
    fn test_fill_rect() {
        let mut device = SkiaDevice::new(20, 20).unwrap();
        device.set_transform(&scaling(2.0, 2.0));
        device.set_paint(Paint::from_color(Color::red()));
        device
            .fill_path(&Path::from_rect(0.0, 0.0, 5.0, 5.0), FillRule::NonZero)
            .unwrap();

        assert_eq!(pixel(&device, 5, 5), (255, 0, 0, 255));
        assert_eq!(pixel(&device, 15, 15).3, 0);
    }

    #[test]
    fn test_clip_mask_limits_fill() {
        let mut device = SkiaDevice::new(20, 20).unwrap();
        device.clip_path(&Path::from_rect(0.0, 0.0, 10.0, 20.0), FillRule::NonZero);
        device.set_paint(Paint::from_color(Color::blue()));
        device
            .fill_path(&Path::from_rect(0.0, 0.0, 20.0, 20.0), FillRule::NonZero)
            .unwrap();

        assert_eq!(pixel(&device, 5, 10), (0, 0, 255, 255));
        assert_eq!(pixel(&device, 15, 10).3, 0);

        device.set_clip(None);
        assert!(device.clip().is_none());
    }

    #[test]
    fn test_draw_image_top_row_first() {
        let mut device = SkiaDevice::new(2, 2)
            .unwrap()
            .with_hints(false, Interpolation::Nearest);
        device.set_transform(&[2.0, 0.0, 0.0, -2.0, 0.0, 2.0]);
        let image = ImageData::new(1, 2, vec![255, 0, 0, 255, 0, 0, 255, 255]);
        device.draw_image(&image).unwrap();

        assert_eq!(pixel(&device, 0, 0), (255, 0, 0, 255));
        assert_eq!(pixel(&device, 0, 1), (0, 0, 255, 255));
    }

    #[test]
    fn test_odd_dash_array_repeats() {
        assert!(to_skia_dash(&[3.0], 0.0).is_some());
        assert!(to_skia_dash(&[], 0.0).is_none());
        assert!(to_skia_dash(&[0.0, 0.0], 0.0).is_none());
    }
}
