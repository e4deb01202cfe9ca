//! Annotation painting.
//!
//! An annotation is painted in its own coordinate system: the origin sits at
//! the lower-left corner of `/Rect`, optionally un-rotated (NoRotate) and
//! un-zoomed (NoZoom) around the top-left corner. The appearance stream is
//! clipped to the annotation rectangle; the border is drawn on top, unclipped.

use super::context::{AbortSignal, RenderContext};
use super::device::{Device, Paint};
use super::form::Form;
use super::graphics_state::{Color, FillRule, StrokeProps};
use super::path::Path;
use super::transform::{
    Matrix, concat, normalize_degrees, rotation_clockwise, scale, scale_factors, transform_point, translate,
};
use crate::core::annotation::{
    Annotation, AnnotationVisibility, AppearanceMode, BorderStyle, BorderStyleKind, LegacyBorder,
};
use crate::core::document::ObjectResolver;
use crate::core::error::PDFResult;
use std::sync::Arc;

/// Gray levels of the two-tone Beveled and Inset borders.
const LIGHTEST: Color = Color::Gray(1.0);
const LIGHT: Color = Color::Gray(0.75);
const DARK: Color = Color::Gray(0.5);
const DARKEST: Color = Color::Gray(0.25);

/// How an annotation is being painted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnnotationPaint {
    pub visibility: AnnotationVisibility,
    /// Page rotation plus viewer rotation, clockwise degrees
    pub total_rotation: f64,
    /// Draw the keyboard focus border instead of the annotation's own
    pub tab_selected: bool,
}

impl AnnotationPaint {
    pub fn screen(total_rotation: f64) -> Self {
        AnnotationPaint {
            visibility: AnnotationVisibility::ScreenNormal,
            total_rotation,
            tab_selected: false,
        }
    }

    pub fn print(total_rotation: f64) -> Self {
        AnnotationPaint {
            visibility: AnnotationVisibility::PrintNormal,
            ..Self::screen(total_rotation)
        }
    }

    pub fn with_visibility(mut self, visibility: AnnotationVisibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn tab_selected(mut self, selected: bool) -> Self {
        self.tab_selected = selected;
        self
    }

    fn appearance_mode(&self) -> AppearanceMode {
        match self.visibility {
            AnnotationVisibility::ScreenRollover => AppearanceMode::Rollover,
            AnnotationVisibility::ScreenDown => AppearanceMode::Down,
            AnnotationVisibility::ScreenNormal | AnnotationVisibility::PrintNormal => AppearanceMode::Normal,
        }
    }
}

/// Transform from annotation space (origin at the lower-left corner of the
/// rect) to device space, given the page's device transform.
pub fn annotation_transform(annotation: &Annotation, device_transform: &Matrix, total_rotation: f64) -> Matrix {
    let mut at = translate(device_transform, annotation.rect[0], annotation.rect[1]);
    let height = annotation.height().abs();

    if annotation.flags.no_rotate {
        let un_rotation = normalize_degrees(-total_rotation);
        if un_rotation != 0.0 {
            // pivot about the top-left corner
            let rotate = rotation_clockwise(un_rotation);
            let (x, y) = transform_point(&rotate, 0.0, height);
            at = translate(&at, -x, height - y);
            at = concat(&at, &rotate);
        }
    }

    if annotation.flags.no_zoom {
        let (sx, sy) = scale_factors(&at);
        if sy != 1.0 && sx > 0.0 && sy > 0.0 {
            at = translate(&at, 0.0, height * (sy - 1.0) / sy);
            at = scale(&at, 1.0 / sx, 1.0 / sy);
        }
    }
    at
}

/// Paints `annotation` onto `device`.
///
/// Returns `Ok(false)` when the flags forbid painting in the requested
/// visibility. The device transform and clip are left as they were found. A
/// broken appearance stream is logged and skipped; the border is still drawn.
pub fn paint_annotation(
    device: &mut dyn Device,
    annotation: &Annotation,
    resolver: &dyn ObjectResolver,
    ctx: &RenderContext,
    options: &AnnotationPaint,
    abort: &AbortSignal,
) -> PDFResult<bool> {
    if !annotation.allows(options.visibility) {
        log::debug!("annotation {:?} not painted for {:?}", annotation.annotation_type, options.visibility);
        return Ok(false);
    }

    let old_transform = device.transform();
    let old_clip = device.clip();
    let at = annotation_transform(annotation, &old_transform, options.total_rotation);
    let drawing = drawing_rect(annotation);

    device.set_transform(&at);
    device.clip_path(&rect_path(&drawing), FillRule::NonZero);
    if let Err(e) = paint_appearance(device, annotation, resolver, ctx, options.appearance_mode(), abort) {
        log::warn!("annotation appearance not painted: {}", e);
    }

    device.set_transform(&at);
    device.set_clip(old_clip.clone());
    device.set_alpha(1.0);
    let border = if options.tab_selected {
        paint_tab_selected_border(device, &drawing)
    } else {
        paint_border(device, annotation, &drawing)
    };

    device.set_transform(&old_transform);
    device.set_clip(old_clip);
    border.map(|_| true)
}

/// The annotation rect moved to the origin.
fn drawing_rect(annotation: &Annotation) -> [f64; 4] {
    [0.0, 0.0, annotation.width().abs(), annotation.height().abs()]
}

/// `rect` shrunk by half a stroke width on every side.
fn border_rect(rect: &[f64; 4], width: f64) -> [f64; 4] {
    let half = width / 2.0;
    [rect[0] + half, rect[1] + half, rect[2] - half, rect[3] - half]
}

fn rect_path(rect: &[f64; 4]) -> Path {
    Path::from_rect(rect[0], rect[1], rect[2] - rect[0], rect[3] - rect[1])
}

fn paint_appearance(
    device: &mut dyn Device,
    annotation: &Annotation,
    resolver: &dyn ObjectResolver,
    ctx: &RenderContext,
    mode: AppearanceMode,
    abort: &AbortSignal,
) -> PDFResult<()> {
    let Some(appearance) = annotation.appearance_stream(mode) else {
        return Ok(());
    };
    let form = match appearance.reference {
        Some(reference) => ctx.form_or_insert(reference, || {
            Form::from_object(Some(reference), &appearance.stream, resolver)
        })?,
        None => Arc::new(Form::from_object(None, &appearance.stream, resolver)?),
    };
    // the display list applies /Matrix itself
    let shapes = form.shapes(resolver, ctx)?;
    shapes.paint(device, abort)?;
    Ok(())
}

fn stroke_line(device: &mut dyn Device, color: Color, x0: f64, y0: f64, x1: f64, y1: f64) -> PDFResult<()> {
    device.set_paint(Paint::Solid(color));
    device.stroke_path(&Path::line(x0, y0, x1, y1), &StrokeProps::solid(1.0))
}

fn paint_border(device: &mut dyn Device, annotation: &Annotation, drawing: &[f64; 4]) -> PDFResult<()> {
    let Some(color) = annotation.color.as_deref().and_then(Color::from_components) else {
        return Ok(());
    };
    device.set_paint(Paint::Solid(color));

    if let Some(style) = &annotation.border_style {
        return paint_border_style(device, style, color, drawing);
    }
    if let Some(border) = &annotation.legacy_border {
        return paint_legacy_border(device, border, drawing);
    }
    let rect = border_rect(drawing, 1.0);
    device.stroke_path(&rect_path(&rect), &StrokeProps::solid(1.0))
}

fn paint_border_style(
    device: &mut dyn Device,
    style: &BorderStyle,
    color: Color,
    drawing: &[f64; 4],
) -> PDFResult<()> {
    let width = style.width;
    if width <= 0.0 {
        return Ok(());
    }
    let rect = border_rect(drawing, width);
    let [x0, y0, x1, y1] = *drawing;
    match style.style {
        BorderStyleKind::Solid => device.stroke_path(&rect_path(&rect), &StrokeProps::solid(width)),
        BorderStyleKind::Dashed => {
            device.stroke_path(&rect_path(&rect), &StrokeProps::dashed(width, style.dash.clone()))
        }
        BorderStyleKind::Beveled => {
            stroke_line(device, LIGHT, x0 + 1.0, y1 - 1.0, x1 - 2.0, y1 - 1.0)?;
            stroke_line(device, LIGHT, x0 + 1.0, y0 + 2.0, x0 + 1.0, y1 - 1.0)?;
            stroke_line(device, LIGHTEST, x0 + 2.0, y1 - 2.0, x1 - 3.0, y1 - 2.0)?;
            stroke_line(device, LIGHTEST, x0 + 2.0, y0 + 3.0, x0 + 2.0, y1 - 2.0)?;
            stroke_line(device, DARK, x0 + 2.0, y0 + 2.0, x1 - 2.0, y0 + 2.0)?;
            stroke_line(device, DARK, x1 - 2.0, y0 + 2.0, x1 - 2.0, y1 - 2.0)?;
            stroke_line(device, DARKEST, x0 + 1.0, y0 + 1.0, x1 - 1.0, y0 + 1.0)?;
            stroke_line(device, DARKEST, x1 - 1.0, y0 + 1.0, x1 - 1.0, y1 - 1.0)
        }
        BorderStyleKind::Inset => {
            stroke_line(device, DARK, x0 + 1.0, y1 - 1.0, x1 - 1.0, y1 - 1.0)?;
            stroke_line(device, DARK, x0 + 1.0, y0 + 1.0, x0 + 1.0, y1 - 1.0)?;
            stroke_line(device, DARKEST, x0 + 2.0, y1 - 2.0, x1 - 2.0, y1 - 2.0)?;
            stroke_line(device, DARKEST, x0 + 2.0, y0 + 2.0, x0 + 2.0, y1 - 2.0)?;
            stroke_line(device, LIGHTEST, x0 + 3.0, y0 + 2.0, x1 - 2.0, y0 + 2.0)?;
            stroke_line(device, LIGHTEST, x1 - 2.0, y0 + 2.0, x1 - 2.0, y1 - 3.0)?;
            stroke_line(device, LIGHT, x0 + 2.0, y0 + 1.0, x1 - 1.0, y0 + 1.0)?;
            stroke_line(device, LIGHT, x1 - 1.0, y0 + 1.0, x1 - 1.0, y1 - 2.0)
        }
        BorderStyleKind::Underline => {
            device.set_paint(Paint::Solid(color));
            device.stroke_path(&Path::line(rect[0], rect[1], rect[2], rect[1]), &StrokeProps::solid(width))
        }
    }
}

fn paint_legacy_border(device: &mut dyn Device, border: &LegacyBorder, drawing: &[f64; 4]) -> PDFResult<()> {
    if border.width <= 0.0 {
        return Ok(());
    }
    let rect = border_rect(drawing, border.width);
    let path = Path::round_rect(
        rect[0],
        rect[1],
        rect[2] - rect[0],
        rect[3] - rect[1],
        border.h_radius,
        border.v_radius,
    );
    let stroke = match &border.dash {
        Some(dash) => StrokeProps::dashed(border.width, dash.clone()),
        None => StrokeProps::solid(border.width),
    };
    device.stroke_path(&path, &stroke)
}

fn paint_tab_selected_border(device: &mut dyn Device, drawing: &[f64; 4]) -> PDFResult<()> {
    device.set_paint(Paint::Solid(Color::black()));
    let rect = border_rect(drawing, 1.0);
    device.stroke_path(&rect_path(&rect), &StrokeProps::dashed(1.0, vec![2.0]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::annotation::AnnotationFlags;
    use crate::core::content_stream::{OpCode, Operation};
    use crate::core::document::MemoryDocument;
    use crate::core::object::{PDFObject, Ref};
    use crate::rendering::device::{DeviceOp, RecordingDevice};
    use crate::rendering::transform::IDENTITY;

    fn annotation(doc: &MemoryDocument, entries: Vec<(&str, PDFObject)>) -> Annotation {
        let obj = PDFObject::dict(entries);
        Annotation::from_dict(obj.as_dictionary().unwrap(), doc)
    }

    fn strokes(device: &RecordingDevice) -> Vec<&DeviceOp> {
        device
            .operations()
            .iter()
            .filter(|op| matches!(op, DeviceOp::Stroke { .. }))
            .collect()
    }

    fn paint(doc: &MemoryDocument, annot: &Annotation, options: AnnotationPaint) -> (RecordingDevice, bool) {
        let ctx = RenderContext::builder().image_proxy(false).build();
        let mut device = RecordingDevice::new(200, 200);
        let painted = paint_annotation(&mut device, annot, doc, &ctx, &options, &AbortSignal::new()).unwrap();
        (device, painted)
    }

    #[test]
    fn test_solid_border_style_is_inset_by_half_width() {
        let doc = MemoryDocument::new();
        let annot = annotation(
            &doc,
            vec![
                ("Subtype", PDFObject::name("Square")),
                ("Rect", PDFObject::numbers(&[10.0, 10.0, 50.0, 30.0])),
                ("C", PDFObject::numbers(&[1.0, 0.0, 0.0])),
                ("BS", PDFObject::dict([("W", PDFObject::Number(4.0))])),
            ],
        );
        let (device, painted) = paint(&doc, &annot, AnnotationPaint::screen(0.0));
        assert!(painted);
        let ops = strokes(&device);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].bounds(), Some([12.0, 12.0, 48.0, 28.0]));
        assert_eq!(device.transform(), IDENTITY);
    }

    #[test]
    fn test_beveled_border_draws_eight_lines() {
        let doc = MemoryDocument::new();
        let annot = annotation(
            &doc,
            vec![
                ("Subtype", PDFObject::name("Widget")),
                ("Rect", PDFObject::numbers(&[0.0, 0.0, 20.0, 20.0])),
                ("C", PDFObject::numbers(&[0.0])),
                ("BS", PDFObject::dict([("S", PDFObject::name("B"))])),
            ],
        );
        let (device, _) = paint(&doc, &annot, AnnotationPaint::screen(0.0));
        let ops = strokes(&device);
        assert_eq!(ops.len(), 8);
        assert!(matches!(ops[0], DeviceOp::Stroke { paint: Paint::Solid(c), .. } if *c == LIGHT));
        assert!(matches!(ops[7], DeviceOp::Stroke { paint: Paint::Solid(c), .. } if *c == DARKEST));
    }

    #[test]
    fn test_no_border_without_color() {
        let doc = MemoryDocument::new();
        let annot = annotation(
            &doc,
            vec![
                ("Subtype", PDFObject::name("Square")),
                ("Rect", PDFObject::numbers(&[0.0, 0.0, 20.0, 20.0])),
                ("BS", PDFObject::dict([("W", PDFObject::Number(2.0))])),
            ],
        );
        let (device, painted) = paint(&doc, &annot, AnnotationPaint::screen(0.0));
        assert!(painted);
        assert!(strokes(&device).is_empty());
    }

    #[test]
    fn test_tab_selected_border_is_dashed_black() {
        let doc = MemoryDocument::new();
        let annot = annotation(
            &doc,
            vec![
                ("Subtype", PDFObject::name("Widget")),
                ("Rect", PDFObject::numbers(&[0.0, 0.0, 20.0, 10.0])),
            ],
        );
        let (device, _) = paint(&doc, &annot, AnnotationPaint::screen(0.0).tab_selected(true));
        let ops = strokes(&device);
        assert_eq!(ops.len(), 1);
        match ops[0] {
            DeviceOp::Stroke { paint, stroke, .. } => {
                assert_eq!(*paint, Paint::Solid(Color::black()));
                assert_eq!(stroke.dash_array, vec![2.0]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_appearance_is_clipped_to_rect() {
        let mut doc = MemoryDocument::new();
        let ap = doc.content_stream(
            [("BBox", PDFObject::numbers(&[0.0, 0.0, 100.0, 100.0]))],
            vec![
                Operation::with_numbers(OpCode::Rectangle, &[0.0, 0.0, 100.0, 100.0]),
                Operation::new(OpCode::Fill, vec![]),
            ],
        );
        let ap_ref = doc.insert(Ref::new(20, 0), ap);
        let annot = annotation(
            &doc,
            vec![
                ("Subtype", PDFObject::name("Stamp")),
                ("Rect", PDFObject::numbers(&[5.0, 5.0, 25.0, 15.0])),
                ("AP", PDFObject::dict([("N", PDFObject::Ref(ap_ref))])),
            ],
        );
        let (device, _) = paint(&doc, &annot, AnnotationPaint::screen(0.0));
        match &device.operations()[0] {
            DeviceOp::Fill { clip: Some(clip), .. } => {
                assert_eq!(clip.paths()[0].0.bounding_box(), Some((5.0, 5.0, 25.0, 15.0)));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(device.clip().is_none());
    }

    #[test]
    fn test_hidden_is_not_painted() {
        let doc = MemoryDocument::new();
        let annot = annotation(
            &doc,
            vec![
                ("Subtype", PDFObject::name("Square")),
                ("Rect", PDFObject::numbers(&[0.0, 0.0, 20.0, 20.0])),
                ("C", PDFObject::numbers(&[0.0])),
                ("F", PDFObject::Number(AnnotationFlags::HIDDEN as f64)),
            ],
        );
        let (device, painted) = paint(&doc, &annot, AnnotationPaint::screen(0.0));
        assert!(!painted);
        assert!(device.operations().is_empty());
    }

    #[test]
    fn test_no_rotate_keeps_top_left_anchor() {
        let doc = MemoryDocument::new();
        let annot = annotation(
            &doc,
            vec![
                ("Subtype", PDFObject::name("Text")),
                ("Rect", PDFObject::numbers(&[100.0, 100.0, 120.0, 130.0])),
                ("F", PDFObject::Number(AnnotationFlags::NO_ROTATE as f64)),
            ],
        );
        let base = rotation_clockwise(90.0);
        let at = annotation_transform(&annot, &base, 90.0);
        let anchor = transform_point(&at, 0.0, 30.0);
        let expected = transform_point(&base, 100.0, 130.0);
        assert!((anchor.0 - expected.0).abs() < 1e-9 && (anchor.1 - expected.1).abs() < 1e-9);
        // the annotation itself is upright again
        assert_eq!(crate::rendering::transform::linear_part(&at), IDENTITY);
    }
}
