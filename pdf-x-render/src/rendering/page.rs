//! Page painting driver.
//!
//! A [`Page`] ties the pipeline together: its content streams are
//! interpreted into a display list once, and every paint replays that list
//! at the requested zoom and rotation, followed by the page's annotations.

use super::annotation::{AnnotationPaint, paint_annotation};
use super::context::{AbortSignal, PaintEvent, RenderContext};
use super::device::Device;
use super::graphics_state::{Color, FillRule, GraphicsState};
use super::interpreter::ContentInterpreter;
use super::path::Path;
use super::resources::Resources;
use super::shapes::Shapes;
use super::skia_device::SkiaDevice;
use super::transform::{Matrix, normalize_degrees, page_transform};
use crate::core::annotation::{Annotation, AnnotationVisibility};
use crate::core::content_stream::Operation;
use crate::core::document::ObjectResolver;
use crate::core::error::{PDFError, PDFResult};
use crate::core::object::{Dict, PDFObject, Ref};
use once_cell::sync::OnceCell;
use rustc_hash::FxHashSet;
use std::sync::Arc;
use tiny_skia::Pixmap;

/// US Letter, used when neither the page nor its ancestors carry a MediaBox.
const DEFAULT_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

/// Longest `/Parent` chain searched for inherited attributes.
const MAX_INHERITANCE_DEPTH: usize = 64;

/// Zoom, rotation and visibility for one paint of a page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PagePaint {
    /// Device pixels per user space unit
    pub zoom: f64,
    /// Viewer rotation added to `/Rotate`, clockwise degrees
    pub user_rotation: f64,
    pub visibility: AnnotationVisibility,
}

impl Default for PagePaint {
    fn default() -> Self {
        PagePaint {
            zoom: 1.0,
            user_rotation: 0.0,
            visibility: AnnotationVisibility::ScreenNormal,
        }
    }
}

#[derive(Debug)]
pub struct Page {
    reference: Option<Ref>,
    dict: Dict,
    view_box: [f64; 4],
    rotate: i32,
    resources: Arc<Resources>,
    annotations: Vec<Annotation>,
    shapes: OnceCell<Arc<Shapes>>,
}

/// Looks `key` up on the page, then on its `/Pages` ancestors.
fn inheritable(dict: &Dict, key: &str, resolver: &dyn ObjectResolver) -> Option<PDFObject> {
    if let Some(value) = resolver.fetch_key(dict, key) {
        return Some(value.into_owned());
    }
    let mut visited = FxHashSet::default();
    let mut parent = dict.get("Parent").and_then(|p| p.as_reference());
    while let Some(reference) = parent {
        if !visited.insert(reference) || visited.len() > MAX_INHERITANCE_DEPTH {
            log::warn!("page tree loops at {}", reference);
            return None;
        }
        let node = resolver.resolve(reference)?;
        let node = node.as_dictionary()?;
        if let Some(value) = resolver.fetch_key(node, key) {
            return Some(value.into_owned());
        }
        parent = node.get("Parent").and_then(|p| p.as_reference());
    }
    None
}

impl Page {
    /// Reads the page dictionary. MediaBox, CropBox, Rotate and Resources
    /// are inherited from the page tree.
    pub fn from_dict(reference: Option<Ref>, dict: &Dict, resolver: &dyn ObjectResolver) -> Self {
        let media_box = inheritable(dict, "MediaBox", resolver)
            .and_then(|b| b.as_rect())
            .unwrap_or(DEFAULT_MEDIA_BOX);
        let crop_box = inheritable(dict, "CropBox", resolver)
            .and_then(|b| b.as_rect())
            .unwrap_or(media_box);
        let intersect = [
            media_box[0].max(crop_box[0]),
            media_box[1].max(crop_box[1]),
            media_box[2].min(crop_box[2]),
            media_box[3].min(crop_box[3]),
        ];
        let view_box = if intersect[2] > intersect[0] && intersect[3] > intersect[1] {
            intersect
        } else {
            media_box
        };

        let rotate = inheritable(dict, "Rotate", resolver)
            .and_then(|r| r.as_int())
            .map(|r| if r % 90 == 0 { r.rem_euclid(360) as i32 } else { 0 })
            .unwrap_or(0);

        let resources = inheritable(dict, "Resources", resolver)
            .and_then(|r| r.as_dictionary().cloned())
            .map(|d| Arc::new(Resources::new(d)))
            .unwrap_or_else(Resources::empty);

        let annotations = resolver
            .fetch_key(dict, "Annots")
            .and_then(|a| {
                a.as_array().map(|items| {
                    items
                        .iter()
                        .filter_map(|item| {
                            let obj = resolver.fetch(item);
                            obj.as_dictionary().map(|d| Annotation::from_dict(d, resolver))
                        })
                        .collect()
                })
            })
            .unwrap_or_default();

        Page {
            reference,
            dict: dict.clone(),
            view_box,
            rotate,
            resources,
            annotations,
            shapes: OnceCell::new(),
        }
    }

    pub fn reference(&self) -> Option<Ref> {
        self.reference
    }

    /// MediaBox intersected with CropBox.
    pub fn view_box(&self) -> [f64; 4] {
        self.view_box
    }

    /// `/Rotate`, normalized to 0, 90, 180 or 270.
    pub fn rotate(&self) -> i32 {
        self.rotate
    }

    pub fn resources(&self) -> &Arc<Resources> {
        &self.resources
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn annotations_mut(&mut self) -> &mut [Annotation] {
        &mut self.annotations
    }

    /// Page rotation plus `user_rotation`, in `[0, 360)`.
    pub fn total_rotation(&self, user_rotation: f64) -> f64 {
        normalize_degrees(self.rotate as f64 + user_rotation)
    }

    /// Base transform and device size for `options`.
    pub fn device_transform(&self, options: &PagePaint) -> (Matrix, (f64, f64)) {
        page_transform(&self.view_box, self.total_rotation(options.user_rotation), options.zoom)
    }

    /// Operators of every content stream, in order. Repeated references to
    /// one stream are executed once.
    fn operations(&self, resolver: &dyn ObjectResolver) -> PDFResult<Vec<Operation>> {
        let Some(contents) = self.dict.get("Contents") else {
            return Ok(Vec::new());
        };
        let resolved = resolver.fetch(contents);
        let entries: Vec<&PDFObject> = match &*resolved {
            PDFObject::Array(items) => items.iter().map(|i| &**i).collect(),
            _ => vec![contents],
        };

        let mut seen = FxHashSet::default();
        let mut ops = Vec::new();
        for entry in entries {
            if let Some(reference) = entry.as_reference() {
                if !seen.insert(reference) {
                    log::debug!("skipping repeated content stream {}", reference);
                    continue;
                }
            }
            let stream = resolver.fetch(entry);
            let (dict, data) = stream
                .as_stream()
                .ok_or_else(|| PDFError::content_stream_error("/Contents entry is not a stream"))?;
            ops.extend(resolver.content_operations(dict, data)?);
        }
        Ok(ops)
    }

    /// The page's display list, interpreted on first use. An interpretation
    /// stopped by `abort` is returned but not kept.
    pub fn shapes(
        &self,
        resolver: &dyn ObjectResolver,
        ctx: &RenderContext,
        abort: &AbortSignal,
    ) -> PDFResult<Arc<Shapes>> {
        self.interpret(resolver, ctx, abort).map(|(shapes, _)| shapes)
    }

    /// Display list plus whether interpretation ran to the end.
    fn interpret(
        &self,
        resolver: &dyn ObjectResolver,
        ctx: &RenderContext,
        abort: &AbortSignal,
    ) -> PDFResult<(Arc<Shapes>, bool)> {
        if let Some(shapes) = self.shapes.get() {
            return Ok((shapes.clone(), true));
        }
        let ops = self.operations(resolver)?;
        let mut interpreter =
            ContentInterpreter::new(resolver, ctx, self.resources.clone(), GraphicsState::default())
                .with_abort(abort.clone());
        interpreter.run(&ops);
        let aborted = interpreter.aborted();
        let shapes = Arc::new(interpreter.finish());
        if aborted {
            return Ok((shapes, false));
        }
        Ok((self.shapes.get_or_init(|| shapes).clone(), true))
    }

    /// Drops the display list, e.g. after the content changed.
    pub fn reset_shapes(&mut self) {
        self.shapes = OnceCell::new();
    }

    /// Paints content and annotations onto `device`, whose transform must
    /// map the page onto the surface (see [`Page::device_transform`]).
    ///
    /// Returns `false` if painting was aborted. Both an abort and an error
    /// are reported to the listener as [`PaintEvent::PaintingAborted`].
    pub fn paint(
        &self,
        device: &mut dyn Device,
        resolver: &dyn ObjectResolver,
        ctx: &RenderContext,
        options: &PagePaint,
        abort: &AbortSignal,
    ) -> PDFResult<bool> {
        ctx.notify(PaintEvent::PaintingStarted);
        let result = self.paint_inner(device, resolver, ctx, options, abort);
        match result {
            Ok(true) => ctx.notify(PaintEvent::PaintingFinished),
            Ok(false) | Err(_) => ctx.notify(PaintEvent::PaintingAborted),
        }
        result
    }

    fn paint_inner(
        &self,
        device: &mut dyn Device,
        resolver: &dyn ObjectResolver,
        ctx: &RenderContext,
        options: &PagePaint,
        abort: &AbortSignal,
    ) -> PDFResult<bool> {
        let (shapes, interpreted) = self.interpret(resolver, ctx, abort)?;
        if !interpreted {
            return Ok(false);
        }
        let old_clip = device.clip();
        let [x0, y0, x1, y1] = self.view_box;
        device.clip_path(&Path::from_rect(x0, y0, x1 - x0, y1 - y0), FillRule::NonZero);

        let mut completed = match shapes.paint(device, abort) {
            Ok(completed) => completed,
            Err(e) => {
                device.set_clip(old_clip);
                return Err(e);
            }
        };

        let annotation_paint = AnnotationPaint::screen(self.total_rotation(options.user_rotation))
            .with_visibility(options.visibility);
        for annotation in &self.annotations {
            if !completed || abort.is_aborted() {
                completed = false;
                break;
            }
            if let Err(e) = paint_annotation(device, annotation, resolver, ctx, &annotation_paint, abort) {
                log::warn!("annotation {:?} not painted: {}", annotation.annotation_type, e);
            }
        }

        device.set_clip(old_clip);
        Ok(completed && !abort.is_aborted())
    }

    /// Renders the page onto a white raster surface.
    pub fn render(
        &self,
        resolver: &dyn ObjectResolver,
        ctx: &RenderContext,
        options: &PagePaint,
        abort: &AbortSignal,
    ) -> PDFResult<Pixmap> {
        let (base, (width, height)) = self.device_transform(options);
        let hints = ctx.page_hints();
        let mut device = SkiaDevice::new(width.ceil().max(1.0) as u32, height.ceil().max(1.0) as u32)?
            .with_hints(hints.anti_alias, hints.interpolation);
        device.fill_background(Color::white());
        device.set_transform(&base);
        self.paint(&mut device, resolver, ctx, options, abort)?;
        Ok(device.into_pixmap())
    }
}
