//! Content stream interpreter.
//!
//! The interpreter executes operators in order against a
//! [`GraphicsStateStack`] and records what they paint as a [`Shapes`]
//! display list. Nothing is drawn here: playback happens later, against any
//! [`Device`](super::device::Device), at any base transform.
//!
//! Operators with bad operands are skipped with a warning; the rest of the
//! stream still executes.

use super::color_space::ColorSpace;
use super::context::{AbortSignal, RenderContext};
use super::form::Form;
use super::graphics_state::{
    Color, FillRule, GraphicsState, GraphicsStateStack, LineCap, LineJoin, ShapePaint, TextRenderingMode,
};
use super::image::{ImageReference, ImageStream, image_stream_from_object};
use super::path::Path;
use super::resources::Resources;
use super::shapes::{DrawCmd, Shapes};
use super::transform::{IDENTITY, Matrix};
use crate::core::content_stream::{OpCode, Operation};
use crate::core::document::ObjectResolver;
use crate::core::error::{PDFError, PDFResult};
use crate::core::object::{Dict, PDFObject, Ref};
use smallvec::SmallVec;
use std::sync::Arc;

/// Nesting limit for forms painted from forms.
const MAX_FORM_DEPTH: usize = 16;

/// What the display list has been told so far, so that state commands are
/// only recorded when they change.
#[derive(Debug, Default)]
struct Emitted {
    transform: Option<Matrix>,
    clip: Option<Option<super::graphics_state::ClipRegion>>,
    alpha: Option<f32>,
    paint: Option<ShapePaint>,
}

fn same_paint(a: &ShapePaint, b: &ShapePaint) -> bool {
    match (a, b) {
        (ShapePaint::Color(a), ShapePaint::Color(b)) => a == b,
        (ShapePaint::Pattern(a), ShapePaint::Pattern(b)) => Arc::ptr_eq(a, b),
        _ => false,
    }
}

/// Which color a color operator targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Fill,
    Stroke,
}

pub struct ContentInterpreter<'a> {
    resolver: &'a dyn ObjectResolver,
    ctx: &'a RenderContext,
    resources: Arc<Resources>,
    stack: GraphicsStateStack,
    path: Path,
    pending_clip: Option<FillRule>,
    in_text_object: bool,
    ignore_color: bool,
    abort: AbortSignal,
    aborted: bool,
    forms: SmallVec<[Option<Ref>; 4]>,
    emitted: Emitted,
    shapes: Shapes,
}

impl<'a> ContentInterpreter<'a> {
    pub fn new(
        resolver: &'a dyn ObjectResolver,
        ctx: &'a RenderContext,
        resources: Arc<Resources>,
        initial: GraphicsState,
    ) -> Self {
        ContentInterpreter {
            resolver,
            ctx,
            resources,
            stack: GraphicsStateStack::new(initial),
            path: Path::new(),
            pending_clip: None,
            in_text_object: false,
            ignore_color: false,
            abort: AbortSignal::new(),
            aborted: false,
            forms: SmallVec::new(),
            emitted: Emitted {
                // playback starts unclipped
                clip: Some(None),
                ..Default::default()
            },
            shapes: Shapes::new(),
        }
    }

    pub fn with_abort(mut self, abort: AbortSignal) -> Self {
        self.abort = abort;
        self
    }

    /// Skips color operators (uncolored pattern cells).
    pub fn ignore_color_operators(mut self, ignore: bool) -> Self {
        self.ignore_color = ignore;
        self
    }

    pub fn state(&self) -> &GraphicsState {
        self.stack.current()
    }

    pub fn stack(&self) -> &GraphicsStateStack {
        &self.stack
    }

    /// Whether the last [`run`](Self::run) stopped on the abort signal.
    pub fn aborted(&self) -> bool {
        self.aborted
    }

    pub fn finish(self) -> Shapes {
        self.shapes
    }

    /// Executes `ops` in order, checking the abort signal between operators.
    pub fn run(&mut self, ops: &[Operation]) {
        for op in ops {
            if self.abort.is_aborted() {
                log::debug!("content interpretation aborted");
                self.aborted = true;
                return;
            }
            #[cfg(feature = "debug-logging")]
            log::trace!("{}", op);
            if let Err(e) = self.process_operation(op) {
                log::warn!("skipping operator {}: {}", op.op, e);
            }
        }
    }

    /// Executes one operator.
    pub fn process_operation(&mut self, op: &Operation) -> PDFResult<()> {
        if self.ignore_color && op.op.is_color() {
            return Ok(());
        }
        match op.op {
            // Graphics state operators
            OpCode::Save => self.stack.save(),
            OpCode::Restore => {
                self.stack.restore();
            }
            OpCode::Transform => {
                let m = op.numbers::<6>()?;
                self.stack.current_mut().concat_matrix(&m);
            }
            OpCode::SetLineWidth => self.stack.current_mut().stroke_props.line_width = op.number(0)?,
            OpCode::SetLineCap => {
                self.stack.current_mut().stroke_props.line_cap = LineCap::from_int(op.number(0)? as i64)
            }
            OpCode::SetLineJoin => {
                self.stack.current_mut().stroke_props.line_join = LineJoin::from_int(op.number(0)? as i64)
            }
            OpCode::SetMiterLimit => self.stack.current_mut().stroke_props.miter_limit = op.number(0)?,
            OpCode::SetDash => self.set_dash(op.args.first(), op.number(1)?)?,
            OpCode::SetGState => self.set_ext_gstate(op.name(0)?)?,
            OpCode::SetRenderingIntent | OpCode::SetFlatness => {}

            // Path construction operators
            OpCode::MoveTo => {
                let [x, y] = op.numbers()?;
                self.path.move_to(x, y);
            }
            OpCode::LineTo => {
                let [x, y] = op.numbers()?;
                self.path.line_to(x, y);
            }
            OpCode::CurveTo => {
                let [x1, y1, x2, y2, x3, y3] = op.numbers()?;
                self.path.curve_to(x1, y1, x2, y2, x3, y3);
            }
            OpCode::CurveTo2 => {
                let [x2, y2, x3, y3] = op.numbers()?;
                self.path.curve_to_v(x2, y2, x3, y3);
            }
            OpCode::CurveTo3 => {
                let [x1, y1, x3, y3] = op.numbers()?;
                self.path.curve_to(x1, y1, x3, y3, x3, y3);
            }
            OpCode::ClosePath => self.path.close_path(),
            OpCode::Rectangle => {
                let [x, y, w, h] = op.numbers()?;
                self.path.rect(x, y, w, h);
            }

            // Path painting operators
            OpCode::Stroke => self.paint_path(None, true),
            OpCode::CloseStroke => {
                self.path.close_path();
                self.paint_path(None, true);
            }
            OpCode::Fill => self.paint_path(Some(FillRule::NonZero), false),
            OpCode::EOFill => self.paint_path(Some(FillRule::EvenOdd), false),
            OpCode::FillStroke => self.paint_path(Some(FillRule::NonZero), true),
            OpCode::EOFillStroke => self.paint_path(Some(FillRule::EvenOdd), true),
            OpCode::CloseFillStroke => {
                self.path.close_path();
                self.paint_path(Some(FillRule::NonZero), true);
            }
            OpCode::CloseEOFillStroke => {
                self.path.close_path();
                self.paint_path(Some(FillRule::EvenOdd), true);
            }
            OpCode::EndPath => self.paint_path(None, false),

            // Clipping operators
            OpCode::Clip => self.pending_clip = Some(FillRule::NonZero),
            OpCode::EOClip => self.pending_clip = Some(FillRule::EvenOdd),

            // Text objects and state
            OpCode::BeginText => {
                self.in_text_object = true;
                self.stack.current_mut().set_text_matrix(&IDENTITY);
            }
            OpCode::EndText => self.in_text_object = false,
            OpCode::SetCharSpacing => self.stack.current_mut().character_spacing = op.number(0)?,
            OpCode::SetWordSpacing => self.stack.current_mut().word_spacing = op.number(0)?,
            OpCode::SetHScale => self.stack.current_mut().text_horizontal_scaling = op.number(0)?,
            OpCode::SetLeading => self.stack.current_mut().text_leading = op.number(0)?,
            OpCode::SetFont => {
                let state = self.stack.current_mut();
                state.font_name = Some(op.name(0)?.to_string());
                state.font_size = Some(op.number(1)?);
            }
            OpCode::SetTextRenderingMode => {
                let mode = op.number(0)? as i64;
                self.stack.current_mut().text_rendering_mode = TextRenderingMode::from_int(mode)
                    .ok_or_else(|| PDFError::content_stream_error(format!("invalid text rendering mode {}", mode)))?;
            }
            OpCode::SetTextRise => self.stack.current_mut().text_rise = op.number(0)?,
            OpCode::MoveText => {
                let [tx, ty] = op.numbers()?;
                self.move_text(tx, ty);
            }
            OpCode::SetLeadingMoveText => {
                let [tx, ty] = op.numbers()?;
                self.stack.current_mut().text_leading = -ty;
                self.move_text(tx, ty);
            }
            OpCode::SetTextMatrix => {
                let m = op.numbers::<6>()?;
                self.stack.current_mut().set_text_matrix(&m);
            }
            OpCode::NextLine | OpCode::NextLineShowText => self.next_line(),
            OpCode::NextLineSetSpacingShowText => {
                let [aw, ac] = op.numbers()?;
                let state = self.stack.current_mut();
                state.word_spacing = aw;
                state.character_spacing = ac;
                self.next_line();
            }
            // glyphs are not painted
            OpCode::ShowText | OpCode::ShowSpacedText => {
                if !self.in_text_object {
                    log::debug!("{} outside BT/ET", op.op);
                }
            }
            OpCode::SetCharWidth | OpCode::SetCharWidthAndBounds => {}

            // Color operators
            OpCode::SetStrokeColorSpace => self.set_color_space(Target::Stroke, op.name(0)?)?,
            OpCode::SetFillColorSpace => self.set_color_space(Target::Fill, op.name(0)?)?,
            OpCode::SetStrokeColor | OpCode::SetStrokeColorN => self.set_color(Target::Stroke, op)?,
            OpCode::SetFillColor | OpCode::SetFillColorN => self.set_color(Target::Fill, op)?,
            OpCode::SetStrokeGray => self.set_device_color(Target::Stroke, ColorSpace::device_gray(), op)?,
            OpCode::SetFillGray => self.set_device_color(Target::Fill, ColorSpace::device_gray(), op)?,
            OpCode::SetStrokeRGBColor => self.set_device_color(Target::Stroke, ColorSpace::device_rgb(), op)?,
            OpCode::SetFillRGBColor => self.set_device_color(Target::Fill, ColorSpace::device_rgb(), op)?,
            OpCode::SetStrokeCMYKColor => {
                self.set_device_color(Target::Stroke, ColorSpace::device_cmyk(), op)?
            }
            OpCode::SetFillCMYKColor => self.set_device_color(Target::Fill, ColorSpace::device_cmyk(), op)?,

            // XObjects and images
            OpCode::PaintXObject => self.paint_xobject(op.name(0)?)?,
            OpCode::InlineImage => self.paint_inline_image(op)?,
            OpCode::ShadingFill => log::debug!("shading fill {} not painted", op.name(0).unwrap_or("?")),

            OpCode::MarkPoint
            | OpCode::MarkPointProps
            | OpCode::BeginMarkedContent
            | OpCode::BeginMarkedContentProps
            | OpCode::EndMarkedContent
            | OpCode::BeginCompat
            | OpCode::EndCompat => {}
        }
        Ok(())
    }

    // === Display list emission ===

    fn sync_transform(&mut self) {
        let ctm = self.stack.current().ctm;
        if self.emitted.transform != Some(ctm) {
            self.shapes.push(DrawCmd::Transform(ctm));
            self.emitted.transform = Some(ctm);
        }
    }

    fn sync_clip(&mut self) {
        let clip = &self.stack.current().clip;
        if self.emitted.clip.as_ref() != Some(clip) {
            self.shapes.push(DrawCmd::Clip(clip.clone()));
            self.emitted.clip = Some(clip.clone());
        }
    }

    fn sync_alpha(&mut self, alpha: f32) {
        if self.emitted.alpha != Some(alpha) {
            self.shapes.push(DrawCmd::Alpha(alpha));
            self.emitted.alpha = Some(alpha);
        }
    }

    fn sync_paint(&mut self, paint: ShapePaint) {
        if self.emitted.paint.as_ref().is_some_and(|p| same_paint(p, &paint)) {
            return;
        }
        self.shapes.push(DrawCmd::Paint(paint.clone()));
        self.emitted.paint = Some(paint);
    }

    // === Path painting ===

    /// Paints the current path and applies a pending `W`/`W*`. The path is
    /// consumed either way.
    fn paint_path(&mut self, fill: Option<FillRule>, stroke: bool) {
        let path = std::mem::take(&mut self.path);
        if !path.is_empty() && (fill.is_some() || stroke) {
            self.sync_transform();
            self.sync_clip();
            if let Some(rule) = fill {
                let state = self.stack.current();
                let (paint, alpha) = (state.fill_paint.clone(), state.fill_alpha);
                self.sync_alpha(alpha);
                self.sync_paint(paint);
                self.shapes.push(DrawCmd::Fill(path.clone(), rule));
            }
            if stroke {
                let state = self.stack.current();
                let (paint, alpha, props) =
                    (state.stroke_paint.clone(), state.stroke_alpha, state.stroke_props.clone());
                self.sync_alpha(alpha);
                self.sync_paint(paint);
                self.shapes.push(DrawCmd::Stroke(path.clone(), props));
            }
        }
        if let Some(rule) = self.pending_clip.take() {
            self.stack.current_mut().clip_to(&path, rule);
        }
    }

    // === Graphics state ===

    fn set_dash(&mut self, array: Option<&PDFObject>, phase: f64) -> PDFResult<()> {
        let dash = array
            .and_then(|a| a.number_array())
            .ok_or_else(|| PDFError::content_stream_error("d operand 0 must be an array"))?;
        let props = &mut self.stack.current_mut().stroke_props;
        props.dash_array = dash;
        props.dash_offset = phase;
        Ok(())
    }

    fn set_ext_gstate(&mut self, name: &str) -> PDFResult<()> {
        let dict = self.resources.ext_gstate(name, self.resolver)?;
        let resolver = self.resolver;
        let number = |key: &str| resolver.fetch_key(&dict, key).and_then(|v| v.as_number());
        let state = self.stack.current_mut();
        if let Some(width) = number("LW") {
            state.stroke_props.line_width = width;
        }
        if let Some(cap) = number("LC") {
            state.stroke_props.line_cap = LineCap::from_int(cap as i64);
        }
        if let Some(join) = number("LJ") {
            state.stroke_props.line_join = LineJoin::from_int(join as i64);
        }
        if let Some(limit) = number("ML") {
            state.stroke_props.miter_limit = limit;
        }
        if let Some(alpha) = number("CA") {
            state.stroke_alpha = alpha.clamp(0.0, 1.0) as f32;
        }
        if let Some(alpha) = number("ca") {
            state.fill_alpha = alpha.clamp(0.0, 1.0) as f32;
        }
        if let Some(dash) = resolver.fetch_key(&dict, "D") {
            // [[array] phase]
            if let Some([array, phase, ..]) = dash.as_array() {
                state.stroke_props.dash_array = array.number_array().unwrap_or_default();
                state.stroke_props.dash_offset = phase.as_number().unwrap_or(0.0);
            }
        }
        Ok(())
    }

    // === Text state ===

    fn move_text(&mut self, tx: f64, ty: f64) {
        let state = self.stack.current_mut();
        let m = state.text_line_matrix;
        state.text_line_matrix[4] += tx * m[0] + ty * m[2];
        state.text_line_matrix[5] += tx * m[1] + ty * m[3];
        state.text_matrix = state.text_line_matrix;
    }

    fn next_line(&mut self) {
        let leading = self.stack.current().text_leading;
        self.move_text(0.0, -leading);
    }

    // === Color ===

    fn set_color_space(&mut self, target: Target, name: &str) -> PDFResult<()> {
        let space = match self.resources.color_space(name, self.resolver) {
            Ok(space) => space,
            Err(e) => {
                log::warn!("color space /{}: {}, using DeviceGray", name, e);
                ColorSpace::device_gray()
            }
        };
        let initial = ShapePaint::Color(space.initial_color());
        let state = self.stack.current_mut();
        match target {
            Target::Fill => {
                state.fill_color_space = space;
                state.fill_paint = initial;
            }
            Target::Stroke => {
                state.stroke_color_space = space;
                state.stroke_paint = initial;
            }
        }
        Ok(())
    }

    fn set_color(&mut self, target: Target, op: &Operation) -> PDFResult<()> {
        let space = match target {
            Target::Fill => self.stack.current().fill_color_space.clone(),
            Target::Stroke => self.stack.current().stroke_color_space.clone(),
        };
        let components = op.leading_numbers();

        let paint = match op.args.last().and_then(|a| a.as_name()) {
            Some(name) if space.is_pattern() => {
                let uncolored = (!components.is_empty()).then(|| space.get_color(&components));
                match self.resources.pattern(name, self.resolver, self.ctx)? {
                    Some(pattern) => {
                        pattern.init(self.resolver, self.ctx, self.stack.current(), &self.resources, uncolored);
                        ShapePaint::Pattern(pattern)
                    }
                    None => ShapePaint::Color(uncolored.unwrap_or_else(Color::black)),
                }
            }
            _ => ShapePaint::Color(space.get_color(&components)),
        };
        let state = self.stack.current_mut();
        match target {
            Target::Fill => state.fill_paint = paint,
            Target::Stroke => state.stroke_paint = paint,
        }
        Ok(())
    }

    fn set_device_color(&mut self, target: Target, space: Arc<ColorSpace>, op: &Operation) -> PDFResult<()> {
        let count = space.num_components();
        let components: SmallVec<[f32; 4]> = (0..count)
            .map(|i| op.number(i).map(|v| v as f32))
            .collect::<PDFResult<_>>()?;
        let paint = ShapePaint::Color(space.get_color(&components));
        let state = self.stack.current_mut();
        match target {
            Target::Fill => {
                state.fill_color_space = space;
                state.fill_paint = paint;
            }
            Target::Stroke => {
                state.stroke_color_space = space;
                state.stroke_paint = paint;
            }
        }
        Ok(())
    }

    // === XObjects ===

    fn image_color_space(&self, dict: &Dict) -> PDFResult<Arc<ColorSpace>> {
        let entry = dict.get("ColorSpace").or_else(|| dict.get("CS"));
        let Some(entry) = entry else {
            return Ok(ColorSpace::device_gray());
        };
        match entry.as_name() {
            Some(name) => self.resources.color_space(name, self.resolver),
            None => ColorSpace::from_object(entry, self.resolver).map(Arc::new),
        }
    }

    fn paint_xobject(&mut self, name: &str) -> PDFResult<()> {
        let xobject = self.resources.xobject(name, self.resolver)?;
        match xobject.subtype() {
            Some("Image") => {
                let dict = xobject
                    .object
                    .as_dictionary()
                    .ok_or_else(|| PDFError::unresolved(format!("image /{}", name), "no dictionary"))?;
                let color_space = self.image_color_space(dict)?;
                let stream =
                    image_stream_from_object(xobject.reference, &xobject.object, color_space, self.resolver)?;
                self.paint_image(stream);
                Ok(())
            }
            Some("Form") => {
                let form = Form::from_object(xobject.reference, &xobject.object, self.resolver)?;
                self.paint_form(&form)
            }
            other => {
                log::debug!("XObject /{} of subtype {:?} not painted", name, other);
                Ok(())
            }
        }
    }

    fn paint_inline_image(&mut self, op: &Operation) -> PDFResult<()> {
        let (dict, data) = op
            .args
            .first()
            .and_then(|a| a.as_stream())
            .ok_or_else(|| PDFError::content_stream_error("BI operand must be an image stream"))?;
        let color_space = self.image_color_space(dict)?;
        let stream = ImageStream::new(None, dict.clone(), data.to_vec(), color_space, self.resolver)?;
        self.paint_image(stream);
        Ok(())
    }

    fn paint_image(&mut self, stream: ImageStream) {
        let (fill_color, alpha) = {
            let state = self.stack.current();
            (state.fill_color(), state.fill_alpha)
        };
        let image = ImageReference::new(stream, fill_color, self.ctx);
        self.sync_transform();
        self.sync_clip();
        self.sync_alpha(alpha);
        self.shapes.push(DrawCmd::Image(image));
    }

    /// Paints a form inline: its matrix is concatenated, its bbox clips and
    /// its resources replace the current ones for the duration.
    pub fn paint_form(&mut self, form: &Form) -> PDFResult<()> {
        if self.forms.len() >= MAX_FORM_DEPTH {
            return Err(PDFError::RecursionGuard(format!("forms nested deeper than {}", MAX_FORM_DEPTH)));
        }
        if let Some(reference) = form.reference() {
            if self.forms.contains(&Some(reference)) {
                return Err(PDFError::RecursionGuard(format!("form {} paints itself", reference)));
            }
        }
        let ops = form.operations(self.resolver)?;

        let saved_path = std::mem::take(&mut self.path);
        let saved_clip = self.pending_clip.take();
        let saved_resources = std::mem::replace(&mut self.resources, Resources::empty());
        self.resources = form.resources_or(&saved_resources);
        self.stack.save();
        let depth = self.stack.depth();
        {
            let state = self.stack.current_mut();
            state.concat_matrix(&form.matrix());
            let [x0, y0, x1, y1] = form.bbox();
            state.clip_to(&Path::from_rect(x0, y0, x1 - x0, y1 - y0), FillRule::NonZero);
        }
        self.forms.push(form.reference());

        self.run(&ops);

        self.forms.pop();
        // unbalanced q inside the form
        while self.stack.depth() > depth {
            self.stack.restore();
        }
        self.stack.restore();
        self.resources = saved_resources;
        self.path = saved_path;
        self.pending_clip = saved_clip;
        Ok(())
    }
}
