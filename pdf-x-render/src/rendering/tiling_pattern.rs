//! Tiling patterns.
//!
//! A tiling pattern paints its cell content into a raster tile which the
//! surface then repeats across the filled area. The cell is interpreted into
//! a display list once, when the pattern is first selected; the tile is
//! built on first paint and cached until [`TilingPattern::reset`].

use super::context::{AbortSignal, RenderContext, RenderHints};
use super::graphics_state::{ClipRegion, Color, FillRule, GraphicsState, ShapePaint};
use super::interpreter::ContentInterpreter;
use super::path::Path;
use super::resources::Resources;
use super::shapes::Shapes;
use super::skia_device::SkiaDevice;
use super::transform::{IDENTITY, Matrix, concat, invert, linear_part, transform_rect_bounds, translate};
use crate::core::document::ObjectResolver;
use crate::core::error::{PDFError, PDFResult};
use crate::core::object::{Dict, PDFObject, Ref};
use crate::rendering::device::Device;
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use tiny_skia::Pixmap;

/// Step value some producers write to mean "same as the cell".
const STEP_SENTINEL: f64 = i16::MAX as f64;

/// Cell offsets, in steps, painted around the key cell. Each entry is
/// relative to the previous one.
const NEIGHBOR_WALK: [(f64, f64); 9] = [
    (0.0, 0.0),
    (1.0, 0.0),
    (0.0, -1.0),
    (-1.0, 0.0),
    (-1.0, 0.0),
    (0.0, 1.0),
    (0.0, 1.0),
    (1.0, 0.0),
    (1.0, 0.0),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaintType {
    Colored,
    Uncolored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TilingType {
    ConstantSpacing,
    NoDistortion,
    ConstantSpacingFaster,
}

/// A rendered pattern tile. The placeholder tile has no pixels and paints
/// nothing.
pub struct TilePaint {
    pixmap: Option<Pixmap>,
}

impl TilePaint {
    fn placeholder() -> TilePaint {
        TilePaint { pixmap: None }
    }

    pub fn pixmap(&self) -> Option<&Pixmap> {
        self.pixmap.as_ref()
    }

    pub fn is_placeholder(&self) -> bool {
        self.pixmap.is_none()
    }

    pub fn width(&self) -> u32 {
        self.pixmap.as_ref().map_or(0, |p| p.width())
    }

    pub fn height(&self) -> u32 {
        self.pixmap.as_ref().map_or(0, |p| p.height())
    }
}

impl fmt::Debug for TilePaint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TilePaint({}x{})", self.width(), self.height())
    }
}

/// Tile cache state. `Building` names the thread painting the cell; other
/// threads wait for it, the builder itself gets a placeholder.
#[derive(Debug)]
enum TileSlot {
    Empty,
    Building(ThreadId),
    Ready(Arc<TilePaint>),
}

/// Cell content resolved by [`TilingPattern::init`].
#[derive(Debug)]
struct PatternCell {
    shapes: Shapes,
    /// Cell box widened or narrowed to the step spacing
    bbox_mod: [f64; 4],
    x_step: f64,
    y_step: f64,
    hints: RenderHints,
}

pub struct TilingPattern {
    reference: Option<Ref>,
    paint_type: PaintType,
    tiling_type: TilingType,
    bbox: [f64; 4],
    x_step: f64,
    y_step: f64,
    matrix: Matrix,
    dict: Dict,
    data: Vec<u8>,
    /// Thread interpreting the cell, if any
    interpreting: Mutex<Option<ThreadId>>,
    cell: OnceCell<PatternCell>,
    tile: Mutex<TileSlot>,
    tile_ready: Condvar,
}

impl fmt::Debug for TilingPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TilingPattern")
            .field("reference", &self.reference)
            .field("paint_type", &self.paint_type)
            .field("bbox", &self.bbox)
            .field("x_step", &self.x_step)
            .field("y_step", &self.y_step)
            .field("matrix", &self.matrix)
            .finish_non_exhaustive()
    }
}

impl TilingPattern {
    /// Reads a pattern stream. Shading patterns (`/PatternType 2`) are not
    /// painted and yield `Ok(None)`.
    pub fn from_object(
        reference: Option<Ref>,
        obj: &PDFObject,
        resolver: &dyn ObjectResolver,
    ) -> PDFResult<Option<TilingPattern>> {
        let what = || format!("pattern {}", reference.map(|r| r.to_string()).unwrap_or_default());
        let Some((dict, data)) = obj.as_stream() else {
            if obj.as_dictionary().is_some() {
                log::debug!("{} is a shading pattern, not painted", what());
                return Ok(None);
            }
            return Err(PDFError::unresolved(what(), "not a stream"));
        };
        let int = |key: &str| resolver.fetch_key(dict, key).and_then(|v| v.as_int());
        let number = |key: &str| resolver.fetch_key(dict, key).and_then(|v| v.as_number());

        if int("PatternType").unwrap_or(1) != 1 {
            log::debug!("{} is a shading pattern, not painted", what());
            return Ok(None);
        }
        let paint_type = match int("PaintType") {
            Some(2) => PaintType::Uncolored,
            _ => PaintType::Colored,
        };
        let tiling_type = match int("TilingType") {
            Some(2) => TilingType::NoDistortion,
            Some(3) => TilingType::ConstantSpacingFaster,
            _ => TilingType::ConstantSpacing,
        };
        let bbox = resolver
            .fetch_key(dict, "BBox")
            .and_then(|b| b.as_rect())
            .ok_or_else(|| PDFError::unresolved(what(), "missing /BBox"))?;
        let matrix = resolver
            .fetch_key(dict, "Matrix")
            .and_then(|m| m.as_matrix())
            .unwrap_or(IDENTITY);

        Ok(Some(TilingPattern {
            reference,
            paint_type,
            tiling_type,
            bbox,
            x_step: number("XStep").unwrap_or(0.0),
            y_step: number("YStep").unwrap_or(0.0),
            matrix,
            dict: dict.clone(),
            data: data.to_vec(),
            interpreting: Mutex::new(None),
            cell: OnceCell::new(),
            tile: Mutex::new(TileSlot::Empty),
            tile_ready: Condvar::new(),
        }))
    }

    pub fn paint_type(&self) -> PaintType {
        self.paint_type
    }

    pub fn tiling_type(&self) -> TilingType {
        self.tiling_type
    }

    pub fn matrix(&self) -> Matrix {
        self.matrix
    }

    /// Spacing actually used, once initialized.
    pub fn steps(&self) -> Option<(f64, f64)> {
        self.cell.get().map(|c| (c.x_step, c.y_step))
    }

    /// Step-adjusted cell box, once initialized.
    pub fn bbox_mod(&self) -> Option<[f64; 4]> {
        self.cell.get().map(|c| c.bbox_mod)
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }

    /// Interprets the cell content. Only the first call does any work;
    /// concurrent callers wait for it. A call made from inside the cell's
    /// own content returns at once.
    ///
    /// `parent` is the graphics state in effect where the pattern was
    /// selected; the cell inherits its colors and line style. Uncolored
    /// patterns paint with `uncolored` and ignore color operators in the
    /// cell. Failures while interpreting the cell are logged and leave
    /// whatever was built.
    pub fn init(
        &self,
        resolver: &dyn ObjectResolver,
        ctx: &RenderContext,
        parent: &GraphicsState,
        parent_resources: &Arc<Resources>,
        uncolored: Option<Color>,
    ) {
        if self.cell.get().is_some() {
            return;
        }
        let me = thread::current().id();
        if *lock(&self.interpreting) == Some(me) {
            return;
        }
        self.cell.get_or_init(|| {
            *lock(&self.interpreting) = Some(me);
            let cell = self.interpret_cell(resolver, ctx, parent, parent_resources, uncolored);
            *lock(&self.interpreting) = None;
            cell
        });
    }

    fn interpret_cell(
        &self,
        resolver: &dyn ObjectResolver,
        ctx: &RenderContext,
        parent: &GraphicsState,
        parent_resources: &Arc<Resources>,
        uncolored: Option<Color>,
    ) -> PatternCell {
        let resources =
            Resources::from_owner(&self.dict, resolver).unwrap_or_else(|| parent_resources.clone());

        let mut state = parent.clone();
        state.ctm = IDENTITY;
        state.clip = None;
        if self.paint_type == PaintType::Uncolored {
            let color = uncolored.unwrap_or_else(Color::black);
            state.fill_paint = ShapePaint::Color(color);
            state.stroke_paint = ShapePaint::Color(color);
        }

        let mut interpreter = ContentInterpreter::new(resolver, ctx, resources, state)
            .ignore_color_operators(self.paint_type == PaintType::Uncolored);
        match resolver.content_operations(&self.dict, &self.data) {
            Ok(ops) => interpreter.run(&ops),
            Err(e) => log::warn!("pattern cell content unreadable: {}", e),
        }
        let shapes = interpreter.finish();

        let width = self.bbox[2] - self.bbox[0];
        let height = self.bbox[3] - self.bbox[1];
        let x_step = adjusted_step(self.x_step, width);
        let y_step = adjusted_step(self.y_step, height);
        let bbox_mod = [
            self.bbox[0],
            self.bbox[1],
            self.bbox[0] + if width == x_step { width } else { x_step },
            self.bbox[1] + if height == y_step { height } else { y_step },
        ];

        PatternCell {
            shapes,
            bbox_mod,
            x_step,
            y_step,
            hints: ctx.tile_hints(),
        }
    }

    /// Returns the tile for a fill whose device transform is `current`,
    /// building it on first use.
    ///
    /// `base` is the transform playback started from. The tile is sized to
    /// the step-adjusted cell in the original page space
    /// `base ∘ inverse(current)`. Callers on other threads wait while the
    /// tile is being built; a re-entrant call from the building thread
    /// receives a transparent placeholder.
    pub fn paint_pattern(&self, current: &Matrix, base: &Matrix) -> Arc<TilePaint> {
        let Some(cell) = self.cell.get() else {
            log::debug!("tiling pattern painted before its cell was interpreted");
            return Arc::new(TilePaint::placeholder());
        };
        let me = thread::current().id();
        let mut slot = lock(&self.tile);
        loop {
            match &*slot {
                TileSlot::Ready(tile) => return tile.clone(),
                TileSlot::Building(owner) if *owner == me => return Arc::new(TilePaint::placeholder()),
                TileSlot::Building(_) => {
                    slot = self.tile_ready.wait(slot).unwrap_or_else(PoisonError::into_inner);
                }
                TileSlot::Empty => break,
            }
        }
        *slot = TileSlot::Building(me);
        drop(slot);

        let tile = match self.build_tile(cell, current, base) {
            Ok(tile) => Arc::new(tile),
            Err(e) => {
                log::warn!("tiling pattern tile failed: {}", e);
                Arc::new(TilePaint::placeholder())
            }
        };

        // a reset while building leaves the slot to the next caller
        let mut slot = lock(&self.tile);
        if matches!(&*slot, TileSlot::Building(owner) if *owner == me) {
            *slot = TileSlot::Ready(tile.clone());
        }
        drop(slot);
        self.tile_ready.notify_all();
        tile
    }

    fn build_tile(&self, cell: &PatternCell, current: &Matrix, base: &Matrix) -> PDFResult<TilePaint> {
        let original_page_space = match invert(current) {
            Some(inverse) => concat(base, &inverse),
            None => {
                log::warn!("tiling pattern over a non-invertible transform {:?}", current);
                IDENTITY
            }
        };

        let bounds = transform_rect_bounds(
            &original_page_space,
            &transform_rect_bounds(&self.matrix, &cell.bbox_mod),
        );
        let width = ((bounds[2] - bounds[0]) as u32).max(1);
        let height = ((bounds[3] - bounds[1]) as u32).max(1);

        let mut device =
            SkiaDevice::new(width, height)?.with_hints(cell.hints.anti_alias, cell.hints.interpolation);
        device.set_clip(Some(ClipRegion::from_path(
            Path::from_rect(0.0, 0.0, width as f64, height as f64),
            FillRule::NonZero,
        )));

        let never = AbortSignal::new();
        let mut at = linear_part(&concat(&original_page_space, &self.matrix));
        for (dx, dy) in NEIGHBOR_WALK {
            at = translate(&at, dx * cell.x_step, dy * cell.y_step);
            device.set_transform(&at);
            if let Err(e) = cell.shapes.paint(&mut device, &never) {
                log::warn!("tiling pattern cell paint failed: {}", e);
            }
        }

        Ok(TilePaint {
            pixmap: Some(device.into_pixmap()),
        })
    }

    /// Drops the cached tile; the next paint rebuilds it.
    pub fn reset(&self) {
        *lock(&self.tile) = TileSlot::Empty;
        self.tile_ready.notify_all();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Zero steps and the `i16::MAX` sentinel fall back to the cell dimension.
fn adjusted_step(step: f64, dimension: f64) -> f64 {
    if step == 0.0 || step == STEP_SENTINEL {
        dimension
    } else {
        step
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::content_stream::{OpCode, Operation};
    use crate::core::document::MemoryDocument;

    fn pattern(doc: &mut MemoryDocument, x_step: f64, y_step: f64, paint_type: f64) -> TilingPattern {
        let obj = doc.content_stream(
            [
                ("PatternType", PDFObject::Number(1.0)),
                ("PaintType", PDFObject::Number(paint_type)),
                ("TilingType", PDFObject::Number(1.0)),
                ("BBox", PDFObject::numbers(&[0.0, 0.0, 10.0, 8.0])),
                ("XStep", PDFObject::Number(x_step)),
                ("YStep", PDFObject::Number(y_step)),
            ],
            vec![
                Operation::with_numbers(OpCode::SetFillRGBColor, &[1.0, 0.0, 0.0]),
                Operation::with_numbers(OpCode::Rectangle, &[0.0, 0.0, 5.0, 4.0]),
                Operation::new(OpCode::Fill, vec![]),
            ],
        );
        TilingPattern::from_object(None, &obj, doc).unwrap().unwrap()
    }

    fn init(pattern: &TilingPattern, doc: &MemoryDocument, uncolored: Option<Color>) {
        let ctx = RenderContext::builder().image_proxy(false).build();
        pattern.init(doc, &ctx, &GraphicsState::default(), &Resources::empty(), uncolored);
    }

    #[test]
    fn test_sentinel_step_uses_bbox() {
        let mut doc = MemoryDocument::new();
        let p = pattern(&mut doc, 32767.0, 32767.0, 1.0);
        init(&p, &doc, None);
        assert_eq!(p.steps(), Some((10.0, 8.0)));
        assert_eq!(p.bbox_mod(), Some([0.0, 0.0, 10.0, 8.0]));
    }

    #[test]
    fn test_zero_step_uses_bbox_and_wider_step_grows_cell() {
        let mut doc = MemoryDocument::new();
        let p = pattern(&mut doc, 0.0, 12.0, 1.0);
        init(&p, &doc, None);
        assert_eq!(p.steps(), Some((10.0, 12.0)));
        assert_eq!(p.bbox_mod(), Some([0.0, 0.0, 10.0, 12.0]));
    }

    #[test]
    fn test_tile_is_cached_until_reset() {
        let mut doc = MemoryDocument::new();
        let p = pattern(&mut doc, 10.0, 8.0, 1.0);
        init(&p, &doc, None);

        let first = p.paint_pattern(&IDENTITY, &IDENTITY);
        let second = p.paint_pattern(&IDENTITY, &IDENTITY);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!((first.width(), first.height()), (10, 8));

        p.reset();
        assert!(!Arc::ptr_eq(&first, &p.paint_pattern(&IDENTITY, &IDENTITY)));
    }

    #[test]
    fn test_tile_scales_with_page_space() {
        let mut doc = MemoryDocument::new();
        let p = pattern(&mut doc, 10.0, 8.0, 1.0);
        init(&p, &doc, None);
        let base = [2.0, 0.0, 0.0, 2.0, 0.0, 0.0];
        let tile = p.paint_pattern(&IDENTITY, &base);
        assert_eq!((tile.width(), tile.height()), (20, 16));
    }

    #[test]
    fn test_uncolored_pattern_ignores_cell_colors() {
        let mut doc = MemoryDocument::new();
        let p = pattern(&mut doc, 10.0, 8.0, 2.0);
        init(&p, &doc, Some(Color::blue()));

        let tile = p.paint_pattern(&IDENTITY, &IDENTITY);
        // the cell rect covers pixel (1, 1) on the key cell
        let px = tile.pixmap().and_then(|p| p.pixel(1, 1)).map(|c| (c.red(), c.green(), c.blue(), c.alpha()));
        assert_eq!(px, Some((0, 0, 255, 255)));
    }

    #[test]
    fn test_paint_before_init_gives_uncached_placeholder() {
        let mut doc = MemoryDocument::new();
        let p = pattern(&mut doc, 10.0, 8.0, 1.0);
        assert!(p.paint_pattern(&IDENTITY, &IDENTITY).is_placeholder());
        init(&p, &doc, None);
        assert_eq!(p.paint_pattern(&IDENTITY, &IDENTITY).width(), 10);
    }

    #[test]
    fn test_cell_filled_with_its_own_pattern_sees_placeholder() {
        let mut doc = MemoryDocument::new();
        let reference = Ref::new(7, 0);
        let own_pattern = || PDFObject::dict([("Pattern", PDFObject::dict([("P1", PDFObject::Ref(reference))]))]);
        let obj = doc.content_stream(
            [
                ("PatternType", PDFObject::Number(1.0)),
                ("PaintType", PDFObject::Number(1.0)),
                ("BBox", PDFObject::numbers(&[0.0, 0.0, 10.0, 8.0])),
                ("XStep", PDFObject::Number(10.0)),
                ("YStep", PDFObject::Number(8.0)),
                ("Resources", own_pattern()),
            ],
            vec![
                Operation::new(OpCode::SetFillColorSpace, vec![PDFObject::name("Pattern")]),
                Operation::new(OpCode::SetFillColorN, vec![PDFObject::name("P1")]),
                Operation::with_numbers(OpCode::Rectangle, &[0.0, 0.0, 10.0, 8.0]),
                Operation::new(OpCode::Fill, vec![]),
            ],
        );
        doc.insert(reference, obj);
        let ctx = RenderContext::builder().image_proxy(false).build();
        let resources = Resources::new(own_pattern().as_dictionary().unwrap().clone());

        let p = resources.pattern("P1", &doc, &ctx).unwrap().unwrap();
        p.init(&doc, &ctx, &GraphicsState::default(), &Resources::empty(), None);
        assert!(p.is_initialized());

        let tile = p.paint_pattern(&IDENTITY, &IDENTITY);
        assert!(!tile.is_placeholder());
        let alpha = tile.pixmap().and_then(|p| p.pixel(1, 1)).map(|c| c.alpha());
        assert_eq!(alpha, Some(0));
        assert!(Arc::ptr_eq(&tile, &p.paint_pattern(&IDENTITY, &IDENTITY)));
    }

    #[test]
    fn test_shading_pattern_is_skipped() {
        let doc = MemoryDocument::new();
        let obj = PDFObject::dict([("PatternType", PDFObject::Number(2.0))]);
        assert!(TilingPattern::from_object(None, &obj, &doc).unwrap().is_none());
    }
}
