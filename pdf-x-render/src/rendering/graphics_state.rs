//! Graphics state management for PDF rendering.
//!
//! This module handles the graphics state stack and all state properties
//! as defined in ISO 32000-1 section 8.4.

use super::color_space::ColorSpace;
use super::path::Path;
use super::tiling_pattern::TilingPattern;
use super::transform::{IDENTITY, Matrix, concat};
use smallvec::SmallVec;
use std::sync::Arc;

/// Line cap style (ISO 32000-1 8.4.3.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineCap {
    /// Butt cap (default) - stroke is squared off at the endpoint
    #[default]
    Butt = 0,
    /// Round cap - semicircular arc with center at endpoint
    Round = 1,
    /// Projecting square cap - stroke continues beyond endpoint
    ProjectingSquare = 2,
}

impl LineCap {
    pub fn from_int(value: i64) -> Self {
        match value {
            1 => LineCap::Round,
            2 => LineCap::ProjectingSquare,
            _ => LineCap::Butt,
        }
    }
}

/// Line join style (ISO 32000-1 8.4.3.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineJoin {
    /// Miter join (default) - outer edges meet at a sharp point
    #[default]
    Miter = 0,
    /// Round join - circular arc between the edges
    Round = 1,
    /// Bevel join - outer edges meet at a beveled edge
    Bevel = 2,
}

impl LineJoin {
    pub fn from_int(value: i64) -> Self {
        match value {
            1 => LineJoin::Round,
            2 => LineJoin::Bevel,
            _ => LineJoin::Miter,
        }
    }
}

/// Stroke properties for path rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct StrokeProps {
    /// Line width in user space units (default: 1.0)
    pub line_width: f64,

    /// Line cap style (default: Butt)
    pub line_cap: LineCap,

    /// Line join style (default: Miter)
    pub line_join: LineJoin,

    /// Miter limit (default: 10.0)
    /// The maximum ratio of miter length to line width before bevel is used
    pub miter_limit: f64,

    /// Dash pattern - array of dash lengths alternating on/off
    pub dash_array: Vec<f64>,

    /// Dash phase - offset into the dash pattern (default: 0)
    pub dash_offset: f64,
}

impl Default for StrokeProps {
    fn default() -> Self {
        StrokeProps {
            line_width: 1.0,
            line_cap: LineCap::default(),
            line_join: LineJoin::default(),
            miter_limit: 10.0,
            dash_array: Vec::new(),
            dash_offset: 0.0,
        }
    }
}

impl StrokeProps {
    /// Plain stroke of `width` with butt caps and miter joins.
    pub fn solid(width: f64) -> Self {
        StrokeProps {
            line_width: width,
            ..StrokeProps::default()
        }
    }

    /// Dashed stroke with butt caps, miter joins and limit 10.
    pub fn dashed(width: f64, dash_array: Vec<f64>) -> Self {
        StrokeProps {
            line_width: width,
            dash_array,
            ..StrokeProps::default()
        }
    }
}

/// A resolved device color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Color {
    /// Grayscale color (1 component: 0.0 = black, 1.0 = white)
    Gray(f64),
    /// RGB color (3 components: each 0.0-1.0)
    RGB(f64, f64, f64),
    /// CMYK color (4 components: each 0.0-1.0)
    CMYK(f64, f64, f64, f64),
}

impl Color {
    /// Create a black color (default stroke/fill color in PDF)
    pub fn black() -> Self {
        Color::Gray(0.0)
    }

    pub fn white() -> Self {
        Color::Gray(1.0)
    }

    pub fn red() -> Self {
        Color::RGB(1.0, 0.0, 0.0)
    }

    pub fn blue() -> Self {
        Color::RGB(0.0, 0.0, 1.0)
    }

    /// Device color from 1 (gray), 3 (RGB) or 4 (CMYK) components.
    pub fn from_components(components: &[f64]) -> Option<Self> {
        match *components {
            [g] => Some(Color::Gray(g)),
            [r, g, b] => Some(Color::RGB(r, g, b)),
            [c, m, y, k] => Some(Color::CMYK(c, m, y, k)),
            _ => None,
        }
    }

    /// Get RGBA components as u8 values.
    ///
    /// Returns (r, g, b, a) where each component is 0-255.
    pub fn rgba(&self) -> (u8, u8, u8, u8) {
        let to_byte = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        match *self {
            Color::Gray(g) => {
                let v = to_byte(g);
                (v, v, v, 255)
            }
            Color::RGB(r, g, b) => (to_byte(r), to_byte(g), to_byte(b), 255),
            Color::CMYK(c, m, y, k) => {
                let k = 1.0 - k.clamp(0.0, 1.0);
                (
                    to_byte((1.0 - c.clamp(0.0, 1.0)) * k),
                    to_byte((1.0 - m.clamp(0.0, 1.0)) * k),
                    to_byte((1.0 - y.clamp(0.0, 1.0)) * k),
                    255,
                )
            }
        }
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::black()
    }
}

/// Text rendering mode (ISO 32000-1 9.3.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextRenderingMode {
    /// Fill text (default)
    #[default]
    Fill = 0,
    Stroke = 1,
    FillStroke = 2,
    /// Invisible text (don't display)
    Invisible = 3,
    FillClip = 4,
    StrokeClip = 5,
    FillStrokeClip = 6,
    /// Add text to path for clipping
    Clip = 7,
}

impl TextRenderingMode {
    pub fn from_int(value: i64) -> Option<Self> {
        Some(match value {
            0 => TextRenderingMode::Fill,
            1 => TextRenderingMode::Stroke,
            2 => TextRenderingMode::FillStroke,
            3 => TextRenderingMode::Invisible,
            4 => TextRenderingMode::FillClip,
            5 => TextRenderingMode::StrokeClip,
            6 => TextRenderingMode::FillStrokeClip,
            7 => TextRenderingMode::Clip,
            _ => return None,
        })
    }
}

/// Fill rule for path filling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillRule {
    /// Nonzero winding number rule (default for most operations)
    #[default]
    NonZero,
    /// Even-odd rule
    EvenOdd,
}

/// Fill or stroke paint held by the graphics state.
#[derive(Debug, Clone)]
pub enum ShapePaint {
    Color(Color),
    Pattern(Arc<TilingPattern>),
}

impl Default for ShapePaint {
    fn default() -> Self {
        ShapePaint::Color(Color::black())
    }
}

/// Intersection of clip paths, all expressed in one coordinate space.
///
/// An empty region does not clip.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClipRegion {
    paths: SmallVec<[(Path, FillRule); 2]>,
}

impl ClipRegion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_path(path: Path, rule: FillRule) -> Self {
        let mut region = ClipRegion::new();
        region.intersect(path, rule);
        region
    }

    /// Narrows the region to its intersection with `path`.
    pub fn intersect(&mut self, path: Path, rule: FillRule) {
        self.paths.push((path, rule));
    }

    pub fn paths(&self) -> &[(Path, FillRule)] {
        &self.paths
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// The same region with every path mapped through `m`.
    pub fn transformed(&self, m: &Matrix) -> ClipRegion {
        ClipRegion {
            paths: self
                .paths
                .iter()
                .map(|(path, rule)| (path.transformed(m), *rule))
                .collect(),
        }
    }
}

/// Graphics state for PDF rendering.
///
/// The CTM is relative to the base transform of the display list being
/// built; the clip is stored in that same base space so that it survives
/// later `cm` operators unchanged.
#[derive(Debug, Clone)]
pub struct GraphicsState {
    /// Current Transformation Matrix (CTM)
    pub ctm: Matrix,

    /// Clip in base space, `None` when unclipped
    pub clip: Option<ClipRegion>,

    pub stroke_color_space: Arc<ColorSpace>,
    pub fill_color_space: Arc<ColorSpace>,

    pub stroke_paint: ShapePaint,
    pub fill_paint: ShapePaint,

    /// Stroke properties
    pub stroke_props: StrokeProps,

    /// Constant alpha for stroking (`CA`)
    pub stroke_alpha: f32,

    /// Constant alpha for everything else (`ca`)
    pub fill_alpha: f32,

    /// Text rendering mode
    pub text_rendering_mode: TextRenderingMode,

    /// Text leading (for T* and TD operators) in user space units
    pub text_leading: f64,

    /// Text rise (for Ts operator) in user space units
    pub text_rise: f64,

    /// Character spacing (for Tc operator) in user space units
    pub character_spacing: f64,

    /// Word spacing (for Tw operator) in user space units
    pub word_spacing: f64,

    /// Horizontal text scaling (for Tz operator) as percentage (default: 100)
    pub text_horizontal_scaling: f64,

    /// Current text matrix (Tm)
    pub text_matrix: Matrix,

    /// Current text line matrix (Tlm)
    pub text_line_matrix: Matrix,

    /// Current font name (reference to font in resources)
    pub font_name: Option<String>,

    /// Current font size
    pub font_size: Option<f64>,
}

impl Default for GraphicsState {
    fn default() -> Self {
        GraphicsState {
            ctm: IDENTITY,
            clip: None,
            stroke_color_space: ColorSpace::device_gray(),
            fill_color_space: ColorSpace::device_gray(),
            stroke_paint: ShapePaint::default(),
            fill_paint: ShapePaint::default(),
            stroke_props: StrokeProps::default(),
            stroke_alpha: 1.0,
            fill_alpha: 1.0,
            text_rendering_mode: TextRenderingMode::default(),
            text_leading: 0.0,
            text_rise: 0.0,
            character_spacing: 0.0,
            word_spacing: 0.0,
            text_horizontal_scaling: 100.0,
            text_matrix: IDENTITY,
            text_line_matrix: IDENTITY,
            font_name: None,
            font_size: None,
        }
    }
}

impl GraphicsState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Concatenate a transformation matrix to the CTM.
    pub fn concat_matrix(&mut self, transform: &Matrix) {
        self.ctm = concat(&self.ctm, transform);
    }

    /// Intersects the clip with `path`, given in current user space.
    pub fn clip_to(&mut self, path: &Path, rule: FillRule) {
        let path = path.transformed(&self.ctm);
        match &mut self.clip {
            Some(region) => region.intersect(path, rule),
            None => self.clip = Some(ClipRegion::from_path(path, rule)),
        }
    }

    /// Fill color when the fill paint is a solid color, black otherwise.
    pub fn fill_color(&self) -> Color {
        match &self.fill_paint {
            ShapePaint::Color(color) => *color,
            ShapePaint::Pattern(_) => Color::black(),
        }
    }

    pub fn stroke_color(&self) -> Color {
        match &self.stroke_paint {
            ShapePaint::Color(color) => *color,
            ShapePaint::Pattern(_) => Color::black(),
        }
    }

    /// Set the text matrix.
    pub fn set_text_matrix(&mut self, matrix: &Matrix) {
        self.text_matrix = *matrix;
        self.text_line_matrix = *matrix;
    }
}

/// `q`/`Q` stack. The bottom state can never be popped.
#[derive(Debug, Clone, Default)]
pub struct GraphicsStateStack {
    current: GraphicsState,
    saved: Vec<GraphicsState>,
}

impl GraphicsStateStack {
    pub fn new(initial: GraphicsState) -> Self {
        GraphicsStateStack {
            current: initial,
            saved: Vec::new(),
        }
    }

    pub fn current(&self) -> &GraphicsState {
        &self.current
    }

    pub fn current_mut(&mut self) -> &mut GraphicsState {
        &mut self.current
    }

    /// Pushes a copy of the current state.
    pub fn save(&mut self) {
        self.saved.push(self.current.clone());
    }

    /// Pops back to the last saved state. Returns `false` (and leaves the
    /// state untouched) when nothing was saved.
    pub fn restore(&mut self) -> bool {
        match self.saved.pop() {
            Some(state) => {
                self.current = state;
                true
            }
            None => {
                log::debug!("Q without matching q ignored");
                false
            }
        }
    }

    /// Number of saved states above the base.
    pub fn depth(&self) -> usize {
        self.saved.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::transform::translation;

    #[test]
    fn test_default_state() {
        let state = GraphicsState::default();
        assert_eq!(state.ctm, IDENTITY);
        assert_eq!(state.fill_color(), Color::black());
        assert_eq!(state.stroke_props.line_width, 1.0);
        assert!(state.clip.is_none());
    }

    #[test]
    fn test_concat_matrix() {
        let mut state = GraphicsState::default();

        // Translate by (10, 20)
        state.concat_matrix(&[1.0, 0.0, 0.0, 1.0, 10.0, 20.0]);
        assert_eq!(state.ctm, [1.0, 0.0, 0.0, 1.0, 10.0, 20.0]);

        // Scale by 2x
        state.concat_matrix(&[2.0, 0.0, 0.0, 2.0, 0.0, 0.0]);
        assert_eq!(state.ctm, [2.0, 0.0, 0.0, 2.0, 10.0, 20.0]);
    }

    #[test]
    fn test_clip_is_stored_in_base_space() {
        let mut state = GraphicsState::default();
        state.concat_matrix(&translation(100.0, 0.0));
        state.clip_to(&Path::from_rect(0.0, 0.0, 10.0, 10.0), FillRule::NonZero);
        state.concat_matrix(&translation(50.0, 0.0));

        let region = state.clip.as_ref().unwrap();
        assert_eq!(region.paths().len(), 1);
        assert_eq!(region.paths()[0].0.bounding_box(), Some((100.0, 0.0, 110.0, 10.0)));
    }

    #[test]
    fn test_stack_save_restore() {
        let mut stack = GraphicsStateStack::default();
        stack.current_mut().fill_paint = ShapePaint::Color(Color::red());
        stack.save();
        stack.current_mut().fill_paint = ShapePaint::Color(Color::blue());
        stack.current_mut().stroke_props.line_width = 10.0;
        assert_eq!(stack.depth(), 1);

        assert!(stack.restore());
        assert_eq!(stack.current().fill_color(), Color::red());
        assert_eq!(stack.current().stroke_props.line_width, 1.0);
    }

    #[test]
    fn test_unbalanced_restore_is_clamped() {
        let mut stack = GraphicsStateStack::default();
        stack.current_mut().stroke_props.line_width = 3.0;
        assert!(!stack.restore());
        assert!(!stack.restore());
        assert_eq!(stack.depth(), 0);
        assert_eq!(stack.current().stroke_props.line_width, 3.0);
    }

    #[test]
    fn test_cmyk_to_rgba() {
        assert_eq!(Color::CMYK(0.0, 0.0, 0.0, 1.0).rgba(), (0, 0, 0, 255));
        assert_eq!(Color::CMYK(1.0, 0.0, 0.0, 0.0).rgba(), (0, 255, 255, 255));
        assert_eq!(Color::from_components(&[0.5, 0.5]), None);
    }
}
