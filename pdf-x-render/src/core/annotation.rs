//! Annotation model.
//!
//! An [`Annotation`] is resolved once from its dictionary into typed fields:
//! subtype, flags, border description, appearance streams and the parent
//! link. Painting lives in `rendering::annotation`.

use super::document::ObjectResolver;
use super::object::{Dict, PDFObject, Ref};
use rustc_hash::{FxHashMap, FxHashSet};

/// Longest `/Parent` chain walked before giving up.
const MAX_PARENT_DEPTH: usize = 64;

/// Annotation types in PDF documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotationType {
    /// Text annotation (sticky note, comment)
    Text,

    /// Link annotation (hyperlink, internal link)
    Link,

    /// Free text annotation (typewriter text)
    FreeText,

    Line,
    Square,
    Circle,
    Polygon,
    PolyLine,
    Highlight,
    Underline,
    Squiggly,
    StrikeOut,
    Stamp,
    Caret,
    Ink,
    Popup,
    FileAttachment,
    Sound,
    Movie,

    /// Widget annotation (form field)
    Widget,

    Screen,
    PrinterMark,
    TrapNet,
    Watermark,

    /// 3D annotation
    Model3D,

    Redact,

    /// Unknown annotation type
    Unknown(String),
}

impl AnnotationType {
    /// Parse annotation type from a name object.
    pub fn from_name(name: &str) -> Self {
        match name {
            "Text" => AnnotationType::Text,
            "Link" => AnnotationType::Link,
            "FreeText" => AnnotationType::FreeText,
            "Line" => AnnotationType::Line,
            "Square" => AnnotationType::Square,
            "Circle" => AnnotationType::Circle,
            "Polygon" => AnnotationType::Polygon,
            "PolyLine" => AnnotationType::PolyLine,
            "Highlight" => AnnotationType::Highlight,
            "Underline" => AnnotationType::Underline,
            "Squiggly" => AnnotationType::Squiggly,
            "StrikeOut" => AnnotationType::StrikeOut,
            "Stamp" => AnnotationType::Stamp,
            "Caret" => AnnotationType::Caret,
            "Ink" => AnnotationType::Ink,
            "Popup" => AnnotationType::Popup,
            "FileAttachment" => AnnotationType::FileAttachment,
            "Sound" => AnnotationType::Sound,
            "Movie" => AnnotationType::Movie,
            "Widget" => AnnotationType::Widget,
            "Screen" => AnnotationType::Screen,
            "PrinterMark" => AnnotationType::PrinterMark,
            "TrapNet" => AnnotationType::TrapNet,
            "Watermark" => AnnotationType::Watermark,
            "3D" => AnnotationType::Model3D,
            "Redact" => AnnotationType::Redact,
            other => AnnotationType::Unknown(other.to_string()),
        }
    }

    /// Whether the subtype is one of the standard annotation types.
    pub fn is_recognized(&self) -> bool {
        !matches!(self, AnnotationType::Unknown(_))
    }
}

/// Annotation flags (`/F`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnnotationFlags {
    /// Invisible: do not display unrecognized subtypes
    pub invisible: bool,

    /// Hidden: never display, print or interact
    pub hidden: bool,

    /// Print: include when printing
    pub print: bool,

    /// NoZoom: keep the size fixed regardless of magnification
    pub no_zoom: bool,

    /// NoRotate: keep the orientation fixed regardless of page rotation
    pub no_rotate: bool,

    /// NoView: do not display on screen
    pub no_view: bool,

    /// ReadOnly: no interaction
    pub read_only: bool,

    /// Locked: properties may not be changed
    pub locked: bool,

    /// ToggleNoView: invert NoView for rollover/down interaction
    pub toggle_no_view: bool,

    /// LockedContents: contents may not be changed
    pub locked_contents: bool,
}

impl AnnotationFlags {
    pub const INVISIBLE: u32 = 1;
    pub const HIDDEN: u32 = 1 << 1;
    pub const PRINT: u32 = 1 << 2;
    pub const NO_ZOOM: u32 = 1 << 3;
    pub const NO_ROTATE: u32 = 1 << 4;
    pub const NO_VIEW: u32 = 1 << 5;
    pub const READ_ONLY: u32 = 1 << 6;
    pub const LOCKED: u32 = 1 << 7;
    pub const TOGGLE_NO_VIEW: u32 = 1 << 8;
    pub const LOCKED_CONTENTS: u32 = 1 << 9;

    /// Parse annotation flags from an integer.
    pub fn from_flags(flags: u32) -> Self {
        AnnotationFlags {
            invisible: flags & Self::INVISIBLE != 0,
            hidden: flags & Self::HIDDEN != 0,
            print: flags & Self::PRINT != 0,
            no_zoom: flags & Self::NO_ZOOM != 0,
            no_rotate: flags & Self::NO_ROTATE != 0,
            no_view: flags & Self::NO_VIEW != 0,
            read_only: flags & Self::READ_ONLY != 0,
            locked: flags & Self::LOCKED != 0,
            toggle_no_view: flags & Self::TOGGLE_NO_VIEW != 0,
            locked_contents: flags & Self::LOCKED_CONTENTS != 0,
        }
    }
}

/// A rectangle defining the annotation's location on the page.
pub type AnnotationRect = [f64; 4]; // [llx, lly, urx, ury]

/// Color components from `/C` (1 = gray, 3 = RGB, 4 = CMYK).
pub type AnnotationColor = Vec<f64>;

/// Border style names from `/BS /S`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BorderStyleKind {
    #[default]
    Solid,
    Dashed,
    Beveled,
    Inset,
    Underline,
}

/// Border style dictionary (`/BS`).
#[derive(Debug, Clone, PartialEq)]
pub struct BorderStyle {
    pub style: BorderStyleKind,

    /// Stroke width in default user space (default: 1)
    pub width: f64,

    /// Dash pattern for `Dashed` (default: [3])
    pub dash: Vec<f64>,
}

impl Default for BorderStyle {
    fn default() -> Self {
        BorderStyle {
            style: BorderStyleKind::Solid,
            width: 1.0,
            dash: vec![3.0],
        }
    }
}

impl BorderStyle {
    pub fn from_dict(dict: &Dict, resolver: &dyn ObjectResolver) -> Self {
        let mut border = BorderStyle::default();
        if let Some(width) = resolver.fetch_key(dict, "W").and_then(|w| w.as_number()) {
            border.width = width.max(0.0);
        }
        if let Some(style) = resolver.fetch_key(dict, "S") {
            border.style = match style.as_name() {
                Some("D") => BorderStyleKind::Dashed,
                Some("B") => BorderStyleKind::Beveled,
                Some("I") => BorderStyleKind::Inset,
                Some("U") => BorderStyleKind::Underline,
                _ => BorderStyleKind::Solid,
            };
        }
        if let Some(dash) = resolver.fetch_key(dict, "D").and_then(|d| d.number_array()) {
            if !dash.is_empty() && dash.iter().all(|d| *d >= 0.0) && dash.iter().any(|d| *d > 0.0) {
                border.dash = dash;
            }
        }
        border
    }
}

/// Legacy `/Border` array: `[h_radius v_radius width [dash]]`.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyBorder {
    pub h_radius: f64,
    pub v_radius: f64,
    pub width: f64,
    pub dash: Option<Vec<f64>>,
}

impl LegacyBorder {
    /// Reads the array. A bare number in the dash position marks a broken
    /// producer and disables the border (width 0).
    pub fn from_array(values: &[Box<PDFObject>]) -> Self {
        let number = |i: usize, default: f64| {
            values.get(i).and_then(|v| v.as_number()).unwrap_or(default)
        };
        let mut border = LegacyBorder {
            h_radius: number(0, 0.0),
            v_radius: number(1, 0.0),
            width: number(2, 1.0),
            dash: None,
        };
        match values.get(3).map(|v| &**v) {
            Some(PDFObject::Number(_)) => border.width = 0.0,
            Some(dash @ PDFObject::Array(_)) => border.dash = dash.number_array(),
            _ => {}
        }
        border
    }
}

/// One appearance entry: a form stream, or a map from appearance state to
/// form stream.
#[derive(Debug, Clone, PartialEq)]
pub enum AppearanceEntry {
    Stream(AppearanceStream),
    States(FxHashMap<String, AppearanceStream>),
}

/// An appearance form with the reference it was loaded from.
#[derive(Debug, Clone, PartialEq)]
pub struct AppearanceStream {
    pub reference: Option<Ref>,
    pub stream: PDFObject,
}

/// The appearance dictionary (`/AP`).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Appearance {
    pub normal: Option<AppearanceEntry>,
    pub rollover: Option<AppearanceEntry>,
    pub down: Option<AppearanceEntry>,
}

/// Which appearance to paint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppearanceMode {
    Normal,
    Rollover,
    Down,
}

/// Paint context an annotation is asked to render in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationVisibility {
    ScreenNormal,
    ScreenRollover,
    ScreenDown,
    PrintNormal,
}

fn load_appearance_stream(obj: &PDFObject, resolver: &dyn ObjectResolver) -> Option<AppearanceStream> {
    let reference = obj.as_reference();
    let stream = resolver.fetch(obj).into_owned();
    stream.as_stream()?;
    Some(AppearanceStream { reference, stream })
}

fn load_appearance_entry(obj: &PDFObject, resolver: &dyn ObjectResolver) -> Option<AppearanceEntry> {
    if let Some(stream) = load_appearance_stream(obj, resolver) {
        return Some(AppearanceEntry::Stream(stream));
    }
    let resolved = resolver.fetch(obj);
    let dict = resolved.as_dictionary()?;
    let states: FxHashMap<String, AppearanceStream> = dict
        .iter()
        .filter_map(|(state, value)| Some((state.clone(), load_appearance_stream(value, resolver)?)))
        .collect();
    Some(AppearanceEntry::States(states))
}

impl Appearance {
    pub fn from_dict(dict: &Dict, resolver: &dyn ObjectResolver) -> Self {
        let entry = |key: &str| dict.get(key).and_then(|v| load_appearance_entry(v, resolver));
        Appearance {
            normal: entry("N"),
            rollover: entry("R"),
            down: entry("D"),
        }
    }
}

/// An annotation on a PDF page.
#[derive(Debug, Clone)]
pub struct Annotation {
    /// The annotation type
    pub annotation_type: AnnotationType,

    /// The annotation rectangle (location on page), normalized
    pub rect: AnnotationRect,

    /// Annotation contents (text for notes, etc.)
    pub contents: Option<String>,

    /// Annotation flags (visibility, etc.)
    pub flags: AnnotationFlags,

    /// Border style dictionary, takes precedence over `legacy_border`
    pub border_style: Option<BorderStyle>,

    /// `/Border` array
    pub legacy_border: Option<LegacyBorder>,

    /// Border color, from `/C` or set by the viewer
    pub color: Option<AnnotationColor>,

    /// Modification date
    pub modification_date: Option<String>,

    pub appearance: Appearance,

    /// Current appearance state (`/AS`)
    pub appearance_state: Option<String>,

    /// `/Parent`; never owned, looked up on demand
    pub parent: Option<Ref>,

    /// `/P`
    pub page: Option<Ref>,
}

impl Annotation {
    /// Builds the typed annotation from its dictionary.
    pub fn from_dict(dict: &Dict, resolver: &dyn ObjectResolver) -> Self {
        let annotation_type = resolver
            .fetch_key(dict, "Subtype")
            .and_then(|s| s.as_name().map(AnnotationType::from_name))
            .unwrap_or_else(|| AnnotationType::Unknown(String::new()));

        let rect = resolver
            .fetch_key(dict, "Rect")
            .and_then(|r| r.as_rect())
            .unwrap_or([0.0; 4]);

        let flags = resolver
            .fetch_key(dict, "F")
            .and_then(|f| f.as_int())
            .map(|f| AnnotationFlags::from_flags(f as u32))
            .unwrap_or_default();

        let border_style = resolver
            .fetch_key(dict, "BS")
            .and_then(|bs| bs.as_dictionary().map(|d| BorderStyle::from_dict(d, resolver)));

        let legacy_border = resolver
            .fetch_key(dict, "Border")
            .and_then(|b| b.as_array().map(LegacyBorder::from_array));

        let color = resolver
            .fetch_key(dict, "C")
            .and_then(|c| c.number_array())
            .filter(|c| matches!(c.len(), 1 | 3 | 4));

        let appearance = resolver
            .fetch_key(dict, "AP")
            .and_then(|ap| ap.as_dictionary().map(|d| Appearance::from_dict(d, resolver)))
            .unwrap_or_default();

        Annotation {
            annotation_type,
            rect,
            contents: resolver.fetch_key(dict, "Contents").and_then(|c| c.as_text()),
            flags,
            border_style,
            legacy_border,
            color,
            modification_date: resolver.fetch_key(dict, "M").and_then(|m| m.as_text()),
            appearance,
            appearance_state: resolver
                .fetch_key(dict, "AS")
                .and_then(|s| s.as_name().map(str::to_string)),
            parent: dict.get("Parent").and_then(|p| p.as_reference()),
            page: dict.get("P").and_then(|p| p.as_reference()),
        }
    }

    pub fn width(&self) -> f64 {
        self.rect[2] - self.rect[0]
    }

    pub fn height(&self) -> f64 {
        self.rect[3] - self.rect[1]
    }

    pub fn set_border_color(&mut self, color: Option<AnnotationColor>) {
        self.color = color;
    }

    /// Replaces the appearance streams, e.g. after a form field edit.
    pub fn set_appearance(&mut self, appearance: Appearance, state: Option<String>) {
        self.appearance = appearance;
        self.appearance_state = state;
    }

    /// Shown or printed at all; Hidden always wins.
    pub fn is_renderable(&self) -> bool {
        if self.flags.hidden {
            return false;
        }
        !(self.flags.invisible && !self.annotation_type.is_recognized())
    }

    pub fn allow_screen_normal(&self) -> bool {
        self.is_renderable() && !self.flags.no_view
    }

    pub fn allow_screen_rollover(&self) -> bool {
        if !self.is_renderable() {
            return false;
        }
        if self.flags.no_view && !self.flags.toggle_no_view {
            return false;
        }
        !self.flags.read_only
    }

    pub fn allow_screen_down(&self) -> bool {
        self.allow_screen_rollover()
    }

    pub fn allow_print_normal(&self) -> bool {
        self.is_renderable() && self.flags.print
    }

    pub fn allow_alter_properties(&self) -> bool {
        !self.flags.locked
    }

    pub fn allows(&self, visibility: AnnotationVisibility) -> bool {
        match visibility {
            AnnotationVisibility::ScreenNormal => self.allow_screen_normal(),
            AnnotationVisibility::ScreenRollover => self.allow_screen_rollover(),
            AnnotationVisibility::ScreenDown => self.allow_screen_down(),
            AnnotationVisibility::PrintNormal => self.allow_print_normal(),
        }
    }

    /// Selects the appearance stream for `mode`, falling back to the normal
    /// appearance when the requested one is missing. State maps are keyed
    /// by `/AS`.
    pub fn appearance_stream(&self, mode: AppearanceMode) -> Option<&AppearanceStream> {
        let requested = match mode {
            AppearanceMode::Normal => None,
            AppearanceMode::Rollover => self.appearance.rollover.as_ref(),
            AppearanceMode::Down => self.appearance.down.as_ref(),
        };
        requested
            .and_then(|entry| self.select_state(entry))
            .or_else(|| self.appearance.normal.as_ref().and_then(|entry| self.select_state(entry)))
    }

    fn select_state<'a>(&self, entry: &'a AppearanceEntry) -> Option<&'a AppearanceStream> {
        match entry {
            AppearanceEntry::Stream(stream) => Some(stream),
            AppearanceEntry::States(states) => match &self.appearance_state {
                Some(state) => states.get(state),
                None if states.len() == 1 => states.values().next(),
                None => None,
            },
        }
    }

    /// Loads the parent annotation.
    pub fn parent(&self, resolver: &dyn ObjectResolver) -> Option<Annotation> {
        let parent = resolver.resolve(self.parent?)?;
        parent.as_dictionary().map(|d| Annotation::from_dict(d, resolver))
    }

    /// The owning page, taken from `/P` or from the nearest ancestor that
    /// has one.
    pub fn page_ref(&self, resolver: &dyn ObjectResolver) -> Option<Ref> {
        if self.page.is_some() {
            return self.page;
        }
        let mut visited = FxHashSet::default();
        let mut next = self.parent;
        while let Some(reference) = next {
            if !visited.insert(reference) || visited.len() > MAX_PARENT_DEPTH {
                log::warn!("annotation parent chain loops at {}", reference);
                return None;
            }
            let obj = resolver.resolve(reference)?;
            let dict = obj.as_dictionary()?;
            if let Some(page) = dict.get("P").and_then(|p| p.as_reference()) {
                return Some(page);
            }
            next = dict.get("Parent").and_then(|p| p.as_reference());
        }
        None
    }
}
