//! Paths in user or device space.
//!
//! Content streams build paths incrementally (`m`, `l`, `c`, `re`, `h`); the
//! interpreter stores the finished path in the display list together with the
//! CTM it was built under.

use super::transform::{Matrix, transform_point};
use std::fmt;

/// Control point distance for approximating a quarter ellipse with a cubic.
const KAPPA: f64 = 0.552_284_749_831;

/// A path element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathElement {
    /// Move to a new point (starts a new subpath)
    MoveTo(f64, f64),
    /// Line to a point
    LineTo(f64, f64),
    /// Cubic Bézier curve (cp1x, cp1y, cp2x, cp2y, x, y)
    CurveTo(f64, f64, f64, f64, f64, f64),
    /// Close the current subpath
    ClosePath,
}

impl PathElement {
    fn transformed(&self, m: &Matrix) -> PathElement {
        match *self {
            PathElement::MoveTo(x, y) => {
                let (x, y) = transform_point(m, x, y);
                PathElement::MoveTo(x, y)
            }
            PathElement::LineTo(x, y) => {
                let (x, y) = transform_point(m, x, y);
                PathElement::LineTo(x, y)
            }
            PathElement::CurveTo(x1, y1, x2, y2, x, y) => {
                let (x1, y1) = transform_point(m, x1, y1);
                let (x2, y2) = transform_point(m, x2, y2);
                let (x, y) = transform_point(m, x, y);
                PathElement::CurveTo(x1, y1, x2, y2, x, y)
            }
            PathElement::ClosePath => PathElement::ClosePath,
        }
    }
}

impl fmt::Display for PathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathElement::MoveTo(x, y) => write!(f, "M {} {}", x, y),
            PathElement::LineTo(x, y) => write!(f, "L {} {}", x, y),
            PathElement::CurveTo(cp1x, cp1y, cp2x, cp2y, x, y) => {
                write!(f, "C {} {} {} {} {} {}", cp1x, cp1y, cp2x, cp2y, x, y)
            }
            PathElement::ClosePath => write!(f, "Z"),
        }
    }
}

/// A path for rendering.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Path {
    elements: Vec<PathElement>,

    /// Current point (if any)
    current_point: Option<(f64, f64)>,

    /// Start of the current subpath (for close operations)
    subpath_start: Option<(f64, f64)>,
}

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    /// Closed rectangle path.
    pub fn from_rect(x: f64, y: f64, width: f64, height: f64) -> Self {
        let mut path = Path::new();
        path.rect(x, y, width, height);
        path
    }

    /// Single open line segment.
    pub fn line(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        let mut path = Path::new();
        path.move_to(x0, y0);
        path.line_to(x1, y1);
        path
    }

    /// Rectangle with elliptical corners. Radii are clamped to half the
    /// side lengths; zero radii give a plain rectangle.
    pub fn round_rect(x: f64, y: f64, width: f64, height: f64, rx: f64, ry: f64) -> Self {
        let rx = rx.abs().min(width.abs() / 2.0);
        let ry = ry.abs().min(height.abs() / 2.0);
        if rx == 0.0 || ry == 0.0 {
            return Path::from_rect(x, y, width, height);
        }
        let (x0, y0, x1, y1) = (x, y, x + width, y + height);
        let (kx, ky) = (rx * KAPPA, ry * KAPPA);

        let mut path = Path::new();
        path.move_to(x0 + rx, y0);
        path.line_to(x1 - rx, y0);
        path.curve_to(x1 - rx + kx, y0, x1, y0 + ry - ky, x1, y0 + ry);
        path.line_to(x1, y1 - ry);
        path.curve_to(x1, y1 - ry + ky, x1 - rx + kx, y1, x1 - rx, y1);
        path.line_to(x0 + rx, y1);
        path.curve_to(x0 + rx - kx, y1, x0, y1 - ry + ky, x0, y1 - ry);
        path.line_to(x0, y0 + ry);
        path.curve_to(x0, y0 + ry - ky, x0 + rx - kx, y0, x0 + rx, y0);
        path.close_path();
        path
    }

    /// Begin a new path, clearing any existing elements.
    pub fn begin(&mut self) {
        self.elements.clear();
        self.current_point = None;
        self.subpath_start = None;
    }

    /// Move to a new point, starting a new subpath.
    pub fn move_to(&mut self, x: f64, y: f64) {
        // consecutive moves collapse into the last one
        if let Some(PathElement::MoveTo(..)) = self.elements.last() {
            self.elements.pop();
        }
        self.elements.push(PathElement::MoveTo(x, y));
        self.current_point = Some((x, y));
        self.subpath_start = Some((x, y));
    }

    /// Add a line segment from the current point to (x, y).
    pub fn line_to(&mut self, x: f64, y: f64) {
        if self.current_point.is_none() {
            self.move_to(x, y);
            return;
        }
        self.elements.push(PathElement::LineTo(x, y));
        self.current_point = Some((x, y));
    }

    /// Add a cubic Bézier curve.
    pub fn curve_to(&mut self, cp1x: f64, cp1y: f64, cp2x: f64, cp2y: f64, x: f64, y: f64) {
        if self.current_point.is_none() {
            self.move_to(cp1x, cp1y);
        }
        self.elements
            .push(PathElement::CurveTo(cp1x, cp1y, cp2x, cp2y, x, y));
        self.current_point = Some((x, y));
    }

    /// `v`: the first control point is the current point.
    pub fn curve_to_v(&mut self, cp2x: f64, cp2y: f64, x: f64, y: f64) {
        let (cx, cy) = self.current_point.unwrap_or((cp2x, cp2y));
        self.curve_to(cx, cy, cp2x, cp2y, x, y);
    }

    /// Add a rectangle to the path.
    pub fn rect(&mut self, x: f64, y: f64, width: f64, height: f64) {
        self.move_to(x, y);
        self.line_to(x + width, y);
        self.line_to(x + width, y + height);
        self.line_to(x, y + height);
        self.close_path();
    }

    /// Close the current subpath.
    pub fn close_path(&mut self) {
        if matches!(
            self.elements.last(),
            None | Some(PathElement::ClosePath) | Some(PathElement::MoveTo(..))
        ) {
            return;
        }
        self.elements.push(PathElement::ClosePath);
        if let Some(start) = self.subpath_start {
            self.current_point = Some(start);
        }
    }

    /// Appends all elements of `other`.
    pub fn append(&mut self, other: &Path) {
        self.elements.extend_from_slice(&other.elements);
        self.current_point = other.current_point;
        self.subpath_start = other.subpath_start;
    }

    /// A copy of this path with every point mapped through `m`.
    pub fn transformed(&self, m: &Matrix) -> Path {
        Path {
            elements: self.elements.iter().map(|el| el.transformed(m)).collect(),
            current_point: self.current_point.map(|(x, y)| transform_point(m, x, y)),
            subpath_start: self.subpath_start.map(|(x, y)| transform_point(m, x, y)),
        }
    }

    pub fn current_point(&self) -> Option<(f64, f64)> {
        self.current_point
    }

    pub fn elements(&self) -> &[PathElement] {
        &self.elements
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Control-point bounding box `(min_x, min_y, max_x, max_y)`.
    pub fn bounding_box(&self) -> Option<(f64, f64, f64, f64)> {
        let mut points = self.elements.iter().flat_map(|el| match *el {
            PathElement::MoveTo(x, y) | PathElement::LineTo(x, y) => vec![(x, y)],
            PathElement::CurveTo(x1, y1, x2, y2, x, y) => vec![(x1, y1), (x2, y2), (x, y)],
            PathElement::ClosePath => vec![],
        });
        let (x, y) = points.next()?;
        Some(points.fold((x, y, x, y), |(x0, y0, x1, y1), (x, y)| {
            (x0.min(x), y0.min(y), x1.max(x), y1.max(y))
        }))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for el in &self.elements {
            write!(f, "{} ", el)?;
        }
        Ok(())
    }
}
