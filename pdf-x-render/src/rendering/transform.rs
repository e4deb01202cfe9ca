//! Affine matrix helpers.
//!
//! Matrices are 6-element arrays `[a b c d e f]` representing
//! ```text
//! | a c e |
//! | b d f |
//! | 0 0 1 |
//! ```
//! `concat(m, t)` applies `t` first, then `m`, which is how the CTM is
//! updated by `cm`. The `translate`/`scale`/`rotate` helpers post-multiply in
//! the same way, so they act in the current user space.

use std::f64::consts::PI;

pub type Matrix = [f64; 6];

pub const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// Returns `m * t`: a point is transformed by `t`, then by `m`.
#[inline]
pub fn concat(m: &Matrix, t: &Matrix) -> Matrix {
    let [a, b, c, d, e, f] = *t;
    let [ma, mb, mc, md, me, mf] = *m;
    [
        ma * a + mc * b,
        mb * a + md * b,
        ma * c + mc * d,
        mb * c + md * d,
        ma * e + mc * f + me,
        mb * e + md * f + mf,
    ]
}

/// Inverse of `m`, or `None` when it is singular.
pub fn invert(m: &Matrix) -> Option<Matrix> {
    let [a, b, c, d, e, f] = *m;
    let det = a * d - b * c;
    if det.abs() < f64::EPSILON * 16.0 || !det.is_finite() {
        return None;
    }
    Some([
        d / det,
        -b / det,
        -c / det,
        a / det,
        (c * f - d * e) / det,
        (b * e - a * f) / det,
    ])
}

#[inline]
pub fn transform_point(m: &Matrix, x: f64, y: f64) -> (f64, f64) {
    let [a, b, c, d, e, f] = *m;
    (a * x + c * y + e, b * x + d * y + f)
}

/// Axis-aligned bounds `[x0, y0, x1, y1]` of a transformed rectangle.
pub fn transform_rect_bounds(m: &Matrix, rect: &[f64; 4]) -> [f64; 4] {
    let corners = [
        transform_point(m, rect[0], rect[1]),
        transform_point(m, rect[2], rect[1]),
        transform_point(m, rect[0], rect[3]),
        transform_point(m, rect[2], rect[3]),
    ];
    let mut bounds = [f64::MAX, f64::MAX, f64::MIN, f64::MIN];
    for (x, y) in corners {
        bounds[0] = bounds[0].min(x);
        bounds[1] = bounds[1].min(y);
        bounds[2] = bounds[2].max(x);
        bounds[3] = bounds[3].max(y);
    }
    bounds
}

pub fn translation(tx: f64, ty: f64) -> Matrix {
    [1.0, 0.0, 0.0, 1.0, tx, ty]
}

pub fn scaling(sx: f64, sy: f64) -> Matrix {
    [sx, 0.0, 0.0, sy, 0.0, 0.0]
}

/// Rotation by `radians` from the +x axis toward the +y axis.
pub fn rotation(radians: f64) -> Matrix {
    let (sin, cos) = radians.sin_cos();
    [cos, sin, -sin, cos, 0.0, 0.0]
}

/// Clockwise rotation in y-up user space, exact for multiples of 90°.
pub fn rotation_clockwise(degrees: f64) -> Matrix {
    let normalized = normalize_degrees(degrees);
    let (sin, cos) = if normalized == 0.0 {
        (0.0, 1.0)
    } else if normalized == 90.0 {
        (1.0, 0.0)
    } else if normalized == 180.0 {
        (0.0, -1.0)
    } else if normalized == 270.0 {
        (-1.0, 0.0)
    } else {
        (normalized * PI / 180.0).sin_cos()
    };
    // clockwise in y-up space is a negative angle
    [cos, -sin, sin, cos, 0.0, 0.0]
}

/// Maps an angle into `[0, 360)`.
pub fn normalize_degrees(degrees: f64) -> f64 {
    let normalized = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if normalized >= 360.0 || normalized == 0.0 { 0.0 } else { normalized }
}

pub fn translate(m: &Matrix, tx: f64, ty: f64) -> Matrix {
    concat(m, &translation(tx, ty))
}

pub fn scale(m: &Matrix, sx: f64, sy: f64) -> Matrix {
    concat(m, &scaling(sx, sy))
}

pub fn rotate_clockwise(m: &Matrix, degrees: f64) -> Matrix {
    concat(m, &rotation_clockwise(degrees))
}

/// The matrix without its translation.
#[inline]
pub fn linear_part(m: &Matrix) -> Matrix {
    [m[0], m[1], m[2], m[3], 0.0, 0.0]
}

/// Length of the transformed unit x and y vectors.
pub fn scale_factors(m: &Matrix) -> (f64, f64) {
    (m[0].hypot(m[1]), m[2].hypot(m[3]))
}

/// Base transform from page space to a y-down device surface.
///
/// The media box is scaled by `zoom`, flipped so that the top edge lands on
/// y = 0, rotated clockwise by `rotation` degrees and moved back into the
/// positive quadrant. Returns the matrix and the device size in pixels.
///
/// # Arguments
/// * `media_box` - `[x0, y0, x1, y1]` in default user space
/// * `rotation` - page rotation plus viewer rotation, clockwise degrees
/// * `zoom` - device pixels per user space unit
pub fn page_transform(media_box: &[f64; 4], rotation: f64, zoom: f64) -> (Matrix, (f64, f64)) {
    let m = concat(&scaling(zoom, -zoom), &rotation_clockwise(rotation));
    let bounds = transform_rect_bounds(&m, media_box);
    let m = concat(&translation(-bounds[0], -bounds[1]), &m);
    (m, (bounds[2] - bounds[0], bounds[3] - bounds[1]))
}
