//! Color spaces (ISO 32000-1, 8.6).
//!
//! A [`ColorSpace`] is resolved once from its PDF object and shared through
//! `Arc`. [`ColorSpace::get_color`] always produces a device [`Color`];
//! malformed component vectors are truncated or zero-padded, never rejected.

use super::graphics_state::Color;
use crate::core::document::ObjectResolver;
use crate::core::error::{PDFError, PDFResult};
use crate::core::filter::decode_stream;
use crate::core::function::Function;
use crate::core::object::PDFObject;
use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::sync::Arc;

/// Nested color space definitions deeper than this are malformed.
const MAX_COLOR_SPACE_DEPTH: usize = 8;

/// Colorants that map positionally onto a CMYK alternate.
const PROCESS_COLORANTS: [&str; 4] = ["Cyan", "Magenta", "Yellow", "Black"];

static DEVICE_GRAY: Lazy<Arc<ColorSpace>> = Lazy::new(|| Arc::new(ColorSpace::DeviceGray));
static DEVICE_RGB: Lazy<Arc<ColorSpace>> = Lazy::new(|| Arc::new(ColorSpace::DeviceRGB));
static DEVICE_CMYK: Lazy<Arc<ColorSpace>> = Lazy::new(|| Arc::new(ColorSpace::DeviceCMYK));

type Components = SmallVec<[f32; 4]>;

/// A resolved color space.
#[derive(Debug, Clone, PartialEq)]
pub enum ColorSpace {
    DeviceGray,
    DeviceRGB,
    DeviceCMYK,
    /// Painted as DeviceGray
    CalGray,
    /// Painted as DeviceRGB
    CalRGB,
    Lab(Lab),
    Indexed(Indexed),
    Separation(DeviceN),
    DeviceN(DeviceN),
    /// ICC profiles are not interpreted; colors go through the alternate.
    ICCBased {
        components: usize,
        alternate: Arc<ColorSpace>,
    },
    /// Underlying space for uncolored patterns, if any.
    Pattern(Option<Arc<ColorSpace>>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lab {
    white_point: [f64; 3],
    range: [f64; 4],
}

#[derive(Debug, Clone, PartialEq)]
pub struct Indexed {
    base: Arc<ColorSpace>,
    hival: usize,
    lookup: Vec<u8>,
}

/// Separation and DeviceN spaces: named colorants with an alternate space.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceN {
    names: Vec<String>,
    alternate: Arc<ColorSpace>,
    tint_transform: Option<Arc<Function>>,
    /// Per-colorant spaces from the attributes `/Colorants` dictionary
    colorants: FxHashMap<String, Arc<ColorSpace>>,
    /// `colorants` looked up for each entry of `names`
    colorant_spaces: Vec<Option<Arc<ColorSpace>>>,
}

impl ColorSpace {
    pub fn device_gray() -> Arc<ColorSpace> {
        DEVICE_GRAY.clone()
    }

    pub fn device_rgb() -> Arc<ColorSpace> {
        DEVICE_RGB.clone()
    }

    pub fn device_cmyk() -> Arc<ColorSpace> {
        DEVICE_CMYK.clone()
    }

    /// Resolves a color space name or array.
    ///
    /// Unknown names degrade to DeviceGray with a warning. Structural errors
    /// (a DeviceN without names, a cycle of indirect definitions) are errors;
    /// callers fall back to DeviceGray.
    pub fn from_object(obj: &PDFObject, resolver: &dyn ObjectResolver) -> PDFResult<ColorSpace> {
        Self::parse(obj, resolver, 0)
    }

    fn parse(obj: &PDFObject, resolver: &dyn ObjectResolver, depth: usize) -> PDFResult<ColorSpace> {
        if depth > MAX_COLOR_SPACE_DEPTH {
            return Err(PDFError::RecursionGuard("color space".into()));
        }
        let obj = resolver.fetch(obj);
        match &*obj {
            PDFObject::Name(name) => Ok(Self::from_name(name)),
            PDFObject::Array(items) => {
                let family = items
                    .first()
                    .and_then(|n| n.as_name())
                    .ok_or_else(|| PDFError::unresolved("color space", "array without family name"))?;
                let operand = |i: usize| items.get(i).map(|b| &**b);
                let nested = |i: usize| -> PDFResult<Arc<ColorSpace>> {
                    let item = operand(i).ok_or_else(|| {
                        PDFError::unresolved(format!("{} color space", family), "missing operand")
                    })?;
                    Self::parse(item, resolver, depth + 1).map(Arc::new)
                };

                match family {
                    "CalGray" => Ok(ColorSpace::CalGray),
                    "CalRGB" => Ok(ColorSpace::CalRGB),
                    "Lab" => {
                        let dict = operand(1).map(|d| resolver.fetch(d).into_owned());
                        let dict = dict.as_ref().and_then(|d| d.as_dictionary());
                        let read = |key: &str| {
                            dict.and_then(|d| resolver.fetch_key(d, key))
                                .and_then(|v| v.number_array())
                        };
                        let white_point = match read("WhitePoint").as_deref() {
                            Some(&[x, y, z, ..]) => [x, y, z],
                            _ => [0.9505, 1.0, 1.089],
                        };
                        let range = match read("Range").as_deref() {
                            Some(&[a0, a1, b0, b1, ..]) => [a0, a1, b0, b1],
                            _ => [-100.0, 100.0, -100.0, 100.0],
                        };
                        Ok(ColorSpace::Lab(Lab { white_point, range }))
                    }
                    "ICCBased" => {
                        let stream = operand(1).map(|s| resolver.fetch(s).into_owned());
                        let dict = stream.as_ref().and_then(|s| s.as_dictionary());
                        let components = dict
                            .and_then(|d| resolver.fetch_key(d, "N"))
                            .and_then(|n| n.as_int())
                            .unwrap_or(3) as usize;
                        let alternate = match dict.and_then(|d| d.get("Alternate")) {
                            Some(alt) => Arc::new(Self::parse(alt, resolver, depth + 1)?),
                            None => match components {
                                1 => ColorSpace::device_gray(),
                                4 => ColorSpace::device_cmyk(),
                                _ => ColorSpace::device_rgb(),
                            },
                        };
                        Ok(ColorSpace::ICCBased {
                            components,
                            alternate,
                        })
                    }
                    "Indexed" | "I" => {
                        let base = nested(1)?;
                        let hival = operand(2)
                            .and_then(|h| resolver.fetch(h).as_int())
                            .unwrap_or(0)
                            .clamp(0, 255) as usize;
                        let lookup = operand(3)
                            .map(|l| Self::lookup_bytes(&resolver.fetch(l)))
                            .unwrap_or_default();
                        Ok(ColorSpace::Indexed(Indexed { base, hival, lookup }))
                    }
                    "Separation" => {
                        let name = operand(1)
                            .and_then(|n| n.as_name())
                            .unwrap_or("All")
                            .to_string();
                        let alternate = nested(2)?;
                        let tint = Self::tint_transform(operand(3), resolver);
                        Ok(ColorSpace::Separation(DeviceN::new(
                            vec![name],
                            alternate,
                            tint,
                            FxHashMap::default(),
                        )))
                    }
                    "DeviceN" => {
                        let names: Vec<String> = operand(1)
                            .map(|n| resolver.fetch(n).into_owned())
                            .and_then(|n| {
                                n.as_array().map(|items| {
                                    items
                                        .iter()
                                        .filter_map(|i| i.as_name().map(str::to_string))
                                        .collect()
                                })
                            })
                            .unwrap_or_default();
                        if names.is_empty() {
                            return Err(PDFError::unresolved("DeviceN color space", "no colorant names"));
                        }
                        let alternate = nested(2)?;
                        let tint = Self::tint_transform(operand(3), resolver);
                        let colorants = match operand(4) {
                            Some(attributes) => Self::colorants(attributes, resolver, depth)?,
                            None => FxHashMap::default(),
                        };
                        Ok(ColorSpace::DeviceN(DeviceN::new(names, alternate, tint, colorants)))
                    }
                    "Pattern" => {
                        let base = match operand(1) {
                            Some(base) => Some(Arc::new(Self::parse(base, resolver, depth + 1)?)),
                            None => None,
                        };
                        Ok(ColorSpace::Pattern(base))
                    }
                    // single-element arrays like [/DeviceRGB]
                    other => Ok(Self::from_name(other)),
                }
            }
            other => Err(PDFError::unresolved(
                "color space",
                format!("unexpected object {:?}", other),
            )),
        }
    }

    fn from_name(name: &str) -> ColorSpace {
        match name {
            "DeviceGray" | "G" | "CalGray" => ColorSpace::DeviceGray,
            "DeviceRGB" | "RGB" | "CalRGB" => ColorSpace::DeviceRGB,
            "DeviceCMYK" | "CMYK" => ColorSpace::DeviceCMYK,
            "Pattern" => ColorSpace::Pattern(None),
            other => {
                log::warn!("unknown color space /{}, using DeviceGray", other);
                ColorSpace::DeviceGray
            }
        }
    }

    fn lookup_bytes(obj: &PDFObject) -> Vec<u8> {
        match obj {
            PDFObject::String(bytes) => bytes.clone(),
            PDFObject::Stream { dict, data } => match decode_stream(dict, data) {
                Ok(decoded) => decoded.data,
                Err(e) => {
                    log::warn!("indexed lookup table: {}", e);
                    Vec::new()
                }
            },
            _ => Vec::new(),
        }
    }

    fn tint_transform(obj: Option<&PDFObject>, resolver: &dyn ObjectResolver) -> Option<Arc<Function>> {
        let obj = obj?;
        match Function::from_object(obj, resolver) {
            Ok(function) => Some(Arc::new(function)),
            Err(e) => {
                log::warn!("ignoring tint transform: {}", e);
                None
            }
        }
    }

    fn colorants(
        attributes: &PDFObject,
        resolver: &dyn ObjectResolver,
        depth: usize,
    ) -> PDFResult<FxHashMap<String, Arc<ColorSpace>>> {
        let attributes = resolver.fetch(attributes);
        let Some(colorants) = attributes
            .as_dictionary()
            .and_then(|d| resolver.fetch_key(d, "Colorants"))
        else {
            return Ok(FxHashMap::default());
        };
        let mut table = FxHashMap::default();
        if let Some(entries) = colorants.as_dictionary() {
            for (name, space) in entries {
                table.insert(name.clone(), Arc::new(Self::parse(space, resolver, depth + 1)?));
            }
        }
        Ok(table)
    }

    /// Number of color components an operand vector should carry.
    pub fn num_components(&self) -> usize {
        match self {
            ColorSpace::DeviceGray | ColorSpace::CalGray | ColorSpace::Indexed(_) => 1,
            ColorSpace::DeviceRGB | ColorSpace::CalRGB | ColorSpace::Lab(_) => 3,
            ColorSpace::DeviceCMYK => 4,
            ColorSpace::Separation(n) | ColorSpace::DeviceN(n) => n.names.len(),
            ColorSpace::ICCBased { components, .. } => *components,
            ColorSpace::Pattern(base) => base.as_ref().map_or(0, |b| b.num_components()),
        }
    }

    /// Color selected by `cs`/`CS` before any explicit color operator.
    pub fn initial_color(&self) -> Color {
        match self {
            // full tint
            ColorSpace::Separation(_) | ColorSpace::DeviceN(_) => {
                let full: Components = SmallVec::from_elem(1.0, self.num_components());
                self.get_color(&full)
            }
            ColorSpace::Lab(lab) => {
                let a = 0f64.clamp(lab.range[0], lab.range[1]) as f32;
                let b = 0f64.clamp(lab.range[2], lab.range[3]) as f32;
                self.get_color(&[0.0, a, b])
            }
            ColorSpace::DeviceCMYK => Color::CMYK(0.0, 0.0, 0.0, 1.0),
            _ => self.get_color(&[]),
        }
    }

    /// Resolves a component vector to a device color.
    pub fn get_color(&self, components: &[f32]) -> Color {
        let c = |i: usize| components.get(i).copied().unwrap_or(0.0).clamp(0.0, 1.0) as f64;
        match self {
            ColorSpace::DeviceGray | ColorSpace::CalGray => Color::Gray(c(0)),
            ColorSpace::DeviceRGB | ColorSpace::CalRGB => Color::RGB(c(0), c(1), c(2)),
            ColorSpace::DeviceCMYK => Color::CMYK(c(0), c(1), c(2), c(3)),
            ColorSpace::Lab(lab) => lab.to_rgb(components),
            ColorSpace::Indexed(indexed) => indexed.get_color(components),
            ColorSpace::Separation(n) | ColorSpace::DeviceN(n) => n.get_color(components),
            ColorSpace::ICCBased { alternate, .. } => alternate.get_color(components),
            ColorSpace::Pattern(Some(base)) => base.get_color(components),
            ColorSpace::Pattern(None) => Color::black(),
        }
    }

    pub fn is_pattern(&self) -> bool {
        matches!(self, ColorSpace::Pattern(_))
    }

    pub fn is_indexed(&self) -> bool {
        matches!(self, ColorSpace::Indexed(_))
    }
}

impl Indexed {
    fn get_color(&self, components: &[f32]) -> Color {
        let index = components
            .first()
            .map_or(0, |i| i.round().clamp(0.0, self.hival as f32) as usize);
        let n = self.base.num_components();
        let start = index * n;
        match self.lookup.get(start..start + n) {
            Some(entry) => {
                let values: Components = entry.iter().map(|&b| b as f32 / 255.0).collect();
                self.base.get_color(&values)
            }
            None => Color::black(),
        }
    }
}

impl Lab {
    /// CIE L*a*b* to sRGB under the space's white point.
    fn to_rgb(&self, components: &[f32]) -> Color {
        let get = |i: usize| components.get(i).copied().unwrap_or(0.0) as f64;
        let l = get(0).clamp(0.0, 100.0);
        let a = get(1).clamp(self.range[0], self.range[1]);
        let b = get(2).clamp(self.range[2], self.range[3]);

        let fy = (l + 16.0) / 116.0;
        let fx = fy + a / 500.0;
        let fz = fy - b / 200.0;
        let g = |t: f64| {
            if t > 6.0 / 29.0 {
                t * t * t
            } else {
                108.0 / 841.0 * (t - 4.0 / 29.0)
            }
        };
        let [xw, yw, zw] = self.white_point;
        let (x, y, z) = (xw * g(fx), yw * g(fy), zw * g(fz));

        let r = 3.2406 * x - 1.5372 * y - 0.4986 * z;
        let gr = -0.9689 * x + 1.8758 * y + 0.0415 * z;
        let bl = 0.0557 * x - 0.2040 * y + 1.0570 * z;
        let encode = |v: f64| {
            let v = v.clamp(0.0, 1.0);
            if v <= 0.003_130_8 {
                12.92 * v
            } else {
                1.055 * v.powf(1.0 / 2.4) - 0.055
            }
        };
        Color::RGB(encode(r), encode(gr), encode(bl))
    }
}

impl DeviceN {
    fn new(
        names: Vec<String>,
        alternate: Arc<ColorSpace>,
        tint_transform: Option<Arc<Function>>,
        colorants: FxHashMap<String, Arc<ColorSpace>>,
    ) -> Self {
        let colorant_spaces = names.iter().map(|name| colorants.get(name).cloned()).collect();
        DeviceN {
            names,
            alternate,
            tint_transform,
            colorants,
            colorant_spaces,
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn alternate(&self) -> &Arc<ColorSpace> {
        &self.alternate
    }

    pub fn colorant(&self, name: &str) -> Option<&Arc<ColorSpace>> {
        self.colorants.get(name)
    }

    /// Whether the colorants can be placed straight into a CMYK vector.
    fn maps_to_cmyk(&self, inputs: usize) -> bool {
        if self.alternate.num_components() != 4 {
            return false;
        }
        inputs < 4
            || (self.names.len() == 4
                && self
                    .names
                    .iter()
                    .all(|n| PROCESS_COLORANTS.contains(&n.as_str())))
    }

    fn get_color(&self, components: &[f32]) -> Color {
        let Some(tint) = &self.tint_transform else {
            let n = self.alternate.num_components();
            if self.maps_to_cmyk(components.len()) {
                let mut cmyk = [0.0f32; 4];
                for (value, name) in components.iter().zip(&self.names) {
                    if let Some(slot) = PROCESS_COLORANTS.iter().position(|p| p == name) {
                        cmyk[slot] = *value;
                    }
                }
                return self.alternate.get_color(&cmyk);
            }
            let mut values: Components = components.iter().copied().take(n).collect();
            values.resize(n, 0.0);
            return self.alternate.get_color(&values);
        };

        let output = tint.evaluate(components);
        match self.colorant_spaces.first() {
            Some(Some(space)) => space.get_color(&output),
            _ => self.alternate.get_color(&output),
        }
    }
}
