//! PDF object model consumed by the paint pipeline.
//!
//! Objects arrive already parsed from the document layer. Components read
//! them once at construction and keep strongly typed fields afterwards.

use smallvec::SmallVec;
use std::collections::HashMap;

/// A PDF dictionary.
pub type Dict = HashMap<String, PDFObject>;

/// An indirect object reference.
///
/// # Example
/// ```
/// use pdf_x_render::core::Ref;
/// let image = Ref::new(12, 0);  // Object 12, generation 0
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ref {
    /// Object number
    pub num: u32,

    /// Generation number
    pub generation: u32,
}

impl Ref {
    #[inline]
    pub const fn new(num: u32, generation: u32) -> Self {
        Self { num, generation }
    }
}

impl std::fmt::Display for Ref {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} R", self.num, self.generation)
    }
}

/// PDF object types.
#[derive(Debug, Clone, PartialEq)]
pub enum PDFObject {
    /// Null value
    Null,

    /// Boolean value
    Boolean(bool),

    /// Numeric value (integers and reals)
    Number(f64),

    /// String value (literal or hex, already unescaped)
    String(Vec<u8>),

    /// Name value (from /Name)
    Name(String),

    /// Array of objects
    /// Uses SmallVec to store up to 4 elements inline (matrices and rects
    /// spill, but most color component arrays and dash arrays don't)
    Array(SmallVec<[Box<PDFObject>; 4]>),

    /// Dictionary (key-value pairs)
    Dictionary(Dict),

    /// Stream object (dictionary + decoded-filter-pending binary data)
    Stream { dict: Dict, data: Vec<u8> },

    /// Indirect object reference (like "5 0 R")
    Ref(Ref),
}

impl PDFObject {
    pub fn name(name: &str) -> Self {
        PDFObject::Name(name.to_string())
    }

    pub fn numbers(values: &[f64]) -> Self {
        PDFObject::Array(values.iter().map(|v| Box::new(PDFObject::Number(*v))).collect())
    }

    pub fn array(items: impl IntoIterator<Item = PDFObject>) -> Self {
        PDFObject::Array(items.into_iter().map(Box::new).collect())
    }

    pub fn dict<'a>(entries: impl IntoIterator<Item = (&'a str, PDFObject)>) -> Self {
        PDFObject::Dictionary(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }

    pub fn stream<'a>(entries: impl IntoIterator<Item = (&'a str, PDFObject)>, data: Vec<u8>) -> Self {
        PDFObject::Stream {
            dict: entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            data,
        }
    }

    /// Returns true if this object is null.
    pub fn is_null(&self) -> bool {
        matches!(self, PDFObject::Null)
    }

    /// Returns the name value if this is a Name object.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            PDFObject::Name(name) => Some(name),
            _ => None,
        }
    }

    /// Returns the bytes if this is a String object.
    pub fn as_string(&self) -> Option<&[u8]> {
        match self {
            PDFObject::String(data) => Some(data),
            _ => None,
        }
    }

    /// Lossy UTF-8 view of a string object.
    pub fn as_text(&self) -> Option<String> {
        self.as_string()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            PDFObject::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            PDFObject::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Integer view of a number, truncating toward zero.
    pub fn as_int(&self) -> Option<i64> {
        self.as_number().map(|n| n as i64)
    }

    /// Returns a reference to the dictionary if this is a Dictionary or Stream.
    pub fn as_dictionary(&self) -> Option<&Dict> {
        match self {
            PDFObject::Dictionary(dict) => Some(dict),
            PDFObject::Stream { dict, .. } => Some(dict),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Box<PDFObject>]> {
        match self {
            PDFObject::Array(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<Ref> {
        match self {
            PDFObject::Ref(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_stream(&self) -> Option<(&Dict, &[u8])> {
        match self {
            PDFObject::Stream { dict, data } => Some((dict, data)),
            _ => None,
        }
    }

    /// Reads an array of numbers; non-numeric elements become 0.
    pub fn number_array(&self) -> Option<Vec<f64>> {
        self.as_array()
            .map(|arr| arr.iter().map(|v| v.as_number().unwrap_or(0.0)).collect())
    }

    /// Reads a 6-element matrix array.
    pub fn as_matrix(&self) -> Option<[f64; 6]> {
        let values = self.number_array()?;
        if values.len() < 6 {
            return None;
        }
        Some([values[0], values[1], values[2], values[3], values[4], values[5]])
    }

    /// Reads a rectangle array and normalizes it to `[llx, lly, urx, ury]`.
    pub fn as_rect(&self) -> Option<[f64; 4]> {
        let values = self.number_array()?;
        if values.len() < 4 {
            return None;
        }
        Some([
            values[0].min(values[2]),
            values[1].min(values[3]),
            values[0].max(values[2]),
            values[1].max(values[3]),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_is_normalized() {
        let rect = PDFObject::numbers(&[100.0, 200.0, 50.0, 20.0]);
        assert_eq!(rect.as_rect(), Some([50.0, 20.0, 100.0, 200.0]));
    }

    #[test]
    fn test_matrix_requires_six_numbers() {
        assert_eq!(PDFObject::numbers(&[1.0, 0.0, 0.0]).as_matrix(), None);
        assert_eq!(
            PDFObject::numbers(&[1.0, 0.0, 0.0, 1.0, 5.0, 6.0]).as_matrix(),
            Some([1.0, 0.0, 0.0, 1.0, 5.0, 6.0])
        );
    }

    #[test]
    fn test_stream_exposes_dictionary() {
        let obj = PDFObject::stream([("Subtype", PDFObject::name("Image"))], vec![1, 2, 3]);
        assert_eq!(
            obj.as_dictionary().and_then(|d| d.get("Subtype")).and_then(|n| n.as_name()),
            Some("Image")
        );
        assert_eq!(obj.as_stream().map(|(_, data)| data.len()), Some(3));
    }
}
