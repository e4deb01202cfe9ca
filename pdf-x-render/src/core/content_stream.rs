//! Content stream operators.
//!
//! The document layer tokenizes content streams; this module only models the
//! resulting operator sequence. Operators keep their operands in source order.

use super::error::{PDFError, PDFResult};
use super::object::PDFObject;
use std::fmt;

/// PDF content stream operator codes (ISO 32000-1, Annex A).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    // General graphics state
    SetLineWidth,
    SetLineCap,
    SetLineJoin,
    SetMiterLimit,
    SetDash,
    SetRenderingIntent,
    SetFlatness,
    SetGState,

    // Special graphics state
    Save,
    Restore,
    Transform,

    // Path construction
    MoveTo,
    LineTo,
    CurveTo,
    /// v - initial point replicated
    CurveTo2,
    /// y - final point replicated
    CurveTo3,
    ClosePath,
    Rectangle,

    // Path painting
    Stroke,
    CloseStroke,
    Fill,
    EOFill,
    FillStroke,
    EOFillStroke,
    CloseFillStroke,
    CloseEOFillStroke,
    EndPath,

    // Clipping paths
    Clip,
    EOClip,

    // Text objects and state
    BeginText,
    EndText,
    SetCharSpacing,
    SetWordSpacing,
    SetHScale,
    SetLeading,
    SetFont,
    SetTextRenderingMode,
    SetTextRise,
    MoveText,
    SetLeadingMoveText,
    SetTextMatrix,
    NextLine,
    ShowText,
    ShowSpacedText,
    NextLineShowText,
    NextLineSetSpacingShowText,

    // Type 3 glyph metrics
    SetCharWidth,
    SetCharWidthAndBounds,

    // Color
    SetStrokeColorSpace,
    SetFillColorSpace,
    SetStrokeColor,
    SetStrokeColorN,
    SetFillColor,
    SetFillColorN,
    SetStrokeGray,
    SetFillGray,
    SetStrokeRGBColor,
    SetFillRGBColor,
    SetStrokeCMYKColor,
    SetFillCMYKColor,

    // Shading, images and XObjects
    ShadingFill,
    /// BI..ID..EI collapsed by the tokenizer into one operator whose single
    /// operand is the image stream.
    InlineImage,
    PaintXObject,

    // Marked content and compatibility
    MarkPoint,
    MarkPointProps,
    BeginMarkedContent,
    BeginMarkedContentProps,
    EndMarkedContent,
    BeginCompat,
    EndCompat,
}

const COMMANDS: &[(&str, OpCode)] = &[
    ("w", OpCode::SetLineWidth),
    ("J", OpCode::SetLineCap),
    ("j", OpCode::SetLineJoin),
    ("M", OpCode::SetMiterLimit),
    ("d", OpCode::SetDash),
    ("ri", OpCode::SetRenderingIntent),
    ("i", OpCode::SetFlatness),
    ("gs", OpCode::SetGState),
    ("q", OpCode::Save),
    ("Q", OpCode::Restore),
    ("cm", OpCode::Transform),
    ("m", OpCode::MoveTo),
    ("l", OpCode::LineTo),
    ("c", OpCode::CurveTo),
    ("v", OpCode::CurveTo2),
    ("y", OpCode::CurveTo3),
    ("h", OpCode::ClosePath),
    ("re", OpCode::Rectangle),
    ("S", OpCode::Stroke),
    ("s", OpCode::CloseStroke),
    ("f", OpCode::Fill),
    ("f*", OpCode::EOFill),
    ("B", OpCode::FillStroke),
    ("B*", OpCode::EOFillStroke),
    ("b", OpCode::CloseFillStroke),
    ("b*", OpCode::CloseEOFillStroke),
    ("n", OpCode::EndPath),
    ("W", OpCode::Clip),
    ("W*", OpCode::EOClip),
    ("BT", OpCode::BeginText),
    ("ET", OpCode::EndText),
    ("Tc", OpCode::SetCharSpacing),
    ("Tw", OpCode::SetWordSpacing),
    ("Tz", OpCode::SetHScale),
    ("TL", OpCode::SetLeading),
    ("Tf", OpCode::SetFont),
    ("Tr", OpCode::SetTextRenderingMode),
    ("Ts", OpCode::SetTextRise),
    ("Td", OpCode::MoveText),
    ("TD", OpCode::SetLeadingMoveText),
    ("Tm", OpCode::SetTextMatrix),
    ("T*", OpCode::NextLine),
    ("Tj", OpCode::ShowText),
    ("TJ", OpCode::ShowSpacedText),
    ("'", OpCode::NextLineShowText),
    ("\"", OpCode::NextLineSetSpacingShowText),
    ("d0", OpCode::SetCharWidth),
    ("d1", OpCode::SetCharWidthAndBounds),
    ("CS", OpCode::SetStrokeColorSpace),
    ("cs", OpCode::SetFillColorSpace),
    ("SC", OpCode::SetStrokeColor),
    ("SCN", OpCode::SetStrokeColorN),
    ("sc", OpCode::SetFillColor),
    ("scn", OpCode::SetFillColorN),
    ("G", OpCode::SetStrokeGray),
    ("g", OpCode::SetFillGray),
    ("RG", OpCode::SetStrokeRGBColor),
    ("rg", OpCode::SetFillRGBColor),
    ("K", OpCode::SetStrokeCMYKColor),
    ("k", OpCode::SetFillCMYKColor),
    ("sh", OpCode::ShadingFill),
    ("BI", OpCode::InlineImage),
    ("Do", OpCode::PaintXObject),
    ("MP", OpCode::MarkPoint),
    ("DP", OpCode::MarkPointProps),
    ("BMC", OpCode::BeginMarkedContent),
    ("BDC", OpCode::BeginMarkedContentProps),
    ("EMC", OpCode::EndMarkedContent),
    ("BX", OpCode::BeginCompat),
    ("EX", OpCode::EndCompat),
];

impl OpCode {
    /// Converts a PDF operator string (e.g. "m", "cm", "scn") to an OpCode.
    pub fn from_command(cmd: &str) -> PDFResult<OpCode> {
        // "F" is an obsolete spelling of "f"
        let cmd = if cmd == "F" { "f" } else { cmd };
        COMMANDS
            .iter()
            .find(|(name, _)| *name == cmd)
            .map(|(_, op)| *op)
            .ok_or_else(|| PDFError::content_stream_error(format!("Unknown PDF operator: '{}'", cmd)))
    }

    /// Returns the PDF operator string for this opcode.
    pub fn to_command(&self) -> &'static str {
        COMMANDS
            .iter()
            .find(|(_, op)| op == self)
            .map(|(name, _)| *name)
            .unwrap_or("?")
    }

    /// Operators that consume the current path.
    pub fn is_path_painting(&self) -> bool {
        matches!(
            self,
            OpCode::Stroke
                | OpCode::CloseStroke
                | OpCode::Fill
                | OpCode::EOFill
                | OpCode::FillStroke
                | OpCode::EOFillStroke
                | OpCode::CloseFillStroke
                | OpCode::CloseEOFillStroke
                | OpCode::EndPath
        )
    }

    /// Operators that set a color or color space. Uncolored tiling pattern
    /// cells ignore these.
    pub fn is_color(&self) -> bool {
        matches!(
            self,
            OpCode::SetStrokeColorSpace
                | OpCode::SetFillColorSpace
                | OpCode::SetStrokeColor
                | OpCode::SetStrokeColorN
                | OpCode::SetFillColor
                | OpCode::SetFillColorN
                | OpCode::SetStrokeGray
                | OpCode::SetFillGray
                | OpCode::SetStrokeRGBColor
                | OpCode::SetFillRGBColor
                | OpCode::SetStrokeCMYKColor
                | OpCode::SetFillCMYKColor
        )
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_command())
    }
}

/// A content stream operation: an operator code and its operands.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    /// The operator code
    pub op: OpCode,
    /// The operand arguments (read before the operator)
    pub args: Vec<PDFObject>,
}

impl Operation {
    pub fn new(op: OpCode, args: Vec<PDFObject>) -> Self {
        Operation { op, args }
    }

    /// Shorthand for operators whose operands are all numbers.
    pub fn with_numbers(op: OpCode, values: &[f64]) -> Self {
        Operation {
            op,
            args: values.iter().map(|v| PDFObject::Number(*v)).collect(),
        }
    }

    /// Returns operand `index` as a number.
    pub fn number(&self, index: usize) -> PDFResult<f64> {
        match self.args.get(index) {
            Some(PDFObject::Number(n)) => Ok(*n),
            Some(_) => Err(PDFError::content_stream_error(format!(
                "{} operand {} must be a number",
                self.op, index
            ))),
            None => Err(PDFError::content_stream_error(format!(
                "{} operator requires at least {} operands",
                self.op,
                index + 1
            ))),
        }
    }

    /// Returns the first `N` operands as numbers.
    pub fn numbers<const N: usize>(&self) -> PDFResult<[f64; N]> {
        let mut values = [0.0; N];
        for (i, value) in values.iter_mut().enumerate() {
            *value = self.number(i)?;
        }
        Ok(values)
    }

    /// Leading numeric operands, stopping at the first non-number.
    pub fn leading_numbers(&self) -> Vec<f32> {
        self.args
            .iter()
            .map_while(|arg| arg.as_number())
            .map(|n| n as f32)
            .collect()
    }

    /// Returns operand `index` as a name.
    pub fn name(&self, index: usize) -> PDFResult<&str> {
        self.args
            .get(index)
            .and_then(|arg| arg.as_name())
            .ok_or_else(|| {
                PDFError::content_stream_error(format!("{} operand {} must be a name", self.op, index))
            })
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (", self.op)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{:?}", arg)?;
        }
        write!(f, ")")
    }
}
