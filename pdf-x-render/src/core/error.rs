//! Error types for the paint pipeline.
//!
//! Every component catches its own failures and substitutes a safe default
//! (no image, identity transform, black), so most of these errors only travel
//! as far as the component boundary where they are logged.

use thiserror::Error;

/// Universal error type for PDF paint operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PDFError {
    /// A dictionary entry or indirect object is missing or malformed.
    #[error("cannot resolve {what}: {reason}")]
    ResourceResolution { what: String, reason: String },

    /// Image or stream data could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// A matrix was not invertible.
    #[error("non-invertible transform {0:?}")]
    Transform([f64; 6]),

    /// A resource referenced itself while it was being built.
    #[error("recursive reference to {0}")]
    RecursionGuard(String),

    /// Operator with missing or mistyped operands.
    #[error("content stream error: {0}")]
    ContentStream(String),

    /// The raster surface refused an operation.
    #[error("rendering error: {0}")]
    Rendering(String),

    /// A configuration value could not be parsed.
    #[error("invalid value {value:?} for {key}")]
    Config { key: String, value: String },

    /// Generic error with message
    #[error("{0}")]
    Generic(String),
}

impl PDFError {
    pub fn content_stream_error(msg: impl Into<String>) -> Self {
        PDFError::ContentStream(msg.into())
    }

    pub fn unresolved(what: impl Into<String>, reason: impl Into<String>) -> Self {
        PDFError::ResourceResolution {
            what: what.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for PDF operations
pub type PDFResult<T> = Result<T, PDFError>;
