pub mod annotation;
pub mod config;
pub mod content_stream;
pub mod document;
pub mod error;
pub mod filter;
pub mod function;
pub mod object;

pub use annotation::{
    Annotation, AnnotationFlags, AnnotationType, AnnotationVisibility, Appearance, AppearanceMode,
    BorderStyle, BorderStyleKind, LegacyBorder,
};
pub use config::{Interpolation, RenderConfig, TileAntialias};
pub use content_stream::{OpCode, Operation};
pub use document::{MemoryDocument, ObjectResolver};
pub use error::{PDFError, PDFResult};
pub use function::Function;
pub use object::{Dict, PDFObject, Ref};
