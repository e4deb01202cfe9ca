//! # PDF-X Render: the paint pipeline of a PDF viewer
//!
//! `pdf-x-render` turns PDF content streams into pixels. It does not parse
//! files: a document collaborator implementing [`ObjectResolver`] supplies
//! indirect objects and the operator sequence of each content stream.
//!
//! ## Quick Start
//!
//! ```rust
//! use pdf_x_render::{
//!     AbortSignal, MemoryDocument, OpCode, Operation, PDFObject, Page, PagePaint, RenderContext,
//! };
//!
//! let mut doc = MemoryDocument::new();
//! let contents = doc.content_stream(
//!     Vec::<(&str, PDFObject)>::new(),
//!     vec![
//!         Operation::with_numbers(OpCode::SetFillRGBColor, &[0.0, 0.0, 1.0]),
//!         Operation::with_numbers(OpCode::Rectangle, &[72.0, 72.0, 144.0, 144.0]),
//!         Operation::new(OpCode::Fill, vec![]),
//!     ],
//! );
//! let page = PDFObject::dict([
//!     ("MediaBox", PDFObject::numbers(&[0.0, 0.0, 612.0, 792.0])),
//!     ("Contents", contents),
//! ]);
//!
//! let ctx = RenderContext::default();
//! let page = Page::from_dict(None, page.as_dictionary().unwrap(), &doc);
//! let pixmap = page.render(&doc, &ctx, &PagePaint::default(), &AbortSignal::new())?;
//! assert_eq!((pixmap.width(), pixmap.height()), (612, 792));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! 1. **Document model** (`core`): objects, operators, functions, the
//!    annotation model and configuration
//! 2. **Interpretation** (`rendering::interpreter`): operators executed
//!    against a graphics state stack, recorded as a display list
//! 3. **Playback** (`rendering::shapes`): the display list replayed against a
//!    [`Device`] at any zoom and rotation
//! 4. **Annotations** (`rendering::annotation`): appearance streams and
//!    borders painted per the annotation flags
//!
//! Images decode on a worker pool, at most once per resource, and tiling
//! pattern tiles are built once per pattern; both caches live in the
//! [`RenderContext`].

pub mod core;
pub mod rendering;

// Re-export main types for convenience
pub use crate::core::{
    Annotation, AnnotationFlags, AnnotationType, AnnotationVisibility, AppearanceMode, Dict, Function,
    MemoryDocument, ObjectResolver, OpCode, Operation, PDFError, PDFObject, PDFResult, Ref, RenderConfig,
};

// Re-export rendering types
pub use rendering::{
    AbortSignal, AnnotationPaint, Color, ColorSpace, ContentInterpreter, Device, ImagePool, ImageReference,
    Page, PagePaint, PaintEvent, RecordingDevice, RenderContext, Shapes, SkiaDevice, TilingPattern,
};
