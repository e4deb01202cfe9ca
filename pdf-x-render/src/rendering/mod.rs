//! PDF paint pipeline.
//!
//! Content streams are interpreted into display lists ([`Shapes`]) by the
//! [`ContentInterpreter`], which drives:
//! - the graphics state stack and transform discipline
//! - color space resolution, including Separation and DeviceN
//! - tiling patterns, rendered into cached tiles
//! - image references decoded at most once through a shared pool
//!
//! Display lists are replayed against a [`Device`]; [`SkiaDevice`] rasterizes
//! with tiny-skia and [`RecordingDevice`] captures device-space operations.

pub mod annotation;
pub mod color_space;
pub mod context;
pub mod device;
pub mod form;
pub mod graphics_state;
pub mod image;
pub mod interpreter;
pub mod page;
pub mod path;
pub mod resources;
pub mod shapes;
pub mod skia_device;
pub mod tiling_pattern;
pub mod transform;

// Re-export key types
pub use annotation::{AnnotationPaint, annotation_transform, paint_annotation};
pub use color_space::ColorSpace;
pub use context::{AbortSignal, PaintEvent, RenderContext, RenderContextBuilder, RenderHints};
pub use device::{Device, DeviceOp, ImageData, Paint, RecordingDevice};
pub use form::Form;
pub use graphics_state::{
    ClipRegion, Color, FillRule, GraphicsState, GraphicsStateStack, LineCap, LineJoin, ShapePaint, StrokeProps,
    TextRenderingMode,
};
pub use image::{ImageDecoder, ImagePool, ImageReference, ImageStream, StreamImageDecoder};
pub use interpreter::ContentInterpreter;
pub use page::{Page, PagePaint};
pub use path::{Path, PathElement};
pub use resources::Resources;
pub use shapes::{DrawCmd, Shapes};
pub use skia_device::SkiaDevice;
pub use tiling_pattern::{PaintType, TilePaint, TilingPattern, TilingType};
pub use transform::{IDENTITY, Matrix};
