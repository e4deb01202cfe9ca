//! Form XObjects.
//!
//! A form is a self-contained content stream with its own bounding box,
//! matrix and (optionally) resources. Page content paints forms inline
//! through `Do`; annotation appearances are forms painted on their own.

use super::context::RenderContext;
use super::graphics_state::GraphicsState;
use super::interpreter::ContentInterpreter;
use super::resources::Resources;
use super::shapes::Shapes;
use super::transform::{IDENTITY, Matrix};
use crate::core::content_stream::Operation;
use crate::core::document::ObjectResolver;
use crate::core::error::{PDFError, PDFResult};
use crate::core::object::{Dict, PDFObject, Ref};
use once_cell::sync::OnceCell;
use std::sync::Arc;

#[derive(Debug)]
pub struct Form {
    reference: Option<Ref>,
    dict: Dict,
    data: Vec<u8>,
    bbox: [f64; 4],
    matrix: Matrix,
    resources: Option<Arc<Resources>>,
    shapes: OnceCell<Arc<Shapes>>,
}

impl Form {
    pub fn from_object(reference: Option<Ref>, obj: &PDFObject, resolver: &dyn ObjectResolver) -> PDFResult<Form> {
        let (dict, data) = obj
            .as_stream()
            .ok_or_else(|| PDFError::unresolved("form", "not a stream"))?;
        let bbox = resolver
            .fetch_key(dict, "BBox")
            .and_then(|b| b.as_rect())
            .ok_or_else(|| PDFError::unresolved("form", "missing /BBox"))?;
        let matrix = resolver
            .fetch_key(dict, "Matrix")
            .and_then(|m| m.as_matrix())
            .unwrap_or(IDENTITY);
        Ok(Form {
            reference,
            bbox,
            matrix,
            resources: Resources::from_owner(dict, resolver),
            dict: dict.clone(),
            data: data.to_vec(),
            shapes: OnceCell::new(),
        })
    }

    pub fn reference(&self) -> Option<Ref> {
        self.reference
    }

    /// `[llx, lly, urx, ury]` in form space.
    pub fn bbox(&self) -> [f64; 4] {
        self.bbox
    }

    pub fn matrix(&self) -> Matrix {
        self.matrix
    }

    /// The form's resources, or `inherited` for forms without any.
    pub fn resources_or(&self, inherited: &Arc<Resources>) -> Arc<Resources> {
        self.resources.clone().unwrap_or_else(|| inherited.clone())
    }

    pub fn operations(&self, resolver: &dyn ObjectResolver) -> PDFResult<Vec<Operation>> {
        resolver.content_operations(&self.dict, &self.data)
    }

    /// Display list of the form painted on its own, built on first use.
    ///
    /// The list starts from a default graphics state, applies `/Matrix` and
    /// clips to `/BBox`.
    pub fn shapes(&self, resolver: &dyn ObjectResolver, ctx: &RenderContext) -> PDFResult<Arc<Shapes>> {
        self.shapes
            .get_or_try_init(|| {
                let resources = self.resources_or(&Resources::empty());
                let mut interpreter =
                    ContentInterpreter::new(resolver, ctx, resources, GraphicsState::default());
                interpreter.paint_form(self)?;
                Ok(Arc::new(interpreter.finish()))
            })
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::content_stream::OpCode;
    use crate::core::document::MemoryDocument;
    use crate::rendering::shapes::DrawCmd;

    #[test]
    fn test_form_requires_bbox() {
        let doc = MemoryDocument::new();
        let obj = PDFObject::stream([("Subtype", PDFObject::name("Form"))], vec![]);
        assert!(Form::from_object(None, &obj, &doc).is_err());
    }

    #[test]
    fn test_form_shapes_are_built_once() {
        let mut doc = MemoryDocument::new();
        let obj = doc.content_stream(
            [
                ("BBox", PDFObject::numbers(&[0.0, 0.0, 10.0, 10.0])),
                ("Matrix", PDFObject::numbers(&[2.0, 0.0, 0.0, 2.0, 0.0, 0.0])),
            ],
            vec![
                Operation::with_numbers(OpCode::Rectangle, &[0.0, 0.0, 5.0, 5.0]),
                Operation::new(OpCode::Fill, vec![]),
            ],
        );
        let ctx = RenderContext::builder().image_proxy(false).build();
        let form = Form::from_object(None, &obj, &doc).unwrap();
        assert_eq!(form.matrix(), [2.0, 0.0, 0.0, 2.0, 0.0, 0.0]);

        let shapes = form.shapes(&doc, &ctx).unwrap();
        assert!(Arc::ptr_eq(&shapes, &form.shapes(&doc, &ctx).unwrap()));
        assert!(shapes.commands().iter().any(|c| matches!(c, DrawCmd::Fill(..))));
        assert!(shapes.commands().iter().any(|c| matches!(c, DrawCmd::Clip(Some(_)))));
    }
}
