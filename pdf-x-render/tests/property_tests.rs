//! Property-based tests for the paint pipeline.
//!
//! These tests use proptest to generate random inputs and verify invariants.


use pdf_x_render::core::annotation::AnnotationFlags;
use pdf_x_render::core::content_stream::{OpCode, Operation};
use pdf_x_render::core::document::MemoryDocument;
use pdf_x_render::core::object::PDFObject;
use pdf_x_render::rendering::annotation::annotation_transform;
use pdf_x_render::rendering::color_space::ColorSpace;
use pdf_x_render::rendering::graphics_state::{Color, GraphicsState, GraphicsStateStack};
use pdf_x_render::rendering::interpreter::ContentInterpreter;
use pdf_x_render::rendering::resources::Resources;
use pdf_x_render::rendering::transform::{IDENTITY, Matrix, concat, invert, linear_part, page_transform};
use proptest::prelude::*;
use test_utils::*;

fn matrix_close(a: &Matrix, b: &Matrix, tolerance: f64) -> bool {
    a.iter().zip(b).all(|(x, y)| (x - y).abs() <= tolerance)
}

// ============================================================================
// Graphics State Stack
// ============================================================================

/// Property: restore never pops below the initial state
proptest! {
    #[test]
    fn prop_stack_never_underflows(saves in proptest::collection::vec(any::<bool>(), 0..64)) {
        let mut stack = GraphicsStateStack::new(GraphicsState::default());
        let mut depth = 0usize;
        for save in saves {
            if save {
                stack.save();
                depth += 1;
            } else {
                prop_assert_eq!(stack.restore(), depth > 0);
                depth = depth.saturating_sub(1);
            }
            prop_assert_eq!(stack.depth(), depth);
        }
    }
}

/// Property: unbalanced q/Q in content leaves the interpreter usable
proptest! {
    #[test]
    fn prop_unbalanced_content_keeps_initial_state(saves in proptest::collection::vec(any::<bool>(), 0..32)) {
        let doc = MemoryDocument::new();
        let ctx = sync_context();
        let mut interpreter = ContentInterpreter::new(&doc, &ctx, Resources::empty(), GraphicsState::default());
        let ops: Vec<Operation> = saves
            .iter()
            .flat_map(|&save| {
                if save {
                    vec![
                        Operation::new(OpCode::Save, vec![]),
                        Operation::with_numbers(OpCode::Transform, &[2.0, 0.0, 0.0, 2.0, 0.0, 0.0]),
                    ]
                } else {
                    vec![Operation::new(OpCode::Restore, vec![])]
                }
            })
            .collect();
        interpreter.run(&ops);

        let opened = saves.iter().fold(0usize, |depth, &save| {
            if save { depth + 1 } else { depth.saturating_sub(1) }
        });
        prop_assert_eq!(interpreter.stack().depth(), opened);
        let expected_scale = 2f64.powi(opened as i32);
        prop_assert_eq!(interpreter.state().ctm, [expected_scale, 0.0, 0.0, expected_scale, 0.0, 0.0]);
    }
}

// ============================================================================
// Color Spaces
// ============================================================================

/// Property: DeviceN colors stay inside the device range for any operands
proptest! {
    #[test]
    fn prop_device_n_components_in_range(
        a in -2.0f32..2.0f32,
        b in -2.0f32..2.0f32,
        c in -2.0f32..2.0f32,
    ) {
        let doc = MemoryDocument::new();
        let obj = PDFObject::array([
            PDFObject::name("DeviceN"),
            PDFObject::array([PDFObject::name("Magenta"), PDFObject::name("Spot"), PDFObject::name("Black")]),
            PDFObject::name("DeviceCMYK"),
        ]);
        let space = ColorSpace::from_object(&obj, &doc).unwrap();
        let in_range = |v: f64| (0.0..=1.0).contains(&v);
        match space.get_color(&[a, b, c]) {
            Color::CMYK(c, m, y, k) => {
                prop_assert!(in_range(c) && in_range(m) && in_range(y) && in_range(k));
            }
            other => prop_assert!(false, "expected CMYK, got {:?}", other),
        }
    }
}

// ============================================================================
// Transforms
// ============================================================================

/// Property: a matrix composed with its inverse is the identity
proptest! {
    #[test]
    fn prop_concat_invert_roundtrip(
        a in 0.5f64..4.0, b in -2.0f64..2.0, c in -2.0f64..2.0, d in 0.5f64..4.0,
        e in -500.0f64..500.0, f in -500.0f64..500.0,
    ) {
        let m = [a, b, c, d, e, f];
        prop_assume!((a * d - b * c).abs() > 0.1);
        let inverse = invert(&m).unwrap();
        prop_assert!(matrix_close(&concat(&m, &inverse), &IDENTITY, 1e-9));
        prop_assert!(matrix_close(&concat(&inverse, &m), &IDENTITY, 1e-9));
    }
}

/// Property: NoRotate annotations are upright at every quarter turn
proptest! {
    #[test]
    fn prop_no_rotate_upright(
        quarter in 0u8..4,
        zoom in 0.25f64..4.0,
        x in 0.0f64..500.0,
        y in 0.0f64..700.0,
        w in 1.0f64..100.0,
        h in 1.0f64..100.0,
    ) {
        let doc = MemoryDocument::new();
        let annot = annotation(&doc, vec![
            ("Subtype", PDFObject::name("Text")),
            ("Rect", PDFObject::numbers(&[x, y, x + w, y + h])),
            ("F", PDFObject::Number(AnnotationFlags::NO_ROTATE as f64)),
        ]);
        let media_box = [0.0, 0.0, 612.0, 792.0];
        let rotation = quarter as f64 * 90.0;
        let (base, _) = page_transform(&media_box, rotation, zoom);
        let (upright, _) = page_transform(&media_box, 0.0, zoom);

        let at = annotation_transform(&annot, &base, rotation);
        prop_assert!(matrix_close(&linear_part(&at), &linear_part(&upright), 1e-9));
    }
}
