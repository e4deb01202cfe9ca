//! Color space resolution through resources and content operators.


use pdf_x_render::core::content_stream::{OpCode, Operation};
use pdf_x_render::core::document::MemoryDocument;
use pdf_x_render::core::object::{PDFObject, Ref};
use pdf_x_render::rendering::color_space::ColorSpace;
use pdf_x_render::rendering::context::AbortSignal;
use pdf_x_render::rendering::graphics_state::{Color, GraphicsState};
use pdf_x_render::rendering::interpreter::ContentInterpreter;
use pdf_x_render::rendering::resources::Resources;
use std::sync::Arc;
use test_utils::*;

fn device_n(names: &[&str], alternate: &str) -> PDFObject {
    PDFObject::array([
        PDFObject::name("DeviceN"),
        PDFObject::array(names.iter().map(|n| PDFObject::name(n))),
        PDFObject::name(alternate),
    ])
}

#[test]
fn test_device_n_maps_process_colorants_by_name() {
    let doc = MemoryDocument::new();
    let space = ColorSpace::from_object(&device_n(&["Yellow", "Cyan"], "DeviceCMYK"), &doc).unwrap();
    assert_eq!(space.num_components(), 2);
    assert_eq!(space.get_color(&[0.25, 0.75]), Color::CMYK(0.75, 0.0, 0.25, 0.0));

    let space = ColorSpace::from_object(&device_n(&["Black", "Magenta", "Cyan"], "DeviceCMYK"), &doc).unwrap();
    assert_eq!(space.get_color(&[1.0, 0.5, 0.25]), Color::CMYK(0.25, 0.5, 0.0, 1.0));
}

#[test]
fn test_device_n_spot_colorants_pad_into_alternate() {
    let doc = MemoryDocument::new();
    let space = ColorSpace::from_object(&device_n(&["PANTONE 123", "Spot"], "DeviceRGB"), &doc).unwrap();
    assert_eq!(space.get_color(&[0.5, 1.0]), Color::RGB(0.5, 1.0, 0.0));
}

#[test]
fn test_separation_with_exponential_tint() {
    let doc = MemoryDocument::new();
    let tint = PDFObject::dict([
        ("FunctionType", PDFObject::Number(2.0)),
        ("Domain", PDFObject::numbers(&[0.0, 1.0])),
        ("C0", PDFObject::numbers(&[1.0, 1.0, 1.0])),
        ("C1", PDFObject::numbers(&[0.0, 0.0, 1.0])),
        ("N", PDFObject::Number(1.0)),
    ]);
    let separation = PDFObject::array([
        PDFObject::name("Separation"),
        PDFObject::name("Blueish"),
        PDFObject::name("DeviceRGB"),
        tint,
    ]);
    let space = ColorSpace::from_object(&separation, &doc).unwrap();
    assert_eq!(space.get_color(&[1.0]), Color::RGB(0.0, 0.0, 1.0));
    assert_eq!(space.get_color(&[0.0]), Color::RGB(1.0, 1.0, 1.0));
    // cs selects full tint
    assert_eq!(space.initial_color(), Color::RGB(0.0, 0.0, 1.0));
}

#[test]
fn test_indirect_color_space_through_scn() {
    init_logging();
    let mut doc = MemoryDocument::new();
    let cs_ref = doc.insert(Ref::new(12, 0), device_n(&["Cyan", "Magenta"], "DeviceCMYK"));
    let resources = dict(vec![(
        "ColorSpace",
        PDFObject::dict([("CS1", PDFObject::Ref(cs_ref))]),
    )]);
    let ctx = sync_context();
    let mut interpreter = ContentInterpreter::new(
        &doc,
        &ctx,
        Arc::new(Resources::new(resources)),
        GraphicsState::default(),
    )
    .with_abort(AbortSignal::new());
    interpreter.run(&[
        Operation::new(OpCode::SetFillColorSpace, vec![PDFObject::name("CS1")]),
        Operation::with_numbers(OpCode::SetFillColorN, &[0.5, 0.25]),
    ]);
    assert_eq!(interpreter.state().fill_color(), Color::CMYK(0.5, 0.25, 0.0, 0.0));
}

#[test]
fn test_unknown_color_space_falls_back_to_gray() {
    let doc = MemoryDocument::new();
    let ctx = sync_context();
    let mut interpreter =
        ContentInterpreter::new(&doc, &ctx, Resources::empty(), GraphicsState::default());
    interpreter.run(&[
        Operation::new(OpCode::SetStrokeColorSpace, vec![PDFObject::name("NoSuchSpace")]),
        Operation::with_numbers(OpCode::SetStrokeColor, &[0.5]),
    ]);
    assert_eq!(interpreter.state().stroke_color(), Color::Gray(0.5));
}

#[test]
fn test_indexed_clamps_out_of_range_index() {
    let doc = MemoryDocument::new();
    let indexed = PDFObject::array([
        PDFObject::name("Indexed"),
        PDFObject::name("DeviceRGB"),
        PDFObject::Number(1.0),
        PDFObject::String(vec![255, 0, 0, 0, 0, 255]),
    ]);
    let space = ColorSpace::from_object(&indexed, &doc).unwrap();
    assert_eq!(space.get_color(&[0.0]), Color::RGB(1.0, 0.0, 0.0));
    assert_eq!(space.get_color(&[7.0]), Color::RGB(0.0, 0.0, 1.0));
}
