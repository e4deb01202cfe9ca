//! Annotation placement, visibility and borders.


use pdf_x_render::core::annotation::{AnnotationFlags, AnnotationVisibility};
use pdf_x_render::core::document::MemoryDocument;
use pdf_x_render::core::object::{PDFObject, Ref};
use pdf_x_render::rendering::annotation::{AnnotationPaint, annotation_transform, paint_annotation};
use pdf_x_render::rendering::context::AbortSignal;
use pdf_x_render::rendering::device::{Device, DeviceOp, RecordingDevice};
use pdf_x_render::rendering::page::{Page, PagePaint};
use pdf_x_render::rendering::transform::{linear_part, page_transform, transform_point};
use test_utils::*;

const MEDIA_BOX: [f64; 4] = [0.0, 0.0, 200.0, 100.0];

fn flagged(doc: &MemoryDocument, flags: u32) -> pdf_x_render::core::annotation::Annotation {
    annotation(
        doc,
        vec![
            ("Subtype", PDFObject::name("Square")),
            ("Rect", PDFObject::numbers(&[20.0, 30.0, 60.0, 50.0])),
            ("C", PDFObject::numbers(&[0.0, 0.0, 1.0])),
            ("F", PDFObject::Number(flags as f64)),
        ],
    )
}

/// Paints on a recording surface carrying `base` and returns the recording.
fn record(
    doc: &MemoryDocument,
    annot: &pdf_x_render::core::annotation::Annotation,
    base: &[f64; 6],
    options: AnnotationPaint,
) -> (RecordingDevice, bool) {
    let ctx = sync_context();
    let mut device = RecordingDevice::new(400, 400);
    device.set_transform(base);
    let painted = paint_annotation(&mut device, annot, doc, &ctx, &options, &AbortSignal::new()).unwrap();
    (device, painted)
}

fn stroke_bounds(device: &RecordingDevice) -> Vec<[f64; 4]> {
    device
        .operations()
        .iter()
        .filter(|op| matches!(op, DeviceOp::Stroke { .. }))
        .filter_map(|op| op.bounds())
        .collect()
}

#[test]
fn test_no_zoom_keeps_device_size() {
    init_logging();
    let doc = MemoryDocument::new();
    let annot = flagged(&doc, AnnotationFlags::NO_ZOOM);

    for zoom in [1.0, 2.0, 3.5] {
        let (base, _) = page_transform(&MEDIA_BOX, 0.0, zoom);
        let at = annotation_transform(&annot, &base, 0.0);
        assert_eq!(device_extent(&at, 40.0, 20.0), (40.0, 20.0), "zoom {}", zoom);
        // the top-left corner stays on the rect
        assert_point_eq(transform_point(&at, 0.0, 20.0), transform_point(&base, 20.0, 50.0));
    }
}

#[test]
fn test_no_zoom_under_rotated_page() {
    let doc = MemoryDocument::new();
    let annot = flagged(&doc, AnnotationFlags::NO_ZOOM);
    let (base, _) = page_transform(&MEDIA_BOX, 90.0, 2.0);
    let at = annotation_transform(&annot, &base, 90.0);
    assert_eq!(device_extent(&at, 40.0, 20.0), (40.0, 20.0));
}

#[test]
fn test_no_rotate_is_upright_at_every_quarter_turn() {
    let doc = MemoryDocument::new();
    let annot = flagged(&doc, AnnotationFlags::NO_ROTATE);
    let (upright, _) = page_transform(&MEDIA_BOX, 0.0, 1.5);

    for rotation in [0.0, 90.0, 180.0, 270.0] {
        let (base, _) = page_transform(&MEDIA_BOX, rotation, 1.5);
        let at = annotation_transform(&annot, &base, rotation);
        assert_eq!(linear_part(&at), linear_part(&upright), "rotation {}", rotation);
        assert_point_eq(transform_point(&at, 0.0, 20.0), transform_point(&base, 20.0, 50.0));
    }
}

#[test]
fn test_rotating_annotation_follows_page() {
    let doc = MemoryDocument::new();
    let annot = flagged(&doc, 0);
    let (base, _) = page_transform(&MEDIA_BOX, 90.0, 1.0);
    let at = annotation_transform(&annot, &base, 90.0);
    assert_point_eq(transform_point(&at, 40.0, 20.0), transform_point(&base, 60.0, 50.0));
}

#[test]
fn test_legacy_border_with_bare_dash_number_is_not_drawn() {
    let doc = MemoryDocument::new();
    let annot = annotation(
        &doc,
        vec![
            ("Subtype", PDFObject::name("Link")),
            ("Rect", PDFObject::numbers(&[0.0, 0.0, 20.0, 20.0])),
            ("C", PDFObject::numbers(&[0.0])),
            ("Border", PDFObject::numbers(&[0.0, 0.0, 1.0, 5.0])),
        ],
    );
    let (device, painted) = record(&doc, &annot, &[1.0, 0.0, 0.0, 1.0, 0.0, 0.0], AnnotationPaint::screen(0.0));
    assert!(painted);
    assert!(stroke_bounds(&device).is_empty());
}

#[test]
fn test_legacy_border_width() {
    let doc = MemoryDocument::new();
    let annot = annotation(
        &doc,
        vec![
            ("Subtype", PDFObject::name("Link")),
            ("Rect", PDFObject::numbers(&[10.0, 10.0, 30.0, 30.0])),
            ("C", PDFObject::numbers(&[0.0])),
            ("Border", PDFObject::numbers(&[0.0, 0.0, 2.0])),
        ],
    );
    let (device, _) = record(&doc, &annot, &[1.0, 0.0, 0.0, 1.0, 0.0, 0.0], AnnotationPaint::screen(0.0));
    match &device.operations()[..] {
        [op @ DeviceOp::Stroke { stroke, .. }] => {
            assert_eq!(stroke.line_width, 2.0);
            assert_eq!(op.bounds(), Some([11.0, 11.0, 29.0, 29.0]));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_default_border_is_one_unit() {
    let doc = MemoryDocument::new();
    let annot = flagged(&doc, 0);
    let (device, _) = record(&doc, &annot, &[1.0, 0.0, 0.0, 1.0, 0.0, 0.0], AnnotationPaint::screen(0.0));
    assert_eq!(stroke_bounds(&device), vec![[20.5, 30.5, 59.5, 49.5]]);
}

#[test]
fn test_hidden_never_paints() {
    let doc = MemoryDocument::new();
    let annot = flagged(&doc, AnnotationFlags::HIDDEN | AnnotationFlags::PRINT);
    for options in [
        AnnotationPaint::screen(0.0),
        AnnotationPaint::print(0.0),
        AnnotationPaint::screen(0.0).with_visibility(AnnotationVisibility::ScreenRollover),
    ] {
        let (device, painted) = record(&doc, &annot, &[1.0, 0.0, 0.0, 1.0, 0.0, 0.0], options);
        assert!(!painted);
        assert!(device.operations().is_empty());
    }
}

#[test]
fn test_print_only_annotation() {
    let doc = MemoryDocument::new();
    let identity = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];
    let annot = flagged(&doc, AnnotationFlags::PRINT | AnnotationFlags::NO_VIEW);

    assert!(!record(&doc, &annot, &identity, AnnotationPaint::screen(0.0)).1);
    assert!(record(&doc, &annot, &identity, AnnotationPaint::print(0.0)).1);

    let annot = flagged(&doc, AnnotationFlags::PRINT | AnnotationFlags::READ_ONLY);
    assert!(record(&doc, &annot, &identity, AnnotationPaint::screen(0.0)).1);
    let rollover = AnnotationPaint::screen(0.0).with_visibility(AnnotationVisibility::ScreenRollover);
    assert!(!record(&doc, &annot, &identity, rollover).1);
}

#[test]
fn test_unprinted_annotation_skipped_in_print() {
    let doc = MemoryDocument::new();
    let annot = flagged(&doc, 0);
    let (device, painted) = record(&doc, &annot, &[1.0, 0.0, 0.0, 1.0, 0.0, 0.0], AnnotationPaint::print(0.0));
    assert!(!painted);
    assert!(device.operations().is_empty());
}

#[test]
fn test_page_paints_its_annotations() {
    let mut doc = MemoryDocument::new();
    let annot = doc.insert(
        Ref::new(50, 0),
        PDFObject::dict([
            ("Type", PDFObject::name("Annot")),
            ("Subtype", PDFObject::name("Square")),
            ("Rect", PDFObject::numbers(&[20.0, 30.0, 60.0, 50.0])),
            ("C", PDFObject::numbers(&[1.0, 0.0, 0.0])),
        ]),
    );
    let page = dict(vec![
        ("Type", PDFObject::name("Page")),
        ("MediaBox", PDFObject::numbers(&MEDIA_BOX)),
        ("Annots", PDFObject::array([PDFObject::Ref(annot)])),
    ]);
    let page = Page::from_dict(None, &page, &doc);
    assert_eq!(page.annotations().len(), 1);

    let ctx = sync_context();
    let pixmap = page
        .render(&doc, &ctx, &PagePaint::default(), &AbortSignal::new())
        .unwrap();
    // left border at x = 20.5 in page space, rect top at y = 50 -> surface row 50
    let on_border = pixmap.pixel(20, 60).unwrap();
    assert!(on_border.red() > 200 && on_border.green() < 128, "{:?}", on_border);
    let inside = pixmap.pixel(40, 60).unwrap();
    assert_eq!((inside.red(), inside.green(), inside.blue()), (255, 255, 255));
}
