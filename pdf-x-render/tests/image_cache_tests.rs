//! Image reference cache: decode at most once per resource.


use pdf_x_render::core::document::MemoryDocument;
use pdf_x_render::core::error::PDFResult;
use pdf_x_render::core::object::{PDFObject, Ref};
use pdf_x_render::rendering::color_space::ColorSpace;
use pdf_x_render::rendering::context::RenderContext;
use pdf_x_render::rendering::device::ImageData;
use pdf_x_render::rendering::graphics_state::Color;
use pdf_x_render::rendering::image::{ImageDecoder, ImageReference, ImageStream, StreamImageDecoder};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;
use test_utils::*;

/// Counts decodes and holds each one open long enough for callers to pile up.
#[derive(Default)]
struct SlowDecoder {
    calls: AtomicUsize,
}

impl ImageDecoder for SlowDecoder {
    fn decode(&self, stream: &ImageStream, fill_color: Color) -> PDFResult<ImageData> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        StreamImageDecoder.decode(stream, fill_color)
    }
}

fn gray_stream(reference: Option<Ref>) -> ImageStream {
    let doc = MemoryDocument::new();
    ImageStream::new(
        reference,
        dict(vec![
            ("Width", PDFObject::Number(2.0)),
            ("Height", PDFObject::Number(2.0)),
            ("BitsPerComponent", PDFObject::Number(8.0)),
        ]),
        vec![0, 64, 128, 255],
        ColorSpace::device_gray(),
        &doc,
    )
    .unwrap()
}

#[test]
fn test_concurrent_acquires_decode_once() {
    init_logging();
    let decoder = Arc::new(SlowDecoder::default());
    let ctx = RenderContext::builder()
        .image_proxy_threads(2)
        .image_decoder(decoder.clone())
        .build();
    let reference = Ref::new(30, 0);

    let images: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ctx = &ctx;
                scope.spawn(move || {
                    let image = ImageReference::new(gray_stream(Some(reference)), Color::black(), ctx);
                    image.get_image()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(decoder.calls.load(Ordering::SeqCst), 1);
    let first = images[0].clone().unwrap();
    for image in &images {
        assert!(Arc::ptr_eq(&first, image.as_ref().unwrap()));
    }
    assert_eq!(first.pixel(1, 1), Some([255, 255, 255, 255]));
}

#[test]
fn test_later_acquires_hit_the_pool() {
    let decoder = Arc::new(SlowDecoder::default());
    let ctx = RenderContext::builder()
        .image_proxy(false)
        .image_decoder(decoder.clone())
        .build();
    let reference = Ref::new(31, 0);

    let first = ImageReference::new(gray_stream(Some(reference)), Color::black(), &ctx);
    assert!(!first.is_decoded());
    first.get_image().unwrap();

    let second = ImageReference::new(gray_stream(Some(reference)), Color::black(), &ctx);
    assert!(second.is_decoded());
    second.get_image().unwrap();
    assert_eq!(decoder.calls.load(Ordering::SeqCst), 1);
    assert!(ctx.image_pool().hits() >= 1);
}

#[test]
fn test_eviction_forces_redecode() {
    let decoder = Arc::new(SlowDecoder::default());
    let ctx = RenderContext::builder()
        .image_proxy(false)
        .image_decoder(decoder.clone())
        .build();
    let reference = Ref::new(32, 0);

    ImageReference::new(gray_stream(Some(reference)), Color::black(), &ctx)
        .get_image()
        .unwrap();
    assert!(ctx.image_pool().evict(reference));

    ImageReference::new(gray_stream(Some(reference)), Color::black(), &ctx)
        .get_image()
        .unwrap();
    assert_eq!(decoder.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_inline_images_stay_out_of_the_pool() {
    let ctx = RenderContext::builder().image_proxy_threads(1).build();
    let image = ImageReference::new(gray_stream(None), Color::black(), &ctx);
    assert_eq!(image.get_image().map(|i| (i.width, i.height)), Some((2, 2)));
    assert!(ctx.image_pool().is_empty());
}
