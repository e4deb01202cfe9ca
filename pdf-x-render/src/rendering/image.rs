//! Image references and the shared decoded-image pool.
//!
//! Every image XObject drawn on a page becomes an [`ImageReference`]. The
//! first reference to a given object schedules its decode on the render
//! context's worker pool; every later reference to the same object shares the
//! same [`DecodeSlot`] through the [`ImagePool`], so an image is decoded at
//! most once no matter how many pages or threads ask for it.
//!
//! Decoding supports:
//! - raw and FlateDecode samples at 1, 2, 4, 8 and 16 bits per component
//! - DCTDecode through zune-jpeg (feature `jpeg-decoding`)
//! - `/ImageMask` stencils painted in the fill color
//! - `/SMask` soft masks applied as the alpha channel

use super::color_space::ColorSpace;
use super::context::RenderContext;
use super::device::ImageData;
use super::graphics_state::Color;
use crate::core::document::ObjectResolver;
use crate::core::error::{PDFError, PDFResult};
use crate::core::filter::{ImageEncoding, decode_stream};
use crate::core::object::{Dict, PDFObject, Ref};
use lru::LruCache;
use once_cell::sync::OnceCell;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Result of one decode: `None` when decoding failed for good.
pub type DecodeSlot = Arc<OnceCell<Option<Arc<ImageData>>>>;

/// An image XObject or inline image with its dictionary read.
#[derive(Debug, Clone)]
pub struct ImageStream {
    reference: Option<Ref>,
    dict: Dict,
    data: Vec<u8>,
    width: u32,
    height: u32,
    bits_per_component: u8,
    color_space: Arc<ColorSpace>,
    image_mask: bool,
    decode: Option<Vec<f64>>,
    soft_mask: Option<Box<ImageStream>>,
}

impl ImageStream {
    /// Reads the image dictionary. Inline image abbreviations (`/W`, `/BPC`,
    /// `/IM`, ...) are accepted.
    pub fn new(
        reference: Option<Ref>,
        dict: Dict,
        data: Vec<u8>,
        color_space: Arc<ColorSpace>,
        resolver: &dyn ObjectResolver,
    ) -> PDFResult<Self> {
        let get = |long: &str, short: &str| {
            resolver
                .fetch_key(&dict, long)
                .or_else(|| resolver.fetch_key(&dict, short))
                .map(|v| v.into_owned())
        };
        let dimension = |long: &str, short: &str| -> PDFResult<u32> {
            get(long, short)
                .and_then(|v| v.as_int())
                .filter(|v| *v > 0 && *v <= u32::MAX as i64)
                .map(|v| v as u32)
                .ok_or_else(|| PDFError::unresolved("image", format!("missing or invalid /{}", long)))
        };

        let width = dimension("Width", "W")?;
        let height = dimension("Height", "H")?;
        let image_mask = get("ImageMask", "IM")
            .and_then(|v| v.as_boolean())
            .unwrap_or(false);
        let bits_per_component = if image_mask {
            1
        } else {
            match get("BitsPerComponent", "BPC").and_then(|v| v.as_int()) {
                Some(bpc @ (1 | 2 | 4 | 8 | 16)) => bpc as u8,
                Some(other) => {
                    return Err(PDFError::Decode(format!("unsupported BitsPerComponent {}", other)));
                }
                None => 8,
            }
        };
        let decode = get("Decode", "D").and_then(|v| v.number_array());

        Ok(ImageStream {
            reference,
            dict,
            data,
            width,
            height,
            bits_per_component,
            color_space,
            image_mask,
            decode,
            soft_mask: None,
        })
    }

    pub fn with_soft_mask(mut self, mask: ImageStream) -> Self {
        self.soft_mask = Some(Box::new(mask));
        self
    }

    /// Owning object, `None` for inline images.
    pub fn reference(&self) -> Option<Ref> {
        self.reference
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_image_mask(&self) -> bool {
        self.image_mask
    }

    pub fn color_space(&self) -> &Arc<ColorSpace> {
        &self.color_space
    }
}

/// Turns an image stream into RGBA pixels.
pub trait ImageDecoder: Send + Sync {
    /// Decodes `stream`. Stencil masks paint `fill_color`.
    fn decode(&self, stream: &ImageStream, fill_color: Color) -> PDFResult<ImageData>;
}

/// Decoder for the filters and sample layouts found in page content.
#[derive(Debug, Default, Clone, Copy)]
pub struct StreamImageDecoder;

impl ImageDecoder for StreamImageDecoder {
    fn decode(&self, stream: &ImageStream, fill_color: Color) -> PDFResult<ImageData> {
        let mut rgba = decode_rgba(stream, fill_color)?;
        if let Some(mask) = &stream.soft_mask {
            let alpha = decode_rgba(mask, Color::black())?;
            apply_soft_mask(&mut rgba, stream.width, stream.height, &alpha, mask.width, mask.height);
        }
        Ok(ImageData::new(stream.width, stream.height, rgba))
    }
}

fn decode_rgba(stream: &ImageStream, fill_color: Color) -> PDFResult<Vec<u8>> {
    let decoded = decode_stream(&stream.dict, &stream.data)?;
    match decoded.encoding {
        ImageEncoding::Dct => decode_jpeg(&decoded.data, stream),
        ImageEncoding::Raw => Ok(decode_samples(stream, &decoded.data, fill_color)),
    }
}

/// Reads `bpc`-bit sample `index` of a packed row.
#[inline]
fn sample(row: &[u8], index: usize, bpc: u8) -> u32 {
    match bpc {
        8 => row.get(index).copied().unwrap_or(0) as u32,
        // high byte only
        16 => row.get(index * 2).copied().unwrap_or(0) as u32,
        _ => {
            let bit = index * bpc as usize;
            let byte = row.get(bit / 8).copied().unwrap_or(0);
            let shift = 8 - bpc as usize - (bit % 8);
            ((byte >> shift) & ((1u8 << bpc) - 1)) as u32
        }
    }
}

fn decode_samples(stream: &ImageStream, data: &[u8], fill_color: Color) -> Vec<u8> {
    let (width, height) = (stream.width as usize, stream.height as usize);
    let components = if stream.image_mask {
        1
    } else {
        stream.color_space.num_components().max(1)
    };
    let bpc = stream.bits_per_component;
    let stored_bpc = bpc.min(8);
    let max_sample = ((1u32 << stored_bpc) - 1) as f64;
    let row_bytes = (width * components * bpc as usize).div_ceil(8);
    if data.len() < row_bytes * height {
        log::debug!(
            "image data short by {} bytes, padding",
            row_bytes * height - data.len()
        );
    }

    let indexed = stream.color_space.is_indexed();
    let decode_range = |c: usize| -> (f64, f64) {
        match stream.decode.as_deref() {
            Some(d) if d.len() >= 2 * (c + 1) => (d[2 * c], d[2 * c + 1]),
            _ if indexed => (0.0, max_sample),
            _ => (0.0, 1.0),
        }
    };
    let ranges: Vec<(f64, f64)> = (0..components).map(decode_range).collect();
    let map = |c: usize, s: u32| -> f32 {
        let (lo, hi) = ranges[c];
        (lo + s as f64 * (hi - lo) / max_sample) as f32
    };

    // single-component images resolve each possible sample once
    let palette: Option<Vec<[u8; 4]>> = (components == 1 && !stream.image_mask).then(|| {
        (0..=max_sample as u32)
            .map(|s| {
                let (r, g, b, a) = stream.color_space.get_color(&[map(0, s)]).rgba();
                [r, g, b, a]
            })
            .collect()
    });
    let (fr, fg, fb, _) = fill_color.rgba();

    let mut rgba = Vec::with_capacity(width * height * 4);
    let mut values = vec![0f32; components];
    for y in 0..height {
        let row = data.get(y * row_bytes..).unwrap_or(&[]);
        for x in 0..width {
            if stream.image_mask {
                let painted = map(0, sample(row, x, bpc)) < 0.5;
                if painted {
                    rgba.extend_from_slice(&[fr, fg, fb, 255]);
                } else {
                    rgba.extend_from_slice(&[0, 0, 0, 0]);
                }
                continue;
            }
            if let Some(palette) = &palette {
                let s = sample(row, x, bpc) as usize;
                rgba.extend_from_slice(&palette[s.min(palette.len() - 1)]);
                continue;
            }
            for (c, value) in values.iter_mut().enumerate() {
                *value = map(c, sample(row, x * components + c, bpc));
            }
            let (r, g, b, a) = stream.color_space.get_color(&values).rgba();
            rgba.extend_from_slice(&[r, g, b, a]);
        }
    }
    rgba
}

/// Scales the soft mask's gray samples onto the image's alpha channel.
fn apply_soft_mask(rgba: &mut [u8], width: u32, height: u32, mask: &[u8], mask_width: u32, mask_height: u32) {
    for y in 0..height {
        let my = (y as u64 * mask_height as u64 / height as u64) as u32;
        for x in 0..width {
            let mx = (x as u64 * mask_width as u64 / width as u64) as u32;
            let m = ((my * mask_width + mx) * 4) as usize;
            let i = ((y * width + x) * 4) as usize;
            if let (Some(alpha), Some(px)) = (mask.get(m), rgba.get_mut(i + 3)) {
                *px = ((*px as u16 * *alpha as u16 + 127) / 255) as u8;
            }
        }
    }
}

#[cfg(feature = "jpeg-decoding")]
fn decode_jpeg(data: &[u8], stream: &ImageStream) -> PDFResult<Vec<u8>> {
    use std::io::Cursor;
    use zune_jpeg::zune_core::options::DecoderOptions;

    let options = DecoderOptions::default()
        .set_max_width(u16::MAX as usize)
        .set_max_height(u16::MAX as usize);
    let mut decoder = zune_jpeg::JpegDecoder::new_with_options(Cursor::new(data), options);
    decoder
        .decode_headers()
        .map_err(|e| PDFError::Decode(format!("JPEG header: {:?}", e)))?;
    let info = decoder
        .info()
        .ok_or_else(|| PDFError::Decode("JPEG without frame header".into()))?;
    let pixels = decoder
        .decode()
        .map_err(|e| PDFError::Decode(format!("JPEG: {:?}", e)))?;

    let count = info.width as usize * info.height as usize;
    if count == 0 {
        return Err(PDFError::Decode("empty JPEG".into()));
    }
    if (info.width as u32, info.height as u32) != (stream.width, stream.height) {
        log::debug!(
            "JPEG is {}x{} but the image dictionary says {}x{}",
            info.width,
            info.height,
            stream.width,
            stream.height
        );
    }
    let channels = pixels.len() / count;
    let mut rgba = Vec::with_capacity(stream.width as usize * stream.height as usize * 4);
    for y in 0..stream.height as usize {
        for x in 0..stream.width as usize {
            let sx = x.min(info.width as usize - 1);
            let sy = y.min(info.height as usize - 1);
            let i = (sy * info.width as usize + sx) * channels;
            let px = pixels.get(i..i + channels).unwrap_or(&[]);
            let color = match *px {
                [g] => Color::Gray(g as f64 / 255.0),
                [r, g, b] => Color::RGB(r as f64 / 255.0, g as f64 / 255.0, b as f64 / 255.0),
                [c, m, y, k] => Color::CMYK(
                    c as f64 / 255.0,
                    m as f64 / 255.0,
                    y as f64 / 255.0,
                    k as f64 / 255.0,
                ),
                _ => Color::black(),
            };
            let (r, g, b, a) = color.rgba();
            rgba.extend_from_slice(&[r, g, b, a]);
        }
    }
    Ok(rgba)
}

#[cfg(not(feature = "jpeg-decoding"))]
fn decode_jpeg(_data: &[u8], _stream: &ImageStream) -> PDFResult<Vec<u8>> {
    Err(PDFError::Decode(
        "JPEG decoding not enabled. Enable the 'jpeg-decoding' feature.".into(),
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PoolKey {
    reference: Ref,
    /// Stencil masks are decoded per fill color
    stencil: Option<(u8, u8, u8)>,
}

/// Decoded images shared by every render of a document.
///
/// Each image object owns one [`DecodeSlot`]. The pool holds at most
/// `capacity` slots; an evicted image is decoded again by the next
/// reference that asks for it.
#[derive(Debug)]
pub struct ImagePool {
    slots: Mutex<LruCache<PoolKey, DecodeSlot>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl ImagePool {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        ImagePool {
            slots: Mutex::new(LruCache::new(capacity)),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    /// Returns the decode slot for `reference`, inserting an empty one if
    /// absent. The lookup and the insert happen under one lock.
    pub fn slot(&self, reference: Ref) -> DecodeSlot {
        self.slot_for(PoolKey {
            reference,
            stencil: None,
        })
        .0
    }

    /// The slot for `key` and whether this call inserted it.
    fn slot_for(&self, key: PoolKey) -> (DecodeSlot, bool) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = slots.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return (slot.clone(), false);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let slot = DecodeSlot::default();
        slots.put(key, slot.clone());
        (slot, true)
    }

    /// The decoded image for `reference`, if its decode has finished.
    pub fn get(&self, reference: Ref) -> Option<Arc<ImageData>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let key = PoolKey {
            reference,
            stencil: None,
        };
        slots.get(&key).and_then(|slot| slot.get().cloned().flatten())
    }

    /// Drops the entry for `reference`. Returns whether one was present.
    pub fn evict(&self, reference: Ref) -> bool {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let before = slots.len();
        let keys: Vec<PoolKey> = slots
            .iter()
            .map(|(k, _)| *k)
            .filter(|k| k.reference == reference)
            .collect();
        for key in keys {
            slots.pop(&key);
        }
        slots.len() != before
    }

    pub fn clear(&self) {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }
}

/// One drawable image with a decode that runs at most once.
pub struct ImageReference {
    stream: Arc<ImageStream>,
    fill_color: Color,
    decoder: Arc<dyn ImageDecoder>,
    slot: DecodeSlot,
}

impl std::fmt::Debug for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageReference")
            .field("reference", &self.stream.reference)
            .field("width", &self.stream.width)
            .field("height", &self.stream.height)
            .field("decoded", &self.slot.get().is_some())
            .finish()
    }
}

impl ImageReference {
    /// Creates the reference and schedules its decode.
    ///
    /// With image proxying enabled the decode is queued on the context's
    /// worker pool by the reference that created the pool entry; later
    /// references share that decode. With proxying
    /// disabled, object images decode at the first [`get_image`] and inline
    /// images decode right away.
    ///
    /// [`get_image`]: ImageReference::get_image
    pub fn new(stream: ImageStream, fill_color: Color, ctx: &RenderContext) -> Arc<ImageReference> {
        let (slot, created) = match stream.reference {
            Some(reference) => {
                let stencil = stream.image_mask.then(|| {
                    let (r, g, b, _) = fill_color.rgba();
                    (r, g, b)
                });
                ctx.image_pool().slot_for(PoolKey { reference, stencil })
            }
            None => (DecodeSlot::default(), true),
        };
        let image = Arc::new(ImageReference {
            stream: Arc::new(stream),
            fill_color,
            decoder: ctx.image_decoder(),
            slot,
        });

        if created {
            match ctx.image_workers() {
                Some(workers) => {
                    let pending = image.clone();
                    workers.spawn(move || {
                        pending.decode();
                    });
                }
                None if image.stream.reference.is_none() => {
                    image.decode();
                }
                None => {}
            }
        }
        image
    }

    /// Returns the decoded image, waiting for a decode in progress.
    pub fn get_image(&self) -> Option<Arc<ImageData>> {
        self.decode()
    }

    fn decode(&self) -> Option<Arc<ImageData>> {
        self.slot
            .get_or_init(|| match self.decoder.decode(&self.stream, self.fill_color) {
                Ok(image) => Some(Arc::new(image)),
                Err(e) => {
                    log::warn!(
                        "image {} failed to decode: {}",
                        self.stream
                            .reference
                            .map_or_else(|| "(inline)".to_string(), |r| r.to_string()),
                        e
                    );
                    None
                }
            })
            .clone()
    }

    /// Whether the decode has completed, successfully or not.
    pub fn is_decoded(&self) -> bool {
        self.slot.get().is_some()
    }

    pub fn stream(&self) -> &ImageStream {
        &self.stream
    }

    pub fn width(&self) -> u32 {
        self.stream.width
    }

    pub fn height(&self) -> u32 {
        self.stream.height
    }
}

/// Builds an [`ImageStream`] from an image XObject, resolving `/SMask`.
pub fn image_stream_from_object(
    reference: Option<Ref>,
    obj: &PDFObject,
    color_space: Arc<ColorSpace>,
    resolver: &dyn ObjectResolver,
) -> PDFResult<ImageStream> {
    let (dict, data) = obj
        .as_stream()
        .ok_or_else(|| PDFError::unresolved("image", "not a stream"))?;
    let mut stream = ImageStream::new(reference, dict.clone(), data.to_vec(), color_space, resolver)?;
    if let Some(mask) = dict.get("SMask") {
        let mask_ref = mask.as_reference();
        let mask_obj = resolver.fetch(mask);
        if mask_obj.as_stream().is_some() {
            match image_stream_from_object(mask_ref, &mask_obj, ColorSpace::device_gray(), resolver) {
                Ok(soft_mask) => stream = stream.with_soft_mask(soft_mask),
                Err(e) => log::warn!("ignoring soft mask: {}", e),
            }
        }
    }
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::document::MemoryDocument;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;

    fn gray_image(reference: Option<Ref>, data: Vec<u8>) -> ImageStream {
        let doc = MemoryDocument::new();
        let dict = [
            ("Width".to_string(), PDFObject::Number(2.0)),
            ("Height".to_string(), PDFObject::Number(1.0)),
            ("BitsPerComponent".to_string(), PDFObject::Number(8.0)),
        ]
        .into_iter()
        .collect();
        ImageStream::new(reference, dict, data, ColorSpace::device_gray(), &doc).unwrap()
    }

    #[derive(Default)]
    struct CountingDecoder {
        calls: AtomicUsize,
    }

    impl ImageDecoder for CountingDecoder {
        fn decode(&self, stream: &ImageStream, fill_color: Color) -> PDFResult<ImageData> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            StreamImageDecoder.decode(stream, fill_color)
        }
    }

    #[test]
    fn test_decode_gray_samples() {
        let image = StreamImageDecoder
            .decode(&gray_image(None, vec![0, 255]), Color::black())
            .unwrap();
        assert_eq!(image.pixel(0, 0), Some([0, 0, 0, 255]));
        assert_eq!(image.pixel(1, 0), Some([255, 255, 255, 255]));
    }

    #[test]
    fn test_stencil_mask_paints_fill_color() {
        let doc = MemoryDocument::new();
        let dict = [
            ("W".to_string(), PDFObject::Number(3.0)),
            ("H".to_string(), PDFObject::Number(1.0)),
            ("IM".to_string(), PDFObject::Boolean(true)),
        ]
        .into_iter()
        .collect();
        // bits 010
        let stream = ImageStream::new(None, dict, vec![0b0100_0000], ColorSpace::device_gray(), &doc).unwrap();
        let image = StreamImageDecoder.decode(&stream, Color::red()).unwrap();
        assert_eq!(image.pixel(0, 0), Some([255, 0, 0, 255]));
        assert_eq!(image.pixel(1, 0), Some([0, 0, 0, 0]));
        assert!(image.has_alpha);
    }

    #[test]
    fn test_missing_width_is_an_error() {
        let doc = MemoryDocument::new();
        assert!(ImageStream::new(None, Dict::new(), vec![], ColorSpace::device_gray(), &doc).is_err());
    }

    #[test]
    fn test_pool_slot_is_shared() {
        let pool = ImagePool::new(4);
        let a = pool.slot(Ref::new(1, 0));
        let b = pool.slot(Ref::new(1, 0));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!((pool.hits(), pool.misses()), (1, 1));
    }

    #[test]
    fn test_pool_capacity_evicts_least_recent() {
        let pool = ImagePool::new(2);
        pool.slot(Ref::new(1, 0));
        pool.slot(Ref::new(2, 0));
        pool.slot(Ref::new(1, 0));
        pool.slot(Ref::new(3, 0));
        assert_eq!(pool.len(), 2);
        assert!(pool.evict(Ref::new(1, 0)));
        assert!(!pool.evict(Ref::new(2, 0)));
    }

    #[test]
    fn test_failed_decode_is_remembered() {
        let decoder = Arc::new(CountingDecoder::default());
        let ctx = RenderContext::builder()
            .image_proxy(false)
            .image_decoder(decoder.clone())
            .build();
        let mut broken = gray_image(Some(Ref::new(9, 0)), vec![0, 0]);
        broken.dict.insert("Filter".into(), PDFObject::name("FlateDecode"));

        let image = ImageReference::new(broken, Color::black(), &ctx);
        assert!(image.get_image().is_none());
        assert!(image.get_image().is_none());
        assert!(image.is_decoded());
        assert_eq!(decoder.calls.load(Ordering::SeqCst), 1);
    }

    /// Blocks every decode until the test sends on the gate.
    struct GatedDecoder {
        gate: Mutex<mpsc::Receiver<()>>,
    }

    impl ImageDecoder for GatedDecoder {
        fn decode(&self, stream: &ImageStream, fill_color: Color) -> PDFResult<ImageData> {
            let _ = self.gate.lock().unwrap().recv();
            StreamImageDecoder.decode(stream, fill_color)
        }
    }

    #[test]
    fn test_only_the_slot_creator_queues_a_decode() {
        let (open, gate) = mpsc::channel();
        let ctx = RenderContext::builder()
            .image_proxy_threads(1)
            .image_decoder(Arc::new(GatedDecoder { gate: Mutex::new(gate) }))
            .build();
        let reference = Ref::new(12, 0);

        let first = ImageReference::new(gray_image(Some(reference), vec![0, 255]), Color::black(), &ctx);
        let second = ImageReference::new(gray_image(Some(reference), vec![0, 255]), Color::black(), &ctx);
        // no queued task holds a clone of the second reference
        assert_eq!(Arc::strong_count(&second), 1);

        open.send(()).unwrap();
        assert!(Arc::ptr_eq(&first.get_image().unwrap(), &second.get_image().unwrap()));
    }

    #[test]
    fn test_inline_image_decodes_at_construction_without_proxy() {
        let ctx = RenderContext::builder().image_proxy(false).build();
        let image = ImageReference::new(gray_image(None, vec![0, 255]), Color::black(), &ctx);
        assert!(image.is_decoded());
        assert!(ctx.image_pool().is_empty());
    }
}
