//! Stream filter decoding.
//!
//! Content and image streams reach the paint pipeline still encoded. General
//! purpose filters (Flate with predictors, ASCIIHex, ASCII85) are undone
//! here; image codecs such as DCTDecode stop the chain and are reported back
//! so the image decoder can hand the bytes to the codec.

use super::error::{PDFError, PDFResult};
use super::object::{Dict, PDFObject};
use flate2::read::{DeflateDecoder, ZlibDecoder};
use std::io::Read;

/// Encoding left on the bytes after the general purpose filters ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageEncoding {
    /// Raw samples
    Raw,
    /// JPEG baseline/progressive (DCTDecode)
    Dct,
}

/// Output of [`decode_stream`].
#[derive(Debug, Clone)]
pub struct DecodedStream {
    pub data: Vec<u8>,
    pub encoding: ImageEncoding,
}

/// Decodes a FlateDecode (zlib/deflate) compressed stream.
///
/// Falls back to raw deflate when the zlib header is missing, which some
/// producers emit.
pub fn decode_flate(compressed_data: &[u8]) -> PDFResult<Vec<u8>> {
    let mut decompressed = Vec::new();
    let zlib_err = match ZlibDecoder::new(compressed_data).read_to_end(&mut decompressed) {
        Ok(_) => return Ok(decompressed),
        Err(e) => e,
    };

    decompressed.clear();
    DeflateDecoder::new(compressed_data)
        .read_to_end(&mut decompressed)
        .map(|_| decompressed)
        .map_err(|deflate_err| {
            PDFError::Decode(format!(
                "FlateDecode: zlib failed ({}), raw deflate failed ({}), {} bytes",
                zlib_err,
                deflate_err,
                compressed_data.len()
            ))
        })
}

/// Reverses PNG row prediction (predictor values 10..=15).
///
/// # Arguments
/// * `colors` - Components per pixel
/// * `bits_per_component` - Bits per component
/// * `columns` - Pixels per row
pub fn decode_png_predictor(
    data: &[u8],
    colors: usize,
    bits_per_component: usize,
    columns: usize,
) -> PDFResult<Vec<u8>> {
    let pix_bytes = ((colors * bits_per_component + 7) / 8).max(1);
    let row_bytes = (columns * colors * bits_per_component + 7) / 8;
    let stride = 1 + row_bytes;

    let num_rows = data.len() / stride;
    let mut output = Vec::with_capacity(num_rows * row_bytes);
    let mut prev_row = vec![0u8; row_bytes];
    let mut row = vec![0u8; row_bytes];

    for chunk in data.chunks_exact(stride) {
        let (predictor, raw) = (chunk[0], &chunk[1..]);
        for i in 0..row_bytes {
            let left = if i >= pix_bytes { row[i - pix_bytes] } else { 0 };
            let up = prev_row[i];
            let up_left = if i >= pix_bytes { prev_row[i - pix_bytes] } else { 0 };
            let predicted = match predictor {
                0 => 0,
                1 => left,
                2 => up,
                3 => ((left as u16 + up as u16) / 2) as u8,
                4 => paeth(left, up, up_left),
                other => {
                    return Err(PDFError::Decode(format!(
                        "unsupported PNG predictor: {}",
                        other
                    )));
                }
            };
            row[i] = raw[i].wrapping_add(predicted);
        }
        output.extend_from_slice(&row);
        std::mem::swap(&mut prev_row, &mut row);
    }

    Ok(output)
}

fn paeth(left: u8, up: u8, up_left: u8) -> u8 {
    let p = left as i32 + up as i32 - up_left as i32;
    let pa = (p - left as i32).abs();
    let pb = (p - up as i32).abs();
    let pc = (p - up_left as i32).abs();
    if pa <= pb && pa <= pc {
        left
    } else if pb <= pc {
        up
    } else {
        up_left
    }
}

/// Decodes ASCIIHex data. Whitespace is skipped, `>` ends the data and an odd
/// trailing digit is padded with 0.
pub fn decode_ascii_hex(data: &[u8]) -> PDFResult<Vec<u8>> {
    let mut result = Vec::with_capacity(data.len() / 2);
    let mut high: Option<u8> = None;

    for &byte in data {
        if byte == b'>' {
            break;
        }
        let Some(nibble) = (byte as char).to_digit(16) else {
            continue;
        };
        match high.take() {
            Some(h) => result.push((h << 4) | nibble as u8),
            None => high = Some(nibble as u8),
        }
    }
    if let Some(h) = high {
        result.push(h << 4);
    }

    Ok(result)
}

/// Decodes ASCII85 (Base85) data.
pub fn decode_ascii85(data: &[u8]) -> PDFResult<Vec<u8>> {
    let mut result = Vec::new();
    let mut tuple = 0u32;
    let mut count = 0usize;

    for &byte in data {
        match byte {
            b'~' | b'>' => break,
            b'z' if count == 0 => result.extend_from_slice(&[0u8; 4]),
            b if b.is_ascii_whitespace() => {}
            b'!'..=b'u' => {
                tuple = tuple.wrapping_mul(85).wrapping_add((byte - b'!') as u32);
                count += 1;
                if count == 5 {
                    result.extend_from_slice(&tuple.to_be_bytes());
                    tuple = 0;
                    count = 0;
                }
            }
            other => {
                return Err(PDFError::Decode(format!(
                    "invalid ASCII85 character: {:?}",
                    other as char
                )));
            }
        }
    }

    if count > 0 {
        for _ in count..5 {
            tuple = tuple.wrapping_mul(85).wrapping_add(84);
        }
        result.extend_from_slice(&tuple.to_be_bytes()[..count - 1]);
    }

    Ok(result)
}

fn apply_predictor(data: Vec<u8>, parms: Option<&PDFObject>) -> PDFResult<Vec<u8>> {
    let Some(parms) = parms.and_then(|p| p.as_dictionary()) else {
        return Ok(data);
    };
    let int = |key: &str, default: i64| parms.get(key).and_then(|v| v.as_int()).unwrap_or(default);
    let predictor = int("Predictor", 1);
    if predictor < 10 {
        // TIFF predictor 2 is left as is
        return Ok(data);
    }
    decode_png_predictor(
        &data,
        int("Colors", 1).max(1) as usize,
        int("BitsPerComponent", 8).max(1) as usize,
        int("Columns", 1).max(1) as usize,
    )
}

/// Applies the `/Filter` chain of a stream dictionary in array order.
///
/// Decoding stops at the first image codec; the returned encoding tells the
/// caller which codec the remaining bytes need.
pub fn decode_stream(dict: &Dict, data: &[u8]) -> PDFResult<DecodedStream> {
    let filters: Vec<&str> = match dict.get("Filter").or_else(|| dict.get("F")) {
        Some(PDFObject::Name(name)) => vec![name.as_str()],
        Some(PDFObject::Array(arr)) => arr.iter().filter_map(|f| f.as_name()).collect(),
        _ => Vec::new(),
    };
    let parms: Vec<Option<&PDFObject>> = match dict.get("DecodeParms").or_else(|| dict.get("DP")) {
        Some(PDFObject::Array(arr)) => arr.iter().map(|p| Some(&**p)).collect(),
        Some(other) => vec![Some(other)],
        None => Vec::new(),
    };

    let mut current = data.to_vec();
    for (i, filter) in filters.iter().enumerate() {
        let parm = parms.get(i).copied().flatten();
        current = match *filter {
            "FlateDecode" | "Fl" => apply_predictor(decode_flate(&current)?, parm)?,
            "ASCIIHexDecode" | "AHx" => decode_ascii_hex(&current)?,
            "ASCII85Decode" | "A85" => decode_ascii85(&current)?,
            "DCTDecode" | "DCT" => {
                return Ok(DecodedStream {
                    data: current,
                    encoding: ImageEncoding::Dct,
                });
            }
            other => {
                return Err(PDFError::Decode(format!("unsupported filter: {}", other)));
            }
        };
    }

    Ok(DecodedStream {
        data: current,
        encoding: ImageEncoding::Raw,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::ZlibEncoder;
    use std::io::Write;

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_decode_flate_simple() {
        let original = b"0 0 m 10 10 l S";
        assert_eq!(decode_flate(&zlib(original)).unwrap(), original);
    }

    #[test]
    fn test_decode_flate_garbage_is_error() {
        assert!(matches!(decode_flate(&[0xff, 0xfe, 0xfd]), Err(PDFError::Decode(_))));
    }

    #[test]
    fn test_png_up_predictor() {
        // two rows of 3 gray pixels, second row predicted from the first
        let encoded = [2, 10, 20, 30, 2, 1, 1, 1];
        assert_eq!(
            decode_png_predictor(&encoded, 1, 8, 3).unwrap(),
            vec![10, 20, 30, 11, 21, 31]
        );
    }

    #[test]
    fn test_decode_ascii_hex_odd_length() {
        assert_eq!(decode_ascii_hex(b"48 65 6c6c 6f7>").unwrap(), b"Hello\x70");
    }

    #[test]
    fn test_decode_ascii85_zero_shortcut() {
        assert_eq!(decode_ascii85(b"z~>").unwrap(), vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_filter_chain_stops_at_dct() {
        let dict: Dict = [
            ("Filter".to_string(), PDFObject::array([PDFObject::name("ASCIIHexDecode"), PDFObject::name("DCTDecode")])),
        ]
        .into_iter()
        .collect();
        let decoded = decode_stream(&dict, b"FFD8>").unwrap();
        assert_eq!(decoded.encoding, ImageEncoding::Dct);
        assert_eq!(decoded.data, vec![0xff, 0xd8]);
    }

    #[test]
    fn test_unfiltered_stream_passes_through() {
        let decoded = decode_stream(&Dict::new(), b"raw").unwrap();
        assert_eq!(decoded.encoding, ImageEncoding::Raw);
        assert_eq!(decoded.data, b"raw");
    }
}
