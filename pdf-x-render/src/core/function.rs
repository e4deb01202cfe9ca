//! PDF functions (ISO 32000-1, 7.10).
//!
//! Functions are parsed once into immutable values and shared through `Arc`
//! by the color spaces that use them as tint transforms.

use super::document::ObjectResolver;
use super::error::{PDFError, PDFResult};
use super::filter::{ImageEncoding, decode_stream};
use super::object::{Dict, PDFObject};
use smallvec::SmallVec;

/// Nested stitching deeper than this is treated as malformed.
const MAX_FUNCTION_DEPTH: usize = 8;

/// Function outputs. Tint transforms rarely produce more than 4 values.
pub type FunctionOutput = SmallVec<[f32; 4]>;

/// A parsed PDF function.
#[derive(Debug, Clone, PartialEq)]
pub enum Function {
    /// Type 0
    Sampled(SampledFunction),
    /// Type 2
    Exponential(ExponentialFunction),
    /// Type 3
    Stitching(StitchingFunction),
    /// An array of 1-output functions whose results are concatenated.
    Composite(Vec<Function>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampledFunction {
    domain: Vec<(f64, f64)>,
    range: Vec<(f64, f64)>,
    size: Vec<usize>,
    encode: Vec<(f64, f64)>,
    decode: Vec<(f64, f64)>,
    /// Samples normalized to [0, 1], outputs interleaved.
    samples: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialFunction {
    domain: Vec<(f64, f64)>,
    range: Vec<(f64, f64)>,
    c0: Vec<f64>,
    c1: Vec<f64>,
    n: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StitchingFunction {
    domain: (f64, f64),
    functions: Vec<Function>,
    bounds: Vec<f64>,
    encode: Vec<(f64, f64)>,
}

fn pairs(values: &[f64]) -> Vec<(f64, f64)> {
    values.chunks_exact(2).map(|c| (c[0], c[1])).collect()
}

fn number_pairs(dict: &Dict, key: &str, resolver: &dyn ObjectResolver) -> Option<Vec<(f64, f64)>> {
    resolver
        .fetch_key(dict, key)
        .and_then(|v| v.number_array())
        .map(|v| pairs(&v))
}

fn numbers(dict: &Dict, key: &str, resolver: &dyn ObjectResolver) -> Option<Vec<f64>> {
    resolver.fetch_key(dict, key).and_then(|v| v.number_array())
}

#[inline]
fn interpolate(x: f64, x_min: f64, x_max: f64, y_min: f64, y_max: f64) -> f64 {
    if x_max == x_min {
        return y_min;
    }
    y_min + (x - x_min) * (y_max - y_min) / (x_max - x_min)
}

#[inline]
fn clip(x: f64, (lo, hi): (f64, f64)) -> f64 {
    if lo <= hi { x.clamp(lo, hi) } else { x }
}

impl Function {
    /// Parses a function dictionary, stream or array of functions.
    pub fn from_object(obj: &PDFObject, resolver: &dyn ObjectResolver) -> PDFResult<Function> {
        Self::parse(obj, resolver, 0)
    }

    fn parse(obj: &PDFObject, resolver: &dyn ObjectResolver, depth: usize) -> PDFResult<Function> {
        if depth > MAX_FUNCTION_DEPTH {
            return Err(PDFError::RecursionGuard("function".into()));
        }
        let obj = resolver.fetch(obj);
        if let Some(items) = obj.as_array() {
            let functions = items
                .iter()
                .map(|item| Self::parse(item, resolver, depth + 1))
                .collect::<PDFResult<Vec<_>>>()?;
            return Ok(Function::Composite(functions));
        }

        let dict = obj
            .as_dictionary()
            .ok_or_else(|| PDFError::unresolved("function", "not a dictionary or stream"))?;
        let function_type = resolver
            .fetch_key(dict, "FunctionType")
            .and_then(|v| v.as_int())
            .ok_or_else(|| PDFError::unresolved("function", "missing /FunctionType"))?;
        let domain = number_pairs(dict, "Domain", resolver)
            .filter(|d| !d.is_empty())
            .ok_or_else(|| PDFError::unresolved("function", "missing /Domain"))?;
        let range = number_pairs(dict, "Range", resolver).unwrap_or_default();

        match function_type {
            0 => {
                let (_, data) = obj
                    .as_stream()
                    .ok_or_else(|| PDFError::unresolved("sampled function", "not a stream"))?;
                Self::parse_sampled(dict, data, domain, range, resolver)
            }
            2 => Ok(Function::Exponential(ExponentialFunction {
                c0: numbers(dict, "C0", resolver).unwrap_or_else(|| vec![0.0]),
                c1: numbers(dict, "C1", resolver).unwrap_or_else(|| vec![1.0]),
                n: resolver
                    .fetch_key(dict, "N")
                    .and_then(|v| v.as_number())
                    .unwrap_or(1.0),
                domain,
                range,
            })),
            3 => {
                let functions = resolver
                    .fetch_key(dict, "Functions")
                    .and_then(|v| v.as_array().map(|a| a.to_vec()))
                    .ok_or_else(|| PDFError::unresolved("stitching function", "missing /Functions"))?
                    .iter()
                    .map(|f| Self::parse(f, resolver, depth + 1))
                    .collect::<PDFResult<Vec<_>>>()?;
                let bounds = numbers(dict, "Bounds", resolver).unwrap_or_default();
                let encode = number_pairs(dict, "Encode", resolver)
                    .unwrap_or_else(|| functions.iter().map(|_| (0.0, 1.0)).collect());
                if functions.is_empty() || bounds.len() + 1 != functions.len() {
                    return Err(PDFError::unresolved(
                        "stitching function",
                        "/Bounds does not match /Functions",
                    ));
                }
                Ok(Function::Stitching(StitchingFunction {
                    domain: domain[0],
                    functions,
                    bounds,
                    encode,
                }))
            }
            4 => Err(PDFError::unresolved(
                "PostScript calculator function",
                "unsupported function type 4",
            )),
            other => Err(PDFError::unresolved(
                "function",
                format!("unknown function type {}", other),
            )),
        }
    }

    fn parse_sampled(
        dict: &Dict,
        data: &[u8],
        domain: Vec<(f64, f64)>,
        range: Vec<(f64, f64)>,
        resolver: &dyn ObjectResolver,
    ) -> PDFResult<Function> {
        if range.is_empty() {
            return Err(PDFError::unresolved("sampled function", "missing /Range"));
        }
        let size: Vec<usize> = numbers(dict, "Size", resolver)
            .map(|v| v.iter().map(|s| s.max(1.0) as usize).collect())
            .filter(|v: &Vec<usize>| v.len() == domain.len())
            .ok_or_else(|| PDFError::unresolved("sampled function", "bad /Size"))?;
        let bits = resolver
            .fetch_key(dict, "BitsPerSample")
            .and_then(|v| v.as_int())
            .filter(|b| matches!(*b, 1 | 2 | 4 | 8 | 12 | 16 | 24 | 32))
            .ok_or_else(|| PDFError::unresolved("sampled function", "bad /BitsPerSample"))?
            as u32;
        let encode = number_pairs(dict, "Encode", resolver)
            .unwrap_or_else(|| size.iter().map(|s| (0.0, (*s - 1) as f64)).collect());
        let decode = number_pairs(dict, "Decode", resolver).unwrap_or_else(|| range.clone());

        let decoded = decode_stream(dict, data)?;
        if decoded.encoding != ImageEncoding::Raw {
            return Err(PDFError::Decode("sampled function uses an image codec".into()));
        }

        let count = size.iter().product::<usize>() * range.len();
        let max = ((1u64 << bits) - 1) as f64;
        let mut reader = BitReader::new(&decoded.data);
        let mut samples = Vec::with_capacity(count);
        for _ in 0..count {
            match reader.read_bits(bits) {
                Some(v) => samples.push(v as f64 / max),
                None => break,
            }
        }
        if samples.len() < count {
            log::warn!(
                "sampled function has {} of {} samples, padding with 0",
                samples.len(),
                count
            );
            samples.resize(count, 0.0);
        }

        Ok(Function::Sampled(SampledFunction {
            domain,
            range,
            size,
            encode,
            decode,
            samples,
        }))
    }

    /// Evaluates the function. Inputs are clipped to the domain and outputs
    /// to the range.
    pub fn evaluate(&self, input: &[f32]) -> FunctionOutput {
        let input: SmallVec<[f64; 4]> = input.iter().map(|v| *v as f64).collect();
        self.evaluate_f64(&input).into_iter().map(|v| v as f32).collect()
    }

    fn evaluate_f64(&self, input: &[f64]) -> SmallVec<[f64; 4]> {
        match self {
            Function::Sampled(f) => f.evaluate(input),
            Function::Exponential(f) => f.evaluate(input),
            Function::Stitching(f) => f.evaluate(input),
            Function::Composite(fs) => fs.iter().flat_map(|f| f.evaluate_f64(input)).collect(),
        }
    }
}

impl SampledFunction {
    fn evaluate(&self, input: &[f64]) -> SmallVec<[f64; 4]> {
        let m = self.domain.len();
        let n = self.range.len();

        // Sample coordinates per input dimension: lower index and fraction
        let mut index = SmallVec::<[(usize, f64); 4]>::new();
        for i in 0..m {
            let x = clip(input.get(i).copied().unwrap_or(self.domain[i].0), self.domain[i]);
            let (d0, d1) = self.domain[i];
            let (e0, e1) = self.encode.get(i).copied().unwrap_or((0.0, (self.size[i] - 1) as f64));
            let e = interpolate(x, d0, d1, e0, e1).clamp(0.0, (self.size[i] - 1) as f64);
            let lower = (e.floor() as usize).min(self.size[i].saturating_sub(2));
            index.push((lower, e - lower as f64));
        }

        let mut output = SmallVec::<[f64; 4]>::from_elem(0.0, n);
        // Multilinear interpolation over the 2^m surrounding samples
        for corner in 0..(1usize << m) {
            let mut weight = 1.0;
            let mut offset = 0;
            let mut stride = n;
            for (dim, (lower, frac)) in index.iter().enumerate() {
                let upper = corner & (1 << dim) != 0;
                if self.size[dim] == 1 && upper {
                    weight = 0.0;
                    break;
                }
                weight *= if upper { *frac } else { 1.0 - frac };
                offset += (lower + upper as usize) * stride;
                stride *= self.size[dim];
            }
            if weight == 0.0 {
                continue;
            }
            for (j, out) in output.iter_mut().enumerate() {
                *out += weight * self.samples.get(offset + j).copied().unwrap_or(0.0);
            }
        }

        for (j, out) in output.iter_mut().enumerate() {
            let (dec0, dec1) = self.decode.get(j).copied().unwrap_or(self.range[j]);
            *out = clip(dec0 + *out * (dec1 - dec0), self.range[j]);
        }
        output
    }
}

impl ExponentialFunction {
    fn evaluate(&self, input: &[f64]) -> SmallVec<[f64; 4]> {
        let x = clip(input.first().copied().unwrap_or(0.0), self.domain[0]);
        let xn = x.powf(self.n);
        let len = self.c0.len().max(self.c1.len());
        (0..len)
            .map(|i| {
                let c0 = self.c0.get(i).copied().unwrap_or(0.0);
                let c1 = self.c1.get(i).copied().unwrap_or(1.0);
                let y = c0 + xn * (c1 - c0);
                match self.range.get(i) {
                    Some(r) => clip(y, *r),
                    None => y,
                }
            })
            .collect()
    }
}

impl StitchingFunction {
    fn evaluate(&self, input: &[f64]) -> SmallVec<[f64; 4]> {
        let x = clip(input.first().copied().unwrap_or(0.0), self.domain);
        let k = self.bounds.iter().take_while(|b| x >= **b).count().min(self.functions.len() - 1);
        let lo = if k == 0 { self.domain.0 } else { self.bounds[k - 1] };
        let hi = self.bounds.get(k).copied().unwrap_or(self.domain.1);
        let (e0, e1) = self.encode.get(k).copied().unwrap_or((0.0, 1.0));
        self.functions[k].evaluate_f64(&[interpolate(x, lo, hi, e0, e1)])
    }
}

/// Reads big-endian samples of arbitrary width.
struct BitReader<'a> {
    data: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        BitReader { data, bit_pos: 0 }
    }

    fn read_bits(&mut self, n_bits: u32) -> Option<u32> {
        if self.bit_pos + n_bits as usize > self.data.len() * 8 {
            return None;
        }
        let mut result = 0u32;
        for _ in 0..n_bits {
            let byte = self.data[self.bit_pos / 8];
            let bit = (byte >> (7 - self.bit_pos % 8)) & 1;
            result = (result << 1) | bit as u32;
            self.bit_pos += 1;
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::document::MemoryDocument;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn test_exponential_interpolates_between_c0_and_c1() {
        let doc = MemoryDocument::new();
        let obj = PDFObject::dict([
            ("FunctionType", PDFObject::Number(2.0)),
            ("Domain", PDFObject::numbers(&[0.0, 1.0])),
            ("C0", PDFObject::numbers(&[0.0, 0.0, 0.0, 0.0])),
            ("C1", PDFObject::numbers(&[0.0, 1.0, 0.5, 0.0])),
            ("N", PDFObject::Number(1.0)),
        ]);
        let f = Function::from_object(&obj, &doc).unwrap();
        let out = f.evaluate(&[0.5]);
        assert_eq!(out.len(), 4);
        assert!(close(out[1], 0.5) && close(out[2], 0.25));

        // Inputs outside the domain are clipped
        let out = f.evaluate(&[3.0]);
        assert!(close(out[1], 1.0));
    }

    #[test]
    fn test_sampled_linear_interpolation() {
        let doc = MemoryDocument::new();
        let obj = PDFObject::stream(
            [
                ("FunctionType", PDFObject::Number(0.0)),
                ("Domain", PDFObject::numbers(&[0.0, 1.0])),
                ("Range", PDFObject::numbers(&[0.0, 1.0])),
                ("Size", PDFObject::numbers(&[2.0])),
                ("BitsPerSample", PDFObject::Number(8.0)),
            ],
            vec![0, 255],
        );
        let f = Function::from_object(&obj, &doc).unwrap();
        assert!(close(f.evaluate(&[0.25])[0], 0.25));
        assert!(close(f.evaluate(&[1.0])[0], 1.0));
    }

    #[test]
    fn test_stitching_selects_subfunction() {
        let doc = MemoryDocument::new();
        let half = |c0: f64, c1: f64| {
            PDFObject::dict([
                ("FunctionType", PDFObject::Number(2.0)),
                ("Domain", PDFObject::numbers(&[0.0, 1.0])),
                ("C0", PDFObject::numbers(&[c0])),
                ("C1", PDFObject::numbers(&[c1])),
                ("N", PDFObject::Number(1.0)),
            ])
        };
        let obj = PDFObject::dict([
            ("FunctionType", PDFObject::Number(3.0)),
            ("Domain", PDFObject::numbers(&[0.0, 1.0])),
            ("Functions", PDFObject::array([half(0.0, 1.0), half(1.0, 0.0)])),
            ("Bounds", PDFObject::numbers(&[0.5])),
            ("Encode", PDFObject::numbers(&[0.0, 1.0, 0.0, 1.0])),
        ]);
        let f = Function::from_object(&obj, &doc).unwrap();
        assert!(close(f.evaluate(&[0.25])[0], 0.5));
        assert!(close(f.evaluate(&[0.75])[0], 0.5));
        assert!(close(f.evaluate(&[0.5])[0], 1.0));
    }

    #[test]
    fn test_postscript_is_unsupported() {
        let doc = MemoryDocument::new();
        let obj = PDFObject::stream(
            [
                ("FunctionType", PDFObject::Number(4.0)),
                ("Domain", PDFObject::numbers(&[0.0, 1.0])),
            ],
            b"{ dup }".to_vec(),
        );
        assert!(Function::from_object(&obj, &doc).is_err());
    }
}
