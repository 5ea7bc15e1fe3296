//! Stream filter pipeline.
//!
//! The context never hardcodes a filter implementation: it invokes a
//! `FilterService` once per filter name in a stream's `/Filter` pipeline,
//! in order, and treats an unsupported filter name as a soft failure (the
//! stream's decoded content is left empty rather than the whole load
//! failing). `DefaultFilterService` is the ambient implementation most
//! callers use, covering the filters that dominate real-world PDFs.

use crate::object::Dict;

/// Error returned by a `FilterService` implementation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FilterError {
    /// The named filter is not implemented by this service.
    #[error("unsupported filter: {0}")]
    Unsupported(String),
    /// The filter's own decoding failed (corrupt data, bad parameters).
    #[error("filter {filter} failed: {reason}")]
    DecodeFailed {
        /// Name of the filter that failed.
        filter: String,
        /// Reason for the failure.
        reason: String,
    },
}

/// A single stream filter implementation, injected by the caller.
///
/// The core calls `decode` once per `/Filter` entry, threading the output
/// of one filter into the input of the next. `params` is that filter's
/// corresponding `/DecodeParms` dictionary entry, if present.
pub trait FilterService {
    /// Decode `encoded` through the named filter.
    fn decode(&self, name: &str, encoded: &[u8], params: Option<&Dict>) -> Result<Vec<u8>, FilterError>;
}

/// Default `FilterService` covering the filters that dominate real-world
/// PDFs: Flate (via `flate2`), LZW (via `weezl`), and the text-safe
/// ASCIIHex/ASCII85 encodings (hand-rolled; no crate pulls its weight for
/// ~20 lines of decoding). Anything else — CCITTFax, DCT, JPX, RunLength,
/// Crypt — is a soft `Unsupported` failure; a collaborator that needs
/// image codecs supplies its own `FilterService`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultFilterService;

impl FilterService for DefaultFilterService {
    fn decode(&self, name: &str, encoded: &[u8], params: Option<&Dict>) -> Result<Vec<u8>, FilterError> {
        let decoded = match name {
            "FlateDecode" | "Fl" => decode_flate(encoded)?,
            "LZWDecode" | "LZW" => decode_lzw(encoded)?,
            "ASCIIHexDecode" | "AHx" => decode_ascii_hex(encoded)?,
            "ASCII85Decode" | "A85" => decode_ascii85(encoded)?,
            other => return Err(FilterError::Unsupported(other.to_string())),
        };

        match params.and_then(predictor_params) {
            Some(pred) => apply_predictor(&decoded, &pred).map_err(|reason| FilterError::DecodeFailed {
                filter: name.to_string(),
                reason,
            }),
            None => Ok(decoded),
        }
    }
}

fn decode_flate(input: &[u8]) -> Result<Vec<u8>, FilterError> {
    use flate2::read::ZlibDecoder;
    use std::io::Read;

    let mut decoder = ZlibDecoder::new(input);
    let mut output = Vec::new();
    match decoder.read_to_end(&mut output) {
        Ok(_) => Ok(output),
        Err(e) if !output.is_empty() => {
            log::warn!("FlateDecode partial recovery: {} bytes before error ({})", output.len(), e);
            Ok(output)
        },
        Err(e) => Err(FilterError::DecodeFailed { filter: "FlateDecode".to_string(), reason: e.to_string() }),
    }
}

fn decode_lzw(input: &[u8]) -> Result<Vec<u8>, FilterError> {
    use weezl::{BitOrder, decode::Decoder as WeezlDecoder};

    let mut decoder = WeezlDecoder::new(BitOrder::Msb, 8);
    decoder
        .decode(input)
        .map_err(|e| FilterError::DecodeFailed { filter: "LZWDecode".to_string(), reason: format!("{:?}", e) })
}

fn decode_ascii_hex(input: &[u8]) -> Result<Vec<u8>, FilterError> {
    fn hex_digit(b: u8) -> Option<u8> {
        match b {
            b'0'..=b'9' => Some(b - b'0'),
            b'A'..=b'F' => Some(b - b'A' + 10),
            b'a'..=b'f' => Some(b - b'a' + 10),
            _ => None,
        }
    }

    let mut output = Vec::new();
    let mut digits = input.iter().copied().filter(|&c| !c.is_ascii_whitespace() && c != b'>').peekable();

    while let Some(high) = digits.next() {
        let low = digits.next().unwrap_or(b'0');
        let hi = hex_digit(high)
            .ok_or_else(|| FilterError::DecodeFailed { filter: "ASCIIHexDecode".to_string(), reason: format!("invalid hex digit '{}'", high as char) })?;
        let lo = hex_digit(low)
            .ok_or_else(|| FilterError::DecodeFailed { filter: "ASCIIHexDecode".to_string(), reason: format!("invalid hex digit '{}'", low as char) })?;
        output.push((hi << 4) | lo);
    }

    Ok(output)
}

fn decode_ascii85(input: &[u8]) -> Result<Vec<u8>, FilterError> {
    let err = |reason: &str| FilterError::DecodeFailed { filter: "ASCII85Decode".to_string(), reason: reason.to_string() };

    let mut output = Vec::new();
    let mut acc: u32 = 0;
    let mut count = 0usize;

    for &byte in input {
        match byte {
            b'~' => break,
            b'z' => {
                if count != 0 {
                    return Err(err("'z' must not appear in the middle of a group"));
                }
                output.extend_from_slice(&[0, 0, 0, 0]);
            },
            b'!'..=b'u' => {
                acc = acc.checked_mul(85).and_then(|v| v.checked_add((byte - b'!') as u32)).ok_or_else(|| err("overflow"))?;
                count += 1;
                if count == 5 {
                    output.extend_from_slice(&acc.to_be_bytes());
                    acc = 0;
                    count = 0;
                }
            },
            _ if byte.is_ascii_whitespace() => {},
            _ => return Err(err(&format!("invalid character '{}'", byte as char))),
        }
    }

    if count > 0 {
        if count == 1 {
            return Err(err("incomplete group (need at least 2 characters)"));
        }
        for _ in count..5 {
            acc = acc.checked_mul(85).and_then(|v| v.checked_add(84)).ok_or_else(|| err("overflow in padding"))?;
        }
        let bytes = acc.to_be_bytes();
        output.extend_from_slice(&bytes[..count - 1]);
    }

    Ok(output)
}

/// Parameters of a PNG/TIFF predictor, extracted from `/DecodeParms`.
struct PredictorParams {
    predictor: i64,
    colors: i64,
    bits_per_component: i64,
    columns: i64,
}

fn predictor_params(params: &Dict) -> Option<PredictorParams> {
    let predictor = params.find("Predictor").and_then(|o| o.as_integer()).unwrap_or(1);
    if predictor <= 1 {
        return None;
    }
    Some(PredictorParams {
        predictor,
        colors: params.find("Colors").and_then(|o| o.as_integer()).unwrap_or(1),
        bits_per_component: params.find("BitsPerComponent").and_then(|o| o.as_integer()).unwrap_or(8),
        columns: params.find("Columns").and_then(|o| o.as_integer()).unwrap_or(1),
    })
}

/// Undo the PNG (predictor >= 10) or TIFF (predictor 2) predictor applied
/// before compression, per ISO 32000-1:2008, Section 7.4.4.4.
fn apply_predictor(data: &[u8], params: &PredictorParams) -> Result<Vec<u8>, String> {
    let bpp = ((params.colors * params.bits_per_component + 7) / 8).max(1) as usize;
    let row_bytes = ((params.colors * params.bits_per_component * params.columns + 7) / 8) as usize;

    if params.predictor == 2 {
        return Ok(apply_tiff_predictor(data, row_bytes, bpp));
    }

    if row_bytes == 0 {
        return Err("predictor row width is zero".to_string());
    }

    let stride = row_bytes + 1;
    let mut output = Vec::with_capacity(data.len());
    let mut prev_row = vec![0u8; row_bytes];

    for chunk in data.chunks(stride) {
        if chunk.len() < 2 {
            break;
        }
        let filter_type = chunk[0];
        let mut row = chunk[1..].to_vec();
        if row.len() < row_bytes {
            row.resize(row_bytes, 0);
        }

        for i in 0..row.len() {
            let a = if i >= bpp { row[i - bpp] } else { 0 };
            let b = prev_row[i];
            let c = if i >= bpp { prev_row[i - bpp] } else { 0 };
            row[i] = match filter_type {
                0 => row[i],
                1 => row[i].wrapping_add(a),
                2 => row[i].wrapping_add(b),
                3 => row[i].wrapping_add(((a as u16 + b as u16) / 2) as u8),
                4 => row[i].wrapping_add(paeth(a, b, c)),
                other => return Err(format!("unknown PNG predictor filter type {}", other)),
            };
        }

        output.extend_from_slice(&row);
        prev_row = row;
    }

    Ok(output)
}

fn apply_tiff_predictor(data: &[u8], row_bytes: usize, bpp: usize) -> Vec<u8> {
    if row_bytes == 0 {
        return data.to_vec();
    }
    let mut output = data.to_vec();
    for row in output.chunks_mut(row_bytes) {
        for i in bpp..row.len() {
            row[i] = row[i].wrapping_add(row[i - bpp]);
        }
    }
    output
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i32 + b as i32 - c as i32;
    let pa = (p - a as i32).abs();
    let pb = (p - b as i32).abs();
    let pc = (p - c as i32).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::ZlibEncoder;
    use std::io::Write;

    #[test]
    fn test_flate_round_trip() {
        let original = b"Hello, FilterService!";
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(original).unwrap();
        let compressed = encoder.finish().unwrap();

        let service = DefaultFilterService;
        let decoded = service.decode("FlateDecode", &compressed, None).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_lzw_round_trip() {
        use weezl::{BitOrder, encode::Encoder as LzwEncoder};

        let original = b"ABCABCABCABC";
        let mut encoder = LzwEncoder::new(BitOrder::Msb, 8);
        let compressed = encoder.encode(original).unwrap();

        let service = DefaultFilterService;
        let decoded = service.decode("LZWDecode", &compressed, None).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_ascii_hex_round_trip() {
        let service = DefaultFilterService;
        let decoded = service.decode("ASCIIHexDecode", b"48656C6C6F>", None).unwrap();
        assert_eq!(decoded, b"Hello");
    }

    #[test]
    fn test_ascii_hex_odd_length() {
        let service = DefaultFilterService;
        let decoded = service.decode("ASCIIHexDecode", b"486", None).unwrap();
        assert_eq!(decoded, b"H`");
    }

    #[test]
    fn test_ascii85_round_trip() {
        let service = DefaultFilterService;
        let decoded = service.decode("ASCII85Decode", b"<+U,m~>", None).unwrap();
        assert_eq!(decoded, b"Test");
    }

    #[test]
    fn test_ascii85_z_shortcut() {
        let service = DefaultFilterService;
        let decoded = service.decode("ASCII85Decode", b"zz", None).unwrap();
        assert_eq!(decoded, b"\0\0\0\0\0\0\0\0");
    }

    #[test]
    fn test_unsupported_filter_is_soft_error() {
        let service = DefaultFilterService;
        let err = service.decode("DCTDecode", b"\xff\xd8", None).unwrap_err();
        assert!(matches!(err, FilterError::Unsupported(name) if name == "DCTDecode"));
    }

    #[test]
    fn test_png_predictor_up() {
        // Two 1-byte-wide rows, predictor tag "Up" (2): row0 = [10], row1 delta = [5] -> 15
        let data = vec![2, 10, 2, 5];
        let params = PredictorParams { predictor: 12, colors: 1, bits_per_component: 8, columns: 1 };
        let out = apply_predictor(&data, &params).unwrap();
        assert_eq!(out, vec![10, 15]);
    }

    #[test]
    fn test_tiff_predictor() {
        let data = vec![10, 5, 3];
        let out = apply_tiff_predictor(&data, 3, 1);
        assert_eq!(out, vec![10, 15, 18]);
    }
}
