//! Object stream expansion (PDF 1.5+, `/Type /ObjStm`).
//!
//! An object stream packs several non-stream objects into one compressed
//! stream, trading the xref table's usual 20-bytes-per-object overhead for a
//! small shared prolog. Layout:
//!
//! ```text
//! N 0 obj
//! << /Type /ObjStm /N 5 /First 30 /Filter /FlateDecode >>
//! stream
//! 10 0 11 15 12 28 13 42 14 55    % N pairs: (obj_num, offset-from-/First)
//! <dict> <array> ...               % object bodies, back to back
//! endstream
//! endobj
//! ```
//!
//! This module only slices and parses the decoded bytes — decompression
//! (`/Filter`) is handled by the caller's [`crate::filters::FilterService`],
//! and decryption (object streams are encrypted like any other stream) by
//! `crate::context::Context` before the payload ever reaches here, since
//! encryption keys aren't something an object-stream decoder should need to
//! know about.

use crate::error::{Error, Result};
use crate::filters::FilterService;
use crate::object::{Dict, Object};
use crate::parser::parse_object;
use std::collections::HashMap;

/// Decode and expand an object stream's body into its member objects.
///
/// `stream_obj` must be `Object::Stream` with `/Type /ObjStm` (the type check
/// is advisory — some writers omit `/Type` and this proceeds anyway). `raw`
/// is the stream's payload with decryption already applied, if any; this
/// function applies the `/Filter` pipeline and parses the result.
pub fn expand(stream_obj: &Object, raw: &[u8], filters: &dyn FilterService) -> Result<HashMap<u32, Object>> {
    let (dict, stream_filters) = match stream_obj {
        Object::Stream { dict, filters: f, .. } => (dict, f),
        other => {
            return Err(Error::InvalidObjectType {
                expected: "Stream".to_string(),
                found: other.type_name().to_string(),
            });
        },
    };

    if let Some(type_name) = dict.find("Type").and_then(Object::as_name) {
        if type_name != "ObjStm" {
            log::warn!("expected /Type /ObjStm, found /{type_name}");
        }
    }

    let n = dict
        .find("N")
        .and_then(Object::as_integer)
        .ok_or_else(|| Error::Corrupt("object stream missing /N".to_string()))?;
    let first = dict
        .find("First")
        .and_then(Object::as_integer)
        .ok_or_else(|| Error::Corrupt("object stream missing /First".to_string()))?;

    if !(0..=1_000_000).contains(&n) {
        return Err(Error::Corrupt(format!("implausible object stream /N value: {n}")));
    }
    if !(0..=100_000_000).contains(&first) {
        return Err(Error::Corrupt(format!("implausible object stream /First value: {first}")));
    }
    let n = n as usize;
    let first = first as usize;

    let mut decoded = raw.to_vec();
    let decode_parms = dict.find("DecodeParms").and_then(Object::as_dict);
    for name in stream_filters {
        decoded = filters
            .decode(name, &decoded, decode_parms)
            .map_err(|e| Error::Decode(format!("object stream filter {name}: {e}")))?;
    }

    if decoded.len() < first {
        return Err(Error::Corrupt(format!(
            "object stream body ({} bytes) shorter than /First ({first})",
            decoded.len()
        )));
    }

    let pairs = parse_prolog_pairs(&decoded[..first], n)?;
    let body = &decoded[first..];

    let mut result = HashMap::with_capacity(n);
    for (obj_num, offset) in pairs {
        if offset >= body.len() {
            log::warn!("object {obj_num}'s offset {offset} is past the end of the stream body");
            continue;
        }
        match parse_object(&body[offset..]) {
            Ok((_, obj)) => {
                result.insert(obj_num, obj);
            },
            Err(e) => {
                log::warn!("failed to parse object {obj_num} from object stream: {e:?}");
            },
        }
    }

    Ok(result)
}

/// Parse the `N` pairs of `(object_number, offset)` that make up the prolog.
///
/// Per ISO 32000-1:2008 Table 16, the separator between numbers is any PDF
/// whitespace — including the NUL byte, which `is_ascii_whitespace` doesn't
/// treat as whitespace but the PDF spec does.
fn parse_prolog_pairs(data: &[u8], count: usize) -> Result<Vec<(u32, usize)>> {
    let mut pairs = Vec::with_capacity(count);
    let mut remaining = data;

    for i in 0..count {
        remaining = skip_pdf_whitespace(remaining);
        let (rest, obj_num) = read_uint(remaining)
            .ok_or_else(|| Error::Corrupt(format!("malformed object stream prolog pair {i}")))?;

        remaining = skip_pdf_whitespace(rest);
        let (rest, offset) = read_uint(remaining)
            .ok_or_else(|| Error::Corrupt(format!("malformed object stream prolog pair {i}")))?;

        pairs.push((obj_num as u32, offset as usize));
        remaining = rest;
    }

    Ok(pairs)
}

fn skip_pdf_whitespace(data: &[u8]) -> &[u8] {
    let end = data.iter().position(|&b| !matches!(b, 0 | 9 | 10 | 12 | 13 | 32)).unwrap_or(data.len());
    &data[end..]
}

fn read_uint(data: &[u8]) -> Option<(&[u8], u64)> {
    let end = data.iter().position(|b| !b.is_ascii_digit()).unwrap_or(data.len());
    if end == 0 {
        return None;
    }
    let value: u64 = std::str::from_utf8(&data[..end]).ok()?.parse().ok()?;
    Some((&data[end..], value))
}
