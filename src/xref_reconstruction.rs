//! Whole-file bypass scan: the xref-table-of-last-resort.
//!
//! When neither a classic xref section nor an xref stream can be parsed (or
//! the chain that's found doesn't account for the document's actual objects),
//! this scans the entire file for `N G obj` markers and rebuilds a table from
//! what it finds. This never runs unless `crate::xref::load_chain` failed and
//! the caller's `ValidationMode` is `Relaxed` — it trades precision (an
//! object's *last* appearance in the byte stream wins, which usually but not
//! always matches what the real, undamaged xref would have said) for the
//! ability to open a file with no usable xref at all.

use crate::error::{Error, Result};
use crate::object::{Object, ObjectRef};
use crate::parser::parse_object;
use crate::reader::ObjectReader;
use crate::xref::{ReadFlags, TrailerInfo, XRefEntry, XRefLoadResult, XRefTable};
use lazy_static::lazy_static;
use std::io::{Read, Seek, SeekFrom};

lazy_static! {
    static ref RE_OBJ_PATTERN: regex::bytes::Regex =
        regex::bytes::Regex::new(r"(\d+)\s+(\d+)\s+obj").unwrap();
    static ref RE_TRAILER: regex::bytes::Regex = regex::bytes::Regex::new(r"trailer\s*<<").unwrap();
}

/// Scan the whole file for object markers and reconstruct a usable table.
///
/// Matches `N G obj` throughout the byte stream, keeping the *last* offset
/// seen for each object number (later occurrences in a linearly-written file
/// are from later, newer writes — the opposite tie-break from
/// `crate::xref::load_chain`, which walks newest-to-oldest and keeps the
/// first). A following trailer dictionary is parsed if present; otherwise one
/// is synthesized by reading candidate objects until `/Type /Catalog` turns up.
pub fn reconstruct<R: Read + Seek>(reader: &mut R) -> Result<XRefLoadResult> {
    log::info!("xref unusable; falling back to whole-file object scan");

    reader.seek(SeekFrom::Start(0))?;
    let mut contents = Vec::new();
    reader.read_to_end(&mut contents)?;

    let mut table = XRefTable::new();
    let mut objects_found = 0u32;

    for capture in RE_OBJ_PATTERN.captures_iter(&contents) {
        let full_match = capture.get(0).unwrap();
        let obj_num: u32 = match std::str::from_utf8(capture.get(1).unwrap().as_bytes())
            .ok()
            .and_then(|s| s.parse().ok())
        {
            Some(n) => n,
            None => continue,
        };
        let gen: u16 = match std::str::from_utf8(capture.get(2).unwrap().as_bytes())
            .ok()
            .and_then(|s| s.parse().ok())
        {
            Some(n) => n,
            None => continue,
        };

        let offset = full_match.start() as u64;
        if !looks_like_object_start(&contents, full_match.end()) {
            log::debug!("skipping false-positive object header at offset {offset}");
            continue;
        }

        table.insert(obj_num, XRefEntry::InUse { offset, generation: gen, object: None, ref_count: 0 });
        objects_found += 1;
    }

    if objects_found == 0 {
        return Err(Error::Corrupt("bypass scan found no object headers".to_string()));
    }
    log::info!("bypass scan recovered {objects_found} objects");

    let trailer = find_or_synthesize_trailer(&contents, reader, &table)?;
    let declared_size = trailer.size.unwrap_or(table.max_obj_num() + 1);
    let size = table.enforce_object_zero_invariant(declared_size);

    Ok(XRefLoadResult {
        table,
        trailer: TrailerInfo { size: Some(size), ..trailer },
        flags: ReadFlags::default(),
    })
}

/// Whether the bytes right after `N G obj` look like the start of a real
/// object value, ruling out coincidental digit-digit-`obj` matches inside
/// strings, comments, or corrupted binary data.
fn looks_like_object_start(contents: &[u8], after_keyword: usize) -> bool {
    let remaining = &contents[after_keyword.min(contents.len())..];
    let trimmed = remaining
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .map(|i| &remaining[i..])
        .unwrap_or(&[]);
    match trimmed.first() {
        Some(b) => {
            matches!(b, b'<' | b'[' | b'(' | b'/' | b't' | b'f' | b'n' | b'-') || b.is_ascii_digit()
        },
        None => false,
    }
}

fn find_or_synthesize_trailer<R: Read + Seek>(
    contents: &[u8],
    reader: &mut R,
    table: &XRefTable,
) -> Result<TrailerInfo> {
    if let Some(mat) = RE_TRAILER.find_iter(contents).last() {
        let after_keyword = mat.end() - 2; // back up to include "<<"
        if let Ok((_, obj)) = parse_object(&contents[after_keyword..]) {
            if let Some(dict) = obj.as_dict() {
                log::info!("bypass scan recovered a trailer dictionary directly");
                return Ok(trailer_info_from_dict(dict));
            }
        }
        log::warn!("found 'trailer' keyword but couldn't parse the dictionary after it");
    }

    log::info!("no trailer found; synthesizing one from the catalog object");
    synthesize_minimal_trailer(reader, table)
}

fn trailer_info_from_dict(dict: &crate::object::Dict) -> TrailerInfo {
    let size = dict.find("Size").and_then(Object::as_integer).map(|i| i as u32);
    let root = dict.find("Root").and_then(Object::as_indirect_ref);
    let info = dict.find("Info").and_then(Object::as_indirect_ref);
    let encrypt = dict.find("Encrypt").and_then(Object::as_indirect_ref);
    let id = dict.find("ID").and_then(Object::as_array).and_then(|arr| {
        let a = arr.first()?.as_string_bytes()?.to_vec();
        let b = arr.get(1)?.as_string_bytes()?.to_vec();
        Some((a, b))
    });
    TrailerInfo { size, root, info, id, encrypt }
}

/// Read every recovered object in turn looking for `/Type /Catalog`, and
/// build a trailer with just `/Root` and `/Size` from whichever one matches.
fn synthesize_minimal_trailer<R: Read + Seek>(reader: &mut R, table: &XRefTable) -> Result<TrailerInfo> {
    let mut object_reader = ObjectReader::new(&mut *reader);

    for (obj_num, entry) in table.iter() {
        let XRefEntry::InUse { offset, generation, .. } = entry else { continue };
        let obj_ref = ObjectRef::new(*obj_num, *generation);
        match object_reader.read_indirect_object(obj_ref, *offset) {
            Ok(obj) => {
                if is_catalog(&obj) {
                    log::info!("bypass scan found catalog at object {obj_ref}");
                    return Ok(TrailerInfo {
                        size: Some(table.max_obj_num() + 1),
                        root: Some(obj_ref),
                        info: None,
                        id: None,
                        encrypt: None,
                    });
                }
            },
            Err(e) => log::debug!("failed to read candidate object {obj_ref} during scan: {e}"),
        }
    }

    Err(Error::Corrupt("bypass scan could not locate a /Catalog object".to_string()))
}

fn is_catalog(obj: &Object) -> bool {
    obj.as_dict().and_then(|d| d.find("Type")).and_then(Object::as_name) == Some("Catalog")
}
