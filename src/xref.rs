//! Cross-reference table construction.
//!
//! Locates the final `startxref`, walks the `Prev`/`XRefStm` chain back through
//! every incremental update, and builds one `XRefTable` mapping every object
//! number encountered to where it lives: a byte offset (`InUse`), a slot inside
//! an object stream (`Compressed`), or nowhere (`Free`). Classic xref sections
//! and xref streams are both accepted, including hybrid files that mix the two.
//!
//! This module only locates objects — it never parses or decrypts them beyond
//! what's needed to read the xref stream's own binary record. Whole-file bypass
//! scanning when both xref forms fail lives in `crate::xref_reconstruction`.

use crate::error::{Error, Result};
use crate::filters::FilterService;
use crate::object::{Object, ObjectRef};
use crate::reader::ObjectReader;
use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};

/// One cross-reference table entry.
#[derive(Debug, Clone, PartialEq)]
pub enum XRefEntry {
    /// Unused object number; part of the free list.
    Free {
        /// Next object number in the free list (0 terminates it).
        next_free_obj: u32,
        /// Generation to use if this slot is reused.
        generation: u16,
    },
    /// Object materializable by reading at a byte offset.
    InUse {
        /// Byte offset of `N G obj` in the file.
        offset: u64,
        /// Generation number.
        generation: u16,
        /// Cached, fully-materialized object, populated on first dereference.
        object: Option<Object>,
        /// References to this object found during the post-load graph walk.
        ref_count: u32,
    },
    /// Object embedded in an object stream.
    Compressed {
        /// Object number of the host object stream.
        host_obj_stream: u32,
        /// Index of this object within the host stream's prolog.
        index_in_stream: u32,
        /// Cached, fully-materialized object, populated on first dereference.
        object: Option<Object>,
        /// References to this object found during the post-load graph walk.
        ref_count: u32,
    },
}

impl XRefEntry {
    /// The cached object, if this entry has been resolved.
    pub fn cached(&self) -> Option<&Object> {
        match self {
            XRefEntry::Free { .. } => None,
            XRefEntry::InUse { object, .. } | XRefEntry::Compressed { object, .. } => {
                object.as_ref()
            },
        }
    }

    /// Populate the cache after a successful dereference.
    pub fn set_cached(&mut self, value: Object) {
        match self {
            XRefEntry::Free { .. } => {},
            XRefEntry::InUse { object, .. } | XRefEntry::Compressed { object, .. } => {
                *object = Some(value);
            },
        }
    }

    /// Bump the reference count during the post-load graph walk.
    pub fn bump_ref_count(&mut self) {
        match self {
            XRefEntry::Free { .. } => {},
            XRefEntry::InUse { ref_count, .. } | XRefEntry::Compressed { ref_count, .. } => {
                *ref_count += 1;
            },
        }
    }

    /// Current reference count.
    pub fn ref_count(&self) -> u32 {
        match self {
            XRefEntry::Free { .. } => 0,
            XRefEntry::InUse { ref_count, .. } | XRefEntry::Compressed { ref_count, .. } => {
                *ref_count
            },
        }
    }
}

/// The complete cross-reference table for a document.
#[derive(Debug, Clone, Default)]
pub struct XRefTable {
    entries: HashMap<u32, XRefEntry>,
}

impl XRefTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an entry.
    pub fn get(&self, obj_num: u32) -> Option<&XRefEntry> {
        self.entries.get(&obj_num)
    }

    /// Look up an entry mutably (for cache population).
    pub fn get_mut(&mut self, obj_num: u32) -> Option<&mut XRefEntry> {
        self.entries.get_mut(&obj_num)
    }

    /// Insert an entry only if the object number isn't already present.
    ///
    /// This is the merge policy §4.4 Tie-break requires: once an xref entry
    /// exists for an object number, later (older, further down the `Prev`
    /// chain) occurrences are ignored.
    pub fn insert_if_absent(&mut self, obj_num: u32, entry: XRefEntry) {
        self.entries.entry(obj_num).or_insert(entry);
    }

    /// Unconditionally set an entry (used by the bypass scan and test fixtures).
    pub fn insert(&mut self, obj_num: u32, entry: XRefEntry) {
        self.entries.insert(obj_num, entry);
    }

    /// Whether any entry exists for this object number.
    pub fn contains(&self, obj_num: u32) -> bool {
        self.entries.contains_key(&obj_num)
    }

    /// Iterate all `(obj_num, entry)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&u32, &XRefEntry)> {
        self.entries.iter()
    }

    /// Iterate all `(obj_num, entry)` pairs mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&u32, &mut XRefEntry)> {
        self.entries.iter_mut()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Highest object number present, or 0 for an empty table.
    pub fn max_obj_num(&self) -> u32 {
        self.entries.keys().copied().max().unwrap_or(0)
    }

    /// Enforce §3's object-0 invariant and `Size` correction.
    ///
    /// - If object 0 is missing and `declared_size == len + 1`, synthesize it
    ///   as the free-list head (generation 65535).
    /// - If object 0 is missing, `declared_size == len`, and a known-buggy
    ///   producer shifted every key down by one, shift them back up.
    /// - Returns the corrected `Size` (at least `len(table)`).
    pub fn enforce_object_zero_invariant(&mut self, declared_size: u32) -> u32 {
        if !self.contains(0) {
            if declared_size as usize == self.len() + 1 {
                self.insert(0, XRefEntry::Free { next_free_obj: 0, generation: 65535 });
            } else if declared_size as usize == self.len() && !self.entries.is_empty() {
                log::warn!("object 0 missing and Size == len(table); shifting keys down by one");
                let shifted: HashMap<u32, XRefEntry> =
                    self.entries.drain().map(|(k, v)| (k.saturating_sub(1), v)).collect();
                self.entries = shifted;
                self.entries.entry(0).or_insert(XRefEntry::Free {
                    next_free_obj: 0,
                    generation: 65535,
                });
            } else {
                self.insert(0, XRefEntry::Free { next_free_obj: 0, generation: 65535 });
            }
        }
        declared_size.max(self.len() as u32)
    }
}

/// Trailer fields merged across the whole `Prev`/`XRefStm` chain. Each field
/// keeps the first (i.e. newest) value seen.
#[derive(Debug, Clone, Default)]
pub struct TrailerInfo {
    /// `/Size`.
    pub size: Option<u32>,
    /// `/Root`.
    pub root: Option<ObjectRef>,
    /// `/Info`.
    pub info: Option<ObjectRef>,
    /// `/ID` array, both elements, if present.
    pub id: Option<(Vec<u8>, Vec<u8>)>,
    /// `/Encrypt`.
    pub encrypt: Option<ObjectRef>,
}

impl TrailerInfo {
    fn merge_from(&mut self, other: &TrailerInfo) {
        if self.size.is_none() {
            self.size = other.size;
        }
        if self.root.is_none() {
            self.root = other.root;
        }
        if self.info.is_none() {
            self.info = other.info;
        }
        if self.id.is_none() {
            self.id = other.id.clone();
        }
        if self.encrypt.is_none() {
            self.encrypt = other.encrypt;
        }
    }

    fn from_dict(dict: &crate::object::Dict) -> Self {
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
}

/// Read-mode flags recording which cross-reference forms this document used.
#[derive(Debug, Clone, Default)]
pub struct ReadFlags {
    /// At least one xref stream was parsed.
    pub uses_xref_streams: bool,
    /// At least one classic `xref` section was parsed.
    pub uses_classic_xref: bool,
    /// A classic trailer carried `/XRefStm` (hybrid-reference file).
    pub is_hybrid: bool,
    /// Object numbers of every xref stream encountered.
    pub xref_streams: Vec<u32>,
}

/// Everything the xref builder produces from one load.
#[derive(Debug, Clone, Default)]
pub struct XRefLoadResult {
    /// The merged table.
    pub table: XRefTable,
    /// Merged trailer fields.
    pub trailer: TrailerInfo,
    /// Which xref forms were used.
    pub flags: ReadFlags,
}

/// Locate the offset of the final cross-reference section.
///
/// Scans backward from end-of-file in growing windows (starting at 512 bytes,
/// per §4.4 step 2) for the last `startxref` keyword, then parses the integer
/// that follows it.
pub fn find_last_startxref<R: Read + Seek>(reader: &mut R) -> Result<u64> {
    let file_size = reader.seek(SeekFrom::End(0))?;
    let mut window = 512u64.min(file_size);

    loop {
        reader.seek(SeekFrom::End(-(window as i64)))?;
        let mut buf = vec![0u8; window as usize];
        reader.read_exact(&mut buf)?;

        if let Some(pos) = rfind_subslice(&buf, b"startxref") {
            let after = &buf[pos + b"startxref".len()..];
            if let Some(offset) = first_integer(after) {
                return Ok(offset);
            }
        }

        if window >= file_size {
            return Err(Error::InvalidXref("no startxref keyword found".to_string()));
        }
        window = (window * 2).min(file_size);
    }
}

fn rfind_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    (0..=haystack.len() - needle.len()).rev().find(|&i| &haystack[i..i + needle.len()] == needle)
}

fn first_integer(buf: &[u8]) -> Option<u64> {
    let start = buf.iter().position(|b| b.is_ascii_digit())?;
    let end = buf[start..].iter().position(|b| !b.is_ascii_digit()).map(|p| start + p).unwrap_or(buf.len());
    std::str::from_utf8(&buf[start..end]).ok()?.parse().ok()
}

/// Walk the entire `Prev`/`XRefStm` chain starting at `start_offset`, merging
/// every section encountered (§4.4 steps 3-8). Does not attempt the bypass
/// scan — callers fall back to `crate::xref_reconstruction` on error.
pub fn load_chain<R: Read + Seek>(
    reader: &mut R,
    start_offset: u64,
    filters: &dyn FilterService,
) -> Result<XRefLoadResult> {
    let mut table = XRefTable::new();
    let mut trailer = TrailerInfo::default();
    let mut flags = ReadFlags::default();
    let mut visited = std::collections::HashSet::new();
    let mut next_offset = Some(start_offset);
    let mut last_err: Option<Error> = None;

    while let Some(offset) = next_offset {
        if !visited.insert(offset) {
            log::warn!("xref /Prev cycle detected at offset {offset}; stopping chain walk");
            break;
        }

        let section = match parse_one_section(reader, offset, filters) {
            Ok(section) => section,
            Err(e) => {
                log::warn!("failed to parse xref section at offset {offset}: {e}");
                last_err = Some(e);
                break;
            },
        };

        merge_section(&mut table, &mut trailer, &mut flags, &section);

        if let Some(xrefstm_offset) = section.xref_stm_offset {
            if visited.insert(xrefstm_offset) {
                match parse_one_section(reader, xrefstm_offset, filters) {
                    Ok(hybrid) => {
                        merge_section(&mut table, &mut trailer, &mut flags, &hybrid);
                        flags.is_hybrid = true;
                    },
                    Err(e) => log::warn!("failed to parse hybrid /XRefStm at {xrefstm_offset}: {e}"),
                }
            }
        }

        next_offset = section.prev_offset;
    }

    if table.is_empty() {
        return Err(last_err.unwrap_or_else(|| Error::InvalidXref("empty xref chain".to_string())));
    }

    let declared_size = trailer.size.unwrap_or(table.max_obj_num() + 1);
    trailer.size = Some(table.enforce_object_zero_invariant(declared_size));

    Ok(XRefLoadResult { table, trailer, flags })
}

struct Section {
    table: XRefTable,
    trailer: TrailerInfo,
    prev_offset: Option<u64>,
    xref_stm_offset: Option<u64>,
    is_stream: bool,
    stream_obj_num: Option<u32>,
}

fn merge_section(table: &mut XRefTable, trailer: &mut TrailerInfo, flags: &mut ReadFlags, section: &Section) {
    for (obj_num, entry) in section.table.iter() {
        table.insert_if_absent(*obj_num, entry.clone());
    }
    trailer.merge_from(&section.trailer);
    if section.is_stream {
        flags.uses_xref_streams = true;
        if let Some(n) = section.stream_obj_num {
            flags.xref_streams.push(n);
        }
    } else {
        flags.uses_classic_xref = true;
    }
}

fn parse_one_section<R: Read + Seek>(
    reader: &mut R,
    offset: u64,
    filters: &dyn FilterService,
) -> Result<Section> {
    reader.seek(SeekFrom::Start(offset))?;
    let mut peek = [0u8; 32];
    let n = reader.read(&mut peek)?;
    let trimmed = peek[..n].iter().position(|b| !b.is_ascii_whitespace()).map(|p| &peek[p..n]).unwrap_or(&[]);

    if trimmed.starts_with(b"xref") {
        parse_classic_section(reader, offset)
    } else {
        parse_stream_section(reader, offset, filters)
    }
}

/// Parse a classic `xref ... trailer << ... >>` section.
///
/// Entries are read line-by-line rather than by strict 20-byte slicing:
/// real-world producers frequently pad with one space vs two, or use a bare
/// `\n` where the spec wants `\r\n`, and a tolerant line reader recovers all
/// of these without falling back to the whole-file bypass scan.
fn parse_classic_section<R: Read + Seek>(reader: &mut R, offset: u64) -> Result<Section> {
    reader.seek(SeekFrom::Start(offset))?;
    let mut raw = Vec::new();
    reader.read_to_end(&mut raw)?;

    let text = String::from_utf8_lossy(&raw);
    let mut lines = text.lines();

    let first = lines.next().ok_or_else(|| Error::InvalidXref("empty xref section".to_string()))?;
    if !first.trim_start().starts_with("xref") {
        return Err(Error::InvalidXref("expected 'xref' keyword".to_string()));
    }

    let mut table = XRefTable::new();
    let mut trailer_dict = None;

    'subsections: loop {
        let header = loop {
            match lines.next() {
                Some(l) if l.trim().is_empty() => continue,
                Some(l) => break l,
                None => break 'subsections,
            }
        };

        let header = header.trim();
        if header.starts_with("trailer") {
            trailer_dict = parse_trailer_dict(&mut lines, header);
            break;
        }

        let parts: Vec<&str> = header.split_whitespace().collect();
        if parts.len() != 2 {
            return Err(Error::InvalidXref(format!("malformed subsection header: {header:?}")));
        }
        let start_obj: u32 =
            parts[0].parse().map_err(|_| Error::InvalidXref("bad subsection start".to_string()))?;
        let count: u32 =
            parts[1].parse().map_err(|_| Error::InvalidXref("bad subsection count".to_string()))?;

        let mut read = 0;
        while read < count {
            let line = match lines.next() {
                Some(l) if l.trim().is_empty() => continue,
                Some(l) => l,
                None => break,
            };
            if line.trim_start().starts_with("trailer") {
                log::warn!("xref subsection at {start_obj} truncated after {read}/{count} entries");
                trailer_dict = parse_trailer_dict(&mut lines, line.trim());
                break 'subsections;
            }

            let fields: Vec<&str> = line.split_whitespace().collect();
            let obj_num = start_obj + read;
            if fields.len() < 3 {
                table.insert(obj_num, XRefEntry::Free { next_free_obj: 0, generation: 65535 });
                read += 1;
                continue;
            }

            let offset: u64 = fields[0].parse().unwrap_or(0);
            let generation: u16 = fields[1].parse().unwrap_or(0);
            let entry = match fields[2].chars().next().map(|c| c.to_ascii_lowercase()) {
                Some('n') => {
                    if offset == 0 {
                        XRefEntry::Free { next_free_obj: 0, generation }
                    } else {
                        XRefEntry::InUse { offset, generation, object: None, ref_count: 0 }
                    }
                },
                _ => XRefEntry::Free { next_free_obj: offset as u32, generation },
            };
            table.insert(obj_num, entry);
            read += 1;
        }
    }

    let trailer_dict =
        trailer_dict.ok_or_else(|| Error::InvalidXref("xref section missing trailer".to_string()))?;
    let trailer = TrailerInfo::from_dict(&trailer_dict);
    let prev_offset =
        trailer_dict.find("Prev").and_then(Object::as_integer).map(|i| i as u64);
    let xref_stm_offset =
        trailer_dict.find("XRefStm").and_then(Object::as_integer).map(|i| i as u64);

    Ok(Section { table, trailer, prev_offset, xref_stm_offset, is_stream: false, stream_obj_num: None })
}

fn parse_trailer_dict(lines: &mut std::str::Lines<'_>, first_line: &str) -> Option<crate::object::Dict> {
    let after_keyword = first_line["trailer".len()..].trim_start();
    let mut buf = String::new();
    buf.push_str(after_keyword);
    buf.push('\n');
    for line in lines.by_ref() {
        buf.push_str(line);
        buf.push('\n');
        if buf.contains(">>") {
            break;
        }
    }
    let (_, obj) = crate::parser::parse_object(buf.as_bytes()).ok()?;
    obj.as_dict().cloned()
}

/// Parse a cross-reference stream object (`/Type /XRef`).
fn parse_stream_section<R: Read + Seek>(
    reader: &mut R,
    offset: u64,
    filters: &dyn FilterService,
) -> Result<Section> {
    let mut object_reader = ObjectReader::new(&mut *reader);
    let (obj_ref, obj) = object_reader.read_object_at_offset(offset)?;

    let (dict, raw, stream_filters) = match obj {
        Object::Stream { dict, raw, filters: f, .. } => (dict, raw, f),
        other => {
            return Err(Error::InvalidXref(format!(
                "expected xref stream object, found {}",
                other.type_name()
            )));
        },
    };

    if let Some(type_name) = dict.find("Type").and_then(Object::as_name) {
        if type_name != "XRef" {
            return Err(Error::InvalidXref(format!("expected /Type /XRef, found /{type_name}")));
        }
    }

    let mut decoded = raw.to_vec();
    let decode_parms = dict.find("DecodeParms").and_then(Object::as_dict);
    for name in &stream_filters {
        decoded = filters
            .decode(name, &decoded, decode_parms)
            .map_err(|e| Error::Decode(format!("xref stream filter {name}: {e}")))?;
    }

    let w = dict
        .find("W")
        .and_then(Object::as_array)
        .ok_or_else(|| Error::InvalidXref("xref stream missing /W".to_string()))?;
    if w.len() != 3 {
        return Err(Error::InvalidXref("xref stream /W must have 3 entries".to_string()));
    }
    let widths: Vec<usize> = w.iter().map(|o| o.as_integer().unwrap_or(0) as usize).collect();
    let (w1, w2, w3) = (widths[0], widths[1], widths[2]);
    let entry_width = w1 + w2 + w3;

    let size = dict
        .find("Size")
        .and_then(Object::as_integer)
        .ok_or_else(|| Error::InvalidXref("xref stream missing /Size".to_string()))?
        as u32;

    let index_ranges: Vec<(u32, u32)> = match dict.find("Index").and_then(Object::as_array) {
        Some(arr) => arr
            .chunks(2)
            .filter_map(|pair| {
                Some((pair.first()?.as_integer()? as u32, pair.get(1)?.as_integer()? as u32))
            })
            .collect(),
        None => vec![(0, size)],
    };

    let mut table = XRefTable::new();
    let mut pos = 0usize;
    for (start_obj, count) in index_ranges {
        for i in 0..count {
            if pos + entry_width > decoded.len() {
                log::warn!("xref stream truncated at object {}", start_obj + i);
                break;
            }
            let record = &decoded[pos..pos + entry_width];
            pos += entry_width;

            let field_type = if w1 == 0 { 1 } else { read_be(&record[..w1]) };
            let field2 = read_be(&record[w1..w1 + w2]);
            let field3 = read_be(&record[w1 + w2..w1 + w2 + w3]);

            let obj_num = start_obj + i;
            let entry = match field_type {
                0 => XRefEntry::Free { next_free_obj: field2 as u32, generation: field3 as u16 },
                1 => {
                    if field2 == 0 {
                        XRefEntry::Free { next_free_obj: 0, generation: field3 as u16 }
                    } else {
                        XRefEntry::InUse {
                            offset: field2,
                            generation: field3 as u16,
                            object: None,
                            ref_count: 0,
                        }
                    }
                },
                2 => XRefEntry::Compressed {
                    host_obj_stream: field2 as u32,
                    index_in_stream: field3 as u32,
                    object: None,
                    ref_count: 0,
                },
                other => {
                    log::warn!("unknown xref stream entry type {other} for object {obj_num}");
                    continue;
                },
            };
            table.insert(obj_num, entry);
        }
    }

    let trailer = TrailerInfo::from_dict(&dict);
    let prev_offset = dict.find("Prev").and_then(Object::as_integer).map(|i| i as u64);

    Ok(Section {
        table,
        trailer,
        prev_offset,
        xref_stm_offset: None,
        is_stream: true,
        stream_obj_num: Some(obj_ref.obj_num),
    })
}

fn read_be(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}
