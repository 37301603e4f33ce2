//! Cross-reference resolution with recovery (specification §4.2, layer L2).
//!
//! Grounded in `J-F-Liu-lopdf`'s `reader.rs` (the `%%EOF`/`startxref`
//! backward scan, the `while let Some(prev) = ...` `/Prev` walk, the hybrid
//! `/XRefStm` follow) and `Priestch-xpdf`'s `xref.rs` (the brute-force
//! `N G obj` rebuild scan used as a last resort).

pub mod stream;

use std::collections::BTreeMap;
use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::reader::parse::{self, NoLengthResolver};
use crate::value::{Dictionary, ObjectPtr, Value};

/// Cross-reference entry (specification §3).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum XrefEntry {
    Free { next_free_obj: u32, gen: u16 },
    InUse { offset: usize, gen: u16 },
    InStream { container_obj: u32, index: u32 },
}

#[derive(Debug, Default)]
pub struct XrefTable {
    pub entries: BTreeMap<u32, XrefEntry>,
}

impl XrefTable {
    pub fn new() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(0, XrefEntry::Free { next_free_obj: 0, gen: 65535 });
        XrefTable { entries }
    }

    /// Oldest-update-wins merge: an entry already present (from a more
    /// recent section, since sections are folded in tail-first order) is
    /// never overwritten.
    fn merge(&mut self, num: u32, entry: XrefEntry) {
        self.entries.entry(num).or_insert(entry);
    }

    pub fn get(&self, num: u32) -> Option<XrefEntry> {
        self.entries.get(&num).copied()
    }

    pub fn max_object_number(&self) -> u32 {
        self.entries.keys().next_back().copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
pub struct Trailer {
    pub dict: Dictionary,
}

impl Trailer {
    pub fn root(&self) -> Option<ObjectPtr> {
        self.dict.get(b"Root").as_reference()
    }

    pub fn size(&self) -> Option<i64> {
        self.dict.get(b"Size").as_i64()
    }

    pub fn prev(&self) -> Option<i64> {
        self.dict.get(b"Prev").as_i64()
    }

    pub fn xref_stm(&self) -> Option<i64> {
        self.dict.get(b"XRefStm").as_i64()
    }

    pub fn encrypt(&self) -> Option<&Value> {
        self.dict.get_opt(b"Encrypt")
    }

    pub fn info(&self) -> Option<ObjectPtr> {
        self.dict.get(b"Info").as_reference()
    }

    pub fn id(&self) -> Option<&[Value]> {
        self.dict.get(b"ID").as_array()
    }
}

/// The offset an observed broken tool hard-codes regardless of the file's
/// actual layout (specification §4.2 point 3): treated as an immediate
/// signal to skip straight to the brute-force rebuild.
const KNOWN_BROKEN_STARTXREF: usize = 116;

pub fn load(buf: &[u8]) -> Result<(XrefTable, Trailer)> {
    if find_startxref_offset(buf).ok() == Some(KNOWN_BROKEN_STARTXREF) {
        // The known-broken offset is treated as an immediate signal, not
        // merely a failed lookup: skip the backward scan entirely rather
        // than risk stumbling on an unrelated `xref` keyword elsewhere in
        // the file and trusting a table that offset was never meant to name.
        return rebuild(buf);
    }
    match load_via_startxref(buf) {
        Ok(result) => Ok(result),
        Err(_) => match scan_backward_for_xref_keyword(buf) {
            Some(offset) => match load_chain_from(buf, offset) {
                Ok(result) => Ok(result),
                Err(_) => rebuild(buf),
            },
            None => rebuild(buf),
        },
    }
}

fn load_via_startxref(buf: &[u8]) -> Result<(XrefTable, Trailer)> {
    let start = find_startxref_offset(buf)?;
    if start == KNOWN_BROKEN_STARTXREF || start >= buf.len() {
        return Err(Error::BadXref("startxref offset is out of range".into()));
    }
    load_chain_from(buf, start)
}

fn load_chain_from(buf: &[u8], start: usize) -> Result<(XrefTable, Trailer)> {
    let mut table = XrefTable::new();
    let mut visited: HashSet<usize> = HashSet::new();
    let mut offset = start;
    let mut trailer_dict: Option<Dictionary> = None;

    loop {
        if !visited.insert(offset) {
            break; // defeat a /Prev cycle
        }
        if offset >= buf.len() {
            return Err(Error::BadXref("xref section offset out of range".into()));
        }
        let (entries, section_trailer) = parse_section(buf, offset)?;
        for (num, entry) in entries {
            table.merge(num, entry);
        }
        if trailer_dict.is_none() {
            trailer_dict = Some(section_trailer.clone());
        }

        if let Some(xref_stm) = section_trailer.get(b"XRefStm").as_i64() {
            let xref_stm = xref_stm as usize;
            if xref_stm < buf.len() && visited.insert(xref_stm) {
                let (hybrid_entries, _) = parse_section(buf, xref_stm)?;
                for (num, entry) in hybrid_entries {
                    table.merge(num, entry);
                }
            }
        }

        match section_trailer.get(b"Prev").as_i64() {
            Some(prev) if prev >= 0 && (prev as usize) < buf.len() => offset = prev as usize,
            _ => break,
        }
    }

    let trailer = Trailer {
        dict: trailer_dict.ok_or_else(|| Error::BadTrailer("no trailer dictionary found".into()))?,
    };
    if trailer.root().is_none() {
        return Err(Error::BadTrailer("trailer has no /Root".into()));
    }
    Ok((table, trailer))
}

/// Parse either a classical `xref`/`trailer` pair or an xref-stream object
/// at `offset`, returning its entries plus its local trailer dictionary
/// (for an xref stream, the stream dictionary itself).
fn parse_section(buf: &[u8], offset: usize) -> Result<(Vec<(u32, XrefEntry)>, Dictionary)> {
    if looks_like_classical_xref(buf, offset) {
        parse_classical_section(buf, offset)
    } else {
        let (_ptr, value) = parse::parse_indirect_object(buf, offset, &NoLengthResolver)?;
        let stream = value
            .as_stream()
            .ok_or_else(|| Error::BadXref("expected an xref stream object".into()))?;
        stream::parse_xref_stream(stream)
    }
}

fn looks_like_classical_xref(buf: &[u8], offset: usize) -> bool {
    buf[offset..].starts_with(b"xref")
}

fn parse_classical_section(buf: &[u8], offset: usize) -> Result<(Vec<(u32, XrefEntry)>, Dictionary)> {
    use crate::lexer::{Lexer, Token};

    let mut lexer = Lexer::new(buf, offset);
    match lexer.next_token()? {
        Token::Keyword(ref kw) if kw == "xref" => {}
        other => return Err(Error::unexpected(offset, format!("expected 'xref', found {:?}", other))),
    }

    let mut entries = Vec::new();
    loop {
        let before = lexer.offset();
        let head = lexer.next_token()?;
        let first = match head {
            Token::Integer(n) => n,
            Token::Keyword(ref kw) if kw == "trailer" => break,
            other => return Err(Error::unexpected(before, format!("expected subsection header, found {:?}", other))),
        };
        let count = match lexer.next_token()? {
            Token::Integer(n) => n,
            other => return Err(Error::unexpected(lexer.offset(), format!("expected subsection count, found {:?}", other))),
        };
        for i in 0..count {
            let obj_num = (first + i) as u32;
            let off = match lexer.next_token()? {
                Token::Integer(n) => n,
                other => return Err(Error::unexpected(lexer.offset(), format!("expected offset, found {:?}", other))),
            };
            let gen = match lexer.next_token()? {
                Token::Integer(n) => n,
                other => return Err(Error::unexpected(lexer.offset(), format!("expected generation, found {:?}", other))),
            };
            let kind = match lexer.next_token()? {
                Token::Keyword(kw) => kw,
                other => return Err(Error::unexpected(lexer.offset(), format!("expected 'n' or 'f', found {:?}", other))),
            };
            let entry = match kind.as_str() {
                "n" => XrefEntry::InUse { offset: off as usize, gen: gen as u16 },
                "f" => XrefEntry::Free { next_free_obj: off as u32, gen: gen as u16 },
                other => return Err(Error::unexpected(lexer.offset(), format!("unknown xref entry kind {:?}", other))),
            };
            entries.push((obj_num, entry));
        }
    }

    let head = lexer.next_token()?;
    let trailer_value = parse::parse_value(&mut lexer, head, buf, &NoLengthResolver)?;
    let trailer_dict = trailer_value
        .as_dict()
        .cloned()
        .ok_or_else(|| Error::BadTrailer("trailer is not a dictionary".into()))?;
    Ok((entries, trailer_dict))
}

fn find_startxref_offset(buf: &[u8]) -> Result<usize> {
    let window_start = buf.len().saturating_sub(4096);
    let window = &buf[window_start..];
    let pos = rfind(window, b"startxref").ok_or_else(|| Error::BadXref("no startxref marker".into()))?;
    let mut lexer = crate::lexer::Lexer::new(buf, window_start + pos + b"startxref".len());
    match lexer.next_token()? {
        crate::lexer::Token::Integer(n) if n >= 0 => Ok(n as usize),
        other => Err(Error::unexpected(lexer.offset(), format!("expected startxref offset, found {:?}", other))),
    }
}

fn scan_backward_for_xref_keyword(buf: &[u8]) -> Option<usize> {
    let mut i = buf.len();
    while i > 0 {
        i -= 1;
        if buf[i] == b'x' && buf[i..].starts_with(b"xref") {
            let at_line_start = i == 0 || buf[i - 1] == b'\n' || buf[i - 1] == b'\r';
            if at_line_start {
                return Some(i);
            }
        }
    }
    None
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    (0..=haystack.len() - needle.len()).rev().find(|&i| &haystack[i..i + needle.len()] == needle)
}

/// Brute-force recovery: scan every byte for `N G obj` at a line start,
/// record offsets, and synthesise a trailer by choosing the
/// highest-numbered `/Catalog` dictionary found (specification §4.2, and
/// the open question in §9 preserving this heuristic verbatim).
fn rebuild(buf: &[u8]) -> Result<(XrefTable, Trailer)> {
    let mut table = XrefTable::new();
    let mut catalog_candidates: Vec<u32> = Vec::new();

    let mut i = 0;
    while i < buf.len() {
        if let Some((num, gen, header_len)) = match_obj_header(buf, i) {
            let offset = i;
            table.merge(num, XrefEntry::InUse { offset, gen });
            if let Ok((_, value)) = parse::parse_indirect_object(buf, offset, &NoLengthResolver) {
                if let Some(dict) = value.as_dict() {
                    if dict.type_is(b"Catalog") {
                        catalog_candidates.push(num);
                    }
                    if dict.type_is(b"ObjStm") {
                        if let Some(stream) = value.as_stream() {
                            index_object_stream_members(stream, num, &mut table);
                        }
                    }
                }
            }
            i += header_len;
        } else {
            i += 1;
        }
    }

    let root_num = catalog_candidates
        .into_iter()
        .max()
        .ok_or_else(|| Error::BadXref("could not recover: no /Catalog object found".into()))?;

    let mut dict = Dictionary::new();
    dict.insert(b"Root".to_vec(), Value::Reference(ObjectPtr::new(root_num, 0)));
    dict.insert(b"Size".to_vec(), Value::Integer(table.max_object_number() as i64 + 1));
    Ok((table, Trailer { dict }))
}

/// Unlike the xref-stream path (where type-2 records name each member's
/// object number directly), a brute-force rebuild only knows an `/ObjStm`
/// container's offset; its members' object numbers live in the still-
/// encoded stream's own header. Decode it best-effort (unencrypted: a
/// document needing rebuild because its xref is gone has nothing to
/// authenticate a decryptor against yet) and register each member.
fn index_object_stream_members(stream: &crate::value::Stream, container_num: u32, table: &mut XrefTable) {
    let decoded = match crate::reader::filters::decode_stream(stream, None, None, crate::config::DEFAULT_MAX_STREAM_BYTES) {
        Ok(d) => d,
        Err(_) => return,
    };
    let n = stream.dict.get(b"N").as_i64().unwrap_or(0).max(0) as usize;
    let mut lexer = crate::lexer::Lexer::new(&decoded, 0);
    for i in 0..n {
        let num = match lexer.next_token() {
            Ok(crate::lexer::Token::Integer(v)) if v >= 0 => v as u32,
            _ => return,
        };
        match lexer.next_token() {
            Ok(crate::lexer::Token::Integer(v)) if v >= 0 => {}
            _ => return,
        };
        table.merge(num, XrefEntry::InStream { container_obj: container_num, index: i as u32 });
    }
}

fn match_obj_header(buf: &[u8], pos: usize) -> Option<(u32, u16, usize)> {
    if pos != 0 {
        let prev = buf[pos - 1];
        if !(prev == b'\n' || prev == b'\r') {
            return None;
        }
    }
    let mut lexer = crate::lexer::Lexer::new(buf, pos);
    let num = match lexer.next_token().ok()? {
        crate::lexer::Token::Integer(n) if n >= 0 => n as u32,
        _ => return None,
    };
    let gen = match lexer.next_token().ok()? {
        crate::lexer::Token::Integer(n) if n >= 0 => n as u16,
        _ => return None,
    };
    match lexer.next_token().ok()? {
        crate::lexer::Token::Keyword(kw) if kw == "obj" => Some((num, gen, lexer.offset() - pos)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pdf() -> Vec<u8> {
        let body: &[u8] = b"%PDF-1.4\n\
1 0 obj<</Type/Catalog/Pages 2 0 R>>endobj\n\
2 0 obj<</Type/Pages/Kids[3 0 R]/Count 1>>endobj\n\
3 0 obj<</Type/Page/Parent 2 0 R/MediaBox[0 0 200 200]/Contents 4 0 R>>endobj\n\
4 0 obj<</Length 10>>stream\nBT ET\n\nendstream endobj\n";

        let offsets = find_all_obj_offsets(body);
        let mut xref_block = format!("xref\n0 {}\n0000000000 65535 f \n", offsets.len() + 1);
        for off in &offsets {
            xref_block.push_str(&format!("{:010} 00000 n \n", off));
        }

        let mut out = body.to_vec();
        let xref_offset = out.len();
        out.extend_from_slice(xref_block.as_bytes());
        out.extend_from_slice(
            format!(
                "trailer\n<</Size {}/Root 1 0 R>>\nstartxref\n{}\n%%EOF",
                offsets.len() + 1,
                xref_offset
            )
            .as_bytes(),
        );
        out
    }

    fn find_all_obj_offsets(body: &[u8]) -> Vec<usize> {
        let mut offsets = Vec::new();
        let mut i = 0;
        while i < body.len() {
            if let Some((_, _, len)) = match_obj_header(body, i) {
                offsets.push(i);
                i += len;
            } else {
                i += 1;
            }
        }
        offsets
    }

    #[test]
    fn loads_classical_xref_and_resolves_root() {
        let pdf = sample_pdf();
        let (table, trailer) = load(&pdf).unwrap();
        let root = trailer.root().unwrap();
        assert_eq!(root, ObjectPtr::new(1, 0));
        assert!(matches!(table.get(1), Some(XrefEntry::InUse { .. })));
    }

    /// Scenario 4: a classical xref covering objects 1-4, plus a hybrid
    /// `/XRefStm` xref stream that is the only place object 5 is listed.
    /// `resolve((5,0))` must succeed by following the hybrid link.
    #[test]
    fn hybrid_xref_resolves_object_known_only_to_the_xref_stream() {
        use crate::reader::Reader;

        let mut body: Vec<u8> = b"%PDF-1.5\n".to_vec();
        let mut offsets = Vec::new();
        let mut push_obj = |out: &mut Vec<u8>, text: &[u8]| {
            offsets.push(out.len());
            out.extend_from_slice(text);
        };
        push_obj(&mut body, b"1 0 obj<</Type/Catalog/Pages 2 0 R>>endobj\n");
        push_obj(&mut body, b"2 0 obj<</Type/Pages/Kids[3 0 R]/Count 1>>endobj\n");
        push_obj(
            &mut body,
            b"3 0 obj<</Type/Page/Parent 2 0 R/MediaBox[0 0 200 200]/Resources<</Font<</F1 5 0 R>>>>/Contents 4 0 R>>endobj\n",
        );
        let content = b"BT /F1 12 Tf 0 0 Td (Hi) Tj ET";
        offsets.push(body.len());
        body.extend_from_slice(format!("4 0 obj<</Length {}>>stream\n", content.len()).as_bytes());
        body.extend_from_slice(content);
        body.extend_from_slice(b"\nendstream endobj\n");

        // Object 5 exists in the file but is deliberately left out of the
        // classical xref subsection below; only the xref stream names it.
        let obj5_offset = body.len();
        body.extend_from_slice(b"5 0 obj<</Type/Font/Subtype/Type1/BaseFont/Helvetica>>endobj\n");

        // Classical xref: entries for 0-4 only.
        let classical_offset = body.len();
        let mut xref_block = format!("xref\n0 {}\n0000000000 65535 f \n", 5);
        for off in &offsets {
            xref_block.push_str(&format!("{:010} 00000 n \n", off));
        }
        body.extend_from_slice(xref_block.as_bytes());

        // Xref stream object (object 6): one record, type 1, for object 5.
        let xref_stream_offset = body.len();
        let mut row = Vec::new();
        row.push(1u8); // type: in-use
        row.extend_from_slice(&(obj5_offset as u16).to_be_bytes()); // field2: offset (2 bytes)
        row.push(0u8); // field3: generation (1 byte)
        body.extend_from_slice(
            format!(
                "6 0 obj<</Type/XRef/W[1 2 1]/Index[5 1]/Size 6/Length {}>>stream\n",
                row.len()
            )
            .as_bytes(),
        );
        body.extend_from_slice(&row);
        body.extend_from_slice(b"\nendstream endobj\n");

        body.extend_from_slice(
            format!(
                "trailer\n<</Size 6/Root 1 0 R/XRefStm {}>>\nstartxref\n{}\n%%EOF",
                xref_stream_offset, classical_offset
            )
            .as_bytes(),
        );

        let reader = Reader::open(body, crate::config::Config::default()).unwrap();
        let font = reader.resolve(ObjectPtr::new(5, 0)).unwrap();
        let dict = font.as_dict().expect("object 5 resolves to a dictionary");
        assert!(dict.subtype_is(b"Type1"));

        let result = crate::orchestrator::extractor(&reader).extract();
        assert_eq!(result.text(), "Hi");
    }

    #[test]
    fn rebuilds_from_known_broken_startxref() {
        let mut pdf = sample_pdf();
        // Corrupt the startxref value to the known-broken sentinel.
        let marker = b"startxref\n";
        let pos = pdf.windows(marker.len()).position(|w| w == marker).unwrap();
        let value_start = pos + marker.len();
        let value_end = pdf[value_start..].iter().position(|&b| b == b'\n').unwrap() + value_start;
        let mut new_pdf = pdf[..value_start].to_vec();
        new_pdf.extend_from_slice(b"116");
        new_pdf.extend_from_slice(&pdf[value_end..]);
        pdf = new_pdf;

        let (_, trailer) = load(&pdf).unwrap();
        assert_eq!(trailer.root(), Some(ObjectPtr::new(1, 0)));
    }
}
