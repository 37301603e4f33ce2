//! Font dictionary classification, width tables, and code-to-text decoding
//! (specification §4.6, layer L6). `encoding.rs` supplies the single-byte
//! encoding tables; `cmap.rs` the embedded-CMap/`/ToUnicode` interpreter.
//! `Font::load` turns a resolved font dictionary into the small, immutable
//! `Font` the content interpreter consults per `Tj`/`TJ` operator; `FontCache`
//! memoizes that by the font dictionary's object pointer so a resource
//! shared across many content streams (the common case for a document's
//! body font) is classified once.
//!
//! Grounded on the teacher's resource-caching shape (a `Mutex`-guarded
//! `HashMap` keyed by the underlying indirect reference, same pattern as
//! `reader::ObjectCache`), generalized here to font-specific derived data
//! rather than raw `Value`s.

pub mod cmap;
pub mod encoding;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;
use crate::reader::Reader;
use crate::registry;
use crate::value::{Dictionary, ObjectPtr, Value};

use cmap::Cmap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontKind {
    Simple,
    Type0,
    Type3,
}

/// Coarse style flags the layout stage surfaces on a `GlyphRun`
/// (specification §3). Derived from `/BaseFont`'s name and, when present,
/// `/FontDescriptor`'s `/Flags`/`/FontWeight` — there is no reliable way to
/// recover style from an embedded font program without rendering it, so
/// this is a name-based heuristic rather than a hinting-accurate one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GlyphStyle {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
}

fn detect_style(font_dict: &Dictionary, descriptor: Option<&Dictionary>) -> GlyphStyle {
    let base_font = font_dict.get(b"BaseFont").as_name().unwrap_or(b"").to_ascii_lowercase();
    let bold = base_font.windows(4).any(|w| w == b"bold")
        || descriptor.and_then(|d| d.get(b"FontWeight").as_f64()).map(|w| w >= 600.0).unwrap_or(false);
    let italic = base_font.windows(6).any(|w| w == b"italic")
        || base_font.windows(7).any(|w| w == b"oblique")
        || descriptor.and_then(|d| d.get(b"Flags").as_i64()).map(|f| f & (1 << 6) != 0).unwrap_or(false);
    GlyphStyle { bold, italic, underline: false }
}

/// One decoded show-text unit: the raw code the string contained, its best
/// available Unicode rendering, and its advance width in glyph-space units
/// per thousand (specification §4.5's `glyph_advance`, divided by 1000 at
/// the point of use).
#[derive(Debug, Clone, PartialEq)]
pub struct Glyph {
    pub code: u32,
    pub text: String,
    pub advance_per_thousand: f64,
}

pub struct Font {
    kind: FontKind,
    /// Simple fonts (Type1/TrueType/Type3): one byte per code, resolved
    /// through a single-byte encoding table, possibly `/Differences`-patched.
    simple_encoding: Option<[char; 256]>,
    /// Type0 fonts: the code->CID map, when it is anything other than the
    /// overwhelmingly common `Identity-H`/`Identity-V` (which leaves `cid ==
    /// code` and needs no table at all).
    two_byte_codes: bool,
    to_unicode: Option<Cmap>,
    widths: HashMap<u32, f64>,
    default_width: f64,
    style: GlyphStyle,
    /// Vertical writing mode, known only for the predefined CMaps
    /// (specification §9's built-in CMap registry); embedded CMap programs
    /// don't advertise it through a name and default to horizontal.
    vertical: bool,
    pool_id: u32,
}

impl Font {
    pub fn load(reader: &Reader, font_dict: &Dictionary) -> Result<Font> {
        let subtype = font_dict.get(b"Subtype").as_name().unwrap_or(b"").to_vec();
        match subtype.as_slice() {
            b"Type0" => Self::load_type0(reader, font_dict),
            b"Type3" => Self::load_simple(reader, font_dict, FontKind::Type3),
            _ => Self::load_simple(reader, font_dict, FontKind::Simple),
        }
    }

    fn load_simple(reader: &Reader, font_dict: &Dictionary, kind: FontKind) -> Result<Font> {
        let mut table = base_encoding_for(font_dict);
        if let Some(enc_dict) = reader.deref(font_dict.get(b"Encoding"))?.as_dict() {
            if let Some(base_name) = enc_dict.get(b"BaseEncoding").as_name() {
                if let Some(named) = encoding::by_name(base_name) {
                    table = named;
                }
            }
            if let Some(diffs) = reader.deref(enc_dict.get(b"Differences"))?.as_array() {
                encoding::apply_differences(&mut table, diffs);
            }
        }

        let to_unicode = load_to_unicode(reader, font_dict)?;

        let first_char = font_dict.get(b"FirstChar").as_i64().unwrap_or(0);
        let mut widths = HashMap::new();
        if let Some(arr) = reader.deref(font_dict.get(b"Widths"))?.as_array() {
            for (i, w) in arr.iter().enumerate() {
                if let Some(w) = w.as_f64() {
                    widths.insert((first_char + i as i64) as u32, w);
                }
            }
        }
        let descriptor = font_descriptor(reader, font_dict)?;
        let default_width =
            descriptor.as_ref().and_then(|fd| fd.get(b"MissingWidth").as_f64()).unwrap_or(if widths.is_empty() { 500.0 } else { 0.0 });
        let style = detect_style(font_dict, descriptor.as_ref());
        let pool_id = registry::font_pool_id(font_dict.get(b"BaseFont").as_name().unwrap_or(b"(unnamed)"));

        Ok(Font {
            kind,
            simple_encoding: Some(table),
            two_byte_codes: false,
            to_unicode,
            widths,
            default_width,
            style,
            vertical: false,
            pool_id,
        })
    }

    fn load_type0(reader: &Reader, font_dict: &Dictionary) -> Result<Font> {
        let to_unicode = load_to_unicode(reader, font_dict)?;

        let descendant = reader
            .deref(font_dict.get(b"DescendantFonts"))?
            .as_array()
            .and_then(|arr| arr.first())
            .map(|v| reader.deref(v))
            .transpose()?
            .and_then(|v| v.as_dict().cloned())
            .unwrap_or_default();

        let default_width = descendant.get(b"DW").as_f64().unwrap_or(1000.0);
        let mut widths = HashMap::new();
        if let Some(w_array) = reader.deref(descendant.get(b"W"))?.as_array() {
            parse_cid_widths(w_array, &mut widths);
        }

        let descendant_descriptor = reader.deref(descendant.get(b"FontDescriptor"))?.as_dict().cloned();
        let style = detect_style(font_dict, descendant_descriptor.as_ref());
        let vertical = font_dict.get(b"Encoding").as_name().and_then(registry::builtin_cmap_vertical).unwrap_or(false);
        let pool_id = registry::font_pool_id(font_dict.get(b"BaseFont").as_name().unwrap_or(b"(unnamed)"));

        Ok(Font {
            kind: FontKind::Type0,
            simple_encoding: None,
            two_byte_codes: true,
            to_unicode,
            widths,
            default_width,
            style,
            vertical,
            pool_id,
        })
    }

    pub fn kind(&self) -> FontKind {
        self.kind
    }

    pub fn style(&self) -> GlyphStyle {
        self.style
    }

    /// Vertical writing mode (specification §9 built-in CMap registry).
    pub fn vertical(&self) -> bool {
        self.vertical
    }

    /// This font's id in the process-wide font-name pool (specification
    /// §9), stable for the lifetime of the process for a given `/BaseFont`
    /// name.
    pub fn pool_id(&self) -> u32 {
        self.pool_id
    }

    /// Decode a show-text operand string into codes with text and advance
    /// width (specification §4.6: "decode a byte string into a sequence of
    /// (code, text, advance) triples").
    pub fn decode(&self, bytes: &[u8]) -> Vec<Glyph> {
        if self.two_byte_codes {
            self.decode_two_byte(bytes)
        } else {
            self.decode_one_byte(bytes)
        }
    }

    fn decode_one_byte(&self, bytes: &[u8]) -> Vec<Glyph> {
        let table = self.simple_encoding.unwrap_or_else(|| encoding::standard_encoding());
        bytes
            .iter()
            .map(|&b| {
                let code = b as u32;
                let text = match self.to_unicode.as_ref().and_then(|cm| cm.lookup(code)) {
                    Some(s) => s,
                    None => registry::intern_rune(code, || table[b as usize].to_string()).to_string(),
                };
                Glyph { code, text, advance_per_thousand: self.width_for(code) }
            })
            .collect()
    }

    fn decode_two_byte(&self, bytes: &[u8]) -> Vec<Glyph> {
        let mut out = Vec::with_capacity(bytes.len() / 2);
        for chunk in bytes.chunks(2) {
            let code = if chunk.len() == 2 { ((chunk[0] as u32) << 8) | chunk[1] as u32 } else { chunk[0] as u32 };
            let text = match self.to_unicode.as_ref().and_then(|cm| cm.lookup(code)) {
                Some(s) => s,
                None => registry::intern_rune(code, || char::from_u32(code).map(String::from).unwrap_or_else(|| '\u{FFFD}'.to_string())).to_string(),
            };
            out.push(Glyph { code, text, advance_per_thousand: self.width_for(code) });
        }
        out
    }

    fn width_for(&self, code: u32) -> f64 {
        self.widths.get(&code).copied().unwrap_or(self.default_width)
    }
}

fn base_encoding_for(font_dict: &Dictionary) -> [char; 256] {
    match font_dict.get(b"BaseFont").as_name() {
        Some(name) if name.starts_with(b"Symbol") || name.starts_with(b"ZapfDingbats") => encoding::standard_encoding(),
        _ => encoding::standard_encoding(),
    }
}

fn font_descriptor(reader: &Reader, font_dict: &Dictionary) -> Result<Option<Dictionary>> {
    Ok(reader.deref(font_dict.get(b"FontDescriptor"))?.as_dict().cloned())
}

fn load_to_unicode(reader: &Reader, font_dict: &Dictionary) -> Result<Option<Cmap>> {
    match font_dict.get_opt(b"ToUnicode") {
        Some(Value::Reference(ptr)) => {
            let value = reader.resolve(*ptr)?;
            match value.as_stream() {
                Some(stream) => {
                    let decoded = reader.decode_stream_bytes(*ptr, stream)?;
                    Ok(Some(Cmap::parse(&decoded)))
                }
                None => Ok(None),
            }
        }
        _ => Ok(None),
    }
}

/// `/W` array grammar (ISO 32000-1 §9.7.4.3): each entry is either
/// `cid [w0 w1 ... wn]` (consecutive CIDs starting at `cid`) or
/// `cid_first cid_last w` (one width across an inclusive CID range).
fn parse_cid_widths(w: &[Value], out: &mut HashMap<u32, f64>) {
    let mut i = 0;
    while i < w.len() {
        let start = match w[i].as_i64() {
            Some(n) => n,
            None => break,
        };
        i += 1;
        if i >= w.len() {
            break;
        }
        match &w[i] {
            Value::Array(items) => {
                for (offset, width) in items.iter().enumerate() {
                    if let Some(width) = width.as_f64() {
                        out.insert((start + offset as i64) as u32, width);
                    }
                }
                i += 1;
            }
            other => {
                let end = match other.as_i64() {
                    Some(n) => n,
                    None => break,
                };
                i += 1;
                if i >= w.len() {
                    break;
                }
                if let Some(width) = w[i].as_f64() {
                    let mut cid = start;
                    while cid <= end {
                        out.insert(cid as u32, width);
                        cid += 1;
                    }
                }
                i += 1;
            }
        }
    }
}

/// Per-document memoization of `Font::load`, keyed by the font dictionary's
/// indirect reference. A document's body font is typically referenced from
/// every page's `/Resources`, so this is the difference between classifying
/// it once and re-walking its `/Encoding`/`/Widths` on every page.
#[derive(Default)]
pub struct FontCache {
    fonts: Mutex<HashMap<ObjectPtr, Arc<Font>>>,
}

impl FontCache {
    pub fn new() -> Self {
        FontCache::default()
    }

    pub fn get(&self, reader: &Reader, ptr: ObjectPtr) -> Result<Arc<Font>> {
        if let Some(font) = self.fonts.lock().get(&ptr) {
            return Ok(font.clone());
        }
        let dict = reader.resolve(ptr)?.as_dict().cloned().unwrap_or_default();
        let font = Arc::new(Font::load(reader, &dict)?);
        self.fonts.lock().insert(ptr, font.clone());
        Ok(font)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn cid_widths_parse_both_grammars() {
        let w = vec![
            Value::Integer(10),
            Value::Array(vec![Value::Integer(500), Value::Integer(600)]),
            Value::Integer(20),
            Value::Integer(22),
            Value::Integer(750),
        ];
        let mut out = HashMap::new();
        parse_cid_widths(&w, &mut out);
        assert_eq!(out.get(&10), Some(&500.0));
        assert_eq!(out.get(&11), Some(&600.0));
        assert_eq!(out.get(&20), Some(&750.0));
        assert_eq!(out.get(&21), Some(&750.0));
        assert_eq!(out.get(&22), Some(&750.0));
    }
}
