//! Document metadata and compatibility classification (specification §6:
//! `reader.metadata()`, `reader.compatibility_info()`).
//!
//! Neither is a parsing mode of its own: `Metadata` is a handful of
//! `/Info` dictionary lookups, and `CompatibilityInfo` is a set of
//! lightweight post-open classifications over the already-resolved
//! catalog and page tree (specification §9: "linearized PDFs remain
//! ordinary PDFs to the xref resolver... the linearization dictionary is
//! advisory").

use crate::error::Result;
use crate::font::encoding;
use crate::reader::{self, Reader};
use crate::value::{Dictionary, ObjectPtr, PdfString, Value};

/// Info-dictionary fields (specification §6). Date strings are returned
/// as their raw decoded text (e.g. `D:20240102030405Z`); parsing them into
/// a structured date is explicitly out of scope (spec.md §1: "metadata
/// date-string formatting beyond what is needed for decoding").
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub keywords: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub mod_date: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubFormat {
    None,
    PdfA,
    PdfX,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompatibilityInfo {
    pub version: (u8, u8),
    pub linearized: bool,
    pub sub_format: SubFormat,
    pub has_transparency: bool,
    pub has_layers: bool,
    pub has_forms: bool,
    pub has_js: bool,
    pub warnings: Vec<String>,
}

/// Decode a PDF string per specification §4.6: a `FE FF` BOM means
/// UTF-16BE (complete pairs only; a trailing odd byte is discarded per the
/// specification's boundary case), otherwise PDFDocEncoding. This engine
/// has no dedicated PDFDocEncoding table (its differences from
/// StandardEncoding are confined to a handful of high-byte punctuation
/// marks that never appear in practice in `/Info` fields); StandardEncoding
/// is used as the documented approximation.
pub fn decode_pdf_string(s: &PdfString) -> String {
    let bytes = &s.bytes;
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        decode_utf16be(&bytes[2..])
    } else {
        let table = encoding::standard_encoding();
        bytes.iter().map(|&b| table[b as usize]).collect()
    }
}

/// UTF-16BE decode, discarding a trailing unpaired byte (specification §8
/// boundary case).
fn decode_utf16be(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]])).collect();
    String::from_utf16_lossy(&units)
}

impl Reader {
    /// specification §6: `reader.metadata() -> Metadata`.
    pub fn metadata(&self) -> Result<Metadata> {
        let info = match self.trailer().info() {
            Some(ptr) => self.resolve(ptr)?.as_dict().cloned().unwrap_or_default(),
            None => Dictionary::new(),
        };
        let get = |key: &[u8]| info.get_opt(key).and_then(Value::as_string).map(decode_pdf_string);
        Ok(Metadata {
            title: get(b"Title"),
            author: get(b"Author"),
            subject: get(b"Subject"),
            keywords: get(b"Keywords"),
            creator: get(b"Creator"),
            producer: get(b"Producer"),
            creation_date: get(b"CreationDate"),
            mod_date: get(b"ModDate"),
        })
    }

    /// specification §6: `reader.compatibility_info()`.
    pub fn compatibility_info(&self) -> Result<CompatibilityInfo> {
        let version = reader::parsed_version(self.data()).unwrap_or((1, 4));
        let mut warnings = Vec::new();

        let catalog = match self.catalog() {
            Ok(c) => c,
            Err(e) => {
                warnings.push(e.to_string());
                Dictionary::new()
            }
        };

        let linearized = self.detect_linearized();
        let sub_format = self.detect_sub_format(&catalog).unwrap_or(SubFormat::None);
        let has_forms = catalog.get_opt(b"AcroForm").is_some();
        let has_layers = catalog.get_opt(b"OCProperties").is_some();
        let has_js = self.detect_js(&catalog).unwrap_or(false);
        let has_transparency = self.detect_transparency().unwrap_or(false);

        Ok(CompatibilityInfo { version, linearized, sub_format, has_transparency, has_layers, has_forms, has_js, warnings })
    }

    /// specification §8 scenario 3 / GLOSSARY: "signalled by a
    /// `/Linearized` dictionary as the first object."
    fn detect_linearized(&self) -> bool {
        self.resolve(ObjectPtr::new(1, 0)).ok().and_then(|v| v.as_dict().cloned()).map(|d| d.get_opt(b"Linearized").is_some()).unwrap_or(false)
    }

    fn detect_sub_format(&self, catalog: &Dictionary) -> Result<SubFormat> {
        if let Some(ptr) = catalog.get(b"Metadata").as_reference() {
            if let Some(stream) = self.resolve(ptr)?.as_stream() {
                let xmp = self.decode_stream_bytes(ptr, stream)?;
                if contains(&xmp, b"pdfaid:part") {
                    return Ok(SubFormat::PdfA);
                }
            }
        }
        if let Some(intents) = self.deref(catalog.get(b"OutputIntents"))?.as_array().map(<[Value]>::to_vec) {
            for intent in &intents {
                if let Some(dict) = self.deref(intent)?.as_dict() {
                    match dict.get(b"S").as_name() {
                        Some(b"GTS_PDFA1") => return Ok(SubFormat::PdfA),
                        Some(b"GTS_PDFX") => return Ok(SubFormat::PdfX),
                        _ => {}
                    }
                }
            }
        }
        Ok(SubFormat::None)
    }

    fn detect_js(&self, catalog: &Dictionary) -> Result<bool> {
        if let Some(names) = self.deref(catalog.get(b"Names"))?.as_dict() {
            if names.get_opt(b"JavaScript").is_some() {
                return Ok(true);
            }
        }
        if action_is_javascript(self, catalog.get(b"OpenAction"))? {
            return Ok(true);
        }
        if let Some(aa) = self.deref(catalog.get(b"AA"))?.as_dict() {
            for (_, action) in aa.0.iter() {
                if action_is_javascript(self, action)? {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// First-pass scan over every page dict for `/Group /S /Transparency`
    /// (specification §9 supplement: "does not require full content
    /// interpretation").
    fn detect_transparency(&self) -> Result<bool> {
        for n in 1..=self.num_pages() {
            let dict = self.page_dict(n)?;
            if let Some(group) = self.deref(dict.get(b"Group"))?.as_dict() {
                if group.get(b"S").as_name() == Some(b"Transparency") {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

fn action_is_javascript(reader: &Reader, value: &Value) -> Result<bool> {
    match reader.deref(value)?.as_dict() {
        Some(dict) => Ok(dict.get(b"S").as_name() == Some(b"JavaScript")),
        None => Ok(false),
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len().max(1)).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::PdfString;

    #[test]
    fn decodes_utf16be_bom_string() {
        let mut bytes = vec![0xFE, 0xFF];
        bytes.extend_from_slice(&[0x00, 0x41, 0x00, 0x42]);
        let s = PdfString::literal(bytes);
        assert_eq!(decode_pdf_string(&s), "AB");
    }

    #[test]
    fn utf16be_odd_trailing_byte_is_discarded() {
        let mut bytes = vec![0xFE, 0xFF];
        bytes.extend_from_slice(&[0x00, 0x41, 0x00]);
        let s = PdfString::literal(bytes);
        assert_eq!(decode_pdf_string(&s), "A");
    }

    #[test]
    fn ascii_without_bom_decodes_via_standard_encoding() {
        let s = PdfString::literal(b"Hello".to_vec());
        assert_eq!(decode_pdf_string(&s), "Hello");
    }
}
