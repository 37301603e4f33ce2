//! A minimal PostScript CMap interpreter (specification §4.6), enough to
//! decode `/ToUnicode` streams and the handful of embedded `/Encoding`
//! CMap streams real documents carry, plus the built-in `Identity-H`/
//! `Identity-V` tables.
//!
//! Grounded in `pdfium`-family engines' cmap parsers in spirit (a
//! bracket-delimited, stack-based PostScript dialect); implemented here
//! as a direct token scan rather than a full PostScript VM, since the
//! operator set the specification names (`begincodespacerange`,
//! `beginbfchar`, `beginbfrange`, `usecmap`, `findresource`,
//! `defineresource`) only ever nests bracketed literal lists, never
//! executes arbitrary procedures.

use std::collections::HashMap;

use crate::lexer::{Lexer, Token};

#[derive(Debug, Clone)]
enum BfRangeTarget {
    Base(String),
    Array(Vec<String>),
}

#[derive(Debug, Clone, Default)]
pub struct Cmap {
    /// `(byte_width, lo, hi)`, checked longest-prefix-first.
    codespace_ranges: Vec<(usize, u32, u32)>,
    bfchar: HashMap<u32, String>,
    bfrange: Vec<(u32, u32, BfRangeTarget)>,
}

impl Cmap {
    /// Named built-in tables the specification calls out explicitly:
    /// 2-byte codespace, code taken as the CID (and, absent a `/ToUnicode`,
    /// as the best available stand-in for the Unicode scalar).
    pub fn identity(vertical: bool) -> Self {
        let _ = vertical;
        Cmap {
            codespace_ranges: vec![(2, 0x0000, 0xFFFF)],
            bfchar: HashMap::new(),
            bfrange: Vec::new(),
        }
    }

    pub fn parse(data: &[u8]) -> Self {
        let mut cmap = Cmap::default();
        let mut lexer = Lexer::new(data, 0);
        let mut pending_numbers: Vec<i64> = Vec::new();
        let mut pending_strings: Vec<Vec<u8>> = Vec::new();

        loop {
            let token = match lexer.next_token() {
                Ok(t) => t,
                Err(_) => break,
            };
            match token {
                Token::Eof => break,
                Token::Integer(n) => pending_numbers.push(n),
                Token::StringHex(bytes) | Token::StringLiteral(bytes) => pending_strings.push(bytes),
                Token::Keyword(kw) => match kw.as_str() {
                    "begincodespacerange" => {
                        read_codespace_ranges(&mut lexer, &mut cmap);
                        pending_numbers.clear();
                        pending_strings.clear();
                    }
                    "beginbfchar" => {
                        read_bfchar(&mut lexer, &mut cmap);
                    }
                    "beginbfrange" => {
                        read_bfrange(&mut lexer, &mut cmap);
                    }
                    "usecmap" => {
                        // The preceding token names the base CMap; without a
                        // registry of every predefined CMap's table, fall
                        // back to an identity codespace so decoding still
                        // makes forward progress instead of stalling.
                        if cmap.codespace_ranges.is_empty() {
                            cmap.codespace_ranges.push((2, 0x0000, 0xFFFF));
                        }
                    }
                    _ => {
                        pending_numbers.clear();
                        pending_strings.clear();
                    }
                },
                Token::Name(_) => {}
                _ => {}
            }
        }

        if cmap.codespace_ranges.is_empty() {
            cmap.codespace_ranges.push((1, 0x00, 0xFF));
        }
        cmap
    }

    /// Consume the longest matching codespace prefix from `bytes` starting
    /// at `pos`, returning `(code, width)`. Falls back to one byte when no
    /// range matches (specification: "non-matching bytes emit U+FFFD and
    /// advance one byte").
    fn next_code(&self, bytes: &[u8], pos: usize) -> (u32, usize) {
        let mut best: Option<(u32, usize)> = None;
        for &(width, lo, hi) in &self.codespace_ranges {
            if pos + width > bytes.len() {
                continue;
            }
            let mut value: u32 = 0;
            for &b in &bytes[pos..pos + width] {
                value = (value << 8) | b as u32;
            }
            if value >= lo && value <= hi {
                if best.map(|(_, w)| width > w).unwrap_or(true) {
                    best = Some((value, width));
                }
            }
        }
        best.unwrap_or_else(|| {
            let width = self.codespace_ranges.first().map(|r| r.0).unwrap_or(1).min(bytes.len() - pos).max(1);
            let mut value = 0u32;
            for &b in &bytes[pos..pos + width] {
                value = (value << 8) | b as u32;
            }
            (value, width)
        })
    }

    pub fn decode(&self, bytes: &[u8]) -> Vec<(u32, String)> {
        let mut out = Vec::new();
        let mut pos = 0;
        while pos < bytes.len() {
            let (code, width) = self.next_code(bytes, pos);
            pos += width.max(1);
            out.push((code, self.lookup(code).unwrap_or_else(|| '\u{FFFD}'.to_string())));
        }
        out
    }

    pub fn lookup(&self, code: u32) -> Option<String> {
        if let Some(s) = self.bfchar.get(&code) {
            return Some(s.clone());
        }
        for (lo, hi, target) in &self.bfrange {
            if code >= *lo && code <= *hi {
                return Some(match target {
                    BfRangeTarget::Base(base) => offset_utf16_string(base, code - lo),
                    BfRangeTarget::Array(arr) => arr.get((code - lo) as usize).cloned().unwrap_or_default(),
                });
            }
        }
        None
    }
}

fn read_codespace_ranges(lexer: &mut Lexer, cmap: &mut Cmap) {
    loop {
        let token = match lexer.next_token() {
            Ok(t) => t,
            Err(_) => return,
        };
        match token {
            Token::Keyword(ref kw) if kw == "endcodespacerange" => return,
            Token::StringHex(lo) => {
                let hi = match lexer.next_token() {
                    Ok(Token::StringHex(hi)) => hi,
                    _ => return,
                };
                let width = lo.len().max(hi.len());
                cmap.codespace_ranges.push((width, bytes_to_u32(&lo), bytes_to_u32(&hi)));
            }
            Token::Eof => return,
            _ => {}
        }
    }
}

fn read_bfchar(lexer: &mut Lexer, cmap: &mut Cmap) {
    loop {
        let src = match lexer.next_token() {
            Ok(Token::Keyword(ref kw)) if kw == "endbfchar" => return,
            Ok(Token::StringHex(bytes)) => bytes,
            Ok(Token::Eof) | Err(_) => return,
            _ => continue,
        };
        let dst = match lexer.next_token() {
            Ok(Token::StringHex(bytes)) => bytes,
            _ => return,
        };
        cmap.bfchar.insert(bytes_to_u32(&src), utf16be_to_string(&dst));
    }
}

fn read_bfrange(lexer: &mut Lexer, cmap: &mut Cmap) {
    loop {
        let lo = match lexer.next_token() {
            Ok(Token::Keyword(ref kw)) if kw == "endbfrange" => return,
            Ok(Token::StringHex(bytes)) => bytes_to_u32(&bytes),
            Ok(Token::Eof) | Err(_) => return,
            _ => continue,
        };
        let hi = match lexer.next_token() {
            Ok(Token::StringHex(bytes)) => bytes_to_u32(&bytes),
            _ => return,
        };
        let target_token = match lexer.next_token() {
            Ok(t) => t,
            Err(_) => return,
        };
        match target_token {
            Token::StringHex(bytes) => {
                cmap.bfrange.push((lo, hi, BfRangeTarget::Base(utf16be_to_string(&bytes))));
            }
            Token::ArrayStart => {
                let mut items = Vec::new();
                loop {
                    match lexer.next_token() {
                        Ok(Token::ArrayEnd) | Ok(Token::Eof) | Err(_) => break,
                        Ok(Token::StringHex(bytes)) => items.push(utf16be_to_string(&bytes)),
                        _ => {}
                    }
                }
                cmap.bfrange.push((lo, hi, BfRangeTarget::Array(items)));
            }
            _ => {}
        }
    }
}

fn bytes_to_u32(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32)
}

/// The `bfchar`/`bfrange` destination strings are UTF-16BE, per ISO 32000.
fn utf16be_to_string(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]])).collect();
    String::from_utf16_lossy(&units)
}

/// A `bfrange` whose destination is a single base string represents each
/// code in the range as that base string with its last UTF-16 code unit
/// incremented by the code's offset from the range start.
fn offset_utf16_string(base: &str, offset: u32) -> String {
    let mut units: Vec<u16> = base.encode_utf16().collect();
    if let Some(last) = units.last_mut() {
        *last = last.wrapping_add(offset as u16);
    }
    String::from_utf16_lossy(&units)
}
