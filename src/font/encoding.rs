//! Single-byte encoding tables (specification §4.6): StandardEncoding,
//! WinAnsiEncoding, MacRomanEncoding, plus `/Differences` patching.
//! Grounded in the teacher's encoding table shape in `pdf/encoding.rs`
//! (a `[char; 256]` lookup array indexed by code byte) — the direction
//! reversed here from name-to-code (for writing) to code-to-rune (for
//! reading), per the specification's "code-to-rune table" framing.

const UNDEF: char = '\u{FFFD}';

/// Codes 0x20-0x7E are ASCII and identical across all three encodings;
/// only the tables' upper halves (and StandardEncoding's handful of
/// 0x27/0x60 deviations) differ.
const ASCII_PRINTABLE: (usize, usize) = (0x20, 0x7E);

fn ascii_base() -> [char; 256] {
    let mut table = [UNDEF; 256];
    for code in ASCII_PRINTABLE.0..=ASCII_PRINTABLE.1 {
        table[code] = code as u8 as char;
    }
    table
}

/// Adobe StandardEncoding (PDF32000-1 Annex D.2), ASCII range plus the two
/// quote deviations and the common high-range punctuation/diacritics.
pub fn standard_encoding() -> [char; 256] {
    let mut table = ascii_base();
    table[0x27] = '\u{2019}'; // quoteright
    table[0x60] = '\u{2018}'; // quoteleft
    let pairs: &[(usize, char)] = &[
        (0xA1, '\u{00A1}'),
        (0xA2, '\u{00A2}'),
        (0xA3, '\u{00A3}'),
        (0xA4, '\u{2044}'),
        (0xA5, '\u{00A5}'),
        (0xA6, '\u{0192}'),
        (0xA7, '\u{00A7}'),
        (0xA8, '\u{00A4}'),
        (0xA9, '\u{0027}'),
        (0xAA, '\u{201C}'),
        (0xAB, '\u{00AB}'),
        (0xAC, '\u{2039}'),
        (0xAD, '\u{203A}'),
        (0xAE, '\u{FB01}'),
        (0xAF, '\u{FB02}'),
        (0xB1, '\u{2013}'),
        (0xB2, '\u{2020}'),
        (0xB3, '\u{2021}'),
        (0xB4, '\u{00B7}'),
        (0xB6, '\u{00B6}'),
        (0xB7, '\u{2022}'),
        (0xB8, '\u{201A}'),
        (0xB9, '\u{201E}'),
        (0xBA, '\u{201D}'),
        (0xBB, '\u{00BB}'),
        (0xBC, '\u{2026}'),
        (0xBD, '\u{2030}'),
        (0xBF, '\u{00BF}'),
        (0xC1, '\u{0060}'),
        (0xC2, '\u{00B4}'),
        (0xC3, '\u{02C6}'),
        (0xC4, '\u{02DC}'),
        (0xC5, '\u{00AF}'),
        (0xC6, '\u{02D8}'),
        (0xC7, '\u{02D9}'),
        (0xC8, '\u{00A8}'),
        (0xCA, '\u{02DA}'),
        (0xCB, '\u{00B8}'),
        (0xCD, '\u{02DD}'),
        (0xCE, '\u{02DB}'),
        (0xCF, '\u{02C7}'),
        (0xD0, '\u{2014}'),
        (0xE1, '\u{00C6}'),
        (0xE3, '\u{00AA}'),
        (0xE8, '\u{0141}'),
        (0xE9, '\u{00D8}'),
        (0xEA, '\u{0152}'),
        (0xEB, '\u{00BA}'),
        (0xF1, '\u{00E6}'),
        (0xF5, '\u{0142}'),
        (0xF8, '\u{00F8}'),
        (0xF9, '\u{0153}'),
        (0xFA, '\u{00DF}'),
    ];
    for &(code, ch) in pairs {
        table[code] = ch;
    }
    table
}

/// WinAnsiEncoding (PDF32000-1 Annex D.2): ASCII range plus Windows-1252's
/// upper half, which is Latin-1 except for the 0x80-0x9F block.
pub fn win_ansi_encoding() -> [char; 256] {
    let mut table = ascii_base();
    for code in 0xA0..=0xFF {
        table[code] = char::from_u32(code as u32).unwrap_or(UNDEF);
    }
    let cp1252: &[(usize, char)] = &[
        (0x80, '\u{20AC}'),
        (0x82, '\u{201A}'),
        (0x83, '\u{0192}'),
        (0x84, '\u{201E}'),
        (0x85, '\u{2026}'),
        (0x86, '\u{2020}'),
        (0x87, '\u{2021}'),
        (0x88, '\u{02C6}'),
        (0x89, '\u{2030}'),
        (0x8A, '\u{0160}'),
        (0x8B, '\u{2039}'),
        (0x8C, '\u{0152}'),
        (0x8E, '\u{017D}'),
        (0x91, '\u{2018}'),
        (0x92, '\u{2019}'),
        (0x93, '\u{201C}'),
        (0x94, '\u{201D}'),
        (0x95, '\u{2022}'),
        (0x96, '\u{2013}'),
        (0x97, '\u{2014}'),
        (0x98, '\u{02DC}'),
        (0x99, '\u{2122}'),
        (0x9A, '\u{0161}'),
        (0x9B, '\u{203A}'),
        (0x9C, '\u{0153}'),
        (0x9E, '\u{017E}'),
        (0x9F, '\u{0178}'),
    ];
    for &(code, ch) in cp1252 {
        table[code] = ch;
    }
    table
}

/// MacRomanEncoding (PDF32000-1 Annex D.2).
pub fn mac_roman_encoding() -> [char; 256] {
    let mut table = ascii_base();
    let pairs: &[(usize, char)] = &[
        (0x80, '\u{00C4}'),
        (0x81, '\u{00C5}'),
        (0x82, '\u{00C7}'),
        (0x83, '\u{00C9}'),
        (0x84, '\u{00D1}'),
        (0x85, '\u{00D6}'),
        (0x86, '\u{00DC}'),
        (0x87, '\u{00E1}'),
        (0x88, '\u{00E0}'),
        (0x89, '\u{00E2}'),
        (0x8A, '\u{00E4}'),
        (0x8B, '\u{00E3}'),
        (0x8C, '\u{00E5}'),
        (0x8D, '\u{00E7}'),
        (0x8E, '\u{00E9}'),
        (0x8F, '\u{00E8}'),
        (0x90, '\u{00EA}'),
        (0x91, '\u{00EB}'),
        (0x92, '\u{00ED}'),
        (0x93, '\u{00EC}'),
        (0x94, '\u{00EE}'),
        (0x95, '\u{00EF}'),
        (0x96, '\u{00F1}'),
        (0x97, '\u{00F3}'),
        (0x98, '\u{00F2}'),
        (0x99, '\u{00F4}'),
        (0x9A, '\u{00F6}'),
        (0x9B, '\u{00F5}'),
        (0x9C, '\u{00FA}'),
        (0x9D, '\u{00F9}'),
        (0x9E, '\u{00FB}'),
        (0x9F, '\u{00FC}'),
        (0xA0, '\u{2020}'),
        (0xA1, '\u{00B0}'),
        (0xA2, '\u{00A2}'),
        (0xA3, '\u{00A3}'),
        (0xA4, '\u{00A7}'),
        (0xA5, '\u{2022}'),
        (0xA6, '\u{00B6}'),
        (0xA7, '\u{00DF}'),
        (0xA8, '\u{00AE}'),
        (0xA9, '\u{00A9}'),
        (0xAA, '\u{2122}'),
        (0xAB, '\u{00B4}'),
        (0xAC, '\u{00A8}'),
        (0xAE, '\u{00C6}'),
        (0xAF, '\u{00D8}'),
        (0xB1, '\u{00B1}'),
        (0xB4, '\u{00A5}'),
        (0xB5, '\u{00B5}'),
        (0xBB, '\u{00AA}'),
        (0xBC, '\u{00BA}'),
        (0xBE, '\u{00E6}'),
        (0xBF, '\u{00F8}'),
        (0xC0, '\u{00BF}'),
        (0xC1, '\u{00A1}'),
        (0xC2, '\u{00AC}'),
        (0xC4, '\u{0192}'),
        (0xC7, '\u{00AB}'),
        (0xC8, '\u{00BB}'),
        (0xC9, '\u{2026}'),
        (0xCA, '\u{00A0}'),
        (0xCB, '\u{00C0}'),
        (0xCC, '\u{00C3}'),
        (0xCD, '\u{00D5}'),
        (0xCE, '\u{0152}'),
        (0xCF, '\u{0153}'),
        (0xD0, '\u{2013}'),
        (0xD1, '\u{2014}'),
        (0xD2, '\u{201C}'),
        (0xD3, '\u{201D}'),
        (0xD4, '\u{2018}'),
        (0xD5, '\u{2019}'),
        (0xD6, '\u{00F7}'),
        (0xD8, '\u{00FF}'),
        (0xD9, '\u{0178}'),
        (0xDB, '\u{20AC}'),
        (0xDC, '\u{2039}'),
        (0xDD, '\u{203A}'),
        (0xE0, '\u{2021}'),
        (0xE1, '\u{00B7}'),
        (0xE5, '\u{00C2}'),
        (0xE6, '\u{00CA}'),
        (0xE7, '\u{00C1}'),
        (0xE8, '\u{00CB}'),
        (0xE9, '\u{00C8}'),
        (0xEA, '\u{00CD}'),
        (0xEB, '\u{00CE}'),
        (0xEC, '\u{00CF}'),
        (0xED, '\u{00CC}'),
        (0xEE, '\u{00D3}'),
        (0xEF, '\u{00D4}'),
        (0xF1, '\u{00D2}'),
        (0xF2, '\u{00DA}'),
        (0xF3, '\u{00DB}'),
        (0xF4, '\u{00D9}'),
    ];
    for &(code, ch) in pairs {
        table[code] = ch;
    }
    table
}

pub fn by_name(name: &[u8]) -> Option<[char; 256]> {
    match name {
        b"StandardEncoding" => Some(standard_encoding()),
        b"WinAnsiEncoding" => Some(win_ansi_encoding()),
        b"MacRomanEncoding" => Some(mac_roman_encoding()),
        _ => None,
    }
}

/// Apply a `/Differences` array: a sequence alternating an integer "start
/// code" with the glyph names that follow it consecutively. Glyph-name ->
/// Unicode resolution is limited to the handful of names the base
/// encodings already cover plus `uniXXXX`; anything else keeps the base
/// encoding's rune (better than dropping the glyph).
pub fn apply_differences(base: &mut [char; 256], differences: &[crate::value::Value]) {
    let mut code = 0usize;
    for item in differences {
        match item {
            crate::value::Value::Integer(n) => code = (*n).max(0) as usize,
            crate::value::Value::Name(name) => {
                if code < 256 {
                    if let Some(ch) = glyph_name_to_unicode(name) {
                        base[code] = ch;
                    }
                }
                code += 1;
            }
            _ => {}
        }
    }
}

fn glyph_name_to_unicode(name: &[u8]) -> Option<char> {
    if let Some(hex) = name.strip_prefix(b"uni") {
        if hex.len() == 4 {
            let text = std::str::from_utf8(hex).ok()?;
            let code = u32::from_str_radix(text, 16).ok()?;
            return char::from_u32(code);
        }
    }
    match name {
        b"space" => Some(' '),
        b"quotesingle" => Some('\''),
        b"quoteright" => Some('\u{2019}'),
        b"quoteleft" => Some('\u{2018}'),
        b"bullet" => Some('\u{2022}'),
        b"endash" => Some('\u{2013}'),
        b"emdash" => Some('\u{2014}'),
        b"quotedblleft" => Some('\u{201C}'),
        b"quotedblright" => Some('\u{201D}'),
        b"fi" => Some('\u{FB01}'),
        b"fl" => Some('\u{FB02}'),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_is_identical_across_encodings() {
        let std_enc = standard_encoding();
        let win = win_ansi_encoding();
        let mac = mac_roman_encoding();
        for code in 0x41..=0x5A {
            assert_eq!(std_enc[code], win[code]);
            assert_eq!(win[code], mac[code]);
        }
    }

    #[test]
    fn differences_patch_named_codes() {
        use crate::value::Value;
        let mut table = standard_encoding();
        let diffs = vec![Value::Integer(65), Value::Name(b"space".to_vec()), Value::Name(b"bullet".to_vec())];
        apply_differences(&mut table, &diffs);
        assert_eq!(table[65], ' ');
        assert_eq!(table[66], '\u{2022}');
    }
}
