//! Cross-reference stream decoding (PDF 1.5+, specification §4.2).
//!
//! An xref stream's dictionary doubles as the section's trailer; its
//! decoded body is a flat array of fixed-width records described by `/W`
//! and grouped into subsections by `/Index`. Grounded on the xref-stream
//! handling in `J-F-Liu-lopdf`'s `reader.rs`, which decodes `/W`-width
//! records the same way.

use crate::error::{Error, Result};
use crate::reader::filters;
use crate::value::{Dictionary, Stream, Value};
use crate::xref::XrefEntry;

pub fn parse_xref_stream(stream: &Stream) -> Result<(Vec<(u32, XrefEntry)>, Dictionary)> {
    let widths = read_widths(&stream.dict)?;
    let index = read_index(&stream.dict);
    let decoded = filters::decode_stream(stream, None, None, crate::config::DEFAULT_MAX_STREAM_BYTES)?;

    let record_len = widths[0] + widths[1] + widths[2];
    if record_len == 0 {
        return Err(Error::BadXref("xref stream has zero-width records".into()));
    }

    let mut entries = Vec::new();
    let mut cursor = 0usize;
    for (first_obj, count) in index {
        for i in 0..count {
            if cursor + record_len > decoded.len() {
                return Err(Error::BadXref("xref stream truncated before /Index was exhausted".into()));
            }
            let field_type = if widths[0] == 0 { 1 } else { read_be(&decoded[cursor..cursor + widths[0]]) };
            let mut pos = cursor + widths[0];
            let field2 = read_be(&decoded[pos..pos + widths[1]]);
            pos += widths[1];
            let field3 = read_be(&decoded[pos..pos + widths[2]]);
            cursor += record_len;

            let obj_num = (first_obj + i) as u32;
            let entry = match field_type {
                0 => XrefEntry::Free { next_free_obj: field2 as u32, gen: field3 as u16 },
                1 => XrefEntry::InUse { offset: field2 as usize, gen: field3 as u16 },
                2 => XrefEntry::InStream { container_obj: field2 as u32, index: field3 as u32 },
                other => return Err(Error::BadXref(format!("unknown xref stream entry type {}", other))),
            };
            entries.push((obj_num, entry));
        }
    }

    Ok((entries, stream.dict.clone()))
}

/// `/W [w1 w2 w3]`, defaulting the type-field width to 1 per spec when
/// `/W` omits it is not standard, but a zero width for field 1 (meaning
/// "assume type 1") is explicitly permitted and handled above.
fn read_widths(dict: &Dictionary) -> Result<[usize; 3]> {
    let w = dict
        .get(b"W")
        .as_array()
        .ok_or_else(|| Error::BadXref("xref stream missing /W".into()))?;
    if w.len() != 3 {
        return Err(Error::BadXref("/W must have exactly three entries".into()));
    }
    let mut out = [0usize; 3];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = w[i].as_i64().unwrap_or(0).max(0) as usize;
    }
    Ok(out)
}

/// `/Index [first1 count1 first2 count2 ...]`, defaulting to `[0 Size]`
/// when absent.
fn read_index(dict: &Dictionary) -> Vec<(i64, i64)> {
    match dict.get(b"Index").as_array() {
        Some(values) => values
            .chunks(2)
            .filter_map(|pair| match (pair.get(0).and_then(Value::as_i64), pair.get(1).and_then(Value::as_i64)) {
                (Some(first), Some(count)) => Some((first, count)),
                _ => None,
            })
            .collect(),
        None => {
            let size = dict.get(b"Size").as_i64().unwrap_or(0);
            vec![(0, size)]
        }
    }
}

fn read_be(bytes: &[u8]) -> i64 {
    let mut value: i64 = 0;
    for &b in bytes {
        value = (value << 8) | b as i64;
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Dictionary as Dict;

    fn make_stream(widths: [usize; 3], rows: &[[i64; 3]]) -> Stream {
        let mut dict = Dict::new();
        dict.insert(b"W".to_vec(), Value::Array(widths.iter().map(|&w| Value::Integer(w as i64)).collect()));
        dict.insert(b"Index".to_vec(), Value::Array(vec![Value::Integer(0), Value::Integer(rows.len() as i64)]));
        dict.insert(b"Size".to_vec(), Value::Integer(rows.len() as i64));

        let mut raw = Vec::new();
        for row in rows {
            for (i, &width) in widths.iter().enumerate() {
                let value = row[i];
                for shift in (0..width).rev() {
                    raw.push(((value >> (shift * 8)) & 0xFF) as u8);
                }
            }
        }
        Stream { dict, raw }
    }

    #[test]
    fn decodes_in_use_and_free_and_compressed_entries() {
        let stream = make_stream(
            [1, 2, 1],
            &[[0, 0, 65535], [1, 100, 0], [2, 7, 3]],
        );
        let (entries, _) = parse_xref_stream(&stream).unwrap();
        assert_eq!(entries[0], (0, XrefEntry::Free { next_free_obj: 0, gen: 65535 }));
        assert_eq!(entries[1], (1, XrefEntry::InUse { offset: 100, gen: 0 }));
        assert_eq!(entries[2], (2, XrefEntry::InStream { container_obj: 7, index: 3 }));
    }
}
