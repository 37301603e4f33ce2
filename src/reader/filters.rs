//! Stream filter decoding (specification §3 "Stream", §4.3).
//!
//! Grounded in the filter stacks the pack's PDF writers/readers carry:
//! `flate2` for FlateDecode (the standard choice across the corpus),
//! `weezl` for LZWDecode (the pure-Rust LZW codec the `image` ecosystem
//! uses, enrichment since the teacher crate never reads LZW streams), and
//! hand-rolled ASCIIHex/ASCII85/RunLength decoders, which are cheap enough
//! that no crate in the pack bothers pulling one in for them.

use std::io::Read;

use crate::crypto::Decryptor;
use crate::error::{Error, Result};
use crate::value::{Dictionary, ObjectPtr, Stream, Value};

/// Decrypt (if a decryptor and the stream's own object identity are
/// supplied; cross-reference streams are never encrypted and pass `None`
/// for both) then run the full `/Filter` chain, honoring per-filter
/// `/DecodeParms`.
pub fn decode_stream(
    stream: &Stream,
    ptr: Option<ObjectPtr>,
    crypt: Option<&Decryptor>,
    max_bytes: usize,
) -> Result<Vec<u8>> {
    let mut data = stream.raw.clone();
    if let (Some(decryptor), Some(ptr)) = (crypt, ptr) {
        data = decryptor.decrypt_stream(ptr, &stream.dict, data)?;
    }

    let filters = filter_names(&stream.dict);
    let parms = decode_parms(&stream.dict, filters.len());

    for (name, parm) in filters.iter().zip(parms.iter()) {
        data = apply_filter(name, &data, parm.as_ref())?;
        if data.len() > max_bytes {
            return Err(Error::StreamTooLarge { limit: max_bytes });
        }
    }
    Ok(data)
}

fn filter_names(dict: &Dictionary) -> Vec<Vec<u8>> {
    match dict.get(b"Filter") {
        Value::Name(n) => vec![n.clone()],
        Value::Array(items) => items.iter().filter_map(Value::as_name).map(|n| n.to_vec()).collect(),
        _ => Vec::new(),
    }
}

fn decode_parms(dict: &Dictionary, filter_count: usize) -> Vec<Option<Dictionary>> {
    match dict.get(b"DecodeParms") {
        Value::Dictionary(d) => vec![Some(d.clone())],
        Value::Array(items) => items.iter().map(|v| v.as_dict().cloned()).collect(),
        _ => vec![None; filter_count],
    }
}

fn apply_filter(name: &[u8], data: &[u8], parm: Option<&Dictionary>) -> Result<Vec<u8>> {
    let decoded = match name {
        b"FlateDecode" | b"Fl" => flate_decode(data)?,
        b"LZWDecode" | b"LZW" => lzw_decode(data, parm)?,
        b"ASCIIHexDecode" | b"AHx" => ascii_hex_decode(data),
        b"ASCII85Decode" | b"A85" => ascii85_decode(data),
        b"RunLengthDecode" | b"RL" => run_length_decode(data),
        b"Crypt" | b"Identity" => data.to_vec(),
        other => {
            return Err(Error::UnsupportedFilter(String::from_utf8_lossy(other).into_owned()));
        }
    };
    match parm.map(predictor_of) {
        Some(Some(predictor)) if predictor != 1 => apply_predictor(&decoded, parm.unwrap(), predictor),
        _ => Ok(decoded),
    }
}

fn predictor_of(parm: &Dictionary) -> Option<i64> {
    parm.get(b"Predictor").as_i64()
}

fn flate_decode(data: &[u8]) -> Result<Vec<u8>> {
    use flate2::read::ZlibDecoder;
    let mut out = Vec::new();
    let mut decoder = ZlibDecoder::new(data);
    decoder
        .read_to_end(&mut out)
        .map_err(|e| Error::filter("FlateDecode", e.to_string()))?;
    Ok(out)
}

fn lzw_decode(data: &[u8], parm: Option<&Dictionary>) -> Result<Vec<u8>> {
    // PDF's LZW is always MSB-first with an 8-bit starting code size; the
    // `/EarlyChange` default of 1 matches weezl's own default convention.
    let early_change = parm.and_then(|p| p.get(b"EarlyChange").as_i64()).unwrap_or(1);
    let mut decoder = if early_change == 0 {
        weezl::decode::Decoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8)
    } else {
        weezl::decode::Decoder::new(weezl::BitOrder::Msb, 8)
    };
    decoder
        .decode(data)
        .map_err(|e| Error::filter("LZWDecode", e.to_string()))
}

fn ascii_hex_decode(data: &[u8]) -> Vec<u8> {
    let digits: Vec<u8> = data
        .iter()
        .take_while(|&&b| b != b'>')
        .copied()
        .filter(|b| b.is_ascii_hexdigit())
        .collect();
    crate::lexer::decode_hex_string(&digits)
}

fn ascii85_decode(data: &[u8]) -> Vec<u8> {
    let body: &[u8] = {
        let trimmed = data.strip_prefix(b"<~").unwrap_or(data);
        let end = trimmed.windows(2).position(|w| w == b"~>").unwrap_or(trimmed.len());
        &trimmed[..end]
    };

    let mut out = Vec::new();
    let mut group = [0u8; 5];
    let mut group_len = 0usize;

    let mut flush = |group: &[u8], group_len: usize, out: &mut Vec<u8>| {
        if group_len == 0 {
            return;
        }
        let mut padded = [b'u'; 5];
        padded[..group_len].copy_from_slice(&group[..group_len]);
        let mut value: u32 = 0;
        for &b in &padded {
            value = value.wrapping_mul(85).wrapping_add((b - b'!') as u32);
        }
        let bytes = value.to_be_bytes();
        out.extend_from_slice(&bytes[..group_len - 1]);
    };

    for &b in body {
        if b == b'z' && group_len == 0 {
            out.extend_from_slice(&[0, 0, 0, 0]);
            continue;
        }
        if b.is_ascii_whitespace() {
            continue;
        }
        group[group_len] = b;
        group_len += 1;
        if group_len == 5 {
            flush(&group, group_len, &mut out);
            group_len = 0;
        }
    }
    flush(&group, group_len, &mut out);
    out
}

fn run_length_decode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < data.len() {
        let len = data[i];
        i += 1;
        if len == 128 {
            break;
        } else if len < 128 {
            let count = len as usize + 1;
            if i + count > data.len() {
                break;
            }
            out.extend_from_slice(&data[i..i + count]);
            i += count;
        } else {
            if i >= data.len() {
                break;
            }
            let count = 257 - len as usize;
            out.extend(std::iter::repeat(data[i]).take(count));
            i += 1;
        }
    }
    out
}

fn apply_predictor(data: &[u8], parm: &Dictionary, predictor: i64) -> Result<Vec<u8>> {
    let colors = parm.get(b"Colors").as_i64().unwrap_or(1).max(1) as usize;
    let bpc = parm.get(b"BitsPerComponent").as_i64().unwrap_or(8).max(1) as usize;
    let columns = parm.get(b"Columns").as_i64().unwrap_or(1).max(1) as usize;
    let bytes_per_pixel = ((colors * bpc) + 7) / 8;
    let row_bytes = ((colors * bpc * columns) + 7) / 8;

    if predictor == 2 {
        return Ok(tiff_predictor(data, row_bytes, bytes_per_pixel));
    }
    // PNG predictors (10-15): each row is prefixed with a filter-type byte.
    let stride = row_bytes + 1;
    let mut out = Vec::with_capacity(data.len());
    let mut prev_row = vec![0u8; row_bytes];
    for chunk in data.chunks(stride) {
        if chunk.len() < 2 {
            break;
        }
        let filter_type = chunk[0];
        let row = &chunk[1..];
        let mut decoded_row = vec![0u8; row.len()];
        for i in 0..row.len() {
            let a = if i >= bytes_per_pixel { decoded_row[i - bytes_per_pixel] } else { 0 };
            let b = prev_row[i];
            let c = if i >= bytes_per_pixel { prev_row[i - bytes_per_pixel] } else { 0 };
            let x = row[i];
            decoded_row[i] = match filter_type {
                0 => x,
                1 => x.wrapping_add(a),
                2 => x.wrapping_add(b),
                3 => x.wrapping_add(((a as u16 + b as u16) / 2) as u8),
                4 => x.wrapping_add(paeth(a, b, c)),
                _ => x,
            };
        }
        out.extend_from_slice(&decoded_row);
        prev_row = decoded_row;
    }
    Ok(out)
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

fn tiff_predictor(data: &[u8], row_bytes: usize, bytes_per_pixel: usize) -> Vec<u8> {
    let mut out = data.to_vec();
    for row in out.chunks_mut(row_bytes) {
        for i in bytes_per_pixel..row.len() {
            row[i] = row[i].wrapping_add(row[i - bytes_per_pixel]);
        }
    }
    out
}
