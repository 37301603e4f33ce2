//! Recursive-descent assembly of `Value`s from the L1 token stream
//! (specification §4.1-§4.3 boundary). Used both by `xref` (trailer
//! dictionaries, xref streams, the brute-force rebuild scan) and by
//! `reader` (resolving an object at a known offset).

use crate::error::{Error, Result};
use crate::lexer::{Lexer, Token};
use crate::value::{Dictionary, ObjectPtr, PdfString, Stream, Value};

/// Resolves an (already-parsed) `/Length` indirect reference to its integer
/// value. During xref rebuild this is unavailable; `parse_value` falls back
/// to scanning for `endstream` in that case.
pub trait LengthResolver {
    fn resolve_length(&self, ptr: ObjectPtr) -> Option<i64>;
}

impl<F: Fn(ObjectPtr) -> Option<i64>> LengthResolver for F {
    fn resolve_length(&self, ptr: ObjectPtr) -> Option<i64> {
        self(ptr)
    }
}

pub struct NoLengthResolver;
impl LengthResolver for NoLengthResolver {
    fn resolve_length(&self, _ptr: ObjectPtr) -> Option<i64> {
        None
    }
}

/// Parse one `Value`, given the token that has *already* been read as the
/// head of it (the caller is almost always doing one token of lookahead to
/// disambiguate `12 0 R` from a bare integer, so threading the head token
/// in avoids a double-read).
pub fn parse_value(
    lexer: &mut Lexer,
    head: Token,
    buf: &[u8],
    lengths: &dyn LengthResolver,
) -> Result<Value> {
    match head {
        Token::Eof => Err(Error::unexpected(lexer.offset(), "unexpected end of input")),
        Token::Keyword(kw) => match kw.as_str() {
            "null" => Ok(Value::Null),
            "true" => Ok(Value::Boolean(true)),
            "false" => Ok(Value::Boolean(false)),
            other => Err(Error::unexpected(lexer.offset(), format!("unexpected keyword {:?}", other))),
        },
        Token::Name(name) => Ok(Value::Name(name)),
        Token::StringLiteral(bytes) => Ok(Value::String(PdfString::literal(bytes))),
        Token::StringHex(bytes) => Ok(Value::String(PdfString::hex(bytes))),
        Token::Integer(n) => parse_after_integer(lexer, n, buf, lengths),
        Token::Real(r) => Ok(Value::Real(r)),
        Token::ArrayStart => parse_array(lexer, buf, lengths),
        Token::DictStart => parse_dict_or_stream(lexer, buf, lengths),
        other => Err(Error::unexpected(lexer.offset(), format!("unexpected token {:?}", other))),
    }
}

/// An integer might be the start of `N G R` (a reference). Two tokens of
/// lookahead, pushed back if the pattern doesn't match.
fn parse_after_integer(
    lexer: &mut Lexer,
    first: i64,
    buf: &[u8],
    lengths: &dyn LengthResolver,
) -> Result<Value> {
    let before_second = lexer.offset();
    let second = lexer.next_token()?;
    if let Token::Integer(gen) = second {
        let before_third = lexer.offset();
        let third = lexer.next_token()?;
        if let Token::Keyword(ref kw) = third {
            if kw == "R" && first >= 0 && gen >= 0 {
                return Ok(Value::Reference(ObjectPtr::new(first as u32, gen as u16)));
            }
        }
        lexer.push_back(third, before_third);
        lexer.push_back(Token::Integer(gen), before_second);
        return Ok(Value::Integer(first));
    }
    lexer.push_back(second, before_second);
    let _ = buf;
    let _ = lengths;
    Ok(Value::Integer(first))
}

fn parse_array(lexer: &mut Lexer, buf: &[u8], lengths: &dyn LengthResolver) -> Result<Value> {
    let mut items = Vec::new();
    loop {
        let before = lexer.offset();
        let token = lexer.next_token()?;
        if token == Token::ArrayEnd {
            break;
        }
        if token == Token::Eof {
            return Err(Error::unexpected(before, "unterminated array"));
        }
        items.push(parse_value(lexer, token, buf, lengths)?);
    }
    Ok(Value::Array(items))
}

fn parse_dict_or_stream(lexer: &mut Lexer, buf: &[u8], lengths: &dyn LengthResolver) -> Result<Value> {
    let dict = parse_dict_body(lexer, buf, lengths)?;
    let before = lexer.offset();
    let token = lexer.next_token()?;
    if token == Token::StreamStart {
        let data_start = lexer.stream_data_start();
        let length = stream_length(&dict, lengths);
        let data_end = match length {
            Some(len) if data_start + len as usize <= buf.len() => data_start + len as usize,
            _ => find_endstream(buf, data_start)?,
        };
        let raw = buf[data_start..data_end.min(buf.len())].to_vec();
        lexer.expect_endstream(data_end)?;
        Ok(Value::Stream(Stream { dict, raw }))
    } else {
        lexer.push_back(token, before);
        Ok(Value::Dictionary(dict))
    }
}

fn stream_length(dict: &Dictionary, lengths: &dyn LengthResolver) -> Option<i64> {
    match dict.get(b"Length") {
        Value::Integer(n) => Some(*n),
        Value::Reference(ptr) => lengths.resolve_length(*ptr),
        _ => None,
    }
}

/// Fallback when `/Length` is missing, indirect-and-unresolvable, or wrong:
/// scan forward for the next `endstream` keyword at a token boundary.
fn find_endstream(buf: &[u8], from: usize) -> Result<usize> {
    const NEEDLE: &[u8] = b"endstream";
    let mut i = from;
    while i + NEEDLE.len() <= buf.len() {
        if &buf[i..i + NEEDLE.len()] == NEEDLE {
            let mut end = i;
            // Trim the single tolerated EOL immediately before `endstream`.
            if end > from && buf[end - 1] == b'\n' {
                end -= 1;
                if end > from && buf[end - 1] == b'\r' {
                    end -= 1;
                }
            }
            return Ok(end);
        }
        i += 1;
    }
    Err(Error::BadStreamLength(
        "could not locate endstream while recovering from a bad /Length".into(),
    ))
}

pub fn parse_dict_body(lexer: &mut Lexer, buf: &[u8], lengths: &dyn LengthResolver) -> Result<Dictionary> {
    let mut dict = Dictionary::new();
    loop {
        let before = lexer.offset();
        let token = lexer.next_token()?;
        match token {
            Token::DictEnd => break,
            Token::Eof => return Err(Error::unexpected(before, "unterminated dictionary")),
            Token::Name(key) => {
                let value_head = lexer.next_token()?;
                let value = parse_value(lexer, value_head, buf, lengths)?;
                dict.insert(key, value);
            }
            other => return Err(Error::unexpected(before, format!("expected a name key, found {:?}", other))),
        }
    }
    Ok(dict)
}

/// Parse `N G obj <value> endobj` at `offset`, returning the object's
/// identity and value. Tolerates a missing `endobj` (some producers omit
/// it before EOF).
pub fn parse_indirect_object(
    buf: &[u8],
    offset: usize,
    lengths: &dyn LengthResolver,
) -> Result<(ObjectPtr, Value)> {
    let mut lexer = Lexer::new(buf, offset);
    let num = expect_integer(&mut lexer)?;
    let gen = expect_integer(&mut lexer)?;
    expect_keyword(&mut lexer, "obj")?;
    let head = lexer.next_token()?;
    let value = parse_value(&mut lexer, head, buf, lengths)?;
    // `endobj` is consumed best-effort; a missing/garbled one does not
    // invalidate an otherwise well-formed object.
    let before = lexer.offset();
    if let Ok(Token::Keyword(kw)) = lexer.next_token() {
        if kw != "endobj" {
            lexer.push_back(Token::Keyword(kw), before);
        }
    }
    Ok((ObjectPtr::new(num as u32, gen as u16), value))
}

fn expect_integer(lexer: &mut Lexer) -> Result<i64> {
    match lexer.next_token()? {
        Token::Integer(n) => Ok(n),
        other => Err(Error::unexpected(lexer.offset(), format!("expected integer, found {:?}", other))),
    }
}

fn expect_keyword(lexer: &mut Lexer, expected: &str) -> Result<()> {
    match lexer.next_token()? {
        Token::Keyword(kw) if kw == expected => Ok(()),
        other => Err(Error::unexpected(
            lexer.offset(),
            format!("expected keyword {:?}, found {:?}", expected, other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_indirect_object_with_reference() {
        let buf = b"1 0 obj << /Root 2 0 R /Size 5 >> endobj";
        let (ptr, value) = parse_indirect_object(buf, 0, &NoLengthResolver).unwrap();
        assert_eq!(ptr, ObjectPtr::new(1, 0));
        let dict = value.as_dict().unwrap();
        assert_eq!(dict.get(b"Root").as_reference(), Some(ObjectPtr::new(2, 0)));
        assert_eq!(dict.get(b"Size").as_i64(), Some(5));
    }

    #[test]
    fn parses_stream_with_direct_length() {
        let buf = b"1 0 obj << /Length 5 >> stream\nhello\nendstream endobj";
        let (_, value) = parse_indirect_object(buf, 0, &NoLengthResolver).unwrap();
        let stream = value.as_stream().unwrap();
        assert_eq!(stream.raw, b"hello");
    }

    #[test]
    fn falls_back_to_endstream_scan_on_bad_length() {
        let buf = b"1 0 obj << /Length 999999 >> stream\nhello\nendstream endobj";
        let (_, value) = parse_indirect_object(buf, 0, &NoLengthResolver).unwrap();
        let stream = value.as_stream().unwrap();
        assert_eq!(stream.raw, b"hello");
    }
}
