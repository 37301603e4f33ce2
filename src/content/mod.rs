//! Content-stream operator dispatch (specification §4.5, layer L5).
//!
//! `Interpreter` walks the token stream a page's (already concatenated and
//! filter-decoded) `/Contents` produces, maintaining the `q`/`Q` graphics
//! state stack and emitting one `GlyphRun` per decoded glyph code. Grounded
//! in the teacher's `content.rs` operator-dispatch shape (a `match` over
//! keyword strings against a small operand stack), generalized from a
//! content-stream *writer* into a *reader* that also recurses into Form
//! XObjects and resolves fonts through `font::FontCache`.

pub mod glyph;
pub mod graphics_state;

use log::debug;
use smallvec::SmallVec;

use crate::cancel::CancellationToken;
use crate::error::{Error, Result};
use crate::font::FontCache;
use crate::geom::{self, Matrix};
use crate::lexer::{self, Lexer, Token};
use crate::reader::Reader;
use crate::value::{Dictionary, ObjectPtr, PdfString, Value};

use glyph::GlyphRun;
use graphics_state::GraphicsState;

/// Specification §9: "Form XObjects may recursively reference themselves;
/// enforce a recursion depth cap in L5 (default 32)."
const MAX_FORM_DEPTH: u32 = 32;

#[derive(Debug, Clone)]
enum Operand {
    Number(f64),
    Name(Vec<u8>),
    String(Vec<u8>),
    Array(Vec<Operand>),
    Dict(Dictionary),
}

impl Operand {
    fn as_f64(&self) -> Option<f64> {
        match self {
            Operand::Number(n) => Some(*n),
            _ => None,
        }
    }

    fn as_name(&self) -> Option<&[u8]> {
        match self {
            Operand::Name(n) => Some(n),
            _ => None,
        }
    }

    fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Operand::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Run the content interpreter over one page, producing the positioned
/// glyph runs (specification §4.8: "a worker acquires the `Contents`
/// stream(s), runs L5"). Errors other than cooperative cancellation are
/// converted into `Error::ContentStreamError` rather than propagated, per
/// specification §7's "L5 errors are caught at the page boundary".
pub fn run_page(reader: &Reader, fonts: &FontCache, cancel: &CancellationToken, page: usize) -> Result<Vec<GlyphRun>> {
    let ptr = reader.page_ptr(page)?;
    let resources = reader.page_resources(ptr)?;
    let content = reader.page_contents_bytes(ptr)?;

    let mut interp = Interpreter { reader, fonts, cancel, page, runs: Vec::new() };
    let mut stack = vec![GraphicsState::new(geom::identity())];
    match interp.execute(&content, &resources, &mut stack, 0) {
        Ok(()) => Ok(interp.runs),
        Err(Error::Cancelled) => Err(Error::Cancelled),
        Err(Error::Timeout) => Err(Error::Timeout),
        Err(other) => Err(Error::ContentStreamError { page, detail: other.to_string() }),
    }
}

struct Interpreter<'a> {
    reader: &'a Reader,
    fonts: &'a FontCache,
    cancel: &'a CancellationToken,
    page: usize,
    runs: Vec<GlyphRun>,
}

impl<'a> Interpreter<'a> {
    fn execute(&mut self, content: &[u8], resources: &Dictionary, stack: &mut Vec<GraphicsState>, depth: u32) -> Result<()> {
        let mut lexer = Lexer::new(content, 0).with_cancel(self.cancel);
        // Specification §4.5 permits any number of operands (an array's
        // literal element count in `TJ` included); a handful of stack slots
        // covers every real operator without spilling to the heap.
        let mut operands: SmallVec<[Operand; 8]> = SmallVec::new();

        loop {
            self.cancel.check()?;
            let token = lexer.next_token()?;
            match token {
                Token::Eof => break,
                Token::Keyword(kw) if kw == "BI" => {
                    let dict = self.read_inline_image_dict(&mut lexer)?;
                    self.skip_inline_image_data(content, &mut lexer, &dict);
                    operands.clear();
                }
                Token::Keyword(kw) => {
                    if let Err(err) = self.dispatch(&kw, &operands, stack, resources, depth) {
                        if matches!(err, Error::Cancelled | Error::Timeout) {
                            return Err(err);
                        }
                        debug!("content stream: operator '{}' on page {} failed: {}", kw, self.page, err);
                    }
                    operands.clear();
                }
                other => match parse_operand(&mut lexer, other) {
                    Ok(operand) => operands.push(operand),
                    Err(_) => operands.clear(),
                },
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, op: &str, args: &[Operand], stack: &mut Vec<GraphicsState>, resources: &Dictionary, depth: u32) -> Result<()> {
        match op {
            "q" => {
                let top = stack.last().cloned().ok_or_else(|| self.local_error("q with no graphics state"))?;
                stack.push(top);
            }
            "Q" => {
                if stack.len() > 1 {
                    stack.pop();
                }
            }
            "cm" => {
                let m = read_matrix(args)?;
                let state = self.top_mut(stack)?;
                state.ctm = m.then(&state.ctm);
            }
            "BT" => {
                let state = self.top_mut(stack)?;
                state.text.tm = geom::identity();
                state.text.tlm = geom::identity();
            }
            "ET" => {}
            "Tf" => {
                let name = args.first().and_then(Operand::as_name).ok_or_else(|| self.local_error("Tf missing font name"))?;
                let size = args.get(1).and_then(Operand::as_f64).ok_or_else(|| self.local_error("Tf missing size"))?;
                let font_ptr =
                    self.lookup_resource_ref(resources, b"Font", name)?.ok_or_else(|| self.local_error("Tf: font not in resources"))?;
                let font = self.fonts.get(self.reader, font_ptr)?;
                let state = self.top_mut(stack)?;
                state.text.tfs = size;
                state.text.font = Some(font);
                state.text.font_id = Some(font_ptr);
            }
            "Tc" => self.top_mut(stack)?.text.tc = num(args, 0)?,
            "Tw" => self.top_mut(stack)?.text.tw = num(args, 0)?,
            "Tz" => self.top_mut(stack)?.text.th = num(args, 0)? / 100.0,
            "TL" => self.top_mut(stack)?.text.tl = num(args, 0)?,
            "Ts" => self.top_mut(stack)?.text.trise = num(args, 0)?,
            "Tr" => self.top_mut(stack)?.text.render_mode = num(args, 0)? as i64,
            "Td" => {
                let (tx, ty) = (num(args, 0)?, num(args, 1)?);
                let state = self.top_mut(stack)?;
                state.text.tlm = geom::matrix(1.0, 0.0, 0.0, 1.0, tx, ty).then(&state.text.tlm);
                state.text.tm = state.text.tlm;
            }
            "TD" => {
                let (tx, ty) = (num(args, 0)?, num(args, 1)?);
                let state = self.top_mut(stack)?;
                state.text.tl = -ty;
                state.text.tlm = geom::matrix(1.0, 0.0, 0.0, 1.0, tx, ty).then(&state.text.tlm);
                state.text.tm = state.text.tlm;
            }
            "Tm" => {
                let m = read_matrix(args)?;
                let state = self.top_mut(stack)?;
                state.text.tm = m;
                state.text.tlm = m;
            }
            "T*" => {
                let state = self.top_mut(stack)?;
                let tl = state.text.tl;
                state.text.tlm = geom::matrix(1.0, 0.0, 0.0, 1.0, 0.0, -tl).then(&state.text.tlm);
                state.text.tm = state.text.tlm;
            }
            "Tj" => {
                let bytes = args.first().and_then(Operand::as_bytes).ok_or_else(|| self.local_error("Tj missing string"))?.to_vec();
                let state = self.top_mut(stack)?;
                show_text(&bytes, state, &mut self.runs);
            }
            "'" => {
                let state = self.top_mut(stack)?;
                let tl = state.text.tl;
                state.text.tlm = geom::matrix(1.0, 0.0, 0.0, 1.0, 0.0, -tl).then(&state.text.tlm);
                state.text.tm = state.text.tlm;
                let bytes = args.first().and_then(Operand::as_bytes).ok_or_else(|| self.local_error("' missing string"))?.to_vec();
                let state = self.top_mut(stack)?;
                show_text(&bytes, state, &mut self.runs);
            }
            "\"" => {
                let aw = num(args, 0)?;
                let ac = num(args, 1)?;
                let bytes = args.get(2).and_then(Operand::as_bytes).ok_or_else(|| self.local_error("\" missing string"))?.to_vec();
                let state = self.top_mut(stack)?;
                state.text.tw = aw;
                state.text.tc = ac;
                let tl = state.text.tl;
                state.text.tlm = geom::matrix(1.0, 0.0, 0.0, 1.0, 0.0, -tl).then(&state.text.tlm);
                state.text.tm = state.text.tlm;
                show_text(&bytes, state, &mut self.runs);
            }
            "TJ" => {
                let items = match args.first() {
                    Some(Operand::Array(items)) => items.clone(),
                    _ => return Err(self.local_error("TJ missing array operand")),
                };
                for item in items {
                    match item {
                        Operand::String(bytes) => {
                            let state = self.top_mut(stack)?;
                            show_text(&bytes, state, &mut self.runs);
                        }
                        Operand::Number(adjust) => {
                            let state = self.top_mut(stack)?;
                            let tx = -(adjust / 1000.0) * state.text.tfs * state.text.th;
                            state.text.tm = geom::matrix(1.0, 0.0, 0.0, 1.0, tx, 0.0).then(&state.text.tm);
                        }
                        _ => {}
                    }
                }
            }
            "Do" => {
                let name = args.first().and_then(Operand::as_name).ok_or_else(|| self.local_error("Do missing XObject name"))?.to_vec();
                self.do_xobject(&name, stack, resources, depth)?;
            }
            "BMC" | "BDC" | "EMC" | "MP" | "DP" | "re" => {}
            _ => {}
        }
        Ok(())
    }

    fn top_mut<'s>(&self, stack: &'s mut Vec<GraphicsState>) -> Result<&'s mut GraphicsState> {
        stack.last_mut().ok_or_else(|| self.local_error("operator with empty graphics state stack"))
    }

    fn local_error(&self, detail: impl Into<String>) -> Error {
        Error::ContentStreamError { page: self.page, detail: detail.into() }
    }

    /// A resource category (`/Font`, `/XObject`, ...) is frequently itself
    /// an indirect reference, and real-world files occasionally nest a
    /// second hop before the named entry; dereference both levels.
    fn lookup_resource_ref(&self, resources: &Dictionary, category: &[u8], name: &[u8]) -> Result<Option<ObjectPtr>> {
        let category_dict = match self.reader.deref(resources.get(category))?.as_dict() {
            Some(d) => d.clone(),
            None => return Ok(None),
        };
        Ok(category_dict.get(name).as_reference())
    }

    fn do_xobject(&mut self, name: &[u8], stack: &mut Vec<GraphicsState>, resources: &Dictionary, depth: u32) -> Result<()> {
        if depth >= MAX_FORM_DEPTH {
            debug!("content stream: Form XObject recursion capped at {} on page {}", MAX_FORM_DEPTH, self.page);
            return Ok(());
        }
        let ptr = match self.lookup_resource_ref(resources, b"XObject", name)? {
            Some(ptr) => ptr,
            None => return Ok(()),
        };
        let value = self.reader.resolve(ptr)?;
        let stream = match value.as_stream() {
            Some(s) => s,
            None => return Ok(()),
        };
        if !stream.dict.subtype_is(b"Form") {
            // Image/Pattern XObjects are ignored (specification §4.5).
            return Ok(());
        }

        let xobject_matrix = match self.reader.deref(stream.dict.get(b"Matrix"))?.as_array() {
            Some(arr) if arr.len() == 6 => {
                let n: Vec<f64> = arr.iter().map(|v| v.as_f64().unwrap_or(0.0)).collect();
                geom::matrix(n[0], n[1], n[2], n[3], n[4], n[5])
            }
            _ => geom::identity(),
        };

        let child_resources = match self.reader.deref(stream.dict.get(b"Resources"))?.as_dict() {
            Some(d) => d.clone(),
            None => resources.clone(),
        };

        let parent_ctm = stack.last().map(|s| s.ctm).unwrap_or_else(geom::identity);
        let child_ctm = xobject_matrix.then(&parent_ctm);
        let content = self.reader.decode_stream_bytes(ptr, stream)?;

        let mut child_stack = vec![GraphicsState::new(child_ctm)];
        self.execute(&content, &child_resources, &mut child_stack, depth + 1)
    }

    fn read_inline_image_dict(&mut self, lexer: &mut Lexer) -> Result<Dictionary> {
        let mut dict = Dictionary::new();
        loop {
            let key_token = lexer.next_token()?;
            match key_token {
                Token::Keyword(ref kw) if kw == "ID" => return Ok(dict),
                Token::Eof => return Ok(dict),
                Token::Name(key) => {
                    let value_token = lexer.next_token()?;
                    let operand = parse_operand(lexer, value_token)?;
                    dict.insert(key, operand_to_value(operand));
                }
                _ => {}
            }
        }
    }

    /// After `ID`, the raw image bytes run up to the next `EI` token that is
    /// both whitespace-preceded and whitespace/EOF-followed (specification
    /// §5 supplement: "scanning for `EI`... via the `/Length` key when
    /// present"). When the dict names an explicit length, skip straight to
    /// it rather than scanning, which is both faster and immune to a
    /// coincidental `EI` byte pair inside the binary payload.
    fn skip_inline_image_data(&self, content: &[u8], lexer: &mut Lexer, dict: &Dictionary) {
        let start = lexer.offset();
        let explicit_len = dict.get(b"L").as_i64().or_else(|| dict.get(b"Length").as_i64());
        if let Some(len) = explicit_len {
            let data_start = if content.get(start).copied().map(lexer::is_whitespace).unwrap_or(false) { start + 1 } else { start };
            let mut pos = data_start + len.max(0) as usize;
            while pos < content.len() && lexer::is_whitespace(content[pos]) {
                pos += 1;
            }
            if content.get(pos..pos + 2) == Some(b"EI") {
                lexer.seek(pos + 2);
                return;
            }
        }
        let mut i = start;
        while i + 1 < content.len() {
            if content[i] == b'E' && content[i + 1] == b'I' {
                let before_ws = i == 0 || lexer::is_whitespace(content[i - 1]);
                let after_ok = i + 2 >= content.len() || lexer::is_whitespace(content[i + 2]);
                if before_ws && after_ok {
                    lexer.seek(i + 2);
                    return;
                }
            }
            i += 1;
        }
        lexer.seek(content.len());
    }
}

/// Per-glyph emission and `Tm` advance (specification §4.5's glyph-emission
/// formula). A code equal to the single byte `0x20` is eligible for `Tw`
/// regardless of font kind, per ISO 32000-1 §9.3.3 ("word spacing... shall
/// be applied to every occurrence of the single-byte character code 32").
fn show_text(bytes: &[u8], state: &mut GraphicsState, runs: &mut Vec<GlyphRun>) {
    let font = match &state.text.font {
        Some(f) => f.clone(),
        None => return,
    };
    let font_id = state.text.font_id.unwrap_or_else(|| ObjectPtr::new(0, 0));
    let style = font.style();
    let vertical = font.vertical();

    for g in font.decode(bytes) {
        let (_, x, y, width_scale) = glyph::text_rendering_matrix(state.text.tfs, state.text.th, state.text.trise, &state.text.tm, &state.ctm);
        let width = (g.advance_per_thousand / 1000.0) * width_scale;
        runs.push(GlyphRun {
            font_id,
            font_size: state.text.tfs,
            x,
            y,
            width,
            text: g.text,
            vertical,
            style,
        });

        let word_space = if g.code == 0x20 { state.text.tw } else { 0.0 };
        let tx = ((g.advance_per_thousand / 1000.0) * state.text.tfs + state.text.tc + word_space) * state.text.th;
        state.text.tm = geom::matrix(1.0, 0.0, 0.0, 1.0, tx, 0.0).then(&state.text.tm);
    }
}

fn num(args: &[Operand], index: usize) -> Result<f64> {
    args.get(index).and_then(Operand::as_f64).ok_or_else(|| Error::unexpected(0, "expected numeric content-stream operand"))
}

fn read_matrix(args: &[Operand]) -> Result<Matrix> {
    if args.len() < 6 {
        return Err(Error::unexpected(0, "matrix operator needs 6 operands"));
    }
    let n: Vec<f64> = (0..6).map(|i| args[i].as_f64().unwrap_or(0.0)).collect();
    Ok(geom::matrix(n[0], n[1], n[2], n[3], n[4], n[5]))
}

fn parse_operand(lexer: &mut Lexer, head: Token) -> Result<Operand> {
    match head {
        Token::Integer(n) => Ok(Operand::Number(n as f64)),
        Token::Real(r) => Ok(Operand::Number(r)),
        Token::Name(n) => Ok(Operand::Name(n)),
        Token::StringLiteral(b) | Token::StringHex(b) => Ok(Operand::String(b)),
        Token::ArrayStart => {
            let mut items = Vec::new();
            loop {
                let t = lexer.next_token()?;
                if matches!(t, Token::ArrayEnd | Token::Eof) {
                    break;
                }
                items.push(parse_operand(lexer, t)?);
            }
            Ok(Operand::Array(items))
        }
        Token::DictStart => {
            let mut dict = Dictionary::new();
            loop {
                let key_token = lexer.next_token()?;
                if matches!(key_token, Token::DictEnd | Token::Eof) {
                    break;
                }
                let key = match key_token {
                    Token::Name(n) => n,
                    _ => continue,
                };
                let value_token = lexer.next_token()?;
                let value = parse_operand(lexer, value_token)?;
                dict.insert(key, operand_to_value(value));
            }
            Ok(Operand::Dict(dict))
        }
        // Keywords like `true`/`false`/`null` appear as BDC property-list
        // values; harmless to drop since this engine never inspects them.
        Token::Keyword(_) => Ok(Operand::Name(Vec::new())),
        other => Err(Error::unexpected(lexer.offset(), format!("unexpected content-stream operand {:?}", other))),
    }
}

fn operand_to_value(op: Operand) -> Value {
    match op {
        Operand::Number(n) if n.fract() == 0.0 && n.is_finite() => Value::Integer(n as i64),
        Operand::Number(n) => Value::Real(n),
        Operand::Name(n) => Value::Name(n),
        Operand::String(s) => Value::String(PdfString::literal(s)),
        Operand::Array(items) => Value::Array(items.into_iter().map(operand_to_value).collect()),
        Operand::Dict(d) => Value::Dictionary(d),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn minimal_pdf(content: &str) -> Vec<u8> {
        let mut out = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::new();
        let mut push_obj = |out: &mut Vec<u8>, text: String| {
            offsets.push(out.len());
            out.extend_from_slice(text.as_bytes());
        };
        push_obj(&mut out, "1 0 obj<</Type/Catalog/Pages 2 0 R>>endobj\n".to_string());
        push_obj(&mut out, "2 0 obj<</Type/Pages/Kids[3 0 R]/Count 1>>endobj\n".to_string());
        push_obj(
            &mut out,
            "3 0 obj<</Type/Page/Parent 2 0 R/MediaBox[0 0 200 200]/Resources<</Font<</F1 5 0 R>>>>/Contents 4 0 R>>endobj\n"
                .to_string(),
        );
        push_obj(&mut out, format!("4 0 obj<</Length {}>>stream\n{}\nendstream endobj\n", content.len(), content));
        push_obj(&mut out, "5 0 obj<</Type/Font/Subtype/Type1/BaseFont/Helvetica>>endobj\n".to_string());

        let mut xref_block = format!("xref\n0 {}\n0000000000 65535 f \n", offsets.len() + 1);
        for off in &offsets {
            xref_block.push_str(&format!("{:010} 00000 n \n", off));
        }
        let xref_offset = out.len();
        out.extend_from_slice(xref_block.as_bytes());
        out.extend_from_slice(format!("trailer\n<</Size {}/Root 1 0 R>>\nstartxref\n{}\n%%EOF", offsets.len() + 1, xref_offset).as_bytes());
        out
    }

    #[test]
    fn extracts_simple_show_text() {
        let pdf = minimal_pdf("BT /F1 12 Tf 50 700 Td (Hello) Tj ET");
        let reader = Reader::open(pdf, Config::default()).unwrap();
        let fonts = FontCache::new();
        let cancel = CancellationToken::new(1000);
        let runs = run_page(&reader, &fonts, &cancel, 1).unwrap();
        let text: String = runs.iter().map(|g| g.text.as_str()).collect();
        assert_eq!(text, "Hello");
        assert_eq!(runs[0].y, 700.0);
    }

    #[test]
    fn tj_array_applies_kerning_adjustment() {
        let pdf = minimal_pdf("BT /F1 12 Tf 0 0 Td [(A)-250(B)] TJ ET");
        let reader = Reader::open(pdf, Config::default()).unwrap();
        let fonts = FontCache::new();
        let cancel = CancellationToken::new(1000);
        let runs = run_page(&reader, &fonts, &cancel, 1).unwrap();
        assert_eq!(runs.len(), 2);
        assert!(runs[1].x > runs[0].x);
    }

    #[test]
    fn unbalanced_q_does_not_abort_stream() {
        let pdf = minimal_pdf("Q Q BT /F1 12 Tf 0 0 Td (X) Tj ET");
        let reader = Reader::open(pdf, Config::default()).unwrap();
        let fonts = FontCache::new();
        let cancel = CancellationToken::new(1000);
        let runs = run_page(&reader, &fonts, &cancel, 1).unwrap();
        assert_eq!(runs.len(), 1);
    }
}
