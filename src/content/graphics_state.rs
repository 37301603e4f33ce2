//! Graphics and text state for the content-stream interpreter
//! (specification §4.5: "a graphics state with a text sub-state").

use std::sync::Arc;

use crate::font::Font;
use crate::geom::{self, Matrix};
use crate::value::ObjectPtr;

/// Render-mode values from the `Tr` operator (ISO 32000-1 Table 106); mode
/// 3 is "invisible text", the mechanism OCR-overlay PDFs use to lay a
/// searchable text layer over a scanned page image. Extraction still emits
/// invisible glyphs — invisibility is a rendering instruction, and hiding
/// exactly the text an OCR layer exists to expose would defeat the point.
pub const RENDER_MODE_INVISIBLE: i64 = 3;

#[derive(Clone)]
pub struct TextState {
    pub tc: f64,
    pub tw: f64,
    /// `Th`, the horizontal scaling operand already divided by 100
    /// (`Tz` sets it as a percentage; `Th` in the spec's formula is the
    /// 0..n scale factor).
    pub th: f64,
    pub tl: f64,
    pub tfs: f64,
    pub trise: f64,
    pub render_mode: i64,
    pub font: Option<Arc<Font>>,
    pub font_id: Option<ObjectPtr>,
    pub tm: Matrix,
    pub tlm: Matrix,
}

impl Default for TextState {
    fn default() -> Self {
        TextState {
            tc: 0.0,
            tw: 0.0,
            th: 1.0,
            tl: 0.0,
            tfs: 0.0,
            trise: 0.0,
            render_mode: 0,
            font: None,
            font_id: None,
            tm: geom::identity(),
            tlm: geom::identity(),
        }
    }
}

/// The portion of the graphics state `q`/`Q` saves and restores
/// (specification §4.5). Colour/line state is parsed and discarded per
/// §4.5's "non-text operators... must not abort the stream"; only the CTM
/// and text state matter to glyph positioning.
#[derive(Clone)]
pub struct GraphicsState {
    pub ctm: Matrix,
    pub text: TextState,
}

impl GraphicsState {
    pub fn new(ctm: Matrix) -> Self {
        GraphicsState { ctm, text: TextState::default() }
    }
}
