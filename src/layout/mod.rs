//! Layout reconstruction (specification §4.7, layer L7): cluster positioned
//! glyph runs into blocks, derive a reading order over the (possibly
//! multi-column) page, and render plain text with inferred whitespace and
//! line breaks.

pub mod cluster;
pub mod order;
pub mod render;

use crate::cancel::CancellationToken;
use crate::content::glyph::GlyphRun;
use crate::error::Result;

pub use cluster::TextBlock;

/// Small-page threshold below which the quadratic pairwise merge is used
/// instead of the grid + parallel path (specification §4.7.1: "For n < 50
/// glyphs...").
const SMALL_PAGE_GLYPH_THRESHOLD: usize = 50;

/// Cluster a page's glyphs into `TextBlock`s, picking the small-n or
/// grid+parallel path per specification §4.7.1.
pub fn build_blocks(glyphs: &[GlyphRun], cancel: &CancellationToken) -> Result<Vec<TextBlock>> {
    if glyphs.len() < SMALL_PAGE_GLYPH_THRESHOLD {
        Ok(cluster::pairwise_merge(glyphs))
    } else {
        cluster::grid_parallel_merge(glyphs, cancel)
    }
}

/// Full L7 pipeline for one page: cluster, order, render. When
/// `smart_ordering` is false, falls back to a naive top-down/left-right
/// walk with no clustering at all (specification §6's `smart_ordering`
/// knob).
pub fn extract_text(glyphs: &[GlyphRun], media_box: [f64; 4], smart_ordering: bool, cancel: &CancellationToken) -> Result<String> {
    if glyphs.is_empty() {
        return Ok(String::new());
    }
    if !smart_ordering {
        return Ok(render::render_naive(glyphs));
    }

    let blocks = build_blocks(glyphs, cancel)?;
    cancel.check()?;
    let order = order::reading_order(&blocks, media_box);
    cancel.check()?;
    Ok(render::render_plain_text(&blocks, &order))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::GlyphStyle;
    use crate::value::ObjectPtr;

    fn glyph(x: f64, y: f64, text: &str) -> GlyphRun {
        GlyphRun {
            font_id: ObjectPtr::new(1, 0),
            font_size: 12.0,
            x,
            y,
            width: 6.0,
            text: text.to_string(),
            vertical: false,
            style: GlyphStyle::default(),
        }
    }

    #[test]
    fn empty_page_yields_empty_string_not_error() {
        let cancel = CancellationToken::new(1000);
        let text = extract_text(&[], [0.0, 0.0, 612.0, 792.0], true, &cancel).unwrap();
        assert_eq!(text, "");
    }

    #[test]
    fn two_column_smart_ordering_reads_left_column_first() {
        let mut glyphs = Vec::new();
        for i in 0..20 {
            let y = 700.0 - i as f64 * 10.0;
            glyphs.push(glyph(50.0 + (i % 5) as f64 * 6.0, y, "L"));
        }
        for i in 0..20 {
            let y = 700.0 - i as f64 * 10.0;
            glyphs.push(glyph(400.0 + (i % 5) as f64 * 6.0, y, "R"));
        }
        let cancel = CancellationToken::new(1000);
        let text = extract_text(&glyphs, [0.0, 0.0, 612.0, 792.0], true, &cancel).unwrap();
        let first_r = text.find('R');
        let last_l = text.rfind('L');
        assert!(first_r.is_some() && last_l.is_some());
        assert!(last_l.unwrap() < first_r.unwrap());
    }

    #[test]
    fn naive_ordering_skips_clustering() {
        let glyphs = vec![glyph(400.0, 700.0, "R"), glyph(50.0, 700.0, "L")];
        let cancel = CancellationToken::new(1000);
        let text = extract_text(&glyphs, [0.0, 0.0, 612.0, 792.0], false, &cancel).unwrap();
        assert_eq!(text, "LR");
    }
}
