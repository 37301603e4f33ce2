//! Plain-text rendering walk (specification §4.7.3): newline when the
//! vertical gap to the previous glyph exceeds the line tolerance, a single
//! inferred space when the horizontal gap exceeds 30% of font size on the
//! same line, the glyph's decoded text otherwise.

use crate::content::glyph::GlyphRun;

use super::cluster::TextBlock;

/// Vertical gap, in user-space units, that starts a new line
/// (specification §4.7.3).
const LINE_TOLERANCE: f64 = 3.0;

/// Horizontal gap, as a fraction of font size, that infers a space
/// (specification §4.7.3).
const SPACE_GAP_FRACTION: f64 = 0.30;

/// Render blocks in the given order by walking each block's glyphs in
/// their original emission order (specification §5: "per-page glyph
/// emission is sequential within that page — operator order defines glyph
/// order"; layout only reorders at the block level).
pub fn render_plain_text(blocks: &[TextBlock], order: &[usize]) -> String {
    let glyphs = order.iter().flat_map(|&idx| blocks[idx].runs.iter());
    render_walk(glyphs)
}

/// Naive fallback when `smart_ordering` is off (specification §6): sort
/// glyphs top-to-bottom, left-to-right with no clustering at all.
pub fn render_naive(glyphs: &[GlyphRun]) -> String {
    let mut ordered: Vec<&GlyphRun> = glyphs.iter().collect();
    ordered.sort_by(|a, b| {
        b.y.partial_cmp(&a.y).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal))
    });
    render_walk(ordered.into_iter())
}

fn render_walk<'a>(glyphs: impl Iterator<Item = &'a GlyphRun>) -> String {
    let mut out = String::new();
    let mut prev: Option<&GlyphRun> = None;
    for run in glyphs {
        if let Some(p) = prev {
            if (p.y - run.y).abs() > LINE_TOLERANCE {
                out.push('\n');
            } else {
                let gap = run.x - (p.x + p.width);
                if gap > SPACE_GAP_FRACTION * run.font_size.max(1e-6) {
                    out.push(' ');
                }
            }
        }
        out.push_str(&run.text);
        prev = Some(run);
    }
    while out.ends_with('\n') {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::GlyphStyle;
    use crate::value::ObjectPtr;

    fn glyph(x: f64, y: f64, width: f64, text: &str) -> GlyphRun {
        GlyphRun {
            font_id: ObjectPtr::new(1, 0),
            font_size: 12.0,
            x,
            y,
            width,
            text: text.to_string(),
            vertical: false,
            style: GlyphStyle::default(),
        }
    }

    #[test]
    fn inserts_newline_on_large_vertical_gap() {
        let blocks = vec![
            TextBlock { runs: vec![glyph(0.0, 700.0, 6.0, "A")], min_x: 0.0, max_x: 6.0, min_y: 694.0, max_y: 706.0, avg_font_size: 12.0 },
            TextBlock { runs: vec![glyph(0.0, 680.0, 6.0, "B")], min_x: 0.0, max_x: 6.0, min_y: 674.0, max_y: 686.0, avg_font_size: 12.0 },
        ];
        let text = render_plain_text(&blocks, &[0, 1]);
        assert_eq!(text, "A\nB");
    }

    #[test]
    fn inserts_space_on_wide_horizontal_gap_same_line() {
        let blocks = vec![TextBlock {
            runs: vec![glyph(0.0, 700.0, 6.0, "A"), glyph(20.0, 700.0, 6.0, "B")],
            min_x: 0.0,
            max_x: 26.0,
            min_y: 694.0,
            max_y: 706.0,
            avg_font_size: 12.0,
        }];
        let text = render_plain_text(&blocks, &[0]);
        assert_eq!(text, "A B");
    }

    #[test]
    fn trims_trailing_newlines() {
        let blocks = vec![
            TextBlock { runs: vec![glyph(0.0, 700.0, 6.0, "A")], min_x: 0.0, max_x: 6.0, min_y: 694.0, max_y: 706.0, avg_font_size: 12.0 },
            TextBlock { runs: vec![glyph(0.0, 600.0, 6.0, "")], min_x: 0.0, max_x: 6.0, min_y: 594.0, max_y: 606.0, avg_font_size: 12.0 },
        ];
        let text = render_plain_text(&blocks, &[0, 1]);
        assert_eq!(text, "A");
    }
}
