//! Reading-order reconstruction over clustered `TextBlock`s (specification
//! §4.7.2): group into horizontal bands, detect columns within each band,
//! concatenate left-to-right within a band and top-to-bottom across bands.

use super::cluster::TextBlock;

/// Band detection tolerance: a band absorbs a block whose vertical overlap
/// with the band's running Y-range is at least this value (specification
/// §4.7.2 step 1: "small gaps tolerated", given as `-10`).
const BAND_OVERLAP_TOLERANCE: f64 = -10.0;

/// Column-gap threshold as a fraction of page width (specification §4.7.2
/// step 3).
const COLUMN_GAP_FRACTION: f64 = 0.05;

fn overlap(min_a: f64, max_a: f64, min_b: f64, max_b: f64) -> f64 {
    max_a.min(max_b) - min_a.max(min_b)
}

/// Returns block indices in reading order.
pub fn reading_order(blocks: &[TextBlock], media_box: [f64; 4]) -> Vec<usize> {
    if blocks.is_empty() {
        return Vec::new();
    }
    let page_width = (media_box[2] - media_box[0]).abs().max(1.0);

    // Step 1/2: scan top-to-bottom (Y grows upward, so "top" is max_y) and
    // group into bands.
    let mut by_top: Vec<usize> = (0..blocks.len()).collect();
    by_top.sort_by(|&a, &b| blocks[b].max_y.partial_cmp(&blocks[a].max_y).unwrap_or(std::cmp::Ordering::Equal));

    let mut bands: Vec<Vec<usize>> = Vec::new();
    let mut band_ranges: Vec<(f64, f64)> = Vec::new();
    for idx in by_top {
        let blk = &blocks[idx];
        if let Some((bmin, bmax)) = band_ranges.last().copied() {
            if overlap(bmin, bmax, blk.min_y, blk.max_y) >= BAND_OVERLAP_TOLERANCE {
                bands.last_mut().unwrap().push(idx);
                let range = band_ranges.last_mut().unwrap();
                range.0 = range.0.min(blk.min_y);
                range.1 = range.1.max(blk.max_y);
                continue;
            }
        }
        bands.push(vec![idx]);
        band_ranges.push((blk.min_y, blk.max_y));
    }

    // Step 3/4: within each band, detect columns and concatenate
    // left-to-right; bands are already top-to-bottom.
    let mut order = Vec::with_capacity(blocks.len());
    for band in &bands {
        for column in detect_columns(band, blocks, page_width) {
            order.extend(column);
        }
    }
    order
}

struct Column {
    indices: Vec<usize>,
    avg_left: f64,
    avg_right: f64,
}

/// Specification §4.7.2 step 3: "new column starts when horizontal gap to
/// the previous block in the current column exceeds 5% of the page width
/// and there is no significant vertical overlap. A block otherwise joins
/// the existing column whose average left/right edges best align with it
/// (within the 5% threshold)."
fn detect_columns(band_indices: &[usize], blocks: &[TextBlock], page_width: f64) -> Vec<Vec<usize>> {
    let threshold = COLUMN_GAP_FRACTION * page_width;

    let mut sorted = band_indices.to_vec();
    sorted.sort_by(|&a, &b| blocks[a].min_x.partial_cmp(&blocks[b].min_x).unwrap_or(std::cmp::Ordering::Equal));

    let mut columns: Vec<Column> = Vec::new();
    for idx in sorted {
        let blk = &blocks[idx];
        let mut best: Option<(usize, f64)> = None;
        for (ci, col) in columns.iter().enumerate() {
            let align = (col.avg_left - blk.min_x).abs().min((col.avg_right - blk.max_x).abs());
            if align <= threshold && best.map(|(_, d)| align < d).unwrap_or(true) {
                best = Some((ci, align));
            }
        }
        match best {
            Some((ci, _)) => {
                let col = &mut columns[ci];
                let n = col.indices.len() as f64;
                col.avg_left = (col.avg_left * n + blk.min_x) / (n + 1.0);
                col.avg_right = (col.avg_right * n + blk.max_x) / (n + 1.0);
                col.indices.push(idx);
            }
            None => columns.push(Column { indices: vec![idx], avg_left: blk.min_x, avg_right: blk.max_x }),
        }
    }

    columns.sort_by(|a, b| a.avg_left.partial_cmp(&b.avg_left).unwrap_or(std::cmp::Ordering::Equal));
    columns
        .into_iter()
        .map(|mut col| {
            col.indices.sort_by(|&a, &b| blocks[b].max_y.partial_cmp(&blocks[a].max_y).unwrap_or(std::cmp::Ordering::Equal));
            col.indices
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::glyph::GlyphRun;
    use crate::font::GlyphStyle;
    use crate::value::ObjectPtr;

    fn block(x0: f64, x1: f64, y0: f64, y1: f64) -> TextBlock {
        let run = GlyphRun {
            font_id: ObjectPtr::new(1, 0),
            font_size: 12.0,
            x: x0,
            y: y1,
            width: x1 - x0,
            text: String::new(),
            vertical: false,
            style: GlyphStyle::default(),
        };
        TextBlock { runs: vec![run], min_x: x0, max_x: x1, min_y: y0, max_y: y1, avg_font_size: 12.0 }
    }

    #[test]
    fn two_column_layout_orders_left_column_before_right() {
        // Mirrors the spec.md §8 scenario: 20 glyphs at x∈[50,200] and 20
        // at x∈[400,550], same Y band.
        let blocks = vec![block(50.0, 200.0, 690.0, 702.0), block(400.0, 550.0, 690.0, 702.0)];
        let order = reading_order(&blocks, [0.0, 0.0, 612.0, 792.0]);
        assert_eq!(order, vec![0, 1]);
    }

    #[test]
    fn two_bands_order_top_band_first() {
        let top = block(50.0, 200.0, 700.0, 712.0);
        let bottom = block(50.0, 200.0, 300.0, 312.0);
        let blocks = vec![bottom, top];
        let order = reading_order(&blocks, [0.0, 0.0, 612.0, 792.0]);
        assert_eq!(order, vec![1, 0]);
    }
}
