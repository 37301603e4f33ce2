//! Glyph clustering into `TextBlock`s (specification §4.7.1).
//!
//! Two paths, chosen by glyph count: a quadratic pairwise merge for small
//! pages (`n < 50`), and a spatial-grid + parallel edge-discovery +
//! union-find pipeline for everything else. Grounded in the teacher's
//! `rayon`-chunked-iterator idiom (`victor/src/layout/mod.rs`'s
//! `child_boxes.par_iter()...enumerate_rayon` shape), generalized here from
//! layout-box children to glyph indices.

use std::collections::HashMap;

use rayon::prelude::*;

use crate::cancel::CancellationToken;
use crate::content::glyph::GlyphRun;
use crate::error::Result;

/// A cluster of glyphs that belong to the same visual line/paragraph
/// fragment (specification §3: "TextBlock").
#[derive(Debug, Clone)]
pub struct TextBlock {
    pub runs: Vec<GlyphRun>,
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
    pub avg_font_size: f64,
}

impl TextBlock {
    fn from_glyph(g: GlyphRun) -> Self {
        let (min_x, max_x, min_y, max_y) = glyph_bbox(&g);
        let avg_font_size = g.font_size;
        TextBlock { runs: vec![g], min_x, max_x, min_y, max_y, avg_font_size }
    }

    fn merge(mut self, other: TextBlock) -> TextBlock {
        let n_self = self.runs.len() as f64;
        let n_other = other.runs.len() as f64;
        self.avg_font_size = (self.avg_font_size * n_self + other.avg_font_size * n_other) / (n_self + n_other);
        self.min_x = self.min_x.min(other.min_x);
        self.max_x = self.max_x.max(other.max_x);
        self.min_y = self.min_y.min(other.min_y);
        self.max_y = self.max_y.max(other.max_y);
        self.runs.extend(other.runs);
        self
    }

    fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

/// Glyphs carry a point origin, not a box; approximate a bounding box from
/// the font size (ascent/descent are not modeled anywhere upstream of this
/// layer, so this is the closest proxy available without a font-metrics
/// table, which spec.md §1 explicitly places out of scope for this core).
fn glyph_bbox(g: &GlyphRun) -> (f64, f64, f64, f64) {
    let half = g.font_size * 0.5;
    (g.x, g.x + g.width.max(0.0), g.y - half, g.y + half)
}

fn overlap(min_a: f64, max_a: f64, min_b: f64, max_b: f64) -> f64 {
    max_a.min(max_b) - min_a.max(min_b)
}

fn gap(min_a: f64, max_a: f64, min_b: f64, max_b: f64) -> f64 {
    -overlap(min_a, max_a, min_b, max_b)
}

/// `shouldMerge(a, b, eps)` (specification §4.7.1). The two branches decide
/// whether a merge is *eligible*; the trailing column/image-gap rejections
/// then veto it regardless of which branch accepted.
fn should_merge(a: &TextBlock, b: &TextBlock, eps: f64) -> bool {
    let avg_font = (a.avg_font_size + b.avg_font_size) / 2.0;
    let v_overlap = overlap(a.min_y, a.max_y, b.min_y, b.max_y);
    let h_overlap = overlap(a.min_x, a.max_x, b.min_x, b.max_x);
    let h_gap = gap(a.min_x, a.max_x, b.min_x, b.max_x);
    let v_gap = gap(a.min_y, a.max_y, b.min_y, b.max_y);

    let narrower_width = a.width().min(b.width()).max(1e-6);

    let eligible = if v_overlap > 0.3 * avg_font {
        h_gap < eps
    } else if h_overlap > 0.6 * narrower_width {
        v_gap < 1.5 * eps
    } else {
        false
    };
    if !eligible {
        return false;
    }

    // Distinct columns: horizontal separation more than double the
    // vertical separation.
    if h_gap > 0.0 && h_gap > 2.0 * v_gap.max(0.0) {
        return false;
    }

    // Image-separated: the gap dwarfs the blocks being considered.
    let avg_block_size = (a.width() + a.height() + b.width() + b.height()) / 4.0;
    let gap_magnitude = h_gap.max(v_gap).max(0.0);
    if gap_magnitude > 2.0 * avg_block_size.max(eps) {
        return false;
    }

    true
}

/// Union-find with path compression and union-by-rank (specification
/// §4.7.1 step 3, and the "Union-find" law in §8: `find(i) == find(j) ⟺ i
/// and j are in the same cluster`).
pub struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    pub fn new(n: usize) -> Self {
        UnionFind { parent: (0..n).collect(), rank: vec![0; n] }
    }

    pub fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            let root = self.find(self.parent[x]);
            self.parent[x] = root;
        }
        self.parent[x]
    }

    pub fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return;
        }
        if self.rank[ra] < self.rank[rb] {
            self.parent[ra] = rb;
        } else if self.rank[ra] > self.rank[rb] {
            self.parent[rb] = ra;
        } else {
            self.parent[rb] = ra;
            self.rank[ra] += 1;
        }
    }
}

/// Small-page path: repeatedly scan every pair of blocks, merging the
/// first eligible pair found, until a full pass makes no merge
/// (specification §4.7.1: "a fixed point").
pub fn pairwise_merge(glyphs: &[GlyphRun]) -> Vec<TextBlock> {
    let eps = 2.0 * average_font_size(glyphs);
    let mut blocks: Vec<TextBlock> = glyphs.iter().cloned().map(TextBlock::from_glyph).collect();

    loop {
        let mut merged_any = false;
        let mut i = 0;
        'outer: while i < blocks.len() {
            let mut j = i + 1;
            while j < blocks.len() {
                if should_merge(&blocks[i], &blocks[j], eps) {
                    let other = blocks.remove(j);
                    let merged = blocks.remove(i).merge(other);
                    blocks.insert(i, merged);
                    merged_any = true;
                    continue 'outer;
                }
                j += 1;
            }
            i += 1;
        }
        if !merged_any {
            break;
        }
    }
    blocks
}

/// Uniform spatial grid over glyph origins, cell size `2*eps`
/// (specification §4.7.1 step 1).
struct Grid {
    cell: f64,
    buckets: HashMap<(i64, i64), Vec<usize>>,
}

impl Grid {
    fn build(glyphs: &[GlyphRun], cell: f64) -> Self {
        let cell = cell.max(1e-6);
        let mut buckets: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
        for (i, g) in glyphs.iter().enumerate() {
            buckets.entry(cell_of(g.x, g.y, cell)).or_default().push(i);
        }
        Grid { cell, buckets }
    }

    /// All glyph indices in the 3x3 neighbourhood of `(x, y)`.
    fn neighbors(&self, x: f64, y: f64) -> Vec<usize> {
        let (cx, cy) = cell_of(x, y, self.cell);
        let mut out = Vec::new();
        for dx in -1..=1 {
            for dy in -1..=1 {
                if let Some(bucket) = self.buckets.get(&(cx + dx, cy + dy)) {
                    out.extend_from_slice(bucket);
                }
            }
        }
        out
    }
}

fn cell_of(x: f64, y: f64, cell: f64) -> (i64, i64) {
    ((x / cell).floor() as i64, (y / cell).floor() as i64)
}

fn average_font_size(glyphs: &[GlyphRun]) -> f64 {
    if glyphs.is_empty() {
        return 1.0;
    }
    let sum: f64 = glyphs.iter().map(|g| g.font_size).sum();
    (sum / glyphs.len() as f64).max(1e-3)
}

/// Large-page path (specification §4.7.1 steps 1-4): grid + parallel edge
/// discovery + sequential union-find + grouping.
pub fn grid_parallel_merge(glyphs: &[GlyphRun], cancel: &CancellationToken) -> Result<Vec<TextBlock>> {
    let avg_font_size = average_font_size(glyphs);
    let eps = 2.0 * avg_font_size;
    let grid = Grid::build(glyphs, 2.0 * eps);
    cancel.check()?;

    let singletons: Vec<TextBlock> = glyphs.iter().cloned().map(TextBlock::from_glyph).collect();

    let num_chunks = rayon::current_num_threads().min(16).max(1);
    let n = glyphs.len();
    let chunk_size = (n + num_chunks - 1) / num_chunks.max(1);
    let chunk_size = chunk_size.max(1);

    // Each worker appends edges to its own buffer (specification §9:
    // "avoid per-thread synchronisation by having each worker append edges
    // to a private buffer; the only join point is the sequential
    // union-find merge"); `flat_map` + `collect` is that join point.
    let edges: Vec<(usize, usize)> = (0..num_chunks)
        .into_par_iter()
        .flat_map(|chunk| {
            let start = chunk * chunk_size;
            let end = (start + chunk_size).min(n);
            let mut local = Vec::new();
            for i in start..end {
                let gi = &glyphs[i];
                for j in grid.neighbors(gi.x, gi.y) {
                    if j > i && should_merge(&singletons[i], &singletons[j], eps) {
                        local.push((i, j));
                    }
                }
            }
            local
        })
        .collect();
    cancel.check()?;

    let mut uf = UnionFind::new(n);
    for (a, b) in edges {
        uf.union(a, b);
    }
    cancel.check()?;

    let mut groups: HashMap<usize, TextBlock> = HashMap::new();
    for (i, block) in singletons.into_iter().enumerate() {
        let root = uf.find(i);
        match groups.remove(&root) {
            Some(existing) => {
                groups.insert(root, existing.merge(block));
            }
            None => {
                groups.insert(root, block);
            }
        }
    }
    Ok(groups.into_values().collect())
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
    fn union_find_equivalence_law() {
        let mut uf = UnionFind::new(5);
        uf.union(0, 1);
        uf.union(1, 2);
        uf.union(3, 4);
        assert_eq!(uf.find(0), uf.find(2));
        assert_ne!(uf.find(0), uf.find(3));
        assert_eq!(uf.find(3), uf.find(4));
    }

    #[test]
    fn pairwise_merge_joins_adjacent_glyphs_on_one_line() {
        let glyphs = vec![glyph(0.0, 100.0, "H"), glyph(7.0, 100.0, "i")];
        let blocks = pairwise_merge(&glyphs);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].runs.len(), 2);
    }

    #[test]
    fn pairwise_merge_keeps_distant_columns_separate() {
        let glyphs = vec![glyph(0.0, 100.0, "A"), glyph(400.0, 100.0, "B")];
        let blocks = pairwise_merge(&glyphs);
        assert_eq!(blocks.len(), 2);
    }

    #[test]
    fn grid_parallel_merge_matches_pairwise_for_a_single_line() {
        let glyphs: Vec<GlyphRun> = (0..80).map(|i| glyph(i as f64 * 6.0, 200.0, "x")).collect();
        let cancel = CancellationToken::new(10_000);
        let blocks = grid_parallel_merge(&glyphs, &cancel).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].runs.len(), 80);
    }
}
