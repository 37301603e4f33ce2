//! Positioned glyph emission (specification §4.5, §3 "GlyphRun").

use crate::font::GlyphStyle;
use crate::geom::{self, Matrix, Point};
use crate::value::ObjectPtr;

/// One decoded glyph, positioned in default user space after CTM
/// application (Y grows upward, matching PDF's own coordinate space).
#[derive(Debug, Clone, PartialEq)]
pub struct GlyphRun {
    pub font_id: ObjectPtr,
    pub font_size: f64,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub text: String,
    pub vertical: bool,
    pub style: GlyphStyle,
}

/// `Trm = [[Tfs·Th,0,0],[0,Tfs,0],[0,Trise,1]] · Tm · CTM` (specification
/// §4.5). Returns `(x, y, width_scale)` where `width_scale` is `Trm[0][0]`,
/// the factor a glyph's thousandths-of-an-em advance is scaled by to reach
/// user-space width.
pub fn text_rendering_matrix(tfs: f64, th: f64, trise: f64, tm: &Matrix, ctm: &Matrix) -> (Matrix, f64, f64, f64) {
    let scale = geom::matrix(tfs * th, 0.0, 0.0, tfs, 0.0, trise);
    let trm = scale.then(tm).then(ctm);
    let origin = trm.transform_point(Point::new(0.0, 0.0));
    (trm, origin.x, origin.y, trm.m11)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_ctm_and_tm_places_origin_at_tx_rise() {
        let tm = geom::matrix(1.0, 0.0, 0.0, 1.0, 50.0, 700.0);
        let ctm = geom::identity();
        let (_, x, y, width_scale) = text_rendering_matrix(12.0, 1.0, 0.0, &tm, &ctm);
        assert_eq!((x, y), (50.0, 700.0));
        assert_eq!(width_scale, 12.0);
    }
}
