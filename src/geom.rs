//! Matrix algebra for the content-stream interpreter (specification §4.5).
//!
//! The teacher crate already depends on `euclid` for its geometry; we keep
//! that dependency and use `euclid::Transform2D<f64>` (which stores the
//! implicit `[0 0 1]` homogeneous row the same way a PDF `cm` operand list
//! does) instead of hand-rolling a 3x3 matrix type.

pub struct PdfSpace;

pub type Matrix = euclid::Transform2D<f64, PdfSpace, PdfSpace>;
pub type Point = euclid::Point2D<f64, PdfSpace>;

/// Build the matrix PDF operators describe as `[a b c d e f]`, i.e.
/// ```text
/// | a b 0 |
/// | c d 0 |
/// | e f 1 |
/// ```
pub fn matrix(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Matrix {
    Matrix::new(a, b, c, d, e, f)
}

pub fn identity() -> Matrix {
    Matrix::identity()
}
