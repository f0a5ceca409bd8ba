use thiserror::Error;

use crate::Color;

/// A coordinate outside the buffer was addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("pixel ({row}, {col}) is outside the {rows}x{cols} buffer")]
pub struct OutOfRange {
    pub row: usize,
    pub col: usize,
    pub rows: usize,
    pub cols: usize,
}

/// Row-major grid of colors with dimensions fixed at construction.
///
/// Every access is bounds-checked; out-of-range reads and writes fail with
/// [`OutOfRange`] rather than being clipped. Clipping is a drawing concern
/// and lives in [`Canvas`](crate::Canvas).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    rows: usize,
    cols: usize,
    pixels: Vec<Color>,
}

impl PixelBuffer {
    /// Create a black buffer of `rows × cols` pixels.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            pixels: vec![Color::BLACK; rows * cols],
        }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> Result<Color, OutOfRange> {
        let index = self.index(row, col)?;
        Ok(self.pixels[index])
    }

    pub fn set(&mut self, row: usize, col: usize, color: Color) -> Result<(), OutOfRange> {
        let index = self.index(row, col)?;
        self.pixels[index] = color;
        Ok(())
    }

    /// Set every pixel to `color`.
    pub fn fill(&mut self, color: Color) {
        self.pixels.fill(color);
    }

    fn index(&self, row: usize, col: usize) -> Result<usize, OutOfRange> {
        if row < self.rows && col < self.cols {
            Ok(row * self.cols + col)
        } else {
            Err(OutOfRange {
                row,
                col,
                rows: self.rows,
                cols: self.cols,
            })
        }
    }
}
