//! Summed-area tables for constant-time window statistics.
//!
//! Each table stores `(width + 1) * (height + 1)` prefix sums with a zero
//! first row and column so a window sum needs four lookups and no branches.

use crate::image::ImageView;

/// Prefix sums of values and squared values for one `u8` plane.
#[derive(Clone, Debug)]
pub struct IntegralImage {
    width: usize,
    height: usize,
    sum: Vec<u64>,
    sum_sq: Vec<u64>,
}

impl IntegralImage {
    /// Builds the table from a plane view.
    pub fn from_view(view: ImageView<'_, u8>) -> Self {
        let width = view.width();
        let height = view.height();
        let stride = width + 1;
        let mut sum = vec![0u64; stride * (height + 1)];
        let mut sum_sq = vec![0u64; stride * (height + 1)];

        for y in 0..height {
            let row = match view.row(y) {
                Some(row) => row,
                None => break,
            };
            let mut row_sum = 0u64;
            let mut row_sq = 0u64;
            for (x, &value) in row.iter().enumerate() {
                let v = u64::from(value);
                row_sum += v;
                row_sq += v * v;
                let idx = (y + 1) * stride + (x + 1);
                sum[idx] = sum[idx - stride] + row_sum;
                sum_sq[idx] = sum_sq[idx - stride] + row_sq;
            }
        }

        Self {
            width,
            height,
            sum,
            sum_sq,
        }
    }

    /// Width of the source plane.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height of the source plane.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns `(Σv, Σv²)` over the window with top-left `(x, y)`.
    ///
    /// The caller guarantees the window lies inside the plane.
    #[inline]
    pub fn window(&self, x: usize, y: usize, width: usize, height: usize) -> (u64, u64) {
        let stride = self.width + 1;
        let a = y * stride + x;
        let b = a + width;
        let c = (y + height) * stride + x;
        let d = c + width;
        let s = self.sum[d] + self.sum[a] - self.sum[b] - self.sum[c];
        let q = self.sum_sq[d] + self.sum_sq[a] - self.sum_sq[b] - self.sum_sq[c];
        (s, q)
    }
}
