//! Image views, owned planes, captured frames and resampling.
//!
//! `ImageView` is a borrowed 2D view into a 1D buffer with an explicit stride.
//! The stride counts elements between the starts of consecutive rows, so a
//! stride larger than the width represents padded rows. ROI slices are zero-copy
//! views into the same backing slice and retain the original stride.
//!
//! `Frame` is the owned RGB buffer produced by capture backends; `Plane` is
//! an owned single-channel buffer (grayscale or one color channel).

use crate::util::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};

mod frame;
pub mod integral;
pub mod io;
pub mod resize;

pub use frame::{Frame, FrameSet, Plane};

/// Axis-aligned rectangle in pixel coordinates (screen or frame space).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    /// X coordinate of the top-left corner.
    pub x: i32,
    /// Y coordinate of the top-left corner.
    pub y: i32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Rect {
    /// Creates a rectangle.
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Returns true when both dimensions are positive.
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Exclusive right edge.
    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width as i32)
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height as i32)
    }

    /// Returns true if the point lies inside the rectangle.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    /// Center point, rounded toward the top-left.
    pub fn center(&self) -> (i32, i32) {
        (
            self.x + (self.width / 2) as i32,
            self.y + (self.height / 2) as i32,
        )
    }

    /// Intersection of two rectangles, `None` when they do not overlap.
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Rect::new(x0, y0, (x1 - x0) as u32, (y1 - y0) as u32))
    }

    /// Multiplies origin and size by `scale`.
    pub fn scaled(&self, scale: f32) -> Rect {
        Rect::new(
            (self.x as f32 * scale).round() as i32,
            (self.y as f32 * scale).round() as i32,
            ((self.width as f32 * scale).round() as u32).max(1),
            ((self.height as f32 * scale).round() as u32).max(1),
        )
    }
}

/// Borrowed 2D image view with an explicit stride.
#[derive(Copy, Clone)]
pub struct ImageView<'a, T> {
    data: &'a [T],
    width: usize,
    height: usize,
    stride: usize,
}

impl<'a, T> ImageView<'a, T> {
    /// Creates a contiguous view with `stride == width`.
    pub fn from_slice(data: &'a [T], width: usize, height: usize) -> EngineResult<Self> {
        Self::new(data, width, height, width)
    }

    /// Creates a view with an explicit stride.
    pub fn new(data: &'a [T], width: usize, height: usize, stride: usize) -> EngineResult<Self> {
        let needed = required_len(width, height, stride)?;
        if data.len() < needed {
            return Err(EngineError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            stride,
        })
    }

    /// Returns the image width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the image height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the stride in elements between row starts.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Returns the backing slice including any row padding.
    pub fn as_slice(&self) -> &'a [T] {
        self.data
    }

    /// Returns the element at `(x, y)` if it is within bounds.
    pub fn get(&self, x: usize, y: usize) -> Option<&'a T> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = y.checked_mul(self.stride)?.checked_add(x)?;
        self.data.get(idx)
    }

    /// Returns a contiguous slice for row `y` with length `width`.
    pub fn row(&self, y: usize) -> Option<&'a [T]> {
        if y >= self.height {
            return None;
        }
        let start = y.checked_mul(self.stride)?;
        let end = start.checked_add(self.width)?;
        self.data.get(start..end)
    }

    /// Returns a zero-copy ROI view into the same backing buffer.
    pub fn roi(
        &self,
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    ) -> EngineResult<ImageView<'a, T>> {
        if width == 0 || height == 0 {
            return Err(EngineError::InvalidDimensions { width, height });
        }
        let out_of_bounds = EngineError::RoiOutOfBounds {
            x,
            y,
            width,
            height,
            img_width: self.width,
            img_height: self.height,
        };
        let end_x = x.checked_add(width).ok_or(out_of_bounds.clone())?;
        let end_y = y.checked_add(height).ok_or(out_of_bounds.clone())?;
        if end_x > self.width || end_y > self.height {
            return Err(out_of_bounds);
        }

        let start = y
            .checked_mul(self.stride)
            .and_then(|v| v.checked_add(x))
            .ok_or(EngineError::InvalidDimensions {
                width: self.width,
                height: self.height,
            })?;
        let data = self.data.get(start..).ok_or(EngineError::BufferTooSmall {
            needed: start.saturating_add(1),
            got: self.data.len(),
        })?;

        ImageView::new(data, width, height, self.stride)
    }
}

pub(crate) fn required_len(width: usize, height: usize, stride: usize) -> EngineResult<usize> {
    if width == 0 || height == 0 {
        return Err(EngineError::InvalidDimensions { width, height });
    }
    if stride < width {
        return Err(EngineError::InvalidStride { width, stride });
    }
    (height - 1)
        .checked_mul(stride)
        .and_then(|v| v.checked_add(width))
        .ok_or(EngineError::InvalidDimensions { width, height })
}

#[cfg(test)]
mod tests {
    use super::{ImageView, Rect};
    use crate::util::EngineError;

    #[test]
    fn roi_shares_stride_with_parent() {
        let data: Vec<u8> = (0u8..16).collect();
        let view = ImageView::from_slice(&data, 4, 4).unwrap();
        let roi = view.roi(1, 1, 2, 2).unwrap();
        assert_eq!(roi.stride(), 4);
        assert_eq!(roi.row(0).unwrap(), &[5u8, 6u8]);
        assert_eq!(roi.row(1).unwrap(), &[9u8, 10u8]);
        assert!(roi.get(2, 0).is_none());
    }

    #[test]
    fn roi_rejects_out_of_bounds() {
        let data = [0u8; 16];
        let view = ImageView::from_slice(&data, 4, 4).unwrap();
        let err = view.roi(3, 3, 2, 2).err().unwrap();
        assert_eq!(
            err,
            EngineError::RoiOutOfBounds {
                x: 3,
                y: 3,
                width: 2,
                height: 2,
                img_width: 4,
                img_height: 4,
            }
        );
    }

    #[test]
    fn rect_intersection_and_center() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(5, 5, 10, 10);
        assert_eq!(a.intersect(&b), Some(Rect::new(5, 5, 5, 5)));
        assert_eq!(a.intersect(&Rect::new(10, 0, 5, 5)), None);
        assert_eq!(b.center(), (10, 10));
        assert!(a.contains(9, 9));
        assert!(!a.contains(10, 9));
    }
}
