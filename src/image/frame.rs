use crate::image::integral::IntegralImage;
use crate::image::resize::resize_by;
use crate::image::{ImageView, Rect};
use crate::util::{EngineError, EngineResult};
use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};
use std::sync::{Arc, OnceLock};

/// Owned contiguous single-channel plane.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Plane {
    data: Vec<u8>,
    width: usize,
    height: usize,
}

impl Plane {
    /// Wraps a contiguous buffer of exactly `width * height` bytes.
    pub fn new(data: Vec<u8>, width: usize, height: usize) -> EngineResult<Self> {
        if width == 0 || height == 0 {
            return Err(EngineError::InvalidDimensions { width, height });
        }
        let needed = width
            .checked_mul(height)
            .ok_or(EngineError::InvalidDimensions { width, height })?;
        if data.len() != needed {
            return Err(EngineError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Converts an `image` grayscale buffer.
    pub fn from_gray(img: GrayImage) -> Self {
        let width = img.width() as usize;
        let height = img.height() as usize;
        Self {
            data: img.into_raw(),
            width,
            height,
        }
    }

    /// Returns a borrowed view of the plane.
    pub fn view(&self) -> ImageView<'_, u8> {
        ImageView {
            data: &self.data,
            width: self.width,
            height: self.height,
            stride: self.width,
        }
    }

    /// Returns the plane width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the plane height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the raw row-major bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Copies a sub-rectangle into a new plane.
    pub fn crop(&self, x: usize, y: usize, width: usize, height: usize) -> EngineResult<Plane> {
        let roi = self.view().roi(x, y, width, height)?;
        let mut data = Vec::with_capacity(width * height);
        for row in 0..height {
            if let Some(src) = roi.row(row) {
                data.extend_from_slice(src);
            }
        }
        Plane::new(data, width, height)
    }
}

/// Owned RGB frame as produced by a capture backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    img: RgbImage,
}

impl Frame {
    /// Wraps an interleaved RGB buffer of `width * height * 3` bytes.
    pub fn new(data: Vec<u8>, width: usize, height: usize) -> EngineResult<Self> {
        if width == 0 || height == 0 {
            return Err(EngineError::InvalidDimensions { width, height });
        }
        let needed = width * height * 3;
        let got = data.len();
        let img = RgbImage::from_raw(width as u32, height as u32, data)
            .ok_or(EngineError::BufferTooSmall { needed, got })?;
        Ok(Self { img })
    }

    /// Wraps an `image` RGB buffer.
    pub fn from_rgb(img: RgbImage) -> Self {
        Self { img }
    }

    /// Drops the alpha channel of an RGBA capture.
    pub fn from_rgba(img: RgbaImage) -> Self {
        Self {
            img: DynamicImage::ImageRgba8(img).to_rgb8(),
        }
    }

    /// Returns the frame width in pixels.
    pub fn width(&self) -> usize {
        self.img.width() as usize
    }

    /// Returns the frame height in pixels.
    pub fn height(&self) -> usize {
        self.img.height() as usize
    }

    /// Returns the underlying RGB buffer.
    pub fn rgb(&self) -> &RgbImage {
        &self.img
    }

    /// Full-frame rectangle at the origin.
    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.img.width(), self.img.height())
    }

    /// Luma conversion through the `image` crate.
    pub fn gray(&self) -> Plane {
        Plane::from_gray(image::imageops::grayscale(&self.img))
    }

    /// Splits the interleaved buffer into R, G and B planes.
    pub fn channels(&self) -> [Plane; 3] {
        let width = self.width();
        let height = self.height();
        let mut planes = [
            Vec::with_capacity(width * height),
            Vec::with_capacity(width * height),
            Vec::with_capacity(width * height),
        ];
        for px in self.img.pixels() {
            planes[0].push(px.0[0]);
            planes[1].push(px.0[1]);
            planes[2].push(px.0[2]);
        }
        planes.map(|data| Plane {
            data,
            width,
            height,
        })
    }

    /// Copies the part of `rect` that overlaps the frame.
    pub fn crop(&self, rect: Rect) -> Option<Frame> {
        let clipped = rect.intersect(&self.bounds())?;
        let sub = image::imageops::crop_imm(
            &self.img,
            clipped.x as u32,
            clipped.y as u32,
            clipped.width,
            clipped.height,
        )
        .to_image();
        Some(Frame { img: sub })
    }

    /// Uniformly rescales the frame (area averaging when shrinking).
    pub fn resized(&self, scale: f32) -> Frame {
        if (scale - 1.0).abs() < 1e-6 {
            return self.clone();
        }
        Frame {
            img: resize_by(&self.img, scale),
        }
    }
}

/// Per-tick view of one frame with lazily derived planes and integrals.
///
/// Derived data is computed at most once and shared by every template
/// evaluated against the frame, including parallel per-scale evaluations.
pub struct FrameSet {
    frame: Arc<Frame>,
    gray: OnceLock<Plane>,
    channels: OnceLock<[Plane; 3]>,
    gray_integral: OnceLock<IntegralImage>,
    channel_integrals: OnceLock<[IntegralImage; 3]>,
}

impl FrameSet {
    /// Wraps a captured frame.
    pub fn new(frame: Frame) -> Self {
        Self::from_shared(Arc::new(frame))
    }

    /// Wraps an already shared frame.
    pub fn from_shared(frame: Arc<Frame>) -> Self {
        Self {
            frame,
            gray: OnceLock::new(),
            channels: OnceLock::new(),
            gray_integral: OnceLock::new(),
            channel_integrals: OnceLock::new(),
        }
    }

    /// The color frame.
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Shared handle to the color frame (for OCR requests).
    pub fn shared(&self) -> Arc<Frame> {
        Arc::clone(&self.frame)
    }

    /// Frame width in pixels.
    pub fn width(&self) -> usize {
        self.frame.width()
    }

    /// Frame height in pixels.
    pub fn height(&self) -> usize {
        self.frame.height()
    }

    /// Grayscale plane.
    pub fn gray(&self) -> &Plane {
        self.gray.get_or_init(|| self.frame.gray())
    }

    /// R, G and B planes.
    pub fn channels(&self) -> &[Plane; 3] {
        self.channels.get_or_init(|| self.frame.channels())
    }

    /// Integral image of the grayscale plane.
    pub fn gray_integral(&self) -> &IntegralImage {
        self.gray_integral
            .get_or_init(|| IntegralImage::from_view(self.gray().view()))
    }

    /// Integral images of the R, G and B planes.
    pub fn channel_integrals(&self) -> &[IntegralImage; 3] {
        self.channel_integrals.get_or_init(|| {
            let [r, g, b] = self.channels();
            [
                IntegralImage::from_view(r.view()),
                IntegralImage::from_view(g.view()),
                IntegralImage::from_view(b.view()),
            ]
        })
    }
}
