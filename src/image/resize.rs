//! Scale-aware resampling for templates and captured frames.
//!
//! Shrinking uses area averaging: every destination pixel is the
//! coverage-weighted mean of the source pixels its footprint overlaps, the
//! fractional generalization of a box filter. Enlarging uses bilinear
//! interpolation from the `image` crate. Mixed resizes (one axis up, one
//! down) also use bilinear.

use crate::util::math::scaled_len;
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Pixel};

/// Destination size for a uniform scale, at least one pixel per axis.
pub fn scaled_dims(width: usize, height: usize, scale: f32) -> (usize, usize) {
    (scaled_len(width, scale), scaled_len(height, scale))
}

/// Resizes an 8-bit image buffer to `width` x `height`.
pub fn resize_to<P>(
    src: &ImageBuffer<P, Vec<u8>>,
    width: u32,
    height: u32,
) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    let (src_w, src_h) = src.dimensions();
    if (src_w, src_h) == (width, height) {
        return src.clone();
    }
    if width <= src_w && height <= src_h {
        let channels = usize::from(P::CHANNEL_COUNT);
        let data = area_resize(
            src.as_raw(),
            src_w as usize,
            src_h as usize,
            channels,
            width as usize,
            height as usize,
        );
        if let Some(out) = ImageBuffer::from_raw(width, height, data) {
            return out;
        }
    }
    imageops::resize(src, width, height, FilterType::Triangle)
}

/// Resizes by a uniform scale factor.
pub fn resize_by<P>(src: &ImageBuffer<P, Vec<u8>>, scale: f32) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    let (w, h) = scaled_dims(src.width() as usize, src.height() as usize, scale);
    resize_to(src, w as u32, h as u32)
}

/// Per-axis footprint: source index and coverage weight for each output pixel.
fn footprints(src_len: usize, dst_len: usize) -> Vec<Vec<(usize, f32)>> {
    let ratio = src_len as f64 / dst_len as f64;
    (0..dst_len)
        .map(|d| {
            let f0 = d as f64 * ratio;
            let f1 = ((d + 1) as f64 * ratio).min(src_len as f64);
            let first = f0.floor() as usize;
            let last = (f1.ceil() as usize).min(src_len);
            (first..last)
                .filter_map(|s| {
                    let w = (f1.min((s + 1) as f64) - f0.max(s as f64)) / ratio;
                    (w > 1e-9).then_some((s, w as f32))
                })
                .collect()
        })
        .collect()
}

fn area_resize(
    src: &[u8],
    src_w: usize,
    src_h: usize,
    channels: usize,
    dst_w: usize,
    dst_h: usize,
) -> Vec<u8> {
    let xs = footprints(src_w, dst_w);
    let ys = footprints(src_h, dst_h);
    let mut out = vec![0u8; dst_w * dst_h * channels];
    let mut acc = vec![0f32; channels];

    for (dy, y_taps) in ys.iter().enumerate() {
        for (dx, x_taps) in xs.iter().enumerate() {
            acc.iter_mut().for_each(|a| *a = 0.0);
            for &(sy, wy) in y_taps {
                let row = sy * src_w * channels;
                for &(sx, wx) in x_taps {
                    let w = wx * wy;
                    let base = row + sx * channels;
                    for (c, a) in acc.iter_mut().enumerate() {
                        *a += w * f32::from(src[base + c]);
                    }
                }
            }
            let base = (dy * dst_w + dx) * channels;
            for (c, a) in acc.iter().enumerate() {
                out[base + c] = a.round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    out
}
