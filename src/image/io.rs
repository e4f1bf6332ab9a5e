//! Convenience helpers for loading template bitmaps via the `image` crate.

use crate::image::Frame;
use crate::util::{EngineError, EngineResult};
use std::path::Path;

/// Loads an image from disk and converts it to an RGB frame.
pub fn load_rgb_image<P: AsRef<Path>>(path: P) -> EngineResult<Frame> {
    let path = path.as_ref();
    let img = image::open(path).map_err(|err| EngineError::ImageIo {
        path: path.display().to_string(),
        reason: err.to_string(),
    })?;
    Ok(Frame::from_rgb(img.to_rgb8()))
}

/// Decodes an in-memory PNG/JPEG/BMP into an RGB frame.
pub fn decode_rgb_image(bytes: &[u8]) -> EngineResult<Frame> {
    let img = image::load_from_memory(bytes).map_err(|err| EngineError::ImageIo {
        path: "<memory>".to_string(),
        reason: err.to_string(),
    })?;
    Ok(Frame::from_rgb(img.to_rgb8()))
}
