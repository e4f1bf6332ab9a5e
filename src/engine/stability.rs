//! Screen-stability gate over perceptual hashes.
//!
//! A gradient hash of a fixed corner crop is taken every tick. The screen is
//! stable when the last three hashes are available and the oldest and newest
//! differ by at most `threshold` bits.

use crate::config::StabilitySettings;
use crate::image::{Frame, Rect};
use image::DynamicImage;
use image_hasher::{HashAlg, Hasher, HasherConfig, ImageHash};
use std::collections::VecDeque;

const HISTORY: usize = 3;

pub struct StabilityGate {
    hasher: Hasher,
    history: VecDeque<ImageHash>,
    threshold: u32,
    crop: u32,
}

impl StabilityGate {
    pub fn new(settings: &StabilitySettings) -> Self {
        let hasher = HasherConfig::new()
            .hash_alg(HashAlg::Gradient)
            .hash_size(8, 8)
            .to_hasher();
        Self {
            hasher,
            history: VecDeque::with_capacity(HISTORY),
            threshold: settings.threshold,
            crop: settings.crop_size.max(8),
        }
    }

    /// Hashes the top-left corner of `frame` into the history.
    pub fn sample(&mut self, frame: &Frame) {
        let Some(corner) = frame.crop(Rect::new(0, 0, self.crop, self.crop)) else {
            return;
        };
        let hash = self
            .hasher
            .hash_image(&DynamicImage::ImageRgb8(corner.rgb().clone()));
        if self.history.len() == HISTORY {
            self.history.pop_front();
        }
        self.history.push_back(hash);
    }

    pub fn is_stable(&self) -> bool {
        match (self.history.front(), self.history.back()) {
            (Some(oldest), Some(newest)) if self.history.len() == HISTORY => {
                oldest.dist(newest) <= self.threshold
            }
            _ => false,
        }
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }
}

impl std::fmt::Debug for StabilityGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StabilityGate")
            .field("samples", &self.history.len())
            .field("threshold", &self.threshold)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::StabilityGate;
    use crate::config::StabilitySettings;
    use crate::image::Frame;

    fn frame(seed: usize) -> Frame {
        let (w, h) = (32, 32);
        let data = (0..w * h * 3)
            .map(|i| {
                let p = i / 3;
                let (x, y) = (p % w, p / w);
                (((x * 13) ^ (y * 7) ^ (x * y * seed)) & 0xFF) as u8
            })
            .collect();
        Frame::new(data, w, h).unwrap()
    }

    #[test]
    fn needs_full_history() {
        let settings = StabilitySettings {
            enabled: true,
            threshold: 0,
            crop_size: 32,
        };
        let mut gate = StabilityGate::new(&settings);
        let still = frame(1);
        gate.sample(&still);
        gate.sample(&still);
        assert!(!gate.is_stable());
        gate.sample(&still);
        assert!(gate.is_stable());
        gate.reset();
        assert!(!gate.is_stable());
    }
}
