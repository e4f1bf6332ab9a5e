//! Numeric helpers for scales and coordinates.

/// Rounds a scale factor to three decimals so equal sweeps deduplicate.
pub(crate) fn round_scale(scale: f32) -> f32 {
    (scale * 1000.0).round() / 1000.0
}

/// Scales a pixel length, never returning less than one pixel.
pub(crate) fn scaled_len(len: usize, scale: f32) -> usize {
    ((len as f32 * scale).round() as usize).max(1)
}

/// Converts seconds stored in configuration into a `Duration`.
///
/// Negative and non-finite inputs map to zero.
pub(crate) fn secs(value: f64) -> std::time::Duration {
    if value.is_finite() && value > 0.0 {
        std::time::Duration::from_secs_f64(value)
    } else {
        std::time::Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::{round_scale, scaled_len, secs};
    use std::time::Duration;

    #[test]
    fn round_scale_collapses_float_noise() {
        assert_eq!(round_scale(0.1 + 0.2), 0.3);
        assert_eq!(round_scale(1.0004), 1.0);
        assert_eq!(round_scale(0.9996), 1.0);
    }

    #[test]
    fn scaled_len_keeps_one_pixel() {
        assert_eq!(scaled_len(10, 0.5), 5);
        assert_eq!(scaled_len(3, 0.1), 1);
        assert_eq!(scaled_len(7, 1.5), 11);
    }

    #[test]
    fn secs_clamps_invalid_values() {
        assert_eq!(secs(-1.0), Duration::ZERO);
        assert_eq!(secs(f64::NAN), Duration::ZERO);
        assert_eq!(secs(1.5), Duration::from_millis(1500));
    }
}
