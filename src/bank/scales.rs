//! Scale sets for multi-scale matching.

use crate::config::ScaleSweep;
use crate::util::math::round_scale;
use crate::util::{EngineError, EngineResult};

/// Sorted, deduplicated template scales derived from the window and capture scales.
#[derive(Clone, Debug, PartialEq)]
pub struct ScaleSet {
    base: f32,
    capture: f32,
    scales: Vec<f32>,
}

impl ScaleSet {
    /// Composes `window_scale * capture_scale` with an optional multiplier sweep.
    ///
    /// The sweep covers `center - range ..= center + range` in `steps` evenly
    /// spaced multipliers. Results are rounded to three decimals, so nearby
    /// multipliers may collapse into one scale.
    pub fn compute(
        window_scale: f32,
        capture_scale: f32,
        sweep: Option<&ScaleSweep>,
    ) -> EngineResult<Self> {
        for value in [window_scale, capture_scale] {
            if !value.is_finite() || value <= 0.0 {
                return Err(EngineError::InvalidScale {
                    reason: "window and capture scales must be positive",
                });
            }
        }
        let base = window_scale * capture_scale;
        let multipliers: Vec<f32> = match sweep {
            Some(sweep) if sweep.steps > 1 => {
                let n = sweep.steps - 1;
                (0..=n)
                    .map(|i| sweep.center - sweep.range + 2.0 * sweep.range * i as f32 / n as f32)
                    .collect()
            }
            Some(sweep) => vec![sweep.center],
            None => vec![1.0],
        };
        let mut scales: Vec<f32> = multipliers
            .into_iter()
            .map(|m| round_scale(base * m))
            .filter(|s| s.is_finite() && *s > 0.0)
            .collect();
        scales.sort_by(|a, b| a.total_cmp(b));
        scales.dedup();
        if scales.is_empty() {
            return Err(EngineError::InvalidScale {
                reason: "scale sweep produced no positive scale",
            });
        }
        Ok(Self {
            base,
            capture: capture_scale,
            scales,
        })
    }

    /// Window scale times capture downscale; used for coordinate mapping.
    pub fn base(&self) -> f32 {
        self.base
    }

    /// Global capture downscale.
    pub fn capture(&self) -> f32 {
        self.capture
    }

    /// Scales in ascending order.
    pub fn scales(&self) -> &[f32] {
        &self.scales
    }

    pub fn len(&self) -> usize {
        self.scales.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scales.is_empty()
    }

    /// Index of the scale closest to the base scale.
    pub fn base_index(&self) -> usize {
        self.scales
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                (**a - self.base)
                    .abs()
                    .total_cmp(&(**b - self.base).abs())
            })
            .map(|(idx, _)| idx)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::ScaleSet;
    use crate::config::ScaleSweep;

    #[test]
    fn composes_window_capture_and_sweep() {
        let sweep = ScaleSweep {
            center: 1.0,
            range: 0.1,
            steps: 3,
        };
        let set = ScaleSet::compute(0.8, 0.5, Some(&sweep)).unwrap();
        assert_eq!(set.scales(), &[0.36, 0.4, 0.44]);
        assert_eq!(set.base_index(), 1);
        assert!((set.base() - 0.4).abs() < 1e-6);
    }

    #[test]
    fn rounding_deduplicates() {
        let sweep = ScaleSweep {
            center: 1.0,
            range: 0.0004,
            steps: 5,
        };
        let set = ScaleSet::compute(1.0, 1.0, Some(&sweep)).unwrap();
        assert_eq!(set.scales(), &[1.0]);
    }

    #[test]
    fn rejects_non_positive_inputs() {
        assert!(ScaleSet::compute(0.0, 1.0, None).is_err());
        assert!(ScaleSet::compute(1.0, f32::NAN, None).is_err());
        let sweep = ScaleSweep {
            center: 0.1,
            range: 0.5,
            steps: 2,
        };
        let set = ScaleSet::compute(1.0, 1.0, Some(&sweep)).unwrap();
        assert_eq!(set.scales(), &[0.6]);
    }
}
