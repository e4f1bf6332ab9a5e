//! Template plan precomputation for zero-mean normalized correlation.

use crate::image::ImageView;
use crate::util::{EngineError, EngineResult};

/// Variance below which a template plane is treated as flat.
pub(crate) const FLAT_VARIANCE: f32 = 1e-6;

/// Precomputed statistics and zero-mean buffers for one or more planes.
///
/// Each plane is centered on its own mean, so a multi-plane plan correlates
/// color templates jointly while staying invariant to per-channel offsets.
#[derive(Clone, Debug, PartialEq)]
pub struct TemplatePlan {
    width: usize,
    height: usize,
    means: Vec<f32>,
    t_prime: Vec<f32>,
    var_t: f32,
}

impl TemplatePlan {
    /// Builds a single-plane plan.
    pub fn from_view(tpl: ImageView<'_, u8>) -> EngineResult<Self> {
        Self::from_planes(&[tpl])
    }

    /// Builds a joint plan over planes of identical size.
    pub fn from_planes(planes: &[ImageView<'_, u8>]) -> EngineResult<Self> {
        let first = planes.first().ok_or(EngineError::PlaneMismatch {
            template: 0,
            image: 0,
        })?;
        let width = first.width();
        let height = first.height();
        let count = width * height;

        let mut means = Vec::with_capacity(planes.len());
        let mut t_prime = Vec::with_capacity(count * planes.len());
        let mut var_t = 0.0f64;
        for plane in planes {
            if plane.width() != width || plane.height() != height {
                return Err(EngineError::InvalidDimensions {
                    width: plane.width(),
                    height: plane.height(),
                });
            }
            let mut sum = 0.0f64;
            for y in 0..height {
                if let Some(row) = plane.row(y) {
                    sum += row.iter().map(|&v| f64::from(v)).sum::<f64>();
                }
            }
            let mean = sum / count as f64;
            for y in 0..height {
                if let Some(row) = plane.row(y) {
                    for &value in row {
                        let d = f64::from(value) - mean;
                        var_t += d * d;
                        t_prime.push(d as f32);
                    }
                }
            }
            means.push(mean as f32);
        }

        if (var_t as f32) <= FLAT_VARIANCE {
            return Err(EngineError::DegenerateTemplate {
                reason: "zero variance",
            });
        }

        Ok(Self {
            width,
            height,
            means,
            t_prime,
            var_t: var_t as f32,
        })
    }

    /// Returns the template width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the template height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of planes correlated jointly.
    pub fn planes(&self) -> usize {
        self.means.len()
    }

    /// Per-plane mean intensity.
    pub fn means(&self) -> &[f32] {
        &self.means
    }

    /// Sum of squared deviations over all planes.
    pub fn var_t(&self) -> f32 {
        self.var_t
    }

    /// Zero-mean samples, plane-major then row-major.
    pub fn t_prime(&self) -> &[f32] {
        &self.t_prime
    }

    /// Zero-mean samples of one plane.
    pub fn plane_t_prime(&self, plane: usize) -> &[f32] {
        let len = self.width * self.height;
        &self.t_prime[plane * len..(plane + 1) * len]
    }
}

/// Strict-color plan for a single channel.
///
/// A flat channel (for example the blue channel of a pure red button) has no
/// correlation structure, so it is compared by mean intensity instead.
#[derive(Clone, Debug, PartialEq)]
pub enum ChannelPlan {
    /// Channel with texture: correlated with ZNCC.
    Textured(TemplatePlan),
    /// Channel without texture: scored by mean intensity distance.
    Flat {
        /// Mean channel intensity.
        mean: f32,
    },
}

impl ChannelPlan {
    /// Builds the plan for one channel plane.
    pub fn from_view(plane: ImageView<'_, u8>) -> Self {
        match TemplatePlan::from_view(plane) {
            Ok(plan) => ChannelPlan::Textured(plan),
            Err(_) => {
                let mut sum = 0.0f64;
                for y in 0..plane.height() {
                    if let Some(row) = plane.row(y) {
                        sum += row.iter().map(|&v| f64::from(v)).sum::<f64>();
                    }
                }
                let mean = sum / (plane.width() * plane.height()) as f64;
                ChannelPlan::Flat { mean: mean as f32 }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ChannelPlan, TemplatePlan};
    use crate::image::ImageView;
    use crate::util::EngineError;

    #[test]
    fn plan_matches_known_stats() {
        let data = [0u8, 1, 2, 3];
        let view = ImageView::from_slice(&data, 2, 2).unwrap();
        let plan = TemplatePlan::from_view(view).unwrap();
        assert_eq!(plan.planes(), 1);
        assert!((plan.means()[0] - 1.5).abs() < 1e-6);
        assert!((plan.var_t() - 5.0).abs() < 1e-6);
        let expected = [-1.5f32, -0.5, 0.5, 1.5];
        for (value, expected) in plan.t_prime().iter().zip(expected.iter()) {
            assert!((value - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn plan_rejects_flat_templates() {
        let data = [7u8; 9];
        let view = ImageView::from_slice(&data, 3, 3).unwrap();
        assert_eq!(
            TemplatePlan::from_view(view).err().unwrap(),
            EngineError::DegenerateTemplate {
                reason: "zero variance"
            }
        );
        assert_eq!(ChannelPlan::from_view(view), ChannelPlan::Flat { mean: 7.0 });
    }

    #[test]
    fn joint_plan_centers_each_plane() {
        let a = [10u8, 20, 30, 40];
        let b = [200u8, 200, 200, 204];
        let va = ImageView::from_slice(&a, 2, 2).unwrap();
        let vb = ImageView::from_slice(&b, 2, 2).unwrap();
        let plan = TemplatePlan::from_planes(&[va, vb]).unwrap();
        assert_eq!(plan.planes(), 2);
        assert!((plan.means()[1] - 201.0).abs() < 1e-6);
        let sum_b: f32 = plan.plane_t_prime(1).iter().sum();
        assert!(sum_b.abs() < 1e-5);
    }
}
