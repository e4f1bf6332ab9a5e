//! Correlation kernels producing dense score maps.
//!
//! A kernel scores every placement of a template inside a `ScanWindow` and
//! returns a `ScoreMap`. Window statistics come from integral images so only
//! the cross term costs `O(template area)` per placement.

use crate::image::integral::IntegralImage;
use crate::image::{ImageView, Rect};
use crate::template::TemplatePlan;
use crate::util::{EngineError, EngineResult};

pub mod rayon;
pub mod scalar;

/// Best placement in a score map.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Peak {
    /// X coordinate (column) of the template's top-left corner.
    pub x: usize,
    /// Y coordinate (row) of the template's top-left corner.
    pub y: usize,
    /// Score at the peak.
    pub score: f32,
}

/// Inclusive range of top-left placements to evaluate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScanWindow {
    /// First column.
    pub x0: usize,
    /// First row.
    pub y0: usize,
    /// Last column (inclusive).
    pub x1: usize,
    /// Last row (inclusive).
    pub y1: usize,
}

impl ScanWindow {
    /// Placements of a `tpl_w x tpl_h` template inside the image or inside
    /// `search` (clipped to the image). `None` when the template does not fit.
    pub fn for_template(
        img_w: usize,
        img_h: usize,
        tpl_w: usize,
        tpl_h: usize,
        search: Option<Rect>,
    ) -> Option<Self> {
        let area = match search {
            Some(rect) => rect.intersect(&Rect::new(0, 0, img_w as u32, img_h as u32))?,
            None => Rect::new(0, 0, img_w as u32, img_h as u32),
        };
        let (ax, ay) = (area.x as usize, area.y as usize);
        let (aw, ah) = (area.width as usize, area.height as usize);
        if tpl_w == 0 || tpl_h == 0 || tpl_w > aw || tpl_h > ah {
            return None;
        }
        Some(Self {
            x0: ax,
            y0: ay,
            x1: ax + aw - tpl_w,
            y1: ay + ah - tpl_h,
        })
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.x1 - self.x0 + 1
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.y1 - self.y0 + 1
    }
}

/// One image plane with its integral table.
#[derive(Clone, Copy)]
pub struct PlaneInput<'a> {
    /// Pixel data.
    pub view: ImageView<'a, u8>,
    /// Prefix sums of the same plane.
    pub integral: &'a IntegralImage,
}

/// Dense scores for every placement of a scan window.
#[derive(Clone, Debug, PartialEq)]
pub struct ScoreMap {
    window: ScanWindow,
    scores: Vec<f32>,
}

impl ScoreMap {
    pub(crate) fn new(window: ScanWindow, scores: Vec<f32>) -> Self {
        Self { window, scores }
    }

    /// The window the scores cover.
    pub fn window(&self) -> ScanWindow {
        self.window
    }

    /// Row-major scores.
    pub fn scores(&self) -> &[f32] {
        &self.scores
    }

    /// Score for an absolute placement, if inside the window.
    pub fn at(&self, x: usize, y: usize) -> Option<f32> {
        let w = self.window;
        if x < w.x0 || x > w.x1 || y < w.y0 || y > w.y1 {
            return None;
        }
        self.scores
            .get((y - w.y0) * w.width() + (x - w.x0))
            .copied()
    }

    /// Highest finite score; ties go to the first placement in row-major order.
    pub fn argmax(&self) -> Option<Peak> {
        let width = self.window.width();
        let mut best: Option<(usize, f32)> = None;
        for (idx, &score) in self.scores.iter().enumerate() {
            if !score.is_finite() {
                continue;
            }
            if best.map_or(true, |(_, b)| score > b) {
                best = Some((idx, score));
            }
        }
        best.map(|(idx, score)| Peak {
            x: self.window.x0 + idx % width,
            y: self.window.y0 + idx / width,
            score,
        })
    }

    /// Per-placement arithmetic mean of maps over the same window.
    pub fn mean(maps: &[ScoreMap]) -> EngineResult<ScoreMap> {
        let first = maps.first().ok_or(EngineError::PlaneMismatch {
            template: 0,
            image: 0,
        })?;
        let mut acc = vec![0.0f32; first.scores.len()];
        for map in maps {
            if map.window != first.window {
                return Err(EngineError::InvalidDimensions {
                    width: map.window.width(),
                    height: map.window.height(),
                });
            }
            for (a, s) in acc.iter_mut().zip(map.scores.iter()) {
                *a += *s;
            }
        }
        let n = maps.len() as f32;
        acc.iter_mut().for_each(|a| *a /= n);
        Ok(ScoreMap::new(first.window, acc))
    }
}

/// Kernel trait for dense map evaluation.
pub trait Kernel {
    /// Zero-mean normalized cross-correlation over the planes of `plan`.
    fn zncc_map(
        inputs: &[PlaneInput<'_>],
        plan: &TemplatePlan,
        window: ScanWindow,
        min_var_i: f32,
    ) -> EngineResult<ScoreMap>;

    /// Mean-intensity similarity for a flat template channel.
    fn flat_map(
        input: &PlaneInput<'_>,
        mean: f32,
        tpl_w: usize,
        tpl_h: usize,
        window: ScanWindow,
    ) -> EngineResult<ScoreMap>;
}

fn check_inputs(
    inputs: &[PlaneInput<'_>],
    planes: usize,
    tpl_w: usize,
    tpl_h: usize,
    window: ScanWindow,
) -> EngineResult<()> {
    if inputs.len() != planes {
        return Err(EngineError::PlaneMismatch {
            template: planes,
            image: inputs.len(),
        });
    }
    for input in inputs {
        let img_w = input.view.width();
        let img_h = input.view.height();
        if window.x1 + tpl_w > img_w || window.y1 + tpl_h > img_h || window.x0 > window.x1 {
            return Err(EngineError::RoiOutOfBounds {
                x: window.x0,
                y: window.y0,
                width: tpl_w,
                height: tpl_h,
                img_width: img_w,
                img_height: img_h,
            });
        }
    }
    Ok(())
}

/// Scores one row of placements into `out` (length `window.width()`).
pub(crate) fn zncc_row(
    inputs: &[PlaneInput<'_>],
    plan: &TemplatePlan,
    window: ScanWindow,
    y: usize,
    min_var_i: f32,
    out: &mut [f32],
) {
    let tpl_w = plan.width();
    let tpl_h = plan.height();
    let n = (tpl_w * tpl_h) as f64;
    let var_t = f64::from(plan.var_t());

    for (i, x) in (window.x0..=window.x1).enumerate() {
        let mut dot = 0.0f32;
        let mut var_i = 0.0f64;
        for (p, input) in inputs.iter().enumerate() {
            let (sum, sum_sq) = input.integral.window(x, y, tpl_w, tpl_h);
            let sum = sum as f64;
            var_i += sum_sq as f64 - sum * sum / n;

            let t_prime = plan.plane_t_prime(p);
            let data = input.view.as_slice();
            let stride = input.view.stride();
            for ty in 0..tpl_h {
                let start = (y + ty) * stride + x;
                let img_row = &data[start..start + tpl_w];
                let tpl_row = &t_prime[ty * tpl_w..(ty + 1) * tpl_w];
                for (t, &v) in tpl_row.iter().zip(img_row.iter()) {
                    dot += t * f32::from(v);
                }
            }
        }

        out[i] = if var_i <= f64::from(min_var_i) {
            0.0
        } else {
            let score = f64::from(dot) / (var_t * var_i).sqrt();
            if score.is_finite() {
                score.clamp(-1.0, 1.0) as f32
            } else {
                0.0
            }
        };
    }
}

/// Scores one row of a flat channel: `1 - |window mean - template mean| / 255`.
pub(crate) fn flat_row(
    input: &PlaneInput<'_>,
    mean: f32,
    tpl_w: usize,
    tpl_h: usize,
    window: ScanWindow,
    y: usize,
    out: &mut [f32],
) {
    let n = (tpl_w * tpl_h) as f32;
    for (i, x) in (window.x0..=window.x1).enumerate() {
        let (sum, _) = input.integral.window(x, y, tpl_w, tpl_h);
        let window_mean = sum as f32 / n;
        out[i] = 1.0 - (window_mean - mean).abs() / 255.0;
    }
}

#[cfg(test)]
mod tests {
    use super::{ScanWindow, ScoreMap};
    use crate::image::Rect;

    #[test]
    fn scan_window_rejects_oversized_templates() {
        assert!(ScanWindow::for_template(10, 10, 11, 2, None).is_none());
        let w = ScanWindow::for_template(10, 8, 4, 3, None).unwrap();
        assert_eq!((w.x1, w.y1, w.width(), w.height()), (6, 5, 7, 6));
    }

    #[test]
    fn scan_window_respects_search_rect() {
        let w = ScanWindow::for_template(100, 100, 10, 10, Some(Rect::new(20, 30, 15, 12)))
            .unwrap();
        assert_eq!((w.x0, w.y0, w.x1, w.y1), (20, 30, 25, 32));
        assert!(
            ScanWindow::for_template(100, 100, 10, 10, Some(Rect::new(95, 95, 20, 20))).is_none()
        );
    }

    #[test]
    fn mean_and_argmax_combine_maps() {
        let window = ScanWindow {
            x0: 2,
            y0: 1,
            x1: 3,
            y1: 2,
        };
        let a = ScoreMap::new(window, vec![0.9, 0.1, 0.5, 0.5]);
        let b = ScoreMap::new(window, vec![0.1, 0.9, 0.5, 0.7]);
        let mean = ScoreMap::mean(&[a, b]).unwrap();
        let peak = mean.argmax().unwrap();
        assert_eq!((peak.x, peak.y), (3, 2));
        assert!((peak.score - 0.6).abs() < 1e-6);
        assert_eq!(mean.at(2, 1), Some(0.5));
        assert_eq!(mean.at(4, 1), None);
    }
}
