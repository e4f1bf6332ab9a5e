//! Scalar reference kernel: rows evaluated sequentially.

use crate::kernel::{check_inputs, flat_row, zncc_row, Kernel, PlaneInput, ScanWindow, ScoreMap};
use crate::template::TemplatePlan;
use crate::util::EngineResult;

/// Sequential ZNCC kernel.
pub struct ZnccScalar;

impl Kernel for ZnccScalar {
    fn zncc_map(
        inputs: &[PlaneInput<'_>],
        plan: &TemplatePlan,
        window: ScanWindow,
        min_var_i: f32,
    ) -> EngineResult<ScoreMap> {
        check_inputs(inputs, plan.planes(), plan.width(), plan.height(), window)?;
        let width = window.width();
        let mut scores = vec![0.0f32; width * window.height()];
        for (row, out) in scores.chunks_mut(width).enumerate() {
            zncc_row(inputs, plan, window, window.y0 + row, min_var_i, out);
        }
        Ok(ScoreMap::new(window, scores))
    }

    fn flat_map(
        input: &PlaneInput<'_>,
        mean: f32,
        tpl_w: usize,
        tpl_h: usize,
        window: ScanWindow,
    ) -> EngineResult<ScoreMap> {
        check_inputs(std::slice::from_ref(input), 1, tpl_w, tpl_h, window)?;
        let width = window.width();
        let mut scores = vec![0.0f32; width * window.height()];
        for (row, out) in scores.chunks_mut(width).enumerate() {
            flat_row(input, mean, tpl_w, tpl_h, window, window.y0 + row, out);
        }
        Ok(ScoreMap::new(window, scores))
    }
}

#[cfg(test)]
mod tests {
    use super::ZnccScalar;
    use crate::image::integral::IntegralImage;
    use crate::image::ImageView;
    use crate::kernel::{Kernel, PlaneInput, ScanWindow};
    use crate::template::TemplatePlan;

    #[test]
    fn zncc_map_matches_bruteforce() {
        let img_width = 9;
        let img_height = 7;
        let image: Vec<u8> = (0..img_width * img_height)
            .map(|i| {
                let (x, y) = (i % img_width, i / img_width);
                ((x * 17 + y * 9 + x * y) & 0xFF) as u8
            })
            .collect();
        let tpl_width = 3;
        let tpl_height = 2;
        let tpl: Vec<u8> = (0..tpl_width * tpl_height)
            .map(|i| {
                let (x, y) = (i % tpl_width, i / tpl_width);
                ((x * 5 + y * 11 + x * y) & 0xFF) as u8
            })
            .collect();

        let view = ImageView::from_slice(&image, img_width, img_height).unwrap();
        let integral = IntegralImage::from_view(view);
        let plan =
            TemplatePlan::from_view(ImageView::from_slice(&tpl, tpl_width, tpl_height).unwrap())
                .unwrap();
        let window =
            ScanWindow::for_template(img_width, img_height, tpl_width, tpl_height, None).unwrap();
        let input = PlaneInput {
            view,
            integral: &integral,
        };
        let map = <ZnccScalar as Kernel>::zncc_map(&[input], &plan, window, 1e-8).unwrap();

        let t_prime = plan.t_prime();
        let var_t = f64::from(plan.var_t());
        let n = (tpl_width * tpl_height) as f64;
        for y in 0..=(img_height - tpl_height) {
            for x in 0..=(img_width - tpl_width) {
                let mut dot = 0.0f64;
                let mut sum_i = 0.0f64;
                let mut sum_i2 = 0.0f64;
                for ty in 0..tpl_height {
                    let row = view.row(y + ty).unwrap();
                    for tx in 0..tpl_width {
                        let value = f64::from(row[x + tx]);
                        dot += f64::from(t_prime[ty * tpl_width + tx]) * value;
                        sum_i += value;
                        sum_i2 += value * value;
                    }
                }
                let var_i = sum_i2 - sum_i * sum_i / n;
                let expected = if var_i <= 1e-8 {
                    0.0
                } else {
                    dot / (var_t * var_i).sqrt()
                };
                let got = f64::from(map.at(x, y).unwrap());
                assert!((got - expected).abs() < 1e-4, "({x},{y}): {got} vs {expected}");
            }
        }
    }
}
