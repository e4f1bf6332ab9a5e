//! Rayon-parallel kernel: rows of the score map evaluated concurrently.
//!
//! Scores are identical to the scalar kernel; only the row schedule differs.

use crate::kernel::{check_inputs, flat_row, zncc_row, Kernel, PlaneInput, ScanWindow, ScoreMap};
use crate::template::TemplatePlan;
use crate::util::EngineResult;
use rayon::prelude::*;

/// Row-parallel ZNCC kernel.
pub struct ZnccRayon;

impl Kernel for ZnccRayon {
    fn zncc_map(
        inputs: &[PlaneInput<'_>],
        plan: &TemplatePlan,
        window: ScanWindow,
        min_var_i: f32,
    ) -> EngineResult<ScoreMap> {
        check_inputs(inputs, plan.planes(), plan.width(), plan.height(), window)?;
        let width = window.width();
        let mut scores = vec![0.0f32; width * window.height()];
        scores
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(row, out)| zncc_row(inputs, plan, window, window.y0 + row, min_var_i, out));
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
        scores
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(row, out)| flat_row(input, mean, tpl_w, tpl_h, window, window.y0 + row, out));
        Ok(ScoreMap::new(window, scores))
    }
}
