//! Dense scan of one scaled template over a frame, per match mode.

use crate::image::{FrameSet, Rect};
use crate::kernel::{Kernel, Peak, PlaneInput, ScanWindow, ScoreMap};
use crate::search::MatchMode;
use crate::template::{ChannelPlan, ScaledTemplate};
use crate::util::EngineResult;

/// Best placement of `tpl` inside `frames` (or inside `search`).
///
/// Returns `Ok(None)` when the template does not fit the search area.
pub(crate) fn score_template<K: Kernel>(
    frames: &FrameSet,
    tpl: &ScaledTemplate,
    mode: MatchMode,
    search: Option<Rect>,
    min_var_i: f32,
) -> EngineResult<Option<Peak>> {
    let Some(window) = ScanWindow::for_template(
        frames.width(),
        frames.height(),
        tpl.width(),
        tpl.height(),
        search,
    ) else {
        return Ok(None);
    };

    let map = match mode {
        MatchMode::Gray => {
            let input = PlaneInput {
                view: frames.gray().view(),
                integral: frames.gray_integral(),
            };
            K::zncc_map(&[input], tpl.gray_plan(), window, min_var_i)?
        }
        MatchMode::Color => {
            K::zncc_map(&channel_inputs(frames), tpl.color_plan(), window, min_var_i)?
        }
        MatchMode::StrictColor => {
            let inputs = channel_inputs(frames);
            let maps = tpl
                .channel_plans()
                .iter()
                .zip(inputs.iter())
                .map(|(plan, input)| match plan {
                    ChannelPlan::Textured(plan) => {
                        K::zncc_map(std::slice::from_ref(input), plan, window, min_var_i)
                    }
                    ChannelPlan::Flat { mean } => {
                        K::flat_map(input, *mean, tpl.width(), tpl.height(), window)
                    }
                })
                .collect::<EngineResult<Vec<ScoreMap>>>()?;
            ScoreMap::mean(&maps)?
        }
    };
    Ok(map.argmax())
}

fn channel_inputs(frames: &FrameSet) -> [PlaneInput<'_>; 3] {
    let planes = frames.channels();
    let integrals = frames.channel_integrals();
    [0, 1, 2].map(|c| PlaneInput {
        view: planes[c].view(),
        integral: &integrals[c],
    })
}
