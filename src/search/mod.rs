//! Multi-scale template search over a captured frame.
//!
//! `MatchEngine` scores cache entries against one `FrameSet`. The last
//! successful scale of an entry is tried first; on a miss every other scale
//! is scored in parallel and the best one at or above the item threshold
//! wins. Kernel failures are logged and count as "no match".

use crate::bank::CacheEntry;
use crate::config::ItemPath;
use crate::image::{FrameSet, Rect};
use crate::kernel::rayon::ZnccRayon;
use crate::kernel::scalar::ZnccScalar;
use crate::kernel::Peak;
use crate::template::ScaledTemplate;
use crate::trace::trace_debug;
use crate::util::EngineResult;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub(crate) mod scan;

/// Which planes are correlated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Single grayscale pass.
    Gray,
    /// One joint pass over the three RGB planes.
    #[default]
    Color,
    /// Independent passes per channel, averaged per placement.
    StrictColor,
}

/// Matching parameters shared by every entry.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatchConfig {
    pub mode: MatchMode,
    /// Row-parallel kernels.
    pub parallel: bool,
    /// Windows with variance at or below this score zero.
    pub min_var_i: f32,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            mode: MatchMode::Color,
            parallel: true,
            min_var_i: 1e-8,
        }
    }
}

/// A match of one cache entry in the current frame.
#[derive(Clone, Debug)]
pub struct MatchResult {
    pub path: ItemPath,
    pub confidence: f32,
    /// Matched rectangle in frame coordinates.
    pub rect: Rect,
    /// Scale of the matching variant.
    pub scale: f32,
    pub template_index: usize,
    pub entry: Arc<CacheEntry>,
}

/// Scores templates against frames.
#[derive(Clone, Debug, Default)]
pub struct MatchEngine {
    cfg: MatchConfig,
}

impl MatchEngine {
    pub fn new(cfg: MatchConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &MatchConfig {
        &self.cfg
    }

    /// Best placement regardless of threshold.
    pub fn best_peak(
        &self,
        frames: &FrameSet,
        tpl: &ScaledTemplate,
        search: Option<Rect>,
    ) -> EngineResult<Option<Peak>> {
        if self.cfg.parallel {
            scan::score_template::<ZnccRayon>(frames, tpl, self.cfg.mode, search, self.cfg.min_var_i)
        } else {
            scan::score_template::<ZnccScalar>(frames, tpl, self.cfg.mode, search, self.cfg.min_var_i)
        }
    }

    /// Best placement if it reaches `threshold`.
    pub fn match_template(
        &self,
        frames: &FrameSet,
        tpl: &ScaledTemplate,
        threshold: f32,
        search: Option<Rect>,
    ) -> Option<Peak> {
        match self.best_peak(frames, tpl, search) {
            Ok(Some(peak)) if peak.score >= threshold => Some(peak),
            Ok(_) => None,
            Err(err) => {
                trace_debug!(
                    "template_scan_failed",
                    scale = tpl.scale(),
                    error = err.to_string().as_str()
                );
                None
            }
        }
    }

    /// Matches one entry across its scales. `base_scale` maps variable ROIs
    /// into frame coordinates.
    pub fn match_entry(
        &self,
        frames: &FrameSet,
        entry: &Arc<CacheEntry>,
        base_scale: f32,
    ) -> Option<MatchResult> {
        let templates = entry.templates();
        if templates.is_empty() {
            return None;
        }
        let threshold = entry.settings().threshold;
        let search = entry.settings().search_rect().map(|r| r.scaled(base_scale));

        let hint = entry.hints().last_index().min(templates.len() - 1);
        if let Some(peak) = self.match_template(frames, &templates[hint], threshold, search) {
            return Some(self.record(entry, hint, peak));
        }
        if templates.len() == 1 {
            return None;
        }

        let best = templates
            .par_iter()
            .enumerate()
            .filter(|(idx, _)| *idx != hint)
            .filter_map(|(idx, tpl)| {
                self.match_template(frames, tpl, threshold, search)
                    .map(|peak| (idx, peak))
            })
            .reduce_with(|a, b| {
                if b.1.score > a.1.score || (b.1.score == a.1.score && b.0 < a.0) {
                    b
                } else {
                    a
                }
            });
        best.map(|(idx, peak)| self.record(entry, idx, peak))
    }

    /// Matches entries in order and keeps the hits.
    pub fn match_entries<'a, I>(&self, frames: &FrameSet, entries: I, base_scale: f32) -> Vec<MatchResult>
    where
        I: IntoIterator<Item = &'a Arc<CacheEntry>>,
    {
        entries
            .into_iter()
            .filter_map(|entry| self.match_entry(frames, entry, base_scale))
            .collect()
    }

    fn record(&self, entry: &Arc<CacheEntry>, idx: usize, peak: Peak) -> MatchResult {
        let tpl = &entry.templates()[idx];
        entry.hints().record(idx, tpl.scale());
        MatchResult {
            path: entry.path().clone(),
            confidence: peak.score,
            rect: Rect::new(
                peak.x as i32,
                peak.y as i32,
                tpl.width() as u32,
                tpl.height() as u32,
            ),
            scale: tpl.scale(),
            template_index: idx,
            entry: Arc::clone(entry),
        }
    }
}
