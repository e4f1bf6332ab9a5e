//! Candidate arbitration: which match, if any, is clicked this tick.
//!
//! A detection must persist for the item's interval before it is eligible,
//! plus its debounce when the same item was the last one clicked. Eligible
//! candidates are ordered by interval, then confidence. OCR-conditioned
//! candidates need a passed verdict, and a pending verdict stops the tick so
//! lower-ranked candidates never jump the queue.

use crate::bank::TemplateCache;
use crate::config::ItemPath;
use crate::engine::ocr::{OcrEvaluator, OcrGate, OcrRequest, OcrStatus};
use crate::search::MatchResult;
use crate::trace::trace_debug;
use crate::util::math::secs;
use crate::worker::WorkerPool;
use chrono::NaiveTime;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Outcome of one arbitration pass.
#[derive(Clone, Debug)]
pub enum Verdict {
    /// Click this match.
    Click(MatchResult),
    /// The best candidate is ready but the screen is unstable.
    Hold(ItemPath),
    /// The best candidate waits for text recognition.
    AwaitingOcr(ItemPath),
    /// Nothing eligible.
    Idle,
}

/// OCR submission inputs for one tick.
pub struct OcrDispatch<'a> {
    pub pool: &'a WorkerPool,
    pub evaluator: Option<Arc<dyn OcrEvaluator>>,
    /// Builds the request for a match.
    pub request: &'a dyn Fn(&MatchResult) -> OcrRequest,
}

/// Per-tick inputs.
pub struct Environment<'a> {
    pub now: Instant,
    pub wall: NaiveTime,
    /// Result of the stability gate; `true` when gating is disabled.
    pub stable: bool,
    pub ocr: Option<&'a OcrDispatch<'a>>,
}

/// Detection timers, cooldowns and click history.
#[derive(Debug)]
pub struct Arbiter {
    first_seen: HashMap<ItemPath, Instant>,
    last_click: Option<(ItemPath, Instant)>,
    cooldowns: HashMap<String, Instant>,
    ocr: OcrGate,
    ocr_rearm: Duration,
}

impl Arbiter {
    pub fn new(ocr_rearm: Duration) -> Self {
        Self {
            first_seen: HashMap::new(),
            last_click: None,
            cooldowns: HashMap::new(),
            ocr: OcrGate::default(),
            ocr_rearm,
        }
    }

    /// Records first-observed times for `matches` and forgets every other path.
    pub fn observe(&mut self, matches: &[MatchResult], now: Instant) {
        self.first_seen
            .retain(|path, _| matches.iter().any(|m| &m.path == path));
        for m in matches {
            self.first_seen.entry(m.path.clone()).or_insert(now);
        }
    }

    /// When `path` was first seen in the current detection.
    pub fn first_seen(&self, path: &ItemPath) -> Option<Instant> {
        self.first_seen.get(path).copied()
    }

    pub fn last_click(&self) -> Option<&(ItemPath, Instant)> {
        self.last_click.as_ref()
    }

    /// True while `scope` is in a folder cooldown.
    pub fn in_cooldown(&self, scope: &str, now: Instant) -> bool {
        self.cooldowns.get(scope).is_some_and(|until| now < *until)
    }

    /// Clears detection timers and cached verdicts (state transitions).
    pub fn reset_detections(&mut self) {
        self.first_seen.clear();
        self.ocr.reset();
    }

    fn required(&self, m: &MatchResult) -> Duration {
        let interval = m.entry.interval();
        match &self.last_click {
            Some((path, _)) if path == &m.path => {
                interval + secs(m.entry.settings().debounce_secs)
            }
            _ => interval,
        }
    }

    fn eligible(&mut self, m: &MatchResult, env: &Environment<'_>) -> bool {
        if self.in_cooldown(&m.entry.folder().scope, env.now) {
            return false;
        }
        if let Some(timer) = &m.entry.settings().timer {
            if !timer.is_open(env.wall) {
                return false;
            }
        }
        if self.ocr.is_rearming(&m.path, env.now) {
            return false;
        }
        let Some(first) = self.first_seen(&m.path) else {
            return false;
        };
        env.now.saturating_duration_since(first) >= self.required(m)
    }

    /// Observes `matches` and picks the candidate to click.
    pub fn select(&mut self, matches: &[MatchResult], env: &Environment<'_>) -> Verdict {
        self.observe(matches, env.now);
        let mut candidates: Vec<&MatchResult> = Vec::new();
        for m in matches {
            if self.eligible(m, env) {
                candidates.push(m);
            }
        }
        candidates.sort_by(|a, b| {
            a.entry
                .interval()
                .cmp(&b.entry.interval())
                .then_with(|| {
                    b.confidence
                        .partial_cmp(&a.confidence)
                        .unwrap_or(Ordering::Equal)
                })
                .then_with(|| a.entry.order().cmp(&b.entry.order()))
        });

        for candidate in candidates {
            if candidate.entry.settings().ocr.is_some() {
                match self.ocr_status(candidate, env) {
                    OcrStatus::Pending => {
                        return Verdict::AwaitingOcr(candidate.path.clone());
                    }
                    OcrStatus::Failed => {
                        trace_debug!("ocr_rejected", path = candidate.path.as_str());
                        self.first_seen.remove(&candidate.path);
                        self.ocr.fail(&candidate.path, env.now, self.ocr_rearm);
                        continue;
                    }
                    OcrStatus::Passed => {}
                }
            }
            if !env.stable {
                trace_debug!("click_held", path = candidate.path.as_str(), reason = "unstable");
                return Verdict::Hold(candidate.path.clone());
            }
            return Verdict::Click(candidate.clone());
        }
        Verdict::Idle
    }

    fn ocr_status(&mut self, candidate: &MatchResult, env: &Environment<'_>) -> OcrStatus {
        let Some(detection) = self.first_seen(&candidate.path) else {
            return OcrStatus::Failed;
        };
        if let Some(status) = self.ocr.status(&candidate.path, detection) {
            return status;
        }
        match env.ocr {
            Some(OcrDispatch {
                pool,
                evaluator: Some(evaluator),
                request,
            }) => {
                self.ocr
                    .submit(pool, Arc::clone(evaluator), request(candidate), detection);
                OcrStatus::Pending
            }
            _ => {
                trace_debug!("ocr_unavailable", path = candidate.path.as_str());
                self.ocr.settle(&candidate.path, detection, false);
                OcrStatus::Failed
            }
        }
    }

    /// Bookkeeping after a delivered click.
    pub fn record_click(&mut self, result: &MatchResult, cache: &TemplateCache, now: Instant) {
        self.last_click = Some((result.path.clone(), now));
        self.first_seen.remove(&result.path);
        self.ocr.clear(&result.path);
        let scope = &result.entry.folder().scope;
        if let Some(schedule) = cache.folder(scope) {
            if schedule.mode == crate::config::FolderMode::Cooldown && !schedule.cooldown.is_zero() {
                self.cooldowns.insert(scope.clone(), now + schedule.cooldown);
                let siblings: Vec<&ItemPath> = cache
                    .primary()
                    .iter()
                    .chain(cache.backup().iter())
                    .filter(|entry| &entry.folder().scope == scope)
                    .map(|entry| entry.path())
                    .collect();
                self.first_seen.retain(|path, _| !siblings.contains(&path));
            }
        }
    }
}
