//! The monitoring tick.
//!
//! One tick: pause and throttle checks, frame skipping, eco mode, capture,
//! downscale, stability sampling, quick timers, state dispatch, bookkeeping.
//! `tick` takes the clock as arguments so the whole pipeline can be driven
//! deterministically.

use crate::action::{ActionExecutor, Geometry};
use crate::bank::{CacheHandle, TemplateCache};
use crate::capture::CaptureManager;
use crate::config::{EngineSettings, ItemPath};
use crate::engine::arbiter::{Arbiter, OcrDispatch};
use crate::engine::context::{lock, Shared};
use crate::engine::ocr::{OcrEvaluator, OcrRequest};
use crate::engine::stability::StabilityGate;
use crate::engine::state::{StateKind, TickContext};
use crate::image::FrameSet;
use crate::lifecycle::LifecycleManager;
use crate::search::{MatchConfig, MatchEngine, MatchResult};
use crate::trace::{trace_debug, trace_event, trace_span, trace_warn};
use crate::util::math::secs;
use crate::worker::WorkerPool;
use chrono::NaiveTime;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Everything the scheduler owns while monitoring runs.
pub struct SchedulerParts {
    pub settings: EngineSettings,
    pub shared: Arc<Shared>,
    pub cache: Arc<CacheHandle>,
    pub capture: Arc<CaptureManager>,
    pub pool: Arc<WorkerPool>,
    pub executor: ActionExecutor,
    pub ocr: Option<Arc<dyn OcrEvaluator>>,
    pub lifecycle: Option<LifecycleManager>,
}

/// What one tick did.
#[derive(Clone, Debug, PartialEq)]
pub enum TickOutcome {
    /// Lifecycle recovery in progress.
    Paused,
    /// Inside a post-click cooldown.
    Throttled,
    /// Frame skipping or eco mode.
    Skipped,
    CaptureFailed,
    /// Too many capture failures; monitoring must stop.
    Halted(String),
    Ran {
        state: StateKind,
        clicked: Option<ItemPath>,
        /// Quick-timer clicks delivered this tick.
        quick_hits: usize,
    },
}

/// Tick driver; built on start and dropped on stop.
pub struct Scheduler {
    parts: SchedulerParts,
    matcher: MatchEngine,
    arbiter: Arbiter,
    stability: StabilityGate,
    timers: BTreeMap<String, Instant>,
    generation: Option<u64>,
    cooldown_until: Option<Instant>,
    frame_counter: u64,
    last_click_at: Instant,
    last_eco_check: Option<Instant>,
    capture_failures: u32,
}

impl Scheduler {
    pub fn new(parts: SchedulerParts, now: Instant) -> Self {
        let matcher = MatchEngine::new(MatchConfig {
            mode: parts.settings.match_mode,
            parallel: parts.settings.parallel,
            min_var_i: parts.settings.min_var_i,
        });
        let arbiter = Arbiter::new(parts.settings.ocr_rearm());
        let stability = StabilityGate::new(&parts.settings.stability);
        Self {
            parts,
            matcher,
            arbiter,
            stability,
            timers: BTreeMap::new(),
            generation: None,
            cooldown_until: None,
            frame_counter: 0,
            last_click_at: now,
            last_eco_check: None,
            capture_failures: 0,
        }
    }

    /// Hands the owned parts back.
    pub fn into_parts(self) -> SchedulerParts {
        self.parts
    }

    pub fn lifecycle(&self) -> Option<&LifecycleManager> {
        self.parts.lifecycle.as_ref()
    }

    pub fn lifecycle_mut(&mut self) -> Option<&mut LifecycleManager> {
        self.parts.lifecycle.as_mut()
    }

    /// Runtime wake times of timer-priority scopes.
    pub fn priority_timers(&self) -> &BTreeMap<String, Instant> {
        &self.timers
    }

    /// Ticks until `stop` is set or capture halts.
    pub fn run(&mut self, stop: &AtomicBool) {
        let _span = trace_span!("monitoring").entered();
        let interval = self.parts.settings.tick_interval();
        while !stop.load(Ordering::Acquire) {
            let started = Instant::now();
            let outcome = self.tick(started, chrono::Local::now().time());
            if let TickOutcome::Halted(_) = outcome {
                break;
            }
            let elapsed = started.elapsed();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }
        trace_event!("monitoring_stopped", clicks = lock(&self.parts.shared.stats).clicks);
    }

    fn sync_timers(&mut self, cache: &TemplateCache) {
        let generation = self.parts.cache.generation();
        if self.generation == Some(generation) {
            return;
        }
        self.generation = Some(generation);
        self.timers
            .retain(|scope, _| cache.priority_timers().contains_key(scope));
        for (scope, wake) in cache.priority_timers() {
            self.timers.entry(scope.clone()).or_insert(*wake);
        }
    }

    fn throttled(&mut self, now: Instant) -> Option<TickOutcome> {
        let shared = &self.parts.shared;
        let recovering = self
            .parts
            .lifecycle
            .as_ref()
            .is_some_and(|l| l.is_recovering());
        if shared.is_paused() || recovering {
            return Some(TickOutcome::Paused);
        }
        if self.cooldown_until.is_some_and(|until| now < until) {
            return Some(TickOutcome::Throttled);
        }
        self.frame_counter += 1;
        let skip = u64::from(self.parts.settings.skip_frames);
        if skip > 0 && (self.frame_counter - 1) % (skip + 1) != 0 {
            return Some(TickOutcome::Skipped);
        }
        let eco = &self.parts.settings.eco;
        if eco.enabled && now.saturating_duration_since(self.last_click_at) >= secs(eco.idle_after_secs) {
            let interval = secs(eco.interval_secs);
            if self
                .last_eco_check
                .is_some_and(|last| now.saturating_duration_since(last) < interval)
            {
                return Some(TickOutcome::Skipped);
            }
            self.last_eco_check = Some(now);
        }
        None
    }

    /// Runs one tick at `now` with wall-clock time `wall`.
    pub fn tick(&mut self, now: Instant, wall: NaiveTime) -> TickOutcome {
        if let Some(outcome) = self.throttled(now) {
            return outcome;
        }
        let shared = Arc::clone(&self.parts.shared);
        let area = shared.area();
        let window = area.and_then(|a| a.window);
        if let Some(lifecycle) = self.parts.lifecycle.as_mut() {
            lifecycle.bind(window);
        }

        let Some(frame) = self.parts.capture.capture_frame(area.map(|a| a.rect)) else {
            self.capture_failures += 1;
            let limit = self.parts.settings.capture.max_failures;
            if limit > 0 && self.capture_failures >= limit {
                let reason = format!("capture failed {} times in a row", self.capture_failures);
                trace_warn!("monitoring_halted", reason = reason.as_str());
                lock(&shared.stats).error = Some(reason.clone());
                return TickOutcome::Halted(reason);
            }
            return TickOutcome::CaptureFailed;
        };
        self.capture_failures = 0;

        let capture_scale = self.parts.settings.capture.scale;
        let frame = if (capture_scale - 1.0).abs() > f32::EPSILON {
            frame.resized(capture_scale)
        } else {
            frame
        };
        let frames = FrameSet::new(frame);
        let gating = self.parts.settings.stability.enabled;
        if gating {
            self.stability.sample(frames.frame());
        }
        let stable = !gating || self.stability.is_stable();

        let cache = self.parts.cache.snapshot();
        self.sync_timers(&cache);
        let geometry = Geometry {
            origin: area.map_or((0, 0), |a| (a.rect.x, a.rect.y)),
            capture_scale,
            window_scale: shared.window_scale(),
        };

        let hits = lock(&shared.quick_timers).poll(&frames, now);
        let mut quick_hits = 0;
        for hit in &hits {
            let point = geometry.to_screen(hit.point.0, hit.point.1);
            match self.parts.executor.click(point, hit.button, window) {
                Ok(()) => {
                    lock(&shared.quick_timers).remove(hit.slot);
                    quick_hits += 1;
                }
                Err(err) => {
                    trace_warn!(
                        "quick_timer_click_failed",
                        slot = hit.slot,
                        error = err.to_string().as_str()
                    );
                }
            }
        }
        if quick_hits > 0 {
            self.last_click_at = now;
        }

        let frame_arc = frames.shared();
        let capture_method = self.parts.capture.method();
        let build_request = |m: &MatchResult| OcrRequest {
            path: m.path.clone(),
            frame: Arc::clone(&frame_arc),
            origin: (m.rect.x, m.rect.y),
            condition: m.entry.settings().ocr.clone().unwrap_or_default(),
            item: m.entry.settings().clone(),
            scale: m.scale,
            capture_scale,
            window,
            capture_method: capture_method.clone(),
        };

        let mut state = lock(&shared.state);
        let before = state.kind();
        let step = {
            let mut ctx = TickContext {
                now,
                wall,
                frames: &frames,
                cache: &cache,
                matcher: &self.matcher,
                pool: &self.parts.pool,
                settings: &self.parts.settings,
                geometry,
                window,
                stable,
                arbiter: &mut self.arbiter,
                executor: &mut self.parts.executor,
                timers: &mut self.timers,
                ocr: Some(OcrDispatch {
                    pool: &self.parts.pool,
                    evaluator: self.parts.ocr.clone(),
                    request: &build_request,
                }),
            };
            state.handle(&mut ctx)
        };
        let transitioned = step.next.is_some();
        if let Some(next) = step.next {
            *state = next;
            self.arbiter.reset_detections();
            trace_debug!(
                "state_transition",
                from = format!("{before:?}").as_str(),
                to = format!("{:?}", state.kind()).as_str()
            );
        }
        let kind = state.kind();
        drop(state);

        if let Some(cooldown) = step.cooldown {
            self.cooldown_until = Some(now + cooldown);
        }
        if let Some(path) = &step.clicked {
            self.last_click_at = now;
            self.last_eco_check = None;
            let mut stats = lock(&shared.stats);
            stats.clicks += 1;
            stats.last_click = Some(path.clone());
        }
        if let Some(lifecycle) = self.parts.lifecycle.as_mut() {
            match &step.clicked {
                Some(path) => lifecycle.record_click(path, transitioned),
                None if transitioned => lifecycle.record_transition(),
                None => {}
            }
            lifecycle.poll(now);
        }

        TickOutcome::Ran {
            state: kind,
            clicked: step.clicked,
            quick_hits,
        }
    }
}
