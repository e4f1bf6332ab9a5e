//! Idle / Priority / Countdown state machine.
//!
//! Each state matches the candidates it is responsible for, hands them to the
//! arbiter and reports a click or a transition. The scheduler applies the
//! transition and clears detection timers on every change of state.

use crate::action::{resolve_click, ActionExecutor, Geometry, MouseButton, WindowHandle};
use crate::bank::{CacheEntry, TemplateCache};
use crate::config::{EngineSettings, FolderMode, ItemPath};
use crate::engine::arbiter::{Arbiter, Environment, OcrDispatch, Verdict};
use crate::image::FrameSet;
use crate::search::{MatchEngine, MatchResult};
use crate::trace::{trace_debug, trace_event, trace_warn};
use crate::util::math::secs;
use crate::worker::WorkerPool;
use chrono::NaiveTime;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Discriminant of `MonitoringState`, for status reporting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateKind {
    #[default]
    Idle,
    Priority,
    Countdown,
}

/// What gates a priority episode.
#[derive(Clone, Debug, PartialEq)]
pub enum PriorityMode {
    /// Ends at `deadline`; the folder's wake time is rescheduled afterwards.
    Timer { deadline: Instant },
    /// Ends once every listed item was clicked.
    Image { remaining: Vec<ItemPath> },
    /// Clicks the scope's items in order.
    Sequence { step: usize, next_at: Instant },
}

/// The live monitoring state.
#[derive(Clone, Debug, Default)]
pub enum MonitoringState {
    #[default]
    Idle,
    Priority {
        scope: String,
        mode: PriorityMode,
        last_activity: Instant,
    },
    Countdown {
        entry: Arc<CacheEntry>,
        deadline: Instant,
    },
}

/// Inputs and effects of one state step.
pub struct TickContext<'a> {
    pub now: Instant,
    pub wall: NaiveTime,
    pub frames: &'a FrameSet,
    pub cache: &'a TemplateCache,
    pub matcher: &'a MatchEngine,
    pub pool: &'a WorkerPool,
    pub settings: &'a EngineSettings,
    pub geometry: Geometry,
    pub window: Option<WindowHandle>,
    pub stable: bool,
    pub arbiter: &'a mut Arbiter,
    pub executor: &'a mut ActionExecutor,
    pub timers: &'a mut BTreeMap<String, Instant>,
    pub ocr: Option<OcrDispatch<'a>>,
}

impl TickContext<'_> {
    /// Matches `entries` on the worker pool.
    fn find<'e, I>(&self, entries: I) -> Vec<MatchResult>
    where
        I: IntoIterator<Item = &'e Arc<CacheEntry>>,
    {
        let entries: Vec<&Arc<CacheEntry>> = entries.into_iter().collect();
        let (matcher, frames, base) = (self.matcher, self.frames, self.geometry.base());
        self.pool
            .install(|| matcher.match_entries(frames, entries, base))
    }

    fn arbitrate(&mut self, matches: &[MatchResult]) -> Verdict {
        let env = Environment {
            now: self.now,
            wall: self.wall,
            stable: self.stable,
            ocr: self.ocr.as_ref(),
        };
        self.arbiter.select(matches, &env)
    }

    /// Resolves and delivers a click; records it with the arbiter on success.
    fn click(&mut self, result: &MatchResult) -> bool {
        let mut rng = rand::rng();
        let Some(point) = resolve_click(result, &self.geometry, &mut rng) else {
            trace_warn!("click_unresolved", path = result.path.as_str());
            return false;
        };
        let button = MouseButton::for_settings(result.entry.settings());
        match self.executor.click(point, button, self.window) {
            Ok(()) => {
                self.arbiter.record_click(result, self.cache, self.now);
                true
            }
            Err(err) => {
                trace_warn!(
                    "click_failed",
                    path = result.path.as_str(),
                    error = err.to_string().as_str()
                );
                false
            }
        }
    }
}

/// Outcome of one state step.
#[derive(Debug, Default)]
pub struct StepResult {
    pub next: Option<MonitoringState>,
    pub clicked: Option<ItemPath>,
    /// Scheduler throttle to apply.
    pub cooldown: Option<Duration>,
}

impl StepResult {
    fn stay() -> Self {
        Self::default()
    }

    fn to(next: MonitoringState) -> Self {
        Self {
            next: Some(next),
            ..Self::default()
        }
    }

    fn clicked(path: ItemPath) -> Self {
        Self {
            clicked: Some(path),
            ..Self::default()
        }
    }
}

impl MonitoringState {
    pub fn kind(&self) -> StateKind {
        match self {
            MonitoringState::Idle => StateKind::Idle,
            MonitoringState::Priority { .. } => StateKind::Priority,
            MonitoringState::Countdown { .. } => StateKind::Countdown,
        }
    }

    /// Runs one step.
    pub fn handle(&mut self, ctx: &mut TickContext<'_>) -> StepResult {
        match self {
            MonitoringState::Idle => handle_idle(ctx),
            MonitoringState::Priority {
                scope,
                mode,
                last_activity,
            } => handle_priority(ctx, scope, mode, last_activity),
            MonitoringState::Countdown { entry, deadline } => {
                handle_countdown(ctx, entry, *deadline)
            }
        }
    }
}

fn handle_idle(ctx: &mut TickContext<'_>) -> StepResult {
    let due = ctx
        .timers
        .iter()
        .find(|(_, wake)| **wake <= ctx.now)
        .map(|(scope, _)| scope.clone());
    if let Some(scope) = due {
        ctx.timers.remove(&scope);
        let duration = ctx
            .cache
            .folder(&scope)
            .map_or(Duration::ZERO, |f| f.timer_duration);
        trace_event!("priority_enter", scope = scope.as_str(), mode = "timer");
        return StepResult::to(MonitoringState::Priority {
            scope,
            mode: PriorityMode::Timer {
                deadline: ctx.now + duration,
            },
            last_activity: ctx.now,
        });
    }

    let cache = ctx.cache;
    let matches = ctx.find(
        cache
            .primary()
            .iter()
            .filter(|e| e.folder().mode != FolderMode::PriorityTimer),
    );

    for m in &matches {
        let folder = m.entry.folder();
        if !matches!(
            folder.mode,
            FolderMode::PriorityImage | FolderMode::PrioritySequence
        ) {
            continue;
        }
        let Some(schedule) = cache.folder(&folder.scope) else {
            continue;
        };
        if schedule.trigger.as_ref().is_some_and(|t| t != &m.path) {
            continue;
        }
        let mode = if folder.mode == FolderMode::PriorityImage {
            PriorityMode::Image {
                remaining: schedule.items.clone(),
            }
        } else {
            PriorityMode::Sequence {
                step: 0,
                next_at: ctx.now,
            }
        };
        trace_event!(
            "priority_enter",
            scope = folder.scope.as_str(),
            trigger = m.path.as_str()
        );
        return StepResult::to(MonitoringState::Priority {
            scope: folder.scope.clone(),
            mode,
            last_activity: ctx.now,
        });
    }

    let normal: Vec<MatchResult> = matches
        .iter()
        .filter(|m| !m.entry.folder().mode.is_priority())
        .cloned()
        .collect();
    match ctx.arbitrate(&normal) {
        Verdict::Click(result) => {
            if ctx.click(&result) {
                return StepResult::clicked(result.path);
            }
            return StepResult::stay();
        }
        Verdict::Hold(_) | Verdict::AwaitingOcr(_) => return StepResult::stay(),
        Verdict::Idle => {}
    }

    // Backups only run when nothing primary is on screen, otherwise the
    // countdown would cancel on its first tick.
    if !matches.is_empty() {
        return StepResult::stay();
    }
    let now = ctx.now;
    let arbiter = &*ctx.arbiter;
    let backups = ctx.find(
        cache
            .backup()
            .iter()
            .filter(|e| !arbiter.in_cooldown(&e.folder().scope, now)),
    );
    let best = backups.into_iter().reduce(|a, b| {
        if b.confidence > a.confidence {
            b
        } else {
            a
        }
    });
    match best {
        Some(best) => {
            let dwell = secs(best.entry.settings().backup_dwell_secs);
            trace_event!(
                "countdown_start",
                path = best.path.as_str(),
                dwell_ms = dwell.as_millis() as u64
            );
            StepResult::to(MonitoringState::Countdown {
                entry: best.entry,
                deadline: now + dwell,
            })
        }
        None => StepResult::stay(),
    }
}

fn handle_priority(
    ctx: &mut TickContext<'_>,
    scope: &str,
    mode: &mut PriorityMode,
    last_activity: &mut Instant,
) -> StepResult {
    let cache = ctx.cache;
    let Some(schedule) = cache.folder(scope) else {
        trace_warn!("priority_scope_gone", scope = scope);
        return StepResult::to(MonitoringState::Idle);
    };
    let timeout = schedule
        .activity_timeout
        .unwrap_or_else(|| ctx.settings.activity_timeout());
    let in_scope = |e: &&Arc<CacheEntry>| e.folder().scope == scope;

    match mode {
        PriorityMode::Timer { deadline } => {
            if ctx.now >= *deadline {
                ctx.timers
                    .insert(scope.to_string(), ctx.now + schedule.timer_interval);
                trace_event!("priority_exit", scope = scope, reason = "deadline");
                return StepResult::to(MonitoringState::Idle);
            }
            let matches = ctx.find(cache.primary().iter().filter(in_scope));
            click_verdict(ctx, &matches, last_activity)
        }
        PriorityMode::Image { remaining } => {
            if ctx.now.saturating_duration_since(*last_activity) >= timeout {
                trace_event!("priority_exit", scope = scope, reason = "timeout");
                return StepResult::to(MonitoringState::Idle);
            }
            let matches = ctx.find(cache.primary().iter().filter(in_scope));
            let step = click_verdict(ctx, &matches, last_activity);
            if let Some(path) = &step.clicked {
                remaining.retain(|p| p != path);
                if remaining.is_empty() {
                    trace_event!("priority_exit", scope = scope, reason = "complete");
                    return StepResult {
                        next: Some(MonitoringState::Idle),
                        ..step
                    };
                }
            }
            step
        }
        PriorityMode::Sequence { step, next_at } => {
            if ctx.now.saturating_duration_since(*last_activity) >= timeout {
                trace_event!("priority_exit", scope = scope, reason = "timeout");
                return StepResult::to(MonitoringState::Idle);
            }
            let Some(path) = schedule.items.get(*step) else {
                return StepResult::to(MonitoringState::Idle);
            };
            if ctx.now < *next_at {
                return StepResult::stay();
            }
            let Some(entry) = cache.entry(path) else {
                return StepResult::to(MonitoringState::Idle);
            };
            let matches = ctx.find(std::iter::once(entry));
            let result = click_verdict(ctx, &matches, last_activity);
            if result.clicked.is_some() {
                *step += 1;
                *next_at = ctx.now + schedule.step_interval;
                trace_debug!("sequence_step", scope = scope, step = *step);
                if *step >= schedule.items.len() {
                    trace_event!("priority_exit", scope = scope, reason = "complete");
                    return StepResult {
                        next: Some(MonitoringState::Idle),
                        ..result
                    };
                }
            }
            result
        }
    }
}

fn click_verdict(
    ctx: &mut TickContext<'_>,
    matches: &[MatchResult],
    last_activity: &mut Instant,
) -> StepResult {
    match ctx.arbitrate(matches) {
        Verdict::Click(result) if ctx.click(&result) => {
            *last_activity = ctx.now;
            StepResult::clicked(result.path)
        }
        _ => StepResult::stay(),
    }
}

fn handle_countdown(
    ctx: &mut TickContext<'_>,
    entry: &Arc<CacheEntry>,
    deadline: Instant,
) -> StepResult {
    let cache = ctx.cache;
    let primary = ctx.find(
        cache
            .primary()
            .iter()
            .filter(|e| e.folder().mode != FolderMode::PriorityTimer),
    );
    if let Some(first) = primary.first() {
        trace_event!("countdown_cancel", by = first.path.as_str());
        return StepResult::to(MonitoringState::Idle);
    }
    if ctx.now < deadline {
        return StepResult::stay();
    }
    let cooldown = Some(ctx.settings.countdown_cooldown());
    let found = ctx.find(std::iter::once(entry));
    match found.first() {
        Some(result) if ctx.click(result) => StepResult {
            next: Some(MonitoringState::Idle),
            clicked: Some(result.path.clone()),
            cooldown,
        },
        _ => {
            trace_debug!("countdown_expired", path = entry.path().as_str(), clicked = false);
            StepResult {
                next: Some(MonitoringState::Idle),
                clicked: None,
                cooldown,
            }
        }
    }
}
