//! Public control surface of the monitoring engine.

use crate::action::{ActionExecutor, InputDriver, MouseButton, WindowActivator, WindowHandle};
use crate::bank::{CacheHandle, RebuildRequest, RebuildSummary, RebuildTicket, ScaleSet, TemplateCache};
use crate::capture::{CaptureManager, CaptureResult};
use crate::config::{ConfigTree, EngineSettings};
use crate::engine::context::{lock, EngineStatus, RecognitionArea, Shared};
use crate::engine::ocr::OcrEvaluator;
use crate::engine::scheduler::{Scheduler, SchedulerParts};
use crate::engine::state::MonitoringState;
use crate::image::{Plane, Rect};
use crate::lifecycle::{LifecycleManager, ProcessControl, RecoveryHooks, WindowLocator};
use crate::quick_timer::QuickTimerManager;
use crate::trace::{trace_event, trace_warn};
use crate::util::math::secs;
use crate::util::{EngineError, EngineResult};
use crate::worker::WorkerPool;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const STOP_POLL: Duration = Duration::from_millis(10);

/// Platform pieces for restarting a hung application.
pub struct LifecycleParts {
    pub process: Box<dyn ProcessControl>,
    pub locator: Arc<dyn WindowLocator>,
}

/// Inputs of `Engine::new`.
pub struct EngineParts {
    pub settings: EngineSettings,
    pub tree: ConfigTree,
    pub capture: CaptureManager,
    pub input: Box<dyn InputDriver>,
    pub activator: Option<Box<dyn WindowActivator>>,
    pub ocr: Option<Arc<dyn OcrEvaluator>>,
    pub lifecycle: Option<LifecycleParts>,
}

struct Running {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<SchedulerParts>,
}

impl Running {
    fn is_live(&self) -> bool {
        !self.stop.load(Ordering::Acquire) && !self.handle.is_finished()
    }
}

/// Template-matching monitor: owns the cache, the worker pool and the
/// scheduler thread.
pub struct Engine {
    settings: EngineSettings,
    tree: Arc<ConfigTree>,
    root_dir: PathBuf,
    shared: Arc<Shared>,
    cache: Arc<CacheHandle>,
    pool: Arc<WorkerPool>,
    capture: Arc<CaptureManager>,
    idle: Mutex<Option<SchedulerParts>>,
    running: Mutex<Option<Running>>,
}

impl Engine {
    /// Validates settings and assembles the engine. The cache starts empty;
    /// call `rebuild_now` or `request_rebuild` to load templates.
    pub fn new(parts: EngineParts) -> EngineResult<Self> {
        let EngineParts {
            settings,
            tree,
            capture,
            input,
            activator,
            ocr,
            lifecycle,
        } = parts;
        settings.validate()?;
        let pool = Arc::new(WorkerPool::new(settings.workers)?);
        let scales = ScaleSet::compute(1.0, settings.capture.scale, settings.scale.sweep.as_ref())?;
        let cache = Arc::new(CacheHandle::new(TemplateCache::empty(scales)));
        let quick_timers = QuickTimerManager::new(
            secs(settings.quick_timer.grace_secs),
            settings.quick_timer.threshold,
        );
        let shared = Arc::new(Shared::new(settings.scale.reference_width, quick_timers));
        let capture = Arc::new(capture);
        let root_dir = tree.root_dir.clone();
        let tree = Arc::new(tree);

        let mut executor = ActionExecutor::new(input, settings.action.clone());
        if let Some(activator) = activator {
            executor = executor.with_activator(activator);
        }

        let mut engine = Self {
            settings,
            tree,
            root_dir,
            shared,
            cache,
            pool,
            capture,
            idle: Mutex::new(None),
            running: Mutex::new(None),
        };
        let lifecycle = match lifecycle {
            Some(platform) if engine.settings.lifecycle.enabled => Some(LifecycleManager::new(
                engine.settings.lifecycle.clone(),
                platform.process,
                platform.locator,
                RecoveryHooks {
                    shared: Arc::clone(&engine.shared),
                    cache: Arc::clone(&engine.cache),
                    pool: Arc::clone(&engine.pool),
                    rebuild: engine.rebuild_request(),
                },
            )),
            _ => None,
        };
        engine.idle = Mutex::new(Some(SchedulerParts {
            settings: engine.settings.clone(),
            shared: Arc::clone(&engine.shared),
            cache: Arc::clone(&engine.cache),
            capture: Arc::clone(&engine.capture),
            pool: Arc::clone(&engine.pool),
            executor,
            ocr,
            lifecycle,
        }));
        Ok(engine)
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    pub fn cache(&self) -> &Arc<CacheHandle> {
        &self.cache
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    fn rebuild_request(&self) -> RebuildRequest {
        RebuildRequest {
            tree: Arc::clone(&self.tree),
            root_dir: self.root_dir.clone(),
            window_scale: self.shared.window_scale(),
            capture_scale: self.settings.capture.scale,
            sweep: self.settings.scale.sweep.clone(),
        }
    }

    /// Rebuilds the template cache on the calling thread.
    pub fn rebuild_now(&self) -> EngineResult<RebuildSummary> {
        self.cache.rebuild_now(self.rebuild_request())
    }

    /// Schedules a background rebuild. `None` when one is already running.
    pub fn request_rebuild(&self) -> Option<RebuildTicket> {
        self.cache.request_rebuild(&self.pool, self.rebuild_request())
    }

    /// Starts the scheduler thread.
    pub fn start_monitoring(&self) -> EngineResult<()> {
        let mut running = lock(&self.running);
        if let Some(current) = running.take() {
            if current.handle.is_finished() {
                self.reclaim(current);
            } else {
                let reason = if current.stop.load(Ordering::Acquire) {
                    "previous monitoring thread is still stopping"
                } else {
                    "monitoring already running"
                };
                *running = Some(current);
                return Err(EngineError::Monitoring(reason));
            }
        }
        let parts = lock(&self.idle)
            .take()
            .ok_or(EngineError::Monitoring("scheduler parts unavailable"))?;
        lock(&self.shared.stats).error = None;
        *lock(&self.shared.state) = MonitoringState::Idle;

        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = std::thread::Builder::new()
            .name("screenwatch-monitor".to_string())
            .spawn(move || {
                let mut scheduler = Scheduler::new(parts, Instant::now());
                scheduler.run(&flag);
                scheduler.into_parts()
            })
            .map_err(|err| EngineError::Worker(err.to_string()))?;
        trace_event!("monitoring_started", entries = self.cache.snapshot().len());
        *running = Some(Running { stop, handle });
        Ok(())
    }

    /// Signals the scheduler and waits up to `stop_timeout` for it to exit.
    /// A thread that overruns is left to finish on its own.
    pub fn stop_monitoring(&self) -> EngineResult<()> {
        let current = lock(&self.running)
            .take()
            .ok_or(EngineError::Monitoring("monitoring not running"))?;
        current.stop.store(true, Ordering::Release);
        let deadline = Instant::now() + self.settings.stop_timeout();
        while !current.handle.is_finished() && Instant::now() < deadline {
            std::thread::sleep(STOP_POLL);
        }
        if current.handle.is_finished() {
            self.reclaim(current);
        } else {
            trace_warn!(
                "monitoring_stop_timeout",
                timeout_ms = self.settings.stop_timeout_ms
            );
            *lock(&self.running) = Some(current);
        }
        *lock(&self.shared.state) = MonitoringState::Idle;
        Ok(())
    }

    fn reclaim(&self, current: Running) {
        match current.handle.join() {
            Ok(parts) => *lock(&self.idle) = Some(parts),
            Err(_) => {
                trace_warn!("monitoring_thread_panicked", recovered = false);
                lock(&self.shared.stats).error = Some("monitoring thread panicked".to_string());
            }
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.running).as_ref().is_some_and(Running::is_live)
    }

    /// Points the engine at a screen rectangle. Returns a rebuild ticket
    /// when the window scale changed.
    pub fn set_recognition_area(
        &self,
        rect: Rect,
        window: Option<WindowHandle>,
    ) -> EngineResult<Option<RebuildTicket>> {
        if !rect.is_valid() {
            return Err(EngineError::InvalidConfig(format!(
                "recognition area {}x{} is empty",
                rect.width, rect.height
            )));
        }
        let before = self.shared.window_scale();
        let scale = self.shared.set_area(RecognitionArea { rect, window });
        Ok(self.rebuild_on_scale_change(before, scale))
    }

    /// Reverts to the full primary display at window scale 1.
    pub fn clear_recognition_area(&self) -> Option<RebuildTicket> {
        let before = self.shared.window_scale();
        self.shared.clear_area();
        self.rebuild_on_scale_change(before, 1.0)
    }

    fn rebuild_on_scale_change(&self, before: f32, after: f32) -> Option<RebuildTicket> {
        if (before - after).abs() <= 1e-6 {
            return None;
        }
        trace_event!("window_scale_changed", from = before, to = after);
        self.request_rebuild()
    }

    /// Switches the capture backend.
    pub fn select_capture(&self, method: &str) -> CaptureResult<()> {
        self.capture.select(method)
    }

    /// Arms quick timer `slot` to click `crop` once `delay` has passed.
    pub fn add_quick_timer(
        &self,
        slot: u8,
        crop: Plane,
        delay: Duration,
        offset: (i32, i32),
        button: MouseButton,
        threshold: Option<f32>,
    ) -> EngineResult<()> {
        let target = Instant::now() + delay;
        self.shared
            .with_quick_timers(|timers| timers.add(slot, crop, target, offset, button, threshold))
    }

    pub fn remove_quick_timer(&self, slot: u8) -> bool {
        self.shared.with_quick_timers(|timers| timers.remove(slot))
    }

    pub fn status(&self) -> EngineStatus {
        let cache = self.cache.snapshot();
        let stats = lock(&self.shared.stats);
        EngineStatus {
            running: self.is_running(),
            state: self.shared.state_kind(),
            paused: self.shared.is_paused(),
            error: stats.error.clone(),
            clicks: stats.clicks,
            last_click: stats.last_click.clone(),
            cache_generation: self.cache.generation(),
            cache_entries: cache.len(),
            capture_method: self.capture.method(),
            quick_timers: self.shared.with_quick_timers(|timers| timers.slots()),
            area: self.shared.area(),
            window_scale: self.shared.window_scale(),
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if lock(&self.running).is_some() {
            let _ = self.stop_monitoring();
        }
        self.capture.release();
    }
}
