//! Watchdog over the application bound to the recognition area.
//!
//! When the area is bound to a window owned by a process matching the
//! configured markers, a `SessionContext` tracks it. A process that exits,
//! or a run of clicks on the same item that never changes anything, starts a
//! recovery on its own thread: terminate, relaunch, wait for the new window,
//! rebind the area and rebuild the template cache. Monitoring is paused only
//! while that thread runs.

mod process;

pub use process::{ProcessControl, ProcessInfo, SysinfoProcessControl};

use crate::action::WindowHandle;
use crate::bank::{CacheHandle, RebuildRequest};
use crate::config::{ItemPath, LifecycleSettings};
use crate::engine::{RecognitionArea, Shared};
use crate::image::Rect;
use crate::trace::{trace_event, trace_warn};
use crate::util::math::secs;
use crate::worker::WorkerPool;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;

const WINDOW_POLL: Duration = Duration::from_millis(250);

/// Finds windows and their owners. Platform specific, supplied by the host.
pub trait WindowLocator: Send + Sync {
    fn owner_pid(&self, window: WindowHandle) -> Option<u32>;

    /// Main window of `pid` and its screen rectangle.
    fn find_by_pid(&self, pid: u32) -> Option<(WindowHandle, Rect)>;
}

/// Recovery failures.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("no relaunch command and no known executable")]
    NoRelaunchTarget,
    #[error("relaunch failed: {0}")]
    Launch(String),
    #[error("no window for pid {pid} before the timeout")]
    WindowNotFound { pid: u32 },
    #[error("recovery thread panicked")]
    Panicked,
}

/// The tracked application.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionContext {
    pub pid: u32,
    pub name: String,
    pub exe: Option<PathBuf>,
    pub window: WindowHandle,
    pub consecutive_clicks: u32,
    pub last_path: Option<ItemPath>,
}

/// Engine handles a recovery needs.
#[derive(Clone)]
pub struct RecoveryHooks {
    pub shared: Arc<Shared>,
    pub cache: Arc<CacheHandle>,
    pub pool: Arc<WorkerPool>,
    /// Rebuild template; the window scale is replaced after rebinding.
    pub rebuild: RebuildRequest,
}

type SharedProcess = Arc<Mutex<Box<dyn ProcessControl>>>;

pub struct LifecycleManager {
    settings: LifecycleSettings,
    process: SharedProcess,
    locator: Arc<dyn WindowLocator>,
    hooks: RecoveryHooks,
    session: Option<SessionContext>,
    bound: Option<WindowHandle>,
    last_check: Option<Instant>,
    worker: Option<JoinHandle<Result<u32, LifecycleError>>>,
}

impl LifecycleManager {
    pub fn new(
        settings: LifecycleSettings,
        process: Box<dyn ProcessControl>,
        locator: Arc<dyn WindowLocator>,
        hooks: RecoveryHooks,
    ) -> Self {
        Self {
            settings,
            process: Arc::new(Mutex::new(process)),
            locator,
            hooks,
            session: None,
            bound: None,
            last_check: None,
            worker: None,
        }
    }

    pub fn session(&self) -> Option<&SessionContext> {
        self.session.as_ref()
    }

    pub fn is_recovering(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Tracks the area's window; a different window drops the session.
    pub fn bind(&mut self, window: Option<WindowHandle>) {
        if window == self.bound {
            return;
        }
        self.bound = window;
        self.session = None;
        let Some(handle) = window else {
            return;
        };
        let Some(pid) = self.locator.owner_pid(handle) else {
            return;
        };
        let info = self
            .process
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .find(pid);
        match info {
            Some(info) if info.matches_any(&self.settings.process_markers) => {
                trace_event!("session_bound", pid = info.pid, name = info.name.as_str());
                self.session = Some(SessionContext {
                    pid: info.pid,
                    name: info.name,
                    exe: info.exe,
                    window: handle,
                    consecutive_clicks: 0,
                    last_path: None,
                });
            }
            _ => {}
        }
    }

    /// Counts clicks toward the unresponsive limit.
    pub fn record_click(&mut self, path: &ItemPath, transitioned: bool) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if transitioned || session.last_path.as_ref() != Some(path) {
            session.consecutive_clicks = 1;
            session.last_path = Some(path.clone());
        } else {
            session.consecutive_clicks += 1;
        }
    }

    /// Notes a state transition without a click.
    pub fn record_transition(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.consecutive_clicks = 0;
            session.last_path = None;
        }
    }

    /// Liveness and responsiveness checks. Returns true when a recovery started.
    pub fn poll(&mut self, now: Instant) -> bool {
        if self.worker.as_ref().is_some_and(|w| w.is_finished()) {
            let _ = self.join_recovery();
        }
        if self.worker.is_some() {
            return false;
        }
        let Some(session) = self.session.as_ref() else {
            return false;
        };
        let stall = self.settings.stall_clicks;
        if stall > 0 && session.consecutive_clicks >= stall {
            self.start_recovery("unresponsive");
            return true;
        }
        let interval = secs(self.settings.check_interval_secs);
        if self
            .last_check
            .is_some_and(|last| now.saturating_duration_since(last) < interval)
        {
            return false;
        }
        self.last_check = Some(now);
        let pid = session.pid;
        let alive = self
            .process
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_alive(pid);
        if !alive {
            self.start_recovery("exited");
            return true;
        }
        false
    }

    /// Waits for a running recovery and returns its outcome.
    pub fn join_recovery(&mut self) -> Option<Result<u32, LifecycleError>> {
        let worker = self.worker.take()?;
        Some(worker.join().unwrap_or(Err(LifecycleError::Panicked)))
    }

    fn start_recovery(&mut self, reason: &str) {
        let Some(session) = self.session.take() else {
            return;
        };
        self.bound = None;
        trace_warn!("recovery_start", pid = session.pid, reason = reason);
        self.hooks.shared.set_paused(true);
        let job = RecoveryJob {
            settings: self.settings.clone(),
            process: Arc::clone(&self.process),
            locator: Arc::clone(&self.locator),
            hooks: self.hooks.clone(),
            session,
        };
        let spawned = std::thread::Builder::new()
            .name("screenwatch-recovery".to_string())
            .spawn(move || job.run());
        match spawned {
            Ok(handle) => self.worker = Some(handle),
            Err(err) => {
                trace_warn!("recovery_spawn_failed", error = err.to_string().as_str());
                self.hooks.shared.set_paused(false);
            }
        }
    }
}

struct RecoveryJob {
    settings: LifecycleSettings,
    process: SharedProcess,
    locator: Arc<dyn WindowLocator>,
    hooks: RecoveryHooks,
    session: SessionContext,
}

struct PauseGuard<'a>(&'a Shared);

impl Drop for PauseGuard<'_> {
    fn drop(&mut self) {
        self.0.set_paused(false);
    }
}

impl RecoveryJob {
    fn run(self) -> Result<u32, LifecycleError> {
        let _pause = PauseGuard(&self.hooks.shared);
        let result = self.recover();
        match &result {
            Ok(pid) => {
                trace_event!("recovery_done", pid = *pid);
            }
            Err(err) => {
                trace_warn!("recovery_failed", error = err.to_string().as_str());
            }
        }
        result
    }

    fn recover(&self) -> Result<u32, LifecycleError> {
        let old = self.session.pid;
        {
            let mut process = self.process.lock().unwrap_or_else(PoisonError::into_inner);
            if process.is_alive(old) && !process.terminate(old) {
                trace_warn!("recovery_terminate_failed", pid = old);
            }
        }
        let program = self
            .settings
            .relaunch_command
            .clone()
            .or_else(|| self.session.exe.clone())
            .ok_or(LifecycleError::NoRelaunchTarget)?;
        let pid = self
            .process
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .launch(&program, &self.settings.relaunch_args)
            .map_err(|err| LifecycleError::Launch(err.to_string()))?;
        std::thread::sleep(secs(self.settings.startup_wait_secs));

        let deadline = Instant::now() + secs(self.settings.window_timeout_secs);
        let (window, rect) = loop {
            if let Some(found) = self.locator.find_by_pid(pid) {
                break found;
            }
            if Instant::now() >= deadline {
                return Err(LifecycleError::WindowNotFound { pid });
            }
            std::thread::sleep(WINDOW_POLL);
        };

        let scale = self.hooks.shared.set_area(RecognitionArea {
            rect,
            window: Some(window),
        });
        let mut request = self.hooks.rebuild.clone();
        request.window_scale = scale;
        if self
            .hooks
            .cache
            .request_rebuild(&self.hooks.pool, request)
            .is_none()
        {
            trace_warn!("recovery_rebuild_skipped", reason = "rebuild in progress");
        }
        Ok(pid)
    }
}
