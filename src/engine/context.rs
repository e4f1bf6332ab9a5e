//! State shared between the control surface and the scheduler thread.

use crate::action::WindowHandle;
use crate::config::ItemPath;
use crate::engine::state::{MonitoringState, StateKind};
use crate::image::Rect;
use crate::quick_timer::QuickTimerManager;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Screen rectangle being watched, optionally bound to a window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionArea {
    pub rect: Rect,
    pub window: Option<WindowHandle>,
}

/// Snapshot reported by `Engine::status`.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct EngineStatus {
    pub running: bool,
    pub state: StateKind,
    /// Paused for lifecycle recovery.
    pub paused: bool,
    /// Reason monitoring halted, if it did.
    pub error: Option<String>,
    pub clicks: u64,
    pub last_click: Option<ItemPath>,
    pub cache_generation: u64,
    pub cache_entries: usize,
    pub capture_method: String,
    pub quick_timers: Vec<u8>,
    pub area: Option<RecognitionArea>,
    pub window_scale: f32,
}

#[derive(Debug, Default)]
pub(crate) struct Stats {
    pub clicks: u64,
    pub last_click: Option<ItemPath>,
    pub error: Option<String>,
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Engine-wide shared state.
#[derive(Debug)]
pub struct Shared {
    area: Mutex<Option<RecognitionArea>>,
    window_scale: AtomicU32,
    reference_width: Option<u32>,
    paused: AtomicBool,
    pub(crate) quick_timers: Mutex<QuickTimerManager>,
    pub(crate) state: Mutex<MonitoringState>,
    pub(crate) stats: Mutex<Stats>,
}

impl Shared {
    pub fn new(reference_width: Option<u32>, quick_timers: QuickTimerManager) -> Self {
        Self {
            area: Mutex::new(None),
            window_scale: AtomicU32::new(1.0f32.to_bits()),
            reference_width,
            paused: AtomicBool::new(false),
            quick_timers: Mutex::new(quick_timers),
            state: Mutex::new(MonitoringState::Idle),
            stats: Mutex::new(Stats::default()),
        }
    }

    pub fn area(&self) -> Option<RecognitionArea> {
        *lock(&self.area)
    }

    /// Sets the area and resets the window scale against the reference width.
    pub fn set_area(&self, area: RecognitionArea) -> f32 {
        let scale = match self.reference_width {
            Some(reference) if reference > 0 && area.rect.width > 0 => {
                area.rect.width as f32 / reference as f32
            }
            _ => 1.0,
        };
        *lock(&self.area) = Some(area);
        self.set_window_scale(scale);
        scale
    }

    pub fn clear_area(&self) {
        *lock(&self.area) = None;
        self.set_window_scale(1.0);
    }

    pub fn window_scale(&self) -> f32 {
        f32::from_bits(self.window_scale.load(Ordering::Acquire))
    }

    pub fn set_window_scale(&self, scale: f32) {
        self.window_scale.store(scale.to_bits(), Ordering::Release);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Release);
    }

    pub fn state_kind(&self) -> StateKind {
        lock(&self.state).kind()
    }

    /// Runs `f` with the quick timer table locked.
    pub fn with_quick_timers<R>(&self, f: impl FnOnce(&mut QuickTimerManager) -> R) -> R {
        f(&mut lock(&self.quick_timers))
    }
}
