//! Screen capture backends and failover.
//!
//! A `ScreenGrabber` turns a screen region into an RGB `Frame`. The
//! `CaptureManager` owns the active grabber behind one mutex, creates
//! grabbers lazily through a factory, and fails over to the universal
//! backend after repeated failures.

use crate::image::{Frame, Rect};
use crate::trace::{trace_event, trace_warn};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[cfg(feature = "screen-capture")]
mod desktop;

#[cfg(feature = "screen-capture")]
pub use desktop::{MonitorGrabber, UniversalGrabber};

/// Backend used when the preferred one keeps failing.
pub const FALLBACK_BACKEND: &str = "universal";
/// Consecutive failures that trigger failover.
pub const FAILOVER_THRESHOLD: u32 = 5;

/// Capture failures.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CaptureError {
    #[error("unknown capture backend `{0}`")]
    UnknownBackend(String),
    #[error("capture backend `{backend}` unavailable: {reason}")]
    Unavailable { backend: String, reason: String },
    #[error("no display contains region {0:?}")]
    NoDisplay(Rect),
    #[error("capture failed: {0}")]
    Grab(String),
}

/// Result alias for capture operations.
pub type CaptureResult<T> = Result<T, CaptureError>;

/// A source of screen frames.
pub trait ScreenGrabber: Send {
    /// Backend name used for selection.
    fn name(&self) -> &str;

    /// Captures `region` in screen coordinates, or the primary display for `None`.
    fn grab(&mut self, region: Option<Rect>) -> CaptureResult<Frame>;

    /// Frees platform resources; the grabber is dropped afterwards.
    fn release(&mut self) {}
}

/// Creates grabbers by backend name.
pub type GrabberFactory =
    Box<dyn Fn(&str) -> CaptureResult<Box<dyn ScreenGrabber>> + Send + Sync>;

struct Slot {
    method: String,
    active: Option<Box<dyn ScreenGrabber>>,
    failures: u32,
}

impl Slot {
    fn release(&mut self) {
        if let Some(mut grabber) = self.active.take() {
            grabber.release();
        }
    }
}

/// Owns the active capture backend.
pub struct CaptureManager {
    factory: GrabberFactory,
    slot: Mutex<Slot>,
}

impl CaptureManager {
    /// Creates a manager that lazily instantiates `method`.
    pub fn new(method: &str, factory: GrabberFactory) -> Self {
        Self {
            factory,
            slot: Mutex::new(Slot {
                method: method.to_string(),
                active: None,
                failures: 0,
            }),
        }
    }

    /// Manager over the built-in desktop grabbers.
    #[cfg(feature = "screen-capture")]
    pub fn desktop(method: &str) -> Self {
        Self::new(method, Box::new(desktop::create))
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Name of the current backend.
    pub fn method(&self) -> String {
        self.lock().method.clone()
    }

    /// Consecutive failed captures since the last success or failover.
    pub fn consecutive_failures(&self) -> u32 {
        self.lock().failures
    }

    /// Switches backend. The old grabber is released first; on failure the
    /// manager falls back to the universal backend and returns the error.
    pub fn select(&self, name: &str) -> CaptureResult<()> {
        let mut slot = self.lock();
        slot.release();
        slot.failures = 0;
        match (self.factory)(name) {
            Ok(grabber) => {
                slot.method = name.to_string();
                slot.active = Some(grabber);
                trace_event!("capture_selected", backend = name);
                Ok(())
            }
            Err(err) => {
                trace_warn!(
                    "capture_select_failed",
                    backend = name,
                    error = err.to_string().as_str()
                );
                slot.method = FALLBACK_BACKEND.to_string();
                if name != FALLBACK_BACKEND {
                    slot.active = (self.factory)(FALLBACK_BACKEND).ok();
                }
                Err(err)
            }
        }
    }

    /// Captures one frame. Failures are counted and logged, never returned.
    pub fn capture_frame(&self, region: Option<Rect>) -> Option<Frame> {
        let mut slot = self.lock();
        if slot.active.is_none() {
            match (self.factory)(&slot.method) {
                Ok(grabber) => slot.active = Some(grabber),
                Err(err) => {
                    trace_warn!("capture_unavailable", error = err.to_string().as_str());
                    self.record_failure(&mut slot);
                    return None;
                }
            }
        }
        let result = match slot.active.as_mut() {
            Some(grabber) => grabber.grab(region),
            None => return None,
        };
        match result {
            Ok(frame) => {
                slot.failures = 0;
                Some(frame)
            }
            Err(err) => {
                trace_warn!(
                    "capture_failed",
                    backend = slot.method.as_str(),
                    error = err.to_string().as_str()
                );
                self.record_failure(&mut slot);
                None
            }
        }
    }

    fn record_failure(&self, slot: &mut Slot) {
        slot.failures += 1;
        if slot.failures < FAILOVER_THRESHOLD {
            return;
        }
        slot.failures = 0;
        if slot.method != FALLBACK_BACKEND {
            trace_warn!(
                "capture_failover",
                from = slot.method.as_str(),
                to = FALLBACK_BACKEND
            );
            slot.release();
            slot.method = FALLBACK_BACKEND.to_string();
            slot.active = (self.factory)(FALLBACK_BACKEND).ok();
        }
    }

    /// Releases and recreates the current backend.
    pub fn reinitialize(&self) -> CaptureResult<()> {
        let mut slot = self.lock();
        slot.release();
        slot.failures = 0;
        let grabber = (self.factory)(&slot.method)?;
        slot.active = Some(grabber);
        Ok(())
    }

    /// Drops the backend until the next capture.
    pub fn release(&self) {
        self.lock().release();
    }
}

impl std::fmt::Debug for CaptureManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = self.lock();
        f.debug_struct("CaptureManager")
            .field("method", &slot.method)
            .field("active", &slot.active.is_some())
            .field("failures", &slot.failures)
            .finish()
    }
}
