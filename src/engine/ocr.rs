//! Text-recognition gate for OCR-conditioned items.
//!
//! Recognition itself is an opaque `OcrEvaluator`. The gate submits at most
//! one evaluation per detection to the worker pool and caches the verdict
//! until the detection ends. Verdicts for an older detection are discarded.

use crate::action::WindowHandle;
use crate::config::{ItemPath, ItemSettings, OcrCondition};
use crate::image::Frame;
use crate::trace::{trace_debug, trace_event};
use crate::worker::{Ticket, TicketState, WorkerPool};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Everything an evaluator needs to read the region of one match.
#[derive(Clone, Debug)]
pub struct OcrRequest {
    pub path: ItemPath,
    pub frame: Arc<Frame>,
    /// Match top-left in frame coordinates.
    pub origin: (i32, i32),
    pub condition: OcrCondition,
    pub item: ItemSettings,
    /// Scale of the matched template variant.
    pub scale: f32,
    pub capture_scale: f32,
    pub window: Option<WindowHandle>,
    pub capture_method: String,
}

/// Evaluator outcome.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OcrVerdict {
    pub passed: bool,
    pub message: String,
    pub text: String,
    /// Recognition confidence, 0..100.
    pub confidence: f32,
}

impl OcrVerdict {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
            ..Self::default()
        }
    }
}

/// Opaque text recognizer.
pub trait OcrEvaluator: Send + Sync {
    fn evaluate(&self, request: &OcrRequest) -> OcrVerdict;
}

/// Pending evaluation.
pub type OcrTicket = Ticket<OcrVerdict>;

/// Gate state for one detection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OcrStatus {
    Pending,
    Passed,
    Failed,
}

struct Slot {
    detection: Instant,
    ticket: Option<OcrTicket>,
    passed: Option<bool>,
}

#[derive(Default)]
pub struct OcrGate {
    slots: HashMap<ItemPath, Slot>,
    rearm: HashMap<ItemPath, Instant>,
}

impl OcrGate {
    /// Status for `path` at `detection`, `None` when nothing was submitted.
    pub fn status(&mut self, path: &ItemPath, detection: Instant) -> Option<OcrStatus> {
        let slot = self.slots.get_mut(path)?;
        if slot.detection != detection {
            self.slots.remove(path);
            return None;
        }
        if slot.passed.is_none() {
            if let Some(ticket) = slot.ticket.as_mut() {
                match ticket.poll() {
                    TicketState::Pending => return Some(OcrStatus::Pending),
                    TicketState::Ready(verdict) => {
                        trace_event!(
                            "ocr_verdict",
                            path = path.as_str(),
                            passed = verdict.passed,
                            confidence = verdict.confidence,
                            text = verdict.text.as_str()
                        );
                        slot.passed = Some(verdict.passed);
                    }
                    TicketState::Lost | TicketState::Taken => slot.passed = Some(false),
                }
            }
        }
        match slot.passed {
            Some(true) => Some(OcrStatus::Passed),
            Some(false) => Some(OcrStatus::Failed),
            None => Some(OcrStatus::Pending),
        }
    }

    /// Starts an evaluation for `path` at `detection`.
    pub fn submit(
        &mut self,
        pool: &WorkerPool,
        evaluator: Arc<dyn OcrEvaluator>,
        request: OcrRequest,
        detection: Instant,
    ) {
        trace_debug!("ocr_submitted", path = request.path.as_str());
        let path = request.path.clone();
        let ticket = pool.submit(move || evaluator.evaluate(&request));
        self.slots.insert(
            path,
            Slot {
                detection,
                ticket: Some(ticket),
                passed: None,
            },
        );
    }

    /// Records an immediate verdict without an evaluation.
    pub fn settle(&mut self, path: &ItemPath, detection: Instant, passed: bool) {
        self.slots.insert(
            path.clone(),
            Slot {
                detection,
                ticket: None,
                passed: Some(passed),
            },
        );
    }

    /// Drops the cached verdict of `path`.
    pub fn clear(&mut self, path: &ItemPath) {
        self.slots.remove(path);
    }

    /// Drops the verdict and blocks `path` for `rearm`.
    pub fn fail(&mut self, path: &ItemPath, now: Instant, rearm: Duration) {
        self.slots.remove(path);
        self.rearm.insert(path.clone(), now + rearm);
    }

    pub fn is_rearming(&mut self, path: &ItemPath, now: Instant) -> bool {
        match self.rearm.get(path) {
            Some(until) if now < *until => true,
            Some(_) => {
                self.rearm.remove(path);
                false
            }
            None => false,
        }
    }

    pub fn reset(&mut self) {
        self.slots.clear();
    }
}

impl std::fmt::Debug for OcrGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OcrGate")
            .field("slots", &self.slots.len())
            .field("rearm", &self.rearm.len())
            .finish()
    }
}
