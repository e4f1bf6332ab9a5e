//! One-shot "click this when it shows up" timers in nine slots.
//!
//! Entries are independent of the template cache: each holds its own
//! grayscale crop and correlation plan. Once an entry's target time has
//! passed it is matched every tick; the first match clicks once and retires
//! the entry, and entries that stay unmatched past the grace period expire.

use crate::action::MouseButton;
use crate::image::{FrameSet, Plane};
use crate::kernel::rayon::ZnccRayon;
use crate::kernel::{Kernel, PlaneInput, ScanWindow};
use crate::template::TemplatePlan;
use crate::trace::{trace_debug, trace_event, trace_warn};
use crate::util::{EngineError, EngineResult};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Valid slot numbers.
pub const SLOTS: std::ops::RangeInclusive<u8> = 1..=9;

/// A registered quick timer.
#[derive(Clone, Debug)]
pub struct QuickTimerEntry {
    pub slot: u8,
    pub target: Instant,
    crop: Plane,
    plan: TemplatePlan,
    /// Click offset from the match top-left, in frame pixels.
    pub offset: (i32, i32),
    pub button: MouseButton,
    pub threshold: f32,
}

impl QuickTimerEntry {
    pub fn crop(&self) -> &Plane {
        &self.crop
    }
}

/// A quick timer that matched this tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QuickTimerHit {
    pub slot: u8,
    /// Click point in frame coordinates.
    pub point: (f32, f32),
    pub button: MouseButton,
    pub score: f32,
}

/// Slot table.
#[derive(Debug)]
pub struct QuickTimerManager {
    entries: BTreeMap<u8, QuickTimerEntry>,
    grace: Duration,
    default_threshold: f32,
    min_var_i: f32,
}

impl QuickTimerManager {
    pub fn new(grace: Duration, default_threshold: f32) -> Self {
        Self {
            entries: BTreeMap::new(),
            grace,
            default_threshold,
            min_var_i: 1e-8,
        }
    }

    /// Registers `crop` in `slot`, replacing any previous entry.
    pub fn add(
        &mut self,
        slot: u8,
        crop: Plane,
        target: Instant,
        offset: (i32, i32),
        button: MouseButton,
        threshold: Option<f32>,
    ) -> EngineResult<()> {
        if !SLOTS.contains(&slot) {
            return Err(EngineError::QuickTimerSlot { slot });
        }
        let plan = TemplatePlan::from_view(crop.view())?;
        let entry = QuickTimerEntry {
            slot,
            target,
            crop,
            plan,
            offset,
            button,
            threshold: threshold.unwrap_or(self.default_threshold),
        };
        trace_event!("quick_timer_added", slot = slot);
        self.entries.insert(slot, entry);
        Ok(())
    }

    /// Removes `slot`; returns whether it was occupied.
    pub fn remove(&mut self, slot: u8) -> bool {
        self.entries.remove(&slot).is_some()
    }

    pub fn get(&self, slot: u8) -> Option<&QuickTimerEntry> {
        self.entries.get(&slot)
    }

    pub fn slots(&self) -> Vec<u8> {
        self.entries.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Matches due entries and drops expired ones.
    ///
    /// Hits stay registered until the caller retires them with `remove`
    /// once the click is delivered.
    pub fn poll(&mut self, frames: &FrameSet, now: Instant) -> Vec<QuickTimerHit> {
        let mut hits = Vec::new();
        let mut retired = Vec::new();
        for (slot, entry) in &self.entries {
            if now < entry.target {
                continue;
            }
            if now.saturating_duration_since(entry.target) > self.grace {
                trace_warn!("quick_timer_expired", slot = *slot);
                retired.push(*slot);
                continue;
            }
            if let Some(hit) = self.match_entry(frames, entry) {
                hits.push(hit);
            }
        }
        for slot in retired {
            self.entries.remove(&slot);
        }
        hits
    }

    fn match_entry(&self, frames: &FrameSet, entry: &QuickTimerEntry) -> Option<QuickTimerHit> {
        let window = ScanWindow::for_template(
            frames.width(),
            frames.height(),
            entry.plan.width(),
            entry.plan.height(),
            None,
        )?;
        let input = PlaneInput {
            view: frames.gray().view(),
            integral: frames.gray_integral(),
        };
        let map = match ZnccRayon::zncc_map(&[input], &entry.plan, window, self.min_var_i) {
            Ok(map) => map,
            Err(err) => {
                trace_debug!(
                    "quick_timer_scan_failed",
                    slot = entry.slot,
                    error = err.to_string().as_str()
                );
                return None;
            }
        };
        let peak = map.argmax().filter(|p| p.score >= entry.threshold)?;
        trace_event!("quick_timer_hit", slot = entry.slot, score = peak.score);
        Some(QuickTimerHit {
            slot: entry.slot,
            point: (
                peak.x as f32 + entry.offset.0 as f32,
                peak.y as f32 + entry.offset.1 as f32,
            ),
            button: entry.button,
            score: peak.score,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::QuickTimerManager;
    use crate::action::MouseButton;
    use crate::image::Plane;
    use crate::util::EngineError;
    use std::time::{Duration, Instant};

    fn crop() -> Plane {
        let data = (0..36).map(|i| ((i * 37) % 251) as u8).collect();
        Plane::new(data, 6, 6).unwrap()
    }

    #[test]
    fn rejects_out_of_range_slots() {
        let mut timers = QuickTimerManager::new(Duration::from_secs(5), 0.9);
        let now = Instant::now();
        let err = timers
            .add(0, crop(), now, (0, 0), MouseButton::Left, None)
            .unwrap_err();
        assert_eq!(err, EngineError::QuickTimerSlot { slot: 0 });
        assert!(timers.add(10, crop(), now, (0, 0), MouseButton::Left, None).is_err());
        assert!(timers.add(9, crop(), now, (0, 0), MouseButton::Left, None).is_ok());
        assert_eq!(timers.slots(), vec![9]);
        assert!(timers.remove(9));
        assert!(!timers.remove(9));
    }

    #[test]
    fn flat_crop_is_rejected() {
        let mut timers = QuickTimerManager::new(Duration::from_secs(5), 0.9);
        let flat = Plane::new(vec![7; 16], 4, 4).unwrap();
        assert!(timers
            .add(1, flat, Instant::now(), (0, 0), MouseButton::Left, None)
            .is_err());
    }
}
