//! Click execution: coordinate resolution, window activation, input guard.
//!
//! Match rectangles live in frame coordinates (captured area, downscaled by
//! the capture scale). Screen points are obtained by dividing by the capture
//! scale and adding the area origin. Item offsets (click points, ROI origins)
//! are authored at the reference window size and are multiplied by the base
//! scale only; any sweep multiplier of the matched variant is ignored.

use crate::config::{ActionSettings, ClickMode, ItemSettings};
use crate::image::Rect;
use crate::search::MatchResult;
use crate::trace::{trace_debug, trace_event, trace_warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[cfg(feature = "input")]
mod desktop;

#[cfg(feature = "input")]
pub use desktop::EnigoDriver;

/// Clicks closer than this to a screen edge are refused.
pub const EDGE_MARGIN_PX: i32 = 1;

/// Click failures.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ActionError {
    #[error("click at ({x}, {y}) is within {margin}px of the screen edge")]
    EdgeRefused { x: i32, y: i32, margin: i32 },
    #[error("input driver failed: {0}")]
    Input(String),
}

/// Result alias for click operations.
pub type ActionResult<T> = Result<T, ActionError>;

/// Mouse button to press.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
}

impl MouseButton {
    pub fn for_settings(settings: &ItemSettings) -> Self {
        if settings.right_click {
            MouseButton::Right
        } else {
            MouseButton::Left
        }
    }
}

/// Opaque platform window handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowHandle(pub u64);

/// Synthetic input.
pub trait InputDriver: Send {
    /// Moves to `(x, y)` in screen coordinates and clicks.
    fn click(&mut self, x: i32, y: i32, button: MouseButton) -> ActionResult<()>;

    /// Blocks or unblocks user input. Drivers without support ignore it.
    fn set_input_blocked(&mut self, _blocked: bool) -> ActionResult<()> {
        Ok(())
    }

    /// Bounds of the screen clicks land on, if known.
    fn screen_bounds(&self) -> Option<Rect> {
        None
    }
}

/// Brings a window to the foreground.
pub trait WindowActivator: Send + Sync {
    fn activate(&self, handle: WindowHandle) -> bool;
}

/// Maps frame coordinates to screen coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Geometry {
    /// Top-left of the recognition area on screen.
    pub origin: (i32, i32),
    /// Global capture downscale.
    pub capture_scale: f32,
    /// Measured window scale relative to the reference size.
    pub window_scale: f32,
}

impl Geometry {
    /// Scale authored offsets are multiplied by in frame space.
    pub fn base(&self) -> f32 {
        self.capture_scale * self.window_scale
    }

    /// Frame point to screen point.
    pub fn to_screen(&self, fx: f32, fy: f32) -> (i32, i32) {
        let capture = if self.capture_scale > 0.0 {
            self.capture_scale
        } else {
            1.0
        };
        (
            self.origin.0 + (fx / capture).round() as i32,
            self.origin.1 + (fy / capture).round() as i32,
        )
    }
}

/// Screen point for a match according to the item's click strategy.
///
/// Returns `None` for the point strategy without a click point.
pub fn resolve_click<R: Rng>(
    result: &MatchResult,
    geometry: &Geometry,
    rng: &mut R,
) -> Option<(i32, i32)> {
    let settings = result.entry.settings();
    let base = geometry.base();
    let (fx, fy) = (result.rect.x as f32, result.rect.y as f32);
    let norm = if result.scale > 0.0 {
        base / result.scale
    } else {
        1.0
    };
    // Click area relative to the match origin, sized at base scale
    // independent of the matched sweep variant.
    let (ox, oy, width, height) = match settings.click_rect {
        Some(rect) => {
            let (rx, ry) = settings.roi_origin();
            (
                (rect.x - rx) as f32 * base,
                (rect.y - ry) as f32 * base,
                rect.width as f32 * base,
                rect.height as f32 * base,
            )
        }
        None => (
            0.0,
            0.0,
            result.rect.width as f32 * norm,
            result.rect.height as f32 * norm,
        ),
    };
    let (ax, ay) = (fx + ox, fy + oy);

    let point = match settings.click_mode {
        ClickMode::Point => {
            let [px, py] = settings.click_point?;
            let (rx, ry) = settings.roi_origin();
            (fx + (px - rx) as f32 * base, fy + (py - ry) as f32 * base)
        }
        ClickMode::Range => (ax + width / 2.0, ay + height / 2.0),
        ClickMode::Random => {
            let w = (width.floor() as u32).max(1);
            let h = (height.floor() as u32).max(1);
            (
                ax + rng.random_range(0..w) as f32,
                ay + rng.random_range(0..h) as f32,
            )
        }
    };
    Some(geometry.to_screen(point.0, point.1))
}

/// Keeps user input blocked while alive.
pub struct InputBlockGuard<'a> {
    driver: &'a mut dyn InputDriver,
    engaged: bool,
}

impl<'a> InputBlockGuard<'a> {
    /// Blocks input when `block` is set; a driver error leaves input unblocked.
    pub fn engage(driver: &'a mut dyn InputDriver, block: bool) -> Self {
        let engaged = block
            && match driver.set_input_blocked(true) {
                Ok(()) => true,
                Err(err) => {
                    trace_warn!("input_block_failed", error = err.to_string().as_str());
                    false
                }
            };
        Self { driver, engaged }
    }

    pub fn driver(&mut self) -> &mut dyn InputDriver {
        &mut *self.driver
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged
    }
}

impl Drop for InputBlockGuard<'_> {
    fn drop(&mut self) {
        if self.engaged {
            if let Err(err) = self.driver.set_input_blocked(false) {
                trace_warn!("input_unblock_failed", error = err.to_string().as_str());
            }
        }
    }
}

/// Delivers clicks.
pub struct ActionExecutor {
    driver: Box<dyn InputDriver>,
    activator: Option<Box<dyn WindowActivator>>,
    settings: ActionSettings,
}

impl ActionExecutor {
    pub fn new(driver: Box<dyn InputDriver>, settings: ActionSettings) -> Self {
        Self {
            driver,
            activator: None,
            settings,
        }
    }

    pub fn with_activator(mut self, activator: Box<dyn WindowActivator>) -> Self {
        self.activator = Some(activator);
        self
    }

    /// Clicks at a screen point, activating `window` first when given.
    pub fn click(
        &mut self,
        point: (i32, i32),
        button: MouseButton,
        window: Option<WindowHandle>,
    ) -> ActionResult<()> {
        let (x, y) = point;
        if near_edge(x, y, self.driver.screen_bounds()) {
            trace_warn!("click_refused", x = x, y = y, reason = "screen edge");
            return Err(ActionError::EdgeRefused {
                x,
                y,
                margin: EDGE_MARGIN_PX,
            });
        }
        if let Some(handle) = window {
            self.activate(handle);
        }
        let mut guard = InputBlockGuard::engage(self.driver.as_mut(), self.settings.block_input);
        guard.driver().click(x, y, button)?;
        trace_event!("click", x = x, y = y, right = button == MouseButton::Right);
        Ok(())
    }

    fn activate(&self, handle: WindowHandle) {
        let Some(activator) = self.activator.as_ref() else {
            return;
        };
        let attempts = self.settings.activate_retries.max(1);
        for attempt in 0..attempts {
            if activator.activate(handle) {
                return;
            }
            trace_debug!("window_activation_retry", attempt = attempt);
            std::thread::sleep(Duration::from_millis(self.settings.activate_delay_ms));
        }
        trace_warn!("window_activation_failed", handle = handle.0);
    }
}

fn near_edge(x: i32, y: i32, bounds: Option<Rect>) -> bool {
    match bounds {
        Some(b) => {
            x - b.x < EDGE_MARGIN_PX
                || y - b.y < EDGE_MARGIN_PX
                || b.right() - 1 - x < EDGE_MARGIN_PX
                || b.bottom() - 1 - y < EDGE_MARGIN_PX
        }
        None => x < EDGE_MARGIN_PX || y < EDGE_MARGIN_PX,
    }
}

#[cfg(test)]
mod tests {
    use super::{near_edge, Geometry, InputBlockGuard, InputDriver, MouseButton};
    use crate::action::ActionResult;
    use crate::image::Rect;

    #[derive(Default)]
    struct Recorder {
        blocked: Vec<bool>,
    }

    impl InputDriver for Recorder {
        fn click(&mut self, _x: i32, _y: i32, _button: MouseButton) -> ActionResult<()> {
            Ok(())
        }

        fn set_input_blocked(&mut self, blocked: bool) -> ActionResult<()> {
            self.blocked.push(blocked);
            Ok(())
        }
    }

    #[test]
    fn edge_margin_is_one_pixel() {
        let screen = Some(Rect::new(0, 0, 100, 50));
        assert!(near_edge(0, 10, screen));
        assert!(near_edge(99, 10, screen));
        assert!(near_edge(10, 49, screen));
        assert!(!near_edge(1, 1, screen));
        assert!(!near_edge(98, 48, screen));
        assert!(near_edge(0, 5, None));
    }

    #[test]
    fn guard_unblocks_on_drop() {
        let mut driver = Recorder::default();
        {
            let guard = InputBlockGuard::engage(&mut driver, true);
            assert!(guard.is_engaged());
        }
        assert_eq!(driver.blocked, vec![true, false]);
        {
            let _guard = InputBlockGuard::engage(&mut driver, false);
        }
        assert_eq!(driver.blocked, vec![true, false]);
    }

    #[test]
    fn geometry_divides_by_capture_scale() {
        let geometry = Geometry {
            origin: (100, 200),
            capture_scale: 0.5,
            window_scale: 1.0,
        };
        assert_eq!(geometry.to_screen(10.0, 20.0), (120, 240));
        assert_eq!(geometry.base(), 0.5);
    }
}
