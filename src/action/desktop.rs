//! Input driver over `enigo`.

use super::{ActionError, ActionResult, InputDriver, MouseButton};
use crate::image::Rect;
use enigo::{Button, Coordinate, Direction, Enigo, Mouse, Settings};

fn input_err(err: impl std::fmt::Display) -> ActionError {
    ActionError::Input(err.to_string())
}

/// Sends real mouse events.
pub struct EnigoDriver {
    enigo: Enigo,
}

impl EnigoDriver {
    pub fn new() -> ActionResult<Self> {
        let enigo = Enigo::new(&Settings::default()).map_err(input_err)?;
        Ok(Self { enigo })
    }
}

impl InputDriver for EnigoDriver {
    fn click(&mut self, x: i32, y: i32, button: MouseButton) -> ActionResult<()> {
        self.enigo
            .move_mouse(x, y, Coordinate::Abs)
            .map_err(input_err)?;
        let button = match button {
            MouseButton::Left => Button::Left,
            MouseButton::Right => Button::Right,
        };
        self.enigo
            .button(button, Direction::Click)
            .map_err(input_err)
    }

    fn screen_bounds(&self) -> Option<Rect> {
        let (w, h) = self.enigo.main_display().ok()?;
        Some(Rect::new(0, 0, w.max(0) as u32, h.max(0) as u32))
    }
}
