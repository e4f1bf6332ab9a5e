//! Desktop grabbers over `xcap`.

use super::{CaptureError, CaptureResult, ScreenGrabber};
use crate::image::{Frame, Rect};
use image::RgbaImage;
use xcap::Monitor;

pub(super) fn create(name: &str) -> CaptureResult<Box<dyn ScreenGrabber>> {
    match name {
        "monitor" => Ok(Box::new(MonitorGrabber::new()?)),
        "universal" => Ok(Box::new(UniversalGrabber)),
        other => Err(CaptureError::UnknownBackend(other.to_string())),
    }
}

fn grab_err(err: impl std::fmt::Display) -> CaptureError {
    CaptureError::Grab(err.to_string())
}

fn monitor_bounds(monitor: &Monitor) -> CaptureResult<Rect> {
    Ok(Rect::new(
        monitor.x().map_err(grab_err)?,
        monitor.y().map_err(grab_err)?,
        monitor.width().map_err(grab_err)?,
        monitor.height().map_err(grab_err)?,
    ))
}

fn primary_monitor() -> CaptureResult<Monitor> {
    let monitors = Monitor::all().map_err(grab_err)?;
    let mut fallback = None;
    for monitor in monitors {
        if monitor.is_primary().unwrap_or(false) {
            return Ok(monitor);
        }
        fallback.get_or_insert(monitor);
    }
    fallback.ok_or(CaptureError::Unavailable {
        backend: "monitor".to_string(),
        reason: "no display".to_string(),
    })
}

fn capture(monitor: &Monitor, region: Option<Rect>) -> CaptureResult<Frame> {
    let bounds = monitor_bounds(monitor)?;
    let shot = monitor.capture_image().map_err(grab_err)?;
    let (width, height) = (shot.width(), shot.height());
    let rgba = RgbaImage::from_raw(width, height, shot.into_raw())
        .ok_or_else(|| CaptureError::Grab("short capture buffer".to_string()))?;
    let frame = Frame::from_rgba(rgba);
    match region {
        None => Ok(frame),
        Some(region) => {
            let local = Rect::new(
                region.x - bounds.x,
                region.y - bounds.y,
                region.width,
                region.height,
            );
            frame.crop(local).ok_or(CaptureError::NoDisplay(region))
        }
    }
}

/// Low-latency grabber bound to the primary display.
///
/// Platform monitor handles are not `Send` everywhere, so the grabber keeps
/// the display's position and resolves it with a point lookup.
pub struct MonitorGrabber {
    anchor: (i32, i32),
}

impl MonitorGrabber {
    pub fn new() -> CaptureResult<Self> {
        let bounds = monitor_bounds(&primary_monitor()?)?;
        Ok(Self {
            anchor: bounds.center(),
        })
    }
}

impl ScreenGrabber for MonitorGrabber {
    fn name(&self) -> &str {
        "monitor"
    }

    fn grab(&mut self, region: Option<Rect>) -> CaptureResult<Frame> {
        let monitor = Monitor::from_point(self.anchor.0, self.anchor.1).map_err(grab_err)?;
        capture(&monitor, region)
    }
}

/// Re-enumerates displays on every grab and picks the one holding the region.
pub struct UniversalGrabber;

impl ScreenGrabber for UniversalGrabber {
    fn name(&self) -> &str {
        "universal"
    }

    fn grab(&mut self, region: Option<Rect>) -> CaptureResult<Frame> {
        let Some(region) = region else {
            return capture(&primary_monitor()?, None);
        };
        let (cx, cy) = region.center();
        for monitor in Monitor::all().map_err(grab_err)? {
            if monitor_bounds(&monitor)?.contains(cx, cy) {
                return capture(&monitor, Some(region));
            }
        }
        Err(CaptureError::NoDisplay(region))
    }
}
