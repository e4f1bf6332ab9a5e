use screenwatch::capture::{CaptureError, CaptureManager, CaptureResult, ScreenGrabber};
use screenwatch::image::{Frame, Rect};
use std::sync::{Arc, Mutex};

/// Fails unless it is the fallback backend.
struct Flaky {
    name: String,
    released: Arc<Mutex<Vec<String>>>,
}

impl ScreenGrabber for Flaky {
    fn name(&self) -> &str {
        &self.name
    }

    fn grab(&mut self, region: Option<Rect>) -> CaptureResult<Frame> {
        if self.name != "universal" {
            return Err(CaptureError::Grab("device lost".to_string()));
        }
        let rect = region.unwrap_or(Rect::new(0, 0, 8, 8));
        let (w, h) = (rect.width as usize, rect.height as usize);
        Frame::new(vec![0; w * h * 3], w, h).map_err(|err| CaptureError::Grab(err.to_string()))
    }

    fn release(&mut self) {
        self.released.lock().unwrap().push(self.name.clone());
    }
}

fn manager(method: &str) -> (CaptureManager, Arc<Mutex<Vec<String>>>) {
    let released = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&released);
    let manager = CaptureManager::new(
        method,
        Box::new(move |name: &str| match name {
            "monitor" | "universal" => Ok(Box::new(Flaky {
                name: name.to_string(),
                released: Arc::clone(&log),
            }) as Box<dyn ScreenGrabber>),
            other => Err(CaptureError::UnknownBackend(other.to_string())),
        }),
    );
    (manager, released)
}

#[test]
fn five_failures_switch_to_universal() {
    let (capture, released) = manager("monitor");
    for attempt in 1..5 {
        assert!(capture.capture_frame(None).is_none());
        assert_eq!(capture.consecutive_failures(), attempt);
        assert_eq!(capture.method(), "monitor");
    }
    assert!(capture.capture_frame(None).is_none());
    assert_eq!(capture.method(), "universal");
    assert_eq!(capture.consecutive_failures(), 0);
    assert_eq!(released.lock().unwrap().as_slice(), ["monitor".to_string()]);

    let frame = capture.capture_frame(Some(Rect::new(0, 0, 16, 9))).unwrap();
    assert_eq!((frame.width(), frame.height()), (16, 9));
}

#[test]
fn unknown_backend_falls_back_on_select() {
    let (capture, _) = manager("monitor");
    assert!(capture.select("dxgi").is_err());
    assert_eq!(capture.method(), "universal");
    assert!(capture.capture_frame(None).is_some());
}

#[test]
fn select_releases_previous_backend() {
    let (capture, released) = manager("universal");
    assert!(capture.capture_frame(None).is_some());
    capture.select("monitor").unwrap();
    assert_eq!(capture.method(), "monitor");
    assert_eq!(released.lock().unwrap().as_slice(), ["universal".to_string()]);
}
