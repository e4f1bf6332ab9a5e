#![allow(dead_code)]

use image::{Rgb, RgbImage};
use screenwatch::action::{ActionExecutor, ActionResult, InputDriver, MouseButton};
use screenwatch::bank::{CacheHandle, RebuildRequest, ScaleSet, TemplateCache};
use screenwatch::capture::{CaptureError, CaptureManager, CaptureResult, ScreenGrabber};
use screenwatch::config::{ConfigNode, ConfigTree, EngineSettings, ItemSettings};
use screenwatch::engine::{OcrEvaluator, Scheduler, SchedulerParts, Shared, TickOutcome};
use screenwatch::image::{Frame, Rect};
use screenwatch::quick_timer::QuickTimerManager;
use screenwatch::WorkerPool;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;

pub const SCENE_W: u32 = 200;
pub const SCENE_H: u32 = 150;
pub const TPL: u32 = 24;

/// Deterministic RGB noise.
pub fn noise(width: u32, height: u32, seed: u32) -> RgbImage {
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(0x9e37_79b9) | 1;
    RgbImage::from_fn(width, height, |_, _| {
        let mut next = || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 24) as u8
        };
        Rgb([next(), next(), next()])
    })
}

/// The bitmap registered under `seed`.
pub fn sprite(seed: u32) -> RgbImage {
    noise(TPL, TPL, seed)
}

/// Background with sprites pasted at the given top-left corners.
pub fn scene(placements: &[(u32, u32, u32)]) -> Frame {
    let mut canvas = noise(SCENE_W, SCENE_H, 7);
    for &(seed, x, y) in placements {
        image::imageops::replace(&mut canvas, &sprite(seed), i64::from(x), i64::from(y));
    }
    Frame::from_rgb(canvas)
}

/// Writes the sprite for `seed` as `<name>.png`.
pub fn write_sprite(dir: &Path, name: &str, seed: u32) {
    sprite(seed)
        .save(dir.join(format!("{name}.png")))
        .expect("write sprite");
}

/// Click-by-range item for `<name>.png`.
pub fn item(name: &str, settings: ItemSettings) -> ConfigNode {
    ConfigNode::image(name, format!("{name}.png"), settings)
}

pub fn range_item() -> ItemSettings {
    ItemSettings {
        click_mode: screenwatch::config::ClickMode::Range,
        ..ItemSettings::default()
    }
}

/// Screen point a range click on a sprite placed at `(x, y)` lands on.
pub fn center_of(x: u32, y: u32) -> (i32, i32) {
    ((x + TPL / 2) as i32, (y + TPL / 2) as i32)
}

/// Serves whatever frame the test put into the shared slot.
pub struct SceneGrabber {
    pub frame: Arc<Mutex<Option<Frame>>>,
}

impl ScreenGrabber for SceneGrabber {
    fn name(&self) -> &str {
        "scene"
    }

    fn grab(&mut self, region: Option<Rect>) -> CaptureResult<Frame> {
        let frame = self
            .frame
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| CaptureError::Grab("blank screen".to_string()))?;
        match region {
            Some(rect) => frame.crop(rect).ok_or(CaptureError::NoDisplay(rect)),
            None => Ok(frame),
        }
    }
}

/// Records clicks instead of sending them.
#[derive(Clone, Default)]
pub struct ClickLog {
    pub clicks: Arc<Mutex<Vec<(i32, i32, MouseButton)>>>,
}

impl ClickLog {
    pub fn points(&self) -> Vec<(i32, i32)> {
        self.clicks.lock().unwrap().iter().map(|c| (c.0, c.1)).collect()
    }
}

impl InputDriver for ClickLog {
    fn click(&mut self, x: i32, y: i32, button: MouseButton) -> ActionResult<()> {
        self.clicks.lock().unwrap().push((x, y, button));
        Ok(())
    }
}

pub fn quiet_settings() -> EngineSettings {
    let mut settings = EngineSettings::default();
    settings.eco.enabled = false;
    settings.stability.enabled = false;
    settings.action.block_input = false;
    settings.workers = 2;
    settings
}

/// Builds a cache for `nodes` rooted at `dir`.
pub fn build_cache(dir: &Path, nodes: Vec<ConfigNode>, settings: &EngineSettings) -> Arc<CacheHandle> {
    let scales = ScaleSet::compute(1.0, settings.capture.scale, None).unwrap();
    let handle = Arc::new(CacheHandle::new(TemplateCache::empty(scales)));
    handle
        .rebuild_now(RebuildRequest {
            tree: Arc::new(ConfigTree {
                root_dir: dir.to_path_buf(),
                nodes,
            }),
            root_dir: dir.to_path_buf(),
            window_scale: 1.0,
            capture_scale: settings.capture.scale,
            sweep: None,
        })
        .unwrap();
    handle
}

/// A scheduler wired to a scripted screen and a click recorder.
pub struct Rig {
    pub scheduler: Scheduler,
    pub screen: Arc<Mutex<Option<Frame>>>,
    pub clicks: ClickLog,
    pub shared: Arc<Shared>,
    pub cache: Arc<CacheHandle>,
    pub t0: Instant,
    _dir: TempDir,
}

pub struct RigBuilder {
    dir: TempDir,
    settings: EngineSettings,
    nodes: Vec<ConfigNode>,
    ocr: Option<Arc<dyn OcrEvaluator>>,
}

impl RigBuilder {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            settings: quiet_settings(),
            nodes: Vec::new(),
            ocr: None,
        }
    }

    /// Registers sprite `seed` on disk as `<name>.png`.
    pub fn sprite(self, name: &str, seed: u32) -> Self {
        write_sprite(self.dir.path(), name, seed);
        self
    }

    pub fn node(mut self, node: ConfigNode) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn settings(mut self, edit: impl FnOnce(&mut EngineSettings)) -> Self {
        edit(&mut self.settings);
        self
    }

    pub fn ocr(mut self, evaluator: Arc<dyn OcrEvaluator>) -> Self {
        self.ocr = Some(evaluator);
        self
    }

    pub fn build(self) -> Rig {
        let cache = build_cache(self.dir.path(), self.nodes, &self.settings);
        let screen = Arc::new(Mutex::new(None));
        let frames = Arc::clone(&screen);
        let capture = CaptureManager::new(
            "scene",
            Box::new(move |_name: &str| {
                Ok(Box::new(SceneGrabber {
                    frame: Arc::clone(&frames),
                }) as Box<dyn ScreenGrabber>)
            }),
        );
        let clicks = ClickLog::default();
        let shared = Arc::new(Shared::new(
            None,
            QuickTimerManager::new(
                Duration::from_secs_f64(self.settings.quick_timer.grace_secs),
                self.settings.quick_timer.threshold,
            ),
        ));
        let executor = ActionExecutor::new(Box::new(clicks.clone()), self.settings.action.clone());
        let pool = Arc::new(WorkerPool::new(self.settings.workers).unwrap());
        let t0 = Instant::now();
        let scheduler = Scheduler::new(
            SchedulerParts {
                settings: self.settings,
                shared: Arc::clone(&shared),
                cache: Arc::clone(&cache),
                capture: Arc::new(capture),
                pool,
                executor,
                ocr: self.ocr,
                lifecycle: None,
            },
            t0,
        );
        Rig {
            scheduler,
            screen,
            clicks,
            shared,
            cache,
            t0,
            _dir: self.dir,
        }
    }
}

impl Rig {
    pub fn show(&self, placements: &[(u32, u32, u32)]) {
        *self.screen.lock().unwrap() = Some(scene(placements));
    }

    pub fn blank(&self) {
        *self.screen.lock().unwrap() = None;
    }

    /// Ticks at `t0 + secs`.
    pub fn tick_at(&mut self, secs: f64) -> TickOutcome {
        let now = self.t0 + Duration::from_secs_f64(secs);
        let wall = chrono::NaiveTime::from_hms_opt(12, 0, 0).unwrap();
        self.scheduler.tick(now, wall)
    }

    pub fn clicked(outcome: &TickOutcome) -> Option<String> {
        match outcome {
            TickOutcome::Ran {
                clicked: Some(path),
                ..
            } => Some(path.as_str().to_string()),
            _ => None,
        }
    }
}
