//! Persisted item and folder configuration consumed by the cache builder.
//!
//! Every settings struct is `#[serde(default)]` and carries a flattened
//! `extra` map, so documents written by newer tools round-trip without
//! losing fields the engine does not understand.

use crate::image::Rect;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::PathBuf;

mod engine;

pub use engine::{
    ActionSettings, CaptureSettings, EcoSettings, EngineSettings, LifecycleSettings,
    PrioritySettings, QuickTimerSettings, ScaleSettings, ScaleSweep, StabilitySettings,
};

/// Slash-separated path of a registered image inside the configuration tree.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemPath(String);

impl ItemPath {
    /// Wraps a path string.
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Joins a child name onto a parent path.
    pub fn join(parent: &str, name: &str) -> Self {
        if parent.is_empty() {
            Self(name.to_string())
        } else {
            Self(format!("{parent}/{name}"))
        }
    }

    /// The path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path component.
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for ItemPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemPath {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// How a match is turned into a click position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClickMode {
    /// Fixed offset inside the template (`click_point`).
    #[default]
    Point,
    /// Center of the matched rectangle.
    Range,
    /// Uniformly random point inside the matched rectangle.
    Random,
}

/// Whether an ROI crops the template or restricts the search window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoiMode {
    /// Template pixels outside `rect` are dropped before matching.
    #[default]
    Fixed,
    /// Matching only searches `rect` of the recognition area.
    Variable,
}

/// Region of interest for one item.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoiSettings {
    /// Crop or search-window semantics.
    pub mode: RoiMode,
    /// Template-relative (fixed) or area-relative (variable) rectangle.
    pub rect: Rect,
}

/// Condition text recognition must confirm before an item may be clicked.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrCondition {
    /// Region to read, relative to the template's top-left at base scale.
    pub region: Rect,
    /// Text the evaluator compares against.
    pub expected: String,
    /// Minimum recognition confidence (0..100).
    pub min_confidence: f32,
    /// Evaluator-specific fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Daily wall-clock windows in which an item may be clicked.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerSchedule {
    /// Start times as `HH:MM` or `HH:MM:SS`.
    pub times: Vec<String>,
    /// Length of each window in seconds.
    pub window_secs: f64,
}

impl TimerSchedule {
    /// Returns true if `now` falls inside any window. Unparseable entries are ignored.
    pub fn is_open(&self, now: NaiveTime) -> bool {
        let window = chrono::Duration::milliseconds((self.window_secs.max(0.0) * 1000.0) as i64);
        self.times.iter().filter_map(|t| parse_time(t)).any(|start| {
            let elapsed = now.signed_duration_since(start);
            let elapsed = if elapsed < chrono::Duration::zero() {
                elapsed + chrono::Duration::days(1)
            } else {
                elapsed
            };
            elapsed <= window
        })
    }
}

fn parse_time(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .ok()
}

/// Per-image settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemSettings {
    /// Disabled items are left out of the cache.
    pub enabled: bool,
    /// Click strategy.
    pub click_mode: ClickMode,
    /// Template-relative click offset for `ClickMode::Point`.
    pub click_point: Option<[i32; 2]>,
    /// Template-relative click area for `ClickMode::Range` and `ClickMode::Random`.
    /// The whole match is used when unset.
    pub click_rect: Option<Rect>,
    /// Use the secondary mouse button.
    pub right_click: bool,
    /// Optional region of interest.
    pub roi: Option<RoiSettings>,
    /// Minimum correlation score.
    pub threshold: f32,
    /// Seconds a detection must persist before it may be clicked.
    pub interval_secs: f64,
    /// Extra seconds before the same item may be clicked again.
    pub debounce_secs: f64,
    /// Deferred (countdown) item instead of an immediate one.
    pub backup: bool,
    /// Dwell time of the countdown for backup items.
    pub backup_dwell_secs: f64,
    /// Optional text confirmation.
    pub ocr: Option<OcrCondition>,
    /// Optional fixed-time schedule.
    pub timer: Option<TimerSchedule>,
    /// Unknown fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for ItemSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            click_mode: ClickMode::Point,
            click_point: None,
            click_rect: None,
            right_click: false,
            roi: None,
            threshold: 0.8,
            interval_secs: 0.0,
            debounce_secs: 0.0,
            backup: false,
            backup_dwell_secs: 5.0,
            ocr: None,
            timer: None,
            extra: Map::new(),
        }
    }
}

impl ItemSettings {
    /// Point strategy needs an explicit offset; the other strategies fall
    /// back to the match rect, but an empty `click_rect` disables them.
    pub fn has_click_target(&self) -> bool {
        match self.click_mode {
            ClickMode::Point => self.click_point.is_some(),
            ClickMode::Range | ClickMode::Random => {
                self.click_rect.is_none_or(|r| r.is_valid())
            }
        }
    }

    /// Origin of the fixed ROI crop, `(0, 0)` without one.
    pub fn roi_origin(&self) -> (i32, i32) {
        match &self.roi {
            Some(roi) if roi.mode == RoiMode::Fixed => (roi.rect.x, roi.rect.y),
            _ => (0, 0),
        }
    }

    /// Search window for variable ROIs.
    pub fn search_rect(&self) -> Option<Rect> {
        match &self.roi {
            Some(roi) if roi.mode == RoiMode::Variable && roi.rect.is_valid() => Some(roi.rect),
            _ => None,
        }
    }
}

/// Behaviour of a folder and everything beneath it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FolderMode {
    /// Plain grouping.
    #[default]
    Normal,
    /// Subtree is ignored.
    Excluded,
    /// A click on any item pauses the whole folder.
    Cooldown,
    /// A match narrows the search to this folder until every item was clicked.
    PriorityImage,
    /// Periodically narrows the search to this folder for a fixed duration.
    PriorityTimer,
    /// A match clicks this folder's items in declared order.
    PrioritySequence,
}

impl FolderMode {
    /// Modes that narrow candidate search while active.
    pub fn is_priority(self) -> bool {
        matches!(
            self,
            FolderMode::PriorityImage | FolderMode::PriorityTimer | FolderMode::PrioritySequence
        )
    }
}

/// Per-folder settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FolderSettings {
    /// Folder behaviour.
    pub mode: FolderMode,
    /// Cooldown length for `FolderMode::Cooldown`.
    pub cooldown_secs: f64,
    /// Period between timer-priority episodes.
    pub timer_interval_secs: f64,
    /// Length of one timer-priority episode.
    pub timer_duration_secs: f64,
    /// Item name that starts an image/sequence priority episode (any item when unset).
    pub trigger: Option<String>,
    /// Delay between sequence steps.
    pub sequence_interval_secs: f64,
    /// No-activity timeout override for priority episodes.
    pub activity_timeout_secs: Option<f64>,
    /// Unknown fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for FolderSettings {
    fn default() -> Self {
        Self {
            mode: FolderMode::Normal,
            cooldown_secs: 0.0,
            timer_interval_secs: 300.0,
            timer_duration_secs: 30.0,
            trigger: None,
            sequence_interval_secs: 0.5,
            activity_timeout_secs: None,
            extra: Map::new(),
        }
    }
}

/// Folder node in the configuration tree.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FolderNode {
    /// Folder name (one path component).
    pub name: String,
    /// Folder settings.
    #[serde(default)]
    pub settings: FolderSettings,
    /// Children in declared order.
    #[serde(default)]
    pub children: Vec<ConfigNode>,
}

/// Registered image node.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageNode {
    /// Item name (one path component).
    pub name: String,
    /// Bitmap location, relative to the tree's `root_dir` unless absolute.
    pub file: PathBuf,
    /// Item settings.
    #[serde(default)]
    pub settings: ItemSettings,
}

/// Node of the configuration tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfigNode {
    /// A folder.
    Folder(FolderNode),
    /// A registered image.
    Image(ImageNode),
}

impl ConfigNode {
    /// Convenience constructor for a folder.
    pub fn folder(name: &str, settings: FolderSettings, children: Vec<ConfigNode>) -> Self {
        ConfigNode::Folder(FolderNode {
            name: name.to_string(),
            settings,
            children,
        })
    }

    /// Convenience constructor for an image.
    pub fn image(name: &str, file: impl Into<PathBuf>, settings: ItemSettings) -> Self {
        ConfigNode::Image(ImageNode {
            name: name.to_string(),
            file: file.into(),
            settings,
        })
    }
}

/// Whole persisted configuration tree.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigTree {
    /// Directory image files are resolved against.
    pub root_dir: PathBuf,
    /// Top-level nodes in declared order.
    pub nodes: Vec<ConfigNode>,
}
