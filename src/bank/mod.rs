//! Template cache: every registered image compiled into scaled templates.
//!
//! The cache is an immutable snapshot built off the scheduler thread and
//! swapped in whole (`CacheHandle`). Only the per-entry match hints change
//! after a build; they live in atomics and are ignored by equality, so two
//! builds of the same configuration compare equal.

mod builder;
mod handle;
mod scales;

pub use builder::{BuildReport, CacheBuilder};
pub use handle::{CacheHandle, RebuildRequest, RebuildSummary, RebuildTicket};
pub use scales::ScaleSet;

use crate::config::{FolderMode, ItemPath, ItemSettings};
use crate::template::ScaledTemplate;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Scope an entry inherited from its folders.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct FolderContext {
    /// Path of the folder that established the scope; empty for the root.
    pub scope: String,
    /// Mode of that folder.
    pub mode: FolderMode,
}

/// Scope-level data collected during a build.
#[derive(Clone, Debug, PartialEq)]
pub struct FolderSchedule {
    pub mode: FolderMode,
    /// Pause applied to the whole scope after a click (cooldown mode).
    pub cooldown: Duration,
    /// Item that starts an image/sequence episode; any item when `None`.
    pub trigger: Option<ItemPath>,
    /// Primary items in declared order (sequence steps, image requirements).
    pub items: Vec<ItemPath>,
    /// Delay between sequence steps.
    pub step_interval: Duration,
    /// Period between timer episodes.
    pub timer_interval: Duration,
    /// Length of one timer episode.
    pub timer_duration: Duration,
    /// Per-folder no-activity timeout.
    pub activity_timeout: Option<Duration>,
}

/// Mutable search hints, shared by every tick that sees the entry.
#[derive(Debug)]
pub struct EntryHints {
    best_scale: AtomicU32,
    last_index: AtomicUsize,
}

impl EntryHints {
    fn new(scale: f32, index: usize) -> Self {
        Self {
            best_scale: AtomicU32::new(scale.to_bits()),
            last_index: AtomicUsize::new(index),
        }
    }

    /// Scale of the most recent successful match.
    pub fn best_scale(&self) -> f32 {
        f32::from_bits(self.best_scale.load(Ordering::Relaxed))
    }

    /// Template index of the most recent successful match.
    pub fn last_index(&self) -> usize {
        self.last_index.load(Ordering::Relaxed)
    }

    /// Records a successful match.
    pub fn record(&self, index: usize, scale: f32) {
        self.last_index.store(index, Ordering::Relaxed);
        self.best_scale.store(scale.to_bits(), Ordering::Relaxed);
    }
}

/// One registered image, ready for matching.
#[derive(Debug)]
pub struct CacheEntry {
    pub(crate) path: ItemPath,
    pub(crate) settings: ItemSettings,
    pub(crate) templates: Vec<ScaledTemplate>,
    pub(crate) folder: FolderContext,
    pub(crate) order: usize,
    pub(crate) hints: EntryHints,
}

impl CacheEntry {
    pub(crate) fn new(
        path: ItemPath,
        settings: ItemSettings,
        templates: Vec<ScaledTemplate>,
        folder: FolderContext,
        order: usize,
        start_index: usize,
    ) -> Self {
        let start_index = start_index.min(templates.len().saturating_sub(1));
        let start_scale = templates.get(start_index).map_or(1.0, |t| t.scale());
        Self {
            path,
            settings,
            templates,
            folder,
            order,
            hints: EntryHints::new(start_scale, start_index),
        }
    }

    pub fn path(&self) -> &ItemPath {
        &self.path
    }

    pub fn settings(&self) -> &ItemSettings {
        &self.settings
    }

    /// Scale variants in ascending scale order.
    pub fn templates(&self) -> &[ScaledTemplate] {
        &self.templates
    }

    pub fn folder(&self) -> &FolderContext {
        &self.folder
    }

    /// Position in the depth-first walk.
    pub fn order(&self) -> usize {
        self.order
    }

    pub fn hints(&self) -> &EntryHints {
        &self.hints
    }

    /// Seconds a detection must persist.
    pub fn interval(&self) -> Duration {
        crate::util::math::secs(self.settings.interval_secs)
    }
}

impl PartialEq for CacheEntry {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
            && self.settings == other.settings
            && self.templates == other.templates
            && self.folder == other.folder
            && self.order == other.order
    }
}

/// Immutable result of one cache build.
#[derive(Clone, Debug, PartialEq)]
pub struct TemplateCache {
    pub(crate) primary: Vec<Arc<CacheEntry>>,
    pub(crate) backup: Vec<Arc<CacheEntry>>,
    pub(crate) folders: BTreeMap<String, FolderSchedule>,
    pub(crate) priority_timers: BTreeMap<String, Instant>,
    pub(crate) scales: ScaleSet,
}

impl TemplateCache {
    /// A cache with no entries.
    pub fn empty(scales: ScaleSet) -> Self {
        Self {
            primary: Vec::new(),
            backup: Vec::new(),
            folders: BTreeMap::new(),
            priority_timers: BTreeMap::new(),
            scales,
        }
    }

    /// Immediate-click entries in declared order.
    pub fn primary(&self) -> &[Arc<CacheEntry>] {
        &self.primary
    }

    /// Countdown entries in declared order.
    pub fn backup(&self) -> &[Arc<CacheEntry>] {
        &self.backup
    }

    /// Scope data keyed by scope path.
    pub fn folders(&self) -> &BTreeMap<String, FolderSchedule> {
        &self.folders
    }

    pub fn folder(&self, scope: &str) -> Option<&FolderSchedule> {
        self.folders.get(scope)
    }

    /// Initial wake times of timer-priority scopes.
    pub fn priority_timers(&self) -> &BTreeMap<String, Instant> {
        &self.priority_timers
    }

    pub fn scales(&self) -> &ScaleSet {
        &self.scales
    }

    /// Looks up an entry in either namespace.
    pub fn entry(&self, path: &ItemPath) -> Option<&Arc<CacheEntry>> {
        self.primary
            .iter()
            .chain(self.backup.iter())
            .find(|entry| &entry.path == path)
    }

    pub fn len(&self) -> usize {
        self.primary.len() + self.backup.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
