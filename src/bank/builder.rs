//! Depth-first compilation of the configuration tree into a `TemplateCache`.

use crate::bank::{CacheEntry, FolderContext, FolderSchedule, ScaleSet, TemplateCache};
use crate::config::{ConfigNode, ConfigTree, FolderMode, FolderSettings, ItemPath, ItemSettings, RoiMode};
use crate::image::io::load_rgb_image;
use crate::template::ScaledTemplate;
use crate::trace::{trace_debug, trace_event, trace_span, trace_warn};
use crate::util::math::secs;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Items left out of a build and why.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BuildReport {
    /// Entries that made it into the cache.
    pub loaded: usize,
    /// Skipped items with a short reason.
    pub skipped: Vec<(ItemPath, String)>,
}

/// Compiles configuration trees against one scale set.
#[derive(Clone, Debug)]
pub struct CacheBuilder {
    root_dir: PathBuf,
    scales: ScaleSet,
}

#[derive(Clone)]
struct ScopeRef {
    path: String,
    mode: FolderMode,
}

struct PendingItem {
    path: ItemPath,
    file: PathBuf,
    settings: ItemSettings,
    folder: FolderContext,
}

#[derive(Default)]
struct Walk {
    items: Vec<PendingItem>,
    scopes: Vec<(String, FolderSettings)>,
}

impl CacheBuilder {
    /// Files are resolved against `root_dir` unless the tree sets its own.
    pub fn new(root_dir: impl Into<PathBuf>, scales: ScaleSet) -> Self {
        Self {
            root_dir: root_dir.into(),
            scales,
        }
    }

    pub fn scales(&self) -> &ScaleSet {
        &self.scales
    }

    /// Builds a cache. Wake times of timer-priority scopes present in
    /// `previous` are kept; new scopes wake one interval after `now`.
    pub fn build(
        &self,
        tree: &ConfigTree,
        previous: Option<&TemplateCache>,
        now: Instant,
    ) -> (TemplateCache, BuildReport) {
        let _span = trace_span!("cache_build", scales = self.scales.len()).entered();
        let root = if tree.root_dir.as_os_str().is_empty() {
            self.root_dir.clone()
        } else if tree.root_dir.is_absolute() {
            tree.root_dir.clone()
        } else {
            self.root_dir.join(&tree.root_dir)
        };

        let walk = walk(&tree.nodes, "", None, &root);
        let start_index = self.scales.base_index();
        let loaded: Vec<Result<Vec<ScaledTemplate>, String>> = walk
            .items
            .par_iter()
            .map(|item| self.load_item(item))
            .collect();

        let mut cache = TemplateCache::empty(self.scales.clone());
        let mut report = BuildReport::default();
        for (order, (item, result)) in walk.items.into_iter().zip(loaded).enumerate() {
            match result {
                Ok(templates) => {
                    let backup = item.settings.backup;
                    let entry = Arc::new(CacheEntry::new(
                        item.path,
                        item.settings,
                        templates,
                        item.folder,
                        order,
                        start_index,
                    ));
                    if backup {
                        cache.backup.push(entry);
                    } else {
                        cache.primary.push(entry);
                    }
                    report.loaded += 1;
                }
                Err(reason) => report.skipped.push((item.path, reason)),
            }
        }

        for (scope, settings) in walk.scopes {
            let items: Vec<ItemPath> = cache
                .primary
                .iter()
                .filter(|entry| entry.folder.scope == scope)
                .map(|entry| entry.path.clone())
                .collect();
            let trigger = settings.trigger.as_deref().and_then(|name| {
                items
                    .iter()
                    .find(|path| path.name() == name || path.as_str() == name)
                    .cloned()
            });
            if settings.trigger.is_some() && trigger.is_none() {
                trace_warn!(
                    "priority_trigger_missing",
                    scope = scope.as_str(),
                    trigger = settings.trigger.as_deref().unwrap_or_default()
                );
            }
            let schedule = FolderSchedule {
                mode: settings.mode,
                cooldown: secs(settings.cooldown_secs),
                trigger,
                items,
                step_interval: secs(settings.sequence_interval_secs),
                timer_interval: secs(settings.timer_interval_secs),
                timer_duration: secs(settings.timer_duration_secs),
                activity_timeout: settings.activity_timeout_secs.map(secs),
            };
            if schedule.mode == FolderMode::PriorityTimer {
                let wake = previous
                    .and_then(|prev| prev.priority_timers.get(&scope).copied())
                    .unwrap_or(now + schedule.timer_interval);
                cache.priority_timers.insert(scope.clone(), wake);
            }
            cache.folders.insert(scope, schedule);
        }

        trace_event!(
            "cache_built",
            primary = cache.primary.len(),
            backup = cache.backup.len(),
            skipped = report.skipped.len()
        );
        (cache, report)
    }

    fn load_item(&self, item: &PendingItem) -> Result<Vec<ScaledTemplate>, String> {
        let path = item.path.as_str();
        if !item.settings.enabled {
            trace_debug!("item_skipped", path = path, reason = "disabled");
            return Err("disabled".to_string());
        }
        if !item.settings.has_click_target() {
            trace_debug!("item_skipped", path = path, reason = "no click target");
            return Err("no click target".to_string());
        }
        let source = load_rgb_image(&item.file).map_err(|err| {
            trace_warn!("item_load_failed", path = path, error = err.to_string().as_str());
            err.to_string()
        })?;
        let source = match &item.settings.roi {
            Some(roi) if roi.mode == RoiMode::Fixed => {
                let inside = source.bounds().intersect(&roi.rect) == Some(roi.rect);
                match source.crop(roi.rect) {
                    Some(cropped) if inside => cropped,
                    _ => {
                        trace_warn!("item_skipped", path = path, reason = "roi outside image");
                        return Err("roi outside image".to_string());
                    }
                }
            }
            _ => source,
        };

        let templates: Vec<ScaledTemplate> = self
            .scales
            .scales()
            .iter()
            .filter_map(|&scale| match ScaledTemplate::from_source(&source, scale) {
                Ok(tpl) => Some(tpl),
                Err(err) => {
                    trace_debug!(
                        "scale_variant_skipped",
                        path = path,
                        scale = scale,
                        error = err.to_string().as_str()
                    );
                    None
                }
            })
            .collect();
        if templates.is_empty() {
            trace_warn!("item_skipped", path = path, reason = "no usable scale variant");
            return Err("no usable scale variant".to_string());
        }
        Ok(templates)
    }
}

/// Walks `nodes` depth-first in declared order.
///
/// Top-level folders establish scopes with their own mode; nested folders
/// inherit the enclosing scope. Excluded folders prune at any depth.
fn walk(nodes: &[ConfigNode], parent: &str, scope: Option<&ScopeRef>, root: &Path) -> Walk {
    let mut out = Walk::default();
    for node in nodes {
        match node {
            ConfigNode::Image(image) => {
                let folder = scope.map_or_else(FolderContext::default, |s| FolderContext {
                    scope: s.path.clone(),
                    mode: s.mode,
                });
                let file = if image.file.is_absolute() {
                    image.file.clone()
                } else {
                    root.join(&image.file)
                };
                out.items.push(PendingItem {
                    path: ItemPath::join(parent, &image.name),
                    file,
                    settings: image.settings.clone(),
                    folder,
                });
            }
            ConfigNode::Folder(folder) => {
                let path = ItemPath::join(parent, &folder.name).as_str().to_string();
                let mode = folder.settings.mode;
                if mode == FolderMode::Excluded {
                    trace_debug!("folder_excluded", path = path.as_str());
                    continue;
                }
                // Only top-level folders open a scope; deeper folders inherit it
                // whatever their own mode.
                let child_scope = match scope {
                    Some(s) => s.clone(),
                    None => {
                        out.scopes.push((path.clone(), folder.settings.clone()));
                        ScopeRef {
                            path: path.clone(),
                            mode,
                        }
                    }
                };
                let sub = walk(&folder.children, &path, Some(&child_scope), root);
                out.items.extend(sub.items);
                out.scopes.extend(sub.scopes);
            }
        }
    }
    out
}
