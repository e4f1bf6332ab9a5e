mod common;

use common::{item, range_item, write_sprite};
use screenwatch::bank::{CacheBuilder, CacheHandle, RebuildRequest, ScaleSet, TemplateCache};
use screenwatch::config::{
    ClickMode, ConfigNode, ConfigTree, FolderMode, FolderSettings, ItemPath, ItemSettings,
    RoiMode, RoiSettings, ScaleSweep,
};
use screenwatch::image::Rect;
use screenwatch::worker::{TicketState, WorkerPool};
use screenwatch::EngineError;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn request(dir: &TempDir, nodes: Vec<ConfigNode>) -> RebuildRequest {
    RebuildRequest {
        tree: Arc::new(ConfigTree {
            root_dir: dir.path().to_path_buf(),
            nodes,
        }),
        root_dir: dir.path().to_path_buf(),
        window_scale: 1.0,
        capture_scale: 1.0,
        sweep: None,
    }
}

fn empty_handle() -> Arc<CacheHandle> {
    let scales = ScaleSet::compute(1.0, 1.0, None).unwrap();
    Arc::new(CacheHandle::new(TemplateCache::empty(scales)))
}

#[test]
fn unusable_items_are_reported_not_fatal() {
    let dir = TempDir::new().unwrap();
    write_sprite(dir.path(), "ok", 1);
    write_sprite(dir.path(), "off", 2);
    write_sprite(dir.path(), "pointless", 3);
    write_sprite(dir.path(), "cropped", 4);

    let nodes = vec![
        item("ok", range_item()),
        item("missing", range_item()),
        item(
            "off",
            ItemSettings {
                enabled: false,
                ..range_item()
            },
        ),
        item(
            "pointless",
            ItemSettings {
                click_mode: ClickMode::Point,
                click_point: None,
                ..ItemSettings::default()
            },
        ),
        item(
            "cropped",
            ItemSettings {
                roi: Some(RoiSettings {
                    mode: RoiMode::Fixed,
                    rect: Rect::new(10, 10, 40, 40),
                }),
                ..range_item()
            },
        ),
    ];
    let handle = empty_handle();
    let summary = handle.rebuild_now(request(&dir, nodes)).unwrap();

    assert_eq!(summary.loaded, 1);
    let skipped: Vec<&str> = summary.skipped.iter().map(|(p, _)| p.as_str()).collect();
    assert_eq!(skipped, ["missing", "off", "pointless", "cropped"]);
    let cache = handle.snapshot();
    assert_eq!(cache.len(), 1);
    assert!(cache.entry(&ItemPath::from("ok")).is_some());
}

#[test]
fn fixed_roi_crops_the_template() {
    let dir = TempDir::new().unwrap();
    write_sprite(dir.path(), "icon", 5);
    let nodes = vec![item(
        "icon",
        ItemSettings {
            roi: Some(RoiSettings {
                mode: RoiMode::Fixed,
                rect: Rect::new(4, 6, 12, 10),
            }),
            ..range_item()
        },
    )];
    let handle = empty_handle();
    handle.rebuild_now(request(&dir, nodes)).unwrap();
    let cache = handle.snapshot();
    let entry = cache.entry(&ItemPath::from("icon")).unwrap();
    assert_eq!((entry.templates()[0].width(), entry.templates()[0].height()), (12, 10));
}

#[test]
fn rebuilding_the_same_tree_is_idempotent() {
    let dir = TempDir::new().unwrap();
    write_sprite(dir.path(), "a", 6);
    write_sprite(dir.path(), "b", 7);
    let timer = FolderSettings {
        mode: FolderMode::PriorityTimer,
        ..FolderSettings::default()
    };
    let nodes = vec![
        item("a", range_item()),
        ConfigNode::folder("t", timer, vec![item("b", range_item())]),
    ];
    let handle = empty_handle();
    let first = handle.rebuild_now(request(&dir, nodes.clone())).unwrap();
    let before = handle.snapshot();
    let second = handle.rebuild_now(request(&dir, nodes)).unwrap();
    let after = handle.snapshot();

    assert_eq!(first.generation + 1, second.generation);
    assert_eq!(*before, *after);
    assert_eq!(before.priority_timers()["t"], after.priority_timers()["t"]);
}

#[test]
fn folder_modes_shape_scopes() {
    let dir = TempDir::new().unwrap();
    for (name, seed) in [("a", 1), ("b", 2), ("c", 3), ("d", 4), ("e", 5), ("f", 6)] {
        write_sprite(dir.path(), name, seed);
    }
    let cooldown = FolderSettings {
        mode: FolderMode::Cooldown,
        cooldown_secs: 10.0,
        ..FolderSettings::default()
    };
    let excluded = FolderSettings {
        mode: FolderMode::Excluded,
        ..FolderSettings::default()
    };
    let nodes = vec![
        ConfigNode::folder(
            "daily",
            cooldown,
            vec![
                item("a", range_item()),
                ConfigNode::folder("inner", FolderSettings::default(), vec![item("b", range_item())]),
                ConfigNode::folder("skip", excluded, vec![item("c", range_item())]),
            ],
        ),
        ConfigNode::folder(
            "misc",
            FolderSettings::default(),
            vec![
                item("d", range_item()),
                ConfigNode::folder(
                    "burst",
                    FolderSettings {
                        mode: FolderMode::PriorityImage,
                        ..FolderSettings::default()
                    },
                    vec![item("f", range_item())],
                ),
            ],
        ),
        item("e", range_item()),
    ];
    let handle = empty_handle();
    handle.rebuild_now(request(&dir, nodes)).unwrap();
    let cache = handle.snapshot();

    let scope = |path: &str| {
        cache
            .entry(&ItemPath::from(path))
            .map(|e| e.folder().scope.clone())
    };
    assert_eq!(scope("daily/a").as_deref(), Some("daily"));
    assert_eq!(scope("daily/inner/b").as_deref(), Some("daily"));
    assert_eq!(scope("daily/skip/c"), None);
    assert_eq!(scope("misc/d").as_deref(), Some("misc"));
    // A special mode below the top level does not open a scope of its own.
    assert_eq!(scope("misc/burst/f").as_deref(), Some("misc"));
    let burst = cache.entry(&ItemPath::from("misc/burst/f")).unwrap();
    assert_eq!(burst.folder().mode, FolderMode::Normal);
    assert!(cache.folder("misc/burst").is_none());
    assert_eq!(cache.folder("misc").unwrap().items.len(), 2);
    assert_eq!(scope("e").as_deref(), Some(""));

    let daily = cache.folder("daily").unwrap();
    assert_eq!(daily.mode, FolderMode::Cooldown);
    assert_eq!(daily.cooldown, Duration::from_secs(10));
    assert_eq!(daily.items.len(), 2);
}

#[test]
fn sweep_builds_one_variant_per_scale() {
    let dir = TempDir::new().unwrap();
    write_sprite(dir.path(), "a", 8);
    let sweep = ScaleSweep {
        center: 1.0,
        range: 0.25,
        steps: 3,
    };
    let scales = ScaleSet::compute(1.0, 1.0, Some(&sweep)).unwrap();
    assert_eq!(scales.scales(), [0.75, 1.0, 1.25]);
    assert_eq!(scales.base_index(), 1);

    let builder = CacheBuilder::new(dir.path(), scales);
    let tree = ConfigTree {
        root_dir: Default::default(),
        nodes: vec![item("a", range_item())],
    };
    let (cache, report) = builder.build(&tree, None, Instant::now());
    assert_eq!(report.loaded, 1);
    let entry = cache.entry(&ItemPath::from("a")).unwrap();
    let widths: Vec<usize> = entry.templates().iter().map(|t| t.width()).collect();
    assert_eq!(widths, [18, 24, 30]);
    assert_eq!(entry.hints().last_index(), 1);
}

#[test]
fn invalid_scales_are_rejected() {
    assert!(matches!(
        ScaleSet::compute(0.0, 1.0, None),
        Err(EngineError::InvalidScale { .. })
    ));
    assert!(matches!(
        ScaleSet::compute(1.0, f32::NAN, None),
        Err(EngineError::InvalidScale { .. })
    ));
}

#[test]
fn concurrent_rebuild_requests_are_dropped() {
    let dir = TempDir::new().unwrap();
    write_sprite(dir.path(), "a", 9);
    let pool = WorkerPool::new(1).unwrap();
    let handle = empty_handle();

    // Occupy the only worker so the first rebuild stays queued.
    let (release, gate) = mpsc::channel::<()>();
    let blocker = pool.submit(move || gate.recv().is_ok());

    let first = handle.request_rebuild(&pool, request(&dir, vec![item("a", range_item())]));
    assert!(first.is_some());
    assert!(handle.is_rebuilding());
    assert!(handle
        .request_rebuild(&pool, request(&dir, vec![item("a", range_item())]))
        .is_none());
    assert!(matches!(
        handle.rebuild_now(request(&dir, Vec::new())),
        Err(EngineError::RebuildInProgress)
    ));

    release.send(()).unwrap();
    assert!(matches!(blocker.wait(Duration::from_secs(5)), TicketState::Ready(true)));
    match first.unwrap().wait(Duration::from_secs(5)) {
        TicketState::Ready(Ok(summary)) => assert_eq!(summary.loaded, 1),
        other => panic!("rebuild did not finish: {other:?}"),
    }
    assert!(!handle.is_rebuilding());
    assert_eq!(handle.snapshot().len(), 1);
}
