mod common;

use common::{item, range_item, write_sprite};
use rand::rngs::StdRng;
use rand::SeedableRng;
use screenwatch::action::{resolve_click, Geometry};
use screenwatch::bank::{CacheBuilder, ScaleSet, TemplateCache};
use screenwatch::config::{ClickMode, ConfigTree, ItemPath, ItemSettings, RoiMode, RoiSettings};
use screenwatch::image::Rect;
use screenwatch::MatchResult;
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;

fn cache_with(settings: ItemSettings) -> (TemplateCache, TempDir) {
    let dir = TempDir::new().unwrap();
    write_sprite(dir.path(), "btn", 61);
    let builder = CacheBuilder::new(dir.path(), ScaleSet::compute(1.0, 1.0, None).unwrap());
    let tree = ConfigTree {
        root_dir: Default::default(),
        nodes: vec![item("btn", settings)],
    };
    let (cache, report) = builder.build(&tree, None, Instant::now());
    assert_eq!(report.loaded, 1);
    (cache, dir)
}

fn hit(cache: &TemplateCache, rect: Rect, scale: f32) -> MatchResult {
    let entry = Arc::clone(cache.entry(&ItemPath::from("btn")).unwrap());
    MatchResult {
        path: entry.path().clone(),
        confidence: 0.95,
        rect,
        scale,
        template_index: 0,
        entry,
    }
}

const AREA: Geometry = Geometry {
    origin: (100, 100),
    capture_scale: 1.0,
    window_scale: 1.0,
};

#[test]
fn point_click_is_relative_to_the_roi_crop() {
    let (cache, _dir) = cache_with(ItemSettings {
        click_mode: ClickMode::Point,
        click_point: Some([30, 25]),
        roi: Some(RoiSettings {
            mode: RoiMode::Fixed,
            rect: Rect::new(10, 5, 12, 10),
        }),
        ..ItemSettings::default()
    });
    let mut rng = StdRng::seed_from_u64(1);
    let result = hit(&cache, Rect::new(50, 40, 12, 10), 1.0);
    assert_eq!(resolve_click(&result, &AREA, &mut rng), Some((170, 160)));

    // Offsets grow with the window scale, not with the sweep variant.
    let wide = Geometry {
        window_scale: 2.0,
        ..AREA
    };
    let result = hit(&cache, Rect::new(50, 40, 24, 20), 2.0);
    assert_eq!(resolve_click(&result, &wide, &mut rng), Some((190, 180)));
}

#[test]
fn range_click_uses_the_base_scaled_center() {
    let (cache, _dir) = cache_with(range_item());
    let mut rng = StdRng::seed_from_u64(2);
    let result = hit(&cache, Rect::new(20, 30, 24, 24), 1.0);
    assert_eq!(resolve_click(&result, &AREA, &mut rng), Some((132, 142)));

    // A 1.25 sweep variant still clicks the center of the base-sized rect.
    let result = hit(&cache, Rect::new(20, 30, 30, 30), 1.25);
    assert_eq!(resolve_click(&result, &AREA, &mut rng), Some((132, 142)));

    let halved = Geometry {
        capture_scale: 0.5,
        ..AREA
    };
    let result = hit(&cache, Rect::new(20, 30, 12, 12), 0.5);
    assert_eq!(resolve_click(&result, &halved, &mut rng), Some((152, 172)));
}

#[test]
fn random_click_stays_inside_the_match() {
    let (cache, _dir) = cache_with(ItemSettings {
        click_mode: ClickMode::Random,
        ..ItemSettings::default()
    });
    let mut rng = StdRng::seed_from_u64(3);
    let result = hit(&cache, Rect::new(20, 30, 24, 24), 1.0);
    for _ in 0..200 {
        let (x, y) = resolve_click(&result, &AREA, &mut rng).unwrap();
        assert!((120..144).contains(&x), "x = {x}");
        assert!((130..154).contains(&y), "y = {y}");
    }
}

fn cropped(mode: ClickMode) -> ItemSettings {
    ItemSettings {
        click_mode: mode,
        click_rect: Some(Rect::new(14, 9, 8, 6)),
        roi: Some(RoiSettings {
            mode: RoiMode::Fixed,
            rect: Rect::new(10, 5, 12, 10),
        }),
        ..ItemSettings::default()
    }
}

#[test]
fn range_click_centers_the_click_rect_inside_the_crop() {
    let (cache, _dir) = cache_with(cropped(ClickMode::Range));
    let mut rng = StdRng::seed_from_u64(4);
    let result = hit(&cache, Rect::new(50, 40, 12, 10), 1.0);
    assert_eq!(resolve_click(&result, &AREA, &mut rng), Some((158, 147)));

    let wide = Geometry {
        window_scale: 2.0,
        ..AREA
    };
    let result = hit(&cache, Rect::new(50, 40, 24, 20), 2.0);
    assert_eq!(resolve_click(&result, &wide, &mut rng), Some((166, 154)));
}

#[test]
fn random_click_stays_inside_the_click_rect() {
    let (cache, _dir) = cache_with(cropped(ClickMode::Random));
    let mut rng = StdRng::seed_from_u64(5);
    let result = hit(&cache, Rect::new(50, 40, 12, 10), 1.0);
    for _ in 0..200 {
        let (x, y) = resolve_click(&result, &AREA, &mut rng).unwrap();
        assert!((154..162).contains(&x), "x = {x}");
        assert!((144..150).contains(&y), "y = {y}");
    }
}

#[test]
fn empty_click_rect_has_no_target() {
    let settings = ItemSettings {
        click_rect: Some(Rect::new(3, 3, 0, 4)),
        ..range_item()
    };
    assert!(!settings.has_click_target());
    assert!(range_item().has_click_target());
}
