mod common;

use common::{item, noise, range_item, sprite, write_sprite};
use image::{Rgb, RgbImage};
use screenwatch::bank::{CacheBuilder, ScaleSet};
use screenwatch::config::{ConfigTree, ItemPath, ItemSettings, RoiMode, RoiSettings, ScaleSweep};
use screenwatch::image::{Frame, FrameSet, Rect};
use screenwatch::search::{MatchConfig, MatchEngine, MatchMode};
use screenwatch::template::ScaledTemplate;
use std::time::Instant;
use tempfile::TempDir;

fn engine(mode: MatchMode, parallel: bool) -> MatchEngine {
    MatchEngine::new(MatchConfig {
        mode,
        parallel,
        ..MatchConfig::default()
    })
}

fn paste(canvas: &mut RgbImage, patch: &RgbImage, x: u32, y: u32) {
    image::imageops::replace(canvas, patch, i64::from(x), i64::from(y));
}

#[test]
fn exact_placement_scores_near_one_in_every_mode() {
    let mut canvas = noise(160, 120, 7);
    paste(&mut canvas, &sprite(31), 50, 40);
    let frames = FrameSet::new(Frame::from_rgb(canvas));
    let tpl = ScaledTemplate::from_frame(Frame::from_rgb(sprite(31)), 1.0).unwrap();

    for mode in [MatchMode::Gray, MatchMode::Color, MatchMode::StrictColor] {
        for parallel in [false, true] {
            let peak = engine(mode, parallel)
                .best_peak(&frames, &tpl, None)
                .unwrap()
                .unwrap();
            assert_eq!((peak.x, peak.y), (50, 40), "{mode:?}");
            assert!(peak.score > 0.99, "{mode:?} scored {}", peak.score);
        }
    }
}

#[test]
fn results_never_fall_below_threshold() {
    let mut canvas = noise(160, 120, 7);
    paste(&mut canvas, &sprite(32), 10, 10);
    let frames = FrameSet::new(Frame::from_rgb(canvas));
    let present = ScaledTemplate::from_frame(Frame::from_rgb(sprite(32)), 1.0).unwrap();
    let absent = ScaledTemplate::from_frame(Frame::from_rgb(sprite(33)), 1.0).unwrap();
    let matcher = engine(MatchMode::Color, true);

    let best = matcher.best_peak(&frames, &absent, None).unwrap().unwrap();
    assert!(best.score < 0.8);
    assert!(matcher.match_template(&frames, &absent, 0.8, None).is_none());
    assert!(matcher.match_template(&frames, &present, 1.01, None).is_none());
    let hit = matcher.match_template(&frames, &present, 0.9, None).unwrap();
    assert!(hit.score >= 0.9);
}

#[test]
fn strict_color_rejects_a_washed_out_channel() {
    let pattern = noise(24, 24, 34);
    let gray_sprite = RgbImage::from_fn(24, 24, |x, y| {
        let v = pattern.get_pixel(x, y)[0];
        Rgb([v, v, v])
    });
    let washed = RgbImage::from_fn(24, 24, |x, y| {
        let v = pattern.get_pixel(x, y)[0];
        Rgb([v, v, 128])
    });
    let mut canvas = noise(120, 90, 7);
    paste(&mut canvas, &washed, 40, 30);
    let frames = FrameSet::new(Frame::from_rgb(canvas));
    let tpl = ScaledTemplate::from_frame(Frame::from_rgb(gray_sprite), 1.0).unwrap();

    let gray = engine(MatchMode::Gray, false)
        .match_template(&frames, &tpl, 0.9, None)
        .unwrap();
    assert_eq!((gray.x, gray.y), (40, 30));
    assert!(engine(MatchMode::StrictColor, false)
        .match_template(&frames, &tpl, 0.8, None)
        .is_none());
}

#[test]
fn flat_template_channel_matches_by_mean() {
    let pattern = noise(24, 24, 35);
    let tinted = RgbImage::from_fn(24, 24, |x, y| {
        let v = pattern.get_pixel(x, y)[0];
        Rgb([v, 200, 40])
    });
    let mut canvas = noise(120, 90, 7);
    paste(&mut canvas, &tinted, 70, 50);
    let frames = FrameSet::new(Frame::from_rgb(canvas));
    let tpl = ScaledTemplate::from_frame(Frame::from_rgb(tinted), 1.0).unwrap();

    let peak = engine(MatchMode::StrictColor, true)
        .match_template(&frames, &tpl, 0.9, None)
        .unwrap();
    assert_eq!((peak.x, peak.y), (70, 50));
}

#[test]
fn entry_match_finds_the_right_scale_and_remembers_it() {
    let dir = TempDir::new().unwrap();
    write_sprite(dir.path(), "badge", 36);
    let sweep = ScaleSweep {
        center: 1.0,
        range: 0.25,
        steps: 3,
    };
    let builder = CacheBuilder::new(dir.path(), ScaleSet::compute(1.0, 1.0, Some(&sweep)).unwrap());
    let tree = ConfigTree {
        root_dir: Default::default(),
        nodes: vec![item("badge", range_item())],
    };
    let (cache, _) = builder.build(&tree, None, Instant::now());
    let entry = cache.entry(&ItemPath::from("badge")).unwrap();
    assert_eq!(entry.hints().last_index(), 1);

    let enlarged = Frame::from_rgb(sprite(36)).resized(1.25);
    let mut canvas = noise(200, 150, 7);
    paste(&mut canvas, enlarged.rgb(), 90, 60);
    let frames = FrameSet::new(Frame::from_rgb(canvas));
    let matcher = engine(MatchMode::Color, true);

    let found = matcher.match_entry(&frames, entry, 1.0).unwrap();
    assert_eq!(found.template_index, 2);
    assert_eq!(found.scale, 1.25);
    assert_eq!(found.rect, Rect::new(90, 60, 30, 30));
    assert_eq!(entry.hints().last_index(), 2);
    assert_eq!(entry.hints().best_scale(), 1.25);

    let again = matcher.match_entry(&frames, entry, 1.0).unwrap();
    assert_eq!(again.template_index, 2);
}

#[test]
fn variable_roi_limits_the_search() {
    let dir = TempDir::new().unwrap();
    write_sprite(dir.path(), "corner", 37);
    let settings = ItemSettings {
        roi: Some(RoiSettings {
            mode: RoiMode::Variable,
            rect: Rect::new(0, 0, 80, 60),
        }),
        ..range_item()
    };
    let builder = CacheBuilder::new(dir.path(), ScaleSet::compute(1.0, 1.0, None).unwrap());
    let tree = ConfigTree {
        root_dir: Default::default(),
        nodes: vec![item("corner", settings)],
    };
    let (cache, _) = builder.build(&tree, None, Instant::now());
    let entry = cache.entry(&ItemPath::from("corner")).unwrap();
    let matcher = engine(MatchMode::Color, false);

    let mut inside = noise(200, 150, 7);
    paste(&mut inside, &sprite(37), 20, 20);
    let hit = matcher.match_entry(&FrameSet::new(Frame::from_rgb(inside)), entry, 1.0);
    assert_eq!(hit.map(|m| m.rect), Some(Rect::new(20, 20, 24, 24)));

    let mut outside = noise(200, 150, 7);
    paste(&mut outside, &sprite(37), 140, 100);
    assert!(matcher
        .match_entry(&FrameSet::new(Frame::from_rgb(outside)), entry, 1.0)
        .is_none());

    // A window scale of 2 doubles the search window.
    let mut scaled = noise(200, 150, 7);
    paste(&mut scaled, &sprite(37), 120, 90);
    assert!(matcher
        .match_entry(&FrameSet::new(Frame::from_rgb(scaled)), entry, 2.0)
        .is_some());
}
