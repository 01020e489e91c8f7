mod common;

use common::{flat_image, temp_workspace};
use nalgebra::Matrix3;
use std::fs;
use stereoseed::search::{range_from_match_points, resolve_global_range};
use stereoseed::{
    artifact, CorrConfig, MatchPoints, ResolutionScale, SearchRange, StereoSeedError,
};

#[test]
fn match_point_offsets_bound_the_range() {
    let points = MatchPoints {
        left: vec![[10.0, 10.0], [20.0, 20.0]],
        right: vec![[14.0, 8.0], [26.0, 21.0]],
    };
    let identity = Matrix3::identity();
    let range = range_from_match_points(
        &points,
        &identity,
        &identity,
        (100, 100),
        (100, 100),
        std::path::Path::new("unused"),
    )
    .unwrap();
    // Offsets (4, -2) and (6, 1), rounded outward.
    assert_eq!(range, SearchRange::new(4.0, -2.0, 6.0, 1.0));
}

#[test]
fn alignment_transforms_are_applied_before_differencing() {
    let points = MatchPoints {
        left: vec![[10.0, 10.0]],
        right: vec![[10.0, 10.0]],
    };
    // Shift the right image by (5, -3) during alignment.
    let align_right = Matrix3::new(1.0, 0.0, 5.0, 0.0, 1.0, -3.0, 0.0, 0.0, 1.0);
    let range = range_from_match_points(
        &points,
        &Matrix3::identity(),
        &align_right,
        (100, 100),
        (100, 100),
        std::path::Path::new("unused"),
    )
    .unwrap();
    assert_eq!(range, SearchRange::new(5.0, -3.0, 5.0, -3.0));
}

#[test]
fn out_of_bounds_points_are_skipped() {
    let points = MatchPoints {
        left: vec![[10.0, 10.0], [500.0, 10.0]],
        right: vec![[12.0, 11.0], [505.0, 11.0]],
    };
    let identity = Matrix3::identity();
    let range = range_from_match_points(
        &points,
        &identity,
        &identity,
        (100, 100),
        (100, 100),
        std::path::Path::new("unused"),
    )
    .unwrap();
    assert_eq!(range, SearchRange::new(2.0, 1.0, 2.0, 1.0));
}

#[test]
fn no_surviving_points_deletes_the_artifact() {
    let (ws, dir) = temp_workspace("no-inliers");
    let match_path = ws.match_points();
    let points = MatchPoints {
        left: vec![[10.0, 10.0]],
        right: vec![[10.0, 10.0]],
    };
    artifact::save_json(&match_path, &points).unwrap();

    // A rank-deficient alignment collapses every point to infinity.
    let degenerate = Matrix3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0);
    let err = range_from_match_points(
        &points,
        &degenerate,
        &Matrix3::identity(),
        (100, 100),
        (100, 100),
        &match_path,
    )
    .unwrap_err();
    assert!(matches!(err, StereoSeedError::NoInliers { .. }));
    assert!(!match_path.exists());

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn user_range_has_the_highest_priority() {
    let (ws, dir) = temp_workspace("user-range");
    let user = SearchRange::new(-8.0, -4.0, 8.0, 4.0);
    let cfg = CorrConfig {
        user_search_range: Some(user),
        ..CorrConfig::default()
    };
    let low = flat_image(8, 8);
    let scale = ResolutionScale::measure((64, 64), (8, 8)).unwrap();

    let range = resolve_global_range(
        &cfg,
        &ws,
        (64, 64),
        (64, 64),
        low.view(),
        low.view(),
        None,
        scale,
    )
    .unwrap();
    assert_eq!(range, user);

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn persisted_match_points_feed_the_range() {
    let (ws, dir) = temp_workspace("match-range");
    let points = MatchPoints {
        left: vec![[10.0, 10.0], [30.0, 20.0]],
        right: vec![[13.0, 9.0], [35.0, 22.0]],
    };
    artifact::save_json(&ws.match_points(), &points).unwrap();

    let cfg = CorrConfig::default();
    let low = flat_image(8, 8);
    let scale = ResolutionScale::measure((64, 64), (8, 8)).unwrap();
    let range = resolve_global_range(
        &cfg,
        &ws,
        (64, 64),
        (64, 64),
        low.view(),
        low.view(),
        None,
        scale,
    )
    .unwrap();
    assert_eq!(range, SearchRange::new(3.0, -1.0, 5.0, 2.0));

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn no_source_at_all_is_a_contradiction() {
    let (ws, dir) = temp_workspace("no-source");
    let cfg = CorrConfig::default();
    let low = flat_image(8, 8);
    let scale = ResolutionScale::measure((64, 64), (8, 8)).unwrap();
    let err = resolve_global_range(
        &cfg,
        &ws,
        (64, 64),
        (64, 64),
        low.view(),
        low.view(),
        None,
        scale,
    )
    .unwrap_err();
    assert!(matches!(err, StereoSeedError::ConfigContradiction { .. }));

    fs::remove_dir_all(&dir).ok();
}
