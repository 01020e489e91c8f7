mod common;

use common::{flat_image, full_mask, temp_workspace, textured, ConstantEngine};
use nalgebra::Vector2;
use std::fs;
use stereoseed::engine::reference::BlockMatcher;
use stereoseed::{
    downsample_image, downsample_mask, CorrConfig, Pipeline, PipelineInputs, SearchRange,
    SeedMode,
};

#[test]
fn unseeded_run_recovers_a_horizontal_shift() {
    let (ws, dir) = temp_workspace("e2e-unseeded");
    let width = 48;
    let height = 32;
    let shift = 3usize;
    let left = textured(width, height, 0);
    let right = textured(width, height, shift);
    let mask = full_mask(width, height);

    let left_low = downsample_image(&downsample_image(&left).unwrap()).unwrap();
    let right_low = downsample_image(&downsample_image(&right).unwrap()).unwrap();
    let mask_low = downsample_mask(&downsample_mask(&mask).unwrap()).unwrap();

    let cfg = CorrConfig {
        seed_mode: SeedMode::None,
        user_search_range: Some(SearchRange::new(0.0, -1.0, 5.0, 1.0)),
        kernel_size: (5, 5),
        corr_timeout: 0,
        corr_tile_size: 16,
        collar_size: 0,
        ..CorrConfig::default()
    };
    let inputs = PipelineInputs {
        left: &left,
        right: &right,
        left_mask: &mask,
        right_mask: &mask,
        left_low: &left_low,
        right_low: &right_low,
        left_mask_low: &mask_low,
        right_mask_low: &mask_low,
    };
    let pipeline = Pipeline::new(&cfg, ws, inputs).unwrap();
    let engine = BlockMatcher::default();

    let field = pipeline.run(&engine, None, None).unwrap().unwrap();
    assert_eq!(field.width(), width);
    assert_eq!(field.height(), height);
    assert!(pipeline.workspace().full_disparity().exists());

    let expected = Vector2::new(shift as f32, 0.0);
    let mut hits = 0;
    let mut valid = 0;
    for (_, _, d) in field.iter_valid() {
        valid += 1;
        if d == expected {
            hits += 1;
        }
    }
    assert!(valid > 0);
    assert!(hits * 2 > valid, "hits = {hits}, valid = {valid}");

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn seeded_run_narrows_the_range_and_writes_all_artifacts() {
    let (ws, dir) = temp_workspace("e2e-seeded");
    let width = 48;
    let height = 32;
    let left = flat_image(width, height);
    let right = flat_image(width, height);
    let mask = full_mask(width, height);
    let left_low = flat_image(12, 8);
    let right_low = flat_image(12, 8);
    let mask_low = full_mask(12, 8);

    let cfg = CorrConfig {
        seed_mode: SeedMode::LowResCorrelation,
        user_search_range: Some(SearchRange::new(-4.0, -4.0, 4.0, 4.0)),
        corr_timeout: 0,
        corr_tile_size: 16,
        collar_size: 0,
        ..CorrConfig::default()
    };
    let inputs = PipelineInputs {
        left: &left,
        right: &right,
        left_mask: &mask,
        right_mask: &mask,
        left_low: &left_low,
        right_low: &right_low,
        left_mask_low: &mask_low,
        right_mask_low: &mask_low,
    };
    let pipeline = Pipeline::new(&cfg, ws, inputs).unwrap();
    let engine = ConstantEngine::new(2.0, 0.0);

    let field = pipeline.run(&engine, None, None).unwrap().unwrap();
    assert!(pipeline.workspace().seed_disparity().exists());
    assert!(pipeline.workspace().full_disparity().exists());
    assert_eq!(field.valid_count(), width * height);
    assert_eq!(field.get(10, 10), Some(Vector2::new(2.0, 0.0)));

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn low_res_only_runs_stop_after_the_seed() {
    let (ws, dir) = temp_workspace("e2e-lowres-only");
    let left = flat_image(48, 32);
    let right = flat_image(48, 32);
    let mask = full_mask(48, 32);
    let left_low = flat_image(12, 8);
    let right_low = flat_image(12, 8);
    let mask_low = full_mask(12, 8);

    let cfg = CorrConfig {
        seed_mode: SeedMode::LowResCorrelation,
        user_search_range: Some(SearchRange::new(-4.0, -4.0, 4.0, 4.0)),
        corr_timeout: 0,
        compute_low_res_only: true,
        ..CorrConfig::default()
    };
    let inputs = PipelineInputs {
        left: &left,
        right: &right,
        left_mask: &mask,
        right_mask: &mask,
        left_low: &left_low,
        right_low: &right_low,
        left_mask_low: &mask_low,
        right_mask_low: &mask_low,
    };
    let pipeline = Pipeline::new(&cfg, ws, inputs).unwrap();
    let engine = ConstantEngine::new(1.0, 1.0);

    let result = pipeline.run(&engine, None, None).unwrap();
    assert!(result.is_none());
    assert!(pipeline.workspace().seed_disparity().exists());
    assert!(!pipeline.workspace().full_disparity().exists());

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn local_homography_run_fits_and_persists_the_grid() {
    let (ws, dir) = temp_workspace("e2e-hom");
    let width = 48;
    let height = 32;
    let left = flat_image(width, height);
    let right = flat_image(width, height);
    let mask = full_mask(width, height);
    let left_low = flat_image(12, 8);
    let right_low = flat_image(12, 8);
    let mask_low = full_mask(12, 8);

    let cfg = CorrConfig {
        seed_mode: SeedMode::LowResCorrelation,
        user_search_range: Some(SearchRange::new(-4.0, -4.0, 4.0, 4.0)),
        corr_timeout: 0,
        corr_tile_size: 16,
        collar_size: 0,
        use_local_homography: true,
        ..CorrConfig::default()
    };
    let inputs = PipelineInputs {
        left: &left,
        right: &right,
        left_mask: &mask,
        right_mask: &mask,
        left_low: &left_low,
        right_low: &right_low,
        left_mask_low: &mask_low,
        right_mask_low: &mask_low,
    };
    let pipeline = Pipeline::new(&cfg, ws, inputs).unwrap();
    let engine = ConstantEngine::new(0.0, 1.0);

    let field = pipeline.run(&engine, None, None).unwrap().unwrap();
    assert!(pipeline.workspace().local_homographies().exists());
    assert_eq!(field.valid_count(), width * height);

    fs::remove_dir_all(&dir).ok();
}
