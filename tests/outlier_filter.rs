mod common;

use common::uniform_field;
use nalgebra::Vector2;
use rand::Rng;
use stereoseed::filter::{filter_outliers, FilterVariant};
use stereoseed::FilterParams;

#[test]
fn threshold_filter_removes_randomly_placed_spikes() {
    let width = 20;
    let height = 20;
    let mut field = uniform_field(width, height, 1.5, -0.5);

    // Isolated spikes with mutually disagreeing values.
    let mut rng = rand::rng();
    let mut spikes: Vec<(usize, usize)> = Vec::new();
    while spikes.len() < 8 {
        let x = rng.random_range(2..width - 2);
        let y = rng.random_range(2..height - 2);
        let isolated = spikes
            .iter()
            .all(|&(sx, sy)| sx.abs_diff(x) > 2 || sy.abs_diff(y) > 2);
        if isolated {
            let value = 1000.0 + spikes.len() as f32 * 100.0;
            field.set(x, y, Some(Vector2::new(value, -value)));
            spikes.push((x, y));
        }
    }

    let variant = filter_outliers(&mut field, &FilterParams::default());
    assert_eq!(variant, FilterVariant::Threshold);
    for &(x, y) in &spikes {
        assert_eq!(field.get(x, y), None, "spike at ({x}, {y}) survived");
    }
    // The consensus background is untouched.
    assert_eq!(field.valid_count(), width * height - spikes.len());
}

#[test]
fn quantile_filter_keeps_a_smooth_gradient() {
    let width = 12;
    let height = 12;
    let mut field = uniform_field(width, height, 0.0, 0.0);
    for y in 0..height {
        for x in 0..width {
            field.set(x, y, Some(Vector2::new(x as f32 * 0.1, y as f32 * 0.1)));
        }
    }
    field.set(6, 6, Some(Vector2::new(50.0, 50.0)));

    let params = FilterParams {
        quantile_multiple: 3.0,
        ..FilterParams::default()
    };
    let variant = filter_outliers(&mut field, &params);
    assert_eq!(variant, FilterVariant::Quantile);
    assert_eq!(field.get(6, 6), None);
    // The gradient itself deviates far less than three spreads anywhere.
    assert!(field.valid_count() >= width * height - 2);
}
