//! Seed-disparity outlier removal.
//!
//! Two interchangeable post-filters run over a disparity field before the
//! seed is trusted. Both mark deviant cells invalid and never mutate the
//! values of surviving neighbors; all decisions are made against the input
//! state, so removal order cannot cascade within one pass.

use nalgebra::Vector2;

use crate::config::FilterParams;
use crate::field::DisparityField;
use crate::trace::trace_event;
use crate::util::math::{median, percentile};

/// Which filter variant a pass selected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterVariant {
    Threshold,
    Quantile,
}

/// Runs one outlier-removal pass, selecting the variant from the sign of
/// `quantile_multiple`. The quantile variant excludes blob-area filtering in
/// the same pass; callers gate the blob area on the returned variant.
pub fn filter_outliers(field: &mut DisparityField, params: &FilterParams) -> FilterVariant {
    let before = field.valid_count();
    let variant = if params.quantile_multiple > 0.0 {
        quantile_filter(field, params);
        FilterVariant::Quantile
    } else {
        threshold_filter(field, params);
        FilterVariant::Threshold
    };
    trace_event!(
        "outlier_filter",
        removed = before - field.valid_count(),
        quantile = matches!(variant, FilterVariant::Quantile)
    );
    variant
}

fn neighborhood(
    field: &DisparityField,
    x: usize,
    y: usize,
    half: (usize, usize),
    include_center: bool,
) -> Vec<Vector2<f32>> {
    let mut out = Vec::new();
    let x0 = x.saturating_sub(half.0);
    let y0 = y.saturating_sub(half.1);
    let x1 = (x + half.0).min(field.width() - 1);
    let y1 = (y + half.1).min(field.height() - 1);
    for ny in y0..=y1 {
        for nx in x0..=x1 {
            if !include_center && nx == x && ny == y {
                continue;
            }
            if let Some(d) = field.get(nx, ny) {
                out.push(d);
            }
        }
    }
    out
}

/// Removes cells with too few neighbors inside an absolute-deviation band.
///
/// A neighbor agrees when both disparity components lie within
/// `rm_threshold * rm_threshold_factor` of the cell's. The cell survives when
/// the agreeing fraction of the full window reaches
/// `rm_min_matches / 100 * rm_min_matches_factor`.
fn threshold_filter(field: &mut DisparityField, params: &FilterParams) {
    let threshold = params.rm_threshold * params.rm_threshold_factor;
    let window = (2 * params.half_kernel.0 + 1) * (2 * params.half_kernel.1 + 1);
    let needed = (params.rm_min_matches / 100.0) * params.rm_min_matches_factor * window as f32;

    let source = field.clone();
    for (x, y, d) in source.iter_valid() {
        let agreeing = neighborhood(&source, x, y, params.half_kernel, true)
            .iter()
            .filter(|n| (n.x - d.x).abs() <= threshold && (n.y - d.y).abs() <= threshold)
            .count();
        if (agreeing as f32) < needed {
            field.invalidate(x, y);
        }
    }
}

/// Removes cells whose deviation from the componentwise neighborhood median
/// exceeds `quantile_multiple` times the chosen percentile of the
/// neighborhood's own deviation distribution.
fn quantile_filter(field: &mut DisparityField, params: &FilterParams) {
    let source = field.clone();
    for (x, y, d) in source.iter_valid() {
        let neighbors = neighborhood(&source, x, y, params.half_kernel, false);
        if neighbors.is_empty() {
            field.invalidate(x, y);
            continue;
        }
        let xs: Vec<f32> = neighbors.iter().map(|n| n.x).collect();
        let ys: Vec<f32> = neighbors.iter().map(|n| n.y).collect();
        let center = Vector2::new(
            median(&xs).unwrap_or(d.x),
            median(&ys).unwrap_or(d.y),
        );
        let deviations: Vec<f32> = neighbors.iter().map(|n| (n - center).norm()).collect();
        let spread = percentile(&deviations, params.quantile_percentile).unwrap_or(0.0);
        if (d - center).norm() > params.quantile_multiple * spread {
            field.invalidate(x, y);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{filter_outliers, FilterVariant};
    use crate::config::FilterParams;
    use crate::field::DisparityField;
    use nalgebra::Vector2;

    fn uniform_field(width: usize, height: usize, d: Vector2<f32>) -> DisparityField {
        let mut field = DisparityField::invalid(width, height).unwrap();
        for y in 0..height {
            for x in 0..width {
                field.set(x, y, Some(d));
            }
        }
        field
    }

    #[test]
    fn threshold_variant_removes_lone_spike() {
        let mut field = uniform_field(5, 5, Vector2::new(2.0, 1.0));
        field.set(2, 2, Some(Vector2::new(40.0, -40.0)));

        let params = FilterParams::default();
        let variant = filter_outliers(&mut field, &params);
        assert_eq!(variant, FilterVariant::Threshold);
        assert_eq!(field.get(2, 2), None);
        // Surviving neighbors keep their exact values.
        assert_eq!(field.get(1, 2), Some(Vector2::new(2.0, 1.0)));
        assert_eq!(field.valid_count(), 24);
    }

    #[test]
    fn quantile_variant_selected_by_positive_multiple() {
        let mut field = uniform_field(5, 5, Vector2::new(2.0, 1.0));
        field.set(2, 2, Some(Vector2::new(40.0, -40.0)));

        let params = FilterParams {
            quantile_multiple: 3.0,
            ..FilterParams::default()
        };
        let variant = filter_outliers(&mut field, &params);
        assert_eq!(variant, FilterVariant::Quantile);
        assert_eq!(field.get(2, 2), None);
        assert_eq!(field.get(0, 0), Some(Vector2::new(2.0, 1.0)));
    }
}
