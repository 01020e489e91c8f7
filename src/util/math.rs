//! Small numeric helpers for range rounding and robust statistics.

/// Linear-interpolated percentile of a sample set, `p` in `[0, 1]`.
///
/// Sorts a copy of the input. Returns `None` for an empty slice.
pub(crate) fn percentile(values: &[f32], p: f32) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    let mut sorted: Vec<f32> = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let p = p.clamp(0.0, 1.0);
    let pos = p * (sorted.len() - 1) as f32;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        return Some(sorted[lo]);
    }
    let frac = pos - lo as f32;
    Some(sorted[lo] * (1.0 - frac) + sorted[hi] * frac)
}

/// Median of a sample set; `None` for an empty slice.
pub(crate) fn median(values: &[f32]) -> Option<f32> {
    percentile(values, 0.5)
}

#[cfg(test)]
mod tests {
    use super::{median, percentile};

    #[test]
    fn percentile_interpolates() {
        let values = [0.0f32, 1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&values, 0.0), Some(0.0));
        assert_eq!(percentile(&values, 1.0), Some(4.0));
        assert!((percentile(&values, 0.5).unwrap() - 2.0).abs() < 1e-6);
        assert!((percentile(&values, 0.25).unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn percentile_of_empty_is_none() {
        assert_eq!(percentile(&[], 0.5), None);
    }

    #[test]
    fn median_of_unsorted_input() {
        let values = [3.0f32, 1.0, 2.0];
        assert!((median(&values).unwrap() - 2.0).abs() < 1e-6);
    }
}
