//! Temperature fusion: collapse every connected probe's ambient reading into
//! one pit temperature.

const K: f32 = 0.5;

/// Lower-trimmed mean with deviation threshold `k = 0.5`.
///
/// Computes the population mean and standard deviation of `values`, retains
/// only values `>= mean - k * stddev`, and returns the mean of the retained
/// set. With zero or one values, the input is returned unchanged.
pub fn fuse(values: &[f32]) -> Option<f32> {
    match values.len() {
        0 => None,
        1 => Some(values[0]),
        n => {
            let mean = values.iter().sum::<f32>() / n as f32;
            let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / n as f32;
            let stddev = variance.sqrt();
            let threshold = mean - K * stddev;

            let retained: Vec<f32> = values.iter().copied().filter(|&x| x >= threshold).collect();

            if retained.is_empty() {
                Some(mean)
            } else {
                Some(retained.iter().sum::<f32>() / retained.len() as f32)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_returns_none() {
        assert_eq!(fuse(&[]), None);
    }

    #[test]
    fn test_single_value_passthrough() {
        assert_eq!(fuse(&[225.0]), Some(225.0));
    }

    #[test]
    fn test_two_close_values_average() {
        let result = fuse(&[225.0, 227.0]).unwrap();
        assert!((result - 226.0).abs() < 0.001);
    }

    #[test]
    fn test_trims_cold_outlier() {
        // A freshly-joined probe reads far colder than the rest of the pit;
        // it should be trimmed rather than dragging the fused value down.
        let values = [225.0, 224.0, 226.0, 40.0];
        let result = fuse(&values).unwrap();
        assert!(result > 200.0, "cold outlier should have been trimmed, got {result}");
    }

    #[test]
    fn test_uniform_values_unaffected() {
        let values = [200.0, 200.0, 200.0];
        assert_eq!(fuse(&values), Some(200.0));
    }
}
