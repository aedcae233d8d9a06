use super::ma::{sma, std_dev};

/// Bollinger Bands at one bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

impl Bands {
    /// Position of `price` within the bands: 0 = lower band, 1 = upper band.
    /// `None` when the bands have collapsed to a single price.
    pub fn percent_b(&self, price: f64) -> Option<f64> {
        let width = self.upper - self.lower;
        if width <= f64::EPSILON {
            return None;
        }
        Some((price - self.lower) / width)
    }

    /// Relative band width, `(upper - lower) / middle`.
    pub fn bandwidth(&self) -> f64 {
        if self.middle == 0.0 {
            return 0.0;
        }
        (self.upper - self.lower) / self.middle
    }
}

/// Bands over the last `period` values, `k` population standard deviations wide.
pub fn bollinger(values: &[f64], period: usize, k: f64) -> Option<Bands> {
    let middle = sma(values, period)?;
    let sd = std_dev(values, period)?;
    Some(Bands {
        upper: middle + k * sd,
        middle,
        lower: middle - k * sd,
    })
}

/// Bands for every bar with a full window. Element `i` covers `values[..=i + period - 1]`.
pub fn bollinger_series(values: &[f64], period: usize, k: f64) -> Vec<Bands> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }
    (period..=values.len())
        .filter_map(|end| bollinger(&values[..end], period, k))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_series_collapses_bands() {
        let bands = bollinger(&[10.0; 20], 20, 2.0).unwrap();
        assert_eq!(bands.upper, 10.0);
        assert_eq!(bands.lower, 10.0);
        assert!(bands.percent_b(10.0).is_none());
        assert_eq!(bands.bandwidth(), 0.0);
    }

    #[test]
    fn percent_b_spans_lower_to_upper() {
        let values: Vec<f64> = (0..20).map(|i| 100.0 + (i % 2) as f64 * 2.0).collect();
        let bands = bollinger(&values, 20, 2.0).unwrap();
        // mean 101, sd 1 → bands 99..103
        assert!((bands.middle - 101.0).abs() < 1e-9);
        assert!((bands.upper - 103.0).abs() < 1e-9);
        assert!((bands.percent_b(99.0).unwrap()).abs() < 1e-9);
        assert!((bands.percent_b(103.0).unwrap() - 1.0).abs() < 1e-9);
        assert!(bands.percent_b(98.0).unwrap() < 0.0);
    }

    #[test]
    fn series_length_matches_full_windows() {
        let values: Vec<f64> = (0..30).map(|i| i as f64).collect();
        assert_eq!(bollinger_series(&values, 20, 2.0).len(), 11);
        assert!(bollinger_series(&values[..10], 20, 2.0).is_empty());
    }
}
