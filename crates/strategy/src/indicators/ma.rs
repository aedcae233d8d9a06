use serde::{Deserialize, Serialize};

/// Moving average flavour used by the crossover strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaKind {
    Sma,
    #[default]
    Ema,
}

impl MaKind {
    /// Series of moving-average values; element `i` covers `values[..=i + period - 1]`.
    pub fn series(self, values: &[f64], period: usize) -> Vec<f64> {
        match self {
            MaKind::Sma => sma_series(values, period),
            MaKind::Ema => ema_series(values, period),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MaKind::Sma => "SMA",
            MaKind::Ema => "EMA",
        }
    }
}

/// Simple average of the last `period` values.
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let window = &values[values.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}

/// Rolling simple average. Output length is `values.len() - period + 1`.
pub fn sma_series(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }
    values
        .windows(period)
        .map(|w| w.iter().sum::<f64>() / period as f64)
        .collect()
}

/// Exponential moving average series, seeded with the SMA of the first
/// `period` values. Output length is `values.len() - period + 1`.
pub fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }
    let k = 2.0 / (period as f64 + 1.0);
    let seed = values[..period].iter().sum::<f64>() / period as f64;

    let mut out = Vec::with_capacity(values.len() - period + 1);
    out.push(seed);
    let mut ema_val = seed;
    for &price in &values[period..] {
        ema_val = price * k + ema_val * (1.0 - k);
        out.push(ema_val);
    }
    out
}

/// Population standard deviation of the last `period` values.
pub fn std_dev(values: &[f64], period: usize) -> Option<f64> {
    let mean = sma(values, period)?;
    let window = &values[values.len() - period..];
    let var = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / period as f64;
    Some(var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sma_of_last_window() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(sma(&values, 2), Some(4.5));
        assert_eq!(sma(&values, 6), None);
        assert_eq!(sma_series(&values, 3), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn ema_seeds_with_sma_then_smooths() {
        let values = [2.0, 4.0, 6.0, 8.0];
        let ema = ema_series(&values, 3);
        assert_eq!(ema.len(), 2);
        assert!((ema[0] - 4.0).abs() < 1e-12);
        // k = 0.5 → 8 * 0.5 + 4 * 0.5
        assert!((ema[1] - 6.0).abs() < 1e-12);
    }

    #[test]
    fn ema_empty_when_short() {
        assert!(ema_series(&[1.0, 2.0], 3).is_empty());
        assert!(ema_series(&[1.0, 2.0], 0).is_empty());
    }

    #[test]
    fn std_dev_of_constant_series_is_zero() {
        assert_eq!(std_dev(&[3.0; 10], 5), Some(0.0));
        let sd = std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0], 8).unwrap();
        assert!((sd - 2.0).abs() < 1e-12);
    }
}
