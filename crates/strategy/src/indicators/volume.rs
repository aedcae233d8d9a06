use common::Ohlcv;

/// On-balance volume, starting at 0 on the first candle.
pub fn obv_series(candles: &[Ohlcv]) -> Vec<f64> {
    let mut out = Vec::with_capacity(candles.len());
    let mut obv = 0.0;
    for (i, c) in candles.iter().enumerate() {
        if i > 0 {
            let prev = candles[i - 1].close;
            if c.close > prev {
                obv += c.volume;
            } else if c.close < prev {
                obv -= c.volume;
            }
        }
        out.push(obv);
    }
    out
}

/// Volume-weighted average of typical price. `None` when total volume is zero.
pub fn vwap(candles: &[Ohlcv]) -> Option<f64> {
    let volume: f64 = candles.iter().map(|c| c.volume).sum();
    if volume <= 0.0 {
        return None;
    }
    let weighted: f64 = candles.iter().map(|c| c.typical_price() * c.volume).sum();
    Some(weighted / volume)
}

pub fn average_volume(candles: &[Ohlcv]) -> Option<f64> {
    if candles.is_empty() {
        return None;
    }
    Some(candles.iter().map(|c| c.volume).sum::<f64>() / candles.len() as f64)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelKind {
    Support,
    Resistance,
}

/// A high-volume price bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeLevel {
    pub price: f64,
    pub volume: f64,
    pub kind: LevelKind,
}

/// Volume histogram over equal-width price buckets.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeProfile {
    /// (bucket centre price, traded volume)
    pub buckets: Vec<(f64, f64)>,
    /// Midpoint of the window's price range.
    pub midpoint: f64,
}

impl VolumeProfile {
    /// Build a `bins`-bucket histogram over `[lowest low, highest high]`.
    /// Each candle's volume goes to the bucket holding its typical price.
    pub fn build(candles: &[Ohlcv], bins: usize) -> Option<Self> {
        if candles.is_empty() || bins == 0 {
            return None;
        }
        let high = candles.iter().map(|c| c.high).fold(f64::MIN, f64::max);
        let low = candles.iter().map(|c| c.low).fold(f64::MAX, f64::min);
        let range = high - low;
        if !(range > 0.0) {
            return None;
        }
        let step = range / bins as f64;

        let mut volumes = vec![0.0; bins];
        for c in candles {
            let idx = (((c.typical_price() - low) / step) as usize).min(bins - 1);
            volumes[idx] += c.volume;
        }

        let buckets = volumes
            .into_iter()
            .enumerate()
            .map(|(i, v)| (low + step * (i as f64 + 0.5), v))
            .collect();

        Some(Self {
            buckets,
            midpoint: (high + low) / 2.0,
        })
    }

    /// Buckets whose volume exceeds `ratio` × the average bucket volume.
    /// Below the midpoint they are support, above it resistance.
    pub fn levels(&self, ratio: f64) -> Vec<VolumeLevel> {
        let total: f64 = self.buckets.iter().map(|(_, v)| v).sum();
        let avg = total / self.buckets.len() as f64;
        self.buckets
            .iter()
            .filter(|(_, v)| *v > avg * ratio)
            .filter_map(|&(price, volume)| {
                let kind = if price < self.midpoint {
                    LevelKind::Support
                } else if price > self.midpoint {
                    LevelKind::Resistance
                } else {
                    return None;
                };
                Some(VolumeLevel { price, volume, kind })
            })
            .collect()
    }
}
