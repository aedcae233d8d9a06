use common::Ohlcv;

/// Ichimoku line periods.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IchimokuPeriods {
    pub tenkan: usize,
    pub kijun: usize,
    pub senkou_b: usize,
    pub displacement: usize,
}

/// Ichimoku lines as seen at one bar. The spans are the values projected
/// forward onto this bar, i.e. computed `displacement` bars earlier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IchimokuPoint {
    pub tenkan: f64,
    pub kijun: f64,
    pub span_a: f64,
    pub span_b: f64,
}

impl IchimokuPoint {
    pub fn cloud_top(&self) -> f64 {
        self.span_a.max(self.span_b)
    }

    pub fn cloud_bottom(&self) -> f64 {
        self.span_a.min(self.span_b)
    }

    pub fn thickness(&self) -> f64 {
        self.cloud_top() - self.cloud_bottom()
    }

    pub fn position(&self, price: f64) -> CloudPosition {
        if price > self.cloud_top() {
            CloudPosition::Above
        } else if price < self.cloud_bottom() {
            CloudPosition::Below
        } else {
            CloudPosition::Inside
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudPosition {
    Above,
    Inside,
    Below,
}

/// (highest high + lowest low) / 2 over the `period` candles ending at `end` (inclusive).
pub fn midpoint(candles: &[Ohlcv], end: usize, period: usize) -> Option<f64> {
    if period == 0 || end >= candles.len() || end + 1 < period {
        return None;
    }
    let window = &candles[end + 1 - period..=end];
    let high = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let low = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    Some((high + low) / 2.0)
}

/// Lines at bar `idx`. `None` until enough history exists for the displaced spans.
pub fn ichimoku_at(
    candles: &[Ohlcv],
    idx: usize,
    periods: &IchimokuPeriods,
) -> Option<IchimokuPoint> {
    let tenkan = midpoint(candles, idx, periods.tenkan)?;
    let kijun = midpoint(candles, idx, periods.kijun)?;

    let origin = idx.checked_sub(periods.displacement)?;
    let span_a = (midpoint(candles, origin, periods.tenkan)?
        + midpoint(candles, origin, periods.kijun)?)
        / 2.0;
    let span_b = midpoint(candles, origin, periods.senkou_b)?;

    Some(IchimokuPoint {
        tenkan,
        kijun,
        span_a,
        span_b,
    })
}
