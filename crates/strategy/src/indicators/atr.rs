use common::Ohlcv;

/// True range of `candle` given the previous close.
pub fn true_range(candle: &Ohlcv, prev_close: f64) -> f64 {
    (candle.high - candle.low)
        .max((candle.high - prev_close).abs())
        .max((candle.low - prev_close).abs())
}

/// Average true range over the trailing `period` candles.
/// Needs `period + 1` candles so every range has a previous close.
pub fn atr(candles: &[Ohlcv], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }
    let window = &candles[candles.len() - period - 1..];
    let total: f64 = window
        .windows(2)
        .map(|pair| true_range(&pair[1], pair[0].close))
        .sum();
    Some(total / period as f64)
}
