use chrono::{DateTime, Duration, Utc};

use common::{history_key, HistoricalData, MarketData, Ohlcv};

pub const EXCHANGE: &str = "binance";

pub fn ts(i: usize) -> DateTime<Utc> {
    DateTime::from_timestamp(1_704_067_200, 0).unwrap() + Duration::hours(i as i64)
}

pub fn candle(i: usize, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Ohlcv {
    Ohlcv {
        timestamp: ts(i),
        open,
        high,
        low,
        close,
        volume,
    }
}

/// Candles with open = close, high/low half a unit away, constant volume.
pub fn candles_from_closes(closes: &[f64]) -> Vec<Ohlcv> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| candle(i, c, c + 0.5, c - 0.5, c, 100.0))
        .collect()
}

pub fn market(symbol: &str, price: f64) -> MarketData {
    MarketData {
        symbol: symbol.to_string(),
        exchange: EXCHANGE.to_string(),
        price,
        high_24h: price * 1.02,
        low_24h: price * 0.98,
        timestamp: ts(10_000),
    }
}

/// Snapshot priced at the last close plus a history map holding `candles`.
pub fn tick_for(symbol: &str, candles: Vec<Ohlcv>) -> (Vec<MarketData>, HistoricalData) {
    let price = candles.last().map(|c| c.close).unwrap_or(1.0);
    let mut history = HistoricalData::new();
    history.insert(history_key(EXCHANGE, symbol), candles);
    (vec![market(symbol, price)], history)
}
