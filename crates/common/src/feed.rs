use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use crate::{Error, Result, Tick};

/// Source of market snapshots and candle history for each analysis tick.
///
/// Exchange connectors implement this outside the engine. The engine only
/// reads what a feed returns and never fetches data itself.
#[async_trait]
pub trait MarketFeed: Send + Sync {
    /// Produce the input for the next analysis pass.
    async fn next_tick(&self) -> Result<Tick>;
}

/// Feed backed by a JSON file that an external collector rewrites between ticks.
///
/// Expected shape:
/// ```json
/// { "markets": [ { "symbol": "BTCUSDT", "exchange": "binance", ... } ],
///   "history": { "binance:BTCUSDT": [ { "timestamp": "...", "open": 1.0, ... } ] } }
/// ```
pub struct JsonFileFeed {
    path: PathBuf,
}

impl JsonFileFeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl MarketFeed for JsonFileFeed {
    async fn next_tick(&self) -> Result<Tick> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            Error::Feed(format!("failed to read '{}': {e}", self.path.display()))
        })?;
        let tick: Tick = serde_json::from_str(&content)?;

        for market in &tick.markets {
            if !market.price.is_finite() || market.price <= 0.0 {
                return Err(Error::Feed(format!(
                    "invalid price {} for {}",
                    market.price,
                    market.key()
                )));
            }
        }

        debug!(
            path = %self.path.display(),
            markets = tick.markets.len(),
            series = tick.history.len(),
            "Loaded tick from file"
        );
        Ok(tick)
    }
}
