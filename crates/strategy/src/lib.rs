pub mod base;
pub mod config;
pub mod indicators;
pub mod manager;
pub mod strategies;

#[cfg(test)]
pub(crate) mod test_support;

pub use base::{calculate_position_size, PositionSizing, SignalDetails, StrategyBase};
pub use config::{StrategyConfig, StrategyFileConfig};
pub use manager::StrategyManager;
pub use strategies::{
    BollingerStrategy, IchimokuStrategy, MaCrossoverStrategy, RsiStrategy, VolumeProfileStrategy,
};

use tracing::debug;

use common::{HistoricalData, MarketData, Ohlcv, Result, Signal};

/// All strategy implementations must satisfy this trait.
pub trait Strategy: Send + Sync {
    /// Registry name; also stamped on every signal this strategy emits.
    fn name(&self) -> &str;

    /// Candles required before `evaluate` is attempted for a symbol.
    fn min_data_points(&self) -> usize;

    /// Run the priority chain for one instrument. `candles` holds at least
    /// `min_data_points()` entries, oldest first.
    ///
    /// Returns `None` if no actionable setup is present.
    fn evaluate(&self, market: &MarketData, candles: &[Ohlcv]) -> Option<Signal>;

    /// Merge `patch` into the current parameters, rebuilding the strategy.
    fn configure(&mut self, patch: &toml::Table) -> Result<()>;

    /// Evaluate every snapshot whose `"exchange:symbol"` history is long enough.
    /// Snapshots without sufficient history are skipped silently.
    fn analyze(&self, markets: &[MarketData], history: &HistoricalData) -> Result<Vec<Signal>> {
        let mut signals = Vec::new();
        for market in markets {
            let key = market.key();
            let Some(candles) = history.get(&key) else {
                debug!(strategy = %self.name(), key = %key, "No history — skipping");
                continue;
            };
            if candles.len() < self.min_data_points() {
                debug!(
                    strategy = %self.name(),
                    key = %key,
                    have = candles.len(),
                    need = self.min_data_points(),
                    "Insufficient history — skipping"
                );
                continue;
            }
            if let Some(signal) = self.evaluate(market, candles) {
                signals.push(signal);
            }
        }
        Ok(signals)
    }
}
