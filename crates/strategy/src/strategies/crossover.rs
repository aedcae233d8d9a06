use serde::{Deserialize, Serialize};
use tracing::debug;

use common::{Error, MarketData, Ohlcv, Result, Side, Signal};

use crate::base::{
    check_period, check_positive, merge_params, PositionSizing, SignalDetails, StrategyBase,
};
use crate::indicators::{atr, sma, MaKind};
use crate::Strategy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CrossoverParams {
    pub fast_period: usize,
    pub slow_period: usize,
    pub ma_type: MaKind,
    /// Minimum `|fast - slow| / slow` for a cross to count.
    pub min_crossover_strength: f64,
    /// SMA period of the trend filter.
    pub trend_period: usize,
    pub atr_period: usize,
    pub stop_loss_atr: f64,
    pub take_profit_atr: f64,
}

impl Default for CrossoverParams {
    fn default() -> Self {
        Self {
            fast_period: 9,
            slow_period: 21,
            ma_type: MaKind::Ema,
            min_crossover_strength: 0.001,
            trend_period: 20,
            atr_period: 14,
            stop_loss_atr: 2.0,
            take_profit_atr: 4.0,
        }
    }
}

/// Fast/slow moving-average crossover ("golden" / "death" cross).
#[derive(Debug, Clone)]
pub struct MaCrossoverStrategy {
    base: StrategyBase,
    params: CrossoverParams,
}

impl MaCrossoverStrategy {
    pub const ID: &'static str = "ma_crossover";

    pub fn new(params: CrossoverParams, sizing: PositionSizing) -> Result<Self> {
        validate(&params)?;
        Ok(Self {
            base: StrategyBase::new(Self::ID, sizing),
            params,
        })
    }

    /// Defaults overlaid with a config `params` table.
    pub fn from_table(table: &toml::Table, sizing: PositionSizing) -> Result<Self> {
        Self::new(merge_params(&CrossoverParams::default(), table, Self::ID)?, sizing)
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.base.name = name.into();
        self
    }

    pub fn params(&self) -> &CrossoverParams {
        &self.params
    }

    /// Copy of this strategy with replaced parameters.
    pub fn with_params(&self, params: CrossoverParams) -> Result<Self> {
        validate(&params)?;
        Ok(Self {
            base: self.base.clone(),
            params,
        })
    }
}

fn validate(p: &CrossoverParams) -> Result<()> {
    let id = MaCrossoverStrategy::ID;
    check_period(id, "fast_period", p.fast_period, 1)?;
    check_period(id, "slow_period", p.slow_period, p.fast_period + 1)?;
    check_period(id, "trend_period", p.trend_period, 1)?;
    check_period(id, "atr_period", p.atr_period, 1)?;
    if !p.min_crossover_strength.is_finite() || p.min_crossover_strength < 0.0 {
        return Err(Error::invalid_params(id, "min_crossover_strength must be >= 0"));
    }
    check_positive(id, "stop_loss_atr", p.stop_loss_atr)?;
    check_positive(id, "take_profit_atr", p.take_profit_atr)
}

impl Default for MaCrossoverStrategy {
    fn default() -> Self {
        Self {
            base: StrategyBase::new(Self::ID, PositionSizing::default()),
            params: CrossoverParams::default(),
        }
    }
}

impl Strategy for MaCrossoverStrategy {
    fn name(&self) -> &str {
        &self.base.name
    }

    fn min_data_points(&self) -> usize {
        let p = &self.params;
        p.slow_period.max(p.trend_period).max(p.atr_period + 1) + 2
    }

    fn evaluate(&self, market: &MarketData, candles: &[Ohlcv]) -> Option<Signal> {
        let p = &self.params;
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

        let fast = p.ma_type.series(&closes, p.fast_period);
        let slow = p.ma_type.series(&closes, p.slow_period);
        let [.., fast_prev, fast_now] = fast[..] else {
            return None;
        };
        let [.., slow_prev, slow_now] = slow[..] else {
            return None;
        };

        let side = if fast_prev <= slow_prev && fast_now > slow_now {
            Side::Buy
        } else if fast_prev >= slow_prev && fast_now < slow_now {
            Side::Sell
        } else {
            return None;
        };

        if slow_now == 0.0 {
            return None;
        }
        let strength = (fast_now - slow_now).abs() / slow_now.abs();
        if strength <= p.min_crossover_strength {
            debug!(
                symbol = %market.symbol,
                strength = strength,
                "Crossover below minimum strength — ignored"
            );
            return None;
        }

        let trend_agrees = trend_direction(&closes, p.trend_period) == Some(side);
        let confidence = (0.3
            + (strength * 100.0).min(0.5)
            + if trend_agrees { 0.2 } else { 0.0 })
        .clamp(0.3, 0.9);

        let price = market.price;
        let atr_value = atr(candles, p.atr_period);
        let (stop_loss, take_profit) = match atr_value {
            Some(a) => (
                Some(price - side.sign() * p.stop_loss_atr * a),
                Some(price + side.sign() * p.take_profit_atr * a),
            ),
            None => (None, None),
        };

        let kind = p.ma_type.label();
        let reason = match side {
            Side::Buy => format!(
                "Golden Cross: {}-{kind} crossed above {}-{kind}",
                p.fast_period, p.slow_period
            ),
            Side::Sell => format!(
                "Death Cross: {}-{kind} crossed below {}-{kind}",
                p.fast_period, p.slow_period
            ),
        };

        let mut details = SignalDetails::new(reason)
            .indicator("fast_ma", fast_now)
            .indicator("slow_ma", slow_now)
            .indicator("crossover_strength", strength)
            .stops(stop_loss, take_profit);
        if let Some(a) = atr_value {
            details = details.indicator("atr", a);
        }

        Some(self.base.create_signal(market, side, confidence, details))
    }

    fn configure(&mut self, patch: &toml::Table) -> Result<()> {
        let params = merge_params(&self.params, patch, &self.base.name)?;
        *self = self.with_params(params)?;
        Ok(())
    }
}

/// Direction of the last close relative to its `period` SMA.
fn trend_direction(closes: &[f64], period: usize) -> Option<Side> {
    let avg = sma(closes, period)?;
    let last = *closes.last()?;
    if last > avg {
        Some(Side::Buy)
    } else if last < avg {
        Some(Side::Sell)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{candles_from_closes, tick_for};

    /// 18 falling bars then a steady climb; the 9/21 EMAs cross up at bar 25.
    fn golden_cross_fixture() -> Vec<f64> {
        let mut closes: Vec<f64> = (0..18).map(|i| 120.0 - i as f64).collect();
        closes.extend((1..=12).map(|i| 103.0 + 2.0 * i as f64));
        closes
    }

    /// Run the strategy over every prefix, returning (bar index, signal).
    fn walk_forward(strategy: &MaCrossoverStrategy, closes: &[f64]) -> Vec<(usize, Signal)> {
        let candles = candles_from_closes(closes);
        (1..=candles.len())
            .filter_map(|n| {
                let (markets, history) = tick_for("BTCUSDT", candles[..n].to_vec());
                let mut signals = strategy.analyze(&markets, &history).unwrap();
                assert!(signals.len() <= 1);
                signals.pop().map(|s| (n - 1, s))
            })
            .collect()
    }

    #[test]
    fn golden_cross_fires_once_at_crossing_bar() {
        let strategy = MaCrossoverStrategy::default();
        let signals = walk_forward(&strategy, &golden_cross_fixture());

        assert_eq!(signals.len(), 1, "got {signals:?}");
        let (bar, signal) = &signals[0];
        assert_eq!(*bar, 25);
        assert_eq!(signal.side, Side::Buy);
        assert!(signal.reason.contains("Golden Cross"), "{}", signal.reason);
        // 0.3 + strength*100 (~0.39) + 0.2 trend bonus
        assert!((signal.confidence - 0.892).abs() < 0.005, "{}", signal.confidence);
        assert!(signal.stop_loss.unwrap() < signal.price);
        assert!(signal.take_profit.unwrap() > signal.price);
        assert!(signal.amount > 0.0);
    }

    #[test]
    fn death_cross_mirrors_golden_cross() {
        let strategy = MaCrossoverStrategy::default();
        let mirrored: Vec<f64> = golden_cross_fixture().iter().map(|c| 240.0 - c).collect();
        let signals = walk_forward(&strategy, &mirrored);

        assert_eq!(signals.len(), 1, "got {signals:?}");
        let (bar, signal) = &signals[0];
        assert_eq!(*bar, 25);
        assert_eq!(signal.side, Side::Sell);
        assert!(signal.reason.contains("Death Cross"));
        assert!(signal.stop_loss.unwrap() > signal.price);
        assert!(signal.take_profit.unwrap() < signal.price);
    }

    #[test]
    fn weak_crossover_is_suppressed() {
        let params = CrossoverParams {
            min_crossover_strength: 0.01,
            ..CrossoverParams::default()
        };
        let strategy = MaCrossoverStrategy::new(params, PositionSizing::default()).unwrap();
        assert!(walk_forward(&strategy, &golden_cross_fixture()).is_empty());
    }

    #[test]
    fn flat_market_never_crosses() {
        let strategy = MaCrossoverStrategy::default();
        assert!(walk_forward(&strategy, &[100.0; 40]).is_empty());
    }

    #[test]
    fn short_history_is_skipped() {
        let strategy = MaCrossoverStrategy::default();
        let closes = golden_cross_fixture();
        let candles = candles_from_closes(&closes[..strategy.min_data_points() - 1]);
        let (markets, history) = tick_for("BTCUSDT", candles);
        assert!(strategy.analyze(&markets, &history).unwrap().is_empty());
    }

    #[test]
    fn rejects_fast_period_not_below_slow() {
        let params = CrossoverParams {
            fast_period: 21,
            slow_period: 21,
            ..CrossoverParams::default()
        };
        assert!(MaCrossoverStrategy::new(params, PositionSizing::default()).is_err());
    }

    #[test]
    fn configure_recomputes_min_data_points() {
        let mut strategy = MaCrossoverStrategy::default();
        assert_eq!(strategy.min_data_points(), 23);

        let mut patch = toml::Table::new();
        patch.insert("slow_period".into(), toml::Value::Integer(50));
        strategy.configure(&patch).unwrap();
        assert_eq!(strategy.params().slow_period, 50);
        assert_eq!(strategy.min_data_points(), 52);

        let mut bad = toml::Table::new();
        bad.insert("fast_period".into(), toml::Value::Integer(60));
        assert!(strategy.configure(&bad).is_err());
        assert_eq!(strategy.params().fast_period, 9);
    }
}
