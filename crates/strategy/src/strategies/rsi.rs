use serde::{Deserialize, Serialize};
use tracing::debug;

use common::{Error, MarketData, Ohlcv, Result, Side, Signal};

use crate::base::{
    check_period, check_positive, merge_params, PositionSizing, SignalDetails, StrategyBase,
};
use crate::indicators::{atr, sma, RsiIndicator};
use crate::Strategy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RsiParams {
    pub period: usize,
    pub overbought: f64,
    pub oversold: f64,
    /// Suppress signals against a confirmed SMA trend.
    pub use_trend_filter: bool,
    pub trend_period: usize,
    pub use_divergence: bool,
    pub divergence_lookback: usize,
    pub divergence_confidence: f64,
    pub atr_period: usize,
    pub stop_loss_atr: f64,
    pub take_profit_atr: f64,
}

impl Default for RsiParams {
    fn default() -> Self {
        Self {
            period: 14,
            overbought: 70.0,
            oversold: 30.0,
            use_trend_filter: true,
            trend_period: 50,
            use_divergence: true,
            divergence_lookback: 14,
            divergence_confidence: 0.6,
            atr_period: 14,
            stop_loss_atr: 2.0,
            take_profit_atr: 3.0,
        }
    }
}

/// RSI oscillator: reversals out of the extreme zones plus price/RSI divergence.
#[derive(Debug, Clone)]
pub struct RsiStrategy {
    base: StrategyBase,
    params: RsiParams,
}

impl RsiStrategy {
    pub const ID: &'static str = "rsi";

    pub fn new(params: RsiParams, sizing: PositionSizing) -> Result<Self> {
        validate(&params)?;
        Ok(Self {
            base: StrategyBase::new(Self::ID, sizing),
            params,
        })
    }

    pub fn from_table(table: &toml::Table, sizing: PositionSizing) -> Result<Self> {
        Self::new(merge_params(&RsiParams::default(), table, Self::ID)?, sizing)
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.base.name = name.into();
        self
    }

    pub fn params(&self) -> &RsiParams {
        &self.params
    }

    pub fn with_params(&self, params: RsiParams) -> Result<Self> {
        validate(&params)?;
        Ok(Self {
            base: self.base.clone(),
            params,
        })
    }

    /// Confirmed trend: price and SMA slope agree.
    fn trend(&self, closes: &[f64]) -> Option<Side> {
        let period = self.params.trend_period;
        let now = sma(closes, period)?;
        let prev = sma(&closes[..closes.len() - 1], period)?;
        let last = *closes.last()?;
        if last > now && now > prev {
            Some(Side::Buy)
        } else if last < now && now < prev {
            Some(Side::Sell)
        } else {
            None
        }
    }

    fn against_trend(&self, side: Side, trend: Option<Side>) -> bool {
        self.params.use_trend_filter && trend == Some(side.opposite())
    }

    fn stops(&self, candles: &[Ohlcv], price: f64, side: Side) -> (Option<f64>, Option<f64>) {
        match atr(candles, self.params.atr_period) {
            Some(a) => (
                Some(price - side.sign() * self.params.stop_loss_atr * a),
                Some(price + side.sign() * self.params.take_profit_atr * a),
            ),
            None => (None, None),
        }
    }
}

fn validate(p: &RsiParams) -> Result<()> {
    let id = RsiStrategy::ID;
    check_period(id, "period", p.period, 2)?;
    check_period(id, "trend_period", p.trend_period, 1)?;
    check_period(id, "divergence_lookback", p.divergence_lookback, 3)?;
    check_period(id, "atr_period", p.atr_period, 1)?;
    if !(0.0 < p.oversold && p.oversold < p.overbought && p.overbought < 100.0) {
        return Err(Error::invalid_params(
            id,
            format!(
                "thresholds must satisfy 0 < oversold < overbought < 100, got {} / {}",
                p.oversold, p.overbought
            ),
        ));
    }
    check_positive(id, "divergence_confidence", p.divergence_confidence)?;
    check_positive(id, "stop_loss_atr", p.stop_loss_atr)?;
    check_positive(id, "take_profit_atr", p.take_profit_atr)
}

impl Default for RsiStrategy {
    fn default() -> Self {
        Self {
            base: StrategyBase::new(Self::ID, PositionSizing::default()),
            params: RsiParams::default(),
        }
    }
}

impl Strategy for RsiStrategy {
    fn name(&self) -> &str {
        &self.base.name
    }

    fn min_data_points(&self) -> usize {
        let p = &self.params;
        let mut min = p.period + p.divergence_lookback + 1;
        if p.use_trend_filter {
            min = min.max(p.trend_period + 1);
        }
        min.max(p.atr_period + 1) + 5
    }

    fn evaluate(&self, market: &MarketData, candles: &[Ohlcv]) -> Option<Signal> {
        let p = &self.params;
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let rsi = RsiIndicator::new(p.period).series(&closes);
        let [.., rsi_prev, rsi_now] = rsi[..] else {
            return None;
        };

        let trend = self.trend(&closes);
        let divergence = if p.use_divergence {
            detect_divergence(&closes, &rsi, p.divergence_lookback)
        } else {
            Divergence::default()
        };

        // 1. Reversal out of the oversold zone
        if rsi_prev <= p.oversold && rsi_now > rsi_prev {
            if self.against_trend(Side::Buy, trend) {
                debug!(
                    symbol = %market.symbol,
                    rsi = rsi_now,
                    "Oversold reversal against downtrend — suppressed"
                );
            } else {
                let extremity = (p.oversold - rsi_prev) / p.oversold;
                let confidence = reversal_confidence(extremity, divergence.bullish);
                let reason = format!(
                    "RSI oversold reversal: RSI turned up from {rsi_prev:.1} (oversold < {})",
                    p.oversold
                );
                return Some(self.signal(
                    market,
                    candles,
                    Side::Buy,
                    confidence,
                    reason,
                    rsi_now,
                    &divergence,
                ));
            }
        }

        // 2. Reversal out of the overbought zone
        if rsi_prev >= p.overbought && rsi_now < rsi_prev {
            if self.against_trend(Side::Sell, trend) {
                debug!(
                    symbol = %market.symbol,
                    rsi = rsi_now,
                    "Overbought reversal against uptrend — suppressed"
                );
            } else {
                let extremity = (rsi_prev - p.overbought) / (100.0 - p.overbought);
                let confidence = reversal_confidence(extremity, divergence.bearish);
                let reason = format!(
                    "RSI overbought reversal: RSI turned down from {rsi_prev:.1} (overbought > {})",
                    p.overbought
                );
                return Some(self.signal(
                    market,
                    candles,
                    Side::Sell,
                    confidence,
                    reason,
                    rsi_now,
                    &divergence,
                ));
            }
        }

        // 3. Divergence while RSI is in the neutral zone
        if rsi_now > p.oversold && rsi_now < p.overbought {
            let side = match (divergence.bullish, divergence.bearish) {
                (true, false) => Side::Buy,
                (false, true) => Side::Sell,
                (true, true) if rsi_now >= 50.0 => Side::Buy,
                (true, true) => Side::Sell,
                (false, false) => return None,
            };
            if self.against_trend(side, trend) {
                return None;
            }
            let kind = match side {
                Side::Buy => "Bullish",
                Side::Sell => "Bearish",
            };
            let reason = format!("{kind} RSI divergence at RSI {rsi_now:.1}");
            return Some(self.signal(
                market,
                candles,
                side,
                p.divergence_confidence,
                reason,
                rsi_now,
                &divergence,
            ));
        }

        None
    }

    fn configure(&mut self, patch: &toml::Table) -> Result<()> {
        let params = merge_params(&self.params, patch, &self.base.name)?;
        *self = self.with_params(params)?;
        Ok(())
    }
}

impl RsiStrategy {
    #[allow(clippy::too_many_arguments)]
    fn signal(
        &self,
        market: &MarketData,
        candles: &[Ohlcv],
        side: Side,
        confidence: f64,
        reason: String,
        rsi: f64,
        divergence: &Divergence,
    ) -> Signal {
        let (stop_loss, take_profit) = self.stops(candles, market.price, side);
        let details = SignalDetails::new(reason)
            .indicator("rsi", rsi)
            .indicator("bullish_divergence", f64::from(u8::from(divergence.bullish)))
            .indicator("bearish_divergence", f64::from(u8::from(divergence.bearish)))
            .stops(stop_loss, take_profit);
        self.base.create_signal(market, side, confidence, details)
    }
}

/// 0.5 base, up to +0.5 for how deep RSI went past the threshold,
/// +0.15 when divergence agrees.
fn reversal_confidence(extremity: f64, divergence_agrees: bool) -> f64 {
    let bonus = if divergence_agrees { 0.15 } else { 0.0 };
    (0.5 + extremity.clamp(0.0, 1.0) * 0.5 + bonus).clamp(0.3, 0.9)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Divergence {
    /// Price lower low while RSI makes a higher low.
    pub bullish: bool,
    /// Price higher high while RSI makes a lower high.
    pub bearish: bool,
}

/// Compare the last two local extrema of price and of RSI over the trailing
/// `lookback` bars. `rsi` is aligned to the tail of `closes`.
pub fn detect_divergence(closes: &[f64], rsi: &[f64], lookback: usize) -> Divergence {
    if lookback < 3 || rsi.len() < lookback || closes.len() < lookback {
        return Divergence::default();
    }
    let price = &closes[closes.len() - lookback..];
    let osc = &rsi[rsi.len() - lookback..];

    let last_two = |idx: Vec<usize>| -> Option<(usize, usize)> {
        match idx[..] {
            [.., a, b] => Some((a, b)),
            _ => None,
        }
    };

    let bullish = match (
        last_two(local_extrema(price, |a, b| a < b)),
        last_two(local_extrema(osc, |a, b| a < b)),
    ) {
        (Some((p1, p2)), Some((r1, r2))) => price[p2] < price[p1] && osc[r2] > osc[r1],
        _ => false,
    };
    let bearish = match (
        last_two(local_extrema(price, |a, b| a > b)),
        last_two(local_extrema(osc, |a, b| a > b)),
    ) {
        (Some((p1, p2)), Some((r1, r2))) => price[p2] > price[p1] && osc[r2] < osc[r1],
        _ => false,
    };

    Divergence { bullish, bearish }
}

/// Indices strictly beyond both neighbours according to `beyond`.
fn local_extrema(values: &[f64], beyond: impl Fn(f64, f64) -> bool) -> Vec<usize> {
    (1..values.len().saturating_sub(1))
        .filter(|&i| beyond(values[i], values[i - 1]) && beyond(values[i], values[i + 1]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{candles_from_closes, tick_for};

    /// 57 falling bars then three up bars: RSI turns up from deep oversold.
    fn oversold_bounce() -> Vec<f64> {
        let mut closes: Vec<f64> = (0..57).map(|i| 150.0 - i as f64).collect();
        closes.extend((1..=3).map(|i| 94.0 + 0.8 * i as f64));
        closes
    }

    fn no_trend_filter() -> RsiStrategy {
        let params = RsiParams {
            use_trend_filter: false,
            ..RsiParams::default()
        };
        RsiStrategy::new(params, PositionSizing::default()).unwrap()
    }

    fn run(strategy: &RsiStrategy, closes: &[f64]) -> Vec<Signal> {
        let (markets, history) = tick_for("ETHUSDT", candles_from_closes(closes));
        strategy.analyze(&markets, &history).unwrap()
    }

    #[test]
    fn steady_uptrend_yields_no_signal() {
        // 60 closes rising linearly from 100 to 160: RSI pins at 100 and never
        // dips below 30, and a straight line has no local extrema to diverge.
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64 * 60.0 / 59.0).collect();
        let strategy = RsiStrategy::default();
        assert!(closes.len() >= strategy.min_data_points());

        let first = run(&strategy, &closes);
        let second = run(&strategy, &closes);
        assert_eq!(first.len(), 0);
        assert_eq!(first, second);
    }

    #[test]
    fn oversold_reversal_buys_without_trend_filter() {
        let signals = run(&no_trend_filter(), &oversold_bounce());
        assert_eq!(signals.len(), 1);
        let signal = &signals[0];
        assert_eq!(signal.side, Side::Buy);
        assert!(signal.reason.contains("RSI oversold reversal"));
        // RSI turned up from ~11.3: 0.5 + 0.5 * (30 - 11.3) / 30
        assert!((signal.confidence - 0.811).abs() < 0.005, "{}", signal.confidence);
        assert!(signal.indicators["rsi"] < 30.0);
    }

    #[test]
    fn trend_filter_blocks_buy_in_downtrend() {
        assert!(run(&RsiStrategy::default(), &oversold_bounce()).is_empty());
    }

    #[test]
    fn overbought_reversal_sells() {
        let mirrored: Vec<f64> = oversold_bounce().iter().map(|c| 300.0 - c).collect();
        let signals = run(&no_trend_filter(), &mirrored);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].side, Side::Sell);
        assert!(signals[0].reason.contains("overbought"));
        assert!((signals[0].confidence - 0.811).abs() < 0.005);
        assert!(signals[0].stop_loss.unwrap() > signals[0].price);
    }

    fn flat_then(base: usize, tail: &[f64]) -> Vec<f64> {
        let mut closes = vec![100.0; base];
        closes.extend_from_slice(tail);
        closes
    }

    #[test]
    fn divergence_adds_to_oversold_reversal() {
        // Plunge to 90, rebound to 94, lower low at 89 on a milder RSI dip, then a tick up
        let closes = flat_then(45, &[90.0, 94.0, 89.0, 89.5]);
        let signals = run(&no_trend_filter(), &closes);
        assert_eq!(signals.len(), 1);
        let s = &signals[0];
        assert_eq!(s.side, Side::Buy);
        assert!(s.reason.starts_with("RSI oversold reversal"));
        assert_eq!(s.indicators["bullish_divergence"], 1.0);
        assert!((s.confidence - 0.793).abs() < 0.001, "{}", s.confidence);

        let params = RsiParams {
            use_trend_filter: false,
            use_divergence: false,
            ..RsiParams::default()
        };
        let plain = RsiStrategy::new(params, PositionSizing::default()).unwrap();
        let without = run(&plain, &closes);
        assert_eq!(without.len(), 1);
        assert_eq!(without[0].indicators["bullish_divergence"], 0.0);
        assert!((s.confidence - without[0].confidence - 0.15).abs() < 1e-9);
    }

    #[test]
    fn neutral_zone_divergence_uses_fixed_confidence() {
        let signals = run(&no_trend_filter(), &flat_then(40, &[97.0, 97.5, 95.5, 98.5, 96.5]));
        assert_eq!(signals.len(), 1);
        let s = &signals[0];
        assert_eq!(s.side, Side::Buy);
        assert!(s.reason.starts_with("Bullish RSI divergence"));
        assert_eq!(s.confidence, 0.6);
        assert_eq!(s.indicators["bullish_divergence"], 1.0);
        assert_eq!(s.indicators["bearish_divergence"], 0.0);
        assert!(s.indicators["rsi"] > 30.0 && s.indicators["rsi"] < 70.0);
    }

    #[test]
    fn conflicting_divergences_resolve_on_the_midline() {
        // Both a lower low and a higher high in the window: RSI above 50 buys
        let signals = run(&no_trend_filter(), &flat_then(40, &[100.5, 99.5, 101.5, 98.5, 100.5]));
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].indicators["bullish_divergence"], 1.0);
        assert_eq!(signals[0].indicators["bearish_divergence"], 1.0);
        assert!(signals[0].indicators["rsi"] >= 50.0);
        assert_eq!(signals[0].side, Side::Buy);
        assert_eq!(signals[0].confidence, 0.6);

        // and below 50 sells
        let signals = run(&no_trend_filter(), &flat_then(40, &[99.5, 100.5, 98.5, 101.5, 99.5]));
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].indicators["bearish_divergence"], 1.0);
        assert!(signals[0].indicators["rsi"] < 50.0);
        assert_eq!(signals[0].side, Side::Sell);
        assert!(signals[0].reason.starts_with("Bearish RSI divergence"));
    }

    #[test]
    fn short_history_is_skipped() {
        let strategy = no_trend_filter();
        let closes = oversold_bounce();
        let short = &closes[closes.len() - (strategy.min_data_points() - 1)..];
        assert!(run(&strategy, short).is_empty());
    }

    #[test]
    fn detects_bullish_divergence() {
        // price: lows at idx 2 (10) and 6 (8) → lower low
        let closes = [12.0, 11.0, 10.0, 11.0, 12.0, 10.0, 8.0, 9.0, 10.0];
        // rsi: lows at idx 2 (25) and 6 (35) → higher low
        let rsi = [40.0, 30.0, 25.0, 35.0, 45.0, 40.0, 35.0, 42.0, 50.0];
        let d = detect_divergence(&closes, &rsi, 9);
        assert!(d.bullish);
        assert!(!d.bearish);
    }

    #[test]
    fn detects_bearish_divergence() {
        let closes = [8.0, 9.0, 10.0, 9.0, 8.0, 10.0, 12.0, 11.0, 10.0];
        let rsi = [60.0, 70.0, 75.0, 65.0, 55.0, 60.0, 65.0, 58.0, 50.0];
        let d = detect_divergence(&closes, &rsi, 9);
        assert!(d.bearish);
        assert!(!d.bullish);
    }

    #[test]
    fn no_divergence_without_two_extrema() {
        let closes: Vec<f64> = (0..14).map(|i| i as f64).collect();
        let rsi = vec![50.0; 14];
        assert_eq!(detect_divergence(&closes, &rsi, 14), Divergence::default());
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let params = RsiParams {
            overbought: 30.0,
            oversold: 70.0,
            ..RsiParams::default()
        };
        assert!(RsiStrategy::new(params, PositionSizing::default()).is_err());
    }
}
