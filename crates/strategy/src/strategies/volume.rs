use serde::{Deserialize, Serialize};
use tracing::debug;

use common::{MarketData, Ohlcv, Result, Side, Signal};

use crate::base::{
    check_period, check_positive, merge_params, PositionSizing, SignalDetails, StrategyBase,
};
use crate::indicators::{atr, average_volume, obv_series, vwap, LevelKind, VolumeProfile};
use crate::Strategy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VolumeParams {
    /// Bars in the baseline average volume.
    pub volume_period: usize,
    pub volume_spike_multiplier: f64,
    pub obv_period: usize,
    /// Fractional distance from VWAP that triggers mean reversion.
    pub vwap_deviation: f64,
    /// Window for VWAP and the volume profile.
    pub lookback: usize,
    pub profile_bins: usize,
    pub level_proximity: f64,
    pub level_volume_ratio: f64,
    pub volume_trend_period: usize,
    pub atr_period: usize,
    pub stop_loss_atr: f64,
    pub take_profit_atr: f64,
}

impl Default for VolumeParams {
    fn default() -> Self {
        Self {
            volume_period: 20,
            volume_spike_multiplier: 2.0,
            obv_period: 14,
            vwap_deviation: 0.02,
            lookback: 50,
            profile_bins: 20,
            level_proximity: 0.01,
            level_volume_ratio: 1.5,
            volume_trend_period: 5,
            atr_period: 14,
            stop_loss_atr: 2.0,
            take_profit_atr: 3.0,
        }
    }
}

/// Volume spikes, OBV divergence, VWAP reversion and volume-profile levels.
#[derive(Debug, Clone)]
pub struct VolumeProfileStrategy {
    base: StrategyBase,
    params: VolumeParams,
}

impl VolumeProfileStrategy {
    pub const ID: &'static str = "volume_profile";

    pub fn new(params: VolumeParams, sizing: PositionSizing) -> Result<Self> {
        validate(&params)?;
        Ok(Self {
            base: StrategyBase::new(Self::ID, sizing),
            params,
        })
    }

    pub fn from_table(table: &toml::Table, sizing: PositionSizing) -> Result<Self> {
        Self::new(merge_params(&VolumeParams::default(), table, Self::ID)?, sizing)
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.base.name = name.into();
        self
    }

    pub fn params(&self) -> &VolumeParams {
        &self.params
    }

    pub fn with_params(&self, params: VolumeParams) -> Result<Self> {
        validate(&params)?;
        Ok(Self {
            base: self.base.clone(),
            params,
        })
    }

    fn atr_stops(
        &self,
        price: f64,
        side: Side,
        atr_value: Option<f64>,
    ) -> (Option<f64>, Option<f64>) {
        match atr_value {
            Some(a) => (
                Some(price - side.sign() * self.params.stop_loss_atr * a),
                Some(price + side.sign() * self.params.take_profit_atr * a),
            ),
            None => (None, None),
        }
    }

    fn volume_spike(&self, candles: &[Ohlcv], obv: &[f64]) -> Option<(Side, f64, f64)> {
        let p = &self.params;
        let n = candles.len();
        let last = candles[n - 1];
        let prev = candles[n - 2];
        let baseline = average_volume(&candles[n - 1 - p.volume_period..n - 1])?;
        if baseline <= 0.0 || last.volume < p.volume_spike_multiplier * baseline {
            return None;
        }
        let ratio = last.volume / baseline;
        // OBV over the trend window must agree with the bar's direction
        let flow = obv[n - 1] - obv[n - 1 - p.obv_period];
        let side = if last.close > prev.close && flow > 0.0 {
            Side::Buy
        } else if last.close < prev.close && flow < 0.0 {
            Side::Sell
        } else {
            debug!(ratio, flow, "Volume spike against the OBV trend — ignored");
            return None;
        };
        let confidence =
            (0.6 + (ratio / p.volume_spike_multiplier - 1.0).min(1.0) * 0.2).clamp(0.5, 0.9);
        Some((side, confidence, ratio))
    }

    /// Price at a fresh extreme that OBV over the same span does not confirm.
    fn obv_divergence(&self, closes: &[f64], obv: &[f64]) -> Option<Side> {
        let n = closes.len();
        let span = self.params.obv_period;
        let window = &closes[n - 1 - span..n - 1];
        let low = window.iter().copied().fold(f64::INFINITY, f64::min);
        let high = window.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let flow = obv[n - 1] - obv[n - 1 - span];
        let last = closes[n - 1];
        if last < low && flow > 0.0 {
            Some(Side::Buy)
        } else if last > high && flow < 0.0 {
            Some(Side::Sell)
        } else {
            None
        }
    }
}

fn validate(p: &VolumeParams) -> Result<()> {
    let id = VolumeProfileStrategy::ID;
    check_period(id, "volume_period", p.volume_period, 1)?;
    check_period(id, "obv_period", p.obv_period, 1)?;
    check_period(id, "lookback", p.lookback, 2)?;
    check_period(id, "profile_bins", p.profile_bins, 1)?;
    check_period(id, "volume_trend_period", p.volume_trend_period, 1)?;
    check_period(id, "atr_period", p.atr_period, 1)?;
    check_positive(id, "volume_spike_multiplier", p.volume_spike_multiplier)?;
    check_positive(id, "vwap_deviation", p.vwap_deviation)?;
    check_positive(id, "level_proximity", p.level_proximity)?;
    check_positive(id, "level_volume_ratio", p.level_volume_ratio)?;
    check_positive(id, "stop_loss_atr", p.stop_loss_atr)?;
    check_positive(id, "take_profit_atr", p.take_profit_atr)
}

impl Default for VolumeProfileStrategy {
    fn default() -> Self {
        Self {
            base: StrategyBase::new(Self::ID, PositionSizing::default()),
            params: VolumeParams::default(),
        }
    }
}

impl Strategy for VolumeProfileStrategy {
    fn name(&self) -> &str {
        &self.base.name
    }

    fn min_data_points(&self) -> usize {
        let p = &self.params;
        p.lookback
            .max(p.volume_period + 1)
            .max(p.volume_trend_period)
            .max(p.obv_period + 1)
            .max(p.atr_period + 1)
            + 1
    }

    fn evaluate(&self, market: &MarketData, candles: &[Ohlcv]) -> Option<Signal> {
        let p = &self.params;
        if candles.len() < self.min_data_points() {
            return None;
        }
        let price = market.price;
        let n = candles.len();
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let obv = obv_series(candles);
        let atr_value = atr(candles, p.atr_period);
        let window = &candles[n - p.lookback..];
        let vwap_value = vwap(window);

        let with_context = |details: SignalDetails| {
            let mut details = details.indicator("obv", obv[n - 1]);
            if let Some(v) = vwap_value {
                details = details.indicator("vwap", v);
            }
            if let Some(a) = atr_value {
                details = details.indicator("atr", a);
            }
            details
        };

        if let Some((side, confidence, ratio)) = self.volume_spike(candles, &obv) {
            let (stop_loss, take_profit) = self.atr_stops(price, side, atr_value);
            let details = with_context(
                SignalDetails::new(format!("Volume spike {ratio:.1}x average with OBV {side}"))
                    .indicator("volume_ratio", ratio)
                    .stops(stop_loss, take_profit),
            );
            return Some(self.base.create_signal(market, side, confidence, details));
        }

        if let Some(side) = self.obv_divergence(&closes, &obv) {
            let (stop_loss, take_profit) = self.atr_stops(price, side, atr_value);
            let reason = match side {
                Side::Buy => "Bullish OBV divergence: new price low on rising volume flow",
                Side::Sell => "Bearish OBV divergence: new price high on falling volume flow",
            };
            let details = with_context(
                SignalDetails::new(reason)
                    .indicator("obv_change", obv[n - 1] - obv[n - 1 - p.obv_period])
                    .stops(stop_loss, take_profit),
            );
            return Some(self.base.create_signal(market, side, 0.6, details));
        }

        if let Some(vw) = vwap_value.filter(|v| *v > 0.0) {
            let deviation = (price - vw) / vw;
            if deviation.abs() > p.vwap_deviation {
                let side = if deviation < 0.0 { Side::Buy } else { Side::Sell };
                let spread = typical_std_dev(window);
                let within_band = (price - vw).abs() <= 2.0 * spread;
                let confidence = (0.5
                    + (deviation.abs() * 5.0).min(0.2)
                    + if within_band { 0.1 } else { 0.0 })
                .clamp(0.4, 0.8);
                let (stop_loss, _) = self.atr_stops(price, side, atr_value);
                let details = with_context(
                    SignalDetails::new(format!(
                        "Price {:.1}% {} VWAP, expecting reversion",
                        deviation.abs() * 100.0,
                        if deviation < 0.0 { "below" } else { "above" }
                    ))
                    .indicator("vwap_deviation", deviation)
                    .stops(stop_loss, Some(vw)),
                );
                return Some(self.base.create_signal(market, side, confidence, details));
            }
        }

        let high = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
        let low = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);
        if (high - low) / price <= 2.0 * p.level_proximity {
            debug!(symbol = %market.symbol, "Range too narrow to resolve volume levels");
            return None;
        }
        let profile = VolumeProfile::build(window, p.profile_bins)?;
        let recent = average_volume(&candles[n - p.volume_trend_period..])?;
        let baseline = average_volume(&candles[n - p.volume_period..])?;
        if recent < baseline {
            return None;
        }
        let level = profile
            .levels(p.level_volume_ratio)
            .into_iter()
            .filter(|l| (price - l.price).abs() / price <= p.level_proximity)
            .min_by(|a, b| (price - a.price).abs().total_cmp(&(price - b.price).abs()))?;

        let (side, kind) = match level.kind {
            LevelKind::Support => (Side::Buy, "support"),
            LevelKind::Resistance => (Side::Sell, "resistance"),
        };
        let (stop_loss, take_profit) = self.atr_stops(price, side, atr_value);
        let details = with_context(
            SignalDetails::new(format!(
                "Price at high-volume {kind} {:.2} with rising volume",
                level.price
            ))
            .indicator("level_price", level.price)
            .indicator("level_volume", level.volume)
            .stops(stop_loss, take_profit),
        );
        Some(self.base.create_signal(market, side, 0.55, details))
    }

    fn configure(&mut self, patch: &toml::Table) -> Result<()> {
        let params = merge_params(&self.params, patch, &self.base.name)?;
        *self = self.with_params(params)?;
        Ok(())
    }
}

/// Population standard deviation of typical prices.
fn typical_std_dev(candles: &[Ohlcv]) -> f64 {
    let len = candles.len() as f64;
    let mean = candles.iter().map(Ohlcv::typical_price).sum::<f64>() / len;
    let variance = candles
        .iter()
        .map(|c| (c.typical_price() - mean).powi(2))
        .sum::<f64>()
        / len;
    variance.sqrt()
}
