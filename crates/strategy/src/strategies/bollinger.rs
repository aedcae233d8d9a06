use serde::{Deserialize, Serialize};

use common::{Error, MarketData, Ohlcv, Result, Side, Signal};

use crate::base::{
    check_period, check_positive, merge_params, PositionSizing, SignalDetails, StrategyBase,
};
use crate::indicators::{atr, bollinger_series, Bands, RsiIndicator};
use crate::Strategy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BollingerParams {
    pub period: usize,
    pub std_dev: f64,
    /// Require RSI confirmation for band-touch signals.
    pub use_rsi_filter: bool,
    pub rsi_period: usize,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    /// Trailing bars searched for the bandwidth minimum.
    pub squeeze_period: usize,
    /// Bandwidth within this fraction of the trailing minimum counts as a squeeze.
    pub squeeze_tolerance: f64,
    /// %B distance from a band that counts as a touch when crossed into.
    pub touch_zone: f64,
    pub atr_period: usize,
    pub stop_loss_atr: f64,
}

impl Default for BollingerParams {
    fn default() -> Self {
        Self {
            period: 20,
            std_dev: 2.0,
            use_rsi_filter: true,
            rsi_period: 14,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            squeeze_period: 20,
            squeeze_tolerance: 0.1,
            touch_zone: 0.05,
            atr_period: 14,
            stop_loss_atr: 1.5,
        }
    }
}

/// Bollinger Bands: band touches, squeeze breakouts and middle-band crosses.
#[derive(Debug, Clone)]
pub struct BollingerStrategy {
    base: StrategyBase,
    params: BollingerParams,
}

impl BollingerStrategy {
    pub const ID: &'static str = "bollinger";

    pub fn new(params: BollingerParams, sizing: PositionSizing) -> Result<Self> {
        validate(&params)?;
        Ok(Self {
            base: StrategyBase::new(Self::ID, sizing),
            params,
        })
    }

    pub fn from_table(table: &toml::Table, sizing: PositionSizing) -> Result<Self> {
        Self::new(merge_params(&BollingerParams::default(), table, Self::ID)?, sizing)
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.base.name = name.into();
        self
    }

    pub fn params(&self) -> &BollingerParams {
        &self.params
    }

    pub fn with_params(&self, params: BollingerParams) -> Result<Self> {
        validate(&params)?;
        Ok(Self {
            base: self.base.clone(),
            params,
        })
    }
}

fn validate(p: &BollingerParams) -> Result<()> {
    let id = BollingerStrategy::ID;
    check_period(id, "period", p.period, 2)?;
    check_period(id, "rsi_period", p.rsi_period, 2)?;
    check_period(id, "squeeze_period", p.squeeze_period, 2)?;
    check_period(id, "atr_period", p.atr_period, 1)?;
    check_positive(id, "std_dev", p.std_dev)?;
    check_positive(id, "touch_zone", p.touch_zone)?;
    check_positive(id, "stop_loss_atr", p.stop_loss_atr)?;
    if !(p.squeeze_tolerance.is_finite() && p.squeeze_tolerance >= 0.0) {
        return Err(Error::invalid_params(id, "squeeze_tolerance must be >= 0"));
    }
    if !(p.rsi_oversold < p.rsi_overbought) {
        return Err(Error::invalid_params(id, "rsi_oversold must be below rsi_overbought"));
    }
    Ok(())
}

impl Default for BollingerStrategy {
    fn default() -> Self {
        Self {
            base: StrategyBase::new(Self::ID, PositionSizing::default()),
            params: BollingerParams::default(),
        }
    }
}

impl Strategy for BollingerStrategy {
    fn name(&self) -> &str {
        &self.base.name
    }

    fn min_data_points(&self) -> usize {
        let p = &self.params;
        (p.period + p.squeeze_period)
            .max(p.rsi_period + 1)
            .max(p.atr_period + 1)
            + 2
    }

    fn evaluate(&self, market: &MarketData, candles: &[Ohlcv]) -> Option<Signal> {
        let p = &self.params;
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let bands = bollinger_series(&closes, p.period, p.std_dev);
        if bands.len() < p.squeeze_period + 1 {
            return None;
        }

        let price = market.price;
        let now = bands[bands.len() - 1];
        let prev = bands[bands.len() - 2];
        let prev_close = closes[closes.len() - 2];

        let pct_b = now.percent_b(price)?;
        let prev_pct_b = prev.percent_b(prev_close).unwrap_or(0.5);
        let rsi = RsiIndicator::new(p.rsi_period).compute(&closes);

        let widths: Vec<f64> = bands.iter().map(Bands::bandwidth).collect();
        let width_now = widths[widths.len() - 1];
        let width_prev = widths[widths.len() - 2];
        let trailing_min = min_of(&widths[widths.len() - p.squeeze_period..]);
        let in_squeeze = width_now <= trailing_min * (1.0 + p.squeeze_tolerance);

        let atr_value = atr(candles, p.atr_period);
        let readout = |details: SignalDetails| {
            let mut details = details
                .indicator("percent_b", pct_b)
                .indicator("upper_band", now.upper)
                .indicator("middle_band", now.middle)
                .indicator("lower_band", now.lower)
                .indicator("bandwidth", width_now);
            if let Some(r) = rsi {
                details = details.indicator("rsi", r);
            }
            details
        };

        // 1. Band touch, RSI-confirmed when the filter is on
        let lower_touch = pct_b <= 0.0 || (pct_b <= p.touch_zone && prev_pct_b > p.touch_zone);
        let upper_touch =
            pct_b >= 1.0 || (pct_b >= 1.0 - p.touch_zone && prev_pct_b < 1.0 - p.touch_zone);
        for (touched, side) in [(lower_touch, Side::Buy), (upper_touch, Side::Sell)] {
            if !touched {
                continue;
            }
            let (rsi_confirms, beyond) = match side {
                Side::Buy => (rsi.is_some_and(|r| r <= p.rsi_oversold), (-pct_b).max(0.0)),
                Side::Sell => (rsi.is_some_and(|r| r >= p.rsi_overbought), (pct_b - 1.0).max(0.0)),
            };
            if p.use_rsi_filter && !rsi_confirms {
                continue;
            }
            let confidence = (0.55 + beyond * 0.5 + if rsi_confirms { 0.1 } else { 0.0 }
                - if in_squeeze { 0.1 } else { 0.0 })
            .clamp(0.4, 0.85);
            let stop_loss = atr_value.map(|a| price - side.sign() * p.stop_loss_atr * a);
            let band = match side {
                Side::Buy => "lower",
                Side::Sell => "upper",
            };
            let details = readout(
                SignalDetails::new(format!("Bollinger {band} band touch (%B {pct_b:.2})"))
                    .stops(stop_loss, Some(now.middle)),
            );
            return Some(self.base.create_signal(market, side, confidence, details));
        }

        // 2. Squeeze breakout: bandwidth bottomed on the previous bar and is now expanding.
        // Direction follows where price broke relative to the middle band.
        let prev_window = &widths[widths.len() - 1 - p.squeeze_period..widths.len() - 1];
        if width_prev <= min_of(prev_window) && width_now > width_prev {
            let side = if price > now.middle {
                Some(Side::Buy)
            } else if price < now.middle {
                Some(Side::Sell)
            } else {
                None
            };
            if let Some(side) = side {
                let width = now.upper - now.lower;
                let details = readout(
                    SignalDetails::new(format!("Bollinger squeeze breakout {side}"))
                        .stops(Some(now.middle), Some(price + side.sign() * width)),
                );
                return Some(self.base.create_signal(market, side, 0.65, details));
            }
        }

        // 3. Middle band cross
        let side = if prev_close < prev.middle && price > now.middle {
            Side::Buy
        } else if prev_close > prev.middle && price < now.middle {
            Side::Sell
        } else {
            return None;
        };
        let (stop_loss, take_profit) = match side {
            Side::Buy => (now.lower, now.upper),
            Side::Sell => (now.upper, now.lower),
        };
        let direction = match side {
            Side::Buy => "above",
            Side::Sell => "below",
        };
        let details = readout(
            SignalDetails::new(format!("Price crossed {direction} Bollinger middle band"))
                .stops(Some(stop_loss), Some(take_profit)),
        );
        Some(self.base.create_signal(market, side, 0.5, details))
    }

    fn configure(&mut self, patch: &toml::Table) -> Result<()> {
        let params = merge_params(&self.params, patch, &self.base.name)?;
        *self = self.with_params(params)?;
        Ok(())
    }
}

fn min_of(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::INFINITY, f64::min)
}
