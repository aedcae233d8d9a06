use serde::{Deserialize, Serialize};

use common::{Error, MarketData, Ohlcv, Result, Side, Signal};

use crate::base::{
    check_period, check_positive, merge_params, PositionSizing, SignalDetails, StrategyBase,
};
use crate::indicators::{ichimoku_at, CloudPosition, IchimokuPeriods, IchimokuPoint};
use crate::Strategy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IchimokuParams {
    pub tenkan_period: usize,
    pub kijun_period: usize,
    pub senkou_b_period: usize,
    pub displacement: usize,
    /// Cloud thickness, as a fraction of price, that earns the thick-cloud bonus.
    pub min_cloud_thickness: f64,
    pub take_profit_pct: f64,
    /// Target for in-cloud signals.
    pub weak_take_profit_pct: f64,
}

impl Default for IchimokuParams {
    fn default() -> Self {
        Self {
            tenkan_period: 9,
            kijun_period: 26,
            senkou_b_period: 52,
            displacement: 26,
            min_cloud_thickness: 0.005,
            take_profit_pct: 0.05,
            weak_take_profit_pct: 0.02,
        }
    }
}

impl IchimokuParams {
    fn periods(&self) -> IchimokuPeriods {
        IchimokuPeriods {
            tenkan: self.tenkan_period,
            kijun: self.kijun_period,
            senkou_b: self.senkou_b_period,
            displacement: self.displacement,
        }
    }
}

/// Ichimoku Kinko Hyo: TK crosses, Kumo breakouts and Chikou confirmation.
#[derive(Debug, Clone)]
pub struct IchimokuStrategy {
    base: StrategyBase,
    params: IchimokuParams,
}

impl IchimokuStrategy {
    pub const ID: &'static str = "ichimoku";

    pub fn new(params: IchimokuParams, sizing: PositionSizing) -> Result<Self> {
        validate(&params)?;
        Ok(Self {
            base: StrategyBase::new(Self::ID, sizing),
            params,
        })
    }

    pub fn from_table(table: &toml::Table, sizing: PositionSizing) -> Result<Self> {
        Self::new(merge_params(&IchimokuParams::default(), table, Self::ID)?, sizing)
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.base.name = name.into();
        self
    }

    pub fn params(&self) -> &IchimokuParams {
        &self.params
    }

    pub fn with_params(&self, params: IchimokuParams) -> Result<Self> {
        validate(&params)?;
        Ok(Self {
            base: self.base.clone(),
            params,
        })
    }

    fn confidence(
        &self,
        base: f64,
        side: Side,
        price: f64,
        point: &IchimokuPoint,
        chikou: Option<Side>,
    ) -> f64 {
        let mut confidence = base;
        if point.position(price) != CloudPosition::Inside {
            confidence += 0.1;
        }
        if point.thickness() / price > self.params.min_cloud_thickness {
            confidence += 0.05;
        }
        let distance = match side {
            Side::Buy => price - point.cloud_top(),
            Side::Sell => point.cloud_bottom() - price,
        };
        if distance > 0.0 {
            confidence += (distance / price * 10.0).min(0.1);
        }
        if chikou == Some(side) {
            confidence += 0.1;
        }
        confidence.clamp(0.4, 0.9)
    }
}

fn validate(p: &IchimokuParams) -> Result<()> {
    let id = IchimokuStrategy::ID;
    check_period(id, "tenkan_period", p.tenkan_period, 1)?;
    check_period(id, "kijun_period", p.kijun_period, p.tenkan_period + 1)?;
    check_period(id, "senkou_b_period", p.senkou_b_period, p.kijun_period)?;
    check_period(id, "displacement", p.displacement, 1)?;
    if !p.min_cloud_thickness.is_finite() || p.min_cloud_thickness < 0.0 {
        return Err(Error::invalid_params(id, "min_cloud_thickness must be >= 0"));
    }
    check_positive(id, "take_profit_pct", p.take_profit_pct)?;
    check_positive(id, "weak_take_profit_pct", p.weak_take_profit_pct)
}

impl Default for IchimokuStrategy {
    fn default() -> Self {
        Self {
            base: StrategyBase::new(Self::ID, PositionSizing::default()),
            params: IchimokuParams::default(),
        }
    }
}

impl Strategy for IchimokuStrategy {
    fn name(&self) -> &str {
        &self.base.name
    }

    fn min_data_points(&self) -> usize {
        self.params.senkou_b_period + self.params.displacement + 10
    }

    fn evaluate(&self, market: &MarketData, candles: &[Ohlcv]) -> Option<Signal> {
        let p = &self.params;
        let periods = p.periods();
        let last = candles.len().checked_sub(1)?;
        let now = ichimoku_at(candles, last, &periods)?;
        let prev = ichimoku_at(candles, last.checked_sub(1)?, &periods)?;

        let price = market.price;
        let position = now.position(price);
        let prev_position = prev.position(candles[last - 1].close);

        let tk_cross = if prev.tenkan <= prev.kijun && now.tenkan > now.kijun {
            Some(Side::Buy)
        } else if prev.tenkan >= prev.kijun && now.tenkan < now.kijun {
            Some(Side::Sell)
        } else {
            None
        };

        let lagging = candles[last.checked_sub(p.displacement)?].close;
        let chikou = if price > lagging {
            Some(Side::Buy)
        } else if price < lagging {
            Some(Side::Sell)
        } else {
            None
        };

        let favourable = |side: Side| match side {
            Side::Buy => CloudPosition::Above,
            Side::Sell => CloudPosition::Below,
        };

        let (side, confidence, reason, stop_loss, target_pct) = if let Some(side) =
            tk_cross.filter(|&s| position == favourable(s) && chikou == Some(s))
        {
            let reason = match side {
                Side::Buy => "Strong bullish: TK cross above the cloud, Chikou confirms",
                Side::Sell => "Strong bearish: TK cross below the cloud, Chikou confirms",
            };
            (
                side,
                self.confidence(0.6, side, price, &now, chikou),
                reason,
                near_boundary(&now, side),
                p.take_profit_pct,
            )
        } else if let Some(side) = [Side::Buy, Side::Sell]
            .into_iter()
            .find(|&s| position == favourable(s) && prev_position != favourable(s))
        {
            let reason = match side {
                Side::Buy => "Kumo breakout: price closed above the cloud",
                Side::Sell => "Kumo breakdown: price closed below the cloud",
            };
            (
                side,
                self.confidence(0.65, side, price, &now, chikou),
                reason,
                near_boundary(&now, side),
                p.take_profit_pct,
            )
        } else if let Some(side) = tk_cross.filter(|_| position == CloudPosition::Inside) {
            // Weak in-cloud cross: stop on the far side of the cloud
            let stop = match side {
                Side::Buy => now.cloud_bottom(),
                Side::Sell => now.cloud_top(),
            };
            (
                side,
                0.45,
                "TK cross inside the cloud, wait for confirmation",
                stop,
                p.weak_take_profit_pct,
            )
        } else {
            return None;
        };

        let details = SignalDetails::new(reason)
            .indicator("tenkan", now.tenkan)
            .indicator("kijun", now.kijun)
            .indicator("senkou_a", now.span_a)
            .indicator("senkou_b", now.span_b)
            .indicator("cloud_thickness", now.thickness())
            .indicator("chikou_reference", lagging)
            .stops(
                Some(stop_loss),
                Some(price * (1.0 + side.sign() * target_pct)),
            );
        Some(self.base.create_signal(market, side, confidence, details))
    }

    fn configure(&mut self, patch: &toml::Table) -> Result<()> {
        let params = merge_params(&self.params, patch, &self.base.name)?;
        *self = self.with_params(params)?;
        Ok(())
    }
}

/// Cloud edge price has just left: top for longs, bottom for shorts.
fn near_boundary(point: &IchimokuPoint, side: Side) -> f64 {
    match side {
        Side::Buy => point.cloud_top(),
        Side::Sell => point.cloud_bottom(),
    }
}
