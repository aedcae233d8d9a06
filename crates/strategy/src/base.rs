use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use common::{Error, MarketData, Result, Side, Signal};

/// Account parameters used to turn a stop distance into an order size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PositionSizing {
    /// Account equity in quote currency.
    pub account_balance: f64,
    /// Percent of equity risked per trade (1.0 = 1%).
    pub risk_percent: f64,
}

impl Default for PositionSizing {
    fn default() -> Self {
        Self {
            account_balance: 10_000.0,
            risk_percent: 1.0,
        }
    }
}

/// Units to buy or sell so that hitting `stop_loss` loses `risk_percent` of the account.
/// Returns 0 for a degenerate stop at the entry price.
pub fn calculate_position_size(
    price: f64,
    stop_loss: f64,
    risk_percent: f64,
    account_balance: f64,
) -> f64 {
    let distance = (price - stop_loss).abs();
    if distance == 0.0 || !distance.is_finite() {
        return 0.0;
    }
    (account_balance * risk_percent / 100.0) / distance
}

/// Clamp to [0, 1]; NaN maps to 0.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

/// Everything a strategy supplies besides side and confidence.
#[derive(Debug, Clone, Default)]
pub struct SignalDetails {
    pub reason: String,
    pub indicators: BTreeMap<String, f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    /// Explicit size; derived from the stop when absent.
    pub amount: Option<f64>,
}

impl SignalDetails {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            ..Self::default()
        }
    }

    pub fn indicator(mut self, name: &str, value: f64) -> Self {
        self.indicators.insert(name.to_string(), value);
        self
    }

    pub fn stops(mut self, stop_loss: Option<f64>, take_profit: Option<f64>) -> Self {
        self.stop_loss = stop_loss;
        self.take_profit = take_profit;
        self
    }

    pub fn amount(mut self, amount: f64) -> Self {
        self.amount = Some(amount);
        self
    }
}

/// State shared by every strategy: its registry name and sizing inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyBase {
    pub name: String,
    pub sizing: PositionSizing,
}

impl StrategyBase {
    pub fn new(name: impl Into<String>, sizing: PositionSizing) -> Self {
        Self {
            name: name.into(),
            sizing,
        }
    }

    /// Build a signal stamped with the snapshot's instrument, price and time.
    pub fn create_signal(
        &self,
        market: &MarketData,
        side: Side,
        confidence: f64,
        details: SignalDetails,
    ) -> Signal {
        let amount = details
            .amount
            .or_else(|| {
                details.stop_loss.map(|stop| {
                    calculate_position_size(
                        market.price,
                        stop,
                        self.sizing.risk_percent,
                        self.sizing.account_balance,
                    )
                })
            })
            .unwrap_or(0.0);

        Signal {
            symbol: market.symbol.clone(),
            exchange: market.exchange.clone(),
            side,
            amount,
            price: market.price,
            strategy: self.name.clone(),
            confidence: clamp_confidence(confidence),
            timestamp: market.timestamp,
            reason: details.reason,
            indicators: details.indicators,
            stop_loss: details.stop_loss,
            take_profit: details.take_profit,
        }
    }
}

/// Overlay `patch` onto `current` and deserialize the result.
/// Unknown keys and ill-typed values are rejected as invalid parameters.
pub fn merge_params<P>(current: &P, patch: &toml::Table, strategy: &str) -> Result<P>
where
    P: Serialize + DeserializeOwned,
{
    let mut table = match toml::Value::try_from(current) {
        Ok(toml::Value::Table(table)) => table,
        Ok(_) => return Err(Error::invalid_params(strategy, "parameters must be a table")),
        Err(e) => return Err(Error::invalid_params(strategy, e.to_string())),
    };
    for (key, value) in patch {
        table.insert(key.clone(), value.clone());
    }
    toml::Value::Table(table)
        .try_into()
        .map_err(|e: toml::de::Error| Error::invalid_params(strategy, e.to_string()))
}

/// Reject periods below `min`.
pub(crate) fn check_period(strategy: &str, field: &str, value: usize, min: usize) -> Result<()> {
    if value < min {
        return Err(Error::invalid_params(
            strategy,
            format!("{field} must be >= {min}, got {value}"),
        ));
    }
    Ok(())
}

/// Reject non-finite or non-positive multipliers and ratios.
pub(crate) fn check_positive(strategy: &str, field: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(Error::invalid_params(
            strategy,
            format!("{field} must be a positive number, got {value}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::market;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(default, deny_unknown_fields)]
    struct Params {
        period: usize,
        factor: f64,
    }

    impl Default for Params {
        fn default() -> Self {
            Self {
                period: 14,
                factor: 2.0,
            }
        }
    }

    #[test]
    fn position_size_risks_fixed_fraction() {
        // 1% of 10k = 100 risked over a 5.0 stop distance
        assert_eq!(calculate_position_size(100.0, 95.0, 1.0, 10_000.0), 20.0);
        assert_eq!(calculate_position_size(100.0, 105.0, 1.0, 10_000.0), 20.0);
    }

    #[test]
    fn position_size_zero_for_degenerate_stop() {
        assert_eq!(calculate_position_size(100.0, 100.0, 1.0, 10_000.0), 0.0);
    }

    #[test]
    fn create_signal_clamps_and_stamps() {
        let base = StrategyBase::new("test", PositionSizing::default());
        let m = market("BTCUSDT", 100.0);
        let signal = base.create_signal(
            &m,
            Side::Buy,
            1.7,
            SignalDetails::new("why").stops(Some(98.0), Some(110.0)),
        );
        assert_eq!(signal.confidence, 1.0);
        assert_eq!(signal.symbol, "BTCUSDT");
        assert_eq!(signal.strategy, "test");
        assert_eq!(signal.timestamp, m.timestamp);
        assert_eq!(signal.amount, 50.0);

        let nan = base.create_signal(&m, Side::Sell, f64::NAN, SignalDetails::new("nan"));
        assert_eq!(nan.confidence, 0.0);
        assert_eq!(nan.amount, 0.0);
    }

    #[test]
    fn explicit_amount_wins_over_sizing() {
        let base = StrategyBase::new("test", PositionSizing::default());
        let signal = base.create_signal(
            &market("BTCUSDT", 100.0),
            Side::Buy,
            0.5,
            SignalDetails::new("x").stops(Some(90.0), None).amount(3.0),
        );
        assert_eq!(signal.amount, 3.0);
    }

    #[test]
    fn merge_overrides_only_named_fields() {
        let mut patch = toml::Table::new();
        patch.insert("factor".into(), toml::Value::Integer(3));
        let merged = merge_params(&Params::default(), &patch, "t").unwrap();
        assert_eq!(merged, Params { period: 14, factor: 3.0 });
    }

    #[test]
    fn merge_rejects_unknown_keys_and_bad_types() {
        let mut patch = toml::Table::new();
        patch.insert("perod".into(), toml::Value::Integer(3));
        assert!(matches!(
            merge_params(&Params::default(), &patch, "t"),
            Err(Error::InvalidParams { .. })
        ));

        let mut patch = toml::Table::new();
        patch.insert("period".into(), toml::Value::String("ten".into()));
        assert!(merge_params(&Params::default(), &patch, "t").is_err());
    }
}
