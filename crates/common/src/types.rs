use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One closed candle of price history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ohlcv {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Ohlcv {
    /// (high + low + close) / 3
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }
}

/// Live snapshot for one (exchange, symbol) on the current analysis tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketData {
    pub symbol: String,
    pub exchange: String,
    /// Latest traded price.
    pub price: f64,
    pub high_24h: f64,
    pub low_24h: f64,
    /// Time the snapshot was taken. Signals inherit it.
    pub timestamp: DateTime<Utc>,
}

impl MarketData {
    /// Key into the historical data map, `"exchange:symbol"`.
    pub fn key(&self) -> String {
        history_key(&self.exchange, &self.symbol)
    }
}

pub fn history_key(exchange: &str, symbol: &str) -> String {
    format!("{exchange}:{symbol}")
}

/// Candle history per `"exchange:symbol"`, oldest first.
pub type HistoricalData = HashMap<String, Vec<Ohlcv>>;

/// Direction of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// +1.0 for buys, -1.0 for sells. Used to place stops and targets.
    pub fn sign(self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Advisory trade signal emitted by a single strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub exchange: String,
    pub side: Side,
    /// Suggested quantity in base asset units. 0 when no stop is known.
    pub amount: f64,
    pub price: f64,
    /// Id of the producing strategy.
    pub strategy: String,
    /// Always within [0, 1].
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
    /// Named indicator readout backing the signal.
    pub indicators: BTreeMap<String, f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
}

impl Signal {
    pub fn key(&self) -> String {
        history_key(&self.exchange, &self.symbol)
    }
}

/// Merged view of all same-direction signals on one instrument.
///
/// The flattened `signal` is the highest-confidence member of the group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedSignal {
    #[serde(flatten)]
    pub signal: Signal,
    /// Producing strategies, in registration order.
    pub sources: Vec<String>,
    pub combined_confidence: f64,
    pub agreement_ratio: f64,
}

/// Weight and enablement of one registered strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyWeight {
    pub name: String,
    pub weight: f64,
    pub enabled: bool,
}

/// Input for one analysis pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tick {
    pub markets: Vec<MarketData>,
    #[serde(default)]
    pub history: HistoricalData,
}

/// Runtime reconfiguration sent to a running strategy manager.
///
/// Parses from one JSON object per command, e.g.
/// `{"command": "set_weight", "name": "rsi", "weight": 1.5}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ManagerCommand {
    SetWeight { name: String, weight: f64 },
    SetEnabled { name: String, enabled: bool },
    Configure { name: String, patch: toml::Table },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_key_joins_exchange_and_symbol() {
        assert_eq!(history_key("binance", "BTCUSDT"), "binance:BTCUSDT");
    }

    #[test]
    fn side_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Side::Buy).unwrap(), "\"buy\"");
        assert_eq!(Side::Sell.to_string(), "SELL");
        assert_eq!(Side::Buy.opposite(), Side::Sell);
    }

    #[test]
    fn manager_commands_parse_from_json() {
        let cmd: ManagerCommand =
            serde_json::from_str(r#"{"command":"set_weight","name":"rsi","weight":1.5}"#).unwrap();
        assert_eq!(
            cmd,
            ManagerCommand::SetWeight {
                name: "rsi".into(),
                weight: 1.5
            }
        );

        let cmd: ManagerCommand = serde_json::from_str(
            r#"{"command":"configure","name":"bollinger","patch":{"period":30,"use_rsi_filter":false}}"#,
        )
        .unwrap();
        let ManagerCommand::Configure { name, patch } = cmd else {
            panic!("expected configure");
        };
        assert_eq!(name, "bollinger");
        assert_eq!(patch.get("period").and_then(|v| v.as_integer()), Some(30));
        assert_eq!(patch.get("use_rsi_filter").and_then(|v| v.as_bool()), Some(false));

        assert!(serde_json::from_str::<ManagerCommand>(r#"{"command":"restart"}"#).is_err());
    }

    #[test]
    fn aggregated_signal_flattens_representative() {
        let signal = Signal {
            symbol: "ETHUSDT".into(),
            exchange: "binance".into(),
            side: Side::Sell,
            amount: 0.0,
            price: 2000.0,
            strategy: "rsi".into(),
            confidence: 0.7,
            timestamp: DateTime::from_timestamp(0, 0).unwrap(),
            reason: "test".into(),
            indicators: BTreeMap::new(),
            stop_loss: None,
            take_profit: None,
        };
        let agg = AggregatedSignal {
            signal,
            sources: vec!["rsi".into()],
            combined_confidence: 0.8,
            agreement_ratio: 0.2,
        };
        let value = serde_json::to_value(&agg).unwrap();
        assert_eq!(value["symbol"], "ETHUSDT");
        assert_eq!(value["side"], "sell");
        assert_eq!(value["sources"][0], "rsi");
    }
}
