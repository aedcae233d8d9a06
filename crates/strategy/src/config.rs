use std::path::Path;

use serde::{Deserialize, Serialize};

use common::{Error, Result};

use crate::base::PositionSizing;

/// Top-level strategy config file (TOML).
///
/// Example `config/strategies.toml`:
/// ```toml
/// [sizing]
/// account_balance = 10000.0
/// risk_percent = 1.0
///
/// [[strategy]]
/// type = "rsi"
/// name = "rsi_fast"
/// weight = 1.2
///
/// [strategy.params]
/// period = 9
/// oversold = 25.0
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StrategyFileConfig {
    #[serde(default)]
    pub sizing: PositionSizing,
    #[serde(rename = "strategy", default)]
    pub strategies: Vec<StrategyConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyConfig {
    /// Strategy type: "ma_crossover", "rsi", "bollinger", "ichimoku" or "volume_profile".
    #[serde(rename = "type")]
    pub strategy_type: String,
    /// Registry name; defaults to the type identifier.
    #[serde(default)]
    pub name: Option<String>,
    /// Aggregation weight, clamped to [0, 2] on registration.
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Indicator-specific parameters overlaid on the strategy defaults.
    #[serde(default)]
    pub params: toml::Table,
}

fn default_weight() -> f64 {
    1.0
}

fn default_enabled() -> bool {
    true
}

impl StrategyConfig {
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.strategy_type)
    }
}

impl StrategyFileConfig {
    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "failed to read strategy config at '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}
