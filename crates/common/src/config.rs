use std::time::Duration;

/// Process configuration loaded from environment variables at startup.
/// Missing required variables cause an immediate panic with a clear message.
#[derive(Debug, Clone)]
pub struct Config {
    /// Strategy config file path (TOML).
    pub strategy_config_path: String,

    /// JSON tick file re-read by the feed on every tick.
    pub market_data_path: String,

    pub tick_interval: Duration,
}

impl Config {
    /// Load all configuration from environment variables.
    /// Loads `.env` if present. Panics on any missing required variable.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        let tick_interval_secs = optional_env("TICK_INTERVAL_SECS")
            .map(|v| {
                v.parse::<u64>().unwrap_or_else(|_| {
                    panic!("TICK_INTERVAL_SECS must be a whole number of seconds, got: '{v}'")
                })
            })
            .unwrap_or(60);

        Config {
            strategy_config_path: optional_env("STRATEGY_CONFIG_PATH")
                .unwrap_or_else(|| "config/strategies.toml".to_string()),
            market_data_path: required_env("MARKET_DATA_PATH"),
            tick_interval: Duration::from_secs(tick_interval_secs.max(1)),
        }
    }
}

fn required_env(key: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| {
        panic!("Required environment variable '{key}' is not set. Check your .env file.")
    })
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}
