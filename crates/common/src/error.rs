use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid parameters for strategy '{strategy}': {message}")]
    InvalidParams { strategy: String, message: String },

    #[error("Strategy '{strategy}' failed: {message}")]
    Strategy { strategy: String, message: String },

    #[error("Aggregation error: {0}")]
    Aggregation(String),

    #[error("Market feed error: {0}")]
    Feed(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    pub fn invalid_params(strategy: &str, message: impl Into<String>) -> Self {
        Error::InvalidParams {
            strategy: strategy.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
