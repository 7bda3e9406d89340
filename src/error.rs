use thiserror::Error;

/// Error taxonomy for the bot.
///
/// `Config` and `Registration` are fatal at startup. `Upstream` and
/// `Validation` are recovered at the dispatch boundary: the failing
/// command degrades to no reply (or its fixed fallback text) and the
/// cause is logged.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("upstream request failed: {0}")]
    Upstream(String),

    #[error("invalid command parameter: {0}")]
    Validation(String),

    #[error("command registration rejected: {0}")]
    Registration(String),
}

impl From<reqwest::Error> for BotError {
    fn from(err: reqwest::Error) -> Self {
        BotError::Upstream(err.to_string())
    }
}

impl From<serde_json::Error> for BotError {
    fn from(err: serde_json::Error) -> Self {
        BotError::Upstream(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BotError>;
