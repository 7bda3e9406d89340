use crate::error::{BotError, Result};

/// Runtime configuration, read from the process environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: String,
    pub image_search: Option<ImageSearchConfig>,
}

/// Google Custom Search credentials for the image command.
#[derive(Debug, Clone)]
pub struct ImageSearchConfig {
    pub api_key: String,
    pub search_cx: String,
}

impl Config {
    /// Load configuration from the environment, reading an optional
    /// `.env` file first. A missing `DISCORD_TOKEN` is fatal; missing
    /// search credentials only degrade the image command.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let discord_token = get("DISCORD_TOKEN")
            .filter(|token| !token.is_empty())
            .ok_or_else(|| BotError::Config("DISCORD_TOKEN is not set".to_string()))?;

        // Both halves of the Custom Search credentials are needed.
        let image_search = match (get("GOOGLE_API_KEY"), get("GOOGLE_SEARCH_CX")) {
            (Some(api_key), Some(search_cx)) if !api_key.is_empty() && !search_cx.is_empty() => {
                Some(ImageSearchConfig { api_key, search_cx })
            }
            _ => None,
        };

        Ok(Self {
            discord_token,
            image_search,
        })
    }
}
