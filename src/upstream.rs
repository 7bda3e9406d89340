use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::config::ImageSearchConfig;
use crate::error::{BotError, Result};

pub const TODO_API_BASE: &str = "https://jsonplaceholder.typicode.com/todos";
const SEARCH_API_BASE: &str = "https://www.googleapis.com/customsearch/v1";

/// Upstream requests are bounded so a hanging API blocks at most one
/// event's processing for this long.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// One-shot HTTP GET. Handlers go through this seam so tests can
/// substitute canned bodies for the network.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        debug!("GET {}", url);
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BotError::Upstream(format!(
                "GET {} returned {}",
                url, status
            )));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// A single record from the placeholder todo API. Fields default rather
/// than fail so a sparse upstream document still parses.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TodoRecord {
    pub id: u64,
    pub title: String,
    pub completed: bool,
    pub user_id: u64,
}

/// Custom Search URL for an image query, with the query escaped.
pub fn search_url(config: &ImageSearchConfig, query: &str) -> String {
    format!(
        "{}?key={}&cx={}&searchType=image&safe=active&q={}",
        SEARCH_API_BASE,
        config.api_key,
        config.search_cx,
        urlencoding::encode(query)
    )
}

/// The first search hit's image link, or `None` on any structural
/// mismatch (bad JSON, missing `items`, empty array, missing `link`).
pub fn first_image_link(body: &[u8]) -> Option<String> {
    let doc: serde_json::Value = serde_json::from_slice(body).ok()?;
    doc.get("items")?
        .get(0)?
        .get("link")?
        .as_str()
        .map(str::to_string)
}
