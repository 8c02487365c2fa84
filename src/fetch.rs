use std::path::PathBuf;

use reqwest::header::{ACCEPT, USER_AGENT};
use tracing::{debug, info, warn};

use crate::error::FetchError;

const BROWSER_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,\
    image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7";
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36";

/// Where a scrape cycle gets its page text from.
#[allow(async_fn_in_trait)]
pub trait PageSource {
    async fn fetch_page(&self) -> Result<String, FetchError>;
}

pub struct PageLoader {
    client: reqwest::Client,
    url: String,
    cache: Option<PathBuf>,
}

impl PageLoader {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            cache: None,
        }
    }

    /// Serve the page from `path` once it exists; the first fetch fills it.
    /// Keeps request volume down while debugging the parser.
    pub fn with_cache(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache = Some(path.into());
        self
    }

    async fn load_page(&self) -> Result<String, FetchError> {
        let request_error = |source| FetchError::Request {
            url: self.url.clone(),
            source,
        };

        let response = self
            .client
            .get(&self.url)
            .header(ACCEPT, BROWSER_ACCEPT)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        debug!(url = %self.url, %status, "response status code");
        if !status.is_success() {
            return Err(FetchError::Status {
                url: self.url.clone(),
                status,
            });
        }

        response.text().await.map_err(request_error)
    }
}

impl PageSource for PageLoader {
    async fn fetch_page(&self) -> Result<String, FetchError> {
        let Some(path) = &self.cache else {
            return self.load_page().await;
        };

        warn!(cache = ?path, "debug mode is active, page is served from the local cache");
        let cache_error = |source| FetchError::Cache {
            path: path.clone(),
            source,
        };

        if path.exists() {
            return tokio::fs::read_to_string(path).await.map_err(cache_error);
        }

        let page = self.load_page().await?;
        tokio::fs::write(path, &page).await.map_err(cache_error)?;
        info!(cache = ?path, bytes = page.len(), "page cached");
        Ok(page)
    }
}
