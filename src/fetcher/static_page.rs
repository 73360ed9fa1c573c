use async_trait::async_trait;
use scraper::{Html, Selector};
use tokio::time::Duration;
use tracing::debug;
use url::Url;

use super::{FetchError, ListingEntry, PageFetcher, USER_AGENT};
use crate::classify::resolve_href;

#[derive(Debug, Clone)]
pub struct StaticFetcher {
    http_client: reqwest::Client,
    timeout_seconds: u64,
}

impl StaticFetcher {
    pub fn new(timeout_seconds: u64) -> Result<Self, FetchError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout_seconds))
            .build()?;

        Ok(Self {
            http_client,
            timeout_seconds,
        })
    }
}

#[async_trait]
impl PageFetcher for StaticFetcher {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn fetch_links(&self, page_url: &Url) -> Result<Vec<ListingEntry>, FetchError> {
        let response = self
            .http_client
            .get(page_url.clone())
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    FetchError::Timeout(self.timeout_seconds)
                } else {
                    FetchError::Request(error)
                }
            })?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status()));
        }

        let body = response.text().await?;
        let entries = extract_links(page_url, &body);
        debug!("{} link(s) found on {page_url}", entries.len());
        Ok(entries)
    }
}

pub(crate) fn extract_links(page_url: &Url, html: &str) -> Vec<ListingEntry> {
    let Ok(anchor) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    Html::parse_document(html)
        .select(&anchor)
        .filter_map(|element| {
            let href = resolve_href(page_url, element.value().attr("href")?)?;
            let text = element.text().collect::<String>().trim().to_string();
            Some(ListingEntry { text, href })
        })
        .collect()
}
