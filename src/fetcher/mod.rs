//! Retrieval of anchor lists from listing pages.
//!
//! Two strategies share the [`PageFetcher`] contract: a plain HTTP fetch with
//! HTML parsing, and a headless browser for pages that need script execution
//! (behind the `headless` feature).

#[cfg(feature = "headless")]
mod headless;
mod static_page;

#[cfg(feature = "headless")]
pub use headless::HeadlessFetcher;
pub use static_page::StaticFetcher;

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

/// Browser-like identification sent with every outbound request.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub text: String,
    /// Always absolute.
    pub href: String,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{0}")]
    Request(#[from] reqwest::Error),
    #[error("request failed with status code {0}")]
    Status(reqwest::StatusCode),
    #[error("timed out after {0} seconds")]
    Timeout(u64),
    #[error("no links found on page")]
    NoAnchors,
    #[error("browser error: {0}")]
    Browser(String),
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_links(&self, page_url: &Url) -> Result<Vec<ListingEntry>, FetchError>;
}
