use url::Url;

use crate::api::ApiError;

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_BASE_URL: &str = "https://netupserver.com/film/";
const DEFAULT_FETCH_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_MAX_CONCURRENT_PAGES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    Static,
    Headless,
}

impl FetchMode {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "static" | "http" => Some(FetchMode::Static),
            "headless" | "browser" => Some(FetchMode::Headless),
            _ => None,
        }
    }

    pub fn not_found_message(self) -> &'static str {
        match self {
            FetchMode::Static => "Movie not found",
            FetchMode::Headless => "Download unavailable",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub base_url: Url,
    pub fetch_mode: FetchMode,
    pub fetch_timeout_seconds: u64,
    pub max_concurrent_pages: usize,
    pub allowed_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ApiError> {
        let base_url = std::env::var("FILM_BASE_URL")
            .ok()
            .and_then(|value| non_empty(&value).map(ToString::to_string))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = parse_base_url(&base_url).ok_or_else(|| {
            ApiError::internal(format!(
                "Invalid FILM_BASE_URL: {base_url}. Use a value like https://host/film/"
            ))
        })?;

        let fetch_mode = match std::env::var("FETCH_MODE") {
            Ok(value) => FetchMode::parse(&value).ok_or_else(|| {
                ApiError::internal(format!(
                    "Invalid FETCH_MODE: {value}. Use \"static\" or \"headless\""
                ))
            })?,
            Err(_) => FetchMode::Static,
        };

        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .ok()
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        Ok(Self {
            bind_addr: resolve_bind_addr(),
            base_url,
            fetch_mode,
            fetch_timeout_seconds: read_u64_env("FETCH_TIMEOUT_SECONDS")
                .filter(|value| *value > 0)
                .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECONDS),
            max_concurrent_pages: read_usize_env("MAX_CONCURRENT_PAGES")
                .filter(|value| *value > 0)
                .unwrap_or(DEFAULT_MAX_CONCURRENT_PAGES),
            allowed_origins,
        })
    }

    /// Settings for serving `base_url` with the static fetcher on `bind_addr`.
    pub fn for_site(bind_addr: impl Into<String>, base_url: Url) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            base_url,
            fetch_mode: FetchMode::Static,
            fetch_timeout_seconds: DEFAULT_FETCH_TIMEOUT_SECONDS,
            max_concurrent_pages: DEFAULT_MAX_CONCURRENT_PAGES,
            allowed_origins: Vec::new(),
        }
    }
}

fn parse_base_url(value: &str) -> Option<Url> {
    let mut parsed = Url::parse(value).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    if !parsed.path().ends_with('/') {
        let path = format!("{}/", parsed.path());
        parsed.set_path(&path);
    }
    Some(parsed)
}

fn read_usize_env(name: &str) -> Option<usize> {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
}

fn read_u64_env(name: &str) -> Option<u64> {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
}

fn resolve_bind_addr() -> String {
    if let Some(configured) = std::env::var("APP_ADDR")
        .ok()
        .and_then(|value| non_empty(&value).map(ToString::to_string))
    {
        return configured;
    }

    let port = std::env::var("PORT")
        .ok()
        .and_then(|value| value.trim().parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);

    format!("0.0.0.0:{port}")
}

pub(crate) fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
