use std::{fmt, str::FromStr};

use serde::Serialize;
use url::Url;

const VIDEO_EXTENSION: &str = ".mp4";
const SUBTITLE_EXTENSION: &str = ".srt";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Resolution {
    #[serde(rename = "480p")]
    Sd480,
    #[serde(rename = "720p")]
    Hd720,
    #[serde(rename = "1080p")]
    FullHd1080,
    #[serde(rename = "4K")]
    Uhd4k,
    Unknown,
}

impl Resolution {
    /// Checked in this order; the first token found in the URL decides.
    const DETECTABLE: [Resolution; 4] = [
        Resolution::Sd480,
        Resolution::Hd720,
        Resolution::FullHd1080,
        Resolution::Uhd4k,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Resolution::Sd480 => "480p",
            Resolution::Hd720 => "720p",
            Resolution::FullHd1080 => "1080p",
            Resolution::Uhd4k => "4K",
            Resolution::Unknown => "Unknown",
        }
    }

    fn detect(url: &str) -> Self {
        Self::DETECTABLE
            .into_iter()
            .find(|resolution| url.contains(resolution.label()))
            .unwrap_or(Resolution::Unknown)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownResolution(pub String);

impl fmt::Display for UnknownResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown resolution label {:?}", self.0)
    }
}

impl FromStr for Resolution {
    type Err = UnknownResolution;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "480p" => Ok(Resolution::Sd480),
            "720p" => Ok(Resolution::Hd720),
            "1080p" => Ok(Resolution::FullHd1080),
            "4K" => Ok(Resolution::Uhd4k),
            "Unknown" => Ok(Resolution::Unknown),
            other => Err(UnknownResolution(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Video(Resolution),
    Subtitle,
    Ignored,
}

pub fn classify(url: &str) -> LinkKind {
    let parsed = Url::parse(url).ok();
    let path = parsed.as_ref().map(Url::path).unwrap_or(url);

    if path.ends_with(VIDEO_EXTENSION) {
        LinkKind::Video(Resolution::detect(url))
    } else if path.ends_with(SUBTITLE_EXTENSION) {
        LinkKind::Subtitle
    } else {
        LinkKind::Ignored
    }
}

/// Makes a listing href usable by clients. Hrefs that cannot be joined are dropped.
pub fn resolve_href(page_url: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    if href.starts_with("http") {
        return Some(href.to_string());
    }

    page_url.join(href).ok().map(|joined| joined.to_string())
}
