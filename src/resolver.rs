use std::{collections::BTreeMap, sync::Arc};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    classify::{LinkKind, Resolution, classify},
    fetcher::{FetchError, ListingEntry, PageFetcher},
    normalize::normalize,
};

const NO_SUBTITLES: &str = "No subtitles found";

pub type AvailableOptions = BTreeMap<Resolution, String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SubtitleList {
    Found(Vec<String>),
    Missing(&'static str),
}

impl SubtitleList {
    fn from_links(links: Vec<String>) -> Self {
        if links.is_empty() {
            SubtitleList::Missing(NO_SUBTITLES)
        } else {
            SubtitleList::Found(links)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovieResult {
    pub movie_name: String,
    pub available_options: AvailableOptions,
    pub subtitles: SubtitleList,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovieLink {
    pub movie_link: String,
    pub subtitles: SubtitleList,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no listing entry matches {0:?}")]
    NotFound(String),
    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },
    #[error("resolution {0:?} is not available")]
    ResolutionUnavailable(String),
}

#[derive(Clone)]
pub struct MovieResolver {
    fetcher: Arc<dyn PageFetcher>,
    base_url: Url,
}

impl MovieResolver {
    pub fn new(fetcher: Arc<dyn PageFetcher>, base_url: Url) -> Self {
        Self { fetcher, base_url }
    }

    pub async fn resolve(&self, year: &str, title: &str) -> Result<MovieResult, ResolveError> {
        let Some(year_url) = year_folder_url(&self.base_url, year) else {
            debug!("rejected year {year:?}");
            return Err(ResolveError::NotFound(title.to_string()));
        };

        let year_entries = self.fetch(&year_url).await?;
        let wanted = normalize(title);
        let Some(movie_url) = find_title(&year_entries, &wanted) else {
            debug!("{title:?} not listed under {year_url}");
            return Err(ResolveError::NotFound(title.to_string()));
        };
        info!("{title:?} ({year}) matched {movie_url}");

        let movie_url =
            Url::parse(movie_url).map_err(|_| ResolveError::NotFound(title.to_string()))?;
        let movie_entries = self.fetch(&movie_url).await?;
        let (available_options, subtitles) = collect_assets(&movie_entries);

        Ok(MovieResult {
            movie_name: title.to_string(),
            available_options,
            subtitles: SubtitleList::from_links(subtitles),
        })
    }

    pub async fn movie_link(
        &self,
        year: &str,
        title: &str,
        resolution: &str,
    ) -> Result<MovieLink, ResolveError> {
        let mut movie = self.resolve(year, title).await?;

        let movie_link = resolution
            .parse::<Resolution>()
            .ok()
            .and_then(|resolution| movie.available_options.remove(&resolution))
            .ok_or_else(|| ResolveError::ResolutionUnavailable(resolution.to_string()))?;

        Ok(MovieLink {
            movie_link,
            subtitles: movie.subtitles,
        })
    }

    async fn fetch(&self, url: &Url) -> Result<Vec<ListingEntry>, ResolveError> {
        match self.fetcher.fetch_links(url).await {
            Ok(entries) => Ok(entries),
            Err(FetchError::NoAnchors) => {
                debug!("{url} rendered no links");
                Err(ResolveError::NotFound(url.to_string()))
            }
            Err(source) => {
                warn!("{} fetch of {url} failed: {source}", self.fetcher.name());
                Err(ResolveError::Fetch {
                    url: url.to_string(),
                    source,
                })
            }
        }
    }
}

/// Year folders are plain digit segments directly under the base path.
fn year_folder_url(base_url: &Url, year: &str) -> Option<Url> {
    if year.is_empty() || !year.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }

    base_url
        .join(&format!("{year}/"))
        .ok()
        .filter(|joined| joined.as_str().starts_with(base_url.as_str()))
}

/// Last matching entry wins, as when the listing is folded into a map.
fn find_title<'a>(entries: &'a [ListingEntry], wanted: &str) -> Option<&'a str> {
    entries
        .iter()
        .rev()
        .find(|entry| normalize(&entry.text) == wanted)
        .map(|entry| entry.href.as_str())
}

fn collect_assets(entries: &[ListingEntry]) -> (AvailableOptions, Vec<String>) {
    let mut options = AvailableOptions::new();
    let mut subtitles = Vec::new();

    for entry in entries {
        match classify(&entry.href) {
            LinkKind::Video(resolution) => {
                options.insert(resolution, entry.href.clone());
            }
            LinkKind::Subtitle => subtitles.push(entry.href.clone()),
            LinkKind::Ignored => {}
        }
    }

    (options, subtitles)
}
