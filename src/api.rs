use std::{collections::HashSet, sync::Arc};

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use url::Url;

use crate::{
    config::{FetchMode, non_empty},
    resolver::{MovieLink, MovieResolver, MovieResult, ResolveError},
};

#[derive(Clone)]
pub struct AppState {
    pub resolver: MovieResolver,
    pub fetch_mode: FetchMode,
}

#[derive(Debug, Deserialize)]
pub struct CheckMovieQuery {
    year: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MovieLinkQuery {
    year: Option<String>,
    title: Option<String>,
    resolution: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub details: Option<String>,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            details: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
            details: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
            details: None,
        }
    }

    fn from_resolve(error: ResolveError, mode: FetchMode) -> Self {
        match error {
            ResolveError::NotFound(_) => Self::not_found(mode.not_found_message()),
            ResolveError::Fetch { source, .. } => match mode {
                FetchMode::Static => Self {
                    details: Some(source.to_string()),
                    ..Self::not_found("Failed to fetch movie data")
                },
                FetchMode::Headless => Self::not_found(mode.not_found_message()),
            },
            ResolveError::ResolutionUnavailable(_) => {
                Self::bad_request("Resolution not available")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            details: self.details,
        });

        (self.status, body).into_response()
    }
}

pub fn router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/check_movie", get(check_movie))
        .route("/get_movie_link", get(get_movie_link))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

async fn check_movie(
    State(state): State<AppState>,
    Query(query): Query<CheckMovieQuery>,
) -> Result<Json<MovieResult>, ApiError> {
    let (Some(year), Some(title)) = (
        query.year.as_deref().and_then(non_empty),
        query.title.as_deref().and_then(non_empty),
    ) else {
        return Err(ApiError::bad_request("Missing title or year"));
    };

    state
        .resolver
        .resolve(year, title)
        .await
        .map(Json)
        .map_err(|error| ApiError::from_resolve(error, state.fetch_mode))
}

async fn get_movie_link(
    State(state): State<AppState>,
    Query(query): Query<MovieLinkQuery>,
) -> Result<Json<MovieLink>, ApiError> {
    let (Some(year), Some(title), Some(resolution)) = (
        query.year.as_deref().and_then(non_empty),
        query.title.as_deref().and_then(non_empty),
        query.resolution.as_deref().and_then(non_empty),
    ) else {
        return Err(ApiError::bad_request("Missing title, year, or resolution"));
    };

    state
        .resolver
        .movie_link(year, title, resolution)
        .await
        .map(Json)
        .map_err(|error| ApiError::from_resolve(error, state.fetch_mode))
}

pub fn build_cors_layer(configured: &[String]) -> Result<CorsLayer, ApiError> {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);

    if configured.is_empty() {
        warn!("ALLOWED_ORIGINS is not set. Any origin will be accepted.");
        return Ok(layer.allow_origin(Any));
    }

    let normalized_origins = configured
        .iter()
        .map(|origin| {
            normalize_origin(origin).ok_or_else(|| {
                ApiError::internal(format!(
                    "Invalid origin in ALLOWED_ORIGINS: {origin}. Use values like https://domain.com"
                ))
            })
        })
        .collect::<Result<HashSet<_>, _>>()?;
    let allowed_origins = Arc::new(normalized_origins);
    let allow_origin = AllowOrigin::predicate({
        let allowed_origins = Arc::clone(&allowed_origins);
        move |origin: &HeaderValue, _| {
            origin
                .to_str()
                .ok()
                .and_then(normalize_origin)
                .is_some_and(|value| allowed_origins.contains(&value))
        }
    });
    info!(
        "CORS allow-list loaded with {} origin(s): {:?}",
        allowed_origins.len(),
        allowed_origins
    );

    Ok(layer.allow_origin(allow_origin))
}

fn normalize_origin(value: &str) -> Option<String> {
    let parsed = Url::parse(value).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    let scheme = parsed.scheme();
    let default_port = match scheme {
        "http" => 80,
        "https" => 443,
        _ => return None,
    };

    if parsed.path() != "/" || parsed.query().is_some() || parsed.fragment().is_some() {
        return None;
    }

    match parsed.port() {
        Some(port) if port != default_port => Some(format!("{scheme}://{host}:{port}")),
        _ => Some(format!("{scheme}://{host}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::FetchError;

    #[test]
    fn origins_are_normalized() {
        assert_eq!(
            normalize_origin("HTTPS://Example.com:443").as_deref(),
            Some("https://example.com")
        );
        assert_eq!(
            normalize_origin("http://localhost:5173").as_deref(),
            Some("http://localhost:5173")
        );
        assert_eq!(normalize_origin("https://example.com/app"), None);
        assert_eq!(normalize_origin("file:///tmp"), None);
    }

    #[test]
    fn invalid_origin_fails_startup() {
        let error = build_cors_layer(&["example.com".to_string()]).unwrap_err();
        assert_eq!(error.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn fetch_errors_carry_details_only_for_static_mode() {
        let fetch_error = || ResolveError::Fetch {
            url: "https://site/film/2020/".to_string(),
            source: FetchError::Timeout(30),
        };

        let error = ApiError::from_resolve(fetch_error(), FetchMode::Static);
        assert_eq!(error.status, StatusCode::NOT_FOUND);
        assert_eq!(error.message, "Failed to fetch movie data");
        assert_eq!(error.details.as_deref(), Some("timed out after 30 seconds"));

        let error = ApiError::from_resolve(fetch_error(), FetchMode::Headless);
        assert_eq!(error.status, StatusCode::NOT_FOUND);
        assert_eq!(error.message, "Download unavailable");
        assert!(error.details.is_none());
    }

    #[test]
    fn missing_resolution_is_a_bad_request() {
        let error = ApiError::from_resolve(
            ResolveError::ResolutionUnavailable("4K".to_string()),
            FetchMode::Static,
        );
        assert_eq!(error.status, StatusCode::BAD_REQUEST);
        assert_eq!(error.message, "Resolution not available");
    }
}
