//! Finds downloadable video and subtitle links for a film on a directory-style
//! listing site, organised as `{base}/{year}/{title}/`.

pub mod api;
pub mod classify;
pub mod config;
pub mod fetcher;
pub mod normalize;
pub mod resolver;

use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use crate::{
    api::{ApiError, AppState},
    config::{Config, FetchMode},
    fetcher::{PageFetcher, StaticFetcher},
    resolver::MovieResolver,
};

async fn build_fetcher(config: &Config) -> Result<Arc<dyn PageFetcher>, ApiError> {
    match config.fetch_mode {
        FetchMode::Static => {
            let fetcher = StaticFetcher::new(config.fetch_timeout_seconds).map_err(|error| {
                ApiError::internal(format!("Could not build HTTP client: {error}"))
            })?;
            Ok(Arc::new(fetcher))
        }
        #[cfg(feature = "headless")]
        FetchMode::Headless => {
            let fetcher = fetcher::HeadlessFetcher::new(config.max_concurrent_pages);
            fetcher.warm_up().await.map_err(|error| {
                ApiError::internal(format!("Could not start headless browser: {error}"))
            })?;
            Ok(Arc::new(fetcher))
        }
        #[cfg(not(feature = "headless"))]
        FetchMode::Headless => Err(ApiError::internal(
            "FETCH_MODE=headless requires building with the \"headless\" feature",
        )),
    }
}

pub async fn build_app(config: &Config) -> Result<Router, ApiError> {
    let fetcher = build_fetcher(config).await?;
    info!(
        "Using {} fetcher against {}",
        fetcher.name(),
        config.base_url
    );

    let state = AppState {
        resolver: MovieResolver::new(fetcher, config.base_url.clone()),
        fetch_mode: config.fetch_mode,
    };
    let cors = api::build_cors_layer(&config.allowed_origins)?;

    Ok(api::router(state, cors))
}

pub async fn serve(config: Config) -> Result<(), ApiError> {
    let listener = TcpListener::bind(&config.bind_addr).await.map_err(|error| {
        ApiError::internal(format!("Could not bind {}: {error}", config.bind_addr))
    })?;
    serve_on(listener, config).await
}

pub async fn serve_on(listener: TcpListener, config: Config) -> Result<(), ApiError> {
    let app = build_app(&config).await?;
    let addr = listener
        .local_addr()
        .map_err(|error| ApiError::internal(format!("Listener has no address: {error}")))?;

    info!("Server is running on http://{addr}");

    axum::serve(listener, app)
        .await
        .map_err(|error| ApiError::internal(format!("HTTP server error: {error}")))
}
