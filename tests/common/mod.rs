pub mod listing_site;

use film_finder::config::Config;
use tokio::net::TcpListener;
use url::Url;

/// Starts the finder against `base_url` on an ephemeral port and returns its root URL.
pub async fn start_finder(base_url: &str) -> String {
    start_finder_with_origins(base_url, &[]).await
}

pub async fn start_finder_with_origins(base_url: &str, allowed_origins: &[&str]) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind finder");
    let addr = listener.local_addr().unwrap();
    let mut config = Config::for_site(addr.to_string(), Url::parse(base_url).unwrap());
    config.allowed_origins = allowed_origins.iter().map(ToString::to_string).collect();

    tokio::spawn(film_finder::serve_on(listener, config));
    format!("http://{addr}")
}
