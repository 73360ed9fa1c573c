//! Directory-listing fixture shaped like the real film site.
//!
//! Serves `/film/2020/` with a few titles and two movie folders using
//! relative hrefs, the way autoindex pages do.

use axum::{Router, response::Html, routing::get};
use tokio::net::TcpListener;

const YEAR_2020: &str = r#"<html><head><title>Index of /film/2020/</title></head>
<body><h1>Index of /film/2020/</h1><hr><pre>
<a href="../">../</a>
<a href="Inception/">Inception</a>
<a href="Tenet/">Tenet</a>
<a href="/film/2020/The.Dark.Knight/">The Dark Knight</a>
</pre><hr></body></html>"#;

const INCEPTION: &str = r#"<html><body><pre>
<a href="../">../</a>
<a href="inception-720p.mp4">inception-720p.mp4</a>
<a href="inception.srt">inception.srt</a>
<a href="cover.jpg">cover.jpg</a>
</pre></body></html>"#;

const TENET: &str = r#"<html><body><pre>
<a href="../">../</a>
<a href="Tenet.2020.480p.mp4">Tenet.2020.480p.mp4</a>
<a href="Tenet.2020.1080p.mp4">Tenet.2020.1080p.mp4</a>
<a href="Tenet.2020.4K.HDR.mp4">Tenet.2020.4K.HDR.mp4</a>
</pre></body></html>"#;

const DARK_KNIGHT: &str = r#"<html><body><pre>
<a href="tdk.mp4">tdk.mp4</a>
<a href="subs/tdk.en.srt">tdk.en.srt</a>
<a href="subs/tdk.es.srt">tdk.es.srt</a>
</pre></body></html>"#;

/// Returns the base URL of the fixture site, e.g. `http://127.0.0.1:4000/film/`.
pub async fn start() -> String {
    let app = Router::new()
        .route("/film/2020/", get(|| async { Html(YEAR_2020) }))
        .route("/film/2020/Inception/", get(|| async { Html(INCEPTION) }))
        .route("/film/2020/Tenet/", get(|| async { Html(TENET) }))
        .route(
            "/film/2020/The.Dark.Knight/",
            get(|| async { Html(DARK_KNIGHT) }),
        )
        .route("/film/2021/", get(|| async { Html("<p>empty year</p>") }));

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind site");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await });

    format!("http://{addr}/film/")
}
