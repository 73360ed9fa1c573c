use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use chromiumoxide::{
    Page,
    browser::{Browser, BrowserConfig},
    cdp::browser_protocol::{
        fetch::{EnableParams, EventRequestPaused, FailRequestParams, RequestPattern},
        network::{ErrorReason, ResourceType},
        page::NavigateParams,
    },
};
use futures_lite::StreamExt;
use serde::Deserialize;
use tokio::{
    sync::{OnceCell, Semaphore},
    task::JoinHandle,
    time::{Duration, Instant, sleep, timeout_at},
};
use tracing::{debug, info, warn};
use url::Url;

use super::{FetchError, ListingEntry, PageFetcher, USER_AGENT};
use crate::classify::resolve_href;

const NAVIGATION_TIMEOUT_SECONDS: u64 = 30;
const ANCHOR_POLL_INTERVAL_MS: u64 = 250;
const BLOCKED_RESOURCES: [ResourceType; 3] = [
    ResourceType::Image,
    ResourceType::Stylesheet,
    ResourceType::Font,
];
const DOM_READY_WITH_ANCHORS_JS: &str =
    "document.readyState !== 'loading' && document.querySelector('a') !== null";
const READ_ANCHORS_JS: &str = r#"
    Array.from(document.querySelectorAll('a')).map((a) => ({
        text: (a.innerText || a.textContent || '').trim(),
        href: a.getAttribute('href') || ''
    }))
"#;

struct BrowserSession {
    browser: Browser,
    _handler_task: JoinHandle<()>,
}

impl BrowserSession {
    async fn launch() -> Result<Self, FetchError> {
        let user_agent = format!("--user-agent={USER_AGENT}");
        let config = BrowserConfig::builder()
            .args([
                "--no-sandbox",
                "--disable-dev-shm-usage",
                "--disable-gpu",
                "--disable-setuid-sandbox",
                "--blink-settings=imagesEnabled=false",
                "--disable-blink-features=AutomationControlled",
                "--log-level=3",
                user_agent.as_str(),
            ])
            .build()
            .map_err(FetchError::Browser)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|error| FetchError::Browser(format!("failed to launch Chrome: {error}")))?;
        let handler_task = tokio::spawn(async move { while handler.next().await.is_some() {} });

        info!("Headless browser session started");
        Ok(Self {
            browser,
            _handler_task: handler_task,
        })
    }
}

/// Renders listing pages in a shared headless Chrome session.
///
/// The browser starts once, on [`HeadlessFetcher::warm_up`] or the first
/// fetch, and lives until the process exits. Every fetch gets its own page,
/// closed before the fetch returns or, if the fetch is dropped, right after.
pub struct HeadlessFetcher {
    session: OnceCell<BrowserSession>,
    page_permits: Arc<Semaphore>,
    open_pages: Arc<AtomicUsize>,
}

#[derive(Debug, Deserialize)]
struct RenderedAnchor {
    text: String,
    href: String,
}

impl HeadlessFetcher {
    pub fn new(max_concurrent_pages: usize) -> Self {
        Self {
            session: OnceCell::new(),
            page_permits: Arc::new(Semaphore::new(max_concurrent_pages.max(1))),
            open_pages: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub async fn warm_up(&self) -> Result<(), FetchError> {
        self.session().await.map(|_| ())
    }

    pub fn open_pages(&self) -> usize {
        self.open_pages.load(Ordering::SeqCst)
    }

    async fn session(&self) -> Result<&BrowserSession, FetchError> {
        self.session.get_or_try_init(BrowserSession::launch).await
    }
}

#[async_trait]
impl PageFetcher for HeadlessFetcher {
    fn name(&self) -> &'static str {
        "headless"
    }

    async fn fetch_links(&self, page_url: &Url) -> Result<Vec<ListingEntry>, FetchError> {
        let _page_permit = self
            .page_permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| FetchError::Browser("page pool closed".to_string()))?;
        let session = self.session().await?;

        let page = session
            .browser
            .new_page("about:blank")
            .await
            .map_err(|error| FetchError::Browser(format!("failed to open page: {error}")))?;
        let mut page = OpenPage::new(page, PageSlot::acquire(&self.open_pages));

        match block_heavy_resources(&page.page).await {
            Ok(task) => page.interception = Some(task),
            Err(error) => warn!("Resource blocking unavailable for {page_url}: {error}"),
        }

        let render_result = read_rendered_anchors(&page.page, page_url).await;
        page.close().await;

        render_result
    }
}

/// Counts one open page until dropped.
struct PageSlot {
    open_pages: Arc<AtomicUsize>,
}

impl PageSlot {
    fn acquire(open_pages: &Arc<AtomicUsize>) -> Self {
        open_pages.fetch_add(1, Ordering::SeqCst);
        Self {
            open_pages: Arc::clone(open_pages),
        }
    }
}

impl Drop for PageSlot {
    fn drop(&mut self) {
        self.open_pages.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A page that is closed on every exit path, including when the request
/// future is dropped mid-render.
struct OpenPage {
    page: Page,
    interception: Option<JoinHandle<()>>,
    slot: Option<PageSlot>,
    closed: bool,
}

impl OpenPage {
    fn new(page: Page, slot: PageSlot) -> Self {
        Self {
            page,
            interception: None,
            slot: Some(slot),
            closed: false,
        }
    }

    async fn close(mut self) {
        if let Some(task) = self.interception.take() {
            task.abort();
        }
        if let Err(error) = self.page.clone().close().await {
            warn!("Failed to close page: {error}");
        }
        self.closed = true;
    }
}

impl Drop for OpenPage {
    fn drop(&mut self) {
        if let Some(task) = self.interception.take() {
            task.abort();
        }

        let slot = self.slot.take();
        if self.closed {
            return;
        }
        let page = self.page.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(error) = page.close().await {
                        warn!("Failed to close abandoned page: {error}");
                    }
                    drop(slot);
                });
            }
            Err(_) => warn!("No runtime left to close an abandoned page"),
        }
    }
}

async fn block_heavy_resources(page: &Page) -> Result<JoinHandle<()>, FetchError> {
    let mut paused = page
        .event_listener::<EventRequestPaused>()
        .await
        .map_err(|error| FetchError::Browser(error.to_string()))?;

    let patterns = BLOCKED_RESOURCES
        .into_iter()
        .map(|resource_type| RequestPattern::builder().resource_type(resource_type).build())
        .collect::<Vec<_>>();
    page.execute(EnableParams::builder().patterns(patterns).build())
        .await
        .map_err(|error| FetchError::Browser(error.to_string()))?;

    let page = page.clone();
    Ok(tokio::spawn(async move {
        while let Some(event) = paused.next().await {
            let abort = FailRequestParams::new(event.request_id.clone(), ErrorReason::BlockedByClient);
            if page.execute(abort).await.is_err() {
                break;
            }
        }
    }))
}

async fn read_rendered_anchors(page: &Page, page_url: &Url) -> Result<Vec<ListingEntry>, FetchError> {
    let deadline = Instant::now() + Duration::from_secs(NAVIGATION_TIMEOUT_SECONDS);

    // Page.navigate returns once the navigation commits; readiness is polled below.
    let navigation = timeout_at(deadline, page.execute(NavigateParams::new(page_url.as_str())))
        .await
        .map_err(|_| FetchError::Timeout(NAVIGATION_TIMEOUT_SECONDS))?
        .map_err(|error| FetchError::Browser(format!("navigation failed: {error}")))?;
    if let Some(error_text) = navigation.result.error_text.as_deref() {
        return Err(FetchError::Browser(format!("navigation failed: {error_text}")));
    }

    let anchors_present = timeout_at(deadline, async {
        loop {
            let ready = page
                .evaluate(DOM_READY_WITH_ANCHORS_JS)
                .await
                .ok()
                .and_then(|result| result.into_value::<bool>().ok())
                .unwrap_or(false);
            if ready {
                break;
            }
            sleep(Duration::from_millis(ANCHOR_POLL_INTERVAL_MS)).await;
        }
    })
    .await;
    if anchors_present.is_err() {
        return Err(FetchError::NoAnchors);
    }

    let rendered = page
        .evaluate(READ_ANCHORS_JS)
        .await
        .map_err(|error| FetchError::Browser(error.to_string()))?
        .into_value::<Vec<RenderedAnchor>>()
        .map_err(|error| FetchError::Browser(error.to_string()))?;

    let entries = rendered
        .into_iter()
        .filter_map(|anchor| {
            Some(ListingEntry {
                href: resolve_href(page_url, &anchor.href)?,
                text: anchor.text,
            })
        })
        .collect::<Vec<_>>();

    if entries.is_empty() {
        return Err(FetchError::NoAnchors);
    }

    debug!("{} rendered link(s) on {page_url}", entries.len());
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_budget_is_never_zero() {
        let fetcher = HeadlessFetcher::new(0);
        assert_eq!(fetcher.page_permits.available_permits(), 1);
        assert_eq!(fetcher.open_pages(), 0);
    }

    #[tokio::test]
    async fn page_slot_is_released_when_the_fetch_is_cancelled() {
        let open_pages = Arc::new(AtomicUsize::new(0));
        let (acquired_tx, acquired_rx) = tokio::sync::oneshot::channel();

        let stalled = tokio::spawn({
            let open_pages = Arc::clone(&open_pages);
            async move {
                let _slot = PageSlot::acquire(&open_pages);
                let _ = acquired_tx.send(());
                std::future::pending::<()>().await;
            }
        });
        acquired_rx.await.unwrap();
        assert_eq!(open_pages.load(Ordering::SeqCst), 1);

        stalled.abort();
        assert!(stalled.await.unwrap_err().is_cancelled());
        assert_eq!(open_pages.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    #[ignore = "launches a local Chrome"]
    async fn cancelled_fetch_closes_its_page() {
        let fetcher = Arc::new(HeadlessFetcher::new(2));
        fetcher.warm_up().await.unwrap();

        let url = Url::parse("data:text/html,<p>never any links</p>").unwrap();
        let cancelled = tokio::time::timeout(Duration::from_millis(500), fetcher.fetch_links(&url)).await;
        assert!(cancelled.is_err());

        let deadline = Instant::now() + Duration::from_secs(5);
        while fetcher.open_pages() > 0 && Instant::now() < deadline {
            sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(fetcher.open_pages(), 0);
    }

    #[tokio::test]
    #[ignore = "launches a local Chrome"]
    async fn pages_are_released_after_concurrent_fetches() {
        let fetcher = Arc::new(HeadlessFetcher::new(3));
        fetcher.warm_up().await.unwrap();

        let targets = [
            "data:text/html,<a href='https://site/a/'>A</a>",
            "data:text/html,<p>no links</p>",
            "http://127.0.0.1:9/unreachable/",
            "data:text/html,<a href='x.mp4'>X</a>",
            "data:text/html,<a href='y.srt'>Y</a>",
        ];
        let tasks = targets.map(|target| {
            let fetcher = Arc::clone(&fetcher);
            let url = Url::parse(target).unwrap();
            tokio::spawn(async move { fetcher.fetch_links(&url).await.is_ok() })
        });
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(fetcher.open_pages(), 0);
    }
}
