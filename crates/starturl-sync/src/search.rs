//! Search-engine result harvesting, one query at a time.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};
use starturl_storage::{FetchError, HttpFetcher};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

pub const DEFAULT_SEARCH_BASE_URL: &str = "https://www.google.com";

const RESULT_LINKS: &str = "#search a[href]";
const NEXT_PAGE_LINK: &str = "a#pnnext[href]";
const OMITTED_RESULTS_LINK: &str = "#ofr a[href]";

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search engine refused the request ({url})")]
    Blocked { url: String },
    #[error("search page fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("invalid selector {selector}: {reason}")]
    Selector { selector: &'static str, reason: String },
    #[error("no search page is open")]
    NotOpen,
}

/// A browsing session over one search engine result listing.
#[async_trait]
pub trait SearchSession: Send {
    /// Loads the first result page for `query`, skipping `start` results.
    async fn open(&mut self, query: &str, start: usize) -> Result<(), SearchError>;

    /// Result URLs on the current page, in page order.
    fn collect_urls(&self) -> Result<Vec<String>, SearchError>;

    /// Follows the "repeat the search with the omitted results included" link.
    async fn show_omitted_results(&mut self) -> Result<bool, SearchError>;

    async fn next_page(&mut self) -> Result<bool, SearchError>;
}

/// Random pause between page loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageDelay {
    pub min: Duration,
    pub max: Duration,
}

impl PageDelay {
    pub const fn none() -> Self {
        Self {
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    /// Parses `"6000..18000"` (milliseconds) or a single fixed value.
    pub fn parse_millis(value: &str) -> Option<Self> {
        let (min, max) = match value.split_once("..") {
            Some((lo, hi)) => (lo.trim().parse::<u64>().ok()?, hi.trim().parse::<u64>().ok()?),
            None => {
                let fixed = value.trim().parse::<u64>().ok()?;
                (fixed, fixed)
            }
        };
        if min > max {
            return None;
        }
        Some(Self {
            min: Duration::from_millis(min),
            max: Duration::from_millis(max),
        })
    }

    pub fn sample(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        Duration::from_millis(rand::random_range(min..=max))
    }

    async fn wait(&self) {
        let delay = self.sample();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for PageDelay {
    fn default() -> Self {
        Self {
            min: Duration::from_millis(6_000),
            max: Duration::from_millis(18_000),
        }
    }
}

fn selector(css: &'static str) -> Result<Selector, SearchError> {
    Selector::parse(css).map_err(|e| SearchError::Selector {
        selector: css,
        reason: e.to_string(),
    })
}

fn is_blocked_url(url: &str) -> bool {
    url.contains("/sorry")
}

/// Normalises a result anchor into an outbound URL, dropping links back into
/// the search engine itself.
pub fn clean_result_href(href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    if let Some(rest) = href.strip_prefix("/url?") {
        let target = url::form_urlencoded::parse(rest.as_bytes())
            .find(|(key, _)| key == "q" || key == "url")
            .map(|(_, value)| value.into_owned())?;
        return clean_result_href(&target);
    }
    let absolute = if let Some(rest) = href.strip_prefix("//") {
        format!("https://{rest}")
    } else if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else {
        return None;
    };
    let parsed = Url::parse(&absolute).ok()?;
    let host = parsed.host_str()?;
    if host.ends_with(".googleusercontent.com") {
        return None;
    }
    if host == "google.com" || host.ends_with(".google.com") {
        return None;
    }
    Some(absolute)
}

/// Plain HTTP rendition of a result-page session.
#[derive(Debug)]
pub struct HttpSearchSession {
    fetcher: Arc<HttpFetcher>,
    base_url: String,
    delay: PageDelay,
    page: Option<LoadedPage>,
}

#[derive(Debug)]
struct LoadedPage {
    url: Url,
    html: String,
}

impl HttpSearchSession {
    pub fn new(fetcher: Arc<HttpFetcher>, base_url: impl Into<String>, delay: PageDelay) -> Self {
        Self {
            fetcher,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            delay,
            page: None,
        }
    }

    pub fn search_url(&self, query: &str, start: usize) -> String {
        let mut url = format!("{}/search?q={}", self.base_url, urlencoding::encode(query.trim()));
        if start > 0 {
            url.push_str(&format!("&start={start}"));
        }
        url
    }

    async fn load(&mut self, url: &str) -> Result<(), SearchError> {
        let resp = match self.fetcher.fetch(url).await {
            Ok(resp) => resp,
            Err(FetchError::HttpStatus { status, url }) if status == 429 || is_blocked_url(&url) => {
                return Err(SearchError::Blocked { url });
            }
            Err(err) => return Err(err.into()),
        };
        if is_blocked_url(&resp.final_url) {
            return Err(SearchError::Blocked { url: resp.final_url });
        }
        let page_url = Url::parse(&resp.final_url).map_err(|_| SearchError::NotOpen)?;
        debug!(url = %page_url, bytes = resp.body.len(), "loaded search page");
        self.page = Some(LoadedPage {
            url: page_url,
            html: resp.text(),
        });
        Ok(())
    }

    fn link_on_page(&self, css: &'static str) -> Result<Option<String>, SearchError> {
        let page = self.page.as_ref().ok_or(SearchError::NotOpen)?;
        let sel = selector(css)?;
        let document = Html::parse_document(&page.html);
        Ok(document
            .select(&sel)
            .filter_map(|a| a.value().attr("href"))
            .find_map(|href| page.url.join(href).ok())
            .map(|url| url.to_string()))
    }

    async fn follow(&mut self, css: &'static str) -> Result<bool, SearchError> {
        let Some(target) = self.link_on_page(css)? else {
            return Ok(false);
        };
        self.delay.wait().await;
        self.load(&target).await?;
        Ok(true)
    }
}

#[async_trait]
impl SearchSession for HttpSearchSession {
    async fn open(&mut self, query: &str, start: usize) -> Result<(), SearchError> {
        self.page = None;
        let url = self.search_url(query, start);
        self.load(&url).await
    }

    fn collect_urls(&self) -> Result<Vec<String>, SearchError> {
        let page = self.page.as_ref().ok_or(SearchError::NotOpen)?;
        let sel = selector(RESULT_LINKS)?;
        let document = Html::parse_document(&page.html);
        Ok(document
            .select(&sel)
            .filter_map(|a| a.value().attr("href"))
            .filter_map(clean_result_href)
            .collect())
    }

    async fn show_omitted_results(&mut self) -> Result<bool, SearchError> {
        self.follow(OMITTED_RESULTS_LINK).await
    }

    async fn next_page(&mut self) -> Result<bool, SearchError> {
        self.follow(NEXT_PAGE_LINK).await
    }
}

/// Harvests result URLs for one query. Paging stops once `max_urls` are
/// collected, no further page is offered, a followed page adds no new URL,
/// or the engine blocks the session.
pub async fn collect_search_urls<S>(
    session: &mut S,
    query: &str,
    max_urls: usize,
    start: usize,
) -> Result<Vec<String>, SearchError>
where
    S: SearchSession + ?Sized,
{
    if let Err(err) = session.open(query, start).await {
        if start == 0 || matches!(err, SearchError::Blocked { .. }) {
            return Err(err);
        }
        warn!(%err, start, "deep search page failed; retrying from the first page");
        session.open(query, 0).await?;
    }

    let mut seen = HashSet::new();
    let mut urls = Vec::new();
    let mut followed = false;
    loop {
        let before = urls.len();
        for url in session.collect_urls()? {
            if seen.insert(url.clone()) {
                urls.push(url);
            }
        }
        if urls.len() >= max_urls {
            break;
        }
        if followed && urls.len() == before {
            debug!(collected = urls.len(), "page added no new results");
            break;
        }
        followed = true;
        match advance(session).await {
            Ok(true) => continue,
            Ok(false) => break,
            Err(SearchError::Blocked { url }) => {
                warn!(%url, "search engine blocked the session");
                break;
            }
            Err(err) => {
                warn!(%err, "stopping pagination");
                break;
            }
        }
    }
    Ok(urls)
}

async fn advance<S>(session: &mut S) -> Result<bool, SearchError>
where
    S: SearchSession + ?Sized,
{
    if session.show_omitted_results().await? {
        return Ok(true);
    }
    session.next_page().await
}

#[derive(Debug, Clone, Copy)]
pub struct SearchOptions {
    pub max_urls: usize,
    pub start: usize,
    pub vendor_pause: Duration,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_urls: 20,
            start: 0,
            vendor_pause: Duration::from_secs(120),
        }
    }
}

/// Runs every vendor's queries in turn. Vendors that yield no URLs are left out.
pub async fn search_all<S>(
    session: &mut S,
    queries_by_vendor: &BTreeMap<String, Vec<String>>,
    options: &SearchOptions,
) -> BTreeMap<String, Vec<String>>
where
    S: SearchSession + ?Sized,
{
    let mut results = BTreeMap::new();
    let pause_between = queries_by_vendor.len() > 1 && !options.vendor_pause.is_zero();

    for (idx, (vendor, queries)) in queries_by_vendor.iter().enumerate() {
        if idx > 0 && pause_between {
            info!(vendor = %vendor, pause_secs = options.vendor_pause.as_secs(), "pausing before next vendor");
            tokio::time::sleep(options.vendor_pause).await;
        }

        let mut urls = Vec::new();
        for query in queries {
            match collect_search_urls(session, query, options.max_urls, options.start).await {
                Ok(found) => {
                    info!(vendor = %vendor, query = %query, found = found.len(), "search finished");
                    urls.extend(found);
                }
                Err(err) => warn!(vendor = %vendor, query = %query, %err, "search failed"),
            }
        }
        if !urls.is_empty() {
            results.insert(vendor.clone(), urls);
        }
    }
    results
}
