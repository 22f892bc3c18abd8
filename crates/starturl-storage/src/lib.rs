//! HTTP fetch utilities, delimited-file codec and vendor datastore access.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use sqlx::mysql::MySqlPool;
use sqlx::Row;
use starturl_core::{
    split_comma_list, CanonicalStartUrl, CompanyIdentity, KnownUrlSet, RawUrlRecord,
    VendorDefinition, VendorQueryRow,
};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tracing::{debug, error, info_span, warn, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "starturl-storage";

pub const DEFAULT_USER_AGENTS: [&str; 3] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/84.0.4147.105 Safari/537.36 Edg/84.0.522.52",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/86.0.4240.183 Safari/537.36 Edg/86.0.622.63",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/70.0.3538.77 Safari/537.36",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

pub fn classify_status(status: StatusCode) -> RetryDisposition {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the delay added or removed at random; 0 gives a fixed schedule.
    pub jitter_factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            jitter_factor: 0.2,
        }
    }
}

impl BackoffPolicy {
    pub fn fixed(max_retries: usize, delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay: delay,
            max_delay: delay,
            jitter_factor: 0.0,
        }
    }

    pub fn delay_for_attempt(&self, attempt_index: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt_index as u32).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        delay.min(self.max_delay)
    }

    pub fn jittered_delay_for_attempt(&self, attempt_index: usize) -> Duration {
        let delay = self.delay_for_attempt(attempt_index);
        if self.jitter_factor <= 0.0 || delay.is_zero() {
            return delay;
        }
        let spread = delay.as_secs_f64() * self.jitter_factor.min(1.0);
        let jitter = rand::random_range(-spread..=spread);
        Duration::from_secs_f64((delay.as_secs_f64() + jitter).max(0.0))
    }
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or the retry
/// budget is spent. `op` receives the zero-based attempt index.
pub async fn retry_with_backoff<T, E, F, Fut, C>(
    policy: &BackoffPolicy,
    classify: C,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> RetryDisposition,
{
    let mut attempt = 0usize;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if classify(&err) == RetryDisposition::Retryable && attempt < policy.max_retries {
                    tokio::time::sleep(policy.jittered_delay_for_attempt(attempt)).await;
                    attempt += 1;
                    continue;
                }
                return Err(err);
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agents: Vec<String>,
    pub concurrency: usize,
    pub backoff: BackoffPolicy,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agents: DEFAULT_USER_AGENTS.iter().map(ToString::to_string).collect(),
            concurrency: 3,
            backoff: BackoffPolicy::default(),
        }
    }
}

#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    limit: Arc<Semaphore>,
    user_agents: Vec<String>,
    backoff: BackoffPolicy,
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub final_url: String,
    pub body: Vec<u8>,
}

impl FetchedResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed after retries: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
}

impl FetchError {
    pub fn disposition(&self) -> RetryDisposition {
        match self {
            FetchError::Request(err) => classify_reqwest_error(err),
            FetchError::HttpStatus { status, .. } => StatusCode::from_u16(*status)
                .map(classify_status)
                .unwrap_or(RetryDisposition::NonRetryable),
        }
    }
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout)
            .build()
            .context("building reqwest client")?;

        Ok(Self {
            client,
            limit: Arc::new(Semaphore::new(config.concurrency.max(1))),
            user_agents: config.user_agents,
            backoff: config.backoff,
        })
    }

    fn pick_user_agent(&self) -> Option<&str> {
        match self.user_agents.len() {
            0 => None,
            n => self.user_agents.get(rand::random_range(0..n)).map(String::as_str),
        }
    }

    /// GET with redirects followed; non-2xx responses become `FetchError::HttpStatus`.
    pub async fn fetch(&self, url: &str) -> Result<FetchedResponse, FetchError> {
        let _permit = self.limit.acquire().await.expect("semaphore not closed");
        let span = info_span!("http_fetch", url);

        retry_with_backoff(&self.backoff, FetchError::disposition, |attempt| {
            let mut request = self.client.get(url);
            if let Some(agent) = self.pick_user_agent() {
                request = request.header(reqwest::header::USER_AGENT, agent);
            }
            async move {
                if attempt > 0 {
                    debug!(attempt, "retrying request");
                }
                let resp = request.send().await?;
                let status = resp.status();
                let final_url = resp.url().to_string();
                if !status.is_success() {
                    return Err(FetchError::HttpStatus {
                        status: status.as_u16(),
                        url: final_url,
                    });
                }
                let body = resp.bytes().await?.to_vec();
                Ok(FetchedResponse {
                    status,
                    final_url,
                    body,
                })
            }
        })
        .instrument(span)
        .await
    }

    /// Follows the redirect chain of `url` and returns where it lands.
    pub async fn resolve_final_url(&self, url: &str) -> Result<String, FetchError> {
        self.fetch(url).await.map(|resp| resp.final_url)
    }
}

#[derive(Debug, Error)]
pub enum RecordFormatError {
    #[error("{origin}:{line}: expected at least 2 fields, found {found}")]
    TooFewFields {
        origin: String,
        line: usize,
        found: usize,
    },
}

fn split_fields(line: &str) -> Vec<&str> {
    let trimmed = line.trim();
    if trimmed.contains('\t') {
        trimmed.split('\t').map(str::trim).collect()
    } else {
        trimmed.split_whitespace().collect()
    }
}

/// Parses `name\turl` or `slug\tname\turl` lines. Malformed lines are returned
/// separately so one bad line never spoils the file.
pub fn parse_records(text: &str, origin: &str) -> (Vec<RawUrlRecord>, Vec<RecordFormatError>) {
    let mut records = Vec::new();
    let mut errors = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let fields = split_fields(line);
        let url = fields.last().copied().unwrap_or_default();
        match fields.len() {
            0 | 1 => errors.push(RecordFormatError::TooFewFields {
                origin: origin.to_string(),
                line: idx + 1,
                found: fields.len(),
            }),
            2 => records.push(RawUrlRecord::new(CompanyIdentity::named(fields[0]), url)),
            _ => records.push(RawUrlRecord::new(
                CompanyIdentity::with_slug(fields[0], fields[1]),
                url,
            )),
        }
    }
    (records, errors)
}

/// Last field of every non-blank line.
pub fn parse_urls(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| split_fields(line).last().map(|s| s.to_string()))
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn read_records(path: &Path) -> anyhow::Result<Vec<RawUrlRecord>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let (records, errors) = parse_records(&text, &path.display().to_string());
    for err in errors {
        warn!(%err, "skipping malformed line");
    }
    Ok(records)
}

pub fn read_urls(path: &Path) -> anyhow::Result<Vec<String>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(parse_urls(&text))
}

/// Vendor name for a list file: its stem.
pub fn vendor_name_for_file(path: &Path) -> Option<String> {
    path.file_stem().map(|s| s.to_string_lossy().into_owned())
}

/// Reads every `*.csv` in `dir` as one vendor's record list.
pub fn load_record_dir(dir: &Path) -> anyhow::Result<Vec<(String, Vec<RawUrlRecord>)>> {
    let mut entries = std::fs::read_dir(dir)
        .with_context(|| format!("reading {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "csv"))
        .collect::<Vec<_>>();
    entries.sort();

    let mut out = Vec::with_capacity(entries.len());
    for path in entries {
        let Some(vendor) = vendor_name_for_file(&path) else {
            continue;
        };
        match read_records(&path) {
            Ok(records) => out.push((vendor, records)),
            Err(err) => warn!(error = %err, path = %path.display(), "skipping unreadable list file"),
        }
    }
    Ok(out)
}

/// Known start URLs from a repository folder. A missing folder is an empty set.
pub fn load_known_sets(dir: &Path) -> anyhow::Result<KnownUrlSet> {
    if !dir.exists() {
        warn!(dir = %dir.display(), "known URL folder not found; treating as empty");
        return Ok(KnownUrlSet::default());
    }
    let vendors = load_record_dir(dir)?
        .into_iter()
        .map(|(vendor, records)| {
            let urls = records
                .into_iter()
                .map(|r| CanonicalStartUrl::new(r.identity, r.start_url))
                .collect();
            (vendor, urls)
        })
        .collect();
    Ok(KnownUrlSet::new(vendors))
}

pub fn format_records(entries: &[CanonicalStartUrl]) -> String {
    let mut out = String::new();
    for entry in entries {
        if let Some(slug) = &entry.identity.slug {
            out.push_str(slug);
            out.push('\t');
        }
        out.push_str(&entry.identity.name);
        out.push('\t');
        out.push_str(&entry.start_url);
        out.push('\n');
    }
    out
}

#[derive(Debug, Clone)]
pub struct WrittenFile {
    pub path: PathBuf,
    pub sha256: String,
    pub bytes: usize,
    pub records: usize,
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Writes a header-less tab-separated list through a temp file and rename.
pub async fn write_records(path: &Path, entries: &[CanonicalStartUrl]) -> anyhow::Result<WrittenFile> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)
        .await
        .with_context(|| format!("creating output directory {}", parent.display()))?;

    let text = format_records(entries);
    let bytes = text.as_bytes();
    let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));

    let mut file = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&temp_path)
        .await
        .with_context(|| format!("opening temp file {}", temp_path.display()))?;
    file.write_all(bytes)
        .await
        .with_context(|| format!("writing temp file {}", temp_path.display()))?;
    file.flush()
        .await
        .with_context(|| format!("flushing temp file {}", temp_path.display()))?;
    drop(file);

    if let Err(err) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(err).with_context(|| {
            format!("renaming {} -> {}", temp_path.display(), path.display())
        });
    }

    Ok(WrittenFile {
        path: path.to_path_buf(),
        sha256: sha256_hex(bytes),
        bytes: bytes.len(),
        records: entries.len(),
    })
}

#[derive(Debug, Error)]
pub enum DatastoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("reading vendor file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing vendor file {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// A row of the professional-network company dataset.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CompanyDatasetRow {
    pub company_name: String,
    pub company_domain: String,
    pub example_job_posting: String,
}

/// Read-only access to vendor definitions and the company dataset.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Active ATS vendors.
    async fn vendors(&self) -> Result<Vec<VendorDefinition>, DatastoreError>;

    /// Rows for query generation, optionally restricted to the named vendors.
    async fn query_rows(&self, names: Option<&[String]>) -> Result<Vec<VendorQueryRow>, DatastoreError>;

    async fn company_rows(&self) -> Result<Vec<CompanyDatasetRow>, DatastoreError>;
}

/// Loads the vendor registry. Datastore failures are logged and yield an empty list.
pub async fn load_vendors(store: &dyn Datastore) -> Vec<VendorDefinition> {
    match store.vendors().await {
        Ok(vendors) => vendors,
        Err(err) => {
            error!(%err, "failed to load vendors; continuing with an empty registry");
            Vec::new()
        }
    }
}

const VENDORS_SQL: &str = r#"
    SELECT name, main_domain, start_link_template, start_link_regexp, ignored_subdomains
      FROM spiders_on_recruitnet
     WHERE is_ats_site = 1 AND is_excluded = 0
"#;

const QUERY_ROWS_SQL: &str = r#"
    SELECT CAST(id AS SIGNED) AS id, name, main_domain, ignored_subdomains, google_query
      FROM spiders_on_recruitnet
     WHERE is_ats_site = 1 AND is_excluded = 0
"#;

const COMPANY_ROWS_SQL: &str = r#"
    SELECT company_name_in_linkedin, company_domain, example_job_posting
      FROM monitor_data
     WHERE is_excluded = 0
     ORDER BY company_domain
"#;

#[derive(Debug, Clone)]
pub struct MySqlDatastore {
    pool: MySqlPool,
}

impl MySqlDatastore {
    pub async fn connect(database_url: &str) -> Result<Self, DatastoreError> {
        let pool = MySqlPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[async_trait]
impl Datastore for MySqlDatastore {
    async fn vendors(&self) -> Result<Vec<VendorDefinition>, DatastoreError> {
        let rows = sqlx::query(VENDORS_SQL).fetch_all(&self.pool).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let ignored: Option<String> = row.try_get("ignored_subdomains")?;
            out.push(VendorDefinition {
                name: row.try_get("name")?,
                main_domain: row.try_get("main_domain")?,
                ignored_subdomains: split_comma_list(ignored.as_deref().unwrap_or_default()),
                start_link_regexp: non_blank(row.try_get("start_link_regexp")?),
                start_link_template: non_blank(row.try_get("start_link_template")?),
            });
        }
        Ok(out)
    }

    async fn query_rows(&self, names: Option<&[String]>) -> Result<Vec<VendorQueryRow>, DatastoreError> {
        let mut sql = QUERY_ROWS_SQL.to_string();
        if let Some(names) = names.filter(|n| !n.is_empty()) {
            let placeholders = vec!["?"; names.len()].join(", ");
            sql.push_str(&format!(" AND name IN ({placeholders})"));
        }
        let mut query = sqlx::query(&sql);
        for name in names.unwrap_or_default() {
            query = query.bind(name);
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let ignored: Option<String> = row.try_get("ignored_subdomains")?;
            out.push(VendorQueryRow {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                main_domain: row.try_get("main_domain")?,
                ignored_subdomains: split_comma_list(ignored.as_deref().unwrap_or_default()),
                google_query: row.try_get("google_query")?,
            });
        }
        Ok(out)
    }

    async fn company_rows(&self) -> Result<Vec<CompanyDatasetRow>, DatastoreError> {
        let rows = sqlx::query(COMPANY_ROWS_SQL).fetch_all(&self.pool).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let domain: Option<String> = row.try_get("company_domain")?;
            let posting: Option<String> = row.try_get("example_job_posting")?;
            let (Some(company_domain), Some(example_job_posting)) = (domain, posting) else {
                continue;
            };
            out.push(CompanyDatasetRow {
                company_name: row.try_get("company_name_in_linkedin")?,
                company_domain,
                example_job_posting,
            });
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct VendorFile {
    #[serde(default)]
    vendors: Vec<VendorFileEntry>,
    #[serde(default)]
    companies: Vec<CompanyDatasetRow>,
}

#[derive(Debug, Clone, Deserialize)]
struct VendorFileEntry {
    #[serde(default)]
    id: Option<i64>,
    #[serde(flatten)]
    definition: VendorDefinition,
    #[serde(default)]
    google_query: Option<String>,
}

/// Offline vendor registry backed by a YAML file.
#[derive(Debug, Clone)]
pub struct YamlDatastore {
    path: PathBuf,
}

impl YamlDatastore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn read(&self) -> Result<VendorFile, DatastoreError> {
        let path = self.path.display().to_string();
        let text = fs::read_to_string(&self.path)
            .await
            .map_err(|source| DatastoreError::Io {
                path: path.clone(),
                source,
            })?;
        serde_yaml::from_str(&text).map_err(|source| DatastoreError::Yaml { path, source })
    }
}

#[async_trait]
impl Datastore for YamlDatastore {
    async fn vendors(&self) -> Result<Vec<VendorDefinition>, DatastoreError> {
        Ok(self
            .read()
            .await?
            .vendors
            .into_iter()
            .map(|entry| entry.definition)
            .collect())
    }

    async fn query_rows(&self, names: Option<&[String]>) -> Result<Vec<VendorQueryRow>, DatastoreError> {
        let file = self.read().await?;
        Ok(file
            .vendors
            .into_iter()
            .enumerate()
            .filter(|(_, entry)| {
                names
                    .filter(|n| !n.is_empty())
                    .is_none_or(|n| n.contains(&entry.definition.name))
            })
            .map(|(idx, entry)| VendorQueryRow {
                id: entry.id.unwrap_or(idx as i64 + 1),
                name: entry.definition.name,
                main_domain: entry.definition.main_domain,
                ignored_subdomains: entry.definition.ignored_subdomains,
                google_query: entry.google_query,
            })
            .collect())
    }

    async fn company_rows(&self) -> Result<Vec<CompanyDatasetRow>, DatastoreError> {
        let mut rows = self.read().await?.companies;
        rows.sort_by(|a, b| a.company_domain.cmp(&b.company_domain));
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn backoff_logic_is_exponential_and_capped() {
        let policy = BackoffPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            jitter_factor: 0.0,
        };

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(350));
        assert_eq!(policy.jittered_delay_for_attempt(5), Duration::from_millis(350));
    }

    #[test]
    fn jitter_stays_within_spread() {
        let policy = BackoffPolicy {
            max_retries: 1,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(2),
            jitter_factor: 0.1,
        };
        for _ in 0..20 {
            let d = policy.jittered_delay_for_attempt(0);
            assert!(d >= Duration::from_millis(1800) && d <= Duration::from_millis(2200));
        }
    }

    #[tokio::test]
    async fn retry_stops_after_budget() {
        let calls = AtomicUsize::new(0);
        let policy = BackoffPolicy::fixed(2, Duration::from_millis(1));
        let result: Result<(), &str> = retry_with_backoff(
            &policy,
            |_| RetryDisposition::Retryable,
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("boom") }
            },
        )
        .await;
        assert_eq!(result, Err("boom"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_does_not_repeat_non_retryable_errors() {
        let calls = AtomicUsize::new(0);
        let policy = BackoffPolicy::fixed(5, Duration::from_millis(1));
        let result: Result<(), &str> = retry_with_backoff(
            &policy,
            |_| RetryDisposition::NonRetryable,
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("nope") }
            },
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_returns_first_success() {
        let policy = BackoffPolicy::fixed(3, Duration::from_millis(1));
        let result: Result<usize, &str> = retry_with_backoff(
            &policy,
            |_| RetryDisposition::Retryable,
            |attempt| async move {
                if attempt < 2 {
                    Err("flaky")
                } else {
                    Ok(attempt)
                }
            },
        )
        .await;
        assert_eq!(result, Ok(2));
    }

    #[test]
    fn status_classification() {
        assert_eq!(classify_status(StatusCode::BAD_GATEWAY), RetryDisposition::Retryable);
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            RetryDisposition::Retryable
        );
        assert_eq!(classify_status(StatusCode::NOT_FOUND), RetryDisposition::NonRetryable);
    }

    #[test]
    fn records_parse_two_and_three_field_lines() {
        let text = "Acme\thttps://acme.example/jobs\n\
                    acme-slug\tAcme Inc\thttps://acme.example/careers\n\
                    \n\
                    Globex https://globex.example/jobs\n\
                    lonely\n";
        let (records, errors) = parse_records(text, "inline");
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].identity, CompanyIdentity::named("Acme"));
        assert_eq!(records[0].start_url, "https://acme.example/jobs");
        assert_eq!(
            records[1].identity,
            CompanyIdentity::with_slug("acme-slug", "Acme Inc")
        );
        assert_eq!(records[2].identity.name, "Globex");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("inline:5"));
    }

    #[test]
    fn tab_lines_keep_spaces_inside_names() {
        let (records, _) = parse_records("Big Corp Ltd\thttps://x.example\n", "inline");
        assert_eq!(records[0].identity.name, "Big Corp Ltd");
    }

    #[test]
    fn url_only_mode_takes_last_field() {
        let urls = parse_urls("Acme\thttps://a.example\nhttps://b.example\n\n");
        assert_eq!(urls, vec!["https://a.example", "https://b.example"]);
    }

    #[test]
    fn format_emits_slug_only_when_present() {
        let entries = vec![
            CanonicalStartUrl::new(CompanyIdentity::named("Acme"), "https://a.example"),
            CanonicalStartUrl::new(CompanyIdentity::with_slug("g", "Globex"), "https://g.example"),
        ];
        assert_eq!(
            format_records(&entries),
            "Acme\thttps://a.example\ng\tGlobex\thttps://g.example\n"
        );
    }

    #[test]
    fn sha256_is_stable() {
        assert_eq!(
            sha256_hex(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }
}
