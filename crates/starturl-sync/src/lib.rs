//! Start URL generation, reconciliation against the known repository, and the
//! discovery pipelines that feed them.

pub mod liveness;
pub mod search;

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use starturl_core::{
    build_queries, company_name_from_slug, company_name_from_url, extract_domain, fill_placeholders,
    find_vendor, CanonicalStartUrl, CompanyIdentity, DiscoverySource, KnownUrlSet, NewUrlBatch,
    QueryTemplates, RawRecordsByVendor, RawUrlRecord, StartUrlsByVendor, VendorDefinition,
};
use starturl_rewrite::RewriteDispatch;
use starturl_storage::{
    load_known_sets, load_vendors, read_records, read_urls, vendor_name_for_file, write_records,
    BackoffPolicy, Datastore, HttpClientConfig, HttpFetcher, MySqlDatastore, WrittenFile,
    YamlDatastore, DEFAULT_USER_AGENTS,
};
use tokio::fs;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

pub use liveness::{split_markers, CheckedUrl, LivenessChecker, LivenessError, LivenessOutcome};
pub use search::{
    collect_search_urls, search_all, HttpSearchSession, PageDelay, SearchError, SearchOptions,
    SearchSession, DEFAULT_SEARCH_BASE_URL,
};

pub const CRATE_NAME: &str = "starturl-sync";

/// Marker of a job-detail page inside an otherwise valid start URL.
pub const JOB_DETAIL_MARKER: &str = "/job/";

pub const RUN_SUMMARY_FILE: &str = "run_summary.json";

/// What to do with a record whose URL matches neither the vendor pattern nor
/// its rewritten form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedPolicy {
    #[default]
    PassThrough,
    Drop,
}

impl UnresolvedPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pass-through" | "passthrough" | "pass_through" | "keep" => Some(Self::PassThrough),
            "drop" => Some(Self::Drop),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub database_url: Option<String>,
    pub vendors_file: Option<PathBuf>,
    pub publishers_input_dir: PathBuf,
    pub known_dir: PathBuf,
    pub output_dir: PathBuf,
    pub http_timeout_secs: u64,
    pub max_retries: usize,
    pub liveness_workers: usize,
    pub vendor_pause_secs: u64,
    pub page_delay: PageDelay,
    pub user_agents: Vec<String>,
    pub search_base_url: String,
    pub unresolved_policy: UnresolvedPolicy,
    pub query_templates: QueryTemplates,
}

impl RunConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            database_url: non_empty("DATABASE_URL"),
            vendors_file: non_empty("VENDORS_FILE").map(PathBuf::from),
            publishers_input_dir: non_empty("PUBLISHERS_INPUT_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./publishers")),
            known_dir: non_empty("PUBLISHERS_COMPARING_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./publishers_repo")),
            output_dir: non_empty("NEW_URLS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./new_urls")),
            http_timeout_secs: non_empty("STARTURL_HTTP_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            max_retries: non_empty("STARTURL_MAX_RETRIES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
            liveness_workers: non_empty("STARTURL_LIVENESS_WORKERS")
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(3),
            vendor_pause_secs: non_empty("STARTURL_SEARCH_PAUSE_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(120),
            page_delay: non_empty("STARTURL_PAGE_DELAY_MS")
                .and_then(|v| PageDelay::parse_millis(&v))
                .unwrap_or_default(),
            user_agents: non_empty("STARTURL_USER_AGENTS")
                .map(|v| {
                    v.split('|')
                        .map(str::trim)
                        .filter(|ua| !ua.is_empty())
                        .map(ToString::to_string)
                        .collect()
                })
                .unwrap_or_else(|| DEFAULT_USER_AGENTS.iter().map(ToString::to_string).collect()),
            search_base_url: non_empty("STARTURL_SEARCH_BASE_URL")
                .unwrap_or_else(|| DEFAULT_SEARCH_BASE_URL.to_string()),
            unresolved_policy: non_empty("STARTURL_UNRESOLVED_POLICY")
                .and_then(|v| UnresolvedPolicy::parse(&v))
                .unwrap_or_default(),
            query_templates: QueryTemplates::default(),
        }
    }

    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: Duration::from_secs(self.http_timeout_secs),
            user_agents: self.user_agents.clone(),
            concurrency: self.liveness_workers,
            backoff: BackoffPolicy {
                max_retries: self.max_retries,
                ..BackoffPolicy::default()
            },
        }
    }

    pub fn search_options(&self, max_urls: usize, start: usize) -> SearchOptions {
        SearchOptions {
            max_urls,
            start,
            vendor_pause: Duration::from_secs(self.vendor_pause_secs),
        }
    }

    /// Destination folder for batches discovered through `source`.
    pub fn output_dir_for(&self, source: DiscoverySource) -> PathBuf {
        match source.folder() {
            Some(folder) => self.output_dir.join(folder),
            None => self.output_dir.clone(),
        }
    }
}

/// Anchors a vendor pattern at the start of the URL.
pub fn compile_start_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{pattern})"))
}

/// The pattern-matched prefix of `url`, cut before any job-detail segment.
pub fn match_start_prefix(pattern: &Regex, url: &str) -> Option<String> {
    let matched = pattern.find(url).filter(|m| m.start() == 0)?.as_str();
    let start_url = match matched.find(JOB_DETAIL_MARKER) {
        Some(idx) => &matched[..idx],
        None => matched,
    };
    (!start_url.is_empty()).then(|| start_url.to_string())
}

/// Removes one redundant repetition of `main_domain`, as produced when a
/// template appends the vendor domain to a host that already ends with it.
pub fn collapse_main_domain(url: &str, main_domain: &str) -> String {
    if main_domain.is_empty() {
        return url.to_string();
    }
    for doubled in [format!("{main_domain}.{main_domain}"), format!("{main_domain}{main_domain}")] {
        if url.contains(&doubled) {
            return url.replacen(&doubled, main_domain, 1);
        }
    }
    url.to_string()
}

/// The vendor template filled with the URL's host, or `None` when there is no
/// template, the URL has no host, or the template does not take exactly one value.
pub fn apply_template(vendor: &VendorDefinition, url: &str) -> Option<String> {
    let template = vendor.start_link_template.as_deref()?;
    let domain = extract_domain(url)?;
    let filled = fill_placeholders(template, &[&domain])?;
    Some(collapse_main_domain(&filled, &vendor.main_domain))
}

enum StartRule {
    /// A pattern was declared; `None` when it does not compile.
    Pattern(Option<Regex>),
    Template,
}

impl StartRule {
    fn for_vendor(vendor: &VendorDefinition) -> Self {
        let Some(pattern) = vendor.start_link_regexp.as_deref() else {
            return StartRule::Template;
        };
        match compile_start_pattern(pattern) {
            Ok(re) => StartRule::Pattern(Some(re)),
            Err(err) => {
                warn!(vendor = %vendor.name, %err, "invalid start link pattern; records will not match");
                StartRule::Pattern(None)
            }
        }
    }
}

/// Turns raw discovered URLs into canonical vendor start URLs.
pub struct StartUrlGenerator<'a> {
    vendors: &'a [VendorDefinition],
    dispatch: &'a RewriteDispatch,
    policy: UnresolvedPolicy,
}

impl<'a> StartUrlGenerator<'a> {
    pub fn new(vendors: &'a [VendorDefinition], dispatch: &'a RewriteDispatch) -> Self {
        Self {
            vendors,
            dispatch,
            policy: UnresolvedPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: UnresolvedPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Vendors that cannot be resolved are skipped. A record never fails: at
    /// worst its raw URL is passed through (or dropped, per policy).
    pub async fn generate_start_urls(&self, raw: &RawRecordsByVendor) -> StartUrlsByVendor {
        let mut out = StartUrlsByVendor::new();
        for (vendor_key, records) in raw {
            let Some(vendor) = find_vendor(vendor_key, self.vendors) else {
                debug!(vendor = %vendor_key, records = records.len(), "no vendor definition; skipping");
                continue;
            };
            let start_urls = self.generate_for_vendor(vendor_key, vendor, records).await;
            info!(vendor = %vendor_key, raw = records.len(), generated = start_urls.len(), "generated start urls");
            if !start_urls.is_empty() {
                out.insert(vendor_key.clone(), start_urls);
            }
        }
        out
    }

    async fn generate_for_vendor(
        &self,
        vendor_key: &str,
        vendor: &VendorDefinition,
        records: &[RawUrlRecord],
    ) -> Vec<CanonicalStartUrl> {
        let rule = StartRule::for_vendor(vendor);
        let mut out = Vec::with_capacity(records.len());
        for record in records {
            let start_url = match &rule {
                StartRule::Pattern(pattern) => {
                    self.resolve_by_pattern(pattern.as_ref(), &record.start_url, vendor_key)
                        .await
                }
                StartRule::Template => Some(apply_template(vendor, &record.start_url).unwrap_or_else(|| {
                    debug!(vendor = %vendor_key, url = %record.start_url, "template not applicable; keeping raw url");
                    record.start_url.clone()
                })),
            };
            if let Some(start_url) = start_url {
                out.push(CanonicalStartUrl::new(record.identity.clone(), start_url));
            }
        }
        out
    }

    async fn resolve_by_pattern(
        &self,
        pattern: Option<&Regex>,
        raw_url: &str,
        vendor_key: &str,
    ) -> Option<String> {
        if let Some(found) = pattern.and_then(|re| match_start_prefix(re, raw_url)) {
            return Some(found);
        }
        let rewritten = self.dispatch.rewrite(raw_url, vendor_key).await;
        if rewritten != raw_url {
            if let Some(found) = pattern.and_then(|re| match_start_prefix(re, &rewritten)) {
                return Some(found);
            }
        }
        match self.policy {
            UnresolvedPolicy::PassThrough => {
                debug!(vendor = %vendor_key, url = %rewritten, "unresolved url passed through");
                Some(rewritten)
            }
            UnresolvedPolicy::Drop => {
                debug!(vendor = %vendor_key, url = %raw_url, "unresolved url dropped");
                None
            }
        }
    }
}

/// True when a known start URL and a candidate denote the same entry point:
/// equal, the candidate contained in the known URL, or the candidate
/// extending the known URL with a query, fragment or deeper path.
pub fn covers(known: &str, candidate: &str) -> bool {
    if known.is_empty() {
        return false;
    }
    if known == candidate || known.contains(candidate) {
        return true;
    }
    candidate
        .strip_prefix(known)
        .is_some_and(|rest| rest.starts_with(['?', '#', '/']) || known.ends_with(['?', '#', '/']))
}

/// Candidates not yet covered by the known set, per vendor present in both.
///
/// Survivors are deduplicated on URL (first wins), lose their slug, and are
/// sorted by company name. Vendors left with nothing are omitted.
pub fn reconcile(fresh: &StartUrlsByVendor, known: &KnownUrlSet) -> BTreeMap<String, NewUrlBatch> {
    let mut batches = BTreeMap::new();
    for (vendor, candidates) in fresh {
        let Some(known_urls) = known.vendor(vendor) else {
            debug!(vendor = %vendor, "vendor absent from known repository; skipping");
            continue;
        };
        let mut seen = HashSet::new();
        let mut entries: Vec<CanonicalStartUrl> = candidates
            .iter()
            .filter(|c| !known_urls.iter().any(|k| covers(&k.start_url, &c.start_url)))
            .filter(|c| seen.insert(c.start_url.as_str()))
            .map(|c| {
                CanonicalStartUrl::new(CompanyIdentity::named(c.identity.name.clone()), c.start_url.clone())
            })
            .collect();
        entries.sort_by(|a, b| a.company_name().cmp(b.company_name()));
        if !entries.is_empty() {
            batches.insert(
                vendor.clone(),
                NewUrlBatch {
                    vendor: vendor.clone(),
                    entries,
                },
            );
        }
    }
    batches
}

/// Raw records named after the URL they came from.
pub fn records_from_urls(
    urls_by_vendor: &BTreeMap<String, Vec<String>>,
    name_pattern: Option<&Regex>,
) -> RawRecordsByVendor {
    urls_by_vendor
        .iter()
        .map(|(vendor, urls)| {
            let records = urls
                .iter()
                .map(|url| {
                    RawUrlRecord::new(CompanyIdentity::named(company_name_from_url(url, name_pattern)), url.clone())
                })
                .collect();
            (vendor.clone(), records)
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct GoogleRequest {
    pub spiders: Option<Vec<String>>,
    pub max_urls: usize,
    pub spider_name: Option<String>,
    pub query: Option<String>,
    pub name_regex: Option<String>,
    pub deepnest: usize,
    pub skip_liveness: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryFile {
    pub vendor: String,
    pub path: String,
    pub records: usize,
    pub bytes: usize,
    pub sha256: String,
}

impl SummaryFile {
    fn from_written(vendor: &str, written: WrittenFile) -> Self {
        Self {
            vendor: vendor.to_string(),
            path: written.path.display().to_string(),
            records: written.records,
            bytes: written.bytes,
            sha256: written.sha256,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub source: DiscoverySource,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub vendors_loaded: usize,
    pub raw_records: usize,
    pub generated: usize,
    pub liveness_failed: usize,
    pub new_urls: usize,
    pub output_dir: String,
    pub files: Vec<SummaryFile>,
}

struct RunStats {
    run_id: Uuid,
    source: DiscoverySource,
    started_at: DateTime<Utc>,
    vendors_loaded: usize,
    raw_records: usize,
    generated: usize,
    liveness_failed: usize,
}

impl RunStats {
    fn start(source: DiscoverySource) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            source,
            started_at: Utc::now(),
            vendors_loaded: 0,
            raw_records: 0,
            generated: 0,
            liveness_failed: 0,
        }
    }

    fn span(&self) -> tracing::Span {
        info_span!("discovery_run", run_id = %self.run_id, source = ?self.source)
    }
}

fn count<T>(by_vendor: &BTreeMap<String, Vec<T>>) -> usize {
    by_vendor.values().map(Vec::len).sum()
}

/// Wires configuration, datastore, HTTP and rewrite rules into the three
/// discovery flows.
pub struct DiscoveryPipeline {
    config: RunConfig,
    datastore: Box<dyn Datastore>,
    fetcher: Arc<HttpFetcher>,
    dispatch: RewriteDispatch,
}

impl DiscoveryPipeline {
    pub fn new(config: RunConfig, datastore: Box<dyn Datastore>) -> Result<Self> {
        let fetcher = Arc::new(HttpFetcher::new(config.http_client_config())?);
        let dispatch = RewriteDispatch::with_builtin_rules(fetcher.clone());
        Ok(Self {
            config,
            datastore,
            fetcher,
            dispatch,
        })
    }

    /// Uses the database when configured, else the YAML vendor file.
    pub async fn connect(config: RunConfig) -> Result<Self> {
        let datastore: Box<dyn Datastore> = match (&config.database_url, &config.vendors_file) {
            (Some(url), _) => Box::new(
                MySqlDatastore::connect(url)
                    .await
                    .context("connecting to the vendor database")?,
            ),
            (None, Some(path)) => Box::new(YamlDatastore::new(path)),
            (None, None) => bail!("no vendor source configured: set DATABASE_URL or VENDORS_FILE"),
        };
        Self::new(config, datastore)
    }

    pub fn with_dispatch(mut self, dispatch: RewriteDispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub async fn build_queries(&self, spiders: Option<&[String]>) -> Result<BTreeMap<String, Vec<String>>> {
        let rows = self
            .datastore
            .query_rows(spiders)
            .await
            .context("loading vendor rows for query generation")?;
        let queries = build_queries(&rows, &self.config.query_templates);
        info!(vendors = queries.len(), "queries generated");
        Ok(queries)
    }

    pub async fn generate_from_google(&self, request: &GoogleRequest) -> Result<RunSummary> {
        let stats = RunStats::start(DiscoverySource::Google);
        let span = stats.span();
        self.google_run(request, stats).instrument(span).await
    }

    async fn google_run(&self, request: &GoogleRequest, mut stats: RunStats) -> Result<RunSummary> {
        let name_pattern = request
            .name_regex
            .as_deref()
            .map(Regex::new)
            .transpose()
            .context("compiling --name-regex")?;

        let queries = match (&request.spider_name, &request.query) {
            (Some(name), Some(query)) => BTreeMap::from([(name.clone(), vec![query.clone()])]),
            (None, None) => self.build_queries(request.spiders.as_deref()).await?,
            _ => bail!("--spider-name and --query must be given together"),
        };

        let mut session = HttpSearchSession::new(
            self.fetcher.clone(),
            self.config.search_base_url.clone(),
            self.config.page_delay,
        );
        let options = self.config.search_options(request.max_urls, request.deepnest);
        let found = search_all(&mut session, &queries, &options).await;

        let raw = records_from_urls(&found, name_pattern.as_ref());
        stats.raw_records = count(&raw);

        let vendors = load_vendors(self.datastore.as_ref()).await;
        stats.vendors_loaded = vendors.len();
        let generated = self.generator(&vendors).generate_start_urls(&raw).await;
        stats.generated = count(&generated);

        let fresh = if request.skip_liveness {
            generated
        } else {
            let urls: BTreeMap<String, Vec<String>> = generated
                .iter()
                .map(|(vendor, entries)| (vendor.clone(), entries.iter().map(|e| e.start_url.clone()).collect()))
                .collect();
            let checked = LivenessChecker::new(self.fetcher.clone(), self.config.liveness_workers)
                .with_name_pattern(name_pattern)
                .check(&urls)
                .await;
            stats.liveness_failed = checked.values().flatten().filter(|c| !c.outcome.passed()).count();
            passed_only(checked)
        };

        self.finish(stats, &fresh).await
    }

    pub async fn generate_from_linkedin(&self) -> Result<RunSummary> {
        let stats = RunStats::start(DiscoverySource::Linkedin);
        let span = stats.span();
        self.linkedin_run(stats).instrument(span).await
    }

    async fn linkedin_run(&self, mut stats: RunStats) -> Result<RunSummary> {
        let rows = match self.datastore.company_rows().await {
            Ok(rows) => rows,
            Err(err) => {
                error!(%err, "failed to load the company dataset");
                Vec::new()
            }
        };
        let vendors = load_vendors(self.datastore.as_ref()).await;
        stats.vendors_loaded = vendors.len();

        let mut raw = RawRecordsByVendor::new();
        for vendor in &vendors {
            let records: Vec<RawUrlRecord> = rows
                .iter()
                .filter(|row| row.company_domain.contains(vendor.main_domain.as_str()))
                .map(|row| {
                    RawUrlRecord::new(
                        CompanyIdentity::named(company_name_from_slug(&row.company_name)),
                        row.example_job_posting.clone(),
                    )
                })
                .collect();
            if !records.is_empty() {
                raw.insert(vendor.name.clone(), records);
            }
        }
        stats.raw_records = count(&raw);

        let generated = self.generator(&vendors).generate_start_urls(&raw).await;
        stats.generated = count(&generated);
        self.finish(stats, &generated).await
    }

    /// Liveness-checks the URLs in `file_path`, then generates from the
    /// same-named input list under the publishers input folder.
    pub async fn check_spider_urls(
        &self,
        file_path: &Path,
        markers: Vec<String>,
        name_pattern: Option<Regex>,
    ) -> Result<RunSummary> {
        let stats = RunStats::start(DiscoverySource::File);
        let span = stats.span();
        self.file_run(file_path, markers, name_pattern, stats)
            .instrument(span)
            .await
    }

    async fn file_run(
        &self,
        file_path: &Path,
        markers: Vec<String>,
        name_pattern: Option<Regex>,
        mut stats: RunStats,
    ) -> Result<RunSummary> {
        let vendor_name = vendor_name_for_file(file_path)
            .with_context(|| format!("no vendor name in {}", file_path.display()))?;
        let urls = read_urls(file_path)?;

        let checker = LivenessChecker::new(self.fetcher.clone(), self.config.liveness_workers)
            .with_markers(markers)?
            .with_name_pattern(name_pattern);
        let checked = checker
            .check(&BTreeMap::from([(vendor_name.clone(), urls)]))
            .await;
        stats.liveness_failed = checked.values().flatten().filter(|c| !c.outcome.passed()).count();

        let input = match file_path.file_name() {
            Some(name) => self.config.publishers_input_dir.join(name),
            None => bail!("{} is not a file", file_path.display()),
        };
        let records = if input.exists() {
            read_records(&input)?
        } else {
            warn!(path = %input.display(), "no publisher input list for vendor");
            Vec::new()
        };
        let raw = RawRecordsByVendor::from([(vendor_name, records)]);
        stats.raw_records = count(&raw);

        let vendors = load_vendors(self.datastore.as_ref()).await;
        stats.vendors_loaded = vendors.len();
        let generated = self.generator(&vendors).generate_start_urls(&raw).await;
        stats.generated = count(&generated);
        self.finish(stats, &generated).await
    }

    fn generator<'a>(&'a self, vendors: &'a [VendorDefinition]) -> StartUrlGenerator<'a> {
        StartUrlGenerator::new(vendors, &self.dispatch).with_policy(self.config.unresolved_policy)
    }

    async fn finish(&self, stats: RunStats, fresh: &StartUrlsByVendor) -> Result<RunSummary> {
        let known = load_known_sets(&self.config.known_dir)?;
        let batches = reconcile(fresh, &known);
        let out_dir = self.config.output_dir_for(stats.source);
        let files = write_new_batches(&out_dir, &batches).await;

        let summary = RunSummary {
            run_id: stats.run_id,
            source: stats.source,
            started_at: stats.started_at,
            finished_at: Utc::now(),
            vendors_loaded: stats.vendors_loaded,
            raw_records: stats.raw_records,
            generated: stats.generated,
            liveness_failed: stats.liveness_failed,
            new_urls: batches.values().map(|b| b.entries.len()).sum(),
            output_dir: out_dir.display().to_string(),
            files,
        };
        write_run_summary(&out_dir, &summary).await?;
        info!(
            new_urls = summary.new_urls,
            files = summary.files.len(),
            "discovery run finished"
        );
        Ok(summary)
    }
}

fn passed_only(checked: BTreeMap<String, Vec<CheckedUrl>>) -> StartUrlsByVendor {
    checked
        .into_iter()
        .map(|(vendor, results)| {
            let entries = results
                .into_iter()
                .filter(|c| c.outcome.passed())
                .map(|c| CanonicalStartUrl::new(CompanyIdentity::named(c.company_name), c.start_url))
                .collect::<Vec<_>>();
            (vendor, entries)
        })
        .filter(|(_, entries)| !entries.is_empty())
        .collect()
}

/// One `<vendor>.csv` per batch. A failed write is logged and skipped.
pub async fn write_new_batches(dir: &Path, batches: &BTreeMap<String, NewUrlBatch>) -> Vec<SummaryFile> {
    let mut files = Vec::with_capacity(batches.len());
    for batch in batches.values() {
        let path = dir.join(format!("{}.csv", batch.vendor));
        match write_records(&path, &batch.entries).await {
            Ok(written) => {
                info!(vendor = %batch.vendor, records = written.records, path = %path.display(), "wrote new urls");
                files.push(SummaryFile::from_written(&batch.vendor, written));
            }
            Err(err) => error!(vendor = %batch.vendor, error = %err, "failed to write new urls"),
        }
    }
    files
}

pub async fn write_run_summary(dir: &Path, summary: &RunSummary) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .await
        .with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join(RUN_SUMMARY_FILE);
    let bytes = serde_json::to_vec_pretty(summary).context("serializing run summary")?;
    fs::write(&path, bytes)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}
