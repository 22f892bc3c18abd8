//! Reachability checks for candidate start URLs.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use regex::Regex;
use scraper::{Html, Selector};
use serde::Serialize;
use starturl_core::company_name_from_url;
use starturl_storage::{FetchError, FetchedResponse, HttpFetcher};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Separator between marker selectors on the command line.
pub const MARKER_SEPARATOR: &str = "_|_";

#[derive(Debug, Error)]
pub enum LivenessError {
    #[error("invalid marker selector {marker:?}: {reason}")]
    InvalidMarker { marker: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "detail", rename_all = "snake_case")]
pub enum LivenessOutcome {
    Passed,
    MarkerMissing,
    HttpStatus(u16),
    Unreachable(String),
}

impl LivenessOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, LivenessOutcome::Passed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckedUrl {
    pub company_name: String,
    pub start_url: String,
    pub outcome: LivenessOutcome,
}

pub fn split_markers(raw: &str) -> Vec<String> {
    raw.split(MARKER_SEPARATOR)
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn is_http_url(url: &str) -> bool {
    let lower = url.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Fetches URLs through a small worker pool and grades each response.
#[derive(Debug, Clone)]
pub struct LivenessChecker {
    fetcher: Arc<HttpFetcher>,
    markers: Vec<String>,
    name_pattern: Option<Regex>,
    workers: usize,
}

impl LivenessChecker {
    pub fn new(fetcher: Arc<HttpFetcher>, workers: usize) -> Self {
        Self {
            fetcher,
            markers: Vec::new(),
            name_pattern: None,
            workers: workers.max(1),
        }
    }

    /// A page passes if any marker matches. Markers are CSS selectors.
    pub fn with_markers(mut self, markers: Vec<String>) -> Result<Self, LivenessError> {
        for marker in &markers {
            Selector::parse(marker).map_err(|e| LivenessError::InvalidMarker {
                marker: marker.clone(),
                reason: e.to_string(),
            })?;
        }
        self.markers = markers;
        Ok(self)
    }

    pub fn with_name_pattern(mut self, pattern: Option<Regex>) -> Self {
        self.name_pattern = pattern;
        self
    }

    /// Checks every vendor's URLs in input order. Non-HTTP URLs and URLs
    /// already seen in this call are skipped; vendors with nothing checked
    /// are left out.
    pub async fn check(
        &self,
        urls_by_vendor: &BTreeMap<String, Vec<String>>,
    ) -> BTreeMap<String, Vec<CheckedUrl>> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut results = BTreeMap::new();
        let mut failed = Vec::new();

        for (vendor, urls) in urls_by_vendor {
            info!(vendor = %vendor, urls = urls.len(), "checking start urls");
            let pending: Vec<&str> = urls
                .iter()
                .map(String::as_str)
                .filter(|url| is_http_url(url))
                .filter(|url| seen.insert(*url))
                .collect();

            let checked: Vec<CheckedUrl> = stream::iter(pending)
                .map(|url| self.check_one(url))
                .buffered(self.workers)
                .collect()
                .await;

            failed.extend(
                checked
                    .iter()
                    .filter(|c| !c.outcome.passed())
                    .map(|c| (c.start_url.clone(), c.outcome.clone())),
            );
            if !checked.is_empty() {
                results.insert(vendor.clone(), checked);
            }
        }

        if !failed.is_empty() {
            warn!(count = failed.len(), "start urls failed the liveness check");
            for (url, outcome) in &failed {
                warn!(%url, ?outcome, "failed url");
            }
        }
        results
    }

    pub async fn check_one(&self, url: &str) -> CheckedUrl {
        let outcome = match self.fetcher.fetch(url).await {
            Ok(resp) => self.grade(&resp),
            Err(FetchError::HttpStatus { status, .. }) => LivenessOutcome::HttpStatus(status),
            Err(FetchError::Request(err)) => LivenessOutcome::Unreachable(err.to_string()),
        };
        debug!(url, ?outcome, "checked url");
        CheckedUrl {
            company_name: company_name_from_url(url, self.name_pattern.as_ref()),
            start_url: url.to_string(),
            outcome,
        }
    }

    fn grade(&self, resp: &FetchedResponse) -> LivenessOutcome {
        if resp.status.as_u16() != 200 {
            return LivenessOutcome::HttpStatus(resp.status.as_u16());
        }
        if self.markers.is_empty() {
            return LivenessOutcome::Passed;
        }
        let document = Html::parse_document(&resp.text());
        let found = self
            .markers
            .iter()
            .filter_map(|marker| Selector::parse(marker).ok())
            .any(|sel| document.select(&sel).next().is_some());
        if found {
            LivenessOutcome::Passed
        } else {
            LivenessOutcome::MarkerMissing
        }
    }
}
