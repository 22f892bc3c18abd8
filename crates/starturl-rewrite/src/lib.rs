//! Vendor-specific URL rewrite rules and the name-keyed dispatch over them.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use starturl_core::extract_domain;
use starturl_storage::{FetchError, HttpFetcher};
use thiserror::Error;
use tracing::debug;
use url::Url;

pub const CRATE_NAME: &str = "starturl-rewrite";

static PARTNER_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"partnerid=(\d+)").expect("valid regex"));
static SITE_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"siteid=(\d+)").expect("valid regex"));
static RIPPLEHIRE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"token=([a-zA-Z0-9]+)").expect("valid regex"));

#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("not an absolute url: {0}")]
    NotAUrl(String),
    #[error("missing {name} in {url}")]
    MissingPart { name: &'static str, url: String },
    #[error("redirect resolution failed: {0}")]
    Redirect(#[from] FetchError),
}

/// Follows a URL's redirect chain to its final location.
#[async_trait]
pub trait RedirectResolver: Send + Sync {
    async fn resolve(&self, url: &str) -> Result<String, FetchError>;
}

#[async_trait]
impl RedirectResolver for HttpFetcher {
    async fn resolve(&self, url: &str) -> Result<String, FetchError> {
        self.resolve_final_url(url).await
    }
}

/// Resolver that never leaves the process: every URL resolves to itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineResolver;

#[async_trait]
impl RedirectResolver for OfflineResolver {
    async fn resolve(&self, url: &str) -> Result<String, FetchError> {
        Ok(url.to_string())
    }
}

/// One vendor's normalisation from a raw URL to its canonical start URL.
#[async_trait]
pub trait RewriteRule: Send + Sync {
    /// Fragment of the vendor name this rule serves.
    fn key(&self) -> &str;

    async fn apply(&self, url: &str, resolver: &dyn RedirectResolver) -> Result<String, RewriteError>;
}

/// A rule made of a plain string transform, no network access.
pub struct LocalRule {
    key: &'static str,
    transform: fn(&str) -> Result<String, RewriteError>,
}

impl LocalRule {
    pub const fn new(key: &'static str, transform: fn(&str) -> Result<String, RewriteError>) -> Self {
        Self { key, transform }
    }
}

impl fmt::Debug for LocalRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalRule").field("key", &self.key).finish()
    }
}

#[async_trait]
impl RewriteRule for LocalRule {
    fn key(&self) -> &str {
        self.key
    }

    async fn apply(&self, url: &str, _resolver: &dyn RedirectResolver) -> Result<String, RewriteError> {
        (self.transform)(url)
    }
}

fn parse_absolute(url: &str) -> Result<Url, RewriteError> {
    let parsed = Url::parse(url).map_err(|_| RewriteError::NotAUrl(url.to_string()))?;
    if parsed.host_str().is_none() {
        return Err(RewriteError::NotAUrl(url.to_string()));
    }
    Ok(parsed)
}

fn domain_of(url: &str) -> Result<String, RewriteError> {
    extract_domain(url).ok_or_else(|| RewriteError::NotAUrl(url.to_string()))
}

fn capture<'a>(re: &Regex, url: &'a str, name: &'static str) -> Result<&'a str, RewriteError> {
    re.captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| RewriteError::MissingPart {
            name,
            url: url.to_string(),
        })
}

/// Partner and site ids lifted into the search home page.
pub fn brassring(url: &str) -> Result<String, RewriteError> {
    let domain = domain_of(url)?;
    let partner_id = capture(&PARTNER_ID, url, "partnerid")?;
    let site_id = capture(&SITE_ID, url, "siteid")?;
    Ok(format!(
        "https://{domain}/TGnewUI/Search/Home/Home?partnerid={partner_id}&siteid={site_id}#home"
    ))
}

/// Everything before the last `/job` segment.
pub fn myworkday(url: &str) -> Result<String, RewriteError> {
    match url.rfind("/job") {
        Some(idx) if idx > 0 => Ok(url[..idx].to_string()),
        _ => Err(RewriteError::MissingPart {
            name: "/job",
            url: url.to_string(),
        }),
    }
}

/// Query dropped, fixed search route appended to the tenant host.
pub fn icims(url: &str) -> Result<String, RewriteError> {
    let parsed = parse_absolute(url)?;
    let domain = domain_of(url)?;
    Ok(format!("{}://{domain}/jobs/search?ss=1", parsed.scheme()))
}

/// Company path segment moved onto the careers host.
pub fn smartrecruiters(url: &str) -> Result<String, RewriteError> {
    let parsed = parse_absolute(url)?;
    let company = parsed
        .path_segments()
        .and_then(|mut segments| segments.find(|s| !s.is_empty()))
        .ok_or_else(|| RewriteError::MissingPart {
            name: "company path segment",
            url: url.to_string(),
        })?;
    Ok(format!("https://careers.smartrecruiters.com/{company}"))
}

/// Token from the original link, host from wherever the link redirects.
#[derive(Debug, Clone, Copy, Default)]
pub struct RippleHireRule;

#[async_trait]
impl RewriteRule for RippleHireRule {
    fn key(&self) -> &str {
        "ripplehire"
    }

    async fn apply(&self, url: &str, resolver: &dyn RedirectResolver) -> Result<String, RewriteError> {
        let token = capture(&RIPPLEHIRE_TOKEN, url, "token")?;
        let final_url = resolver.resolve(url).await?;
        let domain = domain_of(&final_url)?;
        Ok(format!("https://{domain}/ripplehire/candidate?token={token}#list"))
    }
}

pub fn builtin_rules() -> Vec<Box<dyn RewriteRule>> {
    vec![
        Box::new(LocalRule::new("brassring", brassring)),
        Box::new(RippleHireRule),
        Box::new(LocalRule::new("myworkday", myworkday)),
        Box::new(LocalRule::new("icims", icims)),
        Box::new(LocalRule::new("smartrecruiters", smartrecruiters)),
    ]
}

/// Ordered registry of rewrite rules. The first rule whose key occurs in the
/// vendor name wins; vendors without a rule keep their URL.
pub struct RewriteDispatch {
    rules: Vec<Box<dyn RewriteRule>>,
    resolver: Arc<dyn RedirectResolver>,
}

impl fmt::Debug for RewriteDispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RewriteDispatch")
            .field("keys", &self.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl RewriteDispatch {
    pub fn empty(resolver: Arc<dyn RedirectResolver>) -> Self {
        Self {
            rules: Vec::new(),
            resolver,
        }
    }

    pub fn with_builtin_rules(resolver: Arc<dyn RedirectResolver>) -> Self {
        Self {
            rules: builtin_rules(),
            resolver,
        }
    }

    pub fn register(mut self, rule: Box<dyn RewriteRule>) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|rule| rule.key())
    }

    pub fn rule_for(&self, vendor_name: &str) -> Option<&dyn RewriteRule> {
        self.rules
            .iter()
            .find(|rule| !rule.key().is_empty() && vendor_name.contains(rule.key()))
            .map(|rule| rule.as_ref())
    }

    /// Never fails: any rule error, or input that is not an absolute URL,
    /// yields `raw_url` unchanged.
    pub async fn rewrite(&self, raw_url: &str, vendor_name: &str) -> String {
        let Some(rule) = self.rule_for(vendor_name) else {
            return raw_url.to_string();
        };
        if parse_absolute(raw_url).is_err() {
            return raw_url.to_string();
        }
        match rule.apply(raw_url, self.resolver.as_ref()).await {
            Ok(rewritten) => {
                debug!(rule = rule.key(), raw_url, %rewritten, "rewrote url");
                rewritten
            }
            Err(err) => {
                debug!(rule = rule.key(), raw_url, %err, "rewrite failed; keeping raw url");
                raw_url.to_string()
            }
        }
    }
}
