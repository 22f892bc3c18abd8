//! Core domain model and pure URL/query transforms for the start-URL finder.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

pub const CRATE_NAME: &str = "starturl-core";

/// Any query already carrying this token is considered site-scoped.
pub const SITE_SCOPE_TOKEN: &str = "site:";

/// Where a batch of candidate URLs was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoverySource {
    Google,
    Linkedin,
    File,
}

impl DiscoverySource {
    /// Output subfolder for batches from this source; manual file input lands at the root.
    pub fn folder(&self) -> Option<&'static str> {
        match self {
            DiscoverySource::Google => Some("from_google"),
            DiscoverySource::Linkedin => Some("from_linkedin"),
            DiscoverySource::File => None,
        }
    }
}

/// An ATS vendor ("spider") as declared in the vendor store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorDefinition {
    pub name: String,
    pub main_domain: String,
    #[serde(default)]
    pub ignored_subdomains: Vec<String>,
    #[serde(default)]
    pub start_link_regexp: Option<String>,
    #[serde(default)]
    pub start_link_template: Option<String>,
}

impl VendorDefinition {
    pub fn new(name: impl Into<String>, main_domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            main_domain: main_domain.into(),
            ignored_subdomains: Vec::new(),
            start_link_regexp: None,
            start_link_template: None,
        }
    }

    pub fn with_regexp(mut self, pattern: impl Into<String>) -> Self {
        self.start_link_regexp = Some(pattern.into());
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.start_link_template = Some(template.into());
        self
    }

    pub fn with_ignored_subdomains<I, S>(mut self, subdomains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored_subdomains = subdomains.into_iter().map(Into::into).collect();
        self
    }
}

/// Company a start URL belongs to. The slug is only known for some inputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompanyIdentity {
    pub slug: Option<String>,
    pub name: String,
}

impl CompanyIdentity {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            slug: None,
            name: name.into(),
        }
    }

    pub fn with_slug(slug: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            slug: Some(slug.into()),
            name: name.into(),
        }
    }
}

/// A discovered URL before canonicalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawUrlRecord {
    pub identity: CompanyIdentity,
    pub start_url: String,
}

impl RawUrlRecord {
    pub fn new(identity: CompanyIdentity, start_url: impl Into<String>) -> Self {
        Self {
            identity,
            start_url: start_url.into(),
        }
    }
}

/// A start URL in its canonical vendor form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanonicalStartUrl {
    pub identity: CompanyIdentity,
    pub start_url: String,
}

impl CanonicalStartUrl {
    pub fn new(identity: CompanyIdentity, start_url: impl Into<String>) -> Self {
        Self {
            identity,
            start_url: start_url.into(),
        }
    }

    pub fn company_name(&self) -> &str {
        &self.identity.name
    }
}

pub type RawRecordsByVendor = BTreeMap<String, Vec<RawUrlRecord>>;
pub type StartUrlsByVendor = BTreeMap<String, Vec<CanonicalStartUrl>>;

/// Previously accepted start URLs, keyed by vendor name. Read-only during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownUrlSet {
    vendors: BTreeMap<String, Vec<CanonicalStartUrl>>,
}

impl KnownUrlSet {
    pub fn new(vendors: BTreeMap<String, Vec<CanonicalStartUrl>>) -> Self {
        Self { vendors }
    }

    pub fn vendor(&self, name: &str) -> Option<&[CanonicalStartUrl]> {
        self.vendors.get(name).map(Vec::as_slice)
    }

    pub fn vendor_names(&self) -> impl Iterator<Item = &str> {
        self.vendors.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.vendors.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Known set for the next run: this one plus every accepted batch.
    pub fn merged_with<'a, I>(&self, batches: I) -> Self
    where
        I: IntoIterator<Item = &'a NewUrlBatch>,
    {
        let mut vendors = self.vendors.clone();
        for batch in batches {
            vendors
                .entry(batch.vendor.clone())
                .or_default()
                .extend(batch.entries.iter().cloned());
        }
        Self { vendors }
    }
}

/// New start URLs for one vendor, deduplicated by URL and sorted by company name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewUrlBatch {
    pub vendor: String,
    pub entries: Vec<CanonicalStartUrl>,
}

/// Resolves a vendor by name or domain. `probe` may use underscores in place of dots
/// (vendor file stems); first match wins, so overlapping domains are order-dependent.
pub fn find_vendor<'a>(probe: &str, vendors: &'a [VendorDefinition]) -> Option<&'a VendorDefinition> {
    if probe.is_empty() {
        return None;
    }
    let dotted = probe.replace('_', ".");
    vendors
        .iter()
        .find(|v| v.name.contains(probe) || v.main_domain.contains(&dotted))
}

/// Network location of a URL (`host[:port]`), or `None` when it does not parse.
pub fn extract_domain(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let host = parsed.host_str()?;
    Some(match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Fills `{}` placeholders left to right. Returns `None` if the counts differ.
pub fn fill_placeholders(template: &str, args: &[&str]) -> Option<String> {
    let pieces: Vec<&str> = template.split("{}").collect();
    if pieces.len() != args.len() + 1 {
        return None;
    }
    let mut out = String::with_capacity(template.len() + args.iter().map(|a| a.len()).sum::<usize>());
    for (i, piece) in pieces.iter().enumerate() {
        out.push_str(piece);
        if let Some(arg) = args.get(i) {
            out.push_str(arg);
        }
    }
    Some(out)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTemplates {
    pub include: String,
    pub exclude: String,
}

impl Default for QueryTemplates {
    fn default() -> Self {
        Self {
            include: " site:*.{}".to_string(),
            exclude: " -site:{}.{}".to_string(),
        }
    }
}

/// A vendor row as needed for search query generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorQueryRow {
    pub id: i64,
    pub name: String,
    pub main_domain: String,
    #[serde(default)]
    pub ignored_subdomains: Vec<String>,
    #[serde(default)]
    pub google_query: Option<String>,
}

/// Builds one site-scoped search query per vendor row.
pub fn build_queries(rows: &[VendorQueryRow], templates: &QueryTemplates) -> BTreeMap<String, Vec<String>> {
    let mut queries: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for row in rows {
        queries
            .entry(row.name.clone())
            .or_default()
            .push(build_query(row, templates));
    }
    queries
}

pub fn build_query(row: &VendorQueryRow, templates: &QueryTemplates) -> String {
    let mut query = row.google_query.clone().unwrap_or_default();
    if query.contains(SITE_SCOPE_TOKEN) {
        return query;
    }
    if let Some(include) = fill_placeholders(&templates.include, &[&row.main_domain]) {
        query.push_str(&include);
    }
    for subdomain in row.ignored_subdomains.iter().filter(|s| !s.trim().is_empty()) {
        if let Some(exclude) = fill_placeholders(&templates.exclude, &[subdomain.trim(), &row.main_domain]) {
            query.push_str(&exclude);
        }
    }
    query
}

/// Splits a comma-joined column into trimmed, non-empty entries.
pub fn split_comma_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// `acme-corp%20inc` -> `Acme Corp Inc`
pub fn company_name_from_slug(slug: &str) -> String {
    let decoded = urlencoding::decode(slug)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| slug.to_string());
    title_case(&decoded.replace('-', " "))
}

/// Display name for a URL with no better source of truth.
///
/// A supplied pattern wins when its first capture group matches. Otherwise the
/// first host label is used: title cased without dashes when no pattern was
/// given, and in the short-uppercase / capitalised form after a pattern miss.
pub fn company_name_from_url(url: &str, name_pattern: Option<&Regex>) -> String {
    let label = first_host_label(url);
    match name_pattern {
        None => title_case(&label.replace('-', "")),
        Some(re) => re
            .captures(url)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| label_to_name(&label)),
    }
}

fn first_host_label(url: &str) -> String {
    let without_www = url.replace("www.", "");
    let host = extract_domain(&without_www).unwrap_or_default().to_lowercase();
    host.split('.').next().unwrap_or_default().trim().to_string()
}

fn label_to_name(label: &str) -> String {
    if label.chars().count() < 5 {
        label.to_uppercase()
    } else {
        capitalize(label)
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Upper-cases the first letter of every alphabetic run and lower-cases the rest.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_word = false;
    for ch in s.chars() {
        if ch.is_alphabetic() {
            if in_word {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(ch);
            in_word = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vendors() -> Vec<VendorDefinition> {
        vec![
            VendorDefinition::new("greenhouse", "boards.greenhouse.io"),
            VendorDefinition::new("myworkday", "myworkdayjobs.com"),
            VendorDefinition::new("brassring", "brassring.com"),
        ]
    }

    #[test]
    fn find_vendor_matches_name_or_underscored_domain() {
        let vendors = vendors();
        assert_eq!(find_vendor("workday", &vendors).unwrap().name, "myworkday");
        assert_eq!(
            find_vendor("myworkdayjobs_com", &vendors).unwrap().name,
            "myworkday"
        );
        assert_eq!(find_vendor("greenhouse_io", &vendors).unwrap().name, "greenhouse");
        assert!(find_vendor("lever", &vendors).is_none());
        assert!(find_vendor("", &vendors).is_none());
    }

    #[test]
    fn find_vendor_first_match_wins_on_overlap() {
        let vendors = vec![
            VendorDefinition::new("icims-a", "icims.com"),
            VendorDefinition::new("icims-b", "icims.com"),
        ];
        assert_eq!(find_vendor("icims_com", &vendors).unwrap().name, "icims-a");
    }

    #[test]
    fn extract_domain_keeps_port_and_rejects_garbage() {
        assert_eq!(
            extract_domain("https://careers.acme.com/x?y=1").as_deref(),
            Some("careers.acme.com")
        );
        assert_eq!(
            extract_domain("http://localhost:8080/jobs").as_deref(),
            Some("localhost:8080")
        );
        assert_eq!(extract_domain("not a url"), None);
        assert_eq!(extract_domain(""), None);
    }

    #[test]
    fn fill_placeholders_requires_matching_arity() {
        assert_eq!(
            fill_placeholders("https://jobs.{}.com", &["acme"]).as_deref(),
            Some("https://jobs.acme.com")
        );
        assert_eq!(fill_placeholders("https://jobs.acme.com", &["acme"]), None);
        assert_eq!(fill_placeholders("{}/{}", &["a"]), None);
    }

    #[test]
    fn query_builder_appends_scope_and_exclusions() {
        let rows = vec![VendorQueryRow {
            id: 1,
            name: "myworkday".into(),
            main_domain: "myworkdayjobs.com".into(),
            ignored_subdomains: vec!["www".into(), " ".into(), "wd1".into()],
            google_query: Some("careers".into()),
        }];
        let queries = build_queries(&rows, &QueryTemplates::default());
        assert_eq!(
            queries["myworkday"],
            vec!["careers site:*.myworkdayjobs.com -site:www.myworkdayjobs.com -site:wd1.myworkdayjobs.com"
                .to_string()]
        );
    }

    #[test]
    fn query_builder_is_idempotent_on_scoped_queries() {
        let templates = QueryTemplates::default();
        let mut row = VendorQueryRow {
            id: 7,
            name: "lever".into(),
            main_domain: "lever.co".into(),
            ignored_subdomains: vec!["www".into()],
            google_query: None,
        };
        let first = build_query(&row, &templates);
        assert_eq!(first, " site:*.lever.co -site:www.lever.co");

        row.google_query = Some(first.clone());
        let second = build_query(&row, &templates);
        assert_eq!(second, first);
        assert_eq!(second.matches("site:*.").count(), 1);
    }

    #[test]
    fn query_builder_groups_rows_by_vendor() {
        let row = |id, q: &str| VendorQueryRow {
            id,
            name: "taleo".into(),
            main_domain: "taleo.net".into(),
            ignored_subdomains: vec![],
            google_query: Some(q.to_string()),
        };
        let queries = build_queries(&[row(1, "jobs"), row(2, "careers")], &QueryTemplates::default());
        assert_eq!(queries["taleo"].len(), 2);
    }

    #[test]
    fn comma_lists_drop_blank_entries() {
        assert_eq!(split_comma_list("www, wd1,,"), vec!["www", "wd1"]);
        assert!(split_comma_list("").is_empty());
    }

    #[test]
    fn slug_names_are_decoded_and_title_cased() {
        assert_eq!(company_name_from_slug("acme-corp"), "Acme Corp");
        assert_eq!(company_name_from_slug("caf%C3%A9-noir"), "Café Noir");
        assert_eq!(company_name_from_slug("3m"), "3M");
    }

    #[test]
    fn url_names_follow_label_rules() {
        assert_eq!(
            company_name_from_url("https://www.big-corp.wd5.myworkdayjobs.com/x", None),
            "Bigcorp"
        );
        let re = Regex::new(r"jobs\.lever\.co/([^/]+)").unwrap();
        assert_eq!(
            company_name_from_url("https://jobs.lever.co/acme/123", Some(&re)),
            "acme"
        );
        assert_eq!(
            company_name_from_url("https://ibm.taleo.net/careersection", Some(&re)),
            "IBM"
        );
        assert_eq!(
            company_name_from_url("https://globex.taleo.net/careersection", Some(&re)),
            "Globex"
        );
    }

    #[test]
    fn known_set_merges_accepted_batches() {
        let known = KnownUrlSet::default();
        let batch = NewUrlBatch {
            vendor: "lever".into(),
            entries: vec![CanonicalStartUrl::new(
                CompanyIdentity::named("Acme"),
                "https://jobs.lever.co/acme",
            )],
        };
        let next = known.merged_with([&batch]);
        assert_eq!(next.len(), 1);
        assert_eq!(next.vendor("lever").unwrap()[0].start_url, "https://jobs.lever.co/acme");
        assert!(known.is_empty());
    }

    #[test]
    fn discovery_sources_map_to_output_folders() {
        assert_eq!(DiscoverySource::Google.folder(), Some("from_google"));
        assert_eq!(DiscoverySource::Linkedin.folder(), Some("from_linkedin"));
        assert_eq!(DiscoverySource::File.folder(), None);
    }
}
