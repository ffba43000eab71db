use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::cache::ResponseCache;
use crate::clock::Clock;
use crate::retry::{RetryPolicy, with_retry};
use crate::upstream::{FetchError, UpstreamClient};

/// HTML content variants in preference order. The first URL present in a
/// record's format map wins.
pub const HTML_FORMAT_PREFERENCE: [&str; 4] = [
    "text/html",
    "text/html; charset=utf-8",
    "text/html; charset=us-ascii",
    "text/html; charset=iso-8859-1",
];

/// Discriminated result of a gateway call. Only `Success` carries data;
/// callers must handle all four arms.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Success(T),
    NotFound,
    TimedOut,
    UpstreamError(String),
}

impl<T> Outcome<T> {
    fn from_error(err: FetchError) -> Self {
        match err {
            FetchError::Timeout => Self::TimedOut,
            other => Self::UpstreamError(other.to_string()),
        }
    }
}

/// Normalized catalog search filters. Mirrors the parameter set the
/// upstream catalog accepts; unknown query parameters are ignored at the
/// route boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogQuery {
    pub search: Option<String>,
    pub topic: Option<String>,
    pub author_year_start: Option<i32>,
    pub author_year_end: Option<i32>,
    pub languages: Option<String>,
    pub mime_type: Option<String>,
    pub copyright: Option<String>,
    pub sort: Option<String>,
    pub page: Option<u32>,
}

impl CatalogQuery {
    /// Canonical form: free text trimmed with internal whitespace
    /// collapsed, comma sets (languages, copyright flags) lowercased,
    /// sorted, and deduplicated. Empty fields become absent.
    pub fn normalized(&self) -> Self {
        Self {
            search: self.search.as_deref().map(collapse_whitespace).filter(|s| !s.is_empty()),
            topic: self
                .topic
                .as_deref()
                .map(|s| s.trim().to_owned())
                .filter(|s| !s.is_empty()),
            author_year_start: self.author_year_start,
            author_year_end: self.author_year_end,
            languages: self.languages.as_deref().and_then(normalize_comma_set),
            mime_type: self
                .mime_type
                .as_deref()
                .map(|s| s.trim().to_owned())
                .filter(|s| !s.is_empty()),
            copyright: self.copyright.as_deref().and_then(normalize_comma_set),
            sort: self
                .sort
                .as_deref()
                .map(|s| s.trim().to_owned())
                .filter(|s| !s.is_empty()),
            page: self.page,
        }
    }

    /// Present fields in fixed declaration order, ready to be sent
    /// upstream as query parameters.
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(v) = &self.search {
            params.push(("search", v.clone()));
        }
        if let Some(v) = &self.topic {
            params.push(("topic", v.clone()));
        }
        if let Some(v) = self.author_year_start {
            params.push(("author_year_start", v.to_string()));
        }
        if let Some(v) = self.author_year_end {
            params.push(("author_year_end", v.to_string()));
        }
        if let Some(v) = &self.languages {
            params.push(("languages", v.clone()));
        }
        if let Some(v) = &self.mime_type {
            params.push(("mime_type", v.clone()));
        }
        if let Some(v) = &self.copyright {
            params.push(("copyright", v.clone()));
        }
        if let Some(v) = &self.sort {
            params.push(("sort", v.clone()));
        }
        if let Some(v) = self.page {
            params.push(("page", v.to_string()));
        }
        params
    }

    /// Deterministic serialization used as the cache key.
    pub fn canonical_string(&self) -> String {
        let params = self.to_params();
        let mut out = String::new();
        for (idx, (key, value)) in params.iter().enumerate() {
            if idx > 0 {
                out.push('&');
            }
            out.push_str(key);
            out.push('=');
            out.push_str(value);
        }
        out
    }
}

/// One catalog record. The gateway only looks inside `formats`; every
/// other upstream field passes through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookRecord {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub formats: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RecordPage {
    #[serde(default)]
    results: Vec<BookRecord>,
}

#[derive(Debug, Clone, Copy)]
pub struct GatewayConfig {
    /// Policy for single-resource fetches.
    pub fetch_retry: RetryPolicy,
    /// Searches tolerate one more attempt before giving up.
    pub search_retry: RetryPolicy,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            fetch_retry: RetryPolicy::new(2, Duration::from_millis(400)),
            search_retry: RetryPolicy::new(3, Duration::from_millis(400)),
        }
    }
}

/// Fronts the catalog API with caching, bounded retries, and failure
/// classification. One instance is shared by all requests.
pub struct CatalogGateway {
    upstream: UpstreamClient,
    cache: ResponseCache,
    books_url: Url,
    config: GatewayConfig,
}

impl CatalogGateway {
    pub fn new(upstream: UpstreamClient, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        Self::with_config(upstream, clock, GatewayConfig::default())
    }

    pub fn with_config(
        upstream: UpstreamClient,
        clock: Arc<dyn Clock>,
        config: GatewayConfig,
    ) -> anyhow::Result<Self> {
        let books_url = upstream.endpoint("books")?;
        Ok(Self {
            cache: ResponseCache::new(clock),
            upstream,
            books_url,
            config,
        })
    }

    /// Searches the catalog. Successful result pages are cached under the
    /// canonical query string; failures and empty lookups are not.
    pub async fn search(&self, query: &CatalogQuery) -> Outcome<serde_json::Value> {
        let query = query.normalized();
        let key = format!("search:{}", query.canonical_string());
        if let Some(hit) = self.cache.get(&key) {
            tracing::debug!(key = %key, "search served from cache");
            return Outcome::Success(hit);
        }

        let params = query.to_params();
        match with_retry(self.config.search_retry, || {
            self.fetch_json(&self.books_url, &params)
        })
        .await
        {
            Ok(page) => {
                self.cache.set(key, page.clone());
                Outcome::Success(page)
            }
            Err(err) => {
                tracing::error!(key = %key, err = %err, "catalog search failed");
                Outcome::from_error(err)
            }
        }
    }

    /// Fetches a single record by id. Absence upstream is `NotFound`, not
    /// an error, and never populates the cache.
    pub async fn get_by_id(&self, id: u64) -> Outcome<BookRecord> {
        let params = [("ids", id.to_string())];
        match with_retry(self.config.fetch_retry, || self.fetch_record(&params)).await {
            Ok(Some(record)) => Outcome::Success(record),
            Ok(None) => Outcome::NotFound,
            Err(err) => {
                tracing::error!(id, err = %err, "catalog record fetch failed");
                Outcome::from_error(err)
            }
        }
    }

    /// Resolves the record, picks the best HTML variant from its format
    /// map, and fetches that URL's raw body. A record without any
    /// HTML-typed format is `NotFound` without a body fetch.
    pub async fn get_content_body(&self, id: u64) -> Outcome<String> {
        let record = match self.get_by_id(id).await {
            Outcome::Success(record) => record,
            Outcome::NotFound => return Outcome::NotFound,
            Outcome::TimedOut => return Outcome::TimedOut,
            Outcome::UpstreamError(detail) => return Outcome::UpstreamError(detail),
        };

        let Some(content_url) = pick_html_format(&record.formats) else {
            tracing::debug!(id, "no html-typed format available");
            return Outcome::NotFound;
        };
        let content_url = match Url::parse(content_url) {
            Ok(url) => url,
            Err(err) => {
                return Outcome::UpstreamError(format!("invalid content url {content_url}: {err}"));
            }
        };

        match with_retry(self.config.fetch_retry, || self.fetch_text(&content_url)).await {
            Ok(body) => Outcome::Success(body),
            Err(err) => {
                tracing::error!(id, url = %content_url, err = %err, "content body fetch failed");
                Outcome::from_error(err)
            }
        }
    }

    async fn fetch_json(
        &self,
        url: &Url,
        params: &[(&str, String)],
    ) -> Result<serde_json::Value, FetchError> {
        let response = self.upstream.get(url, params).await?.error_for_status()?;
        Ok(response.json().await?)
    }

    async fn fetch_record(
        &self,
        params: &[(&str, String)],
    ) -> Result<Option<BookRecord>, FetchError> {
        let response = self
            .upstream
            .get(&self.books_url, params)
            .await?
            .error_for_status()?;
        let page: RecordPage = response.json().await?;
        Ok(page.results.into_iter().next())
    }

    async fn fetch_text(&self, url: &Url) -> Result<String, FetchError> {
        let response = self.upstream.get(url, &[]).await?.error_for_status()?;
        Ok(response.text().await?)
    }
}

/// First present variant in [`HTML_FORMAT_PREFERENCE`] order.
pub fn pick_html_format(formats: &BTreeMap<String, String>) -> Option<&str> {
    HTML_FORMAT_PREFERENCE
        .iter()
        .find_map(|mime| formats.get(*mime).map(String::as_str))
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn normalize_comma_set(input: &str) -> Option<String> {
    let mut items: Vec<String> = input
        .split(',')
        .map(|item| item.trim().to_ascii_lowercase())
        .filter(|item| !item.is_empty())
        .collect();
    items.sort();
    items.dedup();
    if items.is_empty() {
        None
    } else {
        Some(items.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_collapses_search_whitespace() {
        let query = CatalogQuery {
            search: Some("  moby \t dick  ".to_owned()),
            ..CatalogQuery::default()
        };
        assert_eq!(query.normalized().search.as_deref(), Some("moby dick"));
    }

    #[test]
    fn normalized_drops_empty_fields() {
        let query = CatalogQuery {
            search: Some("   ".to_owned()),
            languages: Some(" , ".to_owned()),
            ..CatalogQuery::default()
        };
        let normalized = query.normalized();
        assert_eq!(normalized.search, None);
        assert_eq!(normalized.languages, None);
    }

    #[test]
    fn language_set_is_sorted_lowercased_and_deduplicated() {
        let query = CatalogQuery {
            languages: Some("FR,en, fr".to_owned()),
            ..CatalogQuery::default()
        };
        assert_eq!(query.normalized().languages.as_deref(), Some("en,fr"));
    }

    #[test]
    fn canonical_string_uses_fixed_field_order() {
        let query = CatalogQuery {
            page: Some(2),
            search: Some("frankenstein".to_owned()),
            languages: Some("en".to_owned()),
            copyright: Some("false".to_owned()),
            ..CatalogQuery::default()
        };
        assert_eq!(
            query.normalized().canonical_string(),
            "search=frankenstein&languages=en&copyright=false&page=2"
        );
    }

    #[test]
    fn html_format_preference_order() {
        let mut formats = BTreeMap::new();
        formats.insert(
            "text/html; charset=iso-8859-1".to_owned(),
            "http://example.com/latin1".to_owned(),
        );
        formats.insert(
            "text/html; charset=utf-8".to_owned(),
            "http://example.com/utf8".to_owned(),
        );
        assert_eq!(
            pick_html_format(&formats),
            Some("http://example.com/utf8")
        );

        formats.insert("text/html".to_owned(), "http://example.com/plain".to_owned());
        assert_eq!(pick_html_format(&formats), Some("http://example.com/plain"));
    }

    #[test]
    fn no_html_format_yields_none() {
        let mut formats = BTreeMap::new();
        formats.insert(
            "application/epub+zip".to_owned(),
            "http://example.com/epub".to_owned(),
        );
        formats.insert(
            "text/plain; charset=utf-8".to_owned(),
            "http://example.com/txt".to_owned(),
        );
        assert_eq!(pick_html_format(&formats), None);
    }

    #[test]
    fn timeout_maps_to_timed_out() {
        assert_eq!(
            Outcome::<()>::from_error(FetchError::Timeout),
            Outcome::TimedOut
        );
    }

    #[test]
    fn status_maps_to_upstream_error() {
        let outcome = Outcome::<()>::from_error(FetchError::Status(
            reqwest::StatusCode::INTERNAL_SERVER_ERROR,
        ));
        match outcome {
            Outcome::UpstreamError(detail) => assert!(detail.contains("500")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn record_round_trips_unknown_fields() {
        let raw = serde_json::json!({
            "id": 84,
            "title": "Frankenstein",
            "formats": {"text/html": "http://example.com/84.html"},
            "download_count": 12345,
            "languages": ["en"]
        });
        let record: BookRecord = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(record.id, 84);
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            raw,
            "passthrough fields must survive re-serialization"
        );
    }
}
