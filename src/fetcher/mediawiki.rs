//! MediaWiki Action API implementation of [`CategoryFetcher`].
//!
//! Listings use the `categorymembers` generator with `prop=categoryinfo`, so
//! a single request returns members together with their declared counts.
//! Responses are followed through `continue` until the listing is complete.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::RETRY_AFTER;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use super::http_client::build_http_client;
use super::rate_limiter::{RateLimiter, parse_retry_after};
use super::retry::{RetryDecision, RetryPolicy, classify_error};
use super::{CategoryFetcher, CategoryListing, CategorySummary, FetchError, PageEntry, SubcategoryEntry};
use crate::config::{FetcherConfig, is_valid_locale};
use crate::tree::{CATEGORY_NAMESPACE, CATEGORY_PREFIX, NodeId, strip_namespace};

/// Default API endpoint; `{locale}` is replaced by the wiki language code.
pub const DEFAULT_API_URL_TEMPLATE: &str = "https://{locale}.wikipedia.org/w/api.php";

/// Default number of continuation requests allowed per listing.
pub const DEFAULT_MAX_CONTINUATIONS: usize = 50;

/// Fetches category listings from a MediaWiki wiki.
///
/// Create once and share: the client pools connections and the rate limiter
/// only works across requests made through the same instance.
pub struct MediaWikiFetcher {
    client: Client,
    config: FetcherConfig,
    rate_limiter: RateLimiter,
    retry_policy: RetryPolicy,
}

impl std::fmt::Debug for MediaWikiFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaWikiFetcher")
            .field("api_url_template", &self.config.api_url_template)
            .field("max_retries", &self.config.max_retries)
            .finish_non_exhaustive()
    }
}

impl MediaWikiFetcher {
    /// Creates a fetcher from transport settings.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidRequest`] if the HTTP client cannot be built.
    #[instrument(skip_all, fields(api = %config.api_url_template))]
    pub fn new(config: FetcherConfig) -> Result<Self, FetchError> {
        let client = build_http_client(&config)?;
        let rate_limiter = RateLimiter::new(config.rate_limit);
        let retry_policy =
            RetryPolicy::with_max_attempts(config.max_retries).with_base_delay(config.retry_base_delay);
        Ok(Self {
            client,
            config,
            rate_limiter,
            retry_policy,
        })
    }

    /// Creates a fetcher that sends every request to `base_url`, whatever the locale
    /// (for testing with wiremock or for a private wiki).
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidRequest`] if the HTTP client cannot be built.
    pub fn with_base_url(
        base_url: impl Into<String>,
        config: FetcherConfig,
    ) -> Result<Self, FetchError> {
        Self::new(FetcherConfig {
            api_url_template: base_url.into(),
            ..config
        })
    }

    fn endpoint(&self, locale: &str) -> Result<String, FetchError> {
        if !is_valid_locale(locale) {
            return Err(FetchError::invalid_request(
                format!("'{locale}' is not a wiki language code"),
                "Use a code such as 'en', 'de' or 'zh-yue'",
            ));
        }
        Ok(self.config.api_url_for(locale))
    }

    /// Runs a query and follows `continue` until the result set is complete.
    ///
    /// Pages are merged by id in first-seen order; a later batch may supply
    /// `categoryinfo` that an earlier batch omitted.
    async fn query_all(
        &self,
        endpoint: &str,
        base_params: &[(&str, String)],
        subject: &str,
    ) -> Result<Vec<ApiPage>, FetchError> {
        let mut pages: Vec<ApiPage> = Vec::new();
        let mut index: HashMap<u64, usize> = HashMap::new();
        let mut continuation: Option<Map<String, Value>> = None;
        let mut requests = 0usize;

        loop {
            if requests > self.config.max_continuations {
                return Err(FetchError::TooManyPages {
                    target: subject.to_string(),
                    limit: self.config.max_continuations,
                });
            }

            let mut params: Vec<(String, String)> = base_params
                .iter()
                .map(|(key, value)| ((*key).to_string(), value.clone()))
                .collect();
            if let Some(extra) = &continuation {
                for (key, value) in extra {
                    params.retain(|(existing, _)| existing != key);
                    params.push((key.clone(), continuation_value(value)));
                }
            }

            let url = url::Url::parse_with_params(endpoint, &params).map_err(|e| {
                FetchError::invalid_request(
                    format!("cannot build API URL from '{endpoint}': {e}"),
                    "Check the api_url setting",
                )
            })?;

            let response = self.get_with_retry(url.as_str(), subject).await?;
            requests += 1;

            for page in response.query.map(|body| body.pages).unwrap_or_default() {
                let Some(id) = page.pageid else {
                    pages.push(page);
                    continue;
                };
                if let Some(&position) = index.get(&id) {
                    if pages[position].categoryinfo.is_none() {
                        pages[position].categoryinfo = page.categoryinfo;
                    }
                } else {
                    index.insert(id, pages.len());
                    pages.push(page);
                }
            }

            match response.continuation {
                Some(next) if !next.is_empty() => {
                    debug!(subject, requests, "following continuation");
                    continuation = Some(next);
                }
                _ => break,
            }
        }

        debug!(subject, requests, pages = pages.len(), "query complete");
        Ok(pages)
    }

    async fn get_with_retry(&self, url: &str, subject: &str) -> Result<QueryResponse, FetchError> {
        let mut attempt = 1;
        loop {
            self.rate_limiter.acquire(url).await;
            let error = match self.get_once(url, subject).await {
                Ok(response) => return Ok(response),
                Err(error) => error,
            };

            match self.retry_policy.should_retry(classify_error(&error), attempt) {
                RetryDecision::Retry { delay, attempt: next } => {
                    let delay = error
                        .retry_after()
                        .and_then(parse_retry_after)
                        .map_or(delay, |server_delay| server_delay.max(delay));
                    warn!(
                        subject,
                        attempt,
                        delay_ms = delay.as_millis(),
                        error = %error,
                        "request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt = next;
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(subject, attempt, %reason, "giving up on request");
                    return Err(error);
                }
            }
        }
    }

    async fn get_once(&self, url: &str, subject: &str) -> Result<QueryResponse, FetchError> {
        debug!(url, "calling MediaWiki API");
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::timeout(url)
            } else {
                FetchError::network(url, e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            return Err(FetchError::http_status(url, status.as_u16(), retry_after));
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::timeout(url)
            } else {
                FetchError::network(url, e)
            }
        })?;
        let parsed: QueryResponse =
            serde_json::from_str(&body).map_err(|e| FetchError::decode(subject, e.to_string()))?;

        if let Some(error) = parsed.error {
            return Err(FetchError::api(subject, error.code, error.info));
        }
        Ok(parsed)
    }
}

#[async_trait]
impl CategoryFetcher for MediaWikiFetcher {
    fn name(&self) -> &str {
        "mediawiki"
    }

    #[instrument(skip(self), fields(fetcher = "mediawiki"))]
    async fn lookup_category(
        &self,
        title: &str,
        locale: &str,
    ) -> Result<CategorySummary, FetchError> {
        let bare = strip_namespace(title.trim()).trim();
        if bare.is_empty() {
            return Err(FetchError::invalid_request(
                "empty category title",
                "Pass a category name such as 'Birds'",
            ));
        }
        let endpoint = self.endpoint(locale)?;
        let params = [
            ("action", "query".to_string()),
            ("titles", format!("{CATEGORY_PREFIX}{bare}")),
            ("prop", "categoryinfo".to_string()),
            ("redirects", "1".to_string()),
            ("format", "json".to_string()),
            ("formatversion", "2".to_string()),
        ];

        let pages = self.query_all(&endpoint, &params, bare).await?;
        let page = pages
            .into_iter()
            .find(|page| !page.missing && !page.invalid && page.ns == CATEGORY_NAMESPACE)
            .ok_or_else(|| FetchError::not_found(bare, locale))?;
        let id = page.pageid.ok_or_else(|| FetchError::not_found(bare, locale))?;
        let info = page.categoryinfo.unwrap_or_default();

        info!(category = bare, id, subcats = info.subcats, pages = info.pages, "resolved category");
        Ok(CategorySummary {
            id: NodeId(id),
            title: strip_namespace(&page.title).to_string(),
            subcat_count: info.subcats,
            page_count: info.pages,
        })
    }

    #[instrument(skip(self), fields(fetcher = "mediawiki"))]
    async fn fetch_children(
        &self,
        node: NodeId,
        locale: &str,
        include_metadata: bool,
    ) -> Result<CategoryListing, FetchError> {
        let endpoint = self.endpoint(locale)?;
        let member_types = if include_metadata { "subcat|page" } else { "subcat" };
        let params = [
            ("action", "query".to_string()),
            ("generator", "categorymembers".to_string()),
            ("gcmpageid", node.to_string()),
            ("gcmtype", member_types.to_string()),
            ("gcmlimit", "max".to_string()),
            ("prop", "categoryinfo".to_string()),
            ("format", "json".to_string()),
            ("formatversion", "2".to_string()),
        ];

        let target = format!("category {node}");
        let pages = self.query_all(&endpoint, &params, &target).await?;
        let listing = partition_pages(pages, include_metadata);
        debug!(
            node = %node,
            subcategories = listing.subcategories.len(),
            pages = listing.pages.len(),
            "listing fetched"
        );
        Ok(listing)
    }
}

/// Splits API pages into subcategories and articles, keeping listing order.
fn partition_pages(pages: Vec<ApiPage>, include_metadata: bool) -> CategoryListing {
    let mut listing = CategoryListing::default();
    for page in pages {
        let Some(id) = page.pageid else {
            continue;
        };
        if page.ns == CATEGORY_NAMESPACE || page.categoryinfo.is_some() {
            let info = page.categoryinfo.unwrap_or_default();
            listing.subcategories.push(SubcategoryEntry {
                id: NodeId(id),
                title: strip_namespace(&page.title).to_string(),
                subcat_count: info.subcats,
                page_count: info.pages,
            });
        } else if include_metadata {
            listing.pages.push(PageEntry {
                id: NodeId(id),
                title: page.title,
            });
        }
    }
    listing
}

fn continuation_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

// ==================== Response Types ====================

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    query: Option<QueryBody>,
    #[serde(default, rename = "continue")]
    continuation: Option<Map<String, Value>>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Default, Deserialize)]
struct QueryBody {
    #[serde(default)]
    pages: Vec<ApiPage>,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiPage {
    #[serde(default)]
    pageid: Option<u64>,
    #[serde(default)]
    ns: i64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    missing: bool,
    #[serde(default)]
    invalid: bool,
    #[serde(default)]
    categoryinfo: Option<CategoryInfo>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
struct CategoryInfo {
    #[serde(default)]
    subcats: u64,
    #[serde(default)]
    pages: u64,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    #[serde(default)]
    info: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, ResponseTemplate};

    use super::*;
    use crate::test_support::socket_guard::start_mock_server_or_skip;

    fn test_config() -> FetcherConfig {
        FetcherConfig {
            retry_base_delay: Duration::from_millis(10),
            rate_limit: Duration::ZERO,
            ..FetcherConfig::default()
        }
    }

    fn fetcher_for(uri: &str) -> MediaWikiFetcher {
        MediaWikiFetcher::with_base_url(format!("{uri}/w/api.php"), test_config()).unwrap()
    }

    fn birds_first_batch() -> Value {
        json!({
            "continue": { "gcmcontinue": "page|ROBIN|77", "continue": "gcmcontinue||" },
            "query": { "pages": [
                { "pageid": 11, "ns": 14, "title": "Category:Birds of prey",
                  "categoryinfo": { "size": 9, "pages": 7, "files": 0, "subcats": 2 } },
                { "pageid": 12, "ns": 14, "title": "Category:Extinct birds",
                  "categoryinfo": { "size": 4, "pages": 4, "files": 0, "subcats": 0 } },
                { "pageid": 101, "ns": 0, "title": "Bird" }
            ]}
        })
    }

    fn birds_second_batch() -> Value {
        json!({
            "batchcomplete": true,
            "query": { "pages": [
                { "pageid": 13, "ns": 14, "title": "Category:Seabirds" },
                { "pageid": 102, "ns": 0, "title": "Robin" }
            ]}
        })
    }

    // ==================== Listing Tests ====================

    #[tokio::test]
    async fn test_fetch_children_follows_continuation() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .and(query_param("gcmcontinue", "page|ROBIN|77"))
            .respond_with(ResponseTemplate::new(200).set_body_json(birds_second_batch()))
            .with_priority(1)
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .and(query_param("generator", "categorymembers"))
            .and(query_param("gcmpageid", "10"))
            .and(query_param("gcmtype", "subcat|page"))
            .respond_with(ResponseTemplate::new(200).set_body_json(birds_first_batch()))
            .expect(1)
            .mount(&mock_server)
            .await;

        let fetcher = fetcher_for(&mock_server.uri());
        let listing = fetcher.fetch_children(NodeId(10), "en", true).await.unwrap();

        let titles: Vec<_> = listing.subcategories.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Birds of prey", "Extinct birds", "Seabirds"]);
        assert_eq!(listing.subcategories[0].subcat_count, 2);
        assert_eq!(listing.subcategories[0].page_count, 7);
        assert_eq!(listing.subcategories[2].subcat_count, 0);

        let pages: Vec<_> = listing.pages.iter().map(|p| (p.id.0, p.title.as_str())).collect();
        assert_eq!(pages, vec![(101, "Bird"), (102, "Robin")]);
    }

    #[tokio::test]
    async fn test_fetch_children_without_metadata_requests_subcats_only() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("GET"))
            .and(query_param("gcmtype", "subcat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(birds_second_batch()))
            .expect(1)
            .mount(&mock_server)
            .await;

        let fetcher = fetcher_for(&mock_server.uri());
        let listing = fetcher.fetch_children(NodeId(10), "en", false).await.unwrap();
        assert_eq!(listing.subcategories.len(), 1);
        assert!(listing.pages.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_children_empty_category() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "batchcomplete": true })))
            .mount(&mock_server)
            .await;

        let fetcher = fetcher_for(&mock_server.uri());
        let listing = fetcher.fetch_children(NodeId(10), "en", true).await.unwrap();
        assert!(listing.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_children_stops_runaway_continuation() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "continue": { "gcmcontinue": "page|LOOP|1", "continue": "gcmcontinue||" },
                "query": { "pages": [] }
            })))
            .mount(&mock_server)
            .await;

        let config = FetcherConfig {
            max_continuations: 2,
            ..test_config()
        };
        let fetcher =
            MediaWikiFetcher::with_base_url(format!("{}/w/api.php", mock_server.uri()), config)
                .unwrap();
        let err = fetcher.fetch_children(NodeId(10), "en", true).await.unwrap_err();
        assert!(matches!(err, FetchError::TooManyPages { limit: 2, .. }));
    }

    // ==================== Retry Tests ====================

    #[tokio::test]
    async fn test_fetch_children_retries_after_429() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(birds_second_batch()))
            .expect(1)
            .mount(&mock_server)
            .await;

        let fetcher = fetcher_for(&mock_server.uri());
        let listing = fetcher.fetch_children(NodeId(10), "en", true).await.unwrap();
        assert_eq!(listing.len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_children_gives_up_after_max_attempts() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&mock_server)
            .await;

        let fetcher = fetcher_for(&mock_server.uri());
        let err = fetcher.fetch_children(NodeId(10), "en", true).await.unwrap_err();
        assert!(matches!(err, FetchError::HttpStatus { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_fetch_children_404_not_retried() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&mock_server)
            .await;

        let fetcher = fetcher_for(&mock_server.uri());
        let err = fetcher.fetch_children(NodeId(10), "en", true).await.unwrap_err();
        assert!(matches!(err, FetchError::HttpStatus { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_fetch_children_api_error_surfaces() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": { "code": "badinteger", "info": "Invalid value for gcmpageid" }
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let fetcher = fetcher_for(&mock_server.uri());
        let err = fetcher.fetch_children(NodeId(10), "en", true).await.unwrap_err();
        match err {
            FetchError::Api { code, target, .. } => {
                assert_eq!(code, "badinteger");
                assert_eq!(target, "category 10");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_children_malformed_json_is_decode_error() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let fetcher = fetcher_for(&mock_server.uri());
        let err = fetcher.fetch_children(NodeId(10), "en", true).await.unwrap_err();
        assert!(matches!(err, FetchError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_fetch_children_rejects_bad_locale_without_request() {
        let fetcher = MediaWikiFetcher::new(test_config()).unwrap();
        let err = fetcher
            .fetch_children(NodeId(10), "en.evil.example/", true)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidRequest { .. }));
    }

    // ==================== Lookup Tests ====================

    #[tokio::test]
    async fn test_lookup_category_resolves_id_and_counts() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("GET"))
            .and(query_param("titles", "Category:Birds"))
            .and(query_param("prop", "categoryinfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "batchcomplete": true,
                "query": { "pages": [
                    { "pageid": 10, "ns": 14, "title": "Category:Birds",
                      "categoryinfo": { "size": 8, "pages": 5, "files": 0, "subcats": 3 } }
                ]}
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let fetcher = fetcher_for(&mock_server.uri());
        let summary = fetcher.lookup_category("Category:Birds", "en").await.unwrap();
        assert_eq!(summary.id, NodeId(10));
        assert_eq!(summary.title, "Birds");
        assert_eq!(summary.subcat_count, 3);
        assert_eq!(summary.page_count, 5);
    }

    #[tokio::test]
    async fn test_lookup_category_missing_is_not_found() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "batchcomplete": true,
                "query": { "pages": [
                    { "ns": 14, "title": "Category:Birdz", "missing": true }
                ]}
            })))
            .mount(&mock_server)
            .await;

        let fetcher = fetcher_for(&mock_server.uri());
        let err = fetcher.lookup_category("Birdz", "en").await.unwrap_err();
        assert!(matches!(err, FetchError::NotFound { ref title, .. } if title == "Birdz"));
    }

    // ==================== Partition Tests ====================

    #[test]
    fn test_partition_pages_uses_namespace_or_categoryinfo() {
        let pages: Vec<ApiPage> = serde_json::from_value(json!([
            { "pageid": 1, "ns": 14, "title": "Category:A" },
            { "pageid": 2, "ns": 0, "title": "Star Wars: Episode IV" },
            { "pageid": 3, "ns": 0, "title": "Odd", "categoryinfo": { "subcats": 1, "pages": 0 } },
            { "ns": 0, "title": "No id" }
        ]))
        .unwrap();

        let listing = partition_pages(pages, true);
        assert_eq!(listing.subcategories.len(), 2);
        assert_eq!(listing.subcategories[0].title, "A");
        assert_eq!(listing.subcategories[1].subcat_count, 1);
        assert_eq!(listing.pages.len(), 1);
        assert_eq!(listing.pages[0].title, "Star Wars: Episode IV");
    }

    #[test]
    fn test_continuation_value_formats_non_strings() {
        assert_eq!(continuation_value(&json!("a|b")), "a|b");
        assert_eq!(continuation_value(&json!(42)), "42");
    }
}
