//! Error types for category listing requests.

use thiserror::Error;

/// Errors that can occur while listing categories.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The request URL.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The request URL.
        url: String,
    },

    /// Non-success HTTP response.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The request URL.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// The Retry-After header value, if present (for 429 responses).
        retry_after: Option<String>,
    },

    /// The API answered with an `error` object.
    #[error("API error '{code}' listing {target}: {info}")]
    Api {
        /// What was being listed.
        target: String,
        /// MediaWiki error code.
        code: String,
        /// MediaWiki error description.
        info: String,
    },

    /// The response body was not the expected JSON shape.
    #[error("unexpected API response listing {target}: {reason}")]
    Decode {
        /// What was being listed.
        target: String,
        /// Why decoding failed.
        reason: String,
    },

    /// The requested category does not exist.
    #[error(
        "category '{title}' not found on the '{locale}' wiki\n  Suggestion: Check the spelling and the language code"
    )]
    NotFound {
        /// The requested title.
        title: String,
        /// The wiki language code.
        locale: String,
    },

    /// Continuation did not terminate within the configured page budget.
    #[error(
        "listing {target} needed more than {limit} continuation requests\n  Suggestion: Raise max_continuations in the config file"
    )]
    TooManyPages {
        /// What was being listed.
        target: String,
        /// The configured budget.
        limit: usize,
    },

    /// The request could not be built from the given inputs.
    #[error("invalid request: {reason}\n  Suggestion: {suggestion}")]
    InvalidRequest {
        /// What is wrong.
        reason: String,
        /// How to fix the issue.
        suggestion: String,
    },
}

impl FetchError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an HTTP status error with an optional Retry-After header value.
    pub fn http_status(url: impl Into<String>, status: u16, retry_after: Option<String>) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after,
        }
    }

    /// Creates an API error.
    pub fn api(target: impl Into<String>, code: impl Into<String>, info: impl Into<String>) -> Self {
        Self::Api {
            target: target.into(),
            code: code.into(),
            info: info.into(),
        }
    }

    /// Creates a decode error.
    pub fn decode(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Decode {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Creates a not-found error.
    pub fn not_found(title: impl Into<String>, locale: impl Into<String>) -> Self {
        Self::NotFound {
            title: title.into(),
            locale: locale.into(),
        }
    }

    /// Creates an invalid-request error.
    pub fn invalid_request(reason: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Returns the Retry-After header value, if the server sent one.
    #[must_use]
    pub fn retry_after(&self) -> Option<&str> {
        match self {
            Self::HttpStatus { retry_after, .. } => retry_after.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_message() {
        let err = FetchError::http_status("https://en.wikipedia.org/w/api.php", 503, None);
        assert_eq!(
            err.to_string(),
            "HTTP 503 fetching https://en.wikipedia.org/w/api.php"
        );
        assert!(err.retry_after().is_none());
    }

    #[test]
    fn test_retry_after_exposed() {
        let err = FetchError::http_status("https://x", 429, Some("2".to_string()));
        assert_eq!(err.retry_after(), Some("2"));
    }

    #[test]
    fn test_not_found_message_has_suggestion() {
        let msg = FetchError::not_found("Birdz", "en").to_string();
        assert!(msg.contains("Birdz"));
        assert!(msg.contains("'en'"));
        assert!(msg.contains("Suggestion"));
    }

    #[test]
    fn test_api_error_message() {
        let msg = FetchError::api("category 12", "badvalue", "Bad pageid").to_string();
        assert!(msg.contains("badvalue"));
        assert!(msg.contains("category 12"));
    }
}
