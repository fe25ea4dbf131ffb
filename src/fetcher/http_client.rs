//! HTTP client construction for API requests.
//!
//! Some sandboxed environments panic while reqwest reads system proxy
//! settings. The builder catches that panic once and retries with the
//! environment proxy variables only.

use std::panic::{AssertUnwindSafe, catch_unwind};

use reqwest::{Client, ClientBuilder, Proxy};
use tracing::warn;

use super::FetchError;
use crate::config::FetcherConfig;

/// Builds the shared API client: timeouts, User-Agent, gzip.
///
/// # Errors
///
/// Returns [`FetchError::InvalidRequest`] when the client cannot be built.
pub(crate) fn build_http_client(config: &FetcherConfig) -> Result<Client, FetchError> {
    match try_build_client(config, false) {
        Ok(client) => Ok(client),
        Err(BuildClientFailure::Panic) => {
            warn!("HTTP client hit system proxy panic; using env-proxy fallback builder");
            match try_build_client(config, true) {
                Ok(client) => Ok(client),
                Err(BuildClientFailure::Panic) => Err(FetchError::invalid_request(
                    "HTTP client construction panicked while reading proxy settings",
                    "Set HTTPS_PROXY explicitly or run outside the sandbox",
                )),
                Err(BuildClientFailure::Build(error)) => Err(build_failed(&error)),
            }
        }
        Err(BuildClientFailure::Build(error)) => Err(build_failed(&error)),
    }
}

fn build_failed(error: &reqwest::Error) -> FetchError {
    FetchError::invalid_request(
        format!("HTTP client construction failed: {error}"),
        "Check the TLS setup and proxy environment variables",
    )
}

enum BuildClientFailure {
    Panic,
    Build(reqwest::Error),
}

fn try_build_client(
    config: &FetcherConfig,
    disable_system_proxy_lookup: bool,
) -> Result<Client, BuildClientFailure> {
    catch_unwind(AssertUnwindSafe(|| {
        let mut builder = base_builder(config);
        if disable_system_proxy_lookup {
            builder = apply_env_proxy_fallback(builder.no_proxy());
        }
        builder.build().map_err(BuildClientFailure::Build)
    }))
    .map_err(|_| BuildClientFailure::Panic)?
}

fn base_builder(config: &FetcherConfig) -> ClientBuilder {
    Client::builder()
        .connect_timeout(config.connect_timeout)
        .timeout(config.read_timeout)
        .user_agent(config.user_agent.clone())
        .gzip(true)
}

fn apply_env_proxy_fallback(mut builder: ClientBuilder) -> ClientBuilder {
    if let Some(proxy) = find_first_proxy_var(&["HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy"])
        && let Ok(resolved) = Proxy::https(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    if let Some(proxy) = find_first_proxy_var(&["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"])
        && let Ok(resolved) = Proxy::http(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    builder
}

fn find_first_proxy_var(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        std::env::var(name)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_build_http_client_with_defaults() {
        assert!(build_http_client(&FetcherConfig::default()).is_ok());
    }

    #[test]
    fn test_env_proxy_fallback_builds() {
        let builder = apply_env_proxy_fallback(Client::builder().no_proxy());
        assert!(builder.build().is_ok());
    }
}
