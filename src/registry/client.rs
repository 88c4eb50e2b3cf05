//! Registry API client
//!
//! Read-only client for the registry's v2 HTTP API, used by `doctor` to
//! verify reachability and by pre-push diagnostics. Requests are retried
//! with exponential backoff; transient network errors never fail a release
//! on their own.

use std::time::Duration;

use thiserror::Error;

use crate::config::defaults;

/// Registry API errors
#[derive(Error, Debug)]
pub enum RegistryApiError {
    /// Endpoint unreachable after retries
    #[error("Registry '{url}' unreachable: {error}")]
    Unreachable { url: String, error: String },

    /// Endpoint reachable but responded unexpectedly
    #[error("Registry '{url}' responded with status {status}")]
    UnexpectedStatus { url: String, status: u16 },
}

/// Client for a single registry endpoint.
#[derive(Debug, Clone)]
pub struct RegistryApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl RegistryApiClient {
    /// Create a client for a registry host (TLS assumed).
    pub fn new(endpoint: &str) -> Self {
        Self::with_base_url(format!("https://{endpoint}"))
    }

    /// Create a client against an explicit base URL.
    pub fn with_base_url(base_url: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(defaults::REGISTRY_TIMEOUT_SECS))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url,
        }
    }

    /// The base URL requests are issued against
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Verify the endpoint speaks the v2 API.
    ///
    /// A 401 counts as reachable: it means the registry is up and merely
    /// wants authentication, which the publisher supplies separately.
    pub async fn ping(&self) -> Result<(), RegistryApiError> {
        let url = format!("{}/v2/", self.base_url);
        let response = self.get_with_retry(&url).await?;

        let status = response.status();
        if status.is_success() || status.as_u16() == 401 {
            Ok(())
        } else {
            Err(RegistryApiError::UnexpectedStatus {
                url,
                status: status.as_u16(),
            })
        }
    }

    /// Whether a tag already exists in a repository.
    ///
    /// Only used for diagnostics; pushes overwrite existing tags, so a
    /// `true` here never blocks a publish.
    pub async fn tag_exists(&self, repository: &str, tag: &str) -> Result<bool, RegistryApiError> {
        let url = format!("{}/v2/{repository}/manifests/{tag}", self.base_url);
        let response = self.get_with_retry(&url).await?;
        Ok(response.status().is_success())
    }

    async fn get_with_retry(&self, url: &str) -> Result<reqwest::Response, RegistryApiError> {
        let policy = backoff::ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(500))
            .with_max_elapsed_time(Some(Duration::from_secs(
                defaults::REGISTRY_RETRY_WINDOW_SECS,
            )))
            .build();

        backoff::future::retry(policy, || async {
            self.client.get(url).send().await.map_err(|e| {
                tracing::debug!(url, error = %e, "registry request retry");
                backoff::Error::transient(e)
            })
        })
        .await
        .map_err(|e| RegistryApiError::Unreachable {
            url: url.to_string(),
            error: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_from_endpoint() {
        let client = RegistryApiClient::new("registry.example.com:5000");
        assert_eq!(client.base_url(), "https://registry.example.com:5000");
    }
}
