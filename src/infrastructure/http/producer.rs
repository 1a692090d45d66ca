use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::domain::DomainError;

const SOURCE: &str = "http";

/// Builds single-shot producers backed by HTTP GET requests
#[derive(Debug, Clone)]
pub struct HttpProducer {
    client: reqwest::Client,
}

impl HttpProducer {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, DomainError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                DomainError::configuration(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self { client })
    }

    /// Returns a future that fetches `url` and decodes the body as JSON.
    ///
    /// Nothing is sent until the future is polled.
    pub fn get_json(
        &self,
        url: impl Into<String>,
    ) -> BoxFuture<'static, Result<serde_json::Value, DomainError>> {
        let client = self.client.clone();
        let url = url.into();

        async move {
            tracing::debug!(url = %url, "Fetching");

            let response = client
                .get(&url)
                .send()
                .await
                .map_err(|e| DomainError::producer(SOURCE, format!("Request failed: {}", e)))?;

            if !response.status().is_success() {
                let status = response.status();
                let error_body = response.text().await.unwrap_or_default();
                return Err(DomainError::producer(
                    SOURCE,
                    format!("HTTP {}: {}", status, error_body),
                ));
            }

            response.json().await.map_err(|e| {
                DomainError::producer(SOURCE, format!("Failed to parse response: {}", e))
            })
        }
        .boxed()
    }
}

impl Default for HttpProducer {
    fn default() -> Self {
        Self::new()
    }
}
