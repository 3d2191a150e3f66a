//! Async HTTP transport wrapping reqwest.
//!
//! Handles redirects, timeouts, retry on 5xx, and exponential backoff
//! on 429 honoring the Retry-After header. Network errors are retried
//! the same way as 5xx responses.

use super::{Method, Transport, TransportRequest, TransportResponse};
use crate::config::TransportConfig;
use crate::error::TransportError;
use async_trait::async_trait;
use std::time::Duration;

/// Response headers worth carrying into the pipeline.
const CAPTURED_HEADERS: &[&str] = &[
    "content-type",
    "content-language",
    "last-modified",
    "cache-control",
    "etag",
];

/// HTTP transport backed by a shared reqwest client.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    config: TransportConfig,
}

impl HttpTransport {
    /// Create a transport from the given configuration.
    pub fn new(config: TransportConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .user_agent(config.user_agent.clone())
            .build()
            .unwrap_or_default();

        Self { client, config }
    }

    /// A transport with default settings.
    pub fn default_transport() -> Self {
        Self::new(TransportConfig::default())
    }

    fn build_request(&self, request: &TransportRequest) -> reqwest::RequestBuilder {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
            Method::Put => self.client.put(&request.url),
            Method::Delete => self.client.delete(&request.url),
        };

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        builder
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(
        &self,
        request: &TransportRequest,
    ) -> Result<TransportResponse, TransportError> {
        let mut retries = 0u32;
        let max_retries = self.config.max_retries;

        loop {
            let resp = self.build_request(request).send().await;

            match resp {
                Ok(r) => {
                    let status = r.status().as_u16();
                    let final_url = r.url().to_string();

                    // Retry on 5xx
                    if status >= 500 && retries < max_retries {
                        retries += 1;
                        let delay = Duration::from_millis(500 * 2u64.pow(retries - 1));
                        tracing::debug!(status, retry = retries, "retrying after server error");
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    // Backoff on 429
                    if status == 429 && retries < max_retries {
                        retries += 1;
                        let retry_after = r
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|s| s.parse::<u64>().ok())
                            .unwrap_or(2);
                        let delay = Duration::from_secs(retry_after.min(10));
                        tracing::debug!(retry = retries, "backing off after 429");
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    let content_type = r
                        .headers()
                        .get("content-type")
                        .and_then(|v| v.to_str().ok())
                        .map(|s| s.to_string());

                    let headers: Vec<(String, String)> = r
                        .headers()
                        .iter()
                        .filter(|(k, _)| CAPTURED_HEADERS.contains(&k.as_str()))
                        .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
                        .collect();

                    let body = r.bytes().await.map(|b| b.to_vec()).unwrap_or_default();

                    return Ok(TransportResponse {
                        status,
                        final_url,
                        content_type,
                        headers,
                        body,
                    });
                }
                Err(e) => {
                    if retries < max_retries {
                        retries += 1;
                        let delay = Duration::from_millis(500 * 2u64.pow(retries - 1));
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(e.into());
                }
            }
        }
    }
}
