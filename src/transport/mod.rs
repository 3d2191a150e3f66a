//! Transport collaborator contract.
//!
//! A transport performs one asynchronous HTTP exchange and reports either
//! the raw response (body bytes + status + content type) or an opaque
//! [`TransportError`]. A non-2xx status is still a *successful exchange* —
//! classifying it as a pipeline failure is the orchestrator's job. A
//! transport must complete at most once per request.

mod http;

pub use http::HttpTransport;

use crate::error::TransportError;
use async_trait::async_trait;

/// HTTP method for a transport request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

/// One request handed to the transport. Owned by a single loader.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    /// Extra request headers as (name, value) pairs.
    pub headers: Vec<(String, String)>,
    /// Request body, if any.
    pub body: Option<Vec<u8>>,
}

impl TransportRequest {
    /// A bare GET request for the given URL.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }
}

/// Raw outcome of a completed exchange.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Final URL after redirects.
    pub final_url: String,
    /// Content-Type header, if present.
    pub content_type: Option<String>,
    /// Response headers (selected subset).
    pub headers: Vec<(String, String)>,
    /// Response body bytes.
    pub body: Vec<u8>,
}

impl TransportResponse {
    /// Whether the status code is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Response metadata carried into observer notifications.
    pub fn metadata(&self) -> ResponseMetadata {
        ResponseMetadata {
            status: self.status,
            final_url: self.final_url.clone(),
            content_type: self.content_type.clone(),
        }
    }
}

/// The slice of response context an observer receives with a notification.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResponseMetadata {
    pub status: u16,
    pub final_url: String,
    pub content_type: Option<String>,
}

/// Asynchronous transport collaborator.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one exchange. Must complete at most once per request.
    async fn execute(&self, request: &TransportRequest)
        -> Result<TransportResponse, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        let mut resp = TransportResponse {
            status: 204,
            final_url: "https://api.test/things".to_string(),
            content_type: None,
            headers: Vec::new(),
            body: Vec::new(),
        };
        assert!(resp.is_success());

        resp.status = 404;
        assert!(!resp.is_success());
        resp.status = 301;
        assert!(!resp.is_success());
    }

    #[test]
    fn test_metadata_snapshot() {
        let resp = TransportResponse {
            status: 200,
            final_url: "https://api.test/things".to_string(),
            content_type: Some("application/json".to_string()),
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: b"{}".to_vec(),
        };
        let meta = resp.metadata();
        assert_eq!(meta.status, 200);
        assert_eq!(meta.content_type.as_deref(), Some("application/json"));
    }
}
