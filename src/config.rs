//! Transport tuning knobs.
//!
//! Timeout and retry policy belong to the transport collaborator, not the
//! pipeline core, so this is the only configuration surface the crate owns.

/// Configuration for [`crate::transport::HttpTransport`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Retries on 5xx responses and network errors.
    pub max_retries: u32,
    /// Maximum redirects to follow.
    pub max_redirects: usize,
    /// User-Agent header value.
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_retries: 2,
            max_redirects: 5,
            user_agent: format!("restmap/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = TransportConfig::default();
        assert_eq!(cfg.max_retries, 2);
        assert!(cfg.user_agent.starts_with("restmap/"));
    }
}
