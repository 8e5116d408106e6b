//! HTTP transport used to reach the form server
//!
//! The pipeline only needs "GET a URL with headers, return the body or a
//! typed error". `ReqwestTransport` is the production implementation; tests
//! substitute a scripted one.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("ivd-sync/", env!("CARGO_PKG_VERSION"));

/// Request header list (name, value)
pub type Headers = Vec<(String, String)>;

/// Transport errors
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Remote answered 404
    #[error("Not found: {0}")]
    NotFound(String),

    /// Remote answered another non-2xx status
    #[error("HTTP {0}: {1}")]
    Status(u16, String),

    /// Request exceeded its timeout
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Connection or protocol failure
    #[error("Network error: {0}")]
    Network(String),

    /// Response body could not be read
    #[error("Body error: {0}")]
    Body(String),
}

impl TransportError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, TransportError::NotFound(_))
    }
}

/// Minimal GET capability
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Issue a GET and return the response body as text
    async fn get(&self, url: &str, headers: &[(String, String)]) -> Result<String, TransportError>;
}

/// Headers for token-authenticated calls to the form server
pub fn token_headers(api_token: &str) -> Headers {
    vec![
        ("Authorization".to_string(), format!("Token {}", api_token)),
        ("Accept".to_string(), "application/json".to_string()),
    ]
}

/// reqwest-backed transport with a per-request timeout
#[derive(Clone)]
pub struct ReqwestTransport {
    http_client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(Self { http_client })
    }
}

fn classify(url: &str, err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(url.to_string())
    } else {
        TransportError::Network(err.to_string())
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str, headers: &[(String, String)]) -> Result<String, TransportError> {
        let mut request = self.http_client.get(url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        tracing::debug!(url = %url, "GET");

        let response = request.send().await.map_err(|e| classify(url, e))?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(TransportError::NotFound(url.to_string()));
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(TransportError::Status(status.as_u16(), error_text));
        }

        response.text().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(url.to_string())
            } else {
                TransportError::Body(e.to_string())
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let transport = ReqwestTransport::new(Duration::from_secs(5));
        assert!(transport.is_ok());
    }

    #[test]
    fn test_token_headers() {
        let headers = token_headers("abc123");
        assert!(headers.contains(&("Authorization".to_string(), "Token abc123".to_string())));
        assert!(headers.contains(&("Accept".to_string(), "application/json".to_string())));
    }

    #[test]
    fn test_not_found_classification() {
        assert!(TransportError::NotFound("u".to_string()).is_not_found());
        assert!(!TransportError::Status(500, String::new()).is_not_found());
        assert!(!TransportError::Timeout("u".to_string()).is_not_found());
    }
}
