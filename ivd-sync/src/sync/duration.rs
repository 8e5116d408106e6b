//! Per-record duration resolution
//!
//! Fetches a record's audit trail and hands it to the audit parser. Every
//! outcome is absorbed here: one missing attachment never blocks the rest
//! of the batch.

use std::sync::Arc;

use ivd_common::config::{AuditConfig, KoboConfig};
use tracing::{debug, error, warn};

use super::audit::{compute_duration, parse_audit_csv};
use crate::transport::{token_headers, Headers, HttpTransport};

/// Outcome of one resolution attempt
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution {
    /// Both checkpoints found
    Computed(f64),
    /// Trail fetched and parsed but lacks the checkpoint pair
    NoCheckpoints,
    /// Remote has no file for the locator
    NotFound,
    /// Transport or parse failure
    Failed,
}

impl Resolution {
    pub fn duration(&self) -> Option<f64> {
        match self {
            Resolution::Computed(minutes) => Some(*minutes),
            _ => None,
        }
    }

    /// True for outcomes caused by a fetch or parse problem
    pub fn is_failure(&self) -> bool {
        matches!(self, Resolution::NotFound | Resolution::Failed)
    }
}

/// Checkpoint pair and rounding used for every record
#[derive(Debug, Clone)]
pub struct Checkpoints {
    pub start_node: String,
    pub end_node: String,
    pub precision: u32,
}

impl From<&AuditConfig> for Checkpoints {
    fn from(config: &AuditConfig) -> Self {
        Self {
            start_node: config.start_node.clone(),
            end_node: config.end_node.clone(),
            precision: config.precision,
        }
    }
}

/// Fetches audit trails and derives durations
pub struct DurationResolver {
    transport: Arc<dyn HttpTransport>,
    audit_base_url: String,
    headers: Headers,
    checkpoints: Checkpoints,
}

impl DurationResolver {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        audit_base_url: impl Into<String>,
        headers: Headers,
        checkpoints: Checkpoints,
    ) -> Self {
        Self {
            transport,
            audit_base_url: audit_base_url.into(),
            headers,
            checkpoints,
        }
    }

    pub fn from_config(
        transport: Arc<dyn HttpTransport>,
        kobo: &KoboConfig,
        audit: &AuditConfig,
    ) -> Self {
        Self::new(
            transport,
            kobo.audit_base_url.clone(),
            token_headers(&kobo.api_token),
            Checkpoints::from(audit),
        )
    }

    /// Full audit resource URL: the base prefix followed by the locator
    pub fn audit_url(&self, locator: &str) -> String {
        format!("{}{}", self.audit_base_url, locator)
    }

    /// Resolve a duration, absent on any failure
    pub async fn resolve(&self, locator: &str) -> Option<f64> {
        self.resolve_detailed(locator).await.duration()
    }

    /// Resolve and report which outcome class occurred
    pub async fn resolve_detailed(&self, locator: &str) -> Resolution {
        let url = self.audit_url(locator);

        let body = match self.transport.get(&url, &self.headers).await {
            Ok(body) => body,
            Err(e) if e.is_not_found() => {
                warn!(locator = %locator, "Audit file not found");
                return Resolution::NotFound;
            }
            Err(e) => {
                error!(locator = %locator, error = %e, "Failed to fetch audit data");
                return Resolution::Failed;
            }
        };

        let events = match parse_audit_csv(&body) {
            Ok(events) => events,
            Err(e) => {
                error!(locator = %locator, error = %e, "Failed to process audit data");
                return Resolution::Failed;
            }
        };

        match compute_duration(
            &events,
            &self.checkpoints.start_node,
            &self.checkpoints.end_node,
            self.checkpoints.precision,
        ) {
            Some(minutes) => {
                debug!(locator = %locator, minutes, "Interview duration computed");
                Resolution::Computed(minutes)
            }
            None => {
                debug!(
                    locator = %locator,
                    events = events.len(),
                    "Audit trail lacks the checkpoint pair"
                );
                Resolution::NoCheckpoints
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Transport returning one canned result and remembering the request
    struct CannedTransport {
        result: Result<String, TransportError>,
        seen: Mutex<Vec<(String, Headers)>>,
    }

    impl CannedTransport {
        fn new(result: Result<String, TransportError>) -> Arc<Self> {
            Arc::new(Self {
                result,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl HttpTransport for CannedTransport {
        async fn get(&self, url: &str, headers: &[(String, String)]) -> Result<String, TransportError> {
            self.seen
                .lock()
                .unwrap()
                .push((url.to_string(), headers.to_vec()));
            self.result.clone()
        }
    }

    fn make_resolver(transport: Arc<CannedTransport>) -> DurationResolver {
        DurationResolver::new(
            transport,
            "https://media.example.org/original?media_file=",
            token_headers("tok"),
            Checkpoints {
                start_node: "/f/start".to_string(),
                end_node: "/f/end".to_string(),
                precision: 1,
            },
        )
    }

    #[tokio::test]
    async fn test_resolve_success() {
        let body = "node,start,end\n/f/start,1000,2000\n/f/end,60000,181000\n";
        let transport = CannedTransport::new(Ok(body.to_string()));
        let resolver = make_resolver(transport.clone());

        let outcome = resolver.resolve_detailed("u/attachments/audit.csv").await;
        assert_eq!(outcome, Resolution::Computed(3.0));

        let seen = transport.seen.lock().unwrap();
        assert_eq!(
            seen[0].0,
            "https://media.example.org/original?media_file=u/attachments/audit.csv"
        );
        assert!(seen[0]
            .1
            .contains(&("Authorization".to_string(), "Token tok".to_string())));
    }

    #[tokio::test]
    async fn test_resolve_without_checkpoints() {
        let body = "node,start,end\n/f/other,1000,2000\n";
        let resolver = make_resolver(CannedTransport::new(Ok(body.to_string())));

        let outcome = resolver.resolve_detailed("audit.csv").await;
        assert_eq!(outcome, Resolution::NoCheckpoints);
        assert!(!outcome.is_failure());
        assert_eq!(resolver.resolve("audit.csv").await, None);
    }

    #[tokio::test]
    async fn test_resolve_not_found() {
        let resolver = make_resolver(CannedTransport::new(Err(TransportError::NotFound(
            "x".to_string(),
        ))));

        let outcome = resolver.resolve_detailed("audit.csv").await;
        assert_eq!(outcome, Resolution::NotFound);
        assert!(outcome.is_failure());
        assert_eq!(outcome.duration(), None);
    }

    #[tokio::test]
    async fn test_resolve_transport_error() {
        let resolver = make_resolver(CannedTransport::new(Err(TransportError::Status(
            502,
            "bad gateway".to_string(),
        ))));
        assert_eq!(resolver.resolve_detailed("audit.csv").await, Resolution::Failed);

        let resolver = make_resolver(CannedTransport::new(Err(TransportError::Timeout(
            "x".to_string(),
        ))));
        assert_eq!(resolver.resolve("audit.csv").await, None);
    }

    #[tokio::test]
    async fn test_resolve_malformed_body() {
        let resolver = make_resolver(CannedTransport::new(Ok("<html>login</html>".to_string())));
        assert_eq!(resolver.resolve_detailed("audit.csv").await, Resolution::Failed);
    }
}
