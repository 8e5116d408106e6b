//! Submission fetching and decoding
//!
//! Reads the form's data endpoint, following `next` links, and decodes each
//! result into a `SubmissionRecord`. Failures never escape `fetch_all`: the
//! caller gets an empty list and the error is logged.

use std::sync::Arc;

use ivd_common::config::KoboConfig;
use ivd_common::SubmissionRecord;
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::transport::{token_headers, Headers, HttpTransport, TransportError};

pub const KEY_FIELD: &str = "_uuid";
pub const ENUMERATOR_FIELD: &str = "metadata/enumerator_Id";
pub const ATTACHMENTS_FIELD: &str = "_attachments";

/// A submission that cannot be turned into a record
#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("Submission is not a JSON object")]
    NotAnObject,

    #[error("Submission is missing required field '{0}'")]
    MissingField(&'static str),
}

/// Fetch failures, reported only through logs
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Unusable payload: {0}")]
    Payload(String),

    #[error("Invalid submissions URL: {0}")]
    Url(String),
}

/// Paged result envelope of the data endpoint
#[derive(Debug, Deserialize)]
struct DataEnvelope {
    #[serde(default)]
    count: Option<u64>,
    #[serde(default)]
    next: Option<String>,
    results: Option<Vec<Value>>,
}

/// Decode one submission object
///
/// `_uuid` and the enumerator id are required. The enumerator id is read
/// from the flat `metadata/enumerator_Id` key, or from a nested
/// `metadata.enumerator_Id` object when the server groups fields.
pub fn decode_submission(item: &Value) -> Result<SubmissionRecord, DecodeError> {
    let object = item.as_object().ok_or(DecodeError::NotAnObject)?;

    let key = object
        .get(KEY_FIELD)
        .and_then(scalar_to_string)
        .ok_or(DecodeError::MissingField(KEY_FIELD))?;

    let enumerator_id = object
        .get(ENUMERATOR_FIELD)
        .or_else(|| item.pointer("/metadata/enumerator_Id"))
        .and_then(scalar_to_string)
        .ok_or(DecodeError::MissingField(ENUMERATOR_FIELD))?;

    let audit_locator = extract_audit_locator(object.get(ATTACHMENTS_FIELD));

    Ok(SubmissionRecord::new(key, enumerator_id, audit_locator))
}

/// Filename of the first attachment, if it has the expected shape
///
/// No attachments is the normal "no audit" case. A first attachment
/// without a string `filename` is logged and treated the same way.
pub fn extract_audit_locator(attachments: Option<&Value>) -> Option<String> {
    let first = attachments?.as_array()?.first()?;

    match first.get("filename").and_then(Value::as_str) {
        Some(filename) if !filename.is_empty() => Some(filename.to_string()),
        _ => {
            warn!(attachment = %first, "Invalid attachment format");
            None
        }
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Reads current submissions from the form server
pub struct SubmissionFetcher {
    transport: Arc<dyn HttpTransport>,
    server: String,
    form_uid: String,
    headers: Headers,
    max_pages: usize,
}

impl SubmissionFetcher {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        server: impl Into<String>,
        form_uid: impl Into<String>,
        headers: Headers,
        max_pages: usize,
    ) -> Self {
        Self {
            transport,
            server: server.into(),
            form_uid: form_uid.into(),
            headers,
            max_pages: max_pages.max(1),
        }
    }

    pub fn from_config(transport: Arc<dyn HttpTransport>, kobo: &KoboConfig) -> Self {
        Self::new(
            transport,
            kobo.server.clone(),
            kobo.form_uid.clone(),
            token_headers(&kobo.api_token),
            kobo.max_pages,
        )
    }

    /// First-page URL with the field projection and JSON format
    pub fn submissions_url(&self, fields: &[String]) -> Result<String, FetchError> {
        let base = format!(
            "{}/api/v2/assets/{}/data/",
            self.server.trim_end_matches('/'),
            self.form_uid
        );
        let projection =
            serde_json::to_string(fields).map_err(|e| FetchError::Url(e.to_string()))?;

        let mut url = Url::parse(&base).map_err(|e| FetchError::Url(format!("{}: {}", base, e)))?;
        url.query_pairs_mut()
            .append_pair("fields", &projection)
            .append_pair("format", "json");

        Ok(url.into())
    }

    /// Fetch every current submission, empty on failure
    pub async fn fetch_all(&self, fields: &[String]) -> Vec<SubmissionRecord> {
        match self.try_fetch_all(fields).await {
            Ok(records) => {
                info!(count = records.len(), "Fetched form submissions");
                records
            }
            Err(e) => {
                error!(error = %e, "Failed to fetch form submissions");
                Vec::new()
            }
        }
    }

    /// Fetch every current submission, reporting the first failure
    ///
    /// A record without its key or enumerator id fails the whole fetch.
    pub async fn try_fetch_all(&self, fields: &[String]) -> Result<Vec<SubmissionRecord>, FetchError> {
        let mut projection = fields.to_vec();
        if !projection.iter().any(|f| f == KEY_FIELD) {
            projection.push(KEY_FIELD.to_string());
        }

        let mut next_url = Some(self.submissions_url(&projection)?);
        let mut records = Vec::new();
        let mut pages = 0usize;

        while let Some(page_url) = next_url.take() {
            if pages >= self.max_pages {
                warn!(
                    max_pages = self.max_pages,
                    fetched = records.len(),
                    "Stopping pagination at page limit"
                );
                break;
            }

            let body = self.transport.get(&page_url, &self.headers).await?;
            let envelope: DataEnvelope =
                serde_json::from_str(&body).map_err(|e| FetchError::Payload(e.to_string()))?;
            let results = envelope
                .results
                .ok_or_else(|| FetchError::Payload("response has no 'results' array".to_string()))?;

            debug!(
                page = pages + 1,
                page_results = results.len(),
                total = ?envelope.count,
                "Fetched submissions page"
            );

            for item in &results {
                records.push(decode_submission(item)?);
            }

            next_url = envelope.next.filter(|n| !n.is_empty());
            pages += 1;
        }

        Ok(records)
    }
}
