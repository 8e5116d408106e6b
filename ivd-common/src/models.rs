//! Submission record shared between the sync pipeline and the read API

use serde::{Deserialize, Serialize};

/// One remote survey response
///
/// Built fresh from the remote snapshot each cycle. `duration_minutes` is
/// filled in at most once by the duration resolver before the record is
/// handed to storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    /// Remote-assigned unique identifier (`_uuid`)
    pub key: String,
    /// Field agent identifier (`metadata/enumerator_Id`)
    pub enumerator_id: String,
    /// Filename of the first attachment, used to fetch the audit trail
    pub audit_locator: Option<String>,
    /// Interview duration derived from the audit trail
    pub duration_minutes: Option<f64>,
}

impl SubmissionRecord {
    /// Create a record that has not been enriched yet
    pub fn new(
        key: impl Into<String>,
        enumerator_id: impl Into<String>,
        audit_locator: Option<String>,
    ) -> Self {
        Self {
            key: key.into(),
            enumerator_id: enumerator_id.into(),
            audit_locator,
            duration_minutes: None,
        }
    }
}
