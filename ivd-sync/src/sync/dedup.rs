//! Selection of records not yet persisted

use std::collections::HashSet;

use ivd_common::SubmissionRecord;

/// Keep the fetched records whose key is not already stored
///
/// Order of `fetched` is preserved.
pub fn filter_new(
    fetched: Vec<SubmissionRecord>,
    existing_keys: &HashSet<String>,
) -> Vec<SubmissionRecord> {
    if existing_keys.is_empty() {
        return fetched;
    }

    fetched
        .into_iter()
        .filter(|record| !existing_keys.contains(&record.key))
        .collect()
}
