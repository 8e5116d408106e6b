//! Audit trail parsing and interview duration computation
//!
//! An audit trail is a delimited table with at least `node`, `start` and
//! `end` columns, timestamps in epoch milliseconds. The duration is the time
//! between the first start checkpoint and the first end checkpoint seen
//! after it.

use thiserror::Error;

const MILLIS_PER_MINUTE: f64 = 60_000.0;

/// One row of an audit trail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    /// Instrumented checkpoint that fired
    pub node_id: String,
    /// Epoch milliseconds, absent when the cell is empty or unreadable
    pub start: Option<i64>,
    pub end: Option<i64>,
}

impl AuditEvent {
    pub fn new(node_id: impl Into<String>, start: Option<i64>, end: Option<i64>) -> Self {
        Self {
            node_id: node_id.into(),
            start,
            end,
        }
    }
}

/// Audit body decoding errors
#[derive(Debug, Error)]
pub enum AuditParseError {
    /// Header row lacks a required column
    #[error("Audit trail has no '{0}' column")]
    MissingColumn(&'static str),

    /// Delimited body could not be read
    #[error("Audit trail is not valid CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// Compute the elapsed minutes between two checkpoints
///
/// Scans in trail order. The first `start_node` row fixes the start; later
/// ones are ignored. `end_node` rows before that are ignored too. The first
/// `end_node` row after the start fixes the end and stops the scan. If the
/// checkpoint row that matched carries no timestamp, the result is `None`.
pub fn compute_duration(
    events: &[AuditEvent],
    start_node: &str,
    end_node: &str,
    precision: u32,
) -> Option<f64> {
    let mut start_ts: Option<i64> = None;
    let mut end_ts: Option<i64> = None;

    for event in events {
        match start_ts {
            None => {
                if event.node_id == start_node {
                    start_ts = Some(event.start?);
                }
            }
            Some(_) => {
                if event.node_id == end_node {
                    end_ts = Some(event.end?);
                    break;
                }
            }
        }
    }

    // Out-of-range timestamp pairs count as malformed
    let elapsed_ms = end_ts?.checked_sub(start_ts?)?;
    Some(round_to(elapsed_ms as f64 / MILLIS_PER_MINUTE, precision))
}

/// Round to `precision` decimal digits
pub fn round_to(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}

/// Decode a delimited audit body into events
///
/// Columns are located by header name, so extra columns and column order
/// do not matter. Short rows are tolerated.
pub fn parse_audit_csv(body: &str) -> Result<Vec<AuditEvent>, AuditParseError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());

    let headers = reader.headers()?.clone();
    let column = |name: &'static str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or(AuditParseError::MissingColumn(name))
    };
    let node_idx = column("node")?;
    let start_idx = column("start")?;
    let end_idx = column("end")?;

    let mut events = Vec::new();
    for record in reader.records() {
        let record = record?;
        events.push(AuditEvent {
            node_id: record.get(node_idx).unwrap_or_default().to_string(),
            start: parse_timestamp(record.get(start_idx)),
            end: parse_timestamp(record.get(end_idx)),
        });
    }

    Ok(events)
}

fn parse_timestamp(cell: Option<&str>) -> Option<i64> {
    cell.filter(|c| !c.is_empty()).and_then(|c| c.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const START: &str = "start";
    const END: &str = "end";

    fn ev(node: &str, start: Option<i64>, end: Option<i64>) -> AuditEvent {
        AuditEvent::new(node, start, end)
    }

    #[test]
    fn test_one_minute_between_checkpoints() {
        let events = vec![ev(START, Some(1000), None), ev(END, None, Some(61000))];
        assert_eq!(compute_duration(&events, START, END, 1), Some(1.0));
    }

    #[test]
    fn test_end_without_start_is_absent() {
        let events = vec![ev(END, None, Some(5000))];
        assert_eq!(compute_duration(&events, START, END, 1), None);
    }

    #[test]
    fn test_start_without_end_is_absent() {
        let events = vec![ev(START, Some(1000), None), ev("other", Some(2000), Some(3000))];
        assert_eq!(compute_duration(&events, START, END, 1), None);
    }

    #[test]
    fn test_empty_trail_is_absent() {
        assert_eq!(compute_duration(&[], START, END, 1), None);
    }

    #[test]
    fn test_reversed_checkpoints_are_absent() {
        let events = vec![ev(END, None, Some(61000)), ev(START, Some(1000), None)];
        assert_eq!(compute_duration(&events, START, END, 1), None);
    }

    #[test]
    fn test_end_before_start_does_not_stop_scan() {
        let events = vec![
            ev(END, None, Some(500)),
            ev(START, Some(1000), None),
            ev(END, None, Some(121000)),
        ];
        assert_eq!(compute_duration(&events, START, END, 1), Some(2.0));
    }

    #[test]
    fn test_first_start_wins() {
        let events = vec![
            ev(START, Some(0), None),
            ev(START, Some(30000), None),
            ev(END, None, Some(90000)),
        ];
        assert_eq!(compute_duration(&events, START, END, 1), Some(1.5));
    }

    #[test]
    fn test_first_end_after_start_short_circuits() {
        let events = vec![
            ev(START, Some(0), None),
            ev(END, None, Some(60000)),
            // never inspected: would be absent if it were
            ev(END, None, None),
            ev(END, None, Some(600000)),
        ];
        assert_eq!(compute_duration(&events, START, END, 1), Some(1.0));
    }

    #[test]
    fn test_missing_checkpoint_timestamp_is_absent() {
        let events = vec![ev(START, None, Some(1)), ev(END, None, Some(61000))];
        assert_eq!(compute_duration(&events, START, END, 1), None);

        let events = vec![ev(START, Some(1000), None), ev(END, Some(61000), None)];
        assert_eq!(compute_duration(&events, START, END, 1), None);
    }

    #[test]
    fn test_precision_rounding() {
        // 100 seconds = 1.6666... minutes
        let events = vec![ev(START, Some(0), None), ev(END, None, Some(100_000))];
        assert_eq!(compute_duration(&events, START, END, 0), Some(2.0));
        assert_eq!(compute_duration(&events, START, END, 1), Some(1.7));
        assert_eq!(compute_duration(&events, START, END, 2), Some(1.67));
    }

    #[test]
    fn test_parse_audit_csv() {
        let body = "event,node,start,end,old-value,new-value\n\
                    form start,,1000,,,\n\
                    question,/form/intro,1000,4000,,\"a, b\"\n\
                    question,/form/quality,4000,61000,,\n";

        let events = parse_audit_csv(body).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], ev("", Some(1000), None));
        assert_eq!(events[1], ev("/form/intro", Some(1000), Some(4000)));
        assert_eq!(events[2], ev("/form/quality", Some(4000), Some(61000)));

        assert_eq!(
            compute_duration(&events, "/form/intro", "/form/quality", 1),
            Some(1.0)
        );
    }

    #[test]
    fn test_parse_audit_csv_column_order_independent() {
        let body = "end,start,node\n61000,,b\n,1000,a\n";
        let events = parse_audit_csv(body).unwrap();
        assert_eq!(events[0], ev("b", None, Some(61000)));
        assert_eq!(events[1], ev("a", Some(1000), None));
    }

    #[test]
    fn test_parse_audit_csv_unreadable_timestamp_becomes_absent() {
        let body = "node,start,end\na,soon,\nb,,later\n";
        let events = parse_audit_csv(body).unwrap();
        assert_eq!(events[0].start, None);
        assert_eq!(events[1].end, None);
        assert_eq!(compute_duration(&events, "a", "b", 1), None);
    }

    #[test]
    fn test_extreme_timestamps_are_absent() {
        let body = "node,start,end\na,-9223372036854775808,\nb,,9223372036854775807\n";
        let events = parse_audit_csv(body).unwrap();
        assert_eq!(events[0].start, Some(i64::MIN));
        assert_eq!(events[1].end, Some(i64::MAX));
        assert_eq!(compute_duration(&events, "a", "b", 1), None);
    }

    #[test]
    fn test_parse_audit_csv_missing_column() {
        let body = "event,start,end\nform start,1,2\n";
        let err = parse_audit_csv(body).unwrap_err();
        assert!(matches!(err, AuditParseError::MissingColumn("node")));
    }
}
