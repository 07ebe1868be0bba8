//! Measurement records
//!
//! Typed representations of every row the datastore persists. Records are
//! constructed through builders whose `build()` validates required fields,
//! so a record that reaches the DAO is always complete.

pub mod source;
pub mod trigger;
pub mod event_report;
pub mod aggregate_report;
pub mod attribution;
pub mod async_registration;
pub mod encryption_key;
pub mod debug_report;
pub mod key_value;

pub use source::{AttributionMode, Source, SourceBuilder, SourceStatus, SourceType};
pub use trigger::{Trigger, TriggerBuilder, TriggerStatus};
pub use event_report::{DebugReportStatus, EventReport, EventReportBuilder, ReportStatus};
pub use aggregate_report::{AggregateReport, AggregateReportBuilder};
pub use attribution::{Attribution, AttributionBuilder};
pub use async_registration::{AsyncRegistration, AsyncRegistrationBuilder, RegistrationType};
pub use encryption_key::AggregateEncryptionKey;
pub use debug_report::DebugReport;
pub use key_value::{DataType, KeyValueData};

use crate::{Error, Result};
use url::Url;

/// Generate a fresh record id
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Unwrap a required builder field or fail with a validation error
pub(crate) fn required<T>(value: Option<T>, record: &str, field: &str) -> Result<T> {
    value.ok_or_else(|| Error::Validation(format!("{} is missing required field `{}`", record, field)))
}

/// Reject URIs that cannot be resolved to a site
pub(crate) fn require_host(uri: &Url, record: &str, field: &str) -> Result<()> {
    match uri.host_str() {
        Some(host) if !host.is_empty() => Ok(()),
        _ => Err(Error::Validation(format!("{} field `{}` has no host: {}", record, field, uri))),
    }
}

/// 64-bit unsigned values are stored bit-for-bit in INTEGER columns
pub(crate) fn u64_to_sql(value: u64) -> i64 {
    value as i64
}

pub(crate) fn u64_from_sql(value: i64) -> u64 {
    value as u64
}

/// Comma-separated encoding for dedup-key lists
pub(crate) fn join_u64_list(values: &[u64]) -> String {
    values.iter().map(u64::to_string).collect::<Vec<_>>().join(",")
}

pub(crate) fn parse_u64_list(encoded: Option<&str>) -> Result<Vec<u64>> {
    let Some(encoded) = encoded else {
        return Ok(Vec::new());
    };
    encoded
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<u64>()
                .map_err(|_| Error::Validation(format!("Invalid unsigned value: {}", part)))
        })
        .collect()
}
