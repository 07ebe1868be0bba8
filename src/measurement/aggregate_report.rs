//! Aggregatable reports

use crate::measurement::event_report::{DebugReportStatus, ReportStatus};
use crate::measurement::{new_id, require_host, required};
use crate::Result;
use serde::Serialize;
use url::Url;

/// Default aggregation API version stamped on new reports
pub const DEFAULT_API_VERSION: &str = "0.1";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateReport {
    pub id: String,
    pub publisher: Url,
    pub attribution_destination: Url,
    pub source_registration_time: i64,
    pub scheduled_report_time: i64,
    pub enrollment_id: String,
    pub debug_cleartext_payload: Option<String>,
    pub status: ReportStatus,
    pub debug_report_status: DebugReportStatus,
    pub api_version: String,
    pub source_debug_key: Option<u64>,
    pub trigger_debug_key: Option<u64>,
    pub source_id: Option<String>,
    pub trigger_id: Option<String>,
    pub dedup_key: Option<u64>,
    pub registration_origin: Url,
}

impl AggregateReport {
    pub fn builder() -> AggregateReportBuilder {
        AggregateReportBuilder::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct AggregateReportBuilder {
    id: Option<String>,
    publisher: Option<Url>,
    attribution_destination: Option<Url>,
    source_registration_time: i64,
    scheduled_report_time: i64,
    enrollment_id: Option<String>,
    debug_cleartext_payload: Option<String>,
    status: ReportStatus,
    debug_report_status: DebugReportStatus,
    api_version: Option<String>,
    source_debug_key: Option<u64>,
    trigger_debug_key: Option<u64>,
    source_id: Option<String>,
    trigger_id: Option<String>,
    dedup_key: Option<u64>,
    registration_origin: Option<Url>,
}

impl AggregateReportBuilder {
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn publisher(mut self, publisher: Url) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn attribution_destination(mut self, destination: Url) -> Self {
        self.attribution_destination = Some(destination);
        self
    }

    pub fn source_registration_time(mut self, time: i64) -> Self {
        self.source_registration_time = time;
        self
    }

    pub fn scheduled_report_time(mut self, time: i64) -> Self {
        self.scheduled_report_time = time;
        self
    }

    pub fn enrollment_id(mut self, enrollment_id: impl Into<String>) -> Self {
        self.enrollment_id = Some(enrollment_id.into());
        self
    }

    pub fn debug_cleartext_payload(mut self, payload: impl Into<String>) -> Self {
        self.debug_cleartext_payload = Some(payload.into());
        self
    }

    pub fn status(mut self, status: ReportStatus) -> Self {
        self.status = status;
        self
    }

    pub fn debug_report_status(mut self, status: DebugReportStatus) -> Self {
        self.debug_report_status = status;
        self
    }

    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    pub fn source_debug_key(mut self, key: u64) -> Self {
        self.source_debug_key = Some(key);
        self
    }

    pub fn trigger_debug_key(mut self, key: u64) -> Self {
        self.trigger_debug_key = Some(key);
        self
    }

    pub fn source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    pub fn trigger_id(mut self, trigger_id: impl Into<String>) -> Self {
        self.trigger_id = Some(trigger_id.into());
        self
    }

    pub fn dedup_key(mut self, key: u64) -> Self {
        self.dedup_key = Some(key);
        self
    }

    pub fn registration_origin(mut self, origin: Url) -> Self {
        self.registration_origin = Some(origin);
        self
    }

    pub fn build(self) -> Result<AggregateReport> {
        let publisher = required(self.publisher, "AggregateReport", "publisher")?;
        let attribution_destination =
            required(self.attribution_destination, "AggregateReport", "attribution_destination")?;
        let enrollment_id = required(self.enrollment_id, "AggregateReport", "enrollment_id")?;
        let registration_origin =
            required(self.registration_origin, "AggregateReport", "registration_origin")?;
        require_host(&publisher, "AggregateReport", "publisher")?;
        require_host(&attribution_destination, "AggregateReport", "attribution_destination")?;

        Ok(AggregateReport {
            id: self.id.unwrap_or_else(new_id),
            publisher,
            attribution_destination,
            source_registration_time: self.source_registration_time,
            scheduled_report_time: self.scheduled_report_time,
            enrollment_id,
            debug_cleartext_payload: self.debug_cleartext_payload,
            status: self.status,
            debug_report_status: self.debug_report_status,
            api_version: self.api_version.unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            source_debug_key: self.source_debug_key,
            trigger_debug_key: self.trigger_debug_key,
            source_id: self.source_id,
            trigger_id: self.trigger_id,
            dedup_key: self.dedup_key,
            registration_origin,
        })
    }
}
