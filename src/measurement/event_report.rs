//! Event-level reports

use crate::measurement::source::SourceType;
use crate::measurement::{new_id, require_host, required};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// Delivery state shared by event and aggregate reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    #[default]
    Pending,
    Delivered,
    MarkedToDelete,
}

impl ReportStatus {
    pub fn as_i64(&self) -> i64 {
        match self {
            ReportStatus::Pending => 0,
            ReportStatus::Delivered => 1,
            ReportStatus::MarkedToDelete => 2,
        }
    }

    pub fn from_i64(value: i64) -> Result<Self> {
        match value {
            0 => Ok(ReportStatus::Pending),
            1 => Ok(ReportStatus::Delivered),
            2 => Ok(ReportStatus::MarkedToDelete),
            _ => Err(Error::Validation(format!("Unknown report status: {}", value))),
        }
    }
}

/// Delivery state of the debug copy of a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebugReportStatus {
    #[default]
    None,
    Pending,
    Delivered,
}

impl DebugReportStatus {
    pub fn as_i64(&self) -> i64 {
        match self {
            DebugReportStatus::None => 0,
            DebugReportStatus::Pending => 1,
            DebugReportStatus::Delivered => 2,
        }
    }

    pub fn from_i64(value: i64) -> Result<Self> {
        match value {
            0 => Ok(DebugReportStatus::None),
            1 => Ok(DebugReportStatus::Pending),
            2 => Ok(DebugReportStatus::Delivered),
            _ => Err(Error::Validation(format!("Unknown debug report status: {}", value))),
        }
    }
}

/// One generated event-level report.
///
/// `source_id`/`trigger_id` are absent for reports fabricated by noising.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventReport {
    pub id: String,
    pub source_event_id: u64,
    pub enrollment_id: String,
    pub attribution_destinations: Vec<Url>,
    pub report_time: i64,
    pub trigger_data: u64,
    pub trigger_priority: i64,
    pub trigger_dedup_key: Option<u64>,
    pub trigger_time: i64,
    pub status: ReportStatus,
    pub debug_report_status: DebugReportStatus,
    pub source_type: SourceType,
    pub randomized_trigger_rate: f64,
    pub source_debug_key: Option<u64>,
    pub trigger_debug_key: Option<u64>,
    pub source_id: Option<String>,
    pub trigger_id: Option<String>,
    pub registration_origin: Url,
}

impl EventReport {
    pub fn builder() -> EventReportBuilder {
        EventReportBuilder::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventReportBuilder {
    id: Option<String>,
    source_event_id: u64,
    enrollment_id: Option<String>,
    attribution_destinations: Vec<Url>,
    report_time: i64,
    trigger_data: u64,
    trigger_priority: i64,
    trigger_dedup_key: Option<u64>,
    trigger_time: i64,
    status: ReportStatus,
    debug_report_status: DebugReportStatus,
    source_type: SourceType,
    randomized_trigger_rate: f64,
    source_debug_key: Option<u64>,
    trigger_debug_key: Option<u64>,
    source_id: Option<String>,
    trigger_id: Option<String>,
    registration_origin: Option<Url>,
}

impl EventReportBuilder {
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn source_event_id(mut self, event_id: u64) -> Self {
        self.source_event_id = event_id;
        self
    }

    pub fn enrollment_id(mut self, enrollment_id: impl Into<String>) -> Self {
        self.enrollment_id = Some(enrollment_id.into());
        self
    }

    pub fn attribution_destinations(mut self, destinations: Vec<Url>) -> Self {
        self.attribution_destinations = destinations;
        self
    }

    pub fn report_time(mut self, report_time: i64) -> Self {
        self.report_time = report_time;
        self
    }

    pub fn trigger_data(mut self, trigger_data: u64) -> Self {
        self.trigger_data = trigger_data;
        self
    }

    pub fn trigger_priority(mut self, priority: i64) -> Self {
        self.trigger_priority = priority;
        self
    }

    pub fn trigger_dedup_key(mut self, key: u64) -> Self {
        self.trigger_dedup_key = Some(key);
        self
    }

    pub fn trigger_time(mut self, trigger_time: i64) -> Self {
        self.trigger_time = trigger_time;
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

    pub fn source_type(mut self, source_type: SourceType) -> Self {
        self.source_type = source_type;
        self
    }

    pub fn randomized_trigger_rate(mut self, rate: f64) -> Self {
        self.randomized_trigger_rate = rate;
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

    pub fn registration_origin(mut self, origin: Url) -> Self {
        self.registration_origin = Some(origin);
        self
    }

    pub fn build(self) -> Result<EventReport> {
        let enrollment_id = required(self.enrollment_id, "EventReport", "enrollment_id")?;
        let registration_origin =
            required(self.registration_origin, "EventReport", "registration_origin")?;
        if self.attribution_destinations.is_empty() {
            return Err(Error::Validation(
                "EventReport needs at least one attribution destination".to_string(),
            ));
        }
        for destination in &self.attribution_destinations {
            require_host(destination, "EventReport", "attribution_destination")?;
        }

        Ok(EventReport {
            id: self.id.unwrap_or_else(new_id),
            source_event_id: self.source_event_id,
            enrollment_id,
            attribution_destinations: self.attribution_destinations,
            report_time: self.report_time,
            trigger_data: self.trigger_data,
            trigger_priority: self.trigger_priority,
            trigger_dedup_key: self.trigger_dedup_key,
            trigger_time: self.trigger_time,
            status: self.status,
            debug_report_status: self.debug_report_status,
            source_type: self.source_type,
            randomized_trigger_rate: self.randomized_trigger_rate,
            source_debug_key: self.source_debug_key,
            trigger_debug_key: self.trigger_debug_key,
            source_id: self.source_id,
            trigger_id: self.trigger_id,
            registration_origin,
        })
    }
}
