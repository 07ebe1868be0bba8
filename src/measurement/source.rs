//! Source - an ad exposure (impression or click)

use crate::measurement::{new_id, require_host, required};
use crate::site::{Site, SurfaceType};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Default source lifetime when no expiry is supplied: 30 days
pub const DEFAULT_EXPIRY_MS: i64 = 30 * 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    #[default]
    Active,
    Ignored,
    MarkedToDelete,
}

impl SourceStatus {
    pub fn as_i64(&self) -> i64 {
        match self {
            SourceStatus::Active => 0,
            SourceStatus::Ignored => 1,
            SourceStatus::MarkedToDelete => 2,
        }
    }

    pub fn from_i64(value: i64) -> Result<Self> {
        match value {
            0 => Ok(SourceStatus::Active),
            1 => Ok(SourceStatus::Ignored),
            2 => Ok(SourceStatus::MarkedToDelete),
            _ => Err(Error::Validation(format!("Unknown source status: {}", value))),
        }
    }
}

/// Whether the exposure was a view or a click
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    #[default]
    Event,
    Navigation,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Event => "event",
            SourceType::Navigation => "navigation",
        }
    }
}

impl FromStr for SourceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "event" => Ok(SourceType::Event),
            "navigation" => Ok(SourceType::Navigation),
            _ => Err(Error::Validation(format!("Unknown source type: {}", s))),
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of the noising step applied at registration time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributionMode {
    #[default]
    Unassigned,
    Truthfully,
    Never,
    Falsely,
}

impl AttributionMode {
    pub fn as_i64(&self) -> i64 {
        match self {
            AttributionMode::Unassigned => 0,
            AttributionMode::Truthfully => 1,
            AttributionMode::Never => 2,
            AttributionMode::Falsely => 3,
        }
    }

    pub fn from_i64(value: i64) -> Result<Self> {
        match value {
            0 => Ok(AttributionMode::Unassigned),
            1 => Ok(AttributionMode::Truthfully),
            2 => Ok(AttributionMode::Never),
            3 => Ok(AttributionMode::Falsely),
            _ => Err(Error::Validation(format!("Unknown attribution mode: {}", value))),
        }
    }
}

/// An ad exposure registered by a publisher.
///
/// Destinations live in their own table; `app_destinations` and
/// `web_destinations` are empty on sources returned from cross-network
/// lookups.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Source {
    pub id: String,
    pub event_id: u64,
    pub publisher: Url,
    pub publisher_type: SurfaceType,
    pub app_destinations: Vec<Url>,
    pub web_destinations: Vec<Url>,
    pub enrollment_id: String,
    pub registrant: Url,
    pub event_time: i64,
    pub expiry_time: i64,
    pub event_report_window: i64,
    pub aggregatable_report_window: i64,
    pub priority: i64,
    pub status: SourceStatus,
    pub source_type: SourceType,
    pub attribution_mode: AttributionMode,
    pub install_attribution_window: i64,
    pub install_cooldown_window: i64,
    pub is_install_attributed: bool,
    pub install_time: Option<i64>,
    pub event_report_dedup_keys: Vec<u64>,
    pub aggregate_report_dedup_keys: Vec<u64>,
    pub registration_id: Option<String>,
    pub registration_origin: Url,
    pub shared_aggregation_keys: Option<String>,
    pub filter_data: Option<String>,
    pub aggregate_source: Option<String>,
    pub aggregate_contributions: i64,
    pub debug_key: Option<u64>,
    pub debug_reporting: bool,
    pub ad_id_permission: bool,
    pub ar_debug_permission: bool,
    pub debug_join_key: Option<String>,
    pub platform_ad_id: Option<String>,
    pub debug_ad_id: Option<String>,
}

impl Source {
    pub fn builder() -> SourceBuilder {
        SourceBuilder::default()
    }

    /// Site of the publisher on its own surface
    pub fn publisher_site(&self) -> Result<Site> {
        Site::of(&self.publisher, self.publisher_type)
    }

    /// Declared destinations of one surface
    pub fn destinations(&self, surface: SurfaceType) -> &[Url] {
        match surface {
            SurfaceType::App => &self.app_destinations,
            SurfaceType::Web => &self.web_destinations,
        }
    }

    /// Whether `time` falls inside `[event_time, expiry_time]`
    pub fn is_live_at(&self, time: i64) -> bool {
        self.event_time <= time && time <= self.expiry_time
    }

    /// Copy of this source without its destination lists
    pub fn without_destinations(mut self) -> Self {
        self.app_destinations.clear();
        self.web_destinations.clear();
        self
    }
}

/// Builder for [`Source`]; `build()` enforces required fields and
/// `event_time <= expiry_time`.
#[derive(Debug, Clone, Default)]
pub struct SourceBuilder {
    id: Option<String>,
    event_id: u64,
    publisher: Option<Url>,
    publisher_type: Option<SurfaceType>,
    app_destinations: Vec<Url>,
    web_destinations: Vec<Url>,
    enrollment_id: Option<String>,
    registrant: Option<Url>,
    event_time: i64,
    expiry_time: Option<i64>,
    event_report_window: Option<i64>,
    aggregatable_report_window: Option<i64>,
    priority: i64,
    status: SourceStatus,
    source_type: SourceType,
    attribution_mode: AttributionMode,
    install_attribution_window: i64,
    install_cooldown_window: i64,
    is_install_attributed: bool,
    install_time: Option<i64>,
    event_report_dedup_keys: Vec<u64>,
    aggregate_report_dedup_keys: Vec<u64>,
    registration_id: Option<String>,
    registration_origin: Option<Url>,
    shared_aggregation_keys: Option<String>,
    filter_data: Option<String>,
    aggregate_source: Option<String>,
    aggregate_contributions: i64,
    debug_key: Option<u64>,
    debug_reporting: bool,
    ad_id_permission: bool,
    ar_debug_permission: bool,
    debug_join_key: Option<String>,
    platform_ad_id: Option<String>,
    debug_ad_id: Option<String>,
}

impl SourceBuilder {
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn event_id(mut self, event_id: u64) -> Self {
        self.event_id = event_id;
        self
    }

    /// Publisher URI; the surface is inferred from the scheme unless set
    pub fn publisher(mut self, publisher: Url) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn publisher_type(mut self, surface: SurfaceType) -> Self {
        self.publisher_type = Some(surface);
        self
    }

    pub fn app_destinations(mut self, destinations: Vec<Url>) -> Self {
        self.app_destinations = destinations;
        self
    }

    pub fn web_destinations(mut self, destinations: Vec<Url>) -> Self {
        self.web_destinations = destinations;
        self
    }

    pub fn enrollment_id(mut self, enrollment_id: impl Into<String>) -> Self {
        self.enrollment_id = Some(enrollment_id.into());
        self
    }

    pub fn registrant(mut self, registrant: Url) -> Self {
        self.registrant = Some(registrant);
        self
    }

    pub fn event_time(mut self, event_time: i64) -> Self {
        self.event_time = event_time;
        self
    }

    pub fn expiry_time(mut self, expiry_time: i64) -> Self {
        self.expiry_time = Some(expiry_time);
        self
    }

    pub fn event_report_window(mut self, window: i64) -> Self {
        self.event_report_window = Some(window);
        self
    }

    pub fn aggregatable_report_window(mut self, window: i64) -> Self {
        self.aggregatable_report_window = Some(window);
        self
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn status(mut self, status: SourceStatus) -> Self {
        self.status = status;
        self
    }

    pub fn source_type(mut self, source_type: SourceType) -> Self {
        self.source_type = source_type;
        self
    }

    pub fn attribution_mode(mut self, mode: AttributionMode) -> Self {
        self.attribution_mode = mode;
        self
    }

    pub fn install_attribution_window(mut self, window: i64) -> Self {
        self.install_attribution_window = window;
        self
    }

    pub fn install_cooldown_window(mut self, window: i64) -> Self {
        self.install_cooldown_window = window;
        self
    }

    pub fn install_attributed(mut self, install_time: Option<i64>) -> Self {
        self.is_install_attributed = install_time.is_some();
        self.install_time = install_time;
        self
    }

    pub fn event_report_dedup_keys(mut self, keys: Vec<u64>) -> Self {
        self.event_report_dedup_keys = keys;
        self
    }

    pub fn aggregate_report_dedup_keys(mut self, keys: Vec<u64>) -> Self {
        self.aggregate_report_dedup_keys = keys;
        self
    }

    pub fn registration_id(mut self, registration_id: impl Into<String>) -> Self {
        self.registration_id = Some(registration_id.into());
        self
    }

    pub fn registration_origin(mut self, origin: Url) -> Self {
        self.registration_origin = Some(origin);
        self
    }

    pub fn shared_aggregation_keys(mut self, keys: impl Into<String>) -> Self {
        self.shared_aggregation_keys = Some(keys.into());
        self
    }

    pub fn filter_data(mut self, filter_data: impl Into<String>) -> Self {
        self.filter_data = Some(filter_data.into());
        self
    }

    pub fn aggregate_source(mut self, aggregate_source: impl Into<String>) -> Self {
        self.aggregate_source = Some(aggregate_source.into());
        self
    }

    pub fn aggregate_contributions(mut self, contributions: i64) -> Self {
        self.aggregate_contributions = contributions;
        self
    }

    pub fn debug_key(mut self, debug_key: u64) -> Self {
        self.debug_key = Some(debug_key);
        self
    }

    pub fn debug_reporting(mut self, enabled: bool) -> Self {
        self.debug_reporting = enabled;
        self
    }

    pub fn ad_id_permission(mut self, granted: bool) -> Self {
        self.ad_id_permission = granted;
        self
    }

    pub fn ar_debug_permission(mut self, granted: bool) -> Self {
        self.ar_debug_permission = granted;
        self
    }

    pub fn debug_join_key(mut self, key: impl Into<String>) -> Self {
        self.debug_join_key = Some(key.into());
        self
    }

    pub fn platform_ad_id(mut self, ad_id: impl Into<String>) -> Self {
        self.platform_ad_id = Some(ad_id.into());
        self
    }

    pub fn debug_ad_id(mut self, ad_id: impl Into<String>) -> Self {
        self.debug_ad_id = Some(ad_id.into());
        self
    }

    pub fn build(self) -> Result<Source> {
        let publisher = required(self.publisher, "Source", "publisher")?;
        let registrant = required(self.registrant, "Source", "registrant")?;
        let registration_origin = required(self.registration_origin, "Source", "registration_origin")?;
        let enrollment_id = required(self.enrollment_id, "Source", "enrollment_id")?;

        require_host(&publisher, "Source", "publisher")?;
        require_host(&registrant, "Source", "registrant")?;
        require_host(&registration_origin, "Source", "registration_origin")?;
        for destination in self.app_destinations.iter().chain(&self.web_destinations) {
            require_host(destination, "Source", "destination")?;
        }
        if enrollment_id.is_empty() {
            return Err(Error::Validation("Source enrollment_id is empty".to_string()));
        }

        let expiry_time = self.expiry_time.unwrap_or(self.event_time + DEFAULT_EXPIRY_MS);
        if self.event_time > expiry_time {
            return Err(Error::Validation(format!(
                "Source event_time {} is after expiry_time {}",
                self.event_time, expiry_time
            )));
        }

        Ok(Source {
            id: self.id.unwrap_or_else(new_id),
            event_id: self.event_id,
            publisher_type: self.publisher_type.unwrap_or_else(|| SurfaceType::infer(&publisher)),
            publisher,
            app_destinations: self.app_destinations,
            web_destinations: self.web_destinations,
            enrollment_id,
            registrant,
            event_time: self.event_time,
            expiry_time,
            event_report_window: self.event_report_window.unwrap_or(expiry_time),
            aggregatable_report_window: self.aggregatable_report_window.unwrap_or(expiry_time),
            priority: self.priority,
            status: self.status,
            source_type: self.source_type,
            attribution_mode: self.attribution_mode,
            install_attribution_window: self.install_attribution_window,
            install_cooldown_window: self.install_cooldown_window,
            is_install_attributed: self.is_install_attributed,
            install_time: self.install_time,
            event_report_dedup_keys: self.event_report_dedup_keys,
            aggregate_report_dedup_keys: self.aggregate_report_dedup_keys,
            registration_id: self.registration_id,
            registration_origin,
            shared_aggregation_keys: self.shared_aggregation_keys,
            filter_data: self.filter_data,
            aggregate_source: self.aggregate_source,
            aggregate_contributions: self.aggregate_contributions,
            debug_key: self.debug_key,
            debug_reporting: self.debug_reporting,
            ad_id_permission: self.ad_id_permission,
            ar_debug_permission: self.ar_debug_permission,
            debug_join_key: self.debug_join_key,
            platform_ad_id: self.platform_ad_id,
            debug_ad_id: self.debug_ad_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::parse_uri;

    fn minimal() -> SourceBuilder {
        Source::builder()
            .publisher(parse_uri("android-app://com.publisher").unwrap())
            .registrant(parse_uri("android-app://com.publisher").unwrap())
            .registration_origin(parse_uri("https://adtech.test").unwrap())
            .enrollment_id("enrollment-1")
            .app_destinations(vec![parse_uri("android-app://com.advertiser").unwrap()])
    }

    #[test]
    fn test_build_fills_defaults() {
        let source = minimal().event_time(1_000).build().unwrap();
        assert!(!source.id.is_empty());
        assert_eq!(source.publisher_type, SurfaceType::App);
        assert_eq!(source.expiry_time, 1_000 + DEFAULT_EXPIRY_MS);
        assert_eq!(source.status, SourceStatus::Active);
        assert_eq!(source.event_report_window, source.expiry_time);
    }

    #[test]
    fn test_missing_required_field() {
        let err = Source::builder()
            .publisher(parse_uri("https://publisher.test").unwrap())
            .enrollment_id("e")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_event_time_after_expiry_rejected() {
        let err = minimal().event_time(30).expiry_time(20).build().unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_live_window_is_inclusive() {
        let source = minimal().event_time(10).expiry_time(20).build().unwrap();
        assert!(source.is_live_at(10));
        assert!(source.is_live_at(20));
        assert!(!source.is_live_at(21));
    }

    #[test]
    fn test_status_codes() {
        for status in [SourceStatus::Active, SourceStatus::Ignored, SourceStatus::MarkedToDelete] {
            assert_eq!(SourceStatus::from_i64(status.as_i64()).unwrap(), status);
        }
        assert!(SourceStatus::from_i64(9).is_err());
    }
}
