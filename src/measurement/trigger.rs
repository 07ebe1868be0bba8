//! Trigger - a conversion event on an advertiser destination

use crate::measurement::{new_id, require_host, required};
use crate::site::{Site, SurfaceType};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerStatus {
    #[default]
    Pending,
    Ignored,
    Attributed,
    MarkedToDelete,
}

impl TriggerStatus {
    pub fn as_i64(&self) -> i64 {
        match self {
            TriggerStatus::Pending => 0,
            TriggerStatus::Ignored => 1,
            TriggerStatus::Attributed => 2,
            TriggerStatus::MarkedToDelete => 3,
        }
    }

    pub fn from_i64(value: i64) -> Result<Self> {
        match value {
            0 => Ok(TriggerStatus::Pending),
            1 => Ok(TriggerStatus::Ignored),
            2 => Ok(TriggerStatus::Attributed),
            3 => Ok(TriggerStatus::MarkedToDelete),
            _ => Err(Error::Validation(format!("Unknown trigger status: {}", value))),
        }
    }
}

/// A conversion registered on an advertiser app or site.
///
/// Registration payloads (`event_triggers`, `aggregate_*`, filters) are kept as the
/// JSON text they were registered with; only the attribution pipeline
/// interprets them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trigger {
    pub id: String,
    pub attribution_destination: Url,
    pub destination_type: SurfaceType,
    pub enrollment_id: String,
    pub registrant: Url,
    pub registration_origin: Url,
    pub trigger_time: i64,
    pub status: TriggerStatus,
    pub event_triggers: String,
    pub aggregate_trigger_data: Option<String>,
    pub aggregate_values: Option<String>,
    pub aggregatable_deduplication_keys: Option<String>,
    pub filters: Option<String>,
    pub not_filters: Option<String>,
    pub attribution_config: Option<String>,
    pub x_network_key_mapping: Option<String>,
    pub debug_key: Option<u64>,
    pub debug_reporting: bool,
    pub ad_id_permission: bool,
    pub ar_debug_permission: bool,
    pub debug_join_key: Option<String>,
    pub platform_ad_id: Option<String>,
    pub debug_ad_id: Option<String>,
}

impl Trigger {
    pub fn builder() -> TriggerBuilder {
        TriggerBuilder::default()
    }

    /// Site of the attribution destination on the trigger's surface
    pub fn destination_site(&self) -> Result<Site> {
        Site::of(&self.attribution_destination, self.destination_type)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TriggerBuilder {
    id: Option<String>,
    attribution_destination: Option<Url>,
    destination_type: Option<SurfaceType>,
    enrollment_id: Option<String>,
    registrant: Option<Url>,
    registration_origin: Option<Url>,
    trigger_time: i64,
    status: TriggerStatus,
    event_triggers: Option<String>,
    aggregate_trigger_data: Option<String>,
    aggregate_values: Option<String>,
    aggregatable_deduplication_keys: Option<String>,
    filters: Option<String>,
    not_filters: Option<String>,
    attribution_config: Option<String>,
    x_network_key_mapping: Option<String>,
    debug_key: Option<u64>,
    debug_reporting: bool,
    ad_id_permission: bool,
    ar_debug_permission: bool,
    debug_join_key: Option<String>,
    platform_ad_id: Option<String>,
    debug_ad_id: Option<String>,
}

impl TriggerBuilder {
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Destination URI; the surface is inferred from the scheme unless set
    pub fn attribution_destination(mut self, destination: Url) -> Self {
        self.attribution_destination = Some(destination);
        self
    }

    pub fn destination_type(mut self, surface: SurfaceType) -> Self {
        self.destination_type = Some(surface);
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

    pub fn registration_origin(mut self, origin: Url) -> Self {
        self.registration_origin = Some(origin);
        self
    }

    pub fn trigger_time(mut self, trigger_time: i64) -> Self {
        self.trigger_time = trigger_time;
        self
    }

    pub fn status(mut self, status: TriggerStatus) -> Self {
        self.status = status;
        self
    }

    pub fn event_triggers(mut self, json: impl Into<String>) -> Self {
        self.event_triggers = Some(json.into());
        self
    }

    pub fn aggregate_trigger_data(mut self, json: impl Into<String>) -> Self {
        self.aggregate_trigger_data = Some(json.into());
        self
    }

    pub fn aggregate_values(mut self, json: impl Into<String>) -> Self {
        self.aggregate_values = Some(json.into());
        self
    }

    pub fn aggregatable_deduplication_keys(mut self, json: impl Into<String>) -> Self {
        self.aggregatable_deduplication_keys = Some(json.into());
        self
    }

    pub fn filters(mut self, json: impl Into<String>) -> Self {
        self.filters = Some(json.into());
        self
    }

    pub fn not_filters(mut self, json: impl Into<String>) -> Self {
        self.not_filters = Some(json.into());
        self
    }

    pub fn attribution_config(mut self, json: impl Into<String>) -> Self {
        self.attribution_config = Some(json.into());
        self
    }

    pub fn x_network_key_mapping(mut self, json: impl Into<String>) -> Self {
        self.x_network_key_mapping = Some(json.into());
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

    pub fn build(self) -> Result<Trigger> {
        let attribution_destination =
            required(self.attribution_destination, "Trigger", "attribution_destination")?;
        let enrollment_id = required(self.enrollment_id, "Trigger", "enrollment_id")?;
        let registrant = required(self.registrant, "Trigger", "registrant")?;
        let registration_origin = required(self.registration_origin, "Trigger", "registration_origin")?;

        require_host(&attribution_destination, "Trigger", "attribution_destination")?;
        require_host(&registrant, "Trigger", "registrant")?;
        require_host(&registration_origin, "Trigger", "registration_origin")?;
        if enrollment_id.is_empty() {
            return Err(Error::Validation("Trigger enrollment_id is empty".to_string()));
        }

        Ok(Trigger {
            id: self.id.unwrap_or_else(new_id),
            destination_type: self
                .destination_type
                .unwrap_or_else(|| SurfaceType::infer(&attribution_destination)),
            attribution_destination,
            enrollment_id,
            registrant,
            registration_origin,
            trigger_time: self.trigger_time,
            status: self.status,
            event_triggers: self.event_triggers.unwrap_or_else(|| "[]".to_string()),
            aggregate_trigger_data: self.aggregate_trigger_data,
            aggregate_values: self.aggregate_values,
            aggregatable_deduplication_keys: self.aggregatable_deduplication_keys,
            filters: self.filters,
            not_filters: self.not_filters,
            attribution_config: self.attribution_config,
            x_network_key_mapping: self.x_network_key_mapping,
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

    #[test]
    fn test_build_infers_surface() {
        let trigger = Trigger::builder()
            .attribution_destination(parse_uri("https://shop.advertiser.test/checkout").unwrap())
            .registrant(parse_uri("android-app://com.browser").unwrap())
            .registration_origin(parse_uri("https://adtech.test").unwrap())
            .enrollment_id("enrollment-1")
            .trigger_time(5)
            .build()
            .unwrap();
        assert_eq!(trigger.destination_type, SurfaceType::Web);
        assert_eq!(trigger.destination_site().unwrap().as_str(), "https://advertiser.test");
        assert_eq!(trigger.event_triggers, "[]");
    }

    #[test]
    fn test_missing_destination_rejected() {
        let err = Trigger::builder().enrollment_id("e").build().unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
