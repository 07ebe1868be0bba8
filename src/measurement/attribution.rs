//! Attribution - rate-limit ledger row written once per successful attribution

use crate::measurement::{new_id, required, Source, Trigger};
use crate::site::{origin_of, Site};
use crate::{Error, Result};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribution {
    pub id: String,
    pub source_site: Site,
    pub source_origin: String,
    pub destination_site: Site,
    pub destination_origin: String,
    pub enrollment_id: String,
    pub trigger_time: i64,
    pub registrant: String,
    pub source_id: Option<String>,
    pub trigger_id: Option<String>,
}

impl Attribution {
    pub fn builder() -> AttributionBuilder {
        AttributionBuilder::default()
    }

    /// Ledger row for `trigger` being attributed to `source`
    pub fn for_pair(source: &Source, trigger: &Trigger) -> Result<Self> {
        Self::builder()
            .source_site(source.publisher_site()?)
            .source_origin(origin_of(&source.publisher)?)
            .destination_site(trigger.destination_site()?)
            .destination_origin(origin_of(&trigger.attribution_destination)?)
            .enrollment_id(trigger.enrollment_id.clone())
            .trigger_time(trigger.trigger_time)
            .registrant(trigger.registrant.to_string())
            .source_id(source.id.clone())
            .trigger_id(trigger.id.clone())
            .build()
    }
}

#[derive(Debug, Clone, Default)]
pub struct AttributionBuilder {
    id: Option<String>,
    source_site: Option<Site>,
    source_origin: Option<String>,
    destination_site: Option<Site>,
    destination_origin: Option<String>,
    enrollment_id: Option<String>,
    trigger_time: i64,
    registrant: Option<String>,
    source_id: Option<String>,
    trigger_id: Option<String>,
}

impl AttributionBuilder {
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn source_site(mut self, site: Site) -> Self {
        self.source_site = Some(site);
        self
    }

    pub fn source_origin(mut self, origin: impl Into<String>) -> Self {
        self.source_origin = Some(origin.into());
        self
    }

    pub fn destination_site(mut self, site: Site) -> Self {
        self.destination_site = Some(site);
        self
    }

    pub fn destination_origin(mut self, origin: impl Into<String>) -> Self {
        self.destination_origin = Some(origin.into());
        self
    }

    pub fn enrollment_id(mut self, enrollment_id: impl Into<String>) -> Self {
        self.enrollment_id = Some(enrollment_id.into());
        self
    }

    pub fn trigger_time(mut self, trigger_time: i64) -> Self {
        self.trigger_time = trigger_time;
        self
    }

    pub fn registrant(mut self, registrant: impl Into<String>) -> Self {
        self.registrant = Some(registrant.into());
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

    pub fn build(self) -> Result<Attribution> {
        let source_site = required(self.source_site, "Attribution", "source_site")?;
        let destination_site = required(self.destination_site, "Attribution", "destination_site")?;
        let enrollment_id = required(self.enrollment_id, "Attribution", "enrollment_id")?;
        let registrant = required(self.registrant, "Attribution", "registrant")?;
        if enrollment_id.is_empty() {
            return Err(Error::Validation("Attribution enrollment_id is empty".to_string()));
        }

        Ok(Attribution {
            id: self.id.unwrap_or_else(new_id),
            source_origin: self.source_origin.unwrap_or_else(|| source_site.to_string()),
            source_site,
            destination_origin: self.destination_origin.unwrap_or_else(|| destination_site.to_string()),
            destination_site,
            enrollment_id,
            trigger_time: self.trigger_time,
            registrant,
            source_id: self.source_id,
            trigger_id: self.trigger_id,
        })
    }
}
