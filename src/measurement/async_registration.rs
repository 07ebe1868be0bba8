//! Queued registration fetch jobs

use crate::measurement::source::SourceType;
use crate::measurement::{new_id, require_host, required};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistrationType {
    AppSource,
    AppTrigger,
    WebSource,
    WebTrigger,
}

impl RegistrationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationType::AppSource => "APP_SOURCE",
            RegistrationType::AppTrigger => "APP_TRIGGER",
            RegistrationType::WebSource => "WEB_SOURCE",
            RegistrationType::WebTrigger => "WEB_TRIGGER",
        }
    }

    pub fn is_source(&self) -> bool {
        matches!(self, RegistrationType::AppSource | RegistrationType::WebSource)
    }
}

impl FromStr for RegistrationType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "APP_SOURCE" => Ok(RegistrationType::AppSource),
            "APP_TRIGGER" => Ok(RegistrationType::AppTrigger),
            "WEB_SOURCE" => Ok(RegistrationType::WebSource),
            "WEB_TRIGGER" => Ok(RegistrationType::WebTrigger),
            _ => Err(Error::Validation(format!("Unknown registration type: {}", s))),
        }
    }
}

impl fmt::Display for RegistrationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A registration waiting to be fetched.
///
/// `registration_id` groups every hop of one redirect chain; the redirect
/// counter in key-value storage is keyed by it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AsyncRegistration {
    pub id: String,
    pub registration_uri: Url,
    pub top_origin: Option<Url>,
    pub web_destination: Option<Url>,
    pub os_destination: Option<Url>,
    pub verified_destination: Option<Url>,
    pub registrant: Url,
    pub source_type: Option<SourceType>,
    pub request_time: i64,
    pub retry_count: i64,
    pub registration_type: RegistrationType,
    pub debug_key_allowed: bool,
    pub ad_id_permission: bool,
    pub registration_id: String,
    pub platform_ad_id: Option<String>,
}

impl AsyncRegistration {
    pub fn builder() -> AsyncRegistrationBuilder {
        AsyncRegistrationBuilder::default()
    }

    pub fn increment_retry_count(&mut self) {
        self.retry_count += 1;
    }
}

#[derive(Debug, Clone, Default)]
pub struct AsyncRegistrationBuilder {
    id: Option<String>,
    registration_uri: Option<Url>,
    top_origin: Option<Url>,
    web_destination: Option<Url>,
    os_destination: Option<Url>,
    verified_destination: Option<Url>,
    registrant: Option<Url>,
    source_type: Option<SourceType>,
    request_time: i64,
    retry_count: i64,
    registration_type: Option<RegistrationType>,
    debug_key_allowed: bool,
    ad_id_permission: bool,
    registration_id: Option<String>,
    platform_ad_id: Option<String>,
}

impl AsyncRegistrationBuilder {
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn registration_uri(mut self, uri: Url) -> Self {
        self.registration_uri = Some(uri);
        self
    }

    pub fn top_origin(mut self, origin: Url) -> Self {
        self.top_origin = Some(origin);
        self
    }

    pub fn web_destination(mut self, destination: Url) -> Self {
        self.web_destination = Some(destination);
        self
    }

    pub fn os_destination(mut self, destination: Url) -> Self {
        self.os_destination = Some(destination);
        self
    }

    pub fn verified_destination(mut self, destination: Url) -> Self {
        self.verified_destination = Some(destination);
        self
    }

    pub fn registrant(mut self, registrant: Url) -> Self {
        self.registrant = Some(registrant);
        self
    }

    pub fn source_type(mut self, source_type: SourceType) -> Self {
        self.source_type = Some(source_type);
        self
    }

    pub fn request_time(mut self, request_time: i64) -> Self {
        self.request_time = request_time;
        self
    }

    pub fn retry_count(mut self, retry_count: i64) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn registration_type(mut self, registration_type: RegistrationType) -> Self {
        self.registration_type = Some(registration_type);
        self
    }

    pub fn debug_key_allowed(mut self, allowed: bool) -> Self {
        self.debug_key_allowed = allowed;
        self
    }

    pub fn ad_id_permission(mut self, granted: bool) -> Self {
        self.ad_id_permission = granted;
        self
    }

    pub fn registration_id(mut self, registration_id: impl Into<String>) -> Self {
        self.registration_id = Some(registration_id.into());
        self
    }

    pub fn platform_ad_id(mut self, ad_id: impl Into<String>) -> Self {
        self.platform_ad_id = Some(ad_id.into());
        self
    }

    pub fn build(self) -> Result<AsyncRegistration> {
        let registration_uri = required(self.registration_uri, "AsyncRegistration", "registration_uri")?;
        let registrant = required(self.registrant, "AsyncRegistration", "registrant")?;
        let registration_type = required(self.registration_type, "AsyncRegistration", "registration_type")?;
        let registration_id = required(self.registration_id, "AsyncRegistration", "registration_id")?;
        require_host(&registration_uri, "AsyncRegistration", "registration_uri")?;
        require_host(&registrant, "AsyncRegistration", "registrant")?;
        if registration_type.is_source() && self.source_type.is_none() {
            return Err(Error::Validation(
                "AsyncRegistration for a source needs a source_type".to_string(),
            ));
        }

        Ok(AsyncRegistration {
            id: self.id.unwrap_or_else(new_id),
            registration_uri,
            top_origin: self.top_origin,
            web_destination: self.web_destination,
            os_destination: self.os_destination,
            verified_destination: self.verified_destination,
            registrant,
            source_type: self.source_type,
            request_time: self.request_time,
            retry_count: self.retry_count,
            registration_type,
            debug_key_allowed: self.debug_key_allowed,
            ad_id_permission: self.ad_id_permission,
            registration_id,
            platform_ad_id: self.platform_ad_id,
        })
    }
}
