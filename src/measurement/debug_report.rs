//! Verbose debug reports sent outside of attribution

use crate::measurement::new_id;
use crate::{Error, Result};
use serde::Serialize;
use serde_json::Value;
use url::Url;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DebugReport {
    pub id: String,
    /// Report type, e.g. `source-noised` or `trigger-no-matching-source`
    pub report_type: String,
    pub body: Value,
    pub enrollment_id: String,
    pub registration_origin: Url,
}

impl DebugReport {
    pub fn new(
        report_type: impl Into<String>,
        body: Value,
        enrollment_id: impl Into<String>,
        registration_origin: Url,
    ) -> Result<Self> {
        let report_type = report_type.into();
        let enrollment_id = enrollment_id.into();
        if report_type.is_empty() {
            return Err(Error::Validation("DebugReport type is empty".to_string()));
        }
        if !body.is_object() {
            return Err(Error::Validation("DebugReport body must be a JSON object".to_string()));
        }
        if enrollment_id.is_empty() {
            return Err(Error::Validation("DebugReport enrollment_id is empty".to_string()));
        }
        Ok(Self {
            id: new_id(),
            report_type,
            body,
            enrollment_id,
            registration_origin,
        })
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}
