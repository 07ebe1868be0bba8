//! Generic `(data_type, key) -> value` records

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataType {
    /// Redirect hops consumed by one registration chain, keyed by registration id
    RegistrationRedirectCount,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::RegistrationRedirectCount => "REGISTRATION_REDIRECT_COUNT",
        }
    }
}

impl FromStr for DataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "REGISTRATION_REDIRECT_COUNT" => Ok(DataType::RegistrationRedirectCount),
            _ => Err(Error::Validation(format!("Unknown key-value data type: {}", s))),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A stored value; `value` is `None` when the key has never been written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyValueData {
    pub data_type: DataType,
    pub key: String,
    pub value: Option<String>,
}

impl KeyValueData {
    pub fn new(data_type: DataType, key: impl Into<String>, value: Option<String>) -> Self {
        Self {
            data_type,
            key: key.into(),
            value,
        }
    }

    /// Redirect count for a registration chain; an unset key counts as one hop
    pub fn redirect_count(&self) -> Result<u32> {
        match (&self.data_type, &self.value) {
            (DataType::RegistrationRedirectCount, None) => Ok(1),
            (DataType::RegistrationRedirectCount, Some(value)) => value
                .parse()
                .map_err(|_| Error::Validation(format!("Invalid redirect count: {}", value))),
        }
    }

    pub fn set_redirect_count(&mut self, count: u32) {
        self.value = Some(count.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_redirect_count_defaults_to_one() {
        let mut data = KeyValueData::new(DataType::RegistrationRedirectCount, "reg-1", None);
        assert_eq!(data.redirect_count().unwrap(), 1);
        data.set_redirect_count(4);
        assert_eq!(data.redirect_count().unwrap(), 4);
    }
}
