//! Aggregation service public keys

use crate::measurement::new_id;
use crate::{Error, Result};
use serde::Serialize;

/// Public key fetched from the aggregation service; rotated externally
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateEncryptionKey {
    pub id: String,
    pub key_id: String,
    pub public_key: String,
    pub expiry: i64,
}

impl AggregateEncryptionKey {
    pub fn new(key_id: impl Into<String>, public_key: impl Into<String>, expiry: i64) -> Result<Self> {
        let key_id = key_id.into();
        let public_key = public_key.into();
        if key_id.is_empty() || public_key.is_empty() {
            return Err(Error::Validation(
                "AggregateEncryptionKey needs a key_id and a public_key".to_string(),
            ));
        }
        Ok(Self {
            id: new_id(),
            key_id,
            public_key,
            expiry,
        })
    }
}
