#![forbid(unsafe_code)]

use super::StoreError;
use rl_core::{Attributes, Resource};

pub(super) fn encode_attributes(attributes: &Attributes) -> Result<String, StoreError> {
    serde_json::to_string(attributes)
        .map_err(|_| StoreError::InvalidInput("resource attributes are not serializable"))
}

pub(super) fn decode_resource(
    id: i64,
    attributes_json: &str,
    identity_attribute: &str,
) -> Result<Resource, StoreError> {
    let attributes = serde_json::from_str::<Attributes>(attributes_json).map_err(|err| {
        StoreError::CorruptRecord {
            id,
            message: err.to_string(),
        }
    })?;
    Resource::from_attributes(identity_attribute, attributes).map_err(|err| {
        StoreError::CorruptRecord {
            id,
            message: err.message().to_string(),
        }
    })
}
