#![forbid(unsafe_code)]

use super::StoreError;
use std::time::Duration;

pub const DEFAULT_DB_FILE_NAME: &str = "resource_locks.db";
pub const DEFAULT_IDENTITY_ATTRIBUTE: &str = "HOST";
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const ENV_DB_FILE: &str = "RESOURCE_LOCK_DB_FILE";
const ENV_IDENTITY_ATTRIBUTE: &str = "RESOURCE_LOCK_IDENTITY_ATTRIBUTE";
const ENV_BUSY_TIMEOUT_MS: &str = "RESOURCE_LOCK_BUSY_TIMEOUT_MS";
const ENV_SHUFFLE_SEED: &str = "RESOURCE_LOCK_SHUFFLE_SEED";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreOptions {
    /// File created inside the storage directory.
    pub db_file_name: String,
    /// Attribute whose value identifies a resource across pool refreshes.
    pub identity_attribute: String,
    /// How long a connection waits for a competing writer before giving up.
    pub busy_timeout: Duration,
    /// Fixed seed for candidate shuffling; `None` seeds from the OS.
    pub shuffle_seed: Option<u64>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            db_file_name: DEFAULT_DB_FILE_NAME.to_string(),
            identity_attribute: DEFAULT_IDENTITY_ATTRIBUTE.to_string(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            shuffle_seed: None,
        }
    }
}

impl StoreOptions {
    pub fn from_env() -> Result<Self, StoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, StoreError> {
        let mut options = Self::default();

        if let Some(value) = non_blank(lookup(ENV_DB_FILE)) {
            options.db_file_name = value;
        }
        if let Some(value) = non_blank(lookup(ENV_IDENTITY_ATTRIBUTE)) {
            options.identity_attribute = value;
        }
        if let Some(value) = non_blank(lookup(ENV_BUSY_TIMEOUT_MS)) {
            let millis = value.parse::<u64>().map_err(|_| {
                StoreError::InvalidInput("RESOURCE_LOCK_BUSY_TIMEOUT_MS must be an integer")
            })?;
            options.busy_timeout = Duration::from_millis(millis);
        }
        if let Some(value) = non_blank(lookup(ENV_SHUFFLE_SEED)) {
            let seed = value.parse::<u64>().map_err(|_| {
                StoreError::InvalidInput("RESOURCE_LOCK_SHUFFLE_SEED must be an integer")
            })?;
            options.shuffle_seed = Some(seed);
        }

        Ok(options)
    }

    pub fn with_shuffle_seed(mut self, seed: u64) -> Self {
        self.shuffle_seed = Some(seed);
        self
    }

    pub fn with_identity_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.identity_attribute = attribute.into();
        self
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
