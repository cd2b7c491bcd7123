#![forbid(unsafe_code)]

use serde_json::Value;

/// Open, resource-specific metadata as supplied by the inventory.
pub type Attributes = serde_json::Map<String, Value>;

/// One member of the pool: its identity key plus the descriptor it was built from.
///
/// The identity key is read out of the attribute map (e.g. `HOST`) once, at
/// construction, so every later comparison works on the typed field.
#[derive(Clone, Debug, PartialEq)]
pub struct Resource {
    key: String,
    attributes: Attributes,
}

impl Resource {
    pub fn from_attributes(
        identity_attribute: &str,
        attributes: Attributes,
    ) -> Result<Self, ResourceError> {
        let key = match attributes.get(identity_attribute) {
            None => return Err(ResourceError::MissingIdentity),
            Some(Value::String(key)) => key.clone(),
            Some(_) => return Err(ResourceError::IdentityNotString),
        };
        if key.is_empty() {
            return Err(ResourceError::EmptyIdentity);
        }
        Ok(Self { key, attributes })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(Value::as_str)
    }

    pub fn into_attributes(self) -> Attributes {
        self.attributes
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResourceError {
    MissingIdentity,
    IdentityNotString,
    EmptyIdentity,
}

impl ResourceError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::MissingIdentity => "resource descriptor is missing its identity attribute",
            Self::IdentityNotString => "resource identity attribute must be a string",
            Self::EmptyIdentity => "resource identity attribute must not be empty",
        }
    }
}

/// Lock state of a single resource as reported by the inspector.
///
/// `reason` and `locked_at_ms` describe the most recent claim and survive a
/// release, so `lock` is the only field that says whether the resource is held.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockDetail {
    pub lock: String,
    pub reason: Option<String>,
    pub locked_at_ms: Option<i64>,
}

impl LockDetail {
    pub fn is_locked(&self) -> bool {
        self.lock != crate::UNLOCKED
    }
}
