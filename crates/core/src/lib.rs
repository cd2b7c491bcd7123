#![forbid(unsafe_code)]

pub mod model;
pub mod select;

pub use model::{Attributes, LockDetail, Resource, ResourceError};
pub use select::{Decision, Selector};

/// Lock name stored on rows that nobody holds.
pub const UNLOCKED: &str = "";

pub mod ids {
    /// Name under which a caller holds resources. Never equal to the unlocked sentinel.
    #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct LockName(String);

    impl LockName {
        pub fn as_str(&self) -> &str {
            &self.0
        }

        pub fn into_string(self) -> String {
            self.0
        }

        pub fn try_new(value: impl Into<String>) -> Result<Self, LockNameError> {
            let value = value.into();
            validate_lock_name(&value)?;
            Ok(Self(value))
        }
    }

    impl std::fmt::Display for LockName {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(&self.0)
        }
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum LockNameError {
        Empty,
    }

    impl LockNameError {
        pub fn message(&self) -> &'static str {
            match self {
                Self::Empty => "lock name must not be empty",
            }
        }
    }

    fn validate_lock_name(value: &str) -> Result<(), LockNameError> {
        if value.is_empty() {
            return Err(LockNameError::Empty);
        }
        Ok(())
    }

}
