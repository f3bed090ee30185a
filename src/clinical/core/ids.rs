//! Identifier types for subjects, doctors and prescription records.
//!
//! Subject and doctor keys are opaque strings owned by the outer
//! registration system. Case record ids are generated here at creation.
//!
//! ## Cargo features used by this module
//! - `uuid_v7`: case record ids embed a time-ordered `UUIDv7` instead of a v4.

use core::fmt;
use core::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generate a UUID with good insert locality when `uuid_v7` is enabled.
#[inline]
#[must_use]
fn uuid_time_ordered() -> Uuid {
    #[cfg(feature = "uuid_v7")]
    {
        Uuid::now_v7()
    }
    #[cfg(not(feature = "uuid_v7"))]
    {
        Uuid::new_v4()
    }
}

/// Error returned when an identifier is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmptyIdError(&'static str);

impl fmt::Display for EmptyIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} must not be empty", self.0)
    }
}

impl std::error::Error for EmptyIdError {}

/// Declare an opaque string identifier with a consistent API.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident,
        label = $label:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw key, rejecting empty or whitespace-only values.
            ///
            /// # Errors
            /// Returns an error if the key is blank.
            pub fn new(raw: impl Into<String>) -> Result<Self, EmptyIdError> {
                let raw = raw.into();
                if raw.trim().is_empty() {
                    return Err(EmptyIdError($label));
                }
                Ok(Self(raw))
            }

            /// Borrow the key.
            #[inline]
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Extract the key.
            #[inline]
            #[must_use]
            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = EmptyIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = EmptyIdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.0.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let raw = value.as_str()?;
                Self::new(raw).map_err(|err| FromSqlError::Other(Box::new(err)))
            }
        }
    };
}

define_string_id!(
    /// Patient identity (opaque, unique key).
    SubjectId,
    label = "subject id"
);

define_string_id!(
    /// Clinician identity.
    DoctorId,
    label = "doctor id"
);

define_string_id!(
    /// Prescription log entry identity.
    CaseRecordId,
    label = "prescription id"
);

impl CaseRecordId {
    /// Generate a fresh identifier of the form `prescription-<uuid>`.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("prescription-{}", uuid_time_ordered().simple()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_ids_rejected() {
        assert!(SubjectId::new("").is_err());
        assert!(SubjectId::new("   ").is_err());
        assert_eq!(
            DoctorId::new("").unwrap_err().to_string(),
            "doctor id must not be empty"
        );
    }

    #[test]
    fn test_generated_case_ids_are_unique() {
        let a = CaseRecordId::generate();
        let b = CaseRecordId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("prescription-"));
    }

    #[test]
    fn test_serde_is_transparent_and_validated() {
        let id = SubjectId::new("p1").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"p1\"");
        let parsed: SubjectId = serde_json::from_str("\"p1\"").unwrap();
        assert_eq!(parsed, id);
        assert!(serde_json::from_str::<SubjectId>("\"\"").is_err());
    }
}
