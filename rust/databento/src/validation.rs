//! Validation and coercion of user-supplied parameters.

use time::OffsetDateTime;

use crate::{ApiKey, Error, Result, API_KEY_LENGTH};

/// Validates `key` as a Databento API key.
pub(crate) fn validate_key(key: String) -> Result<ApiKey> {
    if key.len() != API_KEY_LENGTH {
        return Err(Error::bad_argument(
            "key",
            format!("expected to be of length {API_KEY_LENGTH}"),
        ));
    }
    if !key.is_ascii() {
        return Err(Error::bad_argument(
            "key",
            "expected to be composed of only ASCII characters",
        ));
    }
    Ok(ApiKey(key))
}

/// Validates that `value` is a reasonable semantic string: non-empty, printable
/// ASCII with no separators that would corrupt the wire protocol.
pub(crate) fn validate_semantic_string(value: &str, param_name: &str) -> Result<()> {
    if value.is_empty() || value.chars().all(char::is_whitespace) {
        return Err(Error::bad_argument(param_name, "cannot be empty"));
    }
    if value
        .chars()
        .any(|c| !c.is_ascii() || c.is_ascii_control() || c == '|')
    {
        return Err(Error::bad_argument(
            param_name,
            "must be printable ASCII without '|'",
        ));
    }
    Ok(())
}

/// A UNIX nanosecond timestamp or datetime coerced to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateTimeArg {
    /// A raw UNIX nanosecond timestamp.
    UnixNanos(u64),
    /// A datetime.
    DateTime(OffsetDateTime),
}

impl DateTimeArg {
    /// Converts the argument to the canonical wire representation: UNIX epoch
    /// nanoseconds.
    pub fn unix_nanos(&self) -> u64 {
        match self {
            Self::UnixNanos(nanos) => *nanos,
            Self::DateTime(dt) => dt.unix_timestamp_nanos() as u64,
        }
    }
}

impl From<u64> for DateTimeArg {
    fn from(nanos: u64) -> Self {
        Self::UnixNanos(nanos)
    }
}

impl From<OffsetDateTime> for DateTimeArg {
    fn from(dt: OffsetDateTime) -> Self {
        Self::DateTime(dt)
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn key_length_is_checked() {
        assert!(validate_key("db-short".to_owned()).is_err());
        assert!(validate_key("db-unittestapikey1234567890FFFFF".to_owned()).is_ok());
    }

    #[test]
    fn semantic_strings() {
        assert!(validate_semantic_string("GLBX.MDP3", "dataset").is_ok());
        assert!(validate_semantic_string("", "dataset").is_err());
        assert!(validate_semantic_string("   ", "dataset").is_err());
        assert!(validate_semantic_string("bad|dataset", "dataset").is_err());
        assert!(validate_semantic_string("bad\ndataset", "dataset").is_err());
    }

    #[test]
    fn datetime_coercion() {
        assert_eq!(DateTimeArg::from(17u64).unix_nanos(), 17);
        assert_eq!(
            DateTimeArg::from(datetime!(2023-11-14 22:13:20 UTC)).unix_nanos(),
            1_700_000_000_000_000_000
        );
    }
}
