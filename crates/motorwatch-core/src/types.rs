use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, CoreResult};

// ---------------------------------------------------------------------------
// Timestamp -- canonical time representation (seconds + nanoseconds)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    pub seconds_since_epoch: u64,
    pub nanoseconds: u32,
}

impl Timestamp {
    pub fn now() -> Self {
        chrono::Utc::now().into()
    }

    pub fn from_seconds(seconds: u64) -> Self {
        Self {
            seconds_since_epoch: seconds,
            nanoseconds: 0,
        }
    }

    /// Parse an RFC 3339 string such as `2020-02-10T08:14:03Z`.
    pub fn parse_rfc3339(value: &str) -> CoreResult<Self> {
        let dt = chrono::DateTime::parse_from_rfc3339(value)
            .map_err(|e| CoreError::InvalidTimestamp(format!("{}: {}", value, e)))?;
        let utc = dt.with_timezone(&chrono::Utc);
        if utc.timestamp() < 0 {
            return Err(CoreError::InvalidTimestamp(format!(
                "{}: before the unix epoch",
                value
            )));
        }
        Ok(utc.into())
    }

    pub fn to_rfc3339(&self) -> String {
        let dt =
            chrono::DateTime::from_timestamp(self.seconds_since_epoch as i64, self.nanoseconds);
        dt.map(|d| d.to_rfc3339())
            .unwrap_or_else(|| "invalid".to_string())
    }
}

impl From<chrono::DateTime<chrono::Utc>> for Timestamp {
    fn from(dt: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            seconds_since_epoch: dt.timestamp().max(0) as u64,
            nanoseconds: dt.timestamp_subsec_nanos(),
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_rfc3339())
    }
}

// ---------------------------------------------------------------------------
// EndpointId -- qualified name of a guarded endpoint (`module.view`,
// `ReadingView.get`, ...)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EndpointId(pub String);

impl EndpointId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Identity of a method reached through this endpoint (`View.get`).
    pub fn member(&self, name: &str) -> Self {
        Self(format!("{}.{}", self.0, name))
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EndpointId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// MotorId -- identifier of a monitored motor ("m1", ...)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MotorId(pub String);

impl MotorId {
    pub fn new(id: impl Into<String>) -> CoreResult<Self> {
        let id = id.into();
        if id.is_empty() || id.len() > 64 {
            return Err(CoreError::InvalidIdentifier(
                "motor id must be between 1 and 64 bytes".to_string(),
            ));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MotorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_rfc3339_roundtrip() {
        let ts = Timestamp::parse_rfc3339("2020-02-10T08:14:03Z").unwrap();
        assert_eq!(ts.seconds_since_epoch, 1_581_322_443);
        assert_eq!(ts.nanoseconds, 0);
        let again = Timestamp::parse_rfc3339(&ts.to_rfc3339()).unwrap();
        assert_eq!(ts, again);
    }

    #[test]
    fn test_timestamp_parse_rejects_garbage() {
        let err = Timestamp::parse_rfc3339("yesterday").unwrap_err();
        assert!(matches!(err, CoreError::InvalidTimestamp(_)));
    }

    #[test]
    fn test_timestamp_ordering() {
        let a = Timestamp::from_seconds(10);
        let b = Timestamp::from_seconds(20);
        assert!(a < b);
    }

    #[test]
    fn test_endpoint_member() {
        let view = EndpointId::new("ReadingView");
        assert_eq!(view.member("dispatch").as_str(), "ReadingView.dispatch");
        assert_eq!(view.to_string(), "ReadingView");
    }

    #[test]
    fn test_motor_id_validation() {
        assert!(MotorId::new("m1").is_ok());
        assert!(MotorId::new("").is_err());
        assert!(MotorId::new("x".repeat(65)).is_err());
    }

    #[test]
    fn test_endpoint_id_serde() {
        let id = EndpointId::new("views.readings");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"views.readings\"");
        let back: EndpointId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
