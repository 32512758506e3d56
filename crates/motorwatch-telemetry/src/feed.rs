use motorwatch_core::{MotorId, Timestamp};
use serde::{Deserialize, Serialize};

use crate::error::{TelemetryError, TelemetryResult};
use crate::reading::NewReading;

// ---------------------------------------------------------------------------
// Feed -- the channel JSON served by the IoT platform
// ---------------------------------------------------------------------------

/// `GET .../channels/<id>/feeds.json`: channel metadata plus entries in
/// arrival order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Feed {
    #[serde(default)]
    pub channel: Option<Channel>,
    #[serde(default)]
    pub feeds: Vec<FeedEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Channel {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub last_entry_id: Option<u64>,
}

/// One feed entry. Field values arrive as strings (or null) and carry no
/// names; meaning is positional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub entry_id: u64,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub field1: Option<String>,
    #[serde(default)]
    pub field2: Option<String>,
    #[serde(default)]
    pub field3: Option<String>,
    #[serde(default)]
    pub field4: Option<String>,
    #[serde(default)]
    pub field5: Option<String>,
    #[serde(default)]
    pub field6: Option<String>,
    #[serde(default)]
    pub field7: Option<String>,
    #[serde(default)]
    pub field8: Option<String>,
}

impl FeedEntry {
    fn number(&self, field: &'static str, raw: &Option<String>) -> TelemetryResult<f64> {
        let raw = raw.as_deref().ok_or_else(|| TelemetryError::InvalidField {
            entry_id: self.entry_id,
            field,
            reason: "is missing".to_string(),
        })?;
        raw.trim()
            .parse::<f64>()
            .map_err(|e| TelemetryError::InvalidField {
                entry_id: self.entry_id,
                field,
                reason: format!("'{}' is not a number: {}", raw, e),
            })
    }

    /// Map the positional fields onto a reading:
    /// field1 temperature, field2 voltage, field3 current, field4..6 x/y/z,
    /// field7 status.
    pub fn to_reading(&self, motor_id: &MotorId) -> TelemetryResult<NewReading> {
        let recorded_at = match self.created_at.as_deref() {
            Some(at) => Timestamp::parse_rfc3339(at)?,
            None => Timestamp::now(),
        };
        Ok(NewReading {
            motor_id: motor_id.clone(),
            temperature: self.number("field1", &self.field1)?,
            voltage: self.number("field2", &self.field2)?,
            current: self.number("field3", &self.field3)?,
            x: self.number("field4", &self.field4)?,
            y: self.number("field5", &self.field5)?,
            z: self.number("field6", &self.field6)?,
            status: strip_status(self.field7.as_deref().unwrap_or_default()),
            recorded_at,
        })
    }
}

/// The device reports status wrapped as `["..."]`; drop two characters from
/// each end. Anything shorter than the wrapper yields an empty status.
pub fn strip_status(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().collect();
    if chars.len() <= 4 {
        return String::new();
    }
    chars[2..chars.len() - 2].iter().collect()
}

/// Two-entry feed in the shape the channel serves.
#[cfg(test)]
pub(crate) const SAMPLE: &str = r#"{
    "channel": {"id": 984447, "name": "motor", "last_entry_id": 2},
    "feeds": [
        {"created_at": "2020-02-20T10:00:00Z", "entry_id": 1,
         "field1": "41.5", "field2": "229.8", "field3": "3.1",
         "field4": "0.01", "field5": "-0.02", "field6": "9.81",
         "field7": "[\"normal\"]", "field8": null},
        {"created_at": "2020-02-20T10:00:15Z", "entry_id": 2,
         "field1": "88", "field2": "231", "field3": "7.9",
         "field4": "0.4", "field5": "0.1", "field6": "9.6",
         "field7": "[\"overheat\"]"}
    ]
}"#;
