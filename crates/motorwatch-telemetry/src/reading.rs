use motorwatch_core::{MotorId, Timestamp};
use serde::{Deserialize, Serialize};

/// A stored motor reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotorReading {
    pub id: i64,
    pub motor_id: MotorId,
    pub temperature: f64,
    pub voltage: f64,
    pub current: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub status: String,
    pub recorded_at: Timestamp,
}

/// A reading before the store assigns its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReading {
    pub motor_id: MotorId,
    pub temperature: f64,
    pub voltage: f64,
    pub current: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub status: String,
    pub recorded_at: Timestamp,
}

impl NewReading {
    pub fn with_id(self, id: i64) -> MotorReading {
        MotorReading {
            id,
            motor_id: self.motor_id,
            temperature: self.temperature,
            voltage: self.voltage,
            current: self.current,
            x: self.x,
            y: self.y,
            z: self.z,
            status: self.status,
            recorded_at: self.recorded_at,
        }
    }
}
