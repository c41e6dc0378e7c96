use motor_bus::{MotorId, ProtectedTelemetry};
use serde::Serialize;
use time::OffsetDateTime;

/// One motor's sample inside a telemetry snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MotorReading {
    pub motor: String,
    pub id: MotorId,
    #[serde(flatten)]
    pub reading: ProtectedTelemetry,
}

/// Everything a session publishes to its subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionEvent {
    /// One poll tick; motors that did not answer are absent.
    Telemetry {
        robot_id: String,
        #[serde(with = "time::serde::rfc3339")]
        timestamp: OffsetDateTime,
        motors: Vec<MotorReading>,
    },
    /// A motor entered CRITICAL and the session tried to cut its torque.
    EmergencyProtection {
        robot_id: String,
        #[serde(with = "time::serde::rfc3339")]
        timestamp: OffsetDateTime,
        motor: String,
        id: MotorId,
        violations: Vec<String>,
        torque_disabled: bool,
    },
    EmergencyStop {
        robot_id: String,
        #[serde(with = "time::serde::rfc3339")]
        timestamp: OffsetDateTime,
        motors: Vec<MotorId>,
        success: bool,
    },
}

/// Result of a control command. Refusals are reported here, not as errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandAck {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CommandAck {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use motor_bus::ProtectionStatus;

    #[test]
    fn events_are_tagged_with_rfc3339_stamps() {
        let event = SessionEvent::EmergencyStop {
            robot_id: "arm".to_string(),
            timestamp: OffsetDateTime::UNIX_EPOCH,
            motors: vec![MotorId::Simple(1), MotorId::SendRecv(2, 0x12)],
            success: true,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "EMERGENCY_STOP");
        assert_eq!(json["timestamp"], "1970-01-01T00:00:00Z");
        assert_eq!(json["motors"], serde_json::json!([1, [2, 18]]));
    }

    #[test]
    fn readings_flatten_protection_fields() {
        let reading = MotorReading {
            motor: "gripper".to_string(),
            id: MotorId::Simple(6),
            reading: ProtectedTelemetry {
                telemetry: Default::default(),
                status: ProtectionStatus::Warning,
                violations: vec!["temperature near limit".to_string()],
            },
        };
        let json = serde_json::to_value(&reading).unwrap();
        assert_eq!(json["status"], "WARNING");
        assert_eq!(json["temperature"], 0.0);
        assert_eq!(CommandAck::ok().message, None);
    }
}
