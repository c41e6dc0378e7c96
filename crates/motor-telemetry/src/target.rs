use crate::error::{Result, SessionError};
use motor_bus::{Brand, BusKind, MotorId, MotorLimit};
use robot_manager::{MotorCalibration, Robot};

/// One motor a session polls and commands.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetMotor {
    pub name: String,
    pub id: MotorId,
    pub model: String,
    pub variant: Option<String>,
    pub overrides: Vec<MotorLimit>,
    pub calibration: Option<MotorCalibration>,
}

/// Snapshot of the robot record a session works from. The session never
/// writes back to the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionTarget {
    pub robot_id: String,
    pub bus: String,
    pub interface: String,
    pub brand: Brand,
    pub baudrate: Option<u32>,
    pub motors: Vec<TargetMotor>,
}

impl SessionTarget {
    /// Target for one motor bus of `robot`; `bus = None` picks the first.
    pub fn from_robot(robot: &Robot, bus: Option<&str>) -> Result<Self> {
        let (bus, conn) = match bus {
            Some(name) => robot.motor_bus_connections.get_key_value(name),
            None => robot.motor_bus_connections.iter().next(),
        }
        .ok_or_else(|| SessionError::InvalidTarget(format!("robot {} has no such motor bus", robot.id)))?;
        let interface = conn
            .interface
            .clone()
            .ok_or_else(|| SessionError::InvalidTarget(format!("robot {}: bus {bus} has no interface", robot.id)))?;
        let kind = BusKind::resolve(&conn.motor_bus_type)?;
        let bus_def = robot
            .definition
            .as_ref()
            .and_then(|d| d.motor_buses.get(bus))
            .ok_or_else(|| SessionError::InvalidTarget(format!("robot {}: bus {bus} is not defined", robot.id)))?;

        let motors = bus_def
            .motors
            .values()
            .map(|m| TargetMotor {
                name: m.name.clone(),
                id: m.id,
                model: m.model.clone(),
                variant: m.variant.clone(),
                overrides: robot
                    .protection_overrides(m.brand, &m.model, m.variant.as_deref())
                    .to_vec(),
                calibration: robot.calibration_for(&m.id).copied(),
            })
            .collect();

        Ok(Self {
            robot_id: robot.id.clone(),
            bus: bus.clone(),
            interface,
            brand: kind.brand(),
            baudrate: conn.baudrate.or(bus_def.baud_rate),
            motors,
        })
    }

    pub fn motor(&self, id: &MotorId) -> Option<&TargetMotor> {
        self.motors.iter().find(|m| m.id == *id)
    }

    pub fn ids(&self) -> Vec<MotorId> {
        self.motors.iter().map(|m| m.id).collect()
    }
}
