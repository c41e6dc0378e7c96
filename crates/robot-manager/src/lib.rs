//! robot-manager: the registry of robots built from motor buses
//!
//! Robots are declared by [`RobotDefinition`] templates and bound to hardware by
//! their motor bus connections. The [`RobotManager`] verifies that binding against
//! live buses, refreshes status from discovery passes, proposes pending devices and
//! persists the registry through a [`RobotStore`].

mod error;
pub use error::{ErrorKind, ManagerError, Result};

mod types;
pub use types::{
    DeviceCategory, MotorBusDefinition, MotorCalibration, ProtectionKey, Robot, RobotDefinition,
    RobotMotorBusConnection, RobotMotorDefinition, RobotStatus,
};

mod store;
pub use store::RobotStore;

mod definitions;
pub use definitions::{load_definition_file, DefinitionCatalog};

mod verify;
pub use verify::verify_motor_bus;

mod manager;
pub use manager::{ManagerConfig, RobotManager, RobotUpdate, VerificationPolicy};
