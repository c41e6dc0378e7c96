//! motor-bus: one command/query interface over Dynamixel, Feetech and Damiao motors
//!
//! Drivers speak the wire protocols and absorb link noise into `false`/`None`.
//! [`MotorBus`] wraps one driver with the registry of motors a scan found, and
//! [`DiscoveryService`] probes the host's transports for buses that answer.
//! The default `mock` feature adds scriptable hardware for tests.

mod error;
pub use error::{MotorError, Result};

mod id;
pub use id::MotorId;

mod catalog;
mod models;
pub use models::{Brand, LimitKind, ModelCatalog, MotorLimit, MotorModelInfo, MotorProtectionParams};

pub mod link;
pub use link::{open_serial, SerialLink};

pub mod drivers;
pub use drivers::{
    DamiaoConfig, DamiaoDriver, DynamixelDriver, FeetechDriver, MitRanges, MotorDriver, Telemetry,
};

mod bus;
pub use bus::{create_driver, BusKind, BusSpec, MotorBus, MotorHandle, RegisteredMotor};

mod protection;
pub use protection::{evaluate, DefaultMotorService, MotorService, ProtectedTelemetry, ProtectionStatus};

mod discovery;
pub use discovery::{
    BusFactory, CanInterfaceInfo, DiscoveredBus, DiscoveryConfig, DiscoveryService, HardwareBusFactory,
    SerialPortInfo, SystemTransports, TransportEnumerator, UsbId,
};

#[cfg(feature = "mock")]
pub mod mock;
