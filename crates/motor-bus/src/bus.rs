use crate::drivers::{DamiaoConfig, DamiaoDriver, DynamixelDriver, FeetechDriver, MotorDriver, Telemetry};
use crate::{Brand, ModelCatalog, MotorError, MotorId, MotorModelInfo, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::sync::Arc;

/// Bus class: one per wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BusKind {
    Dynamixel,
    Feetech,
    Damiao,
}

impl BusKind {
    pub const ALL: [BusKind; 3] = [BusKind::Dynamixel, BusKind::Feetech, BusKind::Damiao];

    /// Canonical name, as stored in robot connections and definitions.
    pub fn name(self) -> &'static str {
        match self {
            BusKind::Dynamixel => "dynamixel",
            BusKind::Feetech => "feetech",
            BusKind::Damiao => "damiao",
        }
    }

    pub fn brand(self) -> Brand {
        match self {
            BusKind::Dynamixel => Brand::Dynamixel,
            BusKind::Feetech => Brand::Feetech,
            BusKind::Damiao => Brand::Damiao,
        }
    }

    /// Resolve a canonical name or alias (`"can"`, `"dxl"`, `"sts"`, `"DamiaoMotorsBus"`, ...).
    /// Unknown names are a configuration error.
    pub fn resolve(name: &str) -> Result<Self> {
        let key = name.trim().to_ascii_lowercase();
        let kind = match key.as_str() {
            "dynamixel" | "dxl" | "dynamixelmotorsbus" | "dynamixelmotorbus" => BusKind::Dynamixel,
            "feetech" | "sts" | "scs" | "feetechmotorsbus" | "feetechmotorbus" => BusKind::Feetech,
            "damiao" | "dm" | "can" | "damiaomotorsbus" | "damiaomotorbus" => BusKind::Damiao,
            _ => return Err(MotorError::UnknownBusType(name.to_string())),
        };
        Ok(kind)
    }

    /// Baudrates (bitrates for CAN) to try, most common first.
    pub fn supported_baudrates(self) -> &'static [u32] {
        match self {
            BusKind::Dynamixel => &[57_600, 1_000_000, 115_200, 2_000_000, 3_000_000, 4_000_000, 9_600],
            BusKind::Feetech => &[1_000_000, 500_000, 250_000, 128_000, 115_200, 57_600, 38_400, 19_200],
            BusKind::Damiao => &[1_000_000],
        }
    }

    pub fn default_baudrate(self) -> u32 {
        self.supported_baudrates()[0]
    }

    pub fn is_can(self) -> bool {
        matches!(self, BusKind::Damiao)
    }

    pub fn is_serial(self) -> bool {
        !self.is_can()
    }

    pub fn serial_types() -> Vec<BusKind> {
        Self::ALL.into_iter().filter(|k| k.is_serial()).collect()
    }

    pub fn can_types() -> Vec<BusKind> {
        Self::ALL.into_iter().filter(|k| k.is_can()).collect()
    }
}

impl fmt::Display for BusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BusKind {
    type Err = MotorError;

    fn from_str(s: &str) -> Result<Self> {
        Self::resolve(s)
    }
}

impl TryFrom<String> for BusKind {
    type Error = MotorError;

    fn try_from(s: String) -> Result<Self> {
        Self::resolve(&s)
    }
}

impl From<BusKind> for String {
    fn from(kind: BusKind) -> Self {
        kind.name().to_string()
    }
}

impl From<Brand> for BusKind {
    fn from(brand: Brand) -> Self {
        match brand {
            Brand::Dynamixel => BusKind::Dynamixel,
            Brand::Feetech => BusKind::Feetech,
            Brand::Damiao => BusKind::Damiao,
        }
    }
}

/// What to build a bus from: an already resolved class or a name to resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusSpec {
    Kind(BusKind),
    Name(String),
}

impl BusSpec {
    pub fn resolve(&self) -> Result<BusKind> {
        match self {
            BusSpec::Kind(kind) => Ok(*kind),
            BusSpec::Name(name) => BusKind::resolve(name),
        }
    }
}

impl From<BusKind> for BusSpec {
    fn from(kind: BusKind) -> Self {
        BusSpec::Kind(kind)
    }
}

impl From<&str> for BusSpec {
    fn from(name: &str) -> Self {
        BusSpec::Name(name.to_string())
    }
}

/// Driver-side address of a registered motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MotorHandle {
    pub brand: Brand,
    pub address: MotorId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredMotor {
    pub handle: MotorHandle,
    pub model: MotorModelInfo,
}

/// A driver plus the registry of motors found on it.
pub struct MotorBus {
    kind: BusKind,
    driver: Box<dyn MotorDriver>,
    connected: bool,
    motors: BTreeMap<MotorId, RegisteredMotor>,
}

impl MotorBus {
    pub fn new(kind: BusKind, driver: Box<dyn MotorDriver>) -> Self {
        Self {
            kind,
            driver,
            connected: false,
            motors: BTreeMap::new(),
        }
    }

    /// Build an unconnected bus for `spec` with the built-in model tables.
    pub fn create(spec: impl Into<BusSpec>, interface: &str, baudrate: Option<u32>) -> Result<Self> {
        Self::create_with(spec, interface, baudrate, Arc::new(ModelCatalog::builtin()))
    }

    pub fn create_with(
        spec: impl Into<BusSpec>,
        interface: &str,
        baudrate: Option<u32>,
        catalog: Arc<ModelCatalog>,
    ) -> Result<Self> {
        let kind = spec.into().resolve()?;
        Ok(Self::new(kind, create_driver(kind, interface, baudrate, catalog)))
    }

    pub fn kind(&self) -> BusKind {
        self.kind
    }

    pub fn interface(&self) -> &str {
        self.driver.interface()
    }

    pub fn baudrate(&self) -> u32 {
        self.driver.baudrate()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn connect(&mut self) -> bool {
        self.connected = self.driver.connect();
        self.connected
    }

    pub fn disconnect(&mut self) {
        self.driver.disconnect();
        self.connected = false;
    }

    pub fn register_motor(&mut self, id: MotorId, handle: MotorHandle, model: MotorModelInfo) {
        self.motors.insert(id, RegisteredMotor { handle, model });
    }

    pub fn motors(&self) -> &BTreeMap<MotorId, RegisteredMotor> {
        &self.motors
    }

    /// Scan the driver and register every motor that answered.
    pub fn scan_motors(&mut self, range: Option<RangeInclusive<u32>>) -> Result<BTreeMap<MotorId, MotorModelInfo>> {
        let found = self.driver.scan(range)?;
        let brand = self.driver.brand();
        for (id, model) in &found {
            self.register_motor(*id, MotorHandle { brand, address: *id }, model.clone());
        }
        tracing::debug!(bus = %self.kind, interface = %self.interface(), motors = found.len(), "scan complete");
        Ok(found)
    }

    /// Ids need not be registered.
    pub fn read_bulk_telemetry(&mut self, ids: &[MotorId]) -> Result<BTreeMap<MotorId, Telemetry>> {
        self.driver.read_bulk_telemetry(ids)
    }

    pub fn driver_mut(&mut self) -> &mut dyn MotorDriver {
        self.driver.as_mut()
    }

    /// Hand the driver over (e.g. to a telemetry session), dropping the registry.
    pub fn into_driver(self) -> Box<dyn MotorDriver> {
        self.driver
    }
}

impl fmt::Debug for MotorBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MotorBus")
            .field("kind", &self.kind)
            .field("interface", &self.interface())
            .field("baudrate", &self.baudrate())
            .field("connected", &self.connected)
            .field("motors", &self.motors.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Hardware driver for `kind` on `interface`; `None` baudrate picks the class default.
pub fn create_driver(
    kind: BusKind,
    interface: &str,
    baudrate: Option<u32>,
    catalog: Arc<ModelCatalog>,
) -> Box<dyn MotorDriver> {
    let baudrate = baudrate.unwrap_or_else(|| kind.default_baudrate());
    match kind {
        BusKind::Dynamixel => Box::new(DynamixelDriver::new(interface, baudrate, catalog)),
        BusKind::Feetech => Box::new(FeetechDriver::new(interface, baudrate, catalog)),
        BusKind::Damiao => Box::new(DamiaoDriver::new(interface, baudrate, DamiaoConfig::default(), catalog)),
    }
}
