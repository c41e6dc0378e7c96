//! Protocol drivers behind one uniform verb set.
//!
//! Transport noise (timeouts, bad checksums, missing replies) is reported as
//! `Ok(false)` / `Ok(None)` / absent map entries. `Err` is reserved for contract
//! violations: using a disconnected driver, addressing a motor with an id shape the
//! protocol cannot carry, or an ambiguous model resolution.

use crate::{Brand, MotorError, MotorId, MotorModelInfo, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::RangeInclusive;

pub mod damiao;
pub mod dynamixel;
pub mod feetech;

pub use damiao::{DamiaoConfig, DamiaoDriver, MitRanges};
pub use dynamixel::DynamixelDriver;
pub use feetech::FeetechDriver;

/// One telemetry sample. Position and velocity are in the brand's native units
/// (encoder ticks for serial servos, radians for Damiao).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    pub position: f64,
    pub velocity: f64,
    pub current: Option<f64>,
    pub load: Option<f64>,
    pub temperature: f64,
    pub voltage: Option<f64>,
    pub moving: bool,
    pub goal_position: Option<f64>,
    pub error_flags: u8,
}

/// Uniform command/query interface implemented once per brand.
pub trait MotorDriver: Send {
    fn brand(&self) -> Brand;

    fn interface(&self) -> &str;

    fn baudrate(&self) -> u32;

    /// Open the physical interface. Returns `false` when the device is absent.
    fn connect(&mut self) -> bool;

    /// Release the transport. Safe to call repeatedly.
    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    fn default_scan_range(&self) -> RangeInclusive<u32>;

    fn ping(&mut self, id: &MotorId) -> Result<bool>;

    /// Probe every id in `range` (default: the brand's full range) and return the
    /// motors that answered. A model number shared by several variants of one
    /// model is reported as the base model with `variant` unset; telling the
    /// variants apart is left to the robot definition.
    fn scan(&mut self, range: Option<RangeInclusive<u32>>) -> Result<BTreeMap<MotorId, MotorModelInfo>>;

    /// Read the firmware model register(s) and resolve them through the model table.
    /// `Ok(None)` when the motor did not answer or the model is unknown.
    fn identify_model(&mut self, id: &MotorId) -> Result<Option<MotorModelInfo>>;

    fn read_telemetry(&mut self, id: &MotorId) -> Result<Option<Telemetry>>;

    /// Batched read; ids that fail are absent from the result.
    fn read_bulk_telemetry(&mut self, ids: &[MotorId]) -> Result<BTreeMap<MotorId, Telemetry>> {
        let mut out = BTreeMap::new();
        for id in ids {
            if let Some(t) = self.read_telemetry(id)? {
                out.insert(*id, t);
            }
        }
        Ok(out)
    }

    fn set_position(&mut self, id: &MotorId, target: f64, speed: Option<f64>) -> Result<bool>;

    fn set_torque(&mut self, id: &MotorId, enabled: bool) -> Result<bool>;

    fn reboot(&mut self, id: &MotorId) -> Result<bool>;

    /// Every id is attempted even after a failure; `true` only if all acknowledged.
    fn bulk_set_torque(&mut self, ids: &[MotorId], enabled: bool) -> Result<bool> {
        let mut all_ok = true;
        for id in ids {
            all_ok &= self.set_torque(id, enabled)?;
        }
        Ok(all_ok)
    }
}

/// Serial protocols carry a one-byte id; reject pairs and out-of-range ids.
pub(crate) fn serial_id(brand: Brand, id: &MotorId, max: u32) -> Result<u8> {
    match *id {
        MotorId::Simple(raw) if raw <= max => Ok(raw as u8),
        _ => Err(MotorError::InvalidId { brand, id: *id }),
    }
}

/// Collapse a driver-internal result: transport noise becomes `fallback`,
/// everything else propagates.
pub(crate) fn absorb<T>(brand: Brand, what: &str, r: Result<T>, fallback: T) -> Result<T> {
    match r {
        Ok(v) => Ok(v),
        Err(e) if e.is_transient() => {
            tracing::debug!(%brand, op = what, error = %e, "transport failure absorbed");
            Ok(fallback)
        }
        Err(e) => Err(e),
    }
}
