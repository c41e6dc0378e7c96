//! Protection classification and the motor service facade used by higher layers.

use crate::bus::{create_driver, BusKind};
use crate::drivers::{MotorDriver, Telemetry};
use crate::{Brand, ModelCatalog, MotorId, MotorLimit, MotorModelInfo, MotorProtectionParams, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Fraction of a limit (or of the voltage band) that counts as "close".
const WARNING_MARGIN: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProtectionStatus {
    Ok,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtectedTelemetry {
    #[serde(flatten)]
    pub telemetry: Telemetry,
    pub status: ProtectionStatus,
    /// Human readable reasons, empty when `status` is `Ok`.
    pub violations: Vec<String>,
}

/// Classify one reading against `params`. Hardware error flags are always critical.
pub fn evaluate(t: &Telemetry, params: &MotorProtectionParams) -> (ProtectionStatus, Vec<String>) {
    let mut status = ProtectionStatus::Ok;
    let mut reasons = Vec::new();
    let mut flag = |level: ProtectionStatus, reason: String| {
        status = status.max(level);
        reasons.push(reason);
    };

    if t.error_flags != 0 {
        flag(ProtectionStatus::Critical, format!("hardware error flags 0x{:02X}", t.error_flags));
    }

    if let Some(v) = t.voltage {
        let band = match (params.voltage_min, params.voltage_max) {
            (Some(lo), Some(hi)) if hi > lo => hi - lo,
            (Some(lo), None) => lo,
            (_, Some(hi)) => hi,
            _ => 0.0,
        };
        let margin = band * WARNING_MARGIN;
        if let Some(lo) = params.voltage_min {
            if v < lo {
                flag(ProtectionStatus::Critical, format!("voltage {v:.1} V below {lo:.1} V"));
            } else if v < lo + margin {
                flag(ProtectionStatus::Warning, format!("voltage {v:.1} V near minimum {lo:.1} V"));
            }
        }
        if let Some(hi) = params.voltage_max {
            if v > hi {
                flag(ProtectionStatus::Critical, format!("voltage {v:.1} V above {hi:.1} V"));
            } else if v > hi - margin {
                flag(ProtectionStatus::Warning, format!("voltage {v:.1} V near maximum {hi:.1} V"));
            }
        }
    }

    if let (Some(c), Some(max)) = (t.current, params.current_max) {
        let c = c.abs();
        if c > max {
            flag(ProtectionStatus::Critical, format!("current {c:.0} above {max:.0}"));
        } else if c > max * (1.0 - WARNING_MARGIN) {
            flag(ProtectionStatus::Warning, format!("current {c:.0} near limit {max:.0}"));
        }
    }

    if let Some(max) = params.temperature_max {
        let temp = t.temperature;
        if temp > max {
            flag(ProtectionStatus::Critical, format!("temperature {temp:.0} °C above {max:.0} °C"));
        } else if temp > max * (1.0 - WARNING_MARGIN) {
            flag(ProtectionStatus::Warning, format!("temperature {temp:.0} °C near limit {max:.0} °C"));
        }
    }

    (status, reasons)
}

/// Driver factory and protection-aware reads. Shared by the robot manager and
/// telemetry sessions.
pub trait MotorService: Send + Sync {
    fn create_driver(&self, interface: &str, brand: Brand, baudrate: Option<u32>) -> Box<dyn MotorDriver>;

    /// Read one motor and classify the sample with the model's limits overlaid by
    /// `overrides`. `Ok(None)` when the motor did not answer.
    fn read_telemetry_with_protection(
        &self,
        driver: &mut dyn MotorDriver,
        id: &MotorId,
        model: &str,
        variant: Option<&str>,
        overrides: &[MotorLimit],
    ) -> Result<Option<ProtectedTelemetry>>;

    fn get_model_info_by_model_id(&self, brand: Brand, model_id: u32) -> Option<MotorModelInfo>;

    /// Fails with `AmbiguousModel` when several variants share `model_id`.
    fn get_spec_by_model_id(&self, brand: Brand, model_id: u32) -> Result<(String, MotorProtectionParams)>;
}

/// [`MotorService`] over hardware drivers and a model catalog.
#[derive(Debug, Clone)]
pub struct DefaultMotorService {
    catalog: Arc<ModelCatalog>,
}

impl DefaultMotorService {
    pub fn new(catalog: Arc<ModelCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Arc<ModelCatalog> {
        &self.catalog
    }
}

impl Default for DefaultMotorService {
    fn default() -> Self {
        Self::new(Arc::new(ModelCatalog::builtin()))
    }
}

impl MotorService for DefaultMotorService {
    fn create_driver(&self, interface: &str, brand: Brand, baudrate: Option<u32>) -> Box<dyn MotorDriver> {
        create_driver(BusKind::from(brand), interface, baudrate, self.catalog.clone())
    }

    fn read_telemetry_with_protection(
        &self,
        driver: &mut dyn MotorDriver,
        id: &MotorId,
        model: &str,
        variant: Option<&str>,
        overrides: &[MotorLimit],
    ) -> Result<Option<ProtectedTelemetry>> {
        let Some(telemetry) = driver.read_telemetry(id)? else {
            return Ok(None);
        };
        let params = self
            .catalog
            .protection_params(driver.brand(), model, variant)
            .unwrap_or_default()
            .with_overrides(overrides);
        let (status, violations) = evaluate(&telemetry, &params);
        if status != ProtectionStatus::Ok {
            tracing::debug!(%id, ?status, ?violations, "protection check");
        }
        Ok(Some(ProtectedTelemetry {
            telemetry,
            status,
            violations,
        }))
    }

    fn get_model_info_by_model_id(&self, brand: Brand, model_id: u32) -> Option<MotorModelInfo> {
        self.catalog.lookup(brand, model_id).ok().cloned()
    }

    fn get_spec_by_model_id(&self, brand: Brand, model_id: u32) -> Result<(String, MotorProtectionParams)> {
        self.catalog.spec_by_model_id(brand, model_id)
    }
}
