use motor_bus::{Brand, MotorId, MotorLimit};
use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceCategory {
    Robot,
    Controller,
    Camera,
}

impl DeviceCategory {
    /// Leader arms drive followers, so they are controllers.
    pub fn for_definition_id(id: &str) -> Self {
        if id.ends_with("-leader") {
            DeviceCategory::Controller
        } else {
            DeviceCategory::Robot
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RobotStatus {
    Available,
    Offline,
    Invalid,
    Pending,
}

/// One motor slot of a robot definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotMotorDefinition {
    pub name: String,
    pub id: MotorId,
    pub brand: Brand,
    pub model: String,
    #[serde(default)]
    pub variant: Option<String>,
    /// 0 = normal, 1 = inverted.
    #[serde(default)]
    pub drive_mode: u8,
    #[serde(default = "default_true")]
    pub need_calibration: bool,
}

fn default_true() -> bool {
    true
}

impl RobotMotorDefinition {
    pub fn recv_id(&self) -> u32 {
        self.id.recv_id()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotorBusDefinition {
    /// Bus class name or alias, resolved with `BusKind::resolve`.
    #[serde(rename = "type")]
    pub bus_type: String,
    pub motors: BTreeMap<String, RobotMotorDefinition>,
    #[serde(default)]
    pub baud_rate: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotDefinition {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    /// Derived from `id` when absent.
    #[serde(default)]
    pub device_category: Option<DeviceCategory>,
    #[serde(default)]
    pub motor_buses: BTreeMap<String, MotorBusDefinition>,
    #[serde(default)]
    pub urdf: Option<String>,
}

impl RobotDefinition {
    pub fn category(&self) -> DeviceCategory {
        self.device_category
            .unwrap_or_else(|| DeviceCategory::for_definition_id(&self.id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RobotMotorBusConnection {
    pub motor_bus_type: String,
    #[serde(default)]
    pub interface: Option<String>,
    #[serde(default)]
    pub baudrate: Option<u32>,
    #[serde(default)]
    pub serial_number: Option<String>,
}

/// Per-motor calibration captured by the calibration workflow.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotorCalibration {
    pub id: MotorId,
    #[serde(default)]
    pub drive_mode: u8,
    #[serde(default)]
    pub homing_offset: i32,
    pub range_min: f64,
    pub range_max: f64,
}

impl MotorCalibration {
    pub fn clamp(&self, target: f64) -> f64 {
        let (lo, hi) = if self.range_min <= self.range_max {
            (self.range_min, self.range_max)
        } else {
            (self.range_max, self.range_min)
        };
        target.clamp(lo, hi)
    }
}

/// `(brand, model, variant)` key of a protection override.
///
/// Serialised as `"brand,model,variant"` (empty variant segment when unset) so it
/// can key a JSON object. Accepts that string, a parenthesised/bracketed tuple
/// form of it, or a JSON array.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProtectionKey {
    pub brand: Brand,
    pub model: String,
    pub variant: Option<String>,
}

impl ProtectionKey {
    pub fn new(brand: Brand, model: &str, variant: Option<&str>) -> Self {
        Self {
            brand,
            model: model.to_string(),
            variant: variant.map(str::to_string),
        }
    }

    fn matches(&self, brand: Brand, model: &str, variant: Option<&str>) -> bool {
        self.brand == brand
            && self.model.eq_ignore_ascii_case(model)
            && match (self.variant.as_deref(), variant) {
                (None, None) => true,
                (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
                _ => false,
            }
    }

    fn parse(raw: &str) -> Result<Self, String> {
        let inner = raw.trim().trim_start_matches(['(', '[']).trim_end_matches([')', ']']);
        let parts: Vec<String> = inner
            .split(',')
            .map(|p| p.trim().trim_matches(['"', '\'']).to_string())
            .collect();
        let (brand, model, variant) = match parts.as_slice() {
            [brand, model] => (brand, model, None),
            [brand, model, variant] => (brand, model, Some(variant)),
            _ => return Err(format!("invalid protection key: {raw}")),
        };
        Ok(Self {
            brand: brand.parse().map_err(|e| format!("{e}"))?,
            model: model.clone(),
            variant: variant
                .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("none") && !v.eq_ignore_ascii_case("null"))
                .cloned(),
        })
    }
}

impl fmt::Display for ProtectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.brand, self.model, self.variant.as_deref().unwrap_or(""))
    }
}

impl Serialize for ProtectionKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ProtectionKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeyVisitor;

        impl<'de> Visitor<'de> for KeyVisitor {
            type Value = ProtectionKey;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("\"brand,model,variant\" or [brand, model, variant]")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<ProtectionKey, E> {
                ProtectionKey::parse(v).map_err(E::custom)
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<ProtectionKey, A::Error> {
                let brand: Brand = seq.next_element()?.ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let model: String = seq.next_element()?.ok_or_else(|| de::Error::invalid_length(1, &self))?;
                let variant = seq.next_element::<Option<String>>()?.flatten();
                Ok(ProtectionKey {
                    brand,
                    model,
                    variant: variant.filter(|v| !v.is_empty()),
                })
            }
        }

        deserializer.deserialize_any(KeyVisitor)
    }
}

/// A registered (or candidate) robot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Robot {
    pub id: String,
    pub name: String,
    pub status: RobotStatus,
    #[serde(default)]
    pub is_transient: bool,
    #[serde(default)]
    pub motor_bus_connections: BTreeMap<String, RobotMotorBusConnection>,
    #[serde(default)]
    pub definition: Option<RobotDefinition>,
    #[serde(default)]
    pub custom_protection_settings: BTreeMap<ProtectionKey, Vec<MotorLimit>>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Keyed by motor slot name.
    #[serde(default)]
    pub calibration: BTreeMap<String, MotorCalibration>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_seen: Option<OffsetDateTime>,
}

impl Robot {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: RobotStatus::Offline,
            is_transient: false,
            motor_bus_connections: BTreeMap::new(),
            definition: None,
            custom_protection_settings: BTreeMap::new(),
            labels: BTreeMap::new(),
            calibration: BTreeMap::new(),
            last_seen: None,
        }
    }

    pub fn category(&self) -> DeviceCategory {
        self.definition
            .as_ref()
            .map_or(DeviceCategory::Robot, RobotDefinition::category)
    }

    /// Overrides for one model; a variant-less entry applies to every variant.
    pub fn protection_overrides(&self, brand: Brand, model: &str, variant: Option<&str>) -> &[MotorLimit] {
        let exact = self
            .custom_protection_settings
            .iter()
            .find(|(k, _)| k.matches(brand, model, variant));
        let base = || {
            self.custom_protection_settings
                .iter()
                .find(|(k, _)| k.matches(brand, model, None))
        };
        exact
            .or_else(base)
            .map(|(_, limits)| limits.as_slice())
            .unwrap_or_default()
    }

    /// Calibration for the motor with `id`, whatever slot it sits in.
    pub fn calibration_for(&self, id: &MotorId) -> Option<&MotorCalibration> {
        self.calibration.values().find(|c| c.id == *id)
    }
}
