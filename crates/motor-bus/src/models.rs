use crate::{MotorError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Motor manufacturer. Each brand has its own wire protocol and model table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Brand {
    #[serde(alias = "DYNAMIXEL", alias = "Dynamixel")]
    Dynamixel,
    #[serde(alias = "FEETECH", alias = "Feetech")]
    Feetech,
    #[serde(alias = "DAMIAO", alias = "Damiao")]
    Damiao,
}

impl Brand {
    pub const ALL: [Brand; 3] = [Brand::Dynamixel, Brand::Feetech, Brand::Damiao];

    pub fn as_str(self) -> &'static str {
        match self {
            Brand::Dynamixel => "dynamixel",
            Brand::Feetech => "feetech",
            Brand::Damiao => "damiao",
        }
    }
}

impl fmt::Display for Brand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Brand {
    type Err = MotorError;

    fn from_str(s: &str) -> Result<Self> {
        Brand::ALL
            .into_iter()
            .find(|b| b.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| MotorError::Catalog(format!("unknown brand: {s}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitKind {
    VoltageMin,
    VoltageMax,
    CurrentMax,
    TemperatureMax,
    PositionMin,
    PositionMax,
    VelocityMax,
    TorqueMax,
}

/// One physical limit. Units follow the brand's telemetry units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotorLimit {
    pub kind: LimitKind,
    pub value: f64,
}

impl MotorLimit {
    pub fn new(kind: LimitKind, value: f64) -> Self {
        Self { kind, value }
    }
}

/// Physical specification of one motor model (and optional variant).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotorModelInfo {
    pub model: String,
    /// Every firmware model number that maps to this model/variant.
    pub model_ids: BTreeSet<u32>,
    #[serde(default)]
    pub variant: Option<String>,
    #[serde(default)]
    pub limits: BTreeMap<LimitKind, MotorLimit>,
    pub brand: Brand,
    pub encoder_resolution: u32,
    pub position_scale: f64,
    #[serde(default = "default_gear_ratio")]
    pub gear_ratio: f64,
    #[serde(default)]
    pub direction_inverted: bool,
    #[serde(default)]
    pub baudrates: Vec<u32>,
    #[serde(default)]
    pub operating_modes: BTreeSet<String>,
}

fn default_gear_ratio() -> f64 {
    1.0
}

impl MotorModelInfo {
    pub fn limit(&self, kind: LimitKind) -> Option<f64> {
        self.limits.get(&kind).map(|l| l.value)
    }

    pub fn protection_params(&self) -> MotorProtectionParams {
        MotorProtectionParams {
            voltage_min: self.limit(LimitKind::VoltageMin),
            voltage_max: self.limit(LimitKind::VoltageMax),
            current_max: self.limit(LimitKind::CurrentMax),
            temperature_max: self.limit(LimitKind::TemperatureMax),
        }
    }

    /// `"XL330-M077"` style display name.
    pub fn full_name(&self) -> String {
        match &self.variant {
            Some(v) => format!("{}-{}", self.model, v),
            None => self.model.clone(),
        }
    }

    fn matches(&self, model: &str, variant: Option<&str>) -> bool {
        self.model.eq_ignore_ascii_case(model)
            && match (variant, self.variant.as_deref()) {
                (None, None) => true,
                (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
                _ => false,
            }
    }
}

/// Thresholds used to classify telemetry as OK / WARNING / CRITICAL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MotorProtectionParams {
    pub voltage_min: Option<f64>,
    pub voltage_max: Option<f64>,
    pub current_max: Option<f64>,
    pub temperature_max: Option<f64>,
}

impl MotorProtectionParams {
    /// Overlay user supplied limits; kinds that are not protection limits are ignored.
    pub fn with_overrides(mut self, overrides: &[MotorLimit]) -> Self {
        for o in overrides {
            match o.kind {
                LimitKind::VoltageMin => self.voltage_min = Some(o.value),
                LimitKind::VoltageMax => self.voltage_max = Some(o.value),
                LimitKind::CurrentMax => self.current_max = Some(o.value),
                LimitKind::TemperatureMax => self.temperature_max = Some(o.value),
                _ => {}
            }
        }
        self
    }
}

/// Per-brand static model tables.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    tables: BTreeMap<Brand, Vec<MotorModelInfo>>,
}

impl ModelCatalog {
    /// Built-in tables for every brand. A brand whose table fails validation is
    /// skipped with a warning; the others still load.
    pub fn builtin() -> Self {
        let mut catalog = Self::default();
        for brand in Brand::ALL {
            match validate(brand, crate::catalog::builtin_table(brand)) {
                Ok(table) => {
                    catalog.tables.insert(brand, table);
                }
                Err(e) => tracing::warn!(%brand, error = %e, "skipping motor model table"),
            }
        }
        catalog
    }

    /// Built-in tables extended by optional `<brand>.json` files in `dir`.
    ///
    /// Entries in a file replace built-in entries with the same model and variant.
    /// A missing or malformed file only affects its own brand.
    pub fn load_dir(dir: impl AsRef<Path>) -> Self {
        let mut catalog = Self::builtin();
        for brand in Brand::ALL {
            let path = dir.as_ref().join(format!("{brand}.json"));
            if !path.exists() {
                continue;
            }
            let loaded = std::fs::read_to_string(&path)
                .map_err(|e| MotorError::Catalog(format!("{}: {e}", path.display())))
                .and_then(|raw| {
                    serde_json::from_str::<Vec<MotorModelInfo>>(&raw)
                        .map_err(|e| MotorError::Catalog(format!("{}: {e}", path.display())))
                })
                .and_then(|entries| validate(brand, entries));
            match loaded {
                Ok(entries) => catalog.extend(brand, entries),
                Err(e) => tracing::warn!(%brand, error = %e, "ignoring model table file"),
            }
        }
        catalog
    }

    fn extend(&mut self, brand: Brand, entries: Vec<MotorModelInfo>) {
        let table = self.tables.entry(brand).or_default();
        for entry in entries {
            table.retain(|m| !m.matches(&entry.model, entry.variant.as_deref()));
            table.push(entry);
        }
    }

    pub fn brands(&self) -> impl Iterator<Item = Brand> + '_ {
        self.tables.keys().copied()
    }

    pub fn models(&self, brand: Brand) -> &[MotorModelInfo] {
        self.tables.get(&brand).map(Vec::as_slice).unwrap_or_default()
    }

    /// Strict lookup by firmware model number. Several matching variants is an
    /// error, never silently resolved.
    pub fn lookup(&self, brand: Brand, model_id: u32) -> Result<&MotorModelInfo> {
        let matches: Vec<&MotorModelInfo> = self
            .models(brand)
            .iter()
            .filter(|m| m.model_ids.contains(&model_id))
            .collect();
        match matches.as_slice() {
            [] => Err(MotorError::ModelNotFound { brand, model_id }),
            [one] => Ok(one),
            many => Err(MotorError::AmbiguousModel {
                brand,
                model_id,
                candidates: many.iter().map(|m| m.full_name()).collect(),
            }),
        }
    }

    /// Lookup used while scanning a bus: when every candidate is a variant of the
    /// same base model the base (variant-less) entry is reported instead, because
    /// the firmware cannot tell the variants apart. The collapse is logged with
    /// the candidate list.
    pub fn resolve_scanned(&self, brand: Brand, model_id: u32) -> Result<MotorModelInfo> {
        match self.lookup(brand, model_id) {
            Ok(info) => Ok(info.clone()),
            Err(MotorError::AmbiguousModel { candidates, .. }) => {
                let matches: Vec<&MotorModelInfo> = self
                    .models(brand)
                    .iter()
                    .filter(|m| m.model_ids.contains(&model_id))
                    .collect();
                let base_names: BTreeSet<String> =
                    matches.iter().map(|m| m.model.to_ascii_uppercase()).collect();
                match (base_names.len(), matches.first()) {
                    (1, Some(first)) => {
                        tracing::warn!(
                            %brand,
                            model_id,
                            ?candidates,
                            "model number shared by several variants, reporting base model without variant"
                        );
                        Ok(self
                        .find(brand, &first.model, None)
                        .cloned()
                        .unwrap_or_else(|| MotorModelInfo {
                            variant: None,
                            ..(*first).clone()
                        }))
                    }
                    _ => Err(MotorError::AmbiguousModel {
                        brand,
                        model_id,
                        candidates,
                    }),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Case-insensitive lookup by name. `variant = None` selects the base entry.
    pub fn find(&self, brand: Brand, model: &str, variant: Option<&str>) -> Option<&MotorModelInfo> {
        self.models(brand).iter().find(|m| m.matches(model, variant))
    }

    /// Model name and protection thresholds for a firmware model number.
    pub fn spec_by_model_id(
        &self,
        brand: Brand,
        model_id: u32,
    ) -> Result<(String, MotorProtectionParams)> {
        let info = self.lookup(brand, model_id)?;
        Ok((info.model.clone(), info.protection_params()))
    }

    /// Protection thresholds by name, falling back to the base model when the
    /// variant is unknown.
    pub fn protection_params(
        &self,
        brand: Brand,
        model: &str,
        variant: Option<&str>,
    ) -> Option<MotorProtectionParams> {
        self.find(brand, model, variant)
            .or_else(|| self.find(brand, model, None))
            .map(MotorModelInfo::protection_params)
    }
}

fn validate(brand: Brand, table: Vec<MotorModelInfo>) -> Result<Vec<MotorModelInfo>> {
    for m in &table {
        if m.brand != brand {
            return Err(MotorError::Catalog(format!(
                "{} is listed under {brand} but declares {}",
                m.full_name(),
                m.brand
            )));
        }
        if m.model.trim().is_empty() || m.model_ids.is_empty() {
            return Err(MotorError::Catalog(format!(
                "{brand} entry {:?} has no model name or model ids",
                m.model
            )));
        }
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dynamixel_1190_is_xl330_m077() {
        let catalog = ModelCatalog::builtin();
        let info = catalog.lookup(Brand::Dynamixel, 1190).unwrap();
        assert_eq!(info.model, "XL330");
        assert_eq!(info.variant.as_deref(), Some("M077"));
        assert_eq!(info.brand, Brand::Dynamixel);

        let (name, params) = catalog.spec_by_model_id(Brand::Dynamixel, 1190).unwrap();
        assert_eq!(name, "XL330");
        assert_eq!(params.voltage_min, Some(3.7));
        assert_eq!(params.current_max, Some(400.0));
    }

    #[test]
    fn feetech_3215_is_base_sts3215() {
        let catalog = ModelCatalog::builtin();
        let info = catalog.lookup(Brand::Feetech, 3215).unwrap();
        assert_eq!(info.model, "STS3215");
        assert_eq!(info.variant, None);
        let (_, params) = catalog.spec_by_model_id(Brand::Feetech, 3215).unwrap();
        assert_eq!(params.voltage_min, Some(6.0));
        assert_eq!(params.current_max, Some(150.0));
    }

    #[test]
    fn shared_model_id_is_ambiguous_not_missing() {
        let catalog = ModelCatalog::builtin();
        match catalog.lookup(Brand::Feetech, 777) {
            Err(MotorError::AmbiguousModel { candidates, .. }) => assert!(candidates.len() > 1),
            other => panic!("expected ambiguity, got {other:?}"),
        }
        assert!(matches!(
            catalog.lookup(Brand::Feetech, 9999),
            Err(MotorError::ModelNotFound { .. })
        ));
        assert!(matches!(
            catalog.spec_by_model_id(Brand::Feetech, 777),
            Err(MotorError::AmbiguousModel { .. })
        ));
    }

    #[test]
    fn scanned_ambiguity_collapses_to_base_model() {
        let catalog = ModelCatalog::builtin();
        let info = catalog.resolve_scanned(Brand::Feetech, 777).unwrap();
        assert_eq!(info.model, "STS3215");
        assert_eq!(info.variant, None);
        assert_eq!(info.full_name(), "STS3215");

        let c044 = catalog.find(Brand::Feetech, "STS3215", Some("C044")).unwrap();
        assert!(c044.model_ids.contains(&777));
        assert_ne!(c044.variant, info.variant);
    }

    #[test]
    fn overrides_replace_thresholds() {
        let params = MotorProtectionParams {
            voltage_min: Some(6.0),
            ..Default::default()
        }
        .with_overrides(&[
            MotorLimit::new(LimitKind::VoltageMin, 5.5),
            MotorLimit::new(LimitKind::TemperatureMax, 60.0),
            MotorLimit::new(LimitKind::PositionMax, 4095.0),
        ]);
        assert_eq!(params.voltage_min, Some(5.5));
        assert_eq!(params.temperature_max, Some(60.0));
    }

    #[test]
    fn broken_brand_file_does_not_block_others() {
        let dir = std::env::temp_dir().join(format!("motor-models-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("feetech.json"), "{ not json").unwrap();
        let catalog = ModelCatalog::load_dir(&dir);
        assert!(catalog.lookup(Brand::Dynamixel, 1190).is_ok());
        assert!(catalog.lookup(Brand::Feetech, 3215).is_ok());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn brand_parses_case_insensitively() {
        assert_eq!("DYNAMIXEL".parse::<Brand>().unwrap(), Brand::Dynamixel);
        let b: Brand = serde_json::from_str("\"DAMIAO\"").unwrap();
        assert_eq!(b, Brand::Damiao);
        assert_eq!(serde_json::to_string(&Brand::Feetech).unwrap(), "\"feetech\"");
    }
}
