use anyhow::{Context, Result};
use motor_bus::{BusKind, DiscoveryConfig};
use motor_telemetry::SessionConfig;
use robot_manager::{ManagerConfig, VerificationPolicy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub robots_file: String,
    /// Extra robot definition YAML files, merged over the built-ins.
    pub definitions_dir: Option<String>,
    /// Optional `<brand>.json` motor model tables.
    pub models_dir: Option<String>,
    pub poll_interval_ms: u64,
    pub queue_capacity: usize,
    pub discovery_filters: Option<Vec<(BusKind, u32)>>,
    pub discovery: DiscoveryConfig,
    pub verification_policy: VerificationPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            robots_file: "robots.json".to_string(),
            definitions_dir: None,
            models_dir: None,
            poll_interval_ms: 100,
            queue_capacity: 256,
            discovery_filters: None,
            discovery: DiscoveryConfig::default(),
            verification_policy: VerificationPolicy::default(),
        }
    }
}

impl Config {
    /// Read `path`, writing the defaults there first if it does not exist.
    pub fn load(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            let contents = fs::read_to_string(path).with_context(|| format!("reading config: {path}"))?;
            serde_json::from_str(&contents).with_context(|| format!("parsing config: {path}"))
        } else {
            let config = Self::default();
            config.save(path)?;
            Ok(config)
        }
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("writing config: {path}"))?;
        Ok(())
    }

    pub fn manager(&self) -> ManagerConfig {
        ManagerConfig {
            verification_policy: self.verification_policy,
            discovery_filters: self.discovery_filters.clone(),
        }
    }

    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            poll_interval_ms: self.poll_interval_ms,
            queue_capacity: self.queue_capacity,
            start_polling: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_load_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hwctl.json");
        let path = path.to_str().unwrap();
        let config = Config::load(path).unwrap();
        assert_eq!(config, Config::default());
        assert!(Path::new(path).exists());
    }

    #[test]
    fn partial_files_fill_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hwctl.json");
        fs::write(
            &path,
            r#"{"poll_interval_ms": 20, "discovery_filters": [["feetech", 1000000]], "verification_policy": "require_complete"}"#,
        )
        .unwrap();
        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.poll_interval_ms, 20);
        assert_eq!(config.robots_file, "robots.json");
        assert_eq!(config.manager().discovery_filters, Some(vec![(BusKind::Feetech, 1_000_000)]));
        assert_eq!(config.verification_policy, VerificationPolicy::RequireComplete);
        assert_eq!(config.discovery.can_adapters.len(), 1);
    }
}
