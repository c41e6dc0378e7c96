use crate::error::Result;
use crate::types::Robot;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// On-disk registry document.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RobotsDocument {
    #[serde(default)]
    robots: Vec<Robot>,
}

/// Older files hold a bare array instead of `{ "robots": [...] }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredRobots {
    Document(RobotsDocument),
    Bare(Vec<Robot>),
}

/// JSON file backing the robot registry.
#[derive(Debug, Clone)]
pub struct RobotStore {
    path: PathBuf,
}

impl RobotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file is an empty registry.
    pub fn load(&self) -> Result<Vec<Robot>> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "no robot registry yet");
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        let robots = match serde_json::from_str::<StoredRobots>(&raw)? {
            StoredRobots::Document(doc) => doc.robots,
            StoredRobots::Bare(robots) => robots,
        };
        tracing::debug!(path = %self.path.display(), count = robots.len(), "robot registry loaded");
        Ok(robots)
    }

    /// Pretty JSON, written to a sibling temp file then renamed over the target.
    pub fn save(&self, robots: &[Robot]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let doc = RobotsDocument {
            robots: robots.to_vec(),
        };
        let body = serde_json::to_string_pretty(&doc)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ProtectionKey, RobotStatus};
    use motor_bus::{Brand, LimitKind, MotorLimit};

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = RobotStore::new(dir.path().join("robots.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn save_then_load_preserves_robots() {
        let dir = tempfile::tempdir().unwrap();
        let store = RobotStore::new(dir.path().join("nested/robots.json"));
        let mut robot = Robot::new("SN42", "arm");
        robot.status = RobotStatus::Available;
        robot.custom_protection_settings.insert(
            ProtectionKey::new(Brand::Feetech, "STS3215", None),
            vec![MotorLimit::new(LimitKind::TemperatureMax, 60.0)],
        );
        store.save(std::slice::from_ref(&robot)).unwrap();
        assert_eq!(store.load().unwrap(), vec![robot]);
        assert!(!dir.path().join("nested/robots.json.tmp").exists());
    }

    #[test]
    fn legacy_documents_normalise() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("robots.json");
        fs::write(
            &path,
            r#"[{
                "id": "SN1",
                "name": "old arm",
                "status": "OFFLINE",
                "motor_bus_connections": {"main": {"motor_bus_type": "FeetechMotorsBus"}},
                "custom_protection_settings": {"feetech,STS3215,": [{"kind": "temperature_max", "value": 55.0}]}
            }]"#,
        )
        .unwrap();
        let robots = RobotStore::new(&path).load().unwrap();
        assert_eq!(robots.len(), 1);
        assert_eq!(robots[0].motor_bus_connections["main"].interface, None);
        assert!(robots[0]
            .custom_protection_settings
            .contains_key(&ProtectionKey::new(Brand::Feetech, "STS3215", None)));
    }
}
