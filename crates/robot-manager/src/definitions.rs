//! Robot definition templates: built-in arms plus YAML files from a directory.

use crate::error::{ManagerError, Result};
use crate::types::{MotorBusDefinition, RobotDefinition, RobotMotorDefinition};
use motor_bus::{Brand, MotorId};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const SO101_JOINTS: [&str; 6] = ["shoulder_pan", "shoulder_lift", "elbow_flex", "wrist_flex", "wrist_roll", "gripper"];

#[derive(Debug, Clone, Default)]
pub struct DefinitionCatalog {
    definitions: BTreeMap<String, RobotDefinition>,
}

impl DefinitionCatalog {
    pub fn builtin() -> Self {
        let mut catalog = Self::default();
        for def in [
            so101("so101-follower", "SO-101 Follower"),
            so101("so101-leader", "SO-101 Leader"),
            koch_follower(),
            koch_leader(),
            openarm(),
        ] {
            catalog.insert(def);
        }
        catalog
    }

    /// Built-ins overlaid by every `*.yaml`/`*.yml` file in `dir`, in path order.
    /// A file whose id matches an existing definition replaces it. The first
    /// unreadable file aborts the load.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let mut catalog = Self::builtin();
        let dir = dir.as_ref();
        let mut entries: Vec<PathBuf> = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if let Some(ext) = path.extension() {
                if ext == "yml" || ext == "yaml" {
                    entries.push(path);
                }
            }
        }
        entries.sort();
        for path in entries {
            let def = load_definition_file(&path)?;
            tracing::debug!(id = %def.id, path = %path.display(), "robot definition loaded");
            catalog.insert(def);
        }
        Ok(catalog)
    }

    pub fn insert(&mut self, def: RobotDefinition) {
        self.definitions.insert(def.id.clone(), def);
    }

    pub fn get(&self, id: &str) -> Option<&RobotDefinition> {
        self.definitions.get(id)
    }

    pub fn list(&self) -> impl Iterator<Item = &RobotDefinition> {
        self.definitions.values()
    }
}

pub fn load_definition_file(path: impl AsRef<Path>) -> Result<RobotDefinition> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .map_err(|e| ManagerError::Storage(format!("reading definition {}: {e}", path.display())))?;
    serde_yaml::from_str(&raw)
        .map_err(|e| ManagerError::Storage(format!("parsing definition {}: {e}", path.display())))
}

fn motor(name: &str, id: MotorId, brand: Brand, model: &str, variant: Option<&str>) -> (String, RobotMotorDefinition) {
    (
        name.to_string(),
        RobotMotorDefinition {
            name: name.to_string(),
            id,
            brand,
            model: model.to_string(),
            variant: variant.map(str::to_string),
            drive_mode: 0,
            need_calibration: true,
        },
    )
}

fn single_bus(bus_type: &str, baud_rate: u32, motors: BTreeMap<String, RobotMotorDefinition>) -> BTreeMap<String, MotorBusDefinition> {
    BTreeMap::from([(
        "main".to_string(),
        MotorBusDefinition {
            bus_type: bus_type.to_string(),
            motors,
            baud_rate: Some(baud_rate),
        },
    )])
}

fn so101(id: &str, display_name: &str) -> RobotDefinition {
    let motors = SO101_JOINTS
        .iter()
        .zip(1u32..)
        .map(|(joint, n)| motor(joint, MotorId::Simple(n), Brand::Feetech, "STS3215", None))
        .collect();
    RobotDefinition {
        id: id.to_string(),
        display_name: display_name.to_string(),
        description: "Six-axis desktop arm on Feetech STS3215 servos".to_string(),
        device_category: None,
        motor_buses: single_bus("feetech", 1_000_000, motors),
        urdf: None,
    }
}

fn koch_follower() -> RobotDefinition {
    let motors = SO101_JOINTS
        .iter()
        .zip(1u32..)
        .map(|(joint, n)| {
            let (model, variant) = if n <= 2 { ("XL430", "W250") } else { ("XL330", "M288") };
            motor(joint, MotorId::Simple(n), Brand::Dynamixel, model, Some(variant))
        })
        .collect();
    RobotDefinition {
        id: "koch-follower".to_string(),
        display_name: "Koch v1.1 Follower".to_string(),
        description: "Dynamixel XL430/XL330 follower arm".to_string(),
        device_category: None,
        motor_buses: single_bus("dynamixel", 1_000_000, motors),
        urdf: None,
    }
}

fn koch_leader() -> RobotDefinition {
    let motors = SO101_JOINTS
        .iter()
        .zip(1u32..)
        .map(|(joint, n)| motor(joint, MotorId::Simple(n), Brand::Dynamixel, "XL330", Some("M077")))
        .collect();
    RobotDefinition {
        id: "koch-leader".to_string(),
        display_name: "Koch v1.1 Leader".to_string(),
        description: "Dynamixel XL330-M077 teleoperation leader".to_string(),
        device_category: None,
        motor_buses: single_bus("dynamixel", 1_000_000, motors),
        urdf: None,
    }
}

fn openarm() -> RobotDefinition {
    let motors = (1u32..=8)
        .map(|n| {
            let name = if n == 8 { "gripper".to_string() } else { format!("joint_{n}") };
            let model = match n {
                1 | 2 => "DM8009",
                3 | 4 => "DM4340",
                _ => "DM4310",
            };
            motor(&name, MotorId::SendRecv(n, 0x10 + n), Brand::Damiao, model, None)
        })
        .collect();
    RobotDefinition {
        id: "openarm".to_string(),
        display_name: "OpenArm".to_string(),
        description: "Seven-axis CAN arm on Damiao motors".to_string(),
        device_category: None,
        motor_buses: single_bus("damiao", 1_000_000, motors),
        urdf: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeviceCategory;

    #[test]
    fn builtins_cover_known_arms() {
        let catalog = DefinitionCatalog::builtin();
        let ids: Vec<&str> = catalog.list().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["koch-follower", "koch-leader", "openarm", "so101-follower", "so101-leader"]);
        assert_eq!(catalog.get("so101-leader").unwrap().category(), DeviceCategory::Controller);

        let openarm = &catalog.get("openarm").unwrap().motor_buses["main"];
        assert_eq!(openarm.motors.len(), 8);
        assert_eq!(openarm.motors["gripper"].id, MotorId::SendRecv(0x08, 0x18));
        assert_eq!(openarm.motors["joint_1"].model, "DM8009");
        assert_eq!(openarm.motors["joint_1"].recv_id(), 0x11);
    }

    #[test]
    fn yaml_files_override_by_id_in_path_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("a.yaml"),
            "id: so101-follower\ndisplay_name: Custom SO-101\nmotor_buses: {}\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("b.yml"),
            r#"
id: gantry
display_name: Gantry
device_category: ROBOT
motor_buses:
  can:
    type: can
    baud_rate: 1000000
    motors:
      x:
        name: x
        id: [1, 17]
        brand: damiao
        model: DM4310
"#,
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let catalog = DefinitionCatalog::load_dir(dir.path()).unwrap();
        assert_eq!(catalog.get("so101-follower").unwrap().display_name, "Custom SO-101");
        let gantry = &catalog.get("gantry").unwrap().motor_buses["can"];
        assert_eq!(gantry.motors["x"].id, MotorId::SendRecv(1, 17));
        assert!(gantry.motors["x"].need_calibration);
    }

    #[test]
    fn malformed_file_fails_the_load() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bad.yaml"), "id: [unterminated").unwrap();
        assert!(DefinitionCatalog::load_dir(dir.path()).is_err());
    }
}
