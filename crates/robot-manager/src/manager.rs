//! The robot registry: verification against live buses, status refresh from one
//! discovery pass, pending candidates and CRUD over the persisted list.

use crate::definitions::DefinitionCatalog;
use crate::error::{ManagerError, Result};
use crate::store::RobotStore;
use crate::types::{
    DeviceCategory, MotorBusDefinition, MotorCalibration, ProtectionKey, Robot, RobotDefinition,
    RobotMotorBusConnection, RobotMotorDefinition, RobotStatus,
};
use crate::verify::verify_motor_bus;
use motor_bus::{BusKind, DiscoveredBus, DiscoveryService, MotorLimit};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::OffsetDateTime;
use uuid::Uuid;

/// What `add_robot` does when only some of a robot's motor buses have an interface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationPolicy {
    /// Skip verification and add the robot as is.
    SkipPartial,
    /// Verify the buses that have an interface.
    #[default]
    VerifyAvailable,
    /// Reject the robot.
    RequireComplete,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub verification_policy: VerificationPolicy,
    /// Narrows the (bus class, baudrate) combinations discovery tries.
    pub discovery_filters: Option<Vec<(BusKind, u32)>>,
}

/// Fields `update_robot` may change; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotUpdate {
    pub name: Option<String>,
    pub labels: Option<BTreeMap<String, String>>,
    pub custom_protection_settings: Option<BTreeMap<ProtectionKey, Vec<MotorLimit>>>,
    pub calibration: Option<BTreeMap<String, MotorCalibration>>,
}

pub struct RobotManager {
    config: ManagerConfig,
    store: RobotStore,
    robots: BTreeMap<String, Robot>,
    pending: BTreeMap<String, Robot>,
    discovery: DiscoveryService,
    definitions: DefinitionCatalog,
}

impl RobotManager {
    /// An empty registry; call [`RobotManager::load`] to read the store.
    pub fn new(
        config: ManagerConfig,
        store: RobotStore,
        discovery: DiscoveryService,
        definitions: DefinitionCatalog,
    ) -> Self {
        Self {
            config,
            store,
            robots: BTreeMap::new(),
            pending: BTreeMap::new(),
            discovery,
            definitions,
        }
    }

    pub fn open(
        config: ManagerConfig,
        store: RobotStore,
        discovery: DiscoveryService,
        definitions: DefinitionCatalog,
    ) -> Result<Self> {
        let mut manager = Self::new(config, store, discovery, definitions);
        manager.load()?;
        Ok(manager)
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn definitions(&self) -> &DefinitionCatalog {
        &self.definitions
    }

    pub fn discovery(&self) -> &DiscoveryService {
        &self.discovery
    }

    pub fn load(&mut self) -> Result<()> {
        let robots = self.store.load()?;
        self.robots = robots.into_iter().map(|r| (r.id.clone(), r)).collect();
        tracing::info!(count = self.robots.len(), path = %self.store.path().display(), "robots loaded");
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        let robots: Vec<Robot> = self.robots.values().cloned().collect();
        self.store.save(&robots)
    }

    pub fn get_robot(&self, id: &str) -> Result<&Robot> {
        self.robots
            .get(id)
            .ok_or_else(|| ManagerError::NotFound(format!("robot {id}")))
    }

    pub fn list_robots(&self) -> impl Iterator<Item = &Robot> {
        self.robots.values()
    }

    /// Candidates from the last [`RobotManager::get_pending_devices`] call.
    pub fn pending(&self) -> impl Iterator<Item = &Robot> {
        self.pending.values()
    }

    /// Check every motor bus of `robot` against live hardware.
    ///
    /// Each bus is built fresh from the connection, connected, scanned and
    /// disconnected again whatever the outcome. Fails with `Validation` when a
    /// bus has no interface and `Conflict` when the hardware does not match.
    pub fn verify_robot(&self, robot: &Robot) -> Result<bool> {
        if robot.motor_bus_connections.is_empty() {
            return Err(ManagerError::Validation(format!(
                "robot {} has no connection interface",
                robot.id
            )));
        }
        let definition = definition_of(robot)?;
        for (name, bus_def) in &definition.motor_buses {
            let conn = robot
                .motor_bus_connections
                .get(name)
                .ok_or_else(|| ManagerError::Validation(format!("robot {}: bus {name} has no connection interface", robot.id)))?;
            self.verify_connection(robot, name, conn, bus_def)?;
        }
        Ok(true)
    }

    fn verify_connection(
        &self,
        robot: &Robot,
        name: &str,
        conn: &RobotMotorBusConnection,
        bus_def: &MotorBusDefinition,
    ) -> Result<()> {
        let interface = conn
            .interface
            .as_deref()
            .ok_or_else(|| ManagerError::Validation(format!("robot {}: bus {name} has no connection interface", robot.id)))?;
        let kind = BusKind::resolve(&conn.motor_bus_type)?;
        let baudrate = conn
            .baudrate
            .or(bus_def.baud_rate)
            .unwrap_or_else(|| kind.default_baudrate());

        let mut bus = self.discovery.factory().create(kind, interface, baudrate)?;
        if !bus.connect() {
            bus.disconnect();
            return Err(ManagerError::Operational(format!(
                "cannot open {kind} bus on {interface} at {baudrate}"
            )));
        }
        let scanned = bus.scan_motors(None);
        let matched = scanned.map(|_| verify_motor_bus(&bus, bus_def));
        bus.disconnect();

        match matched {
            Ok(true) => {
                tracing::debug!(robot = %robot.id, bus = name, interface, "bus verified");
                Ok(())
            }
            Ok(false) => Err(ManagerError::Conflict(format!(
                "robot {} is invalid: motors on {interface} do not match bus {name}",
                robot.id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Re-verify one robot (or all) against a single discovery pass.
    ///
    /// A robot whose buses are all found is `Available` when they match its
    /// definition and `Invalid` otherwise. A robot with a missing bus is removed
    /// when transient and marked `Offline` when not. Removed robots are absent
    /// from the result.
    pub fn refresh_status(&mut self, robot_id: Option<&str>) -> Result<Vec<Robot>> {
        let targets: Vec<String> = match robot_id {
            Some(id) => vec![self.get_robot(id)?.id.clone()],
            None => self.robots.keys().cloned().collect(),
        };
        let discovered = self
            .discovery
            .discover_motor_buses(self.config.discovery_filters.as_deref());

        let mut updated = Vec::new();
        for id in targets {
            let Some(robot) = self.robots.get_mut(&id) else {
                continue;
            };
            match locate(robot, &discovered) {
                Some(found) => {
                    let status = if matches_definition(robot, &found) {
                        RobotStatus::Available
                    } else {
                        RobotStatus::Invalid
                    };
                    for (name, bus) in &found {
                        if let Some(conn) = robot.motor_bus_connections.get_mut(name) {
                            conn.interface = Some(bus.bus.interface().to_string());
                            conn.baudrate = Some(bus.bus.baudrate());
                        }
                    }
                    if robot.status != status {
                        tracing::info!(robot = %id, from = ?robot.status, to = ?status, "robot status changed");
                    }
                    robot.status = status;
                    robot.last_seen = Some(OffsetDateTime::now_utc());
                    updated.push(robot.clone());
                }
                None if robot.is_transient => {
                    tracing::info!(robot = %id, "transient robot disappeared, removing");
                    self.robots.remove(&id);
                }
                None => {
                    if robot.status != RobotStatus::Offline {
                        tracing::info!(robot = %id, from = ?robot.status, "robot went offline");
                    }
                    robot.status = RobotStatus::Offline;
                    updated.push(robot.clone());
                }
            }
        }
        self.save()?;
        Ok(updated)
    }

    /// One discovery pass; every bus not already claimed by a registered robot
    /// becomes a `Pending` candidate with a fresh id and a definition built from
    /// its scan.
    pub fn get_pending_devices(&mut self) -> Result<Vec<Robot>> {
        let discovered = self
            .discovery
            .discover_motor_buses(self.config.discovery_filters.as_deref());
        self.pending.clear();
        for found in &discovered {
            let claimed = self.robots.values().any(|r| {
                r.motor_bus_connections
                    .values()
                    .any(|conn| connection_matches(conn, found))
            });
            if claimed {
                continue;
            }
            let candidate = candidate_from(found);
            tracing::info!(
                id = %candidate.id,
                interface = found.bus.interface(),
                transient = candidate.is_transient,
                "pending device"
            );
            self.pending.insert(candidate.id.clone(), candidate);
        }
        Ok(self.pending.values().cloned().collect())
    }

    /// Register a robot, verifying its hardware first when it carries
    /// connection data. A robot with the id of a pending candidate and no
    /// connections of its own takes the candidate's.
    pub fn add_robot(&mut self, mut robot: Robot) -> Result<Robot> {
        if robot.id.trim().is_empty() {
            return Err(ManagerError::Conflict("device id must not be empty".to_string()));
        }
        if robot.category() == DeviceCategory::Camera {
            return Err(ManagerError::Conflict(format!(
                "{} is a camera; cameras are not managed here",
                robot.id
            )));
        }
        if self.robots.contains_key(&robot.id) {
            return Err(ManagerError::Conflict(format!("robot {} already exists", robot.id)));
        }

        if let Some(candidate) = self.pending.get(&robot.id) {
            if robot.motor_bus_connections.is_empty() {
                robot.motor_bus_connections = candidate.motor_bus_connections.clone();
                robot.is_transient = candidate.is_transient;
            }
            if robot.definition.is_none() {
                robot.definition = candidate.definition.clone();
            }
        }

        if robot.motor_bus_connections.is_empty() {
            tracing::info!(robot = %robot.id, "no connection data, adding without verification");
        } else {
            self.verify_with_policy(&robot)?;
        }

        robot.status = RobotStatus::Available;
        robot.last_seen = Some(OffsetDateTime::now_utc());
        self.pending.remove(&robot.id);
        self.robots.insert(robot.id.clone(), robot.clone());
        self.save()?;
        tracing::info!(robot = %robot.id, name = %robot.name, "robot added");
        Ok(robot)
    }

    fn verify_with_policy(&self, robot: &Robot) -> Result<()> {
        let definition = definition_of(robot)?;
        let (ready, missing): (Vec<_>, Vec<_>) = definition.motor_buses.iter().partition(|(name, _)| {
            robot
                .motor_bus_connections
                .get(*name)
                .is_some_and(|c| c.interface.is_some())
        });
        if !missing.is_empty() {
            let names: Vec<&str> = missing.iter().map(|(n, _)| n.as_str()).collect();
            match self.config.verification_policy {
                VerificationPolicy::SkipPartial => {
                    tracing::warn!(robot = %robot.id, missing = ?names, "partial connection data, skipping verification");
                    return Ok(());
                }
                VerificationPolicy::RequireComplete => {
                    return Err(ManagerError::Validation(format!(
                        "robot {}: no connection interface for {}",
                        robot.id,
                        names.join(", ")
                    )));
                }
                VerificationPolicy::VerifyAvailable => {
                    tracing::warn!(robot = %robot.id, missing = ?names, "verifying connected buses only");
                }
            }
        }
        for (name, bus_def) in ready {
            if let Some(conn) = robot.motor_bus_connections.get(name) {
                self.verify_connection(robot, name, conn, bus_def)?;
            }
        }
        Ok(())
    }

    /// Run [`RobotManager::verify_robot`] on a registered robot and record the outcome.
    pub fn verify_registered(&mut self, id: &str) -> Result<Robot> {
        let robot = self.get_robot(id)?.clone();
        let status = match self.verify_robot(&robot) {
            Ok(_) => RobotStatus::Available,
            Err(ManagerError::Conflict(msg)) => {
                self.set_status(id, RobotStatus::Invalid)?;
                return Err(ManagerError::Conflict(msg));
            }
            Err(e) => return Err(e),
        };
        self.set_status(id, status)
    }

    fn set_status(&mut self, id: &str, status: RobotStatus) -> Result<Robot> {
        let robot = self
            .robots
            .get_mut(id)
            .ok_or_else(|| ManagerError::NotFound(format!("robot {id}")))?;
        robot.status = status;
        if status == RobotStatus::Available {
            robot.last_seen = Some(OffsetDateTime::now_utc());
        }
        let robot = robot.clone();
        self.save()?;
        Ok(robot)
    }

    pub fn update_robot(&mut self, id: &str, update: RobotUpdate) -> Result<Robot> {
        let robot = self
            .robots
            .get_mut(id)
            .ok_or_else(|| ManagerError::NotFound(format!("robot {id}")))?;
        if let Some(name) = update.name {
            robot.name = name;
        }
        if let Some(labels) = update.labels {
            robot.labels = labels;
        }
        if let Some(settings) = update.custom_protection_settings {
            robot.custom_protection_settings = settings;
        }
        if let Some(calibration) = update.calibration {
            robot.calibration = calibration;
        }
        let robot = robot.clone();
        self.save()?;
        Ok(robot)
    }

    pub fn remove_robot(&mut self, id: &str) -> Result<Robot> {
        let robot = self
            .robots
            .remove(id)
            .ok_or_else(|| ManagerError::NotFound(format!("robot {id}")))?;
        self.save()?;
        tracing::info!(robot = %id, "robot removed");
        Ok(robot)
    }
}

fn definition_of(robot: &Robot) -> Result<&RobotDefinition> {
    robot
        .definition
        .as_ref()
        .ok_or_else(|| ManagerError::Validation(format!("robot {} has no definition", robot.id)))
}

/// Same bus class, and the same serial number when both sides report one,
/// otherwise the same interface.
fn connection_matches(conn: &RobotMotorBusConnection, found: &DiscoveredBus) -> bool {
    let Ok(kind) = BusKind::resolve(&conn.motor_bus_type) else {
        return false;
    };
    if kind != found.bus.kind() {
        return false;
    }
    match (conn.serial_number.as_deref(), found.serial_number.as_deref()) {
        (Some(expected), Some(reported)) => expected == reported,
        _ => conn.interface.as_deref() == Some(found.bus.interface()),
    }
}

/// The discovered bus for every connection of `robot`, or `None` when any is missing.
fn locate<'a>(robot: &Robot, discovered: &'a [DiscoveredBus]) -> Option<BTreeMap<String, &'a DiscoveredBus>> {
    if robot.motor_bus_connections.is_empty() {
        return None;
    }
    robot
        .motor_bus_connections
        .iter()
        .map(|(name, conn)| {
            discovered
                .iter()
                .find(|d| connection_matches(conn, d))
                .map(|d| (name.clone(), d))
        })
        .collect()
}

fn matches_definition(robot: &Robot, found: &BTreeMap<String, &DiscoveredBus>) -> bool {
    let Some(definition) = robot.definition.as_ref() else {
        return false;
    };
    found.iter().all(|(name, d)| {
        definition
            .motor_buses
            .get(name)
            .is_some_and(|bus_def| verify_motor_bus(&d.bus, bus_def))
    })
}

fn candidate_from(found: &DiscoveredBus) -> Robot {
    let kind = found.bus.kind();
    let interface = found.bus.interface();
    let name = format!("{} arm on {interface}", capitalise(kind.name()));

    let motors: BTreeMap<String, RobotMotorDefinition> = found
        .bus
        .motors()
        .iter()
        .enumerate()
        .map(|(n, (id, entry))| {
            // zero-padded so slot order is bus order
            let slot = format!("{n:03}");
            let def = RobotMotorDefinition {
                name: format!("motor_{n}"),
                id: *id,
                brand: entry.handle.brand,
                model: entry.model.model.clone(),
                variant: entry.model.variant.clone(),
                drive_mode: 0,
                need_calibration: true,
            };
            (slot, def)
        })
        .collect();

    let bus_name = "main".to_string();
    let mut robot = Robot::new(Uuid::new_v4().to_string(), name.clone());
    robot.status = RobotStatus::Pending;
    robot.is_transient = found.serial_number.is_none();
    robot.last_seen = Some(OffsetDateTime::now_utc());
    robot.motor_bus_connections.insert(
        bus_name.clone(),
        RobotMotorBusConnection {
            motor_bus_type: kind.name().to_string(),
            interface: Some(interface.to_string()),
            baudrate: Some(found.bus.baudrate()),
            serial_number: found.serial_number.clone(),
        },
    );
    robot.definition = Some(RobotDefinition {
        id: format!("discovered-{kind}"),
        display_name: name,
        description: found
            .manufacturer
            .as_deref()
            .map(|m| format!("Discovered via {m} adapter"))
            .unwrap_or_default(),
        device_category: Some(DeviceCategory::Robot),
        motor_buses: BTreeMap::from([(
            bus_name,
            MotorBusDefinition {
                bus_type: kind.name().to_string(),
                motors,
                baud_rate: Some(found.bus.baudrate()),
            },
        )]),
        urdf: None,
    });
    robot
}

fn capitalise(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
