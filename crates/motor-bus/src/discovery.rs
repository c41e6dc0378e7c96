//! Finds motor buses on the host's serial ports and CAN adapters.

use crate::bus::{create_driver, BusKind, MotorBus};
use crate::{ModelCatalog, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One serial port as reported by the OS.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialPortInfo {
    pub port: String,
    pub description: Option<String>,
    pub serial_number: Option<String>,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
    pub manufacturer: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanInterfaceInfo {
    pub interface: String,
    pub manufacturer: Option<String>,
    pub serial_number: Option<String>,
}

/// Platform transport enumeration.
pub trait TransportEnumerator: Send + Sync {
    fn discover_serial_ports(&self) -> Vec<SerialPortInfo>;
    fn discover_can_interfaces(&self) -> Vec<CanInterfaceInfo>;
}

/// USB vendor/product pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsbId {
    pub vid: u16,
    pub pid: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// USB serial devices that are SLCAN adapters rather than servo buses.
    pub can_adapters: Vec<UsbId>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            // CANable running slcan firmware
            can_adapters: vec![UsbId { vid: 0xAD50, pid: 0x60C4 }],
        }
    }
}

/// Enumerates USB serial ports through `serialport`, splitting off known SLCAN adapters.
#[derive(Debug, Clone, Default)]
pub struct SystemTransports {
    config: DiscoveryConfig,
}

impl SystemTransports {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self { config }
    }

    fn usb_ports(&self) -> Vec<(SerialPortInfo, bool)> {
        let ports = match serialport::available_ports() {
            Ok(ports) => ports,
            Err(e) => {
                tracing::warn!(error = %e, "serial port enumeration failed");
                return Vec::new();
            }
        };
        ports
            .into_iter()
            .filter_map(|p| match p.port_type {
                serialport::SerialPortType::UsbPort(usb) => {
                    let is_can = self
                        .config
                        .can_adapters
                        .contains(&UsbId { vid: usb.vid, pid: usb.pid });
                    Some((
                        SerialPortInfo {
                            port: p.port_name,
                            description: usb.product,
                            serial_number: usb.serial_number,
                            vid: Some(usb.vid),
                            pid: Some(usb.pid),
                            manufacturer: usb.manufacturer,
                        },
                        is_can,
                    ))
                }
                _ => None,
            })
            .collect()
    }
}

impl TransportEnumerator for SystemTransports {
    fn discover_serial_ports(&self) -> Vec<SerialPortInfo> {
        self.usb_ports()
            .into_iter()
            .filter_map(|(info, is_can)| (!is_can).then_some(info))
            .collect()
    }

    fn discover_can_interfaces(&self) -> Vec<CanInterfaceInfo> {
        self.usb_ports()
            .into_iter()
            .filter_map(|(info, is_can)| {
                is_can.then(|| CanInterfaceInfo {
                    interface: info.port,
                    manufacturer: info.manufacturer,
                    serial_number: info.serial_number,
                })
            })
            .collect()
    }
}

/// Builds unconnected buses; swapped for a fake in tests.
pub trait BusFactory: Send + Sync {
    fn create(&self, kind: BusKind, interface: &str, baudrate: u32) -> Result<MotorBus>;
}

#[derive(Debug, Clone)]
pub struct HardwareBusFactory {
    catalog: Arc<ModelCatalog>,
}

impl HardwareBusFactory {
    pub fn new(catalog: Arc<ModelCatalog>) -> Self {
        Self { catalog }
    }
}

impl BusFactory for HardwareBusFactory {
    fn create(&self, kind: BusKind, interface: &str, baudrate: u32) -> Result<MotorBus> {
        Ok(MotorBus::new(
            kind,
            create_driver(kind, interface, Some(baudrate), self.catalog.clone()),
        ))
    }
}

/// A bus that answered, with OS-reported metadata of its transport. The bus is
/// returned disconnected; its registry holds the scan result.
#[derive(Debug)]
pub struct DiscoveredBus {
    pub bus: MotorBus,
    pub serial_number: Option<String>,
    pub manufacturer: Option<String>,
}

pub struct DiscoveryService {
    transports: Arc<dyn TransportEnumerator>,
    factory: Arc<dyn BusFactory>,
}

impl DiscoveryService {
    pub fn new(transports: Arc<dyn TransportEnumerator>, factory: Arc<dyn BusFactory>) -> Self {
        Self { transports, factory }
    }

    /// Hardware discovery with the given adapter list and model tables.
    pub fn system(config: DiscoveryConfig, catalog: Arc<ModelCatalog>) -> Self {
        Self::new(
            Arc::new(SystemTransports::new(config)),
            Arc::new(HardwareBusFactory::new(catalog)),
        )
    }

    pub fn transports(&self) -> &Arc<dyn TransportEnumerator> {
        &self.transports
    }

    pub fn factory(&self) -> &Arc<dyn BusFactory> {
        &self.factory
    }

    /// Try every allowed (bus class, baudrate) on every transport; the first
    /// combination whose scan finds motors wins and the transport is not probed
    /// further. `filters` narrows the combinations tried.
    pub fn discover_motor_buses(&self, filters: Option<&[(BusKind, u32)]>) -> Vec<DiscoveredBus> {
        let mut out = Vec::new();
        for port in self.transports.discover_serial_ports() {
            let found = self.probe(&port.port, &BusKind::serial_types(), filters);
            out.extend(found.map(|bus| DiscoveredBus {
                bus,
                serial_number: port.serial_number.clone(),
                manufacturer: port.manufacturer.clone(),
            }));
        }
        for can in self.transports.discover_can_interfaces() {
            let found = self.probe(&can.interface, &BusKind::can_types(), filters);
            out.extend(found.map(|bus| DiscoveredBus {
                bus,
                serial_number: can.serial_number.clone(),
                manufacturer: can.manufacturer.clone(),
            }));
        }
        out
    }

    fn probe(&self, interface: &str, kinds: &[BusKind], filters: Option<&[(BusKind, u32)]>) -> Option<MotorBus> {
        let attempts: Vec<(BusKind, u32)> = match filters {
            Some(filters) => filters.iter().copied().filter(|(k, _)| kinds.contains(k)).collect(),
            None => kinds
                .iter()
                .flat_map(|&k| k.supported_baudrates().iter().map(move |&b| (k, b)))
                .collect(),
        };
        for (kind, baudrate) in attempts {
            let mut bus = match self.factory.create(kind, interface, baudrate) {
                Ok(bus) => bus,
                Err(e) => {
                    tracing::warn!(%kind, interface, error = %e, "cannot build bus");
                    continue;
                }
            };
            if !bus.connect() {
                tracing::debug!(%kind, interface, baudrate, "connect failed");
                bus.disconnect();
                continue;
            }
            match bus.scan_motors(None) {
                Ok(found) if !found.is_empty() => {
                    tracing::info!(%kind, interface, baudrate, motors = found.len(), "motor bus discovered");
                    bus.disconnect();
                    return Some(bus);
                }
                Ok(_) => tracing::debug!(%kind, interface, baudrate, "no motors answered"),
                Err(e) => tracing::warn!(%kind, interface, baudrate, error = %e, "scan failed"),
            }
            bus.disconnect();
        }
        None
    }
}
