//! Scriptable in-process hardware for tests and dry runs.
//!
//! A [`MockHandle`] is the "physical" side: the motors attached to one interface,
//! their scripted readings and a log of every call a driver made. Handles are
//! shared, so a test keeps one while the driver built on it moves into a bus or
//! telemetry session.

use crate::bus::{BusKind, MotorBus};
use crate::discovery::{BusFactory, CanInterfaceInfo, SerialPortInfo, TransportEnumerator};
use crate::drivers::{MotorDriver, Telemetry};
use crate::{Brand, MotorError, MotorId, MotorModelInfo, Result};
use std::collections::{BTreeMap, VecDeque};
use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Connect,
    Disconnect,
    Ping(MotorId),
    Scan,
    ReadTelemetry(MotorId),
    SetPosition(MotorId, f64),
    SetTorque(MotorId, bool),
    Reboot(MotorId),
}

#[derive(Debug, Default)]
struct MockState {
    motors: BTreeMap<MotorId, MotorModelInfo>,
    scripted: BTreeMap<MotorId, VecDeque<Option<Telemetry>>>,
    steady: BTreeMap<MotorId, Telemetry>,
    calls: Vec<MockCall>,
    refuse_connect: bool,
    torque_fault: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MockHandle(Arc<Mutex<MockState>>);

impl MockHandle {
    fn state(&self) -> MutexGuard<'_, MockState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_motor(&self, id: MotorId, model: MotorModelInfo) {
        self.state().motors.insert(id, model);
    }

    pub fn remove_motor(&self, id: &MotorId) {
        self.state().motors.remove(id);
    }

    /// Reading returned when nothing is scripted for `id`.
    pub fn set_reading(&self, id: MotorId, telemetry: Telemetry) {
        self.state().steady.insert(id, telemetry);
    }

    /// Queue one reading; `None` simulates a missed reply.
    pub fn push_reading(&self, id: MotorId, telemetry: Option<Telemetry>) {
        self.state().scripted.entry(id).or_default().push_back(telemetry);
    }

    pub fn refuse_connect(&self, refuse: bool) {
        self.state().refuse_connect = refuse;
    }

    /// Make `set_torque` fail with a driver error instead of answering.
    pub fn torque_fault(&self, fault: bool) {
        self.state().torque_fault = fault;
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state().calls.clone()
    }

    pub fn torque_calls(&self, id: &MotorId) -> Vec<bool> {
        self.state()
            .calls
            .iter()
            .filter_map(|c| match c {
                MockCall::SetTorque(i, on) if i == id => Some(*on),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, call: &MockCall) -> usize {
        self.state().calls.iter().filter(|c| *c == call).count()
    }

    fn record(&self, call: MockCall) {
        self.state().calls.push(call);
    }
}

pub struct MockDriver {
    brand: Brand,
    interface: String,
    baudrate: u32,
    connected: bool,
    hw: MockHandle,
}

impl MockDriver {
    pub fn new(brand: Brand, interface: &str, baudrate: u32, hw: MockHandle) -> Self {
        Self {
            brand,
            interface: interface.to_string(),
            baudrate,
            connected: false,
            hw,
        }
    }

    pub fn handle(&self) -> MockHandle {
        self.hw.clone()
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(MotorError::NotConnected(self.interface.clone()))
        }
    }

    fn present(&self, id: &MotorId) -> bool {
        self.hw.state().motors.contains_key(id)
    }
}

impl MotorDriver for MockDriver {
    fn brand(&self) -> Brand {
        self.brand
    }

    fn interface(&self) -> &str {
        &self.interface
    }

    fn baudrate(&self) -> u32 {
        self.baudrate
    }

    fn connect(&mut self) -> bool {
        self.hw.record(MockCall::Connect);
        self.connected = !self.hw.state().refuse_connect;
        self.connected
    }

    fn disconnect(&mut self) {
        if self.connected {
            self.hw.record(MockCall::Disconnect);
        }
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn default_scan_range(&self) -> RangeInclusive<u32> {
        0..=253
    }

    fn ping(&mut self, id: &MotorId) -> Result<bool> {
        self.ensure_connected()?;
        self.hw.record(MockCall::Ping(*id));
        Ok(self.present(id))
    }

    fn scan(&mut self, range: Option<RangeInclusive<u32>>) -> Result<BTreeMap<MotorId, MotorModelInfo>> {
        self.ensure_connected()?;
        self.hw.record(MockCall::Scan);
        let range = range.unwrap_or_else(|| self.default_scan_range());
        Ok(self
            .hw
            .state()
            .motors
            .iter()
            .filter(|(id, _)| range.contains(&id.send_id()))
            .map(|(id, m)| (*id, m.clone()))
            .collect())
    }

    fn identify_model(&mut self, id: &MotorId) -> Result<Option<MotorModelInfo>> {
        self.ensure_connected()?;
        Ok(self.hw.state().motors.get(id).cloned())
    }

    fn read_telemetry(&mut self, id: &MotorId) -> Result<Option<Telemetry>> {
        self.ensure_connected()?;
        self.hw.record(MockCall::ReadTelemetry(*id));
        let mut state = self.hw.state();
        if !state.motors.contains_key(id) {
            return Ok(None);
        }
        if let Some(next) = state.scripted.get_mut(id).and_then(VecDeque::pop_front) {
            return Ok(next);
        }
        Ok(Some(state.steady.get(id).cloned().unwrap_or_default()))
    }

    fn set_position(&mut self, id: &MotorId, target: f64, _speed: Option<f64>) -> Result<bool> {
        self.ensure_connected()?;
        self.hw.record(MockCall::SetPosition(*id, target));
        Ok(self.present(id))
    }

    fn set_torque(&mut self, id: &MotorId, enabled: bool) -> Result<bool> {
        self.ensure_connected()?;
        self.hw.record(MockCall::SetTorque(*id, enabled));
        if self.hw.state().torque_fault {
            return Err(MotorError::NotConnected(format!("{} (injected fault)", self.interface)));
        }
        Ok(self.present(id))
    }

    fn reboot(&mut self, id: &MotorId) -> Result<bool> {
        self.ensure_connected()?;
        self.hw.record(MockCall::Reboot(*id));
        Ok(self.present(id))
    }
}

/// Fixed list of ports and CAN interfaces.
#[derive(Debug, Clone, Default)]
pub struct MockTransports {
    serial: Vec<SerialPortInfo>,
    can: Vec<CanInterfaceInfo>,
}

impl MockTransports {
    pub fn with_serial(mut self, port: &str, serial_number: Option<&str>, manufacturer: Option<&str>) -> Self {
        self.serial.push(SerialPortInfo {
            port: port.to_string(),
            serial_number: serial_number.map(str::to_string),
            manufacturer: manufacturer.map(str::to_string),
            ..Default::default()
        });
        self
    }

    pub fn with_can(mut self, interface: &str, manufacturer: Option<&str>) -> Self {
        self.can.push(CanInterfaceInfo {
            interface: interface.to_string(),
            manufacturer: manufacturer.map(str::to_string),
            serial_number: None,
        });
        self
    }
}

impl TransportEnumerator for MockTransports {
    fn discover_serial_ports(&self) -> Vec<SerialPortInfo> {
        self.serial.clone()
    }

    fn discover_can_interfaces(&self) -> Vec<CanInterfaceInfo> {
        self.can.clone()
    }
}

type Attempt = (BusKind, String, u32);

#[derive(Debug, Default)]
struct FactoryState {
    attached: BTreeMap<String, (BusKind, u32, MockHandle)>,
    attempts: Vec<Attempt>,
    /// Shared by every combination that matches no attached device.
    unattached: MockHandle,
}

/// Hands out [`MockDriver`]s. A bus built with the kind and baudrate of the device
/// attached to its interface sees that device; any other combination sees an
/// empty bus whose calls land on [`MockBusFactory::unattached`].
#[derive(Debug, Clone, Default)]
pub struct MockBusFactory(Arc<Mutex<FactoryState>>);

impl MockBusFactory {
    fn state(&self) -> MutexGuard<'_, FactoryState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn attach(&self, interface: &str, kind: BusKind, baudrate: u32, hw: MockHandle) {
        self.state().attached.insert(interface.to_string(), (kind, baudrate, hw));
    }

    pub fn detach(&self, interface: &str) {
        self.state().attached.remove(interface);
    }

    /// Every (kind, interface, baudrate) a bus was built for, in order.
    pub fn attempts(&self) -> Vec<Attempt> {
        self.state().attempts.clone()
    }

    pub fn unattached(&self) -> MockHandle {
        self.state().unattached.clone()
    }

    /// The driver [`BusFactory::create`] would wrap.
    pub fn driver(&self, kind: BusKind, interface: &str, baudrate: u32) -> MockDriver {
        let state = self.state();
        let hw = match state.attached.get(interface) {
            Some((k, b, hw)) if *k == kind && *b == baudrate => hw.clone(),
            _ => state.unattached.clone(),
        };
        drop(state);
        MockDriver::new(kind.brand(), interface, baudrate, hw)
    }
}

impl BusFactory for MockBusFactory {
    fn create(&self, kind: BusKind, interface: &str, baudrate: u32) -> Result<MotorBus> {
        self.state().attempts.push((kind, interface.to_string(), baudrate));
        Ok(MotorBus::new(kind, Box::new(self.driver(kind, interface, baudrate))))
    }
}
