//! Damiao DM-series motors over CAN (MIT mode).
//!
//! Every motor has a command id S and answers on a separate master id R. Both are
//! configurable per motor, so the pairing is learned during a scan: register
//! queries go to the shared management id `0x7FF` and the reply arrives on R with
//! S encoded in its payload. Motors are therefore addressed by
//! [`MotorId::SendRecv`]; a plain id cannot be routed.

use super::{absorb, MotorDriver, Telemetry};
use crate::{Brand, ModelCatalog, MotorError, MotorId, MotorModelInfo, Result};
use can_transport::{CanBus, CanFrame, CanId, SlcanBitrate, SlcanBus, TransportError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::{Duration, Instant};

const MANAGEMENT_ID: u16 = 0x7FF;
const CMD_READ_REGISTER: u8 = 0x33;
const CMD_REFRESH: u8 = 0xCC;

const RID_PMAX: u8 = 21;
const RID_VMAX: u8 = 22;
const RID_TMAX: u8 = 23;

const ENABLE: [u8; 8] = [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFC];
const DISABLE: [u8; 8] = [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFD];
const CLEAR_ERROR: [u8; 8] = [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFB];

const KP_MAX: f64 = 500.0;
const KD_MAX: f64 = 5.0;

/// Frames inspected while waiting for one reply before giving up.
const MAX_FRAMES_PER_REPLY: usize = 64;
/// Velocity below which the motor counts as standing still (rad/s).
const MOVING_THRESHOLD: f64 = 0.05;

/// Gains and mapping ranges for MIT commands.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DamiaoConfig {
    pub kp: f64,
    pub kd: f64,
    pub reply_timeout_ms: u64,
    /// Used when a motor's PMAX/VMAX/TMAX registers could not be read.
    pub fallback_ranges: MitRanges,
}

impl Default for DamiaoConfig {
    fn default() -> Self {
        Self {
            kp: 10.0,
            kd: 0.5,
            reply_timeout_ms: 10,
            fallback_ranges: MitRanges::default(),
        }
    }
}

/// Symmetric ranges the 16/12-bit MIT fields are mapped onto.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MitRanges {
    pub pmax: f64,
    pub vmax: f64,
    pub tmax: f64,
}

impl Default for MitRanges {
    fn default() -> Self {
        // DM4310 factory settings
        Self {
            pmax: 12.5,
            vmax: 30.0,
            tmax: 10.0,
        }
    }
}

pub struct DamiaoDriver {
    interface: String,
    bitrate: u32,
    config: DamiaoConfig,
    catalog: Arc<ModelCatalog>,
    preset: Option<Box<dyn CanBus + Send>>,
    bus: Option<Box<dyn CanBus + Send>>,
    ranges: BTreeMap<u32, MitRanges>,
}

impl DamiaoDriver {
    pub fn new(interface: &str, bitrate: u32, config: DamiaoConfig, catalog: Arc<ModelCatalog>) -> Self {
        Self {
            interface: interface.to_string(),
            bitrate,
            config,
            catalog,
            preset: None,
            bus: None,
            ranges: BTreeMap::new(),
        }
    }

    /// Driver over an already opened CAN interface.
    pub fn with_bus(bus: Box<dyn CanBus + Send>, bitrate: u32, config: DamiaoConfig, catalog: Arc<ModelCatalog>) -> Self {
        let name = bus.name().to_string();
        Self {
            preset: Some(bus),
            ..Self::new(&name, bitrate, config, catalog)
        }
    }

    fn bus(&mut self) -> Result<&mut (dyn CanBus + Send)> {
        match self.bus.as_deref_mut() {
            Some(bus) => Ok(bus),
            None => Err(MotorError::NotConnected(self.interface.clone())),
        }
    }

    fn pair(id: &MotorId) -> Result<(u32, u32)> {
        match *id {
            MotorId::SendRecv(send, recv) if send <= 0x7FF && recv <= 0x7FF => Ok((send, recv)),
            _ => Err(MotorError::InvalidId {
                brand: Brand::Damiao,
                id: *id,
            }),
        }
    }

    fn send(&mut self, arbitration: u32, payload: &[u8]) -> Result<()> {
        let id = CanId::from_raw(arbitration).ok_or(TransportError::InvalidFrame("arbitration id out of range"))?;
        let frame = CanFrame::new(id, payload).ok_or(TransportError::InvalidFrame("payload longer than 8 bytes"))?;
        self.bus()?.send(&frame)?;
        Ok(())
    }

    /// Wait for the first frame accepted by `pick`, skipping unrelated traffic.
    fn await_reply<T>(&mut self, mut pick: impl FnMut(&CanFrame) -> Option<T>) -> Result<T> {
        let timeout = Duration::from_millis(self.config.reply_timeout_ms);
        let deadline = Instant::now() + timeout;
        let bus = self.bus()?;
        for _ in 0..MAX_FRAMES_PER_REPLY {
            let left = deadline.saturating_duration_since(Instant::now());
            let frame = bus.recv(Some(left.as_millis() as u64))?;
            if let Some(v) = pick(&frame) {
                return Ok(v);
            }
        }
        Err(TransportError::Timeout.into())
    }

    /// Register query through the management id. Returns `(source, reply_arbitration, value)`.
    fn query_register(&mut self, target: u32, rid: u8) -> Result<(u32, u32, [u8; 4])> {
        self.bus()?.drain();
        let [lo, hi, ..] = target.to_le_bytes();
        self.send(u32::from(MANAGEMENT_ID), &[lo, hi, CMD_READ_REGISTER, rid, 0, 0, 0, 0])?;
        self.await_reply(|f| {
            let p = f.payload();
            (p.len() == 8 && p[2] == CMD_READ_REGISTER && p[3] == rid).then(|| {
                let source = u32::from(u16::from_le_bytes([p[0], p[1]]));
                (source, f.id.raw(), [p[4], p[5], p[6], p[7]])
            })
        })
    }

    fn read_register_f32(&mut self, (send, recv): (u32, u32), rid: u8) -> Result<f32> {
        let (source, arb, value) = self.query_register(send, rid)?;
        if source != send || arb != recv {
            return Err(MotorError::Protocol(format!(
                "register reply from 0x{source:02X}/0x{arb:02X}, expected 0x{send:02X}/0x{recv:02X}"
            )));
        }
        Ok(f32::from_le_bytes(value))
    }

    /// Command on the motor's own id, acknowledged by a feedback frame on its recv id.
    fn command(&mut self, (send, recv): (u32, u32), payload: &[u8; 8]) -> Result<Feedback> {
        self.bus()?.drain();
        self.send(send, payload)?;
        self.await_feedback(recv)
    }

    fn await_feedback(&mut self, recv: u32) -> Result<Feedback> {
        let ranges = self.ranges_for(recv);
        self.await_reply(|f| (f.id.raw() == recv && f.payload().len() == 8).then(|| Feedback::decode(f.payload(), &ranges)))
    }

    fn ranges_for(&self, recv: u32) -> MitRanges {
        self.ranges.get(&recv).copied().unwrap_or(self.config.fallback_ranges)
    }

    /// Read PMAX/VMAX/TMAX so feedback can be scaled. Returns TMAX.
    fn learn_ranges(&mut self, pair: (u32, u32)) -> Result<f32> {
        let tmax = self.read_register_f32(pair, RID_TMAX)?;
        let fallback = self.config.fallback_ranges;
        let pmax = self.read_register_f32(pair, RID_PMAX).map(f64::from).unwrap_or(fallback.pmax);
        let vmax = self.read_register_f32(pair, RID_VMAX).map(f64::from).unwrap_or(fallback.vmax);
        self.ranges.insert(
            pair.1,
            MitRanges {
                pmax,
                vmax,
                tmax: f64::from(tmax),
            },
        );
        Ok(tmax)
    }

    fn model_for_tmax(&self, tmax: f32) -> Result<Option<MotorModelInfo>> {
        let key = tmax.round().max(0.0) as u32;
        match self.catalog.lookup(Brand::Damiao, key) {
            Ok(info) => Ok(Some(info.clone())),
            Err(MotorError::ModelNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn mit_frame(&self, recv: u32, position: f64, velocity: f64) -> [u8; 8] {
        let r = self.ranges_for(recv);
        let p = float_to_uint(position, -r.pmax, r.pmax, 16);
        let v = float_to_uint(velocity, -r.vmax, r.vmax, 12);
        let kp = float_to_uint(self.config.kp, 0.0, KP_MAX, 12);
        let kd = float_to_uint(self.config.kd, 0.0, KD_MAX, 12);
        let t = float_to_uint(0.0, -r.tmax, r.tmax, 12);
        [
            (p >> 8) as u8,
            p as u8,
            (v >> 4) as u8,
            (((v & 0xF) << 4) | (kp >> 8)) as u8,
            kp as u8,
            (kd >> 4) as u8,
            (((kd & 0xF) << 4) | (t >> 8)) as u8,
            t as u8,
        ]
    }
}

impl MotorDriver for DamiaoDriver {
    fn brand(&self) -> Brand {
        Brand::Damiao
    }

    fn interface(&self) -> &str {
        &self.interface
    }

    fn baudrate(&self) -> u32 {
        self.bitrate
    }

    fn connect(&mut self) -> bool {
        if self.bus.is_some() {
            return true;
        }
        let opened: Result<Box<dyn CanBus + Send>> = match self.preset.take() {
            Some(bus) => Ok(bus),
            None => SlcanBus::open_with(&self.interface, SlcanBitrate::from_bps(self.bitrate))
                .map(|b| Box::new(b) as Box<dyn CanBus + Send>)
                .map_err(MotorError::from),
        };
        match opened {
            Ok(bus) => {
                self.bus = Some(bus);
                true
            }
            Err(e) => {
                tracing::debug!(interface = %self.interface, bitrate = self.bitrate, error = %e, "CAN open failed");
                false
            }
        }
    }

    fn disconnect(&mut self) {
        self.bus = None;
    }

    fn is_connected(&self) -> bool {
        self.bus.is_some()
    }

    fn default_scan_range(&self) -> RangeInclusive<u32> {
        0x01..=0x1F
    }

    fn ping(&mut self, id: &MotorId) -> Result<bool> {
        let (send, recv) = Self::pair(id)?;
        self.bus()?.drain();
        let [lo, hi, ..] = send.to_le_bytes();
        let r = self
            .send(u32::from(MANAGEMENT_ID), &[lo, hi, CMD_REFRESH, 0, 0, 0, 0, 0])
            .and_then(|_| self.await_feedback(recv))
            .map(|_| true);
        absorb(Brand::Damiao, "ping", r, false)
    }

    /// Probes each candidate through the management id. A reply pairs the probed
    /// id with the arbitration id it came back on; both ids are then consumed and
    /// never probed again.
    fn scan(&mut self, range: Option<RangeInclusive<u32>>) -> Result<BTreeMap<MotorId, MotorModelInfo>> {
        let range = range.unwrap_or_else(|| self.default_scan_range());
        self.bus()?;
        let mut consumed = BTreeSet::new();
        let mut found = BTreeMap::new();
        for candidate in range {
            if consumed.contains(&candidate) || candidate > u32::from(MANAGEMENT_ID) {
                continue;
            }
            let (source, arbitration, value) = match self.query_register(candidate, RID_TMAX) {
                Ok(reply) => reply,
                Err(e) if e.is_transient() => continue,
                Err(e) => return Err(e),
            };
            // A reply naming another source means the candidate is that motor's
            // recv id.
            let pair = if source == candidate {
                (candidate, arbitration)
            } else {
                (source, candidate)
            };
            consumed.insert(pair.0);
            consumed.insert(pair.1);
            let id = MotorId::SendRecv(pair.0, pair.1);
            if found.contains_key(&id) {
                continue;
            }

            let tmax = f32::from_le_bytes(value);
            let tmax = match self.learn_ranges(pair) {
                Ok(t) => t,
                Err(e) if e.is_transient() => tmax,
                Err(e) => return Err(e),
            };
            match self.model_for_tmax(tmax)? {
                Some(info) => {
                    tracing::debug!(%id, model = %info.full_name(), "damiao motor found");
                    found.insert(id, info);
                }
                None => tracing::warn!(%id, tmax, "unrecognised damiao model"),
            }
        }
        Ok(found)
    }

    fn identify_model(&mut self, id: &MotorId) -> Result<Option<MotorModelInfo>> {
        let pair = Self::pair(id)?;
        match absorb(Brand::Damiao, "identify", self.learn_ranges(pair).map(Some), None)? {
            Some(tmax) => self.model_for_tmax(tmax),
            None => Ok(None),
        }
    }

    fn read_telemetry(&mut self, id: &MotorId) -> Result<Option<Telemetry>> {
        let (send, recv) = Self::pair(id)?;
        self.bus()?.drain();
        let [lo, hi, ..] = send.to_le_bytes();
        let r = self
            .send(u32::from(MANAGEMENT_ID), &[lo, hi, CMD_REFRESH, 0, 0, 0, 0, 0])
            .and_then(|_| self.await_feedback(recv))
            .map(|fb| Some(fb.into_telemetry()));
        absorb(Brand::Damiao, "read_telemetry", r, None)
    }

    fn set_position(&mut self, id: &MotorId, target: f64, speed: Option<f64>) -> Result<bool> {
        let pair = Self::pair(id)?;
        self.bus()?;
        let frame = self.mit_frame(pair.1, target, speed.unwrap_or(0.0));
        let r = self.command(pair, &frame).map(|_| true);
        absorb(Brand::Damiao, "set_position", r, false)
    }

    fn set_torque(&mut self, id: &MotorId, enabled: bool) -> Result<bool> {
        let pair = Self::pair(id)?;
        self.bus()?;
        let r = self.command(pair, if enabled { &ENABLE } else { &DISABLE }).map(|_| true);
        absorb(Brand::Damiao, "set_torque", r, false)
    }

    /// Clears a latched fault; the motor comes back disabled.
    fn reboot(&mut self, id: &MotorId) -> Result<bool> {
        let pair = Self::pair(id)?;
        self.bus()?;
        let r = self.command(pair, &CLEAR_ERROR).map(|_| true);
        absorb(Brand::Damiao, "reboot", r, false)
    }
}

/// Decoded MIT feedback frame.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Feedback {
    state: u8,
    position: f64,
    velocity: f64,
    torque: f64,
    t_mos: u8,
    t_rotor: u8,
}

impl Feedback {
    fn decode(d: &[u8], r: &MitRanges) -> Self {
        let p = (u32::from(d[1]) << 8) | u32::from(d[2]);
        let v = (u32::from(d[3]) << 4) | (u32::from(d[4]) >> 4);
        let t = ((u32::from(d[4]) & 0xF) << 8) | u32::from(d[5]);
        Self {
            state: d[0] >> 4,
            position: uint_to_float(p, -r.pmax, r.pmax, 16),
            velocity: uint_to_float(v, -r.vmax, r.vmax, 12),
            torque: uint_to_float(t, -r.tmax, r.tmax, 12),
            t_mos: d[6],
            t_rotor: d[7],
        }
    }

    fn into_telemetry(self) -> Telemetry {
        Telemetry {
            position: self.position,
            velocity: self.velocity,
            current: None,
            load: Some(self.torque),
            temperature: f64::from(self.t_mos.max(self.t_rotor)),
            voltage: None,
            moving: self.velocity.abs() > MOVING_THRESHOLD,
            goal_position: None,
            // 0 = disabled, 1 = enabled, 8.. = fault codes
            error_flags: if self.state >= 8 { self.state } else { 0 },
        }
    }
}

fn float_to_uint(x: f64, min: f64, max: f64, bits: u32) -> u32 {
    let full = f64::from((1u32 << bits) - 1);
    let x = x.clamp(min, max);
    ((x - min) * full / (max - min)).round() as u32
}

fn uint_to_float(raw: u32, min: f64, max: f64, bits: u32) -> f64 {
    let full = f64::from((1u32 << bits) - 1);
    f64::from(raw) * (max - min) / full + min
}

#[cfg(test)]
mod tests {
    use super::*;
    use can_transport::{MockBus, SentFrames};

    /// Simulated motor: command id `send`, answers on `recv`, TMAX `tmax`.
    #[derive(Clone, Copy)]
    struct SimMotor {
        send: u32,
        recv: u32,
        tmax: f32,
    }

    fn frame(arb: u32, payload: &[u8]) -> CanFrame {
        CanFrame::new(CanId::from_raw(arb).unwrap(), payload).unwrap()
    }

    fn feedback(m: &SimMotor, state: u8) -> CanFrame {
        // position 0, velocity 0, torque 0
        frame(m.recv, &[(state << 4) | (m.send as u8 & 0xF), 0x80, 0x00, 0x80, 0x08, 0x00, 30, 33])
    }

    fn bus(motors: Vec<SimMotor>) -> (MockBus, SentFrames) {
        let bus = MockBus::with_responder("can-sim", move |f| {
            let p = f.payload();
            if f.id.raw() == u32::from(MANAGEMENT_ID) {
                let target = u32::from(u16::from_le_bytes([p[0], p[1]]));
                let Some(m) = motors.iter().find(|m| m.send == target) else {
                    return Vec::new();
                };
                return match p[2] {
                    CMD_READ_REGISTER => {
                        let value = match p[3] {
                            RID_PMAX => 12.5f32,
                            RID_VMAX => 30.0,
                            RID_TMAX => m.tmax,
                            _ => 0.0,
                        };
                        let v = value.to_le_bytes();
                        vec![frame(m.recv, &[p[0], p[1], CMD_READ_REGISTER, p[3], v[0], v[1], v[2], v[3]])]
                    }
                    CMD_REFRESH => vec![feedback(m, 1)],
                    _ => Vec::new(),
                };
            }
            match motors.iter().find(|m| m.send == f.id.raw()) {
                Some(m) if p == CLEAR_ERROR => vec![feedback(m, 0)],
                Some(m) => vec![feedback(m, 1)],
                None => Vec::new(),
            }
        });
        let sent = bus.sent_frames();
        (bus, sent)
    }

    fn driver(motors: Vec<SimMotor>) -> (DamiaoDriver, SentFrames) {
        let (bus, sent) = bus(motors);
        let mut d = DamiaoDriver::with_bus(Box::new(bus), 1_000_000, DamiaoConfig::default(), Arc::new(ModelCatalog::builtin()));
        assert!(d.connect());
        (d, sent)
    }

    fn probe_targets(sent: &SentFrames) -> Vec<u32> {
        sent.snapshot()
            .iter()
            .filter(|f| f.id.raw() == u32::from(MANAGEMENT_ID) && f.payload()[2] == CMD_READ_REGISTER)
            .map(|f| u32::from(u16::from_le_bytes([f.payload()[0], f.payload()[1]])))
            .collect()
    }

    #[test]
    fn mit_query_frame_matches_reference() {
        let mut d = DamiaoDriver::new("can0", 1_000_000, DamiaoConfig { kp: 0.0, kd: 0.0, ..Default::default() }, Arc::new(ModelCatalog::builtin()));
        d.ranges.insert(0x11, MitRanges::default());
        assert_eq!(d.mit_frame(0x11, 0.0, 0.0), [0x80, 0x00, 0x80, 0x00, 0x00, 0x00, 0x08, 0x00]);
    }

    #[test]
    fn scan_pairs_send_and_recv_ids_without_reprobing() {
        let motors = vec![
            SimMotor { send: 0x01, recv: 0x11, tmax: 10.0 },
            SimMotor { send: 0x02, recv: 0x12, tmax: 28.0 },
        ];
        let (mut d, sent) = driver(motors);
        let found = d.scan(Some(0x01..=0x12)).unwrap();

        assert_eq!(found.len(), 2);
        assert_eq!(found[&MotorId::SendRecv(0x01, 0x11)].model, "DM4310");
        assert_eq!(found[&MotorId::SendRecv(0x02, 0x12)].model, "DM4340");
        assert!(!found.contains_key(&MotorId::SendRecv(0x11, 0x11)));

        let probed = probe_targets(&sent);
        assert!(!probed.contains(&0x11));
        assert!(!probed.contains(&0x12));
        assert!(sent.snapshot().iter().all(|f| f.id.raw() != 0x11 && f.id.raw() != 0x12));
    }

    #[test]
    fn reply_naming_another_source_marks_candidate_as_recv_id() {
        // Motor 0x05 answers on 0x03; probing 0x03 gets routed to it by the bus.
        let bus = MockBus::with_responder("can-sim", |f| {
            let p = f.payload();
            if p.len() == 8 && p[2] == CMD_READ_REGISTER && (p[0] == 0x03 || p[0] == 0x05) {
                let v = 10.0f32.to_le_bytes();
                vec![frame(0x03, &[0x05, 0x00, CMD_READ_REGISTER, p[3], v[0], v[1], v[2], v[3]])]
            } else {
                Vec::new()
            }
        });
        let sent = bus.sent_frames();
        let mut d = DamiaoDriver::with_bus(Box::new(bus), 1_000_000, DamiaoConfig::default(), Arc::new(ModelCatalog::builtin()));
        assert!(d.connect());
        let found = d.scan(Some(0x03..=0x06)).unwrap();
        assert_eq!(found.keys().copied().collect::<Vec<_>>(), vec![MotorId::SendRecv(0x05, 0x03)]);
        let probed = probe_targets(&sent);
        assert_eq!(probed.iter().filter(|&&t| t == 0x05).count(), 3, "only the range reads after pairing");
    }

    #[test]
    fn stale_frames_are_drained_before_probing() {
        let (mut bus, _) = bus(vec![SimMotor { send: 0x01, recv: 0x11, tmax: 10.0 }]);
        let v = 10.0f32.to_le_bytes();
        bus.inject(frame(0x19, &[0x09, 0x00, CMD_READ_REGISTER, RID_TMAX, v[0], v[1], v[2], v[3]]));
        let mut d = DamiaoDriver::with_bus(Box::new(bus), 1_000_000, DamiaoConfig::default(), Arc::new(ModelCatalog::builtin()));
        assert!(d.connect());
        let found = d.scan(Some(0x01..=0x02)).unwrap();
        assert_eq!(found.keys().copied().collect::<Vec<_>>(), vec![MotorId::SendRecv(0x01, 0x11)]);
    }

    #[test]
    fn telemetry_and_commands_use_the_pair() {
        let m = SimMotor { send: 0x03, recv: 0x13, tmax: 10.0 };
        let (mut d, sent) = driver(vec![m]);
        let id = MotorId::SendRecv(0x03, 0x13);

        let t = d.read_telemetry(&id).unwrap().unwrap();
        assert!(t.position.abs() < 1e-3);
        assert_eq!(t.temperature, 33.0);
        assert_eq!(t.error_flags, 0);
        assert!(t.voltage.is_none());

        assert!(d.ping(&id).unwrap());
        assert!(d.set_torque(&id, true).unwrap());
        assert!(d.set_position(&id, 1.0, None).unwrap());
        assert!(d.reboot(&id).unwrap());
        assert_eq!(sent.snapshot().iter().filter(|f| f.id.raw() == 0x03).count(), 3);

        assert!(!d.ping(&MotorId::SendRecv(0x04, 0x14)).unwrap());
        assert!(d.read_telemetry(&MotorId::SendRecv(0x04, 0x14)).unwrap().is_none());
    }

    #[test]
    fn plain_ids_cannot_be_routed() {
        let (mut d, _) = driver(Vec::new());
        assert!(matches!(
            d.read_telemetry(&MotorId::Simple(1)),
            Err(MotorError::InvalidId { .. })
        ));
    }

    #[test]
    fn fault_codes_surface_as_error_flags() {
        let fb = Feedback::decode(&[0xB1, 0x80, 0x00, 0x80, 0x08, 0x00, 90, 40], &MitRanges::default());
        let t = fb.into_telemetry();
        assert_eq!(t.error_flags, 0xB);
        assert_eq!(t.temperature, 90.0);
        assert!(!t.moving);
    }

    #[test]
    fn identify_model_reads_tmax() {
        let (mut d, _) = driver(vec![SimMotor { send: 0x07, recv: 0x17, tmax: 54.0 }]);
        let info = d.identify_model(&MotorId::SendRecv(0x07, 0x17)).unwrap().unwrap();
        assert_eq!(info.model, "DM8009");
        assert!(d.identify_model(&MotorId::SendRecv(0x08, 0x18)).unwrap().is_none());
    }
}
