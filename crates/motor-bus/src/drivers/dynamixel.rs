//! Dynamixel Protocol 2.0 over a half-duplex serial bus.
//!
//! Packet: `FF FF FD 00 | id | len_l len_h | inst | params.. | crc_l crc_h`, where
//! `len` counts inst + params + crc, the instruction/parameter field is byte
//! stuffed (`FF FF FD` -> `FF FF FD FD`) and the CRC is CRC-16/BUYPASS over
//! everything before it.

use super::{absorb, serial_id, MotorDriver, Telemetry};
use crate::link::{LinkSlot, SerialLink};
use crate::{Brand, ModelCatalog, MotorError, MotorId, MotorModelInfo, Result};
use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

const HEADER: [u8; 4] = [0xFF, 0xFF, 0xFD, 0x00];
const BROADCAST: u8 = 0xFE;
const MAX_ID: u32 = 252;

const INST_PING: u8 = 0x01;
const INST_READ: u8 = 0x02;
const INST_WRITE: u8 = 0x03;
const INST_REBOOT: u8 = 0x08;
const INST_STATUS: u8 = 0x55;
const INST_SYNC_READ: u8 = 0x82;
const INST_SYNC_WRITE: u8 = 0x83;

const ERR_ALERT: u8 = 0x80;

// X-series control table
const ADDR_MODEL_NUMBER: u16 = 0;
const ADDR_TORQUE_ENABLE: u16 = 64;
const ADDR_HARDWARE_ERROR: u16 = 70;
const ADDR_PROFILE_VELOCITY: u16 = 112;
const ADDR_GOAL_POSITION: u16 = 116;
// Goal position (116) through present temperature (146)
const TELEMETRY_ADDR: u16 = 116;
const TELEMETRY_LEN: u16 = 31;

const IO_TIMEOUT: Duration = Duration::from_millis(50);
const SCAN_TIMEOUT: Duration = Duration::from_millis(15);

/// PWM register full scale (100 % duty).
const PWM_FULL_SCALE: f64 = 885.0;

pub struct DynamixelDriver {
    slot: LinkSlot,
    catalog: Arc<ModelCatalog>,
}

impl DynamixelDriver {
    pub fn new(interface: &str, baudrate: u32, catalog: Arc<ModelCatalog>) -> Self {
        Self {
            slot: LinkSlot::new(interface, baudrate, IO_TIMEOUT),
            catalog,
        }
    }

    /// Driver over an already opened link (simulators, tests, shared adapters).
    pub fn with_link(interface: &str, baudrate: u32, link: Box<dyn SerialLink>, catalog: Arc<ModelCatalog>) -> Self {
        Self {
            slot: LinkSlot::with_link(interface, baudrate, IO_TIMEOUT, link),
            catalog,
        }
    }

    fn transact(&mut self, id: u8, inst: u8, params: &[u8]) -> Result<Status> {
        let link = self.slot.get()?;
        link.clear_input()?;
        link.write_all(&encode_packet(id, inst, params))?;
        let status = read_status(link)?;
        if status.id != id {
            return Err(MotorError::Protocol(format!(
                "status from id {} while waiting for {id}",
                status.id
            )));
        }
        status.check()?;
        Ok(status)
    }

    fn ping_model(&mut self, id: u8) -> Result<Option<u32>> {
        let status = self.transact(id, INST_PING, &[])?;
        Ok(match status.params.as_slice() {
            [lo, hi, ..] => Some(u32::from(u16::from_le_bytes([*lo, *hi]))),
            _ => None,
        })
    }

    fn read(&mut self, id: u8, addr: u16, len: u16) -> Result<Status> {
        let [al, ah] = addr.to_le_bytes();
        let [ll, lh] = len.to_le_bytes();
        let status = self.transact(id, INST_READ, &[al, ah, ll, lh])?;
        if status.params.len() != usize::from(len) {
            return Err(MotorError::Protocol(format!(
                "read of {len} bytes returned {}",
                status.params.len()
            )));
        }
        Ok(status)
    }

    fn write(&mut self, id: u8, addr: u16, data: &[u8]) -> Result<()> {
        let mut params = addr.to_le_bytes().to_vec();
        params.extend_from_slice(data);
        self.transact(id, INST_WRITE, &params).map(|_| ())
    }

    fn sync_read(&mut self, ids: &[u8], addr: u16, len: u16) -> Result<BTreeMap<u8, Status>> {
        let link = self.slot.get()?;
        let mut params = Vec::with_capacity(4 + ids.len());
        params.extend_from_slice(&addr.to_le_bytes());
        params.extend_from_slice(&len.to_le_bytes());
        params.extend_from_slice(ids);
        link.clear_input()?;
        link.write_all(&encode_packet(BROADCAST, INST_SYNC_READ, &params))?;

        let mut out = BTreeMap::new();
        for _ in ids {
            match read_status(link) {
                Ok(status) if status.check().is_ok() && status.params.len() == usize::from(len) => {
                    out.insert(status.id, status);
                }
                Ok(status) => tracing::debug!(id = status.id, "sync read: bad status dropped"),
                // A missing reply desynchronises the stream; stop here.
                Err(e) => {
                    tracing::debug!(error = %e, "sync read ended early");
                    break;
                }
            }
        }
        Ok(out)
    }

    /// Broadcast write of `len` bytes at `addr` to several motors. No status replies.
    fn sync_write(&mut self, addr: u16, len: u16, data: &[(u8, Vec<u8>)]) -> Result<()> {
        let mut params = Vec::with_capacity(4 + data.len() * (1 + usize::from(len)));
        params.extend_from_slice(&addr.to_le_bytes());
        params.extend_from_slice(&len.to_le_bytes());
        for (id, bytes) in data {
            params.push(*id);
            params.extend_from_slice(bytes);
        }
        let link = self.slot.get()?;
        link.clear_input()?;
        link.write_all(&encode_packet(BROADCAST, INST_SYNC_WRITE, &params))
    }

    fn telemetry_from(&mut self, id: u8, status: &Status) -> Result<Telemetry> {
        let mut t = decode_telemetry(&status.params)?;
        if status.error & ERR_ALERT != 0 {
            t.error_flags = self.read(id, ADDR_HARDWARE_ERROR, 1)?.params[0];
        }
        Ok(t)
    }
}

impl MotorDriver for DynamixelDriver {
    fn brand(&self) -> Brand {
        Brand::Dynamixel
    }

    fn interface(&self) -> &str {
        &self.slot.interface
    }

    fn baudrate(&self) -> u32 {
        self.slot.baudrate
    }

    fn connect(&mut self) -> bool {
        self.slot.open()
    }

    fn disconnect(&mut self) {
        self.slot.close();
    }

    fn is_connected(&self) -> bool {
        self.slot.is_open()
    }

    fn default_scan_range(&self) -> RangeInclusive<u32> {
        0..=MAX_ID
    }

    fn ping(&mut self, id: &MotorId) -> Result<bool> {
        let id = serial_id(Brand::Dynamixel, id, MAX_ID)?;
        let r = self.ping_model(id).map(|m| m.is_some());
        absorb(Brand::Dynamixel, "ping", r, false)
    }

    fn scan(&mut self, range: Option<RangeInclusive<u32>>) -> Result<BTreeMap<MotorId, MotorModelInfo>> {
        let range = range.unwrap_or_else(|| self.default_scan_range());
        let (start, end) = (*range.start(), (*range.end()).min(MAX_ID));
        self.slot.get()?.set_timeout(SCAN_TIMEOUT)?;
        let mut found = BTreeMap::new();
        for raw in start..=end {
            let model_id = match self.ping_model(raw as u8) {
                Ok(Some(m)) => m,
                Ok(None) => continue,
                Err(e) if e.is_transient() => continue,
                Err(e) => return Err(e),
            };
            match self.catalog.resolve_scanned(Brand::Dynamixel, model_id) {
                Ok(info) => {
                    tracing::debug!(id = raw, model = %info.full_name(), "dynamixel motor found");
                    found.insert(MotorId::Simple(raw), info);
                }
                Err(e) => tracing::warn!(id = raw, model_id, error = %e, "unrecognised dynamixel model"),
            }
        }
        let timeout = self.slot.timeout();
        self.slot.get()?.set_timeout(timeout)?;
        Ok(found)
    }

    fn identify_model(&mut self, id: &MotorId) -> Result<Option<MotorModelInfo>> {
        let raw = serial_id(Brand::Dynamixel, id, MAX_ID)?;
        let status = match absorb(Brand::Dynamixel, "identify", self.read(raw, ADDR_MODEL_NUMBER, 2).map(Some), None)? {
            Some(s) => s,
            None => return Ok(None),
        };
        let model_id = u32::from(u16::from_le_bytes([status.params[0], status.params[1]]));
        match self.catalog.lookup(Brand::Dynamixel, model_id) {
            Ok(info) => Ok(Some(info.clone())),
            Err(MotorError::ModelNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn read_telemetry(&mut self, id: &MotorId) -> Result<Option<Telemetry>> {
        let raw = serial_id(Brand::Dynamixel, id, MAX_ID)?;
        let r = self
            .read(raw, TELEMETRY_ADDR, TELEMETRY_LEN)
            .and_then(|status| self.telemetry_from(raw, &status))
            .map(Some);
        absorb(Brand::Dynamixel, "read_telemetry", r, None)
    }

    fn read_bulk_telemetry(&mut self, ids: &[MotorId]) -> Result<BTreeMap<MotorId, Telemetry>> {
        let raw_ids = ids
            .iter()
            .map(|id| serial_id(Brand::Dynamixel, id, MAX_ID))
            .collect::<Result<Vec<u8>>>()?;
        if raw_ids.is_empty() {
            return Ok(BTreeMap::new());
        }
        let replies = absorb(
            Brand::Dynamixel,
            "sync_read",
            self.sync_read(&raw_ids, TELEMETRY_ADDR, TELEMETRY_LEN),
            BTreeMap::new(),
        )?;
        let mut out = BTreeMap::new();
        for (raw, status) in replies {
            match absorb(Brand::Dynamixel, "decode", self.telemetry_from(raw, &status).map(Some), None)? {
                Some(t) => {
                    out.insert(MotorId::Simple(u32::from(raw)), t);
                }
                None => continue,
            }
        }
        Ok(out)
    }

    fn set_position(&mut self, id: &MotorId, target: f64, speed: Option<f64>) -> Result<bool> {
        let raw = serial_id(Brand::Dynamixel, id, MAX_ID)?;
        let mut r = Ok(());
        if let Some(speed) = speed {
            let profile = speed.abs().round().min(f64::from(u32::MAX)) as u32;
            r = self.write(raw, ADDR_PROFILE_VELOCITY, &profile.to_le_bytes());
        }
        let goal = target.round() as i32;
        let r = r.and_then(|_| self.write(raw, ADDR_GOAL_POSITION, &goal.to_le_bytes()));
        absorb(Brand::Dynamixel, "set_position", r.map(|_| true), false)
    }

    fn set_torque(&mut self, id: &MotorId, enabled: bool) -> Result<bool> {
        let raw = serial_id(Brand::Dynamixel, id, MAX_ID)?;
        let r = self.write(raw, ADDR_TORQUE_ENABLE, &[u8::from(enabled)]);
        absorb(Brand::Dynamixel, "set_torque", r.map(|_| true), false)
    }

    fn reboot(&mut self, id: &MotorId) -> Result<bool> {
        let raw = serial_id(Brand::Dynamixel, id, MAX_ID)?;
        let r = self.transact(raw, INST_REBOOT, &[]);
        absorb(Brand::Dynamixel, "reboot", r.map(|_| true), false)
    }

    /// One sync write, then a sync read of the torque register as acknowledgement.
    fn bulk_set_torque(&mut self, ids: &[MotorId], enabled: bool) -> Result<bool> {
        let raw_ids = ids
            .iter()
            .map(|id| serial_id(Brand::Dynamixel, id, MAX_ID))
            .collect::<Result<Vec<u8>>>()?;
        if raw_ids.is_empty() {
            return Ok(true);
        }
        let data: Vec<(u8, Vec<u8>)> = raw_ids.iter().map(|&id| (id, vec![u8::from(enabled)])).collect();
        let r = self
            .sync_write(ADDR_TORQUE_ENABLE, 1, &data)
            .and_then(|_| self.sync_read(&raw_ids, ADDR_TORQUE_ENABLE, 1))
            .map(|replies| {
                raw_ids
                    .iter()
                    .all(|id| replies.get(id).is_some_and(|s| s.params[0] == u8::from(enabled)))
            });
        absorb(Brand::Dynamixel, "bulk_set_torque", r, false)
    }
}

#[derive(Debug, Clone)]
struct Status {
    id: u8,
    error: u8,
    params: Vec<u8>,
}

impl Status {
    fn check(&self) -> Result<()> {
        match self.error & !ERR_ALERT {
            0 => Ok(()),
            code => Err(MotorError::Protocol(format!(
                "id {} reported instruction error 0x{code:02X}",
                self.id
            ))),
        }
    }
}

pub(crate) fn crc16(data: &[u8]) -> u16 {
    ::crc16::State::<::crc16::BUYPASS>::calculate(data)
}

fn stuff(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 4);
    for &b in body {
        out.push(b);
        if out.ends_with(&[0xFF, 0xFF, 0xFD]) {
            out.push(0xFD);
        }
    }
    out
}

fn unstuff(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len());
    let mut i = 0;
    while i < body.len() {
        out.push(body[i]);
        if out.ends_with(&[0xFF, 0xFF, 0xFD]) && body.get(i + 1) == Some(&0xFD) {
            i += 1;
        }
        i += 1;
    }
    out
}

/// Frame an instruction (or, with `INST_STATUS`, a status reply).
pub(crate) fn encode_packet(id: u8, inst: u8, params: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(params.len() + 1);
    body.push(inst);
    body.extend_from_slice(params);
    let body = stuff(&body);
    let len = (body.len() + 2) as u16;

    let mut pkt = Vec::with_capacity(HEADER.len() + 3 + body.len() + 2);
    pkt.extend_from_slice(&HEADER);
    pkt.push(id);
    pkt.extend_from_slice(&len.to_le_bytes());
    pkt.extend_from_slice(&body);
    let crc = crc16(&pkt);
    pkt.extend_from_slice(&crc.to_le_bytes());
    pkt
}

/// Split a framed packet into `(id, inst, params)` after checking CRC and header.
pub(crate) fn decode_packet(pkt: &[u8]) -> Result<(u8, u8, Vec<u8>)> {
    if pkt.len() < 10 || pkt[..4] != HEADER {
        return Err(MotorError::Protocol("bad dynamixel header".into()));
    }
    let len = usize::from(u16::from_le_bytes([pkt[5], pkt[6]]));
    if len < 3 || pkt.len() != 7 + len {
        return Err(MotorError::Protocol("bad dynamixel length".into()));
    }
    let (framed, crc) = pkt.split_at(pkt.len() - 2);
    if crc16(framed) != u16::from_le_bytes([crc[0], crc[1]]) {
        return Err(MotorError::Protocol("dynamixel crc mismatch".into()));
    }
    let body = unstuff(&framed[7..]);
    Ok((pkt[4], body[0], body[1..].to_vec()))
}

fn read_status(link: &mut dyn SerialLink) -> Result<Status> {
    let mut head = [0u8; 7];
    link.read_exact(&mut head)?;
    let len = usize::from(u16::from_le_bytes([head[5], head[6]]));
    if head[..4] != HEADER || len < 4 {
        return Err(MotorError::Protocol("bad status header".into()));
    }
    let mut pkt = head.to_vec();
    pkt.resize(7 + len, 0);
    link.read_exact(&mut pkt[7..])?;
    let (id, inst, body) = decode_packet(&pkt)?;
    match (inst, body.split_first()) {
        (INST_STATUS, Some((&error, params))) => Ok(Status {
            id,
            error,
            params: params.to_vec(),
        }),
        _ => Err(MotorError::Protocol(format!("unexpected instruction 0x{inst:02X} in reply"))),
    }
}

fn i16_at(b: &[u8], at: usize) -> i16 {
    i16::from_le_bytes([b[at], b[at + 1]])
}

fn i32_at(b: &[u8], at: usize) -> i32 {
    i32::from_le_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
}

fn decode_telemetry(block: &[u8]) -> Result<Telemetry> {
    if block.len() < usize::from(TELEMETRY_LEN) {
        return Err(MotorError::Protocol("short telemetry block".into()));
    }
    Ok(Telemetry {
        goal_position: Some(f64::from(i32_at(block, 0))),
        moving: block[6] != 0,
        load: Some(f64::from(i16_at(block, 8)) / PWM_FULL_SCALE * 100.0),
        current: Some(f64::from(i16_at(block, 10))),
        velocity: f64::from(i32_at(block, 12)),
        position: f64::from(i32_at(block, 16)),
        voltage: Some(f64::from(u16::from_le_bytes([block[28], block[29]])) * 0.1),
        temperature: f64::from(block[30]),
        error_flags: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::SimLink;
    use std::collections::HashMap;

    /// Emulates X-series servos: ping, read, write, sync read, reboot.
    fn bus(motors: &[(u8, u16)]) -> SimLink {
        let mut tables: HashMap<u8, Vec<u8>> = motors
            .iter()
            .map(|&(id, model)| {
                let mut t = vec![0u8; 256];
                t[0..2].copy_from_slice(&model.to_le_bytes());
                t[132..136].copy_from_slice(&2048i32.to_le_bytes());
                t[144..146].copy_from_slice(&50u16.to_le_bytes());
                t[146] = 35;
                (id, t)
            })
            .collect();
        SimLink::new(move |pkt| {
            let Ok((id, inst, p)) = decode_packet(pkt) else {
                return Vec::new();
            };
            let status = |id: u8, t: &Vec<u8>, params: &[u8]| {
                let err = if t[70] != 0 { ERR_ALERT } else { 0 };
                let mut body = vec![err];
                body.extend_from_slice(params);
                encode_packet(id, INST_STATUS, &body)
            };
            match inst {
                INST_SYNC_WRITE => {
                    let addr = usize::from(u16::from_le_bytes([p[0], p[1]]));
                    let len = usize::from(u16::from_le_bytes([p[2], p[3]]));
                    for chunk in p[4..].chunks(len + 1) {
                        if let Some(t) = tables.get_mut(&chunk[0]) {
                            t[addr..addr + len].copy_from_slice(&chunk[1..]);
                        }
                    }
                    Vec::new()
                }
                INST_SYNC_READ => {
                    let addr = usize::from(u16::from_le_bytes([p[0], p[1]]));
                    let len = usize::from(u16::from_le_bytes([p[2], p[3]]));
                    p[4..]
                        .iter()
                        .filter_map(|id| tables.get(id).map(|t| status(*id, t, &t[addr..addr + len])))
                        .flatten()
                        .collect()
                }
                _ => {
                    let Some(t) = tables.get_mut(&id) else {
                        return Vec::new();
                    };
                    match inst {
                        INST_PING => {
                            let m = [t[0], t[1], 0x2A];
                            status(id, t, &m)
                        }
                        INST_READ => {
                            let addr = usize::from(u16::from_le_bytes([p[0], p[1]]));
                            let len = usize::from(u16::from_le_bytes([p[2], p[3]]));
                            let data = t[addr..addr + len].to_vec();
                            status(id, t, &data)
                        }
                        INST_WRITE => {
                            let addr = usize::from(u16::from_le_bytes([p[0], p[1]]));
                            t[addr..addr + p.len() - 2].copy_from_slice(&p[2..]);
                            status(id, t, &[])
                        }
                        INST_REBOOT => status(id, t, &[]),
                        _ => Vec::new(),
                    }
                }
            }
        })
    }

    fn driver(motors: &[(u8, u16)]) -> DynamixelDriver {
        let mut d = DynamixelDriver::with_link(
            "sim",
            1_000_000,
            Box::new(bus(motors)),
            Arc::new(ModelCatalog::builtin()),
        );
        assert!(d.connect());
        d
    }

    #[test]
    fn packets_match_reference_encoding() {
        assert_eq!(
            encode_packet(1, INST_PING, &[]),
            vec![0xFF, 0xFF, 0xFD, 0x00, 0x01, 0x03, 0x00, 0x01, 0x19, 0x4E]
        );
        assert_eq!(
            encode_packet(1, INST_READ, &[0x84, 0x00, 0x04, 0x00]),
            vec![0xFF, 0xFF, 0xFD, 0x00, 0x01, 0x07, 0x00, 0x02, 0x84, 0x00, 0x04, 0x00, 0x1D, 0x15]
        );
    }

    #[test]
    fn byte_stuffing_is_reversible() {
        let body = [0x03, 0xFF, 0xFF, 0xFD, 0x01];
        let stuffed = stuff(&body);
        assert_eq!(stuffed, vec![0x03, 0xFF, 0xFF, 0xFD, 0xFD, 0x01]);
        assert_eq!(unstuff(&stuffed), body.to_vec());

        let pkt = encode_packet(5, INST_WRITE, &[0x74, 0x00, 0xFF, 0xFF, 0xFD, 0x00]);
        let (id, inst, params) = decode_packet(&pkt).unwrap();
        assert_eq!((id, inst), (5, INST_WRITE));
        assert_eq!(params, vec![0x74, 0x00, 0xFF, 0xFF, 0xFD, 0x00]);
    }

    #[test]
    fn scan_reports_only_answering_motors() {
        let mut d = driver(&[(1, 1190), (3, 1200)]);
        let found = d.scan(Some(0..=5)).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[&MotorId::Simple(1)].variant.as_deref(), Some("M077"));
        assert_eq!(found[&MotorId::Simple(3)].variant.as_deref(), Some("M288"));
        assert!(d.ping(&MotorId::Simple(3)).unwrap());
        assert!(!d.ping(&MotorId::Simple(4)).unwrap());
    }

    #[test]
    fn telemetry_decodes_control_table() {
        let mut d = driver(&[(1, 1190)]);
        let t = d.read_telemetry(&MotorId::Simple(1)).unwrap().unwrap();
        assert_eq!(t.position, 2048.0);
        assert!((t.voltage.unwrap() - 5.0).abs() < 1e-9);
        assert_eq!(t.temperature, 35.0);
        assert_eq!(t.error_flags, 0);
        assert!(d.read_telemetry(&MotorId::Simple(9)).unwrap().is_none());
    }

    #[test]
    fn writes_land_in_control_table() {
        let mut d = driver(&[(2, 1190)]);
        let id = MotorId::Simple(2);
        assert!(d.set_torque(&id, true).unwrap());
        assert!(d.set_position(&id, 1000.0, Some(50.0)).unwrap());
        let t = d.read_telemetry(&id).unwrap().unwrap();
        assert_eq!(t.goal_position, Some(1000.0));
        assert!(d.reboot(&id).unwrap());
        assert!(!d.set_torque(&MotorId::Simple(7), true).unwrap());
    }

    #[test]
    fn bulk_read_matches_single_reads() {
        let mut d = driver(&[(1, 1190), (2, 1190)]);
        let ids = [MotorId::Simple(1), MotorId::Simple(2)];
        let bulk = d.read_bulk_telemetry(&ids).unwrap();
        assert_eq!(bulk.len(), 2);
        for id in &ids {
            assert_eq!(Some(&bulk[id]), d.read_telemetry(id).unwrap().as_ref());
        }
    }

    #[test]
    fn bulk_torque_is_acknowledged_per_motor() {
        let mut d = driver(&[(1, 1190), (2, 1190)]);
        assert!(d.bulk_set_torque(&[MotorId::Simple(1), MotorId::Simple(2)], true).unwrap());
        // id 3 never answers the acknowledgement read
        assert!(!d
            .bulk_set_torque(&[MotorId::Simple(1), MotorId::Simple(3)], false)
            .unwrap());
    }

    #[test]
    fn identify_model_uses_strict_lookup() {
        let mut d = driver(&[(1, 1190), (2, 4242)]);
        let info = d.identify_model(&MotorId::Simple(1)).unwrap().unwrap();
        assert_eq!(info.model, "XL330");
        assert!(d.identify_model(&MotorId::Simple(2)).unwrap().is_none());
    }

    #[test]
    fn contract_violations_are_errors() {
        let mut d = driver(&[(1, 1190)]);
        assert!(matches!(
            d.ping(&MotorId::SendRecv(1, 17)),
            Err(MotorError::InvalidId { .. })
        ));
        d.disconnect();
        d.disconnect();
        assert!(matches!(
            d.read_telemetry(&MotorId::Simple(1)),
            Err(MotorError::NotConnected(_))
        ));
    }
}
