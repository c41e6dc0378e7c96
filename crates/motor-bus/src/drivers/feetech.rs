//! Feetech STS/SCS serial protocol (STS register layout, little endian).
//!
//! Packet: `FF FF | id | len | inst/err | params.. | chk` with `len = params + 2`
//! and `chk = !(id + len + inst + Σparams)`.

use super::{absorb, serial_id, MotorDriver, Telemetry};
use crate::link::{LinkSlot, SerialLink};
use crate::{Brand, ModelCatalog, MotorError, MotorId, MotorModelInfo, Result};
use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

const MAX_ID: u32 = 253;

const INST_PING: u8 = 0x01;
const INST_READ: u8 = 0x02;
const INST_WRITE: u8 = 0x03;
const INST_SYNC_READ: u8 = 0x82;
const INST_SYNC_WRITE: u8 = 0x83;
const BROADCAST: u8 = 0xFE;

const ADDR_MODEL: u8 = 3;
const ADDR_TORQUE_ENABLE: u8 = 40;
const ADDR_GOAL_POSITION: u8 = 42;
const ADDR_GOAL_SPEED: u8 = 46;
// Goal position (42) through present current (69..70)
const TELEMETRY_ADDR: u8 = 42;
const TELEMETRY_LEN: u8 = 29;

const IO_TIMEOUT: Duration = Duration::from_millis(50);
const SCAN_TIMEOUT: Duration = Duration::from_millis(15);

pub struct FeetechDriver {
    slot: LinkSlot,
    catalog: Arc<ModelCatalog>,
}

impl FeetechDriver {
    pub fn new(interface: &str, baudrate: u32, catalog: Arc<ModelCatalog>) -> Self {
        Self {
            slot: LinkSlot::new(interface, baudrate, IO_TIMEOUT),
            catalog,
        }
    }

    pub fn with_link(interface: &str, baudrate: u32, link: Box<dyn SerialLink>, catalog: Arc<ModelCatalog>) -> Self {
        Self {
            slot: LinkSlot::with_link(interface, baudrate, IO_TIMEOUT, link),
            catalog,
        }
    }

    /// Send one instruction and return the status parameters.
    fn transact(&mut self, id: u8, inst: u8, params: &[u8]) -> Result<Vec<u8>> {
        let link = self.slot.get()?;
        link.clear_input()?;
        link.write_all(&encode_packet(id, inst, params))?;
        // The status byte mirrors the fault register, which telemetry reports.
        let (reply_id, _status, data) = read_reply(link)?;
        if reply_id != id {
            return Err(MotorError::Protocol(format!("reply from id {reply_id} while waiting for {id}")));
        }
        Ok(data)
    }

    fn read(&mut self, id: u8, addr: u8, len: u8) -> Result<Vec<u8>> {
        let data = self.transact(id, INST_READ, &[addr, len])?;
        if data.len() != usize::from(len) {
            return Err(MotorError::Protocol(format!("read of {len} bytes returned {}", data.len())));
        }
        Ok(data)
    }

    fn write(&mut self, id: u8, addr: u8, data: &[u8]) -> Result<()> {
        let mut params = Vec::with_capacity(data.len() + 1);
        params.push(addr);
        params.extend_from_slice(data);
        self.transact(id, INST_WRITE, &params).map(|_| ())
    }

    /// Replies come back in request order; a missing one ends the read.
    fn sync_read(&mut self, ids: &[u8], addr: u8, len: u8) -> Result<BTreeMap<u8, Vec<u8>>> {
        let mut params = vec![addr, len];
        params.extend_from_slice(ids);
        let link = self.slot.get()?;
        link.clear_input()?;
        link.write_all(&encode_packet(BROADCAST, INST_SYNC_READ, &params))?;
        let mut out = BTreeMap::new();
        for _ in ids {
            match read_reply(link) {
                Ok((id, _, data)) if data.len() == usize::from(len) => {
                    out.insert(id, data);
                }
                Ok((id, ..)) => tracing::debug!(id, "sync read: short reply dropped"),
                Err(e) => {
                    tracing::debug!(error = %e, "sync read ended early");
                    break;
                }
            }
        }
        Ok(out)
    }

    fn sync_write(&mut self, addr: u8, len: u8, data: &[(u8, Vec<u8>)]) -> Result<()> {
        let mut params = vec![addr, len];
        for (id, bytes) in data {
            params.push(*id);
            params.extend_from_slice(bytes);
        }
        let link = self.slot.get()?;
        link.clear_input()?;
        link.write_all(&encode_packet(BROADCAST, INST_SYNC_WRITE, &params))
    }

    fn model_number(&mut self, id: u8) -> Result<u32> {
        let data = self.read(id, ADDR_MODEL, 2)?;
        Ok(u32::from(u16::from_le_bytes([data[0], data[1]])))
    }
}

impl MotorDriver for FeetechDriver {
    fn brand(&self) -> Brand {
        Brand::Feetech
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
        let raw = serial_id(Brand::Feetech, id, MAX_ID)?;
        let r = self.transact(raw, INST_PING, &[]).map(|_| true);
        absorb(Brand::Feetech, "ping", r, false)
    }

    fn scan(&mut self, range: Option<RangeInclusive<u32>>) -> Result<BTreeMap<MotorId, MotorModelInfo>> {
        let range = range.unwrap_or_else(|| self.default_scan_range());
        let (start, end) = (*range.start(), (*range.end()).min(MAX_ID));
        self.slot.get()?.set_timeout(SCAN_TIMEOUT)?;
        let mut found = BTreeMap::new();
        for raw in start..=end {
            let id = raw as u8;
            match self.transact(id, INST_PING, &[]) {
                Ok(_) => {}
                Err(e) if e.is_transient() => continue,
                Err(e) => return Err(e),
            }
            let model_id = match self.model_number(id) {
                Ok(m) => m,
                Err(e) if e.is_transient() => {
                    tracing::debug!(id = raw, error = %e, "feetech model read failed");
                    continue;
                }
                Err(e) => return Err(e),
            };
            match self.catalog.resolve_scanned(Brand::Feetech, model_id) {
                Ok(info) => {
                    tracing::debug!(id = raw, model = %info.full_name(), "feetech motor found");
                    found.insert(MotorId::Simple(raw), info);
                }
                Err(e) => tracing::warn!(id = raw, model_id, error = %e, "unrecognised feetech model"),
            }
        }
        let timeout = self.slot.timeout();
        self.slot.get()?.set_timeout(timeout)?;
        Ok(found)
    }

    fn identify_model(&mut self, id: &MotorId) -> Result<Option<MotorModelInfo>> {
        let raw = serial_id(Brand::Feetech, id, MAX_ID)?;
        let Some(model_id) = absorb(Brand::Feetech, "identify", self.model_number(raw).map(Some), None)? else {
            return Ok(None);
        };
        match self.catalog.lookup(Brand::Feetech, model_id) {
            Ok(info) => Ok(Some(info.clone())),
            Err(MotorError::ModelNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn read_telemetry(&mut self, id: &MotorId) -> Result<Option<Telemetry>> {
        let raw = serial_id(Brand::Feetech, id, MAX_ID)?;
        let r = self
            .read(raw, TELEMETRY_ADDR, TELEMETRY_LEN)
            .and_then(|block| decode_telemetry(&block))
            .map(Some);
        absorb(Brand::Feetech, "read_telemetry", r, None)
    }

    fn read_bulk_telemetry(&mut self, ids: &[MotorId]) -> Result<BTreeMap<MotorId, Telemetry>> {
        let raw_ids = ids
            .iter()
            .map(|id| serial_id(Brand::Feetech, id, MAX_ID))
            .collect::<Result<Vec<u8>>>()?;
        if raw_ids.is_empty() {
            return Ok(BTreeMap::new());
        }
        let replies = absorb(
            Brand::Feetech,
            "sync_read",
            self.sync_read(&raw_ids, TELEMETRY_ADDR, TELEMETRY_LEN),
            BTreeMap::new(),
        )?;
        Ok(replies
            .into_iter()
            .filter_map(|(raw, block)| match decode_telemetry(&block) {
                Ok(t) => Some((MotorId::Simple(u32::from(raw)), t)),
                Err(e) => {
                    tracing::debug!(id = raw, error = %e, "feetech telemetry dropped");
                    None
                }
            })
            .collect())
    }

    fn set_position(&mut self, id: &MotorId, target: f64, speed: Option<f64>) -> Result<bool> {
        let raw = serial_id(Brand::Feetech, id, MAX_ID)?;
        let goal = encode_signed(target.round() as i32, 15);
        let mut r = self.write(raw, ADDR_GOAL_POSITION, &goal.to_le_bytes());
        if let Some(speed) = speed {
            let speed = speed.abs().round().min(f64::from(u16::MAX >> 1)) as u16;
            r = r.and_then(|_| self.write(raw, ADDR_GOAL_SPEED, &speed.to_le_bytes()));
        }
        absorb(Brand::Feetech, "set_position", r.map(|_| true), false)
    }

    fn set_torque(&mut self, id: &MotorId, enabled: bool) -> Result<bool> {
        let raw = serial_id(Brand::Feetech, id, MAX_ID)?;
        let r = self.write(raw, ADDR_TORQUE_ENABLE, &[u8::from(enabled)]);
        absorb(Brand::Feetech, "set_torque", r.map(|_| true), false)
    }

    /// Sync write, acknowledged by a sync read of the torque register.
    fn bulk_set_torque(&mut self, ids: &[MotorId], enabled: bool) -> Result<bool> {
        let raw_ids = ids
            .iter()
            .map(|id| serial_id(Brand::Feetech, id, MAX_ID))
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
                    .all(|id| replies.get(id).is_some_and(|d| d[0] == u8::from(enabled)))
            });
        absorb(Brand::Feetech, "bulk_set_torque", r, false)
    }

    /// STS firmware has no reboot instruction.
    fn reboot(&mut self, id: &MotorId) -> Result<bool> {
        serial_id(Brand::Feetech, id, MAX_ID)?;
        self.slot.get()?;
        tracing::debug!(%id, "feetech servos do not support reboot");
        Ok(false)
    }
}

fn checksum(body: &[u8]) -> u8 {
    !body.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Frame an instruction; with an error byte in place of `inst` it frames a reply.
pub(crate) fn encode_packet(id: u8, inst: u8, params: &[u8]) -> Vec<u8> {
    let mut pkt = Vec::with_capacity(params.len() + 6);
    pkt.extend_from_slice(&[0xFF, 0xFF, id, (params.len() + 2) as u8, inst]);
    pkt.extend_from_slice(params);
    pkt.push(checksum(&pkt[2..]));
    pkt
}

/// Split a framed packet into `(id, inst_or_error, params)`.
pub(crate) fn decode_packet(pkt: &[u8]) -> Result<(u8, u8, Vec<u8>)> {
    if pkt.len() < 6 || pkt[..2] != [0xFF, 0xFF] {
        return Err(MotorError::Protocol("bad feetech header".into()));
    }
    let len = usize::from(pkt[3]);
    if len < 2 || pkt.len() != 4 + len {
        return Err(MotorError::Protocol("bad feetech length".into()));
    }
    let (body, chk) = pkt.split_at(pkt.len() - 1);
    if checksum(&body[2..]) != chk[0] {
        return Err(MotorError::Protocol("feetech checksum mismatch".into()));
    }
    Ok((pkt[2], pkt[4], body[5..].to_vec()))
}

fn read_reply(link: &mut dyn SerialLink) -> Result<(u8, u8, Vec<u8>)> {
    let mut head = [0u8; 4];
    link.read_exact(&mut head)?;
    if head[..2] != [0xFF, 0xFF] || head[3] < 2 {
        return Err(MotorError::Protocol("bad reply header".into()));
    }
    let mut pkt = head.to_vec();
    pkt.resize(4 + usize::from(head[3]), 0);
    link.read_exact(&mut pkt[4..])?;
    decode_packet(&pkt)
}

/// Sign-magnitude value with the sign at `bit`.
fn decode_signed(raw: u16, bit: u8) -> i32 {
    let magnitude = i32::from(raw & ((1 << bit) - 1));
    if raw & (1 << bit) != 0 {
        -magnitude
    } else {
        magnitude
    }
}

fn encode_signed(value: i32, bit: u8) -> u16 {
    let magnitude = (value.unsigned_abs() as u16) & ((1 << bit) - 1);
    if value < 0 {
        magnitude | (1 << bit)
    } else {
        magnitude
    }
}

fn u16_at(b: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([b[at], b[at + 1]])
}

fn decode_telemetry(block: &[u8]) -> Result<Telemetry> {
    if block.len() < usize::from(TELEMETRY_LEN) {
        return Err(MotorError::Protocol("short telemetry block".into()));
    }
    let load = decode_signed(u16_at(block, 18), 10);
    Ok(Telemetry {
        goal_position: Some(f64::from(decode_signed(u16_at(block, 0), 15))),
        position: f64::from(decode_signed(u16_at(block, 14), 15)),
        velocity: f64::from(decode_signed(u16_at(block, 16), 15)),
        // 0..1000 is 0..100 % of rated load
        load: Some(f64::from(load) / 10.0),
        voltage: Some(f64::from(block[20]) * 0.1),
        temperature: f64::from(block[21]),
        error_flags: block[23],
        moving: block[24] != 0,
        // raw register units, the same unit the model tables limit
        current: Some(f64::from(decode_signed(u16_at(block, 27), 15))),
    })
}
