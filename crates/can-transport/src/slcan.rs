use crate::{BusInfo, CanBus, CanFrame, CanId, Result, TransportError};
use serialport::{SerialPort, SerialPortType};
use std::io::{Read, Write};
use std::time::Duration;

/// SLCAN text protocol over serial (USB-CAN dongles such as CANable).
pub struct SlcanBus {
    port_path: String,
    port: Box<dyn SerialPort>,
    acc: Vec<u8>,
}

impl SlcanBus {
    pub fn open_with(path: &str, bitrate: Option<SlcanBitrate>) -> Result<Self> {
        let mut port = serialport::new(path, 115200)
            .timeout(Duration::from_millis(200))
            .open()
            .map_err(|e| match e.kind {
                serialport::ErrorKind::NoDevice => TransportError::InterfaceNotFound(path.into()),
                _ => TransportError::Io(e.to_string()),
            })?;
        // Close, set bitrate (default S8 = 1 Mbit/s), then open
        let _ = Self::write_cmd(&mut *port, b"C\r");
        let code = bitrate.unwrap_or(SlcanBitrate::B1M).code();
        Self::write_cmd(&mut *port, &[b'S', code, b'\r'])?;
        Self::write_cmd(&mut *port, b"O\r")?;
        tracing::debug!(path, bitrate = ?bitrate, "slcan channel opened");
        Ok(SlcanBus {
            port_path: path.to_string(),
            port,
            acc: Vec::with_capacity(64),
        })
    }

    fn encode_frame(frame: &CanFrame) -> Result<Vec<u8>> {
        if frame.rtr {
            return Err(TransportError::Unsupported("RTR not implemented"));
        }
        if frame.len > 8 {
            return Err(TransportError::InvalidFrame("dlc > 8"));
        }
        let mut line = if frame.id.is_extended() {
            format!("T{:08X}", frame.id.raw())
        } else {
            format!("t{:03X}", frame.id.raw())
        };
        line.push(char::from(b'0' + frame.len));
        for b in frame.payload() {
            line.push_str(&format!("{b:02X}"));
        }
        line.push('\r');
        Ok(line.into_bytes())
    }

    fn parse_frame(line: &[u8]) -> Result<CanFrame> {
        let (&kind, rest) = line
            .split_first()
            .ok_or(TransportError::InvalidFrame("empty"))?;
        let (id_digits, extended) = match kind {
            b't' | b'r' => (3, false),
            b'T' | b'R' => (8, true),
            _ => return Err(TransportError::InvalidFrame("unknown header")),
        };
        if rest.len() < id_digits + 1 {
            return Err(TransportError::InvalidFrame("short header"));
        }
        let raw = u32::from_str_radix(hex_str(&rest[..id_digits])?, 16)
            .map_err(|_| TransportError::InvalidFrame("id"))?;
        let id = if extended {
            CanId::extended(raw)
        } else {
            u16::try_from(raw).ok().and_then(CanId::standard)
        }
        .ok_or(TransportError::InvalidFrame("id range"))?;

        let dlc = rest[id_digits].wrapping_sub(b'0');
        if dlc > 8 {
            return Err(TransportError::InvalidFrame("dlc > 8"));
        }
        let hex = &rest[id_digits + 1..];
        let mut data = [0u8; 8];
        for (i, slot) in data.iter_mut().take(usize::from(dlc)).enumerate() {
            let pair = hex
                .get(i * 2..i * 2 + 2)
                .ok_or(TransportError::InvalidFrame("short data"))?;
            *slot = u8::from_str_radix(hex_str(pair)?, 16)
                .map_err(|_| TransportError::InvalidFrame("byte"))?;
        }
        Ok(CanFrame {
            id,
            len: dlc,
            data,
            rtr: kind == b'r' || kind == b'R',
            timestamp: None,
        }
        .stamped())
    }

    fn write_cmd(port: &mut dyn SerialPort, cmd: &[u8]) -> Result<()> {
        port.write_all(cmd)
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}

fn hex_str(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|_| TransportError::InvalidFrame("utf8"))
}

impl Drop for SlcanBus {
    fn drop(&mut self) {
        let _ = Self::write_cmd(&mut *self.port, b"C\r");
    }
}

impl CanBus for SlcanBus {
    fn open(path: &str) -> Result<Self> {
        Self::open_with(path, None)
    }

    fn list() -> Result<Vec<BusInfo>> {
        let ports = serialport::available_ports().map_err(|e| TransportError::Io(e.to_string()))?;
        Ok(ports
            .into_iter()
            .filter_map(|p| match p.port_type {
                SerialPortType::UsbPort(usb) => Some(BusInfo {
                    name: p.port_name,
                    driver: "slcan-serial".to_string(),
                    manufacturer: usb.manufacturer,
                    serial_number: usb.serial_number,
                }),
                _ => None,
            })
            .collect())
    }

    fn name(&self) -> &str {
        &self.port_path
    }

    fn recv(&mut self, timeout_ms: Option<u64>) -> Result<CanFrame> {
        if let Some(ms) = timeout_ms {
            self.port.set_timeout(Duration::from_millis(ms.max(1))).ok();
        }
        let mut buf = [0u8; 128];
        loop {
            if let Some(pos) = self.acc.iter().position(|&b| b == b'\r') {
                let line: Vec<u8> = self.acc.drain(..=pos).collect();
                let trim = &line[..line.len() - 1];
                // Bare CR / BEL are command acknowledgements, not frames
                if trim.is_empty() || trim == [0x07] || trim == b"z" || trim == b"Z" {
                    continue;
                }
                return Self::parse_frame(trim);
            }
            match self.port.read(&mut buf) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => self.acc.extend_from_slice(&buf[..n]),
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn send(&mut self, frame: &CanFrame) -> Result<()> {
        let line = Self::encode_frame(frame)?;
        self.port
            .write_all(&line)
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}

/// Supported SLCAN bitrates (mapped to Sx codes)
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SlcanBitrate {
    B10k,  // S0
    B20k,  // S1
    B50k,  // S2
    B100k, // S3
    B125k, // S4
    B250k, // S5
    B500k, // S6
    B800k, // S7
    B1M,   // S8
}

impl SlcanBitrate {
    pub fn code(self) -> u8 {
        match self {
            SlcanBitrate::B10k => b'0',
            SlcanBitrate::B20k => b'1',
            SlcanBitrate::B50k => b'2',
            SlcanBitrate::B100k => b'3',
            SlcanBitrate::B125k => b'4',
            SlcanBitrate::B250k => b'5',
            SlcanBitrate::B500k => b'6',
            SlcanBitrate::B800k => b'7',
            SlcanBitrate::B1M => b'8',
        }
    }

    pub fn from_bps(bps: u32) -> Option<Self> {
        Some(match bps {
            10_000 => Self::B10k,
            20_000 => Self::B20k,
            50_000 => Self::B50k,
            100_000 => Self::B100k,
            125_000 => Self::B125k,
            250_000 => Self::B250k,
            500_000 => Self::B500k,
            800_000 => Self::B800k,
            1_000_000 => Self::B1M,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_standard_frame() {
        let f = CanFrame::new(CanId::standard(0x7FF).unwrap(), &[0x01, 0x00, 0x33, 0x07]).unwrap();
        let line = SlcanBus::encode_frame(&f).unwrap();
        assert_eq!(line, b"t7FF401003307\r");
    }

    #[test]
    fn parse_standard_and_extended() {
        let f = SlcanBus::parse_frame(b"t0118AABBCCDDEEFF0011").unwrap();
        assert_eq!(f.id.raw(), 0x011);
        assert_eq!(f.payload(), &[0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, 0x00, 0x11]);

        let e = SlcanBus::parse_frame(b"T000001232BEEF").unwrap();
        assert!(e.id.is_extended());
        assert_eq!(e.id.raw(), 0x123);
        assert_eq!(e.payload(), &[0xBE, 0xEF]);
    }

    #[test]
    fn parse_rejects_truncated_data() {
        assert!(SlcanBus::parse_frame(b"t0113AABB").is_err());
        assert!(SlcanBus::parse_frame(b"x123").is_err());
    }

    #[test]
    fn bitrate_from_bps() {
        assert_eq!(SlcanBitrate::from_bps(1_000_000), Some(SlcanBitrate::B1M));
        assert_eq!(SlcanBitrate::from_bps(42), None);
    }
}
