use core::fmt;
use time::OffsetDateTime;

/// 11-bit or 29-bit CAN identifier
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct CanId {
    raw: u32,
    extended: bool,
}

impl CanId {
    pub fn standard(id11: u16) -> Option<Self> {
        if id11 <= 0x7FF {
            Some(Self {
                raw: id11 as u32,
                extended: false,
            })
        } else {
            None
        }
    }

    pub fn extended(id29: u32) -> Option<Self> {
        if id29 <= 0x1FFF_FFFF {
            Some(Self {
                raw: id29,
                extended: true,
            })
        } else {
            None
        }
    }

    /// Pick the narrowest frame format able to carry `raw`.
    pub fn from_raw(raw: u32) -> Option<Self> {
        match u16::try_from(raw) {
            Ok(id11) if id11 <= 0x7FF => Self::standard(id11),
            _ => Self::extended(raw),
        }
    }

    pub fn raw(&self) -> u32 {
        self.raw
    }
    pub fn is_extended(&self) -> bool {
        self.extended
    }
}

impl fmt::Display for CanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.extended {
            write!(f, "0x{raw:08X}", raw = self.raw)
        } else {
            write!(f, "0x{raw:03X}", raw = self.raw)
        }
    }
}

/// A classic CAN data frame (8 bytes max).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CanFrame {
    pub id: CanId,
    pub len: u8,
    pub data: [u8; 8],
    pub rtr: bool,
    pub timestamp: Option<Timestamp>,
}

impl CanFrame {
    pub fn new(id: CanId, data: &[u8]) -> Option<Self> {
        if data.len() > 8 {
            return None;
        }
        let mut buf = [0u8; 8];
        buf[..data.len()].copy_from_slice(data);
        Some(Self {
            id,
            len: data.len() as u8,
            data: buf,
            rtr: false,
            timestamp: None,
        })
    }

    /// Payload bytes actually carried by the frame.
    pub fn payload(&self) -> &[u8] {
        let len = usize::from(self.len.min(8));
        &self.data[..len]
    }

    pub fn stamped(mut self) -> Self {
        self.timestamp = Some(Timestamp(OffsetDateTime::now_utc()));
        self
    }
}

impl fmt::Display for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.id, self.len)?;
        for b in self.payload() {
            write!(f, " {b:02X}")?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CanFilter {
    pub id: CanId,
    pub mask: u32,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Timestamp(pub OffsetDateTime);

/// An interface a backend can open, as reported by the OS.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BusInfo {
    pub name: String,
    pub driver: String,
    pub manufacturer: Option<String>,
    pub serial_number: Option<String>,
}
