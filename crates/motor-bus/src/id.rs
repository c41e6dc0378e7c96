use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Address of one motor on a bus.
///
/// Serial protocols address a motor by a single id. CAN protocols such as Damiao
/// command a motor on one arbitration id and receive its replies on another, so the
/// motor is keyed by the `(send, recv)` pair. The two shapes never compare equal,
/// even when the numbers overlap: `Simple(1) != SendRecv(1, 1)`.
///
/// On the wire (JSON) a simple id is a bare integer and a pair is `[send, recv]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MotorId {
    Simple(u32),
    SendRecv(u32, u32),
}

impl MotorId {
    /// Canonical tuple form used for lookups and hashing.
    pub fn canonical(&self) -> (u32, Option<u32>) {
        match *self {
            Self::Simple(id) => (id, None),
            Self::SendRecv(send, recv) => (send, Some(recv)),
        }
    }

    /// Id commands are addressed to.
    pub fn send_id(&self) -> u32 {
        match *self {
            Self::Simple(id) | Self::SendRecv(id, _) => id,
        }
    }

    /// Id replies arrive on; equals the send id for simple ids.
    pub fn recv_id(&self) -> u32 {
        match *self {
            Self::Simple(id) | Self::SendRecv(_, id) => id,
        }
    }

    pub fn is_pair(&self) -> bool {
        matches!(self, Self::SendRecv(..))
    }
}

impl From<u32> for MotorId {
    fn from(id: u32) -> Self {
        Self::Simple(id)
    }
}

impl From<(u32, u32)> for MotorId {
    fn from((send, recv): (u32, u32)) -> Self {
        Self::SendRecv(send, recv)
    }
}

impl fmt::Display for MotorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simple(id) => write!(f, "{id}"),
            Self::SendRecv(send, recv) => write!(f, "0x{send:02X}/0x{recv:02X}"),
        }
    }
}

/// Parse `"7"`, `"0x07"`, `"1,17"`, `"(1, 17)"` or `"0x01/0x11"`.
impl FromStr for MotorId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim().trim_start_matches(['(', '[']).trim_end_matches([')', ']']);
        let parts: Vec<&str> = t.split([',', '/']).map(str::trim).collect();
        match parts.as_slice() {
            [one] => parse_num(one).map(Self::Simple),
            [send, recv] => Ok(Self::SendRecv(parse_num(send)?, parse_num(recv)?)),
            _ => Err(format!("invalid motor id: {s}")),
        }
    }
}

fn parse_num(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse::<u32>(),
    };
    parsed.map_err(|_| format!("invalid motor id component: {s}"))
}
