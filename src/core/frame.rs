use super::{SimError, SimResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// CAN identifier, standard (11-bit) or extended (29-bit)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CanId(u32);

impl CanId {
    pub const MAX_STANDARD: u32 = 0x7FF;
    pub const MAX_EXTENDED: u32 = 0x1FFF_FFFF;

    pub fn new(raw: u32) -> SimResult<Self> {
        if raw > Self::MAX_EXTENDED {
            return Err(SimError::InvalidFrame(format!(
                "identifier 0x{:X} exceeds 29-bit range",
                raw
            )));
        }
        Ok(Self(raw))
    }

    /// Standard 11-bit identifier; higher bits are masked off
    pub const fn standard(raw: u16) -> Self {
        Self((raw & 0x7FF) as u32)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn is_extended(self) -> bool {
        self.0 > Self::MAX_STANDARD
    }
}

impl FromStr for CanId {
    type Err = SimError;

    /// Accepts `0x1A2`, `0X1a2` or bare `1A2`
    fn from_str(s: &str) -> SimResult<Self> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if digits.is_empty() || digits.len() > 8 {
            return Err(SimError::InvalidFrame(format!("malformed identifier {:?}", s)));
        }

        let raw = u32::from_str_radix(digits, 16)
            .map_err(|_| SimError::InvalidFrame(format!("malformed identifier {:?}", s)))?;
        Self::new(raw)
    }
}

impl fmt::Display for CanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X}", self.0)
    }
}

impl TryFrom<String> for CanId {
    type Error = SimError;

    fn try_from(value: String) -> SimResult<Self> {
        value.parse()
    }
}

impl From<CanId> for String {
    fn from(id: CanId) -> Self {
        id.to_string()
    }
}

/// Frame payload: 0 to 8 bytes, stored inline
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Payload {
    bytes: [u8; 8],
    len: u8,
}

impl Payload {
    pub const MAX_LEN: usize = 8;

    pub fn new(data: &[u8]) -> SimResult<Self> {
        if data.len() > Self::MAX_LEN {
            return Err(SimError::InvalidFrame(format!(
                "payload has {} bytes, at most {} allowed",
                data.len(),
                Self::MAX_LEN
            )));
        }
        let mut bytes = [0u8; 8];
        bytes[..data.len()].copy_from_slice(data);
        Ok(Self {
            bytes,
            len: data.len() as u8,
        })
    }

    /// Full eight-byte payload
    pub const fn from_array(bytes: [u8; 8]) -> Self {
        Self { bytes, len: 8 }
    }

    pub fn empty() -> Self {
        Self {
            bytes: [0u8; 8],
            len: 0,
        }
    }

    /// Parse an even-length hex string of at most 16 digits
    pub fn from_hex(s: &str) -> SimResult<Self> {
        let digits = s.trim();
        if digits.len() > Self::MAX_LEN * 2 {
            return Err(SimError::InvalidFrame(format!(
                "payload {:?} longer than 16 hex digits",
                s
            )));
        }
        let decoded = hex::decode(digits)
            .map_err(|e| SimError::InvalidFrame(format!("payload {:?}: {}", s, e)))?;
        Self::new(&decoded)
    }

    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Payload({})", self.to_hex())
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Payload {
    type Err = SimError;

    fn from_str(s: &str) -> SimResult<Self> {
        Self::from_hex(s)
    }
}

impl TryFrom<String> for Payload {
    type Error = SimError;

    fn try_from(value: String) -> SimResult<Self> {
        Self::from_hex(&value)
    }
}

impl From<Payload> for String {
    fn from(payload: Payload) -> Self {
        payload.to_hex()
    }
}

/// Origin of a frame on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameSource {
    Live,
    Playback,
}

/// Application-level CAN frame. Never mutated once published.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub id: CanId,
    pub data: Payload,
    /// Seconds on the simulator's monotonic clock
    pub timestamp: f64,
    pub source: FrameSource,
}

impl Frame {
    pub fn new(id: CanId, data: Payload, timestamp: f64, source: FrameSource) -> Self {
        Self {
            id,
            data,
            timestamp,
            source,
        }
    }

    /// Build a frame from wire strings, validating both fields
    pub fn parse(id: &str, data: &str, timestamp: f64, source: FrameSource) -> SimResult<Self> {
        Ok(Self::new(id.parse()?, data.parse()?, timestamp, source))
    }
}
