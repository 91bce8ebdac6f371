//! Process Identifier
//!
//! A 96-bit identifier generated once per server process. Laid out like an ObjectId:
//! a 4-byte big-endian creation timestamp followed by 8 random bytes.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use rand::RngCore;
use thiserror::Error;

/// Length of a process identifier in bytes
pub const PROCESS_ID_LEN: usize = 12;

/// Error parsing a process identifier from text
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessIdError {
    /// Not valid hexadecimal
    #[error("invalid hex in process id: {0}")]
    InvalidHex(String),

    /// Wrong number of bytes
    #[error("process id must be 12 bytes, got {0}")]
    InvalidLength(usize),
}

/// Identifier of a server process lifetime.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessId([u8; PROCESS_ID_LEN]);

impl ProcessId {
    /// Generate a fresh identifier for a new process lifetime.
    pub fn generate() -> Self {
        let mut bytes = [0u8; PROCESS_ID_LEN];
        let seconds = Utc::now().timestamp().clamp(0, u32::MAX as i64) as u32;
        bytes[..4].copy_from_slice(&seconds.to_be_bytes());
        rand::thread_rng().fill_bytes(&mut bytes[4..]);
        Self(bytes)
    }

    /// Wrap raw bytes.
    pub const fn from_bytes(bytes: [u8; PROCESS_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; PROCESS_ID_LEN] {
        &self.0
    }

    /// Lowercase hex encoding (24 characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse the 24-character hex encoding.
    pub fn parse_hex(s: &str) -> Result<Self, ProcessIdError> {
        let decoded = hex::decode(s).map_err(|e| ProcessIdError::InvalidHex(e.to_string()))?;
        let bytes: [u8; PROCESS_ID_LEN] = decoded
            .as_slice()
            .try_into()
            .map_err(|_| ProcessIdError::InvalidLength(decoded.len()))?;
        Ok(Self(bytes))
    }

    /// When this identifier was generated.
    pub fn timestamp(&self) -> DateTime<Utc> {
        let mut seconds = [0u8; 4];
        seconds.copy_from_slice(&self.0[..4]);
        Utc.timestamp_opt(u32::from_be_bytes(seconds) as i64, 0)
            .single()
            .unwrap_or_default()
    }
}

impl FromStr for ProcessId {
    type Err = ProcessIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_hex(s)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProcessId({})", self.to_hex())
    }
}
