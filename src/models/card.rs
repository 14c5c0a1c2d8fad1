use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::error::ConfigError;

/// Number of serial bytes taken from the RFID chip
pub const UID_BYTE_LEN: usize = 8;

/// Numeric identity of an RFID card
///
/// Built from the little-endian serial reported by the chip. Rendered as a
/// fixed-width 16 digit hex string, so formatting never loses value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Uid(u64);

impl Uid {
    /// Marks an empty cache slot, never a real card
    pub const INVALID: Uid = Uid(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Build a UID from chip serial bytes (little-endian)
    ///
    /// Bytes past `UID_BYTE_LEN` are ignored, shorter serials zero-extend.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut buf = [0u8; UID_BYTE_LEN];
        let len = bytes.len().min(UID_BYTE_LEN);
        buf[..len].copy_from_slice(&bytes[..len]);
        Self(u64::from_le_bytes(buf))
    }

    pub fn to_bytes(self) -> [u8; UID_BYTE_LEN] {
        self.0.to_le_bytes()
    }

    pub fn value(self) -> u64 {
        self.0
    }

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl From<u64> for Uid {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016X}", self.0)
    }
}

impl fmt::LowerHex for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for Uid {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if digits.is_empty() || digits.len() > UID_BYTE_LEN * 2 {
            return Err(ConfigError::InvalidUid(s.to_string()));
        }

        u64::from_str_radix(digits, 16)
            .map(Uid)
            .map_err(|_| ConfigError::InvalidUid(s.to_string()))
    }
}

impl TryFrom<String> for Uid {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Uid> for String {
    fn from(uid: Uid) -> Self {
        uid.to_string()
    }
}

/// Privilege level of a card holder
///
/// `Unknown` means the card is known but its access was revoked, which is
/// different from a card that was never seen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserLevel {
    #[default]
    Unknown,
    User,
    Staff,
    Admin,
}

impl UserLevel {
    pub fn as_u8(self) -> u8 {
        match self {
            UserLevel::Unknown => 0,
            UserLevel::User => 1,
            UserLevel::Staff => 2,
            UserLevel::Admin => 3,
        }
    }

    /// True for any level that grants access
    pub fn is_granted(self) -> bool {
        self > UserLevel::Unknown
    }
}

impl TryFrom<u8> for UserLevel {
    type Error = ConfigError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(UserLevel::Unknown),
            1 => Ok(UserLevel::User),
            2 => Ok(UserLevel::Staff),
            3 => Ok(UserLevel::Admin),
            other => Err(ConfigError::InvalidUserLevel(other)),
        }
    }
}

impl fmt::Display for UserLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UserLevel::Unknown => "unknown",
            UserLevel::User => "user",
            UserLevel::Staff => "staff",
            UserLevel::Admin => "admin",
        };
        f.write_str(name)
    }
}
