//! Interface Identifiers
//!
//! 128-bit ids naming native interfaces and classes.

use std::fmt;
use std::str::FromStr;

/// A native interface or class identifier.
///
/// Layout matches the native `nsID` struct so a pointer received from native
/// code can be read directly.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NsId {
    pub m0: u32,
    pub m1: u16,
    pub m2: u16,
    pub m3: [u8; 8],
}

/// Interface id
pub type NsIid = NsId;
/// Class id
pub type NsCid = NsId;

impl NsId {
    pub const fn new(m0: u32, m1: u16, m2: u16, m3: [u8; 8]) -> Self {
        Self { m0, m1, m2, m3 }
    }

    /// Copy an id out of native memory.
    ///
    /// # Safety
    /// `ptr` must be null or point to a readable `NsId`.
    pub unsafe fn from_raw(ptr: *const NsId) -> Option<Self> {
        if ptr.is_null() {
            None
        } else {
            Some(std::ptr::read_unaligned(ptr))
        }
    }

    /// Byte representation in field order
    pub fn to_bytes(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..4].copy_from_slice(&self.m0.to_be_bytes());
        out[4..6].copy_from_slice(&self.m1.to_be_bytes());
        out[6..8].copy_from_slice(&self.m2.to_be_bytes());
        out[8..16].copy_from_slice(&self.m3);
        out
    }
}

impl fmt::Display for NsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-",
            self.m0, self.m1, self.m2, self.m3[0], self.m3[1]
        )?;
        for b in &self.m3[2..] {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// Id parse error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid interface id: {0}")]
pub struct ParseIdError(pub String);

impl FromStr for NsId {
    type Err = ParseIdError;

    /// Parses `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`, braces optional.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseIdError(s.to_string());
        let trimmed = s.trim();
        let body = trimmed
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'))
            .unwrap_or(trimmed);

        let groups: Vec<&str> = body.split('-').collect();
        let lengths = [8, 4, 4, 4, 12];
        if groups.len() != lengths.len()
            || groups.iter().zip(lengths).any(|(g, len)| g.len() != len)
        {
            return Err(err());
        }

        let m0 = u32::from_str_radix(groups[0], 16).map_err(|_| err())?;
        let m1 = u16::from_str_radix(groups[1], 16).map_err(|_| err())?;
        let m2 = u16::from_str_radix(groups[2], 16).map_err(|_| err())?;

        let tail: String = format!("{}{}", groups[3], groups[4]);
        let mut m3 = [0u8; 8];
        for (i, byte) in m3.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&tail[i * 2..i * 2 + 2], 16).map_err(|_| err())?;
        }

        Ok(Self { m0, m1, m2, m3 })
    }
}
