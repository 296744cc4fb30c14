//! Element data types.
//!
//! A [`DataType`] is an opaque 64-bit tag. The packing used by the predefined
//! types is:
//!
//! | bits   | meaning            |
//! |--------|--------------------|
//! | 0..8   | [`DataKind`]       |
//! | 8..16  | bits per channel   |
//! | 16..24 | channel count      |
//!
//! Tags with other content pass through untouched; only [`DataType::size_bytes`]
//! needs to understand them.

use std::fmt;

use derive_more::{From, Into};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    Unsigned = 1,
    Signed = 2,
    Float = 3,
}

impl DataKind {
    fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(DataKind::Unsigned),
            2 => Some(DataKind::Signed),
            3 => Some(DataKind::Float),
            _ => None,
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            DataKind::Unsigned => "U",
            DataKind::Signed => "S",
            DataKind::Float => "F",
        }
    }
}

#[repr(transparent)]
#[derive(
    Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, From, Into, Serialize, Deserialize,
)]
pub struct DataType(u64);

impl DataType {
    pub const U8: DataType = DataType::new(DataKind::Unsigned, 8, 1);
    pub const S8: DataType = DataType::new(DataKind::Signed, 8, 1);
    pub const U16: DataType = DataType::new(DataKind::Unsigned, 16, 1);
    pub const S16: DataType = DataType::new(DataKind::Signed, 16, 1);
    pub const U32: DataType = DataType::new(DataKind::Unsigned, 32, 1);
    pub const S32: DataType = DataType::new(DataKind::Signed, 32, 1);
    pub const F16: DataType = DataType::new(DataKind::Float, 16, 1);
    pub const F32: DataType = DataType::new(DataKind::Float, 32, 1);
    pub const F64: DataType = DataType::new(DataKind::Float, 64, 1);
    pub const F32X2: DataType = DataType::new(DataKind::Float, 32, 2);

    pub const fn new(kind: DataKind, bits_per_channel: u8, channels: u8) -> Self {
        DataType(kind as u64 | (bits_per_channel as u64) << 8 | (channels as u64) << 16)
    }

    pub const fn from_raw(raw: u64) -> Self {
        DataType(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    pub fn kind(self) -> Option<DataKind> {
        DataKind::from_code(self.0 as u8)
    }

    pub fn bits_per_channel(self) -> u32 {
        (self.0 >> 8) as u8 as u32
    }

    pub fn channels(self) -> u32 {
        (self.0 >> 16) as u8 as u32
    }

    /// Bytes occupied by one element.
    pub fn size_bytes(self) -> Result<usize> {
        let bits = self.bits_per_channel() * self.channels();
        if self.kind().is_none() || bits == 0 || bits % 8 != 0 {
            return Err(Error::invalid_argument(format!(
                "Data type {self} has no whole-byte element size"
            )));
        }
        Ok((bits / 8) as usize)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            Some(kind) if self.channels() == 1 => {
                write!(f, "{}{}", kind.prefix(), self.bits_per_channel())
            }
            Some(kind) if self.channels() > 1 => {
                write!(f, "{}{}{}", self.channels(), kind.prefix(), self.bits_per_channel())
            }
            _ => write!(f, "DataType({:#x})", self.0),
        }
    }
}

impl fmt::Debug for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
