use std::fmt;

use crate::{bin, config::ConfigError};

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// address with its intra-line offset bits shifted out
pub struct BlockId(u32);

impl BlockId {
    pub fn new(v: u32) -> Self {
        Self(v)
    }
    pub fn into_inner(self) -> u32 {
        self.0
    }
    pub fn into_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010X}", self.0)
    }
}

/// Size of a cache line in bytes. Always a power of two.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineSize {
    bytes: u32,
    offset_bits: u32,
}

impl LineSize {
    pub fn new(bytes: u32) -> Result<Self, ConfigError> {
        match bin::exact_log2(bytes) {
            Some(offset_bits) => Ok(Self { bytes, offset_bits }),
            None => Err(ConfigError::LineSizeNotPowerOfTwo { line_bytes: bytes }),
        }
    }
    pub fn bytes(&self) -> u32 {
        self.bytes
    }
    pub fn offset_bits(&self) -> u32 {
        self.offset_bits
    }
    pub fn block_of(&self, address: u32) -> BlockId {
        block_id(address, *self)
    }
}

impl fmt::Display for LineSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bytes", self.bytes)
    }
}

/// strips the offset bits of `address`.
pub fn block_id(address: u32, line_size: LineSize) -> BlockId {
    BlockId(bin::extract_upper(address, line_size.offset_bits))
}
