//! String encoding configuration shared by `BinaryReader` and `BinaryWriter`.

use crate::endian::Endian;

/// Default upper bound for decoded length-prefixed strings.
pub const DEFAULT_MAX_STRING_LENGTH: usize = 16 * 1024 * 1024;

/// Widest variable-length prefix accepted for strings by default.
pub const DEFAULT_MAX_PREFIX_BYTES: usize = 4;

/// Encoding of the length field in front of a length-prefixed string.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LengthPrefix {
    /// Variable-length big-endian integer. The number of leading zero bits in the first byte,
    /// plus one, gives the width of the prefix in bytes; the first set bit is a marker and is
    /// not part of the value. `0x83` encodes 3, `0x41 0x2c` encodes 300.
    VarUInt {
        /// Widest prefix accepted, 1 to 8.
        max_bytes: usize,
    },
    /// Single unsigned byte.
    U8,
    /// Unsigned 16-bit integer.
    U16(Endian),
    /// Unsigned 32-bit integer.
    U32(Endian),
}

impl LengthPrefix {
    /// Largest string length this prefix can describe.
    pub fn max_encodable(self) -> u64 {
        match self {
            Self::VarUInt { max_bytes } => {
                let max_bytes = max_bytes.clamp(1, 8) as u32;
                (1u64 << (7 * max_bytes)) - 1
            }
            Self::U8 => u8::MAX.into(),
            Self::U16(_) => u16::MAX.into(),
            Self::U32(_) => u32::MAX.into(),
        }
    }
}

impl Default for LengthPrefix {
    fn default() -> Self {
        Self::VarUInt {
            max_bytes: DEFAULT_MAX_PREFIX_BYTES,
        }
    }
}

/// What a bounded terminated-string read does when the bound is hit before a terminator.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Unterminated {
    /// Return every scanned byte. The stream is left just past the scanned bytes.
    #[default]
    Truncate,
    /// Fail with `ConversionError::Unterminated` and restore the stream position.
    Fail,
}

/// Configuration for string encoding and decoding.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct StringConfig {
    /// Encoding of length prefixes.
    pub length_prefix: LengthPrefix,
    /// Longest length-prefixed string the reader accepts.
    pub max_length: usize,
    /// Byte that ends a terminated string.
    pub terminator: u8,
    /// Policy for bounded terminated reads that find no terminator.
    pub unterminated: Unterminated,
}

impl Default for StringConfig {
    fn default() -> Self {
        Self {
            length_prefix: LengthPrefix::default(),
            max_length: DEFAULT_MAX_STRING_LENGTH,
            terminator: 0,
            unterminated: Unterminated::default(),
        }
    }
}
