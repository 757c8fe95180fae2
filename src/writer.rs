use std::cell::RefCell;
use std::io::{Seek, SeekFrom, Write};
use std::rc::Rc;

use zerocopy::byteorder::{BE, F32, F64, LE};
use zerocopy::IntoBytes;

use crate::config::{LengthPrefix, StringConfig};
use crate::endian::{disassemble, to_synchsafe, Endian, SYNCHSAFE_MAX};
use crate::error::{ConversionError, Result};
use crate::stream::{borrow_stream, SharedStream, StreamHandle};

/// Encodes binary values into a stream, using exactly the layouts `BinaryReader` decodes.
///
/// Values passed to the narrow fixed-width writers (24, 40 and 56 bits) are truncated to their
/// low-order bytes. Writers that can reject their input (length-prefixed strings, variable-length
/// and synchsafe integers) validate before writing anything.
///
/// Ownership follows the same rules as `BinaryReader`: a clone borrows the stream and never owns
/// it.
pub struct BinaryWriter<S> {
    stream: StreamHandle<S>,
    config: StringConfig,
}

impl<S> BinaryWriter<S> {
    /// Creates a writer that owns `stream`.
    pub fn new(stream: S) -> Self {
        Self::from_shared(Rc::new(RefCell::new(stream)), true)
    }

    /// Creates a writer over a shared stream, owning it if `take_ownership` is set.
    pub fn from_shared(stream: SharedStream<S>, take_ownership: bool) -> Self {
        Self {
            stream: StreamHandle::new(Some(stream), take_ownership),
            config: StringConfig::default(),
        }
    }

    /// Creates a writer with no stream attached.
    pub fn detached() -> Self {
        Self {
            stream: StreamHandle::Detached,
            config: StringConfig::default(),
        }
    }

    /// Replaces the string configuration.
    pub fn with_config(mut self, config: StringConfig) -> Self {
        self.config = config;
        self
    }

    /// Current string configuration.
    pub fn config(&self) -> &StringConfig {
        &self.config
    }

    /// Updates the string configuration for subsequent writes.
    pub fn set_config(&mut self, config: StringConfig) {
        self.config = config;
    }

    /// Assigns a new stream. A previously owned stream loses this writer's strong reference first.
    pub fn set_stream(&mut self, stream: Option<SharedStream<S>>, take_ownership: bool) {
        self.stream.set(stream, take_ownership);
    }

    /// The stream currently written to, if it is attached and still alive.
    pub fn stream(&self) -> Option<SharedStream<S>> {
        self.stream.get()
    }

    /// Whether this writer owns its stream.
    pub fn has_ownership(&self) -> bool {
        self.stream.is_owned()
    }
}

impl<S> Default for BinaryWriter<S> {
    fn default() -> Self {
        Self::detached()
    }
}

impl<S> Clone for BinaryWriter<S> {
    fn clone(&self) -> Self {
        Self {
            stream: self.stream.clone(),
            config: self.config,
        }
    }
}

macro_rules! uint_writers {
    ($($(#[$doc:meta])* $name:ident($ty:ty), $len:literal, $endian:ident;)*) => {
        $(
            $(#[$doc])*
            #[inline]
            pub fn $name(&mut self, value: $ty) -> Result<()> {
                self.write_uint(value as u64, $len, Endian::$endian)
            }
        )*
    };
}

impl<S: Write> BinaryWriter<S> {
    fn with_stream<T>(&self, op: impl FnOnce(&mut S) -> Result<T>) -> Result<T> {
        let shared = self.stream.require()?;
        let mut stream = borrow_stream(&shared)?;
        op(&mut stream)
    }

    /// Writes `bytes` verbatim.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.with_stream(|s| Ok(s.write_all(bytes)?))
    }

    /// Writes a small, fixed-size array of bytes.
    #[inline]
    pub fn write_cbytes<const N: usize>(&mut self, value: [u8; N]) -> Result<()> {
        self.write_bytes(&value)
    }

    fn write_uint(&mut self, value: u64, len: usize, endian: Endian) -> Result<()> {
        let mut buf = [0u8; 8];
        let bytes = &mut buf[..len];
        disassemble(value, bytes, endian);
        self.write_bytes(bytes)
    }

    /// Flushes the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        self.with_stream(|s| Ok(s.flush()?))
    }

    /// Writes a single `u8` value.
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_cbytes([value])
    }

    /// Writes a single `i8` value.
    pub fn write_i8(&mut self, value: i8) -> Result<()> {
        self.write_cbytes([value as u8])
    }

    /// Writes a `bool` value. True is encoded as 1. False is encoded as 0.
    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.write_u8(value as u8)
    }

    uint_writers! {
        /// Writes a `u16` in little-endian byte order.
        write_u16_le(u16), 2, Little;
        /// Writes a `u16` in big-endian byte order.
        write_u16_be(u16), 2, Big;
        /// Writes the low 24 bits of `value` in little-endian byte order.
        write_u24_le(u32), 3, Little;
        /// Writes the low 24 bits of `value` in big-endian byte order.
        write_u24_be(u32), 3, Big;
        /// Writes a `u32` in little-endian byte order.
        write_u32_le(u32), 4, Little;
        /// Writes a `u32` in big-endian byte order.
        write_u32_be(u32), 4, Big;
        /// Writes the low 40 bits of `value` in little-endian byte order.
        write_u40_le(u64), 5, Little;
        /// Writes the low 40 bits of `value` in big-endian byte order.
        write_u40_be(u64), 5, Big;
        /// Writes the low 56 bits of `value` in little-endian byte order.
        write_u56_le(u64), 7, Little;
        /// Writes the low 56 bits of `value` in big-endian byte order.
        write_u56_be(u64), 7, Big;
        /// Writes a `u64` in little-endian byte order.
        write_u64_le(u64), 8, Little;
        /// Writes a `u64` in big-endian byte order.
        write_u64_be(u64), 8, Big;
        /// Writes an `i16` in little-endian byte order.
        write_i16_le(i16), 2, Little;
        /// Writes an `i16` in big-endian byte order.
        write_i16_be(i16), 2, Big;
        /// Writes the low 24 bits of `value` (two's complement) in little-endian byte order.
        write_i24_le(i32), 3, Little;
        /// Writes the low 24 bits of `value` (two's complement) in big-endian byte order.
        write_i24_be(i32), 3, Big;
        /// Writes an `i32` in little-endian byte order.
        write_i32_le(i32), 4, Little;
        /// Writes an `i32` in big-endian byte order.
        write_i32_be(i32), 4, Big;
        /// Writes the low 40 bits of `value` (two's complement) in little-endian byte order.
        write_i40_le(i64), 5, Little;
        /// Writes the low 40 bits of `value` (two's complement) in big-endian byte order.
        write_i40_be(i64), 5, Big;
        /// Writes the low 56 bits of `value` (two's complement) in little-endian byte order.
        write_i56_le(i64), 7, Little;
        /// Writes the low 56 bits of `value` (two's complement) in big-endian byte order.
        write_i56_be(i64), 7, Big;
        /// Writes an `i64` in little-endian byte order.
        write_i64_le(i64), 8, Little;
        /// Writes an `i64` in big-endian byte order.
        write_i64_be(i64), 8, Big;
    }

    /// Writes an `f32` in little-endian byte order.
    pub fn write_f32_le(&mut self, value: f32) -> Result<()> {
        self.write_bytes(F32::<LE>::new(value).as_bytes())
    }

    /// Writes an `f32` in big-endian byte order.
    pub fn write_f32_be(&mut self, value: f32) -> Result<()> {
        self.write_bytes(F32::<BE>::new(value).as_bytes())
    }

    /// Writes an `f64` in little-endian byte order.
    pub fn write_f64_le(&mut self, value: f64) -> Result<()> {
        self.write_bytes(F64::<LE>::new(value).as_bytes())
    }

    /// Writes an `f64` in big-endian byte order.
    pub fn write_f64_be(&mut self, value: f64) -> Result<()> {
        self.write_bytes(F64::<BE>::new(value).as_bytes())
    }

    /// Writes `value` as an 8.8 fixed-point number in a little-endian `u16`. Out-of-range values
    /// saturate.
    pub fn write_fixed8_le(&mut self, value: f32) -> Result<()> {
        self.write_u16_le((value * 256.0) as u16)
    }

    /// Writes `value` as an 8.8 fixed-point number in a big-endian `u16`.
    pub fn write_fixed8_be(&mut self, value: f32) -> Result<()> {
        self.write_u16_be((value * 256.0) as u16)
    }

    /// Writes `value` as a 16.16 fixed-point number in a little-endian `u32`.
    pub fn write_fixed16_le(&mut self, value: f64) -> Result<()> {
        self.write_u32_le((value * 65536.0) as u32)
    }

    /// Writes `value` as a 16.16 fixed-point number in a big-endian `u32`.
    pub fn write_fixed16_be(&mut self, value: f64) -> Result<()> {
        self.write_u32_be((value * 65536.0) as u32)
    }

    /// Writes a synchsafe 32-bit integer. Values above 28 bits are rejected.
    pub fn write_synchsafe_u32_be(&mut self, value: u32) -> Result<()> {
        if value > SYNCHSAFE_MAX {
            return Err(ConversionError::ValueTooLarge {
                value: value.into(),
                max: SYNCHSAFE_MAX.into(),
            }
            .into());
        }
        self.write_u32_be(to_synchsafe(value))
    }

    /// Writes a variable-length unsigned integer using the shortest encoding, up to 8 bytes.
    /// Values of 2^56 and above cannot be encoded.
    pub fn write_var_uint_be(&mut self, value: u64) -> Result<()> {
        let (buf, len) = encode_var_uint(value, 8)?;
        self.write_bytes(&buf[..len])
    }

    /// Writes `s` verbatim, without length or terminator.
    pub fn write_string(&mut self, s: &str) -> Result<()> {
        self.write_bytes(s.as_bytes())
    }

    /// Writes the length of `bytes` using the configured prefix, then `bytes`.
    ///
    /// Lengths above [`StringConfig::max_length`] are rejected, as the reader would reject them.
    pub fn write_length_prefixed_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let len = bytes.len() as u64;
        let limit = self.config.max_length as u64;
        if len > limit {
            return Err(ConversionError::LengthExceedsLimit { length: len, max: limit }.into());
        }

        let prefix = self.config.length_prefix;
        let max = prefix.max_encodable();
        if len > max {
            return Err(ConversionError::ValueTooLarge { value: len, max }.into());
        }

        match prefix {
            LengthPrefix::VarUInt { max_bytes } => {
                let (buf, n) = encode_var_uint(len, max_bytes)?;
                self.write_bytes(&buf[..n])?;
            }
            LengthPrefix::U8 => self.write_uint(len, 1, Endian::Big)?,
            LengthPrefix::U16(endian) => self.write_uint(len, 2, endian)?,
            LengthPrefix::U32(endian) => self.write_uint(len, 4, endian)?,
        }
        self.write_bytes(bytes)
    }

    /// Writes `s` as a length-prefixed string.
    pub fn write_length_prefixed_string(&mut self, s: &str) -> Result<()> {
        self.write_length_prefixed_bytes(s.as_bytes())
    }

    /// Writes `s` followed by the configured terminator.
    pub fn write_terminated_string(&mut self, s: &str) -> Result<()> {
        let terminator = self.config.terminator;
        self.write_terminated_string_with(s, terminator)
    }

    /// Writes `s` followed by `terminator`. `s` is not checked for embedded terminators.
    pub fn write_terminated_string_with(&mut self, s: &str, terminator: u8) -> Result<()> {
        self.write_bytes(s.as_bytes())?;
        self.write_u8(terminator)
    }
}

impl<S: Seek> BinaryWriter<S> {
    /// Seeks the underlying stream.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let shared = self.stream.require()?;
        let mut stream = borrow_stream(&shared)?;
        Ok(stream.seek(pos)?)
    }

    /// Current position of the underlying stream.
    pub fn position(&mut self) -> Result<u64> {
        self.seek(SeekFrom::Current(0))
    }
}

/// Encodes `value` in the shortest variable-length form of at most `max_bytes` bytes.
fn encode_var_uint(value: u64, max_bytes: usize) -> Result<([u8; 8], usize)> {
    let max_bytes = max_bytes.clamp(1, 8);
    for len in 1..=max_bytes {
        let marker = 1u64 << (7 * len);
        if value < marker {
            let mut buf = [0u8; 8];
            disassemble(value | marker, &mut buf[..len], Endian::Big);
            return Ok((buf, len));
        }
    }
    Err(ConversionError::ValueTooLarge {
        value,
        max: (1u64 << (7 * max_bytes)) - 1,
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(value: u64) -> Vec<u8> {
        let (buf, len) = encode_var_uint(value, 8).unwrap();
        buf[..len].to_vec()
    }

    #[test]
    fn var_uint_shortest_form() {
        assert_eq!(encoded(0), [0x80]);
        assert_eq!(encoded(3), [0x83]);
        assert_eq!(encoded(0x7f), [0xff]);
        assert_eq!(encoded(0x80), [0x40, 0x80]);
        assert_eq!(encoded(300), [0x41, 0x2c]);
        assert_eq!(encoded((1 << 56) - 1), [0x01, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn var_uint_limits() {
        assert!(encode_var_uint(1 << 56, 8).is_err());
        assert!(encode_var_uint(0x80, 1).is_err());
        assert!(encode_var_uint(0x7f, 1).is_ok());
    }
}
