use std::cell::RefCell;
use std::io::{self, Read, Seek, SeekFrom};
use std::rc::Rc;

use zerocopy::byteorder::{BE, F32, F64, LE};

use crate::config::{LengthPrefix, StringConfig, Unterminated};
use crate::endian::{assemble, from_synchsafe, sign_extend, Endian};
use crate::error::{ConversionError, Error, Result};
use crate::stream::{borrow_stream, SharedStream, StreamHandle};

/// Reads values from a seekable stream.
///
/// Fixed-width integers are available in 16, 24, 32, 40, 56 and 64 bits, signed and unsigned,
/// in both byte orders. Floats are IEEE-754 in both byte orders. Strings come in three shapes:
/// fixed length, length-prefixed (see [`LengthPrefix`]) and terminated.
///
/// Every read is all-or-nothing. If a read fails, whether because the stream ran out of data or
/// because the data does not describe a valid value, the stream position is restored to where it
/// was before the read started. A later read therefore sees exactly the bytes it would have seen
/// had the failing read never been attempted.
///
/// The reader either owns its stream or borrows one that is owned elsewhere. Cloning a reader
/// always produces a borrowing reader for the same stream; see [`BinaryReader::has_ownership`].
pub struct BinaryReader<S> {
    stream: StreamHandle<S>,
    config: StringConfig,
}

impl<S> BinaryReader<S> {
    /// Creates a reader that owns `stream`.
    pub fn new(stream: S) -> Self {
        Self::from_shared(Rc::new(RefCell::new(stream)), true)
    }

    /// Creates a reader over a shared stream, owning it if `take_ownership` is set.
    pub fn from_shared(stream: SharedStream<S>, take_ownership: bool) -> Self {
        Self {
            stream: StreamHandle::new(Some(stream), take_ownership),
            config: StringConfig::default(),
        }
    }

    /// Creates a reader with no stream attached. Every read fails with `Error::Detached` until
    /// [`BinaryReader::set_stream`] is called.
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

    /// Updates the string configuration for subsequent reads.
    pub fn set_config(&mut self, config: StringConfig) {
        self.config = config;
    }

    /// Assigns a new stream. If the reader owned its previous stream, its strong reference is
    /// dropped first; the stream itself is destroyed only if no other `Rc` keeps it alive.
    pub fn set_stream(&mut self, stream: Option<SharedStream<S>>, take_ownership: bool) {
        self.stream.set(stream, take_ownership);
    }

    /// The stream currently read from, if it is attached and still alive.
    pub fn stream(&self) -> Option<SharedStream<S>> {
        self.stream.get()
    }

    /// Whether this reader owns its stream.
    pub fn has_ownership(&self) -> bool {
        self.stream.is_owned()
    }
}

impl<S> Default for BinaryReader<S> {
    fn default() -> Self {
        Self::detached()
    }
}

/// The clone reads from the same stream but never owns it.
impl<S> Clone for BinaryReader<S> {
    fn clone(&self) -> Self {
        Self {
            stream: self.stream.clone(),
            config: self.config,
        }
    }
}

macro_rules! uint_readers {
    ($($(#[$doc:meta])* $name:ident -> $ty:ty, $len:literal, $endian:ident;)*) => {
        $(
            $(#[$doc])*
            #[inline]
            pub fn $name(&mut self) -> Result<$ty> {
                Ok(self.transact(|s, _| read_uint(s, $len, Endian::$endian))? as $ty)
            }
        )*
    };
}

macro_rules! int_readers {
    ($($(#[$doc:meta])* $name:ident -> $ty:ty, $len:literal, $endian:ident;)*) => {
        $(
            $(#[$doc])*
            #[inline]
            pub fn $name(&mut self) -> Result<$ty> {
                let value = self.transact(|s, _| read_uint(s, $len, Endian::$endian))?;
                Ok(sign_extend(value, $len) as $ty)
            }
        )*
    };
}

impl<S: Read + Seek> BinaryReader<S> {
    fn with_stream<T>(&self, op: impl FnOnce(&mut S) -> Result<T>) -> Result<T> {
        let shared = self.stream.require()?;
        let mut stream = borrow_stream(&shared)?;
        op(&mut stream)
    }

    /// Runs `op` and rewinds the stream to its starting position if `op` fails.
    fn transact<T>(&mut self, op: impl FnOnce(&mut S, &StringConfig) -> Result<T>) -> Result<T> {
        let config = self.config;
        self.with_stream(|stream| {
            let start = stream.stream_position()?;
            let result = op(stream, &config);
            if let Err(err) = &result {
                match stream.seek(SeekFrom::Start(start)) {
                    Ok(_) => {
                        tracing::debug!(position = start, error = %err, "read failed, position restored")
                    }
                    Err(seek_err) => tracing::warn!(
                        position = start,
                        error = %err,
                        seek_error = %seek_err,
                        "read failed and position could not be restored"
                    ),
                }
            }
            result
        })
    }

    /// Seeks the underlying stream.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.with_stream(|s| Ok(s.seek(pos)?))
    }

    /// Current position of the underlying stream.
    pub fn position(&mut self) -> Result<u64> {
        self.with_stream(|s| Ok(s.stream_position()?))
    }

    /// Returns the total size of the stream in bytes. The read position is left unchanged.
    pub fn read_stream_size(&mut self) -> Result<u64> {
        self.with_stream(|s| {
            let pos = s.stream_position()?;
            let end = s.seek(SeekFrom::End(0))?;
            s.seek(SeekFrom::Start(pos))?;
            Ok(end)
        })
    }

    /// Reads a small array of bytes, with a constant length.
    #[inline]
    pub fn read_cbytes<const N: usize>(&mut self) -> Result<[u8; N]> {
        self.transact(|s, _| read_array(s))
    }

    /// Reads exactly `len` bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        self.transact(|s, _| read_vec(s, len))
    }

    /// Reads a single `u8` value.
    #[inline]
    pub fn read_u8(&mut self) -> Result<u8> {
        let [b] = self.read_cbytes::<1>()?;
        Ok(b)
    }

    /// Reads a single `i8` value.
    #[inline]
    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    /// Reads a `bool`. Zero is `false`, any other byte is `true`.
    #[inline]
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    uint_readers! {
        /// Reads a `u16` in little-endian byte order.
        read_u16_le -> u16, 2, Little;
        /// Reads a `u16` in big-endian byte order.
        read_u16_be -> u16, 2, Big;
        /// Reads a 24-bit unsigned integer in little-endian byte order.
        read_u24_le -> u32, 3, Little;
        /// Reads a 24-bit unsigned integer in big-endian byte order.
        read_u24_be -> u32, 3, Big;
        /// Reads a `u32` in little-endian byte order.
        read_u32_le -> u32, 4, Little;
        /// Reads a `u32` in big-endian byte order.
        read_u32_be -> u32, 4, Big;
        /// Reads a 40-bit unsigned integer in little-endian byte order.
        read_u40_le -> u64, 5, Little;
        /// Reads a 40-bit unsigned integer in big-endian byte order.
        read_u40_be -> u64, 5, Big;
        /// Reads a 56-bit unsigned integer in little-endian byte order.
        read_u56_le -> u64, 7, Little;
        /// Reads a 56-bit unsigned integer in big-endian byte order.
        read_u56_be -> u64, 7, Big;
        /// Reads a `u64` in little-endian byte order.
        read_u64_le -> u64, 8, Little;
        /// Reads a `u64` in big-endian byte order.
        read_u64_be -> u64, 8, Big;
    }

    int_readers! {
        /// Reads an `i16` in little-endian byte order.
        read_i16_le -> i16, 2, Little;
        /// Reads an `i16` in big-endian byte order.
        read_i16_be -> i16, 2, Big;
        /// Reads a 24-bit two's complement integer in little-endian byte order.
        read_i24_le -> i32, 3, Little;
        /// Reads a 24-bit two's complement integer in big-endian byte order.
        read_i24_be -> i32, 3, Big;
        /// Reads an `i32` in little-endian byte order.
        read_i32_le -> i32, 4, Little;
        /// Reads an `i32` in big-endian byte order.
        read_i32_be -> i32, 4, Big;
        /// Reads a 40-bit two's complement integer in little-endian byte order.
        read_i40_le -> i64, 5, Little;
        /// Reads a 40-bit two's complement integer in big-endian byte order.
        read_i40_be -> i64, 5, Big;
        /// Reads a 56-bit two's complement integer in little-endian byte order.
        read_i56_le -> i64, 7, Little;
        /// Reads a 56-bit two's complement integer in big-endian byte order.
        read_i56_be -> i64, 7, Big;
        /// Reads an `i64` in little-endian byte order.
        read_i64_le -> i64, 8, Little;
        /// Reads an `i64` in big-endian byte order.
        read_i64_be -> i64, 8, Big;
    }

    /// Reads an `f32` in little-endian byte order.
    pub fn read_f32_le(&mut self) -> Result<f32> {
        Ok(F32::<LE>::from_bytes(self.read_cbytes()?).get())
    }

    /// Reads an `f32` in big-endian byte order.
    pub fn read_f32_be(&mut self) -> Result<f32> {
        Ok(F32::<BE>::from_bytes(self.read_cbytes()?).get())
    }

    /// Reads an `f64` in little-endian byte order.
    pub fn read_f64_le(&mut self) -> Result<f64> {
        Ok(F64::<LE>::from_bytes(self.read_cbytes()?).get())
    }

    /// Reads an `f64` in big-endian byte order.
    pub fn read_f64_be(&mut self) -> Result<f64> {
        Ok(F64::<BE>::from_bytes(self.read_cbytes()?).get())
    }

    /// Reads an 8.8 fixed-point number stored as a little-endian `u16`.
    pub fn read_fixed8_le(&mut self) -> Result<f32> {
        Ok(f32::from(self.read_u16_le()?) / 256.0)
    }

    /// Reads an 8.8 fixed-point number stored as a big-endian `u16`.
    pub fn read_fixed8_be(&mut self) -> Result<f32> {
        Ok(f32::from(self.read_u16_be()?) / 256.0)
    }

    /// Reads a 16.16 fixed-point number stored as a little-endian `u32`.
    pub fn read_fixed16_le(&mut self) -> Result<f64> {
        Ok(f64::from(self.read_u32_le()?) / 65536.0)
    }

    /// Reads a 16.16 fixed-point number stored as a big-endian `u32`.
    pub fn read_fixed16_be(&mut self) -> Result<f64> {
        Ok(f64::from(self.read_u32_be()?) / 65536.0)
    }

    /// Reads a "synchsafe" 32-bit integer (as used by ID3v2 tags): four big-endian bytes
    /// carrying 7 bits each, giving a 28-bit value.
    pub fn read_synchsafe_u32_be(&mut self) -> Result<u32> {
        Ok(from_synchsafe(self.read_u32_be()?))
    }

    /// Reads a variable-length unsigned integer of up to 8 bytes.
    ///
    /// The number of leading zero bits in the first byte, plus one, is the total width of the
    /// integer. The first set bit is a marker and does not belong to the value; the remaining
    /// bits are the value in big-endian order. A first byte of zero is rejected with
    /// `ConversionError::PrefixTooLong`.
    pub fn read_var_uint_be(&mut self) -> Result<u64> {
        self.transact(|s, _| read_var_uint(s, 8))
    }

    /// Reads exactly `len` bytes and returns them as a string.
    ///
    /// No trailing-null handling is done. Contents that are not UTF-8 are a conversion error.
    pub fn read_string(&mut self, len: usize) -> Result<String> {
        self.transact(|s, _| into_string(read_vec(s, len)?))
    }

    /// Reads a length-prefixed byte string.
    ///
    /// The prefix is decoded as configured by [`StringConfig::length_prefix`]. If the decoded
    /// length exceeds [`StringConfig::max_length`] or the bytes left in the stream, this fails
    /// with a conversion error and leaves the stream where it was.
    pub fn read_length_prefixed_bytes(&mut self) -> Result<Vec<u8>> {
        self.transact(|s, config| read_length_prefixed(s, config))
    }

    /// Reads a length-prefixed UTF-8 string. See
    /// [`BinaryReader::read_length_prefixed_bytes`].
    pub fn read_length_prefixed_string(&mut self) -> Result<String> {
        self.transact(|s, config| into_string(read_length_prefixed(s, config)?))
    }

    /// Reads bytes up to the configured terminator. The terminator is consumed but not returned.
    ///
    /// Reaching the end of the stream before the terminator is a stream failure.
    pub fn read_terminated_bytes(&mut self) -> Result<Vec<u8>> {
        self.transact(|s, config| {
            read_until(s, config.terminator, usize::MAX, config.unterminated)
        })
    }

    /// Reads a UTF-8 string up to the configured terminator. The terminator is consumed but not
    /// returned.
    pub fn read_terminated_string(&mut self) -> Result<String> {
        self.transact(|s, config| {
            into_string(read_until(s, config.terminator, usize::MAX, config.unterminated)?)
        })
    }

    /// Reads bytes up to `terminator`, scanning at most `max_len` bytes.
    ///
    /// If the terminator is found it is consumed. If `max_len` bytes are scanned without finding
    /// it, [`StringConfig::unterminated`] decides: `Truncate` returns the scanned bytes and
    /// leaves the stream just past them, `Fail` returns `ConversionError::Unterminated` and
    /// restores the stream position.
    pub fn read_terminated_bytes_bounded(
        &mut self,
        max_len: usize,
        terminator: u8,
    ) -> Result<Vec<u8>> {
        self.transact(|s, config| read_until(s, terminator, max_len, config.unterminated))
    }

    /// Like [`BinaryReader::read_terminated_bytes_bounded`], returning a UTF-8 string.
    pub fn read_terminated_string_bounded(
        &mut self,
        max_len: usize,
        terminator: u8,
    ) -> Result<String> {
        self.transact(|s, config| {
            into_string(read_until(s, terminator, max_len, config.unterminated)?)
        })
    }

    /// Reads a length-prefixed string as a `BString`, without validating UTF-8.
    #[cfg(feature = "bstr")]
    pub fn read_length_prefixed_bstring(&mut self) -> Result<bstr::BString> {
        Ok(self.read_length_prefixed_bytes()?.into())
    }

    /// Reads a terminated string as a `BString`, without validating UTF-8.
    #[cfg(feature = "bstr")]
    pub fn read_terminated_bstring(&mut self) -> Result<bstr::BString> {
        Ok(self.read_terminated_bytes()?.into())
    }
}

fn read_array<R: Read, const N: usize>(r: &mut R) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

/// Reads exactly `len` bytes. The buffer grows with the data actually read, so an oversized
/// `len` fails with `UnexpectedEof` instead of allocating up front.
fn read_vec<R: Read>(r: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    r.by_ref().take(len as u64).read_to_end(&mut buf)?;
    if buf.len() < len {
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
    }
    Ok(buf)
}

fn read_uint<R: Read>(r: &mut R, len: usize, endian: Endian) -> Result<u64> {
    let mut buf = [0u8; 8];
    let bytes = &mut buf[..len];
    r.read_exact(bytes)?;
    Ok(assemble(bytes, endian))
}

fn read_var_uint<R: Read>(r: &mut R, max_bytes: usize) -> Result<u64> {
    let max_bytes = max_bytes.clamp(1, 8);
    let [first] = read_array::<_, 1>(r)?;
    let len = first.leading_zeros() as usize + 1;
    if len > max_bytes {
        return Err(ConversionError::PrefixTooLong { max_bytes }.into());
    }

    let mut buf = [0u8; 8];
    buf[0] = first & !(0x80 >> (len - 1));
    r.read_exact(&mut buf[1..len])?;
    Ok(assemble(&buf[..len], Endian::Big))
}

fn read_length<R: Read>(r: &mut R, prefix: LengthPrefix) -> Result<u64> {
    match prefix {
        LengthPrefix::VarUInt { max_bytes } => read_var_uint(r, max_bytes),
        LengthPrefix::U8 => read_uint(r, 1, Endian::Big),
        LengthPrefix::U16(endian) => read_uint(r, 2, endian),
        LengthPrefix::U32(endian) => read_uint(r, 4, endian),
    }
}

fn remaining<R: Seek>(r: &mut R) -> Result<u64> {
    let pos = r.stream_position()?;
    let end = r.seek(SeekFrom::End(0))?;
    r.seek(SeekFrom::Start(pos))?;
    Ok(end.saturating_sub(pos))
}

fn read_length_prefixed<R: Read + Seek>(r: &mut R, config: &StringConfig) -> Result<Vec<u8>> {
    let length = read_length(r, config.length_prefix)?;

    let max = config.max_length as u64;
    if length > max {
        return Err(ConversionError::LengthExceedsLimit { length, max }.into());
    }

    let remaining = remaining(r)?;
    if length > remaining {
        return Err(ConversionError::LengthExceedsStream { length, remaining }.into());
    }

    read_vec(r, length as usize)
}

fn read_until<R: Read>(
    r: &mut R,
    terminator: u8,
    max_len: usize,
    policy: Unterminated,
) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    loop {
        if out.len() == max_len {
            return match policy {
                Unterminated::Truncate => Ok(out),
                Unterminated::Fail => Err(ConversionError::Unterminated { scanned: max_len }.into()),
            };
        }
        let [b] = read_array::<_, 1>(r)?;
        if b == terminator {
            return Ok(out);
        }
        out.push(b);
    }
}

fn into_string(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(|_| Error::Conversion(ConversionError::InvalidUtf8))
}
