//! Endian-aware binary I/O over seekable streams, plus an MSB-first bit cursor.
//!
//! * [`BinaryReader`] and [`BinaryWriter`] encode fixed-width integers (16 to 64 bits, both byte
//!   orders), IEEE floats, booleans and fixed-length, length-prefixed or terminated strings.
//!   Every layout written by the writer is read back bit-for-bit by the matching reader method.
//! * [`BitReader`] exposes an in-memory buffer as individually addressable bits, including
//!   unsigned and signed Exponential-Golomb codes as used by H.264/H.265 bitstreams.
//!
//! A failed read never leaves the stream half-consumed: the reader rewinds to where the read
//! started before returning the error.
//!
//! # References
//! * <https://www.itu.int/rec/T-REC-H.264> (section 9.1, Exp-Golomb codes)
//! * <https://id3.org/id3v2.4.0-structure> (synchsafe integers)

#![forbid(unsafe_code)]
#![forbid(unused_must_use)]
#![warn(missing_docs)]

mod bit_reader;
mod config;
mod endian;
mod error;
mod reader;
mod stream;
mod writer;


pub use bit_reader::BitReader;
pub use config::{
    LengthPrefix, StringConfig, Unterminated, DEFAULT_MAX_PREFIX_BYTES, DEFAULT_MAX_STRING_LENGTH,
};
pub use endian::Endian;
pub use error::{ConversionError, Error, Result};
pub use reader::BinaryReader;
pub use stream::SharedStream;
pub use writer::BinaryWriter;
