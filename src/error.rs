//! Error types shared by the readers and the writer.

/// Errors returned by `BinaryReader`, `BinaryWriter` and `BitReader`.
///
/// Two families are distinguished. Stream failures (`Io`, `Detached`, `StreamInUse`,
/// `BitsExhausted`) mean the underlying channel could not deliver or accept the bytes. Conversion
/// errors mean the bytes were available but do not describe a valid value of the requested shape.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The underlying stream reported an error, including end of file.
    #[error("stream I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No stream is attached, or the owner of a borrowed stream has already destroyed it.
    #[error("no stream attached")]
    Detached,

    /// The stream is currently borrowed elsewhere and cannot be accessed.
    #[error("stream is already in use")]
    StreamInUse,

    /// The decoded data is not valid for the requested shape.
    #[error("conversion error: {0}")]
    Conversion(#[from] ConversionError),

    /// A bit cursor ran out of bits.
    #[error("bit buffer exhausted: requested {requested} bits, {available} available")]
    BitsExhausted {
        /// Number of bits the operation needed.
        requested: usize,
        /// Number of bits left in the buffer.
        available: usize,
    },

    /// A bit count exceeded the width of the requested word.
    #[error("invalid bit count {requested} (max {max})")]
    InvalidBitCount {
        /// Number of bits the caller asked for.
        requested: usize,
        /// Largest bit count the word type can hold.
        max: usize,
    },
}

impl Error {
    /// Returns `true` if the error was raised by the stream or buffer rather than by decoding.
    pub fn is_stream_failure(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Detached | Self::StreamInUse | Self::BitsExhausted { .. }
        )
    }

    /// Returns `true` for semantic decode/encode failures.
    pub fn is_conversion(&self) -> bool {
        matches!(self, Self::Conversion(_))
    }
}

/// Semantic decode and encode failures.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum ConversionError {
    /// A variable-length prefix is wider than the configured maximum.
    #[error("length denotation exceeds {max_bytes} bytes")]
    PrefixTooLong {
        /// Widest prefix accepted.
        max_bytes: usize,
    },

    /// A length field points past the end of the stream.
    #[error("length {length} exceeds the {remaining} bytes left in the stream")]
    LengthExceedsStream {
        /// Decoded length.
        length: u64,
        /// Bytes between the end of the prefix and the end of the stream.
        remaining: u64,
    },

    /// A length field exceeds the configured maximum.
    #[error("length {length} exceeds the configured maximum of {max}")]
    LengthExceedsLimit {
        /// Decoded length.
        length: u64,
        /// Configured maximum.
        max: u64,
    },

    /// A value cannot be represented in the requested encoding.
    #[error("value {value} cannot be encoded (max {max})")]
    ValueTooLarge {
        /// Value passed by the caller.
        value: u64,
        /// Largest encodable value.
        max: u64,
    },

    /// No terminator was found within the scan bound.
    #[error("no terminator within {scanned} bytes")]
    Unterminated {
        /// Number of bytes scanned.
        scanned: usize,
    },

    /// String contents are not well-formed UTF-8.
    #[error("string is not valid UTF-8")]
    InvalidUtf8,
}

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;
