//! Byte-order primitives.
//!
//! Every fixed-width integer in this crate goes through the same three functions: `assemble`
//! folds up to 8 bytes into a `u64`, `sign_extend` widens a narrow two's complement value, and
//! `disassemble` writes the low-order bytes of a `u64` back out.

/// Byte order of a multi-byte value.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Endian {
    /// Least significant byte first.
    Little,
    /// Most significant byte first.
    Big,
}

/// Folds `bytes` (at most 8) into an unsigned value.
#[inline]
pub(crate) fn assemble(bytes: &[u8], endian: Endian) -> u64 {
    debug_assert!(bytes.len() <= 8);
    let fold = |acc: u64, b: &u8| (acc << 8) | u64::from(*b);
    match endian {
        Endian::Little => bytes.iter().rev().fold(0, fold),
        Endian::Big => bytes.iter().fold(0, fold),
    }
}

/// Interprets the low `len` bytes of `value` as a two's complement number.
#[inline]
pub(crate) fn sign_extend(value: u64, len: usize) -> i64 {
    debug_assert!((1..=8).contains(&len));
    let shift = 64 - 8 * len as u32;
    ((value << shift) as i64) >> shift
}

/// Stores the low `out.len()` bytes of `value` into `out`. Higher bytes are dropped.
#[inline]
pub(crate) fn disassemble(value: u64, out: &mut [u8], endian: Endian) {
    debug_assert!(out.len() <= 8);
    let len = out.len();
    for (i, b) in out.iter_mut().enumerate() {
        let byte_index = match endian {
            Endian::Little => i,
            Endian::Big => len - 1 - i,
        };
        *b = (value >> (8 * byte_index)) as u8;
    }
}

/// Largest value a synchsafe 32-bit integer can hold.
pub(crate) const SYNCHSAFE_MAX: u32 = (1 << 28) - 1;

/// Decodes a synchsafe integer: four bytes of which only the low 7 bits are used.
#[inline]
pub(crate) fn from_synchsafe(value: u32) -> u32 {
    (value & 0x7f)
        | ((value & 0x7f00) >> 1)
        | ((value & 0x7f_0000) >> 2)
        | ((value & 0x7f00_0000) >> 3)
}

/// Encodes `value` (at most `SYNCHSAFE_MAX`) as a synchsafe integer.
#[inline]
pub(crate) fn to_synchsafe(value: u32) -> u32 {
    debug_assert!(value <= SYNCHSAFE_MAX);
    (value & 0x7f)
        | ((value & 0x3f80) << 1)
        | ((value & 0x1f_c000) << 2)
        | ((value & 0x0fe0_0000) << 3)
}
