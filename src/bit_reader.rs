//! MSB-first bit cursor over an in-memory buffer.
//!
//! Bits are numbered from the most significant bit of the first byte. Multi-bit reads compose
//! their result the same way: the first bit read becomes the most significant bit of the value.
//!
//! # Example
//! ```
//! use binary_stream_io::BitReader;
//!
//! let data = [0b1011_0001, 0xff];
//! let mut reader = BitReader::new(&data);
//! assert_eq!(reader.read_bit().unwrap(), 1);
//! assert_eq!(reader.read_bits::<u8>(3).unwrap(), 0b011);
//! reader.align();
//! assert_eq!(reader.bits_available(), 8);
//! ```

use num_traits::{AsPrimitive, PrimInt, Signed, Unsigned};

use crate::error::{Error, Result};

/// Widest value a single read can assemble.
const MAX_READ_BITS: usize = u64::BITS as usize;

/// Longest run of leading zeros an Exp-Golomb code may start with.
const MAX_EXP_GOLOMB_PREFIX: usize = 63;

/// Reads bits, MSB-first, from a borrowed byte buffer.
///
/// The reader never copies or owns the buffer. Reads that need more bits than are left fail with
/// `Error::BitsExhausted` and leave the cursor where it was.
///
/// # Invariants
/// - `offset <= data.len() * 8`
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    /// Bits consumed so far (0 = MSB of first byte)
    offset: usize,
}

impl<'a> BitReader<'a> {
    /// Creates a cursor at the first bit of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    /// Rebinds the cursor to `data` and rewinds it to the first bit.
    pub fn reset(&mut self, data: &'a [u8]) {
        self.data = data;
        self.offset = 0;
    }

    /// Number of bits not yet read.
    pub fn bits_available(&self) -> usize {
        self.data.len() * 8 - self.offset
    }

    /// Number of bits already read.
    pub fn position(&self) -> usize {
        self.offset
    }

    /// Whether the cursor sits on a byte boundary.
    pub fn is_aligned(&self) -> bool {
        self.offset % 8 == 0
    }

    fn ensure(&self, requested: usize) -> Result<()> {
        let available = self.bits_available();
        if requested > available {
            return Err(Error::BitsExhausted {
                requested,
                available,
            });
        }
        Ok(())
    }

    /// Assembles `count` bits starting at the cursor. The caller has checked availability.
    fn peek(&self, count: usize) -> u64 {
        let mut result = 0u64;
        let mut position = self.offset;
        let mut remaining = count;

        while remaining > 0 {
            let bit_offset = position % 8;
            let bits_in_byte = 8 - bit_offset;
            let take = remaining.min(bits_in_byte);

            let byte = self.data[position / 8];
            let mask = ((1u16 << take) - 1) as u8;
            let bits = (byte >> (bits_in_byte - take)) & mask;

            result = (result << take) | u64::from(bits);
            position += take;
            remaining -= take;
        }

        result
    }

    /// Reads one bit, returning 0 or 1.
    pub fn read_bit(&mut self) -> Result<u8> {
        self.ensure(1)?;
        let byte = self.data[self.offset / 8];
        let bit = (byte >> (7 - self.offset % 8)) & 1;
        self.offset += 1;
        Ok(bit)
    }

    /// Returns the next `count` bits without moving the cursor.
    ///
    /// `count` may not exceed the width of `W` (nor 64). Reading zero bits yields zero.
    pub fn show_bits<W>(&self, count: usize) -> Result<W>
    where
        W: PrimInt + Unsigned + 'static,
        u64: AsPrimitive<W>,
    {
        let max = (8 * core::mem::size_of::<W>()).min(MAX_READ_BITS);
        if count > max {
            return Err(Error::InvalidBitCount {
                requested: count,
                max,
            });
        }
        self.ensure(count)?;
        Ok(self.peek(count).as_())
    }

    /// Reads the next `count` bits. See [`BitReader::show_bits`].
    pub fn read_bits<W>(&mut self, count: usize) -> Result<W>
    where
        W: PrimInt + Unsigned + 'static,
        u64: AsPrimitive<W>,
    {
        let value = self.show_bits(count)?;
        self.offset += count;
        Ok(value)
    }

    /// Skips `count` bits. Fails without moving if fewer remain.
    pub fn skip_bits(&mut self, count: usize) -> Result<()> {
        self.ensure(count)?;
        self.offset += count;
        Ok(())
    }

    /// Moves the cursor to the next byte boundary.
    pub fn align(&mut self) {
        self.offset = self.offset.next_multiple_of(8);
    }

    /// Decodes an unsigned Exponential-Golomb code: `n` zero bits, a one bit, then `n` payload
    /// bits, giving `2^n - 1 + payload`.
    ///
    /// Values wider than `W` are truncated. On failure the cursor is not moved.
    pub fn read_unsigned_exp_golomb<W>(&mut self) -> Result<W>
    where
        W: PrimInt + Unsigned + 'static,
        u64: AsPrimitive<W>,
    {
        Ok(self.read_exp_golomb_code()?.as_())
    }

    /// Decodes a signed Exponential-Golomb code. The unsigned code `k` maps to `(k + 1) / 2` for
    /// odd `k` and to `-(k / 2)` for even `k`, so 0, 1, 2, 3, 4 decode to 0, 1, -1, 2, -2.
    pub fn read_signed_exp_golomb<W>(&mut self) -> Result<W>
    where
        W: PrimInt + Signed + 'static,
        i64: AsPrimitive<W>,
    {
        let k = self.read_exp_golomb_code()?;
        let value = if k & 1 == 1 {
            (k / 2 + 1) as i64
        } else {
            -((k / 2) as i64)
        };
        Ok(value.as_())
    }

    fn read_exp_golomb_code(&mut self) -> Result<u64> {
        let start = self.offset;
        let result = self.decode_exp_golomb();
        if result.is_err() {
            self.offset = start;
        }
        result
    }

    fn decode_exp_golomb(&mut self) -> Result<u64> {
        let mut zeros = 0;
        while self.read_bit()? == 0 {
            zeros += 1;
            if zeros > MAX_EXP_GOLOMB_PREFIX {
                return Err(Error::InvalidBitCount {
                    requested: zeros,
                    max: MAX_EXP_GOLOMB_PREFIX,
                });
            }
        }
        let payload: u64 = self.read_bits(zeros)?;
        Ok((1u64 << zeros) - 1 + payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: [u8; 11] = [
        0x81, 0x90, 0x3C, 0x44, 0x28, 0x00, 0x44, 0x10, 0x20, 0xFF, 0xFA,
    ];

    /// Encodes Exp-Golomb codes MSB-first for round-trip checks.
    #[derive(Default)]
    struct CodeWriter {
        bytes: Vec<u8>,
        bits: usize,
    }

    impl CodeWriter {
        fn push_bits(&mut self, value: u64, count: usize) {
            for i in (0..count).rev() {
                if self.bits % 8 == 0 {
                    self.bytes.push(0);
                }
                if (value >> i) & 1 == 1 {
                    let last = self.bytes.len() - 1;
                    self.bytes[last] |= 0x80 >> (self.bits % 8);
                }
                self.bits += 1;
            }
        }

        fn push_unsigned(&mut self, value: u64) {
            let coded = value + 1;
            let n = (u64::BITS - 1 - coded.leading_zeros()) as usize;
            self.push_bits(0, n);
            self.push_bits(coded, n + 1);
        }

        fn push_signed(&mut self, value: i64) {
            let k = if value > 0 {
                2 * value as u64 - 1
            } else {
                2 * value.unsigned_abs()
            };
            self.push_unsigned(k);
        }
    }

    #[test]
    fn sample_walkthrough() {
        let mut reader = BitReader::new(&SAMPLE);
        assert_eq!(reader.read_bit().unwrap(), 1);
        reader.skip_bits(6).unwrap();
        assert_eq!(reader.show_bits::<u8>(2).unwrap(), 3);
        assert_eq!(reader.read_bits::<u8>(2).unwrap(), 3);
        assert_eq!(reader.read_bits::<u32>(32).unwrap(), 0x103C4428 << 1);
        reader.align();
        assert_eq!(reader.read_bits::<u8>(8).unwrap(), 0x44);
        assert_eq!(reader.read_unsigned_exp_golomb::<u8>().unwrap(), 7);
        assert_eq!(reader.read_signed_exp_golomb::<i8>().unwrap(), 4);
        assert_eq!(reader.read_bit().unwrap(), 0);
        assert_eq!(reader.read_bit().unwrap(), 0);
        reader.skip_bits(8 + 4).unwrap();
        assert_eq!(reader.bits_available(), 4);
        assert_eq!(reader.read_bits::<u8>(4).unwrap(), 0xA);
        assert!(matches!(
            reader.read_bit(),
            Err(Error::BitsExhausted {
                requested: 1,
                available: 0
            })
        ));
        assert!(reader.skip_bits(1).is_err());

        reader.reset(&SAMPLE);
        assert_eq!(reader.bits_available(), 8 * SAMPLE.len());
    }

    #[test]
    fn show_bits_does_not_advance() {
        let reader = BitReader::new(&[0b1100_0000]);
        assert_eq!(reader.show_bits::<u8>(2).unwrap(), 3);
        assert_eq!(reader.show_bits::<u8>(2).unwrap(), 3);
        assert_eq!(reader.position(), 0);
    }

    #[test]
    fn split_reads_compose() {
        for n in 1..40usize {
            for m in 1..(64 - n).min(88 - n) {
                let mut whole = BitReader::new(&SAMPLE);
                let combined = whole.read_bits::<u64>(n + m).unwrap();

                let mut parts = BitReader::new(&SAMPLE);
                let hi = parts.read_bits::<u64>(n).unwrap();
                let lo = parts.read_bits::<u64>(m).unwrap();
                assert_eq!((hi << m) | lo, combined, "n = {n}, m = {m}");
            }
        }
    }

    #[test]
    fn zero_bit_read() {
        let mut reader = BitReader::new(&[]);
        assert_eq!(reader.read_bits::<u8>(0).unwrap(), 0);
        assert_eq!(reader.bits_available(), 0);
    }

    #[test]
    fn count_wider_than_word() {
        let reader = BitReader::new(&SAMPLE);
        assert!(matches!(
            reader.show_bits::<u8>(9),
            Err(Error::InvalidBitCount {
                requested: 9,
                max: 8
            })
        ));
    }

    #[test]
    fn exhaustion_does_not_advance() {
        let mut reader = BitReader::new(&[0xff, 0x00]);
        reader.skip_bits(10).unwrap();
        assert!(reader.skip_bits(7).is_err());
        assert_eq!(reader.bits_available(), 6);
        assert!(reader.read_bits::<u8>(7).is_err());
        assert_eq!(reader.bits_available(), 6);
        reader.skip_bits(6).unwrap();
        assert!(reader.read_bit().is_err());
        assert_eq!(reader.bits_available(), 0);
    }

    #[test]
    fn truncated_exp_golomb_restores_offset() {
        // prefix never terminates
        let mut reader = BitReader::new(&[0x00]);
        assert!(reader.read_unsigned_exp_golomb::<u32>().is_err());
        assert_eq!(reader.position(), 0);

        // four leading zeros but only three payload bits
        let mut reader = BitReader::new(&[0b0000_1010]);
        assert!(reader.read_signed_exp_golomb::<i32>().is_err());
        assert_eq!(reader.bits_available(), 8);
    }

    #[test]
    fn unsigned_exp_golomb_round_trip() {
        let mut writer = CodeWriter::default();
        for v in 0..=255u64 {
            writer.push_unsigned(v);
        }
        let mut reader = BitReader::new(&writer.bytes);
        for v in 0..=255u64 {
            assert_eq!(reader.read_unsigned_exp_golomb::<u64>().unwrap(), v);
        }
        assert!(reader.bits_available() < 8);
    }

    #[test]
    fn signed_exp_golomb_round_trip() {
        let mut writer = CodeWriter::default();
        for v in -300..=300i64 {
            writer.push_signed(v);
        }
        let mut reader = BitReader::new(&writer.bytes);
        for v in -300..=300i64 {
            assert_eq!(reader.read_signed_exp_golomb::<i32>().unwrap(), v as i32);
        }
    }

    #[test]
    fn signed_mapping() {
        // codes for k = 0..=4: 1, 010, 011, 00100, 00101
        let data = [0b1010_0110, 0b0100_0010, 0b1000_0000];
        let mut reader = BitReader::new(&data);
        let decoded: Vec<i16> = (0..5)
            .map(|_| reader.read_signed_exp_golomb::<i16>().unwrap())
            .collect();
        assert_eq!(decoded, [0, 1, -1, 2, -2]);
    }
}
