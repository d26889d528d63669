//! Decoding of primitive values from a byte source,
//! abstracted over byte order.

pub mod basic;

use byteordered::Endianness;
use dcmio_core::Tag;
use std::io::Read;

type Result<T> = std::io::Result<T>;

/// Trait for reading fixed-width primitive values off a byte source
/// under a specific byte order.
///
/// All methods operate over a borrowed source, so a single decoder value
/// can serve an entire stream.
pub trait BasicDecode {
    /// The byte order this decoder reads under.
    fn endianness(&self) -> Endianness;

    /// Decode an unsigned short value.
    fn decode_us<S>(&self, source: S) -> Result<u16>
    where
        S: Read;

    /// Decode a sequence of unsigned short values into the given slice.
    fn decode_us_into<S>(&self, source: S, target: &mut [u16]) -> Result<()>
    where
        S: Read;

    /// Decode an unsigned long value.
    fn decode_ul<S>(&self, source: S) -> Result<u32>
    where
        S: Read;

    /// Decode a sequence of unsigned long values into the given slice.
    fn decode_ul_into<S>(&self, source: S, target: &mut [u32]) -> Result<()>
    where
        S: Read;

    /// Decode a signed short value.
    fn decode_ss<S>(&self, source: S) -> Result<i16>
    where
        S: Read;

    /// Decode a signed long value.
    fn decode_sl<S>(&self, source: S) -> Result<i32>
    where
        S: Read;

    /// Decode a single precision float value.
    fn decode_fl<S>(&self, source: S) -> Result<f32>
    where
        S: Read;

    /// Decode a double precision float value.
    fn decode_fd<S>(&self, source: S) -> Result<f64>
    where
        S: Read;

    /// Decode an attribute tag: two consecutive unsigned shorts.
    fn decode_tag<S>(&self, mut source: S) -> Result<Tag>
    where
        S: Read,
    {
        let group = self.decode_us(&mut source)?;
        let element = self.decode_us(&mut source)?;
        Ok(Tag(group, element))
    }
}
