//! Encoding of primitive values to a byte sink,
//! abstracted over byte order.

pub mod basic;

use byteordered::Endianness;
use dcmio_core::Tag;
use std::io::Write;

type Result<T> = std::io::Result<T>;

/// Trait for writing fixed-width primitive values to a byte sink
/// under a specific byte order.
pub trait BasicEncode {
    /// The byte order this encoder writes under.
    fn endianness(&self) -> Endianness;

    /// Encode an unsigned short value.
    fn encode_us<S>(&self, to: S, value: u16) -> Result<()>
    where
        S: Write;

    /// Encode an unsigned long value.
    fn encode_ul<S>(&self, to: S, value: u32) -> Result<()>
    where
        S: Write;

    /// Encode a signed short value.
    fn encode_ss<S>(&self, to: S, value: i16) -> Result<()>
    where
        S: Write;

    /// Encode a signed long value.
    fn encode_sl<S>(&self, to: S, value: i32) -> Result<()>
    where
        S: Write;

    /// Encode a single precision float value.
    fn encode_fl<S>(&self, to: S, value: f32) -> Result<()>
    where
        S: Write;

    /// Encode a double precision float value.
    fn encode_fd<S>(&self, to: S, value: f64) -> Result<()>
    where
        S: Write;

    /// Encode an attribute tag: group, then element.
    fn encode_tag<S>(&self, mut to: S, tag: Tag) -> Result<()>
    where
        S: Write,
    {
        self.encode_us(&mut to, tag.group())?;
        self.encode_us(&mut to, tag.element())
    }
}
