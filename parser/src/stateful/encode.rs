//! A stateful DICOM encoding abstraction over a byte sink.
//!
//! Mirrors the stateful decoder: the encoder holds the transfer syntax
//! stack and writes primitive values under the current frame. Detached
//! sub-encoders over an in-memory buffer are used to measure a value's
//! encoded length before its element header is emitted.

use dcmio_core::Tag;
use dcmio_encoding::encode::basic::BasicEncoder;
use dcmio_encoding::encode::BasicEncode;
use dcmio_encoding::{Endianness, VrMode};
use std::io::{self, Write};

type Result<T> = io::Result<T>;

/// A byte sink with a transfer syntax stack.
#[derive(Debug)]
pub struct StatefulEncoder<W> {
    dest: W,
    basic: BasicEncoder,
    vr_mode: VrMode,
    syntax_stack: Vec<(Endianness, VrMode)>,
}

impl<W> StatefulEncoder<W> {
    /// Create a new stateful encoder over the given sink,
    /// in Explicit VR Little Endian.
    pub fn new(dest: W) -> Self {
        StatefulEncoder::with_syntax(dest, Endianness::Little, VrMode::Explicit)
    }

    /// Create a new stateful encoder under the given syntax frame.
    pub fn with_syntax(dest: W, endianness: Endianness, vr_mode: VrMode) -> Self {
        StatefulEncoder {
            dest,
            basic: BasicEncoder::new(endianness),
            vr_mode,
            syntax_stack: Vec::new(),
        }
    }

    /// Enter a new transfer syntax frame. The previous frame is kept on
    /// the stack and restored by `pop_syntax`.
    pub fn push_syntax(&mut self, endianness: Endianness, vr_mode: VrMode) {
        self.syntax_stack.push((self.basic.endianness(), self.vr_mode));
        self.basic = BasicEncoder::new(endianness);
        self.vr_mode = vr_mode;
    }

    /// Leave the current transfer syntax frame.
    pub fn pop_syntax(&mut self) {
        if let Some((endianness, vr_mode)) = self.syntax_stack.pop() {
            self.basic = BasicEncoder::new(endianness);
            self.vr_mode = vr_mode;
        }
    }

    /// The byte order of the current frame.
    pub fn endianness(&self) -> Endianness {
        self.basic.endianness()
    }

    /// The VR mode of the current frame.
    pub fn vr_mode(&self) -> VrMode {
        self.vr_mode
    }

    /// Create a detached encoder over a fresh in-memory buffer, under
    /// this encoder's current frame. Used to measure value lengths
    /// before emitting element headers.
    pub fn sub_encoder(&self) -> StatefulEncoder<Vec<u8>> {
        StatefulEncoder::with_syntax(Vec::new(), self.basic.endianness(), self.vr_mode)
    }
}

impl StatefulEncoder<Vec<u8>> {
    /// Detach the accumulated bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.dest
    }
}

impl<W: Write> StatefulEncoder<W> {
    /// Write an unsigned short under the current byte order.
    pub fn write_us(&mut self, value: u16) -> Result<()> {
        self.basic.encode_us(&mut self.dest, value)
    }

    /// Write an unsigned long under the current byte order.
    pub fn write_ul(&mut self, value: u32) -> Result<()> {
        self.basic.encode_ul(&mut self.dest, value)
    }

    /// Write a signed short under the current byte order.
    pub fn write_ss(&mut self, value: i16) -> Result<()> {
        self.basic.encode_ss(&mut self.dest, value)
    }

    /// Write a signed long under the current byte order.
    pub fn write_sl(&mut self, value: i32) -> Result<()> {
        self.basic.encode_sl(&mut self.dest, value)
    }

    /// Write a single precision float under the current byte order.
    pub fn write_fl(&mut self, value: f32) -> Result<()> {
        self.basic.encode_fl(&mut self.dest, value)
    }

    /// Write a double precision float under the current byte order.
    pub fn write_fd(&mut self, value: f64) -> Result<()> {
        self.basic.encode_fd(&mut self.dest, value)
    }

    /// Write an attribute tag under the current byte order.
    pub fn write_tag(&mut self, tag: Tag) -> Result<()> {
        self.basic.encode_tag(&mut self.dest, tag)
    }

    /// Write raw bytes as they are.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.dest.write_all(bytes)
    }

    /// Write the given number of zero bytes.
    pub fn write_zeros(&mut self, count: usize) -> Result<()> {
        const ZEROS: [u8; 128] = [0; 128];
        let mut remaining = count;
        while remaining > 0 {
            let chunk = remaining.min(ZEROS.len());
            self.dest.write_all(&ZEROS[..chunk])?;
            remaining -= chunk;
        }
        Ok(())
    }
}
