//! A stateful DICOM decoding abstraction over a byte source.
//!
//! The decoder tracks the number of bytes consumed, holds the stack of
//! transfer syntax frames (so that the file meta group, the data set
//! body and nested content can each be decoded under the right byte
//! order and VR mode), and carries the coding system installed by the
//! last Specific Character Set element.

use dcmio_core::dictionary::{DataDictionary, StandardDataDictionary};
use dcmio_core::header::SequenceItemHeaderError;
use dcmio_core::{tags, DataElementHeader, Length, SequenceItemHeader, Tag, Value, ValueList, VR};
use dcmio_encoding::decode::basic::BasicDecoder;
use dcmio_encoding::decode::BasicDecode;
use dcmio_encoding::text::CodingSystem;
use dcmio_encoding::{Endianness, VrMode};
use smallvec::smallvec;
use snafu::{OptionExt, ResultExt, Snafu};
use std::collections::VecDeque;
use std::io::{self, Read};

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("Could not read element tag at position {}", position))]
    ReadTag {
        position: u64,
        source: io::Error,
        backtrace: snafu::Backtrace,
    },

    #[snafu(display("Could not read element VR at position {}", position))]
    ReadVr {
        position: u64,
        source: io::Error,
        backtrace: snafu::Backtrace,
    },

    #[snafu(display("Could not read element length at position {}", position))]
    ReadLength {
        position: u64,
        source: io::Error,
        backtrace: snafu::Backtrace,
    },

    #[snafu(display("Could not read value data at position {}", position))]
    ReadValueData {
        position: u64,
        source: io::Error,
        backtrace: snafu::Backtrace,
    },

    #[snafu(display("Could not probe source at position {}", position))]
    ProbeSource {
        position: u64,
        source: io::Error,
        backtrace: snafu::Backtrace,
    },

    #[snafu(display("Invalid item header at position {}", position))]
    BadSequenceHeader {
        position: u64,
        #[snafu(backtrace)]
        source: SequenceItemHeaderError,
    },

    #[snafu(display(
        "Attempted to read a non-primitive {} value at position {}",
        vr,
        position
    ))]
    NonPrimitiveType {
        vr: VR,
        position: u64,
        backtrace: snafu::Backtrace,
    },

    #[snafu(display(
        "Undefined value length of element {} at position {}",
        tag,
        position
    ))]
    UndefinedValueLength {
        tag: Tag,
        position: u64,
        backtrace: snafu::Backtrace,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A tracked byte source with a transfer syntax stack, pushback support
/// and an installed coding system.
///
/// The decoder starts out in Explicit VR Little Endian, the syntax of
/// the File Meta Information group; the data set body pushes its own
/// frame on top once the Transfer Syntax UID is known.
#[derive(Debug)]
pub struct StatefulDecoder<S> {
    source: S,
    basic: BasicDecoder,
    vr_mode: VrMode,
    syntax_stack: Vec<(Endianness, VrMode)>,
    pushback: VecDeque<u8>,
    position: u64,
    charset: Option<CodingSystem>,
}

impl<S> StatefulDecoder<S> {
    /// Create a new stateful decoder over the given source,
    /// in Explicit VR Little Endian.
    pub fn new(source: S) -> Self {
        StatefulDecoder {
            source,
            basic: BasicDecoder::new(Endianness::Little),
            vr_mode: VrMode::Explicit,
            syntax_stack: Vec::new(),
            pushback: VecDeque::new(),
            position: 0,
            charset: None,
        }
    }

    /// Enter a new transfer syntax frame. The previous frame is kept on
    /// the stack and restored by `pop_syntax`.
    pub fn push_syntax(&mut self, endianness: Endianness, vr_mode: VrMode) {
        self.syntax_stack.push((self.basic.endianness(), self.vr_mode));
        self.basic = BasicDecoder::new(endianness);
        self.vr_mode = vr_mode;
    }

    /// Leave the current transfer syntax frame.
    pub fn pop_syntax(&mut self) {
        if let Some((endianness, vr_mode)) = self.syntax_stack.pop() {
            self.basic = BasicDecoder::new(endianness);
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

    /// The number of bytes consumed so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// The installed coding system, if any Specific Character Set
    /// element has been seen.
    pub fn coding_system(&self) -> Option<&CodingSystem> {
        self.charset.as_ref()
    }

    /// Install the coding system for subsequent text decoding.
    pub fn set_coding_system(&mut self, charset: CodingSystem) {
        self.charset = Some(charset);
    }

    /// Return bytes to the stream, to be consumed before anything else.
    /// The position moves back accordingly.
    pub fn unread(&mut self, bytes: &[u8]) {
        for &b in bytes.iter().rev() {
            self.pushback.push_front(b);
        }
        self.position = self.position.saturating_sub(bytes.len() as u64);
    }
}

impl<S: Read> Read for StatefulDecoder<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if !self.pushback.is_empty() {
            let mut n = 0;
            while n < buf.len() {
                match self.pushback.pop_front() {
                    Some(b) => {
                        buf[n] = b;
                        n += 1;
                    }
                    None => break,
                }
            }
            self.position += n as u64;
            return Ok(n);
        }
        let n = self.source.read(buf)?;
        self.position += n as u64;
        Ok(n)
    }
}

impl<S: Read> StatefulDecoder<S> {
    /// Check whether the source is exhausted, without consuming data.
    pub fn eof(&mut self) -> Result<bool> {
        if !self.pushback.is_empty() {
            return Ok(false);
        }
        let mut probe = [0u8; 1];
        loop {
            match self.source.read(&mut probe) {
                Ok(0) => return Ok(true),
                Ok(_) => {
                    self.pushback.push_back(probe[0]);
                    return Ok(false);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(e).context(ProbeSourceSnafu {
                        position: self.position,
                    })
                }
            }
        }
    }

    /// Decode the header of the next data element under the current
    /// transfer syntax frame.
    ///
    /// Elements of the item-sequence group (FFFE) always use the 4-byte
    /// length form without a VR field; in implicit VR mode the VR is
    /// resolved through the data dictionary, defaulting to `UN`.
    pub fn decode_header(&mut self) -> Result<DataElementHeader> {
        let basic = self.basic;
        let position = self.position;
        let tag = basic
            .decode_tag(&mut *self)
            .context(ReadTagSnafu { position })?;

        if tag.group() == tags::ITEM_SEQ_GROUP || self.vr_mode == VrMode::Implicit {
            let len = basic
                .decode_ul(&mut *self)
                .context(ReadLengthSnafu { position })?;
            let vr = StandardDataDictionary
                .by_tag(tag)
                .map(|info| info.vr)
                .unwrap_or(VR::UN);
            return Ok(DataElementHeader::new(tag, vr, Length(len)));
        }

        let mut vr_bytes = [0u8; 2];
        self.read_exact(&mut vr_bytes)
            .context(ReadVrSnafu { position })?;
        let vr = VR::from_binary(vr_bytes).unwrap_or(VR::UN);

        let len = match vr {
            VR::NA
            | VR::OB
            | VR::OD
            | VR::OF
            | VR::OL
            | VR::OW
            | VR::SQ
            | VR::UC
            | VR::UN
            | VR::UR
            | VR::UT => {
                // 2 reserved bytes, then a 4-byte length
                let mut reserved = [0u8; 2];
                self.read_exact(&mut reserved)
                    .context(ReadLengthSnafu { position })?;
                basic
                    .decode_ul(&mut *self)
                    .context(ReadLengthSnafu { position })?
            }
            _ => u32::from(
                basic
                    .decode_us(&mut *self)
                    .context(ReadLengthSnafu { position })?,
            ),
        };

        Ok(DataElementHeader::new(tag, vr, Length(len)))
    }

    /// Decode the next header as an item, item delimiter or sequence
    /// delimiter. These always use the 4-byte length form.
    pub fn decode_item_header(&mut self) -> Result<SequenceItemHeader> {
        let basic = self.basic;
        let position = self.position;
        let tag = basic
            .decode_tag(&mut *self)
            .context(ReadTagSnafu { position })?;
        let len = basic
            .decode_ul(&mut *self)
            .context(ReadLengthSnafu { position })?;
        SequenceItemHeader::new(tag, Length(len)).context(BadSequenceHeaderSnafu { position })
    }

    /// Read the given number of bytes into a new vector.
    pub fn read_to_vec(&mut self, length: u32) -> Result<Vec<u8>> {
        let position = self.position;
        let mut data = vec![0u8; length as usize];
        self.read_exact(&mut data)
            .context(ReadValueDataSnafu { position })?;
        Ok(data)
    }

    /// Read up to the given number of bytes, stopping early at the end
    /// of the source.
    pub fn read_up_to(&mut self, length: usize) -> Result<Vec<u8>> {
        let position = self.position;
        let mut data = Vec::with_capacity(length);
        (&mut *self)
            .take(length as u64)
            .read_to_end(&mut data)
            .context(ReadValueDataSnafu { position })?;
        Ok(data)
    }

    /// Read the given number of bytes as unsigned 32-bit integers under
    /// the current byte order.
    pub fn read_u32_to_vec(&mut self, length: u32) -> Result<Vec<u32>> {
        let basic = self.basic;
        let position = self.position;
        let mut out = vec![0u32; (length / 4) as usize];
        basic
            .decode_ul_into(&mut *self, &mut out)
            .context(ReadValueDataSnafu { position })?;
        self.skip_bytes(length % 4)?;
        Ok(out)
    }

    /// Skip the given number of bytes, counting them as read.
    pub fn skip_bytes(&mut self, length: u32) -> Result<()> {
        let position = self.position;
        let mut buf = [0u8; 4096];
        let mut remaining = length as usize;
        while remaining > 0 {
            let chunk = remaining.min(buf.len());
            self.read_exact(&mut buf[..chunk])
                .context(ReadValueDataSnafu { position })?;
            remaining -= chunk;
        }
        Ok(())
    }

    /// Read the value of a primitive data element, dispatching on its
    /// VR. Sequence VRs are rejected; pixel data elements are handled
    /// upstream and never reach this method.
    pub fn read_value(&mut self, header: &DataElementHeader) -> Result<ValueList> {
        let position = self.position;
        let len = header.len.get().context(UndefinedValueLengthSnafu {
            tag: header.tag,
            position,
        })?;
        let basic = self.basic;
        match header.vr {
            VR::SQ | VR::NA => NonPrimitiveTypeSnafu {
                vr: header.vr,
                position,
            }
            .fail(),
            VR::US => {
                let mut values = ValueList::new();
                for _ in 0..len / 2 {
                    let v = basic
                        .decode_us(&mut *self)
                        .context(ReadValueDataSnafu { position })?;
                    values.push(Value::U16(v));
                }
                self.skip_bytes(len % 2)?;
                Ok(values)
            }
            VR::SS => {
                let mut values = ValueList::new();
                for _ in 0..len / 2 {
                    let v = basic
                        .decode_ss(&mut *self)
                        .context(ReadValueDataSnafu { position })?;
                    values.push(Value::I16(v));
                }
                self.skip_bytes(len % 2)?;
                Ok(values)
            }
            VR::UL => {
                let mut values = ValueList::new();
                for _ in 0..len / 4 {
                    let v = basic
                        .decode_ul(&mut *self)
                        .context(ReadValueDataSnafu { position })?;
                    values.push(Value::U32(v));
                }
                self.skip_bytes(len % 4)?;
                Ok(values)
            }
            VR::SL => {
                let mut values = ValueList::new();
                for _ in 0..len / 4 {
                    let v = basic
                        .decode_sl(&mut *self)
                        .context(ReadValueDataSnafu { position })?;
                    values.push(Value::I32(v));
                }
                self.skip_bytes(len % 4)?;
                Ok(values)
            }
            VR::FL | VR::OF => {
                let mut values = ValueList::new();
                for _ in 0..len / 4 {
                    let v = basic
                        .decode_fl(&mut *self)
                        .context(ReadValueDataSnafu { position })?;
                    values.push(Value::F32(v));
                }
                self.skip_bytes(len % 4)?;
                Ok(values)
            }
            VR::FD | VR::OD => {
                let mut values = ValueList::new();
                for _ in 0..len / 8 {
                    let v = basic
                        .decode_fd(&mut *self)
                        .context(ReadValueDataSnafu { position })?;
                    values.push(Value::F64(v));
                }
                self.skip_bytes(len % 8)?;
                Ok(values)
            }
            VR::AT => {
                let mut values = ValueList::new();
                for _ in 0..len / 4 {
                    let v = basic
                        .decode_tag(&mut *self)
                        .context(ReadValueDataSnafu { position })?;
                    values.push(Value::Tag(v));
                }
                self.skip_bytes(len % 4)?;
                Ok(values)
            }
            VR::OB | VR::OL | VR::UN => Ok(smallvec![Value::Bytes(self.read_to_vec(len)?)]),
            VR::OW => {
                let mut data = self.read_to_vec(len)?;
                if basic.endianness() == Endianness::Big {
                    for pair in data.chunks_exact_mut(2) {
                        pair.swap(0, 1);
                    }
                }
                Ok(smallvec![Value::Bytes(data)])
            }
            VR::UI => {
                let data = self.read_to_vec(len)?;
                let charset = self.charset.unwrap_or_default();
                let text = charset.decode(&data, header.vr);
                Ok(text
                    .trim_end_matches('\0')
                    .split('\\')
                    .map(|s| Value::Text(s.to_owned()))
                    .collect())
            }
            _ => {
                let data = self.read_to_vec(len)?;
                let charset = self.charset.unwrap_or_default();
                let text = charset.decode(&data, header.vr);
                Ok(text
                    .trim_end_matches(' ')
                    .split('\\')
                    .map(|s| Value::Text(s.to_owned()))
                    .collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // manually crafted DICOM data elements in Explicit VR Little Endian:
    //  (0002,0002) UI, length 26, "1.2.840.10008.5.1.4.1.1.1\0"
    //  (0002,0010) UI, length 20, "1.2.840.10008.1.2.1\0"
    const RAW_LE: &[u8; 62] = &[
        0x02, 0x00, 0x02, 0x00, 0x55, 0x49, 0x1a, 0x00, 0x31, 0x2e, 0x32, 0x2e, 0x38, 0x34, 0x30,
        0x2e, 0x31, 0x30, 0x30, 0x30, 0x38, 0x2e, 0x35, 0x2e, 0x31, 0x2e, 0x34, 0x2e, 0x31, 0x2e,
        0x31, 0x2e, 0x31, 0x00, 0x02, 0x00, 0x10, 0x00, 0x55, 0x49, 0x14, 0x00, 0x31, 0x2e, 0x32,
        0x2e, 0x38, 0x34, 0x30, 0x2e, 0x31, 0x30, 0x30, 0x30, 0x38, 0x2e, 0x31, 0x2e, 0x32, 0x2e,
        0x31, 0x00,
    ];

    #[test]
    fn decode_explicit_vr_le() {
        let mut decoder = StatefulDecoder::new(&RAW_LE[..]);

        let header = decoder.decode_header().expect("should find an element");
        assert_eq!(header.tag, Tag(0x0002, 0x0002));
        assert_eq!(header.vr, VR::UI);
        assert_eq!(header.len, Length(26));
        assert_eq!(decoder.position(), 8);
        let value = decoder.read_value(&header).expect("value should read");
        assert_eq!(
            value.as_slice(),
            &[Value::Text("1.2.840.10008.5.1.4.1.1.1".to_owned())]
        );
        assert_eq!(decoder.position(), 34);

        let header = decoder.decode_header().expect("should find an element");
        assert_eq!(header.tag, Tag(0x0002, 0x0010));
        assert_eq!(header.len, Length(20));
        let value = decoder.read_value(&header).expect("value should read");
        assert_eq!(
            value.as_slice(),
            &[Value::Text("1.2.840.10008.1.2.1".to_owned())]
        );
        assert!(decoder.eof().unwrap());
    }

    // (0008,103F) SQ with undefined length, followed by an item with
    // undefined length, an item delimiter and a sequence delimiter
    const RAW_SEQUENCE_ITEMS: &[u8] = &[
        0x08, 0x00, 0x3F, 0x10, b'S', b'Q', 0x00, 0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE, 0xFF, 0x00,
        0xE0, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE, 0xFF, 0x0D, 0xE0, 0x00, 0x00, 0x00, 0x00, 0xFE, 0xFF,
        0xDD, 0xE0, 0x00, 0x00, 0x00, 0x00,
    ];

    #[test]
    fn decode_items() {
        let mut decoder = StatefulDecoder::new(RAW_SEQUENCE_ITEMS);

        let header = decoder.decode_header().expect("should find an element");
        assert_eq!(header.tag, Tag(0x0008, 0x103F));
        assert_eq!(header.vr, VR::SQ);
        assert!(header.len.is_undefined());
        assert_eq!(decoder.position(), 12);

        let item = decoder.decode_item_header().expect("should find an item");
        assert_eq!(item, SequenceItemHeader::Item(Length::UNDEFINED));
        let item = decoder.decode_item_header().expect("should find an item");
        assert_eq!(item, SequenceItemHeader::ItemDelimiter);
        let item = decoder.decode_item_header().expect("should find an item");
        assert_eq!(item, SequenceItemHeader::SequenceDelimiter);
        assert_eq!(decoder.position(), 36);
    }

    #[test]
    fn decode_implicit_vr() {
        // (0010,0010), length 8, "Doe^John"
        let raw: &[u8] = &[
            0x10, 0x00, 0x10, 0x00, 0x08, 0x00, 0x00, 0x00, b'D', b'o', b'e', b'^', b'J', b'o',
            b'h', b'n',
        ];
        let mut decoder = StatefulDecoder::new(raw);
        decoder.push_syntax(Endianness::Little, VrMode::Implicit);
        let header = decoder.decode_header().unwrap();
        assert_eq!(header.tag, Tag(0x0010, 0x0010));
        // VR resolved from the dictionary
        assert_eq!(header.vr, VR::PN);
        assert_eq!(header.len, Length(8));
        let value = decoder.read_value(&header).unwrap();
        assert_eq!(value.as_slice(), &[Value::Text("Doe^John".to_owned())]);
    }

    #[test]
    fn decode_explicit_vr_be() {
        // (0028,0010) US, length 2, value 512
        let raw: &[u8] = &[0x00, 0x28, 0x00, 0x10, b'U', b'S', 0x00, 0x02, 0x02, 0x00];
        let mut decoder = StatefulDecoder::new(raw);
        decoder.push_syntax(Endianness::Big, VrMode::Explicit);
        let header = decoder.decode_header().unwrap();
        assert_eq!(header.tag, Tag(0x0028, 0x0010));
        assert_eq!(header.vr, VR::US);
        assert_eq!(header.len, Length(2));
        let value = decoder.read_value(&header).unwrap();
        assert_eq!(value.as_slice(), &[Value::U16(512)]);
        decoder.pop_syntax();
        assert_eq!(decoder.endianness(), Endianness::Little);
    }

    #[test]
    fn unread_rewinds_the_stream() {
        let mut decoder = StatefulDecoder::new(&b"abcdef"[..]);
        let head = decoder.read_to_vec(4).unwrap();
        assert_eq!(decoder.position(), 4);
        decoder.unread(&head[2..]);
        assert_eq!(decoder.position(), 2);
        let rest = decoder.read_to_vec(4).unwrap();
        assert_eq!(rest, b"cdef");
        assert!(decoder.eof().unwrap());
    }

    #[test]
    fn multi_valued_text_splits_on_backslash() {
        // (0010,0020) LO, length 8, "ID\\12345" padded
        let raw: &[u8] = &[
            0x10, 0x00, 0x20, 0x00, b'L', b'O', 0x08, 0x00, b'I', b'D', b'\\', b'1', b'2', b'3',
            b'4', b'5',
        ];
        let mut decoder = StatefulDecoder::new(raw);
        let header = decoder.decode_header().unwrap();
        let value = decoder.read_value(&header).unwrap();
        assert_eq!(
            value.as_slice(),
            &[
                Value::Text("ID".to_owned()),
                Value::Text("12345".to_owned())
            ]
        );
    }
}
