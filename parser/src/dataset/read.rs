//! The data set reader: drives the stateful decoder element by element,
//! recursing through sequences and pixel data, and applies the
//! post-read normalizations (character set installation, Cyrillic
//! auto-detection, DS splitting, non-printable filtering and the
//! whitelist/stop-tag options).

use crate::dataset::ReadOptions;
use crate::meta;
use crate::stateful::decode::{self, StatefulDecoder};
use dcmio_core::{
    tags, CastValueError, DataElementHeader, DataSet, Element, Length, PixelData,
    SequenceItemHeader, Tag, Value, ValueList, VR,
};
use dcmio_encoding::text;
use dcmio_encoding::transfer_syntax;
use smallvec::smallvec;
use snafu::{ensure, ResultExt, Snafu};
use std::io::Read;
use tracing::{debug, warn};

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("Could not read the file meta group"))]
    ReadFileHeader {
        #[snafu(backtrace)]
        source: meta::Error,
    },

    #[snafu(display("Missing required element {}", name))]
    MissingRequired {
        name: &'static str,
        backtrace: snafu::Backtrace,
    },

    #[snafu(display("Could not resolve the transfer syntax"))]
    ResolveTransferSyntax {
        #[snafu(backtrace)]
        source: transfer_syntax::Error,
    },

    #[snafu(display("Could not decode data element"))]
    DecodeElement {
        #[snafu(backtrace)]
        source: decode::Error,
    },

    #[snafu(display("Unexpected tag {} inside sequence at position {}", tag, position))]
    MalformedSequence {
        tag: Tag,
        position: u64,
        backtrace: snafu::Backtrace,
    },

    #[snafu(display(
        "Unsupported undefined-length element {} at position {}",
        tag,
        position
    ))]
    UndefinedLength {
        tag: Tag,
        position: u64,
        backtrace: snafu::Backtrace,
    },

    #[snafu(display("Could not read character set names"))]
    ReadCharsetNames {
        source: CastValueError,
        backtrace: snafu::Backtrace,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The outcome of reading one element.
enum ElementRead {
    /// A complete element.
    Element(Element),
    /// The element was consumed but is not part of the output.
    Dropped,
    /// Parsing ends here (dropped pixel data).
    EndOfData,
}

/// Read a whole data set from the given source.
///
/// On parse error the returned data set holds every element decoded up
/// to the failure, and the error describes where parsing first failed.
pub fn read_data_set<R: Read>(source: R, options: ReadOptions) -> (DataSet, Option<Error>) {
    DataSetReader::new(source, options).read_data_set()
}

/// A reader which orchestrates the decoding of one data set:
/// file header, transfer syntax switch, then the element loop.
#[derive(Debug)]
pub struct DataSetReader<S> {
    decoder: StatefulDecoder<S>,
    options: ReadOptions,
}

impl<S: Read> DataSetReader<S> {
    /// Create a new data set reader over the given source.
    pub fn new(source: S, options: ReadOptions) -> Self {
        DataSetReader {
            decoder: StatefulDecoder::new(source),
            options,
        }
    }

    /// Read the file header and every data set element.
    ///
    /// The data set is returned even when an error interrupts parsing,
    /// together with the first error found.
    pub fn read_data_set(&mut self) -> (DataSet, Option<Error>) {
        let mut ds = DataSet::new();

        let meta = match meta::read_file_header(&mut self.decoder).context(ReadFileHeaderSnafu) {
            Ok(meta) => meta,
            Err(e) => return (ds, Some(e)),
        };
        ds.elements.extend(meta);

        let uid = match ds.find_by_tag(tags::TRANSFER_SYNTAX_UID) {
            Some(elem) => match elem.string() {
                Ok(s) => text::filter_non_printable(s),
                Err(_) => {
                    return (
                        ds,
                        Some(
                            MissingRequiredSnafu {
                                name: "TransferSyntaxUID",
                            }
                            .build(),
                        ),
                    )
                }
            },
            None => {
                return (
                    ds,
                    Some(
                        MissingRequiredSnafu {
                            name: "TransferSyntaxUID",
                        }
                        .build(),
                    ),
                )
            }
        };
        let (endianness, vr_mode) = match transfer_syntax::decoding_parameters(&uid)
            .context(ResolveTransferSyntaxSnafu)
        {
            Ok(params) => params,
            Err(e) => return (ds, Some(e)),
        };
        debug!(uid = uid.as_str(), ?endianness, ?vr_mode, "decoding data set body");

        self.decoder.push_syntax(endianness, vr_mode);
        let error = self.read_body(&mut ds).err();
        self.decoder.pop_syntax();
        (ds, error)
    }

    fn read_body(&mut self, ds: &mut DataSet) -> Result<()> {
        loop {
            if self.decoder.eof().context(DecodeElementSnafu)? {
                break;
            }
            let start = self.decoder.position();
            let header = self.decoder.decode_header().context(DecodeElementSnafu)?;
            if let Some(stop) = self.options.stop_at_tag {
                if header.tag >= stop {
                    break;
                }
            }
            match self.read_element_body(header, true)? {
                ElementRead::Element(elem) => self.normalize_and_collect(elem, ds)?,
                ElementRead::Dropped => {}
                ElementRead::EndOfData => break,
            }
            // every element read must strictly advance the stream;
            // anything else is a codec bug
            assert!(
                self.decoder.position() > start,
                "data element read did not advance past position {}",
                start
            );
        }
        Ok(())
    }

    fn read_element_body(
        &mut self,
        header: DataElementHeader,
        top_level: bool,
    ) -> Result<ElementRead> {
        if header.tag == tags::PIXEL_DATA {
            return self.read_pixel_data(header, top_level);
        }
        match header.vr {
            VR::SQ => Ok(ElementRead::Element(self.read_sequence(header)?)),
            VR::NA => Ok(ElementRead::Element(
                self.read_item_body(header.tag, header.len)?,
            )),
            VR::UN if header.len.is_undefined() => {
                warn!(tag = %header.tag, "dropping undefined-length UN element");
                self.read_sequence(header)?;
                Ok(ElementRead::Dropped)
            }
            _ if header.len.is_undefined() => UndefinedLengthSnafu {
                tag: header.tag,
                position: self.decoder.position(),
            }
            .fail(),
            _ => {
                let value = self
                    .decoder
                    .read_value(&header)
                    .context(DecodeElementSnafu)?;
                Ok(ElementRead::Element(Element {
                    tag: header.tag,
                    vr: header.vr,
                    undefined_length: false,
                    value,
                }))
            }
        }
    }

    /// Read a sequence value: a list of items, either bounded by the
    /// declared length or terminated by a sequence delimiter.
    fn read_sequence(&mut self, header: DataElementHeader) -> Result<Element> {
        let mut value = ValueList::new();
        if let Some(len) = header.len.get() {
            let end = self.decoder.position() + u64::from(len);
            while self.decoder.position() < end {
                let item = self
                    .decoder
                    .decode_item_header()
                    .context(DecodeElementSnafu)?;
                match item {
                    SequenceItemHeader::Item(item_len) => {
                        let elem = self.read_item_body(tags::ITEM, item_len)?;
                        value.push(Value::Item(Box::new(elem)));
                    }
                    other => {
                        return MalformedSequenceSnafu {
                            tag: other.tag(),
                            position: self.decoder.position(),
                        }
                        .fail()
                    }
                }
            }
            ensure!(
                self.decoder.position() == end,
                MalformedSequenceSnafu {
                    tag: header.tag,
                    position: self.decoder.position(),
                }
            );
        } else {
            loop {
                let item = self
                    .decoder
                    .decode_item_header()
                    .context(DecodeElementSnafu)?;
                match item {
                    SequenceItemHeader::Item(item_len) => {
                        let elem = self.read_item_body(tags::ITEM, item_len)?;
                        value.push(Value::Item(Box::new(elem)));
                    }
                    SequenceItemHeader::SequenceDelimiter => break,
                    SequenceItemHeader::ItemDelimiter => {
                        return MalformedSequenceSnafu {
                            tag: tags::ITEM_DELIMITATION_ITEM,
                            position: self.decoder.position(),
                        }
                        .fail()
                    }
                }
            }
        }
        Ok(Element {
            tag: header.tag,
            vr: VR::SQ,
            undefined_length: header.len.is_undefined(),
            value,
        })
    }

    /// Read the contents of one item: a list of full elements, either
    /// bounded by the declared length or terminated by an item
    /// delimiter.
    fn read_item_body(&mut self, tag: Tag, item_len: Length) -> Result<Element> {
        let mut value = ValueList::new();
        if let Some(len) = item_len.get() {
            let end = self.decoder.position() + u64::from(len);
            while self.decoder.position() < end {
                let header = self.decoder.decode_header().context(DecodeElementSnafu)?;
                match self.read_element_body(header, false)? {
                    ElementRead::Element(elem) => value.push(Value::Item(Box::new(elem))),
                    ElementRead::Dropped | ElementRead::EndOfData => {}
                }
            }
            ensure!(
                self.decoder.position() == end,
                MalformedSequenceSnafu {
                    tag,
                    position: self.decoder.position(),
                }
            );
        } else {
            loop {
                let header = self.decoder.decode_header().context(DecodeElementSnafu)?;
                if header.tag == tags::ITEM_DELIMITATION_ITEM {
                    break;
                }
                match self.read_element_body(header, false)? {
                    ElementRead::Element(elem) => value.push(Value::Item(Box::new(elem))),
                    ElementRead::Dropped | ElementRead::EndOfData => {}
                }
            }
        }
        Ok(Element {
            tag,
            vr: VR::NA,
            undefined_length: item_len.is_undefined(),
            value,
        })
    }

    /// Read (or skip) a pixel data element, in native or encapsulated
    /// form.
    fn read_pixel_data(
        &mut self,
        header: DataElementHeader,
        top_level: bool,
    ) -> Result<ElementRead> {
        if self.options.drop_pixel_data {
            debug!(tag = %header.tag, "skipping pixel data");
            match header.len.get() {
                Some(len) => self.decoder.skip_bytes(len).context(DecodeElementSnafu)?,
                None => loop {
                    let item = self
                        .decoder
                        .decode_item_header()
                        .context(DecodeElementSnafu)?;
                    match item {
                        SequenceItemHeader::Item(item_len) => {
                            let len = self.require_defined(item_len)?;
                            self.decoder.skip_bytes(len).context(DecodeElementSnafu)?;
                        }
                        SequenceItemHeader::SequenceDelimiter => break,
                        SequenceItemHeader::ItemDelimiter => {
                            return MalformedSequenceSnafu {
                                tag: tags::ITEM_DELIMITATION_ITEM,
                                position: self.decoder.position(),
                            }
                            .fail()
                        }
                    }
                },
            }
            return Ok(if top_level {
                ElementRead::EndOfData
            } else {
                ElementRead::Dropped
            });
        }

        let pixels = match header.len.get() {
            Some(len) => {
                PixelData::native(self.decoder.read_to_vec(len).context(DecodeElementSnafu)?)
            }
            None => {
                // the first item is the Basic Offset Table
                let offsets = match self
                    .decoder
                    .decode_item_header()
                    .context(DecodeElementSnafu)?
                {
                    SequenceItemHeader::Item(item_len) => {
                        let len = self.require_defined(item_len)?;
                        self.decoder
                            .read_u32_to_vec(len)
                            .context(DecodeElementSnafu)?
                    }
                    other => {
                        return MalformedSequenceSnafu {
                            tag: other.tag(),
                            position: self.decoder.position(),
                        }
                        .fail()
                    }
                };
                let mut frames = Vec::new();
                loop {
                    let item = self
                        .decoder
                        .decode_item_header()
                        .context(DecodeElementSnafu)?;
                    match item {
                        SequenceItemHeader::Item(item_len) => {
                            let len = self.require_defined(item_len)?;
                            frames.push(
                                self.decoder.read_to_vec(len).context(DecodeElementSnafu)?,
                            );
                        }
                        SequenceItemHeader::SequenceDelimiter => break,
                        SequenceItemHeader::ItemDelimiter => {
                            return MalformedSequenceSnafu {
                                tag: tags::ITEM_DELIMITATION_ITEM,
                                position: self.decoder.position(),
                            }
                            .fail()
                        }
                    }
                }
                PixelData { offsets, frames }
            }
        };
        Ok(ElementRead::Element(Element {
            tag: header.tag,
            vr: header.vr,
            undefined_length: header.len.is_undefined(),
            value: smallvec![Value::Pixels(pixels)],
        }))
    }

    fn require_defined(&self, len: Length) -> Result<u32> {
        len.get().ok_or_else(|| {
            MalformedSequenceSnafu {
                tag: tags::ITEM,
                position: self.decoder.position(),
            }
            .build()
        })
    }

    /// Apply the post-read normalizations to a fully decoded top-level
    /// element and append it to the data set, honoring the whitelist.
    fn normalize_and_collect(&mut self, mut elem: Element, ds: &mut DataSet) -> Result<()> {
        // 1. the first Specific Character Set installs the registry
        if elem.tag == tags::SPECIFIC_CHARACTER_SET {
            let names: Vec<String> = elem
                .strings()
                .context(ReadCharsetNamesSnafu)?
                .into_iter()
                .map(text::filter_non_printable)
                .collect();
            let charset = text::parse_specific_character_set(&names, self.options.cp1250_fix);
            self.decoder.set_coding_system(charset);
        }

        // 2. Cyrillic auto-detection while no character set is declared
        if self.decoder.coding_system().is_none() {
            let replacement = match elem.value.first() {
                Some(Value::Text(first))
                    if !first.is_empty()
                        && text::contains_garbage(first, self.options.flag_high_bit_garbage) =>
                {
                    text::detect_cyrillic(
                        first,
                        self.options.default_cyrillic_encoding.as_deref(),
                    )
                }
                _ => None,
            };
            if let Some(decoded) = replacement {
                debug!(tag = %elem.tag, "re-decoded suspicious text as Cyrillic");
                elem.value = smallvec![Value::Text(decoded)];
            }
        }

        // 3. split decimal strings which still hold multiple values
        if elem.vr == VR::DS {
            split_multi_value_ds(&mut elem);
        }

        // 4.-5. non-printable filtering, then the whitelist
        let keep = self
            .options
            .return_tags
            .as_ref()
            .map_or(true, |set| set.contains(&elem.tag));
        if keep {
            for value in elem.value.iter_mut() {
                if let Value::Text(s) = value {
                    *s = text::filter_non_printable(s);
                }
            }
            ds.elements.push(elem);
        }
        Ok(())
    }
}

/// Split a single DS value containing backslashes into its trimmed
/// sub-values.
pub(crate) fn split_multi_value_ds(elem: &mut Element) {
    if elem.value.len() != 1 {
        return;
    }
    let parts: Option<Vec<String>> = match elem.value.first() {
        Some(Value::Text(s)) if s.contains('\\') => {
            Some(s.split('\\').map(|part| part.trim().to_owned()).collect())
        }
        _ => None,
    };
    if let Some(parts) = parts {
        elem.value = parts.into_iter().map(Value::Text).collect();
    }
}
