//! The data set writer: serializes elements under the declared transfer
//! syntax, measuring value lengths through detached sub-encoders before
//! emitting headers, and verifying VRs against the data dictionary.

use crate::dataset::WriteOptions;
use crate::meta;
use crate::stateful::encode::StatefulEncoder;
use dcmio_core::dictionary::{DataDictionary, StandardDataDictionary};
use dcmio_core::{tags, CastValueError, DataSet, Element, Length, Tag, Value, VR};
use dcmio_encoding::transfer_syntax;
use dcmio_encoding::VrMode;
use snafu::{ensure, OptionExt, ResultExt, Snafu};
use std::io::{self, Write};
use tracing::warn;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("Could not write to the output"))]
    WriteData {
        source: io::Error,
        backtrace: snafu::Backtrace,
    },

    #[snafu(display("Missing required element {}", name))]
    MissingRequired {
        name: &'static str,
        backtrace: snafu::Backtrace,
    },

    #[snafu(display("Invalid transfer syntax value"))]
    ReadTransferSyntax {
        source: CastValueError,
        backtrace: snafu::Backtrace,
    },

    #[snafu(display("Could not resolve the transfer syntax"))]
    ResolveTransferSyntax {
        #[snafu(backtrace)]
        source: transfer_syntax::Error,
    },

    #[snafu(display(
        "VR mismatch for {}: element VR is {} but the dictionary defines {}",
        tag,
        supplied,
        standard
    ))]
    VrMismatch {
        tag: Tag,
        supplied: VR,
        standard: VR,
        backtrace: snafu::Backtrace,
    },

    #[snafu(display("Element {} with VR {} cannot hold a {} value", tag, vr, got))]
    ValueTypeMismatch {
        tag: Tag,
        vr: VR,
        got: &'static str,
        backtrace: snafu::Backtrace,
    },

    #[snafu(display("Sequence value of {} must be an item element", tag))]
    MalformedSequence {
        tag: Tag,
        backtrace: snafu::Backtrace,
    },

    #[snafu(display("Native pixel data of {} must hold exactly one frame", tag))]
    InvalidPixelData {
        tag: Tag,
        backtrace: snafu::Backtrace,
    },

    #[snafu(display(
        "Undefined-length encoding of {} with VR {} is not supported",
        tag,
        vr
    ))]
    UnsupportedUndefinedLength {
        tag: Tag,
        vr: VR,
        backtrace: snafu::Backtrace,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A non-fatal occurrence collected while writing a data set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteWarning {
    /// The element's VR disagrees with the dictionary, but both are of
    /// the same kind; the element's VR was kept.
    VrDiffers {
        /// The affected element.
        tag: Tag,
        /// The VR carried by the element.
        supplied: VR,
        /// The VR defined by the dictionary.
        standard: VR,
    },
    /// An undefined-length UN element was omitted from the output.
    DroppedUndefinedLengthUn {
        /// The omitted element.
        tag: Tag,
    },
}

/// Serialize a whole data set in DICOM file format: preamble, magic
/// code, file meta group, then every non-meta element of an even group
/// under the data set's declared transfer syntax. Private (odd group)
/// elements are skipped.
///
/// Returns the warnings collected along the way.
pub fn write_data_set<W: Write>(
    dest: W,
    ds: &DataSet,
    options: &WriteOptions,
) -> Result<Vec<WriteWarning>> {
    let mut encoder = StatefulEncoder::new(dest);
    let mut warnings = Vec::new();

    let meta_elems: Vec<&Element> = ds.elements.iter().filter(|e| e.tag.is_meta()).collect();
    meta::write_file_header(&mut encoder, &meta_elems, options, &mut warnings)?;

    let ts_elem = ds
        .find_by_tag(tags::TRANSFER_SYNTAX_UID)
        .context(MissingRequiredSnafu {
            name: "TransferSyntaxUID",
        })?;
    let uid = ts_elem.string().context(ReadTransferSyntaxSnafu)?;
    let (endianness, vr_mode) =
        transfer_syntax::decoding_parameters(uid).context(ResolveTransferSyntaxSnafu)?;

    encoder.push_syntax(endianness, vr_mode);
    let mut result = Ok(());
    for elem in &ds.elements {
        if elem.tag.is_meta() || elem.tag.is_private() {
            continue;
        }
        result = write_element(&mut encoder, elem, options, &mut warnings);
        if result.is_err() {
            break;
        }
    }
    encoder.pop_syntax();
    result.map(|_| warnings)
}

/// Serialize one data element, including its header.
pub fn write_element<W: Write>(
    encoder: &mut StatefulEncoder<W>,
    elem: &Element,
    options: &WriteOptions,
    warnings: &mut Vec<WriteWarning>,
) -> Result<()> {
    let vr = effective_vr(elem, options, warnings)?;
    if elem.tag == tags::PIXEL_DATA {
        return write_pixel_data(encoder, elem, vr);
    }
    match vr {
        VR::SQ => write_sequence(encoder, elem, vr, options, warnings),
        VR::NA => write_item(encoder, elem, options, warnings),
        VR::UN if elem.undefined_length => {
            warn!(tag = %elem.tag, "dropping undefined-length UN element from the output");
            warnings.push(WriteWarning::DroppedUndefinedLengthUn { tag: elem.tag });
            Ok(())
        }
        _ if elem.undefined_length => UnsupportedUndefinedLengthSnafu { tag: elem.tag, vr }.fail(),
        _ => write_primitive(encoder, elem, vr),
    }
}

/// Resolve the VR to write the element under, verifying it against the
/// data dictionary unless verification is disabled.
fn effective_vr(
    elem: &Element,
    options: &WriteOptions,
    warnings: &mut Vec<WriteWarning>,
) -> Result<VR> {
    if options.skip_vr_verification {
        return Ok(elem.vr);
    }
    match StandardDataDictionary.by_tag(elem.tag) {
        None => Ok(elem.vr),
        Some(info) if info.vr == elem.vr => Ok(elem.vr),
        Some(info) => {
            ensure!(
                info.vr.kind() == elem.vr.kind(),
                VrMismatchSnafu {
                    tag: elem.tag,
                    supplied: elem.vr,
                    standard: info.vr,
                }
            );
            warn!(
                tag = %elem.tag, supplied = %elem.vr, standard = %info.vr,
                "element VR differs from the dictionary, keeping the element's VR"
            );
            warnings.push(WriteWarning::VrDiffers {
                tag: elem.tag,
                supplied: elem.vr,
                standard: info.vr,
            });
            Ok(elem.vr)
        }
    }
}

/// Emit an element header under the current frame. Item-sequence group
/// tags always use the implicit (4-byte length) form.
pub(crate) fn encode_element_header<W: Write>(
    encoder: &mut StatefulEncoder<W>,
    tag: Tag,
    vr: VR,
    len: Length,
) -> Result<()> {
    debug_assert!(
        len.is_undefined() || len.0 % 2 == 0,
        "odd element value length {}",
        len
    );
    encoder.write_tag(tag).context(WriteDataSnafu)?;
    if encoder.vr_mode() == VrMode::Explicit && tag.group() != tags::ITEM_SEQ_GROUP {
        encoder.write_bytes(&vr.to_bytes()).context(WriteDataSnafu)?;
        match vr {
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
                encoder.write_zeros(2).context(WriteDataSnafu)?;
                encoder.write_ul(len.0).context(WriteDataSnafu)?;
            }
            _ => encoder.write_us(len.0 as u16).context(WriteDataSnafu)?,
        }
    } else {
        encoder.write_ul(len.0).context(WriteDataSnafu)?;
    }
    Ok(())
}

fn write_sequence<W: Write>(
    encoder: &mut StatefulEncoder<W>,
    elem: &Element,
    vr: VR,
    options: &WriteOptions,
    warnings: &mut Vec<WriteWarning>,
) -> Result<()> {
    if elem.undefined_length {
        encode_element_header(encoder, elem.tag, vr, Length::UNDEFINED)?;
        for value in &elem.value {
            let item = sequence_item(elem.tag, value)?;
            write_element(encoder, item, options, warnings)?;
        }
        encode_element_header(encoder, tags::SEQUENCE_DELIMITATION_ITEM, VR::NA, Length(0))
    } else {
        let mut sub = encoder.sub_encoder();
        for value in &elem.value {
            let item = sequence_item(elem.tag, value)?;
            write_element(&mut sub, item, options, warnings)?;
        }
        let bytes = sub.into_bytes();
        encode_element_header(encoder, elem.tag, vr, Length(bytes.len() as u32))?;
        encoder.write_bytes(&bytes).context(WriteDataSnafu)
    }
}

/// Every direct child of a sequence must be an item element.
fn sequence_item<'v>(tag: Tag, value: &'v Value) -> Result<&'v Element> {
    let item = value.as_item().context(MalformedSequenceSnafu { tag })?;
    ensure!(item.tag == tags::ITEM, MalformedSequenceSnafu { tag });
    Ok(item)
}

fn write_item<W: Write>(
    encoder: &mut StatefulEncoder<W>,
    elem: &Element,
    options: &WriteOptions,
    warnings: &mut Vec<WriteWarning>,
) -> Result<()> {
    if elem.undefined_length {
        encode_element_header(encoder, elem.tag, VR::NA, Length::UNDEFINED)?;
        for value in &elem.value {
            let child = value
                .as_item()
                .context(MalformedSequenceSnafu { tag: elem.tag })?;
            write_element(encoder, child, options, warnings)?;
        }
        encode_element_header(encoder, tags::ITEM_DELIMITATION_ITEM, VR::NA, Length(0))
    } else {
        let mut sub = encoder.sub_encoder();
        for value in &elem.value {
            let child = value
                .as_item()
                .context(MalformedSequenceSnafu { tag: elem.tag })?;
            write_element(&mut sub, child, options, warnings)?;
        }
        let bytes = sub.into_bytes();
        encode_element_header(encoder, elem.tag, VR::NA, Length(bytes.len() as u32))?;
        encoder.write_bytes(&bytes).context(WriteDataSnafu)
    }
}

fn write_pixel_data<W: Write>(
    encoder: &mut StatefulEncoder<W>,
    elem: &Element,
    vr: VR,
) -> Result<()> {
    let pixels = match elem.value.as_slice() {
        [Value::Pixels(pixels)] => pixels,
        _ => {
            return ValueTypeMismatchSnafu {
                tag: elem.tag,
                vr,
                got: "non-Pixels",
            }
            .fail()
        }
    };
    if elem.undefined_length {
        encode_element_header(encoder, elem.tag, vr, Length::UNDEFINED)?;
        // the Basic Offset Table comes first, then one item per frame
        let mut sub = encoder.sub_encoder();
        for &offset in &pixels.offsets {
            sub.write_ul(offset).context(WriteDataSnafu)?;
        }
        write_raw_item(encoder, &sub.into_bytes())?;
        for frame in &pixels.frames {
            write_raw_item(encoder, frame)?;
        }
        encode_element_header(encoder, tags::SEQUENCE_DELIMITATION_ITEM, VR::NA, Length(0))
    } else {
        ensure!(
            pixels.frames.len() == 1,
            InvalidPixelDataSnafu { tag: elem.tag }
        );
        write_payload(encoder, elem.tag, vr, &pixels.frames[0], 0)
    }
}

fn write_raw_item<W: Write>(encoder: &mut StatefulEncoder<W>, data: &[u8]) -> Result<()> {
    write_payload(encoder, tags::ITEM, VR::NA, data, 0)
}

/// Emit a header and payload, padding odd payloads with the given byte.
fn write_payload<W: Write>(
    encoder: &mut StatefulEncoder<W>,
    tag: Tag,
    vr: VR,
    data: &[u8],
    pad: u8,
) -> Result<()> {
    let padding = data.len() % 2;
    encode_element_header(encoder, tag, vr, Length((data.len() + padding) as u32))?;
    encoder.write_bytes(data).context(WriteDataSnafu)?;
    if padding == 1 {
        encoder.write_bytes(&[pad]).context(WriteDataSnafu)?;
    }
    Ok(())
}

fn write_primitive<W: Write>(
    encoder: &mut StatefulEncoder<W>,
    elem: &Element,
    vr: VR,
) -> Result<()> {
    let mismatch = |value: &Value| {
        ValueTypeMismatchSnafu {
            tag: elem.tag,
            vr,
            got: value.type_name(),
        }
        .build()
    };
    let mut sub = encoder.sub_encoder();
    match vr {
        VR::US => {
            for value in &elem.value {
                match value {
                    Value::U16(v) => sub.write_us(*v).context(WriteDataSnafu)?,
                    other => return Err(mismatch(other)),
                }
            }
        }
        VR::UL => {
            for value in &elem.value {
                match value {
                    Value::U32(v) => sub.write_ul(*v).context(WriteDataSnafu)?,
                    other => return Err(mismatch(other)),
                }
            }
        }
        VR::SS => {
            for value in &elem.value {
                match value {
                    Value::I16(v) => sub.write_ss(*v).context(WriteDataSnafu)?,
                    other => return Err(mismatch(other)),
                }
            }
        }
        VR::SL => {
            for value in &elem.value {
                match value {
                    Value::I32(v) => sub.write_sl(*v).context(WriteDataSnafu)?,
                    other => return Err(mismatch(other)),
                }
            }
        }
        VR::FL | VR::OF => {
            for value in &elem.value {
                match value {
                    Value::F32(v) => sub.write_fl(*v).context(WriteDataSnafu)?,
                    other => return Err(mismatch(other)),
                }
            }
        }
        VR::FD | VR::OD => {
            for value in &elem.value {
                match value {
                    Value::F64(v) => sub.write_fd(*v).context(WriteDataSnafu)?,
                    other => return Err(mismatch(other)),
                }
            }
        }
        VR::AT => {
            for value in &elem.value {
                match value {
                    Value::Tag(t) => sub.write_tag(*t).context(WriteDataSnafu)?,
                    other => return Err(mismatch(other)),
                }
            }
        }
        VR::OB | VR::OL | VR::UN => match elem.value.as_slice() {
            [Value::Bytes(bytes)] => sub.write_bytes(bytes).context(WriteDataSnafu)?,
            [other] => return Err(mismatch(other)),
            _ => {
                return ValueTypeMismatchSnafu {
                    tag: elem.tag,
                    vr,
                    got: "multiple values",
                }
                .fail()
            }
        },
        VR::OW => match elem.value.as_slice() {
            [Value::Bytes(bytes)] => {
                ensure!(
                    bytes.len() % 2 == 0,
                    ValueTypeMismatchSnafu {
                        tag: elem.tag,
                        vr,
                        got: "odd-length Bytes",
                    }
                );
                // words are re-ordered under the current byte order
                for pair in bytes.chunks_exact(2) {
                    sub.write_us(u16::from_le_bytes([pair[0], pair[1]]))
                        .context(WriteDataSnafu)?;
                }
            }
            [other] => return Err(mismatch(other)),
            _ => {
                return ValueTypeMismatchSnafu {
                    tag: elem.tag,
                    vr,
                    got: "multiple values",
                }
                .fail()
            }
        },
        _ => {
            // text: join the values with backslashes
            let mut joined = String::new();
            for (i, value) in elem.value.iter().enumerate() {
                let s = value.as_text().ok_or_else(|| mismatch(value))?;
                if i > 0 {
                    joined.push('\\');
                }
                joined.push_str(s);
            }
            sub.write_bytes(joined.as_bytes()).context(WriteDataSnafu)?;
        }
    }
    let bytes = sub.into_bytes();
    write_payload(encoder, elem.tag, vr, &bytes, pad_byte(vr))
}

/// The padding byte for odd-length payloads: NUL for UIDs and binary
/// payloads, space for other text.
fn pad_byte(vr: VR) -> u8 {
    match vr {
        VR::UI | VR::OB | VR::UN => 0,
        _ => b' ',
    }
}
