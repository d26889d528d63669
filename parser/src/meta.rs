//! Reading and writing of the DICOM file header: the 128-byte preamble,
//! the `DICM` magic code, and the File Meta Information group, which is
//! always encoded in Explicit VR Little Endian.

use crate::dataset::write::{
    self, write_element, MissingRequiredSnafu, WriteDataSnafu, WriteWarning,
};
use crate::dataset::WriteOptions;
use crate::stateful::decode::{self, StatefulDecoder};
use crate::stateful::encode::StatefulEncoder;
use dcmio_core::{tags, CastValueError, Element, Tag, Value, VR};
use dcmio_encoding::{Endianness, VrMode};
use smallvec::smallvec;
use snafu::{ensure, ResultExt, Snafu};
use std::collections::BTreeSet;
use std::io::{Read, Write};

const DICM_MAGIC_CODE: [u8; 4] = [b'D', b'I', b'C', b'M'];
const PREAMBLE_LENGTH: usize = 128;

/// The implementation class UID emitted in file headers by default.
/// Root allocated for this implementation.
pub const IMPLEMENTATION_CLASS_UID: &str = "1.2.826.0.1.3680043.10.594.1.1";
/// The implementation version name emitted in file headers by default.
pub const IMPLEMENTATION_VERSION_NAME: &str = "DCMIO_0_1";

/// An error raised while reading the file header.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("Could not read the file preamble"))]
    ReadPreamble {
        #[snafu(backtrace)]
        source: decode::Error,
    },

    #[snafu(display("Could not decode file meta element"))]
    DecodeMetaElement {
        #[snafu(backtrace)]
        source: decode::Error,
    },

    #[snafu(display("Unexpected file meta element {}", tag))]
    UnexpectedMetaTag {
        tag: Tag,
        backtrace: snafu::Backtrace,
    },

    #[snafu(display("Invalid file meta group length value"))]
    InvalidGroupLength {
        source: CastValueError,
        backtrace: snafu::Backtrace,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Read the file header: preamble, magic code and the meta group.
///
/// When the `DICM` magic code is not found after the preamble, the
/// stream is rewound and the meta group is parsed from byte 0, which
/// accepts files written without a preamble. The returned list starts
/// with the group length element, followed by the remaining group 0002
/// elements in file order.
pub fn read_file_header<S: Read>(decoder: &mut StatefulDecoder<S>) -> Result<Vec<Element>> {
    let head = decoder
        .read_up_to(PREAMBLE_LENGTH + DICM_MAGIC_CODE.len())
        .context(ReadPreambleSnafu)?;
    if head.len() >= PREAMBLE_LENGTH + 4 && head[PREAMBLE_LENGTH..PREAMBLE_LENGTH + 4] == DICM_MAGIC_CODE {
        // standard Part 10 header
    } else if head.len() >= 4 && head[0..4] == DICM_MAGIC_CODE {
        // magic code without a preamble
        decoder.unread(&head[4..]);
    } else {
        // no magic code at all: restart at byte 0 and attempt to
        // parse the meta group directly
        decoder.unread(&head);
    }

    let header = decoder.decode_header().context(DecodeMetaElementSnafu)?;
    ensure!(
        header.tag == tags::FILE_META_INFORMATION_GROUP_LENGTH,
        UnexpectedMetaTagSnafu { tag: header.tag }
    );
    let value = decoder.read_value(&header).context(DecodeMetaElementSnafu)?;
    let group_length_elem = Element {
        tag: header.tag,
        vr: header.vr,
        undefined_length: false,
        value,
    };
    let group_length = group_length_elem
        .uint32()
        .context(InvalidGroupLengthSnafu)?;

    let mut elements = vec![group_length_elem];
    let end = decoder.position() + u64::from(group_length);
    while decoder.position() < end {
        let header = decoder.decode_header().context(DecodeMetaElementSnafu)?;
        let value = decoder.read_value(&header).context(DecodeMetaElementSnafu)?;
        elements.push(Element {
            tag: header.tag,
            vr: header.vr,
            undefined_length: false,
            value,
        });
    }
    Ok(elements)
}

/// Write the file header: 128 zero bytes, the `DICM` magic code, the
/// File Meta Information Group Length with the measured group size, and
/// the meta group itself in Explicit VR Little Endian.
///
/// The required elements `MediaStorageSOPClassUID`,
/// `MediaStorageSOPInstanceUID` and `TransferSyntaxUID` must be present
/// in `meta`. `FileMetaInformationVersion`, `ImplementationClassUID`
/// and `ImplementationVersionName` get default values when absent; the
/// remaining group 0002 input elements are appended in input order,
/// de-duplicated by tag.
pub fn write_file_header<W: Write>(
    encoder: &mut StatefulEncoder<W>,
    meta: &[&Element],
    options: &WriteOptions,
    warnings: &mut Vec<WriteWarning>,
) -> Result<(), write::Error> {
    encoder.push_syntax(Endianness::Little, VrMode::Explicit);
    let result = write_file_header_impl(encoder, meta, options, warnings);
    encoder.pop_syntax();
    result
}

/// Write one of the designated meta elements into the group buffer:
/// the element from the input when present, the default otherwise.
/// A required element has no default and its absence is fatal.
fn write_designated_meta_elem(
    sub: &mut StatefulEncoder<Vec<u8>>,
    meta: &[&Element],
    used: &mut BTreeSet<Tag>,
    tag: Tag,
    name: &'static str,
    default: Option<Element>,
    options: &WriteOptions,
    warnings: &mut Vec<WriteWarning>,
) -> Result<(), write::Error> {
    used.insert(tag);
    if let Some(elem) = meta.iter().find(|e| e.tag == tag) {
        return write_element(sub, elem, options, warnings);
    }
    match default {
        Some(default) => write_element(sub, &default, options, warnings),
        None => MissingRequiredSnafu { name }.fail(),
    }
}

fn write_file_header_impl<W: Write>(
    encoder: &mut StatefulEncoder<W>,
    meta: &[&Element],
    options: &WriteOptions,
    warnings: &mut Vec<WriteWarning>,
) -> Result<(), write::Error> {
    let mut sub = encoder.sub_encoder();
    let mut used: BTreeSet<Tag> = BTreeSet::new();
    used.insert(tags::FILE_META_INFORMATION_GROUP_LENGTH);

    write_designated_meta_elem(
        &mut sub,
        meta,
        &mut used,
        tags::FILE_META_INFORMATION_VERSION,
        "FileMetaInformationVersion",
        Some(Element::new(
            tags::FILE_META_INFORMATION_VERSION,
            VR::OB,
            smallvec![Value::Bytes(b"0 1".to_vec())],
        )),
        options,
        warnings,
    )?;
    write_designated_meta_elem(
        &mut sub,
        meta,
        &mut used,
        tags::MEDIA_STORAGE_SOP_CLASS_UID,
        "MediaStorageSOPClassUID",
        None,
        options,
        warnings,
    )?;
    write_designated_meta_elem(
        &mut sub,
        meta,
        &mut used,
        tags::MEDIA_STORAGE_SOP_INSTANCE_UID,
        "MediaStorageSOPInstanceUID",
        None,
        options,
        warnings,
    )?;
    write_designated_meta_elem(
        &mut sub,
        meta,
        &mut used,
        tags::TRANSFER_SYNTAX_UID,
        "TransferSyntaxUID",
        None,
        options,
        warnings,
    )?;
    write_designated_meta_elem(
        &mut sub,
        meta,
        &mut used,
        tags::IMPLEMENTATION_CLASS_UID,
        "ImplementationClassUID",
        Some(Element::new(
            tags::IMPLEMENTATION_CLASS_UID,
            VR::UI,
            smallvec![Value::Text(IMPLEMENTATION_CLASS_UID.to_owned())],
        )),
        options,
        warnings,
    )?;
    write_designated_meta_elem(
        &mut sub,
        meta,
        &mut used,
        tags::IMPLEMENTATION_VERSION_NAME,
        "ImplementationVersionName",
        Some(Element::new(
            tags::IMPLEMENTATION_VERSION_NAME,
            VR::SH,
            smallvec![Value::Text(IMPLEMENTATION_VERSION_NAME.to_owned())],
        )),
        options,
        warnings,
    )?;
    for elem in meta {
        if elem.tag.is_meta() && !used.contains(&elem.tag) {
            used.insert(elem.tag);
            write_element(&mut sub, elem, options, warnings)?;
        }
    }

    let bytes = sub.into_bytes();
    encoder.write_zeros(PREAMBLE_LENGTH).context(WriteDataSnafu)?;
    encoder
        .write_bytes(&DICM_MAGIC_CODE)
        .context(WriteDataSnafu)?;
    write_element(
        encoder,
        &Element::new(
            tags::FILE_META_INFORMATION_GROUP_LENGTH,
            VR::UL,
            smallvec![Value::U32(bytes.len() as u32)],
        ),
        options,
        warnings,
    )?;
    encoder.write_bytes(&bytes).context(WriteDataSnafu)?;
    Ok(())
}
