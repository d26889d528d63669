//! End-to-end tests over complete DICOM streams: file header, transfer
//! syntax switching, nested sequences, pixel data framing, character
//! sets and the read options.

use dcmio_core::{tags, DataSet, Element, PixelData, Tag, Value, VR};
use dcmio_parser::{read_data_set, write_data_set, ReadOptions, WriteOptions};
use smallvec::smallvec;

const EXPLICIT_VR_LE: &str = "1.2.840.10008.1.2.1";
const IMPLICIT_VR_LE: &str = "1.2.840.10008.1.2";
const EXPLICIT_VR_BE: &str = "1.2.840.10008.1.2.2";

/// A complete Part 10 stream: preamble, magic code, a minimal meta
/// group declaring the given transfer syntax, and the body bytes.
fn file_with_body(ts_uid: &str, body: &[u8]) -> Vec<u8> {
    let mut uid = ts_uid.as_bytes().to_vec();
    if uid.len() % 2 == 1 {
        uid.push(0);
    }
    let mut meta = vec![0x02, 0x00, 0x10, 0x00, b'U', b'I'];
    meta.extend_from_slice(&(uid.len() as u16).to_le_bytes());
    meta.extend_from_slice(&uid);

    let mut bytes = vec![0u8; 128];
    bytes.extend_from_slice(b"DICM");
    bytes.extend_from_slice(&[0x02, 0x00, 0x00, 0x00, b'U', b'L', 0x04, 0x00]);
    bytes.extend_from_slice(&(meta.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&meta);
    bytes.extend_from_slice(body);
    bytes
}

/// One Explicit VR LE element with the short (2-byte) length form.
fn elem_short(group: u16, element: u16, vr: &[u8; 2], value: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&group.to_le_bytes());
    out.extend_from_slice(&element.to_le_bytes());
    out.extend_from_slice(vr);
    out.extend_from_slice(&(value.len() as u16).to_le_bytes());
    out.extend_from_slice(value);
    out
}

fn texts(elem: &Element) -> Vec<&str> {
    elem.value
        .iter()
        .map(|v| v.as_text().expect("expected text value"))
        .collect()
}

#[test]
fn patient_name_under_explicit_vr_le() {
    let body = elem_short(0x0010, 0x0010, b"PN", b"Smith^John");
    let bytes = file_with_body(EXPLICIT_VR_LE, &body);
    let (ds, error) = read_data_set(&bytes[..], ReadOptions::new());
    assert!(error.is_none(), "unexpected error: {:?}", error);

    let name = ds.find_by_tag(tags::PATIENT_NAME).expect("name present");
    assert_eq!(name.vr, VR::PN);
    assert_eq!(texts(name), vec!["Smith^John"]);
}

#[test]
fn backslash_separated_text_becomes_multiple_values() {
    let body = elem_short(0x0010, 0x0020, b"LO", b"ID\\12345");
    let bytes = file_with_body(EXPLICIT_VR_LE, &body);
    let (ds, error) = read_data_set(&bytes[..], ReadOptions::new());
    assert!(error.is_none(), "unexpected error: {:?}", error);

    let id = ds.find_by_tag(tags::PATIENT_ID).expect("id present");
    assert_eq!(texts(id), vec!["ID", "12345"]);
}

#[test]
fn specific_character_set_scopes_following_text() {
    // "Петр" in ISO-8859-5
    let petr = [0xBFu8, 0xD5, 0xE2, 0xE0];
    let mut body = elem_short(0x0008, 0x0005, b"CS", b"ISO_IR 144");
    body.extend_from_slice(&elem_short(0x0010, 0x0010, b"PN", &petr));
    let bytes = file_with_body(EXPLICIT_VR_LE, &body);
    let (ds, error) = read_data_set(&bytes[..], ReadOptions::new());
    assert!(error.is_none(), "unexpected error: {:?}", error);

    let name = ds.find_by_tag(tags::PATIENT_NAME).expect("name present");
    assert_eq!(texts(name), vec!["Петр"]);
}

#[test]
fn cyrillic_text_is_detected_without_a_character_set() {
    // "Петр" in windows-1251, no SpecificCharacterSet anywhere
    let petr = [0xCFu8, 0xE5, 0xF2, 0xF0];
    let body = elem_short(0x0010, 0x0010, b"PN", &petr);
    let bytes = file_with_body(EXPLICIT_VR_LE, &body);
    let (ds, error) = read_data_set(&bytes[..], ReadOptions::new());
    assert!(error.is_none(), "unexpected error: {:?}", error);

    let name = ds.find_by_tag(tags::PATIENT_NAME).expect("name present");
    assert_eq!(texts(name), vec!["Петр"]);
}

#[test]
fn undefined_length_sequence_with_two_items() {
    let mut body = Vec::new();
    // (0008,1032) SQ, undefined length
    body.extend_from_slice(&[0x08, 0x00, 0x32, 0x10, b'S', b'Q', 0x00, 0x00]);
    body.extend_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF]);
    for description in &[b"SER-0001", b"SER-0002"] {
        let nested = elem_short(0x0008, 0x103E, b"LO", *description);
        body.extend_from_slice(&[0xFE, 0xFF, 0x00, 0xE0]);
        body.extend_from_slice(&(nested.len() as u32).to_le_bytes());
        body.extend_from_slice(&nested);
    }
    body.extend_from_slice(&[0xFE, 0xFF, 0xDD, 0xE0, 0x00, 0x00, 0x00, 0x00]);

    let bytes = file_with_body(EXPLICIT_VR_LE, &body);
    let (ds, error) = read_data_set(&bytes[..], ReadOptions::new());
    assert!(error.is_none(), "unexpected error: {:?}", error);

    let seq = ds.find_by_tag(Tag(0x0008, 0x1032)).expect("SQ present");
    assert_eq!(seq.vr, VR::SQ);
    assert!(seq.undefined_length);
    let items: Vec<&Element> = seq.items().collect();
    assert_eq!(items.len(), 2);
    for (item, expected) in items.iter().zip(&["SER-0001", "SER-0002"]) {
        assert_eq!(item.tag, tags::ITEM);
        assert_eq!(item.vr, VR::NA);
        let children: Vec<&Element> = item.items().collect();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].tag, Tag(0x0008, 0x103E));
        assert_eq!(texts(children[0]), vec![*expected]);
    }

    // re-encoding an undefined-length sequence ends with a
    // sequence delimitation item
    let ds = data_set_with_meta(EXPLICIT_VR_LE, vec![seq.clone()]);
    let mut out = Vec::new();
    let warnings = write_data_set(&mut out, &ds, &WriteOptions::new()).expect("should write");
    assert!(warnings.is_empty());
    assert_eq!(
        &out[out.len() - 8..],
        &[0xFE, 0xFF, 0xDD, 0xE0, 0x00, 0x00, 0x00, 0x00]
    );
}

#[test]
fn encapsulated_pixel_data_with_offset_table() {
    let mut body = Vec::new();
    // (7FE0,0010) OB, undefined length
    body.extend_from_slice(&[0xE0, 0x7F, 0x10, 0x00, b'O', b'B', 0x00, 0x00]);
    body.extend_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF]);
    // Basic Offset Table with two entries
    body.extend_from_slice(&[0xFE, 0xFF, 0x00, 0xE0, 0x08, 0x00, 0x00, 0x00]);
    body.extend_from_slice(&0u32.to_le_bytes());
    body.extend_from_slice(&128u32.to_le_bytes());
    // two frames of 128 and 200 bytes
    body.extend_from_slice(&[0xFE, 0xFF, 0x00, 0xE0]);
    body.extend_from_slice(&128u32.to_le_bytes());
    body.extend_from_slice(&[0xAB; 128]);
    body.extend_from_slice(&[0xFE, 0xFF, 0x00, 0xE0]);
    body.extend_from_slice(&200u32.to_le_bytes());
    body.extend_from_slice(&[0xCD; 200]);
    body.extend_from_slice(&[0xFE, 0xFF, 0xDD, 0xE0, 0x00, 0x00, 0x00, 0x00]);

    let bytes = file_with_body(EXPLICIT_VR_LE, &body);
    let (ds, error) = read_data_set(&bytes[..], ReadOptions::new());
    assert!(error.is_none(), "unexpected error: {:?}", error);

    let elem = ds.find_by_tag(tags::PIXEL_DATA).expect("pixel data present");
    assert!(elem.undefined_length);
    match elem.value.as_slice() {
        [Value::Pixels(pixels)] => {
            assert_eq!(pixels.offsets, vec![0, 128]);
            assert_eq!(pixels.frames.len(), 2);
            assert_eq!(pixels.frames[0], vec![0xAB; 128]);
            assert_eq!(pixels.frames[1], vec![0xCD; 200]);
        }
        other => panic!("expected a pixel data value, got {:?}", other),
    }

    // encapsulated form round-trips
    let ds = data_set_with_meta(EXPLICIT_VR_LE, vec![elem.clone()]);
    let mut out = Vec::new();
    write_data_set(&mut out, &ds, &WriteOptions::new()).expect("should write");
    let (reread, error) = read_data_set(&out[..], ReadOptions::new());
    assert!(error.is_none(), "unexpected error: {:?}", error);
    assert_eq!(
        reread.find_by_tag(tags::PIXEL_DATA).map(|e| &e.value),
        Some(&elem.value)
    );
}

#[test]
fn stop_at_tag_ends_parsing() {
    let mut body = elem_short(0x0008, 0x0005, b"CS", b"ISO_IR 100");
    body.extend_from_slice(&elem_short(0x0010, 0x0010, b"PN", b"Smith^John"));
    body.extend_from_slice(&elem_short(0x0010, 0x0030, b"DA", b"19900101"));
    body.extend_from_slice(&elem_short(0x0010, 0x0040, b"CS", b"M "));
    let bytes = file_with_body(EXPLICIT_VR_LE, &body);

    let options = ReadOptions::new().stop_at_tag(Tag(0x0010, 0x0030));
    let (ds, error) = read_data_set(&bytes[..], options);
    assert!(error.is_none(), "unexpected error: {:?}", error);

    assert!(ds.find_by_tag(Tag(0x0008, 0x0005)).is_some());
    assert!(ds.find_by_tag(tags::PATIENT_NAME).is_some());
    assert!(ds.find_by_tag(Tag(0x0010, 0x0030)).is_none());
    assert!(ds.find_by_tag(Tag(0x0010, 0x0040)).is_none());
}

#[test]
fn return_tags_filters_but_keeps_side_effects() {
    // "Петр" in ISO-8859-5; the charset element itself is filtered out
    // but must still install the decoder
    let petr = [0xBFu8, 0xD5, 0xE2, 0xE0];
    let mut body = elem_short(0x0008, 0x0005, b"CS", b"ISO_IR 144");
    body.extend_from_slice(&elem_short(0x0010, 0x0010, b"PN", &petr));
    let bytes = file_with_body(EXPLICIT_VR_LE, &body);

    let options = ReadOptions::new().return_tags(vec![tags::PATIENT_NAME]);
    let (ds, error) = read_data_set(&bytes[..], options);
    assert!(error.is_none(), "unexpected error: {:?}", error);

    assert!(ds.find_by_tag(Tag(0x0008, 0x0005)).is_none());
    let name = ds.find_by_tag(tags::PATIENT_NAME).expect("name present");
    assert_eq!(texts(name), vec!["Петр"]);
}

#[test]
fn drop_pixel_data_ends_parsing_early() {
    let mut body = elem_short(0x0028, 0x0010, b"US", &512u16.to_le_bytes());
    // native pixel data: OB with the long length form
    body.extend_from_slice(&[0xE0, 0x7F, 0x10, 0x00, b'O', b'B', 0x00, 0x00]);
    body.extend_from_slice(&64u32.to_le_bytes());
    body.extend_from_slice(&[0x11; 64]);
    // content after pixel data is not reached
    body.extend_from_slice(&elem_short(0x0010, 0x4000, b"LT", b"comment "));
    let bytes = file_with_body(EXPLICIT_VR_LE, &body);

    let (ds, error) = read_data_set(&bytes[..], ReadOptions::new().drop_pixel_data(true));
    assert!(error.is_none(), "unexpected error: {:?}", error);
    assert!(ds.find_by_tag(Tag(0x0028, 0x0010)).is_some());
    assert!(ds.find_by_tag(tags::PIXEL_DATA).is_none());
    assert!(ds.find_by_tag(Tag(0x0010, 0x4000)).is_none());
}

#[test]
fn non_printable_characters_are_filtered() {
    let body = elem_short(0x0010, 0x0020, b"LO", b"ID\x01\x0242");
    let bytes = file_with_body(EXPLICIT_VR_LE, &body);
    let (ds, error) = read_data_set(&bytes[..], ReadOptions::new());
    assert!(error.is_none(), "unexpected error: {:?}", error);
    let id = ds.find_by_tag(tags::PATIENT_ID).expect("id present");
    assert_eq!(texts(id), vec!["ID42"]);
}

#[test]
fn multi_valued_ds_is_split() {
    let body = elem_short(0x0028, 0x0030, b"DS", b"0.5\\0.75");
    let bytes = file_with_body(EXPLICIT_VR_LE, &body);
    let (ds, error) = read_data_set(&bytes[..], ReadOptions::new());
    assert!(error.is_none(), "unexpected error: {:?}", error);
    let spacing = ds.find_by_tag(Tag(0x0028, 0x0030)).expect("present");
    assert_eq!(texts(spacing), vec!["0.5", "0.75"]);
}

fn data_set_with_meta(ts_uid: &str, body: Vec<Element>) -> DataSet {
    let mut elements = vec![
        Element::new(
            tags::MEDIA_STORAGE_SOP_CLASS_UID,
            VR::UI,
            smallvec![Value::Text("1.2.840.10008.5.1.4.1.1.7".to_owned())],
        ),
        Element::new(
            tags::MEDIA_STORAGE_SOP_INSTANCE_UID,
            VR::UI,
            smallvec![Value::Text("1.2.3.4.5".to_owned())],
        ),
        Element::new(
            tags::TRANSFER_SYNTAX_UID,
            VR::UI,
            smallvec![Value::Text(ts_uid.to_owned())],
        ),
    ];
    elements.extend(body);
    DataSet::from(elements)
}

fn sample_body() -> Vec<Element> {
    vec![
        Element::new(
            tags::PATIENT_NAME,
            VR::PN,
            smallvec![Value::Text("Smith^John".to_owned())],
        ),
        Element::new(
            tags::PATIENT_ID,
            VR::LO,
            smallvec![
                Value::Text("ID".to_owned()),
                Value::Text("12345".to_owned())
            ],
        ),
        Element::new(Tag(0x0028, 0x0010), VR::US, smallvec![Value::U16(512)]),
        Element::new(
            Tag(0x0028, 0x0030),
            VR::DS,
            smallvec![
                Value::Text("0.5".to_owned()),
                Value::Text("0.75".to_owned())
            ],
        ),
        Element::new(
            tags::PIXEL_DATA,
            VR::OW,
            smallvec![Value::Pixels(PixelData::native(vec![0x42; 64]))],
        ),
    ]
}

fn assert_same_body(written: &DataSet, reread: &DataSet) {
    for elem in &written.elements {
        if elem.tag.is_meta() {
            continue;
        }
        let other = reread
            .find_by_tag(elem.tag)
            .unwrap_or_else(|| panic!("element {} missing after round trip", elem.tag));
        assert_eq!(other.vr, elem.vr, "VR of {}", elem.tag);
        assert_eq!(other.value, elem.value, "value of {}", elem.tag);
    }
}

#[test]
fn round_trip_explicit_vr_le() {
    let ds = data_set_with_meta(EXPLICIT_VR_LE, sample_body());
    let mut out = Vec::new();
    let warnings = write_data_set(&mut out, &ds, &WriteOptions::new()).expect("should write");
    assert!(warnings.is_empty(), "unexpected warnings: {:?}", warnings);

    let (reread, error) = read_data_set(&out[..], ReadOptions::new());
    assert!(error.is_none(), "unexpected error: {:?}", error);
    assert_same_body(&ds, &reread);

    // a second pass over the re-read data set is stable
    let mut out2 = Vec::new();
    write_data_set(&mut out2, &reread, &WriteOptions::new()).expect("should write again");
    assert_eq!(out, out2);
}

#[test]
fn round_trip_implicit_vr_le() {
    let ds = data_set_with_meta(IMPLICIT_VR_LE, sample_body());
    let mut out = Vec::new();
    write_data_set(&mut out, &ds, &WriteOptions::new()).expect("should write");

    let (reread, error) = read_data_set(&out[..], ReadOptions::new());
    assert!(error.is_none(), "unexpected error: {:?}", error);
    assert_same_body(&ds, &reread);
}

#[test]
fn round_trip_explicit_vr_be() {
    let ds = data_set_with_meta(EXPLICIT_VR_BE, sample_body());
    let mut out = Vec::new();
    write_data_set(&mut out, &ds, &WriteOptions::new()).expect("should write");

    let (reread, error) = read_data_set(&out[..], ReadOptions::new());
    assert!(error.is_none(), "unexpected error: {:?}", error);
    assert_same_body(&ds, &reread);

    let rows = reread.find_by_tag(Tag(0x0028, 0x0010)).expect("rows");
    assert_eq!(rows.value.as_slice(), &[Value::U16(512)]);
}

#[test]
fn round_trip_nested_sequences() {
    let inner = Element::new(
        Tag(0x0008, 0x1155),
        VR::UI,
        smallvec![Value::Text("1.2.3.4.5.6".to_owned())],
    );
    let mut item = Element::new(tags::ITEM, VR::NA, smallvec![Value::from(inner)]);
    item.undefined_length = true;
    let mut seq = Element::new(
        Tag(0x0008, 0x1140),
        VR::SQ,
        smallvec![Value::from(item)],
    );
    seq.undefined_length = true;

    let ds = data_set_with_meta(EXPLICIT_VR_LE, vec![seq]);
    let mut out = Vec::new();
    write_data_set(&mut out, &ds, &WriteOptions::new()).expect("should write");

    let (reread, error) = read_data_set(&out[..], ReadOptions::new());
    assert!(error.is_none(), "unexpected error: {:?}", error);
    let seq = reread.find_by_tag(Tag(0x0008, 0x1140)).expect("SQ present");
    let items: Vec<&Element> = seq.items().collect();
    assert_eq!(items.len(), 1);
    assert!(items[0].undefined_length);
    let children: Vec<&Element> = items[0].items().collect();
    assert_eq!(children.len(), 1);
    assert_eq!(texts(children[0]), vec!["1.2.3.4.5.6"]);
}

#[test]
fn private_elements_are_skipped_on_write() {
    let mut body = sample_body();
    body.push(Element::new(
        Tag(0x0009, 0x0010),
        VR::LO,
        smallvec![Value::Text("PRIVATE".to_owned())],
    ));
    let ds = data_set_with_meta(EXPLICIT_VR_LE, body);
    let mut out = Vec::new();
    write_data_set(&mut out, &ds, &WriteOptions::new()).expect("should write");

    let (reread, error) = read_data_set(&out[..], ReadOptions::new());
    assert!(error.is_none(), "unexpected error: {:?}", error);
    assert!(reread.find_by_tag(Tag(0x0009, 0x0010)).is_none());
}

#[test]
fn missing_required_meta_element_fails_the_write() {
    let ds = DataSet::from(vec![Element::new(
        tags::TRANSFER_SYNTAX_UID,
        VR::UI,
        smallvec![Value::Text(EXPLICIT_VR_LE.to_owned())],
    )]);
    let mut out = Vec::new();
    let err = write_data_set(&mut out, &ds, &WriteOptions::new())
        .expect_err("missing SOP class UID must fail");
    assert!(format!("{}", err).contains("MediaStorageSOPClassUID"));
}

#[test]
fn truncated_body_returns_partial_data_set() {
    let mut body = elem_short(0x0010, 0x0010, b"PN", b"Smith^John");
    // a header promising more bytes than the stream holds
    body.extend_from_slice(&[0x10, 0x00, 0x20, 0x00, b'L', b'O', 0x20, 0x00, b'A']);
    let bytes = file_with_body(EXPLICIT_VR_LE, &body);

    let (ds, error) = read_data_set(&bytes[..], ReadOptions::new());
    assert!(error.is_some(), "truncation must surface an error");
    // the parsable prefix is still returned
    assert!(ds.find_by_tag(tags::PATIENT_NAME).is_some());
}
