//! Representation of the values held by a data element.

use crate::element::Element;
use crate::header::Tag;
use smallvec::SmallVec;

/// The value list of a data element. Most attributes carry one or two
/// values, so short lists are kept inline.
pub type ValueList = SmallVec<[Value; 2]>;

/// A single value of a data element.
///
/// Multi-valued attributes are lists of these; the variant in use is
/// determined by the element's value representation. Sequence values
/// nest entire elements, so the sub-element arm is boxed.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// One textual value of a string-like VR.
    Text(String),
    /// An unsigned 16-bit integer (US).
    U16(u16),
    /// An unsigned 32-bit integer (UL).
    U32(u32),
    /// A signed 16-bit integer (SS).
    I16(i16),
    /// A signed 32-bit integer (SL).
    I32(i32),
    /// A 32-bit floating point number (FL, OF).
    F32(f32),
    /// A 64-bit floating point number (FD, OD).
    F64(f64),
    /// An opaque byte payload (OB, OW, OL, UN).
    Bytes(Vec<u8>),
    /// An attribute tag value (AT).
    Tag(Tag),
    /// A nested element: an item of a sequence,
    /// or an element inside an item.
    Item(Box<Element>),
    /// The frames of a pixel data element.
    Pixels(PixelData),
}

impl Value {
    /// A short name for the dynamic type of this value,
    /// for use in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Text(_) => "Text",
            Value::U16(_) => "U16",
            Value::U32(_) => "U32",
            Value::I16(_) => "I16",
            Value::I32(_) => "I32",
            Value::F32(_) => "F32",
            Value::F64(_) => "F64",
            Value::Bytes(_) => "Bytes",
            Value::Tag(_) => "Tag",
            Value::Item(_) => "Item",
            Value::Pixels(_) => "Pixels",
        }
    }

    /// The textual content, if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The nested element, if this is an item value.
    pub fn as_item(&self) -> Option<&Element> {
        match self {
            Value::Item(e) => Some(e),
            _ => None,
        }
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_owned())
    }
}

impl From<Element> for Value {
    fn from(e: Element) -> Self {
        Value::Item(Box::new(e))
    }
}

/// The decoded form of a pixel data element.
///
/// Encapsulated pixel data holds the Basic Offset Table entries in
/// `offsets` (possibly empty) and one byte payload per fragment item in
/// `frames`. Native pixel data has no offsets and a single frame holding
/// the whole pixel payload. Compressed frame contents are kept opaque.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PixelData {
    /// Basic Offset Table entries, in file order.
    pub offsets: Vec<u32>,
    /// Raw frame payloads, in file order.
    pub frames: Vec<Vec<u8>>,
}

impl PixelData {
    /// Create a native (non-encapsulated) pixel data value
    /// from a single frame payload.
    pub fn native(frame: Vec<u8>) -> Self {
        PixelData {
            offsets: Vec::new(),
            frames: vec![frame],
        }
    }
}
