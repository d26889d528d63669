//! This crate contains the core data model of the `dcmio` project:
//! attribute tags, value representations, element headers, decoded
//! values, data sets, and the standard attribute dictionary.
//!
//! Everything here is independent of any particular encoding; the wire
//! codecs live in `dcmio-encoding` and `dcmio-parser`.

pub mod dictionary;
pub mod element;
pub mod header;
pub mod tags;
pub mod value;

pub use crate::dictionary::{DataDictionary, StandardDataDictionary, TagInfo};
pub use crate::element::{CastValueError, DataSet, Element};
pub use crate::header::{
    DataElementHeader, Length, SequenceItemHeader, Tag, VrKind, VR,
};
pub use crate::value::{PixelData, Value, ValueList};
