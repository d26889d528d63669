//! Data elements and the data set which owns them.

use crate::dictionary::{DataDictionary, StandardDataDictionary};
use crate::header::{Tag, VR};
use crate::value::{Value, ValueList};
use smallvec::smallvec;
use snafu::Snafu;

/// An error raised when accessing an element value
/// under an inappropriate type.
#[derive(Debug, Snafu)]
#[snafu(display("Requested a {} value from {}, but the value is {}", requested, tag, got))]
pub struct CastValueError {
    /// The requested value kind.
    pub requested: &'static str,
    /// The tag of the element accessed.
    pub tag: Tag,
    /// The dynamic type of the first value found.
    pub got: &'static str,
}

type Result<T, E = CastValueError> = std::result::Result<T, E>;

/// A single DICOM data element, owning its decoded values.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// The attribute tag.
    pub tag: Tag,
    /// The value representation.
    pub vr: VR,
    /// Whether the element was (or should be) encoded with an undefined
    /// length and a terminating delimitation item.
    pub undefined_length: bool,
    /// The decoded values, in file order.
    pub value: ValueList,
}

impl Element {
    /// Create a new element with a defined length.
    pub fn new<T, V>(tag: T, vr: VR, value: V) -> Self
    where
        T: Into<Tag>,
        V: Into<ValueList>,
    {
        Element {
            tag: tag.into(),
            vr,
            undefined_length: false,
            value: value.into(),
        }
    }

    /// Create a new element holding a single value,
    /// with the VR defined by the standard dictionary
    /// (`UN` if the tag is not known).
    pub fn new_with_std_vr<T, V>(tag: T, value: V) -> Self
    where
        T: Into<Tag>,
        V: Into<Value>,
    {
        let tag = tag.into();
        let vr = StandardDataDictionary
            .by_tag(tag)
            .map(|info| info.vr)
            .unwrap_or(VR::UN);
        Element {
            tag,
            vr,
            undefined_length: false,
            value: smallvec![value.into()],
        }
    }

    fn cast_error(&self, requested: &'static str) -> CastValueError {
        CastValueError {
            requested,
            tag: self.tag,
            got: self
                .value
                .first()
                .map(Value::type_name)
                .unwrap_or("nothing"),
        }
    }

    /// The single text value of this element.
    pub fn string(&self) -> Result<&str> {
        match self.value.first() {
            Some(Value::Text(s)) => Ok(s),
            _ => Err(self.cast_error("Text")),
        }
    }

    /// All text values of this element.
    pub fn strings(&self) -> Result<Vec<&str>> {
        self.value
            .iter()
            .map(|v| v.as_text().ok_or_else(|| self.cast_error("Text")))
            .collect()
    }

    /// The single unsigned 32-bit value of this element.
    pub fn uint32(&self) -> Result<u32> {
        match self.value.first() {
            Some(Value::U32(v)) => Ok(*v),
            _ => Err(self.cast_error("U32")),
        }
    }

    /// Iterate over the nested elements of a sequence or item value.
    pub fn items(&self) -> impl Iterator<Item = &Element> {
        self.value.iter().filter_map(Value::as_item)
    }
}

/// The decoded contents of one DICOM data set, with its elements in the
/// order of appearance on the stream. File Meta Information elements
/// (group 0002) are kept inline at the front.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DataSet {
    /// All elements of the data set, meta group included.
    pub elements: Vec<Element>,
}

impl DataSet {
    /// Create an empty data set.
    pub fn new() -> Self {
        DataSet::default()
    }

    /// Find the first element with the given tag.
    pub fn find_by_tag<T: Into<Tag>>(&self, tag: T) -> Option<&Element> {
        let tag = tag.into();
        self.elements.iter().find(|e| e.tag == tag)
    }

    /// Find the first element whose tag has the given dictionary alias,
    /// such as `"PatientName"`.
    pub fn find_by_name(&self, name: &str) -> Option<&Element> {
        let info = StandardDataDictionary.by_name(name)?;
        self.find_by_tag(info.tag)
    }
}

impl From<Vec<Element>> for DataSet {
    fn from(elements: Vec<Element>) -> Self {
        DataSet { elements }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags;
    use smallvec::smallvec;

    #[test]
    fn element_accessors() {
        let e = Element::new(
            tags::PATIENT_ID,
            VR::LO,
            smallvec![Value::from("ID"), Value::from("12345")],
        );
        assert_eq!(e.string().unwrap(), "ID");
        assert_eq!(e.strings().unwrap(), vec!["ID", "12345"]);
        assert!(e.uint32().is_err());
    }

    #[test]
    fn element_vr_from_dictionary() {
        let e = Element::new_with_std_vr(tags::PATIENT_NAME, "Doe^John");
        assert_eq!(e.vr, VR::PN);
        let unknown = Element::new_with_std_vr(Tag(0x0009, 0x0001), "private");
        assert_eq!(unknown.vr, VR::UN);
    }

    #[test]
    fn data_set_lookup() {
        let ds = DataSet::from(vec![
            Element::new_with_std_vr(tags::PATIENT_NAME, "Doe^John"),
            Element::new_with_std_vr(tags::PATIENT_ID, "12345"),
        ]);
        assert!(ds.find_by_tag(tags::PATIENT_ID).is_some());
        assert_eq!(
            ds.find_by_name("PatientName").map(|e| e.tag),
            Some(tags::PATIENT_NAME)
        );
        assert!(ds.find_by_name("NoSuchAttribute").is_none());
    }
}
