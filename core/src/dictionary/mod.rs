//! The data dictionary: the oracle the codec consults to resolve a tag
//! into its canonical value representation and keyword.
//!
//! The codec needs the dictionary to read implicit-VR streams and to
//! verify caller-supplied VRs on writing. A modest table of standard
//! attributes is bundled; group length elements (`(gggg,0000)`) are
//! resolved synthetically.

mod entries;

use crate::header::{Tag, VR};

/// One data dictionary record: the canonical VR and keyword of a tag.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TagInfo {
    /// The attribute tag.
    pub tag: Tag,
    /// The attribute keyword, in UpperCamelCase with no spaces.
    pub alias: &'static str,
    /// The canonical value representation.
    pub vr: VR,
}

/// Type trait for a dictionary of DICOM attributes.
///
/// The methods take no generic parameters so that implementations can be
/// used as trait objects.
pub trait DataDictionary {
    /// Fetch a record by tag.
    fn by_tag(&self, tag: Tag) -> Option<TagInfo>;

    /// Fetch a record by its keyword (e.g. `"PatientName"`).
    fn by_name(&self, name: &str) -> Option<TagInfo>;
}

/// The bundled dictionary of standard DICOM attributes.
#[derive(Debug, Default, Copy, Clone)]
pub struct StandardDataDictionary;

impl DataDictionary for StandardDataDictionary {
    fn by_tag(&self, tag: Tag) -> Option<TagInfo> {
        if let Ok(i) = entries::ENTRIES.binary_search_by_key(&tag, |e| e.tag) {
            return Some(entries::ENTRIES[i]);
        }
        // group length elements are defined for every group
        if tag.element() == 0x0000 {
            return Some(TagInfo {
                tag,
                alias: "GroupLength",
                vr: VR::UL,
            });
        }
        None
    }

    fn by_name(&self, name: &str) -> Option<TagInfo> {
        entries::ENTRIES.iter().find(|e| e.alias == name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags;

    #[test]
    fn entries_are_sorted_by_tag() {
        let mut previous = Tag(0, 0);
        for e in entries::ENTRIES {
            assert!(
                previous < e.tag,
                "entry {} at tag {} is out of order",
                e.alias,
                e.tag
            );
            previous = e.tag;
        }
    }

    #[test]
    fn lookup_by_tag() {
        let dict = StandardDataDictionary;
        let info = dict.by_tag(tags::PATIENT_NAME).unwrap();
        assert_eq!(info.alias, "PatientName");
        assert_eq!(info.vr, VR::PN);
        assert_eq!(dict.by_tag(tags::PIXEL_DATA).unwrap().vr, VR::OW);
        assert_eq!(dict.by_tag(tags::ITEM).unwrap().vr, VR::NA);
        assert!(dict.by_tag(Tag(0x0009, 0x0010)).is_none());
    }

    #[test]
    fn group_length_is_synthesized() {
        let info = StandardDataDictionary.by_tag(Tag(0x0008, 0x0000)).unwrap();
        assert_eq!(info.vr, VR::UL);
        assert_eq!(info.alias, "GroupLength");
    }

    #[test]
    fn lookup_by_name() {
        let info = StandardDataDictionary.by_name("TransferSyntaxUID").unwrap();
        assert_eq!(info.tag, tags::TRANSFER_SYNTAX_UID);
        assert_eq!(info.vr, VR::UI);
    }
}
