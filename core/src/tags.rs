//! Attribute tag constants for the tags which the codec itself
//! needs to recognize, plus a few frequently accessed attributes.

use crate::header::Tag;

/// File Meta Information Group Length (0002,0000)
pub const FILE_META_INFORMATION_GROUP_LENGTH: Tag = Tag(0x0002, 0x0000);
/// File Meta Information Version (0002,0001)
pub const FILE_META_INFORMATION_VERSION: Tag = Tag(0x0002, 0x0001);
/// Media Storage SOP Class UID (0002,0002)
pub const MEDIA_STORAGE_SOP_CLASS_UID: Tag = Tag(0x0002, 0x0002);
/// Media Storage SOP Instance UID (0002,0003)
pub const MEDIA_STORAGE_SOP_INSTANCE_UID: Tag = Tag(0x0002, 0x0003);
/// Transfer Syntax UID (0002,0010)
pub const TRANSFER_SYNTAX_UID: Tag = Tag(0x0002, 0x0010);
/// Implementation Class UID (0002,0012)
pub const IMPLEMENTATION_CLASS_UID: Tag = Tag(0x0002, 0x0012);
/// Implementation Version Name (0002,0013)
pub const IMPLEMENTATION_VERSION_NAME: Tag = Tag(0x0002, 0x0013);

/// Specific Character Set (0008,0005)
pub const SPECIFIC_CHARACTER_SET: Tag = Tag(0x0008, 0x0005);
/// SOP Class UID (0008,0016)
pub const SOP_CLASS_UID: Tag = Tag(0x0008, 0x0016);
/// SOP Instance UID (0008,0018)
pub const SOP_INSTANCE_UID: Tag = Tag(0x0008, 0x0018);

/// Patient's Name (0010,0010)
pub const PATIENT_NAME: Tag = Tag(0x0010, 0x0010);
/// Patient ID (0010,0020)
pub const PATIENT_ID: Tag = Tag(0x0010, 0x0020);

/// Pixel Data (7FE0,0010)
pub const PIXEL_DATA: Tag = Tag(0x7FE0, 0x0010);

/// Item (FFFE,E000)
pub const ITEM: Tag = Tag(0xFFFE, 0xE000);
/// Item Delimitation Item (FFFE,E00D)
pub const ITEM_DELIMITATION_ITEM: Tag = Tag(0xFFFE, 0xE00D);
/// Sequence Delimitation Item (FFFE,E0DD)
pub const SEQUENCE_DELIMITATION_ITEM: Tag = Tag(0xFFFE, 0xE0DD);

/// The group number of the File Meta Information group.
pub const META_GROUP: u16 = 0x0002;
/// The group number shared by items and delimitation items.
pub const ITEM_SEQ_GROUP: u16 = 0xFFFE;
