//! Reading and writing of whole data sets, plus the option types
//! controlling both directions.

pub mod read;
pub mod write;

use dcmio_core::Tag;
use std::collections::BTreeSet;

/// Options controlling how a data set is parsed.
#[derive(Debug, Default, Clone)]
pub struct ReadOptions {
    /// Skip the Pixel Data element and stop parsing when it is reached.
    pub drop_pixel_data: bool,
    /// When set, only elements with these tags are returned.
    /// Side effects of other elements (such as character set
    /// installation) are still honored.
    pub return_tags: Option<BTreeSet<Tag>>,
    /// Stop parsing cleanly upon reaching an element with this tag or a
    /// greater one. The element itself is not returned.
    pub stop_at_tag: Option<Tag>,
    /// Decode `ISO_IR 100` content as windows-1250
    /// (legacy Latin-2 archive workaround).
    pub cp1250_fix: bool,
    /// The preferred candidate for Cyrillic auto-detection: one of
    /// `"windows-1251"`, `"koi8-r"`, `"iso-8859-5"`, `"cp866"`.
    pub default_cyrillic_encoding: Option<String>,
    /// Also count code points in U+0080..=U+00FF as garbage during
    /// character set auto-detection. This catches double-encoded text
    /// but mis-flags legitimate Latin-1 values, so it is opt-in.
    pub flag_high_bit_garbage: bool,
}

impl ReadOptions {
    /// Default read options.
    pub fn new() -> Self {
        ReadOptions::default()
    }

    /// Skip the Pixel Data element and stop parsing when it is reached.
    pub fn drop_pixel_data(mut self, drop: bool) -> Self {
        self.drop_pixel_data = drop;
        self
    }

    /// Return only elements with the given tags.
    pub fn return_tags<I: IntoIterator<Item = Tag>>(mut self, tags: I) -> Self {
        self.return_tags = Some(tags.into_iter().collect());
        self
    }

    /// Stop parsing upon reaching this tag or a greater one.
    pub fn stop_at_tag(mut self, tag: Tag) -> Self {
        self.stop_at_tag = Some(tag);
        self
    }

    /// Decode `ISO_IR 100` content as windows-1250.
    pub fn cp1250_fix(mut self, fix: bool) -> Self {
        self.cp1250_fix = fix;
        self
    }

    /// Set the preferred candidate for Cyrillic auto-detection.
    pub fn default_cyrillic_encoding<S: Into<String>>(mut self, encoding: S) -> Self {
        self.default_cyrillic_encoding = Some(encoding.into());
        self
    }

    /// Count high code points as garbage during auto-detection.
    pub fn flag_high_bit_garbage(mut self, flag: bool) -> Self {
        self.flag_high_bit_garbage = flag;
        self
    }
}

/// Options controlling how a data set is serialized.
#[derive(Debug, Default, Clone)]
pub struct WriteOptions {
    /// Do not verify element VRs against the data dictionary.
    pub skip_vr_verification: bool,
}

impl WriteOptions {
    /// Default write options.
    pub fn new() -> Self {
        WriteOptions::default()
    }

    /// Do not verify element VRs against the data dictionary.
    pub fn skip_vr_verification(mut self, skip: bool) -> Self {
        self.skip_vr_verification = skip;
        self
    }
}
