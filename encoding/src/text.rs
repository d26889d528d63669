//! Character repertoire handling for DICOM text values.
//!
//! Text in a data set is decoded according to the Specific Character Set
//! (0008,0005) element. This module maps the DICOM character set names
//! (and a number of vendor aliases seen in the wild, mostly Cyrillic)
//! to byte decoders, and provides a best-effort detection fallback for
//! files which carry Cyrillic text without declaring a character set.
//!
//! Person Name values are the only place where up to three decoders are
//! in use at once (alphabetic, ideographic and phonetic component
//! groups); all other text VRs are decoded with the ideographic decoder.
//! See PS3.5 §6.1-6.2.

use dcmio_core::VR;
use encoding::all::{IBM866, ISO_8859_1, ISO_8859_5, KOI8_R, UTF_8, WINDOWS_1251};
use encoding::label::encoding_from_whatwg_label;
use encoding::{DecoderTrap, EncodingRef};
use std::fmt;
use tracing::{debug, warn};

/// Mapping of DICOM defined terms to WHATWG encoding labels.
/// Both the `ISO_IR` and the `ISO 2022 IR` spellings are accepted.
const CHARSET_LABELS: &[(&str, &str)] = &[
    ("ISO_IR 6", "iso-8859-1"),
    ("ISO 2022 IR 6", "iso-8859-1"),
    ("ISO_IR 13", "shift_jis"),
    ("ISO 2022 IR 13", "shift_jis"),
    ("ISO_IR 100", "iso-8859-1"),
    ("ISO 2022 IR 100", "iso-8859-1"),
    ("ISO_IR 101", "iso-8859-2"),
    ("ISO 2022 IR 101", "iso-8859-2"),
    ("ISO_IR 109", "iso-8859-3"),
    ("ISO 2022 IR 109", "iso-8859-3"),
    ("ISO_IR 110", "iso-8859-4"),
    ("ISO 2022 IR 110", "iso-8859-4"),
    ("ISO_IR 126", "iso-8859-7"),
    ("ISO 2022 IR 126", "iso-8859-7"),
    ("ISO_IR 127", "iso-8859-6"),
    ("ISO 2022 IR 127", "iso-8859-6"),
    ("ISO_IR 138", "iso-8859-8"),
    ("ISO 2022 IR 138", "iso-8859-8"),
    ("ISO_IR 144", "iso-8859-5"),
    ("ISO 2022 IR 144", "iso-8859-5"),
    // nonstandard, but emitted by some Cyrillic modalities
    ("ISO_IR 146", "koi8-r"),
    ("ISO 2022 IR 146", "koi8-r"),
    ("ISO_IR 148", "windows-1254"),
    ("ISO 2022 IR 148", "windows-1254"),
    ("ISO 2022 IR 149", "euc-kr"),
    ("ISO_IR 166", "windows-874"),
    ("ISO 2022 IR 166", "windows-874"),
    ("ISO 2022 IR 87", "iso-2022-jp"),
    ("ISO 2022 IR 159", "iso-2022-jp"),
    ("ISO_IR 192", "utf-8"),
    ("GB18030", "gb18030"),
];

/// Vendor spellings of character set names, matched case-insensitively.
const CHARSET_ALIASES: &[(&str, &str)] = &[
    ("CYRILLIC", "iso-8859-5"),
    ("ISO-8859-5", "iso-8859-5"),
    ("ISO8859-5", "iso-8859-5"),
    ("KOI8-R", "koi8-r"),
    ("KOI8R", "koi8-r"),
    ("KOI-8-R", "koi8-r"),
    ("KOI8-U", "koi8-u"),
    ("KOI8U", "koi8-u"),
    ("KOI-8-U", "koi8-u"),
    ("WINDOWS-1251", "windows-1251"),
    ("WINDOWS1251", "windows-1251"),
    ("WIN-1251", "windows-1251"),
    ("WIN1251", "windows-1251"),
    ("CP1251", "windows-1251"),
    ("CP-1251", "windows-1251"),
    ("CP866", "ibm866"),
    ("CP-866", "ibm866"),
    ("IBM866", "ibm866"),
    ("IBM-866", "ibm866"),
    ("DOS-866", "ibm866"),
];

/// The triple of decoders installed by a Specific Character Set element.
///
/// Only `PN` values may use all three; every other text VR is decoded
/// with the ideographic decoder.
#[derive(Copy, Clone)]
pub struct CodingSystem {
    /// Decoder for the alphabetic group of a person name.
    pub alphabetic: EncodingRef,
    /// Decoder for the ideographic group, and for all non-PN text.
    pub ideographic: EncodingRef,
    /// Decoder for the phonetic group of a person name.
    pub phonetic: EncodingRef,
}

impl fmt::Debug for CodingSystem {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CodingSystem")
            .field("alphabetic", &self.alphabetic.name())
            .field("ideographic", &self.ideographic.name())
            .field("phonetic", &self.phonetic.name())
            .finish()
    }
}

impl Default for CodingSystem {
    fn default() -> Self {
        CodingSystem::single(ISO_8859_1)
    }
}

impl CodingSystem {
    /// A coding system using the same decoder for all three groups.
    pub fn single(encoding: EncodingRef) -> Self {
        CodingSystem {
            alphabetic: encoding,
            ideographic: encoding,
            phonetic: encoding,
        }
    }

    /// Decode the raw bytes of a text value.
    ///
    /// `PN` values are split into component groups on `=` and each group
    /// is decoded with its respective decoder; other VRs use the
    /// ideographic decoder for the whole payload.
    pub fn decode(&self, bytes: &[u8], vr: VR) -> String {
        if vr == VR::PN {
            let decoders = [self.alphabetic, self.ideographic, self.phonetic];
            return bytes
                .split(|&b| b == b'=')
                .enumerate()
                .map(|(i, group)| decode_lenient(decoders[i.min(2)], group))
                .collect::<Vec<_>>()
                .join("=");
        }
        decode_lenient(self.ideographic, bytes)
    }
}

fn decode_lenient(encoding: EncodingRef, bytes: &[u8]) -> String {
    encoding
        .decode(bytes, DecoderTrap::Replace)
        .unwrap_or_else(|_| String::from_utf8_lossy(bytes).into_owned())
}

/// Trim a character set name and collapse inner whitespace runs,
/// so that sloppy spellings like `"ISO  2022 IR 144 "` still match.
fn normalize_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn charset_decoder(name: &str, cp1250_fix: bool) -> Option<EncodingRef> {
    if name.is_empty() {
        return Some(ISO_8859_1);
    }
    // legacy workaround: some Latin-2 region archives label
    // windows-1250 content as ISO_IR 100
    if cp1250_fix && name == "ISO_IR 100" {
        return encoding_from_whatwg_label("windows-1250");
    }
    if let Some((_, label)) = CHARSET_LABELS.iter().find(|(n, _)| *n == name) {
        return encoding_from_whatwg_label(label);
    }
    let upper = name.to_uppercase();
    if let Some((_, label)) = CHARSET_ALIASES.iter().find(|(n, _)| *n == upper) {
        return encoding_from_whatwg_label(label);
    }
    None
}

/// Build the coding system declared by a Specific Character Set element.
///
/// Unknown names never fail: they are logged and replaced with UTF-8.
/// One name is used for all three groups; two names leave the phonetic
/// group on the second; three names populate the triple in order.
pub fn parse_specific_character_set<S>(names: &[S], cp1250_fix: bool) -> CodingSystem
where
    S: AsRef<str>,
{
    let mut decoders = Vec::with_capacity(names.len());
    for name in names {
        let name = normalize_name(name.as_ref());
        debug!(charset = name.as_str(), "installing coding system");
        let decoder = charset_decoder(&name, cp1250_fix).unwrap_or_else(|| {
            warn!(
                charset = name.as_str(),
                "unknown character set, falling back to UTF-8"
            );
            UTF_8
        });
        decoders.push(decoder);
    }
    match decoders.as_slice() {
        [] => CodingSystem::default(),
        [single] => CodingSystem::single(*single),
        [a, b] => CodingSystem {
            alphabetic: *a,
            ideographic: *b,
            phonetic: *b,
        },
        [a, b, c, ..] => CodingSystem {
            alphabetic: *a,
            ideographic: *b,
            phonetic: *c,
        },
    }
}

/// Remove non-printable characters from a text value,
/// preserving spaces and tabs.
pub fn filter_non_printable(text: &str) -> String {
    text.chars()
        .filter(|&c| c == '\t' || !c.is_control())
        .collect()
}

/// Whether the text contains at least one code point from the
/// Cyrillic Unicode blocks.
pub fn contains_cyrillic(text: &str) -> bool {
    text.chars().any(|c| {
        matches!(c,
            '\u{0400}'..='\u{04FF}'     // Cyrillic
            | '\u{0500}'..='\u{052F}'   // Cyrillic Supplement
            | '\u{2DE0}'..='\u{2DFF}'   // Cyrillic Extended-A
            | '\u{A640}'..='\u{A69F}')  // Cyrillic Extended-B
    })
}

/// Recover the raw value bytes from a string produced by the default
/// (Latin-1) decode, which maps bytes to code points one-to-one.
/// Returns `None` if the text went through a real character set already.
fn latin1_bytes(text: &str) -> Option<Vec<u8>> {
    let mut raw = Vec::with_capacity(text.len());
    for c in text.chars() {
        let code = c as u32;
        if code > 0xFF {
            return None;
        }
        raw.push(code as u8);
    }
    Some(raw)
}

/// Whether a text value decoded without a declared character set looks
/// like mojibake: more than 20% of its code points read as replacement
/// characters under UTF-8 (plus, when `count_high_chars` is set, code
/// points in U+0080..=U+00FF, which also flags legitimate Latin-1 text
/// and is therefore opt-in).
pub fn contains_garbage(text: &str, count_high_chars: bool) -> bool {
    let raw = match latin1_bytes(text) {
        Some(raw) => raw,
        None => return false,
    };
    let mut garbage = 0usize;
    let mut total = 0usize;
    for c in String::from_utf8_lossy(&raw).chars() {
        total += 1;
        if c == '\u{FFFD}' {
            garbage += 1;
        } else if count_high_chars && ('\u{80}'..='\u{FF}').contains(&c) {
            garbage += 1;
        }
    }
    total > 0 && garbage * 5 > total
}

/// Attempt to reinterpret a suspicious text value under the known legacy
/// Cyrillic encodings, trying `default_encoding` first when given
/// (one of `"windows-1251"`, `"koi8-r"`, `"iso-8859-5"`, `"cp866"`).
/// The first candidate whose output contains Cyrillic wins.
pub fn detect_cyrillic(text: &str, default_encoding: Option<&str>) -> Option<String> {
    let raw = latin1_bytes(text)?;
    if std::str::from_utf8(&raw).is_ok() {
        // already proper text, nothing to re-interpret
        return None;
    }
    let candidates: [(&str, EncodingRef); 4] = [
        ("windows-1251", WINDOWS_1251),
        ("koi8-r", KOI8_R),
        ("iso-8859-5", ISO_8859_5),
        ("cp866", IBM866),
    ];
    let attempt = |encoding: EncodingRef| -> Option<String> {
        let decoded = encoding.decode(&raw, DecoderTrap::Replace).ok()?;
        if contains_cyrillic(&decoded) {
            Some(decoded)
        } else {
            None
        }
    };
    if let Some(name) = default_encoding {
        if let Some((_, encoding)) = candidates.iter().find(|(n, _)| *n == name) {
            if let Some(decoded) = attempt(*encoding) {
                return Some(decoded);
            }
        }
    }
    for (name, encoding) in candidates.iter() {
        if default_encoding == Some(*name) {
            continue;
        }
        if let Some(decoded) = attempt(*encoding) {
            return Some(decoded);
        }
    }
    None
}
