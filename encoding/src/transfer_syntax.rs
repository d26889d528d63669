//! The transfer syntax registry: maps a transfer syntax UID to the byte
//! order and VR encoding mode used by the data set body.
//!
//! Encapsulated pixel data syntaxes (JPEG families, JPEG 2000, RLE)
//! parse like Explicit VR Little Endian; their compressed frame contents
//! are routed through the codec as opaque byte payloads.

use byteordered::Endianness;
use snafu::{Backtrace, Snafu};

/// Implicit VR Little Endian: the default transfer syntax.
pub const IMPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2";
/// Explicit VR Little Endian.
pub const EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1";
/// Deflated Explicit VR Little Endian.
pub const DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1.99";
/// Explicit VR Big Endian (retired).
pub const EXPLICIT_VR_BIG_ENDIAN: &str = "1.2.840.10008.1.2.2";
/// RLE Lossless.
pub const RLE_LOSSLESS: &str = "1.2.840.10008.1.2.5";

/// An error raised when resolving a transfer syntax UID.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// The UID is not known to this registry.
    #[snafu(display("Unsupported transfer syntax \"{}\"", uid))]
    UnsupportedTransferSyntax { uid: String, backtrace: Backtrace },
    /// Deflated streams require inflation before parsing,
    /// which this codec does not perform.
    #[snafu(display("Deflated transfer syntax \"{}\" is not supported", uid))]
    DeflatedTransferSyntax { uid: String, backtrace: Backtrace },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Whether data element headers carry their VR on the wire.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum VrMode {
    /// The VR is looked up from the data dictionary.
    Implicit,
    /// The VR is present in each element header.
    Explicit,
}

/// A transfer syntax descriptor.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TransferSyntax {
    /// The unique identifier of the transfer syntax.
    pub uid: &'static str,
    /// The syntax name, as in the standard's registry.
    pub name: &'static str,
    /// The byte order of the data set body.
    pub endianness: Endianness,
    /// The VR encoding mode of the data set body.
    pub vr_mode: VrMode,
}

const REGISTRY: &[TransferSyntax] = &[
    TransferSyntax {
        uid: IMPLICIT_VR_LITTLE_ENDIAN,
        name: "Implicit VR Little Endian",
        endianness: Endianness::Little,
        vr_mode: VrMode::Implicit,
    },
    TransferSyntax {
        uid: EXPLICIT_VR_LITTLE_ENDIAN,
        name: "Explicit VR Little Endian",
        endianness: Endianness::Little,
        vr_mode: VrMode::Explicit,
    },
    TransferSyntax {
        uid: EXPLICIT_VR_BIG_ENDIAN,
        name: "Explicit VR Big Endian",
        endianness: Endianness::Big,
        vr_mode: VrMode::Explicit,
    },
    TransferSyntax {
        uid: "1.2.840.10008.1.2.4.50",
        name: "JPEG Baseline (Process 1)",
        endianness: Endianness::Little,
        vr_mode: VrMode::Explicit,
    },
    TransferSyntax {
        uid: "1.2.840.10008.1.2.4.51",
        name: "JPEG Extended (Process 2 & 4)",
        endianness: Endianness::Little,
        vr_mode: VrMode::Explicit,
    },
    TransferSyntax {
        uid: "1.2.840.10008.1.2.4.57",
        name: "JPEG Lossless, Non-Hierarchical (Process 14)",
        endianness: Endianness::Little,
        vr_mode: VrMode::Explicit,
    },
    TransferSyntax {
        uid: "1.2.840.10008.1.2.4.70",
        name: "JPEG Lossless, Non-Hierarchical, First-Order Prediction",
        endianness: Endianness::Little,
        vr_mode: VrMode::Explicit,
    },
    TransferSyntax {
        uid: "1.2.840.10008.1.2.4.80",
        name: "JPEG-LS Lossless",
        endianness: Endianness::Little,
        vr_mode: VrMode::Explicit,
    },
    TransferSyntax {
        uid: "1.2.840.10008.1.2.4.81",
        name: "JPEG-LS Lossy (Near-Lossless)",
        endianness: Endianness::Little,
        vr_mode: VrMode::Explicit,
    },
    TransferSyntax {
        uid: "1.2.840.10008.1.2.4.90",
        name: "JPEG 2000 (Lossless Only)",
        endianness: Endianness::Little,
        vr_mode: VrMode::Explicit,
    },
    TransferSyntax {
        uid: "1.2.840.10008.1.2.4.91",
        name: "JPEG 2000",
        endianness: Endianness::Little,
        vr_mode: VrMode::Explicit,
    },
    TransferSyntax {
        uid: RLE_LOSSLESS,
        name: "RLE Lossless",
        endianness: Endianness::Little,
        vr_mode: VrMode::Explicit,
    },
];

/// Look up a transfer syntax descriptor by UID.
/// Trailing padding in the UID value is ignored.
pub fn lookup(uid: &str) -> Option<&'static TransferSyntax> {
    let uid = trim_uid(uid);
    REGISTRY.iter().find(|ts| ts.uid == uid)
}

/// Resolve the byte order and VR mode for a data set body encoded under
/// the given transfer syntax UID.
///
/// Encapsulated syntaxes absent from the registry (private or newer
/// members of the JPEG family) still resolve to Explicit VR Little
/// Endian; deflated and wholly unknown UIDs are errors.
pub fn decoding_parameters(uid: &str) -> Result<(Endianness, VrMode)> {
    let uid = trim_uid(uid);
    if uid == DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN {
        return DeflatedTransferSyntaxSnafu { uid }.fail();
    }
    if let Some(ts) = lookup(uid) {
        return Ok((ts.endianness, ts.vr_mode));
    }
    if uid.starts_with("1.2.840.10008.1.2.4.") {
        return Ok((Endianness::Little, VrMode::Explicit));
    }
    UnsupportedTransferSyntaxSnafu { uid }.fail()
}

fn trim_uid(uid: &str) -> &str {
    uid.trim_end_matches(|c| c == '\0' || c == ' ')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_syntaxes() {
        assert_eq!(
            decoding_parameters("1.2.840.10008.1.2").unwrap(),
            (Endianness::Little, VrMode::Implicit)
        );
        assert_eq!(
            decoding_parameters("1.2.840.10008.1.2.1").unwrap(),
            (Endianness::Little, VrMode::Explicit)
        );
        assert_eq!(
            decoding_parameters("1.2.840.10008.1.2.2").unwrap(),
            (Endianness::Big, VrMode::Explicit)
        );
    }

    #[test]
    fn uid_padding_is_ignored() {
        assert!(decoding_parameters("1.2.840.10008.1.2.1\0").is_ok());
        assert!(decoding_parameters("1.2.840.10008.1.2.1 ").is_ok());
    }

    #[test]
    fn encapsulated_syntaxes_parse_as_explicit_le() {
        assert_eq!(
            decoding_parameters("1.2.840.10008.1.2.4.70").unwrap(),
            (Endianness::Little, VrMode::Explicit)
        );
        assert_eq!(
            decoding_parameters("1.2.840.10008.1.2.5").unwrap(),
            (Endianness::Little, VrMode::Explicit)
        );
        // a JPEG family member missing from the registry still routes
        assert_eq!(
            decoding_parameters("1.2.840.10008.1.2.4.201").unwrap(),
            (Endianness::Little, VrMode::Explicit)
        );
    }

    #[test]
    fn unknown_and_deflated_are_errors() {
        assert!(matches!(
            decoding_parameters("1.2.3.4"),
            Err(Error::UnsupportedTransferSyntax { .. })
        ));
        assert!(matches!(
            decoding_parameters("1.2.840.10008.1.2.1.99"),
            Err(Error::DeflatedTransferSyntax { .. })
        ));
    }

    #[test]
    fn registry_lookup() {
        let ts = lookup("1.2.840.10008.1.2.2").unwrap();
        assert_eq!(ts.name, "Explicit VR Big Endian");
        assert!(lookup("9.9.9").is_none());
    }
}
