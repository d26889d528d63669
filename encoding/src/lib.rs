//! This crate provides the encoding layer of the `dcmio` project:
//! endianness-switched primitive value decoders and encoders, the
//! character set registry which turns raw bytes into text, and the
//! transfer syntax registry which maps UIDs to decoding parameters.

pub mod decode;
pub mod encode;
pub mod text;
pub mod transfer_syntax;

pub use byteordered::Endianness;
pub use crate::decode::basic::BasicDecoder;
pub use crate::decode::BasicDecode;
pub use crate::encode::basic::BasicEncoder;
pub use crate::encode::BasicEncode;
pub use crate::text::CodingSystem;
pub use crate::transfer_syntax::{TransferSyntax, VrMode};
