//! Stateful decoding and encoding abstractions, which keep track of the
//! current transfer syntax frame and the installed coding system.

pub mod decode;
pub mod encode;
