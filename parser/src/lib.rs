//! This crate provides the reading and writing machinery of the `dcmio`
//! project: stateful decoders and encoders which track the transfer
//! syntax stack and the installed character set, the data set reader
//! and writer, and the file meta group codec.

pub mod dataset;
pub mod meta;
pub mod stateful;

pub use crate::dataset::read::{read_data_set, DataSetReader};
pub use crate::dataset::write::{write_data_set, WriteWarning};
pub use crate::dataset::{ReadOptions, WriteOptions};
