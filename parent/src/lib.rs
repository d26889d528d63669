//! This crate serves as a parent for the library crates of the dcmio
//! project, and offers the file-level convenience API.
//!
//! A DICOM Part 10 file is read into a [`DataSet`]: an ordered list of
//! decoded elements, meta group included. On parse errors the data set
//! holds everything decoded before the failure, returned together with
//! the error.
//!
//! ```no_run
//! use dcmio::{read_file, ReadOptions};
//!
//! let (data_set, error) = read_file("image.dcm", ReadOptions::new())?;
//! if let Some(error) = error {
//!     eprintln!("partial parse: {}", error);
//! }
//! if let Some(name) = data_set.find_by_name("PatientName") {
//!     println!("{:?}", name.value);
//! }
//! # Ok::<(), std::io::Error>(())
//! ```

pub use dcmio_core as core;
pub use dcmio_encoding as encoding;
pub use dcmio_parser as parser;

pub use dcmio_core::{
    tags, DataSet, Element, Length, PixelData, Tag, Value, ValueList, VR,
};
pub use dcmio_parser::dataset::read::Error as ReadError;
pub use dcmio_parser::dataset::write::Error as WriteError;
pub use dcmio_parser::{read_data_set, write_data_set, ReadOptions, WriteOptions, WriteWarning};

use snafu::{ResultExt, Snafu};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read};
use std::path::Path;

/// An error raised when writing a data set to a file.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum WriteFileError {
    /// The destination file could not be created or flushed.
    #[snafu(display("Could not write file"))]
    CreateFile {
        source: std::io::Error,
        backtrace: snafu::Backtrace,
    },
    /// The data set could not be serialized.
    #[snafu(display("Could not serialize data set"))]
    Serialize {
        #[snafu(backtrace)]
        source: WriteError,
    },
}

/// Read a data set from any byte source.
///
/// On parse error, the returned data set holds the parsable prefix of
/// the stream and the error describes where parsing first failed.
pub fn read_from<R: Read>(source: R, options: ReadOptions) -> (DataSet, Option<ReadError>) {
    read_data_set(source, options)
}

/// Read a data set from a byte slice.
pub fn read_bytes(data: &[u8], options: ReadOptions) -> (DataSet, Option<ReadError>) {
    read_data_set(data, options)
}

/// Read a data set from the file at the given path.
///
/// The outer result covers opening the file; the inner pair carries the
/// partial-parse contract of [`read_from`].
pub fn read_file<P: AsRef<Path>>(
    path: P,
    options: ReadOptions,
) -> std::io::Result<(DataSet, Option<ReadError>)> {
    let file = File::open(path)?;
    Ok(read_from(BufReader::new(file), options))
}

/// Serialize a data set into a byte vector, returning the bytes
/// together with the warnings collected while writing.
pub fn write_bytes(
    ds: &DataSet,
    options: &WriteOptions,
) -> Result<(Vec<u8>, Vec<WriteWarning>), WriteError> {
    let mut out = Vec::new();
    let warnings = write_data_set(&mut out, ds, options)?;
    Ok((out, warnings))
}

/// Write a data set to the file at the given path, clobbering any
/// existing contents.
pub fn write_file<P: AsRef<Path>>(
    path: P,
    ds: &DataSet,
    options: &WriteOptions,
) -> Result<Vec<WriteWarning>, WriteFileError> {
    let file = File::create(path).context(CreateFileSnafu)?;
    let mut dest = BufWriter::new(file);
    let warnings = write_data_set(&mut dest, ds, options).context(SerializeSnafu)?;
    dest.into_inner()
        .map_err(|e| e.into_error())
        .context(CreateFileSnafu)?;
    Ok(warnings)
}
