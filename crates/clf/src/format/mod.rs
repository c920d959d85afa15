use std::{
    fmt::Display,
    io::{Read, Write},
};

use thiserror::Error;

mod base_impl;
mod impl_entry;
mod packed_int;

pub use packed_int::PackedUint;

#[derive(Debug, Error)]
pub enum DataWriteError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Custom(String),
}

#[derive(Debug, Error)]
pub enum DataReadError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Custom(String),
}

impl DataReadError {
    pub fn custom(message: impl Display) -> Self {
        Self::Custom(message.to_string())
    }

    pub fn unsupported(
        ty: &str,
        latest: impl std::fmt::Debug,
        found: impl std::fmt::Debug,
    ) -> Self {
        Self::Custom(format!(
            "unsupported {ty} header: expected {latest:?}, found {found:?}"
        ))
    }
}

/// Convenience type for a [`DataFormat`]'s header.
pub type DataHeaderOf<T> = <T as DataFormat>::Header;

/// `DataFormat` is a versioned binary serialization for ledger and bucket
/// data.
///
/// A type's header carries the versions of the data that follows. The header
/// is written once per stream rather than once per value, so homogeneous
/// sequences stay compact and byte-deterministic.
pub trait DataFormat: Sized {
    type Header: DataFormat + Clone;
    const LATEST_HEADER: Self::Header;

    /// Write the latest header for this data
    fn write_header<W: Write>(&self, writer: &mut W) -> Result<usize, DataWriteError> {
        Self::LATEST_HEADER.write_data(writer)
    }

    /// Read the header for this data. Headers cannot themselves be
    /// versioned, so they are read with their own latest header.
    fn read_header<R: Read>(reader: &mut R) -> Result<Self::Header, DataReadError> {
        <Self::Header as DataFormat>::read_data(reader, &<Self::Header as DataFormat>::LATEST_HEADER)
    }

    /// Write the data to the writer, returning the number of bytes written
    fn write_data<W: Write>(&self, writer: &mut W) -> Result<usize, DataWriteError>;

    /// Read the data from the reader using a previously read header
    fn read_data<R: Read>(reader: &mut R, header: &Self::Header) -> Result<Self, DataReadError>;
}

/// Write a header, then the data
pub fn write_dataformat<W: Write, F: DataFormat>(
    writer: &mut W,
    data: &F,
) -> Result<usize, DataWriteError> {
    Ok(data.write_header(writer)? + data.write_data(writer)?)
}

/// Read a header, then the data it describes
pub fn read_dataformat<R: Read, F: DataFormat>(reader: &mut R) -> Result<F, DataReadError> {
    let header = F::read_header(reader)?;
    F::read_data(reader, &header)
}

pub trait DataFormatReader: Read {
    fn read_data<F: DataFormat>(&mut self, header: &F::Header) -> Result<F, DataReadError>;
}

impl<R: Read> DataFormatReader for R {
    fn read_data<F: DataFormat>(&mut self, header: &F::Header) -> Result<F, DataReadError> {
        F::read_data(self, header)
    }
}

pub trait DataFormatWriter: Write {
    fn write_data<F: DataFormat>(&mut self, data: &F) -> Result<usize, DataWriteError>;
}

impl<W: Write> DataFormatWriter for W {
    fn write_data<F: DataFormat>(&mut self, data: &F) -> Result<usize, DataWriteError> {
        data.write_data(self)
    }
}
