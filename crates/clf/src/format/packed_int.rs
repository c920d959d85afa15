use std::io::{Read, Write};

use super::{DataFormat, DataReadError, DataWriteError};

/// Variable-length unsigned integer used for lengths and counts: one byte
/// for the number of significant little-endian bytes, then those bytes.
pub struct PackedUint(pub u64);

impl From<PackedUint> for usize {
    fn from(value: PackedUint) -> Self {
        value.0 as usize
    }
}

impl From<usize> for PackedUint {
    fn from(value: usize) -> Self {
        PackedUint(value as u64)
    }
}

impl DataFormat for PackedUint {
    type Header = ();
    const LATEST_HEADER: Self::Header = ();

    fn write_data<W: Write>(&self, writer: &mut W) -> Result<usize, DataWriteError> {
        let zeroes = self.0.leading_zeros();
        let num_bytes = 8u8.saturating_sub((zeroes / 8) as u8);

        writer.write_all(&[num_bytes])?;
        writer.write_all(&self.0.to_le_bytes()[..num_bytes as usize])?;
        Ok(1 + num_bytes as usize)
    }

    fn read_data<R: Read>(reader: &mut R, _header: &Self::Header) -> Result<Self, DataReadError> {
        let mut num_bytes = [0u8; 1];
        reader.read_exact(&mut num_bytes)?;

        if num_bytes[0] > 8 {
            return Err(DataReadError::Custom(format!(
                "PackedUint length {} is greater than 8",
                num_bytes[0]
            )));
        }

        let mut bytes = [0u8; 8];
        reader.read_exact(&mut bytes[..num_bytes[0] as usize])?;
        Ok(PackedUint(u64::from_le_bytes(bytes)))
    }
}
