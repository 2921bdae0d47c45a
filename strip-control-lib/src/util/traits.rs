use bytes::{BufMut, BytesMut};

use crate::error::{Error, Result};
use crate::packet::{checksum, validate};

/// A fixed-length frame on the wire.
///
/// Implementors only describe their fields in order; the trailing checksum byte
/// is appended and verified here so every frame kind follows the same invariant.
pub trait WireFrame: Sized {
    /// Total length of the frame, checksum byte included.
    const LENGTH: usize;

    /// Writes every field except the checksum, in wire order.
    fn write_fields(&self, buf: &mut BytesMut);

    /// Reads the fields from a frame whose length and checksum were already verified.
    /// `bytes` holds the complete frame.
    fn read_fields(bytes: &[u8]) -> Self;

    /// Encodes the frame and appends its checksum.
    fn to_frame(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(Self::LENGTH);
        self.write_fields(&mut buf);
        debug_assert_eq!(buf.len() + 1, Self::LENGTH);
        let sum = checksum(&buf);
        buf.put_u8(sum);
        buf.to_vec()
    }

    /// Decodes a complete frame, rejecting wrong lengths and bad checksums.
    fn from_frame(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::LENGTH {
            return Err(Error::InvalidLength {
                expected: Self::LENGTH,
                actual: bytes.len(),
            });
        }
        if !validate(bytes) {
            let (fields, actual) = bytes.split_at(bytes.len() - 1);
            return Err(Error::ChecksumMismatch {
                expected: checksum(fields),
                actual: actual[0],
            });
        }
        Ok(Self::read_fields(bytes))
    }
}
