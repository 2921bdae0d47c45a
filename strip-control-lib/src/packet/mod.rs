//! Binary packet codec.
//!
//! Every frame is a fixed sequence of unsigned bytes terminated by a checksum,
//! which is the sum of all preceding bytes modulo 256. Requests are built in
//! [`request`], responses are decoded in [`response`].

pub mod request;
pub mod response;

/// Marks a request as coming from the local network rather than the vendor's cloud app.
pub const LOCALITY_LOCAL: u8 = 0x0F;

/// Computes the checksum over `fields`.
pub fn checksum(fields: &[u8]) -> u8 {
    fields.iter().fold(0u8, |sum, &b| sum.wrapping_add(b))
}

/// Checks the trailing checksum byte of a complete frame.
pub fn validate(frame: &[u8]) -> bool {
    match frame.split_last() {
        Some((&last, fields)) => checksum(fields) == last,
        None => false,
    }
}
