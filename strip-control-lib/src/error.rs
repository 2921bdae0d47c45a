//! Error types for the library.

use std::time::Duration;

use thiserror::Error;

use crate::packet::response::ResponseKind;

/// Result type alias for the library.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to a controller.
#[derive(Error, Debug)]
pub enum Error {
    /// A parameter was out of range. Raised before any I/O happens.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The trailing checksum byte of a frame does not match the sum of the other bytes.
    #[error("Checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    /// The two byte prefix of an inbound frame is not in the response table.
    /// The byte stream has to be considered desynchronized.
    #[error("Unknown response type: ({0}, {1})")]
    UnknownResponseType(u8, u8),

    /// A frame did not have the fixed length of its kind.
    #[error("Invalid frame length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Socket level failure.
    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// The peer closed the connection.
    #[error("Connection closed by peer")]
    ConnectionClosed,

    /// A request was issued without an open socket.
    #[error("Not connected")]
    NotConnected,

    /// The registry handed back a response of another kind than awaited.
    #[error("Expected {expected:?} response, got {actual:?}")]
    UnexpectedResponse {
        expected: ResponseKind,
        actual: Option<ResponseKind>,
    },

    /// No response of the expected kind arrived in time.
    #[error("Expected response of type {kind:?} was not received within {elapsed:?}")]
    ResponseTimeout { kind: ResponseKind, elapsed: Duration },
}

impl Error {
    /// Whether the error comes from the transport and the request may be retried on a fresh socket.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Connection(_) | Error::ConnectionClosed | Error::NotConnected
        )
    }

    /// Whether the inbound byte stream can no longer be trusted and the socket must be replaced.
    pub fn is_desync(&self) -> bool {
        matches!(
            self,
            Error::UnknownResponseType(..) | Error::ConnectionClosed | Error::Connection(_)
        )
    }
}
