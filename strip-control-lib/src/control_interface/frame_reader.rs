use std::io;
use std::time::Duration;

use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::packet::response::ResponseKind;

/// Cuts the inbound byte stream into response frames.
///
/// Frames carry no length field: the two byte prefix is looked up in the response
/// table to learn how many bytes follow.
pub struct FrameReader<R> {
    inner: R,
    io_timeout: Duration,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// `io_timeout` bounds the wait for the rest of a frame once its first byte arrived.
    /// Waiting for the first byte is unbounded, an idle connection is not an error.
    pub fn new(inner: R, io_timeout: Duration) -> Self {
        FrameReader { inner, io_timeout }
    }

    /// Reads exactly one frame and returns its raw bytes together with its kind.
    ///
    /// A closed peer yields [`Error::ConnectionClosed`]; an unknown prefix yields
    /// [`Error::UnknownResponseType`] after which the stream is out of step and must
    /// not be read further.
    pub async fn read_frame(&mut self) -> Result<(ResponseKind, Vec<u8>)> {
        let mut prefix = [0u8; 2];
        self.fill(&mut prefix[..1]).await?;
        self.fill_within_timeout(&mut prefix[1..]).await?;

        let kind = ResponseKind::from_prefix(prefix)?;
        let mut frame = vec![0u8; kind.frame_len()];
        frame[..2].copy_from_slice(&prefix);
        self.fill_within_timeout(&mut frame[2..]).await?;

        debug!("Received {:?} frame: {}", kind, hex::encode(&frame));
        Ok((kind, frame))
    }

    async fn fill_within_timeout(&mut self, buf: &mut [u8]) -> Result<()> {
        let io_timeout = self.io_timeout;
        match timeout(io_timeout, self.fill(buf)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Connection(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("Incomplete frame after {:?}", io_timeout),
            ))),
        }
    }

    /// Keeps reading until `buf` is full; a single read may return fewer bytes.
    async fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut received = 0;
        while received < buf.len() {
            let n = self.inner.read(&mut buf[received..]).await?;
            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
            received += n;
        }
        Ok(())
    }
}
