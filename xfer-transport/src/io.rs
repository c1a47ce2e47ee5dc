//! Exact-byte stream I/O over a reliable socket (§4.B): deadline-bound
//! control-frame operations, stall-detected payload operations, and an
//! idempotent close.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::TransportError;
use crate::frame::{self, Frame, Kind};

/// Default deadline for control frames (`MESSAGE`, `FILE_INFO`, `FILE_END`,
/// `PING`/`PONG`, `ERROR`).
pub const DEFAULT_CONTROL_DEADLINE: Duration = Duration::from_secs(30);
/// Default deadline for lack of *any* byte progress on a payload transfer.
pub const DEFAULT_STALL_DEADLINE: Duration = Duration::from_secs(60);

/// Wraps a duplex byte stream with the timeout/stall semantics the
/// Transfer Engine needs. Owns nothing about framing beyond delegating to
/// [`crate::frame`]; `StreamIo` is the layer that knows *when* to give up.
pub struct StreamIo<S> {
    inner: S,
    control_deadline: Duration,
    stall_deadline: Duration,
    closed: bool,
}

impl<S: AsyncRead + AsyncWrite + Unpin> StreamIo<S> {
    pub fn new(inner: S) -> Self {
        Self::with_deadlines(inner, DEFAULT_CONTROL_DEADLINE, DEFAULT_STALL_DEADLINE)
    }

    pub fn with_deadlines(inner: S, control_deadline: Duration, stall_deadline: Duration) -> Self {
        StreamIo {
            inner,
            control_deadline,
            stall_deadline,
            closed: false,
        }
    }

    /// Reads exactly `n` bytes within `control_deadline`.
    pub async fn read_exact(&mut self, n: usize) -> Result<Vec<u8>, TransportError> {
        let mut buf = vec![0u8; n];
        match tokio::time::timeout(self.control_deadline, self.inner.read_exact(&mut buf)).await {
            Ok(Ok(_)) => Ok(buf),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(TransportError::UnexpectedEof),
            Ok(Err(e)) => Err(TransportError::Io(e)),
            Err(_) => Err(TransportError::Timeout(self.control_deadline)),
        }
    }

    /// Writes the full buffer, retrying on short writes, bound by
    /// `control_deadline`.
    pub async fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        match tokio::time::timeout(self.control_deadline, self.inner.write_all(bytes)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(TransportError::Io(e)),
            Err(_) => Err(TransportError::Timeout(self.control_deadline)),
        }
    }

    /// Reads one frame. Control-kind frames (anything but `FILE_DATA`) use
    /// `control_deadline` end to end; `FILE_DATA` payloads are unbounded in
    /// total duration but stall-detected: the deadline resets on every
    /// successful partial read.
    pub async fn read_frame(&mut self) -> Result<Frame, TransportError> {
        let header = self.read_header().await?;
        let kind = Kind::from_u8(header[0])?;
        let payload_len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]);
        if payload_len > frame::MAX_PAYLOAD_LEN {
            return Err(TransportError::protocol(format!(
                "payload_len {payload_len} exceeds max frame size {}",
                frame::MAX_PAYLOAD_LEN
            )));
        }
        let mut payload = vec![0u8; payload_len as usize];
        if kind == Kind::FileData {
            self.read_stalling(&mut payload).await?;
        } else {
            self.read_within_deadline(&mut payload, self.control_deadline).await?;
        }
        Ok(Frame {
            kind,
            payload: payload.into(),
        })
    }

    /// Writes a frame. `FILE_DATA` payload bytes are written under stall
    /// detection; everything else (small control payloads) uses the
    /// control deadline.
    pub async fn write_frame(&mut self, kind: Kind, payload: &[u8]) -> Result<(), TransportError> {
        if payload.len() as u64 > frame::MAX_PAYLOAD_LEN as u64 {
            return Err(TransportError::protocol(format!(
                "payload of {} bytes exceeds max frame size {}",
                payload.len(),
                frame::MAX_PAYLOAD_LEN
            )));
        }
        let mut header = [0u8; 5];
        header[0] = kind.as_u8();
        header[1..5].copy_from_slice(&(payload.len() as u32).to_be_bytes());
        self.write_within_deadline(&header, self.control_deadline).await?;
        if kind == Kind::FileData {
            self.write_stalling(payload).await
        } else {
            self.write_within_deadline(payload, self.control_deadline).await
        }
    }

    async fn read_header(&mut self) -> Result<[u8; 5], TransportError> {
        let mut header = [0u8; 5];
        self.read_within_deadline(&mut header, self.control_deadline).await?;
        Ok(header)
    }

    async fn read_within_deadline(&mut self, buf: &mut [u8], deadline: Duration) -> Result<(), TransportError> {
        match tokio::time::timeout(deadline, self.inner.read_exact(buf)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(TransportError::UnexpectedEof),
            Ok(Err(e)) => Err(TransportError::Io(e)),
            Err(_) => Err(TransportError::Timeout(deadline)),
        }
    }

    async fn write_within_deadline(&mut self, buf: &[u8], deadline: Duration) -> Result<(), TransportError> {
        match tokio::time::timeout(deadline, self.inner.write_all(buf)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(TransportError::Io(e)),
            Err(_) => Err(TransportError::Timeout(deadline)),
        }
    }

    /// Reads `buf.len()` bytes, resetting the stall timer on every
    /// successful partial read rather than bounding total duration.
    async fn read_stalling(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        let mut read = 0;
        while read < buf.len() {
            let n = match tokio::time::timeout(self.stall_deadline, self.inner.read(&mut buf[read..])).await {
                Ok(Ok(n)) => n,
                Ok(Err(e)) => return Err(TransportError::Io(e)),
                Err(_) => return Err(TransportError::Stalled(self.stall_deadline)),
            };
            if n == 0 {
                return Err(TransportError::UnexpectedEof);
            }
            read += n;
        }
        Ok(())
    }

    /// Writes `buf` in full, resetting the stall timer on every
    /// successful partial write.
    async fn write_stalling(&mut self, buf: &[u8]) -> Result<(), TransportError> {
        let mut written = 0;
        while written < buf.len() {
            let n = match tokio::time::timeout(self.stall_deadline, self.inner.write(&buf[written..])).await {
                Ok(Ok(n)) => n,
                Ok(Err(e)) => return Err(TransportError::Io(e)),
                Err(_) => return Err(TransportError::Stalled(self.stall_deadline)),
            };
            if n == 0 {
                return Err(TransportError::UnexpectedEof);
            }
            written += n;
        }
        Ok(())
    }

    /// Idempotent close: a second call, or a call after the peer has
    /// already gone away, is swallowed rather than propagated.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.inner.shutdown().await;
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}
