//! Length-prefixed frame codec (§4.A / §6).
//!
//! Wire format: `Kind(1B) || Length(4B BE) || Payload(Length B)`. The codec
//! performs zero interpretation of the payload -- it is purely a framing
//! concern. Kind validity is checked at decode time (an unknown byte is a
//! protocol error); kind *semantics* (is this frame legal in the current
//! state) is the Transfer Engine's job, not the codec's.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::TransportError;

/// Header is kind(1) + big-endian length(4).
const HEADER_LEN: usize = 5;

/// `payload_len` must never exceed 16 MiB -- enforced before any payload
/// buffer is allocated, so an adversarial oversized header cannot be used
/// to force a large allocation (§8 "oversize attack").
pub const MAX_PAYLOAD_LEN: u32 = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Message = 0x01,
    FileInfo = 0x02,
    FileData = 0x03,
    FileEnd = 0x04,
    Ping = 0x05,
    Pong = 0x06,
    Error = 0x07,
}

impl Kind {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(b: u8) -> Result<Self, TransportError> {
        match b {
            0x01 => Ok(Kind::Message),
            0x02 => Ok(Kind::FileInfo),
            0x03 => Ok(Kind::FileData),
            0x04 => Ok(Kind::FileEnd),
            0x05 => Ok(Kind::Ping),
            0x06 => Ok(Kind::Pong),
            0x07 => Ok(Kind::Error),
            other => Err(TransportError::protocol(format!("unknown frame kind 0x{other:02x}"))),
        }
    }
}

/// A decoded frame: a kind tag plus its raw payload.
#[derive(Debug, Clone)]
pub struct Frame {
    pub kind: Kind,
    pub payload: Bytes,
}

/// Encodes `payload` as a single frame. Returns an error if the caller
/// tries to encode more than [`MAX_PAYLOAD_LEN`] bytes, which would
/// produce a frame the peer is guaranteed to reject.
pub fn encode(kind: Kind, payload: &[u8]) -> Result<Bytes, TransportError> {
    if payload.len() as u64 > MAX_PAYLOAD_LEN as u64 {
        return Err(TransportError::protocol(format!(
            "payload of {} bytes exceeds max frame size {MAX_PAYLOAD_LEN}",
            payload.len()
        )));
    }
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    buf.extend_from_slice(&[kind.as_u8()]);
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(payload);
    Ok(buf.freeze())
}

/// Reads exactly one frame off `reader`: 5 header bytes, then exactly
/// `payload_len` body bytes. No deadline is applied here -- callers that
/// need timeouts or stall detection wrap this with [`crate::io::StreamIo`].
pub async fn decode_next<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Frame, TransportError> {
    let mut header = [0u8; HEADER_LEN];
    read_exact_or_eof(reader, &mut header).await?;

    let kind = Kind::from_u8(header[0])?;
    let payload_len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]);
    if payload_len > MAX_PAYLOAD_LEN {
        return Err(TransportError::protocol(format!(
            "payload_len {payload_len} exceeds max frame size {MAX_PAYLOAD_LEN}"
        )));
    }

    let mut payload = BytesMut::zeroed(payload_len as usize);
    read_exact_or_eof(reader, &mut payload).await?;
    Ok(Frame {
        kind,
        payload: payload.freeze(),
    })
}

async fn read_exact_or_eof<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> Result<(), TransportError> {
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(TransportError::UnexpectedEof),
        Err(e) => Err(TransportError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trip_preserves_kind_and_payload() {
        let payload = b"hello world";
        let encoded = encode(Kind::Message, payload).unwrap();
        let mut cursor = std::io::Cursor::new(encoded.to_vec());
        let frame = decode_next(&mut cursor).await.unwrap();
        assert_eq!(frame.kind.as_u8(), Kind::Message.as_u8());
        assert_eq!(&frame.payload[..], payload);
    }

    #[tokio::test]
    async fn empty_payload_round_trips() {
        let encoded = encode(Kind::Ping, &[]).unwrap();
        let mut cursor = std::io::Cursor::new(encoded.to_vec());
        let frame = decode_next(&mut cursor).await.unwrap();
        assert_eq!(frame.kind.as_u8(), Kind::Ping.as_u8());
        assert!(frame.payload.is_empty());
    }

    #[tokio::test]
    async fn unknown_kind_is_protocol_error() {
        let mut bytes = vec![0xFFu8];
        bytes.extend_from_slice(&0u32.to_be_bytes());
        let mut cursor = std::io::Cursor::new(bytes);
        let err = decode_next(&mut cursor).await.unwrap_err();
        assert!(matches!(err, TransportError::Protocol(_)));
    }

    #[tokio::test]
    async fn oversized_length_is_rejected_before_allocating_payload() {
        let mut bytes = vec![Kind::FileData.as_u8()];
        bytes.extend_from_slice(&(MAX_PAYLOAD_LEN + 1).to_be_bytes());
        // Deliberately do not append any payload bytes: if the decoder tried
        // to allocate and read the payload it would hang/EOF instead of
        // erroring immediately on the header.
        let mut cursor = std::io::Cursor::new(bytes);
        let err = decode_next(&mut cursor).await.unwrap_err();
        assert!(matches!(err, TransportError::Protocol(_)));
    }

    #[tokio::test]
    async fn short_read_mid_frame_is_unexpected_eof() {
        let mut bytes = vec![Kind::Message.as_u8()];
        bytes.extend_from_slice(&10u32.to_be_bytes());
        bytes.extend_from_slice(b"abc"); // promised 10 bytes, only 3 present
        let mut cursor = std::io::Cursor::new(bytes);
        let err = decode_next(&mut cursor).await.unwrap_err();
        assert!(matches!(err, TransportError::UnexpectedEof));
    }
}
