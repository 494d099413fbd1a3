//! Wire format for the game server: a fixed 16-byte header followed by a
//! variable-length payload, read and written directly on a [`tokio`] stream
//! half. Mirrors the byte layout of the original C protocol this server's
//! behavior is grounded on.

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size in bytes of the fixed frame header.
pub const HEADER_LEN: usize = 16;

/// Request packet types (client -> server) plus reply and notification
/// types (server -> client). Kept in one module since the dispatcher
/// matches on them all from a single byte.
pub mod packet_type {
    pub const LOGIN: u8 = 0;
    pub const USERS: u8 = 1;
    pub const INVITE: u8 = 2;
    pub const REVOKE: u8 = 3;
    pub const DECLINE: u8 = 4;
    pub const ACCEPT: u8 = 5;
    pub const MOVE: u8 = 6;
    pub const RESIGN: u8 = 7;

    pub const ACK: u8 = 8;
    pub const NACK: u8 = 9;

    pub const INVITED: u8 = 10;
    pub const REVOKED: u8 = 11;
    pub const DECLINED: u8 = 12;
    pub const ACCEPTED: u8 = 13;
    pub const MOVED: u8 = 14;
    pub const RESIGNED: u8 = 15;
    pub const ENDED: u8 = 16;
}

/// Role byte carried in the header, identifying which side of a game a
/// notification concerns.
pub mod role {
    pub const NONE: u8 = 0;
    pub const FIRST_PLAYER: u8 = 1;
    pub const SECOND_PLAYER: u8 = 2;
}

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("connection closed")]
    Eof,
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// The fixed-size portion of a frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameHeader {
    pub packet_type: u8,
    pub id: u8,
    pub role: u8,
    pub size: u16,
    pub timestamp_sec: u32,
    pub timestamp_nsec: u32,
}

impl FrameHeader {
    fn encode(&self, buf: &mut [u8; HEADER_LEN]) {
        buf[0] = self.packet_type;
        buf[1] = self.id;
        buf[2] = self.role;
        buf[3..5].copy_from_slice(&self.size.to_be_bytes());
        buf[5..9].copy_from_slice(&self.timestamp_sec.to_be_bytes());
        buf[9..13].copy_from_slice(&self.timestamp_nsec.to_be_bytes());
        buf[13..16].copy_from_slice(&[0, 0, 0]);
    }

    fn decode(buf: &[u8; HEADER_LEN]) -> Self {
        FrameHeader {
            packet_type: buf[0],
            id: buf[1],
            role: buf[2],
            size: u16::from_be_bytes([buf[3], buf[4]]),
            timestamp_sec: u32::from_be_bytes([buf[5], buf[6], buf[7], buf[8]]),
            timestamp_nsec: u32::from_be_bytes([buf[9], buf[10], buf[11], buf[12]]),
        }
    }
}

/// A complete decoded frame. The internal buffer always carries one
/// trailing NUL byte beyond `header.size`, matching the original decoder's
/// behavior of terminating the payload buffer so that textual payloads can
/// be treated as C strings; [`Frame::payload`] hides that extra byte from
/// callers that only want the real payload bytes.
#[derive(Debug, Clone)]
pub struct Frame {
    pub header: FrameHeader,
    payload: Vec<u8>,
}

impl Frame {
    pub fn new(packet_type: u8, id: u8, role: u8, payload: Vec<u8>) -> Self {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        let header = FrameHeader {
            packet_type,
            id,
            role,
            size: payload.len() as u16,
            timestamp_sec: now.as_secs() as u32,
            timestamp_nsec: now.subsec_nanos(),
        };
        let mut buf = payload;
        buf.push(0);
        Frame { header, payload: buf }
    }

    pub fn empty(packet_type: u8, id: u8, role: u8) -> Self {
        Frame::new(packet_type, id, role, Vec::new())
    }

    pub fn text(packet_type: u8, id: u8, role: u8, text: impl Into<String>) -> Self {
        Frame::new(packet_type, id, role, text.into().into_bytes())
    }

    /// Payload bytes, excluding the trailing NUL terminator.
    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.payload.len() - 1]
    }

    pub fn payload_len(&self) -> usize {
        self.payload.len() - 1
    }

    /// Interprets the payload as UTF-8 text, lossily. Used for LOGIN/INVITE
    /// (username payloads) and MOVE (move-text payloads).
    pub fn payload_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(self.payload())
    }
}

/// Reads one complete frame from `reader`. Returns [`ProtoError::Eof`] if
/// the connection is closed cleanly before any header bytes arrive.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Frame, ProtoError> {
    let mut header_buf = [0u8; HEADER_LEN];
    let n = read_fill_or_eof(reader, &mut header_buf).await?;
    if n == 0 {
        return Err(ProtoError::Eof);
    }
    if n < HEADER_LEN {
        return Err(ProtoError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "short header",
        )));
    }
    let header = FrameHeader::decode(&header_buf);

    let mut payload = vec![0u8; header.size as usize + 1];
    if header.size > 0 {
        reader.read_exact(&mut payload[..header.size as usize]).await?;
    }
    // payload[header.size as usize] stays 0, serving as the NUL terminator.

    tracing::trace!(
        packet_type = header.packet_type,
        id = header.id,
        size = header.size,
        "received frame"
    );
    Ok(Frame { header, payload })
}

async fn read_fill_or_eof<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
) -> Result<usize, std::io::Error> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &Frame,
) -> Result<(), ProtoError> {
    let mut header_buf = [0u8; HEADER_LEN];
    frame.header.encode(&mut header_buf);
    writer.write_all(&header_buf).await?;
    if frame.header.size > 0 {
        writer.write_all(frame.payload()).await?;
    }
    writer.flush().await?;
    tracing::trace!(
        packet_type = frame.header.packet_type,
        id = frame.header.id,
        size = frame.header.size,
        "sent frame"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_text_frame() {
        let sent = Frame::text(packet_type::LOGIN, 0, role::NONE, "alice");
        let mut buf = Vec::new();
        write_frame(&mut buf, &sent).await.unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let got = read_frame(&mut cursor).await.unwrap();

        assert_eq!(got.header.packet_type, packet_type::LOGIN);
        assert_eq!(got.payload_str(), "alice");
    }

    #[tokio::test]
    async fn empty_payload_round_trips() {
        let sent = Frame::empty(packet_type::ACK, 3, role::FIRST_PLAYER);
        let mut buf = Vec::new();
        write_frame(&mut buf, &sent).await.unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let got = read_frame(&mut cursor).await.unwrap();
        assert_eq!(got.payload_len(), 0);
        assert_eq!(got.header.id, 3);
    }

    #[tokio::test]
    async fn eof_before_header_is_reported() {
        let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
        let err = read_frame(&mut cursor).await.unwrap_err();
        assert!(matches!(err, ProtoError::Eof));
    }
}
