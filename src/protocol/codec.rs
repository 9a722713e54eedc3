//! SSH Agent protocol codec for tokio

use crate::error::{Error, Result};
use crate::protocol::message::MAX_MESSAGE_SIZE;
use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// What a frame's length prefix allows the reader to do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLength {
    /// Zero length; no body follows
    Empty,
    /// Above [`MAX_MESSAGE_SIZE`]; the body is not read
    Oversized(u32),
    /// Body of this many bytes follows
    Body(u32),
}

impl FrameLength {
    pub fn of(len: u32) -> Self {
        match len {
            0 => FrameLength::Empty,
            n if n > MAX_MESSAGE_SIZE => FrameLength::Oversized(n),
            n => FrameLength::Body(n),
        }
    }
}

/// Codec for reading and writing SSH agent messages
pub struct AgentCodec;

impl AgentCodec {
    /// Read the 4-byte length prefix. `Ok(None)` on a clean EOF.
    pub async fn read_length<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<u32>> {
        let mut len_buf = [0u8; 4];
        match reader.read_exact(&mut len_buf).await {
            Ok(_) => Ok(Some(u32::from_be_bytes(len_buf))),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Read a `len`-byte body and return it framed with its length prefix
    pub async fn read_body<R: AsyncRead + Unpin>(reader: &mut R, len: u32) -> Result<Bytes> {
        let mut frame = BytesMut::with_capacity(4 + len as usize);
        frame.put_u32(len);
        frame.resize(4 + len as usize, 0);
        reader.read_exact(&mut frame[4..]).await?;
        Ok(frame.freeze())
    }

    /// Read one complete frame (length prefix included) from an async reader.
    ///
    /// Returns `Ok(None)` on a clean EOF before the length prefix.
    pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Bytes>> {
        let Some(len) = Self::read_length(reader).await? else {
            return Ok(None);
        };
        match FrameLength::of(len) {
            FrameLength::Empty => Err(Error::Framing("Zero-length message".to_string())),
            FrameLength::Oversized(n) => {
                Err(Error::Framing(format!("Message too large: {} bytes", n)))
            }
            FrameLength::Body(n) => Ok(Some(Self::read_body(reader, n).await?)),
        }
    }

    /// Write an already framed message
    pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &[u8]) -> Result<()> {
        writer.write_all(frame).await?;
        writer.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{AgentMessage, MessageType};

    #[test]
    fn test_frame_length_classes() {
        assert_eq!(FrameLength::of(0), FrameLength::Empty);
        assert_eq!(FrameLength::of(1), FrameLength::Body(1));
        assert_eq!(
            FrameLength::of(MAX_MESSAGE_SIZE),
            FrameLength::Body(MAX_MESSAGE_SIZE)
        );
        assert_eq!(
            FrameLength::of(MAX_MESSAGE_SIZE + 1),
            FrameLength::Oversized(MAX_MESSAGE_SIZE + 1)
        );
    }

    #[tokio::test]
    async fn test_read_frame_roundtrip() {
        let msg = AgentMessage::new(MessageType::Unlock, Bytes::from_static(b"\0\0\0\x01x"));
        let encoded = msg.encode();
        let mut reader = &encoded[..];

        let frame = AgentCodec::read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(frame, encoded);
        assert!(AgentCodec::read_frame(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_zero_length() {
        let data = [0u8, 0, 0, 0];
        let mut reader = &data[..];
        let result = AgentCodec::read_frame(&mut reader).await;
        assert!(matches!(result, Err(Error::Framing(_))));
    }

    #[tokio::test]
    async fn test_read_oversized() {
        let data = (MAX_MESSAGE_SIZE + 1).to_be_bytes();
        let mut reader = &data[..];
        let err = AgentCodec::read_frame(&mut reader).await.unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[tokio::test]
    async fn test_read_truncated_body() {
        let data = [0u8, 0, 0, 5, 11];
        let mut reader = &data[..];
        let result = AgentCodec::read_frame(&mut reader).await;
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn test_write_frame() {
        let mut out = Vec::new();
        AgentCodec::write_frame(&mut out, &AgentMessage::success().encode())
            .await
            .unwrap();
        assert_eq!(out, vec![0, 0, 0, 1, 6]);
    }
}
