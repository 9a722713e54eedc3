//! Length-prefixed binary encoding used by the agent protocol
//!
//! All integers are big-endian. A "blob" is a `uint32` length followed by
//! that many bytes; strings are blobs holding text. Big integers come in two
//! flavours: the SSH-2 `mpint` (a blob holding a two's-complement magnitude)
//! and the SSH-1 form (`uint16` bit count followed by the magnitude).

use crate::error::{Error, Result};
use crate::protocol::message::{MAX_MESSAGE_SIZE, MessageType};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Strip leading zero bytes from a big-endian magnitude
pub fn trim_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

/// Number of significant bits in a big-endian magnitude
pub fn bit_length(bytes: &[u8]) -> u32 {
    let trimmed = trim_leading_zeros(bytes);
    match trimmed.first() {
        Some(&first) => (trimmed.len() as u32 - 1) * 8 + (8 - first.leading_zeros()),
        None => 0,
    }
}

/// Builder for agent messages and key blobs
#[derive(Debug, Default, Clone)]
pub struct BlobBuilder {
    buf: BytesMut,
}

impl BlobBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn add_u32(&mut self, value: u32) {
        self.buf.put_u32(value);
    }

    pub fn add_u64(&mut self, value: u64) {
        self.buf.put_u64(value);
    }

    /// Append raw bytes without a length prefix
    pub fn add_bytes(&mut self, data: &[u8]) {
        self.buf.put_slice(data);
    }

    /// Append a `uint32` length followed by the bytes
    pub fn add_blob(&mut self, data: &[u8]) {
        self.buf.put_u32(data.len() as u32);
        self.buf.put_slice(data);
    }

    pub fn add_string(&mut self, value: &str) {
        self.add_blob(value.as_bytes());
    }

    /// Append an SSH-2 mpint from an unsigned big-endian magnitude
    pub fn add_mpint(&mut self, magnitude: &[u8]) {
        let trimmed = trim_leading_zeros(magnitude);
        if trimmed.first().is_some_and(|&b| b & 0x80 != 0) {
            self.buf.put_u32(trimmed.len() as u32 + 1);
            self.buf.put_u8(0);
            self.buf.put_slice(trimmed);
        } else {
            self.add_blob(trimmed);
        }
    }

    /// Append an SSH-1 big integer (`uint16` bit count, then magnitude)
    pub fn add_ssh1_bigint(&mut self, magnitude: &[u8]) {
        let trimmed = trim_leading_zeros(magnitude);
        self.buf.put_u16(bit_length(trimmed) as u16);
        self.buf.put_slice(trimmed);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Prefix the body built so far with the message header.
    ///
    /// The length field counts the type byte plus the body.
    pub fn insert_header(&mut self, msg_type: MessageType) {
        let mut framed = BytesMut::with_capacity(5 + self.buf.len());
        framed.put_u32(self.buf.len() as u32 + 1);
        framed.put_u8(msg_type.into());
        framed.put_slice(&self.buf);
        self.buf = framed;
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Message header: type plus the declared length (type byte included)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub msg_type: MessageType,
    pub length: u32,
}

/// Sequential reader over a borrowed buffer
#[derive(Debug, Clone)]
pub struct BlobParser<'a> {
    buf: &'a [u8],
}

impl<'a> BlobParser<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { buf: data }
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn ensure(&self, needed: usize, what: &str) -> Result<()> {
        if self.buf.remaining() < needed {
            return Err(Error::Framing(format!(
                "{} truncated: need {} bytes, {} remaining",
                what,
                needed,
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1, "uint8")?;
        Ok(self.buf.get_u8())
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.ensure(2, "uint16")?;
        Ok(self.buf.get_u16())
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.ensure(4, "uint32")?;
        Ok(self.buf.get_u32())
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.ensure(8, "uint64")?;
        Ok(self.buf.get_u64())
    }

    /// Read exactly `len` raw bytes
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        self.ensure(len, "data")?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    /// Read a `uint32` length and then that many bytes
    pub fn read_blob(&mut self) -> Result<&'a [u8]> {
        let len = self.read_u32()?;
        if len > MAX_MESSAGE_SIZE {
            return Err(Error::Framing(format!(
                "Blob size {} exceeds maximum allowed {}",
                len, MAX_MESSAGE_SIZE
            )));
        }
        let len = usize::try_from(len)
            .map_err(|_| Error::Framing(format!("Blob length {} cannot be converted to usize", len)))?;
        self.ensure(len, "blob")?;
        self.read_bytes(len)
    }

    /// Read a blob and interpret it as text
    pub fn read_string(&mut self) -> Result<String> {
        let data = self.read_blob()?;
        Ok(String::from_utf8_lossy(data).into_owned())
    }

    /// Read an SSH-2 mpint and return its unsigned magnitude
    pub fn read_mpint(&mut self) -> Result<&'a [u8]> {
        let data = self.read_blob()?;
        if data.first().is_some_and(|&b| b & 0x80 != 0) {
            return Err(Error::Framing("Negative mpint".to_string()));
        }
        Ok(trim_leading_zeros(data))
    }

    /// Read an SSH-1 big integer
    pub fn read_ssh1_bigint(&mut self) -> Result<&'a [u8]> {
        let bits = self.read_u16()? as usize;
        let len = bits.div_ceil(8);
        self.ensure(len, "SSH-1 bignum")?;
        Ok(trim_leading_zeros(self.read_bytes(len)?))
    }

    /// Read the message header at the start of a frame.
    ///
    /// The declared length must equal the type byte plus the rest of the
    /// buffer.
    pub fn read_header(&mut self) -> Result<Header> {
        let length = self.read_u32()?;
        if length == 0 {
            return Err(Error::Framing("Zero-length message".to_string()));
        }
        if length > MAX_MESSAGE_SIZE {
            return Err(Error::Framing(format!(
                "Message too large: {} bytes",
                length
            )));
        }
        if length as usize != self.remaining() {
            return Err(Error::Framing(format!(
                "Length prefix {} does not match {} bytes present",
                length,
                self.remaining()
            )));
        }
        let msg_type = MessageType::from(self.read_u8()?);
        Ok(Header { msg_type, length })
    }

    /// Take everything not yet consumed
    pub fn rest(&mut self) -> &'a [u8] {
        std::mem::take(&mut self.buf)
    }
}
