//! TLV (Type-Length-Value) codec kernel.
//!
//! Every QMI payload is a sequence of `(tag: u8, length: u16le, value)`
//! fields. The kernel provides a builder for outbound payloads and an
//! iterator for inbound ones. Decoders walk the iterator and pick the tags
//! they know; anything else is consumed by its declared length and skipped.
//! That skip is what keeps old decoders working against new modem firmware,
//! so every decoder in the tree goes through it.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::DecodeError;

/// A single decoded TLV, borrowing the value bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tlv<'a> {
    pub tag: u8,
    pub value: &'a [u8],
}

/// Iterator over a TLV area. Yields each `(tag, value)` in order and
/// terminates cleanly at end-of-buffer; a field whose declared length
/// overruns the buffer is an error.
#[derive(Debug, Clone)]
pub struct Tlvs<'a> {
    rest: &'a [u8],
}

impl<'a> Tlvs<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { rest: bytes }
    }
}

impl<'a> Iterator for Tlvs<'a> {
    type Item = Result<Tlv<'a>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        if self.rest.len() < 3 {
            self.rest = &[];
            return Some(Err(DecodeError::UnexpectedEof));
        }
        let tag = self.rest[0];
        let len = u16::from_le_bytes([self.rest[1], self.rest[2]]) as usize;
        let body = &self.rest[3..];
        if body.len() < len {
            self.rest = &[];
            return Some(Err(DecodeError::UnexpectedEof));
        }
        let (value, rest) = body.split_at(len);
        self.rest = rest;
        Some(Ok(Tlv { tag, value }))
    }
}

/// Find the first TLV with `tag`, skipping every other tag on the way.
pub fn find(bytes: &[u8], tag: u8) -> Result<Option<&[u8]>, DecodeError> {
    for tlv in Tlvs::new(bytes) {
        let tlv = tlv?;
        if tlv.tag == tag {
            return Ok(Some(tlv.value));
        }
    }
    Ok(None)
}

/// Builder for an outbound TLV area.
#[derive(Debug, Default)]
pub struct TlvWriter {
    buf: BytesMut,
}

impl TlvWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tlv(&mut self, tag: u8, value: &[u8]) -> &mut Self {
        debug_assert!(value.len() <= u16::MAX as usize);
        self.buf.put_u8(tag);
        self.buf.put_u16_le(value.len() as u16);
        self.buf.put_slice(value);
        self
    }

    pub fn tlv_u8(&mut self, tag: u8, value: u8) -> &mut Self {
        self.tlv(tag, &[value])
    }

    pub fn tlv_u16(&mut self, tag: u8, value: u16) -> &mut Self {
        self.tlv(tag, &value.to_le_bytes())
    }

    pub fn tlv_u32(&mut self, tag: u8, value: u32) -> &mut Self {
        self.tlv(tag, &value.to_le_bytes())
    }

    /// String TLV. QMI strings are raw bytes with no terminator.
    pub fn tlv_str(&mut self, tag: u8, value: &str) -> &mut Self {
        self.tlv(tag, value.as_bytes())
    }

    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Compose a complete service payload: `u16le message id`, `u16le TLV-area
/// length`, TLV area. This is the byte buffer a request descriptor carries;
/// the transport never looks inside it.
pub fn encode_message(message_id: u16, tlvs: &[u8]) -> Bytes {
    debug_assert!(tlvs.len() <= u16::MAX as usize);
    let mut buf = BytesMut::with_capacity(4 + tlvs.len());
    buf.put_u16_le(message_id);
    buf.put_u16_le(tlvs.len() as u16);
    buf.put_slice(tlvs);
    buf.freeze()
}

// Little-endian field readers used by service decoders. Extra trailing
// bytes are tolerated; firmware is known to pad values.

pub fn u8_at(value: &[u8]) -> Result<u8, DecodeError> {
    value.first().copied().ok_or(DecodeError::UnexpectedEof)
}

pub fn u16_le(value: &[u8]) -> Result<u16, DecodeError> {
    if value.len() < 2 {
        return Err(DecodeError::UnexpectedEof);
    }
    Ok(u16::from_le_bytes([value[0], value[1]]))
}

pub fn u32_le(value: &[u8]) -> Result<u32, DecodeError> {
    if value.len() < 4 {
        return Err(DecodeError::UnexpectedEof);
    }
    Ok(u32::from_le_bytes([value[0], value[1], value[2], value[3]]))
}
