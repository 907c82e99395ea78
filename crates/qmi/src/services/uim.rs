//! User Identity Module service (id 0x0B): SIM file access.

use bytes::Bytes;
use qmux::tlv::{self, TlvWriter};
use qmux::{DecodeError, Indication, ServiceRequest};

use crate::Event;

pub const SERVICE: u8 = 0x0B;

const READ_TRANSPARENT: u16 = 0x0020;
const STATUS_CHANGE: u16 = 0x0032;

/// Outcome of a transparent read. `sw1`/`sw2` are the card's status words
/// when the card reported them alongside the data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadResult {
    pub read_result: Vec<u8>,
    pub sw1: Option<u8>,
    pub sw2: Option<u8>,
}

/// Read a transparent elementary file from the primary GW session.
///
/// `path` is the DF path from the master file, one entry per directory
/// (e.g. `[0x3F00]` for a file directly under MF).
#[derive(Debug, Clone)]
pub struct ReadTransparent {
    pub file_id: u16,
    pub path: Vec<u16>,
}

impl ReadTransparent {
    /// The ICCID file, `EF_ICCID`, directly under the master file.
    pub fn iccid_file() -> Self {
        Self {
            file_id: 0x2FE2,
            path: vec![0x3F00],
        }
    }
}

impl ServiceRequest for ReadTransparent {
    type Output = ReadResult;

    fn service_id(&self) -> u8 {
        SERVICE
    }

    fn message_id(&self) -> u16 {
        READ_TRANSPARENT
    }

    fn payload(&self) -> Bytes {
        // Session: primary GW provisioning, no application id.
        let mut w = TlvWriter::new();
        w.tlv(0x01, &[0x00, 0x00]);

        let mut file = Vec::with_capacity(3 + self.path.len() * 2);
        file.extend_from_slice(&self.file_id.to_le_bytes());
        file.push((self.path.len() * 2) as u8);
        for entry in &self.path {
            file.extend_from_slice(&entry.to_le_bytes());
        }
        w.tlv(0x02, &file);

        // Offset 0, length 0: the whole file.
        w.tlv(0x03, &[0x00, 0x00, 0x00, 0x00]);
        tlv::encode_message(READ_TRANSPARENT, &w.finish())
    }

    fn decode(&self, message: &[u8]) -> Result<ReadResult, DecodeError> {
        let v = tlv::find(message, 0x11)?.ok_or(DecodeError::MissingTlv(0x11))?;
        let len = tlv::u16_le(v)? as usize;
        let data = &v[2..];
        if data.len() < len {
            return Err(DecodeError::UnexpectedEof);
        }
        let card = tlv::find(message, 0x10)?;
        Ok(ReadResult {
            read_result: data[..len].to_vec(),
            sw1: card.and_then(|c| c.first().copied()),
            sw2: card.and_then(|c| c.get(1).copied()),
        })
    }
}

/// Decode BCD digits with swapped nibbles, as stored in `EF_ICCID`: each
/// byte holds the low digit first; `0xF` pads an odd-length number.
pub fn iccid(bytes: &[u8]) -> String {
    let mut digits = String::with_capacity(bytes.len() * 2);
    for &byte in bytes {
        for nibble in [byte & 0x0F, byte >> 4] {
            if nibble != 0x0F {
                digits.push(char::from_digit(nibble as u32, 10).unwrap_or('?'));
            }
        }
    }
    digits
}

pub(crate) fn parse_indication(ind: &Indication) -> Option<Event> {
    match ind.message_id {
        STATUS_CHANGE => Some(Event::UimStatusChange),
        _ => None,
    }
}
