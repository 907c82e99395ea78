//! Wireless Messaging Service (id 5): SMS storage access.

use bytes::Bytes;
use qmux::tlv::{self, TlvWriter};
use qmux::{DecodeError, Indication, ServiceRequest};

use crate::Event;

pub const SERVICE: u8 = 0x05;

const EVENT_REPORT: u16 = 0x0001;
const RAW_READ: u16 = 0x0022;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    Uim = 0,
    Nv = 1,
}

impl Storage {
    fn from_u8(value: u8) -> Result<Self, DecodeError> {
        match value {
            0 => Ok(Self::Uim),
            1 => Ok(Self::Nv),
            other => Err(DecodeError::InvalidData(format!("message storage {other}"))),
        }
    }
}

/// Where a stored message lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageLocation {
    pub storage: Storage,
    pub index: u32,
}

/// A stored message in its on-air format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub tag: u8,
    pub format: u8,
    pub data: Vec<u8>,
}

/// Read a stored message without decoding its PDU.
#[derive(Debug, Clone, Copy)]
pub struct RawRead {
    pub location: MessageLocation,
}

impl ServiceRequest for RawRead {
    type Output = RawMessage;

    fn service_id(&self) -> u8 {
        SERVICE
    }

    fn message_id(&self) -> u16 {
        RAW_READ
    }

    fn payload(&self) -> Bytes {
        let mut w = TlvWriter::new();
        let mut v = vec![self.location.storage as u8];
        v.extend_from_slice(&self.location.index.to_le_bytes());
        w.tlv(0x01, &v);
        tlv::encode_message(RAW_READ, &w.finish())
    }

    fn decode(&self, message: &[u8]) -> Result<RawMessage, DecodeError> {
        // TLV 0x01: tag, format, data length, data.
        let v = tlv::find(message, 0x01)?.ok_or(DecodeError::MissingTlv(0x01))?;
        if v.len() < 4 {
            return Err(DecodeError::UnexpectedEof);
        }
        let len = tlv::u16_le(&v[2..4])? as usize;
        let data = &v[4..];
        if data.len() < len {
            return Err(DecodeError::UnexpectedEof);
        }
        Ok(RawMessage {
            tag: v[0],
            format: v[1],
            data: data[..len].to_vec(),
        })
    }
}

pub(crate) fn parse_indication(ind: &Indication) -> Option<Event> {
    match ind.message_id {
        EVENT_REPORT => {
            // TLV 0x10: storage and index of the newly arrived message.
            let v = tlv::find(&ind.message, 0x10).ok()??;
            if v.len() < 5 {
                return None;
            }
            let storage = Storage::from_u8(v[0]).ok()?;
            let index = tlv::u32_le(&v[1..5]).ok()?;
            Some(Event::NewMessage(MessageLocation { storage, index }))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_read_payload_layout() {
        let req = RawRead {
            location: MessageLocation { storage: Storage::Nv, index: 7 },
        };
        assert_eq!(
            &req.payload()[..],
            &[0x22, 0x00, 0x08, 0x00, 0x01, 0x05, 0x00, 0x01, 0x07, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn raw_read_decodes_the_pdu() {
        let mut w = TlvWriter::new();
        w.tlv(0x01, &[0x01, 0x06, 0x03, 0x00, 0xCA, 0xFE, 0xBA]);
        let req = RawRead {
            location: MessageLocation { storage: Storage::Uim, index: 0 },
        };
        let msg = req.decode(&w.finish()).unwrap();
        assert_eq!(msg.tag, 0x01);
        assert_eq!(msg.format, 0x06);
        assert_eq!(msg.data, vec![0xCA, 0xFE, 0xBA]);
    }

    #[test]
    fn event_report_parses_the_location() {
        let mut w = TlvWriter::new();
        w.tlv(0x10, &[0x01, 0x2A, 0x00, 0x00, 0x00]);
        let ind = Indication {
            service_id: SERVICE,
            client_id: 0x0F,
            message_id: EVENT_REPORT,
            message: w.finish(),
        };
        match parse_indication(&ind) {
            Some(Event::NewMessage(loc)) => {
                assert_eq!(loc.storage, Storage::Nv);
                assert_eq!(loc.index, 42);
            }
            other => panic!("unexpected parse result: {other:?}"),
        }
    }
}
