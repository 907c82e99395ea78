//! Wireless Data Administration service (id 0x1A): link-layer framing.
//!
//! The data format must match what the host network driver expects;
//! modern drivers want raw IP rather than 802.3.

use bytes::Bytes;
use qmux::tlv::{self, TlvWriter};
use qmux::{DecodeError, ServiceRequest};

pub const SERVICE: u8 = 0x1A;

const SET_DATA_FORMAT: u16 = 0x0020;
const GET_DATA_FORMAT: u16 = 0x0021;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkLayerProtocol {
    Ethernet = 1,
    RawIp = 2,
}

impl LinkLayerProtocol {
    fn from_u32(value: u32) -> Result<Self, DecodeError> {
        match value {
            1 => Ok(Self::Ethernet),
            2 => Ok(Self::RawIp),
            other => Err(DecodeError::InvalidData(format!(
                "link layer protocol {other}"
            ))),
        }
    }
}

/// Set the link-layer framing. The modem echoes the protocol it actually
/// selected, which may differ from the request.
#[derive(Debug, Clone, Copy)]
pub struct SetDataFormat {
    pub link_layer_protocol: LinkLayerProtocol,
}

impl ServiceRequest for SetDataFormat {
    type Output = LinkLayerProtocol;

    fn service_id(&self) -> u8 {
        SERVICE
    }

    fn message_id(&self) -> u16 {
        SET_DATA_FORMAT
    }

    fn payload(&self) -> Bytes {
        let mut w = TlvWriter::new();
        w.tlv_u32(0x11, self.link_layer_protocol as u32);
        tlv::encode_message(SET_DATA_FORMAT, &w.finish())
    }

    fn decode(&self, message: &[u8]) -> Result<LinkLayerProtocol, DecodeError> {
        let v = tlv::find(message, 0x11)?.ok_or(DecodeError::MissingTlv(0x11))?;
        LinkLayerProtocol::from_u32(tlv::u32_le(v)?)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GetDataFormat;

impl ServiceRequest for GetDataFormat {
    type Output = LinkLayerProtocol;

    fn service_id(&self) -> u8 {
        SERVICE
    }

    fn message_id(&self) -> u16 {
        GET_DATA_FORMAT
    }

    fn payload(&self) -> Bytes {
        tlv::encode_message(GET_DATA_FORMAT, &[])
    }

    fn decode(&self, message: &[u8]) -> Result<LinkLayerProtocol, DecodeError> {
        let v = tlv::find(message, 0x11)?.ok_or(DecodeError::MissingTlv(0x11))?;
        LinkLayerProtocol::from_u32(tlv::u32_le(v)?)
    }
}
