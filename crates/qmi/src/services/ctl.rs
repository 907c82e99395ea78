//! Control service (id 0): client-id allocation and the sync indication.
//!
//! Every other service needs a client id from here before it can be
//! addressed; `Qmi` performs that bootstrap lazily and caches the result.

use bytes::Bytes;
use qmux::tlv::{self, TlvWriter};
use qmux::{DecodeError, Indication, ServiceRequest};

use crate::Event;

pub const SERVICE: u8 = 0x00;

const GET_CLIENT_ID: u16 = 0x0022;
const RELEASE_CLIENT_ID: u16 = 0x0023;
const SYNC: u16 = 0x0027;

/// Allocate a client id for `service`.
#[derive(Debug, Clone, Copy)]
pub struct GetClientId {
    pub service: u8,
}

impl ServiceRequest for GetClientId {
    type Output = u8;

    fn service_id(&self) -> u8 {
        SERVICE
    }

    fn message_id(&self) -> u16 {
        GET_CLIENT_ID
    }

    fn payload(&self) -> Bytes {
        let mut w = TlvWriter::new();
        w.tlv_u8(0x01, self.service);
        tlv::encode_message(GET_CLIENT_ID, &w.finish())
    }

    fn decode(&self, message: &[u8]) -> Result<u8, DecodeError> {
        // TLV 0x01: (service, allocated client id).
        let v = tlv::find(message, 0x01)?.ok_or(DecodeError::MissingTlv(0x01))?;
        if v.len() < 2 {
            return Err(DecodeError::UnexpectedEof);
        }
        if v[0] != self.service {
            return Err(DecodeError::InvalidData(format!(
                "client id allocated for service {:#04x}, requested {:#04x}",
                v[0], self.service
            )));
        }
        Ok(v[1])
    }
}

/// Hand a client id back to the modem.
#[derive(Debug, Clone, Copy)]
pub struct ReleaseClientId {
    pub service: u8,
    pub client_id: u8,
}

impl ServiceRequest for ReleaseClientId {
    type Output = ();

    fn service_id(&self) -> u8 {
        SERVICE
    }

    fn message_id(&self) -> u16 {
        RELEASE_CLIENT_ID
    }

    fn payload(&self) -> Bytes {
        let mut w = TlvWriter::new();
        w.tlv(0x01, &[self.service, self.client_id]);
        tlv::encode_message(RELEASE_CLIENT_ID, &w.finish())
    }

    fn decode(&self, _message: &[u8]) -> Result<(), DecodeError> {
        Ok(())
    }
}

pub(crate) fn parse_indication(ind: &Indication) -> Option<Event> {
    match ind.message_id {
        // The modem restarted and forgot every client id.
        SYNC => Some(Event::Sync),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_client_id_payload_layout() {
        let payload = GetClientId { service: 0x01 }.payload();
        assert_eq!(&payload[..], &[0x22, 0x00, 0x04, 0x00, 0x01, 0x01, 0x00, 0x01]);
    }

    #[test]
    fn get_client_id_decodes_the_allocation() {
        let req = GetClientId { service: 0x0B };
        assert_eq!(req.decode(&[0x01, 0x02, 0x00, 0x0B, 0x0F]), Ok(0x0F));
    }

    #[test]
    fn get_client_id_rejects_a_mismatched_service() {
        let req = GetClientId { service: 0x01 };
        assert!(matches!(
            req.decode(&[0x01, 0x02, 0x00, 0x02, 0x0F]),
            Err(DecodeError::InvalidData(_))
        ));
    }

    #[test]
    fn release_client_id_payload_layout() {
        let payload = ReleaseClientId { service: 0x01, client_id: 0x0F }.payload();
        assert_eq!(
            &payload[..],
            &[0x23, 0x00, 0x05, 0x00, 0x01, 0x02, 0x00, 0x01, 0x0F]
        );
    }
}
