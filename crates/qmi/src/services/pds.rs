//! Position Determination Service (id 0x10): GPS session state.

use bytes::Bytes;
use qmux::tlv;
use qmux::{DecodeError, Indication, ServiceRequest};

use crate::Event;

pub const SERVICE: u8 = 0x10;

const EVENT_REPORT: u16 = 0x0001;
const GET_GPS_SERVICE_STATE: u16 = 0x0020;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpsServiceState {
    pub enabled: bool,
    pub tracking: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GetGpsServiceState;

impl ServiceRequest for GetGpsServiceState {
    type Output = GpsServiceState;

    fn service_id(&self) -> u8 {
        SERVICE
    }

    fn message_id(&self) -> u16 {
        GET_GPS_SERVICE_STATE
    }

    fn payload(&self) -> Bytes {
        tlv::encode_message(GET_GPS_SERVICE_STATE, &[])
    }

    fn decode(&self, message: &[u8]) -> Result<GpsServiceState, DecodeError> {
        let v = tlv::find(message, 0x01)?.ok_or(DecodeError::MissingTlv(0x01))?;
        if v.len() < 2 {
            return Err(DecodeError::UnexpectedEof);
        }
        Ok(GpsServiceState {
            enabled: v[0] != 0,
            tracking: v[1] != 0,
        })
    }
}

pub(crate) fn parse_indication(ind: &Indication) -> Option<Event> {
    match ind.message_id {
        EVENT_REPORT => {
            let v = tlv::find(&ind.message, 0x11).ok()??;
            let status = tlv::u8_at(v).ok()?;
            Some(Event::PositionSession { status })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qmux::tlv::TlvWriter;

    #[test]
    fn gps_service_state_decodes() {
        let mut w = TlvWriter::new();
        w.tlv(0x01, &[0x01, 0x00]);
        let state = GetGpsServiceState.decode(&w.finish()).unwrap();
        assert!(state.enabled);
        assert!(!state.tracking);
    }

    #[test]
    fn event_report_carries_session_status() {
        let mut w = TlvWriter::new();
        w.tlv_u8(0x11, 0x02);
        let ind = Indication {
            service_id: SERVICE,
            client_id: 0x0F,
            message_id: EVENT_REPORT,
            message: w.finish(),
        };
        assert!(matches!(
            parse_indication(&ind),
            Some(Event::PositionSession { status: 0x02 })
        ));
    }
}
