//! Network Access Service (id 3): registration state and signal quality.

use bytes::Bytes;
use qmux::tlv;
use qmux::{DecodeError, Indication, ServiceRequest};

use crate::Event;

pub const SERVICE: u8 = 0x03;

const GET_SIGNAL_STRENGTH: u16 = 0x0020;
const GET_SERVING_SYSTEM: u16 = 0x0024;
const GET_HOME_NETWORK: u16 = 0x0025;

/// Radio access technology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioInterface {
    NoService,
    Cdma1x,
    Cdma1xEvdo,
    Amps,
    Gsm,
    Umts,
    Lte,
    TdScdma,
    Nr5g,
    /// A technology this table does not name yet.
    Other(u8),
}

impl RadioInterface {
    fn from_u8(value: u8) -> Self {
        match value {
            0x00 => Self::NoService,
            0x01 => Self::Cdma1x,
            0x02 => Self::Cdma1xEvdo,
            0x03 => Self::Amps,
            0x04 => Self::Gsm,
            0x05 => Self::Umts,
            0x08 => Self::Lte,
            0x09 => Self::TdScdma,
            0x0C => Self::Nr5g,
            other => Self::Other(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    NotRegistered,
    Registered,
    Searching,
    Denied,
    Unknown,
}

impl RegistrationState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::NotRegistered,
            1 => Self::Registered,
            2 => Self::Searching,
            3 => Self::Denied,
            _ => Self::Unknown,
        }
    }
}

/// Signal strength of the primary radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalStrength {
    pub dbm: i8,
    pub radio: RadioInterface,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GetSignalStrength;

impl ServiceRequest for GetSignalStrength {
    type Output = SignalStrength;

    fn service_id(&self) -> u8 {
        SERVICE
    }

    fn message_id(&self) -> u16 {
        GET_SIGNAL_STRENGTH
    }

    fn payload(&self) -> Bytes {
        tlv::encode_message(GET_SIGNAL_STRENGTH, &[])
    }

    fn decode(&self, message: &[u8]) -> Result<SignalStrength, DecodeError> {
        let v = tlv::find(message, 0x01)?.ok_or(DecodeError::MissingTlv(0x01))?;
        if v.len() < 2 {
            return Err(DecodeError::UnexpectedEof);
        }
        Ok(SignalStrength {
            dbm: v[0] as i8,
            radio: RadioInterface::from_u8(v[1]),
        })
    }
}

/// Registration and attach state, with the radios currently in use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServingSystem {
    pub registration: RegistrationState,
    pub cs_attached: bool,
    pub ps_attached: bool,
    pub radio_interfaces: Vec<RadioInterface>,
}

fn serving_system(value: &[u8]) -> Result<ServingSystem, DecodeError> {
    if value.len() < 5 {
        return Err(DecodeError::UnexpectedEof);
    }
    let count = value[4] as usize;
    let radios = &value[5..];
    if radios.len() < count {
        return Err(DecodeError::UnexpectedEof);
    }
    Ok(ServingSystem {
        registration: RegistrationState::from_u8(value[0]),
        cs_attached: value[1] == 1,
        ps_attached: value[2] == 1,
        radio_interfaces: radios[..count]
            .iter()
            .map(|&r| RadioInterface::from_u8(r))
            .collect(),
    })
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GetServingSystem;

impl ServiceRequest for GetServingSystem {
    type Output = ServingSystem;

    fn service_id(&self) -> u8 {
        SERVICE
    }

    fn message_id(&self) -> u16 {
        GET_SERVING_SYSTEM
    }

    fn payload(&self) -> Bytes {
        tlv::encode_message(GET_SERVING_SYSTEM, &[])
    }

    fn decode(&self, message: &[u8]) -> Result<ServingSystem, DecodeError> {
        let v = tlv::find(message, 0x01)?.ok_or(DecodeError::MissingTlv(0x01))?;
        serving_system(v)
    }
}

/// Home network operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HomeNetwork {
    pub mcc: u16,
    pub mnc: u16,
    pub description: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GetHomeNetwork;

impl ServiceRequest for GetHomeNetwork {
    type Output = HomeNetwork;

    fn service_id(&self) -> u8 {
        SERVICE
    }

    fn message_id(&self) -> u16 {
        GET_HOME_NETWORK
    }

    fn payload(&self) -> Bytes {
        tlv::encode_message(GET_HOME_NETWORK, &[])
    }

    fn decode(&self, message: &[u8]) -> Result<HomeNetwork, DecodeError> {
        let v = tlv::find(message, 0x01)?.ok_or(DecodeError::MissingTlv(0x01))?;
        if v.len() < 5 {
            return Err(DecodeError::UnexpectedEof);
        }
        let len = v[4] as usize;
        let desc = &v[5..];
        if desc.len() < len {
            return Err(DecodeError::UnexpectedEof);
        }
        Ok(HomeNetwork {
            mcc: tlv::u16_le(&v[0..2])?,
            mnc: tlv::u16_le(&v[2..4])?,
            description: String::from_utf8_lossy(&desc[..len]).into_owned(),
        })
    }
}

pub(crate) fn parse_indication(ind: &Indication) -> Option<Event> {
    match ind.message_id {
        GET_SERVING_SYSTEM => {
            let v = tlv::find(&ind.message, 0x01).ok()??;
            serving_system(v).ok().map(Event::ServingSystem)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qmux::tlv::TlvWriter;

    #[test]
    fn signal_strength_reads_signed_dbm() {
        let mut w = TlvWriter::new();
        w.tlv(0x01, &[0xB0, 0x08]); // -80 dBm on LTE
        let signal = GetSignalStrength.decode(&w.finish()).unwrap();
        assert_eq!(signal.dbm, -80);
        assert_eq!(signal.radio, RadioInterface::Lte);
    }

    #[test]
    fn serving_system_lists_radios() {
        let mut w = TlvWriter::new();
        w.tlv(0x01, &[0x01, 0x01, 0x01, 0x01, 0x02, 0x04, 0x08]);
        let system = GetServingSystem.decode(&w.finish()).unwrap();
        assert_eq!(system.registration, RegistrationState::Registered);
        assert!(system.cs_attached);
        assert!(system.ps_attached);
        assert_eq!(
            system.radio_interfaces,
            vec![RadioInterface::Gsm, RadioInterface::Lte]
        );
    }

    #[test]
    fn home_network_reads_plmn_and_description() {
        let mut w = TlvWriter::new();
        let mut v = vec![0x36, 0x01, 0x1A, 0x00, 0x07]; // 310/026, 7-byte name
        v.extend_from_slice(b"T-M USA");
        w.tlv(0x01, &v);
        let home = GetHomeNetwork.decode(&w.finish()).unwrap();
        assert_eq!(home.mcc, 310);
        assert_eq!(home.mnc, 26);
        assert_eq!(home.description, "T-M USA");
    }

    #[test]
    fn serving_system_indication_becomes_an_event() {
        let mut w = TlvWriter::new();
        w.tlv(0x01, &[0x02, 0x02, 0x02, 0x00, 0x01, 0x00]);
        let ind = Indication {
            service_id: SERVICE,
            client_id: 0x0F,
            message_id: GET_SERVING_SYSTEM,
            message: w.finish(),
        };
        match parse_indication(&ind) {
            Some(Event::ServingSystem(system)) => {
                assert_eq!(system.registration, RegistrationState::Searching);
                assert_eq!(system.radio_interfaces, vec![RadioInterface::NoService]);
            }
            other => panic!("unexpected parse result: {other:?}"),
        }
    }
}
