//! Wireless Data Service (id 1): packet-data session control.

use std::net::Ipv4Addr;

use bytes::Bytes;
use qmux::tlv::{self, Tlvs, TlvWriter};
use qmux::{DecodeError, Indication, ServiceRequest};

use crate::Event;

pub const SERVICE: u8 = 0x01;

const START_NETWORK_INTERFACE: u16 = 0x0020;
const STOP_NETWORK_INTERFACE: u16 = 0x0021;
const GET_PKT_SRVC_STATUS: u16 = 0x0022;
const GET_CURRENT_SETTINGS: u16 = 0x002D;

/// Packet-data connection status as reported by the modem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connected,
    Suspended,
    Authenticating,
}

impl ConnectionStatus {
    fn from_u8(value: u8) -> Result<Self, DecodeError> {
        match value {
            1 => Ok(Self::Disconnected),
            2 => Ok(Self::Connected),
            3 => Ok(Self::Suspended),
            4 => Ok(Self::Authenticating),
            other => Err(DecodeError::InvalidData(format!(
                "connection status {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpFamily {
    V4 = 4,
    V6 = 6,
}

/// Bring up a packet-data session. The returned handle identifies the
/// session to [`StopNetworkInterface`].
#[derive(Debug, Clone, Default)]
pub struct StartNetworkInterface {
    pub apn: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ip_family: Option<IpFamily>,
}

impl ServiceRequest for StartNetworkInterface {
    type Output = u32;

    fn service_id(&self) -> u8 {
        SERVICE
    }

    fn message_id(&self) -> u16 {
        START_NETWORK_INTERFACE
    }

    fn payload(&self) -> Bytes {
        let mut w = TlvWriter::new();
        if let Some(apn) = &self.apn {
            w.tlv_str(0x14, apn);
        }
        if let Some(username) = &self.username {
            w.tlv_str(0x17, username);
        }
        if let Some(password) = &self.password {
            w.tlv_str(0x18, password);
        }
        if let Some(family) = self.ip_family {
            w.tlv_u8(0x19, family as u8);
        }
        tlv::encode_message(START_NETWORK_INTERFACE, &w.finish())
    }

    fn decode(&self, message: &[u8]) -> Result<u32, DecodeError> {
        let v = tlv::find(message, 0x01)?.ok_or(DecodeError::MissingTlv(0x01))?;
        tlv::u32_le(v)
    }
}

/// Tear down a packet-data session.
#[derive(Debug, Clone, Copy)]
pub struct StopNetworkInterface {
    pub packet_data_handle: u32,
}

impl ServiceRequest for StopNetworkInterface {
    type Output = ();

    fn service_id(&self) -> u8 {
        SERVICE
    }

    fn message_id(&self) -> u16 {
        STOP_NETWORK_INTERFACE
    }

    fn payload(&self) -> Bytes {
        let mut w = TlvWriter::new();
        w.tlv_u32(0x01, self.packet_data_handle);
        tlv::encode_message(STOP_NETWORK_INTERFACE, &w.finish())
    }

    fn decode(&self, _message: &[u8]) -> Result<(), DecodeError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GetPacketServiceStatus;

impl ServiceRequest for GetPacketServiceStatus {
    type Output = ConnectionStatus;

    fn service_id(&self) -> u8 {
        SERVICE
    }

    fn message_id(&self) -> u16 {
        GET_PKT_SRVC_STATUS
    }

    fn payload(&self) -> Bytes {
        tlv::encode_message(GET_PKT_SRVC_STATUS, &[])
    }

    fn decode(&self, message: &[u8]) -> Result<ConnectionStatus, DecodeError> {
        let v = tlv::find(message, 0x01)?.ok_or(DecodeError::MissingTlv(0x01))?;
        ConnectionStatus::from_u8(tlv::u8_at(v)?)
    }
}

/// IP configuration of the current session. Fields the modem did not
/// report stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CurrentSettings {
    pub ip_address: Option<Ipv4Addr>,
    pub gateway: Option<Ipv4Addr>,
    pub subnet_mask: Option<Ipv4Addr>,
    pub dns_primary: Option<Ipv4Addr>,
    pub dns_secondary: Option<Ipv4Addr>,
    pub mtu: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GetCurrentSettings;

impl ServiceRequest for GetCurrentSettings {
    type Output = CurrentSettings;

    fn service_id(&self) -> u8 {
        SERVICE
    }

    fn message_id(&self) -> u16 {
        GET_CURRENT_SETTINGS
    }

    fn payload(&self) -> Bytes {
        tlv::encode_message(GET_CURRENT_SETTINGS, &[])
    }

    fn decode(&self, message: &[u8]) -> Result<CurrentSettings, DecodeError> {
        let mut settings = CurrentSettings::default();
        for tlv in Tlvs::new(message) {
            let tlv = tlv?;
            match tlv.tag {
                0x15 => settings.dns_primary = Some(ipv4(tlv.value)?),
                0x16 => settings.dns_secondary = Some(ipv4(tlv.value)?),
                0x1E => settings.ip_address = Some(ipv4(tlv.value)?),
                0x20 => settings.gateway = Some(ipv4(tlv.value)?),
                0x21 => settings.subnet_mask = Some(ipv4(tlv.value)?),
                0x29 => settings.mtu = Some(tlv::u32_le(tlv.value)?),
                _ => {}
            }
        }
        Ok(settings)
    }
}

/// QMI carries IPv4 addresses as a little-endian u32 in host numbering.
fn ipv4(value: &[u8]) -> Result<Ipv4Addr, DecodeError> {
    Ok(Ipv4Addr::from(tlv::u32_le(value)?))
}

/// Unsolicited packet-service state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketServiceStatus {
    pub status: ConnectionStatus,
    pub reconfiguration_required: bool,
    pub call_end_reason: Option<u16>,
}

pub(crate) fn parse_indication(ind: &Indication) -> Option<Event> {
    match ind.message_id {
        GET_PKT_SRVC_STATUS => {
            let v = tlv::find(&ind.message, 0x01).ok()??;
            if v.len() < 2 {
                return None;
            }
            let status = ConnectionStatus::from_u8(v[0]).ok()?;
            let call_end_reason = tlv::find(&ind.message, 0x10)
                .ok()
                .flatten()
                .and_then(|v| tlv::u16_le(v).ok());
            Some(Event::PacketServiceStatus(PacketServiceStatus {
                status,
                reconfiguration_required: v[1] != 0,
                call_end_reason,
            }))
        }
        _ => None,
    }
}
