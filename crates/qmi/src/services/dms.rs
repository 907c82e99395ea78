//! Device Management Service (id 2): device identity and operating mode.

use bytes::Bytes;
use qmux::tlv::{self, TlvWriter};
use qmux::{DecodeError, ServiceRequest};

pub const SERVICE: u8 = 0x02;

const GET_DEVICE_MFR: u16 = 0x0021;
const GET_DEVICE_MODEL_ID: u16 = 0x0022;
const GET_DEVICE_REV_ID: u16 = 0x0023;
const GET_DEVICE_SERIAL_NUMBERS: u16 = 0x0025;
const GET_OPERATING_MODE: u16 = 0x002D;
const SET_OPERATING_MODE: u16 = 0x002E;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingMode {
    Online,
    LowPower,
    FactoryTest,
    Offline,
    Resetting,
    Shutdown,
    PersistentLowPower,
}

impl OperatingMode {
    fn from_u8(value: u8) -> Result<Self, DecodeError> {
        match value {
            0 => Ok(Self::Online),
            1 => Ok(Self::LowPower),
            2 => Ok(Self::FactoryTest),
            3 => Ok(Self::Offline),
            4 => Ok(Self::Resetting),
            5 => Ok(Self::Shutdown),
            6 => Ok(Self::PersistentLowPower),
            other => Err(DecodeError::InvalidData(format!("operating mode {other}"))),
        }
    }
}

macro_rules! string_request {
    ($(#[$doc:meta])* $name:ident, $msg:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl ServiceRequest for $name {
            type Output = String;

            fn service_id(&self) -> u8 {
                SERVICE
            }

            fn message_id(&self) -> u16 {
                $msg
            }

            fn payload(&self) -> Bytes {
                tlv::encode_message($msg, &[])
            }

            fn decode(&self, message: &[u8]) -> Result<String, DecodeError> {
                let v = tlv::find(message, 0x01)?.ok_or(DecodeError::MissingTlv(0x01))?;
                Ok(String::from_utf8_lossy(v).into_owned())
            }
        }
    };
}

string_request!(
    /// Manufacturer name, e.g. "QUALCOMM INCORPORATED".
    GetManufacturer,
    GET_DEVICE_MFR
);
string_request!(
    /// Model identifier.
    GetModel,
    GET_DEVICE_MODEL_ID
);
string_request!(
    /// Firmware revision string.
    GetRevision,
    GET_DEVICE_REV_ID
);

/// Device serial numbers. A modem reports the identifiers that apply to
/// its radio technologies and omits the rest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SerialNumbers {
    pub esn: Option<String>,
    pub imei: Option<String>,
    pub meid: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GetSerialNumbers;

impl ServiceRequest for GetSerialNumbers {
    type Output = SerialNumbers;

    fn service_id(&self) -> u8 {
        SERVICE
    }

    fn message_id(&self) -> u16 {
        GET_DEVICE_SERIAL_NUMBERS
    }

    fn payload(&self) -> Bytes {
        tlv::encode_message(GET_DEVICE_SERIAL_NUMBERS, &[])
    }

    fn decode(&self, message: &[u8]) -> Result<SerialNumbers, DecodeError> {
        let text = |v: &[u8]| String::from_utf8_lossy(v).into_owned();
        Ok(SerialNumbers {
            esn: tlv::find(message, 0x10)?.map(text),
            imei: tlv::find(message, 0x11)?.map(text),
            meid: tlv::find(message, 0x12)?.map(text),
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GetOperatingMode;

impl ServiceRequest for GetOperatingMode {
    type Output = OperatingMode;

    fn service_id(&self) -> u8 {
        SERVICE
    }

    fn message_id(&self) -> u16 {
        GET_OPERATING_MODE
    }

    fn payload(&self) -> Bytes {
        tlv::encode_message(GET_OPERATING_MODE, &[])
    }

    fn decode(&self, message: &[u8]) -> Result<OperatingMode, DecodeError> {
        let v = tlv::find(message, 0x01)?.ok_or(DecodeError::MissingTlv(0x01))?;
        OperatingMode::from_u8(tlv::u8_at(v)?)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SetOperatingMode {
    pub mode: OperatingMode,
}

impl ServiceRequest for SetOperatingMode {
    type Output = ();

    fn service_id(&self) -> u8 {
        SERVICE
    }

    fn message_id(&self) -> u16 {
        SET_OPERATING_MODE
    }

    fn payload(&self) -> Bytes {
        let mut w = TlvWriter::new();
        w.tlv_u8(0x01, self.mode as u8);
        tlv::encode_message(SET_OPERATING_MODE, &w.finish())
    }

    fn decode(&self, _message: &[u8]) -> Result<(), DecodeError> {
        Ok(())
    }
}
