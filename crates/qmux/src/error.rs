//! Error types and the QMI result-code table.

use core::fmt;
use std::io;

/// Errors surfaced to a caller awaiting a QMI call.
///
/// Transport-level failures and modem-reported failures share this shape;
/// the variant tells them apart.
#[derive(Debug)]
pub enum CallError {
    /// The per-call timer fired before a response arrived.
    Timeout,
    /// Writing the request frame to the device failed.
    Write(io::Error),
    /// The device was closed when the call was submitted.
    DeviceClosed,
    /// The response arrived but its payload did not decode.
    Decode(DecodeError),
    /// The response carried a different message id than the request.
    UnexpectedResponse,
    /// The reactor shut down while the call was pending.
    Shutdown,
    /// The modem rejected the request with a QMI result code.
    Qmi(ProtocolError),
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "call timed out"),
            Self::Write(e) => write!(f, "write error: {e}"),
            Self::DeviceClosed => write!(f, "device closed"),
            Self::Decode(e) => write!(f, "decode error: {e}"),
            Self::UnexpectedResponse => write!(f, "unexpected response message"),
            Self::Shutdown => write!(f, "reactor shut down"),
            Self::Qmi(e) => write!(f, "modem error: {e}"),
        }
    }
}

impl std::error::Error for CallError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Write(e) => Some(e),
            Self::Decode(e) => Some(e),
            Self::Qmi(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DecodeError> for CallError {
    fn from(e: DecodeError) -> Self {
        Self::Decode(e)
    }
}

impl From<ProtocolError> for CallError {
    fn from(e: ProtocolError) -> Self {
        Self::Qmi(e)
    }
}

/// Payload decoding errors, produced by TLV walkers and service decoders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    UnexpectedEof,
    MissingTlv(u8),
    InvalidData(String),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof => write!(f, "unexpected end of input"),
            Self::MissingTlv(tag) => write!(f, "missing TLV 0x{tag:02x}"),
            Self::InvalidData(msg) => write!(f, "invalid data: {msg}"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Malformed QMUX envelopes. These are logged and dropped by the reactor;
/// they never fail a call on their own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// The frame body ended before the service header was complete.
    Truncated,
    /// The declared TLV-area length disagrees with the bytes present.
    LengthMismatch { declared: u16, actual: usize },
    /// The SDU control flags named neither a response nor an indication.
    UnknownKind(u8),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "truncated frame"),
            Self::LengthMismatch { declared, actual } => {
                write!(f, "TLV length {declared} disagrees with {actual} bytes present")
            }
            Self::UnknownKind(flags) => write!(f, "unknown SDU control flags 0x{flags:02x}"),
        }
    }
}

impl std::error::Error for FrameError {}

macro_rules! protocol_errors {
    ($($name:ident = $code:literal, $text:literal;)*) => {
        /// QMI result codes, as reported in the mandatory result TLV of a
        /// failure response.
        ///
        /// The numbering follows the published QMI specification. Codes the
        /// table does not name decode as [`ProtocolError::Unknown`].
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum ProtocolError {
            $($name,)*
            Unknown(u16),
        }

        impl ProtocolError {
            pub fn from_u16(code: u16) -> Self {
                match code {
                    $($code => Self::$name,)*
                    other => Self::Unknown(other),
                }
            }

            pub fn code(&self) -> u16 {
                match self {
                    $(Self::$name => $code,)*
                    Self::Unknown(code) => *code,
                }
            }
        }

        impl fmt::Display for ProtocolError {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $(Self::$name => f.write_str($text),)*
                    Self::Unknown(code) => write!(f, "unknown QMI error 0x{code:04x}"),
                }
            }
        }
    };
}

protocol_errors! {
    None = 0x0000, "no error";
    MalformedMessage = 0x0001, "malformed message";
    NoMemory = 0x0002, "no memory";
    Internal = 0x0003, "internal error";
    Aborted = 0x0004, "aborted";
    ClientIdsExhausted = 0x0005, "client ids exhausted";
    UnabortableTransaction = 0x0006, "unabortable transaction";
    InvalidClientId = 0x0007, "invalid client id";
    NoThresholdsProvided = 0x0008, "no thresholds provided";
    InvalidHandle = 0x0009, "invalid handle";
    InvalidProfile = 0x000A, "invalid profile";
    InvalidPinId = 0x000B, "invalid PIN id";
    IncorrectPin = 0x000C, "incorrect PIN";
    NoNetworkFound = 0x000D, "no network found";
    CallFailed = 0x000E, "call failed";
    OutOfCall = 0x000F, "out of call";
    NotProvisioned = 0x0010, "not provisioned";
    MissingArgument = 0x0011, "missing argument";
    ArgumentTooLong = 0x0013, "argument too long";
    InvalidTransactionId = 0x0016, "invalid transaction id";
    DeviceInUse = 0x0017, "device in use";
    NetworkUnsupported = 0x0018, "network unsupported";
    DeviceUnsupported = 0x0019, "device unsupported";
    NoEffect = 0x001A, "no effect";
    NoFreeProfile = 0x001B, "no free profile";
    InvalidPdpType = 0x001C, "invalid PDP type";
    InvalidTechnologyPreference = 0x001D, "invalid technology preference";
    InvalidProfileType = 0x001E, "invalid profile type";
    InvalidServiceType = 0x001F, "invalid service type";
    InvalidRegisterAction = 0x0020, "invalid register action";
    InvalidPsAttachAction = 0x0021, "invalid PS attach action";
    AuthenticationFailed = 0x0022, "authentication failed";
    PinBlocked = 0x0023, "PIN blocked";
    PinAlwaysBlocked = 0x0024, "PIN permanently blocked";
    UimUninitialized = 0x0025, "UIM uninitialized";
    MaximumQosRequestsInUse = 0x0026, "maximum QoS requests in use";
    IncorrectFlowFilter = 0x0029, "incorrect flow filter";
    NetworkQosUnaware = 0x002A, "network QoS unaware";
    InvalidQosId = 0x002B, "invalid QoS id";
    RequestedNumberUnsupported = 0x002C, "requested number unsupported";
    InterfaceNotFound = 0x002D, "interface not found";
    FlowSuspended = 0x002E, "flow suspended";
    InvalidDataFormat = 0x002F, "invalid data format";
    GeneralError = 0x0030, "general error";
    UnknownError = 0x0031, "unknown error";
    InvalidArgument = 0x0032, "invalid argument";
    InvalidIndex = 0x0033, "invalid index";
    NoEntry = 0x0034, "no entry";
    DeviceStorageFull = 0x0035, "device storage full";
    DeviceNotReady = 0x0036, "device not ready";
    NetworkNotReady = 0x0037, "network not ready";
    CauseCode = 0x0038, "cause code";
    MessageNotSent = 0x0039, "message not sent";
    MessageDeliveryFailure = 0x003A, "message delivery failure";
    InvalidMessageId = 0x003B, "invalid message id";
    Encoding = 0x003C, "encoding error";
    AuthenticationLock = 0x003D, "authentication lock";
    InvalidTransition = 0x003E, "invalid transition";
    ExtendedInternal = 0x0051, "extended internal error";
    AccessDenied = 0x0052, "access denied";
}

impl std::error::Error for ProtocolError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_error_table_roundtrips() {
        for code in [0x0000, 0x000C, 0x0032, 0x0051, 0x0052] {
            let err = ProtocolError::from_u16(code);
            assert_ne!(err, ProtocolError::Unknown(code));
            assert_eq!(err.code(), code);
        }
    }

    #[test]
    fn unlisted_codes_survive_as_unknown() {
        let err = ProtocolError::from_u16(0x4242);
        assert_eq!(err, ProtocolError::Unknown(0x4242));
        assert_eq!(err.code(), 0x4242);
    }

    #[test]
    fn failure_frame_code_0x000c_names_incorrect_pin() {
        assert_eq!(ProtocolError::from_u16(0x000C), ProtocolError::IncorrectPin);
    }
}
