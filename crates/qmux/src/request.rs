//! The request/response contract between the transport and service codecs.
//!
//! This trait is the only coupling between the two layers: the reactor
//! reads nothing from a request beyond its service id and payload bytes,
//! and a codec can be tested end-to-end by feeding bytes to `decode`
//! without any transport in sight.

use bytes::Bytes;

use crate::error::DecodeError;

/// A single QMI request.
///
/// `payload` carries the complete service payload (`u16le` message id,
/// `u16le` TLV-area length, TLV area; see [`crate::tlv::encode_message`]).
/// The transport treats it as opaque. `decode` consumes the TLV area of a
/// successful response, after the result TLV has been stripped.
pub trait ServiceRequest {
    type Output;

    /// QMI service the request addresses; 0 is the control service.
    fn service_id(&self) -> u8;

    /// Message id the payload carries, used to pair responses.
    fn message_id(&self) -> u16;

    fn payload(&self) -> Bytes;

    fn decode(&self, message: &[u8]) -> Result<Self::Output, DecodeError>;
}

/// Raw successful response delivered to a waiter. The per-request decoder
/// turns `message` into a domain value.
#[derive(Debug, Clone)]
pub struct Response {
    pub message_id: u16,
    pub message: Bytes,
}
