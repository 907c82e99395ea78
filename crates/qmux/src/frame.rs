//! QMUX envelope codec.
//!
//! Every message on the wire is wrapped in the QMUX envelope:
//!
//! ```text
//! 0x01                  sentinel
//! u16le  length         bytes after the sentinel, including these two
//! u8     qmux flags     0x00 host-originated, 0x80 modem-originated
//! u8     service id
//! u8     client id
//! u8     sdu flags      request / response / indication
//! uNle   transaction id N = 8 for the control service, 16 otherwise
//! <body> u16le message id, u16le TLV-area length, TLV area
//! ```
//!
//! Outbound frames are composed as a fixed header block plus the caller's
//! payload so the reactor can hand both to a vectored write without a copy.
//! Inbound bytes arrive in arbitrary chunks; [`FrameBuffer`] accumulates
//! them and yields one [`QmuxMessage`] per complete envelope, keeping any
//! remainder for the next read.

use bitflags::bitflags;
use bytes::{Buf, Bytes, BytesMut};

use crate::error::{FrameError, ProtocolError};
use crate::tlv::Tlvs;
use crate::transaction::ServiceClass;

/// Leading byte of every QMUX frame.
pub const SENTINEL: u8 = 0x01;

/// Tag of the mandatory result TLV in responses.
const TLV_RESULT: u8 = 0x02;

bitflags! {
    /// QMUX control flags (the byte after the length field).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct QmuxFlags: u8 {
        /// Set on frames originated by the modem.
        const SERVICE = 0x80;
    }
}

bitflags! {
    /// SDU control flags for control-service messages.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct CtlSduFlags: u8 {
        const RESPONSE = 0x01;
        const INDICATION = 0x02;
    }
}

bitflags! {
    /// SDU control flags for every other service.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct SvcSduFlags: u8 {
        const COMPOUND = 0x01;
        const RESPONSE = 0x02;
        const INDICATION = 0x04;
    }
}

/// Whether a decoded frame answers a request or arrived unsolicited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Response,
    Indication,
}

/// A decoded inbound frame.
///
/// For responses the mandatory result TLV has already been consumed:
/// `result` carries its verdict and `message` starts at the first TLV the
/// per-request decoder should see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QmuxMessage {
    pub kind: MessageKind,
    pub service_id: u8,
    pub client_id: u8,
    pub transaction_id: u16,
    pub message_id: u16,
    pub result: Result<(), ProtocolError>,
    pub message: Bytes,
}

/// Encoded header block for one outbound frame.
///
/// Borrow it with [`Header::as_bytes`] and pair it with the payload as the
/// two slices of a vectored write.
#[derive(Debug, Clone, Copy)]
pub struct Header {
    buf: [u8; 9],
    len: usize,
}

impl Header {
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

/// Build the QMUX header for an outbound request.
///
/// The transaction-id field is one byte wide for the control service and
/// two (little-endian) for everything else; `length` covers every byte
/// after the sentinel, itself included.
pub fn encode_header(
    service_id: u8,
    client_id: u8,
    transaction_id: u16,
    payload_len: usize,
) -> Header {
    let mut buf = [0u8; 9];
    buf[0] = SENTINEL;
    buf[3] = QmuxFlags::empty().bits();
    buf[4] = service_id;
    buf[5] = client_id;
    buf[6] = 0x00; // request
    let len = match ServiceClass::of(service_id) {
        ServiceClass::Control => {
            debug_assert!(transaction_id <= u8::MAX as u16);
            buf[7] = transaction_id as u8;
            8
        }
        ServiceClass::Service => {
            buf[7..9].copy_from_slice(&transaction_id.to_le_bytes());
            9
        }
    };
    let total = len - 1 + payload_len;
    debug_assert!(total <= u16::MAX as usize);
    buf[1..3].copy_from_slice(&(total as u16).to_le_bytes());
    Header { buf, len }
}

/// Accumulates inbound bytes and carves them into QMUX frames.
///
/// A single read from the device may carry zero, one, or many frames, and
/// a frame may span several reads; the buffer retains partial frames until
/// the rest arrives. Garbage before a sentinel is skipped with a warning.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: BytesMut,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes from the device.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Direct access for `read_buf`-style appends.
    pub(crate) fn bytes_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    /// Discard everything buffered. Used when the device is reopened; bytes
    /// from the previous connection cannot be trusted to align on a frame.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Carve the next complete frame out of the buffer, if any.
    ///
    /// `Some(Err(_))` means a complete-but-malformed frame was consumed;
    /// the caller logs and moves on. `None` means more bytes are needed.
    pub fn next_message(&mut self) -> Option<Result<QmuxMessage, FrameError>> {
        if !self.buf.is_empty() && self.buf[0] != SENTINEL {
            let skip = self
                .buf
                .iter()
                .position(|&b| b == SENTINEL)
                .unwrap_or(self.buf.len());
            tracing::warn!(skipped = skip, "resyncing to QMUX sentinel");
            self.buf.advance(skip);
        }
        if self.buf.len() < 3 {
            return None;
        }
        let length = u16::from_le_bytes([self.buf[1], self.buf[2]]) as usize;
        let total = length + 1;
        if self.buf.len() < total {
            return None;
        }
        let frame = self.buf.split_to(total).freeze();
        Some(parse_frame(frame))
    }
}

fn parse_frame(frame: Bytes) -> Result<QmuxMessage, FrameError> {
    if frame.len() < 8 {
        return Err(FrameError::Truncated);
    }
    let flags = frame[3];
    if flags & !QmuxFlags::all().bits() != 0 {
        tracing::debug!(flags, "ignoring unknown QMUX flag bits");
    }
    let service_id = frame[4];
    let client_id = frame[5];
    let sdu_flags = frame[6];
    let class = ServiceClass::of(service_id);

    let (transaction_id, body_start) = match class {
        ServiceClass::Control => (frame[7] as u16, 8),
        ServiceClass::Service => {
            if frame.len() < 9 {
                return Err(FrameError::Truncated);
            }
            (u16::from_le_bytes([frame[7], frame[8]]), 9)
        }
    };
    if frame.len() < body_start + 4 {
        return Err(FrameError::Truncated);
    }
    let kind = message_kind(class, sdu_flags)?;

    let message_id = u16::from_le_bytes([frame[body_start], frame[body_start + 1]]);
    let declared = u16::from_le_bytes([frame[body_start + 2], frame[body_start + 3]]);
    let tlv_area = &frame[body_start + 4..];
    if tlv_area.len() != declared as usize {
        return Err(FrameError::LengthMismatch {
            declared,
            actual: tlv_area.len(),
        });
    }

    // Responses lead with the result TLV; consume it so per-request
    // decoders only see the TLVs that belong to them. Indications carry
    // no result TLV.
    let mut result = Ok(());
    let mut message = frame.slice(body_start + 4..);
    if kind == MessageKind::Response {
        if let Some(Ok(tlv)) = Tlvs::new(tlv_area).next() {
            if tlv.tag == TLV_RESULT && tlv.value.len() >= 4 {
                let qmi_result = u16::from_le_bytes([tlv.value[0], tlv.value[1]]);
                let qmi_error = u16::from_le_bytes([tlv.value[2], tlv.value[3]]);
                if qmi_result != 0 {
                    result = Err(ProtocolError::from_u16(qmi_error));
                }
                message = frame.slice(body_start + 4 + 3 + tlv.value.len()..);
            }
        }
    }

    Ok(QmuxMessage {
        kind,
        service_id,
        client_id,
        transaction_id,
        message_id,
        result,
        message,
    })
}

fn message_kind(class: ServiceClass, sdu_flags: u8) -> Result<MessageKind, FrameError> {
    let (response, indication) = match class {
        ServiceClass::Control => (
            CtlSduFlags::RESPONSE.bits(),
            CtlSduFlags::INDICATION.bits(),
        ),
        ServiceClass::Service => (
            SvcSduFlags::RESPONSE.bits(),
            SvcSduFlags::INDICATION.bits(),
        ),
    };
    if sdu_flags & indication != 0 {
        Ok(MessageKind::Indication)
    } else if sdu_flags & response != 0 {
        Ok(MessageKind::Response)
    } else {
        Err(FrameError::UnknownKind(sdu_flags))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Assemble an inbound frame by hand so the tests stay byte-exact.
    fn inbound(service: u8, client: u8, sdu: u8, tid: &[u8], body: &[u8]) -> Vec<u8> {
        let mut frame = vec![SENTINEL, 0, 0, 0x80, service, client, sdu];
        frame.extend_from_slice(tid);
        frame.extend_from_slice(body);
        let length = (frame.len() - 1) as u16;
        frame[1..3].copy_from_slice(&length.to_le_bytes());
        frame
    }

    fn body(message_id: u16, tlvs: &[u8]) -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(&message_id.to_le_bytes());
        b.extend_from_slice(&(tlvs.len() as u16).to_le_bytes());
        b.extend_from_slice(tlvs);
        b
    }

    #[test]
    fn control_header_is_eight_bytes_with_narrow_tid() {
        let h = encode_header(0x00, 0x00, 0xAB, 4);
        assert_eq!(h.as_bytes(), &[0x01, 0x0B, 0x00, 0x00, 0x00, 0x00, 0x00, 0xAB]);
    }

    #[test]
    fn service_header_is_nine_bytes_with_wide_tid() {
        let h = encode_header(0x01, 0x0F, 0x1234, 0);
        assert_eq!(
            h.as_bytes(),
            &[0x01, 0x08, 0x00, 0x00, 0x01, 0x0F, 0x00, 0x34, 0x12]
        );
    }

    #[test]
    fn outbound_header_roundtrips_through_the_parser() {
        for (service, client, tid, payload) in [
            (0x00u8, 0x00u8, 0x01u16, &[][..]),
            (0x00, 0x00, 0xFF, &[0xAA][..]),
            (0x01, 0x22, 0x0100, &[1, 2, 3][..]),
            (0x0B, 0x07, 0xFFFF, &[0xFE; 16][..]),
        ] {
            let msg_body = body(0x0042, payload);
            let header = encode_header(service, client, tid, msg_body.len());

            let mut bytes = header.as_bytes().to_vec();
            bytes.extend_from_slice(&msg_body);
            // Flip the SDU byte to "response" so the inbound parser, which
            // only accepts responses and indications, will take it.
            bytes[6] = if service == 0 { 0x01 } else { 0x02 };

            let mut fb = FrameBuffer::new();
            fb.extend(&bytes);
            let msg = fb.next_message().unwrap().unwrap();
            assert_eq!(msg.service_id, service);
            assert_eq!(msg.client_id, client);
            assert_eq!(msg.transaction_id, tid);
            assert_eq!(msg.message_id, 0x0042);
            assert_eq!(&msg.message[..], payload);
            assert!(fb.next_message().is_none());
        }
    }

    #[test]
    fn partial_frames_are_retained_until_complete() {
        let frame = inbound(0x01, 0x0F, 0x02, &[0x01, 0x01], &body(0x0020, &[]));
        let mut fb = FrameBuffer::new();
        for &byte in &frame[..frame.len() - 1] {
            fb.extend(&[byte]);
            assert!(fb.next_message().is_none());
        }
        fb.extend(&frame[frame.len() - 1..]);
        let msg = fb.next_message().unwrap().unwrap();
        assert_eq!(msg.transaction_id, 0x0101);
    }

    #[test]
    fn two_frames_in_one_delivery_both_emerge() {
        let a = inbound(0x01, 0x0F, 0x02, &[0x01, 0x01], &body(0x0020, &[]));
        let b = inbound(0x01, 0x0F, 0x04, &[0x00, 0x00], &body(0x0022, &[]));
        let mut fb = FrameBuffer::new();
        let mut both = a.clone();
        both.extend_from_slice(&b);
        fb.extend(&both);
        assert_eq!(fb.next_message().unwrap().unwrap().kind, MessageKind::Response);
        assert_eq!(fb.next_message().unwrap().unwrap().kind, MessageKind::Indication);
        assert!(fb.next_message().is_none());
    }

    #[test]
    fn garbage_before_sentinel_is_skipped() {
        let frame = inbound(0x01, 0x0F, 0x02, &[0x05, 0x00], &body(0x0020, &[]));
        let mut fb = FrameBuffer::new();
        fb.extend(&[0xDE, 0xAD, 0xBE]);
        fb.extend(&frame);
        let msg = fb.next_message().unwrap().unwrap();
        assert_eq!(msg.transaction_id, 0x0005);
    }

    #[test]
    fn declared_tlv_length_must_match_bytes_present() {
        // Header claims a TLV body the frame does not carry.
        let mut b = Vec::new();
        b.extend_from_slice(&0x0020u16.to_le_bytes());
        b.extend_from_slice(&8u16.to_le_bytes()); // declares 8 TLV bytes
        let frame = inbound(0x01, 0x0F, 0x02, &[0x01, 0x00], &b);
        let mut fb = FrameBuffer::new();
        fb.extend(&frame);
        assert_eq!(
            fb.next_message().unwrap(),
            Err(FrameError::LengthMismatch { declared: 8, actual: 0 })
        );
    }

    #[test]
    fn zero_declared_length_with_a_body_present_is_rejected() {
        let mut b = Vec::new();
        b.extend_from_slice(&0x0020u16.to_le_bytes());
        b.extend_from_slice(&0u16.to_le_bytes()); // claims no TLVs
        b.extend_from_slice(&[0x10, 0x01, 0x00, 0x2A]); // yet carries one
        let frame = inbound(0x01, 0x0F, 0x02, &[0x01, 0x00], &b);
        let mut fb = FrameBuffer::new();
        fb.extend(&frame);
        assert_eq!(
            fb.next_message().unwrap(),
            Err(FrameError::LengthMismatch { declared: 0, actual: 4 })
        );
    }

    #[test]
    fn request_flagged_inbound_frame_is_rejected() {
        let frame = inbound(0x01, 0x0F, 0x00, &[0x01, 0x00], &body(0x0020, &[]));
        let mut fb = FrameBuffer::new();
        fb.extend(&frame);
        assert_eq!(fb.next_message().unwrap(), Err(FrameError::UnknownKind(0x00)));
    }

    #[test]
    fn result_tlv_is_consumed_and_success_reported() {
        let tlvs = [
            0x02, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, // result: success
            0x10, 0x01, 0x00, 0x2A, // payload TLV left for the decoder
        ];
        let frame = inbound(0x01, 0x0F, 0x02, &[0x01, 0x00], &body(0x0020, &tlvs));
        let mut fb = FrameBuffer::new();
        fb.extend(&frame);
        let msg = fb.next_message().unwrap().unwrap();
        assert_eq!(msg.result, Ok(()));
        assert_eq!(&msg.message[..], &[0x10, 0x01, 0x00, 0x2A]);
    }

    #[test]
    fn result_tlv_failure_maps_the_error_code() {
        let tlvs = [0x02, 0x04, 0x00, 0x01, 0x00, 0x0C, 0x00]; // failure, 0x000C
        let frame = inbound(0x01, 0x0F, 0x02, &[0x01, 0x00], &body(0x0020, &tlvs));
        let mut fb = FrameBuffer::new();
        fb.extend(&frame);
        let msg = fb.next_message().unwrap().unwrap();
        assert_eq!(msg.result, Err(ProtocolError::IncorrectPin));
        assert!(msg.message.is_empty());
    }

    #[test]
    fn indications_keep_their_full_tlv_area() {
        // An indication body may legitimately start with tag 0x02 meaning
        // something service-specific; it must not be eaten as a result TLV.
        let tlvs = [0x02, 0x01, 0x00, 0x07];
        let frame = inbound(0x03, 0x0F, 0x04, &[0x00, 0x00], &body(0x0024, &tlvs));
        let mut fb = FrameBuffer::new();
        fb.extend(&frame);
        let msg = fb.next_message().unwrap().unwrap();
        assert_eq!(msg.kind, MessageKind::Indication);
        assert_eq!(&msg.message[..], &tlvs);
    }

    #[test]
    fn control_indication_uses_narrow_tid_and_ctl_bits() {
        let frame = inbound(0x00, 0x00, 0x02, &[0x00], &body(0x0027, &[]));
        let mut fb = FrameBuffer::new();
        fb.extend(&frame);
        let msg = fb.next_message().unwrap().unwrap();
        assert_eq!(msg.kind, MessageKind::Indication);
        assert_eq!(msg.service_id, 0x00);
        assert_eq!(msg.message_id, 0x0027);
    }
}
