//! qmux: QMUX transport and transaction multiplexer for QMI modems.
//!
//! This crate is the transport half of a QMI client. It frames bytes on a
//! `/dev/cdc-wdm*` character device, allocates and tracks transactions
//! across services, correlates responses to waiting callers, dispatches
//! unsolicited indications to a subscriber, enforces per-call timeouts,
//! and reopens the device after a hang-up.
//!
//! It deliberately knows nothing about individual QMI services. Service
//! codecs (see the `qmi` crate) implement [`ServiceRequest`] and are the
//! only place message ids and TLV tags get meaning.
//!
//! ```ignore
//! let mux = Qmux::builder()
//!     .name("wwan0")
//!     .on_indication(|ind| tracing::info!(?ind, "indication"))
//!     .open("/dev/cdc-wdm0")
//!     .await?;
//!
//! let id = mux.call(0, &GetClientId { service: 1 }, DEFAULT_TIMEOUT).await?;
//! ```

#![forbid(unsafe_code)]

mod device;
mod error;
mod frame;
mod reactor;
mod request;
mod transaction;

pub mod tlv;

pub use device::{CdcStream, CharDevice, DeviceOpener};
pub use error::{CallError, DecodeError, FrameError, ProtocolError};
pub use frame::{encode_header, FrameBuffer, Header, MessageKind, QmuxFlags, QmuxMessage, SENTINEL};
pub use reactor::{Builder, Indication, IndicationHandler, Qmux, DEFAULT_TIMEOUT};
pub use request::{Response, ServiceRequest};
pub use transaction::ServiceClass;
