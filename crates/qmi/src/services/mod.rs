//! Per-service codecs.
//!
//! Each module covers one QMI service: request types implementing
//! [`qmux::ServiceRequest`] plus a parser for the service's indications.
//! Codecs are pure byte transformations; none of them touch a transport.
//! Decoders walk TLV areas through the kernel iterator, so tags they do
//! not recognize are skipped rather than fatal.

pub mod ctl;
pub mod dms;
pub mod nas;
pub mod pds;
pub mod uim;
pub mod wda;
pub mod wds;
pub mod wms;
