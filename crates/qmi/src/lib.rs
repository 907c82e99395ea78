//! qmi: a QMI client for cellular modems.
//!
//! Builds on the `qmux` transport: this crate knows the services. It
//! obtains client ids from the Control service on demand, exposes typed
//! request codecs per service, and parses unsolicited indications into an
//! [`Event`] stream for a subscriber callback.
//!
//! ```ignore
//! let qmi = Qmi::builder()
//!     .name("wwan0")
//!     .on_event(|event| tracing::info!(?event, "modem event"))
//!     .open("/dev/cdc-wdm0")
//!     .await?;
//!
//! let handle = qmi
//!     .call(wds::StartNetworkInterface { apn: Some("internet".into()), ..Default::default() })
//!     .await?;
//! ```
//!
//! Every call terminates with either a value or a [`CallError`]; modem-
//! reported failures arrive as [`CallError::Qmi`] with the symbolic code.

#![forbid(unsafe_code)]

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

pub mod services;

pub use qmux::{
    CallError, DecodeError, DeviceOpener, Indication, ProtocolError, Qmux, ServiceRequest,
    DEFAULT_TIMEOUT,
};

use services::{ctl, nas, pds, uim, wds, wms};

/// A parsed unsolicited event from the modem.
#[derive(Debug, Clone)]
pub enum Event {
    /// Control-service sync: the modem restarted and every client id is
    /// gone.
    Sync,
    PacketServiceStatus(wds::PacketServiceStatus),
    ServingSystem(nas::ServingSystem),
    UimStatusChange,
    NewMessage(wms::MessageLocation),
    PositionSession { status: u8 },
}

fn parse_indication(ind: &Indication) -> Option<Event> {
    match ind.service_id {
        ctl::SERVICE => ctl::parse_indication(ind),
        wds::SERVICE => wds::parse_indication(ind),
        nas::SERVICE => nas::parse_indication(ind),
        uim::SERVICE => uim::parse_indication(ind),
        wms::SERVICE => wms::parse_indication(ind),
        pds::SERVICE => pds::parse_indication(ind),
        _ => None,
    }
}

/// Configuration for a [`Qmi`] client.
pub struct QmiBuilder {
    name: String,
    handler: Option<Box<dyn Fn(Event) + Send>>,
}

impl QmiBuilder {
    fn new() -> Self {
        Self {
            name: "qmi".to_string(),
            handler: None,
        }
    }

    /// Identifier used to namespace this client's log output.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Subscribe to parsed indications. Runs on the reactor task; keep it
    /// quick or hand off to your own executor.
    pub fn on_event(mut self, handler: impl Fn(Event) + Send + 'static) -> Self {
        self.handler = Some(Box::new(handler));
        self
    }

    /// Open the character device at `path`.
    pub async fn open(self, path: impl AsRef<Path>) -> io::Result<Qmi> {
        let (name, builder) = self.into_mux_builder();
        Ok(Qmi::wrap(builder.open(path).await?, name))
    }

    /// Open over any [`DeviceOpener`]; the seam tests use.
    pub async fn open_with<O: DeviceOpener>(self, opener: O) -> io::Result<Qmi> {
        let (name, builder) = self.into_mux_builder();
        Ok(Qmi::wrap(builder.open_with(opener).await?, name))
    }

    fn into_mux_builder(self) -> (String, qmux::Builder) {
        let mut builder = Qmux::builder().name(self.name.clone());
        if let Some(handler) = self.handler {
            builder = builder.on_indication(move |ind| match parse_indication(&ind) {
                Some(event) => handler(event),
                None => tracing::warn!(
                    service_id = ind.service_id,
                    message_id = ind.message_id,
                    "dropping unknown indication"
                ),
            });
        }
        (self.name, builder)
    }
}

/// High-level QMI client. Cheap to clone; all clones share the reactor
/// and the client-id cache.
#[derive(Clone)]
pub struct Qmi {
    mux: Qmux,
    name: Arc<str>,
    clients: Arc<Mutex<HashMap<u8, u8>>>,
}

impl Qmi {
    pub fn builder() -> QmiBuilder {
        QmiBuilder::new()
    }

    fn wrap(mux: Qmux, name: String) -> Self {
        Self {
            mux,
            name: name.into(),
            clients: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The client id for `service`, allocating one from the Control
    /// service on first use. The control service itself is always
    /// addressed as client 0.
    pub async fn client_id(&self, service: u8) -> Result<u8, CallError> {
        if service == ctl::SERVICE {
            return Ok(0);
        }
        if let Some(&id) = self.clients.lock().get(&service) {
            return Ok(id);
        }
        let id = self
            .mux
            .call(0, &ctl::GetClientId { service }, DEFAULT_TIMEOUT)
            .await?;
        match self.clients.lock().entry(service) {
            Entry::Vacant(slot) => {
                tracing::debug!(name = %self.name, service, client_id = id, "client id allocated");
                slot.insert(id);
                Ok(id)
            }
            Entry::Occupied(slot) => {
                // Lost a bootstrap race; hand the spare id back quietly.
                let winner = *slot.get();
                if winner != id {
                    let mux = self.mux.clone();
                    tokio::spawn(async move {
                        let _ = mux
                            .call(0, &ctl::ReleaseClientId { service, client_id: id }, DEFAULT_TIMEOUT)
                            .await;
                    });
                }
                Ok(winner)
            }
        }
    }

    /// Submit a request with the default timeout.
    pub async fn call<R: ServiceRequest>(&self, request: R) -> Result<R::Output, CallError> {
        self.call_with_timeout(request, DEFAULT_TIMEOUT).await
    }

    pub async fn call_with_timeout<R: ServiceRequest>(
        &self,
        request: R,
        timeout: Duration,
    ) -> Result<R::Output, CallError> {
        let client_id = self.client_id(request.service_id()).await?;
        self.mux.call(client_id, &request, timeout).await
    }

    /// Release every cached client id back to the modem.
    pub async fn release_clients(&self) -> Result<(), CallError> {
        let cached: Vec<(u8, u8)> = self.clients.lock().drain().collect();
        for (service, client_id) in cached {
            self.mux
                .call(0, &ctl::ReleaseClientId { service, client_id }, DEFAULT_TIMEOUT)
                .await?;
        }
        Ok(())
    }

    /// Release client ids and stop the reactor. Pending calls fail with
    /// [`CallError::Shutdown`].
    pub async fn shutdown(&self) {
        if self.release_clients().await.is_err() {
            tracing::debug!(name = %self.name, "client release failed during shutdown");
        }
        self.mux.shutdown().await;
    }

    /// The underlying transport handle, for callers that frame their own
    /// requests.
    pub fn mux(&self) -> &Qmux {
        &self.mux
    }
}
