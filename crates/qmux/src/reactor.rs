//! The per-device reactor.
//!
//! One reactor owns one character device, the frame buffer, the
//! transaction table, and the indication subscriber. Callers never touch
//! any of that state: a cloneable [`Qmux`] handle sends submissions over a
//! channel, and every completion comes back through a per-call oneshot.
//!
//! ```text
//!  callers ── mpsc ──▶ ┌──────────────────────────────┐
//!                      │            Reactor           │
//!  timers ── mpsc ──▶  │  device ∘ framer ∘ table     │ ──▶ oneshot waiters
//!                      │  (sole owner and mutator)    │ ──▶ indication callback
//!  device bytes ─────▶ └──────────────────────────────┘
//! ```
//!
//! Routing, timer arming, reopen-after-hangup, and shutdown all happen on
//! this single task, so the table needs no locks and the write path is
//! naturally serialized.

use std::io::{self, IoSlice};
use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::device::{CharDevice, DeviceOpener};
use crate::error::CallError;
use crate::frame::{self, FrameBuffer, MessageKind, QmuxMessage};
use crate::request::{Response, ServiceRequest};
use crate::transaction::{Entry, ServiceClass, TransactionTable};

/// Default per-call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

const SUBMISSION_QUEUE: usize = 64;
const REOPEN_DELAY_MIN: Duration = Duration::from_millis(100);
const REOPEN_DELAY_MAX: Duration = Duration::from_secs(5);

/// An unsolicited message, as delivered to the subscriber callback.
///
/// The transport hands over the raw TLV area; the service layer knows how
/// to read it.
#[derive(Debug, Clone)]
pub struct Indication {
    pub service_id: u8,
    pub client_id: u8,
    pub message_id: u16,
    pub message: Bytes,
}

/// Subscriber callback. Invoked synchronously on the reactor task, so it
/// must be quick or hand off to its own executor.
pub type IndicationHandler = Box<dyn Fn(Indication) + Send>;

/// Configuration for a reactor: a name for log lines, and an optional
/// indication subscriber. Nothing else.
pub struct Builder {
    name: String,
    indication: Option<IndicationHandler>,
}

impl Builder {
    fn new() -> Self {
        Self {
            name: "qmux".to_string(),
            indication: None,
        }
    }

    /// Identifier used to namespace this reactor's log output.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Install the indication subscriber. Without one, indications are
    /// parsed and discarded.
    pub fn on_indication(mut self, handler: impl Fn(Indication) + Send + 'static) -> Self {
        self.indication = Some(Box::new(handler));
        self
    }

    /// Open the character device at `path` and spawn the reactor.
    pub async fn open(self, path: impl AsRef<Path>) -> io::Result<Qmux> {
        self.open_with(CharDevice::new(path)).await
    }

    /// Spawn the reactor over any [`DeviceOpener`]. The first open happens
    /// here so a bad path fails construction instead of every call.
    pub async fn open_with<O: DeviceOpener>(self, mut opener: O) -> io::Result<Qmux> {
        let stream = opener.open().await?;
        let (cmd_tx, cmd_rx) = mpsc::channel(SUBMISSION_QUEUE);
        let (expired_tx, expired_rx) = mpsc::unbounded_channel();
        let reactor = Reactor {
            name: self.name,
            opener,
            device: Some(stream),
            frames: FrameBuffer::new(),
            table: TransactionTable::new(),
            cmd_rx,
            expired_tx,
            expired_rx,
            indication: self.indication,
            retry_at: Instant::now(),
            retry_delay: REOPEN_DELAY_MIN,
        };
        tokio::spawn(reactor.run());
        Ok(Qmux { cmd: cmd_tx })
    }
}

/// Handle to a running reactor. Cheap to clone; the reactor shuts down
/// when [`Qmux::shutdown`] is called or every handle is dropped.
#[derive(Clone)]
pub struct Qmux {
    cmd: mpsc::Sender<Command>,
}

enum Command {
    Call {
        service_id: u8,
        client_id: u8,
        payload: Bytes,
        timeout: Duration,
        reply: oneshot::Sender<Result<Response, CallError>>,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

impl Qmux {
    pub fn builder() -> Builder {
        Builder::new()
    }

    /// Submit a request and wait for its decoded response.
    ///
    /// Terminates in bounded time: success, a modem-reported error, or a
    /// transport error, never a silent hang. The reactor's per-call timer
    /// is authoritative; the outer wait at twice the timeout only guards
    /// against a wedged reactor, so the caller still sees a structured
    /// timeout.
    pub async fn call<R: ServiceRequest>(
        &self,
        client_id: u8,
        request: &R,
        timeout: Duration,
    ) -> Result<R::Output, CallError> {
        let (reply, rx) = oneshot::channel();
        self.cmd
            .send(Command::Call {
                service_id: request.service_id(),
                client_id,
                payload: request.payload(),
                timeout,
                reply,
            })
            .await
            .map_err(|_| CallError::Shutdown)?;

        let response = match tokio::time::timeout(timeout * 2, rx).await {
            Ok(Ok(result)) => result?,
            Ok(Err(_)) => return Err(CallError::Shutdown),
            Err(_) => return Err(CallError::Timeout),
        };
        if response.message_id != request.message_id() {
            return Err(CallError::UnexpectedResponse);
        }
        request.decode(&response.message).map_err(CallError::Decode)
    }

    /// Fail every pending call with `shutdown` and stop the reactor.
    pub async fn shutdown(&self) {
        let (done, rx) = oneshot::channel();
        if self.cmd.send(Command::Shutdown { done }).await.is_ok() {
            let _ = rx.await;
        }
    }
}

enum IoEvent<S> {
    /// Bytes were appended to the frame buffer.
    Data,
    /// EOF from the device.
    Closed,
    ReadError(io::Error),
    Opened(S),
    OpenFailed(io::Error),
}

enum Step<S> {
    Cmd(Option<Command>),
    Expired(u16),
    Io(IoEvent<S>),
}

struct Reactor<O: DeviceOpener> {
    name: String,
    opener: O,
    device: Option<O::Stream>,
    frames: FrameBuffer,
    table: TransactionTable,
    cmd_rx: mpsc::Receiver<Command>,
    expired_tx: mpsc::UnboundedSender<u16>,
    expired_rx: mpsc::UnboundedReceiver<u16>,
    indication: Option<IndicationHandler>,
    retry_at: Instant,
    retry_delay: Duration,
}

impl<O: DeviceOpener> Reactor<O> {
    async fn run(mut self) {
        tracing::debug!(name = %self.name, "reactor started");
        loop {
            let step = tokio::select! {
                cmd = self.cmd_rx.recv() => Step::Cmd(cmd),
                Some(id) = self.expired_rx.recv() => Step::Expired(id),
                event = Self::device_event(
                    &mut self.device,
                    &mut self.opener,
                    &mut self.frames,
                    self.retry_at,
                ) => Step::Io(event),
            };
            match step {
                Step::Cmd(Some(Command::Call {
                    service_id,
                    client_id,
                    payload,
                    timeout,
                    reply,
                })) => {
                    self.handle_call(service_id, client_id, payload, timeout, reply)
                        .await;
                }
                Step::Cmd(Some(Command::Shutdown { done })) => {
                    self.shutdown();
                    let _ = done.send(());
                    return;
                }
                // Every handle dropped.
                Step::Cmd(None) => {
                    self.shutdown();
                    return;
                }
                Step::Expired(id) => self.table.expire(id),
                Step::Io(event) => self.handle_io(event),
            }
        }
    }

    /// The next device-side event: a read when the device is open, an open
    /// attempt (after the retry deadline) when it is not. Cancel-safe; the
    /// surrounding `select!` may abandon it at any await point.
    async fn device_event(
        device: &mut Option<O::Stream>,
        opener: &mut O,
        frames: &mut FrameBuffer,
        retry_at: Instant,
    ) -> IoEvent<O::Stream> {
        match device {
            Some(stream) => match stream.read_buf(frames.bytes_mut()).await {
                Ok(0) => IoEvent::Closed,
                Ok(_) => IoEvent::Data,
                Err(e) => IoEvent::ReadError(e),
            },
            None => {
                tokio::time::sleep_until(retry_at).await;
                match opener.open().await {
                    Ok(stream) => IoEvent::Opened(stream),
                    Err(e) => IoEvent::OpenFailed(e),
                }
            }
        }
    }

    fn handle_io(&mut self, event: IoEvent<O::Stream>) {
        match event {
            IoEvent::Data => self.drain_frames(),
            IoEvent::Closed => {
                tracing::warn!(name = %self.name, "device closed; reopening");
                self.begin_reopen();
            }
            IoEvent::ReadError(e) => {
                // A persistent error (ENODEV after a modem reset) would
                // spin the loop if we merely logged it.
                tracing::warn!(name = %self.name, error = %e, "device read error; reopening");
                self.begin_reopen();
            }
            IoEvent::Opened(stream) => {
                tracing::info!(name = %self.name, "device opened");
                self.device = Some(stream);
                self.retry_delay = REOPEN_DELAY_MIN;
            }
            IoEvent::OpenFailed(e) => {
                tracing::warn!(
                    name = %self.name,
                    error = %e,
                    retry_in = ?self.retry_delay,
                    "device open failed"
                );
                self.retry_at = Instant::now() + self.retry_delay;
                self.retry_delay = (self.retry_delay * 2).min(REOPEN_DELAY_MAX);
            }
        }
    }

    /// Drop the device and schedule a reopen. Pending entries stay in the
    /// table; their timers fire normally.
    fn begin_reopen(&mut self) {
        self.device = None;
        self.frames.clear();
        self.retry_at = Instant::now();
        self.retry_delay = REOPEN_DELAY_MIN;
    }

    fn drain_frames(&mut self) {
        while let Some(parsed) = self.frames.next_message() {
            match parsed {
                Ok(msg) => self.route(msg),
                Err(e) => {
                    tracing::warn!(name = %self.name, error = %e, "dropping malformed frame");
                }
            }
        }
    }

    fn route(&mut self, msg: QmuxMessage) {
        match msg.kind {
            MessageKind::Indication => {
                tracing::trace!(
                    service_id = msg.service_id,
                    message_id = msg.message_id,
                    "indication"
                );
                let indication = Indication {
                    service_id: msg.service_id,
                    client_id: msg.client_id,
                    message_id: msg.message_id,
                    message: msg.message,
                };
                match &self.indication {
                    Some(handler) => handler(indication),
                    None => tracing::trace!("no subscriber; indication discarded"),
                }
            }
            MessageKind::Response => match msg.result {
                Ok(()) => {
                    let response = Response {
                        message_id: msg.message_id,
                        message: msg.message,
                    };
                    if !self.table.complete(msg.transaction_id, response) {
                        tracing::warn!(
                            transaction_id = msg.transaction_id,
                            "response for unknown transaction"
                        );
                    }
                }
                Err(err) => {
                    if !self.table.fail(msg.transaction_id, CallError::Qmi(err)) {
                        tracing::warn!(
                            transaction_id = msg.transaction_id,
                            "failure for unknown transaction"
                        );
                    }
                }
            },
        }
    }

    async fn handle_call(
        &mut self,
        service_id: u8,
        client_id: u8,
        payload: Bytes,
        timeout: Duration,
        reply: oneshot::Sender<Result<Response, CallError>>,
    ) {
        let Some(device) = self.device.as_mut() else {
            let _ = reply.send(Err(CallError::DeviceClosed));
            return;
        };

        let id = self.table.allocate(ServiceClass::of(service_id));
        let timer = {
            let expired = self.expired_tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                let _ = expired.send(id);
            })
        };
        // Install before the write so a reply racing the write completion
        // still finds its waiter.
        self.table.install(id, Entry { reply, timer });

        let header = frame::encode_header(service_id, client_id, id, payload.len());
        tracing::trace!(
            service_id,
            client_id,
            transaction_id = id,
            payload_len = payload.len(),
            "writing request"
        );
        if let Err(e) = write_all_vectored(device, header.as_bytes(), &payload).await {
            tracing::warn!(name = %self.name, error = %e, "request write failed");
            if let Some(entry) = self.table.remove(id) {
                entry.timer.abort();
                let _ = entry.reply.send(Err(CallError::Write(e)));
            }
        }
    }

    fn shutdown(&mut self) {
        tracing::debug!(
            name = %self.name,
            pending = self.table.pending(),
            "reactor shutting down"
        );
        self.table.shutdown();
        self.device = None;
    }
}

/// Write header and payload as one scatter/gather operation, continuing
/// through short writes.
async fn write_all_vectored<S: AsyncWrite + Unpin>(
    stream: &mut S,
    header: &[u8],
    payload: &[u8],
) -> io::Result<()> {
    let mut slices = [IoSlice::new(header), IoSlice::new(payload)];
    let mut bufs: &mut [IoSlice<'_>] = &mut slices;
    while bufs.iter().map(|b| b.len()).sum::<usize>() > 0 {
        let n = stream.write_vectored(bufs).await?;
        if n == 0 {
            return Err(io::ErrorKind::WriteZero.into());
        }
        IoSlice::advance_slices(&mut bufs, n);
    }
    stream.flush().await
}
