//! The character-device channel.
//!
//! The reactor talks to `/dev/cdc-wdm*` through a plain byte stream. The
//! stream is produced by a [`DeviceOpener`] so the reactor can reopen the
//! device after a hang-up, and so tests can substitute an in-memory pipe.

use std::fs::File;
use std::future::Future;
use std::io::{self, IoSlice, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use tokio::io::unix::AsyncFd;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Source of (re-)openable device streams.
///
/// `open` is called once at start-up and again after every closed event.
/// Idempotent re-open must be permitted.
pub trait DeviceOpener: Send + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn open(&mut self) -> impl Future<Output = io::Result<Self::Stream>> + Send;
}

/// Opens a QMI character device read/write and non-blocking.
#[derive(Debug, Clone)]
pub struct CharDevice {
    path: PathBuf,
}

impl CharDevice {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DeviceOpener for CharDevice {
    type Stream = CdcStream;

    async fn open(&mut self) -> io::Result<CdcStream> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&self.path)?;
        CdcStream::new(file)
    }
}

/// A non-blocking character device registered with the tokio reactor.
///
/// Reads and writes go through readiness guards: on `WouldBlock` the guard
/// clears readiness and we park until epoll wakes us again.
#[derive(Debug)]
pub struct CdcStream {
    fd: AsyncFd<File>,
}

impl CdcStream {
    pub fn new(file: File) -> io::Result<Self> {
        Ok(Self {
            fd: AsyncFd::new(file)?,
        })
    }
}

impl AsyncRead for CdcStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let me = self.get_mut();
        loop {
            let mut guard = ready!(me.fd.poll_read_ready(cx))?;
            let unfilled = buf.initialize_unfilled();
            match guard.try_io(|fd| {
                let mut file = fd.get_ref();
                file.read(unfilled)
            }) {
                Ok(Ok(n)) => {
                    buf.advance(n);
                    return Poll::Ready(Ok(()));
                }
                Ok(Err(e)) => return Poll::Ready(Err(e)),
                Err(_would_block) => continue,
            }
        }
    }
}

impl AsyncWrite for CdcStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        let me = self.get_mut();
        loop {
            let mut guard = ready!(me.fd.poll_write_ready(cx))?;
            match guard.try_io(|fd| {
                let mut file = fd.get_ref();
                file.write(data)
            }) {
                Ok(result) => return Poll::Ready(result),
                Err(_would_block) => continue,
            }
        }
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let me = self.get_mut();
        loop {
            let mut guard = ready!(me.fd.poll_write_ready(cx))?;
            match guard.try_io(|fd| {
                let mut file = fd.get_ref();
                file.write_vectored(bufs)
            }) {
                Ok(result) => return Poll::Ready(result),
                Err(_would_block) => continue,
            }
        }
    }

    fn is_write_vectored(&self) -> bool {
        true
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        // Character devices have no userspace write buffer to drain.
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
