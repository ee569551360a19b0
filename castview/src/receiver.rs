//! Multicast receiver: one blocking call per image.
//!
//! Each call to [`Receiver::receive_one`] opens a fresh transport, reads
//! datagrams until the [`Framing`] policy says the message has ended, and
//! drops the transport before returning. Dropping a [`MulticastSocket`]
//! leaves the group, so membership never outlives the cycle that took it,
//! whether the cycle succeeded or failed.
//!
//! ```text
//! open ─► recv ─► delimiter ─► More ─► recv ...
//!                     │
//!                     ├─► Complete ─► finalize ─► Ok(EncodedImage)
//!                     └─► Err      ─► Err(TransportError)
//! (transport dropped on every path)
//! ```

pub mod framing;

use std::io::{self, ErrorKind};
use std::time::Duration;

use thiserror::Error;

use crate::assembly::{EncodedImage, ReassemblyBuffer};
use crate::net::{MulticastEndpoint, MulticastSocket};
use crate::trace::{debug, trace, warn};

pub use framing::{Framing, FramingError, Progress};
use framing::Delimiter;

/// Transport-level failure of one receive cycle.
///
/// The in-progress message is discarded and the transport released before
/// this is returned. Callers retry by calling `receive_one` again.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The socket could not be created, bound, or joined to the group.
    #[error("failed to open multicast socket: {0}")]
    Open(#[source] io::Error),
    /// A read failed after `received` bytes of the message had arrived.
    #[error("receive failed after {received} bytes: {source}")]
    Receive {
        #[source]
        source: io::Error,
        received: usize,
    },
    /// The read timeout expired after `received` bytes had arrived.
    #[error("read timed out after {received} bytes")]
    TimedOut { received: usize },
    /// The datagrams violated the configured framing.
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),
}

impl TransportError {
    /// Returns `true` for a read timeout with no bytes of a message received.
    #[must_use]
    pub const fn is_idle_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { received: 0 })
    }
}

/// Something datagrams can be read from, one at a time.
pub trait DatagramSource {
    /// Blocks until one datagram arrives, copies it into `buf`, and returns
    /// its length.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the read fails or times out.
    fn recv_datagram(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

impl DatagramSource for MulticastSocket {
    fn recv_datagram(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.recv(buf)
    }
}

/// Opens a [`DatagramSource`] for one receive cycle.
///
/// The returned source must release everything it holds when dropped.
pub trait Transport {
    /// Source type produced by [`open`](Self::open).
    type Source: DatagramSource;

    /// Acquires a fresh source listening on `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Open`] if the source cannot be acquired.
    fn open(&mut self, endpoint: &MulticastEndpoint) -> Result<Self::Source, TransportError>;
}

/// Real multicast transport backed by [`MulticastSocket`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MulticastTransport {
    /// Upper bound on each blocking read; `None` blocks forever.
    pub read_timeout: Option<Duration>,
    /// Kernel receive buffer size to request; `None` keeps the OS default.
    pub recv_buffer_size: Option<usize>,
}

impl Transport for MulticastTransport {
    type Source = MulticastSocket;

    fn open(&mut self, endpoint: &MulticastEndpoint) -> Result<MulticastSocket, TransportError> {
        let socket = MulticastSocket::join(endpoint).map_err(TransportError::Open)?;
        socket
            .set_read_timeout(self.read_timeout)
            .map_err(TransportError::Open)?;
        if let Some(size) = self.recv_buffer_size {
            // Kernels clamp this to their own limit; a refusal is not fatal.
            if let Err(e) = socket.set_recv_buffer_size(size) {
                warn!(requested = size, error = %e, "could not resize receive buffer");
            }
        }
        Ok(socket)
    }
}

/// Reads one complete message from `source`.
///
/// `buf` is the per-read buffer; its length is the capacity `C` that the
/// short-datagram framing compares datagram lengths against.
///
/// # Errors
///
/// Returns a [`TransportError`] if a read fails or times out, or the
/// datagrams violate `framing`. Bytes received so far are discarded.
pub fn receive_message<S: DatagramSource + ?Sized>(
    source: &mut S,
    buf: &mut [u8],
    framing: Framing,
) -> Result<EncodedImage, TransportError> {
    let mut delimiter = Delimiter::new(framing, buf.len());
    let mut assembly = ReassemblyBuffer::new();

    loop {
        let len = match source.recv_datagram(buf) {
            Ok(len) => len,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                return Err(TransportError::TimedOut {
                    received: assembly.len(),
                });
            }
            Err(source) => {
                return Err(TransportError::Receive {
                    source,
                    received: assembly.len(),
                });
            }
        };

        trace!(len, "datagram received");

        let (payload, progress) = delimiter.accept(&buf[..len])?;
        assembly.append(payload);

        if progress == Progress::Complete {
            debug!(
                fragments = assembly.fragment_count(),
                len = assembly.len(),
                "message complete"
            );
            return Ok(assembly.finalize());
        }
    }
}

/// Receives whole images from a multicast group, one per call.
#[derive(Debug)]
pub struct Receiver<T: Transport = MulticastTransport> {
    endpoint: MulticastEndpoint,
    framing: Framing,
    transport: T,
    /// Reusable buffer for receiving datagrams.
    recv_buf: Vec<u8>,
}

impl<T: Transport> Receiver<T> {
    /// Creates a receiver for `endpoint`. No socket is opened until
    /// [`receive_one`](Self::receive_one) is called.
    pub fn new(endpoint: MulticastEndpoint, framing: Framing, transport: T) -> Self {
        Self {
            recv_buf: vec![0u8; endpoint.capacity()],
            endpoint,
            framing,
            transport,
        }
    }

    /// The endpoint this receiver listens on.
    #[must_use]
    pub const fn endpoint(&self) -> &MulticastEndpoint {
        &self.endpoint
    }

    /// The transport used to open sources.
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Opens the transport, receives one complete message, and releases
    /// the transport again.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if opening or reading fails. The
    /// transport is released before the error is returned.
    pub fn receive_one(&mut self) -> Result<EncodedImage, TransportError> {
        let mut source = self.transport.open(&self.endpoint)?;
        receive_message(&mut source, &mut self.recv_buf, self.framing)
    }
}
