//! Publishes encoded images to a multicast group.
//!
//! The counterpart of [`Receiver`](crate::receiver::Receiver): an image is
//! cut into datagrams with [`framing::split`] and sent in order. With the
//! default short-datagram framing the receiver's capacity must equal the
//! sender's, otherwise the end-of-message test misfires.

use std::io;
use std::net::SocketAddr;
use std::thread;
use std::time::Duration;

use thiserror::Error;

use crate::net::{MulticastEndpoint, MulticastSender};
use crate::receiver::framing::{self, Framing, FramingError};
use crate::trace::{debug, trace};

/// Failure publishing an image.
#[derive(Debug, Error)]
pub enum SendError {
    /// The socket could not be created or a send failed.
    #[error("send failed: {0}")]
    Io(#[from] io::Error),
    /// The image cannot be framed with the configured capacity.
    #[error(transparent)]
    Framing(#[from] FramingError),
    /// The kernel accepted fewer bytes than the datagram held.
    #[error("short send: {sent} of {len} bytes")]
    ShortSend { sent: usize, len: usize },
}

/// Sender settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenderConfig {
    /// Group, port and datagram capacity to publish with.
    pub endpoint: MulticastEndpoint,
    /// End-of-message policy shared with the receivers.
    pub framing: Framing,
    /// Multicast TTL.
    pub ttl: u32,
    /// Pause between datagrams of one image; gives receivers time to drain.
    pub pacing: Duration,
    /// Kernel send buffer size to request; `None` keeps the OS default.
    pub send_buffer_size: Option<usize>,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            endpoint: MulticastEndpoint::default(),
            framing: Framing::ShortDatagram,
            ttl: 1,
            pacing: Duration::ZERO,
            send_buffer_size: None,
        }
    }
}

/// What one [`ImageSender::send`] put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendReport {
    /// Datagrams sent, terminator included.
    pub datagrams: usize,
    /// Bytes sent, framing headers included.
    pub bytes: usize,
}

/// A bound socket that publishes images to one group.
#[derive(Debug)]
pub struct ImageSender {
    socket: MulticastSender,
    config: SenderConfig,
}

impl ImageSender {
    /// Binds a sending socket on the endpoint's interface.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be created or configured.
    pub fn bind(config: SenderConfig) -> Result<Self, SendError> {
        let socket = MulticastSender::bind(config.endpoint.interface(), config.ttl)?;
        if let Some(size) = config.send_buffer_size {
            socket.set_send_buffer_size(size)?;
        }
        Ok(Self { socket, config })
    }

    /// The settings this sender was bound with.
    #[must_use]
    pub const fn config(&self) -> &SenderConfig {
        &self.config
    }

    /// Sends `image` to the group.
    ///
    /// # Errors
    ///
    /// Returns an error if the image cannot be framed or a send fails.
    pub fn send(&self, image: &[u8]) -> Result<SendReport, SendError> {
        let dest = self.config.endpoint.group_addr();
        self.send_to(image, dest)
    }

    /// Sends `image` to an explicit destination instead of the group.
    ///
    /// # Errors
    ///
    /// Returns an error if the image cannot be framed or a send fails.
    pub fn send_to(&self, image: &[u8], dest: SocketAddr) -> Result<SendReport, SendError> {
        let datagrams = framing::split(
            image,
            self.config.endpoint.capacity(),
            self.config.framing,
        )?;
        let mut report = SendReport {
            datagrams: 0,
            bytes: 0,
        };

        for (i, datagram) in datagrams.iter().enumerate() {
            if i > 0 && !self.config.pacing.is_zero() {
                thread::sleep(self.config.pacing);
            }
            let sent = self.socket.send_to(datagram, dest)?;
            if sent != datagram.len() {
                return Err(SendError::ShortSend {
                    sent,
                    len: datagram.len(),
                });
            }
            trace!(len = sent, "datagram sent");
            report.datagrams += 1;
            report.bytes += sent;
        }

        debug!(
            %dest,
            datagrams = report.datagrams,
            bytes = report.bytes,
            "image sent"
        );
        Ok(report)
    }
}
