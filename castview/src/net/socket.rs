//! Blocking multicast sockets.
//!
//! Sockets are built with [`socket2`] so `SO_REUSEADDR` can be set before
//! binding, then handed to [`std::net::UdpSocket`] for the I/O calls. Kernel
//! buffer sizes are read and written through `rustix`.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::os::fd::{AsFd, BorrowedFd};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

use super::MulticastEndpoint;
use crate::trace::{debug, warn};

/// A UDP socket that is a member of one multicast group.
///
/// Membership is taken in [`MulticastSocket::join`] and given back exactly
/// once: either through [`MulticastSocket::leave`] or when the value is
/// dropped. The file descriptor closes on drop either way.
#[derive(Debug)]
pub struct MulticastSocket {
    inner: UdpSocket,
    group: Ipv4Addr,
    interface: Ipv4Addr,
    joined: bool,
}

impl MulticastSocket {
    /// Binds `0.0.0.0:port` with address reuse and joins the endpoint's group.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be created, bound, or added to
    /// the group (e.g. no multicast-capable interface).
    pub fn join(endpoint: &MulticastEndpoint) -> io::Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&endpoint.bind_addr().into())?;
        socket.join_multicast_v4(&endpoint.group(), &endpoint.interface())?;

        debug!(
            group = %endpoint.group(),
            port = endpoint.port(),
            interface = %endpoint.interface(),
            "joined multicast group"
        );

        Ok(Self {
            inner: socket.into(),
            group: endpoint.group(),
            interface: endpoint.interface(),
            joined: true,
        })
    }

    /// Returns the local address this socket is bound to.
    ///
    /// # Errors
    ///
    /// Returns an error if the local address cannot be retrieved.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    /// Blocks until one datagram arrives and copies it into `buf`.
    ///
    /// Returns the datagram length. Bytes beyond `buf.len()` are discarded by
    /// the kernel, so callers size `buf` to the endpoint capacity.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure, or `WouldBlock`/`TimedOut` when a
    /// read timeout is set and expires.
    pub fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.recv_from(buf).map(|(n, _)| n)
    }

    /// Sets how long [`recv`](Self::recv) may block. `None` blocks forever.
    ///
    /// # Errors
    ///
    /// Returns an error if the option cannot be set or `timeout` is zero.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.inner.set_read_timeout(timeout)
    }

    /// Sets the socket's receive buffer size.
    ///
    /// # Errors
    ///
    /// Returns an error if the option cannot be set.
    pub fn set_recv_buffer_size(&self, size: usize) -> io::Result<()> {
        rustix::net::sockopt::set_socket_recv_buffer_size(self.inner.as_fd(), size)?;
        Ok(())
    }

    /// Gets the socket's receive buffer size.
    ///
    /// # Errors
    ///
    /// Returns an error if the option cannot be retrieved.
    pub fn recv_buffer_size(&self) -> io::Result<usize> {
        Ok(rustix::net::sockopt::socket_recv_buffer_size(
            self.inner.as_fd(),
        )?)
    }

    /// Leaves the group now and reports the outcome.
    ///
    /// # Errors
    ///
    /// Returns the error from `IP_DROP_MEMBERSHIP`. The socket is closed
    /// regardless.
    pub fn leave(mut self) -> io::Result<()> {
        self.drop_membership()
    }

    fn drop_membership(&mut self) -> io::Result<()> {
        if !self.joined {
            return Ok(());
        }
        self.joined = false;
        self.inner.leave_multicast_v4(&self.group, &self.interface)?;
        debug!(group = %self.group, "left multicast group");
        Ok(())
    }
}

impl Drop for MulticastSocket {
    fn drop(&mut self) {
        if let Err(e) = self.drop_membership() {
            warn!(group = %self.group, error = %e, "failed to leave multicast group");
        }
    }
}

impl AsFd for MulticastSocket {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.inner.as_fd()
    }
}

/// A UDP socket for publishing datagrams to a multicast group.
#[derive(Debug)]
pub struct MulticastSender {
    inner: UdpSocket,
}

impl MulticastSender {
    /// Binds an ephemeral port on `interface` and routes multicast through it.
    ///
    /// Loopback is enabled so a receiver on the same host sees the datagrams.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be created or configured.
    pub fn bind(interface: Ipv4Addr, ttl: u32) -> io::Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.bind(&SocketAddr::V4(SocketAddrV4::new(interface, 0)).into())?;
        socket.set_multicast_ttl_v4(ttl)?;
        socket.set_multicast_loop_v4(true)?;
        if !interface.is_unspecified() {
            socket.set_multicast_if_v4(&interface)?;
        }
        Ok(Self {
            inner: socket.into(),
        })
    }

    /// Sends one datagram to `dest`, returning the number of bytes sent.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    pub fn send_to(&self, buf: &[u8], dest: SocketAddr) -> io::Result<usize> {
        self.inner.send_to(buf, dest)
    }

    /// Sets the socket's send buffer size.
    ///
    /// # Errors
    ///
    /// Returns an error if the option cannot be set.
    pub fn set_send_buffer_size(&self, size: usize) -> io::Result<()> {
        rustix::net::sockopt::set_socket_send_buffer_size(self.inner.as_fd(), size)?;
        Ok(())
    }
}
