//! Multicast endpoint description.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use thiserror::Error;

/// Default multicast group images are published on.
pub const DEFAULT_GROUP: Ipv4Addr = Ipv4Addr::new(230, 0, 0, 0);

/// Default UDP port.
pub const DEFAULT_PORT: u16 = 4446;

/// Default per-read buffer capacity in bytes.
///
/// A datagram of exactly this size is treated as a non-final fragment.
pub const DEFAULT_CAPACITY: usize = 65_000;

/// Largest payload a single IPv4 UDP datagram can carry.
pub const MAX_UDP_PAYLOAD: usize = 65_507;

/// Rejected endpoint parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
    /// The group is not in `224.0.0.0/4`.
    #[error("{0} is not an IPv4 multicast address")]
    NotMulticast(Ipv4Addr),
    /// Capacity is zero or larger than a UDP datagram can be.
    #[error("buffer capacity {0} is outside 1..=65507")]
    Capacity(usize),
}

/// Where to listen for images: group, port, read capacity and interface.
///
/// Immutable once built; the receiver copies it into every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MulticastEndpoint {
    group: Ipv4Addr,
    port: u16,
    capacity: usize,
    interface: Ipv4Addr,
}

impl MulticastEndpoint {
    /// Creates an endpoint joining `group` on any interface.
    ///
    /// # Errors
    ///
    /// Returns an error if `group` is not a multicast address or `capacity`
    /// cannot be the size of a UDP datagram.
    pub fn new(group: Ipv4Addr, port: u16, capacity: usize) -> Result<Self, EndpointError> {
        if !group.is_multicast() {
            return Err(EndpointError::NotMulticast(group));
        }
        if capacity == 0 || capacity > MAX_UDP_PAYLOAD {
            return Err(EndpointError::Capacity(capacity));
        }
        Ok(Self {
            group,
            port,
            capacity,
            interface: Ipv4Addr::UNSPECIFIED,
        })
    }

    /// Returns a copy that joins the group on the given local interface.
    #[must_use]
    pub const fn with_interface(mut self, interface: Ipv4Addr) -> Self {
        self.interface = interface;
        self
    }

    /// Multicast group address.
    #[must_use]
    pub const fn group(&self) -> Ipv4Addr {
        self.group
    }

    /// UDP port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Per-read buffer capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Local interface used for the group membership.
    #[must_use]
    pub const fn interface(&self) -> Ipv4Addr {
        self.interface
    }

    /// Address the receiving socket binds to (`0.0.0.0:port`).
    #[must_use]
    pub const fn bind_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, self.port))
    }

    /// Destination a sender addresses datagrams to (`group:port`).
    #[must_use]
    pub const fn group_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.group, self.port))
    }
}

impl Default for MulticastEndpoint {
    fn default() -> Self {
        Self {
            group: DEFAULT_GROUP,
            port: DEFAULT_PORT,
            capacity: DEFAULT_CAPACITY,
            interface: Ipv4Addr::UNSPECIFIED,
        }
    }
}

impl fmt::Display for MulticastEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_published_constants() {
        let ep = MulticastEndpoint::default();
        assert_eq!(ep.group(), Ipv4Addr::new(230, 0, 0, 0));
        assert_eq!(ep.port(), 4446);
        assert_eq!(ep.capacity(), 65_000);
        assert_eq!(ep.interface(), Ipv4Addr::UNSPECIFIED);
    }

    #[test]
    fn rejects_unicast_group() {
        let err = MulticastEndpoint::new(Ipv4Addr::new(10, 0, 0, 1), 4446, 1024).unwrap_err();
        assert_eq!(err, EndpointError::NotMulticast(Ipv4Addr::new(10, 0, 0, 1)));
    }

    #[test]
    fn rejects_out_of_range_capacity() {
        let group = Ipv4Addr::new(239, 1, 2, 3);
        assert_eq!(
            MulticastEndpoint::new(group, 1, 0).unwrap_err(),
            EndpointError::Capacity(0)
        );
        assert_eq!(
            MulticastEndpoint::new(group, 1, MAX_UDP_PAYLOAD + 1).unwrap_err(),
            EndpointError::Capacity(MAX_UDP_PAYLOAD + 1)
        );
        assert!(MulticastEndpoint::new(group, 1, MAX_UDP_PAYLOAD).is_ok());
    }

    #[test]
    fn addresses() {
        let ep = MulticastEndpoint::new(Ipv4Addr::new(239, 1, 2, 3), 5000, 1500).unwrap();
        assert_eq!(ep.bind_addr(), "0.0.0.0:5000".parse().unwrap());
        assert_eq!(ep.group_addr(), "239.1.2.3:5000".parse().unwrap());
        assert_eq!(format!("{ep}"), "239.1.2.3:5000");
    }
}
