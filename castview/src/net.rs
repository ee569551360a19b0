//! Network transport primitives.
//!
//! Multicast endpoint configuration plus the blocking sockets the receiver
//! and sender are built on.

pub mod endpoint;
pub mod socket;

pub use endpoint::{EndpointError, MulticastEndpoint};
pub use socket::{MulticastSender, MulticastSocket};
