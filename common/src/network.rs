use std::net::SocketAddrV4;

pub mod interface;
pub mod range;
pub mod target;

/// An IPv4 address paired with a TCP port. The correlation key used by every stage.
pub type AddressPort = SocketAddrV4;
