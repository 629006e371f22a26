//! Network module - Datagrams and the ports that carry them
//!
//! Provides:
//! - The DDP datagram value type and its header encodings
//! - The port abstraction the router and services send through
//! - A virtual broadcast medium for simulations and tests

mod datagram;
mod port;
mod virtual_network;

pub use datagram::*;
pub use port::*;
pub use virtual_network::*;
