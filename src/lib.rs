//! OpenFlow 1.3 protocol engine and learning-switch controller over UDP.
//!
//! Each UDP datagram carries exactly one OpenFlow message, which removes the
//! stream framing TCP OpenFlow needs but also removes connection semantics:
//! session identity, handshake sequencing, and liveness detection are all
//! reconstructed here on top of raw datagrams.

mod bits;
pub mod config;
pub mod error;
pub mod learning_switch;
pub mod ofp_controller;
pub mod ofp_header;
pub mod ofp_message;
pub mod openflow0x04;
pub mod packet;
pub mod session;
pub mod transport;

pub use config::Config;
pub use error::{DecodeError, EncodeError, Error, Result, TransportError};
pub use ofp_controller::OfpController;
pub use transport::{Transport, UdpTransport};
