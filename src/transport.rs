//! The UDP transport adapter.
//!
//! One datagram carries exactly one OpenFlow message, so there is no stream
//! framing to reassemble; that property is the whole reason this engine can
//! run OpenFlow over UDP. The adapter does no logging of its own; the
//! dispatcher owns observability.

use std::io::ErrorKind;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use crate::error::TransportError;
use crate::openflow0x04::message::MAX_DATAGRAM_LEN;

/// The seam between the protocol engine and the wire.
///
/// Handshake, keepalive, and learning paths send through this trait so tests
/// can capture outbound frames without a socket. A datagram send is atomic;
/// implementations must tolerate concurrent callers.
pub trait Transport: Send + Sync {
    /// Send one marshaled OpenFlow message to `peer`.
    fn send(&self, buf: &[u8], peer: SocketAddr) -> Result<(), TransportError>;
}

/// Production transport over a bound UDP socket.
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Bind the controller socket. The read timeout bounds how long `recv`
    /// blocks so the receive loop can interleave shutdown checks.
    pub fn bind<A: ToSocketAddrs>(addr: A, read_timeout: Duration) -> Result<UdpTransport, TransportError> {
        let socket = UdpSocket::bind(addr).map_err(TransportError::Bind)?;
        socket
            .set_read_timeout(Some(read_timeout))
            .map_err(TransportError::Bind)?;
        Ok(UdpTransport { socket })
    }

    /// The address the socket actually bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.socket.local_addr().map_err(TransportError::Bind)
    }

    /// Receive one datagram. `Ok(None)` means the bounded wait elapsed with
    /// nothing to read; socket-level failures are fatal.
    pub fn recv(&self) -> Result<Option<(Vec<u8>, SocketAddr)>, TransportError> {
        let mut buf = [0u8; MAX_DATAGRAM_LEN];
        match self.socket.recv_from(&mut buf) {
            Ok((len, peer)) => Ok(Some((buf[..len].to_vec(), peer))),
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                Ok(None)
            }
            Err(e) => Err(TransportError::Recv(e)),
        }
    }
}

impl Transport for UdpTransport {
    fn send(&self, buf: &[u8], peer: SocketAddr) -> Result<(), TransportError> {
        self.socket
            .send_to(buf, peer)
            .map_err(TransportError::Send)?;
        Ok(())
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use parking_lot::Mutex;

    /// Captures every outbound frame instead of touching a socket.
    #[derive(Default)]
    pub struct RecordingTransport {
        sent: Mutex<Vec<(SocketAddr, Vec<u8>)>>,
    }

    impl RecordingTransport {
        pub fn new() -> RecordingTransport {
            RecordingTransport::default()
        }

        /// All frames sent so far, in order.
        pub fn sent(&self) -> Vec<(SocketAddr, Vec<u8>)> {
            self.sent.lock().clone()
        }

        pub fn clear(&self) {
            self.sent.lock().clear();
        }
    }

    impl Transport for RecordingTransport {
        fn send(&self, buf: &[u8], peer: SocketAddr) -> Result<(), TransportError> {
            self.sent.lock().push((peer, buf.to_vec()));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bound_socket_roundtrip() {
        let a = UdpTransport::bind("127.0.0.1:0", Duration::from_millis(200)).unwrap();
        let b = UdpTransport::bind("127.0.0.1:0", Duration::from_millis(200)).unwrap();
        let b_addr = b.local_addr().unwrap();
        a.send(&[1, 2, 3], b_addr).unwrap();
        let (data, from) = b.recv().unwrap().expect("datagram should arrive");
        assert_eq!(data, vec![1, 2, 3]);
        assert_eq!(from, a.local_addr().unwrap());
    }

    #[test]
    fn recv_times_out_quietly() {
        let t = UdpTransport::bind("127.0.0.1:0", Duration::from_millis(50)).unwrap();
        assert!(t.recv().unwrap().is_none());
    }
}
