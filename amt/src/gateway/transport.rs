//! The datagram transport a tunnel runs over.
//!
//! The trait keeps the protocol engine independent of the socket layer:
//! production code uses [`UdpTransport`], tests substitute recording
//! transports.  Transport construction is owned by a
//! [`TransportFactory`] injected into the interface registry, so the
//! registry can be exercised without opening sockets.

use bytes::Bytes;
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::gateway::errors::TransportError;

/// Outcome of a bounded receive call: a datagram or an elapsed timeout.
/// Waiting is never silently unbounded.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Datagram { payload: Bytes, source: SocketAddr },
    TimedOut,
}

pub trait DatagramTransport: Send + Sync {
    fn send(&self, payload: &[u8], destination: SocketAddr) -> Result<(), TransportError>;

    fn receive(&self, timeout: Duration) -> Result<TransportEvent, TransportError>;

    fn close(&self) -> Result<(), TransportError>;
}

/// Constructs the transport for a tunnel to the given relay discovery
/// address.
pub trait TransportFactory: Send + Sync {
    fn open(
        &self,
        relay_discovery_address: IpAddr,
    ) -> Result<Arc<dyn DatagramTransport>, TransportError>;
}

/// A [`DatagramTransport`] over a UDP socket.
pub struct UdpTransport {
    socket: UdpSocket,
    closed: AtomicBool,
}

impl UdpTransport {
    /// Binds an unspecified local address of the same family as the
    /// relay discovery address.
    pub fn bind_for(relay_discovery_address: IpAddr) -> Result<UdpTransport, TransportError> {
        let local: SocketAddr = if relay_discovery_address.is_ipv4() {
            "0.0.0.0:0".parse().map_err(|_| TransportError::Closed)?
        } else {
            "[::]:0".parse().map_err(|_| TransportError::Closed)?
        };

        Ok(UdpTransport {
            socket: UdpSocket::bind(local)?,
            closed: AtomicBool::new(false),
        })
    }

    fn check_open(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        Ok(())
    }
}

impl DatagramTransport for UdpTransport {
    fn send(&self, payload: &[u8], destination: SocketAddr) -> Result<(), TransportError> {
        self.check_open()?;
        self.socket.send_to(payload, destination)?;
        Ok(())
    }

    fn receive(&self, timeout: Duration) -> Result<TransportEvent, TransportError> {
        self.check_open()?;
        self.socket.set_read_timeout(Some(timeout))?;

        let mut buffer = [0_u8; 65_536];
        match self.socket.recv_from(&mut buffer) {
            Ok((length, source)) => Ok(TransportEvent::Datagram {
                payload: Bytes::copy_from_slice(&buffer[..length]),
                source,
            }),
            Err(error)
                if error.kind() == std::io::ErrorKind::WouldBlock
                    || error.kind() == std::io::ErrorKind::TimedOut =>
            {
                Ok(TransportEvent::TimedOut)
            }
            Err(error) => Err(TransportError::Io(error)),
        }
    }

    fn close(&self) -> Result<(), TransportError> {
        // The socket itself is released when the transport is dropped.
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// The default factory: one UDP socket per tunnel.
pub struct UdpTransportFactory;

impl TransportFactory for UdpTransportFactory {
    fn open(
        &self,
        relay_discovery_address: IpAddr,
    ) -> Result<Arc<dyn DatagramTransport>, TransportError> {
        Ok(Arc::new(UdpTransport::bind_for(relay_discovery_address)?))
    }
}
