use thiserror::Error;

use std::io;
use std::net::IpAddr;

use crate::membership::MembershipStateError;
use crate::messages::MessageSerializationError;
use mcast_proto::errors::PacketSerializationError;

/// Enumeration that represents the failures of the underlying datagram
/// transport.  These are terminal for the affected interface: the
/// lifecycle transitions to `Failed` and resources are released.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The underlying socket send or receive failed
    #[error("An IO error occurred on the tunnel transport: {0}")]
    Io(#[from] io::Error),

    /// The transport has already been closed
    #[error("The tunnel transport has been closed")]
    Closed,
}

/// Enumeration that represents the errors the gateway surface can
/// return to its callers.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Membership(#[from] MembershipStateError),

    /// An outgoing AMT message could not be serialized
    #[error("Failed to serialize an outgoing message: {0}")]
    MessageSerialization(#[from] MessageSerializationError),

    /// An outgoing IGMP/MLD packet could not be serialized
    #[error("Failed to serialize an outgoing packet: {0}")]
    PacketSerialization(#[from] PacketSerializationError),

    /// A send was attempted before relay discovery completed
    #[error("No relay is available for the tunnel yet")]
    NoRelay,

    /// A release was attempted for an interface that was never acquired
    #[error("No pseudo-interface is held for relay discovery address {address}")]
    InterfaceNotAcquired { address: IpAddr },
}
