/*!
This module contains the gateway side of the AMT protocol engine.

A [`PseudoInterface`] wraps one tunnel to a relay: the handshake state
lives in a [`TunnelEndpoint`], group subscriptions in two membership
managers, and inbound multicast traffic is fanned out to registered
[`PacketConsumer`]s.  Interfaces are shared through the
[`InterfaceRegistry`], which reference-counts them per relay discovery
address.

Sockets hide behind the [`DatagramTransport`] and [`TransportFactory`]
traits so the whole engine can be driven by in-memory transports in
tests.
*/

mod errors;
mod pseudo_interface;
mod registry;
mod transport;
mod tunnel;

pub mod transforms;


pub use self::errors::{GatewayError, TransportError};
pub use self::pseudo_interface::{PacketConsumer, PseudoInterface};
pub use self::registry::InterfaceRegistry;
pub use self::transport::{
    DatagramTransport, TransportEvent, TransportFactory, UdpTransport, UdpTransportFactory,
};
pub use self::tunnel::TunnelEndpoint;

use std::time::Duration;

use crate::membership::MembershipConfig;
use crate::messages::AMT_PORT;

/// Tuning knobs for a gateway and the pseudo-interfaces it opens.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// UDP port the relay listens on.
    pub relay_port: u16,

    /// How often an unanswered relay discovery is retransmitted.
    pub discovery_retry_period: Duration,

    /// How long a completed relay discovery stays valid before the
    /// tunnel re-enters discovery.
    pub discovery_refresh_period: Duration,

    /// Upper bound on one blocking receive; the receive loop checks the
    /// lifecycle between waits.
    pub receive_timeout: Duration,

    pub membership: MembershipConfig,
}

impl Default for GatewayConfig {
    fn default() -> GatewayConfig {
        GatewayConfig {
            relay_port: AMT_PORT,
            discovery_retry_period: Duration::from_secs(1),
            discovery_refresh_period: Duration::from_secs(50),
            receive_timeout: Duration::from_millis(500),
            membership: MembershipConfig::default(),
        }
    }
}
