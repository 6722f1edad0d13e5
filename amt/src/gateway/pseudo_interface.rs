//! The pseudo-interface: one AMT tunnel presented as a virtual network
//! interface.
//!
//! It owns the tunnel transport, runs one IPv4/IGMP and one IPv6/MLD
//! membership manager, and fans inbound decapsulated packets out by
//! protocol: membership control traffic goes to the matching manager,
//! everything else to the registered packet consumers.  Outbound
//! reports flow the other way, transformed into IP packets and sent as
//! membership updates.

use bytes::Bytes;
use log::{debug, warn};
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use mcast_proto::igmp::{MembershipQueryV3, IGMP_PROTOCOL_NUMBER, MEMBERSHIP_QUERY_TYPE};
use mcast_proto::ip::IpPacket;
use mcast_proto::mld::{ListenerQueryV2, ICMPV6_PROTOCOL_NUMBER, LISTENER_QUERY_TYPE};

use crate::gateway::errors::{GatewayError, TransportError};
use crate::gateway::transforms;
use crate::gateway::transport::{DatagramTransport, TransportEvent};
use crate::gateway::tunnel::TunnelEndpoint;
use crate::gateway::GatewayConfig;
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::membership::{InterfaceMembershipManager, MembershipReport, ReportSink};
use crate::messages::AmtMessage;
use crate::nonce::NonceGenerator;
use crate::timer::TaskTimer;

/// Receives the decapsulated multicast traffic that is not membership
/// control signalling.
pub trait PacketConsumer: Send + Sync {
    fn consume(&self, packet: &IpPacket);
}

struct Ipv4ReportSink {
    tunnel: Arc<TunnelEndpoint>,
}

impl ReportSink for Ipv4ReportSink {
    fn send_report(&self, report: MembershipReport) {
        match transforms::report_to_ipv4_packet(&report) {
            Ok(packet) => {
                if let Err(error) = self.tunnel.send_update(packet) {
                    warn!("failed to send IGMP report over the tunnel: {}", error);
                }
            }
            Err(error) => warn!("failed to build IGMP report packet: {}", error),
        }
    }
}

struct Ipv6ReportSink {
    tunnel: Arc<TunnelEndpoint>,
}

impl ReportSink for Ipv6ReportSink {
    fn send_report(&self, report: MembershipReport) {
        match transforms::report_to_ipv6_packet(&report) {
            Ok(packet) => {
                if let Err(error) = self.tunnel.send_update(packet) {
                    warn!("failed to send MLD report over the tunnel: {}", error);
                }
            }
            Err(error) => warn!("failed to build MLD report packet: {}", error),
        }
    }
}

struct InterfaceShared {
    transport: Arc<dyn DatagramTransport>,
    tunnel: Arc<TunnelEndpoint>,
    igmp_manager: InterfaceMembershipManager,
    mld_manager: InterfaceMembershipManager,
    consumers: Mutex<Vec<Arc<dyn PacketConsumer>>>,
    lifecycle: Lifecycle,
    receive_timeout: Duration,
}

pub struct PseudoInterface {
    shared: Arc<InterfaceShared>,
    receiver: Mutex<Option<thread::JoinHandle<()>>>,
}

impl PseudoInterface {
    pub fn new(
        transport: Arc<dyn DatagramTransport>,
        relay_discovery_address: IpAddr,
        config: &GatewayConfig,
        timer: Arc<TaskTimer>,
        nonces: Arc<NonceGenerator>,
    ) -> PseudoInterface {
        let tunnel = Arc::new(TunnelEndpoint::new(
            transport.clone(),
            relay_discovery_address,
            config.relay_port,
            config.discovery_retry_period,
            config.discovery_refresh_period,
            nonces,
            timer.clone(),
        ));

        let igmp_manager = InterfaceMembershipManager::new(
            timer.clone(),
            Arc::new(Ipv4ReportSink {
                tunnel: tunnel.clone(),
            }),
            config.membership.clone(),
        );
        let mld_manager = InterfaceMembershipManager::new(
            timer,
            Arc::new(Ipv6ReportSink {
                tunnel: tunnel.clone(),
            }),
            config.membership.clone(),
        );

        PseudoInterface {
            shared: Arc::new(InterfaceShared {
                transport,
                tunnel,
                igmp_manager,
                mld_manager,
                consumers: Mutex::new(Vec::new()),
                lifecycle: Lifecycle::new(),
                receive_timeout: config.receive_timeout,
            }),
            receiver: Mutex::new(None),
        }
    }

    /// Starts relay discovery and the receive loop.  A no-op when the
    /// interface is already started or has been closed.
    pub fn start(&self) -> Result<(), GatewayError> {
        let shared = self.shared.clone();
        let started = self.shared.lifecycle.start_with(
            || shared.tunnel.start_discovery(),
            || shared.tunnel.close().map_err(GatewayError::Transport),
        )?;
        if !started {
            return Ok(());
        }

        let loop_shared = self.shared.clone();
        let handle = thread::Builder::new()
            .name("amt-receive".to_string())
            .spawn(move || run_receive_loop(loop_shared));

        match handle {
            Ok(handle) => {
                *self.receiver.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
                Ok(())
            }
            Err(error) => {
                // Without a receive loop the interface is useless.
                self.shared.lifecycle.abort(|| self.shared.tunnel.close());
                Err(GatewayError::Transport(TransportError::Io(error)))
            }
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.shared.lifecycle.state()
    }

    /// ASM join of `group` on the manager matching its address family.
    pub fn join(&self, group: IpAddr) -> Result<(), GatewayError> {
        self.manager_for(group).join(group)?;
        Ok(())
    }

    /// SSM join of `(source, group)`.
    pub fn join_source(&self, group: IpAddr, source: IpAddr) -> Result<(), GatewayError> {
        self.manager_for(group).join_source(group, source)?;
        Ok(())
    }

    pub fn leave(&self, group: IpAddr) -> Result<(), GatewayError> {
        self.manager_for(group).leave(group)?;
        Ok(())
    }

    pub fn leave_source(&self, group: IpAddr, source: IpAddr) -> Result<(), GatewayError> {
        self.manager_for(group).leave_source(group, source)?;
        Ok(())
    }

    pub fn add_consumer(&self, consumer: Arc<dyn PacketConsumer>) {
        self.shared
            .consumers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(consumer);
    }

    pub fn tunnel(&self) -> &Arc<TunnelEndpoint> {
        &self.shared.tunnel
    }

    /// Cancels pending reports, closes the tunnel, and joins the
    /// receive thread.
    pub fn close(&self) -> Result<(), TransportError> {
        let shared = self.shared.clone();
        let result = self.shared.lifecycle.close_with(|| {
            shared.igmp_manager.cancel_pending_reports();
            shared.mld_manager.cancel_pending_reports();
            shared.tunnel.close()
        });

        let handle = self
            .receiver
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }

        result
    }

    fn manager_for(&self, group: IpAddr) -> &InterfaceMembershipManager {
        match group {
            IpAddr::V4(_) => &self.shared.igmp_manager,
            IpAddr::V6(_) => &self.shared.mld_manager,
        }
    }
}

fn run_receive_loop(shared: Arc<InterfaceShared>) {
    while shared.lifecycle.is_started() {
        match shared.transport.receive(shared.receive_timeout) {
            Ok(TransportEvent::TimedOut) => continue,
            Ok(TransportEvent::Datagram { payload, .. }) => handle_datagram(&shared, &payload),
            Err(TransportError::Closed) => break,
            Err(error) => {
                // Transport errors are terminal for the interface.
                warn!("tunnel receive failed, shutting interface down: {}", error);
                shared.igmp_manager.cancel_pending_reports();
                shared.mld_manager.cancel_pending_reports();
                shared.lifecycle.abort(|| shared.tunnel.close());
                break;
            }
        }
    }
}

fn handle_datagram(shared: &InterfaceShared, payload: &[u8]) {
    let message = match AmtMessage::deserialize_gateway(payload) {
        Ok(message) => message,
        Err(error) => {
            warn!("dropping undecodable datagram: {}", error);
            return;
        }
    };

    match message {
        AmtMessage::RelayAdvertisement {
            discovery_nonce,
            relay_address,
        } => {
            if let Err(error) = shared.tunnel.handle_advertisement(discovery_nonce, relay_address)
            {
                warn!("failed to complete relay handshake: {}", error);
            }
        }

        AmtMessage::MembershipQuery {
            response_mac,
            request_nonce,
            packet,
        } => match shared.tunnel.handle_query(response_mac, request_nonce, packet) {
            Ok(Some(packet)) if !packet.is_empty() => handle_query_packet(shared, &packet),
            Ok(_) => {}
            Err(error) => warn!("failed to process membership query: {}", error),
        },

        AmtMessage::MulticastData { packet } => handle_data_packet(shared, &packet),

        message => debug!(
            "dropping unexpected message type {}",
            message.message_type()
        ),
    }
}

fn handle_query_packet(shared: &InterfaceShared, packet: &[u8]) {
    match IpPacket::deserialize(packet) {
        Ok(IpPacket::V4(ip)) if ip.protocol == IGMP_PROTOCOL_NUMBER => {
            match MembershipQueryV3::deserialize(&ip.payload) {
                Ok(query) if query.is_general_query() => shared.igmp_manager.handle_general_query(),
                Ok(_) => debug!("ignoring group-specific IGMP query"),
                Err(error) => warn!("dropping malformed IGMP query: {}", error),
            }
        }

        Ok(IpPacket::V6(ip)) if ip.next_header == ICMPV6_PROTOCOL_NUMBER => {
            match ListenerQueryV2::deserialize(&ip.src, &ip.dst, &ip.payload) {
                Ok(query) if query.is_general_query() => shared.mld_manager.handle_general_query(),
                Ok(_) => debug!("ignoring group-specific MLD query"),
                Err(error) => warn!("dropping malformed MLD query: {}", error),
            }
        }

        Ok(_) => warn!("query packet did not carry a membership protocol"),
        Err(error) => warn!("dropping undecodable query packet: {}", error),
    }
}

fn handle_data_packet(shared: &InterfaceShared, packet: &[u8]) {
    let packet = match IpPacket::deserialize(packet) {
        Ok(packet) => packet,
        Err(error) => {
            warn!("dropping undecodable multicast data packet: {}", error);
            return;
        }
    };

    let first_payload_byte = packet.payload().first().copied();
    match (&packet, packet.payload_protocol()) {
        (IpPacket::V4(_), IGMP_PROTOCOL_NUMBER)
            if first_payload_byte == Some(MEMBERSHIP_QUERY_TYPE) =>
        {
            handle_query_packet(shared, &encode_again(&packet))
        }
        (IpPacket::V6(_), ICMPV6_PROTOCOL_NUMBER)
            if first_payload_byte == Some(LISTENER_QUERY_TYPE) =>
        {
            handle_query_packet(shared, &encode_again(&packet))
        }
        _ => {
            let consumers = shared.consumers.lock().unwrap_or_else(|e| e.into_inner());
            for consumer in consumers.iter() {
                consumer.consume(&packet);
            }
        }
    }
}

fn encode_again(packet: &IpPacket) -> Bytes {
    packet
        .serialize()
        .map(Bytes::from)
        .unwrap_or_else(|_| Bytes::new())
}
