//! The gateway's relay handshake state.
//!
//! Discovery and request nonces guard the handshake: an advertisement
//! whose nonce does not match the outstanding discovery is ignored, as
//! is a query whose nonce does not match the outstanding request.  A
//! membership update can only be sent once a query has supplied the
//! response MAC; updates posted before that are queued and drained when
//! the MAC arrives.

use bytes::Bytes;
use log::{debug, info, warn};
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::gateway::errors::{GatewayError, TransportError};
use crate::gateway::transport::DatagramTransport;
use crate::messages::{AmtMessage, MembershipProtocol, ResponseMac};
use crate::nonce::NonceGenerator;
use crate::timer::{TaskTimer, TimerHandle};

struct TunnelState {
    discovery_nonce: Option<u32>,
    discovery_retry: Option<TimerHandle>,
    discovery_refresh: Option<TimerHandle>,
    relay_address: Option<SocketAddr>,
    request_nonce: Option<u32>,
    response_mac: Option<ResponseMac>,
    pending_updates: Vec<Bytes>,
}

pub struct TunnelEndpoint {
    transport: Arc<dyn DatagramTransport>,
    discovery_destination: SocketAddr,
    relay_port: u16,
    discovery_retry_period: Duration,
    discovery_refresh_period: Duration,
    nonces: Arc<NonceGenerator>,
    timer: Arc<TaskTimer>,
    state: Mutex<TunnelState>,
}

impl TunnelEndpoint {
    pub fn new(
        transport: Arc<dyn DatagramTransport>,
        relay_discovery_address: IpAddr,
        relay_port: u16,
        discovery_retry_period: Duration,
        discovery_refresh_period: Duration,
        nonces: Arc<NonceGenerator>,
        timer: Arc<TaskTimer>,
    ) -> TunnelEndpoint {
        TunnelEndpoint {
            transport,
            discovery_destination: SocketAddr::new(relay_discovery_address, relay_port),
            relay_port,
            discovery_retry_period,
            discovery_refresh_period,
            nonces,
            timer,
            state: Mutex::new(TunnelState {
                discovery_nonce: None,
                discovery_retry: None,
                discovery_refresh: None,
                relay_address: None,
                request_nonce: None,
                response_mac: None,
                pending_updates: Vec::new(),
            }),
        }
    }

    /// Begins relay discovery: sends a discovery message immediately
    /// and schedules periodic retries until an advertisement with a
    /// matching nonce arrives.
    pub fn start_discovery(self: &Arc<Self>) -> Result<(), GatewayError> {
        let nonce = self.nonces.next_nonce();
        {
            let mut state = self.lock();
            if let Some(handle) = state.discovery_retry.take() {
                handle.cancel();
            }
            if let Some(handle) = state.discovery_refresh.take() {
                handle.cancel();
            }
            state.discovery_nonce = Some(nonce);
            state.relay_address = None;
            state.request_nonce = None;
            state.response_mac = None;

            let endpoint = self.clone();
            let handle = self.timer.schedule_at_fixed_rate(
                self.discovery_retry_period,
                self.discovery_retry_period,
                Box::new(move || {
                    if let Err(error) = endpoint.send_discovery() {
                        warn!("relay discovery retry failed: {}", error);
                    }
                }),
            );
            state.discovery_retry = Some(handle);
        }

        self.send_discovery()
    }

    fn send_discovery(&self) -> Result<(), GatewayError> {
        let nonce = match self.lock().discovery_nonce {
            Some(nonce) => nonce,
            None => return Ok(()),
        };

        debug!(
            "sending relay discovery to {} with nonce {}",
            self.discovery_destination, nonce
        );
        let bytes = AmtMessage::RelayDiscovery {
            discovery_nonce: nonce,
        }
        .serialize()?;
        self.transport.send(&bytes, self.discovery_destination)?;
        Ok(())
    }

    /// Handles a relay advertisement.  A nonce mismatch is logged and
    /// ignored; a match fixes the relay address, stops the discovery
    /// retries, solicits a membership query, and schedules the next
    /// discovery refresh.
    pub fn handle_advertisement(
        self: &Arc<Self>,
        discovery_nonce: u32,
        relay_address: IpAddr,
    ) -> Result<(), GatewayError> {
        {
            let mut state = self.lock();
            if state.discovery_nonce != Some(discovery_nonce) {
                warn!(
                    "ignoring relay advertisement with unexpected nonce {}",
                    discovery_nonce
                );
                return Ok(());
            }
            if state.relay_address.is_some() {
                debug!("ignoring duplicate relay advertisement");
                return Ok(());
            }

            state.relay_address = Some(SocketAddr::new(relay_address, self.relay_port));
            if let Some(handle) = state.discovery_retry.take() {
                handle.cancel();
            }

            // Re-enter discovery before NAT mappings towards the relay
            // can expire; updates queue until the new MAC arrives.
            let endpoint = self.clone();
            let handle = self.timer.schedule(
                self.discovery_refresh_period,
                Box::new(move || {
                    debug!("refreshing relay discovery");
                    if let Err(error) = endpoint.start_discovery() {
                        warn!("relay discovery refresh failed: {}", error);
                    }
                }),
            );
            state.discovery_refresh = Some(handle);
        }

        info!("relay discovered at {}", relay_address);
        let protocol = if relay_address.is_ipv4() {
            MembershipProtocol::Igmp
        } else {
            MembershipProtocol::Mld
        };
        self.send_request(protocol)
    }

    /// Sends a request message to the relay, soliciting a membership
    /// query carrying a fresh response MAC.
    pub fn send_request(&self, protocol: MembershipProtocol) -> Result<(), GatewayError> {
        let nonce = self.nonces.next_nonce();
        let relay = {
            let mut state = self.lock();
            let relay = state.relay_address.ok_or(GatewayError::NoRelay)?;
            state.request_nonce = Some(nonce);
            relay
        };

        debug!("sending request to {} with nonce {}", relay, nonce);
        let bytes = AmtMessage::Request {
            protocol,
            request_nonce: nonce,
        }
        .serialize()?;
        self.transport.send(&bytes, relay)?;
        Ok(())
    }

    /// Handles a membership query: captures the response MAC, drains
    /// any updates that were queued waiting for it, and hands the
    /// encapsulated general query packet back for the membership
    /// managers to answer.  A request-nonce mismatch is ignored.
    pub fn handle_query(
        &self,
        response_mac: ResponseMac,
        request_nonce: u32,
        packet: Bytes,
    ) -> Result<Option<Bytes>, GatewayError> {
        let queued = {
            let mut state = self.lock();
            if state.request_nonce != Some(request_nonce) {
                warn!(
                    "ignoring membership query with unexpected nonce {}",
                    request_nonce
                );
                return Ok(None);
            }

            state.response_mac = Some(response_mac);
            std::mem::take(&mut state.pending_updates)
        };

        for update in queued {
            self.send_update(update)?;
        }

        Ok(Some(packet))
    }

    /// Sends a report packet to the relay as a membership update, or
    /// queues it until a query has supplied the response MAC.
    pub fn send_update(&self, packet: Bytes) -> Result<(), GatewayError> {
        let (mac, nonce, relay) = {
            let mut state = self.lock();
            match (state.response_mac, state.request_nonce, state.relay_address) {
                (Some(mac), Some(nonce), Some(relay)) => (mac, nonce, relay),
                _ => {
                    debug!("queueing membership update until a response MAC arrives");
                    state.pending_updates.push(packet);
                    return Ok(());
                }
            }
        };

        let bytes = AmtMessage::MembershipUpdate {
            response_mac: mac,
            request_nonce: nonce,
            packet,
        }
        .serialize()?;
        self.transport.send(&bytes, relay)?;
        Ok(())
    }

    pub fn relay_address(&self) -> Option<SocketAddr> {
        self.lock().relay_address
    }

    pub fn has_response_mac(&self) -> bool {
        self.lock().response_mac.is_some()
    }

    /// Stops the discovery retries and closes the transport.
    pub fn close(&self) -> Result<(), TransportError> {
        {
            let mut state = self.lock();
            if let Some(handle) = state.discovery_retry.take() {
                handle.cancel();
            }
            if let Some(handle) = state.discovery_refresh.take() {
                handle.cancel();
            }
            state.pending_updates.clear();
        }
        self.transport.close()
    }

    fn lock(&self) -> MutexGuard<'_, TunnelState> {
        self.state.lock().unwrap_or_else(|error| error.into_inner())
    }
}
