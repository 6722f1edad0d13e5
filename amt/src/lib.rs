//! An implementation of the gateway side of AMT (Automatic Multicast
//! Tunneling), which carries multicast traffic and IGMP/MLD membership
//! signalling inside unicast UDP between a gateway and a relay.
//!
//! The crate is split along the protocol's seams:
//!
//! * [`messages`] - the AMT wire messages with role-separated decoding
//!   (a gateway and a relay each accept a disjoint set of message types).
//! * [`membership`] - the per-interface group membership state machine
//!   that tracks filter modes and source sets and retransmits
//!   state-change reports.
//! * [`gateway`] - the tunnel endpoint handshake, the pseudo-interface
//!   that fans decapsulated traffic out to consumers, and the
//!   reference-counted registry that shares pseudo-interfaces between
//!   callers.
//! * [`lifecycle`] and [`timer`] - the small shared utilities the
//!   stateful components are built on.

pub mod gateway;
pub mod lifecycle;
pub mod membership;
pub mod messages;
pub mod nonce;
pub mod timer;
