//! This crate provides binary codecs for the IP-level group membership
//! protocols used by multicast receivers: IGMPv3 (RFC 3376) membership
//! queries and reports, MLDv2 (RFC 3810) listener queries and reports, and
//! the minimal IPv4/IPv6 packet envelopes needed to carry them between a
//! host and a router (or, in the AMT case, between a gateway and a relay).
//!
//! All multi-byte integer fields are big-endian, reserved fields are
//! written as zero and ignored on receipt, and every parser consumes
//! exactly the bytes its declared length covers.
//!
//! # Examples
//! ```
//! use std::net::Ipv4Addr;
//! use mcast_proto::igmp::{GroupRecord, GroupRecordType, MembershipReportV3};
//!
//! let report = MembershipReportV3 {
//!     records: vec![GroupRecord {
//!         record_type: GroupRecordType::ChangeToExcludeMode,
//!         group: Ipv4Addr::new(232, 1, 2, 3),
//!         sources: Vec::new(),
//!     }],
//! };
//!
//! let bytes = report.serialize().unwrap();
//! let parsed = MembershipReportV3::deserialize(&bytes).unwrap();
//! assert_eq!(parsed, report);
//! ```

pub mod bitfield;
pub mod checksum;
pub mod errors;
pub mod igmp;
pub mod ip;
pub mod mld;

pub use self::bitfield::{BitField, ByteBitField};
pub use self::errors::{BitFieldError, PacketDeserializationError, PacketSerializationError};
pub use self::ip::{IpPacket, Ipv4Packet, Ipv6Packet};
