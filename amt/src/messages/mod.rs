/*!
This module contains all the AMT message types as well as functionality for
serializing and deserializing these messages into datagram payloads.

Decoding is role-separated: a gateway only ever receives relay
advertisements, membership queries, and multicast data, while a relay only
ever receives discovery, request, and membership update messages.  Each
role therefore gets its own decode entry point, and feeding a decoder a
message its role never receives fails rather than silently succeeding.
*/

mod deserialization_errors;
mod serialization_errors;
mod types;

pub use self::deserialization_errors::MessageDeserializationError;
pub use self::serialization_errors::MessageSerializationError;

use bytes::Bytes;
use std::net::IpAddr;

/// The UDP port relays listen on, per the AMT specification.
pub const AMT_PORT: u16 = 2268;

pub const RELAY_DISCOVERY_TYPE: u8 = 0x1;
pub const RELAY_ADVERTISEMENT_TYPE: u8 = 0x2;
pub const REQUEST_TYPE: u8 = 0x3;
pub const MEMBERSHIP_QUERY_TYPE: u8 = 0x4;
pub const MEMBERSHIP_UPDATE_TYPE: u8 = 0x5;
pub const MULTICAST_DATA_TYPE: u8 = 0x6;

/// Length of the response MAC carried by membership queries and echoed
/// back in membership updates.
pub const RESPONSE_MAC_LENGTH: usize = 6;

pub type ResponseMac = [u8; RESPONSE_MAC_LENGTH];

/// Which membership protocol a gateway is requesting a query for.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum MembershipProtocol {
    /// IPv4 group membership (IGMPv3)
    Igmp,

    /// IPv6 group membership (MLDv2)
    Mld,
}

/// An enumeration of all types of AMT messages that are supported
#[derive(PartialEq, Debug, Clone)]
pub enum AmtMessage {
    /// Sent by a gateway to a relay discovery address to solicit a relay
    /// advertisement
    RelayDiscovery { discovery_nonce: u32 },

    /// A relay's answer to a discovery message, carrying the unicast
    /// address the gateway should tunnel to
    RelayAdvertisement {
        discovery_nonce: u32,
        relay_address: IpAddr,
    },

    /// Sent by a gateway to a relay to solicit a membership query
    Request {
        protocol: MembershipProtocol,
        request_nonce: u32,
    },

    /// A relay's answer to a request, carrying the response MAC the
    /// gateway must echo and an encapsulated IGMPv3/MLDv2 general query
    MembershipQuery {
        response_mac: ResponseMac,
        request_nonce: u32,
        packet: Bytes,
    },

    /// A gateway's membership report, encapsulating an IGMPv3/MLDv2
    /// report inside an IP packet
    MembershipUpdate {
        response_mac: ResponseMac,
        request_nonce: u32,
        packet: Bytes,
    },

    /// Decapsulated multicast traffic forwarded by the relay
    MulticastData { packet: Bytes },
}

impl AmtMessage {
    /// The type discriminator this message carries as its leading byte.
    pub fn message_type(&self) -> u8 {
        match *self {
            AmtMessage::RelayDiscovery { .. } => RELAY_DISCOVERY_TYPE,
            AmtMessage::RelayAdvertisement { .. } => RELAY_ADVERTISEMENT_TYPE,
            AmtMessage::Request { .. } => REQUEST_TYPE,
            AmtMessage::MembershipQuery { .. } => MEMBERSHIP_QUERY_TYPE,
            AmtMessage::MembershipUpdate { .. } => MEMBERSHIP_UPDATE_TYPE,
            AmtMessage::MulticastData { .. } => MULTICAST_DATA_TYPE,
        }
    }

    pub fn serialize(&self) -> Result<Vec<u8>, MessageSerializationError> {
        match *self {
            AmtMessage::RelayDiscovery { discovery_nonce } => {
                types::relay_discovery::serialize(discovery_nonce)
            }

            AmtMessage::RelayAdvertisement {
                discovery_nonce,
                relay_address,
            } => types::relay_advertisement::serialize(discovery_nonce, relay_address),

            AmtMessage::Request {
                protocol,
                request_nonce,
            } => types::request::serialize(protocol, request_nonce),

            AmtMessage::MembershipQuery {
                response_mac,
                request_nonce,
                ref packet,
            } => types::membership_query::serialize(&response_mac, request_nonce, packet),

            AmtMessage::MembershipUpdate {
                response_mac,
                request_nonce,
                ref packet,
            } => types::membership_update::serialize(&response_mac, request_nonce, packet),

            AmtMessage::MulticastData { ref packet } => types::multicast_data::serialize(packet),
        }
    }

    /// Decodes a datagram received by a gateway.
    ///
    /// Only relay advertisements, membership queries, and multicast data
    /// are accepted; any other type byte is a protocol violation.
    pub fn deserialize_gateway(data: &[u8]) -> Result<AmtMessage, MessageDeserializationError> {
        match peek_type(data)? {
            RELAY_ADVERTISEMENT_TYPE => types::relay_advertisement::deserialize(data),
            MEMBERSHIP_QUERY_TYPE => types::membership_query::deserialize(data),
            MULTICAST_DATA_TYPE => types::multicast_data::deserialize(data),
            other => Err(MessageDeserializationError::NoParserForType { message_type: other }),
        }
    }

    /// Decodes a datagram received by a relay.
    ///
    /// Only discovery, request, and membership update messages are
    /// accepted.
    pub fn deserialize_relay(data: &[u8]) -> Result<AmtMessage, MessageDeserializationError> {
        match peek_type(data)? {
            RELAY_DISCOVERY_TYPE => types::relay_discovery::deserialize(data),
            REQUEST_TYPE => types::request::deserialize(data),
            MEMBERSHIP_UPDATE_TYPE => types::membership_update::deserialize(data),
            other => Err(MessageDeserializationError::NoParserForType { message_type: other }),
        }
    }
}

fn peek_type(data: &[u8]) -> Result<u8, MessageDeserializationError> {
    match data.first() {
        Some(byte) => Ok(*byte),
        None => Err(MessageDeserializationError::NotEnoughBytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_decoder_rejects_relay_bound_types() {
        let discovery = AmtMessage::RelayDiscovery {
            discovery_nonce: 0x01020304,
        };
        let bytes = discovery.serialize().unwrap();

        match AmtMessage::deserialize_gateway(&bytes) {
            Err(MessageDeserializationError::NoParserForType { message_type }) => {
                assert_eq!(message_type, RELAY_DISCOVERY_TYPE);
            }
            other => panic!("expected NoParserForType, got {:?}", other),
        }
    }

    #[test]
    fn relay_decoder_rejects_gateway_bound_types() {
        let data = AmtMessage::MulticastData {
            packet: bytes::Bytes::from_static(&[0x45, 0x00]),
        };
        let bytes = data.serialize().unwrap();

        match AmtMessage::deserialize_relay(&bytes) {
            Err(MessageDeserializationError::NoParserForType { message_type }) => {
                assert_eq!(message_type, MULTICAST_DATA_TYPE);
            }
            other => panic!("expected NoParserForType, got {:?}", other),
        }
    }

    #[test]
    fn unknown_type_byte_is_rejected_by_both_roles() {
        let data = [0x7f, 0, 0, 0];
        assert!(matches!(
            AmtMessage::deserialize_gateway(&data),
            Err(MessageDeserializationError::NoParserForType { message_type: 0x7f })
        ));
        assert!(matches!(
            AmtMessage::deserialize_relay(&data),
            Err(MessageDeserializationError::NoParserForType { message_type: 0x7f })
        ));
    }

    #[test]
    fn empty_datagram_is_rejected() {
        assert!(matches!(
            AmtMessage::deserialize_gateway(&[]),
            Err(MessageDeserializationError::NotEnoughBytes)
        ));
    }
}
