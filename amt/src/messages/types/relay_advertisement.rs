//! Relay advertisement message: 12 bytes with an embedded IPv4 relay
//! address or 24 bytes with an IPv6 one; the length is the only thing
//! that distinguishes the two, so any length in between is malformed.
//!
//! ```text
//!  0: type (0x2)
//!  1: reserved
//!  2: reserved
//!  3: reserved
//!  4: discovery nonce (u32)
//!  8: relay address (4 or 16 bytes)
//! ```

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Write};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::messages::{
    AmtMessage, MessageDeserializationError, MessageSerializationError, RELAY_ADVERTISEMENT_TYPE,
};

const IPV4_MESSAGE_LENGTH: usize = 12;
const IPV6_MESSAGE_LENGTH: usize = 24;

pub fn serialize(
    discovery_nonce: u32,
    relay_address: IpAddr,
) -> Result<Vec<u8>, MessageSerializationError> {
    let mut cursor = Cursor::new(Vec::with_capacity(IPV6_MESSAGE_LENGTH));
    cursor.write_u8(RELAY_ADVERTISEMENT_TYPE)?;
    cursor.write_u8(0)?;
    cursor.write_u16::<BigEndian>(0)?;
    cursor.write_u32::<BigEndian>(discovery_nonce)?;

    match relay_address {
        IpAddr::V4(address) => cursor.write_all(&address.octets())?,
        IpAddr::V6(address) => cursor.write_all(&address.octets())?,
    }

    Ok(cursor.into_inner())
}

pub fn deserialize(data: &[u8]) -> Result<AmtMessage, MessageDeserializationError> {
    let relay_address = match data.len() {
        IPV4_MESSAGE_LENGTH => {
            let mut octets = [0_u8; 4];
            octets.copy_from_slice(&data[8..12]);
            IpAddr::V4(Ipv4Addr::from(octets))
        }

        IPV6_MESSAGE_LENGTH => {
            let mut octets = [0_u8; 16];
            octets.copy_from_slice(&data[8..24]);
            IpAddr::V6(Ipv6Addr::from(octets))
        }

        length if length < IPV4_MESSAGE_LENGTH => {
            return Err(MessageDeserializationError::NotEnoughBytes);
        }

        _ => return Err(MessageDeserializationError::InvalidMessageFormat),
    };

    let mut cursor = Cursor::new(data);
    cursor.set_position(4);
    let discovery_nonce = cursor.read_u32::<BigEndian>()?;

    Ok(AmtMessage::RelayAdvertisement {
        discovery_nonce,
        relay_address,
    })
}
