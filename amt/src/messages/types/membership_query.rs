//! Membership query message: relay to gateway, carrying the response
//! MAC the gateway must echo in updates and an encapsulated IGMPv3 or
//! MLDv2 general query packet.
//!
//! ```text
//!  0: type (0x4)
//!  1: reserved
//!  2: response MAC (6 bytes)
//!  8: request nonce (u32)
//! 12: encapsulated IP packet
//! ```

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;
use std::io::{Cursor, Read, Write};

use crate::messages::{
    AmtMessage, MessageDeserializationError, MessageSerializationError, ResponseMac,
    MEMBERSHIP_QUERY_TYPE,
};

const HEADER_LENGTH: usize = 12;

pub fn serialize(
    response_mac: &ResponseMac,
    request_nonce: u32,
    packet: &Bytes,
) -> Result<Vec<u8>, MessageSerializationError> {
    let mut cursor = Cursor::new(Vec::with_capacity(HEADER_LENGTH + packet.len()));
    cursor.write_u8(MEMBERSHIP_QUERY_TYPE)?;
    cursor.write_u8(0)?;
    cursor.write_all(response_mac)?;
    cursor.write_u32::<BigEndian>(request_nonce)?;
    cursor.write_all(packet)?;

    Ok(cursor.into_inner())
}

pub fn deserialize(data: &[u8]) -> Result<AmtMessage, MessageDeserializationError> {
    if data.len() < HEADER_LENGTH {
        return Err(MessageDeserializationError::NotEnoughBytes);
    }

    let mut cursor = Cursor::new(data);
    cursor.set_position(2);

    let mut response_mac = [0_u8; 6];
    cursor.read_exact(&mut response_mac)?;
    let request_nonce = cursor.read_u32::<BigEndian>()?;

    Ok(AmtMessage::MembershipQuery {
        response_mac,
        request_nonce,
        packet: Bytes::copy_from_slice(&data[HEADER_LENGTH..]),
    })
}
