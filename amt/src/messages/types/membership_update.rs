//! Membership update message: gateway to relay, echoing the response
//! MAC and request nonce captured from the most recent membership query
//! and encapsulating an IGMPv3/MLDv2 report packet.
//!
//! ```text
//!  0: type (0x5)
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
    MEMBERSHIP_UPDATE_TYPE,
};

const HEADER_LENGTH: usize = 12;

pub fn serialize(
    response_mac: &ResponseMac,
    request_nonce: u32,
    packet: &Bytes,
) -> Result<Vec<u8>, MessageSerializationError> {
    let mut cursor = Cursor::new(Vec::with_capacity(HEADER_LENGTH + packet.len()));
    cursor.write_u8(MEMBERSHIP_UPDATE_TYPE)?;
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

    Ok(AmtMessage::MembershipUpdate {
        response_mac,
        request_nonce,
        packet: Bytes::copy_from_slice(&data[HEADER_LENGTH..]),
    })
}
