//! Relay discovery message: 8 bytes, gateway to relay discovery address.
//!
//! ```text
//!  0: type (0x1)
//!  1: reserved
//!  2: reserved
//!  3: reserved
//!  4: discovery nonce (u32)
//! ```

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

use crate::messages::{
    AmtMessage, MessageDeserializationError, MessageSerializationError, RELAY_DISCOVERY_TYPE,
};

const MESSAGE_LENGTH: usize = 8;

pub fn serialize(discovery_nonce: u32) -> Result<Vec<u8>, MessageSerializationError> {
    let mut cursor = Cursor::new(Vec::with_capacity(MESSAGE_LENGTH));
    cursor.write_u8(RELAY_DISCOVERY_TYPE)?;
    cursor.write_u8(0)?;
    cursor.write_u16::<BigEndian>(0)?;
    cursor.write_u32::<BigEndian>(discovery_nonce)?;

    Ok(cursor.into_inner())
}

pub fn deserialize(data: &[u8]) -> Result<AmtMessage, MessageDeserializationError> {
    if data.len() < MESSAGE_LENGTH {
        return Err(MessageDeserializationError::NotEnoughBytes);
    }

    let mut cursor = Cursor::new(data);
    cursor.set_position(4);
    let discovery_nonce = cursor.read_u32::<BigEndian>()?;

    Ok(AmtMessage::RelayDiscovery { discovery_nonce })
}
