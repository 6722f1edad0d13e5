//! Multicast data message: relay to gateway, a 2-byte header followed
//! by one decapsulated multicast IP packet.
//!
//! ```text
//!  0: type (0x6)
//!  1: reserved
//!  2: encapsulated IP packet
//! ```

use byteorder::WriteBytesExt;
use bytes::Bytes;
use std::io::{Cursor, Write};

use crate::messages::{
    AmtMessage, MessageDeserializationError, MessageSerializationError, MULTICAST_DATA_TYPE,
};

const HEADER_LENGTH: usize = 2;

pub fn serialize(packet: &Bytes) -> Result<Vec<u8>, MessageSerializationError> {
    let mut cursor = Cursor::new(Vec::with_capacity(HEADER_LENGTH + packet.len()));
    cursor.write_u8(MULTICAST_DATA_TYPE)?;
    cursor.write_u8(0)?;
    cursor.write_all(packet)?;

    Ok(cursor.into_inner())
}

pub fn deserialize(data: &[u8]) -> Result<AmtMessage, MessageDeserializationError> {
    if data.len() < HEADER_LENGTH {
        return Err(MessageDeserializationError::NotEnoughBytes);
    }

    Ok(AmtMessage::MulticastData {
        packet: Bytes::copy_from_slice(&data[HEADER_LENGTH..]),
    })
}
