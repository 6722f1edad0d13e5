//! Request message: 8 bytes, gateway to relay, solicits a membership
//! query for either IGMP or MLD.
//!
//! ```text
//!  0: type (0x3)
//!  1: reserved except bit 0, the P flag (0 = IGMP, 1 = MLD)
//!  2: reserved
//!  3: reserved
//!  4: request nonce (u32)
//! ```

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

use crate::messages::{
    AmtMessage, MembershipProtocol, MessageDeserializationError, MessageSerializationError,
    REQUEST_TYPE,
};

const MESSAGE_LENGTH: usize = 8;
const PROTOCOL_FLAG: u8 = 0x01;

pub fn serialize(
    protocol: MembershipProtocol,
    request_nonce: u32,
) -> Result<Vec<u8>, MessageSerializationError> {
    let flags = match protocol {
        MembershipProtocol::Igmp => 0,
        MembershipProtocol::Mld => PROTOCOL_FLAG,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(MESSAGE_LENGTH));
    cursor.write_u8(REQUEST_TYPE)?;
    cursor.write_u8(flags)?;
    cursor.write_u16::<BigEndian>(0)?;
    cursor.write_u32::<BigEndian>(request_nonce)?;

    Ok(cursor.into_inner())
}

pub fn deserialize(data: &[u8]) -> Result<AmtMessage, MessageDeserializationError> {
    if data.len() < MESSAGE_LENGTH {
        return Err(MessageDeserializationError::NotEnoughBytes);
    }

    let protocol = if data[1] & PROTOCOL_FLAG == 0 {
        MembershipProtocol::Igmp
    } else {
        MembershipProtocol::Mld
    };

    let mut cursor = Cursor::new(data);
    cursor.set_position(4);
    let request_nonce = cursor.read_u32::<BigEndian>()?;

    Ok(AmtMessage::Request {
        protocol,
        request_nonce,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{BigEndian, WriteBytesExt};
    use std::io::Cursor;

    #[test]
    fn can_serialize_igmp_request() {
        let message = AmtMessage::Request {
            protocol: MembershipProtocol::Igmp,
            request_nonce: 777,
        };

        let mut cursor = Cursor::new(Vec::new());
        cursor.write_u8(0x3).unwrap();
        cursor.write_u8(0).unwrap();
        cursor.write_u16::<BigEndian>(0).unwrap();
        cursor.write_u32::<BigEndian>(777).unwrap();
        let expected = cursor.into_inner();

        assert_eq!(message.serialize().unwrap(), expected);
    }

    #[test]
    fn mld_request_sets_protocol_flag() {
        let message = AmtMessage::Request {
            protocol: MembershipProtocol::Mld,
            request_nonce: 777,
        };

        let bytes = message.serialize().unwrap();
        assert_eq!(bytes[1], 0x01);
    }

    #[test]
    fn can_deserialize_both_protocols() {
        for protocol in [MembershipProtocol::Igmp, MembershipProtocol::Mld] {
            let expected = AmtMessage::Request {
                protocol,
                request_nonce: 0xffff_ffff,
            };

            let bytes = expected.serialize().unwrap();
            let result = AmtMessage::deserialize_relay(&bytes).unwrap();
            assert_eq!(result, expected);
        }
    }

    #[test]
    fn reserved_flag_bits_are_ignored_on_receipt() {
        let mut bytes = AmtMessage::Request {
            protocol: MembershipProtocol::Igmp,
            request_nonce: 1,
        }
        .serialize()
        .unwrap();
        bytes[1] |= 0xfe;

        let result = AmtMessage::deserialize_relay(&bytes).unwrap();
        assert_eq!(
            result,
            AmtMessage::Request {
                protocol: MembershipProtocol::Igmp,
                request_nonce: 1
            }
        );
    }

    #[test]
    fn truncated_request_fails() {
        let bytes = AmtMessage::Request {
            protocol: MembershipProtocol::Mld,
            request_nonce: 1,
        }
        .serialize()
        .unwrap();

        assert!(matches!(
            AmtMessage::deserialize_relay(&bytes[..5]),
            Err(MessageDeserializationError::NotEnoughBytes)
        ));
    }
}
