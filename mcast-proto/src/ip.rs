//! Minimal IPv4 and IPv6 packet envelopes.
//!
//! These carry group membership messages between a host and its first-hop
//! router, so only the fields that matter for that exchange are modeled:
//! addresses, hop count, payload protocol, the router-alert option that
//! IGMPv3/MLDv2 require, and the opaque payload.  Everything else is
//! written as the fixed values the RFCs prescribe and ignored on receipt.

use byteorder::{BigEndian, WriteBytesExt};
use bytes::Bytes;
use std::io::Write;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::bitfield::BitField;
use crate::checksum::{internet_checksum, verify_internet_checksum};
use crate::errors::{PacketDeserializationError, PacketSerializationError};

pub const IPV4_VERSION: u8 = 4;
pub const IPV6_VERSION: u8 = 6;

/// IPv4 router alert option: copied flag + class 0 + number 20, length 4.
const IPV4_ROUTER_ALERT: [u8; 4] = [0x94, 0x04, 0x00, 0x00];

/// IPv6 hop-by-hop option type for router alert.
const IPV6_ROUTER_ALERT_TYPE: u8 = 5;

const IPV6_HOP_BY_HOP: u8 = 0;

/// An IPv4 packet carrying an opaque payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Ipv4Packet {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub ttl: u8,
    pub protocol: u8,
    pub router_alert: bool,
    pub payload: Bytes,
}

impl Ipv4Packet {
    pub fn serialize(&self) -> Result<Vec<u8>, PacketSerializationError> {
        let header_length = if self.router_alert { 24 } else { 20 };
        let total_length = header_length + self.payload.len();
        if total_length > usize::from(u16::MAX) {
            return Err(PacketSerializationError::PayloadTooLarge {
                length: self.payload.len(),
            });
        }

        let mut buffer = Vec::with_capacity(total_length);
        buffer.write_u8(IPV4_VERSION << 4 | (header_length / 4) as u8)?;
        buffer.write_u8(0)?; // TOS
        buffer.write_u16::<BigEndian>(total_length as u16)?;
        buffer.write_u16::<BigEndian>(0)?; // identification
        buffer.write_u16::<BigEndian>(0)?; // flags + fragment offset
        buffer.write_u8(self.ttl)?;
        buffer.write_u8(self.protocol)?;
        buffer.write_u16::<BigEndian>(0)?; // checksum placeholder
        buffer.write_all(&self.src.octets())?;
        buffer.write_all(&self.dst.octets())?;
        if self.router_alert {
            buffer.write_all(&IPV4_ROUTER_ALERT)?;
        }

        let checksum = internet_checksum(&buffer[..header_length]);
        buffer[10..12].copy_from_slice(&checksum.to_be_bytes());

        buffer.extend_from_slice(&self.payload);
        Ok(buffer)
    }

    pub fn deserialize(data: &[u8]) -> Result<Ipv4Packet, PacketDeserializationError> {
        if data.len() < 20 {
            return Err(PacketDeserializationError::NotEnoughBytes);
        }

        let version = data[0] >> 4;
        if version != IPV4_VERSION {
            return Err(PacketDeserializationError::UnknownFormat { value: version });
        }

        let header_length = usize::from(data[0] & 0x0f) * 4;
        let total_length = usize::from(u16::from_be_bytes([data[2], data[3]]));
        if header_length < 20 || total_length < header_length {
            return Err(PacketDeserializationError::LengthMismatch {
                declared: total_length,
                actual: data.len(),
            });
        }

        if total_length > data.len() {
            return Err(PacketDeserializationError::NotEnoughBytes);
        }

        if !verify_internet_checksum(&data[..header_length]) {
            return Err(PacketDeserializationError::InvalidChecksum);
        }

        let mut router_alert = false;
        let mut index = 20;
        while index < header_length {
            match data[index] {
                0 => break, // end of option list
                1 => index += 1,
                option_type => {
                    if index + 1 >= header_length {
                        return Err(PacketDeserializationError::NotEnoughBytes);
                    }
                    if option_type == IPV4_ROUTER_ALERT[0] {
                        router_alert = true;
                    }
                    index += usize::from(data[index + 1]).max(2);
                }
            }
        }

        Ok(Ipv4Packet {
            src: Ipv4Addr::new(data[12], data[13], data[14], data[15]),
            dst: Ipv4Addr::new(data[16], data[17], data[18], data[19]),
            ttl: data[8],
            protocol: data[9],
            router_alert,
            payload: Bytes::copy_from_slice(&data[header_length..total_length]),
        })
    }
}

/// An IPv6 packet carrying an opaque payload, with optional hop-by-hop
/// router alert (as required for MLD).
///
/// `next_header` is the protocol of the payload itself; when
/// `router_alert` is set the serialized packet inserts a hop-by-hop
/// options header in front of it.
#[derive(Debug, Clone, PartialEq)]
pub struct Ipv6Packet {
    pub src: Ipv6Addr,
    pub dst: Ipv6Addr,
    pub hop_limit: u8,
    pub next_header: u8,
    pub router_alert: bool,
    pub payload: Bytes,
}

impl Ipv6Packet {
    pub fn serialize(&self) -> Result<Vec<u8>, PacketSerializationError> {
        let extension_length = if self.router_alert { 8 } else { 0 };
        let payload_length = extension_length + self.payload.len();
        if payload_length > usize::from(u16::MAX) {
            return Err(PacketSerializationError::PayloadTooLarge {
                length: self.payload.len(),
            });
        }

        let version_field = BitField::new(28, 4).expect("static field bounds");
        let mut first_word = 0_u32;
        version_field
            .set(&mut first_word, u32::from(IPV6_VERSION))
            .expect("version fits a 4-bit field");

        let mut buffer = Vec::with_capacity(40 + payload_length);
        buffer.write_u32::<BigEndian>(first_word)?;
        buffer.write_u16::<BigEndian>(payload_length as u16)?;
        buffer.write_u8(if self.router_alert {
            IPV6_HOP_BY_HOP
        } else {
            self.next_header
        })?;
        buffer.write_u8(self.hop_limit)?;
        buffer.write_all(&self.src.octets())?;
        buffer.write_all(&self.dst.octets())?;

        if self.router_alert {
            // Hop-by-hop header: next header, length 0 (8 octets total),
            // router alert option (MLD value 0), PadN to fill.
            buffer.write_all(&[
                self.next_header,
                0,
                IPV6_ROUTER_ALERT_TYPE,
                2,
                0,
                0,
                1,
                0,
            ])?;
        }

        buffer.extend_from_slice(&self.payload);
        Ok(buffer)
    }

    pub fn deserialize(data: &[u8]) -> Result<Ipv6Packet, PacketDeserializationError> {
        if data.len() < 40 {
            return Err(PacketDeserializationError::NotEnoughBytes);
        }

        let version = data[0] >> 4;
        if version != IPV6_VERSION {
            return Err(PacketDeserializationError::UnknownFormat { value: version });
        }

        let payload_length = usize::from(u16::from_be_bytes([data[4], data[5]]));
        if 40 + payload_length > data.len() {
            return Err(PacketDeserializationError::NotEnoughBytes);
        }

        let mut next_header = data[6];
        let src = read_ipv6(&data[8..24]);
        let dst = read_ipv6(&data[24..40]);

        let mut rest = &data[40..40 + payload_length];
        let mut router_alert = false;

        if next_header == IPV6_HOP_BY_HOP {
            if rest.len() < 8 {
                return Err(PacketDeserializationError::NotEnoughBytes);
            }
            let extension_length = (usize::from(rest[1]) + 1) * 8;
            if extension_length > rest.len() {
                return Err(PacketDeserializationError::LengthMismatch {
                    declared: extension_length,
                    actual: rest.len(),
                });
            }

            let mut index = 2;
            while index < extension_length {
                match rest[index] {
                    0 => index += 1, // Pad1
                    option_type => {
                        if index + 1 >= extension_length {
                            return Err(PacketDeserializationError::NotEnoughBytes);
                        }
                        if option_type == IPV6_ROUTER_ALERT_TYPE {
                            router_alert = true;
                        }
                        index += 2 + usize::from(rest[index + 1]);
                    }
                }
            }

            next_header = rest[0];
            rest = &rest[extension_length..];
        }

        Ok(Ipv6Packet {
            src,
            dst,
            hop_limit: data[7],
            next_header,
            router_alert,
            payload: Bytes::copy_from_slice(rest),
        })
    }
}

fn read_ipv6(octets: &[u8]) -> Ipv6Addr {
    let mut bytes = [0_u8; 16];
    bytes.copy_from_slice(octets);
    Ipv6Addr::from(bytes)
}

/// Either family of IP packet, as decapsulated from a tunnel.
#[derive(Debug, Clone, PartialEq)]
pub enum IpPacket {
    V4(Ipv4Packet),
    V6(Ipv6Packet),
}

impl IpPacket {
    /// Parses a packet, selecting the family from the version nibble.
    pub fn deserialize(data: &[u8]) -> Result<IpPacket, PacketDeserializationError> {
        match data.first().map(|byte| byte >> 4) {
            Some(IPV4_VERSION) => Ipv4Packet::deserialize(data).map(IpPacket::V4),
            Some(IPV6_VERSION) => Ipv6Packet::deserialize(data).map(IpPacket::V6),
            Some(version) => Err(PacketDeserializationError::UnknownFormat { value: version }),
            None => Err(PacketDeserializationError::NotEnoughBytes),
        }
    }

    pub fn serialize(&self) -> Result<Vec<u8>, PacketSerializationError> {
        match self {
            IpPacket::V4(packet) => packet.serialize(),
            IpPacket::V6(packet) => packet.serialize(),
        }
    }

    pub fn source(&self) -> IpAddr {
        match self {
            IpPacket::V4(packet) => IpAddr::V4(packet.src),
            IpPacket::V6(packet) => IpAddr::V6(packet.src),
        }
    }

    pub fn destination(&self) -> IpAddr {
        match self {
            IpPacket::V4(packet) => IpAddr::V4(packet.dst),
            IpPacket::V6(packet) => IpAddr::V6(packet.dst),
        }
    }

    /// The protocol number of the payload (for IPv6 this is the final
    /// next-header after any hop-by-hop extension).
    pub fn payload_protocol(&self) -> u8 {
        match self {
            IpPacket::V4(packet) => packet.protocol,
            IpPacket::V6(packet) => packet.next_header,
        }
    }

    pub fn payload(&self) -> &Bytes {
        match self {
            IpPacket::V4(packet) => &packet.payload,
            IpPacket::V6(packet) => &packet.payload,
        }
    }
}
