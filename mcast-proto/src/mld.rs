//! MLDv2 message formats (RFC 3810): the multicast listener query and
//! the version 2 listener report.
//!
//! MLD messages are ICMPv6, so their checksum covers the IPv6
//! pseudo-header; serialization and parsing therefore take the source
//! and destination addresses of the enclosing packet.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Write};
use std::net::Ipv6Addr;

use crate::bitfield::ByteBitField;
use crate::checksum::{icmpv6_checksum, verify_icmpv6_checksum};
use crate::errors::{PacketDeserializationError, PacketSerializationError};
use crate::igmp::GroupRecordType;

/// IPv6 next-header value carrying ICMPv6 (and therefore MLD) messages.
pub const ICMPV6_PROTOCOL_NUMBER: u8 = 58;

pub const LISTENER_QUERY_TYPE: u8 = 130;
pub const LISTENER_REPORT_V2_TYPE: u8 = 143;

/// All MLDv2-capable routers; destination of every v2 report.
pub const REPORT_DESTINATION: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 0x16);

fn suppress_flag() -> ByteBitField {
    ByteBitField::new(3, 1).expect("static field bounds")
}

fn robustness_field() -> ByteBitField {
    ByteBitField::new(0, 3).expect("static field bounds")
}

fn read_ipv6(cursor: &mut Cursor<&[u8]>) -> Result<Ipv6Addr, PacketDeserializationError> {
    let mut octets = [0_u8; 16];
    std::io::Read::read_exact(cursor, &mut octets)?;
    Ok(Ipv6Addr::from(octets))
}

/// One multicast address record within a v2 listener report; the record
/// type vocabulary is shared with IGMPv3.
#[derive(Debug, Clone, PartialEq)]
pub struct ListenerRecord {
    pub record_type: GroupRecordType,
    pub group: Ipv6Addr,
    pub sources: Vec<Ipv6Addr>,
}

impl ListenerRecord {
    fn write_to(&self, buffer: &mut Vec<u8>) -> Result<(), PacketSerializationError> {
        if self.sources.len() > usize::from(u16::MAX) {
            return Err(PacketSerializationError::TooManyEntries {
                count: self.sources.len(),
            });
        }

        buffer.write_u8(self.record_type.value())?;
        buffer.write_u8(0)?; // aux data len
        buffer.write_u16::<BigEndian>(self.sources.len() as u16)?;
        buffer.write_all(&self.group.octets())?;
        for source in &self.sources {
            buffer.write_all(&source.octets())?;
        }
        Ok(())
    }

    fn read_from(cursor: &mut Cursor<&[u8]>) -> Result<ListenerRecord, PacketDeserializationError> {
        let record_type = GroupRecordType::from_value(cursor.read_u8()?)?;
        let aux_data_len = cursor.read_u8()?;
        let source_count = cursor.read_u16::<BigEndian>()?;
        let group = read_ipv6(cursor)?;

        let mut sources = Vec::with_capacity(usize::from(source_count));
        for _ in 0..source_count {
            sources.push(read_ipv6(cursor)?);
        }

        for _ in 0..aux_data_len {
            cursor.read_u32::<BigEndian>()?;
        }

        Ok(ListenerRecord {
            record_type,
            group,
            sources,
        })
    }
}

/// An MLDv2 multicast listener query.
#[derive(Debug, Clone, PartialEq)]
pub struct ListenerQueryV2 {
    pub max_resp_code: u16,
    pub group: Ipv6Addr,
    pub suppress_router_processing: bool,
    pub robustness_variable: u8,
    pub query_interval_code: u8,
    pub sources: Vec<Ipv6Addr>,
}

impl ListenerQueryV2 {
    pub fn is_general_query(&self) -> bool {
        self.group.is_unspecified() && self.sources.is_empty()
    }

    pub fn serialize(
        &self,
        src: &Ipv6Addr,
        dst: &Ipv6Addr,
    ) -> Result<Vec<u8>, PacketSerializationError> {
        if self.sources.len() > usize::from(u16::MAX) {
            return Err(PacketSerializationError::TooManyEntries {
                count: self.sources.len(),
            });
        }

        let mut flags = 0_u8;
        suppress_flag()
            .set(&mut flags, self.suppress_router_processing as u8)
            .expect("flag fits a 1-bit field");
        robustness_field()
            .set(&mut flags, self.robustness_variable & 0x07)
            .expect("masked value fits a 3-bit field");

        let mut buffer = Vec::with_capacity(28 + self.sources.len() * 16);
        buffer.write_u8(LISTENER_QUERY_TYPE)?;
        buffer.write_u8(0)?; // code
        buffer.write_u16::<BigEndian>(0)?; // checksum placeholder
        buffer.write_u16::<BigEndian>(self.max_resp_code)?;
        buffer.write_u16::<BigEndian>(0)?; // reserved
        buffer.write_all(&self.group.octets())?;
        buffer.write_u8(flags)?;
        buffer.write_u8(self.query_interval_code)?;
        buffer.write_u16::<BigEndian>(self.sources.len() as u16)?;
        for source in &self.sources {
            buffer.write_all(&source.octets())?;
        }

        let checksum = icmpv6_checksum(src, dst, ICMPV6_PROTOCOL_NUMBER, &buffer);
        buffer[2..4].copy_from_slice(&checksum.to_be_bytes());
        Ok(buffer)
    }

    pub fn deserialize(
        src: &Ipv6Addr,
        dst: &Ipv6Addr,
        data: &[u8],
    ) -> Result<ListenerQueryV2, PacketDeserializationError> {
        if data.len() < 28 {
            return Err(PacketDeserializationError::NotEnoughBytes);
        }
        if data[0] != LISTENER_QUERY_TYPE {
            return Err(PacketDeserializationError::UnknownFormat { value: data[0] });
        }
        if !verify_icmpv6_checksum(src, dst, ICMPV6_PROTOCOL_NUMBER, data) {
            return Err(PacketDeserializationError::InvalidChecksum);
        }

        let mut cursor = Cursor::new(data);
        cursor.set_position(4);
        let max_resp_code = cursor.read_u16::<BigEndian>()?;
        let _reserved = cursor.read_u16::<BigEndian>()?;
        let group = read_ipv6(&mut cursor)?;
        let flags = cursor.read_u8()?;
        let query_interval_code = cursor.read_u8()?;
        let source_count = cursor.read_u16::<BigEndian>()?;

        let mut sources = Vec::with_capacity(usize::from(source_count));
        for _ in 0..source_count {
            sources.push(read_ipv6(&mut cursor)?);
        }

        Ok(ListenerQueryV2 {
            max_resp_code,
            group,
            suppress_router_processing: suppress_flag().get(flags) != 0,
            robustness_variable: robustness_field().get(flags),
            query_interval_code,
            sources,
        })
    }
}

/// An MLDv2 multicast listener report: a list of address records.
#[derive(Debug, Clone, PartialEq)]
pub struct ListenerReportV2 {
    pub records: Vec<ListenerRecord>,
}

impl ListenerReportV2 {
    pub fn serialize(
        &self,
        src: &Ipv6Addr,
        dst: &Ipv6Addr,
    ) -> Result<Vec<u8>, PacketSerializationError> {
        if self.records.len() > usize::from(u16::MAX) {
            return Err(PacketSerializationError::TooManyEntries {
                count: self.records.len(),
            });
        }

        let mut buffer = Vec::new();
        buffer.write_u8(LISTENER_REPORT_V2_TYPE)?;
        buffer.write_u8(0)?; // code
        buffer.write_u16::<BigEndian>(0)?; // checksum placeholder
        buffer.write_u16::<BigEndian>(0)?; // reserved
        buffer.write_u16::<BigEndian>(self.records.len() as u16)?;
        for record in &self.records {
            record.write_to(&mut buffer)?;
        }

        let checksum = icmpv6_checksum(src, dst, ICMPV6_PROTOCOL_NUMBER, &buffer);
        buffer[2..4].copy_from_slice(&checksum.to_be_bytes());
        Ok(buffer)
    }

    pub fn deserialize(
        src: &Ipv6Addr,
        dst: &Ipv6Addr,
        data: &[u8],
    ) -> Result<ListenerReportV2, PacketDeserializationError> {
        if data.len() < 8 {
            return Err(PacketDeserializationError::NotEnoughBytes);
        }
        if data[0] != LISTENER_REPORT_V2_TYPE {
            return Err(PacketDeserializationError::UnknownFormat { value: data[0] });
        }
        if !verify_icmpv6_checksum(src, dst, ICMPV6_PROTOCOL_NUMBER, data) {
            return Err(PacketDeserializationError::InvalidChecksum);
        }

        let mut cursor = Cursor::new(data);
        cursor.set_position(6);
        let record_count = cursor.read_u16::<BigEndian>()?;

        let mut records = Vec::with_capacity(usize::from(record_count));
        for _ in 0..record_count {
            records.push(ListenerRecord::read_from(&mut cursor)?);
        }

        Ok(ListenerReportV2 { records })
    }
}
