//! IGMPv3 message formats (RFC 3376): the membership query sent by a
//! querier and the version 3 membership report sent by hosts.
//!
//! Only the v3 formats are modeled; v1/v2 compatibility modes are a
//! router concern and never appear on an AMT tunnel.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Write};
use std::net::Ipv4Addr;

use crate::bitfield::ByteBitField;
use crate::checksum::{internet_checksum, verify_internet_checksum};
use crate::errors::{PacketDeserializationError, PacketSerializationError};

/// IP protocol number carrying IGMP messages.
pub const IGMP_PROTOCOL_NUMBER: u8 = 2;

pub const MEMBERSHIP_QUERY_TYPE: u8 = 0x11;
pub const MEMBERSHIP_REPORT_V3_TYPE: u8 = 0x22;

/// All IGMPv3-capable routers; destination of every v3 report.
pub const REPORT_DESTINATION: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 22);

fn suppress_flag() -> ByteBitField {
    ByteBitField::new(3, 1).expect("static field bounds")
}

fn robustness_field() -> ByteBitField {
    ByteBitField::new(0, 3).expect("static field bounds")
}

/// The group record types defined by RFC 3376 section 4.2.12 (shared
/// verbatim by MLDv2).
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum GroupRecordType {
    /// Current-state record: the interface is in INCLUDE mode
    ModeIsInclude,

    /// Current-state record: the interface is in EXCLUDE mode
    ModeIsExclude,

    /// Filter-mode-change record: the interface switched to INCLUDE
    ChangeToIncludeMode,

    /// Filter-mode-change record: the interface switched to EXCLUDE
    ChangeToExcludeMode,

    /// Source-list-change record: sources the interface now accepts
    AllowNewSources,

    /// Source-list-change record: sources the interface no longer accepts
    BlockOldSources,
}

impl GroupRecordType {
    pub fn value(self) -> u8 {
        match self {
            GroupRecordType::ModeIsInclude => 1,
            GroupRecordType::ModeIsExclude => 2,
            GroupRecordType::ChangeToIncludeMode => 3,
            GroupRecordType::ChangeToExcludeMode => 4,
            GroupRecordType::AllowNewSources => 5,
            GroupRecordType::BlockOldSources => 6,
        }
    }

    pub fn from_value(value: u8) -> Result<GroupRecordType, PacketDeserializationError> {
        match value {
            1 => Ok(GroupRecordType::ModeIsInclude),
            2 => Ok(GroupRecordType::ModeIsExclude),
            3 => Ok(GroupRecordType::ChangeToIncludeMode),
            4 => Ok(GroupRecordType::ChangeToExcludeMode),
            5 => Ok(GroupRecordType::AllowNewSources),
            6 => Ok(GroupRecordType::BlockOldSources),
            value => Err(PacketDeserializationError::UnknownFormat { value }),
        }
    }
}

/// One group record within a v3 membership report.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupRecord {
    pub record_type: GroupRecordType,
    pub group: Ipv4Addr,
    pub sources: Vec<Ipv4Addr>,
}

impl GroupRecord {
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

    fn read_from(cursor: &mut Cursor<&[u8]>) -> Result<GroupRecord, PacketDeserializationError> {
        let record_type = GroupRecordType::from_value(cursor.read_u8()?)?;
        let aux_data_len = cursor.read_u8()?;
        let source_count = cursor.read_u16::<BigEndian>()?;
        let group = Ipv4Addr::from(cursor.read_u32::<BigEndian>()?);

        let mut sources = Vec::with_capacity(usize::from(source_count));
        for _ in 0..source_count {
            sources.push(Ipv4Addr::from(cursor.read_u32::<BigEndian>()?));
        }

        // Skip auxiliary data we do not interpret.
        for _ in 0..aux_data_len {
            cursor.read_u32::<BigEndian>()?;
        }

        Ok(GroupRecord {
            record_type,
            group,
            sources,
        })
    }
}

/// An IGMPv3 membership query.
///
/// A general query carries the unspecified group address and an empty
/// source list; a group (or group-and-source) specific query names the
/// group it probes.
#[derive(Debug, Clone, PartialEq)]
pub struct MembershipQueryV3 {
    pub max_resp_code: u8,
    pub group: Ipv4Addr,
    pub suppress_router_processing: bool,
    pub robustness_variable: u8,
    pub query_interval_code: u8,
    pub sources: Vec<Ipv4Addr>,
}

impl MembershipQueryV3 {
    pub fn is_general_query(&self) -> bool {
        self.group.is_unspecified() && self.sources.is_empty()
    }

    pub fn serialize(&self) -> Result<Vec<u8>, PacketSerializationError> {
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

        let mut buffer = Vec::with_capacity(12 + self.sources.len() * 4);
        buffer.write_u8(MEMBERSHIP_QUERY_TYPE)?;
        buffer.write_u8(self.max_resp_code)?;
        buffer.write_u16::<BigEndian>(0)?; // checksum placeholder
        buffer.write_all(&self.group.octets())?;
        buffer.write_u8(flags)?;
        buffer.write_u8(self.query_interval_code)?;
        buffer.write_u16::<BigEndian>(self.sources.len() as u16)?;
        for source in &self.sources {
            buffer.write_all(&source.octets())?;
        }

        let checksum = internet_checksum(&buffer);
        buffer[2..4].copy_from_slice(&checksum.to_be_bytes());
        Ok(buffer)
    }

    pub fn deserialize(data: &[u8]) -> Result<MembershipQueryV3, PacketDeserializationError> {
        if data.len() < 12 {
            return Err(PacketDeserializationError::NotEnoughBytes);
        }
        if data[0] != MEMBERSHIP_QUERY_TYPE {
            return Err(PacketDeserializationError::UnknownFormat { value: data[0] });
        }
        if !verify_internet_checksum(data) {
            return Err(PacketDeserializationError::InvalidChecksum);
        }

        let mut cursor = Cursor::new(data);
        cursor.set_position(1);
        let max_resp_code = cursor.read_u8()?;
        let _checksum = cursor.read_u16::<BigEndian>()?;
        let group = Ipv4Addr::from(cursor.read_u32::<BigEndian>()?);
        let flags = cursor.read_u8()?;
        let query_interval_code = cursor.read_u8()?;
        let source_count = cursor.read_u16::<BigEndian>()?;

        let mut sources = Vec::with_capacity(usize::from(source_count));
        for _ in 0..source_count {
            sources.push(Ipv4Addr::from(cursor.read_u32::<BigEndian>()?));
        }

        Ok(MembershipQueryV3 {
            max_resp_code,
            group,
            suppress_router_processing: suppress_flag().get(flags) != 0,
            robustness_variable: robustness_field().get(flags),
            query_interval_code,
            sources,
        })
    }
}

/// An IGMPv3 membership report: a list of group records.
#[derive(Debug, Clone, PartialEq)]
pub struct MembershipReportV3 {
    pub records: Vec<GroupRecord>,
}

impl MembershipReportV3 {
    pub fn serialize(&self) -> Result<Vec<u8>, PacketSerializationError> {
        if self.records.len() > usize::from(u16::MAX) {
            return Err(PacketSerializationError::TooManyEntries {
                count: self.records.len(),
            });
        }

        let mut buffer = Vec::new();
        buffer.write_u8(MEMBERSHIP_REPORT_V3_TYPE)?;
        buffer.write_u8(0)?; // reserved
        buffer.write_u16::<BigEndian>(0)?; // checksum placeholder
        buffer.write_u16::<BigEndian>(0)?; // reserved
        buffer.write_u16::<BigEndian>(self.records.len() as u16)?;
        for record in &self.records {
            record.write_to(&mut buffer)?;
        }

        let checksum = internet_checksum(&buffer);
        buffer[2..4].copy_from_slice(&checksum.to_be_bytes());
        Ok(buffer)
    }

    pub fn deserialize(data: &[u8]) -> Result<MembershipReportV3, PacketDeserializationError> {
        if data.len() < 8 {
            return Err(PacketDeserializationError::NotEnoughBytes);
        }
        if data[0] != MEMBERSHIP_REPORT_V3_TYPE {
            return Err(PacketDeserializationError::UnknownFormat { value: data[0] });
        }
        if !verify_internet_checksum(data) {
            return Err(PacketDeserializationError::InvalidChecksum);
        }

        let mut cursor = Cursor::new(data);
        cursor.set_position(6);
        let record_count = cursor.read_u16::<BigEndian>()?;

        let mut records = Vec::with_capacity(usize::from(record_count));
        for _ in 0..record_count {
            records.push(GroupRecord::read_from(&mut cursor)?);
        }

        Ok(MembershipReportV3 { records })
    }
}
