//! Transforms between the protocol-neutral membership reports the
//! managers emit and the IP packets that ride inside membership update
//! messages.
//!
//! IGMPv3 reports travel to 224.0.0.22 with TTL 1, protocol 2, and the
//! router alert option; MLDv2 reports travel to ff02::16 with hop limit
//! 1 inside a hop-by-hop router alert header.

use bytes::Bytes;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use mcast_proto::errors::PacketSerializationError;
use mcast_proto::igmp::{self, GroupRecord, MembershipReportV3};
use mcast_proto::ip::{Ipv4Packet, Ipv6Packet};
use mcast_proto::mld::{self, ListenerRecord, ListenerReportV2};

use crate::membership::MembershipReport;

/// Builds the IPv4 packet carrying `report` as an IGMPv3 membership
/// report.  Records whose addresses are not IPv4 are skipped.
pub fn report_to_ipv4_packet(
    report: &MembershipReport,
) -> Result<Bytes, PacketSerializationError> {
    let records: Vec<GroupRecord> = report
        .records
        .iter()
        .filter_map(|record| match record.group {
            IpAddr::V4(group) => Some(GroupRecord {
                record_type: record.record_type,
                group,
                sources: record
                    .sources
                    .iter()
                    .filter_map(|source| match source {
                        IpAddr::V4(address) => Some(*address),
                        IpAddr::V6(_) => None,
                    })
                    .collect(),
            }),
            IpAddr::V6(_) => None,
        })
        .collect();

    let message = MembershipReportV3 { records }.serialize()?;
    let packet = Ipv4Packet {
        src: Ipv4Addr::UNSPECIFIED,
        dst: igmp::REPORT_DESTINATION,
        ttl: 1,
        protocol: igmp::IGMP_PROTOCOL_NUMBER,
        router_alert: true,
        payload: Bytes::from(message),
    };

    Ok(Bytes::from(packet.serialize()?))
}

/// Builds the IPv6 packet carrying `report` as an MLDv2 listener
/// report.  Records whose addresses are not IPv6 are skipped.
pub fn report_to_ipv6_packet(
    report: &MembershipReport,
) -> Result<Bytes, PacketSerializationError> {
    let src = Ipv6Addr::UNSPECIFIED;
    let dst = mld::REPORT_DESTINATION;

    let records: Vec<ListenerRecord> = report
        .records
        .iter()
        .filter_map(|record| match record.group {
            IpAddr::V6(group) => Some(ListenerRecord {
                record_type: record.record_type,
                group,
                sources: record
                    .sources
                    .iter()
                    .filter_map(|source| match source {
                        IpAddr::V6(address) => Some(*address),
                        IpAddr::V4(_) => None,
                    })
                    .collect(),
            }),
            IpAddr::V4(_) => None,
        })
        .collect();

    let message = ListenerReportV2 { records }.serialize(&src, &dst)?;
    let packet = Ipv6Packet {
        src,
        dst,
        hop_limit: 1,
        next_header: mld::ICMPV6_PROTOCOL_NUMBER,
        router_alert: true,
        payload: Bytes::from(message),
    };

    Ok(Bytes::from(packet.serialize()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcast_proto::igmp::GroupRecordType;
    use mcast_proto::ip::IpPacket;

    use crate::membership::ReportRecord;

    #[test]
    fn ipv4_report_packet_has_igmp_framing() {
        let report = MembershipReport {
            records: vec![ReportRecord {
                record_type: GroupRecordType::ChangeToExcludeMode,
                group: "239.1.2.3".parse().unwrap(),
                sources: Vec::new(),
            }],
        };

        let bytes = report_to_ipv4_packet(&report).unwrap();
        let packet = match IpPacket::deserialize(&bytes).unwrap() {
            IpPacket::V4(packet) => packet,
            other => panic!("expected an IPv4 packet, got {:?}", other),
        };

        assert_eq!(packet.dst, Ipv4Addr::new(224, 0, 0, 22));
        assert_eq!(packet.ttl, 1);
        assert_eq!(packet.protocol, igmp::IGMP_PROTOCOL_NUMBER);
        assert!(packet.router_alert);

        let parsed = MembershipReportV3::deserialize(&packet.payload).unwrap();
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(
            parsed.records[0].record_type,
            GroupRecordType::ChangeToExcludeMode
        );
        assert_eq!(parsed.records[0].group, Ipv4Addr::new(239, 1, 2, 3));
    }

    #[test]
    fn ipv6_report_packet_has_mld_framing() {
        let report = MembershipReport {
            records: vec![ReportRecord {
                record_type: GroupRecordType::AllowNewSources,
                group: "ff3e::1234".parse().unwrap(),
                sources: vec!["2001:db8::9".parse().unwrap()],
            }],
        };

        let bytes = report_to_ipv6_packet(&report).unwrap();
        let packet = match IpPacket::deserialize(&bytes).unwrap() {
            IpPacket::V6(packet) => packet,
            other => panic!("expected an IPv6 packet, got {:?}", other),
        };

        assert_eq!(packet.dst, mld::REPORT_DESTINATION);
        assert_eq!(packet.hop_limit, 1);
        assert_eq!(packet.next_header, mld::ICMPV6_PROTOCOL_NUMBER);
        assert!(packet.router_alert);

        let parsed =
            ListenerReportV2::deserialize(&packet.src, &packet.dst, &packet.payload).unwrap();
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].sources.len(), 1);
    }

    #[test]
    fn mixed_family_records_are_partitioned() {
        let report = MembershipReport {
            records: vec![
                ReportRecord {
                    record_type: GroupRecordType::ModeIsExclude,
                    group: "239.0.0.1".parse().unwrap(),
                    sources: Vec::new(),
                },
                ReportRecord {
                    record_type: GroupRecordType::ModeIsInclude,
                    group: "ff0e::1".parse().unwrap(),
                    sources: Vec::new(),
                },
            ],
        };

        let v4 = report_to_ipv4_packet(&report).unwrap();
        let v4_packet = match IpPacket::deserialize(&v4).unwrap() {
            IpPacket::V4(packet) => packet,
            other => panic!("expected an IPv4 packet, got {:?}", other),
        };
        assert_eq!(
            MembershipReportV3::deserialize(&v4_packet.payload)
                .unwrap()
                .records
                .len(),
            1
        );

        let v6 = report_to_ipv6_packet(&report).unwrap();
        let v6_packet = match IpPacket::deserialize(&v6).unwrap() {
            IpPacket::V6(packet) => packet,
            other => panic!("expected an IPv6 packet, got {:?}", other),
        };
        assert_eq!(
            ListenerReportV2::deserialize(&v6_packet.src, &v6_packet.dst, &v6_packet.payload)
                .unwrap()
                .records
                .len(),
            1
        );
    }
}
