use thiserror::Error;

use std::net::IpAddr;

/// Enumeration that represents the illegal join/leave transitions a
/// caller can request.  A rejected operation leaves the filter state
/// exactly as it was before the call.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MembershipStateError {
    /// An ASM join was attempted on a group that is already joined in
    /// EXCLUDE mode
    #[error("Illegal attempt to join ASM group {group} which is already joined")]
    GroupAlreadyJoined { group: IpAddr },

    /// A leave was attempted on a group that is not joined
    #[error("Illegal attempt to leave group {group} which is not joined")]
    GroupNotJoined { group: IpAddr },

    /// An SSM join was attempted for a source that is already in the
    /// group's source set
    #[error(
        "Illegal attempt to join source {source_address} in group {group} which is already joined"
    )]
    SourceAlreadyJoined {
        group: IpAddr,
        source_address: IpAddr,
    },

    /// A leave was attempted for a source that is not in the group's
    /// source set
    #[error(
        "Illegal attempt to leave source {source_address} in group {group} which is not joined"
    )]
    SourceNotJoined {
        group: IpAddr,
        source_address: IpAddr,
    },
}
