//! Per-group subscription state: a filter mode plus a source set, with
//! the IGMPv3/MLDv2 interpretation of the pair.

use std::collections::HashSet;
use std::net::IpAddr;

use crate::membership::errors::MembershipStateError;
use crate::membership::FilterMode;

/// True for addresses inside the source-specific multicast ranges
/// (232/8 for IPv4, ff3x::/32 for IPv6).
pub fn is_ssm_address(group: &IpAddr) -> bool {
    match group {
        IpAddr::V4(address) => address.octets()[0] == 232,
        IpAddr::V6(address) => address.segments()[0] & 0xfff0 == 0xff30,
    }
}

/// One group's subscription state on one interface.
///
/// An INCLUDE-mode filter accepts only the listed sources, so an empty
/// INCLUDE set accepts nothing; an EXCLUDE-mode filter accepts all but
/// the listed sources, so an empty EXCLUDE set accepts everything.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFilter {
    group: IpAddr,
    mode: FilterMode,
    sources: HashSet<IpAddr>,
}

impl SourceFilter {
    /// Creates a filter in INCLUDE mode with an empty source set,
    /// accepting nothing until the first join.
    pub fn new(group: IpAddr) -> SourceFilter {
        SourceFilter {
            group,
            mode: FilterMode::Include,
            sources: HashSet::new(),
        }
    }

    pub fn group(&self) -> IpAddr {
        self.group
    }

    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    pub fn sources(&self) -> &HashSet<IpAddr> {
        &self.sources
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn is_included(&self, source: &IpAddr) -> bool {
        match self.mode {
            FilterMode::Include => self.sources.contains(source),
            FilterMode::Exclude => !self.sources.contains(source),
        }
    }

    pub fn is_excluded(&self, source: &IpAddr) -> bool {
        !self.is_included(source)
    }

    pub fn is_filtered(&self, source: &IpAddr) -> bool {
        !self.is_included(source)
    }

    /// ASM join: flips the filter to EXCLUDE mode with a cleared source
    /// set so every source is accepted.
    pub fn join(&mut self) -> Result<(), MembershipStateError> {
        if self.mode == FilterMode::Exclude {
            return Err(MembershipStateError::GroupAlreadyJoined { group: self.group });
        }

        self.mode = FilterMode::Exclude;
        self.sources.clear();
        Ok(())
    }

    /// Full leave: resets the filter to INCLUDE mode with an empty
    /// source set.  Tolerated on an INCLUDE-mode filter when the group
    /// address is in an SSM range (the set is simply cleared).
    pub fn leave(&mut self) -> Result<(), MembershipStateError> {
        if self.mode == FilterMode::Exclude {
            self.mode = FilterMode::Include;
            self.sources.clear();
            Ok(())
        } else if is_ssm_address(&self.group) {
            self.sources.clear();
            Ok(())
        } else {
            Err(MembershipStateError::GroupNotJoined { group: self.group })
        }
    }

    /// SSM join: adds one source to the set.
    pub fn join_source(&mut self, source: IpAddr) -> Result<(), MembershipStateError> {
        if !self.sources.insert(source) {
            return Err(MembershipStateError::SourceAlreadyJoined {
                group: self.group,
                source_address: source,
            });
        }
        Ok(())
    }

    /// Removes one source from the set.
    pub fn leave_source(&mut self, source: IpAddr) -> Result<(), MembershipStateError> {
        if !self.sources.remove(&source) {
            return Err(MembershipStateError::SourceNotJoined {
                group: self.group,
                source_address: source,
            });
        }
        Ok(())
    }
}
