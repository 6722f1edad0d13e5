/*!
This module contains the group membership state machine for one logical
interface.

An AMT pseudo-interface runs two independent managers, one for IPv4/IGMP
and one for IPv6/MLD.  Each manager tracks one [`SourceFilter`] per
joined group and turns every filter-mode or source-set change into a
state-change report that a [`StateChangeReportTask`] retransmits a
bounded number of times.  Reports leave the manager through an injected
[`ReportSink`], which keeps the state machine independent of the tunnel
transport.
*/

mod errors;
mod report_task;
mod source_filter;

#[cfg(test)]
mod tests;

pub use self::errors::MembershipStateError;
pub use self::report_task::StateChangeReportTask;
pub use self::source_filter::{is_ssm_address, SourceFilter};

use log::debug;
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use mcast_proto::igmp::GroupRecordType;

use crate::timer::TaskTimer;

/// IGMPv3/MLDv2 filter mode for one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    /// Accept traffic only from the listed sources
    Include,

    /// Accept traffic from all but the listed sources
    Exclude,
}

/// One group record inside a membership report, using the shared
/// IGMPv3/MLDv2 record-type vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRecord {
    pub record_type: GroupRecordType,
    pub group: IpAddr,
    pub sources: Vec<IpAddr>,
}

/// A protocol-neutral membership report; the gateway transforms it into
/// an IGMPv3 or MLDv2 packet depending on the manager's address family.
#[derive(Debug, Clone, PartialEq)]
pub struct MembershipReport {
    pub records: Vec<ReportRecord>,
}

/// Where a manager's outgoing reports go.
pub trait ReportSink: Send + Sync {
    fn send_report(&self, report: MembershipReport);
}

#[derive(Debug, Clone)]
pub struct MembershipConfig {
    /// How many times a state change is retransmitted; the robustness
    /// variable of RFC 3376/3810.
    pub robustness_variable: u32,

    /// Delay between retransmissions of an unsolicited report.
    pub unsolicited_report_interval: Duration,
}

impl Default for MembershipConfig {
    fn default() -> MembershipConfig {
        MembershipConfig {
            robustness_variable: 2,
            unsolicited_report_interval: Duration::from_secs(1),
        }
    }
}

struct ManagerState {
    filters: HashMap<IpAddr, SourceFilter>,
    pending_reports: HashMap<IpAddr, Arc<StateChangeReportTask>>,
}

/// Tracks the joined groups of one logical interface and emits
/// state-change reports with retransmission.
///
/// All mutation is serialized by a single mutex; join/leave calls and
/// query handling never hold that mutex across a send.
pub struct InterfaceMembershipManager {
    state: Mutex<ManagerState>,
    sink: Arc<dyn ReportSink>,
    timer: Arc<TaskTimer>,
    config: MembershipConfig,
}

impl InterfaceMembershipManager {
    pub fn new(
        timer: Arc<TaskTimer>,
        sink: Arc<dyn ReportSink>,
        config: MembershipConfig,
    ) -> InterfaceMembershipManager {
        InterfaceMembershipManager {
            state: Mutex::new(ManagerState {
                filters: HashMap::new(),
                pending_reports: HashMap::new(),
            }),
            sink,
            timer,
            config,
        }
    }

    /// ASM join: subscribe to every source sending to `group`.
    pub fn join(&self, group: IpAddr) -> Result<(), MembershipStateError> {
        let mut state = self.lock();
        let filter = state
            .filters
            .entry(group)
            .or_insert_with(|| SourceFilter::new(group));
        filter.join()?;
        let sources = filter.sources().clone();

        debug!("ASM join of group {}", group);
        self.post_mode_change(&mut state, group, FilterMode::Exclude, sources);
        Ok(())
    }

    /// SSM join: subscribe to `source` sending to `group`.
    pub fn join_source(&self, group: IpAddr, source: IpAddr) -> Result<(), MembershipStateError> {
        let mut state = self.lock();
        let filter = state
            .filters
            .entry(group)
            .or_insert_with(|| SourceFilter::new(group));

        let mode = filter.mode();
        let old_sources = filter.sources().clone();
        filter.join_source(source)?;
        let new_sources = filter.sources().clone();

        debug!("join of source {} in group {}", source, group);
        self.post_source_change(&mut state, group, mode, old_sources, &new_sources);
        Ok(())
    }

    /// Leaves `group` entirely.
    pub fn leave(&self, group: IpAddr) -> Result<(), MembershipStateError> {
        let mut state = self.lock();
        let filter = state
            .filters
            .get_mut(&group)
            .ok_or(MembershipStateError::GroupNotJoined { group })?;

        let old_mode = filter.mode();
        let old_sources = filter.sources().clone();
        filter.leave()?;
        state.filters.remove(&group);

        debug!("leave of group {}", group);
        if old_mode == FilterMode::Exclude {
            self.post_mode_change(&mut state, group, FilterMode::Include, HashSet::new());
        } else {
            // An SSM leave keeps INCLUDE mode; the report blocks the
            // old sources rather than announcing a mode change.
            self.post_source_change(
                &mut state,
                group,
                FilterMode::Include,
                old_sources,
                &HashSet::new(),
            );
        }
        Ok(())
    }

    /// Removes one source subscription from `group`.
    pub fn leave_source(&self, group: IpAddr, source: IpAddr) -> Result<(), MembershipStateError> {
        let mut state = self.lock();
        let filter = state
            .filters
            .get_mut(&group)
            .ok_or(MembershipStateError::GroupNotJoined { group })?;

        let mode = filter.mode();
        let old_sources = filter.sources().clone();
        filter.leave_source(source)?;
        let new_sources = filter.sources().clone();

        let empty = filter.mode() == FilterMode::Include && filter.is_empty();
        if empty {
            state.filters.remove(&group);
        }

        debug!("leave of source {} in group {}", source, group);
        self.post_source_change(&mut state, group, mode, old_sources, &new_sources);
        Ok(())
    }

    /// Leaves every joined group, scheduling the matching reports.
    pub fn leave_all(&self) {
        let mut state = self.lock();
        let filters: Vec<SourceFilter> = state.filters.drain().map(|(_, f)| f).collect();

        for filter in filters {
            let group = filter.group();
            if filter.mode() == FilterMode::Exclude {
                self.post_mode_change(&mut state, group, FilterMode::Include, HashSet::new());
            } else if !filter.is_empty() {
                self.post_source_change(
                    &mut state,
                    group,
                    FilterMode::Include,
                    filter.sources().clone(),
                    &HashSet::new(),
                );
            }
        }
    }

    /// Responds to a general query with a current-state report of all
    /// filters.  The response is sent immediately rather than after a
    /// random delay.
    pub fn handle_general_query(&self) {
        let report = {
            let state = self.lock();
            let records: Vec<ReportRecord> = state
                .filters
                .values()
                .map(|filter| ReportRecord {
                    record_type: match filter.mode() {
                        FilterMode::Include => GroupRecordType::ModeIsInclude,
                        FilterMode::Exclude => GroupRecordType::ModeIsExclude,
                    },
                    group: filter.group(),
                    sources: filter.sources().iter().cloned().collect(),
                })
                .collect();
            MembershipReport { records }
        };

        if !report.records.is_empty() {
            debug!(
                "answering general query with {} group record(s)",
                report.records.len()
            );
            self.sink.send_report(report);
        }
    }

    /// Cancels every pending retransmission task.  Called when the
    /// owning interface shuts down.
    pub fn cancel_pending_reports(&self) {
        let mut state = self.lock();
        for task in state.pending_reports.values() {
            task.cancel();
        }
        state.pending_reports.clear();
    }

    /// A snapshot of the filter currently held for `group`, if any.
    pub fn source_filter(&self, group: IpAddr) -> Option<SourceFilter> {
        self.lock().filters.get(&group).cloned()
    }

    pub fn joined_groups(&self) -> Vec<IpAddr> {
        self.lock().filters.keys().cloned().collect()
    }

    fn post_mode_change(
        &self,
        state: &mut ManagerState,
        group: IpAddr,
        new_mode: FilterMode,
        sources: HashSet<IpAddr>,
    ) {
        if let Some(task) = state.pending_reports.get(&group) {
            if !task.is_cancelled() {
                task.update_filter_mode(new_mode, sources);
                return;
            }
        }

        let task = Arc::new(StateChangeReportTask::for_mode_change(
            group,
            self.config.robustness_variable,
            new_mode,
            sources,
            self.sink.clone(),
        ));
        self.schedule(state, group, task);
    }

    fn post_source_change(
        &self,
        state: &mut ManagerState,
        group: IpAddr,
        mode: FilterMode,
        old_sources: HashSet<IpAddr>,
        new_sources: &HashSet<IpAddr>,
    ) {
        if let Some(task) = state.pending_reports.get(&group) {
            if !task.is_cancelled() {
                task.update_source_set(new_sources);
                return;
            }
        }

        let task = Arc::new(StateChangeReportTask::for_source_change(
            group,
            self.config.robustness_variable,
            mode,
            old_sources,
            new_sources,
            self.sink.clone(),
        ));
        self.schedule(state, group, task);
    }

    fn schedule(&self, state: &mut ManagerState, group: IpAddr, task: Arc<StateChangeReportTask>) {
        // Tasks cancel themselves once their countdowns are exhausted;
        // drop those entries so the map only holds live tasks.
        state.pending_reports.retain(|_, task| !task.is_cancelled());

        let run_task = task.clone();
        let handle = self.timer.schedule_at_fixed_rate(
            Duration::from_millis(0),
            self.config.unsolicited_report_interval,
            Box::new(move || {
                run_task.run();
            }),
        );
        task.set_timer_handle(handle);
        state.pending_reports.insert(group, task);
    }

    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(|error| error.into_inner())
    }
}
