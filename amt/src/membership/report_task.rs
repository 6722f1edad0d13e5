//! The retransmission task behind state-change reports.
//!
//! A group gets one task whenever its filter mode or source set
//! changes.  The task retransmits the pending change a bounded number
//! of times and then cancels itself; a superseding change resets the
//! countdown instead of spawning a second task.  Mode-change
//! retransmissions always exhaust before source-change ones.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use mcast_proto::igmp::GroupRecordType;

use crate::membership::{FilterMode, MembershipReport, ReportRecord, ReportSink};
use crate::timer::TimerHandle;

struct TaskState {
    mode: FilterMode,
    source_set: HashSet<IpAddr>,
    allow_new_sources: HashSet<IpAddr>,
    block_old_sources: HashSet<IpAddr>,
    mode_change_transmissions_remaining: u32,
    source_change_transmissions_remaining: u32,
    cancelled: bool,
    timer_handle: Option<TimerHandle>,
}

pub struct StateChangeReportTask {
    group: IpAddr,
    retransmission_count: u32,
    sink: Arc<dyn ReportSink>,
    state: Mutex<TaskState>,
}

impl StateChangeReportTask {
    /// Creates a task carrying a pending filter-mode change.
    pub fn for_mode_change(
        group: IpAddr,
        retransmission_count: u32,
        new_mode: FilterMode,
        source_set: HashSet<IpAddr>,
        sink: Arc<dyn ReportSink>,
    ) -> StateChangeReportTask {
        StateChangeReportTask {
            group,
            retransmission_count,
            sink,
            state: Mutex::new(TaskState {
                mode: new_mode,
                source_set,
                allow_new_sources: HashSet::new(),
                block_old_sources: HashSet::new(),
                mode_change_transmissions_remaining: retransmission_count,
                source_change_transmissions_remaining: 0,
                cancelled: false,
                timer_handle: None,
            }),
        }
    }

    /// Creates a task carrying a pending source-set change, computing
    /// the ALLOW/BLOCK deltas from the old and new sets.
    pub fn for_source_change(
        group: IpAddr,
        retransmission_count: u32,
        mode: FilterMode,
        old_source_set: HashSet<IpAddr>,
        new_source_set: &HashSet<IpAddr>,
        sink: Arc<dyn ReportSink>,
    ) -> StateChangeReportTask {
        let task = StateChangeReportTask {
            group,
            retransmission_count,
            sink,
            state: Mutex::new(TaskState {
                mode,
                source_set: old_source_set,
                allow_new_sources: HashSet::new(),
                block_old_sources: HashSet::new(),
                mode_change_transmissions_remaining: 0,
                source_change_transmissions_remaining: 0,
                cancelled: false,
                timer_handle: None,
            }),
        };

        task.update_source_set(new_source_set);
        task
    }

    pub fn group(&self) -> IpAddr {
        self.group
    }

    /// Attaches the timer handle driving this task so it can cancel
    /// itself once both countdowns are exhausted.
    pub fn set_timer_handle(&self, handle: TimerHandle) {
        let mut state = self.lock();
        if state.cancelled {
            handle.cancel();
        } else {
            state.timer_handle = Some(handle);
        }
    }

    /// Replaces the pending source-set change with the delta between
    /// the task's baseline set and `new_source_set`, resetting the
    /// source-change countdown.
    ///
    /// Which subtraction produces ALLOW and which produces BLOCK
    /// depends on the filter mode:
    ///
    /// ```text
    /// INCLUDE (A) -> INCLUDE (B)   ALLOW (B-A), BLOCK (A-B)
    /// EXCLUDE (A) -> EXCLUDE (B)   ALLOW (A-B), BLOCK (B-A)
    /// ```
    pub fn update_source_set(&self, new_source_set: &HashSet<IpAddr>) {
        let mut state = self.lock();

        match state.mode {
            FilterMode::Include => {
                state.allow_new_sources =
                    new_source_set.difference(&state.source_set).cloned().collect();
                state.block_old_sources =
                    state.source_set.difference(new_source_set).cloned().collect();
            }
            FilterMode::Exclude => {
                state.allow_new_sources =
                    state.source_set.difference(new_source_set).cloned().collect();
                state.block_old_sources =
                    new_source_set.difference(&state.source_set).cloned().collect();
            }
        }

        // The baseline advances so the next superseding change diffs
        // against the state just reported.
        state.source_set = new_source_set.clone();
        state.source_change_transmissions_remaining = self.retransmission_count;
    }

    /// Replaces the pending change with a filter-mode change,
    /// discarding any pending source deltas and resetting the
    /// mode-change countdown.
    pub fn update_filter_mode(&self, new_mode: FilterMode, new_source_set: HashSet<IpAddr>) {
        let mut state = self.lock();
        if state.mode == new_mode {
            return;
        }

        state.mode = new_mode;
        state.source_set = new_source_set;
        state.allow_new_sources.clear();
        state.block_old_sources.clear();
        state.mode_change_transmissions_remaining = self.retransmission_count;
        state.source_change_transmissions_remaining = 0;
    }

    /// One timer tick: sends the next retransmission, or cancels the
    /// task when nothing is pending.  Returns false once the task has
    /// cancelled itself.
    ///
    /// The report is snapshotted under the task lock and sent after the
    /// lock is released, so a slow send never stalls a concurrent
    /// join/leave call that is superseding this task.
    pub fn run(&self) -> bool {
        let report = {
            let mut state = self.lock();
            if state.cancelled {
                return false;
            }

            if state.mode_change_transmissions_remaining > 0 {
                state.mode_change_transmissions_remaining -= 1;

                let record_type = match state.mode {
                    FilterMode::Include => GroupRecordType::ChangeToIncludeMode,
                    FilterMode::Exclude => GroupRecordType::ChangeToExcludeMode,
                };

                MembershipReport {
                    records: vec![ReportRecord {
                        record_type,
                        group: self.group,
                        sources: state.source_set.iter().cloned().collect(),
                    }],
                }
            } else if state.source_change_transmissions_remaining > 0 {
                state.source_change_transmissions_remaining -= 1;

                let mut records = Vec::new();
                if !state.allow_new_sources.is_empty() {
                    records.push(ReportRecord {
                        record_type: GroupRecordType::AllowNewSources,
                        group: self.group,
                        sources: state.allow_new_sources.iter().cloned().collect(),
                    });
                }
                if !state.block_old_sources.is_empty() {
                    records.push(ReportRecord {
                        record_type: GroupRecordType::BlockOldSources,
                        group: self.group,
                        sources: state.block_old_sources.iter().cloned().collect(),
                    });
                }

                MembershipReport { records }
            } else {
                cancel_locked(&mut state);
                return false;
            }
        };

        if !report.records.is_empty() {
            self.sink.send_report(report);
        }
        true
    }

    /// Cancels the task and its timer schedule; idempotent.
    pub fn cancel(&self) {
        let mut state = self.lock();
        cancel_locked(&mut state);
    }

    pub fn is_cancelled(&self) -> bool {
        self.lock().cancelled
    }

    fn lock(&self) -> MutexGuard<'_, TaskState> {
        self.state.lock().unwrap_or_else(|error| error.into_inner())
    }
}

fn cancel_locked(state: &mut TaskState) {
    state.cancelled = true;
    if let Some(handle) = state.timer_handle.take() {
        handle.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::sync::Mutex as StdMutex;

    struct CollectingSink {
        reports: StdMutex<Vec<MembershipReport>>,
    }

    impl CollectingSink {
        fn new() -> Arc<CollectingSink> {
            Arc::new(CollectingSink {
                reports: StdMutex::new(Vec::new()),
            })
        }

        fn count(&self) -> usize {
            self.reports.lock().unwrap().len()
        }

        fn last(&self) -> MembershipReport {
            self.reports.lock().unwrap().last().unwrap().clone()
        }
    }

    impl ReportSink for CollectingSink {
        fn send_report(&self, report: MembershipReport) {
            self.reports.lock().unwrap().push(report);
        }
    }

    fn group() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(239, 0, 0, 1))
    }

    fn source(n: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, n))
    }

    fn set(sources: &[IpAddr]) -> HashSet<IpAddr> {
        sources.iter().cloned().collect()
    }

    #[test]
    fn sends_exactly_retransmission_count_times_then_self_cancels() {
        let sink = CollectingSink::new();
        let task = StateChangeReportTask::for_mode_change(
            group(),
            3,
            FilterMode::Exclude,
            HashSet::new(),
            sink.clone(),
        );

        for _ in 0..3 {
            assert!(task.run());
        }
        assert!(!task.run());
        assert!(task.is_cancelled());
        assert_eq!(sink.count(), 3);

        // Further ticks after self-cancellation send nothing.
        assert!(!task.run());
        assert_eq!(sink.count(), 3);
    }

    #[test]
    fn superseding_source_change_resets_the_countdown() {
        let sink = CollectingSink::new();
        let task = StateChangeReportTask::for_source_change(
            group(),
            3,
            FilterMode::Include,
            set(&[]),
            &set(&[source(1)]),
            sink.clone(),
        );

        task.run();
        task.run();
        assert_eq!(sink.count(), 2);

        task.update_source_set(&set(&[source(1), source(2)]));
        for _ in 0..3 {
            assert!(task.run());
        }
        assert!(!task.run());
        assert_eq!(sink.count(), 5);
    }

    #[test]
    fn include_mode_deltas() {
        // INCLUDE {A,B} -> {B,C} reports ALLOW {C}, BLOCK {A}.
        let sink = CollectingSink::new();
        let task = StateChangeReportTask::for_source_change(
            group(),
            1,
            FilterMode::Include,
            set(&[source(1), source(2)]),
            &set(&[source(2), source(3)]),
            sink.clone(),
        );

        task.run();
        let report = sink.last();

        let allow = report
            .records
            .iter()
            .find(|r| r.record_type == GroupRecordType::AllowNewSources)
            .unwrap();
        let block = report
            .records
            .iter()
            .find(|r| r.record_type == GroupRecordType::BlockOldSources)
            .unwrap();

        assert_eq!(allow.sources, vec![source(3)]);
        assert_eq!(block.sources, vec![source(1)]);
    }

    #[test]
    fn exclude_mode_deltas_flip_the_subtraction() {
        // EXCLUDE {A,B} -> {B,C} reports ALLOW {A}, BLOCK {C}.
        let sink = CollectingSink::new();
        let task = StateChangeReportTask::for_source_change(
            group(),
            1,
            FilterMode::Exclude,
            set(&[source(1), source(2)]),
            &set(&[source(2), source(3)]),
            sink.clone(),
        );

        task.run();
        let report = sink.last();

        let allow = report
            .records
            .iter()
            .find(|r| r.record_type == GroupRecordType::AllowNewSources)
            .unwrap();
        let block = report
            .records
            .iter()
            .find(|r| r.record_type == GroupRecordType::BlockOldSources)
            .unwrap();

        assert_eq!(allow.sources, vec![source(1)]);
        assert_eq!(block.sources, vec![source(3)]);
    }

    #[test]
    fn mode_change_exhausts_before_pending_source_change() {
        let sink = CollectingSink::new();
        let task = StateChangeReportTask::for_source_change(
            group(),
            2,
            FilterMode::Exclude,
            set(&[]),
            &set(&[source(1)]),
            sink.clone(),
        );

        // Superseding mode change discards the pending source deltas.
        task.update_filter_mode(FilterMode::Include, HashSet::new());

        task.run();
        task.run();
        assert!(!task.run());

        let reports = sink.reports.lock().unwrap();
        assert_eq!(reports.len(), 2);
        for report in reports.iter() {
            assert_eq!(report.records.len(), 1);
            assert_eq!(
                report.records[0].record_type,
                GroupRecordType::ChangeToIncludeMode
            );
        }
    }

    #[test]
    fn cancellation_is_idempotent() {
        let sink = CollectingSink::new();
        let task = StateChangeReportTask::for_mode_change(
            group(),
            3,
            FilterMode::Exclude,
            HashSet::new(),
            sink.clone(),
        );

        task.cancel();
        task.cancel();
        assert!(task.is_cancelled());
        assert!(!task.run());
        assert_eq!(sink.count(), 0);
    }

    #[test]
    fn mode_change_report_carries_the_source_set() {
        let sink = CollectingSink::new();
        let task = StateChangeReportTask::for_mode_change(
            group(),
            1,
            FilterMode::Include,
            set(&[source(7)]),
            sink.clone(),
        );

        task.run();
        let report = sink.last();
        assert_eq!(report.records.len(), 1);
        assert_eq!(
            report.records[0].record_type,
            GroupRecordType::ChangeToIncludeMode
        );
        assert_eq!(report.records[0].sources, vec![source(7)]);
    }
}
