use super::*;
use std::net::Ipv4Addr;
use std::sync::Mutex as StdMutex;
use std::thread;

struct CollectingSink {
    reports: StdMutex<Vec<MembershipReport>>,
}

impl CollectingSink {
    fn new() -> Arc<CollectingSink> {
        Arc::new(CollectingSink {
            reports: StdMutex::new(Vec::new()),
        })
    }

    fn reports(&self) -> Vec<MembershipReport> {
        self.reports.lock().unwrap().clone()
    }

    fn wait_for_reports(&self, count: usize) -> Vec<MembershipReport> {
        for _ in 0..200 {
            let reports = self.reports();
            if reports.len() >= count {
                return reports;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!(
            "timed out waiting for {} report(s), saw {}",
            count,
            self.reports().len()
        );
    }

    fn wait_for_record_type(&self, record_type: GroupRecordType) -> MembershipReport {
        for _ in 0..200 {
            let reports = self.reports();
            if let Some(report) = reports.iter().find(|report| {
                report
                    .records
                    .iter()
                    .any(|record| record.record_type == record_type)
            }) {
                return report.clone();
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("timed out waiting for a {:?} record", record_type);
    }
}

impl ReportSink for CollectingSink {
    fn send_report(&self, report: MembershipReport) {
        self.reports.lock().unwrap().push(report);
    }
}

fn new_manager(sink: Arc<CollectingSink>) -> InterfaceMembershipManager {
    let config = MembershipConfig {
        robustness_variable: 2,
        unsolicited_report_interval: Duration::from_millis(10),
    };
    InterfaceMembershipManager::new(Arc::new(TaskTimer::new()), sink, config)
}

fn group() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(239, 1, 1, 1))
}

fn ssm_group() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(232, 1, 1, 1))
}

fn source(n: u8) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(10, 0, 0, n))
}

#[test]
fn asm_join_schedules_change_to_exclude_reports() {
    let sink = CollectingSink::new();
    let manager = new_manager(sink.clone());

    manager.join(group()).unwrap();

    // robustness_variable of 2 means exactly two retransmissions.
    let reports = sink.wait_for_reports(2);
    assert_eq!(reports.len(), 2);
    for report in &reports {
        assert_eq!(report.records.len(), 1);
        assert_eq!(
            report.records[0].record_type,
            GroupRecordType::ChangeToExcludeMode
        );
        assert_eq!(report.records[0].group, group());
        assert!(report.records[0].sources.is_empty());
    }

    thread::sleep(Duration::from_millis(50));
    assert_eq!(sink.reports().len(), 2, "task failed to self-cancel");
}

#[test]
fn double_asm_join_is_rejected_and_state_is_unchanged() {
    let sink = CollectingSink::new();
    let manager = new_manager(sink);

    manager.join(group()).unwrap();
    let before = manager.source_filter(group()).unwrap();

    assert_eq!(
        manager.join(group()).unwrap_err(),
        MembershipStateError::GroupAlreadyJoined { group: group() }
    );
    assert_eq!(manager.source_filter(group()).unwrap(), before);
}

#[test]
fn ssm_join_schedules_allow_report() {
    let sink = CollectingSink::new();
    let manager = new_manager(sink.clone());

    manager.join_source(ssm_group(), source(1)).unwrap();

    let reports = sink.wait_for_reports(1);
    assert_eq!(reports[0].records.len(), 1);
    assert_eq!(
        reports[0].records[0].record_type,
        GroupRecordType::AllowNewSources
    );
    assert_eq!(reports[0].records[0].sources, vec![source(1)]);
}

#[test]
fn leave_without_join_is_rejected() {
    let sink = CollectingSink::new();
    let manager = new_manager(sink);

    assert_eq!(
        manager.leave(group()).unwrap_err(),
        MembershipStateError::GroupNotJoined { group: group() }
    );
    assert_eq!(
        manager.leave_source(ssm_group(), source(1)).unwrap_err(),
        MembershipStateError::GroupNotJoined { group: ssm_group() }
    );
}

#[test]
fn leave_after_asm_join_reports_change_to_include() {
    let sink = CollectingSink::new();
    let manager = new_manager(sink.clone());

    manager.join(group()).unwrap();
    manager.leave(group()).unwrap();
    assert!(manager.source_filter(group()).is_none());

    // The superseding leave replaces the join's pending report, so the
    // retransmissions from this point carry the mode change back to
    // INCLUDE.
    let report = sink.wait_for_record_type(GroupRecordType::ChangeToIncludeMode);
    assert_eq!(report.records.len(), 1);
    assert!(report.records[0].sources.is_empty());
}

#[test]
fn ssm_leave_reports_blocked_sources() {
    let sink = CollectingSink::new();
    let manager = new_manager(sink.clone());

    manager.join_source(ssm_group(), source(1)).unwrap();
    sink.wait_for_reports(1);

    manager.leave_source(ssm_group(), source(1)).unwrap();
    assert!(manager.source_filter(ssm_group()).is_none());

    let report = sink.wait_for_record_type(GroupRecordType::BlockOldSources);
    assert_eq!(report.records.len(), 1);
    assert_eq!(report.records[0].sources, vec![source(1)]);
}

#[test]
fn general_query_is_answered_with_current_state() {
    let sink = CollectingSink::new();
    let manager = new_manager(sink.clone());

    manager.join(group()).unwrap();
    manager.join_source(ssm_group(), source(1)).unwrap();
    let already_sent = sink.wait_for_reports(1).len();

    manager.handle_general_query();

    let reports = sink.wait_for_reports(already_sent + 1);
    let response = reports
        .iter()
        .find(|report| {
            report.records.iter().any(|record| {
                record.record_type == GroupRecordType::ModeIsInclude
                    || record.record_type == GroupRecordType::ModeIsExclude
            })
        })
        .expect("no current-state response observed");

    assert_eq!(response.records.len(), 2);

    let exclude_record = response
        .records
        .iter()
        .find(|record| record.group == group())
        .unwrap();
    assert_eq!(exclude_record.record_type, GroupRecordType::ModeIsExclude);

    let include_record = response
        .records
        .iter()
        .find(|record| record.group == ssm_group())
        .unwrap();
    assert_eq!(include_record.record_type, GroupRecordType::ModeIsInclude);
    assert_eq!(include_record.sources, vec![source(1)]);
}

#[test]
fn query_with_no_joined_groups_sends_nothing() {
    let sink = CollectingSink::new();
    let manager = new_manager(sink.clone());

    manager.handle_general_query();
    thread::sleep(Duration::from_millis(30));
    assert!(sink.reports().is_empty());
}

#[test]
fn cancel_pending_reports_stops_retransmission() {
    let sink = CollectingSink::new();
    let manager = new_manager(sink.clone());

    manager.join(group()).unwrap();
    manager.cancel_pending_reports();
    let sent_before_cancel = sink.reports().len();

    thread::sleep(Duration::from_millis(60));
    assert_eq!(
        sink.reports().len(),
        sent_before_cancel,
        "reports kept flowing after cancellation"
    );
}

#[test]
fn leave_all_clears_every_group() {
    let sink = CollectingSink::new();
    let manager = new_manager(sink.clone());

    manager.join(group()).unwrap();
    manager.join_source(ssm_group(), source(1)).unwrap();

    manager.leave_all();
    assert!(manager.joined_groups().is_empty());

    sink.wait_for_record_type(GroupRecordType::ChangeToIncludeMode);
    sink.wait_for_record_type(GroupRecordType::BlockOldSources);
}

#[test]
fn exhausted_tasks_are_swept_from_the_pending_map() {
    let sink = CollectingSink::new();
    let manager = new_manager(sink.clone());
    let other_group = IpAddr::V4(Ipv4Addr::new(239, 2, 2, 2));

    manager.join(group()).unwrap();
    sink.wait_for_reports(2);

    // Wait for the first group's task to exhaust and cancel itself.
    for _ in 0..200 {
        let cancelled = manager
            .lock()
            .pending_reports
            .get(&group())
            .map(|task| task.is_cancelled())
            .unwrap_or(true);
        if cancelled {
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }

    manager.join(other_group).unwrap();

    let state = manager.lock();
    assert!(!state.pending_reports.contains_key(&group()));
    assert_eq!(state.pending_reports.len(), 1);
}
