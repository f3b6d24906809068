//! End-to-end start/stop behaviour against the in-memory cloud.

use std::sync::Arc;

use nightshift_core::{InstanceState, PowerAction, ProviderError};
use nightshift_provider::{CloudCall, InMemoryCloud};
use nightshift_scheduler::{AlarmPhase, InstanceScheduler, SchedulerError};

const KEY: &str = "tostop";
const VALUE: &str = "true";

fn cloud() -> Arc<InMemoryCloud> {
    Arc::new(InMemoryCloud::new("eu-west-1"))
}

fn scheduler(cloud: &Arc<InMemoryCloud>) -> InstanceScheduler {
    InstanceScheduler::from_provider(cloud.clone(), 4)
}

/// Instances each watched by one alarm named `cpu-<id>`.
fn launch_with_alarms(cloud: &InMemoryCloud, count: usize) -> Vec<String> {
    let ids = cloud.launch_instances(count, KEY, VALUE);
    for id in &ids {
        cloud.add_alarm(&format!("cpu-{id}"), id, true);
    }
    ids
}

fn position(calls: &[CloudCall], pred: impl Fn(&CloudCall) -> bool) -> usize {
    calls
        .iter()
        .position(pred)
        .unwrap_or_else(|| panic!("call not found in {calls:?}"))
}

fn last_position(calls: &[CloudCall], pred: impl Fn(&CloudCall) -> bool) -> usize {
    calls
        .iter()
        .rposition(pred)
        .unwrap_or_else(|| panic!("call not found in {calls:?}"))
}

// ── No matches ────────────────────────────────────────────────

#[tokio::test]
async fn no_matches_makes_no_mutations() {
    let cloud = cloud();
    launch_with_alarms(&cloud, 2);
    let scheduler = scheduler(&cloud);

    let stopped = scheduler.stop("badtagkey", "badtagvalue").await.unwrap();
    let started = scheduler.start("badtagkey", "badtagvalue").await.unwrap();

    assert!(stopped.is_noop());
    assert!(started.is_noop());
    assert!(stopped.matched.is_empty());
    assert!(cloud.mutations().is_empty());
    assert!(!cloud
        .calls()
        .iter()
        .any(|c| matches!(c, CloudCall::DescribeAlarms(_))));
}

#[tokio::test]
async fn bad_tag_start_leaves_stopped_instances_stopped() {
    let cloud = cloud();
    let ids = cloud.launch_instances(3, KEY, VALUE);
    for id in &ids {
        cloud.set_state(id, InstanceState::Stopped);
    }

    scheduler(&cloud).start("badtagkey", "badtagvalue").await.unwrap();

    for id in &ids {
        assert_eq!(cloud.state_of(id), Some(InstanceState::Stopped));
    }
}

// ── Autoscaling exclusion ─────────────────────────────────────

#[tokio::test]
async fn autoscaling_members_are_never_touched() {
    let cloud = cloud();
    let plain = launch_with_alarms(&cloud, 2);
    let tagged_members = cloud.launch_autoscaling_group("web", 2, KEY, VALUE);
    let api_member = cloud.launch_instances(1, KEY, VALUE).remove(0);
    cloud.register_group_member(&api_member, "batch");
    for id in tagged_members.iter().chain(std::iter::once(&api_member)) {
        cloud.add_alarm(&format!("cpu-{id}"), id, true);
    }

    let scheduler = scheduler(&cloud);
    let report = scheduler.stop(KEY, VALUE).await.unwrap();
    scheduler.start(KEY, VALUE).await.unwrap();

    assert_eq!(report.targets, plain);
    assert_eq!(report.excluded.len(), 3);

    let members: Vec<&String> = tagged_members.iter().chain(std::iter::once(&api_member)).collect();
    for call in cloud.mutations() {
        for subject in call.subjects() {
            assert!(
                !members.iter().any(|m| subject.contains(m.as_str())),
                "{subject} belongs to an autoscaling group but appeared in {call:?}"
            );
        }
    }
    for id in &members {
        assert_eq!(cloud.state_of(id), Some(InstanceState::Running));
        assert_eq!(cloud.alarm_actions_enabled(&format!("cpu-{id}")), Some(true));
    }
}

#[tokio::test]
async fn autoscaling_members_stay_running_on_stop() {
    let cloud = cloud();
    let members = cloud.launch_autoscaling_group("web", 3, KEY, VALUE);

    let report = scheduler(&cloud).stop(KEY, VALUE).await.unwrap();

    assert!(report.is_noop());
    assert_eq!(report.matched.len(), 3);
    for id in &members {
        assert_eq!(cloud.state_of(id), Some(InstanceState::Running));
    }
    assert!(cloud.mutations().is_empty());
}

#[tokio::test]
async fn start_leaves_stopped_autoscaling_members_stopped() {
    let cloud = cloud();
    let members = cloud.launch_autoscaling_group("web", 3, KEY, VALUE);
    for id in &members {
        cloud.set_state(id, InstanceState::Stopped);
    }

    scheduler(&cloud).start(KEY, VALUE).await.unwrap();

    for id in &members {
        assert_eq!(cloud.state_of(id), Some(InstanceState::Stopped));
    }
}

// ── Ordering ──────────────────────────────────────────────────

#[tokio::test]
async fn stop_suspends_alarms_before_stopping() {
    let cloud = cloud();
    let ids = launch_with_alarms(&cloud, 3);

    let report = scheduler(&cloud).stop(KEY, VALUE).await.unwrap();

    let calls = cloud.calls();
    let last_disable = last_position(&calls, |c| matches!(c, CloudCall::DisableAlarmActions(_)));
    let stop = position(&calls, |c| matches!(c, CloudCall::StopInstances(_)));
    assert!(last_disable < stop);

    assert_eq!(report.action, PowerAction::Stop);
    assert_eq!(report.alarms_mutated.len(), 3);
    for id in &ids {
        assert_eq!(cloud.state_of(id), Some(InstanceState::Stopped));
        assert_eq!(cloud.state_of(id).map(InstanceState::code), Some(80));
        assert_eq!(cloud.alarm_actions_enabled(&format!("cpu-{id}")), Some(false));
    }
}

#[tokio::test]
async fn start_resumes_alarms_after_starting() {
    let cloud = cloud();
    let ids = launch_with_alarms(&cloud, 3);
    let scheduler = scheduler(&cloud);
    scheduler.stop(KEY, VALUE).await.unwrap();
    cloud.clear_calls();

    let report = scheduler.start(KEY, VALUE).await.unwrap();

    let calls = cloud.calls();
    let start = position(&calls, |c| matches!(c, CloudCall::StartInstances(_)));
    let first_enable = position(&calls, |c| matches!(c, CloudCall::EnableAlarmActions(_)));
    assert!(start < first_enable);

    assert_eq!(report.action, PowerAction::Start);
    assert_eq!(report.alarms_mutated.len(), 3);
    for id in &ids {
        assert_eq!(cloud.state_of(id).map(InstanceState::code), Some(16));
        assert_eq!(cloud.alarm_actions_enabled(&format!("cpu-{id}")), Some(true));
    }
}

// ── Idempotence ───────────────────────────────────────────────

#[tokio::test]
async fn stopping_twice_is_harmless() {
    let cloud = cloud();
    let ids = launch_with_alarms(&cloud, 3);
    let scheduler = scheduler(&cloud);

    scheduler.stop(KEY, VALUE).await.unwrap();
    let second = scheduler.stop(KEY, VALUE).await.unwrap();

    assert!(second.alarms_mutated.is_empty());
    assert!(!second.is_partial());
    for id in &ids {
        assert_eq!(cloud.state_of(id), Some(InstanceState::Stopped));
    }
}

#[tokio::test]
async fn every_run_gets_its_own_id() {
    let cloud = cloud();
    launch_with_alarms(&cloud, 1);
    let scheduler = scheduler(&cloud);

    let first = scheduler.stop(KEY, VALUE).await.unwrap();
    let second = scheduler.stop(KEY, VALUE).await.unwrap();
    assert_ne!(first.run_id, second.run_id);
}

// ── Errors ────────────────────────────────────────────────────

#[tokio::test]
async fn invalid_filter_is_rejected_before_any_call() {
    let cloud = cloud();
    launch_with_alarms(&cloud, 1);
    let scheduler = scheduler(&cloud);

    for (key, value) in [("", VALUE), ("   ", VALUE), (KEY, "")] {
        let err = scheduler.stop(key, value).await.unwrap_err();
        assert!(matches!(err, SchedulerError::Validation(_)), "{err:?}");
        assert!(!err.is_retryable());
    }
    let long_key = "k".repeat(129);
    let err = scheduler.start(&long_key, VALUE).await.unwrap_err();
    assert!(matches!(err, SchedulerError::Validation(_)));

    assert!(cloud.calls().is_empty());
}

#[tokio::test]
async fn transient_inventory_failure_is_retryable() {
    let cloud = cloud();
    launch_with_alarms(&cloud, 2);
    cloud.fail(
        "DescribeInstances",
        ProviderError::transient("DescribeInstances", "RequestLimitExceeded"),
    );

    let err = scheduler(&cloud).stop(KEY, VALUE).await.unwrap_err();

    assert!(err.is_retryable());
    assert!(matches!(err, SchedulerError::Provider(ProviderError::Transient { .. })));
    assert!(cloud.mutations().is_empty());
}

#[tokio::test]
async fn alarm_failure_does_not_block_stop() {
    let cloud = cloud();
    let ids = launch_with_alarms(&cloud, 3);
    cloud.fail_for(
        "DisableAlarmActions",
        &format!("cpu-{}", ids[1]),
        ProviderError::permanent("DisableAlarmActions", "AccessDenied"),
    );

    let report = scheduler(&cloud).stop(KEY, VALUE).await.unwrap();

    assert!(report.is_partial());
    assert_eq!(report.alarm_failures.len(), 1);
    assert_eq!(report.alarm_failures[0].instance_id, ids[1]);
    assert_eq!(report.alarm_failures[0].phase, AlarmPhase::Disable);
    assert_eq!(report.alarms_mutated.len(), 2);
    for id in &ids {
        assert_eq!(cloud.state_of(id), Some(InstanceState::Stopped));
    }
}

#[tokio::test]
async fn alarm_failure_after_start_is_reported() {
    let cloud = cloud();
    let ids = launch_with_alarms(&cloud, 2);
    let scheduler = scheduler(&cloud);
    scheduler.stop(KEY, VALUE).await.unwrap();
    cloud.fail_for(
        "DescribeAlarms",
        &ids[0],
        ProviderError::transient("DescribeAlarms", "Throttling"),
    );

    let report = scheduler.start(KEY, VALUE).await.unwrap();

    assert!(report.is_partial());
    assert_eq!(report.alarm_failures[0].phase, AlarmPhase::Discover);
    for id in &ids {
        assert_eq!(cloud.state_of(id), Some(InstanceState::Running));
    }
    assert_eq!(cloud.alarm_actions_enabled(&format!("cpu-{}", ids[0])), Some(false));
    assert_eq!(cloud.alarm_actions_enabled(&format!("cpu-{}", ids[1])), Some(true));
}

#[tokio::test]
async fn failed_stop_restores_suspended_alarms() {
    let cloud = cloud();
    let ids = launch_with_alarms(&cloud, 2);
    let extra = &ids[0];
    cloud.add_alarm("already-off", extra, false);
    cloud.fail(
        "StopInstances",
        ProviderError::permanent("StopInstances", "UnauthorizedOperation"),
    );

    let err = scheduler(&cloud).stop(KEY, VALUE).await.unwrap_err();

    assert!(!err.is_retryable());
    let calls = cloud.calls();
    let stop = position(&calls, |c| matches!(c, CloudCall::StopInstances(_)));
    let restore = last_position(&calls, |c| matches!(c, CloudCall::EnableAlarmActions(_)));
    assert!(stop < restore);
    for id in &ids {
        assert_eq!(cloud.state_of(id), Some(InstanceState::Running));
        assert_eq!(cloud.alarm_actions_enabled(&format!("cpu-{id}")), Some(true));
    }
    assert_eq!(cloud.alarm_actions_enabled("already-off"), Some(false));
}

#[tokio::test]
async fn terminated_instances_are_skipped() {
    let cloud = cloud();
    let ids = launch_with_alarms(&cloud, 3);
    cloud.set_state(&ids[2], InstanceState::Terminated);

    let report = scheduler(&cloud).stop(KEY, VALUE).await.unwrap();

    assert_eq!(report.skipped, vec![ids[2].clone()]);
    assert_eq!(report.targets, ids[..2].to_vec());
    assert_eq!(cloud.state_of(&ids[2]), Some(InstanceState::Terminated));
    assert_eq!(cloud.alarm_actions_enabled(&format!("cpu-{}", ids[2])), Some(true));
}

#[tokio::test]
async fn stopping_instance_does_not_block_start() {
    let cloud = cloud();
    let ids = launch_with_alarms(&cloud, 3);
    let scheduler = scheduler(&cloud);
    scheduler.stop(KEY, VALUE).await.unwrap();
    cloud.set_state(&ids[1], InstanceState::Stopping);

    let report = scheduler.start(KEY, VALUE).await.unwrap();

    assert_eq!(report.skipped, vec![ids[1].clone()]);
    assert_eq!(cloud.state_of(&ids[0]), Some(InstanceState::Running));
    assert_eq!(cloud.state_of(&ids[1]), Some(InstanceState::Stopping));
    assert_eq!(cloud.state_of(&ids[2]), Some(InstanceState::Running));
    assert_eq!(cloud.alarm_actions_enabled(&format!("cpu-{}", ids[1])), Some(false));
}

#[tokio::test]
async fn pending_instance_does_not_block_stop() {
    let cloud = cloud();
    let ids = launch_with_alarms(&cloud, 3);
    cloud.set_state(&ids[0], InstanceState::Pending);

    let report = scheduler(&cloud).stop(KEY, VALUE).await.unwrap();

    assert_eq!(report.skipped, vec![ids[0].clone()]);
    assert_eq!(report.targets, ids[1..].to_vec());
    assert_eq!(cloud.state_of(&ids[0]), Some(InstanceState::Pending));
    assert_eq!(cloud.alarm_actions_enabled(&format!("cpu-{}", ids[0])), Some(true));
    for id in &ids[1..] {
        assert_eq!(cloud.state_of(id), Some(InstanceState::Stopped));
    }
}

#[tokio::test]
async fn failed_stop_also_restores_alarms_of_failed_disable() {
    let cloud = cloud();
    let ids = launch_with_alarms(&cloud, 2);
    let failing = format!("cpu-{}", ids[1]);
    cloud.fail_for(
        "DisableAlarmActions",
        &failing,
        ProviderError::transient("DisableAlarmActions", "Throttling"),
    );
    cloud.fail(
        "StopInstances",
        ProviderError::transient("StopInstances", "RequestLimitExceeded"),
    );

    let err = scheduler(&cloud).stop(KEY, VALUE).await.unwrap_err();

    assert!(err.is_retryable());
    let restored = cloud
        .calls()
        .into_iter()
        .rev()
        .find_map(|c| match c {
            CloudCall::EnableAlarmActions(names) => Some(names),
            _ => None,
        })
        .expect("alarms were restored");
    assert_eq!(restored, vec![format!("cpu-{}", ids[0]), failing]);
}

#[tokio::test]
async fn report_lists_alarms_per_target() {
    let cloud = cloud();
    let ids = launch_with_alarms(&cloud, 2);
    cloud.add_alarm("status-check", &ids[0], false);

    let report = scheduler(&cloud).stop(KEY, VALUE).await.unwrap();

    assert_eq!(report.alarms.len(), 2);
    assert_eq!(report.alarms[0].instance_id, ids[0]);
    assert_eq!(report.alarms[0].alarm_names.len(), 2);
    assert_eq!(report.alarms_mutated, vec![format!("cpu-{}", ids[0]), format!("cpu-{}", ids[1])]);
}

// ── Scenarios ─────────────────────────────────────────────────

#[tokio::test]
async fn scenario_three_tagged_instances_stop() {
    let cloud = cloud();
    let ids = cloud.launch_instances(3, KEY, VALUE);

    let report = scheduler(&cloud).stop(KEY, VALUE).await.unwrap();

    assert_eq!(report.targets.len(), 3);
    for id in &ids {
        assert_eq!(cloud.state_of(id), Some(InstanceState::Stopped));
    }
}

#[tokio::test]
async fn scenario_round_trip_in_another_region() {
    let cloud = Arc::new(InMemoryCloud::new("us-east-1"));
    let ids = launch_with_alarms(&cloud, 2);
    let scheduler = scheduler(&cloud);

    scheduler.stop(KEY, VALUE).await.unwrap();
    scheduler.start(KEY, VALUE).await.unwrap();

    for id in &ids {
        assert_eq!(cloud.state_of(id), Some(InstanceState::Running));
        assert_eq!(cloud.alarm_actions_enabled(&format!("cpu-{id}")), Some(true));
    }
}
