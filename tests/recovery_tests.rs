mod common;

use cmdflow::InMemoryCluster;
use cmdflow::engine::identity::identity_setup_record;
use cmdflow::protocol::{
    Intent, JobRecord, NO_KEY, Record, TaskListenerEventType, UserTaskRecord, ValueType,
};
use cmdflow::stream::PartitionPhase;
use common::*;
use std::time::Duration;

#[test]
fn restarted_partition_rebuilds_state_from_its_log() {
    let mut cluster = cluster(2);
    let group = cluster.execute(1, as_admin(create_group("ops"))).unwrap().key;
    let task = new_user_task(&mut cluster, vec![]);
    cluster.execute(1, claim(task, "alice")).unwrap();
    let records_before = cluster.records(1).unwrap().len();

    cluster.restart_partition(1).unwrap();

    let state = cluster.state(1).unwrap();
    assert!(state.identity_initialized);
    assert_eq!(state.groups.get_by_name("ops").map(|g| g.key), Some(group));
    assert_eq!(state.user_tasks.get(task).unwrap().record.assignee, "alice");
    assert_eq!(cluster.phase(1).unwrap(), PartitionPhase::Processing);
    // nothing was processed a second time
    assert_eq!(cluster.records(1).unwrap().len(), records_before);

    let next = cluster.execute(1, as_admin(create_group("dev"))).unwrap().key;
    assert!(next > group);
    assert!(next > task);
}

#[test]
fn identity_setup_is_written_once_across_restarts() {
    let mut cluster = cluster(1);
    cluster.restart_partition(1).unwrap();
    cluster.restart_partition(1).unwrap();

    let initialize_commands = cluster
        .records(1)
        .unwrap()
        .iter()
        .filter(|record| record.is_command() && record.intent == Intent::Initialize)
        .count();
    assert_eq!(initialize_commands, 1);
    assert_eq!(
        count(&cluster.records(1).unwrap(), ValueType::IdentitySetup, Intent::Initialized),
        1
    );
}

#[test]
fn pending_transition_survives_restart() {
    let mut cluster = cluster(1);
    let task = new_user_task(
        &mut cluster,
        listeners(TaskListenerEventType::Completing, &["validate"]),
    );
    let request = cluster
        .submit(1, user_task_command(Intent::Complete, task, UserTaskRecord::default()))
        .unwrap();
    let job = active_job(&cluster, task);

    cluster.restart_partition(1).unwrap();

    let pending = cluster
        .state(1)
        .unwrap()
        .user_tasks
        .get(task)
        .and_then(|entry| entry.pending.clone())
        .unwrap();
    assert_eq!(pending.active_job_key, Some(job));
    assert_eq!(pending.request, Some(request));

    cluster
        .execute(1, job_command(Intent::Complete, job, JobRecord::default()))
        .unwrap();

    let response = cluster.response_to(request).unwrap();
    assert_eq!(response.intent, Intent::Completed);
    assert!(cluster.state(1).unwrap().user_tasks.get(task).is_none());
}

#[test]
fn configured_positions_are_skipped() {
    let config = config().with_identity_setup(false).with_skip_positions([1]);
    let mut cluster = InMemoryCluster::new(1, config).unwrap();
    assert!(!cluster.state(1).unwrap().identity_initialized);
    assert!(cluster.records(1).unwrap().is_empty());

    let skipped = cluster.submit(1, create_group("skipped")).unwrap();
    assert!(cluster.response_to(skipped).is_none());
    assert!(cluster.state(1).unwrap().groups.get_by_name("skipped").is_none());

    let kept = cluster.execute(1, create_group("kept")).unwrap();
    assert_eq!(kept.intent, Intent::Created);

    // the skip also holds on replay
    cluster.restart_partition(1).unwrap();
    let state = cluster.state(1).unwrap();
    assert!(state.groups.get_by_name("skipped").is_none());
    assert!(state.groups.get_by_name("kept").is_some());
}

#[test]
fn restarted_origin_resumes_pending_distribution() {
    let mut cluster = cluster(3);
    cluster.disconnect(3);
    let group = cluster.execute(1, as_admin(create_group("ops"))).unwrap().key;
    assert!(cluster.state(2).unwrap().groups.get(group).is_some());
    assert!(cluster.state(3).unwrap().groups.get(group).is_none());

    cluster.restart_partition(1).unwrap();
    assert!(cluster.state(1).unwrap().distribution.is_pending(group, 3));

    cluster.reconnect(3);
    cluster.advance_time(Duration::from_secs(30)).unwrap();

    assert_eq!(
        cluster.state(3).unwrap().groups.get_by_name("ops").map(|g| g.key),
        Some(group)
    );
    assert_eq!(cluster.state(1).unwrap().distribution.pending_count(), 0);
    assert_eq!(
        count(&cluster.records(1).unwrap(), ValueType::CommandDistribution, Intent::Finished),
        count(&cluster.records(1).unwrap(), ValueType::CommandDistribution, Intent::Started)
    );
}

#[test]
fn unprocessed_second_identity_setup_is_rejected_after_restart() {
    let mut cluster = cluster(2);
    let setup = identity_setup_record(&cluster.config().security);
    cluster
        .write_command(1, Record::command(1, NO_KEY, Intent::Initialize, setup))
        .unwrap();

    cluster.restart_partition(1).unwrap();

    let records = cluster.records(1).unwrap();
    assert_eq!(count(&records, ValueType::IdentitySetup, Intent::Initialized), 1);
    assert_eq!(count(&records, ValueType::CommandDistribution, Intent::Started), 1);
    let rejection = records.last().unwrap();
    assert!(rejection.is_rejection());
    assert_eq!(
        rejection.rejection_reason(),
        Some("Expected to initialize identity setup, but it was already initialized.")
    );
    assert_eq!(
        count(&cluster.records(2).unwrap(), ValueType::IdentitySetup, Intent::Initialized),
        1
    );
}
