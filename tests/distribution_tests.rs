mod common;

use cmdflow::InMemoryCluster;
use cmdflow::protocol::{DistributionMetadata, DistributionQueue, GroupRecord, Intent, Record, ValueType};
use common::*;
use std::time::Duration;

fn cluster_with_fast_retries(partitions: u32) -> InMemoryCluster {
    InMemoryCluster::new(partitions, config().with_redistribution(100, 400)).unwrap()
}

fn group_created_on(cluster: &InMemoryCluster, partition: u32, name: &str) -> Option<i64> {
    cluster
        .state(partition)
        .unwrap()
        .groups
        .get_by_name(name)
        .map(|group| group.key)
}

#[test]
fn created_group_reaches_every_partition_and_distribution_finishes() {
    let mut cluster = cluster(3);
    let key = cluster.execute(1, as_admin(create_group("ops"))).unwrap().key;

    assert_eq!(group_created_on(&cluster, 2, "ops"), Some(key));
    assert_eq!(group_created_on(&cluster, 3, "ops"), Some(key));

    let origin = cluster.records(1).unwrap();
    assert_eq!(
        events_for_key(&origin, key)
            .into_iter()
            .filter(|intent| *intent != Intent::Created)
            .collect::<Vec<_>>(),
        vec![
            Intent::Started,
            Intent::Distributing,
            Intent::Distributing,
            Intent::Acknowledged,
            Intent::Acknowledged,
            Intent::Finished,
        ]
    );
    assert_eq!(cluster.state(1).unwrap().distribution.pending_count(), 0);

    let receiver = cluster.records(2).unwrap();
    assert_eq!(
        events_for_key(&receiver, key),
        vec![Intent::Created, Intent::Received]
    );
}

#[test]
fn single_partition_cluster_distributes_nothing() {
    let mut cluster = cluster(1);
    let key = cluster.execute(1, as_admin(create_group("ops"))).unwrap().key;

    assert_eq!(events_for_key(&cluster.records(1).unwrap(), key), vec![Intent::Created]);
}

#[test]
fn redelivered_command_is_only_acknowledged_again() {
    let mut cluster = cluster(2);
    let key = cluster.execute(1, as_admin(create_group("ops"))).unwrap().key;

    let mut redelivered = Record::command(
        2,
        key,
        Intent::Create,
        GroupRecord {
            group_key: key,
            name: "ops".to_string(),
            ..Default::default()
        },
    );
    redelivered.distribution = Some(DistributionMetadata {
        distribution_key: key,
        origin_partition_id: 1,
        queue: Some(DistributionQueue::Identity),
    });
    cluster.write_command(2, redelivered).unwrap();
    cluster.pump().unwrap();

    let receiver = cluster.records(2).unwrap();
    assert_eq!(
        events_for_key(&receiver, key),
        vec![Intent::Created, Intent::Received]
    );

    // the origin already finished, so the late acknowledgement is refused
    let origin = cluster.records(1).unwrap();
    let late_ack = origin.last().unwrap();
    assert!(late_ack.is_rejection());
    assert_eq!(late_ack.intent, Intent::Acknowledge);
    assert_eq!(
        late_ack.rejection_reason(),
        Some(
            format!(
                "Expected to find pending distribution with key {} for partition 2, but none was found",
                key
            )
            .as_str()
        )
    );
}

#[test]
fn lost_distribution_is_retried_once_partition_is_reachable() {
    let mut cluster = cluster_with_fast_retries(3);
    cluster.disconnect(3);

    let key = cluster.execute(1, as_admin(create_group("ops"))).unwrap().key;
    assert_eq!(group_created_on(&cluster, 2, "ops"), Some(key));
    assert_eq!(group_created_on(&cluster, 3, "ops"), None);
    assert!(cluster.state(1).unwrap().distribution.is_pending(key, 3));

    // retries while unreachable are lost as well
    cluster.advance_time(Duration::from_millis(300)).unwrap();
    assert_eq!(group_created_on(&cluster, 3, "ops"), None);

    cluster.reconnect(3);
    cluster.advance_time(Duration::from_millis(1_000)).unwrap();

    assert_eq!(group_created_on(&cluster, 3, "ops"), Some(key));
    assert_eq!(cluster.state(1).unwrap().distribution.pending_count(), 0);
    assert_eq!(
        count(&cluster.records(3).unwrap(), ValueType::Group, Intent::Created),
        1
    );
}

#[test]
fn queued_distributions_reach_a_partition_in_order() {
    let mut cluster = cluster_with_fast_retries(3);
    cluster.disconnect(2);

    let first = cluster.execute(1, as_admin(create_group("first"))).unwrap().key;
    let second = cluster.execute(1, as_admin(create_group("second"))).unwrap().key;

    let origin = cluster.records(1).unwrap();
    let enqueued: Vec<&Record> = origin
        .iter()
        .filter(|record| record.intent == Intent::Enqueued)
        .collect();
    assert_eq!(enqueued.len(), 1);
    assert_eq!(enqueued[0].key, second);
    assert_eq!(
        enqueued[0].value.as_command_distribution().unwrap().partition_id,
        2
    );
    // partition 3 is not blocked by partition 2
    assert!(group_created_on(&cluster, 3, "second").is_some());

    cluster.reconnect(2);
    cluster.advance_time(Duration::from_secs(1)).unwrap();

    let receiver = cluster.records(2).unwrap();
    let created: Vec<i64> = receiver
        .iter()
        .filter(|record| {
            record.is_event()
                && record.value_type() == ValueType::Group
                && record.intent == Intent::Created
        })
        .map(|record| record.key)
        .collect();
    assert_eq!(created, vec![first, second]);
    assert_eq!(cluster.state(1).unwrap().distribution.pending_count(), 0);
}
