mod common;

use cmdflow::ActorCluster;
use cmdflow::protocol::{Intent, ValueType};
use cmdflow::stream::CommandResponse;
use common::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[tokio::test(start_paused = true)]
async fn actors_process_and_distribute_commands() {
    let (responses_tx, mut responses) = mpsc::unbounded_channel::<CommandResponse>();
    let cluster = ActorCluster::start(2, Arc::new(config()), Arc::new(responses_tx)).unwrap();

    let request = cluster.submit(1, create_group("ops")).unwrap();
    let response = tokio::time::timeout(Duration::from_secs(5), responses.recv())
        .await
        .expect("response in time")
        .expect("response channel open");
    assert_eq!(response.request, request);
    assert_eq!(response.intent, Intent::Created);

    let mut distributed = false;
    for _ in 0..100 {
        let records = cluster.records(2).unwrap();
        if count(&records, ValueType::Group, Intent::Created) == 1 {
            distributed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(distributed, "group never reached partition 2");

    cluster.shutdown().await.unwrap();
}

#[tokio::test]
async fn unknown_partition_is_refused() {
    let (responses_tx, _responses) = mpsc::unbounded_channel::<CommandResponse>();
    let cluster = ActorCluster::start(1, Arc::new(config()), Arc::new(responses_tx)).unwrap();

    let err = cluster.submit(4, create_group("ops")).unwrap_err();
    assert!(matches!(err, cmdflow::EngineError::UnknownPartition(4)));

    cluster.shutdown().await.unwrap();
}
