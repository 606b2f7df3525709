#![allow(dead_code)]

use cmdflow::protocol::{
    Authentication, GroupRecord, Intent, JobRecord, NO_KEY, Record, TaskListener,
    TaskListenerEventType, UserRecord, UserTaskRecord, ValueType,
};
use cmdflow::{EngineConfig, InMemoryCluster};

/// User created by the identity bootstrap; member of the admin role.
pub const ADMIN: &str = "demo";
pub const PROCESS_ID: &str = "invoice";

pub fn config() -> EngineConfig {
    EngineConfig::default().with_password_hash_cost(4)
}

pub fn cluster(partitions: u32) -> InMemoryCluster {
    InMemoryCluster::new(partitions, config()).unwrap()
}

pub fn as_user(command: Record, username: &str) -> Record {
    command.with_authentication(Authentication::user(username))
}

pub fn as_admin(command: Record) -> Record {
    as_user(command, ADMIN)
}

pub fn create_group(name: &str) -> Record {
    Record::command(
        1,
        NO_KEY,
        Intent::Create,
        GroupRecord {
            name: name.to_string(),
            ..Default::default()
        },
    )
}

pub fn create_user(username: &str) -> Record {
    Record::command(
        1,
        NO_KEY,
        Intent::Create,
        UserRecord {
            username: username.to_string(),
            name: username.to_string(),
            email: format!("{}@example.com", username),
            password: "secret".to_string(),
            ..Default::default()
        },
    )
}

pub fn create_user_task(listeners: Vec<TaskListener>) -> Record {
    Record::command(
        1,
        NO_KEY,
        Intent::Create,
        UserTaskRecord {
            bpmn_process_id: PROCESS_ID.to_string(),
            element_id: "review".to_string(),
            process_instance_key: 42,
            task_listeners: listeners,
            ..Default::default()
        },
    )
}

pub fn listeners(event_type: TaskListenerEventType, job_types: &[&str]) -> Vec<TaskListener> {
    job_types
        .iter()
        .map(|job_type| TaskListener::new(event_type, *job_type, 1))
        .collect()
}

pub fn user_task_command(intent: Intent, user_task_key: i64, value: UserTaskRecord) -> Record {
    as_admin(Record::command(1, user_task_key, intent, value))
}

pub fn claim(user_task_key: i64, assignee: &str) -> Record {
    user_task_command(
        Intent::Claim,
        user_task_key,
        UserTaskRecord {
            assignee: assignee.to_string(),
            ..Default::default()
        },
    )
}

pub fn job_command(intent: Intent, job_key: i64, value: JobRecord) -> Record {
    Record::command(1, job_key, intent, value)
}

/// Creates a user task on partition 1 and returns its key.
pub fn new_user_task(cluster: &mut InMemoryCluster, listeners: Vec<TaskListener>) -> i64 {
    let response = cluster.execute(1, create_user_task(listeners)).unwrap();
    assert_eq!(response.intent, Intent::Created);
    response.key
}

/// The single job currently open for the user task.
pub fn active_job(cluster: &InMemoryCluster, user_task_key: i64) -> i64 {
    let jobs = cluster
        .state(1)
        .unwrap()
        .jobs
        .jobs_of_user_task(user_task_key);
    assert_eq!(jobs.len(), 1, "expected exactly one open job, got {:?}", jobs);
    jobs[0]
}

pub fn count(records: &[Record], value_type: ValueType, intent: Intent) -> usize {
    records
        .iter()
        .filter(|record| record.is_event() && record.value_type() == value_type && record.intent == intent)
        .count()
}

pub fn events_for_key(records: &[Record], key: i64) -> Vec<Intent> {
    records
        .iter()
        .filter(|record| record.is_event() && record.key == key)
        .map(|record| record.intent)
        .collect()
}
