mod common;

use cmdflow::protocol::{
    IncidentRecord, Intent, JobKind, JobRecord, LifecycleState, Record, RejectionType,
    TaskListenerEventType, UserTaskRecord, ValueType,
};
use common::*;
use serde_json::json;

fn complete_job(cluster: &mut cmdflow::InMemoryCluster, job: i64, variables: serde_json::Value) -> Intent {
    let variables = serde_json::from_value(variables).unwrap();
    let response = cluster
        .execute(1, job_command(Intent::Complete, job, JobRecord { variables, ..Default::default() }))
        .unwrap();
    response.intent
}

#[test]
fn listeners_run_one_after_another_and_see_earlier_output() {
    let mut cluster = cluster(1);
    let task = new_user_task(
        &mut cluster,
        listeners(TaskListenerEventType::Completing, &["first", "second"]),
    );

    let request = cluster
        .submit(
            1,
            user_task_command(
                Intent::Complete,
                task,
                UserTaskRecord {
                    variables: serde_json::from_value(json!({ "amount": 10 })).unwrap(),
                    ..Default::default()
                },
            ),
        )
        .unwrap();
    assert!(cluster.response_to(request).is_none());

    let first = active_job(&cluster, task);
    let first_job = cluster.state(1).unwrap().jobs.get(first).unwrap().record.clone();
    assert_eq!(first_job.job_type, "first");
    assert_eq!(first_job.kind, JobKind::TaskListener);
    assert_eq!(first_job.listener_event_type, Some(TaskListenerEventType::Completing));
    assert_eq!(first_job.variables.get("amount"), Some(&json!(10)));

    assert_eq!(complete_job(&mut cluster, first, json!({ "approved": true })), Intent::Completed);

    let second = active_job(&cluster, task);
    assert_ne!(first, second);
    let second_job = &cluster.state(1).unwrap().jobs.get(second).unwrap().record;
    assert_eq!(second_job.job_type, "second");
    assert_eq!(second_job.variables.get("approved"), Some(&json!(true)));
    assert_eq!(second_job.variables.get("amount"), Some(&json!(10)));
    assert!(cluster.response_to(request).is_none());

    complete_job(&mut cluster, second, json!({}));

    let response = cluster.response_to(request).unwrap();
    assert_eq!(response.intent, Intent::Completed);
    assert_eq!(response.key, task);
    assert!(cluster.state(1).unwrap().user_tasks.get(task).is_none());
    // listener output is not merged into the task
    assert!(response.value.as_user_task().unwrap().variables.get("approved").is_none());
}

#[test]
fn failed_listener_raises_incident_and_resumes_after_resolution() {
    let mut cluster = cluster(1);
    let task = new_user_task(
        &mut cluster,
        listeners(TaskListenerEventType::Completing, &["one", "two", "three"]),
    );
    let request = cluster
        .submit(1, user_task_command(Intent::Complete, task, UserTaskRecord::default()))
        .unwrap();

    let one = active_job(&cluster, task);
    complete_job(&mut cluster, one, json!({ "checked": true }));
    let two = active_job(&cluster, task);

    let failed = cluster
        .execute(
            1,
            job_command(
                Intent::Fail,
                two,
                JobRecord {
                    retries: 0,
                    error_message: "upstream down".to_string(),
                    ..Default::default()
                },
            ),
        )
        .unwrap();
    assert_eq!(failed.intent, Intent::Failed);

    let incident = cluster
        .state(1)
        .unwrap()
        .incidents
        .incident_of_job(two)
        .expect("incident for exhausted job");
    let incident_record = cluster.state(1).unwrap().incidents.get(incident).unwrap().clone();
    assert_eq!(incident_record.error_message, "upstream down");
    assert_eq!(incident_record.user_task_key, task);
    assert_eq!(
        cluster.state(1).unwrap().user_tasks.lifecycle(task),
        Some(LifecycleState::Completing)
    );

    let blocked = cluster.execute(1, job_command(Intent::Complete, two, JobRecord::default())).unwrap();
    assert_eq!(blocked.rejection.unwrap().kind, RejectionType::InvalidState);

    let resolve = || Record::command(1, incident, Intent::Resolve, IncidentRecord::default());
    let early = cluster.execute(1, resolve()).unwrap();
    assert_eq!(
        early.rejection_reason(),
        Some(
            format!(
                "Expected to resolve incident with key '{}', but job with key '{}' has no retries left",
                incident, two
            )
            .as_str()
        )
    );

    let updated = cluster
        .execute(
            1,
            job_command(Intent::UpdateRetries, two, JobRecord { retries: 1, ..Default::default() }),
        )
        .unwrap();
    assert_eq!(updated.intent, Intent::RetriesUpdated);
    assert_eq!(cluster.execute(1, resolve()).unwrap().intent, Intent::Resolved);
    assert!(cluster.state(1).unwrap().incidents.incident_of_job(two).is_none());

    complete_job(&mut cluster, two, json!({}));
    let three = active_job(&cluster, task);
    assert_eq!(
        cluster.state(1).unwrap().jobs.get(three).unwrap().record.variables.get("checked"),
        Some(&json!(true))
    );
    assert!(cluster.response_to(request).is_none());

    complete_job(&mut cluster, three, json!({}));

    let response = cluster.response_to(request).unwrap();
    assert_eq!(response.intent, Intent::Completed);
    assert!(cluster.state(1).unwrap().user_tasks.get(task).is_none());
    let records = cluster.records(1).unwrap();
    assert_eq!(count(&records, ValueType::Job, Intent::Created), 3);
    assert_eq!(count(&records, ValueType::Incident, Intent::Created), 1);
    assert_eq!(count(&records, ValueType::UserTask, Intent::Completed), 1);
}

#[test]
fn failing_with_retries_left_keeps_the_job_open() {
    let mut cluster = cluster(1);
    let task = new_user_task(&mut cluster, listeners(TaskListenerEventType::Assigning, &["audit"]));
    let request = cluster.submit(1, claim(task, "alice")).unwrap();
    let job = active_job(&cluster, task);

    cluster
        .execute(1, job_command(Intent::Fail, job, JobRecord { retries: 2, ..Default::default() }))
        .unwrap();
    assert!(cluster.state(1).unwrap().incidents.incident_of_job(job).is_none());

    complete_job(&mut cluster, job, json!({}));
    let response = cluster.response_to(request).unwrap();
    assert_eq!(response.intent, Intent::Assigned);
    assert_eq!(
        cluster.state(1).unwrap().user_tasks.get(task).unwrap().record.assignee,
        "alice"
    );
}

#[test]
fn listeners_of_other_transitions_are_ignored() {
    let mut cluster = cluster(1);
    let task = new_user_task(&mut cluster, listeners(TaskListenerEventType::Updating, &["notify"]));

    let response = cluster.execute(1, claim(task, "alice")).unwrap();

    assert_eq!(response.intent, Intent::Assigned);
    assert!(cluster.state(1).unwrap().jobs.jobs_of_user_task(task).is_empty());
}

#[test]
fn stray_task_listener_completion_is_rejected() {
    let mut cluster = cluster(1);
    let task = new_user_task(&mut cluster, vec![]);

    cluster
        .write_command(
            1,
            Record::command(1, task, Intent::CompleteTaskListener, UserTaskRecord::default()),
        )
        .unwrap();
    cluster.pump().unwrap();

    let last = cluster.records(1).unwrap().pop().unwrap();
    assert!(last.is_rejection());
    assert_eq!(last.intent, Intent::CompleteTaskListener);
    assert_eq!(
        cluster.state(1).unwrap().user_tasks.lifecycle(task),
        Some(LifecycleState::Created)
    );
}
