use crate::protocol::{IncidentRecord, JobRecord};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Activatable,
    /// Failed without retries; waits for an incident resolution.
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobEntry {
    pub record: JobRecord,
    pub status: JobStatus,
}

#[derive(Debug, Clone, Default)]
pub struct JobState {
    jobs: BTreeMap<i64, JobEntry>,
}

impl JobState {
    pub fn get(&self, job_key: i64) -> Option<&JobEntry> {
        self.jobs.get(&job_key)
    }

    pub(crate) fn get_mut(&mut self, job_key: i64) -> Option<&mut JobEntry> {
        self.jobs.get_mut(&job_key)
    }

    pub(crate) fn insert(&mut self, job_key: i64, record: JobRecord) {
        self.jobs.insert(
            job_key,
            JobEntry {
                record,
                status: JobStatus::Activatable,
            },
        );
    }

    pub(crate) fn remove(&mut self, job_key: i64) -> Option<JobEntry> {
        self.jobs.remove(&job_key)
    }

    pub fn jobs_of_user_task(&self, user_task_key: i64) -> Vec<i64> {
        self.jobs
            .iter()
            .filter(|(_, entry)| entry.record.user_task_key == user_task_key)
            .map(|(key, _)| *key)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct IncidentState {
    incidents: BTreeMap<i64, IncidentRecord>,
    by_job: HashMap<i64, i64>,
}

impl IncidentState {
    pub fn get(&self, incident_key: i64) -> Option<&IncidentRecord> {
        self.incidents.get(&incident_key)
    }

    pub fn incident_of_job(&self, job_key: i64) -> Option<i64> {
        self.by_job.get(&job_key).copied()
    }

    pub(crate) fn insert(&mut self, incident_key: i64, incident: IncidentRecord) {
        self.by_job.insert(incident.job_key, incident_key);
        self.incidents.insert(incident_key, incident);
    }

    pub(crate) fn remove(&mut self, incident_key: i64) -> Option<IncidentRecord> {
        let incident = self.incidents.remove(&incident_key)?;
        self.by_job.remove(&incident.job_key);
        Some(incident)
    }

    pub fn len(&self) -> usize {
        self.incidents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.incidents.is_empty()
    }
}
