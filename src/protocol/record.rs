use super::distribution::DistributionQueue;
use super::identity::DEFAULT_TENANT_ID;
use super::intent::{Intent, RecordType, ValueType};
use super::rejection::Rejection;
use super::value::RecordValue;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Sentinel for "no key" and "no position".
pub const NO_KEY: i64 = -1;

/// Identifies the client request a response belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestMetadata {
    pub request_stream_id: i32,
    pub request_id: i64,
}

/// Resolved caller identity, carried explicitly by every external command.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Authentication {
    pub username: String,
    pub authorized_tenant_ids: Vec<String>,
}

impl Authentication {
    pub fn user(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            authorized_tenant_ids: vec![DEFAULT_TENANT_ID.to_string()],
        }
    }

    pub fn with_tenants(mut self, tenant_ids: &[&str]) -> Self {
        self.authorized_tenant_ids = tenant_ids.iter().map(|id| id.to_string()).collect();
        self
    }
}

/// Present on commands that were replicated from another partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionMetadata {
    pub distribution_key: i64,
    pub origin_partition_id: u32,
    pub queue: Option<DistributionQueue>,
}

/// An immutable log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Assigned by the log on append.
    pub position: i64,
    pub source_record_position: i64,
    pub key: i64,
    pub record_type: RecordType,
    pub intent: Intent,
    pub partition_id: u32,
    pub tenant_id: String,
    pub timestamp: i64,
    pub rejection: Option<Rejection>,
    pub request: Option<RequestMetadata>,
    pub authentication: Option<Authentication>,
    pub distribution: Option<DistributionMetadata>,
    pub value: RecordValue,
}

impl Record {
    fn new(record_type: RecordType, partition_id: u32, key: i64, intent: Intent, value: RecordValue) -> Self {
        Self {
            position: NO_KEY,
            source_record_position: NO_KEY,
            key,
            record_type,
            intent,
            partition_id,
            tenant_id: DEFAULT_TENANT_ID.to_string(),
            timestamp: Utc::now().timestamp_millis(),
            rejection: None,
            request: None,
            authentication: None,
            distribution: None,
            value,
        }
    }

    pub fn command(partition_id: u32, key: i64, intent: Intent, value: impl Into<RecordValue>) -> Self {
        Self::new(RecordType::Command, partition_id, key, intent, value.into())
    }

    pub fn event(partition_id: u32, key: i64, intent: Intent, value: impl Into<RecordValue>) -> Self {
        Self::new(RecordType::Event, partition_id, key, intent, value.into())
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = tenant_id.into();
        self
    }

    pub fn with_request(mut self, request: RequestMetadata) -> Self {
        self.request = Some(request);
        self
    }

    pub fn with_authentication(mut self, authentication: Authentication) -> Self {
        self.authentication = Some(authentication);
        self
    }

    pub fn with_value(&self, value: impl Into<RecordValue>) -> Self {
        let mut copy = self.clone();
        copy.value = value.into();
        copy
    }

    pub fn value_type(&self) -> ValueType {
        self.value.value_type()
    }

    pub fn is_command(&self) -> bool {
        self.record_type == RecordType::Command
    }

    pub fn is_event(&self) -> bool {
        self.record_type == RecordType::Event
    }

    pub fn is_rejection(&self) -> bool {
        self.record_type == RecordType::CommandRejection
    }

    /// True when this command was replicated here from another partition.
    pub fn is_distributed(&self) -> bool {
        self.distribution
            .map(|metadata| metadata.origin_partition_id != self.partition_id)
            .unwrap_or(false)
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        self.rejection.as_ref().map(|rejection| rejection.reason.as_str())
    }
}
