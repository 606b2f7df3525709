use crate::engine::authorization::{AuthorizationRequest, unauthorized};
use crate::engine::context::ProcessingContext;
use crate::protocol::{LifecycleState, PermissionType, Record, Rejection, ResourceType, UserTaskRecord};

/// Command-specific check run after the common ones.
pub type AdditionalCheck =
    fn(command: &Record, persisted: &UserTaskRecord) -> Result<(), Rejection>;

/// Common preconditions of every user task command, checked in order:
/// existence and tenant visibility, permission, lifecycle state, then the
/// command-specific check.
pub struct UserTaskCommandPreconditionChecker {
    action: &'static str,
    allowed: &'static [LifecycleState],
    additional: Option<AdditionalCheck>,
}

impl UserTaskCommandPreconditionChecker {
    pub const fn new(action: &'static str, allowed: &'static [LifecycleState]) -> Self {
        Self {
            action,
            allowed,
            additional: None,
        }
    }

    pub fn with_additional_check(mut self, check: AdditionalCheck) -> Self {
        self.additional = Some(check);
        self
    }

    /// Returns the persisted task when all checks pass.
    pub fn check(&self, command: &Record, ctx: &ProcessingContext<'_>) -> Result<UserTaskRecord, Rejection> {
        let key = command.key;
        let entry = ctx
            .state()
            .user_tasks
            .get(key)
            .filter(|entry| ctx.is_authorized_for_tenant(command, &entry.record.tenant_id))
            .ok_or_else(|| {
                Rejection::not_found(format!(
                    "Expected to {} user task with key '{}', but no such user task was found",
                    self.action, key
                ))
            })?;

        let bpmn_process_id = entry.record.bpmn_process_id.clone();
        let request = AuthorizationRequest::new(
            command,
            ResourceType::ProcessDefinition,
            PermissionType::Update,
        )
        .add_resource_id(bpmn_process_id.clone());
        if !ctx.is_authorized(&request) {
            let description = format!("BPMN process id '{}'", bpmn_process_id);
            return Err(unauthorized(&request, Some(&description)));
        }

        if !self.allowed.contains(&entry.lifecycle) {
            return Err(Rejection::invalid_state(format!(
                "Expected to {} user task with key '{}', but it is in the '{}' state",
                self.action, key, entry.lifecycle
            )));
        }

        if let Some(additional) = self.additional {
            additional(command, &entry.record)?;
        }
        Ok(entry.record.clone())
    }
}
