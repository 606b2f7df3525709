use crate::core::Result;
use crate::engine::authorization::{AuthorizationRequest, unauthorized};
use crate::engine::context::ProcessingContext;
use crate::engine::processors::DistributedProcessor;
use crate::engine::reject_unexpected_value;
use crate::protocol::{
    DistributionQueue, Intent, PermissionType, Record, Rejection, ResourceType, UserRecord,
};

/// Hashes a clear-text password with bcrypt.
pub(crate) fn hash_password(password: &str, cost: u32) -> Result<String> {
    Ok(bcrypt::hash(password, cost)?)
}

pub struct UserCreateProcessor;

impl DistributedProcessor for UserCreateProcessor {
    fn process_new_command(&self, command: &Record, ctx: &mut ProcessingContext<'_>) -> Result<()> {
        let Some(user) = command.value.as_user() else {
            return reject_unexpected_value(command, ctx);
        };
        let request = AuthorizationRequest::new(command, ResourceType::User, PermissionType::Create);
        if !ctx.is_authorized(&request) {
            ctx.reject(command, unauthorized(&request, None));
            return Ok(());
        }
        if user.username.trim().is_empty() {
            ctx.reject(
                command,
                Rejection::invalid_argument("Expected to create user with a non-empty username"),
            );
            return Ok(());
        }
        if ctx.state().users.get_by_username(&user.username).is_some() {
            ctx.reject(
                command,
                Rejection::already_exists(format!(
                    "Expected to create user with username '{}', but a user with this username already exists",
                    user.username
                )),
            );
            return Ok(());
        }

        let key = ctx.next_key();
        let created = UserRecord {
            user_key: key,
            password: hash_password(&user.password, ctx.config().security.password_hash_cost)?,
            ..user.clone()
        };
        ctx.state_writer()
            .append_follow_up_event(key, Intent::Created, created.clone())?;
        ctx.response_writer()
            .write_event_on_command(key, Intent::Created, created.clone(), command);
        ctx.command_distribution()
            .with_key(key)
            .in_queue(DistributionQueue::Identity)
            .distribute(&command.with_value(created))
    }

    fn process_distributed_command(&self, command: &Record, ctx: &mut ProcessingContext<'_>) -> Result<()> {
        let Some(user) = command.value.as_user().cloned() else {
            return reject_unexpected_value(command, ctx);
        };
        ctx.state_writer()
            .append_follow_up_event(user.user_key, Intent::Created, user)?;
        ctx.command_distribution().acknowledge_command(command)
    }
}

pub struct UserDeleteProcessor;

impl DistributedProcessor for UserDeleteProcessor {
    fn process_new_command(&self, command: &Record, ctx: &mut ProcessingContext<'_>) -> Result<()> {
        let Some(user) = command.value.as_user() else {
            return reject_unexpected_value(command, ctx);
        };
        let Some(persisted) = ctx.state().users.get(user.user_key).cloned() else {
            ctx.reject(
                command,
                Rejection::not_found(format!(
                    "Expected to delete user with key {}, but a user with this key does not exist",
                    user.user_key
                )),
            );
            return Ok(());
        };
        let request = AuthorizationRequest::new(command, ResourceType::User, PermissionType::Delete)
            .add_resource_id(persisted.username.clone());
        if !ctx.is_authorized(&request) {
            let description = format!("username '{}'", persisted.username);
            ctx.reject(command, unauthorized(&request, Some(&description)));
            return Ok(());
        }

        let key = persisted.user_key;
        ctx.state_writer()
            .append_follow_up_event(key, Intent::Deleted, persisted.clone())?;
        ctx.response_writer()
            .write_event_on_command(key, Intent::Deleted, persisted.clone(), command);
        let distribution_key = ctx.next_key();
        ctx.command_distribution()
            .with_key(distribution_key)
            .in_queue(DistributionQueue::Identity)
            .distribute(&command.with_value(persisted))
    }

    fn process_distributed_command(&self, command: &Record, ctx: &mut ProcessingContext<'_>) -> Result<()> {
        let Some(user) = command.value.as_user().cloned() else {
            return reject_unexpected_value(command, ctx);
        };
        if ctx.state().users.get(user.user_key).is_some() {
            ctx.state_writer()
                .append_follow_up_event(user.user_key, Intent::Deleted, user)?;
        }
        ctx.command_distribution().acknowledge_command(command)
    }
}
