//! Entity write actions - entry-point functions for create, update and delete
//!
//! These are called directly from the HTTP handlers. Actions are
//! self-contained: they take the decoded body and the caller, run the
//! collaborator checks, publish the command and optionally wait for the
//! downstream handlers to confirm.

use command_log::{Command, WaitError, WaitHandle, WaitRequest};
use tracing::{info, warn};

use super::{EntityKind, Resource, WriteError};
use crate::common::{assign_ids_for_create, assign_ids_for_update, Caller};
use crate::kernel::{Right, ServerDeps};

/// Outcome of the optional completion wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Fire-and-forget write.
    NotRequested,
    /// Every required handler applied the command.
    Confirmed,
    /// The command is durably published but not yet confirmed.
    Pending(WaitError),
}

impl Completion {
    pub fn is_pending(&self) -> bool {
        matches!(self, Completion::Pending(_))
    }
}

#[derive(Debug, Clone)]
pub struct WriteResult<R> {
    pub entity: R,
    pub completion: Completion,
}

/// Create an entity: mint ids, validate, publish PUT, record the owner.
pub async fn create_entity<R: Resource>(
    mut entity: R,
    caller: &Caller,
    wait: bool,
    deps: &ServerDeps,
) -> Result<WriteResult<R>, WriteError> {
    let kind = R::KIND;
    let minted = assign_ids_for_create(&mut entity, &deps.id_minter)?;
    let id = entity.id().to_string();
    info!(kind = %kind, id = %id, minted, user = %caller.user_id, "creating entity");

    let body = serde_json::to_value(&entity)?;
    deps.validator
        .validate_put(&caller.token, kind.resource(), &id, &body)
        .await?;

    let handle = register_wait(deps, kind, Command::Put, &id, wait);
    deps.publisher
        .put(kind.topic(), &id, Some(caller.user_id.as_str()), &body)
        .await?;
    deps.permissions
        .set_owner(&caller.token, kind.resource(), &id, &caller.user_id)
        .await
        .map_err(|source| WriteError::OwnershipNotRecorded {
            resource: kind.resource().to_string(),
            id: id.clone(),
            source,
        })?;

    let completion = await_completion(handle).await;
    Ok(WriteResult { entity, completion })
}

/// Replace the entity addressed by `path_id`.
pub async fn update_entity<R: Resource>(
    mut entity: R,
    path_id: &str,
    caller: &Caller,
    wait: bool,
    deps: &ServerDeps,
) -> Result<WriteResult<R>, WriteError> {
    let kind = R::KIND;
    let minted = assign_ids_for_update(&mut entity, path_id, &deps.id_minter)?;
    info!(kind = %kind, id = %path_id, minted, user = %caller.user_id, "updating entity");

    ensure_right(deps, caller, kind, path_id, Right::Write).await?;

    let body = serde_json::to_value(&entity)?;
    deps.validator
        .validate_put(&caller.token, kind.resource(), path_id, &body)
        .await?;

    let handle = register_wait(deps, kind, Command::Put, path_id, wait);
    deps.publisher
        .put(kind.topic(), path_id, Some(caller.user_id.as_str()), &body)
        .await?;

    let completion = await_completion(handle).await;
    Ok(WriteResult { entity, completion })
}

/// Delete the entity `kind/id`.
pub async fn delete_entity(
    kind: EntityKind,
    id: &str,
    caller: &Caller,
    wait: bool,
    deps: &ServerDeps,
) -> Result<Completion, WriteError> {
    info!(kind = %kind, id = %id, user = %caller.user_id, "deleting entity");

    ensure_right(deps, caller, kind, id, Right::Administrate).await?;
    deps.validator
        .validate_delete(&caller.token, kind.resource(), id)
        .await?;

    let handle = register_wait(deps, kind, Command::Delete, id, wait);
    deps.publisher
        .delete(kind.topic(), id, Some(caller.user_id.as_str()))
        .await?;

    Ok(await_completion(handle).await)
}

/// Admins pass; everyone else needs `right` from the permission service.
async fn ensure_right(
    deps: &ServerDeps,
    caller: &Caller,
    kind: EntityKind,
    id: &str,
    right: Right,
) -> Result<(), WriteError> {
    if caller.is_admin {
        return Ok(());
    }
    let allowed = deps
        .permissions
        .check(&caller.token, kind.resource(), id, right)
        .await?;
    if !allowed {
        return Err(WriteError::PermissionDenied {
            resource: kind.resource().to_string(),
            id: id.to_string(),
            right: right.as_str(),
        });
    }
    Ok(())
}

/// Register before publishing so a fast handler cannot signal before anyone
/// listens. Dropping the handle (failed publish, client gone) unregisters.
fn register_wait(
    deps: &ServerDeps,
    kind: EntityKind,
    command: Command,
    id: &str,
    wait: bool,
) -> Option<WaitHandle> {
    wait.then(|| {
        deps.waiter.register_timeout(
            WaitRequest::new(kind.topic(), id, command)
                .handlers(deps.sync_wait.handlers.iter().cloned()),
            deps.sync_wait.timeout,
        )
    })
}

async fn await_completion(handle: Option<WaitHandle>) -> Completion {
    let Some(handle) = handle else {
        return Completion::NotRequested;
    };
    match handle.wait().await {
        Ok(()) => Completion::Confirmed,
        Err(e) => {
            warn!(error = %e, "write published but not confirmed in time");
            Completion::Pending(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::IdentityError;
    use crate::domains::entities::{Device, DeviceType, Service};
    use crate::kernel::{MockPermissions, MockValidator, TestDependencies, ValidationCall};
    use command_log::{CommandEnvelope, CompletionSignal, PublishError};
    use std::time::Duration;

    fn caller() -> Caller {
        Caller {
            user_id: "user-1".into(),
            is_admin: false,
            token: "Bearer t".into(),
        }
    }

    fn published(deps: &TestDependencies, topic: &str) -> Vec<CommandEnvelope<serde_json::Value>> {
        deps.log
            .records(topic)
            .iter()
            .map(|r| CommandEnvelope::decode(&r.value).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn create_assigns_ids_validates_publishes_and_records_owner() {
        let test_deps = TestDependencies::new();
        let deps = test_deps.clone().into_server_deps();
        let device_type = DeviceType {
            name: "lamp".into(),
            services: vec![Service::default()],
            ..Default::default()
        };

        let result = create_entity(device_type, &caller(), false, &deps)
            .await
            .unwrap();

        let id = result.entity.id.clone();
        assert!(id.starts_with("urn:infai:ses:device-type:"));
        assert!(!result.entity.services[0].id.is_empty());
        assert_eq!(result.completion, Completion::NotRequested);

        let envelopes = published(&test_deps, "device-types");
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].command, Command::Put);
        assert_eq!(envelopes[0].id, id);
        assert_eq!(envelopes[0].owner.as_deref(), Some("user-1"));
        assert_eq!(
            envelopes[0].payload.as_ref().unwrap()["services"][0]["id"],
            result.entity.services[0].id.as_str()
        );

        assert!(matches!(
            &test_deps.validator.calls()[0],
            ValidationCall::Put { resource, id: validated, .. }
                if resource == "device-types" && *validated == id
        ));
        assert_eq!(
            test_deps.permissions.owners(),
            vec![("device-types".into(), id, "user-1".into())]
        );
    }

    #[tokio::test]
    async fn rejected_validation_publishes_nothing() {
        let test_deps = TestDependencies::new()
            .mock_validator(MockValidator::new().rejecting(400, "bad name"));
        let deps = test_deps.clone().into_server_deps();

        let err = create_entity(DeviceType::default(), &caller(), true, &deps)
            .await
            .unwrap_err();

        assert!(matches!(err, WriteError::Collaborator(_)));
        assert_eq!(test_deps.log.append_count(), 0);
        assert_eq!(deps.waiter.pending(), 0);
    }

    #[tokio::test]
    async fn create_with_a_preset_id_touches_nothing() {
        let test_deps = TestDependencies::new();
        let deps = test_deps.clone().into_server_deps();
        let device = Device {
            id: "urn:infai:ses:device:not-mine".into(),
            ..Default::default()
        };

        let err = create_entity(device, &caller(), true, &deps)
            .await
            .unwrap_err();

        assert!(matches!(err, WriteError::Identity(IdentityError::IdOnCreate { .. })));
        assert!(test_deps.validator.calls().is_empty());
        assert!(test_deps.permissions.owners().is_empty());
        assert_eq!(test_deps.log.append_count(), 0);
        assert_eq!(deps.waiter.pending(), 0);
    }

    #[tokio::test]
    async fn failed_ownership_record_names_the_published_id() {
        let test_deps = TestDependencies::new()
            .mock_permissions(MockPermissions::new().failing_set_owner(503, "unavailable"));
        let deps = test_deps.clone().into_server_deps();

        let err = create_entity(Device::default(), &caller(), false, &deps)
            .await
            .unwrap_err();

        let WriteError::OwnershipNotRecorded { resource, id, .. } = err else {
            panic!("expected OwnershipNotRecorded, got {err:?}");
        };
        assert_eq!(resource, "devices");
        let envelopes = published(&test_deps, "devices");
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].id, id);
    }

    #[tokio::test]
    async fn update_with_mismatched_id_touches_nothing() {
        let test_deps = TestDependencies::new();
        let deps = test_deps.clone().into_server_deps();
        let device_type = DeviceType {
            id: "urn:infai:ses:device-type:a".into(),
            ..Default::default()
        };

        let err = update_entity(device_type, "urn:infai:ses:device-type:b", &caller(), false, &deps)
            .await
            .unwrap_err();

        assert!(matches!(err, WriteError::Identity(_)));
        assert!(test_deps.permissions.checks().is_empty());
        assert!(test_deps.validator.calls().is_empty());
        assert_eq!(test_deps.log.append_count(), 0);
    }

    #[tokio::test]
    async fn update_requires_write_right() {
        let test_deps = TestDependencies::new().mock_permissions(MockPermissions::new().denying());
        let deps = test_deps.clone().into_server_deps();

        let err = update_entity(
            DeviceType::default(),
            "urn:infai:ses:device-type:a",
            &caller(),
            false,
            &deps,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, WriteError::PermissionDenied { right: "w", .. }));
        assert_eq!(test_deps.log.append_count(), 0);
    }

    #[tokio::test]
    async fn admins_skip_the_permission_check() {
        let test_deps = TestDependencies::new().mock_permissions(MockPermissions::new().denying());
        let deps = test_deps.clone().into_server_deps();
        let admin = Caller {
            is_admin: true,
            ..caller()
        };

        delete_entity(EntityKind::DeviceType, "urn:infai:ses:device-type:a", &admin, false, &deps)
            .await
            .unwrap();

        assert!(test_deps.permissions.checks().is_empty());
        assert_eq!(published(&test_deps, "device-types")[0].command, Command::Delete);
    }

    #[tokio::test]
    async fn delete_checks_administrate_right() {
        let test_deps = TestDependencies::new();
        let deps = test_deps.clone().into_server_deps();

        delete_entity(EntityKind::Hub, "urn:infai:ses:hub:1", &caller(), false, &deps)
            .await
            .unwrap();

        assert_eq!(
            test_deps.permissions.checks(),
            vec![("hubs".into(), "urn:infai:ses:hub:1".into(), Right::Administrate)]
        );
        let envelopes = published(&test_deps, "hubs");
        assert_eq!(envelopes[0].command, Command::Delete);
        assert!(envelopes[0].payload.is_none());
    }

    #[tokio::test]
    async fn owner_scoped_create_without_user_is_a_client_error() {
        let test_deps = TestDependencies::new();
        let deps = test_deps.clone().into_server_deps();
        let anonymous = Caller {
            user_id: String::new(),
            ..caller()
        };

        let err = create_entity(Device::default(), &anonymous, false, &deps)
            .await
            .unwrap_err();

        assert!(matches!(err, WriteError::Publish(PublishError::MissingOwner { .. })));
        assert_eq!(test_deps.log.send_attempts(), 0);
    }

    #[tokio::test]
    async fn wait_confirms_once_the_handler_signals() {
        let test_deps =
            TestDependencies::new().sync_wait(Duration::from_secs(5), &["device-repository"]);
        let deps = test_deps.clone().into_server_deps();

        // Play the downstream handler: confirm whatever lands on the topic.
        let log = test_deps.log.clone();
        let waiter = test_deps.waiter.clone();
        tokio::spawn(async move {
            loop {
                if let Some(record) = log.records("device-types").first() {
                    waiter.signal(&CompletionSignal {
                        resource_kind: "device-types".into(),
                        resource_id: record.key.clone(),
                        command: Command::Put,
                        handler: "device-repository".into(),
                    });
                    break;
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        });

        let result = create_entity(DeviceType::default(), &caller(), true, &deps)
            .await
            .unwrap();
        assert_eq!(result.completion, Completion::Confirmed);
        assert_eq!(deps.waiter.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unconfirmed_wait_reports_pending() {
        let test_deps =
            TestDependencies::new().sync_wait(Duration::from_secs(30), &["device-repository"]);
        let deps = test_deps.clone().into_server_deps();

        let result = create_entity(DeviceType::default(), &caller(), true, &deps)
            .await
            .unwrap();

        assert!(result.completion.is_pending());
        // Published regardless.
        assert_eq!(test_deps.log.append_count(), 1);
        assert_eq!(deps.waiter.pending(), 0);
    }
}
