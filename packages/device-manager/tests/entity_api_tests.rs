//! HTTP write API over fake collaborators and the in-memory log.

mod common;

use axum::http::{Method, StatusCode};
use command_log::{Command, CommandEnvelope};
use common::{token, TestHarness};
use device_manager::kernel::{MockPermissions, MockValidator, TestDependencies};
use serde_json::{json, Value};

fn envelopes(harness: &TestHarness, topic: &str) -> Vec<CommandEnvelope<Value>> {
    harness
        .deps
        .log
        .records(topic)
        .iter()
        .map(|r| CommandEnvelope::decode(&r.value).unwrap())
        .collect()
}

#[tokio::test]
async fn create_device_type_returns_201_with_assigned_ids() {
    let harness = TestHarness::new(TestDependencies::new());
    let user = token("user-1", false);

    let (status, body) = harness
        .request(
            Method::POST,
            "/device-types",
            Some(&user),
            Some(json!({
                "name": "lamp",
                "services": [{
                    "local_id": "setOn",
                    "inputs": [{"content_variable": {"name": "on"}}]
                }]
            })),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    let id = body["id"].as_str().unwrap();
    assert!(id.starts_with("urn:infai:ses:device-type:"));
    let service = &body["services"][0];
    assert!(service["id"].as_str().unwrap().starts_with("urn:infai:ses:service:"));
    assert!(!service["inputs"][0]["id"].as_str().unwrap().is_empty());
    assert!(!service["inputs"][0]["content_variable"]["id"]
        .as_str()
        .unwrap()
        .is_empty());

    let published = envelopes(&harness, "device-types");
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].command, Command::Put);
    assert_eq!(published[0].id, id);
    assert_eq!(published[0].payload.as_ref().unwrap(), &body);
}

#[tokio::test]
async fn writes_without_token_are_unauthorized() {
    let harness = TestHarness::new(TestDependencies::new());

    let (status, _) = harness
        .request(Method::POST, "/concepts", None, Some(json!({"name": "color"})))
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(harness.deps.log.append_count(), 0);
}

#[tokio::test]
async fn malformed_body_is_a_bad_request() {
    let harness = TestHarness::new(TestDependencies::new());
    let user = token("user-1", false);

    let (status, body) = harness
        .request(
            Method::POST,
            "/protocols",
            Some(&user),
            Some(json!({"protocol_segments": "not a list"})),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("malformed request body"));
    assert_eq!(harness.deps.log.append_count(), 0);
}

#[tokio::test]
async fn update_with_mismatched_id_is_a_bad_request() {
    let harness = TestHarness::new(TestDependencies::new());
    let user = token("user-1", false);

    let (status, _) = harness
        .request(
            Method::PUT,
            "/functions/urn:infai:ses:function:a",
            Some(&user),
            Some(json!({"id": "urn:infai:ses:function:b", "name": "setOn"})),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(harness.deps.log.append_count(), 0);
}

#[tokio::test]
async fn update_takes_the_path_id() {
    let harness = TestHarness::new(TestDependencies::new());
    let user = token("user-1", false);

    let (status, body) = harness
        .request(
            Method::PUT,
            "/aspects/urn:infai:ses:aspect:air",
            Some(&user),
            Some(json!({"name": "air", "sub_aspects": [{"name": "inside"}]})),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "urn:infai:ses:aspect:air");
    assert!(body["sub_aspects"][0]["id"]
        .as_str()
        .unwrap()
        .starts_with("urn:infai:ses:aspect:"));
    assert_eq!(envelopes(&harness, "aspects")[0].id, "urn:infai:ses:aspect:air");
}

#[tokio::test]
async fn denied_permission_is_forbidden() {
    let harness = TestHarness::new(
        TestDependencies::new().mock_permissions(MockPermissions::new().denying()),
    );
    let user = token("user-1", false);

    let (status, _) = harness
        .request(Method::DELETE, "/devices/urn:infai:ses:device:1", Some(&user), None)
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(harness.deps.log.append_count(), 0);
}

#[tokio::test]
async fn create_cannot_claim_an_existing_id() {
    let harness = TestHarness::new(
        TestDependencies::new().mock_permissions(MockPermissions::new().denying()),
    );
    let other = token("user-2", false);

    let (status, _) = harness
        .request(
            Method::PUT,
            "/devices/urn:infai:ses:device:owned",
            Some(&other),
            Some(json!({"name": "mine now"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = harness
        .request(
            Method::POST,
            "/devices",
            Some(&other),
            Some(json!({"id": "urn:infai:ses:device:owned", "name": "mine now"})),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("must not be set on create"));
    assert_eq!(harness.deps.log.append_count(), 0);
    assert!(harness.deps.permissions.owners().is_empty());
}

#[tokio::test]
async fn unrecorded_owner_is_reported_with_the_created_id() {
    let harness = TestHarness::new(
        TestDependencies::new()
            .mock_permissions(MockPermissions::new().failing_set_owner(503, "unavailable")),
    );
    let user = token("user-1", false);

    let (status, body) = harness
        .request(Method::POST, "/hubs", Some(&user), Some(json!({"name": "attic"})))
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["written"], true);
    let id = body["id"].as_str().unwrap();
    assert!(id.starts_with("urn:infai:ses:hub:"));
    assert_eq!(envelopes(&harness, "hubs")[0].id, id);
}

#[tokio::test]
async fn validation_status_is_passed_through() {
    let harness = TestHarness::new(
        TestDependencies::new()
            .mock_validator(MockValidator::new().rejecting(409, "local id already used")),
    );
    let user = token("user-1", false);

    let (status, body) = harness
        .request(
            Method::POST,
            "/devices",
            Some(&user),
            Some(json!({"local_id": "lamp-1", "device_type_id": "urn:infai:ses:device-type:lamp"})),
        )
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("local id already used"));
    assert_eq!(harness.deps.log.append_count(), 0);
}

#[tokio::test]
async fn delete_returns_204_and_publishes_delete() {
    let harness = TestHarness::new(TestDependencies::new());
    let user = token("user-1", false);

    let (status, body) = harness
        .request(Method::DELETE, "/hubs/urn:infai:ses:hub:1", Some(&user), None)
        .await;

    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);
    let published = envelopes(&harness, "hubs");
    assert_eq!(published[0].command, Command::Delete);
    assert_eq!(published[0].owner.as_deref(), Some("user-1"));
}

#[tokio::test]
async fn owner_scoped_kinds_carry_the_caller_as_owner() {
    let harness = TestHarness::new(TestDependencies::new());
    let user = token("user-7", false);

    let (status, body) = harness
        .request(Method::POST, "/locations", Some(&user), Some(json!({"name": "kitchen"})))
        .await;

    assert_eq!(status, StatusCode::CREATED);
    let id = body["id"].as_str().unwrap().to_string();
    assert_eq!(envelopes(&harness, "locations")[0].owner.as_deref(), Some("user-7"));
    assert_eq!(
        harness.deps.permissions.owners(),
        vec![("locations".to_string(), id, "user-7".to_string())]
    );
}

#[tokio::test]
async fn token_without_subject_cannot_write_owner_scoped_kinds() {
    let harness = TestHarness::new(TestDependencies::new());
    let anonymous = token("", false);

    let (status, _) = harness
        .request(Method::POST, "/devices", Some(&anonymous), Some(json!({"name": "lamp"})))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(harness.deps.log.send_attempts(), 0);
}

#[tokio::test]
async fn broken_log_is_a_server_error() {
    let harness = TestHarness::new(TestDependencies::new());
    harness.deps.log.fail_next_sends(100);
    let user = token("user-1", true);

    let (status, _) = harness
        .request(Method::POST, "/device-classes", Some(&user), Some(json!({"name": "lamp"})))
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(harness.deps.log.append_count(), 0);
    assert_eq!(harness.deps.log.send_attempts(), 10);
}

#[tokio::test]
async fn health_reports_without_broker() {
    let harness = TestHarness::new(TestDependencies::new());

    let (status, body) = harness.request(Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["pending_waits"], 0);
}
