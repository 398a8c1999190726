//! End-to-end integration tests for the workbench
//!
//! These tests run complete requests through the reqwest transport against a
//! local mock server, with environments persisted in a temporary file.

use super::{fast_retry_policy, init_test_env};
use api_workbench::config::load_config;
use api_workbench::models::{FormDataEntry, KeyValueEntry};
use api_workbench::{
    AuthSpec, BodySpec, Dispatcher, ErrorKind, ExecuteOptions, FileStorage, HttpMethod,
    RequestSpec, VariableStore,
};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Helper to create a dispatcher whose environments live in a temp file
fn file_backed_dispatcher(temp_dir: &TempDir, base_url: &str) -> Dispatcher {
    let storage = Arc::new(FileStorage::new(temp_dir.path().join("store.json")));
    let store = VariableStore::new(storage);
    store
        .create_environment("local", [("baseUrl".to_string(), base_url.to_string())].into())
        .expect("Failed to create environment");
    store
        .set_current_environment("local")
        .expect("Failed to switch environment");

    let settings = json!({
        "api-workbench": {
            "timeout": 5000,
            "defaultHeaders": { "X-Client": "workbench" }
        }
    });

    Dispatcher::builder()
        .config(load_config(Some(settings)).expect("Failed to load config"))
        .variable_store(store)
        .retry_policy(fast_retry_policy())
        .build()
        .expect("Failed to build dispatcher")
}

#[tokio::test]
async fn test_end_to_end_get_with_environment() {
    init_test_env();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/42"))
        .and(query_param("fields", "name,email"))
        .and(header("x-client", "workbench"))
        .and(header("accept", "application/json"))
        .and(header("authorization", "Bearer secret-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 42, "name": "Ada"})))
        .expect(1)
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let dispatcher = file_backed_dispatcher(&temp_dir, &server.uri());
    let store = dispatcher.variable_store();
    store.set("userId", "42").unwrap();
    store.set("token", "secret-token").unwrap();

    let spec = RequestSpec::get("{{baseUrl}}/users/{{userId}}")
        .with_param("fields", "name,email")
        .with_auth(AuthSpec::Bearer {
            token: "{{token}}".to_string(),
        });

    let response = dispatcher
        .execute(&spec, ExecuteOptions::default())
        .await
        .unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.data["name"], "Ada");
    assert!(response.size_bytes > 0);

    // Served from cache the second time; the mock expects one call.
    let cached = dispatcher
        .execute(&spec, ExecuteOptions::default())
        .await
        .unwrap();
    assert!(cached.cached);

    // Variables were persisted to disk.
    let reopened = VariableStore::new(Arc::new(FileStorage::new(
        temp_dir.path().join("store.json"),
    )));
    assert_eq!(reopened.current_environment().unwrap(), "local");
    assert_eq!(reopened.get("userId").unwrap(), Some("42".to_string()));
}

#[tokio::test]
async fn test_end_to_end_post_json_and_form() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/items"))
        .and(header("content-type", "application/json"))
        .and(body_string(r#"{"owner": "42"}"#))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"created": true})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/login"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string("user=a+b&code=42"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let dispatcher = file_backed_dispatcher(&temp_dir, &server.uri());
    dispatcher.variable_store().set("userId", "42").unwrap();

    let create = RequestSpec::new(HttpMethod::POST, "{{baseUrl}}/items").with_body(BodySpec::Raw {
        content: r#"{"owner": "{{userId}}"}"#.to_string(),
    });
    let created = dispatcher
        .execute(&create, ExecuteOptions::default())
        .await
        .unwrap();
    assert_eq!(created.status, 201);
    assert_eq!(created.data["created"], true);

    let login = RequestSpec::new(HttpMethod::PUT, "{{baseUrl}}/login").with_body(
        BodySpec::UrlEncoded {
            entries: vec![
                KeyValueEntry::new("user", "a b"),
                KeyValueEntry::new("code", "{{userId}}"),
                KeyValueEntry::new("skipped", "x").disabled(),
            ],
        },
    );
    let logged_in = dispatcher
        .execute(&login, ExecuteOptions::default())
        .await
        .unwrap();
    assert_eq!(logged_in.status, 204);
}

#[tokio::test]
async fn test_end_to_end_multipart_upload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let dispatcher = file_backed_dispatcher(&temp_dir, &server.uri());

    let spec = RequestSpec::new(HttpMethod::POST, "{{baseUrl}}/upload")
        .with_header("Content-Type", "application/json")
        .with_body(BodySpec::FormData {
            entries: vec![FormDataEntry::text("title", "quarterly")],
        });
    dispatcher
        .execute(&spec, ExecuteOptions::default())
        .await
        .unwrap();

    let received = server.received_requests().await.unwrap();
    let content_type = received[0]
        .headers
        .get("content-type")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("multipart/form-data"));
    assert!(String::from_utf8_lossy(&received[0].body).contains("quarterly"));
}

#[tokio::test]
async fn test_end_to_end_server_error_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/unstable"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({"error": "maintenance"})))
        .expect(3)
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let dispatcher = file_backed_dispatcher(&temp_dir, &server.uri());

    let err = dispatcher
        .execute(
            &RequestSpec::get("{{baseUrl}}/unstable"),
            ExecuteOptions::default().with_max_retries(2),
        )
        .await
        .unwrap_err();

    let failure = err.failure().unwrap();
    assert_eq!(failure.kind, ErrorKind::Server);
    assert_eq!(failure.status(), Some(503));
    assert_eq!(failure.user_message, "maintenance");
    assert_eq!(failure.attempts, 3);
}
