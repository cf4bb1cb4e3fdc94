//! HTTP-level tests for the workflow endpoints and the save protocol.

mod common;

use axum::http::StatusCode;
use common::{body_json, TestApp, OTHER_EDITOR_ID};
use serde_json::{json, Value};

async fn create_workflow(app: &TestApp, token: &str, name: &str) -> Value {
    let response = app
        .post_json("/api/v1/workflows", token, json!({ "name": name }))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["data"].clone()
}

/// A definition with one required, length-limited `prompt` input.
async fn create_prompt_definition(app: &TestApp) -> i64 {
    let response = app
        .post_json(
            "/api/v1/node-definitions",
            &app.admin(),
            json!({
                "kind": "ai_model",
                "slug": "flux",
                "name": "Flux",
                "io": [
                    {
                        "name": "prompt",
                        "direction": "INPUT",
                        "socket_type": "text",
                        "required": true,
                        "constraints": { "maxLength": 10 }
                    },
                    { "name": "image", "direction": "OUTPUT", "socket_type": "image" }
                ]
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["data"]["id"].as_i64().unwrap()
}

fn model_node(id: &str, definition_id: i64, config: Value) -> Value {
    json!({
        "id": id,
        "binding": { "kind": "ai_model", "definition_id": definition_id },
        "position": { "x": 0.0, "y": 0.0 },
        "config_values": config
    })
}

fn note_node(id: &str) -> Value {
    json!({
        "id": id,
        "binding": { "kind": "builtin", "name": "note" },
        "position": { "x": 10.0, "y": 20.0 }
    })
}

#[tokio::test]
async fn create_and_get_workflow() {
    let app = TestApp::new();
    let token = app.editor();
    let created = create_workflow(&app, &token, "Trailer").await;
    assert_eq!(created["name"], "Trailer");
    assert!(created["change_hash"].as_str().is_some_and(|h| !h.is_empty()));

    let id = created["id"].as_i64().unwrap();
    let response = app.get(&format!("/api/v1/workflows/{id}"), &token).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["id"], id);
    assert_eq!(json["data"]["nodes"], json!([]));
    assert_eq!(json["data"]["edges"], json!([]));
}

#[tokio::test]
async fn empty_name_is_rejected() {
    let app = TestApp::new();
    let response = app
        .post_json("/api/v1/workflows", &app.editor(), json!({ "name": "" }))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn requests_without_token_are_unauthorized() {
    let app = TestApp::new();
    let response = app
        .send(axum::http::Method::GET, "/api/v1/workflows", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn list_is_owner_scoped() {
    let app = TestApp::new();
    create_workflow(&app, &app.editor(), "mine").await;
    let other = app.token(OTHER_EDITOR_ID, "editor");
    create_workflow(&app, &other, "theirs").await;

    let json = body_json(app.get("/api/v1/workflows", &app.editor()).await).await;
    let names: Vec<&str> = json["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|w| w["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["mine"]);
}

#[tokio::test]
async fn other_users_are_forbidden() {
    let app = TestApp::new();
    let created = create_workflow(&app, &app.editor(), "private").await;
    let id = created["id"].as_i64().unwrap();

    let other = app.token(OTHER_EDITOR_ID, "editor");
    let response = app.get(&format!("/api/v1/workflows/{id}"), &other).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn auto_save_replaces_graph_and_rotates_hash() {
    let app = TestApp::new();
    let token = app.editor();
    let created = create_workflow(&app, &token, "wf").await;
    let id = created["id"].as_i64().unwrap();
    let initial_hash = created["change_hash"].as_str().unwrap().to_string();

    let response = app
        .put_json(
            &format!("/api/v1/workflows/{id}/auto-save"),
            &token,
            json!({
                "nodes": [note_node("a"), note_node("b")],
                "edges": [{
                    "id": "e1",
                    "source_node_id": "a",
                    "source_socket": "out",
                    "target_node_id": "b",
                    "target_socket": "in"
                }],
                "viewport": { "x": 1.0, "y": 2.0, "zoom": 1.5 },
                "changeHash": initial_hash
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let new_hash = json["data"]["changeHash"].as_str().unwrap().to_string();
    assert_ne!(new_hash, initial_hash);
    assert!(json["data"]["savedAt"].is_string());

    let graph = body_json(app.get(&format!("/api/v1/workflows/{id}"), &token).await).await;
    assert_eq!(graph["data"]["nodes"].as_array().unwrap().len(), 2);
    assert_eq!(graph["data"]["edges"][0]["workflow_id"], id);
    assert_eq!(graph["data"]["change_hash"], new_hash.as_str());
}

#[tokio::test]
async fn stale_hash_is_rejected_with_server_hash() {
    let app = TestApp::new();
    let token = app.editor();
    let created = create_workflow(&app, &token, "wf").await;
    let id = created["id"].as_i64().unwrap();
    let initial_hash = created["change_hash"].as_str().unwrap().to_string();
    let uri = format!("/api/v1/workflows/{id}/auto-save");

    let first = app
        .put_json(
            &uri,
            &token,
            json!({ "nodes": [note_node("a")], "changeHash": initial_hash }),
        )
        .await;
    assert_eq!(first.status(), StatusCode::OK);
    let current = body_json(first).await["data"]["changeHash"].clone();

    // A second session still holding the original hash.
    let second = app
        .put_json(
            &uri,
            &token,
            json!({ "nodes": [note_node("x"), note_node("y")], "changeHash": initial_hash }),
        )
        .await;
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let json = body_json(second).await;
    assert_eq!(json["error"], "CONFLICT");
    assert_eq!(json["serverHash"], current);

    let graph = body_json(app.get(&format!("/api/v1/workflows/{id}"), &token).await).await;
    let nodes = graph["data"]["nodes"].as_array().unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0]["id"], "a");
}

#[tokio::test]
async fn invalid_node_config_reports_field_errors() {
    let app = TestApp::new();
    let definition_id = create_prompt_definition(&app).await;
    let token = app.editor();
    let created = create_workflow(&app, &token, "wf").await;
    let id = created["id"].as_i64().unwrap();

    let response = app
        .put_json(
            &format!("/api/v1/workflows/{id}/auto-save"),
            &token,
            json!({
                "nodes": [
                    model_node("ok", definition_id, json!({ "prompt": "cat" })),
                    model_node("empty", definition_id, json!({}))
                ]
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "VALIDATION_ERROR");
    assert_eq!(json["errors"].as_array().unwrap().len(), 1);
    assert_eq!(json["errors"][0]["nodeId"], "empty");
    assert_eq!(json["nodeErrors"]["empty"]["prompt"][0]["code"], "REQUIRED");

    // Nothing was written.
    let graph = body_json(app.get(&format!("/api/v1/workflows/{id}"), &token).await).await;
    assert_eq!(graph["data"]["nodes"], json!([]));
}

#[tokio::test]
async fn dangling_edge_is_rejected() {
    let app = TestApp::new();
    let token = app.editor();
    let created = create_workflow(&app, &token, "wf").await;
    let id = created["id"].as_i64().unwrap();

    let response = app
        .put_json(
            &format!("/api/v1/workflows/{id}/auto-save"),
            &token,
            json!({
                "nodes": [note_node("a")],
                "edges": [{
                    "id": "e1",
                    "source_node_id": "a",
                    "source_socket": "out",
                    "target_node_id": "ghost",
                    "target_socket": "in"
                }]
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn save_renames_workflow() {
    let app = TestApp::new();
    let token = app.editor();
    let created = create_workflow(&app, &token, "draft name").await;
    let id = created["id"].as_i64().unwrap();

    let response = app
        .post_json(
            &format!("/api/v1/workflows/{id}/save"),
            &token,
            json!({
                "nodes": [note_node("a")],
                "changeHash": created["change_hash"],
                "name": "Final name"
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let graph = body_json(app.get(&format!("/api/v1/workflows/{id}"), &token).await).await;
    assert_eq!(graph["data"]["name"], "Final name");
}

#[tokio::test]
async fn delete_archives_workflow() {
    let app = TestApp::new();
    let token = app.editor();
    let created = create_workflow(&app, &token, "wf").await;
    let id = created["id"].as_i64().unwrap();

    let response = app.delete(&format!("/api/v1/workflows/{id}"), &token).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app.get(&format!("/api/v1/workflows/{id}"), &token).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let archived = body_json(app.get("/api/v1/workflows?status=archived", &token).await).await;
    assert_eq!(archived["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn successful_save_publishes_activity_event() {
    let app = TestApp::new();
    let mut events = app.event_bus.subscribe();
    let token = app.editor();
    let created = create_workflow(&app, &token, "wf").await;
    let id = created["id"].as_i64().unwrap();

    app.put_json(
        &format!("/api/v1/workflows/{id}/auto-save"),
        &token,
        json!({ "nodes": [note_node("a")] }),
    )
    .await;

    assert_eq!(events.recv().await.unwrap().event_type(), "workflow.created");
    let saved = events.recv().await.unwrap();
    assert_eq!(saved.event_type(), "workflow.auto_saved");
    assert_eq!(saved.entity_id, id);
    assert_eq!(saved.payload["node_count"], 1);
}
