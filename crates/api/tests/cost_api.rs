//! HTTP-level tests for cost estimation.

mod common;

use axum::http::StatusCode;
use common::{body_json, TestApp};
use serde_json::{json, Value};

async fn create_model(app: &TestApp, slug: &str, pricing: Option<Value>, io: Value) -> i64 {
    let mut body = json!({
        "kind": "ai_model",
        "slug": slug,
        "name": slug,
        "io": io
    });
    if let Some(pricing) = pricing {
        body["pricing"] = pricing;
    }
    let response = app
        .post_json("/api/v1/node-definitions", &app.admin(), body)
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["data"]["id"].as_i64().unwrap()
}

fn image_output() -> Value {
    json!([{ "name": "image", "direction": "OUTPUT", "socket_type": "image" }])
}

fn model_node(id: &str, definition_id: i64) -> Value {
    json!({
        "id": id,
        "binding": { "kind": "ai_model", "definition_id": definition_id },
        "position": { "x": 0.0, "y": 0.0 }
    })
}

#[tokio::test]
async fn empty_candidate_costs_nothing() {
    let app = TestApp::new();
    let response = app
        .post_json("/api/v1/cost/workflow", &app.editor(), json!({ "nodes": [] }))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["totalUsd"], 0.0);
    assert_eq!(json["data"]["isEstimate"], false);
}

#[tokio::test]
async fn structured_pricing_is_exact() {
    let app = TestApp::new();
    let id = create_model(
        &app,
        "flux",
        Some(json!({ "output": { "image": { "per_unit": 0.05 } } })),
        image_output(),
    )
    .await;

    let response = app
        .post_json(
            "/api/v1/cost/workflow",
            &app.editor(),
            json!({ "nodes": [model_node("n1", id)] }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["totalUsd"], 0.05);
    assert_eq!(json["data"]["isEstimate"], false);
    assert_eq!(json["data"]["nodes"][0]["nodeId"], "n1");
}

#[tokio::test]
async fn missing_pricing_falls_back_to_estimate() {
    let app = TestApp::new();
    let id = create_model(&app, "mystery", None, image_output()).await;

    let json = body_json(
        app.post_json(
            "/api/v1/cost/workflow",
            &app.editor(),
            json!({ "nodes": [model_node("n1", id)] }),
        )
        .await,
    )
    .await;
    assert_eq!(json["data"]["totalUsd"], 0.04);
    assert_eq!(json["data"]["isEstimate"], true);
}

#[tokio::test]
async fn persisted_workflow_cost() {
    let app = TestApp::new();
    let token = app.editor();
    let model = create_model(
        &app,
        "flux",
        Some(json!({ "output": { "image": { "per_unit": 0.05 } } })),
        image_output(),
    )
    .await;
    let created = body_json(
        app.post_json("/api/v1/workflows", &token, json!({ "name": "wf" }))
            .await,
    )
    .await;
    let id = created["data"]["id"].as_i64().unwrap();
    let response = app
        .put_json(
            &format!("/api/v1/workflows/{id}/auto-save"),
            &token,
            json!({ "nodes": [model_node("a", model), model_node("b", model)] }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(app.get(&format!("/api/v1/workflows/{id}/cost"), &token).await).await;
    assert_eq!(json["data"]["nodes"].as_array().unwrap().len(), 2);
    assert_eq!(json["data"]["totalUsd"], 0.1);
}

#[tokio::test]
async fn template_cost_infers_outputs_from_pricing() {
    let app = TestApp::new();
    let video = create_model(
        &app,
        "kling",
        Some(json!({ "output": { "video_without_audio": { "per_unit": 0.1 } } })),
        json!([]),
    )
    .await;

    let step = json!({
        "model_id": video,
        "operation_code": "image_to_video",
        "config": { "generate_audio": false }
    });
    let response = app
        .post_json(
            "/api/v1/cost/template",
            &app.editor(),
            json!({
                "clips": [
                    { "name": "intro", "steps": [step.clone()] },
                    { "name": "outro", "steps": [step] }
                ]
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["totalUsd"], 1.0);
    assert_eq!(json["data"]["isEstimate"], false);
    assert_eq!(json["data"]["clipCount"], 2);
    assert_eq!(json["data"]["stepCount"], 2);
}

#[tokio::test]
async fn oversized_template_is_rejected() {
    let app = TestApp::new();
    let steps: Vec<Value> = (0..501).map(|_| json!({ "model_id": 1 })).collect();
    let response = app
        .post_json(
            "/api/v1/cost/template",
            &app.editor(),
            json!({ "clips": [{ "steps": steps }] }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
