//! Router tests against the in-memory store.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use db::MemoryStore;
use engine::{Dispatcher, DispatcherConfig, ManualClock, WorkflowFactory};
use handlers::HandlerRegistry;

use crate::{router, AppState};

struct Fixture {
    app: Router,
    store: Arc<MemoryStore>,
    dispatcher: Dispatcher,
}

fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::default());
    let factory = WorkflowFactory::new(store.clone(), clock.clone())
        .with_registry(HandlerRegistry::with_builtins());
    let dispatcher = Dispatcher::new(
        store.clone(),
        HandlerRegistry::with_builtins(),
        clock,
        DispatcherConfig::default(),
    );
    Fixture {
        app: router(AppState::new(store.clone(), factory)),
        store,
        dispatcher,
    }
}

fn square() -> Value {
    json!({
        "type": "Polygon",
        "coordinates": [[[0.0, 0.0], [0.0, 0.01], [0.01, 0.01], [0.01, 0.0], [0.0, 0.0]]]
    })
}

fn submission() -> Value {
    json!({
        "clientId": "client-7",
        "input": square(),
        "definition": {
            "name": "area_report",
            "steps": [
                { "taskType": "polygonArea", "stepNumber": 1, "name": "area" },
                { "taskType": "reportGeneration", "stepNumber": 2, "dependsOn": "area" }
            ]
        }
    })
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn submit_poll_and_fetch_results() {
    let f = fixture();

    let (status, created) = send(&f.app, post_json("/workflow", &submission())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "initial");
    assert_eq!(created["totalTasks"], 2);
    let id = created["workflowId"].as_str().unwrap().to_owned();

    let (status, body) = send(&f.app, get(&format!("/workflow/{id}/status"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "workflowId": id, "status": "initial", "completedTasks": 0, "totalTasks": 2 }));

    let (status, body) = send(&f.app, get(&format!("/workflow/{id}/results"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Workflow is not yet completed");
    assert_eq!(body["currentStatus"], "initial");

    assert_eq!(f.dispatcher.drain().await.unwrap(), 2);

    let (status, body) = send(&f.app, get(&format!("/workflow/{id}/results"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    let tasks = body["finalResult"]["tasks"].as_array().unwrap();
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0]["output"]["unit"], "square meters");
    assert!(tasks[0]["output"]["area"].as_f64().unwrap() > 0.0);
    assert_eq!(tasks[1]["taskType"], "reportGeneration");
}

#[tokio::test]
async fn unknown_workflow_is_404() {
    let f = fixture();
    let id = Uuid::new_v4();

    let (status, _) = send(&f.app, get(&format!("/workflow/{id}/status"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&f.app, get(&format!("/workflow/{id}/results"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_definitions_are_422() {
    let f = fixture();

    let mut cyclic = submission();
    cyclic["definition"]["steps"][0]["dependsOn"] = json!("area");
    let (status, body) = send(&f.app, post_json("/workflow", &cyclic)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["message"].as_str().unwrap().contains("cycle"));

    let mut unregistered = submission();
    unregistered["definition"]["steps"][1]["taskType"] = json!("emailDelivery");
    let (status, body) = send(&f.app, post_json("/workflow", &unregistered)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["message"].as_str().unwrap().contains("emailDelivery"));

    // Nothing was persisted for either submission.
    assert_eq!(f.store.workflow_count().await, 0);
    assert_eq!(f.store.task_count().await, 0);
}
