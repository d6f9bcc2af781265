mod common;

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use uuid::Uuid;
use warp::http::StatusCode;

use common::{ClosedPublisher, FailingStore};
use reqdispatch::models::{TaskOutcome, TaskStatus};
use reqdispatch::orchestrator::TaskOrchestrator;
use reqdispatch::queue::MemoryQueue;
use reqdispatch::routes::routes;
use reqdispatch::task_store::{MemoryTaskStore, TaskStore};

fn body(response: &warp::http::Response<warp::hyper::body::Bytes>) -> Value {
  serde_json::from_slice(response.body()).unwrap()
}

#[tokio::test]
async fn submit_returns_new_task() {
  let store = Arc::new(MemoryTaskStore::new());
  let queue = Arc::new(MemoryQueue::new());
  let api = routes(Arc::new(TaskOrchestrator::new(store.clone(), queue.clone())));

  let response = warp::test::request()
    .method("POST")
    .path("/api/v1/task")
    .json(&json!({"method": "get", "url": "http://example.com/", "headers": {"X": ["Y"]}}))
    .reply(&api)
    .await;

  assert_eq!(response.status(), StatusCode::OK);
  let body = body(&response);
  assert_eq!(body["task_status"], "new");
  let task_id: Uuid = body["task_id"].as_str().unwrap().parse().unwrap();
  assert_eq!(store.get_one(task_id).await.unwrap().task_status, TaskStatus::New);
  assert_eq!(queue.pending(), 1);
}

#[tokio::test]
async fn submit_without_headers_is_accepted() {
  let api = routes(Arc::new(TaskOrchestrator::new(
    Arc::new(MemoryTaskStore::new()),
    Arc::new(MemoryQueue::new()),
  )));

  let response = warp::test::request()
    .method("POST")
    .path("/api/v1/task")
    .json(&json!({"method": "HEAD", "url": "https://example.com/"}))
    .reply(&api)
    .await;
  assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn invalid_submission_is_bad_request() {
  let store = Arc::new(MemoryTaskStore::new());
  let api = routes(Arc::new(TaskOrchestrator::new(store.clone(), Arc::new(MemoryQueue::new()))));

  let response = warp::test::request()
    .method("POST")
    .path("/api/v1/task")
    .json(&json!({"method": "BREW", "url": "http://example.com/"}))
    .reply(&api)
    .await;

  assert_eq!(response.status(), StatusCode::BAD_REQUEST);
  assert!(body(&response)["err"].as_str().unwrap().contains("BREW"));
  assert!(store.is_empty().await);
}

#[tokio::test]
async fn publish_failure_is_server_error() {
  let api = routes(Arc::new(TaskOrchestrator::new(
    Arc::new(MemoryTaskStore::new()),
    Arc::new(ClosedPublisher),
  )));

  let response = warp::test::request()
    .method("POST")
    .path("/api/v1/task")
    .json(&json!({"method": "GET", "url": "http://example.com/"}))
    .reply(&api)
    .await;
  assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn lookup_returns_outcome_fields() {
  let store = Arc::new(MemoryTaskStore::new());
  let task = store.create_with_status(TaskStatus::New).await.unwrap();
  store
    .add_outcome(task.task_id, TaskOutcome {
      task_status: TaskStatus::Done,
      status_code: Some(200),
      content_length: Some(150),
      headers: Some(json!({"Content-Type": ["application/json"]})),
    })
    .await
    .unwrap();
  let api = routes(Arc::new(TaskOrchestrator::new(store, Arc::new(MemoryQueue::new()))));

  let response = warp::test::request()
    .method("GET")
    .path(&format!("/api/v1/task/{}", task.task_id))
    .reply(&api)
    .await;

  assert_eq!(response.status(), StatusCode::OK);
  assert_eq!(
    body(&response),
    json!({
      "task_id": task.task_id.to_string(),
      "task_status": "done",
      "status_code": 200,
      "headers": {"Content-Type": ["application/json"]},
      "content_length": 150,
    })
  );
}

#[tokio::test]
async fn lookup_of_new_task_has_null_outcome() {
  let store = Arc::new(MemoryTaskStore::new());
  let task = store.create_with_status(TaskStatus::New).await.unwrap();
  let api = routes(Arc::new(TaskOrchestrator::new(store, Arc::new(MemoryQueue::new()))));

  let response = warp::test::request()
    .path(&format!("/api/v1/task/{}", task.task_id))
    .reply(&api)
    .await;

  let body = body(&response);
  assert_eq!(body["task_status"], "new");
  assert!(body["status_code"].is_null());
  assert!(body["headers"].is_null());
  assert!(body["content_length"].is_null());
}

#[tokio::test]
async fn lookup_errors_map_to_status_codes() {
  let api = routes(Arc::new(TaskOrchestrator::new(
    Arc::new(MemoryTaskStore::new()),
    Arc::new(MemoryQueue::new()),
  )));

  let missing = warp::test::request()
    .path(&format!("/api/v1/task/{}", Uuid::new_v4()))
    .reply(&api)
    .await;
  assert_eq!(missing.status(), StatusCode::NOT_FOUND);

  let malformed = warp::test::request().path("/api/v1/task/not-a-uuid").reply(&api).await;
  assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);

  let broken = routes(Arc::new(TaskOrchestrator::new(Arc::new(FailingStore), Arc::new(MemoryQueue::new()))));
  let failed = warp::test::request()
    .path(&format!("/api/v1/task/{}", Uuid::new_v4()))
    .reply(&broken)
    .await;
  assert_eq!(failed.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
