use std::collections::BTreeMap;
use std::sync::Arc;

use http::HeaderMap;
use tracing::{debug, error, info, warn};

use crate::errors::TransportError;
use crate::http_client::{HttpTransport, OutboundRequest, OutboundResponse};
use crate::models::{TaskMessage, TaskOutcome, TaskStatus};
use crate::rate_limiter::RateLimiter;
use crate::task_store::TaskStore;

/// How a single queued message was dealt with.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
  /// The payload was not a task message. Nothing was written.
  Malformed,
  /// The rate limiter could not be consulted. Nothing was written.
  LimiterUnavailable,
  /// The URL was attempted too recently; the task was marked `reqerror`.
  RateLimited,
  /// The outbound request could not be built. Nothing was written.
  Unbuildable,
  /// The outcome was computed but could not be stored.
  OutcomeNotStored(TaskStatus),
  Completed(TaskStatus),
}

/// Status-class check applied to every response.
///
/// Note this tests `status % 100`, not `status >= 300`: a 404 is an error
/// (`4 >= 3`) but so is a 503 or a 103, while a 500 counts as done.
pub fn is_error_status(status: u16) -> bool {
  status % 100 >= 3
}

/// `content-type` becomes `Content-Type`: the first letter and every letter
/// after a hyphen upper-cased, the rest lower-cased.
fn canonical_header_name(name: &str) -> String {
  let mut upper = true;
  name
    .chars()
    .map(|c| {
      let out = if upper { c.to_ascii_uppercase() } else { c.to_ascii_lowercase() };
      upper = c == '-';
      out
    })
    .collect()
}

/// Values that are not valid UTF-8 (obs-text) are kept with the offending
/// bytes replaced.
fn serialize_headers(headers: &HeaderMap) -> Option<serde_json::Value> {
  let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
  for (name, value) in headers {
    map
      .entry(canonical_header_name(name.as_str()))
      .or_default()
      .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
  }
  serde_json::to_value(map).ok()
}

/// Turns the result of an outbound call into the outcome to persist.
///
/// Without a response only the status is set. With one, status code and
/// content length are always set (`-1` when the length is unknown) and headers
/// are keyed by canonical name.
pub fn compute_outcome(result: &Result<OutboundResponse, TransportError>) -> TaskOutcome {
  let response = match result {
    Ok(response) => response,
    Err(_) => return TaskOutcome::transport_failure(),
  };

  let task_status = if is_error_status(response.status) {
    TaskStatus::Error
  } else {
    TaskStatus::Done
  };

  TaskOutcome {
    task_status,
    status_code: Some(i32::from(response.status)),
    content_length: Some(
      response.content_length
        .and_then(|length| i64::try_from(length).ok())
        .unwrap_or(-1),
    ),
    headers: serialize_headers(&response.headers),
  }
}

/// Runs one task message through the limiter, the outbound call and the store.
#[derive(Clone)]
pub struct TaskProcessor {
  store: Arc<dyn TaskStore>,
  limiter: Arc<dyn RateLimiter>,
  transport: Arc<dyn HttpTransport>,
}

impl TaskProcessor {
  pub fn new(store: Arc<dyn TaskStore>, limiter: Arc<dyn RateLimiter>, transport: Arc<dyn HttpTransport>) -> Self {
    Self { store, limiter, transport }
  }

  pub async fn process(&self, payload: &[u8]) -> Disposition {
    let task = match TaskMessage::from_bytes(payload) {
      Ok(task) => task,
      Err(e) => {
        error!("Failed to parse task: {:?}", e);
        return Disposition::Malformed;
      }
    };
    let task_id = task.task_id;

    match self.limiter.allowed(&task.url).await {
      Ok(true) => {}
      Ok(false) => {
        info!("Task {} rate limited for {}", task_id, task.url);
        if let Err(e) = self.store.update_status(task_id, TaskStatus::ReqError).await {
          warn!("Failed to mark task {} as {}: {:?}", task_id, TaskStatus::ReqError, e);
        }
        return Disposition::RateLimited;
      }
      Err(e) => {
        error!("Rate limiter unavailable for task {}: {:?}", task_id, e);
        return Disposition::LimiterUnavailable;
      }
    }

    let request = match OutboundRequest::from_message(&task) {
      Ok(request) => request,
      Err(e) => {
        error!("Failed to build request for task {}: {:?}", task_id, e);
        return Disposition::Unbuildable;
      }
    };

    debug!("Task {}: {} {}", task_id, request.method, request.url);
    let result = self.transport.execute(request).await;
    if let Err(e) = &result {
      warn!("Task {}: request to {} failed: {:?}", task_id, task.url, e);
    }

    let outcome = compute_outcome(&result);
    let status = outcome.task_status;
    if let Err(e) = self.store.add_outcome(task_id, outcome).await {
      error!("Failed to store outcome of task {}: {:?}", task_id, e);
      return Disposition::OutcomeNotStored(status);
    }

    if let Err(e) = self.limiter.record(&task.url).await {
      warn!("Failed to record attempt on {} for task {}: {:?}", task.url, task_id, e);
    }

    info!("Task {} finished with status {}", task_id, status);
    Disposition::Completed(status)
  }
}
