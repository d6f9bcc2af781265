use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use url::Url;
use uuid::Uuid;

use crate::errors::TaskError;
use crate::models::{HTTP_METHODS, HeaderValues, TaskMessage, TaskRecord, TaskStatus};
use crate::queue::MessagePublisher;
use crate::task_store::TaskStore;

#[derive(Debug, Clone, Deserialize)]
pub struct NewTask {
  pub method: String,
  pub url: String,
  #[serde(default)]
  pub headers: HeaderValues,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcceptedTask {
  pub task_id: Uuid,
  pub task_status: TaskStatus,
}

fn validate_method(method: &str) -> Result<String, TaskError> {
  let method = method.to_uppercase();
  if HTTP_METHODS.contains(&method.as_str()) {
    Ok(method)
  } else {
    Err(TaskError::InvalidMethod(method))
  }
}

fn validate_url(raw: &str) -> Result<Url, TaskError> {
  let invalid = |reason: String| TaskError::InvalidUrl { url: raw.to_string(), reason };
  let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
  if !matches!(url.scheme(), "http" | "https") {
    return Err(invalid(format!("unsupported scheme {:?}", url.scheme())));
  }
  if url.host_str().is_none_or(str::is_empty) {
    return Err(invalid("missing host".into()));
  }
  Ok(url)
}

/// Ingestion and lookup of tasks.
#[derive(Clone)]
pub struct TaskOrchestrator {
  store: Arc<dyn TaskStore>,
  publisher: Arc<dyn MessagePublisher>,
}

impl TaskOrchestrator {
  pub fn new(store: Arc<dyn TaskStore>, publisher: Arc<dyn MessagePublisher>) -> Self {
    Self { store, publisher }
  }

  /// Validates the request, creates the task in `new` and queues it.
  ///
  /// Nothing is written when validation fails. A publish failure leaves the
  /// created row in `new`.
  pub async fn handle(&self, new_task: NewTask) -> Result<AcceptedTask, TaskError> {
    let method = validate_method(&new_task.method)?;
    let url = validate_url(&new_task.url)?;

    let task = self.store.create_with_status(TaskStatus::New).await.map_err(|e| {
      error!("Failed to create task: {:?}", e);
      e
    })?;

    let message = TaskMessage {
      task_id: task.task_id,
      method,
      url,
      headers: new_task.headers,
    };
    let payload = message.to_bytes().map_err(|e| {
      error!("Serialization of task {} failed: {:?}", task.task_id, e);
      e
    })?;

    self.publisher.publish(&payload).await.map_err(|e| {
      error!("Failed to publish task {}: {:?}", task.task_id, e);
      e
    })?;

    info!("Task {} submitted successfully", task.task_id);
    debug!("Task {} targets {} {}", task.task_id, message.method, message.url);
    Ok(AcceptedTask {
      task_id: task.task_id,
      task_status: task.task_status,
    })
  }

  pub async fn get_by_id(&self, task_id: Uuid) -> Result<TaskRecord, TaskError> {
    Ok(self.store.get_one(task_id).await?)
  }
}
