use thiserror::Error;
use uuid::Uuid;

use crate::models::TaskStatus;

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("task {0} not found")]
  NotFound(Uuid),

  #[error("refusing to move task {task_id} back to {status}")]
  StatusRegression { task_id: Uuid, status: TaskStatus },

  #[error("corrupt task row: {0}")]
  Corrupt(String),

  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum QueueError {
  #[error("amqp error: {0}")]
  Amqp(#[from] lapin::Error),

  #[error("queue is closed")]
  Closed,
}

#[derive(Debug, Error)]
pub enum LimiterError {
  #[error("redis error: {0}")]
  Redis(#[from] redis::RedisError),
}

#[derive(Debug, Error)]
pub enum TransportError {
  /// The request could not be assembled from the task message.
  #[error("invalid request: {0}")]
  InvalidRequest(String),

  #[error("request failed: {0}")]
  Http(#[from] reqwest::Error),

  /// No response, from an [`HttpTransport`](crate::http_client::HttpTransport)
  /// implementation not built on reqwest.
  #[error("request failed: {0}")]
  Other(String),
}

/// Errors surfaced to callers of the ingestion and lookup paths.
#[derive(Debug, Error)]
pub enum TaskError {
  #[error("received {0:?}, but it must be one of GET, HEAD, POST, PUT, PATCH, DELETE, CONNECT, OPTIONS, TRACE")]
  InvalidMethod(String),

  #[error("invalid url {url:?}: {reason}")]
  InvalidUrl { url: String, reason: String },

  #[error("task {0} not found")]
  NotFound(Uuid),

  #[error("failed to store task: {0}")]
  Store(StoreError),

  #[error("failed to publish task: {0}")]
  Queue(#[from] QueueError),

  #[error("failed to serialize task: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl TaskError {
  pub fn is_validation(&self) -> bool {
    matches!(self, TaskError::InvalidMethod(_) | TaskError::InvalidUrl { .. })
  }
}

impl From<StoreError> for TaskError {
  fn from(err: StoreError) -> Self {
    match err {
      StoreError::NotFound(task_id) => TaskError::NotFound(task_id),
      other => TaskError::Store(other),
    }
  }
}
