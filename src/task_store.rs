use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::errors::StoreError;
use crate::models::{TaskOutcome, TaskRecord, TaskStatus};

/// Persistence for task records. One row per task, keyed by `task_id`.
///
/// Updates are plain overwrites so a redelivered message simply rewrites the
/// outcome. Neither update accepts [`TaskStatus::New`].
#[async_trait]
pub trait TaskStore: Send + Sync {
  async fn create_with_status(&self, status: TaskStatus) -> Result<TaskRecord, StoreError>;

  async fn update_status(&self, task_id: Uuid, status: TaskStatus) -> Result<(), StoreError>;

  async fn add_outcome(&self, task_id: Uuid, outcome: TaskOutcome) -> Result<(), StoreError>;

  async fn get_one(&self, task_id: Uuid) -> Result<TaskRecord, StoreError>;
}

pub(crate) fn ensure_forward(task_id: Uuid, status: TaskStatus) -> Result<(), StoreError> {
  if status.is_terminal() {
    Ok(())
  } else {
    Err(StoreError::StatusRegression { task_id, status })
  }
}

#[derive(Debug, Default)]
pub struct MemoryTaskStore {
  tasks: Mutex<HashMap<Uuid, TaskRecord>>,
}

impl MemoryTaskStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub async fn len(&self) -> usize {
    self.tasks.lock().await.len()
  }

  pub async fn is_empty(&self) -> bool {
    self.tasks.lock().await.is_empty()
  }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
  async fn create_with_status(&self, status: TaskStatus) -> Result<TaskRecord, StoreError> {
    let record = TaskRecord::new(Uuid::new_v4(), status);
    self.tasks.lock().await.insert(record.task_id, record.clone());
    Ok(record)
  }

  async fn update_status(&self, task_id: Uuid, status: TaskStatus) -> Result<(), StoreError> {
    ensure_forward(task_id, status)?;
    let mut tasks = self.tasks.lock().await;
    let record = tasks.get_mut(&task_id).ok_or(StoreError::NotFound(task_id))?;
    record.task_status = status;
    Ok(())
  }

  async fn add_outcome(&self, task_id: Uuid, outcome: TaskOutcome) -> Result<(), StoreError> {
    ensure_forward(task_id, outcome.task_status)?;
    let mut tasks = self.tasks.lock().await;
    let record = tasks.get_mut(&task_id).ok_or(StoreError::NotFound(task_id))?;
    record.task_status = outcome.task_status;
    record.status_code = outcome.status_code;
    record.content_length = outcome.content_length;
    record.headers = outcome.headers;
    Ok(())
  }

  async fn get_one(&self, task_id: Uuid) -> Result<TaskRecord, StoreError> {
    self.tasks
      .lock()
      .await
      .get(&task_id)
      .cloned()
      .ok_or(StoreError::NotFound(task_id))
  }
}
