use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::migrate::Migrator;
use sqlx::{FromRow, PgPool, Pool, Postgres};
use tracing::info;
use uuid::Uuid;

use crate::errors::StoreError;
use crate::models::{TaskOutcome, TaskRecord, TaskStatus};
use crate::task_store::{TaskStore, ensure_forward};

static MIGRATOR: Migrator = sqlx::migrate!();

pub async fn setup_database(database_url: &str) -> Result<Pool<Postgres>> {
  let pool = Pool::<Postgres>::connect(database_url)
    .await
    .context("Failed to connect to database.")?;

  MIGRATOR.run(&pool)
    .await
    .context("Failed to run database migrations.")?;
  info!("Database migrations complete");
  Ok(pool)
}

#[derive(Debug, FromRow)]
struct TaskRow {
  task_id: Uuid,
  task_status: String,
  status_code: Option<i32>,
  headers: Option<serde_json::Value>,
  content_length: Option<i64>,
}

impl TryFrom<TaskRow> for TaskRecord {
  type Error = StoreError;

  fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
    let task_status = row.task_status.parse::<TaskStatus>().map_err(StoreError::Corrupt)?;
    Ok(TaskRecord {
      task_id: row.task_id,
      task_status,
      status_code: row.status_code,
      headers: row.headers,
      content_length: row.content_length,
    })
  }
}

/// [`TaskStore`] over the `tasks` table.
#[derive(Debug, Clone)]
pub struct PgTaskStore {
  pool: PgPool,
}

impl PgTaskStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }
}

#[async_trait]
impl TaskStore for PgTaskStore {
  async fn create_with_status(&self, status: TaskStatus) -> Result<TaskRecord, StoreError> {
    let (task_id, task_status): (Uuid, String) = sqlx::query_as(
      "INSERT INTO tasks (task_status) VALUES ($1) RETURNING task_id, task_status",
    )
      .bind(status.as_str())
      .fetch_one(&self.pool)
      .await?;

    let task_status = task_status.parse::<TaskStatus>().map_err(StoreError::Corrupt)?;
    Ok(TaskRecord::new(task_id, task_status))
  }

  async fn update_status(&self, task_id: Uuid, status: TaskStatus) -> Result<(), StoreError> {
    ensure_forward(task_id, status)?;
    let result = sqlx::query(
      "UPDATE tasks SET task_status = $1, updated_at = NOW() WHERE task_id = $2",
    )
      .bind(status.as_str())
      .bind(task_id)
      .execute(&self.pool)
      .await?;

    if result.rows_affected() == 0 {
      return Err(StoreError::NotFound(task_id));
    }
    Ok(())
  }

  async fn add_outcome(&self, task_id: Uuid, outcome: TaskOutcome) -> Result<(), StoreError> {
    ensure_forward(task_id, outcome.task_status)?;
    let result = sqlx::query(
      "UPDATE tasks
         SET task_status = $1, status_code = $2, content_length = $3, headers = $4, updated_at = NOW()
       WHERE task_id = $5",
    )
      .bind(outcome.task_status.as_str())
      .bind(outcome.status_code)
      .bind(outcome.content_length)
      .bind(outcome.headers)
      .bind(task_id)
      .execute(&self.pool)
      .await?;

    if result.rows_affected() == 0 {
      return Err(StoreError::NotFound(task_id));
    }
    Ok(())
  }

  async fn get_one(&self, task_id: Uuid) -> Result<TaskRecord, StoreError> {
    let row: Option<TaskRow> = sqlx::query_as(
      "SELECT task_id, task_status, status_code, headers, content_length FROM tasks WHERE task_id = $1",
    )
      .bind(task_id)
      .fetch_optional(&self.pool)
      .await?;

    row.ok_or(StoreError::NotFound(task_id))?.try_into()
  }
}
