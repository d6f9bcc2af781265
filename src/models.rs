use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

/// Header name to every value sent or received under that name.
pub type HeaderValues = BTreeMap<String, Vec<String>>;

/// Verbs accepted at ingestion, already upper-cased.
pub const HTTP_METHODS: [&str; 9] = [
  "GET", "HEAD", "POST", "PUT", "PATCH", "DELETE", "CONNECT", "OPTIONS", "TRACE",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
  New,
  /// The outbound call was never made because the URL was rate limited.
  ReqError,
  Done,
  Error,
}

impl TaskStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      TaskStatus::New => "new",
      TaskStatus::ReqError => "reqerror",
      TaskStatus::Done => "done",
      TaskStatus::Error => "error",
    }
  }

  pub fn is_terminal(&self) -> bool {
    !matches!(self, TaskStatus::New)
  }
}

impl fmt::Display for TaskStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for TaskStatus {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "new" => Ok(TaskStatus::New),
      "reqerror" => Ok(TaskStatus::ReqError),
      "done" => Ok(TaskStatus::Done),
      "error" => Ok(TaskStatus::Error),
      other => Err(format!("unknown task status {:?}", other)),
    }
  }
}

/// A task as persisted, together with the outcome of its outbound call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
  pub task_id: Uuid,
  pub task_status: TaskStatus,
  pub status_code: Option<i32>,
  pub headers: Option<serde_json::Value>,
  pub content_length: Option<i64>,
}

impl TaskRecord {
  pub fn new(task_id: Uuid, task_status: TaskStatus) -> Self {
    Self {
      task_id,
      task_status,
      status_code: None,
      headers: None,
      content_length: None,
    }
  }
}

/// Terminal status plus response metadata, written in one `add_outcome` call.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
  pub task_status: TaskStatus,
  pub status_code: Option<i32>,
  pub content_length: Option<i64>,
  pub headers: Option<serde_json::Value>,
}

impl TaskOutcome {
  /// Outcome for a call that never produced a response.
  pub fn transport_failure() -> Self {
    Self {
      task_status: TaskStatus::Error,
      status_code: None,
      content_length: None,
      headers: None,
    }
  }
}

/// Queue payload shared by the orchestrator and the dispatch worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMessage {
  pub task_id: Uuid,
  pub method: String,
  pub url: Url,
  #[serde(default)]
  pub headers: HeaderValues,
}

impl TaskMessage {
  pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(self)
  }

  pub fn from_bytes(payload: &[u8]) -> serde_json::Result<Self> {
    serde_json::from_slice(payload)
  }
}
