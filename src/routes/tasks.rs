use std::convert::Infallible;
use std::sync::Arc;

use serde::Serialize;
use tracing::error;
use uuid::Uuid;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Reply};

use crate::errors::TaskError;
use crate::orchestrator::{NewTask, TaskOrchestrator};

const MAX_BODY_BYTES: u64 = 64 * 1024;

#[derive(Debug, Serialize)]
struct ErrMsg {
  err: String,
}

fn err_reply(message: String, status: StatusCode) -> Response {
  warp::reply::with_status(warp::reply::json(&ErrMsg { err: message }), status).into_response()
}

fn task_error_reply(e: &TaskError) -> Response {
  let status = match e {
    _ if e.is_validation() => StatusCode::BAD_REQUEST,
    TaskError::NotFound(_) => StatusCode::NOT_FOUND,
    _ => StatusCode::INTERNAL_SERVER_ERROR,
  };
  err_reply(e.to_string(), status)
}

fn with_orchestrator(
  orchestrator: Arc<TaskOrchestrator>,
) -> impl Filter<Extract = (Arc<TaskOrchestrator>,), Error = Infallible> + Clone {
  warp::any().map(move || orchestrator.clone())
}

pub fn submit_route(
  orchestrator: Arc<TaskOrchestrator>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
  warp::path!("api" / "v1" / "task")
    .and(warp::post())
    .and(warp::body::content_length_limit(MAX_BODY_BYTES))
    .and(warp::body::json())
    .and(with_orchestrator(orchestrator))
    .and_then(handle_submit_task)
}

pub fn lookup_route(
  orchestrator: Arc<TaskOrchestrator>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
  warp::path!("api" / "v1" / "task" / String)
    .and(warp::get())
    .and(with_orchestrator(orchestrator))
    .and_then(handle_lookup_task)
}

async fn handle_submit_task(new_task: NewTask, orchestrator: Arc<TaskOrchestrator>) -> Result<Response, Infallible> {
  match orchestrator.handle(new_task).await {
    Ok(accepted) => Ok(warp::reply::json(&accepted).into_response()),
    Err(e) => {
      error!("Task submission failed: {}", e);
      Ok(task_error_reply(&e))
    }
  }
}

async fn handle_lookup_task(task_id: String, orchestrator: Arc<TaskOrchestrator>) -> Result<Response, Infallible> {
  let task_id = match Uuid::parse_str(&task_id) {
    Ok(task_id) => task_id,
    Err(e) => return Ok(err_reply(format!("failed to parse task id. err: {}", e), StatusCode::BAD_REQUEST)),
  };

  match orchestrator.get_by_id(task_id).await {
    Ok(task) => Ok(warp::reply::json(&task).into_response()),
    Err(e) => {
      if !matches!(e, TaskError::NotFound(_)) {
        error!("Task lookup failed for {}: {}", task_id, e);
      }
      Ok(task_error_reply(&e))
    }
  }
}
