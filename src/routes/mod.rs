use std::sync::Arc;

use warp::Filter;

use crate::orchestrator::TaskOrchestrator;

pub mod tasks;

pub fn routes(
  orchestrator: Arc<TaskOrchestrator>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
  tasks::submit_route(orchestrator.clone())
    .or(tasks::lookup_route(orchestrator))
}
