use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use reqdispatch::config::Config;
use reqdispatch::database::{PgTaskStore, setup_database};
use reqdispatch::messaging::{RabbitQueue, create_rabbit_channel, prefetch_for};
use reqdispatch::orchestrator::TaskOrchestrator;
use reqdispatch::routes::routes;

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt::init();
  let config = Config::from_env()?;
  let db_pool = setup_database(&config.database_url).await?;
  let rabbit_channel = create_rabbit_channel(&config.rabbitmq_url).await?;
  let queue = RabbitQueue::declare(
    rabbit_channel,
    &config.task_queue,
    &config.worker_id,
    prefetch_for(config.max_concurrent_external_requests),
  )
    .await?;

  let orchestrator = Arc::new(TaskOrchestrator::new(
    Arc::new(PgTaskStore::new(db_pool)),
    Arc::new(queue),
  ));

  let (addr, server) = warp::serve(routes(orchestrator))
    .bind_with_graceful_shutdown(([0, 0, 0, 0], config.server_port), async {
      let _ = tokio::signal::ctrl_c().await;
      info!("Shutdown requested");
    });
  info!("API listening on {}", addr);
  server.await;
  Ok(())
}
