use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use reqdispatch::config::Config;
use reqdispatch::database::{PgTaskStore, setup_database};
use reqdispatch::http_client::ReqwestTransport;
use reqdispatch::messaging::{RabbitQueue, create_rabbit_channel, prefetch_for};
use reqdispatch::rate_limiter::{RedisTimestampStore, UrlRateLimiter, create_redis_connection};
use reqdispatch::worker_processing::TaskProcessor;
use reqdispatch::worker_scheduler::Worker;

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
  let redis_conn = create_redis_connection(&config.redis_url).await?;

  let limiter = UrlRateLimiter::with_window(RedisTimestampStore::new(redis_conn), config.rate_limit_window);
  let processor = TaskProcessor::new(
    Arc::new(PgTaskStore::new(db_pool)),
    Arc::new(limiter),
    Arc::new(ReqwestTransport::default()),
  );
  let worker = Worker::new(Arc::new(queue), processor, config.max_concurrent_external_requests);

  let shutdown = CancellationToken::new();
  let signal = shutdown.clone();
  tokio::spawn(async move {
    match tokio::signal::ctrl_c().await {
      Ok(()) => {
        info!("Shutdown requested");
        signal.cancel();
      }
      Err(e) => error!("Failed to listen for shutdown signal: {:?}", e),
    }
  });

  let consumed = worker.run(shutdown).await;
  if worker.drain(config.shutdown_grace).await {
    info!("All handlers finished");
  } else {
    warn!("Exiting with handlers still in flight");
  }
  consumed?;
  Ok(())
}
