use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use tokio::sync::Semaphore;

use crate::rate_limiter::DEFAULT_WINDOW;
use crate::worker_scheduler::MAX_CONCURRENT_EXTERNAL_REQUESTS;

#[derive(Debug, Clone)]
pub struct Config {
  pub database_url: String,
  pub rabbitmq_url: String,
  pub redis_url: String,
  pub server_port: u16,
  pub task_queue: String,
  pub worker_id: String,
  pub max_concurrent_external_requests: usize,
  pub rate_limit_window: Duration,
  pub shutdown_grace: Duration,
}

impl Config {
  pub fn from_env() -> Result<Self> {
    Self::from_lookup(|key| env::var(key).ok())
  }

  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
    let required = |key: &str| lookup(key).with_context(|| format!("{} must be set", key));
    let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.into());

    let max_concurrent_external_requests = parsed(
      &lookup,
      "MAX_CONCURRENT_EXTERNAL_REQUESTS",
      MAX_CONCURRENT_EXTERNAL_REQUESTS,
    )?;
    ensure!(
      (1..=Semaphore::MAX_PERMITS).contains(&max_concurrent_external_requests),
      "MAX_CONCURRENT_EXTERNAL_REQUESTS must be between 1 and {}, got {}",
      Semaphore::MAX_PERMITS,
      max_concurrent_external_requests
    );

    Ok(Self {
      database_url: required("DATABASE_URL")?,
      rabbitmq_url: required("RABBITMQ_URL")?,
      redis_url: text("REDIS_URL", "redis://127.0.0.1:6379/0"),
      server_port: parsed(&lookup, "SERVER_PORT", 8080)?,
      task_queue: text("TASK_QUEUE", "task_queue"),
      worker_id: text("WORKER_ID", "worker"),
      max_concurrent_external_requests,
      rate_limit_window: Duration::from_millis(parsed(
        &lookup,
        "RATE_LIMIT_WINDOW_MS",
        DEFAULT_WINDOW.as_millis() as u64,
      )?),
      shutdown_grace: Duration::from_secs(parsed(&lookup, "SHUTDOWN_GRACE_SECS", 30)?),
    })
  }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
  T: FromStr,
  T::Err: std::error::Error + Send + Sync + 'static,
{
  match lookup(key) {
    Some(raw) => raw.trim().parse().with_context(|| format!("{} has an invalid value {:?}", key, raw)),
    None => Ok(default),
  }
}
