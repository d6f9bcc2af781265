//! Per-URL throttle for outbound calls.
//!
//! One timestamp is kept per exact URL string: the time of the last recorded
//! attempt. A URL is allowed again only once that timestamp is strictly older
//! than `now - window`, so at most one attempt per URL lands in any window no
//! matter how many tasks target it. Records never expire.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

use crate::errors::LimiterError;

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(1);

#[async_trait]
pub trait RateLimiter: Send + Sync {
  /// Whether an attempt against `url` may go out now.
  async fn allowed(&self, url: &Url) -> Result<bool, LimiterError>;

  /// Stamps `url` with the current time.
  async fn record(&self, url: &Url) -> Result<(), LimiterError>;
}

/// Key/value store holding the epoch-millisecond timestamp per key.
#[async_trait]
pub trait TimestampStore: Send + Sync {
  async fn get(&self, key: &str) -> Result<Option<i64>, LimiterError>;

  async fn set(&self, key: &str, millis: i64) -> Result<(), LimiterError>;
}

pub struct UrlRateLimiter<S> {
  store: S,
  window: Duration,
}

impl<S: TimestampStore> UrlRateLimiter<S> {
  pub fn new(store: S) -> Self {
    Self::with_window(store, DEFAULT_WINDOW)
  }

  pub fn with_window(store: S, window: Duration) -> Self {
    Self { store, window }
  }
}

fn now_millis() -> i64 {
  Utc::now().timestamp_millis()
}

#[async_trait]
impl<S: TimestampStore> RateLimiter for UrlRateLimiter<S> {
  async fn allowed(&self, url: &Url) -> Result<bool, LimiterError> {
    let Some(last) = self.store.get(url.as_str()).await? else {
      debug!("No previous attempt for {}", url);
      return Ok(true);
    };

    let window = i64::try_from(self.window.as_millis()).unwrap_or(i64::MAX);
    let allowed = last < now_millis().saturating_sub(window);
    if !allowed {
      debug!("Rate limit hit for {}", url);
    }
    Ok(allowed)
  }

  async fn record(&self, url: &Url) -> Result<(), LimiterError> {
    self.store.set(url.as_str(), now_millis()).await
  }
}

pub async fn create_redis_connection(redis_url: &str) -> anyhow::Result<MultiplexedConnection> {
  let client = redis::Client::open(redis_url).context("Invalid Redis URL")?;
  let conn = client
    .get_multiplexed_async_connection()
    .await
    .context("Failed to connect to Redis")?;
  info!("Redis connection established");
  Ok(conn)
}

/// Timestamps as plain Redis strings, written with `SET` and no TTL.
#[derive(Clone)]
pub struct RedisTimestampStore {
  conn: MultiplexedConnection,
}

impl RedisTimestampStore {
  pub fn new(conn: MultiplexedConnection) -> Self {
    Self { conn }
  }
}

#[async_trait]
impl TimestampStore for RedisTimestampStore {
  async fn get(&self, key: &str) -> Result<Option<i64>, LimiterError> {
    let mut conn = self.conn.clone();
    let millis: Option<i64> = conn.get(key).await?;
    Ok(millis)
  }

  async fn set(&self, key: &str, millis: i64) -> Result<(), LimiterError> {
    let mut conn = self.conn.clone();
    let _: () = conn.set(key, millis).await?;
    Ok(())
  }
}

#[derive(Debug, Default)]
pub struct MemoryTimestampStore {
  entries: Mutex<HashMap<String, i64>>,
}

impl MemoryTimestampStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl TimestampStore for MemoryTimestampStore {
  async fn get(&self, key: &str) -> Result<Option<i64>, LimiterError> {
    Ok(self.entries.lock().await.get(key).copied())
  }

  async fn set(&self, key: &str, millis: i64) -> Result<(), LimiterError> {
    self.entries.lock().await.insert(key.to_string(), millis);
    Ok(())
  }
}
