#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use http::HeaderMap;
use tokio::sync::Semaphore;
use uuid::Uuid;

use reqdispatch::errors::{QueueError, StoreError, TransportError};
use reqdispatch::http_client::{HttpTransport, OutboundRequest, OutboundResponse};
use reqdispatch::models::{HeaderValues, TaskOutcome, TaskRecord, TaskStatus};
use reqdispatch::orchestrator::NewTask;
use reqdispatch::queue::MessagePublisher;
use reqdispatch::rate_limiter::{MemoryTimestampStore, RateLimiter, UrlRateLimiter};
use reqdispatch::task_store::{MemoryTaskStore, TaskStore};
use reqdispatch::worker_processing::TaskProcessor;

pub fn new_task(method: &str, url: &str) -> NewTask {
  NewTask {
    method: method.into(),
    url: url.into(),
    headers: HeaderValues::new(),
  }
}

pub fn memory_limiter() -> Arc<dyn RateLimiter> {
  Arc::new(UrlRateLimiter::new(MemoryTimestampStore::new()))
}

pub fn processor(
  store: Arc<dyn TaskStore>,
  limiter: Arc<dyn RateLimiter>,
  transport: Arc<dyn HttpTransport>,
) -> TaskProcessor {
  TaskProcessor::new(store, limiter, transport)
}

/// Polls until every task has left `new`.
pub async fn wait_for_terminal(store: &MemoryTaskStore, ids: &[Uuid]) -> Vec<TaskRecord> {
  tokio::time::timeout(Duration::from_secs(10), async {
    loop {
      let mut records = Vec::with_capacity(ids.len());
      for id in ids {
        records.push(store.get_one(*id).await.unwrap());
      }
      if records.iter().all(|r| r.task_status.is_terminal()) {
        return records;
      }
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
  })
    .await
    .expect("tasks did not finish in time")
}

pub async fn wait_until(mut condition: impl FnMut() -> bool) {
  tokio::time::timeout(Duration::from_secs(10), async {
    while !condition() {
      tokio::time::sleep(Duration::from_millis(5)).await;
    }
  })
    .await
    .expect("condition not reached in time")
}

enum Behaviour {
  Respond(u16),
  Fail,
  Panic,
}

/// Transport that never touches the network and counts concurrent calls.
pub struct FakeTransport {
  behaviour: Behaviour,
  delay: Duration,
  gate: Semaphore,
  calls: AtomicUsize,
  in_flight: AtomicUsize,
  peak: AtomicUsize,
}

impl FakeTransport {
  fn with_behaviour(behaviour: Behaviour) -> Self {
    Self {
      behaviour,
      delay: Duration::ZERO,
      gate: Semaphore::new(Semaphore::MAX_PERMITS),
      calls: AtomicUsize::new(0),
      in_flight: AtomicUsize::new(0),
      peak: AtomicUsize::new(0),
    }
  }

  pub fn responding(status: u16) -> Self {
    Self::with_behaviour(Behaviour::Respond(status))
  }

  pub fn failing() -> Self {
    Self::with_behaviour(Behaviour::Fail)
  }

  pub fn panicking() -> Self {
    Self::with_behaviour(Behaviour::Panic)
  }

  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = delay;
    self
  }

  /// Holds every call until [`FakeTransport::open`].
  pub fn gated(mut self) -> Self {
    self.gate = Semaphore::new(0);
    self
  }

  pub fn open(&self) {
    self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  pub fn in_flight(&self) -> usize {
    self.in_flight.load(Ordering::SeqCst)
  }

  pub fn peak(&self) -> usize {
    self.peak.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl HttpTransport for FakeTransport {
  async fn execute(&self, _request: OutboundRequest) -> Result<OutboundResponse, TransportError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    if matches!(self.behaviour, Behaviour::Panic) {
      panic!("transport blew up");
    }

    let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    self.peak.fetch_max(current, Ordering::SeqCst);

    let permit = self.gate.acquire().await;
    tokio::time::sleep(self.delay).await;
    drop(permit);
    self.in_flight.fetch_sub(1, Ordering::SeqCst);

    match self.behaviour {
      Behaviour::Respond(status) => Ok(OutboundResponse {
        status,
        content_length: Some(0),
        headers: HeaderMap::new(),
      }),
      Behaviour::Fail => Err(TransportError::Other("connection refused".into())),
      Behaviour::Panic => unreachable!(),
    }
  }
}

/// Store whose every call fails.
pub struct FailingStore;

#[async_trait]
impl TaskStore for FailingStore {
  async fn create_with_status(&self, _status: TaskStatus) -> Result<TaskRecord, StoreError> {
    Err(StoreError::Corrupt("store offline".into()))
  }

  async fn update_status(&self, _task_id: Uuid, _status: TaskStatus) -> Result<(), StoreError> {
    Err(StoreError::Corrupt("store offline".into()))
  }

  async fn add_outcome(&self, _task_id: Uuid, _outcome: TaskOutcome) -> Result<(), StoreError> {
    Err(StoreError::Corrupt("store offline".into()))
  }

  async fn get_one(&self, _task_id: Uuid) -> Result<TaskRecord, StoreError> {
    Err(StoreError::Corrupt("store offline".into()))
  }
}

/// Publisher that refuses every message.
pub struct ClosedPublisher;

#[async_trait]
impl MessagePublisher for ClosedPublisher {
  async fn publish(&self, _payload: &[u8]) -> Result<(), QueueError> {
    Err(QueueError::Closed)
  }
}
