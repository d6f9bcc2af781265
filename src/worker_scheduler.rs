use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use crate::errors::QueueError;
use crate::queue::MessageConsumer;
use crate::worker_processing::TaskProcessor;

/// Default ceiling on outbound calls in flight at once.
pub const MAX_CONCURRENT_EXTERNAL_REQUESTS: usize = 1000;

/// Drains the queue, running each message on its own task.
///
/// A slot is taken from a fixed pool before a handler is spawned. When every
/// slot is busy the loop waits for one and stops pulling from the queue, so
/// saturation pushes back on the broker instead of piling up in memory.
pub struct Worker {
  consumer: Arc<dyn MessageConsumer>,
  processor: TaskProcessor,
  slots: Arc<Semaphore>,
  capacity: usize,
  tracker: TaskTracker,
}

impl Worker {
  /// `max_concurrent` is clamped to `1..=Semaphore::MAX_PERMITS`; configured
  /// values are range-checked by [`crate::config::Config`] first.
  pub fn new(consumer: Arc<dyn MessageConsumer>, processor: TaskProcessor, max_concurrent: usize) -> Self {
    let capacity = max_concurrent.clamp(1, Semaphore::MAX_PERMITS);
    if capacity != max_concurrent {
      warn!("Slot pool size {} out of range, using {}", max_concurrent, capacity);
    }
    Self {
      consumer,
      processor,
      slots: Arc::new(Semaphore::new(capacity)),
      capacity,
      tracker: TaskTracker::new(),
    }
  }

  /// Handlers currently holding a slot.
  pub fn in_flight(&self) -> usize {
    self.capacity - self.slots.available_permits()
  }

  /// Consumes until `shutdown` fires. Handlers already spawned keep running;
  /// see [`Worker::drain`].
  ///
  /// A stream that ends without cancellation means the broker went away, and
  /// is reported as [`QueueError::Closed`].
  pub async fn run(&self, shutdown: CancellationToken) -> Result<(), QueueError> {
    let mut messages = self.consumer.consume(shutdown.clone()).await?;
    info!("Worker started with {} slots", self.capacity);

    loop {
      let payload = tokio::select! {
        biased;
        _ = shutdown.cancelled() => break,
        next = messages.next() => match next {
          Some(payload) => payload,
          None if shutdown.is_cancelled() => break,
          None => {
            error!("Queue stream ended unexpectedly; {} handlers in flight", self.in_flight());
            return Err(QueueError::Closed);
          }
        },
      };

      // Waits while the pool is exhausted. The message is already off the
      // queue, so it is handled even if shutdown fires meanwhile.
      let Ok(permit) = self.slots.clone().acquire_owned().await else {
        break;
      };

      let processor = self.processor.clone();
      self.tracker.spawn(async move {
        let _permit = permit;
        processor.process(&payload).await;
      });
    }

    info!("Worker stopped consuming; {} handlers in flight", self.in_flight());
    Ok(())
  }

  /// Waits up to `grace` for spawned handlers. Returns whether all finished.
  pub async fn drain(&self, grace: Duration) -> bool {
    self.tracker.close();
    match tokio::time::timeout(grace, self.tracker.wait()).await {
      Ok(()) => true,
      Err(_) => {
        warn!("{} handlers still running after {:?}", self.tracker.len(), grace);
        false
      }
    }
  }
}
