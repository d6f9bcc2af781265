use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::errors::QueueError;

#[async_trait]
pub trait MessagePublisher: Send + Sync {
  /// Appends one opaque payload to the channel.
  async fn publish(&self, payload: &[u8]) -> Result<(), QueueError>;
}

#[async_trait]
pub trait MessageConsumer: Send + Sync {
  /// Streams published payloads, at least once each. The stream ends without
  /// error once `shutdown` is cancelled.
  async fn consume(&self, shutdown: CancellationToken) -> Result<BoxStream<'static, Vec<u8>>, QueueError>;
}

pub trait MessageQueue: MessagePublisher + MessageConsumer {}

impl<T: MessagePublisher + MessageConsumer> MessageQueue for T {}

/// In-process queue backed by an unbounded channel. Delivery is exactly the
/// publish order.
#[derive(Debug, Clone)]
pub struct MemoryQueue {
  tx: mpsc::UnboundedSender<Vec<u8>>,
  rx: Arc<Mutex<mpsc::UnboundedReceiver<Vec<u8>>>>,
  queued: Arc<AtomicUsize>,
}

impl MemoryQueue {
  pub fn new() -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self {
      tx,
      rx: Arc::new(Mutex::new(rx)),
      queued: Arc::new(AtomicUsize::new(0)),
    }
  }

  /// Messages published but not yet pulled by a consumer.
  pub fn pending(&self) -> usize {
    self.queued.load(Ordering::SeqCst)
  }
}

impl Default for MemoryQueue {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl MessagePublisher for MemoryQueue {
  async fn publish(&self, payload: &[u8]) -> Result<(), QueueError> {
    self.queued.fetch_add(1, Ordering::SeqCst);
    self.tx.send(payload.to_vec()).map_err(|_| {
      self.queued.fetch_sub(1, Ordering::SeqCst);
      QueueError::Closed
    })
  }
}

#[async_trait]
impl MessageConsumer for MemoryQueue {
  async fn consume(&self, shutdown: CancellationToken) -> Result<BoxStream<'static, Vec<u8>>, QueueError> {
    let state = (self.rx.clone(), self.queued.clone());
    let messages = stream::unfold(state, |(rx, queued)| async move {
      let payload = rx.lock().await.recv().await?;
      queued.fetch_sub(1, Ordering::SeqCst);
      Some((payload, (rx, queued)))
    });
    Ok(messages.take_until(shutdown.cancelled_owned()).boxed())
  }
}
