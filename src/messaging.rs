use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use lapin::options::{BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use tokio_retry::Retry;
use tokio_retry::strategy::ExponentialBackoff;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use anyhow::Result;

use crate::errors::QueueError;
use crate::queue::{MessageConsumer, MessagePublisher};

static MAX_RETRIES: usize = 5;
static DELAY: u64 = 100;
const PERSISTENT: u8 = 2;

pub async fn create_rabbit_channel(rabbitmq_url: &str) -> Result<Channel> {
  let conn = Retry::spawn(ExponentialBackoff::from_millis(DELAY).take(MAX_RETRIES), || {
    Connection::connect(rabbitmq_url, ConnectionProperties::default())
  })
    .await?;
  let channel = conn.create_channel().await?;
  info!("RabbitMQ channel created");
  Ok(channel)
}

/// Unacked deliveries the broker may push ahead of the consume loop. AMQP
/// reads a prefetch of 0 as unlimited, so the floor is 1.
pub fn prefetch_for(max_concurrent: usize) -> u16 {
  u16::try_from(max_concurrent.max(1)).unwrap_or(u16::MAX)
}

/// Durable RabbitMQ queue. Deliveries are acknowledged as soon as they are
/// handed to the consumer stream, and the channel prefetch caps how many the
/// broker sends before those acks, so a stalled loop stops the flow.
#[derive(Clone)]
pub struct RabbitQueue {
  channel: Channel,
  queue: String,
  consumer_tag: String,
}

impl RabbitQueue {
  pub async fn declare(channel: Channel, queue: &str, consumer_tag: &str, prefetch: u16) -> Result<Self, QueueError> {
    channel
      .queue_declare(queue, QueueDeclareOptions { durable: true, ..Default::default() }, FieldTable::default())
      .await?;
    channel.basic_qos(prefetch.max(1), BasicQosOptions::default()).await?;
    info!("Queue {} declared with prefetch {}", queue, prefetch.max(1));
    Ok(Self {
      channel,
      queue: queue.to_string(),
      consumer_tag: consumer_tag.to_string(),
    })
  }
}

#[async_trait]
impl MessagePublisher for RabbitQueue {
  async fn publish(&self, payload: &[u8]) -> Result<(), QueueError> {
    Retry::spawn(ExponentialBackoff::from_millis(DELAY).take(MAX_RETRIES), || async {
      self.channel
        .basic_publish(
          "",
          &self.queue,
          BasicPublishOptions::default(),
          payload,
          BasicProperties::default().with_delivery_mode(PERSISTENT),
        )
        .await?
        .await
    })
      .await?;
    debug!("Published {} bytes to {}", payload.len(), self.queue);
    Ok(())
  }
}

#[async_trait]
impl MessageConsumer for RabbitQueue {
  async fn consume(&self, shutdown: CancellationToken) -> Result<BoxStream<'static, Vec<u8>>, QueueError> {
    let consumer = self.channel
      .basic_consume(&self.queue, &self.consumer_tag, BasicConsumeOptions::default(), FieldTable::default())
      .await?;
    info!("Consuming from {} as {}", self.queue, self.consumer_tag);

    let deliveries = consumer
      .take_until(shutdown.cancelled_owned())
      .filter_map(|delivery| async move {
        match delivery {
          Ok(delivery) => {
            if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
              error!("Failed to ack delivery {}: {:?}", delivery.delivery_tag, e);
            }
            Some(delivery.data)
          }
          Err(e) => {
            error!("Consumer error: {:?}", e);
            None
          }
        }
      });
    Ok(deliveries.boxed())
  }
}
