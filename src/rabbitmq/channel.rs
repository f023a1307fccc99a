// src/rabbitmq/channel.rs

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use lapin::{
    options::{
        BasicConsumeOptions, BasicPublishOptions, BasicQosOptions, ExchangeDeclareOptions,
        QueueBindOptions, QueueDeclareOptions,
    },
    types::FieldTable,
    BasicProperties, Channel, ExchangeKind,
};
use tracing::debug;

use super::delivery::{Delivery, LapinDelivery};
use super::errors::{RabbitMQError, Result};

pub type DeliveryStream = BoxStream<'static, Result<Box<dyn Delivery>>>;

/// The broker operations the worker needs from a channel.
#[async_trait]
pub trait AmqpChannel: Send + Sync {
    /// Prefetch size is always 0 (no byte limit).
    async fn set_qos(&self, prefetch_count: u16, global: bool) -> Result<()>;

    async fn declare_queue(
        &self,
        name: &str,
        options: QueueDeclareOptions,
        arguments: FieldTable,
    ) -> Result<()>;

    async fn declare_exchange(
        &self,
        name: &str,
        kind: &str,
        durable: bool,
        auto_delete: bool,
    ) -> Result<()>;

    async fn bind_queue(&self, queue: &str, routing_key: &str, exchange: &str) -> Result<()>;

    /// Registers a manually acknowledged, non-exclusive consumer.
    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream>;

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        properties: BasicProperties,
        body: &[u8],
    ) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

pub struct LapinChannel {
    channel: Channel,
}

impl LapinChannel {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }

    pub fn is_connected(&self) -> bool {
        self.channel.status().connected()
    }
}

#[async_trait]
impl AmqpChannel for LapinChannel {
    async fn set_qos(&self, prefetch_count: u16, global: bool) -> Result<()> {
        self.channel
            .basic_qos(prefetch_count, BasicQosOptions { global })
            .await
            .map_err(|e| RabbitMQError::QosError(e.to_string()))
    }

    async fn declare_queue(
        &self,
        name: &str,
        options: QueueDeclareOptions,
        arguments: FieldTable,
    ) -> Result<()> {
        let queue = self
            .channel
            .queue_declare(name, options, arguments)
            .await
            .map_err(|e| RabbitMQError::QueueDeclareError(e.to_string()))?;

        debug!(
            queue = name,
            messages = queue.message_count(),
            consumers = queue.consumer_count(),
            "Queue declared"
        );
        Ok(())
    }

    async fn declare_exchange(
        &self,
        name: &str,
        kind: &str,
        durable: bool,
        auto_delete: bool,
    ) -> Result<()> {
        self.channel
            .exchange_declare(
                name,
                exchange_kind(kind),
                ExchangeDeclareOptions {
                    durable,
                    auto_delete,
                    ..ExchangeDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| RabbitMQError::ExchangeDeclareError(e.to_string()))
    }

    async fn bind_queue(&self, queue: &str, routing_key: &str, exchange: &str) -> Result<()> {
        self.channel
            .queue_bind(
                queue,
                exchange,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| RabbitMQError::QueueBindError(e.to_string()))
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions {
                    no_local: false,
                    no_ack: false,
                    exclusive: false,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| RabbitMQError::ConsumeError(e.to_string()))?;

        let consumer_tag = consumer_tag.to_string();
        let deliveries = consumer.map(move |delivery| {
            delivery
                .map(|delivery| Box::new(LapinDelivery::new(delivery, &consumer_tag)) as Box<dyn Delivery>)
                .map_err(|e| RabbitMQError::ConnectionClosed(e.to_string()))
        });

        Ok(deliveries.boxed())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        properties: BasicProperties,
        body: &[u8],
    ) -> Result<()> {
        self.channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                body,
                properties,
            )
            .await
            .map_err(|e| RabbitMQError::PublishError(e.to_string()))?
            .await
            .map_err(|e| RabbitMQError::PublishError(e.to_string()))?;

        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.is_connected() {
            self.channel
                .close(200, "Closing consumer")
                .await
                .map_err(|e| RabbitMQError::ChannelError(e.to_string()))?;
        }
        Ok(())
    }
}

fn exchange_kind(kind: &str) -> ExchangeKind {
    match kind {
        "direct" => ExchangeKind::Direct,
        "fanout" => ExchangeKind::Fanout,
        "headers" => ExchangeKind::Headers,
        "topic" => ExchangeKind::Topic,
        other => ExchangeKind::Custom(other.to_string()),
    }
}
