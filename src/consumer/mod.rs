// src/consumer/mod.rs
// Per-message pipeline: transform, execute, reply, acknowledge

pub mod ack;
pub mod rpc;
pub mod transform;

use futures::StreamExt;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::command::{CommandFactory, Executor};
use crate::config::Config;
use crate::rabbitmq::{AmqpChannel, Delivery, RabbitMQError, Result};

pub use ack::{acknowledge, decide, AckAction, Decision};
pub use transform::{TransformError, Transformer};

pub struct Consumer<C: AmqpChannel, E: Executor> {
    channel: C,
    queue: String,
    consumer_tag: String,
    factory: CommandFactory,
    executor: E,
    transformer: Transformer,
    strict_exit_code: bool,
}

impl<C: AmqpChannel, E: Executor> Consumer<C, E> {
    pub fn new(channel: C, config: &Config, factory: CommandFactory, executor: E) -> Self {
        let consumer_tag = format!(
            "rabbitmq-cli-consumer-{}",
            &Uuid::new_v4().simple().to_string()[..8]
        );

        Self {
            channel,
            queue: config.rabbitmq.queue.clone(),
            consumer_tag,
            factory,
            executor,
            transformer: Transformer::new(
                config.features.include_metadata,
                config.rabbitmq.compression,
            ),
            strict_exit_code: config.features.strict_exit_code,
        }
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn consumer_tag(&self) -> &str {
        &self.consumer_tag
    }

    /// Processes deliveries one at a time until the stream fails or ends.
    ///
    /// Only returns on error: an ended stream means the broker went away.
    pub async fn consume(&self) -> Result<()> {
        info!("Registering consumer... ");
        let mut deliveries = self.channel.consume(&self.queue, &self.consumer_tag).await?;
        info!("Succeeded registering consumer.");
        info!("Waiting for messages...");

        while let Some(delivery) = deliveries.next().await {
            self.process_message(delivery?).await?;
        }

        Err(RabbitMQError::ConnectionClosed(
            "Delivery stream ended".to_string(),
        ))
    }

    /// Runs one delivery through the pipeline and settles it.
    ///
    /// Only a failed acknowledgment is returned as an error; everything else
    /// resolves to an acknowledgment action.
    pub async fn process_message(&self, delivery: Box<dyn Delivery>) -> Result<AckAction> {
        let payload = match self.transformer.transform(delivery.as_ref()) {
            Ok(payload) => payload,
            Err(e) => {
                error!("{}", e);
                return self.settle(delivery, AckAction::NackRequeue).await;
            }
        };

        let command = self.factory.create(&payload);
        let invocation = self.executor.execute(&command).await;

        let action = if delivery.is_rpc_message() && invocation.outcome.is_success() {
            match rpc::reply(&self.channel, delivery.as_ref(), &invocation.output).await {
                Ok(()) => AckAction::Ack,
                Err(e) => {
                    error!("Failed to send reply to \"{}\": {}", delivery.reply_to(), e);
                    AckAction::NackRequeue
                }
            }
        } else {
            let decision = decide(self.strict_exit_code, &invocation.outcome);
            if let Some(code) = decision.unexpected_exit_code {
                error!("Unexpected exit code {}", code);
            }
            decision.action
        };

        self.settle(delivery, action).await
    }

    async fn settle(&self, delivery: Box<dyn Delivery>, action: AckAction) -> Result<AckAction> {
        debug!(
            delivery_tag = delivery.info().delivery_tag,
            "Settling delivery with {}", action
        );
        acknowledge(delivery, action).await?;
        Ok(action)
    }
}
