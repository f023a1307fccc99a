// src/rabbitmq/topology.rs

use tracing::{debug, info};

use super::channel::AmqpChannel;
use super::errors::Result;
use crate::config::Config;

/// Prepares the channel for consuming: QoS, then the queue, then the
/// exchange and its binding. Stops at the first failure.
pub async fn initialize<C>(channel: &C, config: &Config) -> Result<()>
where
    C: AmqpChannel + ?Sized,
{
    info!("Setting QoS... ");
    channel
        .set_qos(config.prefetch.count, config.prefetch.global)
        .await?;
    info!("Succeeded setting QoS.");

    let queue = &config.rabbitmq.queue;
    info!("Declaring queue \"{}\"...", queue);
    channel
        .declare_queue(queue, config.queue_declare_options(), config.queue_arguments())
        .await?;

    let exchange = &config.exchange;
    if exchange.name.is_empty() {
        debug!("No exchange configured, publishing goes through the default exchange");
        return Ok(());
    }

    info!("Declaring exchange \"{}\"...", exchange.name);
    channel
        .declare_exchange(&exchange.name, &exchange.kind, exchange.durable, exchange.autodelete)
        .await?;

    info!(
        "Binding queue \"{}\" to exchange \"{}\"...",
        queue, exchange.name
    );
    channel
        .bind_queue(queue, &config.queue_settings.routing_key, &exchange.name)
        .await?;

    Ok(())
}
