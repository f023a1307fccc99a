// src/consumer/rpc.rs

use lapin::BasicProperties;
use tracing::info;

use crate::rabbitmq::{AmqpChannel, Delivery, Result};

pub const REPLY_CONTENT_TYPE: &str = "text/plain";

/// Publishes the command output to the requester's reply queue through the
/// default exchange, echoing its correlation id.
pub async fn reply<C>(channel: &C, delivery: &dyn Delivery, output: &[u8]) -> Result<()>
where
    C: AmqpChannel + ?Sized,
{
    let properties = BasicProperties::default()
        .with_content_type(REPLY_CONTENT_TYPE.into())
        .with_correlation_id(delivery.correlation_id().into());

    channel
        .publish("", delivery.reply_to(), properties, output)
        .await?;
    info!("Sent reply to \"{}\"", delivery.reply_to());

    Ok(())
}
