// src/rabbitmq/delivery.rs
// Narrow view of an inbound delivery so the pipeline never touches lapin types

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lapin::{
    options::{BasicAckOptions, BasicNackOptions, BasicRejectOptions},
    types::{AMQPValue, FieldTable, ShortString},
    BasicProperties,
};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use super::errors::{RabbitMQError, Result};

/// Broker-assigned message properties, flattened to plain values.
///
/// Absent properties are rendered as empty strings or zero. A missing
/// timestamp serializes as `0001-01-01T00:00:00Z` and missing headers as
/// `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MessageProperties {
    pub application_headers: Option<Map<String, Value>>,
    pub content_type: String,
    pub content_encoding: String,
    pub delivery_mode: u8,
    pub priority: u8,
    pub correlation_id: String,
    pub reply_to: String,
    pub expiration: String,
    pub message_id: String,
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(rename = "type")]
    pub kind: String,
    pub user_id: String,
    pub app_id: String,
}

/// Routing and delivery metadata of a single delivery.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeliveryInfo {
    pub consumer_tag: String,
    pub delivery_tag: u64,
    pub redelivered: bool,
    pub exchange: String,
    pub routing_key: String,
    /// Only meaningful for basic.get; always 0 for consumed deliveries.
    pub message_count: u32,
}

/// Rendering of an absent timestamp.
pub const ZERO_TIMESTAMP: &str = "0001-01-01T00:00:00Z";

fn serialize_timestamp<S>(
    timestamp: &Option<DateTime<Utc>>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match timestamp {
        Some(timestamp) => timestamp.serialize(serializer),
        None => serializer.serialize_str(ZERO_TIMESTAMP),
    }
}

/// One inbound message. Every acknowledgment consumes the delivery, so it
/// can be settled exactly once.
#[async_trait]
pub trait Delivery: Send + Sync {
    fn body(&self) -> &[u8];

    fn properties(&self) -> &MessageProperties;

    fn info(&self) -> &DeliveryInfo;

    fn reply_to(&self) -> &str {
        &self.properties().reply_to
    }

    fn correlation_id(&self) -> &str {
        &self.properties().correlation_id
    }

    /// A request expecting a reply carries both reply-to and correlation id.
    fn is_rpc_message(&self) -> bool {
        !self.reply_to().is_empty() && !self.correlation_id().is_empty()
    }

    async fn ack(self: Box<Self>, multiple: bool) -> Result<()>;

    async fn nack(self: Box<Self>, multiple: bool, requeue: bool) -> Result<()>;

    async fn reject(self: Box<Self>, requeue: bool) -> Result<()>;
}

pub struct LapinDelivery {
    delivery: lapin::message::Delivery,
    properties: MessageProperties,
    info: DeliveryInfo,
}

impl LapinDelivery {
    pub fn new(delivery: lapin::message::Delivery, consumer_tag: &str) -> Self {
        let properties = MessageProperties::from(&delivery.properties);
        let info = DeliveryInfo {
            consumer_tag: consumer_tag.to_string(),
            delivery_tag: delivery.delivery_tag,
            redelivered: delivery.redelivered,
            exchange: delivery.exchange.as_str().to_string(),
            routing_key: delivery.routing_key.as_str().to_string(),
            message_count: 0,
        };

        Self {
            delivery,
            properties,
            info,
        }
    }
}

#[async_trait]
impl Delivery for LapinDelivery {
    fn body(&self) -> &[u8] {
        &self.delivery.data
    }

    fn properties(&self) -> &MessageProperties {
        &self.properties
    }

    fn info(&self) -> &DeliveryInfo {
        &self.info
    }

    async fn ack(self: Box<Self>, multiple: bool) -> Result<()> {
        self.delivery
            .acker
            .ack(BasicAckOptions { multiple })
            .await
            .map(|_| ())
            .map_err(|e| RabbitMQError::AckError(e.to_string()))
    }

    async fn nack(self: Box<Self>, multiple: bool, requeue: bool) -> Result<()> {
        self.delivery
            .acker
            .nack(BasicNackOptions { multiple, requeue })
            .await
            .map(|_| ())
            .map_err(|e| RabbitMQError::AckError(e.to_string()))
    }

    async fn reject(self: Box<Self>, requeue: bool) -> Result<()> {
        self.delivery
            .acker
            .reject(BasicRejectOptions { requeue })
            .await
            .map(|_| ())
            .map_err(|e| RabbitMQError::AckError(e.to_string()))
    }
}

impl From<&BasicProperties> for MessageProperties {
    fn from(properties: &BasicProperties) -> Self {
        Self {
            application_headers: properties
                .headers()
                .as_ref()
                .map(field_table_to_json),
            content_type: short_string(properties.content_type()),
            content_encoding: short_string(properties.content_encoding()),
            delivery_mode: properties.delivery_mode().unwrap_or_default(),
            priority: properties.priority().unwrap_or_default(),
            correlation_id: short_string(properties.correlation_id()),
            reply_to: short_string(properties.reply_to()),
            expiration: short_string(properties.expiration()),
            message_id: short_string(properties.message_id()),
            timestamp: properties
                .timestamp()
                .and_then(|secs| DateTime::<Utc>::from_timestamp(secs as i64, 0)),
            kind: short_string(properties.kind()),
            user_id: short_string(properties.user_id()),
            app_id: short_string(properties.app_id()),
        }
    }
}

fn short_string(value: &Option<ShortString>) -> String {
    value
        .as_ref()
        .map(|s| s.as_str().to_string())
        .unwrap_or_default()
}

/// Renders an AMQP table as a plain JSON object.
pub fn field_table_to_json(table: &FieldTable) -> Map<String, Value> {
    table
        .inner()
        .iter()
        .map(|(key, value)| (key.as_str().to_string(), amqp_value_to_json(value)))
        .collect()
}

fn amqp_value_to_json(value: &AMQPValue) -> Value {
    match value {
        AMQPValue::Boolean(v) => Value::from(*v),
        AMQPValue::ShortShortInt(v) => Value::from(*v),
        AMQPValue::ShortShortUInt(v) => Value::from(*v),
        AMQPValue::ShortInt(v) => Value::from(*v),
        AMQPValue::ShortUInt(v) => Value::from(*v),
        AMQPValue::LongInt(v) => Value::from(*v),
        AMQPValue::LongUInt(v) => Value::from(*v),
        AMQPValue::LongLongInt(v) => Value::from(*v),
        AMQPValue::Float(v) => Value::from(*v),
        AMQPValue::Double(v) => Value::from(*v),
        AMQPValue::Timestamp(v) => Value::from(*v),
        AMQPValue::ShortString(v) => Value::from(v.as_str()),
        AMQPValue::LongString(v) => Value::from(String::from_utf8_lossy(v.as_bytes()).into_owned()),
        AMQPValue::FieldTable(v) => Value::Object(field_table_to_json(v)),
        AMQPValue::FieldArray(v) => Value::Array(v.as_slice().iter().map(amqp_value_to_json).collect()),
        AMQPValue::Void => Value::Null,
        other => serde_json::to_value(other).unwrap_or(Value::Null),
    }
}
