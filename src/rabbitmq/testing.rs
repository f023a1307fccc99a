// src/rabbitmq/testing.rs
// In-memory channel and delivery that record every broker call in order

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use lapin::{options::QueueDeclareOptions, types::FieldTable, BasicProperties};

use super::channel::{AmqpChannel, DeliveryStream};
use super::delivery::{Delivery, DeliveryInfo, MessageProperties};
use super::errors::{RabbitMQError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    SetQos {
        prefetch_count: u16,
        global: bool,
    },
    DeclareQueue {
        name: String,
        durable: bool,
        auto_delete: bool,
        exclusive: bool,
        nowait: bool,
        arguments: FieldTable,
    },
    DeclareExchange {
        name: String,
        kind: String,
        durable: bool,
        auto_delete: bool,
    },
    BindQueue {
        queue: String,
        routing_key: String,
        exchange: String,
    },
    Consume {
        queue: String,
    },
    Publish {
        exchange: String,
        routing_key: String,
        content_type: String,
        correlation_id: String,
        body: Vec<u8>,
    },
    Execute {
        args: Vec<String>,
    },
    Ack {
        delivery_tag: u64,
        multiple: bool,
    },
    Nack {
        delivery_tag: u64,
        multiple: bool,
        requeue: bool,
    },
    Reject {
        delivery_tag: u64,
        requeue: bool,
    },
    Close,
}

pub type CallLog = Arc<Mutex<Vec<Call>>>;

pub fn new_call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

fn record(calls: &CallLog, call: Call) {
    calls.lock().unwrap().push(call);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Qos,
    DeclareQueue,
    DeclareExchange,
    BindQueue,
    Consume,
    Publish,
}

pub struct RecordingChannel {
    calls: CallLog,
    failing: Option<Op>,
    deliveries: Mutex<Vec<Result<Box<dyn Delivery>>>>,
}

impl RecordingChannel {
    pub fn new(calls: &CallLog) -> Self {
        Self {
            calls: calls.clone(),
            failing: None,
            deliveries: Mutex::new(Vec::new()),
        }
    }

    /// Makes `op` return an error after recording the call.
    pub fn failing(mut self, op: Op) -> Self {
        self.failing = Some(op);
        self
    }

    pub fn with_deliveries(self, deliveries: Vec<Box<dyn Delivery>>) -> Self {
        self.with_stream(deliveries.into_iter().map(Ok).collect())
    }

    /// Stream items as yielded by the consumer, errors included.
    pub fn with_stream(self, items: Vec<Result<Box<dyn Delivery>>>) -> Self {
        *self.deliveries.lock().unwrap() = items;
        self
    }

    fn check(&self, op: Op, error: fn(String) -> RabbitMQError) -> Result<()> {
        if self.failing == Some(op) {
            Err(error("Error occurred".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl AmqpChannel for RecordingChannel {
    async fn set_qos(&self, prefetch_count: u16, global: bool) -> Result<()> {
        record(&self.calls, Call::SetQos { prefetch_count, global });
        self.check(Op::Qos, RabbitMQError::QosError)
    }

    async fn declare_queue(
        &self,
        name: &str,
        options: QueueDeclareOptions,
        arguments: FieldTable,
    ) -> Result<()> {
        record(
            &self.calls,
            Call::DeclareQueue {
                name: name.to_string(),
                durable: options.durable,
                auto_delete: options.auto_delete,
                exclusive: options.exclusive,
                nowait: options.nowait,
                arguments,
            },
        );
        self.check(Op::DeclareQueue, RabbitMQError::QueueDeclareError)
    }

    async fn declare_exchange(
        &self,
        name: &str,
        kind: &str,
        durable: bool,
        auto_delete: bool,
    ) -> Result<()> {
        record(
            &self.calls,
            Call::DeclareExchange {
                name: name.to_string(),
                kind: kind.to_string(),
                durable,
                auto_delete,
            },
        );
        self.check(Op::DeclareExchange, RabbitMQError::ExchangeDeclareError)
    }

    async fn bind_queue(&self, queue: &str, routing_key: &str, exchange: &str) -> Result<()> {
        record(
            &self.calls,
            Call::BindQueue {
                queue: queue.to_string(),
                routing_key: routing_key.to_string(),
                exchange: exchange.to_string(),
            },
        );
        self.check(Op::BindQueue, RabbitMQError::QueueBindError)
    }

    async fn consume(&self, queue: &str, _consumer_tag: &str) -> Result<DeliveryStream> {
        record(&self.calls, Call::Consume { queue: queue.to_string() });
        self.check(Op::Consume, RabbitMQError::ConsumeError)?;

        let deliveries = std::mem::take(&mut *self.deliveries.lock().unwrap());
        Ok(stream::iter(deliveries).boxed())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        properties: BasicProperties,
        body: &[u8],
    ) -> Result<()> {
        record(
            &self.calls,
            Call::Publish {
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
                content_type: short(properties.content_type()),
                correlation_id: short(properties.correlation_id()),
                body: body.to_vec(),
            },
        );
        self.check(Op::Publish, RabbitMQError::PublishError)
    }

    async fn close(&self) -> Result<()> {
        record(&self.calls, Call::Close);
        Ok(())
    }
}

fn short(value: &Option<lapin::types::ShortString>) -> String {
    value
        .as_ref()
        .map(|s| s.as_str().to_string())
        .unwrap_or_default()
}

pub struct FakeDelivery {
    body: Vec<u8>,
    properties: MessageProperties,
    info: DeliveryInfo,
    calls: CallLog,
}

impl FakeDelivery {
    pub fn new(delivery_tag: u64, body: &[u8], calls: &CallLog) -> Self {
        Self {
            body: body.to_vec(),
            properties: MessageProperties::default(),
            info: DeliveryInfo {
                consumer_tag: "test-consumer".to_string(),
                delivery_tag,
                redelivered: false,
                exchange: String::new(),
                routing_key: "worker".to_string(),
                message_count: 0,
            },
            calls: calls.clone(),
        }
    }

    pub fn with_reply(mut self, reply_to: &str, correlation_id: &str) -> Self {
        self.properties.reply_to = reply_to.to_string();
        self.properties.correlation_id = correlation_id.to_string();
        self
    }

    pub fn with_properties(mut self, properties: MessageProperties) -> Self {
        self.properties = properties;
        self
    }

    pub fn boxed(self) -> Box<dyn Delivery> {
        Box::new(self)
    }
}

#[async_trait]
impl Delivery for FakeDelivery {
    fn body(&self) -> &[u8] {
        &self.body
    }

    fn properties(&self) -> &MessageProperties {
        &self.properties
    }

    fn info(&self) -> &DeliveryInfo {
        &self.info
    }

    async fn ack(self: Box<Self>, multiple: bool) -> Result<()> {
        record(
            &self.calls,
            Call::Ack {
                delivery_tag: self.info.delivery_tag,
                multiple,
            },
        );
        Ok(())
    }

    async fn nack(self: Box<Self>, multiple: bool, requeue: bool) -> Result<()> {
        record(
            &self.calls,
            Call::Nack {
                delivery_tag: self.info.delivery_tag,
                multiple,
                requeue,
            },
        );
        Ok(())
    }

    async fn reject(self: Box<Self>, requeue: bool) -> Result<()> {
        record(
            &self.calls,
            Call::Reject {
                delivery_tag: self.info.delivery_tag,
                requeue,
            },
        );
        Ok(())
    }
}
