// src/rabbitmq/errors.rs

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RabbitMQError {
    #[error("Failed connecting RabbitMQ: {0}")]
    ConnectionError(String),

    #[error("Failed to open a channel: {0}")]
    ChannelError(String),

    #[error("Failed to set QoS: {0}")]
    QosError(String),

    #[error("Failed to declare queue: {0}")]
    QueueDeclareError(String),

    #[error("Failed to declare exchange: {0}")]
    ExchangeDeclareError(String),

    #[error("Failed to bind queue to exchange: {0}")]
    QueueBindError(String),

    #[error("Failed to register a consumer: {0}")]
    ConsumeError(String),

    #[error("RabbitMQ publish error: {0}")]
    PublishError(String),

    #[error("RabbitMQ acknowledge error: {0}")]
    AckError(String),

    #[error("Connection closed: {0}")]
    ConnectionClosed(String),
}

// Custom Result type for RabbitMQ operations
pub type Result<T> = std::result::Result<T, RabbitMQError>;

impl RabbitMQError {
    /// Process exit code used when this error stops the worker.
    pub fn exit_code(&self) -> i32 {
        match self {
            RabbitMQError::ConnectionClosed(_) => 10,
            RabbitMQError::AckError(_) => 11,
            _ => 1,
        }
    }
}
