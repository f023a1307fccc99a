// src/rabbitmq/mod.rs
// Broker-facing side of the worker: connection, channel and delivery seams

pub mod channel;
pub mod connection;
pub mod delivery;
pub mod errors;
pub mod topology;

#[cfg(test)]
pub mod testing;

// Re-export specific items to simplify imports elsewhere
pub use channel::{AmqpChannel, DeliveryStream, LapinChannel};
pub use connection::{watch_close, ConnectionManager};
pub use delivery::{Delivery, DeliveryInfo, LapinDelivery, MessageProperties};
pub use errors::{RabbitMQError, Result};
pub use topology::initialize;
