// src/rabbitmq/connection.rs

use lapin::{Connection, ConnectionProperties, Error as LapinError};
use tokio::sync::oneshot;
use tracing::{error, info};

use super::channel::LapinChannel;
use super::errors::{RabbitMQError, Result};

/// Owns the broker connection for the lifetime of the worker.
///
/// There is no reconnect policy: losing the connection is fatal and restarts
/// are left to the process supervisor.
pub struct ConnectionManager {
    connection: Connection,
}

impl ConnectionManager {
    pub async fn connect(uri: &str) -> Result<Self> {
        info!("Connecting RabbitMQ...");
        let connection = Connection::connect(uri, ConnectionProperties::default())
            .await
            .map_err(|e| RabbitMQError::ConnectionError(e.to_string()))?;
        info!("Connected.");

        Ok(Self { connection })
    }

    pub async fn create_channel(&self) -> Result<LapinChannel> {
        info!("Opening channel...");
        let channel = self
            .connection
            .create_channel()
            .await
            .map_err(|e| RabbitMQError::ChannelError(e.to_string()))?;
        info!("Done.");

        Ok(LapinChannel::new(channel))
    }

    /// Resolves with the first error that brings the connection down.
    pub fn close_notifier(&self) -> oneshot::Receiver<LapinError> {
        let (tx, rx) = oneshot::channel();
        let mut tx = Some(tx);

        self.connection.on_error(move |err| {
            if let Some(tx) = tx.take() {
                let _ = tx.send(err);
            }
        });

        rx
    }

    pub async fn close(&self) -> Result<()> {
        if self.connection.status().connected() {
            info!("Closing RabbitMQ connection gracefully");
            self.connection
                .close(200, "Closing connection")
                .await
                .map_err(|e| RabbitMQError::ConnectionError(e.to_string()))?;
        }
        Ok(())
    }
}

/// Waits for the connection to drop and terminates the process.
pub async fn watch_close(notifier: oneshot::Receiver<LapinError>) {
    if let Some(err) = closed_error(notifier).await {
        error!("{}", err);
        std::process::exit(err.exit_code());
    }
}

/// Resolves to the error that closed the connection.
///
/// A dropped sender means the connection was closed locally, which is not an
/// error.
pub async fn closed_error(notifier: oneshot::Receiver<LapinError>) -> Option<RabbitMQError> {
    notifier
        .await
        .ok()
        .map(|err| RabbitMQError::ConnectionClosed(err.to_string()))
}
