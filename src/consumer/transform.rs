// src/consumer/transform.rs
// Turns a delivery into the single argument handed to the executable

use std::borrow::Cow;
use std::io::{self, Write};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use flate2::{write::ZlibEncoder, Compression};
use serde::Serialize;
use thiserror::Error;

use crate::rabbitmq::{Delivery, DeliveryInfo, MessageProperties};

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("Failed to marshal envelope: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Could not create compressed payload: {0}")]
    Compression(#[from] io::Error),
}

/// Delivery metadata wrapped around the body when metadata is included.
#[derive(Debug, Serialize)]
pub struct Envelope<'a> {
    pub properties: &'a MessageProperties,
    pub delivery_info: &'a DeliveryInfo,
    pub body: Cow<'a, str>,
}

impl<'a> Envelope<'a> {
    pub fn new(delivery: &'a dyn Delivery) -> Self {
        Self {
            properties: delivery.properties(),
            delivery_info: delivery.info(),
            body: String::from_utf8_lossy(delivery.body()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Transformer {
    include_metadata: bool,
    compression: bool,
}

impl Transformer {
    pub fn new(include_metadata: bool, compression: bool) -> Self {
        Self {
            include_metadata,
            compression,
        }
    }

    /// Envelope (optional), then zlib (optional), then base64.
    pub fn transform(&self, delivery: &dyn Delivery) -> Result<String, TransformError> {
        let mut payload: Cow<'_, [u8]> = Cow::Borrowed(delivery.body());

        if self.include_metadata {
            payload = Cow::Owned(serde_json::to_vec(&Envelope::new(delivery))?);
        }

        if self.compression {
            payload = Cow::Owned(compress(&payload)?);
        }

        Ok(STANDARD.encode(payload))
    }
}

/// Zlib at the best compression level.
pub fn compress(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data)?;
    encoder.finish()
}
