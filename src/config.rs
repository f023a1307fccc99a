// src/config.rs
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use lapin::options::QueueDeclareOptions;
use lapin::types::{AMQPValue, FieldTable};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

pub const SYSTEM_CONFIG_PATH: &str = "/etc/rabbitmq-cli-consumer/rabbitmq-cli-consumer.json";
pub const USER_CONFIG_FILE: &str = ".rabbitmq-cli-consumer.json";

/// Stands for the empty string in values where an empty setting would
/// otherwise be indistinguishable from "not set".
pub const EMPTY_STRING: &str = "<empty>";

const DEFAULT_PREFETCH_COUNT: u16 = 3;

// Configuration structures
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rabbitmq: ConnectionConfig,
    #[serde(default)]
    pub prefetch: PrefetchConfig,
    #[serde(default)]
    pub queue_settings: QueueSettings,
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub logs: LogsConfig,
    #[serde(default)]
    pub features: FeatureFlags,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_credential")]
    pub username: String,
    #[serde(default = "default_credential")]
    pub password: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_vhost")]
    pub vhost: String,
    #[serde(default)]
    pub queue: String,
    #[serde(default)]
    pub compression: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PrefetchConfig {
    #[serde(default = "default_prefetch_count")]
    pub count: u16,
    #[serde(default)]
    pub global: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QueueSettings {
    #[serde(default = "default_durable")]
    pub durable: bool,
    #[serde(default)]
    pub autodelete: bool,
    #[serde(default)]
    pub exclusive: bool,
    #[serde(default)]
    pub nowait: bool,
    #[serde(default)]
    pub routing_key: String,
    /// Message TTL in milliseconds, 0 disables it.
    #[serde(default)]
    pub message_ttl: u32,
    #[serde(default)]
    pub dead_letter_exchange: String,
    #[serde(default)]
    pub dead_letter_routing_key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ExchangeConfig {
    /// Empty means the broker's default exchange.
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub durable: bool,
    #[serde(default)]
    pub autodelete: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LogsConfig {
    #[serde(default)]
    pub info: Option<PathBuf>,
    #[serde(default)]
    pub error: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FeatureFlags {
    #[serde(default)]
    pub include_metadata: bool,
    #[serde(default)]
    pub strict_exit_code: bool,
}

// Default values
fn default_host() -> String { "localhost".to_string() }
fn default_credential() -> String { "guest".to_string() }
fn default_port() -> u16 { 5672 }
fn default_vhost() -> String { "/".to_string() }
fn default_prefetch_count() -> u16 { DEFAULT_PREFETCH_COUNT }
fn default_durable() -> bool { true }

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            username: default_credential(),
            password: default_credential(),
            port: default_port(),
            vhost: default_vhost(),
            queue: String::new(),
            compression: false,
        }
    }
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            count: default_prefetch_count(),
            global: false,
        }
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            durable: default_durable(),
            autodelete: false,
            exclusive: false,
            nowait: false,
            routing_key: String::new(),
            message_ttl: 0,
            dead_letter_exchange: String::new(),
            dead_letter_routing_key: String::new(),
        }
    }
}

/// Finds the configuration files to merge, lowest precedence first.
#[derive(Debug, Clone)]
pub struct Locator {
    candidates: Vec<PathBuf>,
    explicit: Option<PathBuf>,
}

impl Locator {
    pub fn new(explicit: Option<&Path>, home_dir: Option<PathBuf>) -> Self {
        let mut candidates = vec![PathBuf::from(SYSTEM_CONFIG_PATH)];
        if let Some(home) = home_dir {
            candidates.push(home.join(USER_CONFIG_FILE));
        }

        Self {
            candidates,
            explicit: explicit.map(Path::to_path_buf),
        }
    }

    pub fn from_env(explicit: Option<&Path>) -> Self {
        Self::new(explicit, home::home_dir())
    }

    pub fn locate(&self) -> Result<Vec<PathBuf>> {
        let mut found: Vec<PathBuf> = self
            .candidates
            .iter()
            .filter(|path| path.exists())
            .cloned()
            .collect();

        if let Some(explicit) = &self.explicit {
            if !explicit.exists() {
                bail!("Configuration file not found: {}", explicit.display());
            }
            found.push(explicit.clone());
        }

        if found.is_empty() {
            bail!("No configuration files found, exiting");
        }

        for path in &found {
            debug!("Found config file: {}", path.display());
        }
        Ok(found)
    }
}

impl Config {
    /// Reads and deep-merges the given JSON files, later files winning.
    pub fn load(paths: &[PathBuf]) -> Result<Self> {
        let mut merged = Value::Object(Map::new());

        for path in paths {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file at {}", path.display()))?;
            let value: Value = serde_json::from_str(&content).with_context(|| {
                format!("Config file {} contains invalid JSON", path.display())
            })?;
            merge(&mut merged, value);
        }

        serde_json::from_value(merged)
            .context("Configuration contains missing or mistyped fields")
    }

    /// Applies `RABBITMQ_*` environment overrides.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("RABBITMQ_HOST") {
            self.rabbitmq.host = host;
        }
        if let Some(username) = lookup("RABBITMQ_USERNAME") {
            self.rabbitmq.username = username;
        }
        if let Some(password) = lookup("RABBITMQ_PASSWORD") {
            self.rabbitmq.password = password;
        }
        if let Some(port) = lookup("RABBITMQ_PORT") {
            self.rabbitmq.port = port
                .parse()
                .with_context(|| format!("RABBITMQ_PORT is not a valid port: {port}"))?;
        }
        if let Some(vhost) = lookup("RABBITMQ_VHOST") {
            self.rabbitmq.vhost = vhost;
        }
        if let Some(queue) = lookup("RABBITMQ_QUEUE") {
            self.rabbitmq.queue = queue;
        }
        Ok(())
    }

    /// Fills in the defaults older configuration files relied on.
    pub fn normalize(&mut self) {
        if self.prefetch.count == 0 {
            self.prefetch.count = DEFAULT_PREFETCH_COUNT;
        }

        let exchange = &mut self.exchange;
        if exchange.name.is_empty()
            && exchange.kind.is_empty()
            && !exchange.durable
            && !exchange.autodelete
        {
            exchange.kind = "direct".to_string();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.rabbitmq.host.is_empty() {
            return Err(anyhow!("Configuration error: rabbitmq.host cannot be empty"));
        }
        if self.rabbitmq.queue.is_empty() {
            return Err(anyhow!("Configuration error: rabbitmq.queue cannot be empty"));
        }
        if !self.exchange.name.is_empty() && self.exchange.kind.is_empty() {
            return Err(anyhow!(
                "Configuration error: exchange.type cannot be empty for exchange \"{}\"",
                self.exchange.name
            ));
        }
        Ok(())
    }

    pub fn connection_uri(&self) -> String {
        build_uri(
            &urlencoding::encode(&self.rabbitmq.username),
            &urlencoding::encode(&self.rabbitmq.password),
            &self.rabbitmq.host,
            self.rabbitmq.port,
            &self.rabbitmq.vhost,
        )
    }

    /// Connection URI with the password masked, for logging.
    pub fn redacted_uri(&self) -> String {
        build_uri(
            &urlencoding::encode(&self.rabbitmq.username),
            "***",
            &self.rabbitmq.host,
            self.rabbitmq.port,
            &self.rabbitmq.vhost,
        )
    }

    pub fn queue_declare_options(&self) -> QueueDeclareOptions {
        QueueDeclareOptions {
            passive: false,
            durable: self.queue_settings.durable,
            exclusive: self.queue_settings.exclusive,
            auto_delete: self.queue_settings.autodelete,
            nowait: self.queue_settings.nowait,
        }
    }

    pub fn queue_arguments(&self) -> FieldTable {
        let settings = &self.queue_settings;
        let mut arguments = FieldTable::default();

        if settings.message_ttl > 0 {
            let ttl = i32::try_from(settings.message_ttl).unwrap_or(i32::MAX);
            arguments.insert("x-message-ttl".into(), AMQPValue::LongInt(ttl));
        }

        if !settings.dead_letter_exchange.is_empty() {
            arguments.insert(
                "x-dead-letter-exchange".into(),
                AMQPValue::LongString(sentinel_value(&settings.dead_letter_exchange).into()),
            );

            if !settings.dead_letter_routing_key.is_empty() {
                arguments.insert(
                    "x-dead-letter-routing-key".into(),
                    AMQPValue::LongString(sentinel_value(&settings.dead_letter_routing_key).into()),
                );
            }
        }

        arguments
    }
}

fn build_uri(username: &str, password: &str, host: &str, port: u16, vhost: &str) -> String {
    let separator = if vhost.starts_with('/') { "" } else { "/" };
    format!("amqp://{username}:{password}@{host}:{port}{separator}{vhost}")
}

fn sentinel_value(value: &str) -> String {
    if value == EMPTY_STRING {
        String::new()
    } else {
        value.to_string()
    }
}

fn merge(dest: &mut Value, src: Value) {
    match (dest, src) {
        (Value::Object(dest), Value::Object(src)) => {
            for (key, value) in src {
                merge(dest.entry(key).or_insert(Value::Null), value);
            }
        }
        (dest, src) => *dest = src,
    }
}
