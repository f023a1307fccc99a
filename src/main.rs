// src/main.rs
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error, info};

use rabbitmq_cli_consumer::command::{CommandFactory, ProcessExecutor};
use rabbitmq_cli_consumer::config::{Config, Locator};
use rabbitmq_cli_consumer::consumer::Consumer;
use rabbitmq_cli_consumer::logging;
use rabbitmq_cli_consumer::rabbitmq::{self, watch_close, AmqpChannel, ConnectionManager, RabbitMQError};

/// Consume RabbitMQ messages into any command-line executable.
#[derive(Parser, Debug)]
#[command(name = "rabbitmq-cli-consumer")]
struct Cli {
    /// Command to run for every message; the payload is appended as last argument
    #[arg(short, long)]
    executable: String,

    /// Configuration file merged on top of the system and user files
    #[arg(short, long)]
    configuration: Option<PathBuf>,

    #[arg(short = 'V', long)]
    verbose: bool,

    /// Acknowledge according to the command's exit code
    #[arg(long)]
    strict_exit_code: bool,

    /// Pass message properties and delivery info along with the body
    #[arg(short, long)]
    include: bool,

    /// Compress the payload before handing it to the command
    #[arg(long)]
    compression: bool,
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{:#}", e);
            process::exit(1);
        }
    };

    if let Err(e) = logging::init(&config.logs, cli.verbose) {
        eprintln!("{:#}", e);
        process::exit(1);
    }

    if let Err(e) = run(&cli, config).await {
        error!("{:#}", e);
        process::exit(exit_code(&e));
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let paths = Locator::from_env(cli.configuration.as_deref()).locate()?;
    let mut config = Config::load(&paths)?;
    config.apply_env()?;

    // Flags only switch features on
    config.features.strict_exit_code |= cli.strict_exit_code;
    config.features.include_metadata |= cli.include;
    config.rabbitmq.compression |= cli.compression;

    config.normalize();
    config.validate()?;
    Ok(config)
}

async fn run(cli: &Cli, config: Config) -> Result<()> {
    let factory = CommandFactory::new(&cli.executable)?;
    let program = factory.resolve()?;
    debug!("Using executable {}", program.display());

    debug!("Broker at {}", config.redacted_uri());
    let connection = ConnectionManager::connect(&config.connection_uri()).await?;
    let channel = connection.create_channel().await?;
    tokio::spawn(watch_close(connection.close_notifier()));

    rabbitmq::initialize(&channel, &config).await?;

    let consumer = Consumer::new(channel, &config, factory, ProcessExecutor);
    tokio::select! {
        result = consumer.consume() => result?,
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for the shutdown signal")?;
            info!("Received shutdown signal, closing channel and connection");
        }
    }

    consumer.channel().close().await?;
    connection.close().await?;
    Ok(())
}

fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<RabbitMQError>()
        .map(RabbitMQError::exit_code)
        .unwrap_or(1)
}
