// src/command.rs
// Runs the configured executable once per message

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command as ProcessCommand;
use tracing::{debug, error, info};

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("No executable given")]
    EmptyExecutable,

    #[error("Executable \"{0}\" not found: {1}")]
    NotFound(String, #[source] which::Error),
}

/// A fully built invocation: program plus positional arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub program: String,
    pub args: Vec<String>,
}

/// How the process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Exited(i32),
    /// Killed by a signal, so there is no exit code.
    Terminated,
    /// The process could not be started at all.
    Unavailable(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Exited(0))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub output: Vec<u8>,
    pub outcome: Outcome,
}

impl Invocation {
    pub fn new(output: impl Into<Vec<u8>>, outcome: Outcome) -> Self {
        Self {
            output: output.into(),
            outcome,
        }
    }
}

/// Builds commands from the `--executable` string.
///
/// `"php worker.php --env=prod"` runs `php` with `worker.php --env=prod`
/// followed by the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFactory {
    program: String,
    args: Vec<String>,
}

impl CommandFactory {
    pub fn new(executable: &str) -> Result<Self, CommandError> {
        let mut parts = executable.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or(CommandError::EmptyExecutable)?;

        Ok(Self {
            program,
            args: parts.collect(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Resolves the program through `PATH` so a typo fails at startup rather
    /// than on every message.
    pub fn resolve(&self) -> Result<PathBuf, CommandError> {
        which::which(&self.program).map_err(|e| CommandError::NotFound(self.program.clone(), e))
    }

    pub fn create(&self, payload: &str) -> Command {
        let mut args = self.args.clone();
        args.push(payload.to_string());

        Command {
            program: self.program.clone(),
            args,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, command: &Command) -> Invocation;
}

/// Spawns the command as a child process and waits for it to exit.
///
/// Stdout becomes the invocation output; stderr only goes to the error log.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessExecutor;

#[async_trait]
impl Executor for ProcessExecutor {
    async fn execute(&self, command: &Command) -> Invocation {
        info!("Processing message...");

        let result = ProcessCommand::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(e) => {
                info!("Failed. Check error log for details.");
                error!("Failed to start {}: {}", command.program, e);
                return Invocation::new(Vec::new(), Outcome::Unavailable(e.to_string()));
            }
        };

        let outcome = match output.status.code() {
            Some(code) => Outcome::Exited(code),
            None => Outcome::Terminated,
        };

        if outcome.is_success() {
            info!("Processed!");
            if !output.stderr.is_empty() {
                debug!("stderr: {}", String::from_utf8_lossy(&output.stderr));
            }
        } else {
            info!("Failed. Check error log for details.");
            error!(
                "Failed: {}{}",
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );
            error!("Error: {}", output.status);
        }

        Invocation::new(output.stdout, outcome)
    }
}
