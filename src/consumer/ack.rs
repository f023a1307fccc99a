// src/consumer/ack.rs
// Maps the outcome of the external command onto a broker acknowledgment

use std::fmt;

use crate::command::Outcome;
use crate::rabbitmq::{Delivery, Result};

pub const EXIT_ACK: i32 = 0;
pub const EXIT_REJECT: i32 = 3;
pub const EXIT_REJECT_REQUEUE: i32 = 4;
pub const EXIT_NACK: i32 = 5;
pub const EXIT_NACK_REQUEUE: i32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckAction {
    Ack,
    Reject,
    RejectRequeue,
    Nack,
    NackRequeue,
}

/// Exit codes understood in strict mode. Anything else is unexpected.
pub const STRICT_EXIT_CODES: [(i32, AckAction); 5] = [
    (EXIT_ACK, AckAction::Ack),
    (EXIT_REJECT, AckAction::Reject),
    (EXIT_REJECT_REQUEUE, AckAction::RejectRequeue),
    (EXIT_NACK, AckAction::Nack),
    (EXIT_NACK_REQUEUE, AckAction::NackRequeue),
];

impl AckAction {
    pub fn from_exit_code(code: i32) -> Option<Self> {
        STRICT_EXIT_CODES
            .iter()
            .find(|(exit_code, _)| *exit_code == code)
            .map(|(_, action)| *action)
    }
}

impl fmt::Display for AckAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AckAction::Ack => "ack",
            AckAction::Reject => "reject",
            AckAction::RejectRequeue => "reject-requeue",
            AckAction::Nack => "nack",
            AckAction::NackRequeue => "nack-requeue",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub action: AckAction,
    /// Set when strict mode saw an exit code outside the table.
    pub unexpected_exit_code: Option<i32>,
}

impl Decision {
    fn new(action: AckAction) -> Self {
        Self {
            action,
            unexpected_exit_code: None,
        }
    }
}

pub fn decide(strict_exit_code: bool, outcome: &Outcome) -> Decision {
    if !strict_exit_code {
        return if outcome.is_success() {
            Decision::new(AckAction::Ack)
        } else {
            Decision::new(AckAction::NackRequeue)
        };
    }

    match outcome {
        Outcome::Exited(code) => match AckAction::from_exit_code(*code) {
            Some(action) => Decision::new(action),
            None => Decision {
                action: AckAction::NackRequeue,
                unexpected_exit_code: Some(*code),
            },
        },
        Outcome::Terminated | Outcome::Unavailable(_) => Decision::new(AckAction::NackRequeue),
    }
}

/// Sends the acknowledgment. Ack and nack always set `multiple`.
pub async fn acknowledge(delivery: Box<dyn Delivery>, action: AckAction) -> Result<()> {
    match action {
        AckAction::Ack => delivery.ack(true).await,
        AckAction::Reject => delivery.reject(false).await,
        AckAction::RejectRequeue => delivery.reject(true).await,
        AckAction::Nack => delivery.nack(true, false).await,
        AckAction::NackRequeue => delivery.nack(true, true).await,
    }
}
