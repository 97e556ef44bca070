use std::fmt;

use thiserror::Error;

use crate::domain::TaskStatus;

/// Which kind of record a lookup failed on.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Entity {
    Child,
    Task,
    Reward,
    Redemption,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Entity::Child => "child",
            Entity::Task => "task",
            Entity::Reward => "reward",
            Entity::Redemption => "redemption",
        })
    }
}

/// Operations on a task that go through the lifecycle engine.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TaskAction {
    MarkDone,
    Approve,
    Reject,
    Execute,
}

impl fmt::Display for TaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskAction::MarkDone => "mark done",
            TaskAction::Approve => "approve",
            TaskAction::Reject => "reject",
            TaskAction::Execute => "execute",
        })
    }
}

/// Why a precondition check refused an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    PhotoRequired,
    RewardUnavailable,
    InsufficientPoints { balance: i64, cost: i64 },
    NonPositiveAmount(i64),
    BalanceOverflow,
    InvalidPin,
    InvalidField(String),
}

impl fmt::Display for Precondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Precondition::PhotoRequired => f.write_str("a photo is required for this task"),
            Precondition::RewardUnavailable => f.write_str("reward is not available"),
            Precondition::InsufficientPoints { balance, cost } => {
                write!(f, "insufficient points: have {balance}, need {cost}")
            }
            Precondition::NonPositiveAmount(v) => write!(f, "amount must be positive, got {v}"),
            Precondition::BalanceOverflow => f.write_str("balance would overflow"),
            Precondition::InvalidPin => f.write_str("PIN must be exactly four digits"),
            Precondition::InvalidField(msg) => f.write_str(msg),
        }
    }
}

/// Validation failures raised by the lifecycle engine, ledger and gate.
/// None of them leave partial state behind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("cannot {action} task {task_id} while it is {from}")]
    InvalidTransition {
        task_id: String,
        from: TaskStatus,
        action: TaskAction,
    },

    #[error("cannot {action} task {task_id}: {reason}")]
    InvalidAction {
        task_id: String,
        action: TaskAction,
        reason: &'static str,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: Entity, id: String },

    #[error("precondition failed: {0}")]
    PreconditionFailed(Precondition),
}

impl DomainError {
    pub fn not_found(entity: Entity, id: impl fmt::Display) -> Self {
        DomainError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn precondition(p: Precondition) -> Self {
        DomainError::PreconditionFailed(p)
    }

    /// Coarse kind, used for status codes and wire errors.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::InvalidTransition { .. } | DomainError::InvalidAction { .. } => {
                ErrorKind::InvalidTransition
            }
            DomainError::NotFound { .. } => ErrorKind::NotFound,
            DomainError::PreconditionFailed(_) => ErrorKind::PreconditionFailed,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidTransition,
    NotFound,
    PreconditionFailed,
    SyncFailure,
}
