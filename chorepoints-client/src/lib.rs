//! Household client: keeps a local snapshot of the shared chore data in sync
//! with a remote store and exposes the child and parent operations on it.

use chorepoints_shared::api::rest::RestError;
use chorepoints_shared::mapping::MappingError;
use chorepoints_shared::{DomainError, ErrorKind};

pub mod app;
pub mod cache;
pub mod cli;
pub mod config;
pub mod http;
pub mod memory;
pub mod refresh;
pub mod remote;
pub mod repository;
pub mod session;
pub mod sse;

pub use app::run;
pub use cli::{Cli, Command};
pub use config::{ClientConfig, Clock};
pub use remote::{FeedEvent, RemoteStore};
pub use repository::Repository;
pub use session::SyncSession;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Refused locally by the domain rules.
    #[error(transparent)]
    Domain(#[from] DomainError),
    /// Refused by the remote store.
    #[error("{message}")]
    Rejected { kind: ErrorKind, message: String },
    /// The remote could not be reached or answered nonsense. Retryable.
    #[error("sync failed: {0}")]
    SyncFailure(String),
    #[error("unexpected row from remote: {0}")]
    Mapping(#[from] MappingError),
    #[error("parent console is locked")]
    Locked,
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Domain(e) => e.kind(),
            ClientError::Rejected { kind, .. } => *kind,
            ClientError::Locked => ErrorKind::PreconditionFailed,
            _ => ErrorKind::SyncFailure,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::SyncFailure
    }
}

impl From<RestError> for ClientError {
    fn from(e: RestError) -> Self {
        match e {
            RestError::Api {
                kind: Some(kind),
                message,
                ..
            } if kind != ErrorKind::SyncFailure => ClientError::Rejected { kind, message },
            other => ClientError::SyncFailure(other.to_string()),
        }
    }
}

pub(crate) fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
