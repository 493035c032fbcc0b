//! Error types shared by the oracle's core components.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::chain::ChainError;
use crate::feed::FeedError;
use crate::keys::KeyError;

/// Errors surfaced by the tracker, the engine and their collaborators.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    /// A user, key set or contract formation is not known.
    #[error("{kind} not found: {key}")]
    NotFound {
        /// What was looked up.
        kind: &'static str,
        /// The lookup key, rendered for logs.
        key: String,
    },

    /// The header window does not yet hold enough confirmed headers.
    #[error("insufficient confirmed headers: have {have}, need {need}")]
    InsufficientHeaders { have: usize, need: usize },

    /// The caller's cancellation token fired before the operation finished.
    #[error("{operation} canceled")]
    Canceled { operation: &'static str },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("signature does not match the registered public key")]
    InvalidSignature,

    #[error("key set already registered")]
    KeySetExists,

    #[error("key error: {0}")]
    Key(#[from] KeyError),

    #[error("chain data error: {0}")]
    Chain(#[from] ChainError),

    /// Persisted data could not be decoded.
    #[error("malformed {what}: {reason}")]
    Malformed { what: &'static str, reason: String },

    #[error("approver {hook} failed: {reason}")]
    Approver { hook: &'static str, reason: String },

    #[error("header feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("snapshot i/o error: {0}")]
    Snapshot(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, OracleError>;

impl OracleError {
    pub fn not_found(kind: &'static str, key: impl ToString) -> Self {
        OracleError::NotFound {
            kind,
            key: key.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, OracleError::NotFound { .. })
    }

    /// Conditions that may clear on retry without any change by the caller.
    pub fn is_transient(&self) -> bool {
        match self {
            OracleError::InsufficientHeaders { .. } | OracleError::Feed(_) => true,
            OracleError::Database(err) => matches!(
                err,
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            ),
            _ => false,
        }
    }

    /// Errors caused by the request itself rather than the oracle.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            OracleError::InvalidRequest(_)
                | OracleError::InvalidSignature
                | OracleError::KeySetExists
                | OracleError::Key(_)
        )
    }
}

/// Runs `fut` unless `cancel` fires first.
pub async fn with_cancel<T, F>(
    cancel: &CancellationToken,
    operation: &'static str,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(OracleError::Canceled { operation }),
        result = fut => result,
    }
}
