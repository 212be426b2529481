//! Engine error types

use crate::client::TransportError;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the poller, tracker and reconciler
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(
        "Unexpected state {state:?} from {endpoint} (pending: {pending:?}, target: {target:?})"
    )]
    UnexpectedState {
        endpoint: String,
        state: String,
        pending: Vec<String>,
        target: Vec<String>,
    },

    #[error(
        "Timeout after {elapsed:?} (budget {budget:?}) waiting on {endpoint}, last status: {}{}",
        display_status(.last_status),
        display_error(.last_error)
    )]
    Timeout {
        endpoint: String,
        last_status: Option<String>,
        /// Transient error seen after the last observed status
        last_error: Option<String>,
        elapsed: Duration,
        budget: Duration,
    },

    #[error("{endpoint} reported failure status {status:?}: {reason}")]
    TerminalFailure {
        endpoint: String,
        status: String,
        reason: String,
    },

    #[error("Wait on {endpoint} cancelled, last status: {}", display_status(.last_status))]
    Cancelled {
        endpoint: String,
        last_status: Option<String>,
    },

    #[error("Invalid poll spec: {0}")]
    InvalidSpec(String),

    #[error("Invalid operation handle: {0}")]
    InvalidHandle(String),
}

impl EngineError {
    /// Last status observed before the wait gave up, if the error carries one
    pub fn last_status(&self) -> Option<&str> {
        match self {
            EngineError::Timeout { last_status, .. } | EngineError::Cancelled { last_status, .. } => {
                last_status.as_deref()
            }
            EngineError::UnexpectedState { state, .. } => Some(state),
            EngineError::TerminalFailure { status, .. } => Some(status),
            _ => None,
        }
    }

    /// Transient error a timed-out wait was still riding out
    pub fn last_error(&self) -> Option<&str> {
        match self {
            EngineError::Timeout { last_error, .. } => last_error.as_deref(),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, EngineError::Timeout { .. })
    }

    /// HTTP status of the underlying transport failure, if any
    pub fn http_status(&self) -> Option<u16> {
        match self {
            EngineError::Transport(err) => err.status(),
            _ => None,
        }
    }
}

fn display_status(status: &Option<String>) -> String {
    match status {
        Some(s) => format!("{:?}", s),
        None => "none observed".to_string(),
    }
}

fn display_error(error: &Option<String>) -> String {
    match error {
        Some(e) => format!(", last error: {}", e),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
