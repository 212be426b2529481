//! Operation handles and terminal outcomes

use crate::error::{EngineError, Result};
use crate::vocabulary::Vocabulary;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle phase a mutating call belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Create a new resource
    Create,
    /// Update an existing resource
    Update,
    /// Delete a resource
    Delete,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Create => write!(f, "create"),
            OperationKind::Update => write!(f, "update"),
            OperationKind::Delete => write!(f, "delete"),
        }
    }
}

/// Identifiers needed to re-query a resource or its operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceScope {
    /// Service name (cloud project id, logs service, vRack, ...)
    pub service: String,

    /// Kubernetes cluster id, for node pools
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,

    /// Id of the resource itself, when known before the mutating call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,

    /// Path of the underlying resource, checked for absence during deletes
    /// tracked through a separate operation record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_path: Option<String>,
}

impl ResourceScope {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            ..Self::default()
        }
    }

    pub fn with_cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = Some(cluster.into());
        self
    }

    pub fn with_resource_id(mut self, id: impl Into<String>) -> Self {
        self.resource_id = Some(id.into());
        self
    }

    pub fn with_resource_path(mut self, path: impl Into<String>) -> Self {
        self.resource_path = Some(path.into());
        self
    }
}

/// Server-issued asynchronous operation being tracked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationHandle {
    /// Operation, task or resource id returned by the mutating call
    pub id: String,

    pub scope: ResourceScope,

    pub kind: OperationKind,

    /// Status vocabulary of the remote endpoint
    pub vocabulary: Vocabulary,
}

impl OperationHandle {
    pub fn new(
        id: impl Into<String>,
        scope: ResourceScope,
        kind: OperationKind,
        vocabulary: Vocabulary,
    ) -> Self {
        Self {
            id: id.into(),
            scope,
            kind,
            vocabulary,
        }
    }

    /// Build a handle from the body of a mutating call
    ///
    /// Returns `None` when the body carries no id, which means the endpoint
    /// answered synchronously. Resource-tracked vocabularies fall back to the
    /// id already known in `scope`.
    pub fn from_response(
        response: &Value,
        scope: ResourceScope,
        kind: OperationKind,
        vocabulary: Vocabulary,
    ) -> Option<Self> {
        let id = vocabulary.handle_id(response).or_else(|| {
            if vocabulary.tracks_resource() {
                scope.resource_id.clone()
            } else {
                None
            }
        })?;
        Some(Self::new(id, scope, kind, vocabulary))
    }

    /// Path polled for the operation's status
    pub fn status_path(&self) -> Result<String> {
        self.vocabulary.status_path(&self.scope, &self.id)
    }

    /// Path checked for absence on each tick of a delete, if distinct from
    /// the status path
    pub fn existence_path(&self) -> Option<&str> {
        if self.kind != OperationKind::Delete || self.vocabulary.tracks_resource() {
            return None;
        }
        self.scope.resource_path.as_deref()
    }
}

/// Remote failure reported by an operation record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReason {
    pub endpoint: String,
    pub status: String,
    pub message: String,
}

impl From<FailureReason> for EngineError {
    fn from(reason: FailureReason) -> Self {
        EngineError::TerminalFailure {
            endpoint: reason.endpoint,
            status: reason.status,
            reason: reason.message,
        }
    }
}

/// How a tracked operation ended
#[derive(Debug, Clone, PartialEq)]
pub enum TerminalOutcome {
    /// Target status reached; carries the last snapshot
    Succeeded(Value),
    /// Remote reported an explicit failure status
    Failed(FailureReason),
    /// Resource is gone; only produced for deletes
    Vanished,
}

/// Final state handed back by a reconciliation
#[derive(Debug, Clone, PartialEq)]
pub enum Converged {
    /// Remote state after the mutation settled
    State(Value),
    /// Resource no longer exists
    Absent,
}

impl Converged {
    pub fn is_absent(&self) -> bool {
        matches!(self, Converged::Absent)
    }

    pub fn state(&self) -> Option<&Value> {
        match self {
            Converged::State(v) => Some(v),
            Converged::Absent => None,
        }
    }

    pub fn into_state(self) -> Option<Value> {
        match self {
            Converged::State(v) => Some(v),
            Converged::Absent => None,
        }
    }
}
