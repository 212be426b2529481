//! Operation tracking
//!
//! Polls the status endpoint of an operation handle until the remote reports
//! a terminal status, the tracked resource disappears during a delete, or the
//! wait gives up.

use crate::classifier::{Classification, Classifier, Phase};
use crate::client::{RemoteClient, TransportError};
use crate::error::{EngineError, Result};
use crate::operation::{FailureReason, OperationHandle, OperationKind, TerminalOutcome};
use crate::poller::{self, PollSpec, Refresh, WaitContext};
use crate::vocabulary::StatusTable;
use serde_json::Value;

/// What a single tick saw
#[derive(Debug)]
enum Snapshot {
    Present(Value),
    Gone,
    Failed(FailureReason),
}

/// Tracks operation handles against one remote client
pub struct Tracker<'a, C: RemoteClient + ?Sized> {
    client: &'a C,
    classifier: &'a Classifier,
    ctx: &'a WaitContext,
}

impl<'a, C: RemoteClient + ?Sized> Tracker<'a, C> {
    pub fn new(client: &'a C, classifier: &'a Classifier, ctx: &'a WaitContext) -> Self {
        Self {
            client,
            classifier,
            ctx,
        }
    }

    /// Poll `handle` to a terminal outcome
    ///
    /// Timings come from `wait`; its state sets are replaced by the handle's
    /// vocabulary. Remote failure statuses come back as
    /// `TerminalOutcome::Failed`; everything else that stops the wait is an
    /// error.
    pub async fn track(&self, handle: &OperationHandle, wait: &PollSpec) -> Result<TerminalOutcome> {
        let table = handle.vocabulary.table(handle.kind);
        let status_path = handle.status_path()?;
        let existence_path = handle.existence_path();
        let spec = wait
            .clone()
            .pending(table.pending.iter().copied())
            .target(table.target.iter().copied());

        tracing::info!(
            operation = %handle.id,
            vocabulary = %handle.vocabulary,
            kind = %handle.kind,
            endpoint = %status_path,
            "Tracking remote operation"
        );

        let (table_ref, path_ref) = (&table, status_path.as_str());
        let snapshot = poller::poll(path_ref, &spec, self.ctx, move || {
            self.probe(handle, table_ref, path_ref, existence_path)
        })
        .await?;

        Ok(match snapshot {
            Snapshot::Present(state) => TerminalOutcome::Succeeded(state),
            Snapshot::Gone if handle.kind == OperationKind::Delete => TerminalOutcome::Vanished,
            Snapshot::Gone => TerminalOutcome::Succeeded(Value::Null),
            Snapshot::Failed(reason) => {
                tracing::warn!(
                    operation = %handle.id,
                    endpoint = %reason.endpoint,
                    status = %reason.status,
                    "Remote operation failed"
                );
                TerminalOutcome::Failed(reason)
            }
        })
    }

    /// One tick: resource existence check for deletes, then the status read
    async fn probe(
        &self,
        handle: &OperationHandle,
        table: &StatusTable,
        status_path: &str,
        existence_path: Option<&str>,
    ) -> Refresh<Snapshot> {
        if let Some(path) = existence_path {
            if let Err(err) = self.client.get(path).await {
                return self.on_error(err, handle.kind);
            }
        }

        match self.client.get(status_path).await {
            Ok(value) => {
                let Some(status) = table.status_of(&value) else {
                    return Refresh::Failed(EngineError::UnexpectedState {
                        endpoint: status_path.to_string(),
                        state: format!("<no {} field>", table.field),
                        pending: table.pending.iter().map(|s| s.to_string()).collect(),
                        target: table.target.iter().map(|s| s.to_string()).collect(),
                    });
                };
                if table.is_failure(&status) {
                    return Refresh::Settled(Snapshot::Failed(FailureReason {
                        endpoint: status_path.to_string(),
                        message: remote_message(&value),
                        status,
                    }));
                }
                Refresh::Observed {
                    state: Snapshot::Present(value),
                    status,
                }
            }
            Err(err) if err.is_not_found() && handle.vocabulary.vanishes_on_completion() => {
                tracing::debug!(endpoint = %status_path, "Task record removed, treating as done");
                Refresh::Settled(Snapshot::Gone)
            }
            Err(err) => self.on_error(err, handle.kind),
        }
    }

    fn on_error(&self, err: TransportError, kind: OperationKind) -> Refresh<Snapshot> {
        match self.classifier.classify(&err, Phase::Poll, kind) {
            Classification::AbsentOk => Refresh::Settled(Snapshot::Gone),
            Classification::Retryable => Refresh::Transient(err.into()),
            Classification::Fatal => Refresh::Failed(err.into()),
        }
    }
}

/// Human-readable reason from a failed operation record
fn remote_message(value: &Value) -> String {
    ["message", "error", "comment"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str).filter(|s| !s.is_empty()))
        .map(str::to_string)
        .unwrap_or_else(|| "no details reported".to_string())
}
