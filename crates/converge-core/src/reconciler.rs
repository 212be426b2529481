//! Reconciliation of a single mutating call
//!
//! Issues the mutation once, follows the returned operation handle to a
//! terminal outcome and reports one result: the final state or one error.

use crate::classifier::{Classification, Classifier, Phase};
use crate::client::{Method, RemoteClient, TransportError};
use crate::error::{EngineError, Result};
use crate::operation::{Converged, OperationHandle, OperationKind, ResourceScope, TerminalOutcome};
use crate::poller::{PollSpec, WaitContext};
use crate::tracker::Tracker;
use crate::vocabulary::Vocabulary;
use serde_json::Value;
use std::future::Future;

/// What the mutating call handed back
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// The endpoint answered synchronously with the final state
    Settled(Value),
    /// The endpoint started asynchronous work
    Pending(OperationHandle),
}

/// Drives mutating calls against one remote client to completion
pub struct Reconciler<'a, C: RemoteClient + ?Sized> {
    client: &'a C,
    classifier: Classifier,
    ctx: WaitContext,
}

impl<'a, C: RemoteClient + ?Sized> Reconciler<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self {
            client,
            classifier: Classifier::default(),
            ctx: WaitContext::default(),
        }
    }

    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Caller-side cancellation and deadline for every wait
    pub fn with_context(mut self, ctx: WaitContext) -> Self {
        self.ctx = ctx;
        self
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Run `mutate` once and wait for what it started
    ///
    /// A delete whose mutation fails because the resource is already gone
    /// succeeds with `Converged::Absent`. No rollback is attempted on
    /// failure.
    pub async fn reconcile<F, Fut>(&self, kind: OperationKind, wait: &PollSpec, mutate: F) -> Result<Converged>
    where
        F: FnOnce(&'a C) -> Fut,
        Fut: Future<Output = std::result::Result<Mutation, TransportError>>,
    {
        wait.validate()?;

        let mutation = match mutate(self.client).await {
            Ok(mutation) => mutation,
            Err(err) => {
                return match self.classifier.classify(&err, Phase::Mutate, kind) {
                    Classification::AbsentOk => {
                        tracing::info!(endpoint = %err.endpoint(), %kind, "Resource already absent");
                        Ok(Converged::Absent)
                    }
                    // The mutation is never re-issued; retryable failures of
                    // the call itself end here too.
                    Classification::Retryable | Classification::Fatal => {
                        tracing::warn!(error = %err, %kind, "Mutating call failed");
                        Err(err.into())
                    }
                };
            }
        };

        match mutation {
            Mutation::Settled(state) => {
                tracing::debug!(%kind, "Mutation settled synchronously");
                Ok(Converged::State(state))
            }
            Mutation::Pending(handle) => {
                if handle.kind != kind {
                    return Err(EngineError::InvalidHandle(format!(
                        "{} handle {} returned by a {} mutation",
                        handle.kind, handle.id, kind
                    )));
                }
                self.track(&handle, wait).await
            }
        }
    }

    /// Follow an existing handle to completion
    pub async fn track(&self, handle: &OperationHandle, wait: &PollSpec) -> Result<Converged> {
        let tracker = Tracker::new(self.client, &self.classifier, &self.ctx);
        match tracker.track(handle, wait).await? {
            TerminalOutcome::Succeeded(state) => Ok(Converged::State(state)),
            TerminalOutcome::Vanished => Ok(Converged::Absent),
            TerminalOutcome::Failed(reason) => Err(reason.into()),
        }
    }

    /// Submit `body` to `path` and wait for the operation it starts
    ///
    /// The handle id is read from the response using `vocabulary`; a response
    /// without one is the final state.
    #[allow(clippy::too_many_arguments)]
    pub async fn submit_and_wait(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        kind: OperationKind,
        vocabulary: Vocabulary,
        scope: ResourceScope,
        wait: &PollSpec,
    ) -> Result<Converged> {
        self.reconcile(kind, wait, |client| async move {
            let response = client.submit(method, path, body).await;
            response.map(|response| {
                match OperationHandle::from_response(&response, scope, kind, vocabulary) {
                    Some(handle) => Mutation::Pending(handle),
                    None => Mutation::Settled(response),
                }
            })
        })
        .await
    }
}
