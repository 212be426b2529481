//! Converge Core
//!
//! Asynchronous remote-operation reconciliation engine for cloud control
//! planes. After a create/update/delete call against an API that performs
//! the work asynchronously, the engine polls for completion, interprets
//! terminal, failed and transient states, enforces timeouts and hands back a
//! single definitive result.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                   Reconciler                     │
//! │      mutate once → state | OperationHandle       │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                    Tracker                       │
//! │  vocabulary table → pending / target / failed    │
//! └───────┬─────────────────────────┬───────────────┘
//!         │                         │
//! ┌───────▼───────┐         ┌───────▼───────┐
//! │    Poller     │         │  Classifier   │
//! │ interval loop │         │ 404/400/460   │
//! └───────┬───────┘         └───────────────┘
//!         │
//! ┌───────▼─────────────────────────────────────────┐
//! │            trait RemoteClient { get, submit }    │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use converge_core::{OperationKind, PollSpec, Reconciler, ResourceScope, Vocabulary, Method};
//!
//! let reconciler = Reconciler::new(&client);
//! let network = reconciler
//!     .submit_and_wait(
//!         Method::Post,
//!         "/cloud/project/p1/network/private",
//!         Some(&body),
//!         OperationKind::Create,
//!         Vocabulary::PrivateNetwork,
//!         ResourceScope::new("p1"),
//!         &PollSpec::default(),
//!     )
//!     .await?;
//! ```

pub mod classifier;
pub mod client;
pub mod error;
pub mod operation;
pub mod poller;
pub mod reconciler;
pub mod tracker;
pub mod vocabulary;

// Re-exports
pub use classifier::{Classification, Classifier, Phase, TransientRule};
pub use client::{Method, RemoteClient, TransportError};
pub use error::{EngineError, Result};
pub use operation::{
    Converged, FailureReason, OperationHandle, OperationKind, ResourceScope, TerminalOutcome,
};
pub use poller::{PollSpec, Refresh, WaitContext, poll};
pub use reconciler::{Mutation, Reconciler};
pub use tracker::Tracker;
pub use tokio_util::sync::CancellationToken;
pub use vocabulary::{StatusTable, Vocabulary};
