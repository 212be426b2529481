//! HTTP transport for converge
//!
//! [`HttpClient`] implements [`converge_core::RemoteClient`] on top of
//! reqwest, so a [`converge_core::Reconciler`] can drive a real API.
//!
//! # Usage
//!
//! ```ignore
//! use converge_core::{Method, OperationKind, PollSpec, Reconciler, ResourceScope, Vocabulary};
//! use converge_http::HttpClient;
//!
//! let client = HttpClient::from_env()?;
//! let converged = Reconciler::new(&client)
//!     .submit_and_wait(
//!         Method::Delete,
//!         "/cloud/project/p1/network/private/pn-1",
//!         None,
//!         OperationKind::Delete,
//!         Vocabulary::PrivateNetwork,
//!         ResourceScope::new("p1").with_resource_id("pn-1"),
//!         &PollSpec::default(),
//!     )
//!     .await?;
//! ```

pub mod client;
pub mod error;

pub use client::{ClientConfig, DEFAULT_REQUEST_TIMEOUT, HttpClient};
pub use error::{HttpError, Result};
