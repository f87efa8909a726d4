//! Core types for custom authentication dispatch.
//!
//! This crate holds the vocabulary shared by the queue, the token verifiers and
//! the dispatcher: the incoming [`AuthenticateRequest`], the per-provider
//! [`ProviderConfig`], the ordered [`QueryParams`] used by the merge engine, the
//! terminal [`AuthOutcome`] and the injected [`AuthMetrics`] sink.

mod auth_type;
mod metrics;
mod outcome;
mod params;
mod provider;
mod request;

pub use auth_type::{ClientAuthenticationType, ParseAuthTypeError};
pub use metrics::{AuthMetrics, CounterKind, InMemoryMetrics, NoopMetrics};
pub use outcome::{AuthOutcome, AuthenticatedPlayer, FailureKind, QueueResultCode};
pub use params::{QueryParams, RawQuery};
pub use provider::ProviderConfig;
pub use request::{AuthPayload, AuthenticateRequest};
