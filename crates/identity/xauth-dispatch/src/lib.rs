//! Custom authentication dispatcher.
//!
//! The [`Dispatcher`] routes each [`AuthenticateRequest`] to the provider
//! registered for its authentication type: an external HTTP service reached
//! through a request queue, the symmetric token verifier, or the Nintendo
//! certificate pipeline. Every request yields exactly one [`AuthOutcome`].

mod config;
mod dispatcher;
mod error;
mod merge;
mod registry;
mod response;
mod rules;


pub use crate::config::{
    ApplicationConfig, LoggingConfig, NintendoConfig, ProviderEntry, QueueConfig, XauthConfig,
};
pub use dispatcher::{AuthSettings, Dispatcher};
pub use error::{ConfigError, DispatchError, DispatchResult};
pub use merge::{JSON_CONTENT_TYPE, MergeError, MergedRequest, merge_request};
pub use registry::{
    ProviderKind, ProviderQueueFactory, ProviderRegistry, ProviderResources, QueueFactory,
    RegisteredProvider,
};
pub use response::translate_response;
pub use rules::{MissingParameter, ProviderRule, check_required_params, rule_for};

pub use xauth_core::{AuthOutcome, AuthenticateRequest};
