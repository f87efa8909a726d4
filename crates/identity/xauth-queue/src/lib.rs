//! Request queues that carry provider calls to external authentication services.
//!
//! Every configured provider owns one [`ProviderQueue`]. The queue is a single
//! tokio task that owns all of its state; submissions and completions arrive as
//! messages, HTTP I/O runs on spawned tasks through an [`HttpTransport`].

mod actor;
mod error;
mod queue;
mod request;
mod transport;

#[cfg(test)]
mod tests;

pub use actor::ProviderQueue;
pub use error::{QueueError, QueueResult, TransportError};
pub use queue::{QueueSettings, QueueStats, RequestQueue};
pub use request::{HttpMethod, ProviderRequest, QueueResponse};
pub use transport::{HttpTransport, ReqwestTransport, TransportResponse};

pub use xauth_core::QueueResultCode;
