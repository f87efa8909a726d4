use crate::auth_type::ClientAuthenticationType;
use crate::params::QueryParams;
use serde::{Deserialize, Serialize};

/// Server-side configuration of one enabled identity provider.
///
/// Snapshots are immutable and compared by value: a registry rebuild keeps the
/// existing request queue of a provider whose config did not change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub authentication_type: ClientAuthenticationType,
    pub base_uri: String,
    /// Dashboard parameters; they win over anything the client sends
    pub static_query_parameters: QueryParams,
    /// Expect structured JSON results from the provider
    pub forward_as_json: bool,
    /// Deny clients when the provider cannot be reached
    pub reject_if_unavailable: bool,
}

impl ProviderConfig {
    pub fn new(authentication_type: ClientAuthenticationType, base_uri: impl Into<String>) -> Self {
        Self {
            authentication_type,
            base_uri: base_uri.into(),
            static_query_parameters: QueryParams::new(),
            forward_as_json: false,
            reject_if_unavailable: true,
        }
    }

    pub fn with_static_params(mut self, params: QueryParams) -> Self {
        self.static_query_parameters = params;
        self
    }

    /// Convenience for dashboard params written as a query string.
    pub fn with_static_query(self, query: &str) -> Self {
        self.with_static_params(QueryParams::parse(query))
    }

    pub fn with_forward_as_json(mut self, forward_as_json: bool) -> Self {
        self.forward_as_json = forward_as_json;
        self
    }

    pub fn with_reject_if_unavailable(mut self, reject: bool) -> Self {
        self.reject_if_unavailable = reject;
        self
    }

    pub fn dashboard_param(&self, key: &str) -> Option<&str> {
        self.static_query_parameters.get(key)
    }
}
