//! Authentication dispatch pipeline.

use crate::error::DispatchResult;
use crate::merge::merge_request;
use crate::registry::{ProviderKind, ProviderRegistry, ProviderResources, RegisteredProvider};
use crate::response::translate_response;
use crate::rules::{check_required_params, rule_for};
use arc_swap::ArcSwap;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, warn};
use xauth_console::{CertificateError, NintendoVerifier};
use xauth_core::{
    AuthMetrics, AuthOutcome, AuthPayload, AuthenticateRequest, AuthenticatedPlayer,
    ClientAuthenticationType, CounterKind, FailureKind, ProviderConfig, QueryParams,
    QueueResultCode,
};
use xauth_queue::RequestQueue;
use xauth_token::{TokenError, TokenVerifier};

const NINTENDO_TOKEN_PARAM: &str = "token";

/// Per-application settings that apply to every request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthSettings {
    pub application_id: String,
    /// Let clients without credentials through on their own user id
    pub allow_anonymous: bool,
}

impl AuthSettings {
    pub fn new(application_id: impl Into<String>) -> Self {
        Self {
            application_id: application_id.into(),
            allow_anonymous: false,
        }
    }

    pub fn with_allow_anonymous(mut self, allow: bool) -> Self {
        self.allow_anonymous = allow;
        self
    }
}

/// Routes authentication requests to the configured providers.
///
/// The registry is swapped atomically on [`Dispatcher::rebuild`]; requests
/// already in flight finish against the registry they started with.
pub struct Dispatcher {
    registry: ArcSwap<ProviderRegistry>,
    resources: ProviderResources,
    metrics: Arc<dyn AuthMetrics>,
    retry_count: u32,
    rebuild_lock: Mutex<()>,
}

impl Dispatcher {
    pub fn new(resources: ProviderResources, metrics: Arc<dyn AuthMetrics>) -> Self {
        Self {
            registry: ArcSwap::from_pointee(ProviderRegistry::empty()),
            resources,
            metrics,
            retry_count: 1,
            rebuild_lock: Mutex::new(()),
        }
    }

    /// Connection retries handed to the queues with every request.
    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    /// Replace the provider set. On error the current registry stays active.
    pub fn rebuild(&self, configs: &[ProviderConfig]) -> DispatchResult<()> {
        let _guard = self
            .rebuild_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let current = self.registry.load_full();
        let next = ProviderRegistry::build(configs, Some(&current), &self.resources)?;
        info!(
            providers = ?next.auth_types().map(ClientAuthenticationType::as_str).collect::<Vec<_>>(),
            "Provider registry swapped"
        );
        self.registry.store(Arc::new(next));
        Ok(())
    }

    pub fn registry(&self) -> Arc<ProviderRegistry> {
        self.registry.load_full()
    }

    /// Authenticate one client. Always yields exactly one outcome.
    pub async fn authenticate_client(
        &self,
        request: &AuthenticateRequest,
        settings: &AuthSettings,
    ) -> AuthOutcome {
        let auth_type = request.client_authentication_type;

        match AssertUnwindSafe(self.dispatch(request, settings))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => {
                error!(
                    auth_type = %auth_type,
                    user_id = %request.user_id,
                    panic = %panic_message(panic.as_ref()),
                    "Authentication pipeline panicked"
                );
                self.metrics.increment(auth_type, CounterKind::Errors);
                AuthOutcome::failed(FailureKind::InternalServerError, "Internal server error")
            }
        }
    }

    async fn dispatch(&self, request: &AuthenticateRequest, settings: &AuthSettings) -> AuthOutcome {
        let auth_type = request.client_authentication_type;
        let registry = self.registry.load_full();

        let Some(provider) = registry.get(auth_type) else {
            if auth_type == ClientAuthenticationType::Custom && settings.allow_anonymous {
                debug!(user_id = %request.user_id, "No custom provider, anonymous access");
                return AuthOutcome::ok(request.user_id.clone());
            }
            debug!(auth_type = %auth_type, "No provider registered");
            self.metrics.increment(auth_type, CounterKind::Errors);
            return AuthOutcome::failed(
                FailureKind::NotSupported,
                "Authentication type not supported",
            );
        };

        if !request.has_client_params() && !request.has_post_data() && settings.allow_anonymous {
            debug!(auth_type = %auth_type, user_id = %request.user_id, "Anonymous access");
            return AuthOutcome::ok(request.user_id.clone());
        }

        match &provider.kind {
            ProviderKind::Console(verifier) => self.verify_console(verifier, request).await,
            ProviderKind::SymmetricToken(verifier) => {
                self.verify_symmetric(verifier, request, settings)
            }
            ProviderKind::Http(queue) => self.call_provider(provider, queue.as_ref(), request).await,
        }
    }

    async fn verify_console(
        &self,
        verifier: &NintendoVerifier,
        request: &AuthenticateRequest,
    ) -> AuthOutcome {
        let auth_type = request.client_authentication_type;

        let Some(token) = console_token(request) else {
            self.metrics.increment(auth_type, CounterKind::Errors);
            return AuthOutcome::failed(
                FailureKind::MissingParameter,
                format!("Parameter '{NINTENDO_TOKEN_PARAM}' is missing"),
            );
        };

        match verifier.verify(&token).await {
            Ok(identity) => {
                debug!(user_id = %identity.user_id, environment = %identity.environment, "Nintendo token accepted");
                self.metrics.increment(auth_type, CounterKind::ResultsAccepted);
                AuthOutcome::ok(identity.user_id)
            }
            Err(CertificateError::RetrievalTimeout) => {
                warn!(auth_type = %auth_type, "Certificate retrieval timed out");
                self.metrics.increment(auth_type, CounterKind::Errors);
                AuthOutcome::failed(
                    FailureKind::CertificateTimeout,
                    CertificateError::RetrievalTimeout.to_string(),
                )
            }
            Err(e) => {
                debug!(auth_type = %auth_type, error = %e, "Nintendo token rejected");
                self.metrics.increment(auth_type, CounterKind::ResultsDenied);
                AuthOutcome::failed(FailureKind::AuthTokenInvalid, e.to_string())
            }
        }
    }

    fn verify_symmetric(
        &self,
        verifier: &TokenVerifier,
        request: &AuthenticateRequest,
        settings: &AuthSettings,
    ) -> AuthOutcome {
        let auth_type = request.client_authentication_type;

        let Some(token) = request
            .client_authentication_data
            .as_ref()
            .and_then(AuthPayload::as_text)
        else {
            self.metrics.increment(auth_type, CounterKind::Errors);
            return AuthOutcome::parameter_invalid("Token must be sent as text");
        };

        let expected_app_id = (auth_type == ClientAuthenticationType::PlayerIo)
            .then_some(settings.application_id.as_str());

        match verifier.verify(token, expected_app_id) {
            Ok(claims) => {
                self.metrics.increment(auth_type, CounterKind::ResultsAccepted);
                let auth_cookie = claims.auth_cookie_value();
                AuthOutcome::Ok(AuthenticatedPlayer {
                    user_id: claims.user_id,
                    nickname: claims.nickname,
                    auth_cookie,
                    expire_at: Some(claims.exp),
                })
            }
            Err(TokenError::Expired) => {
                self.metrics.increment(auth_type, CounterKind::ResultsDenied);
                AuthOutcome::failed(FailureKind::AuthTokenExpired, TokenError::Expired.to_string())
            }
            Err(e) => {
                debug!(auth_type = %auth_type, error = ?e, "Token rejected");
                self.metrics.increment(auth_type, CounterKind::ResultsDenied);
                AuthOutcome::failed(FailureKind::AuthTokenInvalid, "Token invalid")
            }
        }
    }

    async fn call_provider(
        &self,
        provider: &RegisteredProvider,
        queue: &dyn RequestQueue,
        request: &AuthenticateRequest,
    ) -> AuthOutcome {
        let auth_type = request.client_authentication_type;
        let config = provider.config.as_ref();

        if let Some(rule) = rule_for(auth_type) {
            let client = request
                .client_authentication_params
                .as_deref()
                .map(QueryParams::parse)
                .unwrap_or_default();
            let payload = request
                .client_authentication_data
                .as_ref()
                .and_then(AuthPayload::as_map);

            if let Err(missing) = check_required_params(rule, config, &client, payload) {
                debug!(auth_type = %auth_type, parameter = missing.0, "Required parameter missing");
                self.metrics.increment(auth_type, CounterKind::Errors);
                return AuthOutcome::failed(FailureKind::MissingParameter, missing.to_string());
            }
        }

        let merged = match merge_request(
            config,
            request.client_authentication_params.as_deref(),
            request.client_authentication_data.as_ref(),
        ) {
            Ok(merged) => merged,
            Err(e) => {
                debug!(
                    auth_type = %auth_type,
                    payload = request.client_authentication_data.as_ref().map(AuthPayload::kind),
                    "Post data rejected"
                );
                self.metrics.increment(auth_type, CounterKind::Errors);
                return AuthOutcome::failed(FailureKind::UnsupportedPostData, e.to_string());
            }
        };

        debug!(
            auth_type = %auth_type,
            query = %redact(&merged.query_string, config),
            has_body = merged.body.is_some(),
            "Calling provider"
        );

        let response = queue
            .enqueue(merged.into_provider_request(&config.base_uri), self.retry_count)
            .await;
        self.metrics.record_latency(auth_type, response.elapsed);

        if !response.is_success() {
            let counter = match response.result {
                QueueResultCode::QueueFull => CounterKind::QueueFullErrors,
                QueueResultCode::QueueTimeout => CounterKind::QueueTimeouts,
                QueueResultCode::RequestTimeout => CounterKind::HttpTimeouts,
                _ => CounterKind::HttpErrors,
            };
            self.metrics.increment(auth_type, counter);

            let reason = response.reason();
            warn!(auth_type = %auth_type, result = %response.result, reason = %reason, "Provider unavailable");

            if !config.reject_if_unavailable {
                return AuthOutcome::ok(request.user_id.clone());
            }
            return AuthOutcome::failed(FailureKind::Transport(response.result), reason);
        }

        let outcome = translate_response(&response.body, config.forward_as_json, &request.user_id);
        let counter = match &outcome {
            AuthOutcome::Ok(_) => CounterKind::ResultsAccepted,
            AuthOutcome::OkWithData { .. } => CounterKind::ResultsData,
            AuthOutcome::Failed { .. } | AuthOutcome::ParameterInvalid { .. } => {
                CounterKind::ResultsDenied
            }
        };
        self.metrics.increment(auth_type, counter);
        outcome
    }
}

/// Token from the `token` parameter, or the text payload.
fn console_token(request: &AuthenticateRequest) -> Option<String> {
    let from_params = request
        .client_authentication_params
        .as_deref()
        .map(QueryParams::parse)
        .and_then(|params| params.get(NINTENDO_TOKEN_PARAM).map(str::to_string))
        .filter(|token| !token.trim().is_empty());

    from_params.or_else(|| {
        request
            .client_authentication_data
            .as_ref()
            .and_then(AuthPayload::as_text)
            .filter(|token| !token.trim().is_empty())
            .map(str::to_string)
    })
}

/// Query string with dashboard values masked.
fn redact(query: &str, config: &ProviderConfig) -> String {
    QueryParams::parse(query)
        .iter()
        .map(|(key, value)| {
            if config.static_query_parameters.contains_key(key) {
                format!("{key}=***")
            } else {
                format!("{key}={value}")
            }
        })
        .collect::<Vec<_>>()
        .join("&")
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
