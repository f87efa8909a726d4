//! Provider registry.
//!
//! The registry maps each configured authentication type to the capability
//! that verifies it. It is built once per configuration snapshot; a rebuild
//! keeps the queue or verifier of every provider whose config is unchanged.

use crate::error::{DispatchError, DispatchResult};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};
use xauth_console::{CertificateCache, NintendoSettings, NintendoVerifier};
use xauth_core::{ClientAuthenticationType, ProviderConfig};
use xauth_queue::{HttpTransport, ProviderQueue, QueueSettings, QueueStats, RequestQueue};
use xauth_token::{KeyRing, TokenVerifier};

const SECRET_PARAM: &str = "secret";
const FALLBACK_SECRET_PARAM: &str = "fallbackSecret";
const APP_ID_PARAM: &str = "appid";

/// How requests of one authentication type are verified.
#[derive(Clone)]
pub enum ProviderKind {
    /// External HTTP service behind a request queue
    Http(Arc<dyn RequestQueue>),
    /// Locally verified symmetric token (Jwt, PlayerIo)
    SymmetricToken(Arc<TokenVerifier>),
    /// Nintendo ID token checked against published certificates
    Console(Arc<NintendoVerifier>),
}

impl fmt::Debug for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Http(queue) => f.debug_tuple("Http").field(&queue.stats()).finish(),
            ProviderKind::SymmetricToken(_) => f.write_str("SymmetricToken"),
            ProviderKind::Console(verifier) => f
                .debug_tuple("Console")
                .field(&verifier.app_id())
                .finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegisteredProvider {
    pub config: Arc<ProviderConfig>,
    pub kind: ProviderKind,
}

/// Creates the request queue of an HTTP provider.
pub trait QueueFactory: Send + Sync {
    fn create(&self, config: &ProviderConfig) -> Arc<dyn RequestQueue>;
}

impl<F> QueueFactory for F
where
    F: Fn(&ProviderConfig) -> Arc<dyn RequestQueue> + Send + Sync,
{
    fn create(&self, config: &ProviderConfig) -> Arc<dyn RequestQueue> {
        self(config)
    }
}

/// Spawns one [`ProviderQueue`] actor per provider, all sharing a transport.
pub struct ProviderQueueFactory {
    settings: QueueSettings,
    transport: Arc<dyn HttpTransport>,
}

impl ProviderQueueFactory {
    pub fn new(settings: QueueSettings, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            settings,
            transport,
        }
    }
}

impl QueueFactory for ProviderQueueFactory {
    fn create(&self, config: &ProviderConfig) -> Arc<dyn RequestQueue> {
        Arc::new(ProviderQueue::spawn(
            config.authentication_type.as_str(),
            self.settings.clone(),
            self.transport.clone(),
        ))
    }
}

/// Shared resources handed to every provider built by the registry.
#[derive(Clone)]
pub struct ProviderResources {
    pub queue_factory: Arc<dyn QueueFactory>,
    pub certificates: CertificateCache,
    pub nintendo: Arc<NintendoSettings>,
}

impl ProviderResources {
    pub fn new(
        queue_factory: Arc<dyn QueueFactory>,
        certificates: CertificateCache,
        nintendo: NintendoSettings,
    ) -> Self {
        Self {
            queue_factory,
            certificates,
            nintendo: Arc::new(nintendo),
        }
    }
}

/// Immutable mapping from authentication type to provider.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<ClientAuthenticationType, RegisteredProvider>,
}

impl ProviderRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a registry for `configs`, reusing entries of `previous` whose
    /// config is equal.
    pub fn build(
        configs: &[ProviderConfig],
        previous: Option<&ProviderRegistry>,
        resources: &ProviderResources,
    ) -> DispatchResult<Self> {
        let mut providers = BTreeMap::new();
        let mut reused = 0usize;

        for config in configs {
            let auth_type = config.authentication_type;
            if providers.contains_key(&auth_type) {
                return Err(DispatchError::DuplicateProvider(auth_type));
            }

            let existing = previous
                .and_then(|registry| registry.get(auth_type))
                .filter(|provider| provider.config.as_ref() == config);

            let provider = match existing {
                Some(provider) => {
                    debug!(auth_type = %auth_type, "Keeping unchanged provider");
                    reused += 1;
                    provider.clone()
                }
                None => RegisteredProvider {
                    config: Arc::new(config.clone()),
                    kind: build_kind(config, resources)?,
                },
            };
            providers.insert(auth_type, provider);
        }

        info!(
            providers = providers.len(),
            reused,
            "Provider registry built"
        );
        Ok(Self { providers })
    }

    pub fn get(&self, auth_type: ClientAuthenticationType) -> Option<&RegisteredProvider> {
        self.providers.get(&auth_type)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn auth_types(&self) -> impl Iterator<Item = ClientAuthenticationType> + '_ {
        self.providers.keys().copied()
    }

    /// Stats of every HTTP provider queue.
    pub fn queue_stats(&self) -> Vec<(ClientAuthenticationType, QueueStats)> {
        self.providers
            .iter()
            .filter_map(|(auth_type, provider)| match &provider.kind {
                ProviderKind::Http(queue) => Some((*auth_type, queue.stats())),
                _ => None,
            })
            .collect()
    }
}

fn build_kind(config: &ProviderConfig, resources: &ProviderResources) -> DispatchResult<ProviderKind> {
    let auth_type = config.authentication_type;

    match auth_type {
        ClientAuthenticationType::Jwt | ClientAuthenticationType::PlayerIo => {
            let secret = required_param(config, SECRET_PARAM)?;
            let fallback = config
                .dashboard_param(FALLBACK_SECRET_PARAM)
                .filter(|s| !s.is_empty());
            let keys = KeyRing::from_secrets(secret, fallback).map_err(|e| {
                DispatchError::InvalidProvider {
                    auth_type,
                    reason: e.to_string(),
                }
            })?;
            info!(auth_type = %auth_type, fallback = fallback.is_some(), "Registered token provider");
            Ok(ProviderKind::SymmetricToken(Arc::new(TokenVerifier::new(keys))))
        }
        ClientAuthenticationType::Nintendo => {
            let app_id = required_param(config, APP_ID_PARAM)?;
            info!(auth_type = %auth_type, app_id = %app_id, "Registered console provider");
            Ok(ProviderKind::Console(Arc::new(NintendoVerifier::new(
                resources.certificates.clone(),
                resources.nintendo.clone(),
                app_id,
            ))))
        }
        _ => {
            if config.base_uri.trim().is_empty() {
                return Err(DispatchError::InvalidProvider {
                    auth_type,
                    reason: "base_uri is empty".to_string(),
                });
            }
            info!(auth_type = %auth_type, base_uri = %config.base_uri, "Registered HTTP provider");
            Ok(ProviderKind::Http(resources.queue_factory.create(config)))
        }
    }
}

fn required_param<'a>(config: &'a ProviderConfig, key: &'static str) -> DispatchResult<&'a str> {
    config
        .dashboard_param(key)
        .filter(|value| !value.is_empty())
        .ok_or(DispatchError::MissingSetting {
            auth_type: config.authentication_type,
            key,
        })
}
