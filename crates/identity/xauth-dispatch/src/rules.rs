//! Parameters some platforms need before a provider call makes sense.

use serde_json::{Map, Value};
use thiserror::Error;
use xauth_core::{ClientAuthenticationType, ProviderConfig, QueryParams};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Parameter '{0}' is missing")]
pub struct MissingParameter(pub &'static str);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderRule {
    pub auth_type: ClientAuthenticationType,
    /// Must be sent by the client, in the query string or a map payload
    pub client_params: &'static [&'static str],
    pub dashboard_params: &'static [&'static str],
}

const RULES: &[ProviderRule] = &[
    ProviderRule {
        auth_type: ClientAuthenticationType::Facebook,
        client_params: &["token"],
        dashboard_params: &["appid", "secret"],
    },
    ProviderRule {
        auth_type: ClientAuthenticationType::Steam,
        client_params: &["ticket"],
        dashboard_params: &["appid", "apiKeySecret"],
    },
    ProviderRule {
        auth_type: ClientAuthenticationType::Oculus,
        client_params: &["userid", "nonce"],
        dashboard_params: &["appid", "appsecret"],
    },
    ProviderRule {
        auth_type: ClientAuthenticationType::Viveport,
        client_params: &["usertoken"],
        dashboard_params: &["appid", "appsecret"],
    },
];

pub fn rule_for(auth_type: ClientAuthenticationType) -> Option<&'static ProviderRule> {
    RULES.iter().find(|rule| rule.auth_type == auth_type)
}

/// Client parameters are checked first, in table order.
pub fn check_required_params(
    rule: &ProviderRule,
    config: &ProviderConfig,
    client: &QueryParams,
    payload: Option<&Map<String, Value>>,
) -> Result<(), MissingParameter> {
    for name in rule.client_params {
        let in_query = client.get(name).is_some_and(|v| !v.is_empty());
        let in_payload = payload
            .and_then(|map| map.get(*name))
            .is_some_and(|v| !v.is_null() && v.as_str() != Some(""));
        if !in_query && !in_payload {
            return Err(MissingParameter(*name));
        }
    }

    for name in rule.dashboard_params {
        if config.dashboard_param(name).is_none_or(str::is_empty) {
            return Err(MissingParameter(*name));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steam(dashboard: &str) -> ProviderConfig {
        ProviderConfig::new(ClientAuthenticationType::Steam, "https://auth.example.com/steam")
            .with_static_query(dashboard)
    }

    #[test]
    fn test_rules_only_for_listed_platforms() {
        assert!(rule_for(ClientAuthenticationType::Steam).is_some());
        assert!(rule_for(ClientAuthenticationType::Custom).is_none());
        assert!(rule_for(ClientAuthenticationType::PlayStation).is_none());
    }

    #[test]
    fn test_all_present() {
        let rule = rule_for(ClientAuthenticationType::Steam).unwrap();
        let config = steam("appid=1&apiKeySecret=k");

        assert_eq!(
            check_required_params(rule, &config, &QueryParams::parse("ticket=t"), None),
            Ok(())
        );
    }

    #[test]
    fn test_client_param_may_come_from_payload() {
        let rule = rule_for(ClientAuthenticationType::Steam).unwrap();
        let config = steam("appid=1&apiKeySecret=k");
        let payload = serde_json::json!({"ticket": "t"});

        assert_eq!(
            check_required_params(rule, &config, &QueryParams::new(), payload.as_object()),
            Ok(())
        );
    }

    #[test]
    fn test_missing_client_param_reported_first() {
        let rule = rule_for(ClientAuthenticationType::Steam).unwrap();
        let config = steam("");

        let err = check_required_params(rule, &config, &QueryParams::parse("ticket="), None)
            .unwrap_err();
        assert_eq!(err.to_string(), "Parameter 'ticket' is missing");
    }

    #[test]
    fn test_missing_dashboard_param() {
        let rule = rule_for(ClientAuthenticationType::Oculus).unwrap();
        let config = ProviderConfig::new(ClientAuthenticationType::Oculus, "https://a")
            .with_static_query("appid=1");

        assert_eq!(
            check_required_params(rule, &config, &QueryParams::parse("userid=u&nonce=n"), None),
            Err(MissingParameter("appsecret"))
        );
    }
}
