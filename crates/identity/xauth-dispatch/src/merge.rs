//! Merging of client parameters with dashboard parameters.
//!
//! Dashboard values always win. Query-string pairs sent by the client are
//! forwarded verbatim, or dropped when their key is set on the dashboard or
//! carried by a map payload. Map payloads keep their own keys but take the
//! dashboard value for any key both define.

use bytes::Bytes;
use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;
use xauth_core::{AuthPayload, ProviderConfig, RawQuery};
use xauth_queue::ProviderRequest;

pub const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeError {
    #[error("Unsupported post data type")]
    UnsupportedPostData,
}

/// Query string and body sent to a provider.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRequest {
    pub query_string: String,
    pub body: Option<Bytes>,
    pub content_type: Option<&'static str>,
}

impl MergedRequest {
    /// Attach to `base_uri`; the request is a `POST` iff there is a body.
    pub fn into_provider_request(self, base_uri: &str) -> ProviderRequest {
        let url = append_query(base_uri, &self.query_string);
        match self.body {
            Some(body) => {
                let request = ProviderRequest::post(url, body);
                match self.content_type {
                    Some(content_type) => request.with_content_type(content_type),
                    None => request,
                }
            }
            None => ProviderRequest::get(url),
        }
    }
}

pub fn merge_request(
    config: &ProviderConfig,
    client_params: Option<&str>,
    post_data: Option<&AuthPayload>,
) -> Result<MergedRequest, MergeError> {
    let dashboard = &config.static_query_parameters;

    let (body, content_type, body_keys) = match post_data {
        None => (None, None, HashSet::new()),
        Some(AuthPayload::Map(map)) => {
            let mut merged = map.clone();
            for (key, value) in dashboard.iter() {
                if let Some(slot) = merged.get_mut(key) {
                    *slot = Value::String(value.to_string());
                }
            }
            let encoded =
                serde_json::to_vec(&merged).map_err(|_| MergeError::UnsupportedPostData)?;
            let keys: HashSet<&str> = map.keys().map(String::as_str).collect();
            (Some(Bytes::from(encoded)), Some(JSON_CONTENT_TYPE), keys)
        }
        Some(AuthPayload::Text(text)) if !config.forward_as_json => {
            (Some(Bytes::from(text.clone())), None, HashSet::new())
        }
        Some(AuthPayload::Bytes(bytes)) if !config.forward_as_json => {
            (Some(Bytes::from(bytes.clone())), None, HashSet::new())
        }
        Some(_) => return Err(MergeError::UnsupportedPostData),
    };

    let mut query_string = dashboard.to_query_string();
    if let Some(raw) = client_params {
        for (key, segment) in RawQuery::parse(raw).iter() {
            if dashboard.contains_key(key) || body_keys.contains(key) {
                continue;
            }
            if !query_string.is_empty() {
                query_string.push('&');
            }
            query_string.push_str(segment);
        }
    }

    Ok(MergedRequest {
        query_string,
        body,
        content_type,
    })
}

fn append_query(base_uri: &str, query: &str) -> String {
    if query.is_empty() {
        return base_uri.to_string();
    }
    match base_uri.find('?') {
        None => format!("{base_uri}?{query}"),
        Some(_) if base_uri.ends_with('?') || base_uri.ends_with('&') => {
            format!("{base_uri}{query}")
        }
        Some(_) => format!("{base_uri}&{query}"),
    }
}
