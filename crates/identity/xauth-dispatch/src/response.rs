//! Translation of provider answers into outcomes.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;
use xauth_core::{AuthOutcome, AuthenticatedPlayer, FailureKind};

const RESULT_OK: f64 = 1.0;
const RESULT_DATA: f64 = 0.0;
const RESULT_PARAMETER_INVALID: f64 = 3.0;

/// Structured answer of an authentication provider.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ProviderResult {
    #[serde(default, deserialize_with = "lenient_result_code")]
    result_code: Option<f64>,
    user_id: Option<String>,
    nickname: Option<String>,
    auth_cookie: Option<Value>,
    data: Option<Value>,
    message: Option<String>,
    expire_at: Option<serde_json::Number>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawResultCode {
    Number(f64),
    Text(String),
}

/// `ResultCode` as a number, or a string holding one (`"1"`).
fn lenient_result_code<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    Ok(match Option::<RawResultCode>::deserialize(deserializer)? {
        Some(RawResultCode::Number(code)) => Some(code),
        Some(RawResultCode::Text(code)) => code.trim().parse().ok(),
        None => None,
    })
}

/// Turn a successful provider body into an outcome.
///
/// An empty body accepts the client. In JSON mode a body that is not a result
/// object is a denial; in plain mode only bodies that carry a `ResultCode` are
/// interpreted and anything else accepts the client. A `ResultCode` may be an
/// integer, a float or a numeric string.
pub fn translate_response(body: &[u8], forward_as_json: bool, user_id: &str) -> AuthOutcome {
    if body.iter().all(u8::is_ascii_whitespace) {
        return AuthOutcome::ok(user_id);
    }

    let parsed = serde_json::from_slice::<ProviderResult>(body)
        .ok()
        .filter(|result| result.result_code.is_some());

    match parsed {
        Some(result) => interpret(result, user_id),
        None if forward_as_json => {
            debug!(len = body.len(), "Provider answer is not a result object");
            AuthOutcome::failed(
                FailureKind::CustomAuthenticationFailed,
                "Invalid response from authentication provider",
            )
        }
        None => AuthOutcome::ok(user_id),
    }
}

fn interpret(result: ProviderResult, user_id: &str) -> AuthOutcome {
    let code = result.result_code.unwrap_or_default();

    if code == RESULT_OK {
        AuthOutcome::Ok(AuthenticatedPlayer {
            user_id: result
                .user_id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| user_id.to_string()),
            nickname: result.nickname,
            auth_cookie: result.auth_cookie.filter(Value::is_object),
            expire_at: result
                .expire_at
                .and_then(|n| n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))),
        })
    } else if code == RESULT_DATA {
        AuthOutcome::OkWithData {
            data: result.data.unwrap_or(Value::Null),
        }
    } else if code == RESULT_PARAMETER_INVALID {
        AuthOutcome::parameter_invalid(
            result
                .message
                .unwrap_or_else(|| "Invalid authentication parameters".to_string()),
        )
    } else {
        AuthOutcome::failed(
            FailureKind::CustomAuthenticationFailed,
            result
                .message
                .unwrap_or_else(|| "Custom authentication failed".to_string()),
        )
    }
}
