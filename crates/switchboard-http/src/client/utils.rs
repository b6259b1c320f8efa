//! Utility functions for the Switchboard transport clients.

use crate::error::{Result, TransportError};
use crate::types::Scope;
use serde_json::Value;
use url::Url;

pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 425 | 429 | 500 | 502 | 503 | 504)
}

pub fn is_access_denied_status(status: u16) -> bool {
    matches!(status, 401 | 403)
}

/// Build the push URL for a scope: `{push_url}?channel=<key>&token=<bearer>`.
pub fn push_url(base: &str, scope: &Scope, token: Option<&str>) -> Result<Url> {
    let mut url = Url::parse(base)?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("channel", &scope.channel_key());
        if let Some(token) = token {
            query.append_pair("token", token);
        }
    }
    Ok(url)
}

/// Join a relative API path onto the base URL without dropping its path segments.
pub fn api_url(base: &str, path: &str) -> Result<Url> {
    let normalized = if base.ends_with('/') {
        base.to_string()
    } else {
        format!("{}/", base)
    };
    Ok(Url::parse(&normalized)?.join(path.trim_start_matches('/'))?)
}

/// Listings come back either as a bare array or wrapped as
/// `{"payload": [...]}` / `{"data": {"payload": [...]}}`.
pub fn unwrap_listing(value: Value) -> Result<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => {
            for key in ["payload", "data"] {
                if let Some(inner) = map.remove(key) {
                    return unwrap_listing(inner);
                }
            }
            Err(TransportError::Malformed(
                "listing object has neither payload nor data".to_string(),
            ))
        }
        other => Err(TransportError::Malformed(format!(
            "expected a listing, got {}",
            type_name(&other)
        ))),
    }
}

/// Single records may also be wrapped in `{"payload": {...}}`.
pub fn unwrap_record(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.len() == 1 && map.contains_key("payload") => {
            map.remove("payload").unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
