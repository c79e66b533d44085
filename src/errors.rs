use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Error shape handed to callers for display, regardless of where it came from.
///
/// `status` is `None` for transport failures where no response was received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
}

impl NormalizedError {
    /// Build from a non-2xx response. Prefers `error.code`/`error.message`,
    /// then a top-level `message`, then a generic status line.
    pub fn from_response(status: reqwest::StatusCode, body: &Value) -> Self {
        let structured = body.get("error").filter(|e| e.is_object());

        let code = structured
            .and_then(|e| e.get("code"))
            .and_then(value_as_string)
            .or_else(|| body.get("code").and_then(value_as_string));

        let message = structured
            .and_then(|e| e.get("message"))
            .and_then(Value::as_str)
            .or_else(|| body.get("message").and_then(Value::as_str))
            .or_else(|| body.get("error").and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| format!("Request failed with status code {}", status.as_u16()));

        Self {
            message,
            code,
            status: Some(status.as_u16()),
            status_text: status.canonical_reason().map(str::to_string),
        }
    }

    fn local(message: impl Into<String>, code: &str) -> Self {
        Self {
            message: message.into(),
            code: Some(code.to_string()),
            status: None,
            status_text: None,
        }
    }
}

impl fmt::Display for NormalizedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.status, &self.code) {
            (Some(status), Some(code)) => write!(f, "{} ({}): {}", status, code, self.message),
            (Some(status), None) => write!(f, "{}: {}", status, self.message),
            (None, _) => write!(f, "{}", self.message),
        }
    }
}

fn value_as_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Errors surfaced by the API client.
///
/// `Clone` because a single refresh failure is delivered to every queued waiter.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("network error: {message}")]
    Network { message: String },

    #[error("{0}")]
    Http(NormalizedError),

    #[error("session is not authenticated")]
    Unauthenticated,

    #[error("forbidden: {}", .error.message)]
    Forbidden {
        error: NormalizedError,
        /// True when the forbidden event was emitted instead of surfacing inline.
        redirected: bool,
    },

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("token refresh timed out after {0:?}")]
    RefreshTimeout(Duration),

    #[error("token refresh was abandoned before completion")]
    RefreshAbandoned,

    #[error("failed to encode request body: {0}")]
    Encode(String),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("session storage error: {0}")]
    Storage(String),

    #[error("invalid client configuration: {0}")]
    Config(String),
}

impl ApiError {
    /// HTTP status of the failed response, if there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http(e) | ApiError::Forbidden { error: e, .. } => e.status,
            ApiError::Unauthenticated => Some(401),
            _ => None,
        }
    }

    /// Flatten into the display shape used by callers.
    pub fn normalized(&self) -> NormalizedError {
        match self {
            ApiError::Http(e) | ApiError::Forbidden { error: e, .. } => e.clone(),
            ApiError::Network { message } => NormalizedError::local(message.clone(), "network_error"),
            ApiError::Unauthenticated => NormalizedError {
                message: "authentication required".to_string(),
                code: Some("unauthenticated".to_string()),
                status: Some(401),
                status_text: Some("Unauthorized".to_string()),
            },
            ApiError::RefreshFailed(_) | ApiError::RefreshTimeout(_) | ApiError::RefreshAbandoned => {
                NormalizedError::local(self.to_string(), "refresh_failed")
            }
            ApiError::Encode(_) => NormalizedError::local(self.to_string(), "encode_error"),
            ApiError::Decode(_) => NormalizedError::local(self.to_string(), "decode_error"),
            ApiError::Storage(_) => NormalizedError::local(self.to_string(), "storage_error"),
            ApiError::Config(_) => NormalizedError::local(self.to_string(), "config_error"),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        let message = if e.is_timeout() {
            format!("request timed out: {}", e)
        } else {
            e.to_string()
        };
        ApiError::Network { message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use serde_json::json;

    #[test]
    fn test_prefers_structured_error_body() {
        let body = json!({"error": {"code": "REMINDER_INVALID", "message": "date is required"}, "message": "outer"});
        let e = NormalizedError::from_response(StatusCode::UNPROCESSABLE_ENTITY, &body);
        assert_eq!(e.code.as_deref(), Some("REMINDER_INVALID"));
        assert_eq!(e.message, "date is required");
        assert_eq!(e.status, Some(422));
        assert_eq!(e.status_text.as_deref(), Some("Unprocessable Entity"));
    }

    #[test]
    fn test_falls_back_to_top_level_message() {
        let body = json!({"message": "customer not found"});
        let e = NormalizedError::from_response(StatusCode::NOT_FOUND, &body);
        assert_eq!(e.message, "customer not found");
        assert!(e.code.is_none());
    }

    #[test]
    fn test_generic_message_for_unstructured_body() {
        let e = NormalizedError::from_response(StatusCode::BAD_GATEWAY, &Value::Null);
        assert_eq!(e.message, "Request failed with status code 502");
        assert_eq!(e.status, Some(502));
    }

    #[test]
    fn test_numeric_error_code_is_stringified() {
        let body = json!({"error": {"code": 4031, "message": "nope"}});
        let e = NormalizedError::from_response(StatusCode::FORBIDDEN, &body);
        assert_eq!(e.code.as_deref(), Some("4031"));
    }

    #[test]
    fn test_network_error_has_no_status() {
        let e = ApiError::Network { message: "connection refused".into() };
        let n = e.normalized();
        assert!(n.status.is_none());
        assert_eq!(n.code.as_deref(), Some("network_error"));
        assert!(e.status().is_none());
    }

    #[test]
    fn test_normalized_serializes_without_empty_fields() {
        let n = ApiError::Decode("bad json".into()).normalized();
        let json = serde_json::to_value(&n).unwrap();
        assert!(json.get("status").is_none());
        assert_eq!(json["code"], "decode_error");
    }
}
