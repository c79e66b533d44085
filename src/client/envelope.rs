//! Response body decoding. The backend wraps successful payloads as
//! `{ "success": true, "data": ... }`; some endpoints return bare JSON.
//! Bodies are decoded here exactly once, so callers only ever see `T`.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::ApiError;

/// Parse raw bytes as JSON. Empty or non-JSON bodies become `Null` / a string.
pub fn parse_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

/// Strip the success envelope if present, otherwise pass the body through.
pub fn unwrap_envelope(body: Value) -> Value {
    match body {
        Value::Object(mut map)
            if map.get("success").and_then(Value::as_bool) == Some(true)
                && map.contains_key("data") =>
        {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

pub fn decode<T: DeserializeOwned>(body: Value) -> Result<T, ApiError> {
    serde_json::from_value(unwrap_envelope(body)).map_err(|e| ApiError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Customer {
        id: u32,
        name: String,
    }

    #[test]
    fn test_envelope_yields_data() {
        let c: Customer = decode(json!({"success": true, "data": {"id": 5, "name": "Ada"}})).unwrap();
        assert_eq!(c, Customer { id: 5, name: "Ada".into() });
    }

    #[test]
    fn test_unsuccessful_envelope_is_returned_raw() {
        let body = json!({"success": false, "data": null, "message": "partial"});
        assert_eq!(unwrap_envelope(body.clone()), body);
    }

    #[test]
    fn test_bare_body_passes_through() {
        let c: Customer = decode(json!({"id": 1, "name": "Bo"})).unwrap();
        assert_eq!(c.id, 1);
    }

    #[test]
    fn test_empty_body_is_null() {
        assert_eq!(parse_body(b""), Value::Null);
        assert_eq!(parse_body(b"  \n"), Value::Null);
        decode::<()>(parse_body(b"")).unwrap();
    }

    #[test]
    fn test_non_json_body_becomes_string() {
        assert_eq!(parse_body(b"<html>502</html>"), Value::String("<html>502</html>".into()));
    }

    #[test]
    fn test_shape_mismatch_is_decode_error() {
        let err = decode::<Customer>(json!({"success": true, "data": [1, 2]})).unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }
}
