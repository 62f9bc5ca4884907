//! Request middleware.

use axum::{
    body::{to_bytes, Body},
    extract::{Query, Request},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value};
use tracing::debug;

/// Largest body the merge step will buffer.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Copy query-string parameters into the JSON object body.
///
/// Keys already present in the body win, and a repeated query key keeps its
/// first value. Bodies that are not JSON objects are passed through untouched
/// so the handler can reject them.
pub async fn merge_query_into_body(req: Request, next: Next) -> Response {
    let params = match Query::<Vec<(String, String)>>::try_from_uri(req.uri()) {
        Ok(Query(params)) if !params.is_empty() => params,
        _ => return next.run(req).await,
    };

    let (mut parts, body) = req.into_parts();
    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                format!("Failed to read request body: {}", e),
            )
                .into_response();
        }
    };

    let merged = match merge(&bytes, params) {
        Some(merged) => {
            debug!("Merged query parameters into request body");
            parts.headers.remove(header::CONTENT_LENGTH);
            Body::from(merged)
        }
        None => Body::from(bytes),
    };

    next.run(Request::from_parts(parts, merged)).await
}

/// Merged body bytes, or `None` when `body` is not an object (or empty).
fn merge(body: &[u8], params: Vec<(String, String)>) -> Option<Vec<u8>> {
    let mut fields = if body.iter().all(u8::is_ascii_whitespace) {
        Map::new()
    } else {
        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(fields)) => fields,
            _ => return None,
        }
    };

    for (key, value) in params {
        fields.entry(key).or_insert(Value::String(value));
    }

    serde_json::to_vec(&Value::Object(fields)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn as_json(bytes: Vec<u8>) -> Value {
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn query_fills_missing_keys() {
        let merged = merge(
            br#"{"database":"testdb"}"#,
            params(&[("serviceName", "Gaming UI")]),
        )
        .unwrap();

        assert_eq!(
            as_json(merged),
            json!({"database": "testdb", "serviceName": "Gaming UI"})
        );
    }

    #[test]
    fn body_wins_over_query() {
        let merged = merge(br#"{"database":"body"}"#, params(&[("database", "query")])).unwrap();

        assert_eq!(as_json(merged), json!({"database": "body"}));
    }

    #[test]
    fn repeated_query_key_keeps_first_value() {
        let merged = merge(
            br#"{}"#,
            params(&[("serviceName", "Gaming UI"), ("serviceName", "Billing")]),
        )
        .unwrap();

        assert_eq!(as_json(merged), json!({"serviceName": "Gaming UI"}));
    }

    #[test]
    fn empty_body_becomes_query_object() {
        let merged = merge(b"  ", params(&[("ipAddress", "127.0.0.1")])).unwrap();

        assert_eq!(as_json(merged), json!({"ipAddress": "127.0.0.1"}));
    }

    #[test]
    fn non_object_body_is_left_alone() {
        assert!(merge(b"[1]", params(&[("a", "b")])).is_none());
        assert!(merge(b"{oops", params(&[("a", "b")])).is_none());
    }
}
