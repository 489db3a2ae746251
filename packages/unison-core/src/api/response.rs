//! JSON response helpers shared by HTTP handlers.

use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

/// Wraps a successful payload as `{"success": true, ...payload}`.
///
/// Object payloads are flattened into the envelope; anything else lands
/// under `data`.
pub fn api_success(payload: impl Serialize) -> Json<Value> {
    let body = match serde_json::to_value(payload) {
        Ok(Value::Object(mut map)) => {
            map.insert("success".to_string(), Value::Bool(true));
            Value::Object(map)
        }
        Ok(other) => json!({ "success": true, "data": other }),
        Err(e) => {
            log::warn!("[API] Failed to serialize response: {}", e);
            json!({ "success": true })
        }
    };
    Json(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_payload_is_flattened() {
        let Json(body) = api_success(json!({ "resolved": 3 }));
        assert_eq!(body, json!({ "success": true, "resolved": 3 }));
    }

    #[test]
    fn array_payload_goes_under_data() {
        let Json(body) = api_success(vec![1, 2]);
        assert_eq!(body, json!({ "success": true, "data": [1, 2] }));
    }
}
