//! Request handlers, one module per API surface.
//!
//! Every success response goes through [`success`] so the wire envelope is
//! uniform: `{"success": true, ...payload}`.  Failures are [`ApiError`]s and
//! carry `{"success": false, "error": "..."}`.

pub mod access;
pub mod collaborators;
pub mod notifications;
pub mod realtime;
pub mod records;
pub mod versions;

use axum::Json;
use serde_json::{json, Value};

use crate::error::ApiError;

pub type ApiResult = Result<Json<Value>, ApiError>;

/// Wrap a payload object in the success envelope.
pub fn success(payload: Value) -> Json<Value> {
    match payload {
        Value::Object(mut obj) => {
            obj.insert("success".to_string(), json!(true));
            Json(Value::Object(obj))
        }
        other => Json(json!({ "success": true, "data": other })),
    }
}
