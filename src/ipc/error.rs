use crate::timetable::error::TimetableError;
use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Maps a core error onto the wire envelope, logging it at the level its kind warrants.
pub fn timetable_err(id: &str, method: &str, e: &TimetableError) -> serde_json::Value {
    match e {
        TimetableError::Transport(_) => {
            tracing::error!(request_id = id, method, error = %e, "store request failed")
        }
        TimetableError::IllegalTransition { .. } => {
            tracing::error!(request_id = id, method, error = %e, "entry lifecycle invariant violated")
        }
        TimetableError::ConfigurationIncomplete { .. } => {
            tracing::warn!(request_id = id, method, error = %e, "timetable configuration incomplete")
        }
        _ => tracing::debug!(request_id = id, method, code = e.code(), error = %e, "request rejected"),
    }
    err(id, e.code(), e.to_string(), e.details())
}

/// Serializes a handler result, mapping the rare serializer failure to an error envelope.
pub fn ok_serialized<T: serde::Serialize>(id: &str, value: &T) -> serde_json::Value {
    match serde_json::to_value(value) {
        Ok(v) => ok(id, v),
        Err(e) => err(id, "encode_failed", e.to_string(), None),
    }
}
