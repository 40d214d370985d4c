//! Acknowledgement bodies returned by the webhook server.

use serde_json::{Value, json};

/// Build a success acknowledgement.
pub fn ack_success(message: &str) -> Value {
    json!({
        "status": "success",
        "message": message
    })
}

/// Build an error acknowledgement.
pub fn ack_error(message: &str) -> Value {
    json!({
        "status": "error",
        "message": message
    })
}

/// Body for the liveness probe.
pub fn health() -> Value {
    json!({
        "status": "healthy",
        "service": "bot-server"
    })
}
