//! Request types for the control protocol.

use serde::{Deserialize, Serialize};

/// A control request from a client.
///
/// Peer commands additionally carry a bearer token issued by the token
/// authority; user registration and token issuance do not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// The command to execute (e.g., "user.register", "peer.add").
    pub command: String,

    /// Command parameters as a JSON object.
    #[serde(default)]
    pub params: serde_json::Value,

    /// Bearer token for authenticated commands.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Request {
    /// Create a request with empty parameters (for testing).
    #[cfg(test)]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            params: serde_json::json!({}),
            token: None,
        }
    }

    /// Add a parameter (builder pattern, for testing).
    #[cfg(test)]
    pub fn with_param(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        if let Some(obj) = self.params.as_object_mut() {
            obj.insert(key.to_string(), value.into());
        }
        self
    }

    /// Attach a bearer token (builder pattern, for testing).
    #[cfg(test)]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}
