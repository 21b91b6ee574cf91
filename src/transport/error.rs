#[cfg(test)]
#[path = "error_test.rs"]
mod tests;

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

use crate::auth::AuthError;

#[derive(Debug, Error)]
pub enum ChatApiError {
    #[error("chat endpoint not found")]
    EndpointNotFound,

    #[error("chat server error: {0}")]
    ServerError(String),

    #[error("authentication required")]
    AuthenticationRequired,

    #[error("access denied")]
    Forbidden,

    #[error("chat request failed ({status}): {message}")]
    Request { status: u16, message: String },

    #[error("invalid response from chat server: {0}")]
    InvalidResponse(String),

    #[error("invalid chat endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("sending chat request: {0}")]
    Network(#[from] reqwest::Error),
}

impl ChatApiError {
    /// Text shown to the user in place of the assistant reply.
    pub fn user_message(&self) -> String {
        match self {
            ChatApiError::EndpointNotFound => {
                "Chat API endpoint not found. Please check if the backend server is running."
                    .to_string()
            }
            ChatApiError::ServerError(_) => "Internal server error. Please contact support.".to_string(),
            ChatApiError::AuthenticationRequired => "Please log in to use the chatbot".to_string(),
            ChatApiError::Forbidden => "Access denied. Please check your permissions.".to_string(),
            ChatApiError::Request { message, .. } => format!("Failed to send message: {}", message),
            ChatApiError::InvalidResponse(_) => {
                "Invalid response format received from server.".to_string()
            }
            ChatApiError::InvalidEndpoint(_) => {
                "The chat endpoint is not configured correctly.".to_string()
            }
            ChatApiError::Network(_) => {
                "Could not reach the chat server. Please check your connection.".to_string()
            }
        }
    }
}

impl From<AuthError> for ChatApiError {
    fn from(value: AuthError) -> Self {
        match value {
            AuthError::AuthenticationRequired => ChatApiError::AuthenticationRequired,
            AuthError::Request(err) => ChatApiError::Network(err),
        }
    }
}

/// Map a response that cannot be used as a reply onto the error taxonomy.
/// Called for every non-2xx response and for 2xx responses that are not JSON.
pub(crate) fn classify(status: StatusCode, content_type: Option<&str>, body: &str) -> ChatApiError {
    match status.as_u16() {
        401 => return ChatApiError::AuthenticationRequired,
        403 => return ChatApiError::Forbidden,
        404 => return ChatApiError::EndpointNotFound,
        _ if status.is_server_error() => {
            return ChatApiError::ServerError(
                error_detail(body).unwrap_or_else(|| status_text(status)),
            );
        }
        _ => {}
    }

    if !is_json(content_type) {
        // Proxies answer with HTML pages that only name the failure in text
        if body.contains("404") || body.contains("Not Found") {
            return ChatApiError::EndpointNotFound;
        }
        if body.contains("500") || body.contains("Internal Server Error") {
            return ChatApiError::ServerError(status_text(status));
        }
        if status.is_success() {
            return ChatApiError::InvalidResponse(format!(
                "expected JSON, got {}",
                content_type.unwrap_or("no content type")
            ));
        }
    }

    ChatApiError::Request {
        status: status.as_u16(),
        message: error_detail(body).unwrap_or_else(|| status_text(status)),
    }
}

pub(crate) fn is_json(content_type: Option<&str>) -> bool {
    content_type
        .map(|ct| ct.to_ascii_lowercase().contains("application/json"))
        .unwrap_or(false)
}

/// Error text carried by a JSON error body: `detail`, `message` or
/// `error.message`.
fn error_detail(body: &str) -> Option<String> {
    let value = serde_json::from_str::<Value>(body).ok()?;
    let detail = value
        .get("detail")
        .or_else(|| value.get("message"))
        .or_else(|| value.get("error").and_then(|e| e.get("message")))?;

    match detail {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn status_text(status: StatusCode) -> String {
    status
        .canonical_reason()
        .map(|reason| reason.to_string())
        .unwrap_or_else(|| status.as_u16().to_string())
}
