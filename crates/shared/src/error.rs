use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthorized,
    TokenExpired,
    Forbidden,
    NotFound,
    Validation,
    RateLimited,
    Internal,
    /// Synthesized on the client when the transport itself fails.
    Transport,
    #[serde(other)]
    Unknown,
}

/// Structured error pushed by the backend on any namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default)]
    pub requires_login: bool,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            requires_login: false,
        }
    }

    pub fn requiring_login(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            requires_login: true,
        }
    }
}
