//! Client error taxonomy and its user-facing messages.

use crate::location::GeolocationError;

/// Shown when the backend rejects the bearer token.
pub const SESSION_EXPIRED: &str = "로그인 세션이 만료되었습니다. 다시 로그인해주세요.";

/// Shown when a failure carries no backend message.
pub const REQUEST_FAILED: &str = "요청에 실패했습니다.";

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Rejected before any network call (blank input, missing session).
    #[error("{0}")]
    Validation(String),

    #[error("location unavailable: {0}")]
    Location(#[from] GeolocationError),

    /// HTTP 401 from the backend.
    #[error("session expired")]
    Unauthorized,

    /// Any other non-2xx status.
    #[error("backend returned {status}: {}", message.as_deref().unwrap_or("no message"))]
    Api { status: u16, message: Option<String> },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("cannot decode payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("local store: {0}")]
    Store(#[from] std::io::Error),

    #[error("chat store: {0}")]
    Chat(String),

    #[error("identity provider: {0}")]
    Identity(String),
}

impl ClientError {
    /// Message rendered in the inline error panel.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) | Self::Identity(msg) => msg.clone(),
            Self::Location(e) => e.to_string(),
            Self::Unauthorized => SESSION_EXPIRED.to_string(),
            Self::Api { message: Some(msg), .. } if !msg.is_empty() => msg.clone(),
            Self::Chat(_) => "메시지 전송에 실패했습니다.".to_string(),
            _ => REQUEST_FAILED.to_string(),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}
