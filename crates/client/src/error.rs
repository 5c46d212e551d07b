//! Client error types.

use std::sync::Arc;

use anjin_core::CollaboratorError;

/// Errors from the network collaborators.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    /// A credential the client needs was not provided.
    #[error("missing API key: {0} not set")]
    MissingApiKey(&'static str),

    /// Authentication failed (invalid or unauthorized credential).
    #[error("authentication failed: {0}")]
    AuthError(String),

    /// Rate limited by the remote API.
    #[error("rate limited: too many requests")]
    RateLimited,

    /// HTTP error response.
    #[error("HTTP error: {status}")]
    HttpError { status: u16 },

    /// Request timeout.
    #[error("request timeout")]
    Timeout,

    /// Network error.
    #[error("network error: {0}")]
    Network(Arc<reqwest::Error>),

    /// Response parse error.
    #[error("parse error: {0}")]
    Parse(String),

    /// Resource does not exist, or holds nothing for the request.
    #[error("not found: {0}")]
    NotFound(String),

    /// Response body exceeds the configured limit.
    #[error("response too large: {size} bytes exceeds {limit}")]
    TooLarge { size: usize, limit: usize },
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() { ClientError::Timeout } else { ClientError::Network(Arc::new(err)) }
    }
}

impl From<ClientError> for CollaboratorError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::NotFound(what) => CollaboratorError::NotFound(what),
            // reqwest does not report the elapsed limit.
            ClientError::Timeout | ClientError::Network(_) | ClientError::RateLimited | ClientError::HttpError { .. } => {
                CollaboratorError::Network(err.to_string())
            }
            other => CollaboratorError::Other(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ClientError::MissingApiKey("ANJIN_OPENAI_API_KEY");
        assert!(err.to_string().contains("ANJIN_OPENAI_API_KEY"));

        let err = ClientError::HttpError { status: 502 };
        assert_eq!(err.to_string(), "HTTP error: 502");
    }

    #[test]
    fn test_collaborator_mapping() {
        assert!(matches!(
            CollaboratorError::from(ClientError::NotFound("no entries".into())),
            CollaboratorError::NotFound(_)
        ));
        assert!(matches!(CollaboratorError::from(ClientError::HttpError { status: 500 }), CollaboratorError::Network(_)));
        let timeout = CollaboratorError::from(ClientError::Timeout);
        assert_eq!(timeout, CollaboratorError::Network("request timeout".into()));
        assert_eq!(timeout.to_string(), "network error: request timeout");
        assert!(matches!(CollaboratorError::from(ClientError::Parse("bad".into())), CollaboratorError::Other(_)));
    }
}
