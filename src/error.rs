// Error handling module
// Defines the uniform error shape surfaced by the auth context

use thiserror::Error;

/// Errors that can occur while authenticating or calling the API
#[derive(Error, Debug)]
pub enum Error {
    /// Token endpoint reported an error, or the token exchange itself failed
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// API call answered with an error code, or no response was received
    #[error("API error: {0}")]
    Api(String),

    /// Transport failure (connection refused, timeout, TLS, ...)
    #[error("Transport error: {0}")]
    Transport(#[from] anyhow::Error),
}

impl Error {
    /// Message carried by the error, without the kind prefix
    pub fn message(&self) -> String {
        match self {
            Error::Authentication(msg) | Error::Api(msg) => msg.clone(),
            Error::Transport(err) => err.to_string(),
        }
    }

    /// Wrap any non-authentication failure raised during a token exchange
    pub(crate) fn into_authentication(self) -> Self {
        match self {
            Error::Authentication(_) => self,
            other => Error::Authentication(other.message()),
        }
    }
}

/// Result type alias for auth context operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = Error::Authentication("invalid_grant".to_string());
        assert_eq!(err.to_string(), "Authentication failed: invalid_grant");

        let err = Error::Api("E0".to_string());
        assert_eq!(err.to_string(), "API error: E0");

        let err = Error::Transport(anyhow::anyhow!("connection refused"));
        assert_eq!(err.to_string(), "Transport error: connection refused");
    }

    #[test]
    fn test_message_strips_kind() {
        assert_eq!(Error::Api("E0".to_string()).message(), "E0");
        assert_eq!(
            Error::Transport(anyhow::anyhow!("timed out")).message(),
            "timed out"
        );
    }

    #[test]
    fn test_into_authentication_keeps_original_message() {
        let err = Error::Authentication("invalid_grant".to_string()).into_authentication();
        assert!(matches!(err, Error::Authentication(ref m) if m == "invalid_grant"));

        let err = Error::Api("E0".to_string()).into_authentication();
        assert!(matches!(err, Error::Authentication(ref m) if m == "E0"));

        let err = Error::Transport(anyhow::anyhow!("timed out")).into_authentication();
        assert!(matches!(err, Error::Authentication(ref m) if m == "timed out"));
    }
}
