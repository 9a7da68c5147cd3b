// Authentication types

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

/// Account credentials, fixed for the life of a context
#[derive(Debug, Clone)]
pub struct Credentials {
    pub base_url: String,
    pub printer_email: String,
    pub client_id: String,
    pub client_secret: String,
}

impl Credentials {
    pub fn new(
        base_url: impl Into<String>,
        printer_email: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            printer_email: printer_email.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

/// Current token state
///
/// While `access_token` is empty the refresh token and subject id are empty too.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenState {
    pub access_token: String,
    pub refresh_token: String,
    pub subject_id: String,
    pub expires_at: DateTime<Utc>,
}

impl TokenState {
    /// Unauthenticated state that is already expired at `now`
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            access_token: String::new(),
            refresh_token: String::new(),
            subject_id: String::new(),
            expires_at: now,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        !self.access_token.is_empty()
    }

    /// Token counts as valid while it outlives `now + threshold`
    pub fn is_valid_at(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        now.checked_add_signed(threshold)
            .map(|limit| self.expires_at > limit)
            .unwrap_or(false)
    }
}

/// OAuth2 grant sent to the token endpoint
#[derive(Debug, Clone, PartialEq)]
pub enum Grant {
    /// First login: printer identity with an empty password
    Password { username: String },
    /// Renewal with the refresh token captured at first login
    RefreshToken { refresh_token: String },
}

impl Grant {
    /// Pick the grant the current state calls for
    pub fn for_state(state: &TokenState, printer_email: &str) -> Self {
        if state.is_authenticated() {
            Grant::RefreshToken {
                refresh_token: state.refresh_token.clone(),
            }
        } else {
            Grant::Password {
                username: printer_email.to_string(),
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Grant::Password { .. } => "password",
            Grant::RefreshToken { .. } => "refresh_token",
        }
    }

    /// Form fields for the token request
    pub fn to_form(&self) -> Value {
        match self {
            Grant::Password { username } => json!({
                "grant_type": "password",
                "username": username,
                "password": "",
            }),
            Grant::RefreshToken { refresh_token } => json!({
                "grant_type": "refresh_token",
                "refresh_token": refresh_token,
            }),
        }
    }
}

/// Token endpoint success body
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    #[serde(default)]
    pub subject_id: Option<String>,
}
