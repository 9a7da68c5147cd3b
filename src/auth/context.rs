use chrono::{DateTime, Duration, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use super::clock::{Clock, SystemClock};
use super::response::{is_truthy, normalize, value_text};
use super::types::{Credentials, Grant, TokenResponse, TokenState};
use crate::error::{Error, Result};
use crate::http_client::{BasicAuth, ReqwestTransport, RequestDescriptor, Transport};

/// OAuth2 token endpoint, relative to the base URL
pub const TOKEN_PATH: &str = "/api/1/printing/oauth2/auth/token?subject=printer";

const PRINTERS_PATH: &str = "/api/1/printing/printers";

/// Authentication context for one printer account
///
/// Owns the credentials and the token state, and sends every API request.
/// Token exchanges are serialized: concurrent callers that find the token
/// expired wait for a single exchange instead of issuing their own.
pub struct AuthContext {
    /// Account credentials
    credentials: Credentials,

    /// Current token state
    state: RwLock<TokenState>,

    /// Held for the duration of a token exchange
    refresh_lock: Mutex<()>,

    /// Sends requests on the wire
    transport: Arc<dyn Transport>,

    /// Time source for expiry
    clock: Arc<dyn Clock>,

    /// Renew this long before the server-given expiry
    refresh_threshold: Duration,
}

impl AuthContext {
    /// Create a context using the default reqwest transport
    pub fn new(credentials: Credentials) -> anyhow::Result<Self> {
        let transport = ReqwestTransport::new(30, 60)?;
        Ok(Self::with_transport(credentials, Arc::new(transport)))
    }

    /// Create a context on top of the given transport; performs no I/O
    pub fn with_transport(credentials: Credentials, transport: Arc<dyn Transport>) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let state = TokenState::new(clock.now());

        Self {
            credentials,
            state: RwLock::new(state),
            refresh_lock: Mutex::new(()),
            transport,
            clock,
            refresh_threshold: Duration::zero(),
        }
    }

    /// Replace the time source; the context starts out expired at the new clock's "now"
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.state = RwLock::new(TokenState::new(clock.now()));
        self.clock = clock;
        self
    }

    /// Treat the token as stale `seconds` before it actually expires
    ///
    /// Values beyond what a `Duration` can hold are clamped to the maximum.
    pub fn with_refresh_threshold(mut self, seconds: u64) -> Self {
        self.refresh_threshold = i64::try_from(seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX);
        self
    }

    /// Perform the first authentication
    pub async fn initialize(&self) -> Result<()> {
        self.authenticate().await
    }

    async fn is_token_valid(&self) -> bool {
        let state = self.state.read().await;
        state.is_valid_at(self.clock.now(), self.refresh_threshold)
    }

    /// Obtain or renew the access token when it is no longer valid
    ///
    /// No-op while the current token is valid. Otherwise exchanges a password
    /// grant (never authenticated) or a refresh grant at the token endpoint.
    pub async fn authenticate(&self) -> Result<()> {
        if self.is_token_valid().await {
            return Ok(());
        }

        let _guard = self.refresh_lock.lock().await;

        // Another caller may have finished an exchange while we waited
        if self.is_token_valid().await {
            tracing::debug!("Token already renewed by a concurrent caller");
            return Ok(());
        }

        let (grant, first_login) = {
            let state = self.state.read().await;
            (
                Grant::for_state(&state, &self.credentials.printer_email),
                !state.is_authenticated(),
            )
        };

        tracing::info!("Requesting access token via {} grant...", grant.kind());

        let token = match self.request_token(&grant).await {
            Ok(token) => token,
            Err(e) => {
                let e = e.into_authentication();
                tracing::error!("Token request failed: {}", e);
                return Err(e);
            }
        };

        let expires_at = match Duration::try_seconds(token.expires_in)
            .and_then(|ttl| self.clock.now().checked_add_signed(ttl))
        {
            Some(expires_at) => expires_at,
            None => {
                let e = Error::Authentication(
                    "Invalid token response: expires_in out of range".to_string(),
                );
                tracing::error!("Token request failed: {}", e);
                return Err(e);
            }
        };

        let mut state = self.state.write().await;

        // The refresh token is only captured from the first login
        if first_login {
            state.refresh_token = token.refresh_token.unwrap_or_default();
        }

        state.access_token = token.access_token;
        if let Some(subject_id) = token.subject_id {
            state.subject_id = subject_id;
        }
        state.expires_at = expires_at;

        tracing::info!(
            "Access token obtained (token: {}..., subject: {}), expires: {}",
            state.access_token.chars().take(8).collect::<String>(),
            state.subject_id,
            expires_at.to_rfc3339()
        );

        Ok(())
    }

    /// Exchange a grant at the token endpoint
    async fn request_token(&self, grant: &Grant) -> Result<TokenResponse> {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );

        let auth = BasicAuth {
            username: self.credentials.client_id.clone(),
            password: self.credentials.client_secret.clone(),
        };

        let body = self
            .dispatch(Method::POST, TOKEN_PATH, Some(grant.to_form()), headers, Some(auth))
            .await?;

        if let Some(error) = body.get("error").filter(|e| is_truthy(e)) {
            return Err(Error::Authentication(value_text(error)));
        }

        serde_json::from_value(body)
            .map_err(|e| Error::Authentication(format!("Invalid token response: {}", e)))
    }

    /// Unregister the current subject on the server
    pub async fn deauthenticate(&self) -> Result<Value> {
        self.authenticate().await?;

        let path = format!("{}/{}", PRINTERS_PATH, self.device_id().await);
        tracing::info!("Deauthenticating subject via DELETE {}", path);

        self.send(Method::DELETE, &path, None, None, None).await
    }

    /// Send an API request and normalize the answer
    ///
    /// Without explicit basic auth the token is brought up to date first.
    /// `headers` replaces the default bearer/JSON headers when given.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        data: Option<Value>,
        headers: Option<HeaderMap>,
        auth: Option<BasicAuth>,
    ) -> Result<Value> {
        if auth.is_none() {
            self.authenticate().await?;
        }

        let headers = match headers {
            Some(headers) => headers,
            None => self.default_headers().await?,
        };

        self.dispatch(method, path, data, headers, auth).await
    }

    async fn dispatch(
        &self,
        method: Method,
        path: &str,
        data: Option<Value>,
        headers: HeaderMap,
        auth: Option<BasicAuth>,
    ) -> Result<Value> {
        let request = RequestDescriptor {
            method,
            url: format!("{}{}", self.credentials.base_url, path),
            headers,
            body: data,
            basic_auth: auth,
        };

        let response = self.transport.execute(request).await?;
        normalize(response)
    }

    /// Bearer authorization plus JSON content type
    pub async fn default_headers(&self) -> Result<HeaderMap> {
        let state = self.state.read().await;

        let bearer = HeaderValue::from_str(&format!("Bearer {}", state.access_token))
            .map_err(|_| {
                Error::Authentication("Access token is not a valid header value".to_string())
            })?;

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    /// Subject id assigned to the printer by the server
    pub async fn device_id(&self) -> String {
        self.state.read().await.subject_id.clone()
    }

    /// Whether an access token has ever been obtained
    pub async fn is_authenticated(&self) -> bool {
        self.state.read().await.is_authenticated()
    }

    /// Absolute expiry of the current token
    pub async fn expires_at(&self) -> DateTime<Utc> {
        self.state.read().await.expires_at
    }

    /// Snapshot of the token state
    pub async fn token_state(&self) -> TokenState {
        self.state.read().await.clone()
    }
}
