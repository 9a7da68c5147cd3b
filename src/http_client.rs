use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde_json::Value;
use std::time::Duration;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// HTTP basic-auth credential pair
#[derive(Debug, Clone, PartialEq)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

/// One outgoing request, built per call
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Value>,
    pub basic_auth: Option<BasicAuth>,
}

impl RequestDescriptor {
    /// Whether the body should be sent url-encoded instead of as JSON
    pub fn is_form(&self) -> bool {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.to_ascii_lowercase().starts_with(FORM_CONTENT_TYPE))
            .unwrap_or(false)
    }
}

/// Raw server answer; the status code is informational only
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RawResponse {
    /// Value of the Content-Type header, if present and readable
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }
}

/// Capability that puts a request on the wire
///
/// `Ok(None)` means the exchange completed without the server producing a response.
/// Network failures are returned as `Err`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: RequestDescriptor) -> Result<Option<RawResponse>>;
}

/// Production transport backed by a pooled reqwest client
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Create a new transport
    pub fn new(connect_timeout: u64, request_timeout: u64) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout))
            .timeout(Duration::from_secs(request_timeout))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: RequestDescriptor) -> Result<Option<RawResponse>> {
        let is_form = request.is_form();
        let RequestDescriptor {
            method,
            url,
            mut headers,
            body,
            basic_auth,
        } = request;

        // Basic credentials take the place of any Authorization header
        if basic_auth.is_some() {
            headers.remove(AUTHORIZATION);
        }

        tracing::debug!(
            method = %method,
            url = %url,
            "Sending HTTP request"
        );

        let mut builder = self.client.request(method, &url).headers(headers);

        if let Some(auth) = basic_auth {
            builder = builder.basic_auth(auth.username, Some(auth.password));
        }

        if let Some(body) = body {
            builder = if is_form {
                builder.form(&body)
            } else {
                builder.json(&body)
            };
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                let error_kind = if e.is_timeout() {
                    "timeout"
                } else if e.is_connect() {
                    "connection_failed"
                } else if e.is_request() {
                    "request_error"
                } else if e.is_builder() {
                    "builder_error"
                } else {
                    "unknown"
                };

                tracing::warn!(
                    error_kind = error_kind,
                    error = %e,
                    url = %url,
                    "HTTP request error"
                );

                return Err(anyhow::Error::new(e)
                    .context(format!("HTTP request failed (kind: {})", error_kind)));
            }
        };

        let status = response.status();
        let headers = response.headers().clone();

        tracing::debug!(status = %status, "Received HTTP response");

        let body = response
            .bytes()
            .await
            .context("Failed to read response body")?;

        Ok(Some(RawResponse {
            status: status.as_u16(),
            headers,
            body,
        }))
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod testing {
    //! In-memory transport for exercising the auth context without a network

    use super::*;
    use reqwest::header::HeaderValue;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Build a response with the given content type and body
    pub fn response(content_type: Option<&str>, body: impl Into<Bytes>) -> RawResponse {
        let mut headers = HeaderMap::new();
        if let Some(ct) = content_type {
            headers.insert(CONTENT_TYPE, HeaderValue::from_str(ct).unwrap());
        }
        RawResponse {
            status: 200,
            headers,
            body: body.into(),
        }
    }

    /// Build an `application/json` response
    pub fn json_response(value: Value) -> RawResponse {
        response(Some("application/json; charset=utf-8"), value.to_string())
    }

    /// Replays queued outcomes in order and records every request it sees
    #[derive(Default)]
    pub struct ScriptedTransport {
        outcomes: Mutex<VecDeque<Result<Option<RawResponse>>>>,
        requests: Mutex<Vec<RequestDescriptor>>,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push(&self, outcome: Result<Option<RawResponse>>) {
            self.outcomes.lock().unwrap().push_back(outcome);
        }

        pub fn push_json(&self, value: Value) {
            self.push(Ok(Some(json_response(value))));
        }

        pub fn requests(&self) -> Vec<RequestDescriptor> {
            self.requests.lock().unwrap().clone()
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn execute(&self, request: RequestDescriptor) -> Result<Option<RawResponse>> {
            self.requests.lock().unwrap().push(request);
            // Give concurrent callers a chance to interleave
            tokio::task::yield_now().await;
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow::anyhow!("no scripted response left")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn descriptor(content_type: Option<&'static str>) -> RequestDescriptor {
        let mut headers = HeaderMap::new();
        if let Some(ct) = content_type {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(ct));
        }
        RequestDescriptor {
            method: Method::POST,
            url: "https://example.test/token".to_string(),
            headers,
            body: None,
            basic_auth: None,
        }
    }

    #[test]
    fn test_is_form() {
        assert!(descriptor(Some("application/x-www-form-urlencoded")).is_form());
        assert!(descriptor(Some("Application/X-WWW-Form-Urlencoded; charset=utf-8")).is_form());
        assert!(!descriptor(Some("application/json")).is_form());
        assert!(!descriptor(None).is_form());
    }

    #[test]
    fn test_content_type() {
        let resp = testing::response(Some("text/plain"), "E0");
        assert_eq!(resp.content_type(), Some("text/plain"));

        let resp = testing::response(None, "");
        assert_eq!(resp.content_type(), None);
    }

    #[tokio::test]
    async fn test_scripted_transport_records_and_replays() {
        let transport = testing::ScriptedTransport::new();
        transport.push_json(serde_json::json!({"ok": true}));

        let resp = transport.execute(descriptor(None)).await.unwrap().unwrap();
        assert_eq!(&resp.body[..], br#"{"ok":true}"#);
        assert_eq!(transport.request_count(), 1);

        // Exhausted script surfaces as a transport failure
        assert!(transport.execute(descriptor(None)).await.is_err());
    }
}
