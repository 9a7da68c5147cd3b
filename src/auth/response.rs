// Response normalization
// Folds whatever the server sent into the single success/error contract

use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::http_client::RawResponse;

/// Message returned when a call succeeds with nothing to report
pub const NO_DATA_MESSAGE: &str = "Request was successful, but no data was returned.";

const NO_RESPONSE_MESSAGE: &str = "No response received from server";

/// What the server answered, decided once from headers and body
#[derive(Debug, Clone, PartialEq)]
pub enum ServerResponse {
    /// JSON body with a truthy `code` field
    StructuredError { code: String },
    /// Nothing usable in the body
    EmptyBody,
    /// Body with at least one field, returned as-is
    JsonBody(Value),
    /// Body declared as non-JSON; the raw text acts as an error code
    NonJsonBody { raw: String },
}

impl ServerResponse {
    pub fn classify(response: &RawResponse) -> Self {
        let declared_json = response
            .content_type()
            .map(|ct| ct.to_ascii_lowercase().contains("application/json"));

        let raw = || String::from_utf8_lossy(&response.body).into_owned();

        // Declared non-JSON bodies are wrapped as `{code: <raw>}`
        if declared_json == Some(false) {
            if response.body.is_empty() {
                return ServerResponse::JsonBody(json!({ "code": "" }));
            }
            return ServerResponse::NonJsonBody { raw: raw() };
        }

        if response.body.is_empty() {
            return ServerResponse::EmptyBody;
        }

        match serde_json::from_slice::<Value>(&response.body) {
            Ok(value) => Self::from_json(value),
            Err(e) => {
                // Undeclared or malformed JSON is handed back as plain text
                tracing::debug!("Response body is not valid JSON: {}", e);
                ServerResponse::JsonBody(Value::String(raw()))
            }
        }
    }

    fn from_json(value: Value) -> Self {
        if let Some(code) = value.get("code").filter(|c| is_truthy(c)) {
            return ServerResponse::StructuredError {
                code: value_text(code),
            };
        }

        if has_fields(&value) {
            ServerResponse::JsonBody(value)
        } else {
            ServerResponse::EmptyBody
        }
    }

    pub fn into_result(self) -> Result<Value> {
        match self {
            ServerResponse::StructuredError { code } => Err(Error::Api(code)),
            ServerResponse::NonJsonBody { raw } => Err(Error::Api(raw)),
            ServerResponse::EmptyBody => Ok(json!({ "message": NO_DATA_MESSAGE })),
            ServerResponse::JsonBody(value) => Ok(value),
        }
    }
}

/// Normalize a transport outcome into a JSON value or an API error
pub fn normalize(response: Option<RawResponse>) -> Result<Value> {
    let response = response.ok_or_else(|| Error::Api(NO_RESPONSE_MESSAGE.to_string()))?;

    let classified = ServerResponse::classify(&response);
    if let ServerResponse::StructuredError { code } | ServerResponse::NonJsonBody { raw: code } =
        &classified
    {
        tracing::warn!(status = response.status, code = %code, "API returned an error code");
    }

    classified.into_result()
}

/// Truthiness of a JSON value the way loosely typed servers mean it
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn has_fields(value: &Value) -> bool {
    match value {
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::String(s) => !s.is_empty(),
        Value::Null | Value::Bool(_) | Value::Number(_) => false,
    }
}

pub(crate) fn value_text(code: &Value) -> String {
    match code {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
