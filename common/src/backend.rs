// common/src/backend.rs
use std::time::Duration;

use reqwest::multipart::Form;
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;

use crate::config::Config;
use crate::error::{ApiError, GENERIC_REJECTION};
use crate::models::session::CredentialSlot;

// The hosted backend sits behind a tunnel that interposes a browser
// warning page unless this header is present.
const COMPAT_HEADER: &str = "ngrok-skip-browser-warning";
const COMPAT_HEADER_VALUE: &str = "true";

/// Stateless request/response wrapper over the backend REST API.
///
/// Attaches the current session credential (when one is held) as a bearer
/// token plus the fixed compatibility header, and classifies failures
/// into the `ApiError` taxonomy. Never retries; the interactive caller
/// decides what to do with a failure.
#[derive(Clone)]
pub struct BackendClient {
    http: Client,
    base_url: String,
    timeout: Duration,
    credential: CredentialSlot,
}

impl BackendClient {
    pub fn new(config: &Config, credential: CredentialSlot) -> Self {
        Self {
            http: Client::new(),
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(config.request_timeout_secs),
            credential,
        }
    }

    pub async fn get(&self, path: &str) -> Result<Value, ApiError> {
        self.request(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.request(Method::POST, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, ApiError> {
        self.request(Method::DELETE, path, None).await
    }

    /// Issue one REST call and classify the outcome
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let mut builder = self
            .http
            .request(method, format!("{}{}", self.base_url, path))
            .timeout(self.timeout)
            .header(COMPAT_HEADER, COMPAT_HEADER_VALUE);

        let bearer = self.credential.get();
        if let Some(token) = &bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!("request to {} failed: {}", path, err);
                return Err(ApiError::Unreachable(err.to_string()));
            }
        };

        classify(path, bearer.is_some(), response).await
    }

    /// Multipart POST (profile picture upload)
    pub async fn post_multipart(&self, path: &str, form: Form) -> Result<Value, ApiError> {
        let mut builder = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .timeout(self.timeout)
            .header(COMPAT_HEADER, COMPAT_HEADER_VALUE)
            .multipart(form);

        let bearer = self.credential.get();
        if let Some(token) = &bearer {
            builder = builder.bearer_auth(token);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!("multipart request to {} failed: {}", path, err);
                return Err(ApiError::Unreachable(err.to_string()));
            }
        };

        classify(path, bearer.is_some(), response).await
    }
}

async fn classify(
    path: &str,
    had_bearer: bool,
    response: reqwest::Response,
) -> Result<Value, ApiError> {
    let status = response.status();
    let body = match response.bytes().await {
        Ok(body) => body,
        Err(err) => {
            tracing::warn!("reading response from {} failed: {}", path, err);
            return Err(ApiError::Unreachable(err.to_string()));
        }
    };
    let json: Option<Value> = if body.is_empty() {
        None
    } else {
        serde_json::from_slice(&body).ok()
    };

    if status.is_success() {
        return Ok(json.unwrap_or(Value::Null));
    }

    // Auth rejections only count as an expired session when the request
    // actually carried a credential; a failed login is a plain rejection.
    if status == StatusCode::UNAUTHORIZED && had_bearer {
        tracing::info!("bearer credential rejected on {}", path);
        return Err(ApiError::AuthExpired);
    }

    let message = json
        .as_ref()
        .and_then(|value| value.get("error"))
        .and_then(Value::as_str)
        .unwrap_or(GENERIC_REJECTION)
        .to_string();
    tracing::warn!("{} rejected with {}: {}", path, status, message);
    Err(ApiError::Rejected(message))
}

/// Extract the `message` field the backend puts on success responses
pub fn message_of(value: &Value) -> String {
    value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("OK")
        .to_string()
}
