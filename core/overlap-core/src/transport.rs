//! Single-shot JSON-over-HTTP calls to the Overlap server.
//!
//! [`HttpTransport`] is the real client; [`FakeTransport`] replays canned
//! responses and records what was sent, for tests of everything above it.

use std::fmt;
use std::time::{Duration, Instant};

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;

use crate::config::Config;
use crate::error::{OverlapError, Result};

pub const TEAM_TOKEN_HEADER: &str = "X-Team-Token";

/// Longest slice of a non-JSON error body carried into an error message.
const MAX_ERROR_BODY_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Get => f.write_str("GET"),
            HttpMethod::Post => f.write_str("POST"),
        }
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
        }
    }
}

pub trait Transport {
    /// Sends one request to `path` (relative to the configured server) and
    /// returns the decoded JSON body of a 2xx response.
    fn request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
        timeout: Duration,
    ) -> Result<Value>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
        timeout: Duration,
    ) -> Result<Value> {
        (**self).request(method, path, body, timeout)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HTTP
// ═══════════════════════════════════════════════════════════════════════════════

pub struct HttpTransport {
    config: Config,
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(config: Config) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| OverlapError::Connection {
                reason: format!("Failed to create HTTP client: {}", e),
            })?;
        Ok(Self { config, client })
    }
}

impl Transport for HttpTransport {
    fn request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
        timeout: Duration,
    ) -> Result<Value> {
        let base = match self.config.server_url.as_deref().filter(|u| !u.is_empty()) {
            Some(base) => base,
            None => {
                tracing::warn!(endpoint = path, "API request skipped - no server_url configured");
                return Err(OverlapError::NotConfigured);
            }
        };
        let url = format!("{}{}", base.trim_end_matches('/'), path);

        let payload = body
            .map(serde_json::to_vec)
            .transpose()
            .map_err(|e| OverlapError::server(format!("Failed to serialize request: {}", e)))?;
        let request_bytes = payload.as_ref().map_or(0, Vec::len);

        let started = Instant::now();
        tracing::info!(%method, %url, request_bytes, "API request started");

        let user_token = self.config.user_token.as_deref().unwrap_or_default();
        let team_token = self.config.team_token.as_deref().unwrap_or_default();
        let mut builder = self
            .client
            .request(method.into(), &url)
            .timeout(timeout)
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", user_token))
            .header(TEAM_TOKEN_HEADER, team_token);
        if let Some(payload) = payload {
            builder = builder.body(payload);
        }

        let fail = |status: u16, err: OverlapError| {
            tracing::error!(
                %method,
                %url,
                status,
                error = %err,
                duration_ms = started.elapsed().as_millis() as u64,
                "API request failed"
            );
            err
        };

        let response = builder
            .send()
            .map_err(|e| fail(0, classify_reqwest_error(&e)))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .map_err(|e| fail(status, classify_reqwest_error(&e)))?;

        if !(200..300).contains(&status) {
            return Err(fail(status, OverlapError::server(error_message(status, &text))));
        }

        let value: Value = serde_json::from_str(&text).map_err(|e| {
            fail(
                status,
                OverlapError::server(format!("Invalid JSON in response (HTTP {}): {}", status, e)),
            )
        })?;

        tracing::info!(
            %method,
            %url,
            status,
            response_bytes = text.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "API request succeeded"
        );
        Ok(value)
    }
}

fn classify_reqwest_error(err: &reqwest::Error) -> OverlapError {
    if err.is_timeout() {
        return OverlapError::Timeout;
    }

    let mut reason = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        reason = format!("{}: {}", reason, inner);
        source = inner.source();
    }
    OverlapError::Connection { reason }
}

/// Message for a non-2xx response: the JSON `error` field when present,
/// otherwise the status plus a truncated raw body.
pub fn error_message(status: u16, body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(json) => match json.get("error") {
            Some(Value::String(message)) => message.clone(),
            Some(Value::Null) | None => format!("HTTP {}", status),
            Some(other) => other.to_string(),
        },
        Err(_) => {
            let truncated: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
            format!("HTTP {}: {}", status, truncated)
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Fake
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeTransport, RecordedRequest};

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use serde_json::Value;

    use super::{HttpMethod, Transport};
    use crate::error::{OverlapError, Result};

    #[derive(Debug, Clone, PartialEq)]
    pub struct RecordedRequest {
        pub method: HttpMethod,
        pub path: String,
        pub body: Option<Value>,
    }

    /// In-memory transport: answers from a queue, then from a fallback (if any).
    #[derive(Default)]
    pub struct FakeTransport {
        queued: Mutex<VecDeque<Result<Value>>>,
        fallback: Option<Value>,
        requests: Mutex<Vec<RecordedRequest>>,
    }

    impl FakeTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// A server that answers every request with `response`.
        pub fn always(response: Value) -> Self {
            Self {
                fallback: Some(response),
                ..Self::default()
            }
        }

        pub fn push(self, response: Result<Value>) -> Self {
            self.queued
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push_back(response);
            self
        }

        pub fn requests(&self) -> Vec<RecordedRequest> {
            self.requests
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone()
        }

        pub fn call_count(&self) -> usize {
            self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
        }
    }

    impl Transport for FakeTransport {
        fn request(
            &self,
            method: HttpMethod,
            path: &str,
            body: Option<&Value>,
            _timeout: Duration,
        ) -> Result<Value> {
            self.requests
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(RecordedRequest {
                    method,
                    path: path.to_string(),
                    body: body.cloned(),
                });

            let queued = self
                .queued
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .pop_front();
            match (queued, &self.fallback) {
                (Some(response), _) => response,
                (None, Some(fallback)) => Ok(fallback.clone()),
                (None, None) => Err(OverlapError::Connection {
                    reason: "no fake response queued".to_string(),
                }),
            }
        }
    }
}
