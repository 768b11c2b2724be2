//! HTTP gateway implementation.
//!
//! The actual HTTP client is abstracted via a trait so that the gateway can
//! be exercised against canned responses. [`UreqClient`] is the production
//! client.

use crate::config::UpstreamConfig;
use crate::error::{SyncError, SyncResult};
use crate::gateway::UpstreamGateway;
use serde_json::Value;
use std::io;
use std::time::Duration;

/// HTTP methods used by the upstream API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET.
    Get,
    /// POST.
    Post,
    /// PUT.
    Put,
}

impl Method {
    /// Returns the method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
        }
    }
}

/// A raw upstream response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response with a JSON body.
    pub fn json(status: u16, body: &Value) -> Self {
        Self {
            status,
            body: body.to_string().into_bytes(),
        }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parses the body as JSON. An empty body is `null`.
    pub fn body_json(&self) -> Result<Value, serde_json::Error> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&self.body)
    }

    /// Extracts a human-readable message from an error body.
    fn error_message(&self) -> String {
        if let Ok(body) = self.body_json() {
            for key in ["message", "error"] {
                if let Some(text) = body.get(key).and_then(Value::as_str) {
                    return text.to_string();
                }
            }
        }
        let text = String::from_utf8_lossy(&self.body);
        possync_protocol::truncate_chars(text.trim(), 200)
    }
}

/// HTTP client abstraction.
///
/// Implementations block until the response arrives or the call fails.
/// Non-2xx statuses are responses, not errors.
pub trait HttpClient: Send + Sync {
    /// Sends a request with an optional JSON body.
    fn send(&self, method: Method, url: &str, body: Option<&Value>) -> SyncResult<HttpResponse>;
}

/// HTTP-based upstream gateway.
pub struct HttpGateway<C: HttpClient> {
    /// Base URL of the upstream API, without a trailing slash.
    base_url: String,
    /// HTTP client implementation.
    client: C,
}

impl<C: HttpClient> HttpGateway<C> {
    /// Creates a new HTTP gateway.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, segments: &[&str]) -> String {
        let mut url = self.base_url.clone();
        for segment in segments {
            url.push('/');
            url.push_str(&encode_segment(segment));
        }
        url
    }

    /// Reads an existence answer: 404 is absent, 2xx carries `success`.
    fn presence(&self, url: &str, what: &str) -> SyncResult<bool> {
        let response = self.client.send(Method::Get, url, None)?;
        match response.status {
            404 => Ok(false),
            s if (200..300).contains(&s) => Ok(response
                .body_json()
                .ok()
                .and_then(|body| body.get("success").and_then(Value::as_bool))
                .unwrap_or(false)),
            s => Err(SyncError::transport_retryable(format!(
                "unexpected status {s} checking {what}: {}",
                response.error_message()
            ))),
        }
    }

    fn write(&self, method: Method, url: &str, body: &Value) -> SyncResult<Value> {
        let response = self.client.send(method, url, Some(body))?;
        if !response.is_success() {
            return Err(SyncError::upstream(response.status, response.error_message()));
        }
        match response.body_json() {
            Ok(value) => Ok(value),
            Err(_) => Ok(Value::String(
                String::from_utf8_lossy(&response.body).into_owned(),
            )),
        }
    }
}

impl<C: HttpClient> UpstreamGateway for HttpGateway<C> {
    fn exists(&self, transaction_id: &str) -> SyncResult<bool> {
        self.presence(&self.url(&["transactions", transaction_id]), transaction_id)
    }

    fn line_exists(&self, transaction_id: &str, line_num: i64) -> SyncResult<bool> {
        let line = line_num.to_string();
        self.presence(
            &self.url(&["transaction-lines", transaction_id, &line]),
            &format!("{transaction_id} line {line_num}"),
        )
    }

    fn create_transaction(&self, payload: &Value) -> SyncResult<Value> {
        self.write(Method::Post, &self.url(&["transactions"]), payload)
    }

    fn create_line(&self, payload: &Value) -> SyncResult<Value> {
        self.write(Method::Post, &self.url(&["transaction-lines"]), payload)
    }

    fn update_transaction(&self, transaction_id: &str, patch: &Value) -> SyncResult<Value> {
        self.write(Method::Put, &self.url(&["transactions", transaction_id]), patch)
    }

    fn update_line(&self, transaction_id: &str, line_num: i64, patch: &Value) -> SyncResult<Value> {
        let line = line_num.to_string();
        self.write(
            Method::Put,
            &self.url(&["transaction-lines", transaction_id, &line]),
            patch,
        )
    }

    fn assign_z_report(&self, store: &str, z_report_id: &str) -> SyncResult<Value> {
        self.write(
            Method::Post,
            &self.url(&["transactions", store, z_report_id]),
            &Value::Object(Default::default()),
        )
    }
}

/// Percent-encodes a path segment, leaving RFC 3986 unreserved bytes as is.
fn encode_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

/// Blocking HTTP client backed by `ureq`.
#[derive(Debug, Clone)]
pub struct UreqClient {
    agent: ureq::Agent,
}

impl UreqClient {
    /// Creates a client with the given per-call timeout.
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self { agent }
    }

    /// Creates a gateway for the configured upstream.
    pub fn gateway(config: &UpstreamConfig) -> HttpGateway<UreqClient> {
        HttpGateway::new(config.base_url.clone(), Self::new(config.timeout))
    }
}

impl HttpClient for UreqClient {
    fn send(&self, method: Method, url: &str, body: Option<&Value>) -> SyncResult<HttpResponse> {
        let request = self
            .agent
            .request(method.as_str(), url)
            .set("Accept", "application/json");
        let result = match body {
            Some(body) => request.send_json(body),
            None => request.call(),
        };

        let response = match result {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(ureq::Error::Transport(transport)) => return Err(transport_error(&transport)),
        };

        let status = response.status();
        let body = response
            .into_string()
            .map_err(|e| io_error(&e, "reading upstream response"))?;
        Ok(HttpResponse {
            status,
            body: body.into_bytes(),
        })
    }
}

fn transport_error(transport: &ureq::Transport) -> SyncError {
    let io_source = std::error::Error::source(transport)
        .and_then(|source| source.downcast_ref::<io::Error>());
    if let Some(e) = io_source {
        return io_error(e, "calling upstream");
    }
    match transport.kind() {
        ureq::ErrorKind::InvalidUrl
        | ureq::ErrorKind::UnknownScheme
        | ureq::ErrorKind::InsecureRequestHttpsOnly => {
            SyncError::transport_fatal(transport.to_string())
        }
        _ => SyncError::transport_retryable(transport.to_string()),
    }
}

fn io_error(e: &io::Error, context: &str) -> SyncError {
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => SyncError::Timeout,
        _ => SyncError::transport_retryable(format!("{context}: {e}")),
    }
}
