//! Forward request/result models
//!
//! A [`ForwardRequest`] is the `apiFetch` payload; a [`ForwardResult`] is the
//! normalized outcome of one forward, which may span several HTTP attempts.

use serde::{Deserialize, Deserializer, Serialize};

/// Reason reported when a relative path is paired with a non-HTTPS base URL
pub const REASON_HTTPS_REQUIRED: &str = "HTTPS_REQUIRED";
/// Reason reported when no HTTP response could be obtained
pub const REASON_EXCEPTION: &str = "EXCEPTION";
/// Error text accompanying [`REASON_HTTPS_REQUIRED`]
pub const HTTPS_REQUIRED_MESSAGE: &str = "Base URL must start with https:// (phone requires HTTPS).";

fn null_as_root<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(|| "/".to_string()))
}

/// Logical request to forward to the phone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardRequest {
    /// Base URL the relative `path` is resolved against
    #[serde(default)]
    pub base_url: Option<String>,
    /// Absolute URL (`http(s)://...`) or path relative to `base_url`.
    /// An explicit `null` means `/`.
    #[serde(deserialize_with = "null_as_root")]
    pub path: String,
    /// HTTP method, `GET` when absent
    #[serde(default)]
    pub method: Option<String>,
    /// Request body, sent for POST/PUT only
    #[serde(default)]
    pub body: Option<String>,
    /// Basic auth user name
    #[serde(default)]
    pub user: Option<String>,
    /// Basic auth password
    #[serde(default)]
    pub pass: Option<String>,
}

impl ForwardRequest {
    pub fn get(base_url: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
            path: path.into(),
            method: None,
            body: None,
            user: None,
            pass: None,
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_credentials(mut self, user: impl Into<String>, pass: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.pass = Some(pass.into());
        self
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or("")
    }

    pub fn method(&self) -> &str {
        self.method.as_deref().unwrap_or("GET")
    }

    pub fn user(&self) -> &str {
        self.user.as_deref().unwrap_or("")
    }

    pub fn pass(&self) -> &str {
        self.pass.as_deref().unwrap_or("")
    }

    /// Whether the path carries its own scheme and bypasses `base_url`.
    pub fn is_absolute(&self) -> bool {
        starts_with_ignore_case(&self.path, "http://")
            || starts_with_ignore_case(&self.path, "https://")
    }

    /// Unresolved `base_url + path`, used when no URL was actually built.
    pub fn display_url(&self) -> String {
        if self.is_absolute() {
            self.path.clone()
        } else {
            format!("{}{}", self.base_url(), self.path)
        }
    }
}

/// ASCII case-insensitive prefix test.
pub fn starts_with_ignore_case(value: &str, prefix: &str) -> bool {
    value
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

/// Echo of the request behind a result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEcho {
    /// URL of the attempt actually transmitted
    pub url: String,
    pub method: String,
    /// Request headers as `name: value\r\n` lines
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<String>,
    /// Content headers as `name: value\r\n` lines, absent without a body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_headers: Option<String>,
    /// Body as supplied by the caller
    pub body: Option<String>,
}

impl RequestEcho {
    /// Echo for results that never produced a transmitted request.
    pub fn unsent(url: impl Into<String>, request: &ForwardRequest) -> Self {
        Self {
            url: url.into(),
            method: request.method().to_string(),
            headers: None,
            content_headers: None,
            body: request.body.clone(),
        }
    }
}

/// Echo of the response behind a completed result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEcho {
    /// Response headers as `name: value\r\n` lines
    pub headers: String,
    /// Response body decoded as UTF-8 (lossy)
    pub body: String,
}

/// Normalized outcome of a forward
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardResult {
    /// `true` for a 2xx response
    pub ok: bool,
    /// HTTP status, `0` when no response was obtained
    pub status: u16,
    /// Reason phrase, or one of the `REASON_*` markers
    pub reason: String,
    /// Wall-clock time across all attempts up to the returned one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
    /// Failure description for validation and transport failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub request: RequestEcho,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseEcho>,
}

impl ForwardResult {
    /// Result for a relative path against a non-HTTPS base URL.
    pub fn https_required(request: &ForwardRequest) -> Self {
        Self {
            ok: false,
            status: 0,
            reason: REASON_HTTPS_REQUIRED.to_string(),
            elapsed_ms: None,
            error: Some(HTTPS_REQUIRED_MESSAGE.to_string()),
            request: RequestEcho::unsent(request.display_url(), request),
            response: None,
        }
    }

    /// Result for a forward that obtained no HTTP response.
    pub fn exception(request: RequestEcho, elapsed_ms: u64, error: impl Into<String>) -> Self {
        Self {
            ok: false,
            status: 0,
            reason: REASON_EXCEPTION.to_string(),
            elapsed_ms: Some(elapsed_ms),
            error: Some(error.into()),
            request,
            response: None,
        }
    }

    /// Result for a forward whose last attempt got a response.
    pub fn completed(
        status: u16,
        reason: impl Into<String>,
        elapsed_ms: u64,
        request: RequestEcho,
        response: ResponseEcho,
    ) -> Self {
        Self {
            ok: (200..300).contains(&status),
            status,
            reason: reason.into(),
            elapsed_ms: Some(elapsed_ms),
            error: None,
            request,
            response: Some(response),
        }
    }
}
