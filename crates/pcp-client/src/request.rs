//! Target resolution and per-attempt request construction

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::Method;
use pcp_core::{starts_with_ignore_case, ForwardRequest, RequestEcho};
use url::Url;

use crate::error::{ResolveError, TransportError};

/// Content type sent with every POST/PUT body
pub const JSON_CONTENT_TYPE: &str = "application/json";

const HTTPS_PREFIX: &str = "https://";

/// Resolved destination of a forward
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub url: Url,
    base_is_https: bool,
}

impl Target {
    /// Resolve `path` against `base_url`.
    ///
    /// Absolute paths are used as-is. Relative paths require an `https://`
    /// base URL.
    pub fn resolve(request: &ForwardRequest) -> Result<Self, ResolveError> {
        let base_is_https = starts_with_ignore_case(request.base_url(), HTTPS_PREFIX);
        let url = if request.is_absolute() {
            Url::parse(&request.path)?
        } else if base_is_https {
            Url::parse(request.base_url())?.join(&request.path)?
        } else {
            return Err(ResolveError::HttpsRequired);
        };
        Ok(Self { url, base_is_https })
    }

    /// Whether the original base URL used `https://`.
    pub fn base_is_https(&self) -> bool {
        self.base_is_https
    }

    /// Same host and path with the base URL's scheme downgraded to `http://`.
    ///
    /// Only meaningful when [`base_is_https`](Self::base_is_https) holds. An
    /// absolute path still overrides the base, as in [`resolve`](Self::resolve).
    pub fn downgraded(&self, request: &ForwardRequest) -> Result<Url, url::ParseError> {
        let base = request.base_url();
        let rest = base.get(HTTPS_PREFIX.len()..).unwrap_or_default();
        Url::parse(&format!("http://{}", rest))?.join(&request.path)
    }
}

/// One concrete HTTP request, as transmitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub url: Url,
    pub method: Method,
    /// Request headers (credentials)
    pub headers: HeaderMap,
    /// Entity headers, empty when no body is sent
    pub content_headers: HeaderMap,
    pub body: Option<String>,
}

impl Attempt {
    /// Build the attempt for `request` against `url`.
    ///
    /// POST and PUT always carry a body with `content-type: application/json`.
    /// No `Accept` header is ever added.
    pub fn build(url: Url, request: &ForwardRequest) -> Result<Self, TransportError> {
        let method_name = request.method().to_ascii_uppercase();
        let method = Method::from_bytes(method_name.as_bytes())
            .map_err(|_| TransportError::InvalidMethod(request.method().to_string()))?;

        let mut headers = HeaderMap::new();
        if !request.user().is_empty() || !request.pass().is_empty() {
            let token = STANDARD.encode(format!("{}:{}", request.user(), request.pass()));
            let value = HeaderValue::try_from(format!("Basic {}", token))
                .map_err(hyper::http::Error::from)?;
            headers.insert(AUTHORIZATION, value);
        }

        let mut content_headers = HeaderMap::new();
        let body = if method == Method::POST || method == Method::PUT {
            let body = request.body.clone().unwrap_or_default();
            content_headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
            content_headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
            Some(body)
        } else {
            None
        };

        Ok(Self {
            url,
            method,
            headers,
            content_headers,
            body,
        })
    }

    /// Echo of this attempt for the forward result.
    pub fn echo(&self, request: &ForwardRequest) -> RequestEcho {
        RequestEcho {
            url: self.url.to_string(),
            method: self.method.to_string(),
            headers: Some(render_headers(&self.headers)),
            content_headers: (!self.content_headers.is_empty())
                .then(|| render_headers(&self.content_headers)),
            body: request.body.clone(),
        }
    }

    /// Convert into a hyper request.
    pub fn to_http_request(&self) -> Result<hyper::Request<Full<Bytes>>, TransportError> {
        let mut builder = hyper::Request::builder()
            .method(self.method.clone())
            .uri(self.url.as_str());
        for (name, value) in self.headers.iter().chain(self.content_headers.iter()) {
            builder = builder.header(name, value);
        }
        let body = self.body.clone().map(Bytes::from).unwrap_or_default();
        Ok(builder.body(Full::new(body))?)
    }
}

/// Render headers as `name: value\r\n` lines.
pub fn render_headers(headers: &HeaderMap) -> String {
    let mut out = String::new();
    for (name, value) in headers {
        out.push_str(name.as_str());
        out.push_str(": ");
        out.push_str(&String::from_utf8_lossy(value.as_bytes()));
        out.push_str("\r\n");
    }
    out
}
