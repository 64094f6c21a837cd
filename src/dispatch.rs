//! Request assembly, transport, and the uniform `{status, body}` result.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Map, Value};

use crate::error::TransportError;
use crate::types::Method;

#[cfg(feature = "remote")]
use crate::types::ClientOptions;

/// Content type sent with every request.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Message placed in the body of a result that has no real response.
pub const FAILURE_MESSAGE: &str = "Something went wrong, see details.";

/// A request ready for the transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreparedRequest {
    pub method: Method,
    /// Resolved path, without query string.
    pub path: String,
    /// Encoded query string, without the leading `?`.
    pub query: Option<String>,
    /// JSON body.
    pub body: Option<Value>,
}

impl PreparedRequest {
    /// Place the payload in the query string (GET) or the body (everything else).
    ///
    /// A GET with an empty payload has neither; other methods always carry a
    /// body, `{}` when nothing was filled in.
    pub fn new(method: Method, path: impl Into<String>, payload: Map<String, Value>) -> Self {
        let path = path.into();
        if method.carries_body() {
            Self {
                method,
                path,
                query: None,
                body: Some(Value::Object(payload)),
            }
        } else {
            let query = (!payload.is_empty()).then(|| encode_query(&payload));
            Self {
                method,
                path,
                query,
                body: None,
            }
        }
    }

    /// Path plus query string, as sent on the wire.
    pub fn target(&self) -> String {
        match &self.query {
            Some(query) => format!("{}?{}", self.path, query),
            None => self.path.clone(),
        }
    }
}

/// Serialize a payload as `key=value&...`.
///
/// String values are sent verbatim; anything else as compact JSON.
pub fn encode_query(payload: &Map<String, Value>) -> String {
    payload
        .iter()
        .map(|(key, value)| {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            format!(
                "{}={}",
                urlencoding::encode(key),
                urlencoding::encode(&text)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Cookie credentials carried from one request to the next.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    cookies: BTreeMap<String, String>,
}

impl Session {
    /// A session with no credentials.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Value for the `Cookie` request header, if any cookie is held.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Apply `Set-Cookie` header values from a response.
    ///
    /// An empty value, a `Max-Age` of zero or less, or an `Expires` date that
    /// has passed removes the cookie. `Max-Age` wins over `Expires`.
    pub fn absorb<S: AsRef<str>>(&mut self, set_cookies: &[S]) {
        let now = Utc::now();
        for header in set_cookies {
            let mut parts = header.as_ref().split(';');
            let Some((name, value)) = parts.next().and_then(|pair| pair.split_once('=')) else {
                continue;
            };
            let name = name.trim();
            let value = value.trim();
            if name.is_empty() {
                continue;
            }
            let expired = is_expired(parts, now);
            if value.is_empty() || expired {
                self.cookies.remove(name);
            } else {
                self.cookies.insert(name.to_string(), value.to_string());
            }
        }
    }
}

fn is_expired<'a>(attributes: impl Iterator<Item = &'a str>, now: DateTime<Utc>) -> bool {
    let mut max_age = None;
    let mut expires = None;
    for attr in attributes {
        let Some((name, value)) = attr.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match name.trim().to_ascii_lowercase().as_str() {
            "max-age" => max_age = value.parse::<i64>().ok(),
            "expires" => expires = parse_cookie_date(value),
            _ => {}
        }
    }

    match (max_age, expires) {
        (Some(seconds), _) => seconds <= 0,
        (None, Some(at)) => at <= now,
        (None, None) => false,
    }
}

/// Parse an `Expires` date: `Wed, 21 Oct 2015 07:28:00 GMT`, or the older
/// dashed form `Wed, 21-Oct-2015 07:28:00 GMT`.
fn parse_cookie_date(value: &str) -> Option<DateTime<Utc>> {
    let normalized = value.replace('-', " ");
    DateTime::parse_from_rfc2822(&normalized)
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

/// Status of a dispatch result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    /// Numeric HTTP status of a decoded response.
    Code(u16),
    /// No usable response; rendered as `???`.
    Unavailable,
}

impl ResponseStatus {
    pub fn code(&self) -> Option<u16> {
        match self {
            ResponseStatus::Code(code) => Some(*code),
            ResponseStatus::Unavailable => None,
        }
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseStatus::Code(code) => write!(f, "{}", code),
            ResponseStatus::Unavailable => f.write_str("???"),
        }
    }
}

impl Serialize for ResponseStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ResponseStatus::Code(code) => serializer.serialize_u16(*code),
            ResponseStatus::Unavailable => serializer.serialize_str("???"),
        }
    }
}

/// Uniform outcome of one submission, success or failure alike.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchResult {
    pub status: ResponseStatus,
    pub body: Value,
}

impl DispatchResult {
    pub fn completed(status: u16, body: Value) -> Self {
        Self {
            status: ResponseStatus::Code(status),
            body,
        }
    }

    /// Result for a failure that produced no usable response.
    pub fn failed(error: &dyn std::error::Error) -> Self {
        Self {
            status: ResponseStatus::Unavailable,
            body: json!({
                "error": FAILURE_MESSAGE,
                "details": error.to_string(),
            }),
        }
    }

    /// True for 1xx-3xx responses.
    pub fn is_success(&self) -> bool {
        matches!(self.status, ResponseStatus::Code(code) if code < 400)
    }
}

/// Undecoded response handed back by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
    /// Raw `Set-Cookie` header values.
    pub set_cookies: Vec<String>,
}

/// Sends a prepared request somewhere and returns the raw response.
pub trait Transport {
    /// # Errors
    ///
    /// Returns `TransportError` when no response could be obtained.
    fn send(&self, request: &PreparedRequest, session: &Session)
        -> Result<RawResponse, TransportError>;
}

/// Issues requests and normalizes every outcome into a [`DispatchResult`].
#[derive(Debug, Clone)]
pub struct Dispatcher<T> {
    transport: T,
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send once, no retries. Never fails: errors become an `Unavailable` result.
    ///
    /// Cookies set by the response are stored in `session`.
    pub fn dispatch(&self, request: &PreparedRequest, session: &mut Session) -> DispatchResult {
        tracing::debug!(method = %request.method, path = %request.target(), "dispatching");

        let raw = match self.transport.send(request, session) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "request failed");
                return DispatchResult::failed(&e);
            }
        };

        session.absorb(&raw.set_cookies);

        match serde_json::from_str(&raw.body) {
            Ok(body) => {
                tracing::debug!(status = raw.status, "response decoded");
                DispatchResult::completed(raw.status, body)
            }
            Err(source) => {
                let e = TransportError::Decode { source };
                tracing::warn!(status = raw.status, error = %e, "response not decoded");
                DispatchResult::failed(&e)
            }
        }
    }
}

/// HTTP transport backed by a blocking `reqwest` client.
#[cfg(feature = "remote")]
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    base_url: String,
}

#[cfg(feature = "remote")]
impl HttpTransport {
    /// # Errors
    ///
    /// Returns `TransportError::Http` if the client cannot be built.
    pub fn new(options: &ClientOptions) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|source| TransportError::Http {
                url: options.base_url.clone(),
                source,
            })?;

        Ok(Self {
            client,
            base_url: options.base_url.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[cfg(feature = "remote")]
impl Transport for HttpTransport {
    fn send(
        &self,
        request: &PreparedRequest,
        session: &Session,
    ) -> Result<RawResponse, TransportError> {
        use reqwest::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};

        let url = format!("{}{}", self.base_url, request.target());
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
            Method::Patch => reqwest::Method::PATCH,
        };

        let mut builder = self
            .client
            .request(method, &url)
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE);
        if let Some(cookie) = session.cookie_header() {
            builder = builder.header(COOKIE, cookie);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.to_string());
        }

        let response = builder.send().map_err(|source| TransportError::Http {
            url: url.clone(),
            source,
        })?;

        let status = response.status().as_u16();
        let set_cookies = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(String::from)
            .collect();
        let body = response
            .text()
            .map_err(|source| TransportError::Http { url, source })?;

        Ok(RawResponse {
            status,
            body,
            set_cookies,
        })
    }
}
