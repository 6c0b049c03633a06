//! HTTP request and response values for the Treasure Data REST API.
//!
//! # Design
//! Requests are described as plain data. The catalog builds an
//! `HttpRequest` whose `path` is relative to the API endpoint; the client
//! turns it into an absolute URL, decorates it with headers and hands it to
//! a `Transport`. Responses come back as `HttpResponse` and are normalized
//! into a `Payload`.

use std::{borrow::Cow, fmt, io::Read};

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Characters left untouched when escaping a path segment or query value.
///
/// Matches the unreserved set the REST API has always been called with:
/// ASCII alphanumerics plus `- _ . ! ~ * ' ( )`.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Percent-escape a user-supplied identifier for use as a path segment or
/// query value.
pub fn escape(segment: &str) -> String {
    utf8_percent_encode(segment, SEGMENT).to_string()
}

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a successful response body should be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    /// Parse as JSON, falling back to raw bytes if the body is not JSON.
    Json,
    /// Keep the body as-is (job results, table tails).
    Raw,
}

/// The body of an outgoing request.
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    /// A caller-supplied byte stream, read exactly once while sending.
    Stream {
        reader: Box<dyn Read + Send>,
        length: Option<u64>,
    },
}

impl RequestBody {
    pub fn stream(reader: impl Read + Send + 'static, length: Option<u64>) -> Self {
        RequestBody::Stream {
            reader: Box::new(reader),
            length,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, RequestBody::Empty)
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            RequestBody::Json(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Empty => f.write_str("Empty"),
            RequestBody::Json(value) => f.debug_tuple("Json").field(value).finish(),
            RequestBody::Stream { length, .. } => f
                .debug_struct("Stream")
                .field("length", length)
                .finish_non_exhaustive(),
        }
    }
}

/// One outgoing API call, described as plain data.
///
/// Built fresh by the functions in [`crate::catalog`] and consumed by
/// [`crate::TdClient::dispatch`]. Never reused: a streamed body can only be
/// read once.
#[derive(Debug)]
pub struct HttpRequest {
    pub method: HttpMethod,
    /// Path relative to the API endpoint, with identifiers already escaped.
    pub path: String,
    /// Query parameters in the order they are sent. Values are unescaped.
    pub query: Vec<(String, String)>,
    /// Call-specific headers. Merged last, so they win over config headers.
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
    pub format: ResponseFormat,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: RequestBody::Empty,
            format: ResponseFormat::Json,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, path)
    }

    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Add a query parameter only if `value` is present.
    #[must_use]
    pub fn query_opt<V: ToString>(self, key: &str, value: Option<V>) -> Self {
        match value {
            Some(value) => self.query(key, value),
            None => self,
        }
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    #[must_use]
    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    #[must_use]
    pub fn raw(mut self) -> Self {
        self.format = ResponseFormat::Raw;
        self
    }

    /// Look up a query parameter by name.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Render the query string (without the leading `?`), or `None` if
    /// there are no parameters.
    pub fn query_string(&self) -> Option<String> {
        if self.query.is_empty() {
            return None;
        }
        let pairs: Vec<String> = self
            .query
            .iter()
            .map(|(k, v)| format!("{}={}", escape(k), escape(v)))
            .collect();
        Some(pairs.join("&"))
    }

    pub fn path_and_query(&self) -> String {
        match self.query_string() {
            Some(qs) => format!("{}?{qs}", self.path),
            None => self.path.clone(),
        }
    }
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }
}

/// A decoded response body.
///
/// Bodies that parse as JSON become `Json`; everything else (TSV job
/// results, msgpack tails, HTML error pages) stays `Raw`. An empty body is
/// always reported as an empty JSON object.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(serde_json::Value),
    Raw(Vec<u8>),
}

impl Payload {
    pub fn empty() -> Self {
        Payload::Json(serde_json::Value::Object(serde_json::Map::new()))
    }

    /// Decode a response body according to `format`.
    ///
    /// Raw bodies are kept byte for byte unless they are empty. JSON bodies
    /// that are only whitespace count as empty.
    pub fn decode(body: Vec<u8>, format: ResponseFormat) -> Self {
        match format {
            ResponseFormat::Raw if body.is_empty() => Payload::empty(),
            ResponseFormat::Raw => Payload::Raw(body),
            ResponseFormat::Json if body.iter().all(u8::is_ascii_whitespace) => Payload::empty(),
            ResponseFormat::Json => match serde_json::from_slice(&body) {
                Ok(value) => Payload::Json(value),
                Err(_) => Payload::Raw(body),
            },
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::Raw(_) => None,
        }
    }

    pub fn into_json(self) -> Option<serde_json::Value> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::Raw(_) => None,
        }
    }

    /// Shortcut for `as_json().and_then(|v| v.get(key))`.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.as_json().and_then(|v| v.get(key))
    }

    /// The body as text. JSON payloads are re-serialized.
    pub fn text(&self) -> Cow<'_, str> {
        match self {
            Payload::Json(value) => Cow::Owned(value.to_string()),
            Payload::Raw(bytes) => String::from_utf8_lossy(bytes),
        }
    }

    pub fn bytes(&self) -> Cow<'_, [u8]> {
        match self {
            Payload::Json(value) => Cow::Owned(value.to_string().into_bytes()),
            Payload::Raw(bytes) => Cow::Borrowed(bytes),
        }
    }
}
