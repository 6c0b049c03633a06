//! The network boundary.
//!
//! `TdClient` never talks to a socket directly; it hands a fully prepared
//! `OutgoingRequest` to a `Transport`. The default transport is a blocking
//! ureq agent. Tests swap in their own implementation to observe what would
//! have been sent.

use std::io::Read;

use ureq::{http::Response, Agent, Body, SendBody};

use crate::http::{HttpMethod, HttpResponse, RequestBody};

/// A request with an absolute URL and its final header set.
#[derive(Debug)]
pub struct OutgoingRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

/// No response was received: connection refused, DNS failure, timeout, TLS
/// error, or the body could not be read.
#[derive(Debug, thiserror::Error)]
#[error("transport error: {source}")]
pub struct TransportError {
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
}

impl TransportError {
    pub fn new(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

impl From<ureq::Error> for TransportError {
    fn from(e: ureq::Error) -> Self {
        Self::new(e)
    }
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        Self::new(e)
    }
}

/// Executes one HTTP round-trip.
///
/// Implementations must return non-2xx responses as `Ok`; status
/// interpretation belongs to the client. Headers are sent as given, including
/// `Content-Type`.
pub trait Transport: Send + Sync {
    fn send(&self, request: OutgoingRequest) -> Result<HttpResponse, TransportError>;
}

/// Blocking transport backed by a shared ureq agent.
#[derive(Clone)]
pub struct UreqTransport {
    agent: Agent,
}

impl UreqTransport {
    pub fn new(timeout: Option<std::time::Duration>) -> Self {
        let agent = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(timeout)
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: OutgoingRequest) -> Result<HttpResponse, TransportError> {
        let OutgoingRequest {
            method,
            url,
            headers,
            body,
        } = request;

        let response = match method {
            HttpMethod::Get => {
                let mut builder = self.agent.get(&url);
                for (name, value) in &headers {
                    builder = builder.header(name, value);
                }
                builder.call()?
            }
            HttpMethod::Post | HttpMethod::Put => {
                let mut builder = match method {
                    HttpMethod::Put => self.agent.put(&url),
                    _ => self.agent.post(&url),
                };
                for (name, value) in &headers {
                    builder = builder.header(name, value);
                }
                match body {
                    RequestBody::Empty => builder.send_empty()?,
                    RequestBody::Json(value) => {
                        let bytes = serde_json::to_vec(&value).map_err(TransportError::new)?;
                        builder.send(&bytes[..])?
                    }
                    RequestBody::Stream { mut reader, .. } => {
                        builder.send(SendBody::from_reader(&mut reader))?
                    }
                }
            }
        };

        into_http_response(response)
    }
}

fn into_http_response(response: Response<Body>) -> Result<HttpResponse, TransportError> {
    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    let mut body = Vec::new();
    response.into_body().into_reader().read_to_end(&mut body)?;

    Ok(HttpResponse {
        status,
        headers,
        body,
    })
}
