//! Error types for the Treasure Data client.
//!
//! # Design
//! Every operation funnels through the same dispatcher, so callers see one
//! error shape no matter which endpoint failed. Local precondition failures
//! (`Validation`) never reach the network; `Transport` means no response was
//! received; `Api` means the server answered with a non-2xx status, and the
//! decoded body rides along for diagnostics.

use crate::http::Payload;
use crate::transport::TransportError;

/// Errors returned by `TdClient` operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required argument was missing or invalid. No request was sent.
    #[error("{0}")]
    Validation(String),

    /// The request could not be delivered or no response was received.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server returned a status outside 200..=299.
    ///
    /// `message` is the body's `error` field when the body is a JSON object
    /// carrying one, otherwise `"HTTP <status>"`.
    #[error("{message}")]
    Api {
        status: u16,
        message: String,
        body: Payload,
    },

    /// A request body could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Build an `Api` error from a non-2xx status and its decoded body.
    pub fn from_response(status: u16, body: Payload) -> Self {
        let message = body
            .get("error")
            .and_then(|e| e.as_str())
            .filter(|e| !e.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {status}"));

        Error::Api {
            status,
            message,
            body,
        }
    }

    /// The HTTP status, for API errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The decoded response body, for API errors.
    pub fn body(&self) -> Option<&Payload> {
        match self {
            Error::Api { body, .. } => Some(body),
            _ => None,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}
