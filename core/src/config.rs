//! Client configuration.
//!
//! A `ClientConfig` is built once per credential set. Defaults are applied at
//! construction; nothing is read from global state after that.

use std::{env, fmt, str::FromStr, time::Duration};

pub const DEFAULT_HOST: &str = "api.treasuredata.com";

/// An error encountered while building a configuration.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("No API key found (set TD_API_KEY)")]
    NoApiKey,
    #[error("Unsupported protocol '{0}'")]
    InvalidProtocol(String),
}

/// URL scheme used to reach the API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Protocol {
    Http,
    #[default]
    Https,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            _ => Err(ConfigError::InvalidProtocol(s.to_string())),
        }
    }
}

/// Connection settings for one API key.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_key: String,
    /// Host name, optionally with a port.
    pub host: String,
    pub protocol: Protocol,
    /// Headers added to every request, after `Authorization`.
    pub headers: Vec<(String, String)>,
    /// Overall timeout per request. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &"********")
            .field("host", &self.host)
            .field("protocol", &self.protocol)
            .field("headers", &self.headers)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            host: DEFAULT_HOST.to_string(),
            protocol: Protocol::default(),
            headers: Vec::new(),
            timeout: None,
        }
    }

    /// Build a configuration from the environment.
    ///
    /// | Environment Variable | Meaning                                   |
    /// |----------------------|-------------------------------------------|
    /// | `TD_API_KEY`         | API key (required)                        |
    /// | `TD_API_SERVER`      | `host`, or `scheme://host` to set both    |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(env::var("TD_API_KEY").ok(), env::var("TD_API_SERVER").ok())
    }

    fn from_vars(api_key: Option<String>, server: Option<String>) -> Result<Self, ConfigError> {
        let api_key = api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::NoApiKey)?;
        let mut config = Self::new(api_key.trim());

        if let Some(server) = server.filter(|s| !s.is_empty()) {
            match server.split_once("://") {
                Some((scheme, host)) => {
                    config.protocol = scheme.parse()?;
                    config.host = host.trim_end_matches('/').to_string();
                }
                None => config.host = server.trim_end_matches('/').to_string(),
            }
        }

        Ok(config)
    }

    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// `protocol://host`, with no trailing slash.
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.host)
    }
}
