//! Client library for the Treasure Data REST API.
//!
//! # Overview
//! Database and table management, query jobs, schedules, exports, bulk
//! imports and result destinations. Every operation maps to exactly one HTTP
//! request against the `/v3` API.
//!
//! # Design
//! - [`catalog`] holds one pure function per endpoint, producing an
//!   [`HttpRequest`] with escaped path segments, query and body.
//! - [`TdClient::dispatch`] adds the endpoint and headers, sends the request
//!   through a [`Transport`] and turns the response into a [`Payload`] or a
//!   uniform [`Error`].
//! - Optional arguments are options records with `Default` impls.
//!
//! ```no_run
//! use td_core::{ClientConfig, ListJobsOptions, TdClient};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = TdClient::new(ClientConfig::from_env()?);
//! let jobs = client.list_jobs(&ListJobsOptions::default())?;
//! println!("{}", jobs.text());
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod transport;
pub mod types;

pub use client::{parse_response, TdClient};
pub use config::{ClientConfig, ConfigError, Protocol};
pub use error::Error;
pub use http::{escape, HttpMethod, HttpRequest, HttpResponse, Payload, RequestBody, ResponseFormat};
pub use transport::{OutgoingRequest, Transport, TransportError, UreqTransport};
pub use types::{
    ExportOptions, ExtraParams, HistoryOptions, ImportOptions, JobResultOptions, JobStatus,
    ListJobsOptions, QueryEngine, QueryOptions, ResultFormat, RunScheduleOptions, ScheduleOptions,
    TableType, TailOptions,
};
