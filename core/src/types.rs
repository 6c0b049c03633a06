//! Typed arguments for API operations.
//!
//! # Design
//! Operations with trailing optional arguments take an options record
//! instead of positional overloads. Every record implements `Default`, so
//! `Default::default()` always means "send only what is required". JSON
//! bodies skip absent fields and flatten `extra` for parameters this crate
//! does not model.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Storage type of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableType {
    Log,
    Item,
}

impl TableType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableType::Log => "log",
            TableType::Item => "item",
        }
    }
}

impl fmt::Display for TableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Query engine a job is issued to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryEngine {
    Hive,
    Presto,
}

impl QueryEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryEngine::Hive => "hive",
            QueryEngine::Presto => "presto",
        }
    }
}

impl fmt::Display for QueryEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serialization format for job results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResultFormat {
    #[default]
    Tsv,
    Csv,
    Json,
    MsgPack,
    MsgPackGz,
}

impl ResultFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultFormat::Tsv => "tsv",
            ResultFormat::Csv => "csv",
            ResultFormat::Json => "json",
            ResultFormat::MsgPack => "msgpack",
            ResultFormat::MsgPackGz => "msgpack.gz",
        }
    }
}

impl fmt::Display for ResultFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job status filter for `list_jobs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Running,
    Success,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::Error => "error",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options for `tail`. Sent as query parameters in the order count, to,
/// from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TailOptions {
    pub count: Option<u64>,
    /// Upper bound, as unix time.
    pub to: Option<i64>,
    /// Lower bound, as unix time.
    pub from: Option<i64>,
}

/// Options for `list_jobs`. `from` is always sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListJobsOptions {
    pub from: u64,
    pub to: Option<u64>,
    pub status: Option<JobStatus>,
    pub conditions: Option<String>,
}

/// Options for `job_result`. The format defaults to TSV.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobResultOptions {
    pub format: Option<ResultFormat>,
}

impl JobResultOptions {
    pub fn format(format: ResultFormat) -> Self {
        Self {
            format: Some(format),
        }
    }
}

/// An options record with named fields plus a free-form `extra` map.
pub trait ExtraParams {
    /// Body keys the record models as fields.
    const FIELDS: &'static [&'static str];

    fn extra(&self) -> &Map<String, Value>;

    /// The first `extra` key that would overwrite a modelled field.
    fn shadowed_key(&self) -> Option<&str> {
        self.extra()
            .keys()
            .map(String::as_str)
            .find(|key| Self::FIELDS.iter().any(|field| field == key))
    }
}

/// Options for issuing a query job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Result output URL, e.g. `web://result.example.com/callback`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_limit: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Options for `export`. `storage_type` is passed separately.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_access_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Definition of a schedule, for `create_schedule` and `update_schedule`.
///
/// `cron` and `query` are required when creating.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    /// Delay in seconds before each run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i8>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ExtraParams for QueryOptions {
    const FIELDS: &'static [&'static str] = &["result", "priority", "retry_limit"];

    fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }
}

impl ExtraParams for ExportOptions {
    const FIELDS: &'static [&'static str] = &[
        "bucket",
        "access_key_id",
        "secret_access_key",
        "file_prefix",
        "file_format",
        "from",
        "to",
    ];

    fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }
}

impl ExtraParams for ScheduleOptions {
    const FIELDS: &'static [&'static str] = &[
        "cron",
        "query",
        "database",
        "result",
        "timezone",
        "delay",
        "retry_limit",
        "priority",
    ];

    fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }
}

/// Options for schedule `history`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryOptions {
    pub from: Option<u64>,
    pub to: Option<u64>,
}

/// Options for `run_schedule`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunScheduleOptions {
    /// Number of runs to trigger, counting back from `time`.
    pub num: Option<u32>,
}

/// Options for `import`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportOptions {
    /// Idempotency key. When set, the `import_with_id` endpoint is used.
    pub unique_id: Option<String>,
}

impl ImportOptions {
    /// Use a freshly generated idempotency key.
    pub fn with_generated_id() -> Self {
        Self {
            unique_id: Some(uuid::Uuid::new_v4().simple().to_string()),
        }
    }
}
