//! The Treasure Data REST API client.
//!
//! # Design
//! `TdClient` holds a `ClientConfig` and a `Transport`, nothing else. Every
//! operation builds an `HttpRequest` with the matching [`crate::catalog`]
//! function and passes it to [`TdClient::dispatch`], which attaches the
//! endpoint and headers, performs the round-trip and normalizes the outcome.
//! There is no per-call mutable state, so one client can be shared across
//! threads.

use std::{io::Read, sync::Arc};

use serde_json::Value;
use tracing::{debug, error, warn};

use crate::catalog;
use crate::config::ClientConfig;
use crate::error::Error;
use crate::http::{HttpRequest, HttpResponse, Payload, ResponseFormat};
use crate::transport::{OutgoingRequest, Transport, UreqTransport};
use crate::types::{
    ExportOptions, HistoryOptions, ImportOptions, JobResultOptions, ListJobsOptions, QueryEngine,
    QueryOptions, RunScheduleOptions, ScheduleOptions, TableType, TailOptions,
};

const USER_AGENT: &str = concat!("td-client-rust/", env!("CARGO_PKG_VERSION"));

/// Client for the Treasure Data REST API.
#[derive(Clone)]
pub struct TdClient {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for TdClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TdClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Set `name` to `value`, replacing any existing header of the same name
/// (case-insensitively).
fn set_header(headers: &mut Vec<(String, String)>, name: &str, value: &str) {
    headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    headers.push((name.to_string(), value.to_string()));
}

/// Decide the outcome of a completed round-trip.
///
/// Statuses in 200..=299 yield the decoded body (an empty body becomes `{}`);
/// anything else yields `Error::Api` carrying the decoded body.
pub fn parse_response(response: HttpResponse, format: ResponseFormat) -> Result<Payload, Error> {
    if response.is_success() {
        return Ok(Payload::decode(response.body, format));
    }

    // Error bodies are JSON when the server has anything to say.
    let body = Payload::decode(response.body, ResponseFormat::Json);
    Err(Error::from_response(response.status, body))
}

impl TdClient {
    /// Create a client using the default blocking HTTP transport.
    pub fn new(config: ClientConfig) -> Self {
        let transport = UreqTransport::new(config.timeout);
        Self::with_transport(config, transport)
    }

    pub fn with_transport(config: ClientConfig, transport: impl Transport + 'static) -> Self {
        Self {
            config,
            transport: Arc::new(transport),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Replace the configuration. The transport is kept.
    pub fn reconfigure(&mut self, config: ClientConfig) {
        self.config = config;
    }

    pub fn base_url(&self) -> String {
        self.config.base_url()
    }

    /// Turn a catalog request into what goes on the wire.
    ///
    /// Header precedence, lowest first: `User-Agent`, `Authorization`,
    /// `Content-Type: application/json` for JSON bodies, configured headers,
    /// call headers. Each name appears once.
    pub fn prepare(&self, request: HttpRequest) -> (OutgoingRequest, ResponseFormat) {
        let url = format!("{}{}", self.config.base_url(), request.path_and_query());

        let mut headers = Vec::new();
        set_header(&mut headers, "User-Agent", USER_AGENT);
        set_header(
            &mut headers,
            "Authorization",
            &format!("TD1 {}", self.config.api_key),
        );
        if request.body.as_json().is_some() {
            set_header(&mut headers, "Content-Type", "application/json");
        }
        for (name, value) in self.config.headers.iter().chain(&request.headers) {
            set_header(&mut headers, name, value);
        }

        let outgoing = OutgoingRequest {
            method: request.method,
            url,
            headers,
            body: request.body,
        };
        (outgoing, request.format)
    }

    /// Send one request and normalize the outcome.
    pub fn dispatch(&self, request: HttpRequest) -> Result<Payload, Error> {
        let (outgoing, format) = self.prepare(request);
        let method = outgoing.method;
        let url = outgoing.url.clone();
        debug!(%method, %url, "dispatching request");

        let response = self.transport.send(outgoing).map_err(|e| {
            error!(%method, %url, "request failed: {e}");
            Error::Transport(e)
        })?;
        debug!(%method, %url, status = response.status, "received response");

        parse_response(response, format).inspect_err(|e| {
            if let Error::Api { status, message, .. } = e {
                warn!(%method, %url, status, "API error: {message}");
            }
        })
    }

    // --- databases ---

    pub fn list_databases(&self) -> Result<Payload, Error> {
        self.dispatch(catalog::list_databases())
    }

    pub fn create_database(&self, db: &str) -> Result<Payload, Error> {
        self.dispatch(catalog::create_database(db))
    }

    pub fn delete_database(&self, db: &str) -> Result<Payload, Error> {
        self.dispatch(catalog::delete_database(db))
    }

    // --- tables ---

    pub fn list_tables(&self, db: &str) -> Result<Payload, Error> {
        self.dispatch(catalog::list_tables(db))
    }

    pub fn create_table(
        &self,
        db: &str,
        table: &str,
        table_type: TableType,
    ) -> Result<Payload, Error> {
        self.dispatch(catalog::create_table(db, table, table_type))
    }

    pub fn create_log_table(&self, db: &str, table: &str) -> Result<Payload, Error> {
        self.dispatch(catalog::create_log_table(db, table))
    }

    pub fn create_item_table(&self, db: &str, table: &str) -> Result<Payload, Error> {
        self.dispatch(catalog::create_item_table(db, table))
    }

    pub fn swap_table(&self, db: &str, table1: &str, table2: &str) -> Result<Payload, Error> {
        self.dispatch(catalog::swap_table(db, table1, table2))
    }

    pub fn update_schema(&self, db: &str, table: &str, schema: Value) -> Result<Payload, Error> {
        self.dispatch(catalog::update_schema(db, table, schema))
    }

    pub fn delete_table(&self, db: &str, table: &str) -> Result<Payload, Error> {
        self.dispatch(catalog::delete_table(db, table))
    }

    /// Fetch the most recent rows of a table. The body is returned raw.
    pub fn tail(&self, db: &str, table: &str, opts: &TailOptions) -> Result<Payload, Error> {
        self.dispatch(catalog::tail(db, table, opts))
    }

    // --- jobs ---

    pub fn list_jobs(&self, opts: &ListJobsOptions) -> Result<Payload, Error> {
        self.dispatch(catalog::list_jobs(opts))
    }

    pub fn show_job(&self, job_id: &str) -> Result<Payload, Error> {
        self.dispatch(catalog::show_job(job_id))
    }

    pub fn job_status(&self, job_id: &str) -> Result<Payload, Error> {
        self.dispatch(catalog::job_status(job_id))
    }

    /// Download a job's result. The body is returned raw, in the requested
    /// format (TSV unless set).
    pub fn job_result(&self, job_id: &str, opts: &JobResultOptions) -> Result<Payload, Error> {
        self.dispatch(catalog::job_result(job_id, opts))
    }

    pub fn kill(&self, job_id: &str) -> Result<Payload, Error> {
        self.dispatch(catalog::kill(job_id))
    }

    pub fn query(
        &self,
        db: &str,
        engine: QueryEngine,
        query: &str,
        opts: &QueryOptions,
    ) -> Result<Payload, Error> {
        self.dispatch(catalog::query(db, engine, query, opts)?)
    }

    pub fn hive_query(&self, db: &str, query: &str, opts: &QueryOptions) -> Result<Payload, Error> {
        self.dispatch(catalog::hive_query(db, query, opts)?)
    }

    pub fn presto_query(
        &self,
        db: &str,
        query: &str,
        opts: &QueryOptions,
    ) -> Result<Payload, Error> {
        self.dispatch(catalog::presto_query(db, query, opts)?)
    }

    // --- export ---

    pub fn export(
        &self,
        db: &str,
        table: &str,
        storage_type: &str,
        opts: &ExportOptions,
    ) -> Result<Payload, Error> {
        self.dispatch(catalog::export(db, table, storage_type, opts)?)
    }

    // --- schedules ---

    /// Create a schedule. Returns `Error::Validation` without sending
    /// anything when `cron` or `query` is missing.
    pub fn create_schedule(&self, name: &str, opts: &ScheduleOptions) -> Result<Payload, Error> {
        self.dispatch(catalog::create_schedule(name, opts)?)
    }

    pub fn delete_schedule(&self, name: &str) -> Result<Payload, Error> {
        self.dispatch(catalog::delete_schedule(name))
    }

    pub fn list_schedules(&self) -> Result<Payload, Error> {
        self.dispatch(catalog::list_schedules())
    }

    pub fn update_schedule(&self, name: &str, params: &ScheduleOptions) -> Result<Payload, Error> {
        self.dispatch(catalog::update_schedule(name, params)?)
    }

    pub fn history(&self, name: &str, opts: &HistoryOptions) -> Result<Payload, Error> {
        self.dispatch(catalog::history(name, opts))
    }

    pub fn run_schedule(
        &self,
        name: &str,
        time: i64,
        opts: &RunScheduleOptions,
    ) -> Result<Payload, Error> {
        self.dispatch(catalog::run_schedule(name, time, opts))
    }

    // --- import ---

    /// Upload `size` bytes from `stream` into a table. The stream is
    /// consumed by the call.
    pub fn import(
        &self,
        db: &str,
        table: &str,
        format: &str,
        stream: impl Read + Send + 'static,
        size: u64,
        opts: &ImportOptions,
    ) -> Result<Payload, Error> {
        self.dispatch(catalog::import(db, table, format, stream, size, opts))
    }

    // --- result destinations ---

    pub fn list_results(&self) -> Result<Payload, Error> {
        self.dispatch(catalog::list_results())
    }

    pub fn create_result(&self, name: &str, url: &str) -> Result<Payload, Error> {
        self.dispatch(catalog::create_result(name, url))
    }

    pub fn delete_result(&self, name: &str, url: &str) -> Result<Payload, Error> {
        self.dispatch(catalog::delete_result(name, url))
    }

    // --- server status ---

    pub fn server_status(&self) -> Result<Payload, Error> {
        self.dispatch(catalog::server_status())
    }

    // --- bulk import ---

    pub fn create_bulk_import(&self, name: &str, db: &str, table: &str) -> Result<Payload, Error> {
        self.dispatch(catalog::create_bulk_import(name, db, table))
    }

    pub fn delete_bulk_import(&self, name: &str) -> Result<Payload, Error> {
        self.dispatch(catalog::delete_bulk_import(name))
    }

    pub fn show_bulk_import(&self, name: &str) -> Result<Payload, Error> {
        self.dispatch(catalog::show_bulk_import(name))
    }

    pub fn list_bulk_imports(&self) -> Result<Payload, Error> {
        self.dispatch(catalog::list_bulk_imports())
    }

    pub fn list_bulk_import_parts(&self, name: &str) -> Result<Payload, Error> {
        self.dispatch(catalog::list_bulk_import_parts(name))
    }

    pub fn bulk_import_upload_part(
        &self,
        name: &str,
        part_name: &str,
        stream: impl Read + Send + 'static,
    ) -> Result<Payload, Error> {
        self.dispatch(catalog::bulk_import_upload_part(name, part_name, stream))
    }

    pub fn bulk_import_delete_part(&self, name: &str, part_name: &str) -> Result<Payload, Error> {
        self.dispatch(catalog::bulk_import_delete_part(name, part_name))
    }

    pub fn perform_bulk_import(&self, name: &str) -> Result<Payload, Error> {
        self.dispatch(catalog::perform_bulk_import(name))
    }

    pub fn commit_bulk_import(&self, name: &str) -> Result<Payload, Error> {
        self.dispatch(catalog::commit_bulk_import(name))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::config::Protocol;
    use crate::http::{HttpMethod, RequestBody};
    use crate::transport::TransportError;
    use serde_json::json;

    /// Records what was sent and replies with a canned response.
    struct Recorder {
        sent: Arc<Mutex<Vec<(HttpMethod, String, Vec<(String, String)>, Option<Value>)>>>,
        reply: fn() -> Result<HttpResponse, TransportError>,
    }

    impl Transport for Recorder {
        fn send(&self, request: OutgoingRequest) -> Result<HttpResponse, TransportError> {
            let body = request.body.as_json().cloned();
            self.sent
                .lock()
                .unwrap()
                .push((request.method, request.url, request.headers, body));
            (self.reply)()
        }
    }

    fn ok_empty() -> Result<HttpResponse, TransportError> {
        Ok(HttpResponse {
            status: 200,
            headers: Vec::new(),
            body: Vec::new(),
        })
    }

    fn client_with(
        config: ClientConfig,
        reply: fn() -> Result<HttpResponse, TransportError>,
    ) -> (TdClient, Arc<Mutex<Vec<(HttpMethod, String, Vec<(String, String)>, Option<Value>)>>>)
    {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let client = TdClient::with_transport(
            config,
            Recorder {
                sent: sent.clone(),
                reply,
            },
        );
        (client, sent)
    }

    fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
        headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn base_url_from_config() {
        let config = ClientConfig::new("KEY")
            .host("mock.api.treasuredata.com")
            .protocol(Protocol::Http);
        let client = TdClient::new(config);
        assert_eq!(client.base_url(), "http://mock.api.treasuredata.com");
    }

    #[test]
    fn dispatch_builds_url_and_auth_header() {
        let (client, sent) = client_with(ClientConfig::new("MOCK_API_KEY"), ok_empty);
        client.list_tables("my db").unwrap();

        let sent = sent.lock().unwrap();
        let (method, url, headers, _) = &sent[0];
        assert_eq!(*method, HttpMethod::Get);
        assert_eq!(url, "https://api.treasuredata.com/v3/table/list/my%20db");
        assert_eq!(header(headers, "Authorization"), Some("TD1 MOCK_API_KEY"));
        assert!(header(headers, "User-Agent").unwrap().starts_with("td-client-rust/"));
    }

    #[test]
    fn config_headers_decorate_every_call() {
        let config = ClientConfig::new("K").header("X-Td-Request", "abc");
        let (client, sent) = client_with(config, ok_empty);
        client.server_status().unwrap();
        client.list_databases().unwrap();

        for (_, _, headers, _) in sent.lock().unwrap().iter() {
            assert_eq!(header(headers, "x-td-request"), Some("abc"));
            assert_eq!(header(headers, "Authorization"), Some("TD1 K"));
        }
    }

    #[test]
    fn call_headers_override_config_headers() {
        let config = ClientConfig::new("K").header("Content-Type", "text/plain");
        let (client, sent) = client_with(config, ok_empty);
        client
            .import("db", "t", "json", std::io::empty(), 0, &ImportOptions::default())
            .unwrap();

        let sent = sent.lock().unwrap();
        let headers = &sent[0].2;
        assert_eq!(header(headers, "Content-Type"), Some("application/octet-stream"));
        assert_eq!(header(headers, "Content-Length"), Some("0"));
        assert_eq!(
            headers.iter().filter(|(n, _)| n.eq_ignore_ascii_case("content-type")).count(),
            1
        );
    }

    fn content_types(headers: &[(String, String)]) -> Vec<&str> {
        headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case("content-type"))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    #[test]
    fn json_body_carries_json_content_type() {
        let (client, sent) = client_with(ClientConfig::new("K"), ok_empty);
        client
            .hive_query("db", "SELECT 1", &QueryOptions::default())
            .unwrap();
        client.list_databases().unwrap();

        let sent = sent.lock().unwrap();
        assert_eq!(content_types(&sent[0].2), ["application/json"]);
        assert!(content_types(&sent[1].2).is_empty());
    }

    #[test]
    fn configured_content_type_replaces_json_default() {
        let config =
            ClientConfig::new("K").header("content-type", "application/json; charset=utf-8");
        let (client, sent) = client_with(config, ok_empty);
        client
            .hive_query("db", "SELECT 1", &QueryOptions::default())
            .unwrap();
        client.create_result("r", "mysql://host/db/t").unwrap();

        for (_, _, headers, _) in sent.lock().unwrap().iter() {
            assert_eq!(content_types(headers), ["application/json; charset=utf-8"]);
        }
    }

    #[test]
    fn config_header_may_replace_authorization() {
        let config = ClientConfig::new("K").header("authorization", "TD1 other");
        let (client, sent) = client_with(config, ok_empty);
        client.list_databases().unwrap();
        assert_eq!(header(&sent.lock().unwrap()[0].2, "Authorization"), Some("TD1 other"));
    }

    #[test]
    fn empty_success_body_is_empty_object() {
        let (client, _) = client_with(ClientConfig::new("K"), ok_empty);
        assert_eq!(client.kill("12345").unwrap(), Payload::Json(json!({})));
    }

    #[test]
    fn api_error_keeps_message_and_body() {
        fn reply() -> Result<HttpResponse, TransportError> {
            Ok(HttpResponse {
                status: 422,
                headers: Vec::new(),
                body: br#"{"error":"Table type must be 'log'","severity":"error"}"#.to_vec(),
            })
        }
        let (client, _) = client_with(ClientConfig::new("K"), reply);
        let err = client.create_item_table("db", "t").unwrap_err();

        assert_eq!(err.to_string(), "Table type must be 'log'");
        assert_eq!(err.status(), Some(422));
        assert_eq!(err.body().unwrap().get("severity"), Some(&json!("error")));
    }

    #[test]
    fn api_error_without_body_uses_status() {
        fn reply() -> Result<HttpResponse, TransportError> {
            Ok(HttpResponse {
                status: 404,
                headers: Vec::new(),
                body: Vec::new(),
            })
        }
        let (client, _) = client_with(ClientConfig::new("K"), reply);
        let err = client.show_job("1").unwrap_err();
        assert_eq!(err.to_string(), "HTTP 404");
        assert_eq!(err.body(), Some(&Payload::empty()));
    }

    #[test]
    fn transport_failure_is_surfaced() {
        fn reply() -> Result<HttpResponse, TransportError> {
            Err(TransportError::new("connection reset"))
        }
        let (client, _) = client_with(ClientConfig::new("K"), reply);
        let err = client.server_status().unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert!(err.body().is_none());
    }

    #[test]
    fn invalid_schedule_sends_nothing() {
        let (client, sent) = client_with(ClientConfig::new("K"), ok_empty);
        let err = client
            .create_schedule("s", &ScheduleOptions::default())
            .unwrap_err();
        assert!(err.is_validation());
        assert!(sent.lock().unwrap().is_empty());
    }

    #[test]
    fn raw_results_are_not_parsed() {
        fn reply() -> Result<HttpResponse, TransportError> {
            Ok(HttpResponse {
                status: 200,
                headers: Vec::new(),
                body: b"1\tfoo\n2\tbar\n".to_vec(),
            })
        }
        let (client, sent) = client_with(ClientConfig::new("K"), reply);
        let payload = client.job_result("12345", &JobResultOptions::default()).unwrap();
        assert_eq!(payload.text(), "1\tfoo\n2\tbar\n");
        assert!(sent.lock().unwrap()[0].1.ends_with("/v3/job/result/12345?format=tsv"));
    }

    #[test]
    fn reconfigure_changes_endpoint() {
        let (mut client, sent) = client_with(ClientConfig::new("K"), ok_empty);
        client.reconfigure(ClientConfig::new("K2").host("localhost:8080").protocol(Protocol::Http));
        client.list_schedules().unwrap();

        let sent = sent.lock().unwrap();
        assert_eq!(sent[0].1, "http://localhost:8080/v3/schedule/list");
        assert_eq!(header(&sent[0].2, "Authorization"), Some("TD1 K2"));
    }

    #[test]
    fn concurrent_calls_do_not_leak_parameters() {
        let (client, sent) = client_with(ClientConfig::new("K"), ok_empty);
        std::thread::scope(|s| {
            for i in 0..8 {
                let client = &client;
                s.spawn(move || {
                    client.create_database(&format!("db_{i}")).unwrap();
                    client
                        .hive_query(&format!("db_{i}"), &format!("SELECT {i}"), &Default::default())
                        .unwrap();
                });
            }
        });

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 16);
        for (_, url, _, body) in sent.iter() {
            if let Some(body) = body {
                let i = url.rsplit("db_").next().unwrap();
                assert_eq!(body["query"], format!("SELECT {i}"));
            }
        }
        for i in 0..8 {
            let path = format!("/v3/database/create/db_{i}");
            assert_eq!(sent.iter().filter(|(_, u, _, _)| u.ends_with(&path)).count(), 1);
        }
    }

    #[test]
    fn stream_body_reaches_transport() {
        struct Capture(Arc<Mutex<Vec<u8>>>);
        impl Transport for Capture {
            fn send(&self, request: OutgoingRequest) -> Result<HttpResponse, TransportError> {
                if let RequestBody::Stream { mut reader, .. } = request.body {
                    reader.read_to_end(&mut self.0.lock().unwrap())?;
                }
                ok_empty()
            }
        }

        let captured = Arc::new(Mutex::new(Vec::new()));
        let client = TdClient::with_transport(ClientConfig::new("K"), Capture(captured.clone()));
        client
            .bulk_import_upload_part("sess", "part1", std::io::Cursor::new(b"abc".to_vec()))
            .unwrap();
        assert_eq!(&*captured.lock().unwrap(), b"abc");
    }
}
