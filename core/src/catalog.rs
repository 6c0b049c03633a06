//! Endpoint catalog: one request builder per remote operation.
//!
//! # Design
//! Each function maps its typed arguments to an `HttpRequest` and nothing
//! else. No I/O happens here, so every request shape is testable without a
//! server. User-supplied identifiers (database, table, job id, schedule,
//! result and bulk-import names, part names, formats) are escaped one
//! segment at a time.

use std::io::Read;

use serde::Serialize;
use serde_json::{json, Value};

use crate::error::Error;
use crate::http::{escape, HttpRequest, RequestBody};
use crate::types::{
    ExportOptions, ExtraParams, HistoryOptions, ImportOptions, JobResultOptions, ListJobsOptions,
    QueryEngine, QueryOptions, RunScheduleOptions, ScheduleOptions, TableType, TailOptions,
};

/// Join a literal prefix with escaped segments.
fn path(prefix: &str, segments: &[&str]) -> String {
    let mut path = prefix.to_string();
    for segment in segments {
        path.push('/');
        path.push_str(&escape(segment));
    }
    path
}

/// Serialize an options record and set `fields` on top of it.
///
/// Fails with `Error::Validation` if an `extra` key names a modelled field.
fn object_with<T: Serialize + ExtraParams>(
    opts: &T,
    fields: &[(&str, &str)],
) -> Result<Value, Error> {
    if let Some(key) = opts.shadowed_key() {
        return Err(Error::Validation(format!(
            "extra parameter `{key}` conflicts with a typed option"
        )));
    }
    let mut value = serde_json::to_value(opts)?;
    if !value.is_object() {
        value = Value::Object(Default::default());
    }
    if let Value::Object(map) = &mut value {
        for (key, field) in fields {
            map.insert((*key).to_string(), Value::String((*field).to_string()));
        }
    }
    Ok(value)
}

// --- databases ---

pub fn list_databases() -> HttpRequest {
    HttpRequest::get("/v3/database/list")
}

pub fn create_database(db: &str) -> HttpRequest {
    HttpRequest::post(path("/v3/database/create", &[db]))
}

pub fn delete_database(db: &str) -> HttpRequest {
    HttpRequest::post(path("/v3/database/delete", &[db]))
}

// --- tables ---

pub fn list_tables(db: &str) -> HttpRequest {
    HttpRequest::get(path("/v3/table/list", &[db]))
}

pub fn create_table(db: &str, table: &str, table_type: TableType) -> HttpRequest {
    HttpRequest::post(path(
        "/v3/table/create",
        &[db, table, table_type.as_str()],
    ))
}

pub fn create_log_table(db: &str, table: &str) -> HttpRequest {
    create_table(db, table, TableType::Log)
}

pub fn create_item_table(db: &str, table: &str) -> HttpRequest {
    create_table(db, table, TableType::Item)
}

pub fn swap_table(db: &str, table1: &str, table2: &str) -> HttpRequest {
    HttpRequest::post(path("/v3/table/swap", &[db, table1, table2]))
}

pub fn update_schema(db: &str, table: &str, schema: Value) -> HttpRequest {
    HttpRequest::post(path("/v3/table/update-schema", &[db, table])).json(schema)
}

pub fn delete_table(db: &str, table: &str) -> HttpRequest {
    HttpRequest::post(path("/v3/table/delete", &[db, table]))
}

pub fn tail(db: &str, table: &str, opts: &TailOptions) -> HttpRequest {
    HttpRequest::get(path("/v3/table/tail", &[db, table]))
        .query_opt("count", opts.count)
        .query_opt("to", opts.to)
        .query_opt("from", opts.from)
        .raw()
}

// --- jobs ---

pub fn list_jobs(opts: &ListJobsOptions) -> HttpRequest {
    HttpRequest::get("/v3/job/list/")
        .query("from", opts.from)
        .query_opt("to", opts.to)
        .query_opt("status", opts.status)
        .query_opt("conditions", opts.conditions.as_deref())
}

pub fn show_job(job_id: &str) -> HttpRequest {
    HttpRequest::get(path("/v3/job/show", &[job_id]))
}

pub fn job_status(job_id: &str) -> HttpRequest {
    HttpRequest::get(path("/v3/job/status", &[job_id]))
}

pub fn job_result(job_id: &str, opts: &JobResultOptions) -> HttpRequest {
    HttpRequest::get(path("/v3/job/result", &[job_id]))
        .query("format", opts.format.unwrap_or_default())
        .raw()
}

pub fn kill(job_id: &str) -> HttpRequest {
    HttpRequest::post(path("/v3/job/kill", &[job_id]))
}

/// Issue a query job on `engine`. `query` overrides any `query` key in
/// `opts.extra`.
pub fn query(
    db: &str,
    engine: QueryEngine,
    query: &str,
    opts: &QueryOptions,
) -> Result<HttpRequest, Error> {
    let body = object_with(opts, &[("query", query)])?;
    Ok(HttpRequest::post(path("/v3/job/issue", &[engine.as_str(), db])).json(body))
}

pub fn hive_query(db: &str, q: &str, opts: &QueryOptions) -> Result<HttpRequest, Error> {
    query(db, QueryEngine::Hive, q, opts)
}

pub fn presto_query(db: &str, q: &str, opts: &QueryOptions) -> Result<HttpRequest, Error> {
    query(db, QueryEngine::Presto, q, opts)
}

// --- export ---

pub fn export(
    db: &str,
    table: &str,
    storage_type: &str,
    opts: &ExportOptions,
) -> Result<HttpRequest, Error> {
    let body = object_with(opts, &[("storage_type", storage_type)])?;
    Ok(HttpRequest::post(path("/v3/export/run", &[db, table])).json(body))
}

// --- schedules ---

/// Create a schedule. Fails with `Error::Validation` before building
/// anything if `cron` or `query` is missing or empty. The schedule type is
/// always `hive`.
pub fn create_schedule(name: &str, opts: &ScheduleOptions) -> Result<HttpRequest, Error> {
    let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
    if !present(&opts.cron) || !present(&opts.query) {
        return Err(Error::Validation(
            "opts.cron and opts.query are required".to_string(),
        ));
    }

    let body = object_with(opts, &[("type", QueryEngine::Hive.as_str())])?;
    Ok(HttpRequest::post(path("/v3/schedule/create", &[name])).json(body))
}

pub fn delete_schedule(name: &str) -> HttpRequest {
    HttpRequest::post(path("/v3/schedule/delete", &[name]))
}

pub fn list_schedules() -> HttpRequest {
    HttpRequest::get("/v3/schedule/list")
}

pub fn update_schedule(name: &str, params: &ScheduleOptions) -> Result<HttpRequest, Error> {
    let body = object_with(params, &[])?;
    Ok(HttpRequest::post(path("/v3/schedule/update", &[name])).json(body))
}

pub fn history(name: &str, opts: &HistoryOptions) -> HttpRequest {
    HttpRequest::get(path("/v3/schedule/history", &[name]))
        .query_opt("from", opts.from)
        .query_opt("to", opts.to)
}

/// Run a schedule as if triggered at `time` (unix seconds).
pub fn run_schedule(name: &str, time: i64, opts: &RunScheduleOptions) -> HttpRequest {
    HttpRequest::post(path("/v3/schedule/run", &[name, &time.to_string()]))
        .query_opt("num", opts.num)
}

// --- import ---

/// Stream `size` bytes of `format`-encoded data into a table.
pub fn import(
    db: &str,
    table: &str,
    format: &str,
    stream: impl Read + Send + 'static,
    size: u64,
    opts: &ImportOptions,
) -> HttpRequest {
    let path = match opts.unique_id.as_deref() {
        Some(id) => path("/v3/table/import_with_id", &[db, table, id, format]),
        None => path("/v3/table/import", &[db, table, format]),
    };

    HttpRequest::put(path)
        .header("Content-Type", "application/octet-stream")
        .header("Content-Length", size.to_string())
        .body(RequestBody::stream(stream, Some(size)))
}

// --- result destinations ---

pub fn list_results() -> HttpRequest {
    HttpRequest::get("/v3/result/list")
}

pub fn create_result(name: &str, url: &str) -> HttpRequest {
    HttpRequest::post(path("/v3/result/create", &[name])).json(json!({ "url": url }))
}

pub fn delete_result(name: &str, url: &str) -> HttpRequest {
    HttpRequest::post(path("/v3/result/delete", &[name])).json(json!({ "url": url }))
}

// --- server status ---

pub fn server_status() -> HttpRequest {
    HttpRequest::get("/v3/system/server_status")
}

// --- bulk import ---

pub fn create_bulk_import(name: &str, db: &str, table: &str) -> HttpRequest {
    HttpRequest::post(path("/v3/bulk_import/create", &[name, db, table]))
}

pub fn delete_bulk_import(name: &str) -> HttpRequest {
    HttpRequest::post(path("/v3/bulk_import/delete", &[name]))
}

pub fn show_bulk_import(name: &str) -> HttpRequest {
    HttpRequest::get(path("/v3/bulk_import/show", &[name]))
}

pub fn list_bulk_imports() -> HttpRequest {
    HttpRequest::get("/v3/bulk_import/list")
}

pub fn list_bulk_import_parts(name: &str) -> HttpRequest {
    HttpRequest::get(path("/v3/bulk_import/list_parts", &[name]))
}

pub fn bulk_import_upload_part(
    name: &str,
    part_name: &str,
    stream: impl Read + Send + 'static,
) -> HttpRequest {
    HttpRequest::put(path("/v3/bulk_import/upload_part", &[name, part_name]))
        .body(RequestBody::stream(stream, None))
}

pub fn bulk_import_delete_part(name: &str, part_name: &str) -> HttpRequest {
    HttpRequest::post(path("/v3/bulk_import/delete_part", &[name, part_name]))
}

pub fn perform_bulk_import(name: &str) -> HttpRequest {
    HttpRequest::post(path("/v3/bulk_import/perform", &[name]))
}

pub fn commit_bulk_import(name: &str) -> HttpRequest {
    HttpRequest::post(path("/v3/bulk_import/commit", &[name]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpMethod, ResponseFormat};
    use crate::types::{JobStatus, ResultFormat};

    fn assert_same(a: &HttpRequest, b: &HttpRequest) {
        assert_eq!(a.method, b.method);
        assert_eq!(a.path, b.path);
        assert_eq!(a.query, b.query);
        assert_eq!(a.headers, b.headers);
        assert_eq!(a.body.as_json(), b.body.as_json());
        assert_eq!(a.format, b.format);
    }

    #[test]
    fn database_paths_escape_names() {
        assert_eq!(create_database("my db").path, "/v3/database/create/my%20db");
        assert_eq!(delete_database("a/b").path, "/v3/database/delete/a%2Fb");
        assert_eq!(list_databases().path, "/v3/database/list");
        assert_eq!(create_database("x").method, HttpMethod::Post);
    }

    #[test]
    fn every_segment_is_escaped_separately() {
        let req = swap_table("d b", "t/1", "t?2");
        assert_eq!(req.path, "/v3/table/swap/d%20b/t%2F1/t%3F2");
    }

    #[test]
    fn log_and_item_wrappers_match_create_table() {
        assert_same(&create_log_table("db", "t"), &create_table("db", "t", TableType::Log));
        assert_same(&create_item_table("db", "t"), &create_table("db", "t", TableType::Item));
        assert_eq!(create_log_table("db", "t").path, "/v3/table/create/db/t/log");
    }

    #[test]
    fn update_schema_sends_json_body() {
        let schema = json!({"schema": "[[\"a\",\"string\"]]"});
        let req = update_schema("db", "t", schema.clone());
        assert_eq!(req.path, "/v3/table/update-schema/db/t");
        assert_eq!(req.body.as_json(), Some(&schema));
    }

    #[test]
    fn delete_table_uses_delete_path() {
        let req = delete_table("db", "t");
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.path, "/v3/table/delete/db/t");
    }

    #[test]
    fn tail_omits_absent_options() {
        let req = tail("db", "t", &TailOptions::default());
        assert!(req.query.is_empty());
        assert_eq!(req.format, ResponseFormat::Raw);

        let req = tail(
            "db",
            "t",
            &TailOptions {
                count: Some(10),
                to: None,
                from: Some(1400000000),
            },
        );
        assert_eq!(req.path_and_query(), "/v3/table/tail/db/t?count=10&from=1400000000");
    }

    #[test]
    fn list_jobs_defaults_to_from_zero() {
        let req = list_jobs(&ListJobsOptions::default());
        assert_eq!(req.path, "/v3/job/list/");
        assert_eq!(req.query, vec![("from".to_string(), "0".to_string())]);
    }

    #[test]
    fn list_jobs_with_all_options() {
        let req = list_jobs(&ListJobsOptions {
            from: 5,
            to: Some(10),
            status: Some(JobStatus::Running),
            conditions: Some("type = 'hive'".into()),
        });
        assert_eq!(req.query_param("from"), Some("5"));
        assert_eq!(req.query_param("to"), Some("10"));
        assert_eq!(req.query_param("status"), Some("running"));
        assert_eq!(req.query_param("conditions"), Some("type = 'hive'"));
    }

    #[test]
    fn job_result_defaults_to_tsv() {
        let req = job_result("12345", &JobResultOptions::default());
        assert_eq!(req.path_and_query(), "/v3/job/result/12345?format=tsv");
        assert_eq!(req.format, ResponseFormat::Raw);

        let req = job_result("12345", &JobResultOptions::format(ResultFormat::Csv));
        assert_eq!(req.query_param("format"), Some("csv"));
    }

    #[test]
    fn query_body_carries_query_and_options() {
        let opts = QueryOptions {
            result: Some("web://result.example.com/callback".into()),
            priority: Some(2),
            retry_limit: Some(3),
            ..Default::default()
        };
        let req = hive_query("my_db", "SELECT 1", &opts).unwrap();
        assert_eq!(req.path, "/v3/job/issue/hive/my_db");
        assert_eq!(
            req.body.as_json(),
            Some(&json!({
                "query": "SELECT 1",
                "result": "web://result.example.com/callback",
                "priority": 2,
                "retry_limit": 3,
            }))
        );

        let req = presto_query("my_db", "SELECT 1", &QueryOptions::default()).unwrap();
        assert_eq!(req.path, "/v3/job/issue/presto/my_db");
        assert_eq!(req.body.as_json(), Some(&json!({"query": "SELECT 1"})));
    }

    #[test]
    fn export_injects_storage_type() {
        let opts = ExportOptions {
            bucket: Some("bkt".into()),
            ..Default::default()
        };
        let req = export("db", "t", "s3", &opts).unwrap();
        assert_eq!(req.path, "/v3/export/run/db/t");
        assert_eq!(req.body.as_json(), Some(&json!({"bucket": "bkt", "storage_type": "s3"})));
    }

    #[test]
    fn create_schedule_requires_cron_and_query() {
        let err = create_schedule("daily", &ScheduleOptions::default()).unwrap_err();
        assert!(err.is_validation());

        let only_cron = ScheduleOptions {
            cron: Some("@daily".into()),
            ..Default::default()
        };
        assert!(create_schedule("daily", &only_cron).unwrap_err().is_validation());

        let empty_query = ScheduleOptions {
            cron: Some("@daily".into()),
            query: Some(String::new()),
            ..Default::default()
        };
        assert!(create_schedule("daily", &empty_query).unwrap_err().is_validation());
    }

    #[test]
    fn create_schedule_forces_hive_type() {
        let mut opts = ScheduleOptions {
            cron: Some("0 * * * *".into()),
            query: Some("SELECT 1".into()),
            ..Default::default()
        };
        opts.extra.insert("type".into(), json!("presto"));
        let req = create_schedule("hourly job", &opts).unwrap();
        assert_eq!(req.path, "/v3/schedule/create/hourly%20job");
        let body = req.body.as_json().unwrap();
        assert_eq!(body["type"], "hive");
        assert_eq!(body["cron"], "0 * * * *");
    }

    #[test]
    fn extra_may_not_shadow_schedule_fields() {
        let mut opts = ScheduleOptions {
            cron: Some("@daily".into()),
            query: Some("SELECT 1".into()),
            ..Default::default()
        };
        opts.extra.insert("cron".into(), Value::Null);
        assert!(create_schedule("daily", &opts).unwrap_err().is_validation());
        assert!(update_schedule("daily", &opts).unwrap_err().is_validation());
    }

    #[test]
    fn extra_may_not_shadow_query_or_export_fields() {
        let mut query_opts = QueryOptions::default();
        query_opts.extra.insert("priority".into(), json!(2));
        assert!(hive_query("db", "SELECT 1", &query_opts).unwrap_err().is_validation());

        let mut export_opts = ExportOptions::default();
        export_opts.extra.insert("bucket".into(), json!("other"));
        assert!(export("db", "t", "s3", &export_opts).unwrap_err().is_validation());
    }

    #[test]
    fn update_schedule_sends_params_unchanged() {
        let params = ScheduleOptions {
            timezone: Some("Asia/Tokyo".into()),
            ..Default::default()
        };
        let req = update_schedule("s", &params).unwrap();
        assert_eq!(req.body.as_json(), Some(&json!({"timezone": "Asia/Tokyo"})));
    }

    #[test]
    fn run_schedule_time_segment_and_num() {
        let req = run_schedule("12345", 1448928000, &RunScheduleOptions::default());
        assert_eq!(req.path_and_query(), "/v3/schedule/run/12345/1448928000");

        let req = run_schedule("s", 1448928000, &RunScheduleOptions { num: Some(3) });
        assert_eq!(req.path_and_query(), "/v3/schedule/run/s/1448928000?num=3");
    }

    #[test]
    fn history_query_is_optional() {
        assert!(history("s", &HistoryOptions::default()).query.is_empty());
        let req = history(
            "s",
            &HistoryOptions {
                from: Some(0),
                to: Some(20),
            },
        );
        assert_eq!(req.query_string().as_deref(), Some("from=0&to=20"));
    }

    #[test]
    fn import_path_shapes() {
        let req = import("db", "t", "msgpack.gz", std::io::empty(), 0, &ImportOptions::default());
        assert_eq!(req.method, HttpMethod::Put);
        assert_eq!(req.path, "/v3/table/import/db/t/msgpack.gz");

        let opts = ImportOptions {
            unique_id: Some("abc".into()),
        };
        let req = import("db", "t", "msgpack.gz", std::io::empty(), 42, &opts);
        assert_eq!(req.path, "/v3/table/import_with_id/db/t/abc/msgpack.gz");
        assert_eq!(
            req.headers,
            vec![
                ("Content-Type".to_string(), "application/octet-stream".to_string()),
                ("Content-Length".to_string(), "42".to_string()),
            ]
        );
        assert!(matches!(req.body, RequestBody::Stream { length: Some(42), .. }));
    }

    #[test]
    fn result_destinations_send_url() {
        let req = create_result("out", "mysql://host/db/table");
        assert_eq!(req.path, "/v3/result/create/out");
        assert_eq!(req.body.as_json(), Some(&json!({"url": "mysql://host/db/table"})));
        assert_eq!(delete_result("out", "x").path, "/v3/result/delete/out");
        assert_eq!(list_results().method, HttpMethod::Get);
    }

    #[test]
    fn bulk_import_paths() {
        assert_eq!(create_bulk_import("s", "db", "t").path, "/v3/bulk_import/create/s/db/t");
        assert_eq!(list_bulk_import_parts("s").path, "/v3/bulk_import/list_parts/s");
        assert_eq!(
            bulk_import_delete_part("s", "part 1").path,
            "/v3/bulk_import/delete_part/s/part%201"
        );
        let req = bulk_import_upload_part("s", "p1", std::io::empty());
        assert_eq!(req.method, HttpMethod::Put);
        assert_eq!(req.path, "/v3/bulk_import/upload_part/s/p1");
        assert!(matches!(req.body, RequestBody::Stream { length: None, .. }));
        assert_eq!(perform_bulk_import("s").path, "/v3/bulk_import/perform/s");
        assert_eq!(commit_bulk_import("s").path, "/v3/bulk_import/commit/s");
    }

    #[test]
    fn server_status_path() {
        let req = server_status();
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.path, "/v3/system/server_status");
        assert!(req.body.is_empty());
    }
}
