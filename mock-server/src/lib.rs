use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
};

use axum::{
    body::Bytes,
    extract::{Path, Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};

pub const JOB_ID: &str = "12345";
pub const JOB_RESULT_TSV: &str = "1\taccess_log\n2\tpayment_log\n";

#[derive(Debug, Default)]
pub struct MockState {
    /// Database name -> table names.
    pub databases: BTreeMap<String, BTreeSet<String>>,
    pub schedules: BTreeMap<String, Value>,
    /// Result destination name -> URL.
    pub results: BTreeMap<String, String>,
    /// Bulk import session name -> session record.
    pub bulk_imports: BTreeMap<String, Value>,
    /// Bytes received per import path or bulk-import part.
    pub uploads: HashMap<String, usize>,
}

pub type Db = Arc<RwLock<MockState>>;

fn seed() -> MockState {
    let mut state = MockState::default();
    for db in ["db1", "db2", "db3"] {
        state.databases.insert(db.to_string(), BTreeSet::new());
    }
    state.databases.insert(
        "my_db".to_string(),
        ["access_log", "payment_log", "tbl1", "tbl2"]
            .into_iter()
            .map(String::from)
            .collect(),
    );
    state
}

fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Reject requests without a `TD1` authorization header with a bare 401.
async fn require_td1(request: Request, next: Next) -> Response {
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("TD1 ") && v.len() > 4);
    if !authorized {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    next.run(request).await
}

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(seed()));
    Router::new()
        .route("/v3/system/server_status", get(server_status))
        .route("/v3/database/list", get(list_databases))
        .route("/v3/database/create/{db}", post(create_database))
        .route("/v3/database/delete/{db}", post(delete_database))
        .route("/v3/table/list/{db}", get(list_tables))
        .route("/v3/table/create/{db}/{table}/{kind}", post(create_table))
        .route("/v3/table/swap/{db}/{table1}/{table2}", post(swap_table))
        .route("/v3/table/delete/{db}/{table}", post(delete_table))
        .route("/v3/table/update-schema/{db}/{table}", post(update_schema))
        .route("/v3/table/tail/{db}/{table}", get(tail))
        .route("/v3/table/import/{db}/{table}/{format}", put(import))
        .route(
            "/v3/table/import_with_id/{db}/{table}/{id}/{format}",
            put(import_with_id),
        )
        .route("/v3/job/list/", get(list_jobs))
        .route("/v3/job/show/{id}", get(show_job))
        .route("/v3/job/status/{id}", get(job_status))
        .route("/v3/job/result/{id}", get(job_result))
        .route("/v3/job/kill/{id}", post(kill_job))
        .route("/v3/job/issue/{engine}/{db}", post(issue_job))
        .route("/v3/schedule/list", get(list_schedules))
        .route("/v3/schedule/create/{name}", post(create_schedule))
        .route("/v3/schedule/delete/{name}", post(delete_schedule))
        .route("/v3/schedule/run/{name}/{time}", post(run_schedule))
        .route("/v3/schedule/history/{name}", get(schedule_history))
        .route("/v3/export/run/{db}/{table}", post(export))
        .route("/v3/result/list", get(list_results))
        .route("/v3/result/create/{name}", post(create_result))
        .route("/v3/result/delete/{name}", post(delete_result))
        .route("/v3/bulk_import/list", get(list_bulk_imports))
        .route("/v3/bulk_import/create/{name}/{db}/{table}", post(create_bulk_import))
        .route("/v3/bulk_import/show/{name}", get(show_bulk_import))
        .route("/v3/bulk_import/perform/{name}", post(perform_bulk_import))
        .route("/v3/bulk_import/commit/{name}", post(commit_bulk_import))
        .route("/v3/bulk_import/delete/{name}", post(delete_bulk_import))
        .route("/v3/bulk_import/upload_part/{name}/{part}", put(upload_part))
        .layer(middleware::from_fn(require_td1))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn server_status() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

// --- databases ---

async fn list_databases(State(db): State<Db>) -> Json<Value> {
    let state = db.read().await;
    let databases: Vec<Value> = state
        .databases
        .iter()
        .map(|(name, tables)| {
            json!({
                "name": name,
                "count": tables.len(),
                "created_at": "2011-07-23 16:32:52 UTC",
                "updated_at": "2011-07-23 16:32:52 UTC",
                "organization": null,
                "permission": "administrator",
            })
        })
        .collect();
    Json(json!({ "databases": databases }))
}

async fn create_database(State(db): State<Db>, Path(name): Path<String>) -> Response {
    let mut state = db.write().await;
    if state.databases.contains_key(&name) {
        return api_error(StatusCode::CONFLICT, format!("Database '{name}' already exists"));
    }
    state.databases.insert(name.clone(), BTreeSet::new());
    Json(json!({ "database": name })).into_response()
}

async fn delete_database(State(db): State<Db>, Path(name): Path<String>) -> Response {
    let mut state = db.write().await;
    match state.databases.remove(&name) {
        Some(_) => Json(json!({ "database": name })).into_response(),
        None => api_error(StatusCode::NOT_FOUND, format!("Database '{name}' does not exist")),
    }
}

// --- tables ---

async fn list_tables(State(db): State<Db>, Path(name): Path<String>) -> Response {
    let state = db.read().await;
    let Some(tables) = state.databases.get(&name) else {
        return api_error(StatusCode::NOT_FOUND, format!("Database '{name}' does not exist"));
    };
    let tables: Vec<Value> = tables
        .iter()
        .map(|t| json!({ "name": t, "type": "log", "count": 0 }))
        .collect();
    Json(json!({ "database": name, "tables": tables })).into_response()
}

async fn create_table(
    State(db): State<Db>,
    Path((name, table, kind)): Path<(String, String, String)>,
) -> Response {
    if kind != "log" {
        return api_error(StatusCode::UNPROCESSABLE_ENTITY, "Table type must be 'log'");
    }
    let mut state = db.write().await;
    let Some(tables) = state.databases.get_mut(&name) else {
        return api_error(StatusCode::NOT_FOUND, format!("Database '{name}' does not exist"));
    };
    tables.insert(table.clone());
    Json(json!({ "database": name, "table": table, "type": kind })).into_response()
}

async fn swap_table(
    State(db): State<Db>,
    Path((name, table1, table2)): Path<(String, String, String)>,
) -> Response {
    let state = db.read().await;
    let exists = |t: &str| state.databases.get(&name).is_some_and(|ts| ts.contains(t));
    if !exists(&table1) || !exists(&table2) {
        return api_error(StatusCode::NOT_FOUND, "Table not found");
    }
    Json(json!({ "database": name, "table1": table1, "table2": table2 })).into_response()
}

async fn delete_table(
    State(db): State<Db>,
    Path((name, table)): Path<(String, String)>,
) -> Response {
    let mut state = db.write().await;
    let removed = state
        .databases
        .get_mut(&name)
        .is_some_and(|ts| ts.remove(&table));
    if !removed {
        return api_error(StatusCode::NOT_FOUND, "Table not found");
    }
    Json(json!({ "database": name, "table": table, "type": "log" })).into_response()
}

async fn update_schema(
    State(db): State<Db>,
    Path((name, table)): Path<(String, String)>,
    Json(schema): Json<Value>,
) -> Response {
    let state = db.read().await;
    if !state.databases.get(&name).is_some_and(|ts| ts.contains(&table)) {
        return api_error(StatusCode::NOT_FOUND, "Table not found");
    }
    Json(json!({ "database": name, "table": table, "type": "log", "schema": schema }))
        .into_response()
}

#[derive(Deserialize)]
pub struct TailQuery {
    pub count: Option<usize>,
}

async fn tail(Path((_, table)): Path<(String, String)>, Query(q): Query<TailQuery>) -> String {
    (0..q.count.unwrap_or(2))
        .map(|i| format!("{{\"table\":\"{table}\",\"row\":{i}}}\n"))
        .collect()
}

// --- import ---

async fn import(
    State(db): State<Db>,
    Path((name, table, format)): Path<(String, String, String)>,
    body: Bytes,
) -> Json<Value> {
    let key = format!("{name}/{table}/{format}");
    db.write().await.uploads.insert(key, body.len());
    Json(json!({ "database": name, "table": table, "elapsed_time": 0.1, "bytes": body.len() }))
}

async fn import_with_id(
    State(db): State<Db>,
    Path((name, table, id, format)): Path<(String, String, String, String)>,
    body: Bytes,
) -> Json<Value> {
    let key = format!("{name}/{table}/{id}/{format}");
    db.write().await.uploads.insert(key, body.len());
    Json(json!({ "database": name, "table": table, "unique_id": id, "bytes": body.len() }))
}

async fn upload_part(
    State(db): State<Db>,
    Path((name, part)): Path<(String, String)>,
    body: Bytes,
) -> Json<Value> {
    db.write()
        .await
        .uploads
        .insert(format!("{name}/{part}"), body.len());
    Json(json!({ "name": name, "part_name": part, "bytes": body.len() }))
}

// --- jobs ---

fn job(id: &str, kind: &str, database: &str) -> Value {
    json!({
        "status": "success",
        "job_id": id,
        "created_at": "2013-11-13 19:39:19 UTC",
        "updated_at": "2013-11-13 19:39:20 UTC",
        "start_at": "2013-11-13 19:39:19 UTC",
        "end_at": "2013-11-13 19:39:20 UTC",
        "query": null,
        "type": kind,
        "priority": 0,
        "retry_limit": 0,
        "result": "",
        "url": format!("http://console.treasuredata.com/jobs/{id}"),
        "database": database,
    })
}

async fn list_jobs(Query(params): Query<HashMap<String, String>>) -> Response {
    let Some(from) = params.get("from") else {
        return api_error(StatusCode::BAD_REQUEST, "from is required");
    };
    let mut jobs = vec![
        job(JOB_ID, "hive", "database1"),
        job("56789", "bulk_import_perform", "database2"),
    ];
    if let Some(status) = params.get("status") {
        jobs.retain(|j| j["status"] == status.as_str());
    }
    Json(json!({
        "count": jobs.len(),
        "from": from,
        "to": params.get("to"),
        "jobs": jobs,
    }))
    .into_response()
}

async fn show_job(Path(id): Path<String>) -> Response {
    if id != JOB_ID {
        return api_error(StatusCode::NOT_FOUND, format!("Job {id} not found"));
    }
    let mut job = job(JOB_ID, "hive", "my_db");
    job["query"] = json!("SELECT * FROM www_access");
    job["debug"] = json!({ "stderr": "...", "cmdout": "..." });
    Json(job).into_response()
}

async fn job_status(Path(id): Path<String>) -> Response {
    if id != JOB_ID {
        return api_error(StatusCode::NOT_FOUND, format!("Job {id} not found"));
    }
    Json(json!({
        "job_id": id,
        "status": "success",
        "created_at": "2012-09-17 21:00:00 UTC",
        "start_at": "2012-09-17 21:00:01 UTC",
        "end_at": "2012-09-17 21:00:52 UTC",
    }))
    .into_response()
}

async fn job_result(Path(id): Path<String>, Query(params): Query<HashMap<String, String>>) -> Response {
    if id != JOB_ID {
        return api_error(StatusCode::NOT_FOUND, format!("Job {id} not found"));
    }
    match params.get("format").map(String::as_str) {
        Some("tsv") => JOB_RESULT_TSV.into_response(),
        Some("csv") => JOB_RESULT_TSV.replace('\t', ",").into_response(),
        other => api_error(
            StatusCode::BAD_REQUEST,
            format!("Unsupported format: {}", other.unwrap_or("none")),
        ),
    }
}

async fn kill_job(Path(id): Path<String>) -> Json<Value> {
    Json(json!({ "former_status": "running", "job_id": id }))
}

async fn issue_job(
    Path((engine, database)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Response {
    if body.get("query").and_then(Value::as_str).is_none() {
        return api_error(StatusCode::BAD_REQUEST, "query is required");
    }
    Json(json!({
        "job_id": JOB_ID,
        "type": engine,
        "database": database,
        "url": "http://console.treasure.com/will-be-ready",
        "result": body.get("result"),
    }))
    .into_response()
}

// --- schedules ---

async fn list_schedules(State(db): State<Db>) -> Json<Value> {
    let state = db.read().await;
    let schedules: Vec<&Value> = state.schedules.values().collect();
    Json(json!({ "schedules": schedules }))
}

async fn create_schedule(
    State(db): State<Db>,
    Path(name): Path<String>,
    Json(mut body): Json<Value>,
) -> Response {
    let mut state = db.write().await;
    if state.schedules.contains_key(&name) {
        return api_error(StatusCode::CONFLICT, format!("Schedule '{name}' already exists"));
    }
    body["name"] = json!(name);
    state.schedules.insert(name.clone(), body.clone());
    Json(json!({
        "name": name,
        "cron": body["cron"],
        "type": body["type"],
        "query": body["query"],
        "start": "2015-12-01 00:00:00 UTC",
    }))
    .into_response()
}

async fn delete_schedule(State(db): State<Db>, Path(name): Path<String>) -> Response {
    match db.write().await.schedules.remove(&name) {
        Some(schedule) => Json(schedule).into_response(),
        None => api_error(StatusCode::NOT_FOUND, format!("Schedule '{name}' not found")),
    }
}

async fn run_schedule(
    Path((_, time)): Path<(String, i64)>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    let num: i64 = params
        .get("num")
        .and_then(|n| n.parse().ok())
        .unwrap_or(1);
    let jobs: Vec<Value> = (0..num)
        .map(|i| {
            json!({
                "job_id": format!("{}", 123456 + i),
                "type": "hive",
                "scheduled_at": time - i * 86400,
            })
        })
        .collect();
    Json(json!({ "jobs": jobs }))
}

async fn schedule_history(
    State(db): State<Db>,
    Path(name): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let state = db.read().await;
    let Some(schedule) = state.schedules.get(&name) else {
        return api_error(StatusCode::NOT_FOUND, format!("Schedule '{name}' not found"));
    };
    let history = vec![json!({
        "job_id": JOB_ID,
        "type": "hive",
        "status": "success",
        "query": schedule["query"],
        "scheduled_at": "2015-12-01 00:00:00 UTC",
    })];
    let count = history.len();
    Json(json!({
        "history": history,
        "count": count,
        "from": params.get("from"),
        "to": params.get("to"),
    }))
    .into_response()
}

// --- export ---

async fn export(
    State(db): State<Db>,
    Path((name, table)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Response {
    if body.get("storage_type").and_then(Value::as_str) != Some("s3") {
        return api_error(StatusCode::UNPROCESSABLE_ENTITY, "storage_type must be 's3'");
    }
    if !db.read().await.databases.contains_key(&name) {
        return api_error(StatusCode::NOT_FOUND, format!("Database '{name}' does not exist"));
    }
    Json(json!({ "job_id": JOB_ID, "database": name, "table": table, "bucket": body["bucket"] }))
        .into_response()
}

// --- result destinations ---

async fn list_results(State(db): State<Db>) -> Json<Value> {
    let state = db.read().await;
    let results: Vec<Value> = state
        .results
        .iter()
        .map(|(name, url)| json!({ "name": name, "url": url }))
        .collect();
    Json(json!({ "results": results }))
}

#[derive(Deserialize)]
pub struct ResultBody {
    pub url: String,
}

async fn create_result(
    State(db): State<Db>,
    Path(name): Path<String>,
    Json(body): Json<ResultBody>,
) -> Response {
    let mut state = db.write().await;
    if state.results.contains_key(&name) {
        return api_error(StatusCode::CONFLICT, format!("Result '{name}' already exists"));
    }
    state.results.insert(name.clone(), body.url);
    Json(json!({ "name": name })).into_response()
}

async fn delete_result(State(db): State<Db>, Path(name): Path<String>) -> Response {
    match db.write().await.results.remove(&name) {
        Some(_) => Json(json!({ "name": name })).into_response(),
        None => api_error(StatusCode::NOT_FOUND, format!("Result '{name}' not found")),
    }
}

// --- bulk import ---

async fn list_bulk_imports(State(db): State<Db>) -> Json<Value> {
    let state = db.read().await;
    let sessions: Vec<&Value> = state.bulk_imports.values().collect();
    Json(json!({ "bulk_imports": sessions }))
}

async fn create_bulk_import(
    State(db): State<Db>,
    Path((name, database, table)): Path<(String, String, String)>,
) -> Response {
    let mut state = db.write().await;
    if !state.databases.contains_key(&database) {
        return api_error(StatusCode::NOT_FOUND, format!("Database '{database}' does not exist"));
    }
    if state.bulk_imports.contains_key(&name) {
        return api_error(StatusCode::CONFLICT, format!("Bulk import '{name}' already exists"));
    }
    let session = json!({
        "name": name,
        "database": database,
        "table": table,
        "status": "uploading",
        "upload_frozen": false,
    });
    state.bulk_imports.insert(name.clone(), session);
    Json(json!({ "bulk_import": name })).into_response()
}

async fn show_bulk_import(State(db): State<Db>, Path(name): Path<String>) -> Response {
    match db.read().await.bulk_imports.get(&name) {
        Some(session) => Json(session.clone()).into_response(),
        None => api_error(StatusCode::NOT_FOUND, format!("Bulk import '{name}' not found")),
    }
}

/// Move a session to `status`, returning the updated record.
async fn transition_bulk_import(db: &Db, name: &str, status: &str) -> Response {
    let mut state = db.write().await;
    let Some(session) = state.bulk_imports.get_mut(name) else {
        return api_error(StatusCode::NOT_FOUND, format!("Bulk import '{name}' not found"));
    };
    session["status"] = json!(status);
    let mut reply = json!({ "bulk_import": name });
    if status == "performing" {
        reply["job_id"] = json!(JOB_ID);
    }
    Json(reply).into_response()
}

async fn perform_bulk_import(State(db): State<Db>, Path(name): Path<String>) -> Response {
    transition_bulk_import(&db, &name, "performing").await
}

async fn commit_bulk_import(State(db): State<Db>, Path(name): Path<String>) -> Response {
    transition_bulk_import(&db, &name, "committed").await
}

async fn delete_bulk_import(State(db): State<Db>, Path(name): Path<String>) -> Response {
    match db.write().await.bulk_imports.remove(&name) {
        Some(_) => Json(json!({ "bulk_import": name })).into_response(),
        None => api_error(StatusCode::NOT_FOUND, format!("Bulk import '{name}' not found")),
    }
}
