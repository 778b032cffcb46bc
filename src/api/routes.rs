//! API route definitions.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use super::error::ApiError;
use super::state::AppState;
use crate::aggregate::{self, BucketMode};
use crate::ingest::IngestError;
use crate::model::ResultPayload;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/results", get(list_results).post(submit_result))
        .route("/results/batch", post(submit_batch))
        .route("/results/frameworks", get(list_frameworks))
        .route("/results/runs", get(list_runs))
        .route("/results/runs/{run_key}", get(run_detail))
        .route("/results/trends/pass-fail", get(pass_fail_trend))
        .route("/results/trends/automation-count", get(automation_count_trend))
        .route(
            "/results/screenshots/{run_id}/{file_name}",
            post(upload_screenshot),
        )
        .route("/results/{run_id}", delete(delete_run))
}

#[derive(Debug, Default, Deserialize)]
pub struct FrameworkQuery {
    pub framework: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TrendQuery {
    pub mode: Option<String>,
    pub framework: Option<String>,
}

impl TrendQuery {
    fn mode(&self) -> Result<BucketMode, ApiError> {
        match self.mode.as_deref() {
            None | Some("") => Ok(BucketMode::default()),
            Some(raw) => raw.parse().map_err(ApiError::BadRequest),
        }
    }
}

/// Run store work off the async executor; rusqlite and the artifact tree
/// are both blocking.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, IngestError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(format!("worker task failed: {e}")))?
        .map_err(ApiError::from)
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

async fn submit_result(
    State(state): State<AppState>,
    Json(payload): Json<ResultPayload>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let service = state.service;
    let sub = blocking(move || service.submit_result(payload)).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "data": {
                "id": sub.record.id,
                "run_id": sub.record.run_id,
                "htmlReportPath": sub.record.html_report_path,
            },
            "meta": { "retention": sub.retention }
        })),
    ))
}

async fn submit_batch(
    State(state): State<AppState>,
    Json(payloads): Json<Vec<ResultPayload>>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let service = state.service;
    let out = blocking(move || service.submit_batch(payloads)).await?;
    let ids: Vec<i64> = out.records.iter().map(|r| r.id).collect();

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "data": { "ids": ids },
            "meta": { "total": ids.len(), "retention": out.retention }
        })),
    ))
}

async fn list_results(
    State(state): State<AppState>,
    Query(q): Query<FrameworkQuery>,
) -> Result<Json<Value>, ApiError> {
    let service = state.service;
    let records = blocking(move || service.list_all(q.framework.as_deref())).await?;
    Ok(Json(json!({ "meta": { "total": records.len() }, "data": records })))
}

async fn delete_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let service = state.service;
    let id = run_id.clone();
    let deleted = blocking(move || service.delete_run(&id)).await?;
    if deleted == 0 {
        return Err(ApiError::NotFound(format!(
            "no results found for run_id {run_id}"
        )));
    }
    Ok(Json(json!({
        "data": { "run_id": run_id, "deleted": deleted },
        "meta": {}
    })))
}

async fn list_frameworks(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let service = state.service;
    let records = blocking(move || service.list_all(None)).await?;
    let names = aggregate::frameworks(&records);
    Ok(Json(json!({ "meta": { "total": names.len() }, "data": names })))
}

async fn list_runs(
    State(state): State<AppState>,
    Query(q): Query<FrameworkQuery>,
) -> Result<Json<Value>, ApiError> {
    let service = state.service;
    let runs = blocking(move || {
        let records = service.list_all(q.framework.as_deref())?;
        Ok(service.aggregator().group_by_run(&records))
    })
    .await?;
    Ok(Json(json!({ "meta": { "total": runs.len() }, "data": runs })))
}

async fn run_detail(
    State(state): State<AppState>,
    Path(run_key): Path<String>,
    Query(q): Query<FrameworkQuery>,
) -> Result<Json<Value>, ApiError> {
    let service = state.service;
    let key = run_key.clone();
    let detail = blocking(move || {
        let records = service.list_all(None)?;
        Ok(service
            .aggregator()
            .run_detail(&records, &key, q.framework.as_deref()))
    })
    .await?;

    match detail {
        Some(detail) => Ok(Json(json!({ "data": detail, "meta": {} }))),
        None => Err(ApiError::NotFound(format!("no results found for run {run_key}"))),
    }
}

async fn pass_fail_trend(
    State(state): State<AppState>,
    Query(q): Query<TrendQuery>,
) -> Result<Json<Value>, ApiError> {
    let mode = q.mode()?;
    let service = state.service;
    let points = blocking(move || {
        let records = service.list_all(q.framework.as_deref())?;
        Ok(service.aggregator().pass_fail_trend(&records, mode))
    })
    .await?;
    Ok(Json(json!({ "meta": { "mode": mode, "total": points.len() }, "data": points })))
}

async fn automation_count_trend(
    State(state): State<AppState>,
    Query(q): Query<TrendQuery>,
) -> Result<Json<Value>, ApiError> {
    let mode = q.mode()?;
    let service = state.service;
    let points = blocking(move || {
        let records = service.list_all(q.framework.as_deref())?;
        Ok(service.aggregator().automation_count_trend(&records, mode))
    })
    .await?;
    Ok(Json(json!({ "meta": { "mode": mode, "total": points.len() }, "data": points })))
}

async fn upload_screenshot(
    State(state): State<AppState>,
    Path((run_id, file_name)): Path<(String, String)>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let service = state.service;
    let stored = blocking(move || service.attach_screenshot(&run_id, &file_name, &body)).await?;
    Ok((StatusCode::CREATED, Json(json!({ "data": stored, "meta": {} }))))
}
