use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use moodwire_pipeline::{drive_run, LogPublisher, PipelineConfig};
use moodwire_sentiment::LexiconScorer;
use moodwire_store::{Run, RunStatus, RunStore};

use crate::middleware::RequestId;

use super::{map_store_error, normalize_limit, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Deserialize)]
pub(super) struct RunsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct StartRunRequest {
    pub window_minutes: Option<i64>,
    pub idempotency_key: Option<String>,
    pub dry_run: Option<bool>,
}

#[derive(Debug, Serialize)]
pub(super) struct StartRunData {
    run_id: Uuid,
    status: String,
}

#[derive(Debug, Serialize)]
pub(super) struct RunListItem {
    run_id: Uuid,
    status: String,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    item_count: Option<i32>,
    mood_label: Option<String>,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub(super) struct RunSummaryData {
    run_id: Uuid,
    status: String,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    has_more: bool,
    rounds_completed: i32,
    /// Raw rows in the item log, duplicates included.
    stored_items: i64,
    /// Deduplicated, window-filtered population the aggregate ran over.
    item_count: Option<i32>,
    average_compound: Option<f64>,
    net_sentiment_percent: Option<f64>,
    mood_label: Option<String>,
    top_items: Option<serde_json::Value>,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// `POST /api/v1/runs` — create (or adopt) a run and drive it in the
/// background. Answers immediately with the run id.
pub(super) async fn start_run(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    body: Option<Json<StartRunRequest>>,
) -> Result<(StatusCode, Json<ApiResponse<StartRunData>>), ApiError> {
    let Json(body) = body.unwrap_or_default();

    let mut pipeline_config = PipelineConfig::from_app_config(&state.config);
    if let Some(minutes) = body.window_minutes {
        if minutes <= 0 {
            return Err(ApiError::new(
                req_id.0,
                "validation_error",
                "window_minutes must be positive",
            ));
        }
        pipeline_config.window_minutes = minutes;
    }
    if let Some(dry_run) = body.dry_run {
        pipeline_config.dry_run = dry_run;
    }

    let run = moodwire_pipeline::start_run(
        &state.store,
        pipeline_config.window_minutes,
        &pipeline_config.query,
        body.idempotency_key.as_deref(),
    )
    .await
    .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;

    if run.status == RunStatus::Running {
        let store = state.store.clone();
        let source = Arc::clone(&state.source);
        let run_id = run.run_id;
        tokio::spawn(async move {
            match drive_run(
                &store,
                source,
                &LexiconScorer,
                &LogPublisher,
                &pipeline_config,
                run_id,
            )
            .await
            {
                Ok(report) => {
                    tracing::info!(run_id = %report.run_id, "run cycle finished");
                }
                Err(error) => {
                    tracing::error!(run_id = %run_id, error = %error, "run cycle failed");
                }
            }
        });
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse {
            data: StartRunData {
                run_id: run.run_id,
                status: run.status.to_string(),
            },
            meta: ResponseMeta::new(req_id.0),
        }),
    ))
}

/// `GET /api/v1/runs` — recent runs, newest first. Diagnostics only.
pub(super) async fn list_runs(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<RunsQuery>,
) -> Result<Json<ApiResponse<Vec<RunListItem>>>, ApiError> {
    let runs = state
        .store
        .list_recent_runs(normalize_limit(query.limit))
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e))?;

    let data = runs.into_iter().map(run_list_item).collect();

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// `GET /api/v1/runs/{run_id}` — one run's full summary.
pub(super) async fn get_run_summary(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<ApiResponse<RunSummaryData>>, ApiError> {
    let run = state
        .store
        .get_run(run_id)
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e))?;
    let stored_items = state
        .store
        .count_items(run_id)
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e))?;

    let data = RunSummaryData {
        run_id: run.run_id,
        status: run.status.to_string(),
        window_start: run.window_start,
        window_end: run.window_end,
        has_more: run.has_more,
        rounds_completed: run.rounds_completed,
        stored_items,
        item_count: run.item_count,
        average_compound: run.average_compound,
        net_sentiment_percent: run.average_compound.map(|a| a * 100.0),
        mood_label: run.mood_label,
        top_items: run.top_items,
        failure_reason: run.failure_reason,
        created_at: run.created_at,
        updated_at: run.updated_at,
        expires_at: run.expires_at,
    };

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}

fn run_list_item(run: Run) -> RunListItem {
    RunListItem {
        run_id: run.run_id,
        status: run.status.to_string(),
        window_start: run.window_start,
        window_end: run.window_end,
        item_count: run.item_count,
        mood_label: run.mood_label,
        failure_reason: run.failure_reason,
        created_at: run.created_at,
    }
}

fn map_pipeline_error(
    request_id: String,
    error: &moodwire_pipeline::PipelineError,
) -> ApiError {
    match error {
        moodwire_pipeline::PipelineError::Store(store_error) => {
            map_store_error(request_id, store_error)
        }
        _ => {
            tracing::error!(error = %error, "failed to start run");
            ApiError::new(request_id, "internal_error", "failed to start run")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_summary_data_serializes_the_net_percent() {
        let now = Utc::now();
        let data = RunSummaryData {
            run_id: Uuid::now_v7(),
            status: "completed".to_owned(),
            window_start: now,
            window_end: now,
            has_more: false,
            rounds_completed: 3,
            stored_items: 2400,
            item_count: Some(2310),
            average_compound: Some(0.234),
            net_sentiment_percent: Some(23.4),
            mood_label: Some("upbeat".to_owned()),
            top_items: Some(serde_json::json!([])),
            failure_reason: None,
            created_at: now,
            updated_at: now,
            expires_at: now,
        };
        let json = serde_json::to_string(&data).expect("serialize");
        assert!(json.contains("\"net_sentiment_percent\":23.4"));
        assert!(json.contains("\"stored_items\":2400"));
    }

    #[test]
    fn start_run_request_tolerates_an_empty_body() {
        let parsed: StartRunRequest = serde_json::from_str("{}").expect("parse");
        assert!(parsed.window_minutes.is_none());
        assert!(parsed.idempotency_key.is_none());
    }

    #[test]
    fn run_list_item_is_serializable() {
        let now = Utc::now();
        let item = RunListItem {
            run_id: Uuid::now_v7(),
            status: "failed".to_owned(),
            window_start: now,
            window_end: now,
            item_count: None,
            mood_label: None,
            failure_reason: Some("all workers failed twice at offset 800".to_owned()),
            created_at: now,
        };
        let json = serde_json::to_string(&item).expect("serialize");
        assert!(json.contains("\"status\":\"failed\""));
        assert!(json.contains("all workers failed"));
    }
}
