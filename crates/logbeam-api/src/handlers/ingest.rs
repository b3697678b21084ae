//! Log ingestion endpoint.
//!
//! `POST /api/v1/projects/:project_id/logs` accepts one log event, gates it
//! with the per-project API rate limit, and hands it to the fan-out. Storage
//! of the row is owned by the caller's persistence layer, not this server.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use logbeam_core::{LogLevel, LogRecord, RateLimitDecision};
use logbeam_jobs::FanoutReport;

use crate::error::ApiError;
use crate::state::AppState;

const RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

#[derive(Debug, Deserialize)]
pub struct IngestLogRequest {
    pub id: Option<Uuid>,
    pub level: LogLevel,
    pub message: String,
    #[serde(default)]
    pub source: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub metadata: Option<JsonValue>,
}

#[derive(Debug, Serialize)]
pub struct IngestLogResponse {
    pub log: LogRecord,
    #[serde(flatten)]
    pub fanout: FanoutReport,
}

pub async fn ingest_log(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Json(body): Json<IngestLogRequest>,
) -> Result<Response, ApiError> {
    if project_id.trim().is_empty() {
        return Err(ApiError::BadRequest("project_id is required".to_string()));
    }
    if body.message.trim().is_empty() {
        return Err(ApiError::BadRequest("message must not be empty".to_string()));
    }

    let limit = state.limiter.config().api_per_minute;
    let decision = state.limiter.allow_api(&project_id, limit).await;
    let headers = rate_limit_headers(&decision);

    if !decision.allowed {
        tracing::warn!(project_id = %project_id, "Rate limit exceeded");
        return Ok((
            StatusCode::TOO_MANY_REQUESTS,
            headers,
            Json(serde_json::json!({
                "error": "rate_limit_exceeded",
                "error_description": "Too many requests. Please wait before retrying."
            })),
        )
            .into_response());
    }

    let log = LogRecord {
        id: body.id.unwrap_or_else(Uuid::now_v7),
        project_id,
        level: body.level,
        message: body.message,
        source: body.source,
        timestamp: body.timestamp.unwrap_or_else(Utc::now),
        metadata: body.metadata,
    };

    let fanout = state.fanout.dispatch(&log).await;

    Ok((
        StatusCode::ACCEPTED,
        headers,
        Json(IngestLogResponse { log, fanout }),
    )
        .into_response())
}

fn rate_limit_headers(decision: &RateLimitDecision) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(RATE_LIMIT_RESET, HeaderValue::from(decision.reset_at.timestamp()));
    headers
}
