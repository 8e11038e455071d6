// Copyright (c) 2026 Joseph Verdicchio and EvidenceOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! JSON-over-HTTP surface for the duel engine.
//!
//! Bodies are parsed by hand from raw bytes so malformed input gets the same
//! public error shape as every other failure.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use duelos_core::{CleanupReport, Duel, DuelEngine, DuelId, ProblemRef, SubmitOutcome};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::config::DaemonConfig;
use crate::public_error::PublicError;
use crate::telemetry::Telemetry;

const DEFAULT_RECENT_LIMIT: usize = 10;
const MAX_RECENT_LIMIT: usize = 100;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<DaemonConfig>,
    pub engine: Arc<DuelEngine>,
    pub telemetry: Arc<Telemetry>,
}

pub fn build_state(
    cfg: DaemonConfig,
    engine: Arc<DuelEngine>,
    telemetry: Arc<Telemetry>,
) -> AppState {
    AppState {
        cfg: Arc::new(cfg),
        engine,
        telemetry,
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateDuelRequest {
    challenger: String,
    challengee: String,
    problem: ProblemRef,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateDuelResponse {
    duel_id: DuelId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActorRequest {
    username: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitRequest {
    username: String,
    elapsed_ms: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    winner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'static str>,
}

impl From<SubmitOutcome> for SubmitResponse {
    fn from(outcome: SubmitOutcome) -> Self {
        Self {
            completed: outcome.completed,
            winner: outcome.winner,
            reason: outcome.reason.map(|r| r.as_str()),
        }
    }
}

#[derive(Debug, Serialize)]
struct DuelListResponse {
    duels: Vec<Duel>,
}

#[derive(Debug, Serialize)]
struct XpResponse {
    username: String,
    xp: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CleanupResponse {
    deleted: usize,
    pending_deleted: usize,
    accepted_deleted: usize,
    active_deleted: usize,
    skipped: usize,
    failed: usize,
}

impl From<&CleanupReport> for CleanupResponse {
    fn from(report: &CleanupReport) -> Self {
        Self {
            deleted: report.deleted(),
            pending_deleted: report.pending_deleted,
            accepted_deleted: report.accepted_deleted,
            active_deleted: report.active_deleted,
            skipped: report.skipped,
            failed: report.failed,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/duels", post(create_duel))
        .route("/api/v1/duels/:id", get(get_duel))
        .route("/api/v1/duels/:id/accept", post(accept_duel))
        .route("/api/v1/duels/:id/start", post(start_duel))
        .route("/api/v1/duels/:id/submit", post(submit_duel))
        .route("/api/v1/duels/:id/reject", post(reject_duel))
        .route("/api/v1/users/:username/duels", get(user_duels))
        .route("/api/v1/users/:username/duels/recent", get(user_recent_duels))
        .route("/api/v1/users/:username/xp", get(user_xp))
        .route("/api/v1/maintenance/cleanup-stale", post(cleanup_stale))
        .route("/metrics", get(metrics))
        .layer(RequestBodyLimitLayer::new(state.cfg.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(
    listener: tokio::net::TcpListener,
    state: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, PublicError> {
    serde_json::from_slice(body).map_err(|err| PublicError::invalid_input(err.to_string()))
}

fn respond<T: Serialize>(
    state: &AppState,
    op: &'static str,
    status: StatusCode,
    result: Result<T, PublicError>,
) -> Response {
    match result {
        Ok(body) => {
            state.telemetry.record_request(op, "ok");
            (status, Json(body)).into_response()
        }
        Err(err) => {
            state.telemetry.record_request(op, err.code.as_str());
            err.into_response()
        }
    }
}

async fn create_duel(State(state): State<AppState>, body: Bytes) -> Response {
    let result = async {
        let req: CreateDuelRequest = parse_body(&body)?;
        let duel_id = state
            .engine
            .create(&req.challenger, &req.challengee, req.problem)
            .await?;
        Ok::<_, PublicError>(CreateDuelResponse { duel_id })
    }
    .await;
    respond(&state, "create", StatusCode::CREATED, result)
}

async fn get_duel(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let result = state
        .engine
        .get_by_id(&DuelId::from(id))
        .await
        .map_err(PublicError::from);
    respond(&state, "get", StatusCode::OK, result)
}

async fn accept_duel(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Response {
    let result = async {
        let req: ActorRequest = parse_body(&body)?;
        let duel_id = DuelId::from(id);
        state.engine.accept(&duel_id, &req.username).await?;
        Ok::<_, PublicError>(state.engine.get_by_id(&duel_id).await?)
    }
    .await;
    respond(&state, "accept", StatusCode::OK, result)
}

async fn start_duel(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Response {
    let result = async {
        let req: ActorRequest = parse_body(&body)?;
        let duel_id = DuelId::from(id);
        state.engine.start(&duel_id, &req.username).await?;
        Ok::<_, PublicError>(state.engine.get_by_id(&duel_id).await?)
    }
    .await;
    respond(&state, "start", StatusCode::OK, result)
}

async fn submit_duel(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Response {
    let result = async {
        let req: SubmitRequest = parse_body(&body)?;
        let outcome = state
            .engine
            .submit(&DuelId::from(id), &req.username, req.elapsed_ms)
            .await?;
        Ok::<_, PublicError>(outcome)
    }
    .await;
    if let Ok(SubmitOutcome {
        applied: true,
        reason: Some(reason),
        ..
    }) = &result
    {
        state.telemetry.record_completion(reason.as_str());
    }
    respond(&state, "submit", StatusCode::OK, result.map(SubmitResponse::from))
}

async fn reject_duel(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.engine.reject(&DuelId::from(id)).await {
        Ok(()) => {
            state.telemetry.record_request("reject", "ok");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => {
            let err = PublicError::from(err);
            state.telemetry.record_request("reject", err.code.as_str());
            err.into_response()
        }
    }
}

async fn user_duels(State(state): State<AppState>, Path(username): Path<String>) -> Response {
    let result = state
        .engine
        .duels_for_user(&username)
        .await
        .map(|duels| DuelListResponse { duels })
        .map_err(PublicError::from);
    respond(&state, "duels_for_user", StatusCode::OK, result)
}

async fn user_recent_duels(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let result = async {
        let limit = match params.get("limit") {
            None => DEFAULT_RECENT_LIMIT,
            Some(raw) => raw
                .parse::<usize>()
                .map_err(|_| PublicError::invalid_input("limit must be a non-negative integer"))?
                .min(MAX_RECENT_LIMIT),
        };
        let duels = state.engine.recent_duels(&username, limit).await?;
        Ok::<_, PublicError>(DuelListResponse { duels })
    }
    .await;
    respond(&state, "recent_duels", StatusCode::OK, result)
}

async fn user_xp(State(state): State<AppState>, Path(username): Path<String>) -> Response {
    let result = state
        .engine
        .xp_of(&username)
        .await
        .map(|xp| XpResponse {
            username: duelos_core::duel::normalize_user(&username),
            xp,
        })
        .map_err(PublicError::from);
    respond(&state, "xp", StatusCode::OK, result)
}

async fn cleanup_stale(State(state): State<AppState>) -> Response {
    let result = state
        .engine
        .cleanup_stale()
        .await
        .map(|report| {
            state.telemetry.record_cleanup(&report);
            CleanupResponse::from(&report)
        })
        .map_err(PublicError::from);
    respond(&state, "cleanup_stale", StatusCode::OK, result)
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.telemetry.render(),
    )
}
