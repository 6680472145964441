// src/server/api.rs

//! The JSON collections API served on the main port.
//!
//! Reads wait for the readiness gate (bounded by `ready_timeout`). Writes
//! never wait: they update memory, queue the remote job and answer 202.

use crate::core::engine::{Engine, WriteReceipt};
use crate::core::model::Record;
use crate::core::readiness::GateState;
use crate::core::sync::SyncOutcome;
use crate::core::MirrorError;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct ApiState {
    pub engine: Engine,
    pub ready_timeout: Duration,
}

/// Errors a handler can return, each mapped to one status code.
#[derive(Debug)]
pub enum ApiError {
    Engine(MirrorError),
    NotFound(String),
    NotReady,
}

impl From<MirrorError> for ApiError {
    fn from(e: MirrorError) -> Self {
        ApiError::Engine(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Engine(e @ MirrorError::UnknownCollection(_)) => {
                (StatusCode::NOT_FOUND, e.to_string())
            }
            ApiError::Engine(e @ MirrorError::InvalidRequest(_)) => {
                (StatusCode::BAD_REQUEST, e.to_string())
            }
            ApiError::Engine(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::NotReady => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Store has not been populated by a sync yet".to_string(),
            ),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct KeyFieldQuery {
    /// Overrides the collection's declared key field.
    pub key_field: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct WriteResponse {
    pub job_id: Option<Uuid>,
    pub matched: usize,
    pub key: String,
}

impl WriteResponse {
    fn new(receipt: WriteReceipt, key: String) -> Self {
        Self {
            job_id: receipt.job_id,
            matched: receipt.matched,
            key,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReadyResponse {
    pub state: String,
    pub pending_jobs: usize,
    pub syncing: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SyncResponse {
    pub outcome: String,
    pub detail: String,
}

pub fn router(engine: Engine, ready_timeout: Duration) -> Router {
    Router::new()
        .route("/collections/{name}", get(list_records).post(add_record))
        .route(
            "/collections/{name}/{key}",
            get(get_record).patch(update_record).delete(delete_record),
        )
        .route("/health/ready", get(ready))
        .route("/admin/sync", post(trigger_sync))
        .with_state(ApiState {
            engine,
            ready_timeout,
        })
}

async fn await_ready(state: &ApiState) -> Result<GateState, ApiError> {
    match tokio::time::timeout(state.ready_timeout, state.engine.await_ready()).await {
        Ok(gate) if gate.is_released() => Ok(gate),
        Ok(_) => Err(ApiError::NotReady),
        Err(_) => {
            warn!(
                "Read timed out after {:?} waiting for the first sync.",
                state.ready_timeout
            );
            Err(ApiError::NotReady)
        }
    }
}

/// Converts a JSON body into a record. Non-string values are stored in their
/// JSON text form and null becomes an empty string.
fn body_to_record(body: IndexMap<String, Value>) -> Record {
    body.into_iter()
        .map(|(k, v)| {
            let value = match v {
                Value::String(s) => s,
                Value::Null => String::new(),
                other => other.to_string(),
            };
            (k, value)
        })
        .collect()
}

fn resolve_key_field(
    engine: &Engine,
    collection: &str,
    query: KeyFieldQuery,
) -> Result<String, MirrorError> {
    let schema = engine.schema(collection)?;
    Ok(query
        .key_field
        .filter(|f| !f.is_empty())
        .unwrap_or_else(|| schema.key_field.clone()))
}

async fn list_records(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<Json<Vec<Record>>, ApiError> {
    state.engine.schema(&name)?;
    await_ready(&state).await?;
    Ok(Json(state.engine.list(&name)?))
}

async fn get_record(
    State(state): State<ApiState>,
    Path((name, key)): Path<(String, String)>,
    Query(query): Query<KeyFieldQuery>,
) -> Result<Json<Record>, ApiError> {
    let key_field = resolve_key_field(&state.engine, &name, query)?;
    await_ready(&state).await?;
    state
        .engine
        .get(&name, &key_field, &key)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No record in '{name}' with {key_field} = '{key}'")))
}

async fn add_record(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Json(body): Json<IndexMap<String, Value>>,
) -> Result<(StatusCode, Json<WriteResponse>), ApiError> {
    let key_field = state.engine.schema(&name)?.key_field.clone();
    let mut record = body_to_record(body);

    let key = match record.get(&key_field) {
        Some(existing) if !existing.is_empty() => existing.clone(),
        _ => {
            let generated = Uuid::new_v4().to_string();
            debug!("Generated {} = {} for new record in '{}'.", key_field, generated, name);
            record.insert(key_field, generated.clone());
            generated
        }
    };

    let receipt = state.engine.enqueue_add(&name, record)?;
    Ok((StatusCode::ACCEPTED, Json(WriteResponse::new(receipt, key))))
}

async fn update_record(
    State(state): State<ApiState>,
    Path((name, key)): Path<(String, String)>,
    Query(query): Query<KeyFieldQuery>,
    Json(body): Json<IndexMap<String, Value>>,
) -> Result<(StatusCode, Json<WriteResponse>), ApiError> {
    let key_field = resolve_key_field(&state.engine, &name, query)?;
    let receipt = state
        .engine
        .enqueue_update(&name, &key_field, &key, body_to_record(body))?;
    Ok((StatusCode::ACCEPTED, Json(WriteResponse::new(receipt, key))))
}

async fn delete_record(
    State(state): State<ApiState>,
    Path((name, key)): Path<(String, String)>,
    Query(query): Query<KeyFieldQuery>,
) -> Result<(StatusCode, Json<WriteResponse>), ApiError> {
    let key_field = resolve_key_field(&state.engine, &name, query)?;
    let receipt = state.engine.enqueue_delete(&name, &key_field, &key)?;
    Ok((StatusCode::ACCEPTED, Json(WriteResponse::new(receipt, key))))
}

/// Reports the gate without triggering a sync.
async fn ready(State(state): State<ApiState>) -> (StatusCode, Json<ReadyResponse>) {
    let gate = state.engine.readiness();
    let status = if gate.is_released() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = ReadyResponse {
        state: gate_label(gate).to_string(),
        pending_jobs: state.engine.pending_jobs(),
        syncing: state.engine.is_syncing(),
    };
    (status, Json(body))
}

fn gate_label(state: GateState) -> &'static str {
    match state {
        GateState::Pending => "pending",
        GateState::Ready => "ready",
        GateState::Degraded => "degraded",
    }
}

async fn trigger_sync(State(state): State<ApiState>) -> (StatusCode, Json<SyncResponse>) {
    let outcome = state.engine.run_sync_cycle().await;
    let status = match outcome {
        SyncOutcome::Failed(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::OK,
    };
    let body = SyncResponse {
        outcome: outcome.label().to_string(),
        detail: outcome.to_string(),
    };
    (status, Json(body))
}
