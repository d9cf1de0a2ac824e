//! HTTP surface: routes, shared state and startup wiring.

use crate::answer::{AnswerMode, AnswerService, Question};
use crate::config::{AnswerModeKind, ConfigError, ServiceConfig};
use crate::error::AdmissionError;
use crate::knowledge::{KnowledgeBase, KnowledgeBaseError, KnowledgeBaseFile};
use crate::query_log::{JsonlQueryLog, MemoryQueryLog, QueryLog};
use crate::rate_limit::{AdmissionGate, AdmissionLayer, AdmissionService};
use crate::remote::{OpenAiClient, RemoteError};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::{Layer, ServiceExt};

/// Errors that stop the service from starting.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    KnowledgeBase(#[from] KnowledgeBaseError),
    #[error("failed to build remote client: {0}")]
    Remote(#[from] RemoteError),
}

#[derive(Clone, Debug)]
pub struct AppState {
    answers: AdmissionService<AnswerService>,
    knowledge: Arc<KnowledgeBase>,
    log: Arc<dyn QueryLog>,
}

impl AppState {
    /// Wire the answer service behind the admission gate.
    pub fn new(
        gate: Arc<AdmissionGate>,
        mode: AnswerMode,
        knowledge: Arc<KnowledgeBase>,
        log: Arc<dyn QueryLog>,
    ) -> Self {
        let answers = AdmissionLayer::new(gate)
            .layer(AnswerService::new(mode, knowledge.clone(), log.clone()));
        Self { answers, knowledge, log }
    }

    /// Build everything the service needs from configuration.
    ///
    /// `api_key` is the raw value of `OPENAI_API_KEY`, if set.
    pub fn from_config(
        config: &ServiceConfig,
        api_key: Option<String>,
    ) -> Result<Self, StartupError> {
        let gate = AdmissionGate::from_config(&config.gate).map_err(ConfigError::from)?;

        let mode = match config.resolve_api_key(api_key)? {
            Some(key) => {
                let client = OpenAiClient::new(config.remote.clone(), key)?;
                AnswerMode::RemoteAnswering(Arc::new(client))
            }
            None => AnswerMode::LocalLookupFallback,
        };

        let knowledge = Arc::new(KnowledgeBase::load(&config.knowledge_base.path)?);
        let log: Arc<dyn QueryLog> = match &config.query_log.path {
            Some(path) => Arc::new(JsonlQueryLog::new(path)),
            None => Arc::new(MemoryQueryLog::with_capacity(config.query_log.memory_capacity)),
        };

        tracing::info!(
            mode = ?mode,
            capacity = gate.capacity(),
            refill_rate_per_second = gate.refill_rate(),
            "service configured"
        );
        Ok(Self::new(Arc::new(gate), mode, knowledge, log))
    }

    pub fn gate(&self) -> &Arc<AdmissionGate> {
        self.answers.gate()
    }

    pub fn answer_mode(&self) -> AnswerModeKind {
        self.answers.get_ref().mode().kind()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ask", post(ask))
        .route("/admin/update_kb", post(update_kb))
        .route("/admin/logs", get(view_logs))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct AskRequest {
    #[serde(default)]
    query: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateKbRequest {
    knowledge_base: KnowledgeBaseFile,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "UP" }))
}

async fn ask(State(state): State<AppState>, Json(request): Json<AskRequest>) -> Response {
    let question = match Question::parse(request.query) {
        Ok(question) => question,
        Err(empty) => return error_response(StatusCode::BAD_REQUEST, &empty.to_string()),
    };

    match state.answers.clone().oneshot(question).await {
        Ok(answer) => Json(json!({ "response": answer.text })).into_response(),
        Err(AdmissionError::Rejected { .. }) => error_response(
            StatusCode::TOO_MANY_REQUESTS,
            "Too many requests. Please wait before trying again.",
        ),
        Err(AdmissionError::Inner(never)) => match never {},
    }
}

async fn update_kb(
    State(state): State<AppState>,
    Json(request): Json<UpdateKbRequest>,
) -> Response {
    match state.knowledge.replace(request.knowledge_base).await {
        Ok(()) => Json(json!({ "status": "success" })).into_response(),
        Err(error) => {
            tracing::error!(%error, "error updating knowledge base");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to update knowledge base")
        }
    }
}

async fn view_logs(State(state): State<AppState>) -> Response {
    match state.log.records().await {
        Ok(records) => Json(records).into_response(),
        Err(error) => {
            tracing::error!(%error, "error retrieving logs");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to retrieve logs")
        }
    }
}
