#![deny(unsafe_code)]

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use surety_adapters::MockSettlementChannel;
use surety_core::{
    ActivationOutcome, CreatePolicyRequest, EngineConfig, EventKind, EventRecord, Policy,
    PolicyId, ReimbursementOutcome, RolesConfig, SuretyEngine, SuretyError,
};
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub roles: RolesConfig,
    pub engine: EngineConfig,
}

#[derive(Clone)]
pub struct ServiceState {
    pub engine: Arc<SuretyEngine>,
}

impl ServiceState {
    pub async fn bootstrap(config: ServiceConfig) -> Result<Self, SuretyError> {
        let engine = SuretyEngine::bootstrap(
            config.roles,
            config.engine,
            Arc::new(MockSettlementChannel),
        )
        .await?;

        Ok(Self {
            engine: Arc::new(engine),
        })
    }
}

pub fn build_router(state: ServiceState) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/policies", post(create_policy))
        .route("/v1/policies/:holder", get(list_policies))
        .route("/v1/policies/:holder/:policy_id", get(read_policy))
        .route("/v1/policies/:holder/:policy_id/activate", post(activate_policy))
        .route("/v1/reimburse", post(reimburse))
        .route("/v1/quote", get(quote_premium))
        .route("/v1/exposure", get(exposure))
        .route("/v1/pool/fund", post(fund_pool))
        .route("/v1/events", get(list_events))
        .with_state(state)
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Http { status: StatusCode, message: String },
    #[error(transparent)]
    Core(#[from] SuretyError),
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self::Http {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

/// Lifecycle error kinds map to distinct HTTP statuses so callers can react
/// without parsing messages.
fn core_status(err: &SuretyError) -> StatusCode {
    match err {
        SuretyError::Unauthorized { .. } => StatusCode::FORBIDDEN,
        SuretyError::InvalidReference { .. } => StatusCode::NOT_FOUND,
        SuretyError::InvalidState(_) => StatusCode::CONFLICT,
        SuretyError::Expired { .. } => StatusCode::GONE,
        SuretyError::InsufficientFunds { .. } | SuretyError::LimitExceeded { .. } => {
            StatusCode::BAD_REQUEST
        }
        SuretyError::InsufficientPoolBalance { .. } => StatusCode::CONFLICT,
        SuretyError::TransferFailure { .. } => StatusCode::BAD_GATEWAY,
        SuretyError::EventLog(_) | SuretyError::Serialization(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Http { status, message } => {
                (status, Json(serde_json::json!({ "error": message }))).into_response()
            }
            ApiError::Core(err) => (
                core_status(&err),
                Json(serde_json::json!({ "error": err.to_string() })),
            )
                .into_response(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    event_backend: String,
    invariants_ok: bool,
}

async fn health(State(state): State<ServiceState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "surety-service",
        event_backend: state.engine.event_backend().await,
        invariants_ok: state.engine.verify_invariants().await,
    })
}

#[derive(Debug, Clone, Deserialize)]
struct CreatePolicyBody {
    caller: String,
    holder: String,
    deposit_amount: u64,
    secured_amount: u64,
    doc_ref: String,
}

#[derive(Debug, Clone, Serialize)]
struct CreatePolicyResponse {
    holder: String,
    policy_id: PolicyId,
}

async fn create_policy(
    State(state): State<ServiceState>,
    Json(body): Json<CreatePolicyBody>,
) -> Result<Json<CreatePolicyResponse>, ApiError> {
    let request = CreatePolicyRequest::new(
        body.holder.clone(),
        body.deposit_amount,
        body.secured_amount,
        body.doc_ref,
    );
    let policy_id = state.engine.create(&body.caller, request).await?;

    Ok(Json(CreatePolicyResponse {
        holder: body.holder,
        policy_id,
    }))
}

#[derive(Debug, Clone, Serialize)]
struct PolicyListResponse {
    holder: String,
    items: Vec<Policy>,
}

async fn list_policies(
    Path(holder): Path<String>,
    State(state): State<ServiceState>,
) -> Json<PolicyListResponse> {
    let items = state.engine.holder_policies(&holder).await;
    Json(PolicyListResponse { holder, items })
}

async fn read_policy(
    Path((holder, policy_id)): Path<(String, PolicyId)>,
    State(state): State<ServiceState>,
) -> Result<Json<Policy>, ApiError> {
    Ok(Json(state.engine.read_policy(&holder, policy_id).await?))
}

#[derive(Debug, Clone, Deserialize)]
struct ActivateBody {
    funds_sent: u64,
}

/// The activating caller is the holder named in the path.
async fn activate_policy(
    Path((holder, policy_id)): Path<(String, PolicyId)>,
    State(state): State<ServiceState>,
    Json(body): Json<ActivateBody>,
) -> Result<Json<ActivationOutcome>, ApiError> {
    Ok(Json(
        state
            .engine
            .activate(&holder, policy_id, body.funds_sent)
            .await?,
    ))
}

#[derive(Debug, Clone, Deserialize)]
struct ReimburseBody {
    caller: String,
    holder: String,
    policy_id: PolicyId,
    amount: u64,
}

async fn reimburse(
    State(state): State<ServiceState>,
    Json(body): Json<ReimburseBody>,
) -> Result<Json<ReimbursementOutcome>, ApiError> {
    Ok(Json(
        state
            .engine
            .reimburse(&body.caller, &body.holder, body.policy_id, body.amount)
            .await?,
    ))
}

#[derive(Debug, Clone, Deserialize)]
struct QuoteQuery {
    caller: String,
    secured_amount: u64,
}

#[derive(Debug, Clone, Serialize)]
struct QuoteResponse {
    secured_amount: u64,
    premium: u64,
}

async fn quote_premium(
    State(state): State<ServiceState>,
    Query(query): Query<QuoteQuery>,
) -> Result<Json<QuoteResponse>, ApiError> {
    let premium = state
        .engine
        .quote_premium(&query.caller, query.secured_amount)
        .await?;

    Ok(Json(QuoteResponse {
        secured_amount: query.secured_amount,
        premium,
    }))
}

#[derive(Debug, Clone, Serialize)]
struct ExposureResponse {
    total_secured_amount: u64,
    custody_balance: u64,
}

async fn exposure(State(state): State<ServiceState>) -> Json<ExposureResponse> {
    Json(ExposureResponse {
        total_secured_amount: state.engine.total_secured_amount().await,
        custody_balance: state.engine.custody_balance().await,
    })
}

#[derive(Debug, Clone, Deserialize)]
struct FundPoolBody {
    amount: u64,
}

#[derive(Debug, Clone, Serialize)]
struct FundPoolResponse {
    custody_balance: u64,
}

async fn fund_pool(
    State(state): State<ServiceState>,
    Json(body): Json<FundPoolBody>,
) -> Json<FundPoolResponse> {
    Json(FundPoolResponse {
        custody_balance: state.engine.fund_pool(body.amount).await,
    })
}

#[derive(Debug, Clone, Deserialize)]
struct EventsQuery {
    holder: Option<String>,
    policy_id: Option<PolicyId>,
    kind: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
    order: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct EventsResponse {
    backend: String,
    total: usize,
    returned: usize,
    items: Vec<EventRecord>,
}

fn parse_kind_filter(kind: Option<&str>) -> Result<Option<EventKind>, ApiError> {
    match kind.map(|value| value.to_ascii_lowercase()) {
        None => Ok(None),
        Some(value) if value == "created" => Ok(Some(EventKind::Created)),
        Some(value) if value == "activated" => Ok(Some(EventKind::Activated)),
        Some(value) if value == "reimbursed" => Ok(Some(EventKind::Reimbursed)),
        Some(other) => Err(ApiError::bad_request(format!(
            "invalid kind '{}'; expected one of: created, activated, reimbursed",
            other
        ))),
    }
}

async fn list_events(
    State(state): State<ServiceState>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<EventsResponse>, ApiError> {
    let kind_filter = parse_kind_filter(query.kind.as_deref())?;

    let mut records = state.engine.event_records().await;

    if let Some(holder) = query.holder.as_deref() {
        records.retain(|record| record.holder == holder);
    }

    if let Some(policy_id) = query.policy_id {
        records.retain(|record| record.policy_id == policy_id);
    }

    if let Some(kind) = kind_filter {
        records.retain(|record| record.kind == kind);
    }

    let order = query
        .order
        .as_deref()
        .unwrap_or("desc")
        .to_ascii_lowercase();
    if order == "desc" {
        records.reverse();
    } else if order != "asc" {
        return Err(ApiError::bad_request(format!(
            "invalid order '{}'; expected asc or desc",
            order
        )));
    }

    let total = records.len();
    let offset = query.offset.unwrap_or(0);
    let limit = query.limit.unwrap_or(100).min(1000);
    let items = records
        .into_iter()
        .skip(offset)
        .take(limit)
        .collect::<Vec<_>>();
    let returned = items.len();

    Ok(Json(EventsResponse {
        backend: state.engine.event_backend().await,
        total,
        returned,
        items,
    }))
}
