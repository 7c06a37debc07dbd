use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::AuthUser,
    entities::{
        occurrence, timeline_line, LineStatus, OccurrenceKind, OccurrenceStatus, PickupStatus,
        ReturnReason,
    },
    errors::ServiceError,
    services::{pickups::LineWithOccurrences, timeline::NewOccurrence},
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct OccurrenceResponse {
    pub id: Uuid,
    pub line_id: Uuid,
    pub pickup_id: Uuid,
    pub description: String,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub recipient_id: Option<Uuid>,
    pub recipient_name: Option<String>,
    #[schema(example = "EXPEDICAO")]
    pub origin_department: String,
    #[schema(example = "SAC")]
    pub destination_department: Option<String>,
    pub status: OccurrenceStatus,
    pub kind: OccurrenceKind,
    pub return_reason: Option<ReturnReason>,
    pub answered_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<occurrence::Model> for OccurrenceResponse {
    fn from(model: occurrence::Model) -> Self {
        Self {
            id: model.id,
            line_id: model.line_id,
            pickup_id: model.pickup_id,
            description: model.description,
            sender_id: model.sender_id,
            sender_name: model.sender_name,
            recipient_id: model.recipient_id,
            recipient_name: model.recipient_name,
            origin_department: model.origin_department,
            destination_department: model.destination_department,
            status: model.status,
            kind: model.kind,
            return_reason: model.return_reason,
            answered_at: model.answered_at,
            resolved_at: model.resolved_at,
            resolved_by: model.resolved_by,
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LineResponse {
    pub id: Uuid,
    pub pickup_id: Uuid,
    #[schema(example = 1)]
    pub sequence: i32,
    pub status: LineStatus,
    pub opened_by: Uuid,
    pub opened_by_name: String,
    pub closed_at: Option<DateTime<Utc>>,
    pub closed_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub occurrences: Vec<OccurrenceResponse>,
}

impl LineResponse {
    fn new(line: timeline_line::Model, occurrences: Vec<occurrence::Model>) -> Self {
        Self {
            id: line.id,
            pickup_id: line.pickup_id,
            sequence: line.sequence,
            status: line.status,
            opened_by: line.opened_by,
            opened_by_name: line.opened_by_name,
            closed_at: line.closed_at,
            closed_by: line.closed_by,
            created_at: line.created_at,
            occurrences: occurrences.into_iter().map(OccurrenceResponse::from).collect(),
        }
    }
}

impl From<LineWithOccurrences> for LineResponse {
    fn from(value: LineWithOccurrences) -> Self {
        Self::new(value.line, value.occurrences)
    }
}

impl From<timeline_line::Model> for LineResponse {
    fn from(line: timeline_line::Model) -> Self {
        Self::new(line, Vec::new())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateLineRequest {
    /// Only `ENCERRADA` is accepted: lines never reopen
    pub status: LineStatus,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[schema(example = json!({
    "description": "Cliente informou endereço errado",
    "destination_department": "SAC",
    "kind": "RETORNO_PRODUTO",
    "return_reason": "ENDERECO_INCORRETO"
}))]
pub struct CreateOccurrenceRequest {
    #[validate(length(min = 1, max = 5000))]
    pub description: String,
    pub recipient_id: Option<Uuid>,
    #[validate(length(max = 120))]
    pub recipient_name: Option<String>,
    #[validate(length(max = 60))]
    pub destination_department: Option<String>,
    #[serde(default)]
    pub kind: OccurrenceKind,
    /// Required for `RETORNO_PRODUTO`, ignored otherwise
    pub return_reason: Option<ReturnReason>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OccurrenceCreatedResponse {
    pub occurrence: OccurrenceResponse,
    /// Pending occurrences on the line marked as answered
    pub answered: u64,
    pub pickup_status: PickupStatus,
}

#[utoipa::path(
    get,
    path = "/api/v1/retiradas/:id/linhas-tempo",
    params(("id" = Uuid, Path, description = "Pickup ID")),
    responses(
        (status = 200, description = "Lines with their occurrences", body = ApiResponse<Vec<LineResponse>>),
        (status = 404, description = "Pickup not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "timeline"
)]
pub async fn list_lines(
    State(state): State<AppState>,
    Path(pickup_id): Path<Uuid>,
) -> ApiResult<Vec<LineResponse>> {
    let lines = state.timeline_service().list_lines(pickup_id).await?;
    Ok(Json(ApiResponse::success(
        lines.into_iter().map(LineResponse::from).collect(),
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/retiradas/:id/linhas-tempo",
    params(("id" = Uuid, Path, description = "Pickup ID")),
    responses(
        (status = 201, description = "Line opened", body = ApiResponse<LineResponse>),
        (status = 400, description = "A line is already open", body = crate::errors::ErrorResponse),
        (status = 404, description = "Pickup not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "timeline"
)]
pub async fn open_line(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(pickup_id): Path<Uuid>,
) -> Result<(StatusCode, Json<ApiResponse<LineResponse>>), ServiceError> {
    let line = state.timeline_service().open_line(pickup_id, &user).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(line.into()))))
}

#[utoipa::path(
    patch,
    path = "/api/v1/retiradas/:id/linhas-tempo/:line_id",
    params(
        ("id" = Uuid, Path, description = "Pickup ID"),
        ("line_id" = Uuid, Path, description = "Timeline line ID")
    ),
    request_body = UpdateLineRequest,
    responses(
        (status = 200, description = "Line closed", body = ApiResponse<LineResponse>),
        (status = 400, description = "Line already closed", body = crate::errors::ErrorResponse),
        (status = 404, description = "Line not found on this pickup", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "timeline"
)]
pub async fn update_line(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((pickup_id, line_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateLineRequest>,
) -> ApiResult<LineResponse> {
    if payload.status != LineStatus::Closed {
        return Err(ServiceError::InvalidOperation(
            "Timeline lines can only be closed".to_string(),
        ));
    }
    let line = state
        .timeline_service()
        .close_line(pickup_id, line_id, &user)
        .await?;
    Ok(Json(ApiResponse::success(line.into())))
}

#[utoipa::path(
    post,
    path = "/api/v1/retiradas/:id/linhas-tempo/:line_id/ocorrencias",
    params(
        ("id" = Uuid, Path, description = "Pickup ID"),
        ("line_id" = Uuid, Path, description = "Timeline line ID")
    ),
    request_body = CreateOccurrenceRequest,
    responses(
        (status = 201, description = "Occurrence recorded", body = ApiResponse<OccurrenceCreatedResponse>),
        (status = 400, description = "Line closed or return reason missing", body = crate::errors::ErrorResponse),
        (status = 404, description = "Line not found on this pickup", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "timeline"
)]
pub async fn add_occurrence(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((pickup_id, line_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<CreateOccurrenceRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OccurrenceCreatedResponse>>), ServiceError> {
    payload.validate()?;
    let outcome = state
        .timeline_service()
        .add_occurrence(
            pickup_id,
            line_id,
            NewOccurrence {
                description: payload.description,
                recipient_id: payload.recipient_id,
                recipient_name: payload.recipient_name,
                destination_department: payload.destination_department,
                kind: payload.kind,
                return_reason: payload.return_reason,
            },
            &user,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(OccurrenceCreatedResponse {
            occurrence: outcome.occurrence.into(),
            answered: outcome.answered,
            pickup_status: outcome.pickup_status,
        })),
    ))
}

#[utoipa::path(
    patch,
    path = "/api/v1/ocorrencias/:id/resolver",
    params(("id" = Uuid, Path, description = "Occurrence ID")),
    responses(
        (status = 200, description = "Occurrence resolved", body = ApiResponse<OccurrenceResponse>),
        (status = 400, description = "Already resolved", body = crate::errors::ErrorResponse),
        (status = 404, description = "Occurrence not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "timeline"
)]
pub async fn resolve_occurrence(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<OccurrenceResponse> {
    let occurrence = state
        .timeline_service()
        .resolve_occurrence(id, &user)
        .await?;
    Ok(Json(ApiResponse::success(occurrence.into())))
}
