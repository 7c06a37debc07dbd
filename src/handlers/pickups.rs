use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::timeline::LineResponse;
use crate::{
    auth::AuthUser,
    entities::{order, pickup, OccurrenceStatus, PickupStatus},
    errors::ServiceError,
    services::pickups::{
        ConfirmPickupInput, ErpSyncOutcome, PickupDetail, PickupListQuery, PickupOutcome,
        PickupSummary, SaveTrackingInput, TrackingChange, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
    },
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct PickupResponse {
    pub id: Uuid,
    pub order_id: Uuid,
    /// Attempt number within the order, starting at 1
    #[schema(example = 1)]
    pub pickup_number: i32,
    pub status: PickupStatus,
    #[schema(example = "João da Silva")]
    pub retriever_name: Option<String>,
    /// Digits only, possibly partial
    #[schema(example = "12345678901")]
    pub retriever_cpf: Option<String>,
    pub operator_id: Option<Uuid>,
    pub operator_name: Option<String>,
    #[schema(example = "Jadlog")]
    pub carrier: Option<String>,
    #[schema(example = "BR123456789")]
    pub tracking_code: Option<String>,
    pub previous_tracking_code: Option<String>,
    pub tracking_updated_at: Option<DateTime<Utc>>,
    pub photo_url: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub items: Option<serde_json::Value>,
    pub erp_synced_at: Option<DateTime<Utc>>,
    pub erp_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<pickup::Model> for PickupResponse {
    fn from(model: pickup::Model) -> Self {
        Self {
            id: model.id,
            order_id: model.order_id,
            pickup_number: model.pickup_number,
            status: model.status,
            retriever_name: model.retriever_name,
            retriever_cpf: model.retriever_cpf,
            operator_id: model.operator_id,
            operator_name: model.operator_name,
            carrier: model.carrier,
            tracking_code: model.tracking_code,
            previous_tracking_code: model.previous_tracking_code,
            tracking_updated_at: model.tracking_updated_at,
            photo_url: model.photo_url,
            items: model.items,
            erp_synced_at: model.erp_synced_at,
            erp_error: model.erp_error,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    #[schema(example = "10234")]
    pub order_number: String,
    pub erp_order_id: Option<String>,
    pub erp_status: Option<String>,
    pub internal_status: Option<PickupStatus>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<order::Model> for OrderResponse {
    fn from(model: order::Model) -> Self {
        Self {
            id: model.id,
            order_number: model.order_number,
            erp_order_id: model.erp_order_id,
            erp_status: model.erp_status,
            internal_status: model.internal_status,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[schema(example = json!({
    "order_number": "10234",
    "retriever_name": "João da Silva",
    "retriever_cpf": "123.456",
    "carrier": "Jadlog"
}))]
pub struct ConfirmPickupRequest {
    #[validate(length(min = 1, max = 50))]
    pub order_number: String,
    #[validate(length(min = 1, max = 120))]
    pub retriever_name: String,
    /// Full or partial CPF; punctuation is ignored
    #[validate(length(min = 3, max = 20))]
    pub retriever_cpf: String,
    #[validate(length(max = 80))]
    pub carrier: Option<String>,
    #[validate(length(max = 80))]
    pub tracking_code: Option<String>,
    #[validate(length(max = 500))]
    pub photo_url: Option<String>,
    /// Replaces the item list captured from the ERP
    #[schema(value_type = Option<Object>)]
    pub items: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PickupWithOrderResponse {
    pub order: OrderResponse,
    pub pickup: PickupResponse,
    pub erp_sync: ErpSyncOutcome,
}

impl From<PickupOutcome> for PickupWithOrderResponse {
    fn from(outcome: PickupOutcome) -> Self {
        Self {
            order: outcome.order.into(),
            pickup: outcome.pickup.into(),
            erp_sync: outcome.erp_sync,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SaveTrackingRequest {
    #[validate(length(min = 1, max = 50))]
    pub order_number: String,
    #[validate(length(min = 1, max = 80))]
    pub tracking_code: String,
    #[validate(length(max = 80))]
    pub carrier: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TrackingResponse {
    pub order: OrderResponse,
    pub pickup: PickupResponse,
    /// A new pickup row was opened for the code
    pub created: bool,
    /// The stored code changed
    pub changed: bool,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdatePickupRequest {
    #[validate(length(min = 1, max = 80))]
    pub tracking_code: String,
    #[validate(length(max = 80))]
    pub carrier: Option<String>,
}

#[derive(Debug, Deserialize, Default, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PickupListParams {
    pub status: Option<PickupStatus>,
    /// Substring of the order number
    pub order_number: Option<String>,
    /// Only pickups with pending occurrences
    pub pending_only: Option<bool>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PickupListItem {
    #[serde(flatten)]
    pub pickup: PickupResponse,
    pub order_number: Option<String>,
    /// Pending occurrences on the pickup
    pub open_occurrences: u64,
    pub last_occurrence_status: Option<OccurrenceStatus>,
    pub has_open_line: bool,
}

impl From<PickupSummary> for PickupListItem {
    fn from(summary: PickupSummary) -> Self {
        Self {
            pickup: summary.pickup.into(),
            order_number: summary.order_number,
            open_occurrences: summary.open_occurrences,
            last_occurrence_status: summary.last_occurrence_status,
            has_open_line: summary.has_open_line,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PickupDetailResponse {
    pub pickup: PickupResponse,
    pub order: Option<OrderResponse>,
    pub lines: Vec<LineResponse>,
}

impl From<PickupDetail> for PickupDetailResponse {
    fn from(detail: PickupDetail) -> Self {
        Self {
            pickup: detail.pickup.into(),
            order: detail.order.map(OrderResponse::from),
            lines: detail.lines.into_iter().map(LineResponse::from).collect(),
        }
    }
}

/// Confirm that the goods of an order were handed over.
#[utoipa::path(
    post,
    path = "/api/v1/pickups",
    request_body = ConfirmPickupRequest,
    responses(
        (status = 201, description = "Pickup recorded", body = ApiResponse<PickupWithOrderResponse>),
        (status = 400, description = "Invalid request or already picked up", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order unknown to the ERP", body = crate::errors::ErrorResponse),
        (status = 502, description = "ERP unreachable", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "pickups"
)]
pub async fn confirm_pickup(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<ConfirmPickupRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PickupWithOrderResponse>>), ServiceError> {
    payload.validate()?;
    let outcome = state
        .pickup_service()
        .confirm_pickup(
            ConfirmPickupInput {
                order_number: payload.order_number,
                retriever_name: payload.retriever_name,
                retriever_cpf: payload.retriever_cpf,
                carrier: payload.carrier,
                tracking_code: payload.tracking_code,
                photo_url: payload.photo_url,
                items: payload.items,
            },
            &user,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(with_sync_message(outcome))))
}

/// Save a tracking code for an order, opening a pickup when needed.
#[utoipa::path(
    post,
    path = "/api/v1/retiradas/rastreio",
    request_body = SaveTrackingRequest,
    responses(
        (status = 200, description = "Tracking code saved", body = ApiResponse<TrackingResponse>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order unknown to the ERP", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "pickups"
)]
pub async fn save_tracking(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<SaveTrackingRequest>,
) -> ApiResult<TrackingResponse> {
    payload.validate()?;
    let outcome = state
        .pickup_service()
        .save_tracking(
            SaveTrackingInput {
                order_number: payload.order_number,
                tracking_code: payload.tracking_code,
                carrier: payload.carrier,
            },
            &user,
        )
        .await?;

    Ok(Json(ApiResponse::success(TrackingResponse {
        order: outcome.order.into(),
        pickup: outcome.pickup.into(),
        created: outcome.created,
        changed: outcome.change != TrackingChange::Unchanged,
    })))
}

#[utoipa::path(
    get,
    path = "/api/v1/retiradas",
    params(PickupListParams),
    responses(
        (status = 200, description = "Pickups listed", body = ApiResponse<PaginatedResponse<PickupListItem>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "pickups"
)]
pub async fn list_pickups(
    State(state): State<AppState>,
    Query(params): Query<PickupListParams>,
) -> ApiResult<PaginatedResponse<PickupListItem>> {
    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

    let result = state
        .pickup_service()
        .list_pickups(PickupListQuery {
            status: params.status,
            order_number: params.order_number,
            pending_only: params.pending_only.unwrap_or(false),
            page,
            limit,
        })
        .await?;

    let total_pages = (result.total + result.limit - 1) / result.limit;
    Ok(Json(ApiResponse::success(PaginatedResponse {
        items: result.items.into_iter().map(PickupListItem::from).collect(),
        total: result.total,
        page: result.page,
        limit: result.limit,
        total_pages,
    })))
}

#[utoipa::path(
    get,
    path = "/api/v1/retiradas/:id",
    params(("id" = Uuid, Path, description = "Pickup ID")),
    responses(
        (status = 200, description = "Pickup with its timeline", body = ApiResponse<PickupDetailResponse>),
        (status = 404, description = "Pickup not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "pickups"
)]
pub async fn get_pickup(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<PickupDetailResponse> {
    let detail = state.pickup_service().get_pickup(id).await?;
    Ok(Json(ApiResponse::success(detail.into())))
}

/// Replace the tracking code; the old one is kept as `previous_tracking_code`.
#[utoipa::path(
    patch,
    path = "/api/v1/retiradas/:id",
    params(("id" = Uuid, Path, description = "Pickup ID")),
    request_body = UpdatePickupRequest,
    responses(
        (status = 200, description = "Pickup updated", body = ApiResponse<PickupResponse>),
        (status = 404, description = "Pickup not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "pickups"
)]
pub async fn update_pickup(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePickupRequest>,
) -> ApiResult<PickupResponse> {
    payload.validate()?;
    let (pickup, _) = state
        .pickup_service()
        .update_tracking(id, &payload.tracking_code, payload.carrier)
        .await?;
    Ok(Json(ApiResponse::success(pickup.into())))
}

#[utoipa::path(
    delete,
    path = "/api/v1/retiradas/:id",
    params(("id" = Uuid, Path, description = "Pickup ID")),
    responses(
        (status = 204, description = "Pickup deleted"),
        (status = 403, description = "Administrators only", body = crate::errors::ErrorResponse),
        (status = 404, description = "Pickup not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "pickups"
)]
pub async fn delete_pickup(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.pickup_service().delete_pickup(id, &user).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Retry the ERP "shipped" update of a picked up pickup.
#[utoipa::path(
    post,
    path = "/api/v1/retiradas/:id/sincronizar-erp",
    params(("id" = Uuid, Path, description = "Pickup ID")),
    responses(
        (status = 200, description = "Sync attempted; see erp_sync", body = ApiResponse<PickupWithOrderResponse>),
        (status = 400, description = "Pickup is not picked up", body = crate::errors::ErrorResponse),
        (status = 404, description = "Pickup not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "pickups"
)]
pub async fn sync_erp(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<PickupWithOrderResponse> {
    let outcome = state.pickup_service().retry_erp_sync(id).await?;
    Ok(Json(with_sync_message(outcome)))
}

fn with_sync_message(outcome: PickupOutcome) -> ApiResponse<PickupWithOrderResponse> {
    let synced = outcome.erp_sync.synced;
    let response = ApiResponse::success(PickupWithOrderResponse::from(outcome));
    if synced {
        response
    } else {
        response.with_message("Pickup saved; ERP update pending, retry via sincronizar-erp")
    }
}
