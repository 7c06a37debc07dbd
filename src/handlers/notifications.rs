use axum::{
    extract::{Query, State},
    response::Json,
    Extension,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::timeline::OccurrenceResponse;
use crate::{
    auth::AuthUser,
    services::notifications::{Notification, DEFAULT_NOTIFICATION_LIMIT},
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Deserialize, Default, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NotificationParams {
    /// At most 200
    pub limit: Option<u64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NotificationResponse {
    pub occurrence: OccurrenceResponse,
    pub order_number: Option<String>,
    pub pickup_number: Option<i32>,
}

impl From<Notification> for NotificationResponse {
    fn from(n: Notification) -> Self {
        Self {
            occurrence: n.occurrence.into(),
            order_number: n.order_number,
            pickup_number: n.pickup_number,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NotificationCount {
    pub pending: u64,
}

/// Pending occurrences addressed to the caller or their department.
#[utoipa::path(
    get,
    path = "/api/v1/notificacoes",
    params(NotificationParams),
    responses(
        (status = 200, description = "Pending notifications, newest first", body = ApiResponse<Vec<NotificationResponse>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "notifications"
)]
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<NotificationParams>,
) -> ApiResult<Vec<NotificationResponse>> {
    let items = state
        .notification_service()
        .pending_for(&user, params.limit.unwrap_or(DEFAULT_NOTIFICATION_LIMIT))
        .await?;
    Ok(Json(ApiResponse::success(
        items.into_iter().map(NotificationResponse::from).collect(),
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/notificacoes/contagem",
    responses(
        (status = 200, description = "Number of pending notifications", body = ApiResponse<NotificationCount>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "notifications"
)]
pub async fn count_notifications(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<NotificationCount> {
    let pending = state.notification_service().count_for(&user).await?;
    Ok(Json(ApiResponse::success(NotificationCount { pending })))
}
