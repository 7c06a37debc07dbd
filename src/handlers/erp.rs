use axum::{
    extract::{Path, State},
    response::Json,
    Extension,
};

use crate::{
    auth::AuthUser,
    erp::{ErpOrder, StockAdjustment, StockAdjustmentResult},
    ApiResponse, ApiResult, AppState,
};

/// Look an order up directly in the ERP.
#[utoipa::path(
    get,
    path = "/api/v1/erp/pedidos/:number",
    params(("number" = String, Path, description = "Order number as shown in the ERP")),
    responses(
        (status = 200, description = "ERP order", body = ApiResponse<ErpOrder>),
        (status = 404, description = "Order unknown to the ERP", body = crate::errors::ErrorResponse),
        (status = 502, description = "ERP unreachable", body = crate::errors::ErrorResponse),
        (status = 503, description = "ERP not configured", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "erp"
)]
pub async fn get_erp_order(
    State(state): State<AppState>,
    Path(number): Path<String>,
) -> ApiResult<ErpOrder> {
    let order = state.erp_service().lookup_order(&number).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Post a stock movement for a SKU in the ERP.
#[utoipa::path(
    post,
    path = "/api/v1/erp/estoque",
    request_body = StockAdjustment,
    responses(
        (status = 200, description = "Movement accepted by the ERP", body = ApiResponse<StockAdjustmentResult>),
        (status = 400, description = "Invalid adjustment", body = crate::errors::ErrorResponse),
        (status = 403, description = "Managers and administrators only", body = crate::errors::ErrorResponse),
        (status = 404, description = "SKU unknown to the ERP", body = crate::errors::ErrorResponse),
        (status = 502, description = "ERP rejected the movement", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "erp"
)]
pub async fn adjust_stock(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<StockAdjustment>,
) -> ApiResult<StockAdjustmentResult> {
    let result = state.erp_service().adjust_stock(payload, &user).await?;
    Ok(Json(ApiResponse::success(result)))
}
