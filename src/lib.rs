//! Warehouse operations API
//!
//! Pickup tracking, timeline/occurrence routing between departments and the
//! Tiny ERP integration.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod erp;
pub mod errors;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod tracing;

use std::sync::Arc;

use axum::{
    extract::State,
    response::Json,
    routing::{get, patch, post},
    Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::{compression::CompressionLayer, timeout::TimeoutLayer};
use utoipa::ToSchema;

use crate::auth::{AuthRouterExt, AuthService};
use crate::entities::UserRole;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub services: handlers::AppServices,
    pub auth: Arc<AuthService>,
}

impl AppState {
    pub fn pickup_service(&self) -> Arc<services::pickups::PickupService> {
        self.services.pickups.clone()
    }

    pub fn timeline_service(&self) -> Arc<services::timeline::TimelineService> {
        self.services.timeline.clone()
    }

    pub fn notification_service(&self) -> Arc<services::notifications::NotificationService> {
        self.services.notifications.clone()
    }

    pub fn erp_service(&self) -> Arc<services::erp::ErpService> {
        self.services.erp.clone()
    }
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}


/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Routes mounted under `/api/v1`.
pub fn api_v1_routes() -> Router<AppState> {
    let pickups = Router::new()
        .route("/pickups", post(handlers::pickups::confirm_pickup))
        .route("/retiradas", get(handlers::pickups::list_pickups))
        .route("/retiradas/rastreio", post(handlers::pickups::save_tracking))
        .route(
            "/retiradas/:id",
            get(handlers::pickups::get_pickup).patch(handlers::pickups::update_pickup),
        )
        .route(
            "/retiradas/:id/sincronizar-erp",
            post(handlers::pickups::sync_erp),
        )
        .with_auth();

    let pickups_admin = Router::new()
        .route(
            "/retiradas/:id",
            axum::routing::delete(handlers::pickups::delete_pickup),
        )
        .with_roles(&[UserRole::Admin]);

    let timeline = Router::new()
        .route(
            "/retiradas/:id/linhas-tempo",
            get(handlers::timeline::list_lines).post(handlers::timeline::open_line),
        )
        .route(
            "/retiradas/:id/linhas-tempo/:line_id",
            patch(handlers::timeline::update_line),
        )
        .route(
            "/retiradas/:id/linhas-tempo/:line_id/ocorrencias",
            post(handlers::timeline::add_occurrence),
        )
        .route(
            "/ocorrencias/:id/resolver",
            patch(handlers::timeline::resolve_occurrence),
        )
        .with_auth();

    let notifications = Router::new()
        .route(
            "/notificacoes",
            get(handlers::notifications::list_notifications),
        )
        .route(
            "/notificacoes/contagem",
            get(handlers::notifications::count_notifications),
        )
        .with_auth();

    let erp_read = Router::new()
        .route("/erp/pedidos/:number", get(handlers::erp::get_erp_order))
        .with_auth();

    let erp_stock = Router::new()
        .route("/erp/estoque", post(handlers::erp::adjust_stock))
        .with_roles(&[UserRole::Admin, UserRole::Manager]);

    Router::new()
        // Status and health endpoints
        .route("/status", get(api_status))
        .route("/health", get(health_check))
        .merge(pickups)
        .merge(pickups_admin)
        .merge(timeline)
        .merge(notifications)
        .merge(erp_read)
        .merge(erp_stock)
}

/// Full application router with the middleware stack. CORS is left to the caller.
pub fn app_router(state: AppState) -> Router {
    let request_timeout = state.config.request_timeout();
    let auth_service = state.auth.clone();

    Router::<AppState>::new()
        .route("/", get(|| async { "warehouse-ops up" }))
        .nest("/api/v1", api_v1_routes())
        .nest(
            "/api/v1/auth",
            auth::auth_routes().with_state(auth_service.clone()),
        )
        .merge(openapi::swagger_ui())
        // HTTP tracing layer for consistent request/response telemetry
        .layer(crate::tracing::configure_http_tracing())
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(request_timeout))
        // Inject AuthService into request extensions for auth middleware
        .layer(axum::middleware::from_fn_with_state(
            auth_service,
            auth::inject_auth_service,
        ))
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
        .with_state(state)
}

async fn api_status(State(state): State<AppState>) -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    let version = env!("CARGO_PKG_VERSION");
    let git = option_env!("GIT_HASH").unwrap_or("unknown");
    let build_time = option_env!("BUILD_TIME").unwrap_or("unknown");
    let status_data = json!({
        "status": "ok",
        "version": version,
        "git": git,
        "build_time": build_time,
        "service": "warehouse-ops",
        "timestamp": Utc::now().to_rfc3339(),
        "environment": state.config.environment,
    });

    Ok(Json(ApiResponse::success(status_data)))
}

async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    let db_status = match db::check_connection(&state.db).await {
        Ok(()) => "healthy",
        Err(_) => "unhealthy",
    };
    let erp_status = if state.config.erp_settings().is_some() {
        "configured"
    } else {
        "disabled"
    };

    let health_data = json!({
        "status": db_status,
        "checks": {
            "database": db_status,
            "erp": erp_status,
        },
        "timestamp": Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(health_data)))
}
