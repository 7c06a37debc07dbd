use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Warehouse Operations API",
        version = "0.1.0",
        description = r#"
# Warehouse Operations API

Pickup tracking and occurrence routing for the warehouse counter, integrated
with the Tiny ERP.

## Authentication

Sign in at `POST /api/v1/auth/login` and send the token on every call:

```
Authorization: Bearer <your-jwt-token>
```

## Error Handling

Errors share one body shape:

```json
{
  "error": "Bad Request",
  "message": "Timeline line is closed",
  "request_id": "7d1c...",
  "timestamp": "2024-01-01T00:00:00Z"
}
```

ERP failures answer `502`; an unconfigured ERP answers `503`.

## Pagination

`GET /api/v1/retiradas` accepts `page` (default 1) and `limit` (default 20, max 100).
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "auth", description = "Sign in"),
        (name = "pickups", description = "Pickup confirmation, tracking codes and ERP sync"),
        (name = "timeline", description = "Timeline lines and occurrences"),
        (name = "notifications", description = "Pending occurrences routed to the caller"),
        (name = "erp", description = "Direct ERP operations")
    ),
    paths(
        crate::auth::login_handler,

        // Pickups
        crate::handlers::pickups::confirm_pickup,
        crate::handlers::pickups::save_tracking,
        crate::handlers::pickups::list_pickups,
        crate::handlers::pickups::get_pickup,
        crate::handlers::pickups::update_pickup,
        crate::handlers::pickups::delete_pickup,
        crate::handlers::pickups::sync_erp,

        // Timeline
        crate::handlers::timeline::list_lines,
        crate::handlers::timeline::open_line,
        crate::handlers::timeline::update_line,
        crate::handlers::timeline::add_occurrence,
        crate::handlers::timeline::resolve_occurrence,

        // Notifications
        crate::handlers::notifications::list_notifications,
        crate::handlers::notifications::count_notifications,

        // ERP
        crate::handlers::erp::get_erp_order,
        crate::handlers::erp::adjust_stock,
    ),
    components(
        schemas(
            crate::PaginatedResponse<serde_json::Value>,
            crate::auth::LoginCredentials,
            crate::auth::TokenResponse,
            crate::entities::PickupStatus,
            crate::entities::LineStatus,
            crate::entities::OccurrenceStatus,
            crate::entities::OccurrenceKind,
            crate::entities::ReturnReason,
            crate::entities::UserRole,
            crate::erp::StockMovement,
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDocV1;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route_and_the_bearer_scheme() {
        let openapi = ApiDocV1::openapi();
        for path in [
            "/api/v1/auth/login",
            "/api/v1/pickups",
            "/api/v1/retiradas/rastreio",
            "/api/v1/retiradas/:id/linhas-tempo/:line_id/ocorrencias",
            "/api/v1/notificacoes/contagem",
            "/api/v1/erp/estoque",
        ] {
            assert!(openapi.paths.paths.contains_key(path), "missing {}", path);
        }

        let components = openapi.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
