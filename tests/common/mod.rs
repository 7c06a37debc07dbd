#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;
use warehouse_ops::{
    auth::{AuthConfig, AuthService},
    config::AppConfig,
    db,
    entities::{user, UserRole},
    erp::{
        ErpError, ErpGateway, ErpOrder, ErpOrderItem, StockAdjustment, StockAdjustmentResult,
    },
    handlers::AppServices,
    services::users::{NewUser, UserService},
    AppState,
};

const TEST_JWT_SECRET: &str =
    "kT4pX9mQ2vN7bR1sL8wY3zC6hF0jD5gA2eU9iO4tK7nM1xV6qB3rW8yZ0cH5fJ2l";

/// In-process ERP double. Orders are registered up front; "mark shipped" can be
/// switched to fail to exercise the retry path.
#[derive(Default)]
pub struct FakeErp {
    orders: Mutex<HashMap<String, ErpOrder>>,
    shipped: Mutex<Vec<String>>,
    adjustments: Mutex<Vec<StockAdjustment>>,
    fail_shipped: Mutex<bool>,
}

impl FakeErp {
    pub fn with_order(&self, number: &str) -> ErpOrder {
        let order = ErpOrder {
            id: format!("erp-{}", number),
            number: number.to_string(),
            status: Some("Aprovada".to_string()),
            customer_name: Some("Maria Souza".to_string()),
            items: vec![ErpOrderItem {
                sku: Some("CAN-01".to_string()),
                description: "Caneca".to_string(),
                quantity: 2.0,
            }],
        };
        self.orders
            .lock()
            .unwrap()
            .insert(number.to_string(), order.clone());
        order
    }

    pub fn fail_shipped(&self, fail: bool) {
        *self.fail_shipped.lock().unwrap() = fail;
    }

    pub fn shipped(&self) -> Vec<String> {
        self.shipped.lock().unwrap().clone()
    }

    pub fn adjustments(&self) -> Vec<StockAdjustment> {
        self.adjustments.lock().unwrap().clone()
    }
}

#[async_trait]
impl ErpGateway for FakeErp {
    async fn find_order_by_number(&self, number: &str) -> Result<ErpOrder, ErpError> {
        self.orders
            .lock()
            .unwrap()
            .get(number)
            .cloned()
            .ok_or_else(|| ErpError::NotFound(format!("order {}", number)))
    }

    async fn mark_order_shipped(&self, erp_order_id: &str) -> Result<(), ErpError> {
        if *self.fail_shipped.lock().unwrap() {
            return Err(ErpError::Upstream {
                status: 503,
                body: "maintenance".to_string(),
            });
        }
        self.shipped.lock().unwrap().push(erp_order_id.to_string());
        Ok(())
    }

    async fn adjust_stock(
        &self,
        adjustment: &StockAdjustment,
    ) -> Result<StockAdjustmentResult, ErpError> {
        self.adjustments.lock().unwrap().push(adjustment.clone());
        Ok(StockAdjustmentResult {
            product_id: "55".to_string(),
            sku: adjustment.sku.clone(),
            movement: adjustment.movement,
            quantity: adjustment.quantity,
            entry_id: Some("9001".to_string()),
        })
    }
}

/// A seeded account plus a bearer token for it.
pub struct TestUser {
    pub model: user::Model,
    pub token: String,
}

/// Router over a fresh SQLite file with three accounts:
/// an admin, an expedition operator and a customer-service manager.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub erp: Arc<FakeErp>,
    pub admin: TestUser,
    pub operator: TestUser,
    pub manager: TestUser,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let db_path = dir.path().join("warehouse_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            TEST_JWT_SECRET.to_string(),
            3600,
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.cors_allow_any_origin = true;
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db_arc = Arc::new(pool);

        let users = UserService::new(db_arc.clone());
        let auth = Arc::new(AuthService::new(AuthConfig::from(&cfg), db_arc.clone()));

        let admin = seed(&users, &auth, "Ana Admin", UserRole::Admin, "TI").await;
        let operator = seed(&users, &auth, "Otavio Expedicao", UserRole::Operator, "EXPEDICAO").await;
        let manager = seed(&users, &auth, "Marta Sac", UserRole::Manager, "SAC").await;

        let erp = Arc::new(FakeErp::default());
        let gateway: Arc<dyn ErpGateway> = erp.clone();
        let services = AppServices::new(db_arc.clone(), gateway);

        let state = AppState {
            db: db_arc,
            config: cfg,
            services,
            auth,
        };
        let router = warehouse_ops::app_router(state.clone());

        Self {
            router,
            state,
            erp,
            admin,
            operator,
            manager,
            _dir: dir,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Sends a request and returns the status with the decoded JSON body
    /// (`Value::Null` for empty bodies).
    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        as_user: &TestUser,
    ) -> (StatusCode, Value) {
        let response = self
            .request(method, uri, body, Some(&as_user.token))
            .await;
        let status = response.status();
        (status, response_json(response).await)
    }

    /// Confirms a pickup for an order known to the fake ERP and returns the
    /// `data` payload.
    pub async fn confirm_pickup(&self, order_number: &str) -> Value {
        self.erp.with_order(order_number);
        let (status, body) = self
            .call(
                Method::POST,
                "/api/v1/pickups",
                Some(serde_json::json!({
                    "order_number": order_number,
                    "retriever_name": "João da Silva",
                    "retriever_cpf": "123.456",
                    "carrier": "Jadlog"
                })),
                &self.operator,
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "confirm failed: {}", body);
        body["data"].clone()
    }
}

async fn seed(
    users: &UserService,
    auth: &AuthService,
    name: &str,
    role: UserRole,
    department: &str,
) -> TestUser {
    let model = users
        .create_user(NewUser {
            name: name.to_string(),
            login: name.to_lowercase().replace(' ', "."),
            password: "correct-horse-battery".to_string(),
            role,
            department: department.to_string(),
        })
        .await
        .expect("seed user");
    let token = auth
        .generate_token(&model)
        .expect("issue token")
        .access_token;
    TestUser { model, token }
}

pub async fn response_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    }
}
