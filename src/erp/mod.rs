//! ERP integration.
//!
//! The rest of the crate talks to the ERP only through [`ErpGateway`]. The
//! production implementation is [`tiny::TinyErpClient`]; when the ERP keys are
//! not configured every call answers [`ErpError::NotConfigured`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use utoipa::ToSchema;
use validator::Validate;

use crate::config::AppConfig;

pub mod tiny;
pub mod token_cache;

pub use tiny::TinyErpClient;
pub use token_cache::{CachedToken, InMemoryTokenCache, TokenCache};

#[derive(Debug, Error)]
pub enum ErpError {
    #[error("ERP integration is not configured")]
    NotConfigured,

    #[error("not found in ERP: {0}")]
    NotFound(String),

    #[error("ERP authentication failed: {0}")]
    Auth(String),

    #[error("ERP responded with status {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("ERP request failed: {0}")]
    Transport(String),

    #[error("unexpected ERP payload: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ErpError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ErpError::Decode(err.to_string())
        } else {
            ErpError::Transport(err.to_string())
        }
    }
}

/// Order as known by the ERP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ErpOrder {
    /// ERP-side identifier, used for status updates
    pub id: String,
    pub number: String,
    /// Human readable ERP status
    pub status: Option<String>,
    pub customer_name: Option<String>,
    pub items: Vec<ErpOrderItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ErpOrderItem {
    pub sku: Option<String>,
    pub description: String,
    pub quantity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum StockMovement {
    /// Goods coming in
    Entrada,
    /// Goods going out
    Saida,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
pub struct StockAdjustment {
    #[validate(length(min = 1, max = 64))]
    pub sku: String,
    #[validate(range(min = 0.001))]
    pub quantity: f64,
    pub movement: StockMovement,
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StockAdjustmentResult {
    pub product_id: String,
    pub sku: String,
    pub movement: StockMovement,
    pub quantity: f64,
    /// Ledger entry id returned by the ERP, when it reports one
    pub entry_id: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ErpGateway: Send + Sync {
    async fn find_order_by_number(&self, number: &str) -> Result<ErpOrder, ErpError>;

    /// Moves the ERP order to its "shipped" status.
    async fn mark_order_shipped(&self, erp_order_id: &str) -> Result<(), ErpError>;

    async fn adjust_stock(
        &self,
        adjustment: &StockAdjustment,
    ) -> Result<StockAdjustmentResult, ErpError>;
}

/// Stand-in used when no ERP credentials are configured.
#[derive(Debug, Default, Clone)]
pub struct DisabledErpGateway;

#[async_trait::async_trait]
impl ErpGateway for DisabledErpGateway {
    async fn find_order_by_number(&self, _number: &str) -> Result<ErpOrder, ErpError> {
        Err(ErpError::NotConfigured)
    }

    async fn mark_order_shipped(&self, _erp_order_id: &str) -> Result<(), ErpError> {
        Err(ErpError::NotConfigured)
    }

    async fn adjust_stock(
        &self,
        _adjustment: &StockAdjustment,
    ) -> Result<StockAdjustmentResult, ErpError> {
        Err(ErpError::NotConfigured)
    }
}

/// Builds the gateway described by the configuration.
pub fn gateway_from_config(cfg: &AppConfig) -> Result<Arc<dyn ErpGateway>, ErpError> {
    match cfg.erp_settings() {
        Some(settings) => {
            info!(base_url = %settings.base_url, "ERP gateway enabled");
            let cache: Arc<dyn TokenCache> = Arc::new(InMemoryTokenCache::new());
            Ok(Arc::new(TinyErpClient::new(settings, cache)?))
        }
        None => Ok(Arc::new(DisabledErpGateway)),
    }
}
