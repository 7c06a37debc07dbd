use std::sync::Arc;

use metrics::counter;
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::{
    auth::AuthUser,
    erp::{ErpGateway, ErpOrder, StockAdjustment, StockAdjustmentResult},
    errors::ServiceError,
};

/// Direct ERP operations exposed to operators. Failures surface to the caller.
#[derive(Clone)]
pub struct ErpService {
    gateway: Arc<dyn ErpGateway>,
}

impl ErpService {
    pub fn new(gateway: Arc<dyn ErpGateway>) -> Self {
        Self { gateway }
    }

    #[instrument(skip(self))]
    pub async fn lookup_order(&self, number: &str) -> Result<ErpOrder, ServiceError> {
        let number = number.trim();
        if number.is_empty() {
            return Err(ServiceError::ValidationError(
                "order number is required".to_string(),
            ));
        }
        Ok(self.gateway.find_order_by_number(number).await?)
    }

    #[instrument(skip(self, actor), fields(user = %actor.user_id))]
    pub async fn adjust_stock(
        &self,
        adjustment: StockAdjustment,
        actor: &AuthUser,
    ) -> Result<StockAdjustmentResult, ServiceError> {
        adjustment.validate()?;
        match self.gateway.adjust_stock(&adjustment).await {
            Ok(result) => {
                counter!("warehouse_stock.adjustments", 1, "movement" => result.movement.to_string());
                info!(
                    sku = %result.sku,
                    movement = %result.movement,
                    quantity = result.quantity,
                    "stock adjusted in ERP"
                );
                Ok(result)
            }
            Err(err) => {
                warn!(sku = %adjustment.sku, error = %err, "stock adjustment failed");
                Err(err.into())
            }
        }
    }
}
