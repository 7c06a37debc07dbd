pub mod erp;
pub mod notifications;
pub mod pickups;
pub mod timeline;

use std::sync::Arc;

use crate::{
    db::DbPool,
    erp::ErpGateway,
    services::{
        erp::ErpService, notifications::NotificationService, pickups::PickupService,
        timeline::TimelineService, users::UserService,
    },
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer used by the HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub pickups: Arc<PickupService>,
    pub timeline: Arc<TimelineService>,
    pub notifications: Arc<NotificationService>,
    pub users: Arc<UserService>,
    pub erp: Arc<ErpService>,
}

impl AppServices {
    pub fn new(db_pool: Arc<DbPool>, erp_gateway: Arc<dyn ErpGateway>) -> Self {
        Self {
            pickups: Arc::new(PickupService::new(db_pool.clone(), erp_gateway.clone())),
            timeline: Arc::new(TimelineService::new(db_pool.clone())),
            notifications: Arc::new(NotificationService::new(db_pool.clone())),
            users: Arc::new(UserService::new(db_pool)),
            erp: Arc::new(ErpService::new(erp_gateway)),
        }
    }
}
