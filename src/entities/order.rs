use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::pickup::PickupStatus;

/// The `orders` table: local mirror of an ERP order that went through the counter.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Human order number, as printed on the invoice.
    #[sea_orm(unique)]
    pub order_number: String,

    /// Order id inside the ERP.
    pub erp_order_id: Option<String>,

    /// Status text reported by the ERP at lookup time.
    pub erp_status: Option<String>,

    /// Status of the most recent pickup for this order.
    pub internal_status: Option<PickupStatus>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::pickup::Entity")]
    Pickups,
}

impl Related<super::pickup::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Pickups.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
