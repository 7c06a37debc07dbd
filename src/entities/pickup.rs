use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Lifecycle of one physical hand-off of an order.
///
/// A returned pickup is never revived: the next attempt for the same order
/// is a new row with the next `pickup_number`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum PickupStatus {
    /// Tracking code saved, goods still in the warehouse
    #[sea_orm(string_value = "AGUARDANDO_RETIRADA")]
    #[serde(rename = "AGUARDANDO_RETIRADA")]
    #[strum(serialize = "AGUARDANDO_RETIRADA")]
    AwaitingPickup,
    #[sea_orm(string_value = "RETIRADO")]
    #[serde(rename = "RETIRADO")]
    #[strum(serialize = "RETIRADO")]
    PickedUp,
    /// Sent back by the carrier
    #[sea_orm(string_value = "RETORNADO")]
    #[serde(rename = "RETORNADO")]
    #[strum(serialize = "RETORNADO")]
    Returned,
}

impl PickupStatus {
    pub fn can_transition_to(self, next: PickupStatus) -> bool {
        use PickupStatus::*;
        matches!(
            (self, next),
            (AwaitingPickup, PickedUp) | (AwaitingPickup, Returned) | (PickedUp, Returned)
        )
    }

    /// Whether a new attempt for the order must start a fresh pickup row.
    pub fn is_terminal(self) -> bool {
        matches!(self, PickupStatus::Returned)
    }
}

/// The `pickups` table.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "pickups")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub order_id: Uuid,

    /// 1-based attempt counter, unique per order.
    pub pickup_number: i32,

    pub retriever_name: Option<String>,

    /// Digits of the retriever's CPF as typed at the counter (may be partial).
    pub retriever_cpf: Option<String>,

    pub operator_id: Option<Uuid>,
    pub operator_name: Option<String>,

    pub carrier: Option<String>,

    pub tracking_code: Option<String>,

    /// The code that `tracking_code` replaced, if any. Only one generation is kept.
    pub previous_tracking_code: Option<String>,
    pub tracking_updated_at: Option<DateTime<Utc>>,

    pub status: PickupStatus,

    pub photo_url: Option<String>,

    /// Items handed over, as captured from the ERP order.
    #[sea_orm(column_type = "Json", nullable)]
    pub items: Option<Json>,

    /// Set once the ERP accepted the "shipped" update.
    pub erp_synced_at: Option<DateTime<Utc>>,
    /// Last ERP failure for this pickup, cleared on success.
    pub erp_error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id",
        on_update = "Cascade",
        on_delete = "Restrict"
    )]
    Order,

    #[sea_orm(has_many = "super::timeline_line::Entity")]
    TimelineLines,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl Related<super::timeline_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TimelineLines.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(PickupStatus::AwaitingPickup, PickupStatus::PickedUp, true)]
    #[case(PickupStatus::AwaitingPickup, PickupStatus::Returned, true)]
    #[case(PickupStatus::PickedUp, PickupStatus::Returned, true)]
    #[case(PickupStatus::PickedUp, PickupStatus::AwaitingPickup, false)]
    #[case(PickupStatus::PickedUp, PickupStatus::PickedUp, false)]
    #[case(PickupStatus::Returned, PickupStatus::PickedUp, false)]
    #[case(PickupStatus::Returned, PickupStatus::AwaitingPickup, false)]
    fn pickup_transitions(
        #[case] from: PickupStatus,
        #[case] to: PickupStatus,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn wire_names_match_storage_values() {
        assert_eq!(PickupStatus::AwaitingPickup.to_string(), "AGUARDANDO_RETIRADA");
        assert_eq!(
            serde_json::to_value(PickupStatus::Returned).unwrap(),
            serde_json::json!("RETORNADO")
        );
        assert_eq!(PickupStatus::PickedUp.to_value(), "RETIRADO");
    }
}
