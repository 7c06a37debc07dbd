use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum LineStatus {
    #[sea_orm(string_value = "ABERTA")]
    #[serde(rename = "ABERTA")]
    #[strum(serialize = "ABERTA")]
    Open,
    /// Terminal. Further occurrences need a new line.
    #[sea_orm(string_value = "ENCERRADA")]
    #[serde(rename = "ENCERRADA")]
    #[strum(serialize = "ENCERRADA")]
    Closed,
}

/// The `timeline_lines` table.
///
/// At most one line per pickup may be `ABERTA`; the migration backs this
/// with a partial unique index.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "timeline_lines")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub pickup_id: Uuid,

    /// 1-based, unique per pickup.
    pub sequence: i32,

    pub status: LineStatus,

    pub opened_by: Uuid,
    pub opened_by_name: String,

    pub closed_at: Option<DateTime<Utc>>,
    pub closed_by: Option<Uuid>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::pickup::Entity",
        from = "Column::PickupId",
        to = "super::pickup::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Pickup,

    #[sea_orm(has_many = "super::occurrence::Entity")]
    Occurrences,
}

impl Related<super::pickup::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Pickup.def()
    }
}

impl Related<super::occurrence::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Occurrences.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
