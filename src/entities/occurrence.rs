use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Conversation state of one occurrence.
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
pub enum OccurrenceStatus {
    /// Waiting for the addressee
    #[sea_orm(string_value = "PENDENTE")]
    #[serde(rename = "PENDENTE")]
    #[strum(serialize = "PENDENTE")]
    Pending,
    /// A later occurrence was posted on the same line
    #[sea_orm(string_value = "RESPONDIDA")]
    #[serde(rename = "RESPONDIDA")]
    #[strum(serialize = "RESPONDIDA")]
    Answered,
    #[sea_orm(string_value = "RESOLVIDA")]
    #[serde(rename = "RESOLVIDA")]
    #[strum(serialize = "RESOLVIDA")]
    Resolved,
}

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
    Default,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum OccurrenceKind {
    #[default]
    #[sea_orm(string_value = "INFORMACAO")]
    #[serde(rename = "INFORMACAO")]
    #[strum(serialize = "INFORMACAO")]
    Information,
    /// The carrier brought the goods back; the pickup becomes `RETORNADO`.
    #[sea_orm(string_value = "RETORNO_PRODUTO")]
    #[serde(rename = "RETORNO_PRODUTO")]
    #[strum(serialize = "RETORNO_PRODUTO")]
    ProductReturn,
}

/// Why a product came back. Only stored on `RETORNO_PRODUTO` occurrences.
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
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum ReturnReason {
    #[sea_orm(string_value = "AVARIADO")]
    #[serde(rename = "AVARIADO")]
    #[strum(serialize = "AVARIADO")]
    Damaged,
    #[sea_orm(string_value = "ENDERECO_INCORRETO")]
    #[serde(rename = "ENDERECO_INCORRETO")]
    #[strum(serialize = "ENDERECO_INCORRETO")]
    WrongAddress,
    #[sea_orm(string_value = "DESTINATARIO_AUSENTE")]
    #[serde(rename = "DESTINATARIO_AUSENTE")]
    #[strum(serialize = "DESTINATARIO_AUSENTE")]
    RecipientAbsent,
    #[sea_orm(string_value = "RECUSADO")]
    #[serde(rename = "RECUSADO")]
    #[strum(serialize = "RECUSADO")]
    Refused,
    #[sea_orm(string_value = "EXTRAVIADO")]
    #[serde(rename = "EXTRAVIADO")]
    #[strum(serialize = "EXTRAVIADO")]
    Lost,
    #[sea_orm(string_value = "OUTRO")]
    #[serde(rename = "OUTRO")]
    #[strum(serialize = "OUTRO")]
    Other,
}

/// The `occurrences` table.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "occurrences")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub line_id: Uuid,
    /// Copied from the line so pickup-level aggregates need no join.
    pub pickup_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub description: String,

    pub sender_id: Uuid,
    pub sender_name: String,

    pub recipient_id: Option<Uuid>,
    pub recipient_name: Option<String>,

    pub origin_department: String,
    pub destination_department: Option<String>,

    pub status: OccurrenceStatus,
    pub kind: OccurrenceKind,
    pub return_reason: Option<ReturnReason>,

    pub answered_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<Uuid>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::timeline_line::Entity",
        from = "Column::LineId",
        to = "super::timeline_line::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    TimelineLine,
}

impl Related<super::timeline_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TimelineLine.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
