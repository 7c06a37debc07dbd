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
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum UserRole {
    #[sea_orm(string_value = "ADMIN")]
    Admin,
    /// Department manager
    #[sea_orm(string_value = "GERENTE")]
    #[serde(rename = "GERENTE")]
    #[strum(serialize = "GERENTE")]
    Manager,
    #[sea_orm(string_value = "OPERADOR")]
    #[serde(rename = "OPERADOR")]
    #[strum(serialize = "OPERADOR")]
    Operator,
}

/// The `users` table.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Display name, also used as a legacy routing key for occurrences.
    pub name: String,

    #[sea_orm(unique)]
    pub login: String,

    #[serde(skip_serializing)]
    pub password_hash: String,

    pub role: UserRole,

    pub department: String,

    pub active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
