//! Identity entity - a person known either by native credentials or by an
//! external provider subject.
//!
//! Native identities carry `email` + `password` with `issuer` set to this
//! service's own issuer URL. External identities carry `external_id` (the
//! provider's `sub`) and the provider's `issuer`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "identity")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub email: Option<String>,
    pub email_verified: bool,
    /// bcrypt hash, native identities only
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub external_id: Option<String>,
    pub issuer: Option<String>,
    pub name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub picture: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
